//! Handler registry: maps a source's `handler` tag to a factory.
//!
//! [`HandlerRegistry::with_defaults`] registers the built-in handlers.
//! Adding a source type means registering one more factory; the merge
//! engine never matches on tags itself.

use std::collections::BTreeMap;
use std::sync::Arc;

use tw_parking_source_models::{FilterMatch, FilterRule, SourceConfig};

use crate::api_paginated::ApiPaginatedHandler;
use crate::shapefile_zip::ShapefileZipHandler;
use crate::{HandlerContext, SourceError, SourceHandler};

/// Builds a handler for one source.
pub type HandlerFactory = Arc<
    dyn Fn(&SourceConfig, &HandlerContext) -> Result<Box<dyn SourceHandler>, SourceError>
        + Send
        + Sync,
>;

/// Values a city-specific handler fills in when the source config omits
/// them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandlerDefaults {
    /// City name when no `city` mapping is configured.
    pub city: Option<String>,
    /// Inclusion filter when the config declares none.
    pub filter: Option<FilterRule>,
}

impl HandlerDefaults {
    /// New Taipei's paginated API: keep rows whose `charged` column
    /// marks accessible spaces.
    #[must_use]
    pub fn new_taipei() -> Self {
        Self {
            city: Some("New Taipei City".to_string()),
            filter: Some(FilterRule {
                field: "charged".to_string(),
                matcher: FilterMatch::Contains("身汽".to_string()),
            }),
        }
    }

    /// Taipei's shapefile export: keep rows whose `pktype` is `03`.
    #[must_use]
    pub fn taipei() -> Self {
        Self {
            city: Some("Taipei City".to_string()),
            filter: Some(FilterRule {
                field: "pktype".to_string(),
                matcher: FilterMatch::Equals("03".to_string()),
            }),
        }
    }
}

/// Tag → factory lookup.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    factories: BTreeMap<String, HandlerFactory>,
}

impl HandlerRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in handlers:
    ///
    /// | Tag | Handler |
    /// |---|---|
    /// | `api_paginated` | paginated JSON/CSV API |
    /// | `shapefile_zip` | zipped shapefile |
    /// | `new_taipei_handler` | paginated API with New Taipei defaults |
    /// | `taipei_handler` | zipped shapefile with Taipei defaults |
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register_paginated("api_paginated", HandlerDefaults::default());
        registry.register_paginated("new_taipei_handler", HandlerDefaults::new_taipei());
        registry.register_shapefile("shapefile_zip", HandlerDefaults::default());
        registry.register_shapefile("taipei_handler", HandlerDefaults::taipei());
        registry
    }

    fn register_paginated(&mut self, tag: &str, defaults: HandlerDefaults) {
        self.register(
            tag,
            Arc::new(move |config: &SourceConfig, context: &HandlerContext| {
                Ok(Box::new(ApiPaginatedHandler::new(config, context, &defaults)?)
                    as Box<dyn SourceHandler>)
            }),
        );
    }

    fn register_shapefile(&mut self, tag: &str, defaults: HandlerDefaults) {
        self.register(
            tag,
            Arc::new(move |config: &SourceConfig, context: &HandlerContext| {
                Ok(Box::new(ShapefileZipHandler::new(config, context, &defaults)?)
                    as Box<dyn SourceHandler>)
            }),
        );
    }

    /// Registers `factory` under `tag`, replacing any previous entry.
    pub fn register(&mut self, tag: impl Into<String>, factory: HandlerFactory) {
        let tag = tag.into();
        if self.factories.insert(tag.clone(), factory).is_some() {
            log::debug!("Replaced handler factory for '{tag}'");
        }
    }

    /// Whether `tag` has a factory.
    #[must_use]
    pub fn contains(&self, tag: &str) -> bool {
        self.factories.contains_key(tag)
    }

    /// Registered tags in sorted order.
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Builds the handler selected by `config.handler`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::UnknownHandler`] if the tag is not registered,
    /// or whatever the factory returns for an invalid config.
    pub fn build(
        &self,
        config: &SourceConfig,
        context: &HandlerContext,
    ) -> Result<Box<dyn SourceHandler>, SourceError> {
        let factory = self
            .factories
            .get(&config.handler)
            .ok_or_else(|| SourceError::UnknownHandler {
                tag: config.handler.clone(),
                available: self.tags().collect::<Vec<_>>().join(", "),
            })?;
        factory(config, context)
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("tags", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::testing::{FakeHttp, context};

    fn source(handler: &str, config: serde_json::Value) -> SourceConfig {
        serde_json::from_value(json!({
            "id": "test",
            "handler": handler,
            "config": config
        }))
        .unwrap()
    }

    #[test]
    fn registers_builtin_tags() {
        let registry = HandlerRegistry::with_defaults();
        let tags: Vec<_> = registry.tags().collect();
        assert_eq!(
            tags,
            vec![
                "api_paginated",
                "new_taipei_handler",
                "shapefile_zip",
                "taipei_handler"
            ]
        );
        assert!(registry.contains("taipei_handler"));
        assert!(!registry.contains("TaipeiHandler"));
    }

    #[test]
    fn builds_city_handlers_without_explicit_city() {
        let registry = HandlerRegistry::with_defaults();
        let http = Arc::new(FakeHttp::default());
        let ctx = context(&http);

        let handler = registry
            .build(
                &source("new_taipei_handler", json!({"url": "https://a.test/api"})),
                &ctx,
            )
            .unwrap();
        assert_eq!(handler.id(), "test");

        assert!(
            registry
                .build(
                    &source("taipei_handler", json!({"url": "https://a.test/p.zip"})),
                    &ctx,
                )
                .is_ok()
        );
    }

    #[test]
    fn generic_handlers_require_city_mapping() {
        let registry = HandlerRegistry::with_defaults();
        let http = Arc::new(FakeHttp::default());
        let ctx = context(&http);

        let result = registry.build(
            &source("api_paginated", json!({"url": "https://a.test/api"})),
            &ctx,
        );
        assert!(matches!(result, Err(SourceError::Config { .. })));

        let result = registry.build(
            &source(
                "api_paginated",
                json!({
                    "url": "https://a.test/api",
                    "fields_mapping": {"city": "fixed:Keelung City"}
                }),
            ),
            &ctx,
        );
        assert!(result.is_ok());
    }

    #[test]
    fn unknown_tag_is_an_error() {
        let registry = HandlerRegistry::with_defaults();
        let http = Arc::new(FakeHttp::default());
        let result = registry.build(&source("ftp_dump", json!({})), &context(&http));
        assert!(matches!(
            &result,
            Err(SourceError::UnknownHandler { tag, .. }) if tag == "ftp_dump"
        ));
        let message = result.err().map(|e| e.to_string()).unwrap_or_default();
        assert!(message.ends_with(
            "(available: api_paginated, new_taipei_handler, shapefile_zip, taipei_handler)"
        ));
    }

    #[test]
    fn custom_factories_can_be_registered() {
        let mut registry = HandlerRegistry::new();
        registry.register(
            "always_fails",
            Arc::new(|config: &SourceConfig, _: &HandlerContext| {
                Err(SourceError::Config {
                    source_id: config.id.clone(),
                    message: "nope".to_string(),
                })
            }),
        );
        let http = Arc::new(FakeHttp::default());
        let result = registry.build(&source("always_fails", json!({})), &context(&http));
        assert!(matches!(result, Err(SourceError::Config { message, .. }) if message == "nope"));
    }
}
