//! Source-level inclusion filters.

use std::collections::BTreeSet;

use tw_parking_source_models::FilterRule;

use crate::{RawRow, SourceError, value_to_string};

/// Finds the column matching `wanted`, exactly first and then ignoring
/// ASCII case.
#[must_use]
pub fn resolve_field<'a, I>(wanted: &str, available: I) -> Option<String>
where
    I: IntoIterator<Item = &'a str> + Clone,
{
    available
        .clone()
        .into_iter()
        .find(|name| *name == wanted)
        .or_else(|| {
            available
                .into_iter()
                .find(|name| name.eq_ignore_ascii_case(wanted))
        })
        .map(str::to_string)
}

/// Keeps the rows that pass `rule`.
///
/// The filter field is resolved against the union of the rows' field
/// names. An empty input passes through untouched.
///
/// # Errors
///
/// Returns [`SourceError::MissingFilterField`] if no row carries the
/// filter field, even case-insensitively.
pub fn apply(
    label: &str,
    rule: &FilterRule,
    rows: Vec<RawRow>,
) -> Result<Vec<RawRow>, SourceError> {
    if rows.is_empty() {
        return Ok(rows);
    }

    let field = {
        let columns: BTreeSet<&str> = rows
            .iter()
            .flat_map(|row| row.fields.keys().map(String::as_str))
            .collect();

        match resolve_field(&rule.field, columns.iter().copied()) {
            Some(field) => field,
            None => {
                return Err(SourceError::MissingFilterField {
                    field: rule.field.clone(),
                    available: columns.into_iter().map(str::to_string).collect(),
                });
            }
        }
    };

    if field != rule.field {
        log::info!(
            "[{label}] Using case-insensitive match '{field}' for filter field '{}'",
            rule.field
        );
    }

    let before = rows.len();
    let kept: Vec<RawRow> = rows
        .into_iter()
        .filter(|row| {
            row.fields
                .get(&field)
                .is_some_and(|value| rule.matches(&value_to_string(value)))
        })
        .collect();

    log::info!("[{label}] Filter {rule}: kept {} of {before} rows", kept.len());
    if kept.is_empty() {
        log::warn!("[{label}] No rows match filter {rule}");
    }

    Ok(kept)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::row;
    use serde_json::json;
    use tw_parking_source_models::FilterMatch;

    fn pktype_rule() -> FilterRule {
        FilterRule {
            field: "pktype".to_string(),
            matcher: FilterMatch::Equals("03".to_string()),
        }
    }

    #[test]
    fn resolves_exact_before_case_insensitive() {
        let columns = ["PKTYPE", "pktype"];
        assert_eq!(
            resolve_field("pktype", columns.iter().copied()).as_deref(),
            Some("pktype")
        );
        let columns = ["PKTYPE", "name"];
        assert_eq!(
            resolve_field("pktype", columns.iter().copied()).as_deref(),
            Some("PKTYPE")
        );
        assert_eq!(resolve_field("pktype", ["name"].iter().copied()), None);
    }

    #[test]
    fn keeps_only_equal_values() {
        let rows = vec![
            row(&json!({"pktype": "03", "id": 1})),
            row(&json!({"pktype": "01", "id": 2})),
            row(&json!({"pktype": "03", "id": 3})),
        ];
        let kept = apply("test", &pktype_rule(), rows).unwrap();
        let ids: Vec<_> = kept.iter().map(|r| r.fields["id"].clone()).collect();
        assert_eq!(ids, vec![json!(1), json!(3)]);
    }

    #[test]
    fn falls_back_to_case_insensitive_column() {
        let rows = vec![row(&json!({"PKTYPE": "03"})), row(&json!({"PKTYPE": "02"}))];
        let kept = apply("test", &pktype_rule(), rows).unwrap();
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn missing_field_is_an_error() {
        let rows = vec![row(&json!({"kind": "03"}))];
        let err = apply("test", &pktype_rule(), rows).unwrap_err();
        match err {
            SourceError::MissingFilterField { field, available } => {
                assert_eq!(field, "pktype");
                assert_eq!(available, vec!["kind".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn contains_filter_uses_substring() {
        let rule = FilterRule {
            field: "charged".to_string(),
            matcher: FilterMatch::Contains("身汽".to_string()),
        };
        let rows = vec![
            row(&json!({"charged": "身汽(免費)"})),
            row(&json!({"charged": "汽車"})),
            row(&json!({"other": "x"})),
        ];
        assert_eq!(apply("test", &rule, rows).unwrap().len(), 1);
    }

    #[test]
    fn empty_input_passes() {
        assert!(apply("test", &pktype_rule(), Vec::new()).unwrap().is_empty());
    }
}
