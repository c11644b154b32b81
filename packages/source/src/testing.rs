//! Test doubles shared by the handler tests.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::cache::PayloadCache;
use crate::http::HttpClient;
use crate::progress::null_progress;
use crate::{HandlerContext, RawRow, SourceError};

/// Builds a field-located row from a JSON object literal.
pub fn row(value: &serde_json::Value) -> RawRow {
    RawRow::from_fields(value.as_object().cloned().unwrap_or_default())
}

/// Canned response for one URL.
#[derive(Debug, Clone)]
pub enum FakeResponse {
    Body(Vec<u8>),
    Fail,
}

/// [`HttpClient`] serving canned responses by exact URL.
#[derive(Debug, Default)]
pub struct FakeHttp {
    responses: Mutex<BTreeMap<String, FakeResponse>>,
    requests: Mutex<Vec<String>>,
}

impl FakeHttp {
    pub fn with_text(self, url: &str, body: &str) -> Self {
        self.with_bytes(url, body.as_bytes().to_vec())
    }

    pub fn with_bytes(self, url: &str, body: Vec<u8>) -> Self {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), FakeResponse::Body(body));
        self
    }

    pub fn with_failure(self, url: &str) -> Self {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), FakeResponse::Fail);
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    fn respond(&self, url: &str) -> Result<Vec<u8>, SourceError> {
        self.requests.lock().unwrap().push(url.to_string());
        match self.responses.lock().unwrap().get(url) {
            Some(FakeResponse::Body(body)) => Ok(body.clone()),
            Some(FakeResponse::Fail) => Err(SourceError::Request {
                url: url.to_string(),
                message: "connection reset".to_string(),
            }),
            None => Err(SourceError::Request {
                url: url.to_string(),
                message: "404 Not Found".to_string(),
            }),
        }
    }
}

#[async_trait]
impl HttpClient for FakeHttp {
    async fn get_text(&self, url: &str, _timeout: Duration) -> Result<String, SourceError> {
        let body = self.respond(url)?;
        String::from_utf8(body).map_err(|e| SourceError::UnexpectedResponse {
            message: e.to_string(),
        })
    }

    async fn get_bytes(&self, url: &str, _timeout: Duration) -> Result<Vec<u8>, SourceError> {
        self.respond(url)
    }
}

/// Context with the given fake client and no cache.
pub fn context(http: &Arc<FakeHttp>) -> HandlerContext {
    HandlerContext {
        http: http.clone(),
        cache: PayloadCache::disabled(),
        progress: null_progress(),
    }
}
