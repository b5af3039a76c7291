//! HTTP client abstraction for testability.
//!
//! Adapters describe a request as plain data and hand it to an [`HttpClient`];
//! tests substitute [`tests::MockHttpClient`] to replay canned payloads.

use std::{fmt::Debug, time::Duration};

use async_trait::async_trait;
use reqwest::Client;

use crate::error::ProviderError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub json: Option<serde_json::Value>,
    pub timeout: Duration,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
            json: None,
            timeout,
        }
    }

    pub fn post_json(url: impl Into<String>, body: serde_json::Value, timeout: Duration) -> Self {
        Self { method: Method::Post, json: Some(body), ..Self::get(url, timeout) }
    }

    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_owned(), value.to_string()));
        self
    }

    pub fn header(mut self, key: &str, value: impl Into<String>) -> Self {
        self.headers.push((key.to_owned(), value.into()));
        self
    }

    /// Value of a query parameter, if set.
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self { status: 200, body: body.into() }
    }

    /// Map non-2xx statuses onto the provider error taxonomy.
    pub fn error_for_status(self, provider: &str) -> Result<Self, ProviderError> {
        match self.status {
            200..=299 => Ok(self),
            401 | 403 => Err(ProviderError::Unauthorized(format!(
                "{provider} returned HTTP {}: {}",
                self.status,
                truncate_body(&self.body)
            ))),
            status => Err(ProviderError::Unreachable(format!(
                "{provider} returned HTTP {status}: {}",
                truncate_body(&self.body)
            ))),
        }
    }
}

/// Performs one HTTP round trip.
///
/// Transport failures (DNS, connect, timeout) are reported as
/// [`ProviderError::Unreachable`]; any HTTP status is returned as a response.
#[async_trait]
pub trait HttpClient: Send + Sync + Debug {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ProviderError>;
}

/// Real HTTP client implementation using reqwest.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    http: Client,
}

impl ReqwestClient {
    pub fn new(user_agent: &str) -> Result<Self, ProviderError> {
        let http = Client::builder().user_agent(user_agent).build().map_err(|e| {
            ProviderError::Unreachable(format!("Failed to create HTTP client: {e}"))
        })?;

        Ok(Self { http })
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ProviderError> {
        let mut builder = match request.method {
            Method::Get => self.http.get(&request.url),
            Method::Post => self.http.post(&request.url),
        };

        builder = builder.query(&request.query).timeout(request.timeout);
        for (key, value) in &request.headers {
            builder = builder.header(key, value);
        }
        if let Some(body) = &request.json {
            builder = builder.json(body);
        }

        let res = builder.send().await.map_err(|e| {
            ProviderError::Unreachable(format!("Request to {} failed: {e}", request.url))
        })?;

        let status = res.status().as_u16();
        let body = res.text().await.map_err(|e| {
            ProviderError::Unreachable(format!("Failed to read response from {}: {e}", request.url))
        })?;

        Ok(HttpResponse { status, body })
    }
}

pub(crate) fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.len() > MAX {
        let mut end = MAX;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &body[..end])
    } else {
        body.to_string()
    }
}
