//! identity::resolver
//!
//! Narrow interfaces to the outside world used by verification: DNS TXT
//! lookup and well-known file fetch, with reqwest-backed implementations.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::provider::http::client_with_timeout;

pub use crate::core::config::DEFAULT_DOH_ENDPOINT;

const TXT: u16 = 16;

const USER_AGENT_VALUE: &str = concat!("redstring-pod/", env!("CARGO_PKG_VERSION"));

/// A lookup that could not complete.
///
/// Absence of data is not an error; resolvers return an empty result.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("lookup failed: {0}")]
pub struct LookupError(pub String);

/// Read-only DNS TXT lookup.
#[async_trait]
pub trait TxtResolver: Send + Sync {
    /// TXT record values for `name`. NXDOMAIN yields an empty list.
    async fn query_txt(&self, name: &str) -> Result<Vec<String>, LookupError>;
}

/// Fetches well-known documents.
#[async_trait]
pub trait WellKnownFetcher: Send + Sync {
    /// Body of `url`, or `None` when the server says it does not exist.
    async fn fetch(&self, url: &str) -> Result<Option<String>, LookupError>;
}

/// TXT lookup over the DNS-over-HTTPS JSON API.
#[derive(Debug, Clone)]
pub struct DohResolver {
    client: Client,
    endpoint: String,
}

impl DohResolver {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: client_with_timeout(timeout),
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[derive(Debug, Deserialize)]
struct DohResponse {
    #[serde(rename = "Status")]
    status: u32,
    #[serde(rename = "Answer", default)]
    answer: Vec<DohAnswer>,
}

#[derive(Debug, Deserialize)]
struct DohAnswer {
    #[serde(rename = "type")]
    kind: u16,
    data: String,
}

#[async_trait]
impl TxtResolver for DohResolver {
    async fn query_txt(&self, name: &str) -> Result<Vec<String>, LookupError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("name", name), ("type", "TXT")])
            .header(ACCEPT, "application/dns-json")
            .header(USER_AGENT, USER_AGENT_VALUE)
            .send()
            .await
            .map_err(|e| LookupError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LookupError(format!("DoH endpoint returned {}", status)));
        }
        let body: DohResponse = response
            .json()
            .await
            .map_err(|e| LookupError(format!("invalid DoH response: {}", e)))?;

        match body.status {
            0 => {}
            // NXDOMAIN
            3 => return Ok(Vec::new()),
            rcode => return Err(LookupError(format!("DNS rcode {}", rcode))),
        }
        let records: Vec<String> = body
            .answer
            .into_iter()
            .filter(|a| a.kind == TXT)
            .map(|a| decode_txt_data(&a.data))
            .collect();
        debug!(name, count = records.len(), "TXT lookup");
        Ok(records)
    }
}

/// Decode presentation-format TXT data.
///
/// Quoted character-strings are unescaped and concatenated; unquoted data
/// is returned unchanged.
pub fn decode_txt_data(data: &str) -> String {
    if !data.starts_with('"') {
        return data.to_string();
    }

    let mut out = String::new();
    let mut chars = data.chars();
    let mut in_quotes = false;
    while let Some(c) = chars.next() {
        match c {
            '"' => in_quotes = !in_quotes,
            '\\' if in_quotes => {
                if let Some(escaped) = chars.next() {
                    out.push(escaped);
                }
            }
            _ if in_quotes => out.push(c),
            _ => {}
        }
    }
    out
}

/// Well-known fetch over HTTPS.
#[derive(Debug, Clone)]
pub struct HttpWellKnown {
    client: Client,
}

impl HttpWellKnown {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: client_with_timeout(timeout),
        }
    }
}

#[async_trait]
impl WellKnownFetcher for HttpWellKnown {
    async fn fetch(&self, url: &str) -> Result<Option<String>, LookupError> {
        let response = self
            .client
            .get(url)
            .header(USER_AGENT, USER_AGENT_VALUE)
            .send()
            .await
            .map_err(|e| LookupError(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(LookupError(format!("{} returned {}", url, status)));
        }
        if !status.is_success() {
            debug!(url, status = status.as_u16(), "well-known document absent");
            return Ok(None);
        }
        response
            .text()
            .await
            .map(Some)
            .map_err(|e| LookupError(e.to_string()))
    }
}
