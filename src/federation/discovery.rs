//! federation::discovery
//!
//! The well-known discovery document and how it is fetched.
//!
//! A pod lists the domains it federates with at
//! `https://{domain}/.well-known/redstring-discovery`:
//!
//! ```json
//! {"domains": ["bob.net", "carol.org"]}
//! ```

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::core::Domain;

/// Default discovery URL template; `{domain}` is replaced.
pub const DEFAULT_DISCOVERY_TEMPLATE: &str = "https://{domain}/.well-known/redstring-discovery";

const USER_AGENT_VALUE: &str = concat!("redstring-pod/", env!("CARGO_PKG_VERSION"));

/// Errors from federation lookups.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FederationError {
    /// The discovery document could not be fetched.
    #[error("discovery unavailable for {domain}: {reason}")]
    DiscoveryUnavailable { domain: String, reason: String },

    /// The domain failed recently and is backing off.
    #[error("{domain} is unreachable (next retry in {retry_in:?})")]
    Unreachable { domain: String, retry_in: Duration },

    /// The document was fetched but is not a discovery document.
    #[error("invalid discovery document from {domain}: {reason}")]
    InvalidDocument { domain: String, reason: String },
}

/// A domain's published list of federated peers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryDocument {
    #[serde(default)]
    pub domains: Vec<String>,
}

impl DiscoveryDocument {
    /// Build a document listing `peers`.
    pub fn for_peers<'a>(peers: impl IntoIterator<Item = &'a Domain>) -> Self {
        Self {
            domains: peers.into_iter().map(|d| d.to_string()).collect(),
        }
    }

    /// Parse a document body.
    pub fn parse(domain: &Domain, body: &str) -> Result<Self, FederationError> {
        serde_json::from_str(body).map_err(|e| FederationError::InvalidDocument {
            domain: domain.to_string(),
            reason: e.to_string(),
        })
    }

    /// Normalized peers. Malformed entries are skipped.
    pub fn peers(&self) -> BTreeSet<Domain> {
        self.domains
            .iter()
            .filter_map(|raw| match Domain::normalize(raw) {
                Ok(d) => Some(d),
                Err(e) => {
                    warn!(entry = %raw, error = %e, "skipping malformed discovery entry");
                    None
                }
            })
            .collect()
    }
}

/// Where discovery documents come from.
#[async_trait]
pub trait DiscoverySource: Send + Sync {
    /// Fetch the discovery document of `domain`.
    async fn fetch(&self, domain: &Domain) -> Result<DiscoveryDocument, FederationError>;
}

/// Discovery over HTTPS.
#[derive(Debug, Clone)]
pub struct HttpDiscovery {
    client: Client,
    template: String,
}

impl HttpDiscovery {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| Client::new()),
            template: DEFAULT_DISCOVERY_TEMPLATE.to_string(),
        }
    }

    /// Fetch from `template` instead, with `{domain}` substituted.
    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    pub fn url_for(&self, domain: &Domain) -> String {
        self.template.replace("{domain}", domain.as_str())
    }
}

#[async_trait]
impl DiscoverySource for HttpDiscovery {
    async fn fetch(&self, domain: &Domain) -> Result<DiscoveryDocument, FederationError> {
        let unavailable = |reason: String| FederationError::DiscoveryUnavailable {
            domain: domain.to_string(),
            reason,
        };

        let response = self
            .client
            .get(self.url_for(domain))
            .header(ACCEPT, "application/json")
            .header(USER_AGENT, USER_AGENT_VALUE)
            .send()
            .await
            .map_err(|e| unavailable(e.to_string()))?;

        let status = response.status();
        // No document: the domain federates with nobody
        if status == StatusCode::NOT_FOUND {
            return Ok(DiscoveryDocument::default());
        }
        if !status.is_success() {
            return Err(unavailable(format!("HTTP {}", status)));
        }
        let body = response.text().await.map_err(|e| unavailable(e.to_string()))?;
        DiscoveryDocument::parse(domain, &body)
    }
}
