//! federation::references
//!
//! Resolving cross-domain references to the concepts they point at.
//!
//! # Design
//!
//! A reference `https://alice.com/redstring/vocab/references:bob.net:x`
//! resolves to the node `https://bob.net/redstring/vocab/x`. Resolution
//! consults the federation directory first: targets that recently failed
//! are refused without I/O until their backoff passes, a successful fetch
//! restores them, and with `require_federation` the target must
//! be listed in the source's discovery document.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tracing::{debug, warn};

use super::directory::FederationDirectory;
use crate::core::{CrossDomainReference, Domain, Slug};
use crate::graph::{vocab, Node, Term};
use crate::layout::turtle;

const USER_AGENT_VALUE: &str = concat!("redstring-pod/", env!("CARGO_PKG_VERSION"));

/// Errors from resolving a reference.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolveError {
    /// The target domain is backing off after failures.
    #[error("{domain} is unreachable")]
    Unreachable { domain: String },

    /// The source does not federate with the target.
    #[error("{source_domain} does not federate with {target}")]
    NotFederated {
        source_domain: String,
        target: String,
    },

    /// The target has no such concept.
    #[error("concept not found: {uri}")]
    ConceptNotFound { uri: String },

    /// The concept could not be fetched or parsed.
    #[error("failed to fetch concept: {0}")]
    Fetch(String),
}

/// Where concept documents come from.
#[async_trait]
pub trait ConceptSource: Send + Sync {
    /// Turtle describing `concept` in `target`'s vocabulary, or `None`.
    async fn fetch_concept(
        &self,
        target: &Domain,
        concept: &Slug,
    ) -> Result<Option<String>, ResolveError>;
}

/// Fetches concepts by dereferencing their URIs over HTTPS.
#[derive(Debug, Clone)]
pub struct HttpConceptSource {
    client: Client,
    /// URL template with `{domain}` and `{concept}`; defaults to the concept URI
    template: String,
}

impl HttpConceptSource {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| Client::new()),
            template: "https://{domain}/redstring/vocab/{concept}".to_string(),
        }
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    fn url_for(&self, target: &Domain, concept: &Slug) -> String {
        self.template
            .replace("{domain}", target.as_str())
            .replace("{concept}", concept.as_str())
    }
}

#[async_trait]
impl ConceptSource for HttpConceptSource {
    async fn fetch_concept(
        &self,
        target: &Domain,
        concept: &Slug,
    ) -> Result<Option<String>, ResolveError> {
        let response = self
            .client
            .get(self.url_for(target, concept))
            .header(ACCEPT, "text/turtle")
            .header(USER_AGENT, USER_AGENT_VALUE)
            .send()
            .await
            .map_err(|e| ResolveError::Fetch(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND | StatusCode::GONE => Ok(None),
            status if status.is_success() => response
                .text()
                .await
                .map(Some)
                .map_err(|e| ResolveError::Fetch(e.to_string())),
            status => Err(ResolveError::Fetch(format!("HTTP {}", status))),
        }
    }
}

/// Resolves cross-domain references through the federation directory.
pub struct ReferenceResolver {
    directory: Arc<FederationDirectory>,
    source: Arc<dyn ConceptSource>,
    require_federation: bool,
}

impl ReferenceResolver {
    pub fn new(directory: Arc<FederationDirectory>, source: Arc<dyn ConceptSource>) -> Self {
        Self {
            directory,
            source,
            require_federation: false,
        }
    }

    /// Only resolve targets listed in the source's discovery document.
    pub fn require_federation(mut self, required: bool) -> Self {
        self.require_federation = required;
        self
    }

    /// Resolve a reference URI.
    pub async fn resolve_uri(&self, uri: &str) -> Result<Node, ResolveError> {
        let reference = CrossDomainReference::from_reference_uri(uri)
            .map_err(|e| ResolveError::Fetch(e.to_string()))?;
        self.resolve(&reference).await
    }

    /// Resolve a reference to the target node.
    pub async fn resolve(&self, reference: &CrossDomainReference) -> Result<Node, ResolveError> {
        let target = &reference.target;
        if !self.directory.is_reachable(target) && !self.directory.retry_due(target) {
            return Err(ResolveError::Unreachable {
                domain: target.to_string(),
            });
        }

        if self.require_federation {
            let peers = self
                .directory
                .discover_peers(&reference.source)
                .await
                .map_err(|e| ResolveError::Fetch(e.to_string()))?;
            if !peers.contains(target) {
                return Err(ResolveError::NotFederated {
                    source_domain: reference.source.to_string(),
                    target: target.to_string(),
                });
            }
        }

        let uri = reference.target_uri();
        let body = match self.source.fetch_concept(target, &reference.concept).await {
            Ok(Some(body)) => {
                self.directory.mark_reachable(target);
                body
            }
            Ok(None) => {
                self.directory.mark_reachable(target);
                return Err(ResolveError::ConceptNotFound { uri });
            }
            Err(err) => {
                warn!(domain = %target, error = %err, "concept fetch failed");
                self.directory.mark_unreachable(target, err.to_string());
                return Err(err);
            }
        };

        let triples = turtle::parse(&body).map_err(|e| ResolveError::Fetch(e.to_string()))?;
        let subject = Term::iri(uri.clone());
        let literal = |predicate: &str| {
            triples
                .iter()
                .filter(|t| t.subject == subject && t.predicate == predicate)
                .find_map(|t| t.object.as_literal().map(str::to_string))
        };

        let name = literal(vocab::SCHEMA_NAME).or_else(|| literal(vocab::RDFS_LABEL));
        let Some(name) = name.or_else(|| {
            triples
                .iter()
                .any(|t| t.subject == subject)
                .then(|| reference.concept.to_string())
        }) else {
            return Err(ResolveError::ConceptNotFound { uri });
        };

        debug!(reference = %reference.reference_uri(), target = %uri, "resolved reference");
        Ok(Node {
            id: uri,
            name,
            description: literal(vocab::SCHEMA_DESCRIPTION),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::federation::discovery::{DiscoveryDocument, DiscoverySource, FederationError};
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct Peers(Vec<&'static str>);

    #[async_trait]
    impl DiscoverySource for Peers {
        async fn fetch(&self, _domain: &Domain) -> Result<DiscoveryDocument, FederationError> {
            Ok(DiscoveryDocument {
                domains: self.0.iter().map(|s| s.to_string()).collect(),
            })
        }
    }

    #[derive(Default)]
    struct Concepts {
        docs: Mutex<HashMap<String, Result<Option<String>, ResolveError>>>,
    }

    impl Concepts {
        fn with(uri_doc: &[(&str, Result<Option<String>, ResolveError>)]) -> Arc<Self> {
            let concepts = Self::default();
            for (key, doc) in uri_doc {
                concepts
                    .docs
                    .lock()
                    .unwrap()
                    .insert(key.to_string(), doc.clone());
            }
            Arc::new(concepts)
        }
    }

    #[async_trait]
    impl ConceptSource for Concepts {
        async fn fetch_concept(
            &self,
            target: &Domain,
            concept: &Slug,
        ) -> Result<Option<String>, ResolveError> {
            let key = format!("{}/{}", target, concept);
            self.docs
                .lock()
                .unwrap()
                .get(&key)
                .cloned()
                .unwrap_or(Ok(None))
        }
    }

    const CLIMATE: &str = r#"
@prefix schema: <http://schema.org/> .
<https://bob.net/redstring/vocab/climatepolicy> a <https://bob.net/redstring/vocab/Node> ;
    schema:name "Climate Policy" ;
    schema:description "Policies addressing climate change" .
"#;

    fn directory(peers: Vec<&'static str>) -> Arc<FederationDirectory> {
        Arc::new(FederationDirectory::new(
            Arc::new(Peers(peers)),
            Duration::from_secs(300),
        ))
    }

    fn reference() -> CrossDomainReference {
        CrossDomainReference::new("alice.com", "bob.net", "ClimatePolicy").unwrap()
    }

    #[tokio::test]
    async fn resolves_target_node() {
        let concepts = Concepts::with(&[("bob.net/climatepolicy", Ok(Some(CLIMATE.to_string())))]);
        let resolver = ReferenceResolver::new(directory(vec!["bob.net"]), concepts);

        let node = resolver.resolve(&reference()).await.unwrap();
        assert_eq!(node.id, "https://bob.net/redstring/vocab/climatepolicy");
        assert_eq!(node.name, "Climate Policy");
        assert_eq!(
            node.description.as_deref(),
            Some("Policies addressing climate change")
        );
    }

    #[tokio::test]
    async fn resolves_by_reference_uri() {
        let concepts = Concepts::with(&[("bob.net/climatepolicy", Ok(Some(CLIMATE.to_string())))]);
        let resolver = ReferenceResolver::new(directory(vec![]), concepts);
        let node = resolver
            .resolve_uri("https://alice.com/redstring/vocab/references:bob.net:climatepolicy")
            .await
            .unwrap();
        assert_eq!(node.name, "Climate Policy");
    }

    #[tokio::test]
    async fn missing_concept() {
        let resolver = ReferenceResolver::new(directory(vec![]), Concepts::with(&[]));
        assert_eq!(
            resolver.resolve(&reference()).await.unwrap_err(),
            ResolveError::ConceptNotFound {
                uri: "https://bob.net/redstring/vocab/climatepolicy".into()
            }
        );
    }

    #[tokio::test]
    async fn requires_federation_when_asked() {
        let concepts = Concepts::with(&[("bob.net/climatepolicy", Ok(Some(CLIMATE.to_string())))]);
        let resolver =
            ReferenceResolver::new(directory(vec!["carol.org"]), concepts).require_federation(true);
        assert!(matches!(
            resolver.resolve(&reference()).await,
            Err(ResolveError::NotFederated { .. })
        ));
    }

    #[tokio::test]
    async fn fetch_failure_marks_target_unreachable() {
        let concepts = Concepts::with(&[(
            "bob.net/climatepolicy",
            Err(ResolveError::Fetch("connection reset".into())),
        )]);
        let dir = directory(vec![]);
        let resolver = ReferenceResolver::new(dir.clone(), concepts);

        assert!(matches!(
            resolver.resolve(&reference()).await,
            Err(ResolveError::Fetch(_))
        ));
        assert!(!dir.is_reachable(&Domain::normalize("bob.net").unwrap()));
        assert!(matches!(
            resolver.resolve(&reference()).await,
            Err(ResolveError::Unreachable { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn successful_retry_restores_target() {
        let concepts = Concepts::with(&[(
            "bob.net/climatepolicy",
            Err(ResolveError::Fetch("connection reset".into())),
        )]);
        let dir = directory(vec![]);
        let resolver = ReferenceResolver::new(dir.clone(), concepts.clone());
        let bob = Domain::normalize("bob.net").unwrap();
        assert!(resolver.resolve(&reference()).await.is_err());

        concepts.docs.lock().unwrap().insert(
            "bob.net/climatepolicy".to_string(),
            Ok(Some(CLIMATE.to_string())),
        );
        tokio::time::advance(dir.backoff(1)).await;
        assert!(!dir.is_reachable(&bob));

        let node = resolver.resolve(&reference()).await.unwrap();
        assert_eq!(node.name, "Climate Policy");
        assert!(dir.is_reachable(&bob));
    }
}
