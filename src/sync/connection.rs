//! sync::connection
//!
//! An authenticated provider bound to one semantic space.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::core::config::{ProviderConfig, ProviderRole};
use crate::provider::{
    create_provider, credentials_for, Credentials, ProviderError, SemanticProvider, Session,
    SpaceRef,
};

/// A provider the engine can read from and flush to.
#[derive(Clone)]
pub struct ProviderConnection {
    /// Configured id, unique per pod
    pub id: String,
    pub role: ProviderRole,
    pub provider: Arc<dyn SemanticProvider>,
    pub space: SpaceRef,
    pub session: Session,
}

impl fmt::Debug for ProviderConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConnection")
            .field("id", &self.id)
            .field("role", &self.role)
            .field("provider", &self.provider.name())
            .field("space", &self.space)
            .finish()
    }
}

impl ProviderConnection {
    /// Authenticate and create, or adopt, the space `space_name`.
    pub async fn connect(
        id: impl Into<String>,
        role: ProviderRole,
        provider: Arc<dyn SemanticProvider>,
        credentials: &Credentials,
        space_name: &str,
    ) -> Result<Self, ProviderError> {
        let id = id.into();
        let session = provider.authenticate(credentials).await?;
        let space = provider.create_semantic_space(space_name).await?;
        info!(
            provider = %id,
            kind = provider.name(),
            mechanism = credentials.mechanism(),
            space = %space,
            "connected"
        );
        Ok(Self {
            id,
            role,
            provider,
            space,
            session,
        })
    }

    /// Build, authenticate and connect a configured provider.
    pub async fn from_config(
        config: &ProviderConfig,
        space_name: &str,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let provider = create_provider(config, timeout)?;
        let credentials = credentials_for(config);
        Self::connect(&config.id, config.role, provider, &credentials, space_name).await
    }

    /// Whether flushes go to this connection.
    pub fn is_flush_target(&self) -> bool {
        self.role != ProviderRole::Standby
    }
}
