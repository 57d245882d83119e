//! provider
//!
//! Storage providers: uniform access to Git-hosting backends.
//!
//! # Modules
//!
//! - [`traits`] - The `SemanticProvider` contract and its types
//! - [`github`] - GitHub via the Git Data API
//! - [`gitea`] - Self-hosted Gitea / Forgejo
//! - [`local_git`] - Bare repositories on disk
//! - [`mock`] - In-memory provider for tests
//!
//! Use [`create_provider`] to build a provider from configuration instead
//! of naming a backend directly.

mod factory;
pub mod gitea;
pub mod github;
pub(crate) mod http;
pub mod local_git;
pub mod mock;
mod traits;

pub use factory::{create_provider, credentials_for, valid_provider_names, ProviderKind};
pub use traits::*;
