//! cli::commands
//!
//! Command dispatch and handlers.
//!
//! # Async Commands
//!
//! Verification, peer discovery and every provider command involve network
//! I/O. Their handlers are synchronous wrappers that build a Tokio runtime
//! and block on the async implementation.

mod identity;
mod peers;
mod pod;

pub use identity::{context, reference, uris, verify};
pub use peers::peers;
pub use pod::{export, migrate, status};

use crate::cli::args::Command;
use crate::cli::Context;
use anyhow::Result;

/// Dispatch a command to its handler.
pub fn dispatch(command: Command, ctx: &Context) -> Result<()> {
    match command {
        Command::Uris { domain } => uris(ctx, &domain),
        Command::Ref {
            source,
            target,
            concept,
        } => reference(ctx, &source, &target, &concept),
        Command::Context { domain } => context(ctx, &domain),
        Command::Verify { domain, method } => verify(ctx, &domain, method),
        Command::Peers { domain, with } => peers(ctx, &domain, &with),
        Command::Export { provider, out } => export(ctx, provider.as_deref(), out.as_deref()),
        Command::Migrate { to } => migrate(ctx, &to),
        Command::Status => status(ctx),
    }
}
