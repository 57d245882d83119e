//! cli::commands::pod
//!
//! Commands that talk to the pod's configured providers.
//!
//! # Example
//!
//! ```bash
//! redpod --pod ~/pods/alice status
//! redpod --pod ~/pods/alice export --out alice.nq
//! redpod --pod ~/pods/alice migrate --to gitea
//! ```

use std::path::Path;

use anyhow::{anyhow, bail, Context as _, Result};
use serde_json::json;
use tracing::info;

use crate::cli::Context;
use crate::core::config::{Config, ProviderRole};
use crate::sync::{ProviderConnection, SyncEngine};

/// Write the pod's N-Quads export to `out`, or stdout.
pub fn export(ctx: &Context, provider: Option<&str>, out: Option<&Path>) -> Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(export_async(ctx, provider, out))
}

async fn export_async(ctx: &Context, provider: Option<&str>, out: Option<&Path>) -> Result<()> {
    let config = ctx.config()?;
    let provider_config = match provider {
        Some(id) => config
            .providers()
            .iter()
            .find(|p| p.id == id)
            .ok_or_else(|| anyhow!("No provider with id '{}'", id))?,
        None => config
            .primary_provider()
            .ok_or_else(|| anyhow!("No primary provider configured"))?,
    };

    let conn =
        ProviderConnection::from_config(provider_config, config.space(), config.provider_timeout())
            .await
            .with_context(|| format!("Failed to connect to '{}'", provider_config.id))?;
    let stream = conn
        .provider
        .export_full_graph(&conn.space)
        .await
        .with_context(|| format!("Export from '{}' failed", conn.id))?;

    match out {
        Some(path) => {
            std::fs::write(path, &stream)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!(provider = %conn.id, path = %path.display(), bytes = stream.len(), "exported");
            if ctx.json {
                ctx.print_json(&json!({
                    "provider": conn.id,
                    "path": path,
                    "bytes": stream.len(),
                }))?;
            }
        }
        None => {
            use std::io::Write;
            std::io::stdout().write_all(&stream)?;
        }
    }
    Ok(())
}

/// Migrate the pod to provider `to` and record it as primary.
pub fn migrate(ctx: &Context, to: &str) -> Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(migrate_async(ctx, to))
}

async fn migrate_async(ctx: &Context, to: &str) -> Result<()> {
    let root = ctx.pod_root()?;
    let config = ctx.config()?;
    let mut pod = config
        .pod
        .clone()
        .ok_or_else(|| anyhow!("No pod configuration at {}", root.display()))?;
    if !pod.providers.iter().any(|p| p.id == to) {
        bail!("No provider with id '{}'", to);
    }

    let engine = SyncEngine::from_config(&config).await?;
    let report = engine.migrate(to).await?;

    for provider in &mut pod.providers {
        if provider.id == report.to {
            provider.role = ProviderRole::Primary;
        } else if provider.id == report.from {
            provider.role = ProviderRole::Standby;
        }
    }
    let path = Config::write_pod(&root, &pod)?;
    info!(path = %path.display(), "pod configuration updated");

    if ctx.json {
        return ctx.print_json(&report);
    }
    println!("Migrated {} -> {}", report.from, report.to);
    if let Some(head) = &report.head {
        println!("head: {}", head.short());
    }
    println!("{} is now a standby and keeps its data", report.from);
    Ok(())
}

/// Show each provider's role, head and last synced sequence.
pub fn status(ctx: &Context) -> Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(status_async(ctx))
}

async fn status_async(ctx: &Context) -> Result<()> {
    let config = ctx.config()?;
    if config.providers().is_empty() {
        bail!("No providers configured");
    }
    let engine = SyncEngine::from_config(&config).await?;
    let snapshot = engine.snapshot();
    let replicas = engine.status();
    let history = engine.history();
    let last_synced = |id: &str| {
        history
            .iter()
            .rev()
            .find(|r| r.provider == id && r.is_synced())
            .map(|r| r.at)
    };

    if ctx.json {
        let providers: Vec<_> = replicas
            .iter()
            .map(|r| json!({ "status": r, "last_synced_at": last_synced(&r.id) }))
            .collect();
        return ctx.print_json(&json!({
            "space": snapshot.space_iri(),
            "owner": snapshot.owner(),
            "entities": snapshot.len(),
            "providers": providers,
        }));
    }

    println!("space     {}", snapshot.space_iri());
    println!("entities  {}", snapshot.len());
    println!();
    for r in &replicas {
        let head = r.head.as_ref().map(|h| h.short()).unwrap_or("-");
        let role = match r.role {
            ProviderRole::Primary => "primary",
            ProviderRole::Replica => "replica",
            ProviderRole::Standby => "standby",
        };
        print!("{:<12} {:<10} {:<8} {:<8}", r.id, r.kind, role, head);
        match last_synced(&r.id) {
            Some(at) => println!(" last sync {}", at.to_rfc3339()),
            None => println!(" never synced"),
        }
    }
    Ok(())
}
