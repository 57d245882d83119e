//! cli::commands::peers
//!
//! Federation peer discovery.

use anyhow::Result;
use serde_json::json;

use crate::cli::Context;
use crate::core::Domain;
use crate::federation::FederationDirectory;

/// Print the peers of `raw`, merged with the directories of `with`.
pub fn peers(ctx: &Context, raw: &str, with: &[String]) -> Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(peers_async(ctx, raw, with))
}

async fn peers_async(ctx: &Context, raw: &str, with: &[String]) -> Result<()> {
    let domain = Domain::normalize(raw)?;
    let others = with
        .iter()
        .map(|d| Domain::normalize(d))
        .collect::<Result<Vec<_>, _>>()?;
    let config = ctx.config()?;
    let directory = FederationDirectory::from_config(&config);

    let peers = if others.is_empty() {
        directory.discover_peers(&domain).await?
    } else {
        directory.merge_directories(&domain, &others).await
    };

    let mut unreachable = Vec::new();
    for d in std::iter::once(&domain).chain(others.iter()) {
        if let Some(reason) = directory.unreachable_reason(d) {
            unreachable.push(json!({ "domain": d, "reason": reason }));
        }
    }

    if ctx.json {
        return ctx.print_json(&json!({
            "domain": domain,
            "peers": peers,
            "unreachable": unreachable,
        }));
    }
    if peers.is_empty() {
        println!("{} has no federation peers", domain);
    }
    for peer in &peers {
        println!("{}", peer);
    }
    for entry in &unreachable {
        eprintln!(
            "warning: {} unreachable: {}",
            entry["domain"].as_str().unwrap_or_default(),
            entry["reason"].as_str().unwrap_or_default()
        );
    }
    Ok(())
}
