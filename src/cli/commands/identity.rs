//! cli::commands::identity
//!
//! Domain URIs, cross-domain references, JSON-LD context and verification.
//!
//! # Example
//!
//! ```bash
//! redpod uris https://www.Alice.com/
//! redpod ref alice.com bob.org "Climate Policy"
//! redpod verify alice.com --method well-known-file
//! ```

use anyhow::Result;
use serde_json::json;

use crate::cli::Context;
use crate::core::{CrossDomainReference, Domain};
use crate::graph::jsonld_context;
use crate::identity::{DomainVerifier, VerificationMethod};

/// Print the URI set of a domain.
pub fn uris(ctx: &Context, raw: &str) -> Result<()> {
    let domain = Domain::normalize(raw)?;
    let uris = domain.uris();
    if ctx.json {
        return ctx.print_json(&json!({ "domain": domain, "uris": uris }));
    }
    println!("domain        {}", domain);
    println!("vocab         {}", uris.vocab);
    println!("spaces        {}", uris.spaces);
    println!("webid         {}", uris.web_id);
    println!("pod           {}", uris.pod);
    println!("discovery     {}", uris.discovery);
    println!("verification  {}", uris.verification);
    Ok(())
}

/// Print a reference URI and the concept it points at.
pub fn reference(ctx: &Context, source: &str, target: &str, concept: &str) -> Result<()> {
    let reference = CrossDomainReference::new(source, target, concept)?;
    if ctx.json {
        return ctx.print_json(&json!({
            "reference": reference.reference_uri(),
            "target": reference.target_uri(),
            "concept": reference.concept,
        }));
    }
    println!("{}", reference.reference_uri());
    println!("-> {}", reference.target_uri());
    Ok(())
}

/// Print the JSON-LD context. Always JSON.
pub fn context(ctx: &Context, raw: &str) -> Result<()> {
    let domain = Domain::normalize(raw)?;
    ctx.print_json(&jsonld_context(&domain))
}

/// Check the verification record of a domain. Fails when it is absent.
pub fn verify(ctx: &Context, raw: &str, method: VerificationMethod) -> Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(verify_async(ctx, raw, method))
}

async fn verify_async(ctx: &Context, raw: &str, method: VerificationMethod) -> Result<()> {
    let domain = Domain::normalize(raw)?;
    let config = ctx.config()?;
    let verifier = DomainVerifier::from_config(&config);

    match verifier.verify(&domain, method).await {
        Ok(verified) => {
            if ctx.json {
                ctx.print_json(&json!({ "verified": true, "result": verified }))?;
            } else {
                println!(
                    "{} verified via {} at {}",
                    verified.domain,
                    verified.method,
                    verified.verified_at.to_rfc3339()
                );
            }
            Ok(())
        }
        Err(err) => {
            if ctx.json {
                ctx.print_json(&json!({
                    "verified": false,
                    "domain": domain,
                    "method": method,
                    "error": err.to_string(),
                    "transient": err.is_transient(),
                }))?;
            }
            Err(anyhow::Error::new(err).context(format!("Verification of {} failed", domain)))
        }
    }
}
