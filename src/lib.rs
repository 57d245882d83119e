//! Redstring Pod - Git-backed semantic pods with federation and multi-provider sync
//!
//! A pod is a personal knowledge graph owned by a domain. Concepts live
//! under `https://{domain}/redstring/vocab/`, are stored as Turtle files in
//! one or more Git-hosting providers, and can point into other domains'
//! vocabularies through cross-domain references.
//!
//! # Architecture
//!
//! - [`core`] - Domains, slugs, cross-domain references, configuration
//! - [`identity`] - Domain verification via DNS TXT or well-known file
//! - [`federation`] - Peer discovery and cross-domain concept resolution
//! - [`graph`] - Semantic graph with reified statements
//! - [`layout`] - Graph to Turtle files and N-Quads, and back
//! - [`provider`] - Uniform contract over GitHub, Gitea and local Git
//! - [`sync`] - Instant local edits with debounced quorum flushes
//! - [`cli`] - The `redpod` operator surface
//!
//! # Invariants
//!
//! 1. URIs derive from the normalized domain alone
//! 2. Local edits never wait on the network
//! 3. A flush is durable once `quorum` providers acknowledge it
//! 4. Remote edits are merged, never overwritten

pub mod cli;
pub mod core;
pub mod federation;
pub mod graph;
pub mod identity;
pub mod layout;
pub mod provider;
pub mod sync;
