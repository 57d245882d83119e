//! layout
//!
//! Semantic file layout mapper.
//!
//! # Modules
//!
//! - [`paths`] - Canonical paths within a space
//! - [`turtle`] - Per-file Turtle serialization
//! - [`nquads`] - Bulk N-Quads serialization
//! - [`mapper`] - Graph to files and back
//!
//! Both readers parse with `sophia_turtle` and convert through `terms`.
//!
//! # Round Trip
//!
//! `parse(serialize(g)) == g` for every URI-identified node, edge type and
//! statement. Blank node identity is not preserved; callers must never join
//! on blank node labels.

pub mod mapper;
pub mod nquads;
pub mod paths;
mod terms;
pub mod turtle;

pub use mapper::{diff, export_all, import_all, parse, serialize, FileMap, LayoutError};
