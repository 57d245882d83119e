//! layout::paths
//!
//! Canonical file paths inside a semantic space.
//!
//! ```text
//! profile/webid.ttl
//! profile/preferences.ttl
//! vocabulary/concepts/<slug>.ttl
//! vocabulary/schemas/<slug>.ttl
//! spaces/<space>/graph.ttl
//! spaces/<space>/triples.ttl
//! connections/influences/<id>.ttl
//! connections/compositions/<id>.ttl
//! connections/abstractions/<id>.ttl
//! federation/subscriptions.ttl
//! federation/permissions.ttl
//! federation/cross-refs.ttl
//! ```
//!
//! All paths are relative, `/`-separated and free of `..`.

use crate::graph::ConnectionKind;

pub const PROFILE_WEBID: &str = "profile/webid.ttl";
pub const PROFILE_PREFERENCES: &str = "profile/preferences.ttl";
pub const CONCEPTS_DIR: &str = "vocabulary/concepts";
pub const SCHEMAS_DIR: &str = "vocabulary/schemas";
pub const SPACES_DIR: &str = "spaces";
pub const CONNECTIONS_DIR: &str = "connections";
pub const FEDERATION_SUBSCRIPTIONS: &str = "federation/subscriptions.ttl";
pub const FEDERATION_PERMISSIONS: &str = "federation/permissions.ttl";
pub const FEDERATION_CROSS_REFS: &str = "federation/cross-refs.ttl";

/// File holding one concept.
pub fn concept(slug: &str) -> String {
    format!("{}/{}.ttl", CONCEPTS_DIR, slug)
}

/// File holding one edge type.
pub fn schema(slug: &str) -> String {
    format!("{}/{}.ttl", SCHEMAS_DIR, slug)
}

/// File holding one connection of the given kind.
pub fn connection(kind: ConnectionKind, local: &str) -> String {
    format!("{}/{}/{}.ttl", CONNECTIONS_DIR, kind.directory(), local)
}

/// Graph manifest of a space.
pub fn space_manifest(space: &str) -> String {
    format!("{}/{}/graph.ttl", SPACES_DIR, space)
}

/// Plain triples of a space.
pub fn space_triples(space: &str) -> String {
    format!("{}/{}/triples.ttl", SPACES_DIR, space)
}

/// The directories and fixed files of a space, in layout order.
pub fn canonical_layout(space: &str) -> Vec<String> {
    vec![
        PROFILE_WEBID.to_string(),
        PROFILE_PREFERENCES.to_string(),
        format!("{}/", CONCEPTS_DIR),
        format!("{}/", SCHEMAS_DIR),
        format!("{}/{}/", SPACES_DIR, space),
        format!("{}/influences/", CONNECTIONS_DIR),
        format!("{}/compositions/", CONNECTIONS_DIR),
        format!("{}/abstractions/", CONNECTIONS_DIR),
        FEDERATION_SUBSCRIPTIONS.to_string(),
        FEDERATION_PERMISSIONS.to_string(),
        FEDERATION_CROSS_REFS.to_string(),
    ]
}

/// Check that a path is a safe relative layout path.
pub fn is_valid(path: &str) -> bool {
    !path.is_empty()
        && !path.starts_with('/')
        && !path.contains('\\')
        && path
            .split('/')
            .all(|segment| !segment.is_empty() && segment != "." && segment != "..")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_entity_paths() {
        assert_eq!(concept("climatepolicy"), "vocabulary/concepts/climatepolicy.ttl");
        assert_eq!(schema("drives"), "vocabulary/schemas/drives.ttl");
        assert_eq!(
            connection(ConnectionKind::Composition, "statement-ab"),
            "connections/compositions/statement-ab.ttl"
        );
        assert_eq!(space_manifest("personal"), "spaces/personal/graph.ttl");
    }

    #[test]
    fn canonical_layout_matches_fixed_entries() {
        let layout = canonical_layout("personal");
        assert_eq!(layout.len(), 11);
        assert!(layout.contains(&"connections/abstractions/".to_string()));
        assert!(layout.contains(&"federation/cross-refs.ttl".to_string()));
        assert!(layout.contains(&"spaces/personal/".to_string()));
    }

    #[test]
    fn rejects_unsafe_paths() {
        assert!(is_valid("profile/webid.ttl"));
        assert!(!is_valid("/etc/passwd"));
        assert!(!is_valid("a/../b.ttl"));
        assert!(!is_valid("a//b.ttl"));
        assert!(!is_valid(""));
    }
}
