//! Collection and point naming.
//!
//! The alias name is the only stable handle for a project; the versioned
//! collections behind it come and go with every reindex.

use uuid::Uuid;

/// Lowercases and replaces anything outside `[a-z0-9_]` with `_`.
fn sanitize(part: &str) -> String {
    part.to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Stable alias name: `{prefix}_{workspace}__{project}`.
pub fn project_alias(prefix: &str, workspace: &str, project: &str) -> String {
    format!(
        "{}_{}__{}",
        sanitize(prefix),
        sanitize(workspace),
        sanitize(project)
    )
}

/// Versioned collection name behind an alias: `{alias}_v{unix_millis}`.
pub fn versioned_collection(alias: &str, unix_millis: i64) -> String {
    format!("{alias}_v{unix_millis}")
}

/// Whether `name` is a versioned sibling of `alias`.
pub fn is_versioned_of(alias: &str, name: &str) -> bool {
    name.starts_with(&format!("{alias}_v"))
}

/// Stable point id: `uuid5(DNS, "{workspace}:{project}:{branch}:{path}:{chunk_index}")`.
///
/// A pure function of its inputs, so re-upserting an unchanged file replaces
/// points instead of duplicating them.
pub fn point_id(
    workspace: &str,
    project: &str,
    branch: &str,
    path: &str,
    chunk_index: usize,
) -> String {
    let key = format!("{workspace}:{project}:{branch}:{path}:{chunk_index}");
    Uuid::new_v5(&Uuid::NAMESPACE_DNS, key.as_bytes()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alias_is_sanitized_and_lowercased() {
        assert_eq!(
            project_alias("ragrev", "Acme Corp", "billing/core"),
            "ragrev_acme_corp__billing_core"
        );
    }

    #[test]
    fn point_id_is_pure() {
        let a = point_id("w", "p", "main", "src/a.py", 0);
        let b = point_id("w", "p", "main", "src/a.py", 0);
        assert_eq!(a, b);
        assert_ne!(a, point_id("w", "p", "feature/x", "src/a.py", 0));
        assert_ne!(a, point_id("w", "p", "main", "src/a.py", 1));
    }

    #[test]
    fn versioned_names_are_recognized() {
        let alias = project_alias("ragrev", "w", "p");
        let versioned = versioned_collection(&alias, 1_700_000_000_000);
        assert!(is_versioned_of(&alias, &versioned));
        assert!(!is_versioned_of(&alias, &alias));
    }
}
