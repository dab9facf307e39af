//! Deterministic chunk ids.
//!
//! Same file content must always produce the same ids so that re-indexing
//! replaces points instead of duplicating them.

use sha2::{Digest, Sha256};

/// First 32 hex chars of `sha256("{path}:{index}:{content[..500]}")`.
///
/// The content prefix keeps hashing cheap for very large chunks while still
/// distinguishing edits anywhere near the top of a definition.
pub fn chunk_id(path: &str, index: usize, content: &str) -> String {
    let prefix: String = content.chars().take(500).collect();
    let mut hasher = Sha256::new();
    hasher.update(path.as_bytes());
    hasher.update(b":");
    hasher.update(index.to_string().as_bytes());
    hasher.update(b":");
    hasher.update(prefix.as_bytes());
    let digest = hasher.finalize();
    let hex = digest
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<String>();
    hex[..32].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stable_across_calls() {
        let a = chunk_id("src/a.rs", 0, "fn main() {}");
        let b = chunk_id("src/a.rs", 0, "fn main() {}");
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn distinguishes_path_index_and_content() {
        let base = chunk_id("src/a.rs", 0, "fn main() {}");
        assert_ne!(base, chunk_id("src/b.rs", 0, "fn main() {}"));
        assert_ne!(base, chunk_id("src/a.rs", 1, "fn main() {}"));
        assert_ne!(base, chunk_id("src/a.rs", 0, "fn other() {}"));
    }
}
