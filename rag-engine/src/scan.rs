//! Repository scanning for indexing.
//!
//! Walks the tree, applies exclude globs and the per-file size cap, and
//! drops binaries via a NUL-byte sniff on the first kilobyte.

use std::fs;
use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

use crate::errors::{RagError, RagResult};

/// Directories never worth descending into.
const SKIP_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    "build",
    "dist",
    "target",
    "__pycache__",
    ".idea",
    ".vscode",
    "vendor",
];

/// Default exclude patterns applied on top of caller-supplied ones.
const DEFAULT_EXCLUDES: &[&str] = &[
    "**/*.min.js",
    "**/*.map",
    "**/*.lock",
    "**/package-lock.json",
    "**/*.png",
    "**/*.jpg",
    "**/*.jpeg",
    "**/*.gif",
    "**/*.svg",
    "**/*.ico",
    "**/*.woff",
    "**/*.woff2",
    "**/*.ttf",
    "**/*.eot",
    "**/*.pdf",
    "**/*.zip",
    "**/*.gz",
];

/// One file selected for indexing, with its repo-relative path.
#[derive(Debug, Clone)]
pub struct ScannedFile {
    pub abs_path: PathBuf,
    /// Forward-slash relative path used as the payload `path`.
    pub rel_path: String,
    pub size: u64,
}

/// Scans `root` for indexable files.
pub fn scan_repository(
    root: &Path,
    extra_excludes: &[String],
    max_file_bytes: u64,
) -> RagResult<Vec<ScannedFile>> {
    if !root.exists() {
        return Err(RagError::Config(format!(
            "repository root does not exist: {}",
            root.display()
        )));
    }

    info!(root = %root.display(), "scan: start");

    let globset = build_globset(extra_excludes)?;

    let mut skipped_excluded = 0usize;
    let mut skipped_too_big = 0usize;
    let mut skipped_binary = 0usize;
    let mut files = Vec::new();

    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(keep_entry);

    for entry in walker.filter_map(Result::ok) {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();

        let rel = path
            .strip_prefix(root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");

        if globset.is_match(&rel) {
            skipped_excluded += 1;
            continue;
        }

        let meta = match fs::metadata(path) {
            Ok(m) => m,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "scan: metadata failed");
                continue;
            }
        };
        if meta.len() > max_file_bytes {
            skipped_too_big += 1;
            debug!(path = %rel, size = meta.len(), "scan: skip (too big)");
            continue;
        }

        if is_binary(path) {
            skipped_binary += 1;
            continue;
        }

        files.push(ScannedFile {
            abs_path: path.to_path_buf(),
            rel_path: rel,
            size: meta.len(),
        });
    }

    files.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));

    info!(
        total = files.len(),
        excluded = skipped_excluded,
        too_big = skipped_too_big,
        binary = skipped_binary,
        "scan: done"
    );
    Ok(files)
}

fn build_globset(extra: &[String]) -> RagResult<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).chain(
        extra
            .iter()
            .map(|p| normalize_exclude_pattern(p)),
    ) {
        match Glob::new(&pat) {
            Ok(g) => {
                builder.add(g);
            }
            Err(e) => warn!(pattern = %pat, error = %e, "scan: invalid exclude pattern"),
        }
    }
    builder
        .build()
        .map_err(|e| RagError::Config(format!("bad exclude globset: {e}")))
}

/// Makes directory-style patterns match recursively: `vendor/` → `vendor/**`.
fn normalize_exclude_pattern(pat: &str) -> String {
    let pat = pat.trim();
    if pat.ends_with('/') {
        format!("{pat}**")
    } else {
        pat.to_string()
    }
}

/// Coarse directory filter to avoid descending into heavy/vendor folders.
fn keep_entry(entry: &DirEntry) -> bool {
    if entry.file_type().is_dir() {
        if let Some(name) = entry.file_name().to_str() {
            return !SKIP_DIRS.contains(&name);
        }
    }
    true
}

/// NUL byte in the first KiB marks the file as binary.
fn is_binary(path: &Path) -> bool {
    use std::io::Read;
    let mut buf = [0u8; 1024];
    match fs::File::open(path) {
        Ok(mut f) => match f.read(&mut buf) {
            Ok(n) => buf[..n].contains(&0),
            Err(_) => true,
        },
        Err(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &Path, rel: &str, content: &[u8]) {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let mut f = fs::File::create(path).unwrap();
        f.write_all(content).unwrap();
    }

    #[test]
    fn scans_text_skips_binary_and_excluded() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "src/main.py", b"print('hi')\n");
        write_file(dir.path(), "src/logo.png", b"\x89PNG\x00\x00");
        write_file(dir.path(), "node_modules/dep/index.js", b"module.exports = 1\n");
        write_file(dir.path(), "docs/readme.md", b"# readme\n");

        let files = scan_repository(dir.path(), &[], 1_000_000).unwrap();
        let rels: Vec<&str> = files.iter().map(|f| f.rel_path.as_str()).collect();

        assert!(rels.contains(&"src/main.py"));
        assert!(rels.contains(&"docs/readme.md"));
        assert!(!rels.iter().any(|p| p.contains("logo.png")));
        assert!(!rels.iter().any(|p| p.contains("node_modules")));
    }

    #[test]
    fn respects_size_cap_and_custom_excludes() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "big.txt", &vec![b'a'; 4096]);
        write_file(dir.path(), "gen/out.py", b"generated = True\n");
        write_file(dir.path(), "keep.py", b"x = 1\n");

        let files =
            scan_repository(dir.path(), &["gen/".to_string()], 1024).unwrap();
        let rels: Vec<&str> = files.iter().map(|f| f.rel_path.as_str()).collect();

        assert_eq!(rels, vec!["keep.py"]);
    }

    #[test]
    fn missing_root_is_an_error() {
        let err = scan_repository(Path::new("/nonexistent/nowhere"), &[], 1024).unwrap_err();
        assert!(matches!(err, RagError::Config(_)));
    }
}
