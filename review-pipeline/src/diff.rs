//! Unified diff processing.
//!
//! Splits a multi-file unified diff into per-file records (change type,
//! add/delete counts, hunks kept verbatim) and extracts the significant
//! added-line snippets used as retrieval queries.
//!
//! Robust to hunks-only input: when no `diff --git` headers are present the
//! whole text is treated as a single file, with the path taken from the
//! `+++` header when available.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// How a file changed in the PR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeType {
    Added,
    Modified,
    Deleted,
    Renamed,
}

/// One file's slice of the unified diff.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffFile {
    pub path: String,
    pub change_type: ChangeType,
    /// Previous path for renames.
    pub old_path: Option<String>,
    pub added: usize,
    pub deleted: usize,
    /// The file's diff text, hunks verbatim.
    pub content: String,
    /// Full post-change content, when the provider supplied it.
    pub full_content: Option<String>,
}

/// Parsed form of the whole diff.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessedDiff {
    pub files: Vec<DiffFile>,
    pub total_additions: usize,
    pub total_deletions: usize,
}

impl ProcessedDiff {
    /// Per-file diff lookup: exact path first, then suffix match either way.
    pub fn file_diff(&self, path: &str) -> Option<&DiffFile> {
        self.files
            .iter()
            .find(|f| f.path == path)
            .or_else(|| {
                self.files.iter().find(|f| {
                    f.path.ends_with(&format!("/{path}")) || path.ends_with(&format!("/{}", f.path))
                })
            })
    }

    /// Files that are reviewable (everything except deletions).
    pub fn included_files(&self) -> impl Iterator<Item = &DiffFile> {
        self.files
            .iter()
            .filter(|f| f.change_type != ChangeType::Deleted)
    }
}

/// Unified diff parser.
pub struct DiffProcessor;

impl DiffProcessor {
    /// Parses `diff_text` into per-file records.
    pub fn process(diff_text: &str) -> ProcessedDiff {
        let mut out = ProcessedDiff::default();
        if diff_text.trim().is_empty() {
            return out;
        }

        for section in split_file_sections(diff_text) {
            if let Some(file) = parse_file_section(&section) {
                out.total_additions += file.added;
                out.total_deletions += file.deleted;
                out.files.push(file);
            }
        }

        debug!(
            files = out.files.len(),
            additions = out.total_additions,
            deletions = out.total_deletions,
            "diff processed"
        );
        out
    }
}

/// Splits on `diff --git` headers; hunks-only input is one section.
fn split_file_sections(diff_text: &str) -> Vec<String> {
    let mut sections: Vec<String> = Vec::new();
    let mut current = String::new();

    for line in diff_text.lines() {
        if line.starts_with("diff --git ") {
            if !current.trim().is_empty() {
                sections.push(std::mem::take(&mut current));
            }
        }
        current.push_str(line);
        current.push('\n');
    }
    if !current.trim().is_empty() {
        sections.push(current);
    }
    sections
}

fn parse_file_section(section: &str) -> Option<DiffFile> {
    let mut new_path: Option<String> = None;
    let mut old_path: Option<String> = None;
    let mut rename_from: Option<String> = None;
    let mut rename_to: Option<String> = None;
    let mut is_new_file = false;
    let mut is_deleted_file = false;
    let mut added = 0usize;
    let mut deleted = 0usize;

    for line in section.lines() {
        if let Some(rest) = line.strip_prefix("+++ ") {
            let p = clean_header_path(rest);
            if p != "/dev/null" {
                new_path = Some(p);
            }
        } else if let Some(rest) = line.strip_prefix("--- ") {
            let p = clean_header_path(rest);
            if p != "/dev/null" {
                old_path = Some(p);
            }
        } else if line.starts_with("new file mode") {
            is_new_file = true;
        } else if line.starts_with("deleted file mode") {
            is_deleted_file = true;
        } else if let Some(rest) = line.strip_prefix("rename from ") {
            rename_from = Some(rest.trim().to_string());
        } else if let Some(rest) = line.strip_prefix("rename to ") {
            rename_to = Some(rest.trim().to_string());
        } else if line.starts_with('+') && !line.starts_with("+++") {
            added += 1;
        } else if line.starts_with('-') && !line.starts_with("---") {
            deleted += 1;
        }
    }

    // Fall back to the `diff --git a/… b/…` header when content headers
    // are absent (pure renames, binary files).
    if new_path.is_none() && rename_to.is_none() {
        if let Some(header) = section.lines().find(|l| l.starts_with("diff --git ")) {
            if let Some(b_part) = header.split(" b/").nth(1) {
                new_path = Some(b_part.trim().to_string());
            }
        }
    }

    let (path, change_type, old) = if let (Some(from), Some(to)) = (rename_from, rename_to) {
        (to, ChangeType::Renamed, Some(from))
    } else if is_deleted_file {
        (old_path.clone()?, ChangeType::Deleted, None)
    } else {
        let path = new_path.or(old_path.clone())?;
        let ct = if is_new_file {
            ChangeType::Added
        } else {
            ChangeType::Modified
        };
        (path, ct, None)
    };

    Some(DiffFile {
        path,
        change_type,
        old_path: old,
        added,
        deleted,
        content: section.to_string(),
        full_content: None,
    })
}

/// Strips the `a/` / `b/` prefix and trailing metadata from a header path.
fn clean_header_path(raw: &str) -> String {
    let p = raw.split('\t').next().unwrap_or(raw).trim();
    p.strip_prefix("a/")
        .or_else(|| p.strip_prefix("b/"))
        .unwrap_or(p)
        .to_string()
}

/* ----------------------------- snippets ------------------------------ */

/// Minimum length for an added line to count as significant.
const SNIPPET_MIN_LINE_LEN: usize = 10;

/// Added lines grouped per snippet.
const SNIPPET_GROUP_SIZE: usize = 3;

/// Cap on snippets extracted per file diff.
const SNIPPETS_PER_FILE: usize = 10;

/// Extracts embedding-query snippets from a file's diff text.
///
/// Snippets are clean code (no `+` markers, no paths) — they are semantic
/// search queries, not citations.
pub fn extract_diff_snippets(diff_content: &str) -> Vec<String> {
    let mut snippets = Vec::new();
    let mut current: Vec<String> = Vec::new();

    for line in diff_content.lines() {
        let Some(rest) = line.strip_prefix('+') else {
            continue;
        };
        if line.starts_with("+++") {
            continue;
        }
        let clean = rest.trim();
        if clean.len() <= SNIPPET_MIN_LINE_LEN
            || clean.starts_with("//")
            || clean.starts_with('#')
            || clean.starts_with('*')
            || clean == "{"
            || clean == "}"
        {
            continue;
        }

        current.push(clean.to_string());
        if current.len() >= SNIPPET_GROUP_SIZE {
            snippets.push(current.join(" "));
            current.clear();
            if snippets.len() >= SNIPPETS_PER_FILE {
                return snippets;
            }
        }
    }

    if !current.is_empty() && snippets.len() < SNIPPETS_PER_FILE {
        snippets.push(current.join(" "));
    }
    snippets
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "diff --git a/src/db/query.py b/src/db/query.py\n\
index 1111111..2222222 100644\n\
--- a/src/db/query.py\n\
+++ b/src/db/query.py\n\
@@ -10,6 +10,8 @@ def run(user_input):\n\
     conn = get_conn()\n\
-    cursor.execute(SAFE_QUERY, (user_input,))\n\
+    query = f\"SELECT * FROM users WHERE name = '{user_input}'\"\n\
+    cursor.execute(query)\n\
     return cursor.fetchall()\n\
diff --git a/docs/notes.md b/docs/notes.md\n\
new file mode 100644\n\
--- /dev/null\n\
+++ b/docs/notes.md\n\
@@ -0,0 +1,2 @@\n\
+# Notes\n\
+Remember to rotate credentials regularly.\n";

    #[test]
    fn parses_files_with_change_types_and_counts() {
        let diff = DiffProcessor::process(SAMPLE);
        assert_eq!(diff.files.len(), 2);

        let query = diff.file_diff("src/db/query.py").unwrap();
        assert_eq!(query.change_type, ChangeType::Modified);
        assert_eq!(query.added, 2);
        assert_eq!(query.deleted, 1);
        assert!(query.content.contains("@@ -10,6 +10,8 @@"));

        let notes = diff.file_diff("docs/notes.md").unwrap();
        assert_eq!(notes.change_type, ChangeType::Added);
        assert_eq!(diff.total_additions, 4);
        assert_eq!(diff.total_deletions, 1);
    }

    #[test]
    fn detects_deleted_and_renamed_files() {
        let text = "diff --git a/old/name.py b/old/name.py\n\
deleted file mode 100644\n\
--- a/old/name.py\n\
+++ /dev/null\n\
@@ -1,2 +0,0 @@\n\
-def gone():\n\
-    pass\n\
diff --git a/a/before.py b/a/after.py\n\
similarity index 95%\n\
rename from a/before.py\n\
rename to a/after.py\n";
        let diff = DiffProcessor::process(text);

        let deleted = diff.file_diff("old/name.py").unwrap();
        assert_eq!(deleted.change_type, ChangeType::Deleted);

        let renamed = diff.file_diff("a/after.py").unwrap();
        assert_eq!(renamed.change_type, ChangeType::Renamed);
        assert_eq!(renamed.old_path.as_deref(), Some("a/before.py"));
    }

    #[test]
    fn hunks_only_input_is_one_file() {
        let text = "--- a/src/main.rs\n+++ b/src/main.rs\n@@ -1 +1,2 @@\n fn main() {}\n+// trailing note that is long enough\n";
        let diff = DiffProcessor::process(text);
        assert_eq!(diff.files.len(), 1);
        assert_eq!(diff.files[0].path, "src/main.rs");
    }

    #[test]
    fn empty_diff_yields_empty_result() {
        let diff = DiffProcessor::process("   \n");
        assert!(diff.files.is_empty());
        assert_eq!(diff.total_additions, 0);
    }

    #[test]
    fn snippets_group_significant_added_lines() {
        let content = "+++ b/x.py\n\
+query = build_query(user_input)\n\
+result = cursor.execute(query)\n\
+rows = result.fetchall()\n\
+# a comment line that is ignored\n\
+{\n\
+total = aggregate(rows, strategy)\n";
        let snippets = extract_diff_snippets(content);
        assert_eq!(snippets.len(), 2);
        assert!(snippets[0].contains("build_query(user_input)"));
        assert!(snippets[0].contains("fetchall"));
        assert_eq!(snippets[1], "total = aggregate(rows, strategy)");
    }

    #[test]
    fn snippets_are_capped_per_file() {
        let mut content = String::from("+++ b/x.py\n");
        for i in 0..200 {
            content.push_str(&format!("+value_{i} = do_something_with({i})\n"));
        }
        let snippets = extract_diff_snippets(&content);
        assert_eq!(snippets.len(), SNIPPETS_PER_FILE);
    }

    #[test]
    fn deleted_files_excluded_from_included() {
        let text = "diff --git a/gone.py b/gone.py\ndeleted file mode 100644\n--- a/gone.py\n+++ /dev/null\n@@ -1 +0,0 @@\n-x = 1\n";
        let diff = DiffProcessor::process(text);
        assert_eq!(diff.included_files().count(), 0);
    }
}
