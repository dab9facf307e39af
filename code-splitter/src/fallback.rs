//! Language-aware recursive-character splitting.
//!
//! Used for files without AST support and for re-splitting oversized AST
//! chunks. Splits on the most structural separator present, merges the
//! pieces greedily up to the chunk size, and recurses with finer separators
//! for pieces that are still too large. Adjacent chunks share a character
//! overlap for retrieval continuity.

/// Recursive splitter with a fixed separator ladder.
#[derive(Debug, Clone)]
pub struct RecursiveSplitter {
    chunk_size: usize,
    overlap: usize,
    separators: Vec<&'static str>,
}

impl RecursiveSplitter {
    /// Splitter tuned for the given payload language name.
    pub fn for_language(language: &str, chunk_size: usize, overlap: usize) -> Self {
        let separators: Vec<&'static str> = match language {
            "rust" => vec![
                "\nfn ", "\npub fn ", "\nimpl ", "\nstruct ", "\nenum ", "\ntrait ", "\nmod ",
                "\n\n", "\n", " ", "",
            ],
            "python" => vec!["\nclass ", "\ndef ", "\n    def ", "\n\n", "\n", " ", ""],
            "javascript" | "typescript" => vec![
                "\nfunction ", "\nclass ", "\nexport ", "\nconst ", "\nlet ", "\n\n", "\n", " ",
                "",
            ],
            "java" | "kotlin" | "csharp" | "scala" => vec![
                "\nclass ", "\npublic ", "\nprotected ", "\nprivate ", "\nstatic ", "\n\n", "\n",
                " ", "",
            ],
            "go" => vec!["\nfunc ", "\ntype ", "\nvar ", "\nconst ", "\n\n", "\n", " ", ""],
            "markdown" => vec!["\n## ", "\n### ", "\n\n", "\n", " ", ""],
            _ => vec!["\n\n", "\n", " ", ""],
        };
        Self {
            chunk_size,
            overlap,
            separators,
        }
    }

    /// Splits `text` into chunks of at most `chunk_size` characters.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        let mut out = Vec::new();
        self.split_recursive(text, 0, &mut out);
        out.retain(|c| !c.trim().is_empty());
        out
    }

    fn split_recursive(&self, text: &str, sep_index: usize, out: &mut Vec<String>) {
        if text.chars().count() <= self.chunk_size {
            out.push(text.to_string());
            return;
        }

        // Find the first separator from `sep_index` on that occurs in the text.
        let (sep, next_index) = match self.separators[sep_index..]
            .iter()
            .enumerate()
            .find(|(_, s)| s.is_empty() || text.contains(**s))
        {
            Some((offset, s)) => (*s, sep_index + offset + 1),
            None => ("", self.separators.len()),
        };

        if sep.is_empty() {
            // Last resort: hard character windows with overlap.
            self.split_by_chars(text, out);
            return;
        }

        // Split keeping the separator attached to the piece it introduces.
        let pieces = split_keep_separator(text, sep);

        let mut current = String::new();
        for piece in pieces {
            let piece_len = piece.chars().count();
            let current_len = current.chars().count();

            if piece_len > self.chunk_size {
                if !current.is_empty() {
                    out.push(std::mem::take(&mut current));
                }
                self.split_recursive(&piece, next_index, out);
                continue;
            }

            if current_len + piece_len > self.chunk_size && !current.is_empty() {
                let tail = overlap_tail(&current, self.overlap);
                out.push(std::mem::take(&mut current));
                if tail.chars().count() + piece_len <= self.chunk_size {
                    current = tail;
                }
            }
            current.push_str(&piece);
        }
        if !current.trim().is_empty() {
            out.push(current);
        }
    }

    fn split_by_chars(&self, text: &str, out: &mut Vec<String>) {
        let chars: Vec<char> = text.chars().collect();
        let step = self.chunk_size.saturating_sub(self.overlap).max(1);
        let mut start = 0usize;
        while start < chars.len() {
            let end = (start + self.chunk_size).min(chars.len());
            out.push(chars[start..end].iter().collect());
            if end == chars.len() {
                break;
            }
            start += step;
        }
    }
}

/// Splits on `sep`, attaching the separator to the piece it starts.
fn split_keep_separator(text: &str, sep: &str) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut rest = text;
    loop {
        // A piece that begins with the separator keeps it; search past it.
        let offset = if rest.starts_with(sep) { sep.len() } else { 0 };
        match rest[offset..].find(sep) {
            Some(pos) => {
                let cut = offset + pos;
                pieces.push(rest[..cut].to_string());
                rest = &rest[cut..];
            }
            None => {
                if !rest.is_empty() {
                    pieces.push(rest.to_string());
                }
                return pieces;
            }
        }
    }
}

/// Last `overlap` characters of `s`, starting at a line boundary when possible.
fn overlap_tail(s: &str, overlap: usize) -> String {
    if overlap == 0 {
        return String::new();
    }
    let chars: Vec<char> = s.chars().collect();
    let from = chars.len().saturating_sub(overlap);
    let tail: String = chars[from..].iter().collect();
    match tail.find('\n') {
        Some(pos) if pos + 1 < tail.len() => tail[pos + 1..].to_string(),
        _ => tail,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_one_chunk() {
        let s = RecursiveSplitter::for_language("text", 100, 20);
        assert_eq!(s.split_text("hello world"), vec!["hello world".to_string()]);
    }

    #[test]
    fn chunks_respect_size_limit() {
        let s = RecursiveSplitter::for_language("python", 80, 10);
        let text = (0..30)
            .map(|i| format!("def f{i}():\n    return {i}\n"))
            .collect::<Vec<_>>()
            .join("\n");
        let chunks = s.split_text(&text);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.chars().count() <= 80, "chunk too large: {}", c.len());
        }
    }

    #[test]
    fn no_content_lost_without_overlap() {
        let s = RecursiveSplitter {
            chunk_size: 40,
            overlap: 0,
            separators: vec!["\n\n", "\n", " ", ""],
        };
        let text = "alpha beta gamma\n\ndelta epsilon zeta\n\neta theta iota";
        let chunks = s.split_text(&text);
        let joined: String = chunks.concat();
        assert_eq!(joined, text);
    }

    #[test]
    fn giant_token_falls_back_to_char_windows() {
        let s = RecursiveSplitter::for_language("text", 50, 5);
        let text = "x".repeat(500);
        let chunks = s.split_text(&text);
        assert!(chunks.len() >= 10);
        for c in &chunks {
            assert!(c.chars().count() <= 50);
        }
    }
}
