//! Splitting bulk text into memory-sized chunks.
//!
//! Paragraphs (blank-line separated) are packed together up to `max_chars`;
//! a paragraph that is too long on its own is split into sentences, and a
//! sentence that is still too long is cut at word boundaries.

use serde::Serialize;

/// Result of a bulk import.
#[derive(Debug, Default, Serialize)]
pub struct ImportReport {
    pub chunks: usize,
    pub stored: usize,
    /// Chunks stored without an embedding.
    pub keyword_only: usize,
    pub links_created: usize,
    pub ids: Vec<String>,
    /// Chunks that failed to store, with the reason. The rest are kept.
    pub failures: Vec<ImportFailure>,
}

#[derive(Debug, Serialize)]
pub struct ImportFailure {
    pub chunk: usize,
    pub error: String,
}

pub fn chunk_text(source: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();

    for paragraph in paragraphs(source) {
        let pieces = if char_len(&paragraph) <= max_chars {
            vec![paragraph]
        } else {
            split_long(&paragraph, max_chars)
        };
        for piece in pieces {
            let joined = if current.is_empty() {
                char_len(&piece)
            } else {
                char_len(&current) + 2 + char_len(&piece)
            };
            if joined > max_chars && !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push_str("\n\n");
            }
            current.push_str(&piece);
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn paragraphs(source: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut lines: Vec<&str> = Vec::new();
    for line in source.lines().chain(std::iter::once("")) {
        if line.trim().is_empty() {
            if !lines.is_empty() {
                out.push(lines.join(" ").split_whitespace().collect::<Vec<_>>().join(" "));
                lines.clear();
            }
        } else {
            lines.push(line.trim());
        }
    }
    out
}

/// Split an oversized paragraph into pieces of at most `max_chars`.
fn split_long(paragraph: &str, max_chars: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    for sentence in sentences(paragraph) {
        let words: Vec<&str> = if char_len(sentence) > max_chars {
            sentence.split_whitespace().collect()
        } else {
            vec![sentence]
        };
        for word in words {
            for part in hard_split(word, max_chars) {
                let needed = if current.is_empty() {
                    char_len(&part)
                } else {
                    char_len(&current) + 1 + char_len(&part)
                };
                if needed > max_chars && !current.is_empty() {
                    pieces.push(std::mem::take(&mut current));
                }
                if !current.is_empty() {
                    current.push(' ');
                }
                current.push_str(&part);
            }
        }
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

fn sentences(paragraph: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut chars = paragraph.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') && chars.peek().is_some_and(|(_, next)| next.is_whitespace()) {
            let end = i + c.len_utf8();
            out.push(paragraph[start..end].trim());
            start = end;
        }
    }
    let tail = paragraph[start..].trim();
    if !tail.is_empty() {
        out.push(tail);
    }
    out.retain(|s| !s.is_empty());
    out
}

/// Cut a single token longer than `max_chars` on char boundaries.
fn hard_split(word: &str, max_chars: usize) -> Vec<String> {
    if char_len(word) <= max_chars {
        return vec![word.to_string()];
    }
    word.chars()
        .collect::<Vec<_>>()
        .chunks(max_chars)
        .map(|c| c.iter().collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_paragraphs_are_packed_together() {
        let chunks = chunk_text("one\n\ntwo\n\nthree", 100);
        assert_eq!(chunks, vec!["one\n\ntwo\n\nthree"]);
    }

    #[test]
    fn paragraphs_split_when_budget_exceeded() {
        let source = format!("{}\n\n{}", "a".repeat(60), "b".repeat(60));
        let chunks = chunk_text(&source, 100);
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| c.chars().count() <= 100));
    }

    #[test]
    fn wrapped_lines_join_into_one_paragraph() {
        assert_eq!(chunk_text("first line\nsecond   line\n\n\n", 100), vec!["first line second line"]);
    }

    #[test]
    fn long_paragraph_splits_on_sentences() {
        let source = "The API was slow. We added a cache! Was it enough? Latency dropped.";
        let chunks = chunk_text(source, 40);
        assert!(chunks.len() >= 2);
        assert!(chunks.iter().all(|c| c.chars().count() <= 40));
        assert_eq!(chunks.join(" "), source);
    }

    #[test]
    fn oversized_tokens_are_hard_split() {
        let chunks = chunk_text(&"x".repeat(25), 10);
        assert_eq!(chunks, vec!["x".repeat(10), "x".repeat(10), "x".repeat(5)]);
    }

    #[test]
    fn blank_source_yields_nothing() {
        assert!(chunk_text("  \n\n \t\n", 100).is_empty());
    }
}
