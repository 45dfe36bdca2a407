//! Markdown-aware text chunker.
//!
//! Parish documents are organized as one `## ` section per activity or
//! topic, so splitting happens in two passes: first on level-2 headings,
//! then on paragraph boundaries (`\n\n`) within each section until every
//! chunk fits under the configured `max_tokens` budget. Chunks keep the
//! heading they were cut from so index metadata can carry it.
//!
//! Each chunk receives a UUID, plus a SHA-256 hash of its text for
//! staleness detection when re-embedding.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::Chunk;

/// Approximate chars-per-token ratio.
const CHARS_PER_TOKEN: usize = 4;

/// A `## ` section of a markdown document. The preamble (text before the
/// first heading) becomes a section with `title: None`.
#[derive(Debug, Clone)]
pub struct Section {
    pub title: Option<String>,
    pub body: String,
}

/// Split a markdown body on level-2 headings.
///
/// Lines starting with exactly `## ` open a new section titled by the
/// rest of the line. Level-1 and level-3+ headings stay inside the
/// current section. Sections with an empty body are dropped, except
/// that a document with no content at all yields a single empty
/// preamble so downstream code always has something to chunk.
pub fn split_sections(text: &str) -> Vec<Section> {
    let mut sections: Vec<Section> = Vec::new();
    let mut current_title: Option<String> = None;
    let mut current_body = String::new();

    let mut flush = |title: Option<String>, body: &mut String, out: &mut Vec<Section>| {
        let trimmed = body.trim();
        if !trimmed.is_empty() {
            out.push(Section {
                title,
                body: trimmed.to_string(),
            });
        }
        body.clear();
    };

    for line in text.lines() {
        if let Some(rest) = line.strip_prefix("## ") {
            flush(current_title.take(), &mut current_body, &mut sections);
            current_title = Some(rest.trim().to_string());
        } else {
            current_body.push_str(line);
            current_body.push('\n');
        }
    }
    flush(current_title, &mut current_body, &mut sections);

    if sections.is_empty() {
        sections.push(Section {
            title: None,
            body: String::new(),
        });
    }

    sections
}

/// Chunk a full document body. Returns chunks with contiguous indices
/// starting at 0; at least one chunk is always produced.
pub fn chunk_document(document_id: &str, text: &str, max_tokens: usize) -> Vec<Chunk> {
    let max_chars = max_tokens * CHARS_PER_TOKEN;
    let mut chunks = Vec::new();
    let mut index: i64 = 0;

    for section in split_sections(text) {
        for piece in pack_paragraphs(&section.body, max_chars) {
            chunks.push(make_chunk(
                document_id,
                index,
                section.title.as_deref(),
                &piece,
            ));
            index += 1;
        }
    }

    if chunks.is_empty() {
        chunks.push(make_chunk(document_id, 0, None, text.trim()));
    }

    chunks
}

/// Pack paragraphs into strings no longer than `max_chars`. A single
/// oversized paragraph is hard-split, preferring newline or space
/// boundaries.
fn pack_paragraphs(body: &str, max_chars: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut buf = String::new();

    for para in body.split("\n\n") {
        let trimmed = para.trim();
        if trimmed.is_empty() {
            continue;
        }

        let would_be = if buf.is_empty() {
            trimmed.len()
        } else {
            buf.len() + 2 + trimmed.len()
        };

        if would_be > max_chars && !buf.is_empty() {
            pieces.push(std::mem::take(&mut buf));
        }

        if trimmed.len() > max_chars {
            if !buf.is_empty() {
                pieces.push(std::mem::take(&mut buf));
            }
            hard_split(trimmed, max_chars, &mut pieces);
        } else {
            if !buf.is_empty() {
                buf.push_str("\n\n");
            }
            buf.push_str(trimmed);
        }
    }

    if !buf.is_empty() {
        pieces.push(buf);
    }

    pieces
}

fn hard_split(text: &str, max_chars: usize, out: &mut Vec<String>) {
    let mut remaining = text;
    while !remaining.is_empty() {
        let limit = remaining.len().min(max_chars);
        // Back off to a char boundary so slicing never panics on
        // multi-byte text (accented Spanish is the common case).
        let mut limit = limit;
        while limit < remaining.len() && !remaining.is_char_boundary(limit) {
            limit -= 1;
        }
        let split_at = if limit < remaining.len() {
            remaining[..limit]
                .rfind('\n')
                .or_else(|| remaining[..limit].rfind(' '))
                .map(|pos| pos + 1)
                .unwrap_or(limit)
        } else {
            limit
        };
        let piece = remaining[..split_at].trim();
        if !piece.is_empty() {
            out.push(piece.to_string());
        }
        remaining = &remaining[split_at..];
    }
}

fn make_chunk(document_id: &str, index: i64, section: Option<&str>, text: &str) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: Uuid::new_v4().to_string(),
        document_id: document_id.to_string(),
        chunk_index: index,
        section: section.map(|s| s.to_string()),
        text: text.to_string(),
        hash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_text_single_chunk() {
        let chunks = chunk_document("doc1", "Horario de misas: 10:00 y 12:00.", 700);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].section, None);
    }

    #[test]
    fn empty_text_still_yields_a_chunk() {
        let chunks = chunk_document("doc1", "", 700);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
    }

    #[test]
    fn sections_split_on_level_two_headings() {
        let text = "Intro.\n\n## Catequesis\n\nLos lunes.\n\n## Cáritas\n\nLos martes.";
        let sections = split_sections(text);
        assert_eq!(sections.len(), 3);
        assert_eq!(sections[0].title, None);
        assert_eq!(sections[1].title.as_deref(), Some("Catequesis"));
        assert_eq!(sections[2].title.as_deref(), Some("Cáritas"));
        assert_eq!(sections[2].body, "Los martes.");
    }

    #[test]
    fn level_three_headings_stay_in_section() {
        let text = "## Eloos\n\n### Descripción\n\nGrupo joven.";
        let sections = split_sections(text);
        assert_eq!(sections.len(), 1);
        assert!(sections[0].body.contains("### Descripción"));
    }

    #[test]
    fn chunks_carry_their_section_title() {
        let text = "## Catequesis\n\nPrimera comunión.\n\n## Lifeteen\n\nAdolescentes.";
        let chunks = chunk_document("doc1", text, 700);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].section.as_deref(), Some("Catequesis"));
        assert_eq!(chunks[1].section.as_deref(), Some("Lifeteen"));
    }

    #[test]
    fn indices_contiguous_across_sections() {
        let text = (0..30)
            .map(|i| format!("## Grupo {}\n\nDescripción del grupo número {}.", i, i))
            .collect::<Vec<_>>()
            .join("\n\n");
        let chunks = chunk_document("doc1", &text, 10);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i as i64, "index mismatch at {}", i);
        }
    }

    #[test]
    fn oversized_paragraph_hard_splits() {
        // max_tokens=5 => 20 chars
        let text = "palabra ".repeat(20);
        let chunks = chunk_document("doc1", &text, 5);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.text.len() <= 20);
        }
    }

    #[test]
    fn hard_split_respects_utf8_boundaries() {
        let text = "adoración ".repeat(50);
        let chunks = chunk_document("doc1", &text, 5);
        assert!(!chunks.is_empty());
    }

    #[test]
    fn deterministic_hashes() {
        let text = "## Rosario\n\nTodos los días a las 19:00.";
        let a = chunk_document("doc1", text, 5);
        let b = chunk_document("doc1", text, 5);
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.text, y.text);
            assert_eq!(x.hash, y.hash);
        }
    }
}
