//! Semantic retrieval over the parish document index.
//!
//! The query path: optionally expand short queries into variants with
//! the chat model, embed every variant in one batch, query the vector
//! index per variant, drop matches under the similarity threshold, fuse
//! the surviving result sets with Reciprocal Rank Fusion, and assemble
//! the top matches into the context block handed to the assistant.
//!
//! Expansion is conditional: long queries are already self-contained
//! and skipping the extra model call keeps the common path fast. The
//! similarity threshold applies per result set, before fusion — RRF
//! scores are rank-based and not comparable with cosine similarity.

use anyhow::{bail, Result};
use std::collections::HashMap;

use crate::chat::ChatClient;
use crate::config::Config;
use crate::embedding;
use crate::index::{IndexMatch, VectorIndex};
use crate::metadata::PASTORAL_CATEGORIES;
use crate::models::DocMatch;

/// Answer returned when nothing in the index clears the threshold.
pub const NO_RESULTS_MESSAGE: &str = "No se encontró información específica sobre este tema en \
     los documentos parroquiales. Consulta directamente con la recepción de la parroquia.";

/// Characters kept per match when assembling chat context.
const CONTENT_BUDGET: usize = 1000;

const EXPANSION_SYSTEM_PROMPT: &str = "Eres un experto en reformular preguntas sobre parroquias católicas.

Genera 3 variaciones breves de la pregunta del usuario para mejorar búsquedas semánticas:
- Máximo 12 palabras por variación.
- NO uses sinónimos para términos sacramentales: \"testigos\" NO es \"padrinos\".
- PRESERVA los nombres propios de grupos (Eloos, Oro y Café) tal cual.
- Si la query menciona documentos/requisitos/testigos, úsalos tal cual.

Responde SOLO con las 3 variaciones, una por línea, sin numeración.";

/// Whether a query is short enough to benefit from expansion.
pub fn needs_expansion(query: &str, max_len: usize) -> bool {
    query.trim().chars().count() < max_len
}

/// Expand a query into up to 3 variants via the chat model. The
/// original query always comes first; on any failure the original is
/// used alone.
pub async fn expand_query(chat: &ChatClient, query: &str) -> Vec<String> {
    let mut variants = vec![query.to_string()];

    match chat.complete_simple(EXPANSION_SYSTEM_PROMPT, query).await {
        Ok(text) => {
            for line in text.lines().map(str::trim).filter(|l| !l.is_empty()).take(3) {
                variants.push(line.to_string());
            }
        }
        Err(e) => {
            tracing::warn!("query expansion failed, using original query: {}", e);
        }
    }

    variants
}

/// Keep matches strictly above the similarity threshold.
pub fn filter_by_threshold(matches: Vec<IndexMatch>, threshold: f64) -> Vec<IndexMatch> {
    matches.into_iter().filter(|m| m.score > threshold).collect()
}

/// Reciprocal Rank Fusion over several ranked result sets:
/// `score(doc) = Σ 1 / (k + rank + 1)` across the sets it appears in.
pub fn reciprocal_rank_fusion(result_sets: &[Vec<IndexMatch>], k: usize) -> Vec<IndexMatch> {
    struct Entry {
        score: f64,
        match_: IndexMatch,
        arrival: usize,
    }

    let mut scores: HashMap<String, Entry> = HashMap::new();
    let mut arrival = 0usize;

    for results in result_sets {
        for (rank, m) in results.iter().enumerate() {
            let rrf = 1.0 / ((k + rank + 1) as f64);
            scores
                .entry(m.id.clone())
                .and_modify(|e| e.score += rrf)
                .or_insert_with(|| {
                    arrival += 1;
                    Entry {
                        score: rrf,
                        match_: m.clone(),
                        arrival,
                    }
                });
        }
    }

    let mut fused: Vec<Entry> = scores.into_values().collect();
    fused.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.arrival.cmp(&b.arrival))
    });

    fused.into_iter().map(|e| e.match_).collect()
}

fn metadata_str(m: &IndexMatch, key: &str) -> Option<String> {
    m.metadata
        .as_ref()
        .and_then(|meta| meta.get(key))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

fn to_doc_match(m: IndexMatch) -> DocMatch {
    let content = metadata_str(&m, "pageContent")
        .or_else(|| metadata_str(&m, "text"))
        .unwrap_or_default();

    DocMatch {
        title: metadata_str(&m, "titulo"),
        categoria: metadata_str(&m, "categoria_pastoral"),
        id: m.id,
        score: m.score,
        content,
    }
}

/// Truncate to the context budget on a char boundary.
fn clip_content(content: &str) -> String {
    if content.chars().count() <= CONTENT_BUDGET {
        return content.trim().to_string();
    }
    let clipped: String = content.chars().take(CONTENT_BUDGET).collect();
    format!("{}...", clipped.trim())
}

/// Run the full retrieval pipeline and return the surviving matches.
pub async fn search(
    config: &Config,
    vector_index: &dyn VectorIndex,
    chat: Option<&ChatClient>,
    query: &str,
    categoria: Option<&str>,
) -> Result<Vec<DocMatch>> {
    if query.trim().is_empty() {
        bail!("query must not be empty");
    }
    if let Some(cat) = categoria {
        if !PASTORAL_CATEGORIES.contains(&cat) {
            bail!("invalid categoria: {}", cat);
        }
    }
    if !config.embedding.is_enabled() {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.");
    }

    let variants = match chat {
        Some(client) if needs_expansion(query, config.retrieval.expansion_max_len) => {
            expand_query(client, query).await
        }
        _ => vec![query.to_string()],
    };

    let provider = embedding::create_provider(&config.embedding)?;
    let vectors = embedding::embed_texts(provider.as_ref(), &config.embedding, &variants).await?;

    let filter = categoria.map(|cat| serde_json::json!({ "categoria_pastoral": { "$eq": cat } }));

    let mut result_sets: Vec<Vec<IndexMatch>> = Vec::with_capacity(vectors.len());
    for vector in &vectors {
        let matches = vector_index
            .query(vector, config.retrieval.top_k, filter.clone())
            .await?;
        result_sets.push(filter_by_threshold(
            matches,
            config.retrieval.score_threshold,
        ));
    }

    let mut fused = reciprocal_rank_fusion(&result_sets, config.retrieval.rrf_k);
    fused.truncate(config.retrieval.final_limit);

    Ok(fused.into_iter().map(to_doc_match).collect())
}

/// Format matches into the context block for the assistant.
pub fn assemble_context(matches: &[DocMatch]) -> String {
    if matches.is_empty() {
        return NO_RESULTS_MESSAGE.to_string();
    }

    matches
        .iter()
        .map(|m| clip_content(&m.content))
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}

/// CLI entry point: run a search and print ranked results.
pub async fn run_search(
    config: &Config,
    query: &str,
    categoria: Option<String>,
    top_k: Option<usize>,
    threshold: Option<f64>,
) -> Result<()> {
    let mut config = config.clone();
    if let Some(k) = top_k {
        config.retrieval.top_k = k;
    }
    if let Some(t) = threshold {
        config.retrieval.score_threshold = t;
    }

    let vector_index = crate::index::create_index(&config.index)?;
    let chat = ChatClient::from_config(&config.chat).ok();

    let matches = search(
        &config,
        vector_index.as_ref(),
        chat.as_ref(),
        query,
        categoria.as_deref(),
    )
    .await?;

    if matches.is_empty() {
        println!("No results above threshold {}.", config.retrieval.score_threshold);
        return Ok(());
    }

    for (i, m) in matches.iter().enumerate() {
        let title = m.title.as_deref().unwrap_or("(sin título)");
        println!("{}. [{:.0}%] {}", i + 1, m.score * 100.0, title);
        if let Some(ref cat) = m.categoria {
            println!("    categoría: {}", cat);
        }
        let preview: String = m.content.chars().take(150).collect();
        println!("    \"{}\"", preview.replace('\n', " ").trim());
        println!("    id: {}", m.id);
        println!();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn mk(id: &str, score: f64) -> IndexMatch {
        IndexMatch {
            id: id.to_string(),
            score,
            metadata: Some(json!({ "pageContent": format!("contenido {}", id) })),
        }
    }

    #[test]
    fn threshold_keeps_only_strictly_above() {
        let matches = vec![mk("a", 0.8), mk("b", 0.35), mk("c", 0.36), mk("d", 0.1)];
        let kept = filter_by_threshold(matches, 0.35);
        let ids: Vec<&str> = kept.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[test]
    fn threshold_forty_is_stricter() {
        let matches = vec![mk("a", 0.38), mk("b", 0.45)];
        let kept = filter_by_threshold(matches, 0.40);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, "b");
    }

    #[test]
    fn rrf_rewards_presence_in_multiple_sets() {
        let set1 = vec![mk("a", 0.9), mk("b", 0.8)];
        let set2 = vec![mk("b", 0.85), mk("c", 0.7)];
        let fused = reciprocal_rank_fusion(&[set1, set2], 60);

        // b appears in both sets (ranks 1 and 0) and must outrank both
        // single-set documents.
        assert_eq!(fused[0].id, "b");
        assert_eq!(fused.len(), 3);
    }

    #[test]
    fn rrf_first_rank_scores_highest_within_one_set() {
        let set = vec![mk("a", 0.9), mk("b", 0.8), mk("c", 0.7)];
        let fused = reciprocal_rank_fusion(&[set], 60);
        let ids: Vec<&str> = fused.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn rrf_empty_input() {
        assert!(reciprocal_rank_fusion(&[], 60).is_empty());
        assert!(reciprocal_rank_fusion(&[vec![]], 60).is_empty());
    }

    #[test]
    fn expansion_cutoff() {
        assert!(needs_expansion("testigos bautismo", 30));
        assert!(!needs_expansion(
            "¿qué documentos necesito para casarme por la iglesia?",
            30
        ));
    }

    #[test]
    fn context_joins_with_separator() {
        let matches = vec![
            to_doc_match(mk("a", 0.9)),
            to_doc_match(mk("b", 0.8)),
        ];
        let context = assemble_context(&matches);
        assert!(context.contains("contenido a"));
        assert!(context.contains("\n\n---\n\n"));
    }

    #[test]
    fn empty_context_uses_fallback_message() {
        assert_eq!(assemble_context(&[]), NO_RESULTS_MESSAGE);
    }

    #[test]
    fn long_content_clipped_with_ellipsis() {
        let mut m = to_doc_match(mk("a", 0.9));
        m.content = "x".repeat(2000);
        let context = assemble_context(&[m]);
        assert!(context.len() < 1100);
        assert!(context.ends_with("..."));
    }

    #[test]
    fn doc_match_reads_metadata_fields() {
        let m = IndexMatch {
            id: "doc:0".to_string(),
            score: 0.5,
            metadata: Some(json!({
                "titulo": "Eloos",
                "categoria_pastoral": "jovenes",
                "pageContent": "Grupo joven",
            })),
        };
        let dm = to_doc_match(m);
        assert_eq!(dm.title.as_deref(), Some("Eloos"));
        assert_eq!(dm.categoria.as_deref(), Some("jovenes"));
        assert_eq!(dm.content, "Grupo joven");
    }
}
