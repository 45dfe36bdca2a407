//! Embedded catalog of parish resources (inscription forms, info PDFs).
//!
//! The catalog is compiled in — it changes a few times a year and the
//! chat endpoint runs in environments without a writable filesystem. A
//! keyword → resource inverted index is built once at startup; lookups
//! score by keyword coverage and return the top matches, which the chat
//! layer surfaces as attachments.

use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use crate::models::ResourceAttachment;

struct Resource {
    id: &'static str,
    title: &'static str,
    description: &'static str,
    url: &'static str,
    kind: &'static str,
    keywords: &'static [&'static str],
}

const RESOURCES: &[Resource] = &[
    Resource {
        id: "comunidad_eloos",
        title: "Formulario de Inscripción - Comunidad Eloos",
        description: "Formulario para unirse a la comunidad Eloos (Entrega y Superación)",
        url: "https://form.typeform.com/to/eA98edUa",
        kind: "url",
        keywords: &[
            "comunidad",
            "eloos",
            "entrega",
            "superacion",
            "superación",
            "unirse",
            "apuntarse",
            "inscripcion",
            "inscripción",
            "formulario",
            "joven",
            "jóvenes",
            "grupo",
        ],
    },
    Resource {
        id: "comunidad_eloos_pdf",
        title: "Documento Informativo - Comunidad Eloos (PDF)",
        description: "Información detallada sobre la comunidad Eloos en formato PDF",
        url: "/docs/comunidad-eloos.pdf",
        kind: "pdf",
        keywords: &[
            "comunidad",
            "eloos",
            "documento",
            "pdf",
            "informacion",
            "información",
            "descargar",
            "archivo",
        ],
    },
    Resource {
        id: "catequesis_inscripcion",
        title: "Inscripción Catequesis de Primera Comunión",
        description: "Formulario de inscripción para la catequesis de iniciación cristiana",
        url: "/docs/inscripcion-catequesis.pdf",
        kind: "pdf",
        keywords: &[
            "catequesis",
            "inscripcion",
            "inscripción",
            "comunion",
            "comunión",
            "niños",
            "formulario",
            "apuntar",
        ],
    },
    Resource {
        id: "autorizacion_salidas",
        title: "Autorización de Salidas - Menores",
        description: "Autorización para salidas y excursiones de menores de edad",
        url: "/docs/autorizacion-salidas.pdf",
        kind: "pdf",
        keywords: &[
            "autorizacion",
            "autorización",
            "salida",
            "salidas",
            "excursion",
            "excursión",
            "menores",
            "permiso",
        ],
    },
];

/// Minimum keyword coverage for a resource to be considered a match.
/// Catalogs carry a dozen keywords per entry, so one solid hit
/// ("eloos") must be enough.
const MIN_RELEVANCE: f64 = 0.05;
const MAX_RESULTS: usize = 3;

fn keyword_index() -> &'static HashMap<&'static str, Vec<usize>> {
    static INDEX: OnceLock<HashMap<&'static str, Vec<usize>>> = OnceLock::new();
    INDEX.get_or_init(|| {
        let mut index: HashMap<&'static str, Vec<usize>> = HashMap::new();
        for (i, resource) in RESOURCES.iter().enumerate() {
            for keyword in resource.keywords {
                index.entry(keyword).or_default().push(i);
            }
        }
        index
    })
}

/// Fraction of a resource's keywords matched by the query. A keyword
/// counts when the query contains it whole, or shares a word with it.
fn relevance(query: &str, keywords: &[&str]) -> f64 {
    if keywords.is_empty() {
        return 0.0;
    }
    let query = query.to_lowercase();
    let query_words: HashSet<&str> = query.split_whitespace().collect();

    let mut matched = 0usize;
    for keyword in keywords {
        if query.contains(keyword) || query_words.contains(keyword) {
            matched += 1;
        }
    }

    matched as f64 / keywords.len() as f64
}

/// Search the catalog. Candidates come from the inverted index; scores
/// from keyword coverage.
pub fn search_resources(query: &str) -> Vec<ResourceAttachment> {
    let normalized = query.to_lowercase();
    let index = keyword_index();

    let mut candidates: HashSet<usize> = HashSet::new();
    for word in normalized.split_whitespace() {
        if let Some(ids) = index.get(word) {
            candidates.extend(ids);
        }
    }
    // Multi-word keywords ("horario de misa" style) never match on a
    // single word; check containment over the whole query too.
    for (keyword, ids) in index.iter() {
        if keyword.contains(' ') && normalized.contains(keyword) {
            candidates.extend(ids);
        }
    }

    let mut scored: Vec<(f64, &Resource)> = candidates
        .into_iter()
        .map(|i| &RESOURCES[i])
        .map(|r| (relevance(&normalized, r.keywords), r))
        .filter(|(score, _)| *score >= MIN_RELEVANCE)
        .collect();

    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(MAX_RESULTS);

    scored
        .into_iter()
        .map(|(_, r)| ResourceAttachment {
            title: r.title.to_string(),
            url: r.url.to_string(),
            kind: r.kind.to_string(),
            description: r.description.to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eloos_query_finds_both_eloos_resources() {
        let results = search_resources("quiero apuntarme a eloos");
        assert!(!results.is_empty());
        assert!(results.iter().any(|r| r.title.contains("Inscripción")));
    }

    #[test]
    fn inscription_form_ranks_first_for_inscription_query() {
        let results = search_resources("formulario inscripción eloos");
        assert_eq!(
            results[0].title,
            "Formulario de Inscripción - Comunidad Eloos"
        );
    }

    #[test]
    fn unrelated_query_finds_nothing() {
        assert!(search_resources("recetas de cocina").is_empty());
    }

    #[test]
    fn results_capped() {
        let results = search_resources("comunidad eloos catequesis autorización formulario");
        assert!(results.len() <= MAX_RESULTS);
    }

    #[test]
    fn relevance_counts_matched_fraction() {
        let score = relevance("eloos", &["eloos", "grupo"]);
        assert!((score - 0.5).abs() < 1e-9);
        assert_eq!(relevance("nada", &["eloos"]), 0.0);
    }
}
