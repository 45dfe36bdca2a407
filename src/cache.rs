//! Response cache for chat answers, backed by the shared KV store.
//!
//! Two classes of question are never cached: anything calendar- or
//! date-flavored (the answer goes stale within hours) and bare courtesy
//! messages ("gracias", "vale") — caching those once produced the same
//! canned reply for every short message. Keys are the SHA-256 of the
//! normalized question; entries expire after an hour. Any KV failure
//! degrades to a cache miss.

use redis::aio::ConnectionManager;
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::config::KvConfig;

const KEY_PREFIX: &str = "chat_cache:";
const TTL_SECS: u64 = 60 * 60;

const CALENDAR_KEYWORDS: &[&str] = &[
    "evento",
    "eventos",
    "actividad",
    "actividades",
    "hoy",
    "mañana",
    "próximo",
    "proxima",
    "próxima",
    "cuando",
    "cuándo",
    "fecha",
    "fechas",
    "semana",
    "mes",
    "día",
    "dia",
    "calendario",
    "programado",
    "programada",
    "horario de misa",
    "misas",
    "misa de",
    "qué hay",
    "que hay",
];

const GENERIC_WORDS: &[&str] = &[
    "gracias", "ok", "vale", "entendido", "perfecto", "si", "sí", "no", "claro", "hola", "adios",
    "adiós", "bien", "mal", "bueno", "genial",
];

/// Lowercase, strip punctuation, collapse whitespace.
pub fn normalize_question(question: &str) -> String {
    let lowered = question.to_lowercase();
    let stripped: String = lowered
        .chars()
        .filter(|c| !matches!(c, '¿' | '?' | '¡' | '!' | '.' | ',' | ';' | ':'))
        .collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn is_calendar_related(question: &str) -> bool {
    let normalized = normalize_question(question);
    CALENDAR_KEYWORDS.iter().any(|kw| normalized.contains(kw))
}

/// 1–3 words, all of them courtesy words.
pub fn is_generic_courtesy(question: &str) -> bool {
    let normalized = normalize_question(question);
    let words: Vec<&str> = normalized.split(' ').filter(|w| !w.is_empty()).collect();
    if words.is_empty() || words.len() > 3 {
        return false;
    }
    words.iter().all(|w| GENERIC_WORDS.contains(w))
}

/// Whether an answer for this question may be stored at all.
pub fn cacheable(question: &str) -> bool {
    !is_calendar_related(question) && !is_generic_courtesy(question)
}

fn cache_key(question: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_question(question).as_bytes());
    format!("{}{:x}", KEY_PREFIX, hasher.finalize())
}

pub struct ResponseCache {
    conn: Option<ConnectionManager>,
}

impl ResponseCache {
    pub async fn connect(kv: &KvConfig) -> Self {
        let conn = match kv.url.as_deref() {
            None => None,
            Some(url) => match redis::Client::open(url) {
                Ok(client) => match ConnectionManager::new(client).await {
                    Ok(conn) => Some(conn),
                    Err(e) => {
                        warn!("KV connection failed ({}); response cache disabled", e);
                        None
                    }
                },
                Err(e) => {
                    warn!("KV URL invalid ({}); response cache disabled", e);
                    None
                }
            },
        };
        Self { conn }
    }

    pub async fn get(&self, question: &str) -> Option<String> {
        if !cacheable(question) {
            return None;
        }
        let mut conn = self.conn.clone()?;
        match redis::cmd("GET")
            .arg(cache_key(question))
            .query_async::<_, Option<String>>(&mut conn)
            .await
        {
            Ok(hit) => hit,
            Err(e) => {
                warn!("cache GET failed: {}", e);
                None
            }
        }
    }

    pub async fn set(&self, question: &str, answer: &str) {
        if !cacheable(question) {
            return;
        }
        let Some(conn) = self.conn.clone() else {
            return;
        };
        let mut conn = conn;
        if let Err(e) = redis::cmd("SET")
            .arg(cache_key(question))
            .arg(answer)
            .arg("EX")
            .arg(TTL_SECS)
            .query_async::<_, ()>(&mut conn)
            .await
        {
            warn!("cache SET failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_strips_punctuation_and_case() {
        assert_eq!(
            normalize_question("¿Qué es   ELOOS?!"),
            "qué es eloos"
        );
    }

    #[test]
    fn calendar_questions_excluded() {
        assert!(is_calendar_related("¿Qué eventos hay esta semana?"));
        assert!(is_calendar_related("horario de misa del domingo"));
        assert!(!is_calendar_related("¿Qué es Eloos?"));
    }

    #[test]
    fn generic_courtesy_excluded() {
        assert!(is_generic_courtesy("gracias"));
        assert!(is_generic_courtesy("vale, gracias!"));
        assert!(!is_generic_courtesy("gracias por la información sobre eloos"));
        assert!(!is_generic_courtesy(""));
    }

    #[test]
    fn cacheable_combines_both_rules() {
        assert!(cacheable("¿Qué documentos necesito para el bautismo?"));
        assert!(!cacheable("gracias"));
        assert!(!cacheable("eventos de mañana"));
    }

    #[test]
    fn same_question_same_key_after_normalization() {
        assert_eq!(cache_key("¿Qué es Eloos?"), cache_key("qué es eloos"));
        assert_ne!(cache_key("bautismo"), cache_key("matrimonio"));
    }

    #[tokio::test]
    async fn disconnected_cache_misses_quietly() {
        let cache = ResponseCache::connect(&KvConfig { url: None }).await;
        assert!(cache.get("¿Qué es Eloos?").await.is_none());
        cache.set("¿Qué es Eloos?", "Un grupo joven").await; // no-op
    }
}
