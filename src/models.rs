//! Core data types shared across the ingestion pipeline and the app API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Raw item produced by a connector before normalization.
#[derive(Debug, Clone)]
pub struct SourceItem {
    pub source: String,
    pub source_id: String,
    pub source_url: Option<String>,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub content_type: String,
    pub body: String,
}

/// A chunk of a document's body text, enriched with pastoral metadata
/// before being pushed to the vector index.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub chunk_index: i64,
    /// Section heading the chunk was cut from, when the source is a
    /// `## `-structured markdown document.
    pub section: Option<String>,
    pub text: String,
    pub hash: String,
}

/// A match returned from the vector index, post-threshold.
#[derive(Debug, Clone, Serialize)]
pub struct DocMatch {
    pub id: String,
    pub score: f64,
    pub title: Option<String>,
    pub categoria: Option<String>,
    pub content: String,
}

/// Saint-of-the-day record, one row per date. Rows are maintained by
/// hand in the hosted table, so every field tolerates absence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Saint {
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
}

/// Gospel-of-the-day record, one row per date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Gospel {
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub passage: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

/// A parish calendar event, already expanded from any recurrence rule.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CalendarEvent {
    pub id: String,
    pub title: String,
    /// RFC 3339 UTC instant.
    pub start: String,
    pub end: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub all_day: bool,
}

/// One turn of chat history as sent by the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub role: String,
    pub content: String,
}

/// Downloadable resource surfaced alongside a chat answer.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ResourceAttachment {
    pub title: String,
    pub url: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
}

/// Registered push-notification device token.
#[derive(Debug, Clone, Deserialize)]
pub struct PushToken {
    pub id: i64,
    pub token: String,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub last_used: Option<String>,
}
