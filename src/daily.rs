//! Daily liturgical content: saint and gospel of the day.
//!
//! One row per date in the hosted `saints` / `gospels` tables, keyed by
//! the Madrid-local date. The app never hard-fails the home screen: a
//! missing row or an unconfigured backend falls back to built-in
//! default content, and the `source` field tells the client which one
//! it got (`supabase`, `default`, `error`).

use serde::Serialize;
use serde_json::json;
use tracing::{error, warn};

use crate::models::{Gospel, Saint};
use crate::supabase::SupabaseClient;
use crate::tz;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentSource {
    Supabase,
    Default,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct DailyContent {
    pub success: bool,
    pub date: String,
    pub source: ContentSource,
    pub content: serde_json::Value,
}

fn default_saint() -> serde_json::Value {
    json!({
        "nombre": "Santos del Día",
        "descripcion": "La Iglesia conmemora a los santos y bienaventurados de este día.",
    })
}

fn default_gospel() -> serde_json::Value {
    json!({
        "cita": "Evangelio del día",
        "texto": "La Palabra de Dios nos acompaña cada día. Consulta el Evangelio del día en la liturgia.",
        "reflexion": "Que la Palabra de Dios ilumine tu camino hoy.",
    })
}

/// Saint of the day for the Madrid-local date.
pub async fn saint_today(supabase: Option<&SupabaseClient>) -> DailyContent {
    let date = tz::today_madrid();

    let Some(client) = supabase else {
        warn!("Supabase not configured, returning default saint");
        return DailyContent {
            success: true,
            date,
            source: ContentSource::Default,
            content: default_saint(),
        };
    };

    match client
        .fetch_single("saints", &[("date", format!("eq.{}", date))])
        .await
    {
        Ok(Some(row)) => {
            let saint: Saint = serde_json::from_value(row).unwrap_or(Saint {
                date: date.clone(),
                name: None,
                bio: None,
            });
            DailyContent {
                success: true,
                date,
                source: ContentSource::Supabase,
                content: json!({
                    "nombre": saint.name.as_deref().unwrap_or("Santos del día"),
                    "descripcion": saint.bio.as_deref().unwrap_or("No disponible"),
                }),
            }
        }
        Ok(None) => DailyContent {
            success: true,
            date,
            source: ContentSource::Default,
            content: default_saint(),
        },
        Err(e) => {
            error!("saint lookup failed: {}", e);
            DailyContent {
                success: false,
                date,
                source: ContentSource::Error,
                content: default_saint(),
            }
        }
    }
}

/// Gospel of the day for the Madrid-local date.
pub async fn gospel_today(supabase: Option<&SupabaseClient>) -> DailyContent {
    let date = tz::today_madrid();

    let Some(client) = supabase else {
        warn!("Supabase not configured, returning default gospel");
        return DailyContent {
            success: true,
            date,
            source: ContentSource::Default,
            content: default_gospel(),
        };
    };

    match client
        .fetch_single("gospels", &[("date", format!("eq.{}", date))])
        .await
    {
        Ok(Some(row)) => {
            let gospel: Gospel = serde_json::from_value(row).unwrap_or(Gospel {
                date: date.clone(),
                title: None,
                passage: None,
                content: None,
            });
            DailyContent {
                success: true,
                date,
                source: ContentSource::Supabase,
                content: json!({
                    "cita": gospel.passage.as_deref().unwrap_or("Sin referencia"),
                    "texto": gospel.content.as_deref().unwrap_or("No disponible"),
                    "reflexion": gospel.title,
                }),
            }
        }
        Ok(None) => DailyContent {
            success: true,
            date,
            source: ContentSource::Default,
            content: default_gospel(),
        },
        Err(e) => {
            error!("gospel lookup failed: {}", e);
            DailyContent {
                success: false,
                date,
                source: ContentSource::Error,
                content: default_gospel(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unconfigured_backend_returns_default_saint() {
        let result = saint_today(None).await;
        assert!(result.success);
        assert_eq!(result.source, ContentSource::Default);
        assert_eq!(result.content["nombre"], "Santos del Día");
        // Key format YYYY-MM-DD
        assert_eq!(result.date.len(), 10);
    }

    #[tokio::test]
    async fn unconfigured_backend_returns_default_gospel() {
        let result = gospel_today(None).await;
        assert!(result.success);
        assert_eq!(result.source, ContentSource::Default);
        assert_eq!(result.content["cita"], "Evangelio del día");
    }

    #[test]
    fn source_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&ContentSource::Supabase).unwrap(),
            "\"supabase\""
        );
    }
}
