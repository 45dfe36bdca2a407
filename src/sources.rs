//! Subsystem status overview for `parro sources`.
//!
//! One line per external dependency: is it configured, and does the
//! cheap local health check pass. Useful before a sync or a deploy.

use anyhow::Result;

use crate::config::Config;

pub fn list_sources(config: &Config) -> Result<()> {
    println!("{:<16} {:<40}", "SUBSYSTEM", "STATUS");

    let fs_status = match &config.connectors.filesystem {
        Some(fs_config) if fs_config.root.exists() => "OK".to_string(),
        Some(fs_config) => format!("root does not exist: {}", fs_config.root.display()),
        None => "NOT CONFIGURED".to_string(),
    };
    println!("{:<16} {:<40}", "filesystem", fs_status);

    let embedding_status = if config.embedding.is_enabled() {
        if std::env::var("OPENAI_API_KEY").is_ok() {
            format!("OK ({})", config.embedding.model.as_deref().unwrap_or("?"))
        } else {
            "OPENAI_API_KEY not set".to_string()
        }
    } else {
        "disabled".to_string()
    };
    println!("{:<16} {:<40}", "embedding", embedding_status);

    let index_status = if config.index.is_enabled() {
        if std::env::var("PINECONE_API_KEY").is_ok() {
            "OK".to_string()
        } else {
            "PINECONE_API_KEY not set".to_string()
        }
    } else {
        "disabled".to_string()
    };
    println!("{:<16} {:<40}", "index", index_status);

    let auth_status = if std::env::var("SUPABASE_URL").is_ok()
        && std::env::var("SUPABASE_SERVICE_ROLE_KEY").is_ok()
    {
        "OK"
    } else {
        "NOT CONFIGURED"
    };
    println!("{:<16} {:<40}", "auth", auth_status);

    let calendar_status = if config.calendar.ics_url.is_some() {
        "OK"
    } else {
        "NOT CONFIGURED"
    };
    println!("{:<16} {:<40}", "calendar", calendar_status);

    let mail_status = if std::env::var("RESEND_API_KEY").is_ok() {
        "OK"
    } else {
        "NOT CONFIGURED"
    };
    println!("{:<16} {:<40}", "mail", mail_status);

    let push_status = if std::env::var("FIREBASE_PROJECT_ID").is_ok() {
        "OK"
    } else {
        "NOT CONFIGURED"
    };
    println!("{:<16} {:<40}", "push", push_status);

    let kv_status = if config.kv.url.is_some() {
        "OK"
    } else {
        "NOT CONFIGURED (rate limiting disabled)"
    };
    println!("{:<16} {:<40}", "kv", kv_status);

    Ok(())
}
