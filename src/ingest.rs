//! Ingestion pipeline orchestration.
//!
//! Coordinates the full sync flow: connector → normalization → chunking
//! → metadata enrichment → embedding → vector-index upsert, with the
//! local catalog recording what was pushed. Supports incremental sync
//! via checkpoints; embedding/upsert failures are non-fatal and leave
//! chunks pending for `parro embed pending`.

use anyhow::{bail, Result};
use chrono::NaiveDate;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::chunk::chunk_document;
use crate::config::Config;
use crate::connector_fs;
use crate::db;
use crate::embed_cmd;
use crate::index;
use crate::models::SourceItem;

pub async fn run_sync(
    config: &Config,
    connector: &str,
    full: bool,
    dry_run: bool,
    since: Option<String>,
    until: Option<String>,
    limit: Option<usize>,
) -> Result<()> {
    let pool = db::connect(config).await?;

    let checkpoint: Option<i64> = if full {
        None
    } else {
        get_checkpoint(&pool, connector).await?
    };

    let mut items = match connector {
        "filesystem" => connector_fs::scan_filesystem(config)?,
        _ => bail!("Unknown connector: '{}'. Available: filesystem", connector),
    };

    if let Some(cp) = checkpoint {
        items.retain(|item| item.updated_at.timestamp() > cp);
    }

    if let Some(ref since_str) = since {
        let since_ts = parse_day_bound(since_str, false)?;
        items.retain(|item| item.updated_at.timestamp() >= since_ts);
    }

    if let Some(ref until_str) = until {
        let until_ts = parse_day_bound(until_str, true)?;
        items.retain(|item| item.updated_at.timestamp() <= until_ts);
    }

    if let Some(lim) = limit {
        items.truncate(lim);
    }

    if dry_run {
        println!("sync {} (dry-run)", connector);
        println!("  items found: {}", items.len());
        let total_chunks: usize = items
            .iter()
            .map(|item| chunk_document("tmp", &item.body, config.chunking.max_tokens).len())
            .sum();
        println!("  estimated chunks: {}", total_chunks);
        return Ok(());
    }

    let vector_index = index::create_index(&config.index)?;

    let mut docs_upserted = 0u64;
    let mut chunks_written = 0u64;
    let mut vectors_pushed = 0u64;
    let mut vectors_pending = 0u64;
    let mut max_updated: i64 = checkpoint.unwrap_or(0);

    for item in &items {
        let doc_id = upsert_document(&pool, item).await?;
        let chunks = chunk_document(&doc_id, &item.body, config.chunking.max_tokens);
        let chunk_count = chunks.len() as u64;

        let old_count = replace_chunks(&pool, &doc_id, &chunks).await?;

        // Remote ids are `{doc_id}:{index}`, so shrinking a document
        // leaves tail vectors behind; drop them best-effort.
        if config.index.is_enabled() && old_count > chunks.len() {
            let stale: Vec<String> = (chunks.len()..old_count)
                .map(|i| format!("{}:{}", doc_id, i))
                .collect();
            if let Err(e) = vector_index.delete(&stale).await {
                eprintln!("Warning: could not delete stale vectors: {}", e);
            }
        }

        let (pushed, pending) =
            embed_cmd::embed_chunks_inline(config, &pool, vector_index.as_ref(), item, &chunks)
                .await;
        vectors_pushed += pushed;
        vectors_pending += pending;

        docs_upserted += 1;
        chunks_written += chunk_count;

        let ts = item.updated_at.timestamp();
        if ts > max_updated {
            max_updated = ts;
        }
    }

    set_checkpoint(&pool, connector, max_updated).await?;

    println!("sync {}", connector);
    println!("  fetched: {} items", items.len());
    println!("  upserted documents: {}", docs_upserted);
    println!("  chunks written: {}", chunks_written);
    if config.embedding.is_enabled() {
        println!("  vectors pushed: {}", vectors_pushed);
        println!("  vectors pending: {}", vectors_pending);
    }
    println!("  checkpoint: {}", max_updated);
    println!("ok");

    pool.close().await;
    Ok(())
}

fn parse_day_bound(s: &str, end_of_day: bool) -> Result<i64> {
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")?;
    let time = if end_of_day {
        date.and_hms_opt(23, 59, 59)
    } else {
        date.and_hms_opt(0, 0, 0)
    };
    Ok(time
        .ok_or_else(|| anyhow::anyhow!("invalid date: {}", s))?
        .and_utc()
        .timestamp())
}

async fn upsert_document(pool: &SqlitePool, item: &SourceItem) -> Result<String> {
    let mut hasher = Sha256::new();
    hasher.update(item.source.as_bytes());
    hasher.update(item.source_id.as_bytes());
    hasher.update(item.updated_at.timestamp().to_le_bytes());
    hasher.update(item.body.as_bytes());
    let dedup_hash = format!("{:x}", hasher.finalize());

    let existing_id: Option<String> =
        sqlx::query_scalar("SELECT id FROM documents WHERE source = ? AND source_id = ?")
            .bind(&item.source)
            .bind(&item.source_id)
            .fetch_optional(pool)
            .await?;

    let doc_id = existing_id.unwrap_or_else(|| Uuid::new_v4().to_string());

    sqlx::query(
        r#"
        INSERT INTO documents (id, source, source_id, source_url, title, created_at, updated_at, content_type, body, dedup_hash)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(source, source_id) DO UPDATE SET
            source_url = excluded.source_url,
            title = excluded.title,
            updated_at = excluded.updated_at,
            content_type = excluded.content_type,
            body = excluded.body,
            dedup_hash = excluded.dedup_hash
        "#,
    )
    .bind(&doc_id)
    .bind(&item.source)
    .bind(&item.source_id)
    .bind(&item.source_url)
    .bind(&item.title)
    .bind(item.created_at.timestamp())
    .bind(item.updated_at.timestamp())
    .bind(&item.content_type)
    .bind(&item.body)
    .bind(&dedup_hash)
    .execute(pool)
    .await?;

    Ok(doc_id)
}

/// Replace a document's chunks. Returns the previous chunk count so the
/// caller can reap stale remote vectors.
async fn replace_chunks(
    pool: &SqlitePool,
    document_id: &str,
    chunks: &[crate::models::Chunk],
) -> Result<usize> {
    let mut tx = pool.begin().await?;

    let old_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE document_id = ?")
        .bind(document_id)
        .fetch_one(&mut *tx)
        .await?;

    sqlx::query(
        "DELETE FROM embeddings WHERE chunk_id IN (SELECT id FROM chunks WHERE document_id = ?)",
    )
    .bind(document_id)
    .execute(&mut *tx)
    .await?;

    sqlx::query("DELETE FROM chunks WHERE document_id = ?")
        .bind(document_id)
        .execute(&mut *tx)
        .await?;

    for chunk in chunks {
        sqlx::query(
            "INSERT INTO chunks (id, document_id, chunk_index, section, text, hash) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&chunk.id)
        .bind(&chunk.document_id)
        .bind(chunk.chunk_index)
        .bind(&chunk.section)
        .bind(&chunk.text)
        .bind(&chunk.hash)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(old_count as usize)
}

async fn get_checkpoint(pool: &SqlitePool, source: &str) -> Result<Option<i64>> {
    let result: Option<String> =
        sqlx::query_scalar("SELECT cursor FROM checkpoints WHERE source = ?")
            .bind(source)
            .fetch_optional(pool)
            .await?;

    Ok(result.and_then(|s| s.parse::<i64>().ok()))
}

async fn set_checkpoint(pool: &SqlitePool, source: &str, cursor_val: i64) -> Result<()> {
    let now = chrono::Utc::now().timestamp();
    sqlx::query(
        r#"
        INSERT INTO checkpoints (source, cursor, updated_at) VALUES (?, ?, ?)
        ON CONFLICT(source) DO UPDATE SET cursor = excluded.cursor, updated_at = excluded.updated_at
        "#,
    )
    .bind(source)
    .bind(cursor_val.to_string())
    .bind(now)
    .execute(pool)
    .await?;

    Ok(())
}
