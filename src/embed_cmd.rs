//! Embedding management: backfill pending chunks, rebuild the index,
//! and the inline embed-and-push used during sync.
//!
//! The local `embeddings` table records the text hash last pushed per
//! chunk, so `embed pending` only touches chunks that are new or whose
//! text changed. Vector ids are `{document_id}:{chunk_index}` — stable
//! across syncs, so a re-push overwrites in place.

use anyhow::{bail, Result};
use sha2::{Digest, Sha256};
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::embedding;
use crate::index::{self, IndexVector, VectorIndex};
use crate::metadata::ChunkMetadata;
use crate::models::{Chunk, SourceItem};

struct PendingChunk {
    chunk_id: String,
    document_id: String,
    chunk_index: i64,
    section: Option<String>,
    text: String,
    text_hash: String,
    doc_title: Option<String>,
    file_name: String,
}

impl PendingChunk {
    fn vector_id(&self) -> String {
        format!("{}:{}", self.document_id, self.chunk_index)
    }

    fn metadata_json(&self) -> serde_json::Value {
        let title = self
            .section
            .clone()
            .or_else(|| self.doc_title.clone())
            .unwrap_or_default();
        ChunkMetadata::derive(&title, &self.text).to_index_json(&self.text, &self.file_name)
    }
}

/// Find and push chunks that are missing or have stale embeddings.
pub async fn run_embed_pending(
    config: &Config,
    limit: Option<usize>,
    batch_size_override: Option<usize>,
    dry_run: bool,
) -> Result<()> {
    require_enabled(config)?;

    let provider = embedding::create_provider(&config.embedding)?;
    let vector_index = index::create_index(&config.index)?;
    let pool = db::connect(config).await?;
    let batch_size = batch_size_override.unwrap_or(config.embedding.batch_size);

    let pending = find_pending_chunks(&pool, provider.model_name(), limit).await?;

    if dry_run {
        println!("embed pending (dry-run)");
        println!("  chunks needing embeddings: {}", pending.len());
        return Ok(());
    }

    if pending.is_empty() {
        println!("embed pending");
        println!("  all chunks up to date");
        return Ok(());
    }

    let (embedded, failed) = push_batches(
        config,
        &pool,
        provider.as_ref(),
        vector_index.as_ref(),
        &pending,
        batch_size,
    )
    .await;

    println!("embed pending");
    println!("  total pending: {}", pending.len());
    println!("  pushed: {}", embedded);
    println!("  failed: {}", failed);

    pool.close().await;
    Ok(())
}

/// Clear the remote index and local bookkeeping, then re-push every chunk.
pub async fn run_embed_rebuild(config: &Config, batch_size_override: Option<usize>) -> Result<()> {
    require_enabled(config)?;

    let provider = embedding::create_provider(&config.embedding)?;
    let vector_index = index::create_index(&config.index)?;
    let pool = db::connect(config).await?;
    let batch_size = batch_size_override.unwrap_or(config.embedding.batch_size);

    vector_index.clear().await?;
    sqlx::query("DELETE FROM embeddings").execute(&pool).await?;

    println!("embed rebuild — cleared index and local records");

    let all_chunks = find_pending_chunks(&pool, provider.model_name(), None).await?;

    if all_chunks.is_empty() {
        println!("  no chunks to embed");
        pool.close().await;
        return Ok(());
    }

    let (embedded, failed) = push_batches(
        config,
        &pool,
        provider.as_ref(),
        vector_index.as_ref(),
        &all_chunks,
        batch_size,
    )
    .await;

    println!("embed rebuild");
    println!("  total chunks: {}", all_chunks.len());
    println!("  pushed: {}", embedded);
    println!("  failed: {}", failed);

    pool.close().await;
    Ok(())
}

fn require_enabled(config: &Config) -> Result<()> {
    if !config.embedding.is_enabled() {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.");
    }
    if !config.index.is_enabled() {
        bail!("Vector index is disabled. Set [index] provider in config.");
    }
    Ok(())
}

async fn push_batches(
    config: &Config,
    pool: &SqlitePool,
    provider: &dyn embedding::EmbeddingProvider,
    vector_index: &dyn VectorIndex,
    pending: &[PendingChunk],
    batch_size: usize,
) -> (u64, u64) {
    let mut embedded = 0u64;
    let mut failed = 0u64;

    for batch in pending.chunks(batch_size.max(1)) {
        let texts: Vec<String> = batch.iter().map(|p| p.text.clone()).collect();

        let vectors = match embedding::embed_texts(provider, &config.embedding, &texts).await {
            Ok(v) => v,
            Err(e) => {
                eprintln!("Warning: embedding batch failed: {}", e);
                failed += batch.len() as u64;
                continue;
            }
        };

        let payload: Vec<IndexVector> = batch
            .iter()
            .zip(vectors.iter())
            .map(|(item, vec)| IndexVector {
                id: item.vector_id(),
                values: vec.clone(),
                metadata: item.metadata_json(),
            })
            .collect();

        if let Err(e) = vector_index.upsert(&payload).await {
            eprintln!("Warning: index upsert failed: {}", e);
            failed += batch.len() as u64;
            continue;
        }

        for item in batch {
            if let Err(e) = record_embedding(
                pool,
                &item.chunk_id,
                provider.model_name(),
                provider.dims(),
                &item.text_hash,
            )
            .await
            {
                eprintln!("Warning: failed to record embedding for {}: {}", item.chunk_id, e);
            }
            embedded += 1;
        }
    }

    (embedded, failed)
}

/// Embed and push chunks during sync. Non-fatal on failure: returns
/// (pushed, pending) counts.
pub async fn embed_chunks_inline(
    config: &Config,
    pool: &SqlitePool,
    vector_index: &dyn VectorIndex,
    item: &SourceItem,
    chunks: &[Chunk],
) -> (u64, u64) {
    if !config.embedding.is_enabled() {
        return (0, 0);
    }
    if !config.index.is_enabled() {
        eprintln!("Warning: embeddings enabled but vector index disabled; chunks left pending");
        return (0, chunks.len() as u64);
    }

    let provider = match embedding::create_provider(&config.embedding) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Warning: could not create embedding provider: {}", e);
            return (0, chunks.len() as u64);
        }
    };

    let model_name = provider.model_name().to_string();
    let mut fresh = 0u64;
    let mut need: Vec<PendingChunk> = Vec::new();

    for chunk in chunks {
        let text_hash = hash_text(&chunk.text);
        let existing: Option<String> =
            sqlx::query_scalar("SELECT hash FROM embeddings WHERE chunk_id = ? AND model = ?")
                .bind(&chunk.id)
                .bind(&model_name)
                .fetch_optional(pool)
                .await
                .unwrap_or(None);

        if existing.as_deref() == Some(&text_hash) {
            fresh += 1;
            continue;
        }

        need.push(PendingChunk {
            chunk_id: chunk.id.clone(),
            document_id: chunk.document_id.clone(),
            chunk_index: chunk.chunk_index,
            section: chunk.section.clone(),
            text: chunk.text.clone(),
            text_hash,
            doc_title: item.title.clone(),
            file_name: item.source_id.clone(),
        });
    }

    if need.is_empty() {
        return (fresh, 0);
    }

    let (pushed, failed) = push_batches(
        config,
        pool,
        provider.as_ref(),
        vector_index,
        &need,
        config.embedding.batch_size,
    )
    .await;

    (fresh + pushed, failed)
}

async fn find_pending_chunks(
    pool: &SqlitePool,
    model: &str,
    limit: Option<usize>,
) -> Result<Vec<PendingChunk>> {
    let limit_val = limit.unwrap_or(usize::MAX) as i64;

    let rows = sqlx::query(
        r#"
        SELECT c.id AS chunk_id, c.document_id, c.chunk_index, c.section, c.text,
               d.title AS doc_title, d.source_id AS file_name
        FROM chunks c
        JOIN documents d ON d.id = c.document_id
        LEFT JOIN embeddings e ON e.chunk_id = c.id AND e.model = ?
        WHERE e.chunk_id IS NULL OR e.hash != c.hash
        ORDER BY c.document_id, c.chunk_index
        LIMIT ?
        "#,
    )
    .bind(model)
    .bind(limit_val)
    .fetch_all(pool)
    .await?;

    let results: Vec<PendingChunk> = rows
        .iter()
        .map(|row| {
            let text: String = row.get("text");
            let text_hash = hash_text(&text);
            PendingChunk {
                chunk_id: row.get("chunk_id"),
                document_id: row.get("document_id"),
                chunk_index: row.get("chunk_index"),
                section: row.get("section"),
                text,
                text_hash,
                doc_title: row.get("doc_title"),
                file_name: row.get("file_name"),
            }
        })
        .collect();

    Ok(results)
}

async fn record_embedding(
    pool: &SqlitePool,
    chunk_id: &str,
    model: &str,
    dims: usize,
    text_hash: &str,
) -> Result<()> {
    let now = chrono::Utc::now().timestamp();

    sqlx::query(
        r#"
        INSERT INTO embeddings (chunk_id, model, dims, created_at, hash)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(chunk_id) DO UPDATE SET
            model = excluded.model,
            dims = excluded.dims,
            created_at = excluded.created_at,
            hash = excluded.hash
        "#,
    )
    .bind(chunk_id)
    .bind(model)
    .bind(dims as i64)
    .bind(now)
    .bind(text_hash)
    .execute(pool)
    .await?;

    Ok(())
}

fn hash_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
