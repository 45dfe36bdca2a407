//! Catalog and index statistics.
//!
//! `parro index stats` gives a quick answer to "did the last sync and
//! embed actually land": local document/chunk counts, how many chunks
//! have been pushed, and — when the remote index is configured — the
//! vector count Pinecone reports, so drift between the two is visible.

use anyhow::Result;
use sqlx::Row;

use crate::config::Config;
use crate::db;
use crate::index;

pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    let total_docs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
        .fetch_one(&pool)
        .await?;

    let total_chunks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
        .fetch_one(&pool)
        .await?;

    let total_pushed: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM embeddings")
        .fetch_one(&pool)
        .await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("parro — Catalog Stats");
    println!("=====================");
    println!();
    println!("  Database:  {}", config.db.path.display());
    println!("  Size:      {}", format_bytes(db_size));
    println!();
    println!("  Documents: {}", total_docs);
    println!("  Chunks:    {}", total_chunks);
    println!(
        "  Pushed:    {} / {} ({}%)",
        total_pushed,
        total_chunks,
        if total_chunks > 0 {
            (total_pushed * 100) / total_chunks
        } else {
            0
        }
    );

    let source_rows = sqlx::query(
        r#"
        SELECT
            d.source,
            COUNT(DISTINCT d.id) AS doc_count,
            COUNT(DISTINCT c.id) AS chunk_count
        FROM documents d
        LEFT JOIN chunks c ON c.document_id = d.id
        GROUP BY d.source
        ORDER BY doc_count DESC
        "#,
    )
    .fetch_all(&pool)
    .await?;

    if !source_rows.is_empty() {
        println!();
        println!("  {:<16} {:>8} {:>8}", "SOURCE", "DOCS", "CHUNKS");
        for row in &source_rows {
            let source: String = row.get("source");
            let doc_count: i64 = row.get("doc_count");
            let chunk_count: i64 = row.get("chunk_count");
            println!("  {:<16} {:>8} {:>8}", source, doc_count, chunk_count);
        }
    }

    if config.index.is_enabled() {
        println!();
        match index::create_index(&config.index) {
            Ok(vector_index) => match vector_index.stats().await {
                Ok(stats) => {
                    println!("  Remote index:");
                    println!("    vectors:    {}", stats.total_vectors);
                    println!("    dimension:  {}", stats.dimension);
                    if !stats.namespaces.is_empty() {
                        println!("    namespaces: {}", stats.namespaces.join(", "));
                    }
                    if stats.total_vectors != total_pushed as u64 {
                        println!(
                            "    note: remote count differs from local records ({})",
                            total_pushed
                        );
                    }
                }
                Err(e) => println!("  Remote index: unavailable ({})", e),
            },
            Err(e) => println!("  Remote index: unavailable ({})", e),
        }
    }

    pool.close().await;
    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[unit])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_formatting() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }
}
