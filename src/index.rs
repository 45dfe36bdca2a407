//! Remote vector index client.
//!
//! All vector storage and nearest-neighbor search is delegated to a
//! hosted Pinecone index; this module is a thin REST adapter. The
//! [`VectorIndex`] trait keeps the retrieval pipeline decoupled from the
//! concrete backend, and [`DisabledIndex`] stands in when no index is
//! configured (CLI catalog work stays usable offline).

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use crate::config::IndexConfig;

/// One vector to upsert, with its metadata payload.
#[derive(Debug, Clone)]
pub struct IndexVector {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: serde_json::Value,
}

/// A raw match returned by the index, before threshold filtering.
#[derive(Debug, Clone, Deserialize)]
pub struct IndexMatch {
    pub id: String,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

/// Aggregate index statistics.
#[derive(Debug, Clone, Default)]
pub struct IndexStats {
    pub total_vectors: u64,
    pub dimension: u64,
    pub namespaces: Vec<String>,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn upsert(&self, vectors: &[IndexVector]) -> Result<()>;
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<serde_json::Value>,
    ) -> Result<Vec<IndexMatch>>;
    async fn stats(&self) -> Result<IndexStats>;
    /// Delete every vector (in the configured namespace).
    async fn clear(&self) -> Result<()>;
    /// Delete specific vectors by id.
    async fn delete(&self, ids: &[String]) -> Result<()>;
}

/// Pinecone REST adapter. Requires `PINECONE_API_KEY` and the index
/// endpoint host from config.
pub struct PineconeIndex {
    client: reqwest::Client,
    host: String,
    namespace: Option<String>,
    api_key: String,
}

impl PineconeIndex {
    pub fn new(config: &IndexConfig) -> Result<Self> {
        let host = config
            .host
            .clone()
            .ok_or_else(|| anyhow::anyhow!("index.host required for Pinecone"))?;
        let api_key = std::env::var("PINECONE_API_KEY")
            .map_err(|_| anyhow::anyhow!("PINECONE_API_KEY environment variable not set"))?;

        Ok(Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .build()?,
            host: host.trim_end_matches('/').to_string(),
            namespace: config.namespace.clone(),
            api_key,
        })
    }

    async fn post(&self, path: &str, body: serde_json::Value) -> Result<serde_json::Value> {
        let url = format!("{}{}", self.host, path);
        let response = self
            .client
            .post(&url)
            .header("Api-Key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Pinecone request to {} failed: {}", path, e))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("Pinecone error {} on {}: {}", status, path, body_text);
        }

        Ok(response.json().await.unwrap_or(serde_json::Value::Null))
    }
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    async fn upsert(&self, vectors: &[IndexVector]) -> Result<()> {
        if vectors.is_empty() {
            return Ok(());
        }

        let payload: Vec<serde_json::Value> = vectors
            .iter()
            .map(|v| {
                json!({
                    "id": v.id,
                    "values": v.values,
                    "metadata": v.metadata,
                })
            })
            .collect();

        let mut body = json!({ "vectors": payload });
        if let Some(ref ns) = self.namespace {
            body["namespace"] = json!(ns);
        }

        debug!(count = vectors.len(), "upserting vectors");
        self.post("/vectors/upsert", body).await?;
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<serde_json::Value>,
    ) -> Result<Vec<IndexMatch>> {
        let mut body = json!({
            "vector": vector,
            "topK": top_k,
            "includeMetadata": true,
        });
        if let Some(f) = filter {
            body["filter"] = f;
        }
        if let Some(ref ns) = self.namespace {
            body["namespace"] = json!(ns);
        }

        let response = self.post("/query", body).await?;
        let matches = response
            .get("matches")
            .cloned()
            .unwrap_or(serde_json::Value::Array(vec![]));

        Ok(serde_json::from_value(matches)?)
    }

    async fn stats(&self) -> Result<IndexStats> {
        let response = self.post("/describe_index_stats", json!({})).await?;

        let total_vectors = response
            .get("totalVectorCount")
            .or_else(|| response.get("totalRecordCount"))
            .and_then(|v| v.as_u64())
            .unwrap_or(0);
        let dimension = response
            .get("dimension")
            .and_then(|v| v.as_u64())
            .unwrap_or(0);
        let namespaces = response
            .get("namespaces")
            .and_then(|v| v.as_object())
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default();

        Ok(IndexStats {
            total_vectors,
            dimension,
            namespaces,
        })
    }

    async fn clear(&self) -> Result<()> {
        let mut body = json!({ "deleteAll": true });
        if let Some(ref ns) = self.namespace {
            body["namespace"] = json!(ns);
        }
        self.post("/vectors/delete", body).await?;
        Ok(())
    }

    async fn delete(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let mut body = json!({ "ids": ids });
        if let Some(ref ns) = self.namespace {
            body["namespace"] = json!(ns);
        }
        self.post("/vectors/delete", body).await?;
        Ok(())
    }
}

/// Stand-in when `index.provider = "disabled"`. Every operation fails
/// with a configuration error.
pub struct DisabledIndex;

#[async_trait]
impl VectorIndex for DisabledIndex {
    async fn upsert(&self, _vectors: &[IndexVector]) -> Result<()> {
        bail!("Vector index is disabled. Set [index] provider in config.")
    }
    async fn query(
        &self,
        _vector: &[f32],
        _top_k: usize,
        _filter: Option<serde_json::Value>,
    ) -> Result<Vec<IndexMatch>> {
        bail!("Vector index is disabled. Set [index] provider in config.")
    }
    async fn stats(&self) -> Result<IndexStats> {
        bail!("Vector index is disabled. Set [index] provider in config.")
    }
    async fn clear(&self) -> Result<()> {
        bail!("Vector index is disabled. Set [index] provider in config.")
    }
    async fn delete(&self, _ids: &[String]) -> Result<()> {
        bail!("Vector index is disabled. Set [index] provider in config.")
    }
}

/// Create the index client matching the configuration.
pub fn create_index(config: &IndexConfig) -> Result<Box<dyn VectorIndex>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledIndex)),
        "pinecone" => Ok(Box::new(PineconeIndex::new(config)?)),
        other => bail!("Unknown index provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_index_reports_configuration_error() {
        let idx = DisabledIndex;
        let err = idx.query(&[0.0], 5, None).await.unwrap_err();
        assert!(err.to_string().contains("disabled"));
    }

    #[test]
    fn match_deserializes_without_metadata() {
        let m: IndexMatch =
            serde_json::from_value(json!({ "id": "chunk_1", "score": 0.42 })).unwrap();
        assert_eq!(m.id, "chunk_1");
        assert!((m.score - 0.42).abs() < 1e-9);
        assert!(m.metadata.is_none());
    }
}
