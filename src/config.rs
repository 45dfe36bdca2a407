use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub calendar: CalendarConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub mail: MailConfig,
    #[serde(default)]
    pub kv: KvConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub connectors: ConnectorsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    pub max_tokens: usize,
    #[serde(default = "default_overlap")]
    #[allow(dead_code)]
    pub overlap_tokens: usize,
}

fn default_overlap() -> usize {
    0
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Candidates fetched from the vector index per query variant.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Matches kept after fusion for context assembly.
    #[serde(default = "default_final_limit")]
    pub final_limit: usize,
    /// Minimum vector similarity a match must exceed to survive.
    #[serde(default = "default_score_threshold")]
    pub score_threshold: f64,
    /// Constant in the reciprocal-rank-fusion denominator.
    #[serde(default = "default_rrf_k")]
    pub rrf_k: usize,
    /// Queries at or above this many chars skip LLM query expansion.
    #[serde(default = "default_expansion_max_len")]
    pub expansion_max_len: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            final_limit: default_final_limit(),
            score_threshold: default_score_threshold(),
            rrf_k: default_rrf_k(),
            expansion_max_len: default_expansion_max_len(),
        }
    }
}

fn default_top_k() -> usize {
    5
}
fn default_final_limit() -> usize {
    3
}
fn default_score_threshold() -> f64 {
    0.35
}
fn default_rrf_k() -> usize {
    60
}
fn default_expansion_max_len() -> usize {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            batch_size: 64,
            max_retries: 5,
            timeout_secs: 30,
        }
    }
}

fn default_disabled() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

/// Remote vector index (Pinecone). Disabled by default so the ingest
/// catalog can be exercised without credentials.
#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_disabled")]
    pub provider: String,
    /// Index endpoint, e.g. `https://parroquias-abc123.svc.us-east-1-aws.pinecone.io`.
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            host: None,
            namespace: None,
            timeout_secs: 30,
        }
    }
}

impl IndexConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    #[serde(default = "default_chat_model")]
    pub model: String,
    #[serde(default = "default_chat_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_chat_temperature")]
    pub temperature: f64,
    /// Conversation turns kept when trimming client history.
    #[serde(default = "default_max_history")]
    pub max_history: usize,
    /// Tool-call rounds allowed before the model must answer.
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: usize,
    #[serde(default = "default_true")]
    pub moderation: bool,
    /// Response cache is off by default: calendar answers go stale and
    /// the index is fast enough that streaming hides the latency.
    #[serde(default)]
    pub cache: bool,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            model: default_chat_model(),
            max_tokens: default_chat_max_tokens(),
            temperature: default_chat_temperature(),
            max_history: default_max_history(),
            max_tool_rounds: default_max_tool_rounds(),
            moderation: true,
            cache: false,
        }
    }
}

fn default_chat_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_chat_max_tokens() -> u32 {
    200
}
fn default_chat_temperature() -> f64 {
    0.3
}
fn default_max_history() -> usize {
    15
}
fn default_max_tool_rounds() -> usize {
    3
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct CalendarConfig {
    /// Public ICS feed of the parish Google Calendar.
    #[serde(default)]
    pub ics_url: Option<String>,
    #[serde(default = "default_calendar_ttl")]
    pub cache_ttl_secs: u64,
}

fn default_calendar_ttl() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    #[serde(default = "default_min_password_len")]
    pub min_password_len: usize,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            min_password_len: default_min_password_len(),
        }
    }
}

fn default_min_password_len() -> usize {
    6
}

#[derive(Debug, Deserialize, Clone)]
pub struct MailConfig {
    #[serde(default = "default_mail_from")]
    pub from: String,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            from: default_mail_from(),
        }
    }
}

fn default_mail_from() -> String {
    "Parroquia <noreply@parroquia.com>".to_string()
}

/// Shared KV store (Redis). Absent URL disables rate limiting and the
/// response cache; both fail open.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct KvConfig {
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RateLimitConfig {
    #[serde(default = "default_rate_limit")]
    pub limit: u64,
    /// Window length: `10s`, `1m`, `1h`, `1d`.
    #[serde(default = "default_rate_window")]
    pub window: String,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            limit: default_rate_limit(),
            window: default_rate_window(),
        }
    }
}

fn default_rate_limit() -> u64 {
    10
}
fn default_rate_window() -> String {
    "1m".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ConnectorsConfig {
    pub filesystem: Option<FilesystemConnectorConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FilesystemConnectorConfig {
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

fn default_include_globs() -> Vec<String> {
    vec![
        "**/*.md".to_string(),
        "**/*.txt".to_string(),
        "**/*.pdf".to_string(),
    ]
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.chunking.max_tokens == 0 {
        anyhow::bail!("chunking.max_tokens must be > 0");
    }

    if config.retrieval.final_limit < 1 {
        anyhow::bail!("retrieval.final_limit must be >= 1");
    }

    if !(0.0..=1.0).contains(&config.retrieval.score_threshold) {
        anyhow::bail!("retrieval.score_threshold must be in [0.0, 1.0]");
    }

    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    match config.index.provider.as_str() {
        "disabled" => {}
        "pinecone" => {
            if config.index.host.is_none() {
                anyhow::bail!("index.host must be set when provider is 'pinecone'");
            }
        }
        other => anyhow::bail!(
            "Unknown index provider: '{}'. Must be disabled or pinecone.",
            other
        ),
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(dir: &tempfile::TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("parro.toml");
        std::fs::write(&path, body).unwrap();
        path
    }

    const MINIMAL: &str = r#"
[db]
path = "data/parro.sqlite"

[chunking]
max_tokens = 700

[server]
bind = "127.0.0.1:7431"
"#;

    #[test]
    fn minimal_config_loads_with_defaults() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = write_config(&tmp, MINIMAL);
        let cfg = load_config(&path).unwrap();

        assert!(!cfg.embedding.is_enabled());
        assert!(!cfg.index.is_enabled());
        assert_eq!(cfg.retrieval.top_k, 5);
        assert!((cfg.retrieval.score_threshold - 0.35).abs() < 1e-9);
        assert_eq!(cfg.chat.model, "gpt-4o-mini");
        assert_eq!(cfg.chat.max_history, 15);
        assert!(!cfg.chat.cache);
        assert_eq!(cfg.rate_limit.limit, 10);
        assert_eq!(cfg.rate_limit.window, "1m");
        assert_eq!(cfg.auth.min_password_len, 6);
    }

    #[test]
    fn enabled_embedding_requires_model_and_dims() {
        let tmp = tempfile::TempDir::new().unwrap();
        let body = format!("{}\n[embedding]\nprovider = \"openai\"\n", MINIMAL);
        let path = write_config(&tmp, &body);
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("embedding.dims"));
    }

    #[test]
    fn pinecone_requires_host() {
        let tmp = tempfile::TempDir::new().unwrap();
        let body = format!("{}\n[index]\nprovider = \"pinecone\"\n", MINIMAL);
        let path = write_config(&tmp, &body);
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("index.host"));
    }

    #[test]
    fn threshold_out_of_range_rejected() {
        let tmp = tempfile::TempDir::new().unwrap();
        let body = format!("{}\n[retrieval]\nscore_threshold = 1.5\n", MINIMAL);
        let path = write_config(&tmp, &body);
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn unknown_index_provider_rejected() {
        let tmp = tempfile::TempDir::new().unwrap();
        let body = format!("{}\n[index]\nprovider = \"weaviate\"\n", MINIMAL);
        let path = write_config(&tmp, &body);
        assert!(load_config(&path).is_err());
    }
}
