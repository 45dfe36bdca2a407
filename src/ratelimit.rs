//! Fixed-window rate limiter over the shared KV store.
//!
//! One INCR per request against `ratelimit:{identifier}`, with the
//! expiry set when the counter is first created. The limiter fails
//! open on purpose: when the KV backend is unconfigured or erroring,
//! traffic is allowed — blocking legitimate users over an
//! infrastructure hiccup is the worse failure mode.

use redis::aio::ConnectionManager;
use tracing::warn;

use crate::config::{KvConfig, RateLimitConfig};

#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitVerdict {
    pub allowed: bool,
    pub remaining: u64,
    /// Epoch seconds when the window resets. 0 when unknown.
    pub reset_at: i64,
}

/// Parse a window spec (`10s`, `1m`, `1h`, `1d`) into seconds.
/// Malformed input falls back to one minute.
pub fn parse_window(window: &str) -> u64 {
    let (value, unit) = window.split_at(window.len().saturating_sub(1));
    let value: u64 = value.parse().unwrap_or(0);
    if value == 0 {
        return 60;
    }
    match unit {
        "s" => value,
        "m" => value * 60,
        "h" => value * 60 * 60,
        "d" => value * 60 * 60 * 24,
        _ => 60,
    }
}

/// Pure verdict from a window count. Separated from the KV call so the
/// arithmetic is testable without a backend.
pub fn evaluate(count: u64, limit: u64) -> (bool, u64) {
    (count <= limit, limit.saturating_sub(count))
}

pub struct RateLimiter {
    conn: Option<ConnectionManager>,
    limit: u64,
    window_secs: u64,
}

impl RateLimiter {
    /// Connect to the configured KV store. A missing URL or failed
    /// connection yields a limiter that allows everything.
    pub async fn connect(kv: &KvConfig, config: &RateLimitConfig) -> Self {
        let window_secs = parse_window(&config.window);

        let conn = match kv.url.as_deref() {
            None => {
                warn!("KV not configured; rate limiting disabled");
                None
            }
            Some(url) => match redis::Client::open(url) {
                Ok(client) => match ConnectionManager::new(client).await {
                    Ok(conn) => Some(conn),
                    Err(e) => {
                        warn!("KV connection failed ({}); rate limiting disabled", e);
                        None
                    }
                },
                Err(e) => {
                    warn!("KV URL invalid ({}); rate limiting disabled", e);
                    None
                }
            },
        };

        Self {
            conn,
            limit: config.limit,
            window_secs,
        }
    }

    /// Check and count a request for `identifier`.
    pub async fn check(&self, identifier: &str) -> RateLimitVerdict {
        let now = chrono::Utc::now().timestamp();
        let open = RateLimitVerdict {
            allowed: true,
            remaining: self.limit,
            reset_at: 0,
        };

        let Some(conn) = self.conn.clone() else {
            return open;
        };
        let mut conn = conn;

        let key = format!("ratelimit:{}", identifier);

        let count: u64 = match redis::cmd("INCR").arg(&key).query_async(&mut conn).await {
            Ok(c) => c,
            Err(e) => {
                warn!("rate limit INCR failed ({}); allowing request", e);
                return open;
            }
        };

        if count == 1 {
            if let Err(e) = redis::cmd("EXPIRE")
                .arg(&key)
                .arg(self.window_secs)
                .query_async::<_, ()>(&mut conn)
                .await
            {
                warn!("rate limit EXPIRE failed: {}", e);
            }
        }

        let (allowed, remaining) = evaluate(count, self.limit);
        RateLimitVerdict {
            allowed,
            remaining,
            reset_at: now + self.window_secs as i64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_parsing() {
        assert_eq!(parse_window("10s"), 10);
        assert_eq!(parse_window("1m"), 60);
        assert_eq!(parse_window("2h"), 7200);
        assert_eq!(parse_window("1d"), 86400);
    }

    #[test]
    fn malformed_window_defaults_to_a_minute() {
        assert_eq!(parse_window(""), 60);
        assert_eq!(parse_window("fast"), 60);
        assert_eq!(parse_window("10x"), 60);
    }

    #[test]
    fn remaining_is_limit_minus_count() {
        assert_eq!(evaluate(1, 10), (true, 9));
        assert_eq!(evaluate(10, 10), (true, 0));
    }

    #[test]
    fn over_limit_denied_with_zero_remaining() {
        assert_eq!(evaluate(11, 10), (false, 0));
        assert_eq!(evaluate(100, 10), (false, 0));
    }

    #[tokio::test]
    async fn unconfigured_backend_fails_open() {
        let limiter = RateLimiter::connect(
            &KvConfig { url: None },
            &RateLimitConfig {
                limit: 10,
                window: "1m".to_string(),
            },
        )
        .await;

        let verdict = limiter.check("1.2.3.4").await;
        assert!(verdict.allowed);
        assert_eq!(verdict.remaining, 10);
    }

    #[tokio::test]
    async fn unreachable_backend_fails_open() {
        // Nothing listens here; the connection fails and the limiter
        // must still allow traffic.
        let limiter = RateLimiter::connect(
            &KvConfig {
                url: Some("redis://127.0.0.1:1/".to_string()),
            },
            &RateLimitConfig {
                limit: 5,
                window: "10s".to_string(),
            },
        )
        .await;

        let verdict = limiter.check("1.2.3.4").await;
        assert!(verdict.allowed);
    }
}
