//! Push notifications over Firebase Cloud Messaging (HTTP v1).
//!
//! The legacy server-key API is gone; v1 wants an OAuth bearer token
//! minted from the Firebase service account. The flow is: sign a
//! short-lived RS256 assertion with the account's private key, exchange
//! it at Google's token endpoint, cache the bearer until shortly before
//! expiry, then POST one message per registered device token.
//!
//! Device tokens live in the hosted `push_tokens` table. Tokens FCM
//! reports as unregistered can be pruned with a validate-only sweep.

use anyhow::{bail, Context, Result};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::models::PushToken;
use crate::supabase::SupabaseClient;

const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const MESSAGING_SCOPE: &str = "https://www.googleapis.com/auth/firebase.messaging";
/// Refresh the cached bearer this long before it actually expires.
const TOKEN_SLACK: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationPayload {
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub badge: Option<String>,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct SendSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
}

#[derive(Debug)]
enum SendOutcome {
    Sent,
    /// FCM says the token no longer maps to an installed app.
    Unregistered,
    Failed(String),
}

#[derive(Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

pub struct FcmClient {
    client: reqwest::Client,
    project_id: String,
    client_email: String,
    encoding_key: EncodingKey,
    bearer: Mutex<Option<(Instant, String)>>,
}

impl FcmClient {
    /// Build from `FIREBASE_PROJECT_ID`, `FIREBASE_CLIENT_EMAIL`, and
    /// `FIREBASE_PRIVATE_KEY`. The key arrives with literal `\n`
    /// escapes when set through dashboard env editors.
    pub fn from_env() -> Result<Self> {
        let project_id = std::env::var("FIREBASE_PROJECT_ID")
            .map_err(|_| anyhow::anyhow!("FIREBASE_PROJECT_ID environment variable not set"))?;
        let client_email = std::env::var("FIREBASE_CLIENT_EMAIL")
            .map_err(|_| anyhow::anyhow!("FIREBASE_CLIENT_EMAIL environment variable not set"))?;
        let private_key = std::env::var("FIREBASE_PRIVATE_KEY")
            .map_err(|_| anyhow::anyhow!("FIREBASE_PRIVATE_KEY environment variable not set"))?
            .replace("\\n", "\n");

        let encoding_key = EncodingKey::from_rsa_pem(private_key.as_bytes())
            .with_context(|| "FIREBASE_PRIVATE_KEY is not a valid RSA PEM key")?;

        Ok(Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(15))
                .build()?,
            project_id,
            client_email,
            encoding_key,
            bearer: Mutex::new(None),
        })
    }

    async fn bearer_token(&self) -> Result<String> {
        let mut guard = self.bearer.lock().await;
        if let Some((expires, ref token)) = *guard {
            if Instant::now() < expires {
                return Ok(token.clone());
            }
        }

        let now = chrono::Utc::now().timestamp();
        let claims = AssertionClaims {
            iss: &self.client_email,
            scope: MESSAGING_SCOPE,
            aud: TOKEN_URL,
            iat: now,
            exp: now + 3600,
        };
        let assertion = encode(&Header::new(Algorithm::RS256), &claims, &self.encoding_key)?;

        let response = self
            .client
            .post(TOKEN_URL)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("OAuth token exchange failed {}: {}", status, body);
        }

        let body: serde_json::Value = response.json().await?;
        let token = body
            .get("access_token")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("token response missing access_token"))?
            .to_string();
        let expires_in = body
            .get("expires_in")
            .and_then(|v| v.as_u64())
            .unwrap_or(3600);

        let expires =
            Instant::now() + Duration::from_secs(expires_in).saturating_sub(TOKEN_SLACK);
        *guard = Some((expires, token.clone()));
        Ok(token)
    }

    async fn send_one(
        &self,
        device_token: &str,
        payload: &NotificationPayload,
        validate_only: bool,
    ) -> SendOutcome {
        let bearer = match self.bearer_token().await {
            Ok(t) => t,
            Err(e) => return SendOutcome::Failed(e.to_string()),
        };

        let url = format!(
            "https://fcm.googleapis.com/v1/projects/{}/messages:send",
            self.project_id
        );

        let body = json!({
            "validate_only": validate_only,
            "message": {
                "token": device_token,
                "notification": {
                    "title": payload.title,
                    "body": payload.body,
                },
                "data": {
                    "url": payload.url.clone().unwrap_or_else(|| "/".to_string()),
                },
                "webpush": {
                    "notification": {
                        "icon": payload.icon.clone().unwrap_or_else(|| "/icons/icon-192x192.png".to_string()),
                        "badge": payload.badge.clone().unwrap_or_else(|| "/icons/icon-72x72.png".to_string()),
                    },
                    "fcm_options": {
                        "link": payload.url.clone().unwrap_or_else(|| "/".to_string()),
                    },
                },
            },
        });

        let response = match self
            .client
            .post(&url)
            .bearer_auth(&bearer)
            .json(&body)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return SendOutcome::Failed(e.to_string()),
        };

        if response.status().is_success() {
            return SendOutcome::Sent;
        }

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if text.contains("UNREGISTERED")
            || text.contains("registration-token-not-registered")
            || (status.as_u16() == 404 && text.contains("Requested entity was not found"))
        {
            SendOutcome::Unregistered
        } else {
            SendOutcome::Failed(format!("{}: {}", status, text))
        }
    }
}

/// Send a notification to every registered device. Sends run
/// concurrently; the summary tallies fulfilled vs rejected.
pub async fn send_to_all(
    fcm: Arc<FcmClient>,
    tokens: Vec<PushToken>,
    payload: NotificationPayload,
) -> SendSummary {
    let total = tokens.len();
    let mut set = tokio::task::JoinSet::new();

    for token in tokens {
        let fcm = fcm.clone();
        let payload = payload.clone();
        set.spawn(async move { fcm.send_one(&token.token, &payload, false).await });
    }

    let mut successful = 0usize;
    let mut failed = 0usize;
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(SendOutcome::Sent) => successful += 1,
            Ok(SendOutcome::Unregistered) => {
                debug!("device token no longer registered");
                failed += 1;
            }
            Ok(SendOutcome::Failed(e)) => {
                warn!("notification send failed: {}", e);
                failed += 1;
            }
            Err(e) => {
                warn!("notification task panicked: {}", e);
                failed += 1;
            }
        }
    }

    SendSummary {
        total,
        successful,
        failed,
    }
}

/// Validate every stored token with a dry-run send and delete the ones
/// FCM reports as unregistered. Returns (checked, deleted).
pub async fn prune_invalid_tokens(
    fcm: Arc<FcmClient>,
    supabase: &SupabaseClient,
) -> Result<(usize, usize)> {
    let tokens = supabase.push_tokens().await?;
    let probe = NotificationPayload {
        title: "Test".to_string(),
        body: "Test".to_string(),
        icon: None,
        url: None,
        badge: None,
    };

    let mut invalid_ids = Vec::new();
    for token in &tokens {
        match fcm.send_one(&token.token, &probe, true).await {
            SendOutcome::Unregistered => invalid_ids.push(token.id),
            SendOutcome::Failed(e) => warn!("token {} validation error: {}", token.id, e),
            SendOutcome::Sent => {}
        }
    }

    supabase.delete_push_tokens(&invalid_ids).await?;
    Ok((tokens.len(), invalid_ids.len()))
}

// ============ User-agent classification ============

/// Coarse platform from the stored user agent, for the token listing.
pub fn platform_from_ua(user_agent: Option<&str>) -> &'static str {
    let Some(ua) = user_agent else {
        return "Desconocido";
    };
    let ua = ua.to_lowercase();
    if ua.contains("iphone") || ua.contains("ipad") || ua.contains("ipod") {
        "iOS"
    } else if ua.contains("android") {
        "Android"
    } else if ua.contains("macintosh") {
        "macOS"
    } else if ua.contains("windows") {
        "Windows"
    } else if ua.contains("linux") {
        "Linux"
    } else {
        "Desconocido"
    }
}

/// Browser and OS names from the user agent. Edge must win over
/// Chrome, and Safari only counts without a Chrome marker.
pub fn browser_and_os(user_agent: Option<&str>) -> (String, String) {
    let Some(ua) = user_agent else {
        return ("Desconocido".to_string(), "Desconocido".to_string());
    };
    let ua = ua.to_lowercase();

    let browser = if ua.contains("edg/") {
        "Edge"
    } else if ua.contains("chrome") {
        "Chrome"
    } else if ua.contains("firefox") {
        "Firefox"
    } else if ua.contains("safari") {
        "Safari"
    } else {
        "Desconocido"
    };

    let os = if ua.contains("iphone") {
        "iPhone"
    } else if ua.contains("ipad") {
        "iPad"
    } else if ua.contains("android") {
        "Android"
    } else if ua.contains("mac os x") {
        "macOS"
    } else if ua.contains("windows") {
        "Windows"
    } else if ua.contains("linux") {
        "Linux"
    } else {
        "Desconocido"
    };

    (browser.to_string(), os.to_string())
}

/// Preview shown in the admin token listing: never the full token.
pub fn token_preview(token: &str) -> String {
    let cut = token
        .char_indices()
        .nth(30)
        .map(|(i, _)| i)
        .unwrap_or(token.len());
    format!("{}...", &token[..cut])
}

#[cfg(test)]
mod tests {
    use super::*;

    const IPHONE_UA: &str =
        "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1";
    const EDGE_UA: &str =
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36 Edg/120.0";

    #[test]
    fn platform_classification() {
        assert_eq!(platform_from_ua(Some(IPHONE_UA)), "iOS");
        assert_eq!(platform_from_ua(Some(EDGE_UA)), "Windows");
        assert_eq!(platform_from_ua(None), "Desconocido");
    }

    #[test]
    fn edge_wins_over_chrome() {
        let (browser, os) = browser_and_os(Some(EDGE_UA));
        assert_eq!(browser, "Edge");
        assert_eq!(os, "Windows");
    }

    #[test]
    fn safari_requires_absence_of_chrome() {
        let (browser, _) = browser_and_os(Some(IPHONE_UA));
        assert_eq!(browser, "Safari");
    }

    #[test]
    fn token_preview_truncates() {
        let token = "x".repeat(100);
        let preview = token_preview(&token);
        assert_eq!(preview.len(), 33);
        assert!(preview.ends_with("..."));
    }

    #[test]
    fn short_token_preview_keeps_all() {
        assert_eq!(token_preview("abc"), "abc...");
    }
}
