//! Supabase adapter: auth administration and table reads over the
//! public REST surface.
//!
//! The app never reimplements auth semantics — every operation here is
//! a single HTTP call against the hosted project using the service-role
//! key (`SUPABASE_URL` / `SUPABASE_SERVICE_ROLE_KEY`), with the
//! response mapped onto small local types. Errors keep the upstream
//! status and message so HTTP handlers can translate them faithfully.

use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::warn;

/// Error from the Supabase adapter.
#[derive(Debug)]
pub enum SupabaseError {
    /// `SUPABASE_URL` / `SUPABASE_SERVICE_ROLE_KEY` missing.
    NotConfigured,
    /// Upstream returned a non-success status.
    Api { status: u16, message: String },
    /// Network / serialization failure.
    Transport(String),
}

impl std::fmt::Display for SupabaseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SupabaseError::NotConfigured => write!(f, "Supabase is not configured"),
            SupabaseError::Api { status, message } => {
                write!(f, "Supabase error {}: {}", status, message)
            }
            SupabaseError::Transport(e) => write!(f, "Supabase request failed: {}", e),
        }
    }
}

impl std::error::Error for SupabaseError {}

impl From<reqwest::Error> for SupabaseError {
    fn from(e: reqwest::Error) -> Self {
        SupabaseError::Transport(e.to_string())
    }
}

type SbResult<T> = Result<T, SupabaseError>;

#[derive(Debug, Clone, Deserialize)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub user_metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignInSession {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub expires_at: Option<i64>,
    #[serde(default)]
    pub expires_in: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct SignIn {
    pub user: AuthUser,
    pub session: SignInSession,
}

pub struct SupabaseClient {
    client: reqwest::Client,
    base_url: String,
    service_key: String,
}

impl SupabaseClient {
    /// Build from environment. `None` when the project is not wired up,
    /// so callers can degrade (default daily content, 500 on auth).
    pub fn from_env() -> Option<Self> {
        let base_url = std::env::var("SUPABASE_URL").ok()?;
        let service_key = std::env::var("SUPABASE_SERVICE_ROLE_KEY").ok()?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .ok()?;

        Some(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key,
        })
    }

    fn auth_headers(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
    }

    async fn read_error(response: reqwest::Response) -> SupabaseError {
        let status = response.status().as_u16();
        let message = match response.json::<serde_json::Value>().await {
            Ok(body) => body
                .get("error_description")
                .or_else(|| body.get("msg"))
                .or_else(|| body.get("message"))
                .or_else(|| body.get("error"))
                .and_then(|v| v.as_str())
                .unwrap_or("unknown error")
                .to_string(),
            Err(_) => "unknown error".to_string(),
        };
        SupabaseError::Api { status, message }
    }

    // ============ Auth ============

    /// Password grant sign-in.
    pub async fn sign_in(&self, email: &str, password: &str) -> SbResult<SignIn> {
        let url = format!("{}/auth/v1/token?grant_type=password", self.base_url);
        let response = self
            .auth_headers(self.client.post(&url))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::read_error(response).await);
        }

        let body: serde_json::Value = response.json().await.map_err(SupabaseError::from)?;
        let user: AuthUser = serde_json::from_value(
            body.get("user").cloned().unwrap_or(serde_json::Value::Null),
        )
        .map_err(|e| SupabaseError::Transport(e.to_string()))?;
        let session: SignInSession = serde_json::from_value(body.clone())
            .map_err(|e| SupabaseError::Transport(e.to_string()))?;

        Ok(SignIn { user, session })
    }

    /// Admin user creation, email pre-confirmed (mobile onboarding skips
    /// the confirmation round-trip).
    pub async fn create_user(
        &self,
        email: &str,
        password: &str,
        full_name: Option<&str>,
        phone: Option<&str>,
    ) -> SbResult<AuthUser> {
        let url = format!("{}/auth/v1/admin/users", self.base_url);
        let response = self
            .auth_headers(self.client.post(&url))
            .json(&json!({
                "email": email,
                "password": password,
                "email_confirm": true,
                "user_metadata": {
                    "full_name": full_name.unwrap_or(""),
                    "phone": phone.unwrap_or(""),
                },
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::read_error(response).await);
        }

        response.json().await.map_err(SupabaseError::from)
    }

    /// Look up a user by email through the admin listing.
    pub async fn find_user_by_email(&self, email: &str) -> SbResult<Option<AuthUser>> {
        let url = format!("{}/auth/v1/admin/users", self.base_url);
        let response = self
            .auth_headers(self.client.get(&url))
            .query(&[("page", "1"), ("per_page", "1000")])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::read_error(response).await);
        }

        let body: serde_json::Value = response.json().await.map_err(SupabaseError::from)?;
        let users: Vec<AuthUser> = serde_json::from_value(
            body.get("users").cloned().unwrap_or(serde_json::Value::Array(vec![])),
        )
        .map_err(|e| SupabaseError::Transport(e.to_string()))?;

        let wanted = email.to_lowercase();
        Ok(users
            .into_iter()
            .find(|u| u.email.as_deref().map(|e| e.to_lowercase()) == Some(wanted.clone())))
    }

    async fn update_user(&self, user_id: &str, body: serde_json::Value) -> SbResult<AuthUser> {
        let url = format!("{}/auth/v1/admin/users/{}", self.base_url, user_id);
        let response = self
            .auth_headers(self.client.put(&url))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::read_error(response).await);
        }

        response.json().await.map_err(SupabaseError::from)
    }

    /// Mark a user's email as confirmed.
    pub async fn confirm_user(&self, user_id: &str) -> SbResult<AuthUser> {
        self.update_user(user_id, json!({ "email_confirm": true }))
            .await
    }

    /// Set a new password.
    pub async fn update_password(&self, user_id: &str, password: &str) -> SbResult<AuthUser> {
        self.update_user(user_id, json!({ "password": password }))
            .await
    }

    /// Resolve the user behind an access token.
    pub async fn get_user(&self, access_token: &str) -> SbResult<AuthUser> {
        let url = format!("{}/auth/v1/user", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("apikey", &self.service_key)
            .bearer_auth(access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::read_error(response).await);
        }

        response.json().await.map_err(SupabaseError::from)
    }

    /// Generate a password-recovery action link for an email.
    pub async fn generate_recovery_link(&self, email: &str) -> SbResult<String> {
        let url = format!("{}/auth/v1/admin/generate_link", self.base_url);
        let response = self
            .auth_headers(self.client.post(&url))
            .json(&json!({ "type": "recovery", "email": email }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::read_error(response).await);
        }

        let body: serde_json::Value = response.json().await.map_err(SupabaseError::from)?;
        body.get("action_link")
            .or_else(|| body.pointer("/properties/action_link"))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| SupabaseError::Transport("missing action_link in response".to_string()))
    }

    // ============ Tables (PostgREST) ============

    /// Fetch a single row, `None` when the filter matches nothing.
    pub async fn fetch_single(
        &self,
        table: &str,
        filter: &[(&str, String)],
    ) -> SbResult<Option<serde_json::Value>> {
        let url = format!("{}/rest/v1/{}", self.base_url, table);
        let mut query: Vec<(String, String)> = vec![("select".to_string(), "*".to_string())];
        for (k, v) in filter {
            query.push((k.to_string(), v.clone()));
        }

        let response = self
            .auth_headers(self.client.get(&url))
            .query(&query)
            .header("Accept", "application/vnd.pgrst.object+json")
            .send()
            .await?;

        // PostgREST answers 406 when the single-object request matches
        // zero rows.
        if response.status().as_u16() == 406 {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Self::read_error(response).await);
        }

        let value: serde_json::Value = response.json().await.map_err(SupabaseError::from)?;
        if value.is_null() {
            return Ok(None);
        }
        Ok(Some(value))
    }

    /// Profile row for a user, best-effort: table errors are logged and
    /// treated as absent, matching how the app merges profiles.
    pub async fn profile(&self, user_id: &str) -> Option<serde_json::Value> {
        match self
            .fetch_single("profiles", &[("id", format!("eq.{}", user_id))])
            .await
        {
            Ok(row) => row,
            Err(e) => {
                warn!("profile lookup failed: {}", e);
                None
            }
        }
    }

    /// All registered push-notification device tokens.
    pub async fn push_tokens(&self) -> SbResult<Vec<crate::models::PushToken>> {
        let url = format!("{}/rest/v1/push_tokens", self.base_url);
        let response = self
            .auth_headers(self.client.get(&url))
            .query(&[("select", "*"), ("order", "created_at.desc")])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::read_error(response).await);
        }

        response.json().await.map_err(SupabaseError::from)
    }

    /// Delete push tokens by id.
    pub async fn delete_push_tokens(&self, ids: &[i64]) -> SbResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let url = format!("{}/rest/v1/push_tokens", self.base_url);
        let list = ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let response = self
            .auth_headers(self.client.delete(&url))
            .query(&[("id", format!("in.({})", list))])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::read_error(response).await);
        }
        Ok(())
    }
}
