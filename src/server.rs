//! Application HTTP API.
//!
//! JSON endpoints consumed by the mobile/web client:
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/api/auth/login` | Password sign-in |
//! | `POST` | `/api/auth/register` | Account creation |
//! | `POST` | `/api/auth/confirm-user` | Admin email confirmation |
//! | `POST` | `/api/auth/verify-token` | Access-token validation |
//! | `POST` | `/api/auth/forgot-password` | Recovery email |
//! | `POST` | `/api/auth/reset-password` | Password update |
//! | `GET`  | `/api/saints/today` | Saint of the day |
//! | `GET`  | `/api/gospel/today` | Gospel of the day |
//! | `GET`  | `/api/calendar/events` | Parish calendar |
//! | `POST` | `/api/chat/message` | AI assistant (rate limited) |
//! | `POST` | `/api/search` | Document search |
//! | `POST` | `/api/notifications/send` | Push to all devices |
//! | `GET`  | `/api/notifications/tokens` | Registered devices |
//! | `DELETE` | `/api/notifications/tokens` | Token cleanup |
//!
//! Errors use one body shape everywhere:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "Email es requerido" } }
//! ```
//!
//! CORS is fully permissive — the client is a separate origin (PWA and
//! app webviews) and every endpoint is either public or token-guarded.

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::calendar::{self, CalendarStore, Timeframe};
use crate::cache::ResponseCache;
use crate::chat::ChatEngine;
use crate::config::Config;
use crate::daily::{self, ContentSource};
use crate::index;
use crate::mail::{self, MailClient};
use crate::models::HistoryMessage;
use crate::notify::{self, FcmClient, NotificationPayload};
use crate::ratelimit::RateLimiter;
use crate::retrieval;
use crate::supabase::{SupabaseClient, SupabaseError};

#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    supabase: Option<Arc<SupabaseClient>>,
    calendar: Arc<CalendarStore>,
    chat: Arc<ChatEngine>,
    limiter: Arc<RateLimiter>,
    fcm: Option<Arc<FcmClient>>,
    vector_index: Arc<dyn index::VectorIndex>,
}

/// Start the app API server on the configured bind address.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let config = Arc::new(config.clone());

    let supabase = SupabaseClient::from_env().map(Arc::new);
    if supabase.is_none() {
        info!("Supabase not configured; auth and daily content degraded");
    }

    let calendar = Arc::new(CalendarStore::new(config.calendar.clone()));
    let vector_index: Arc<dyn index::VectorIndex> =
        Arc::from(index::create_index(&config.index)?);
    let cache = ResponseCache::connect(&config.kv).await;
    let limiter = Arc::new(RateLimiter::connect(&config.kv, &config.rate_limit).await);

    let fcm = match FcmClient::from_env() {
        Ok(client) => Some(Arc::new(client)),
        Err(e) => {
            info!("push notifications unavailable: {}", e);
            None
        }
    };

    let chat = Arc::new(ChatEngine::new(
        config.clone(),
        calendar.clone(),
        vector_index.clone(),
        cache,
    ));

    let state = AppState {
        config,
        supabase,
        calendar,
        chat,
        limiter,
        fcm,
        vector_index,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(handle_health))
        .route("/api/auth/login", post(handle_login))
        .route("/api/auth/register", post(handle_register))
        .route("/api/auth/confirm-user", post(handle_confirm_user))
        .route("/api/auth/verify-token", post(handle_verify_token))
        .route("/api/auth/forgot-password", post(handle_forgot_password))
        .route("/api/auth/reset-password", post(handle_reset_password))
        .route("/api/saints/today", get(handle_saint_today))
        .route("/api/gospel/today", get(handle_gospel_today))
        .route("/api/calendar/events", get(handle_calendar_events))
        .route("/api/chat/message", post(handle_chat_message))
        .route("/api/search", post(handle_search))
        .route(
            "/api/notifications/send",
            post(handle_notifications_send),
        )
        .route(
            "/api/notifications/tokens",
            get(handle_tokens_list).delete(handle_tokens_delete),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state);

    println!("parro API listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error contract ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn unauthorized(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::UNAUTHORIZED,
        code: "unauthorized",
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: message.into(),
    }
}

fn rate_limited(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::TOO_MANY_REQUESTS,
        code: "rate_limited",
        message: message.into(),
    }
}

fn config_error(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "config_error",
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: message.into(),
    }
}

fn upstream(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "upstream_error",
        message: message.into(),
    }
}

/// Translate a Supabase adapter error, preserving upstream semantics.
fn map_supabase_error(e: SupabaseError) -> AppError {
    match e {
        SupabaseError::NotConfigured => config_error("Supabase no está configurado"),
        SupabaseError::Api { status, message } => {
            let code = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            if code.is_client_error() {
                AppError {
                    status: code,
                    code: "upstream_error",
                    message,
                }
            } else {
                upstream(message)
            }
        }
        SupabaseError::Transport(message) => upstream(message),
    }
}

fn require_supabase(state: &AppState) -> Result<Arc<SupabaseClient>, AppError> {
    state
        .supabase
        .clone()
        .ok_or_else(|| config_error("Supabase no está configurado"))
}

/// Client identifier for rate limiting: proxy headers first.
fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .map(|v| v.to_string())
        })
        .unwrap_or_else(|| "anonymous".to_string())
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ Auth ============

#[derive(Deserialize)]
struct LoginRequest {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

async fn handle_login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<Value>, AppError> {
    let supabase = require_supabase(&state)?;

    let (Some(email), Some(password)) = (body.email, body.password) else {
        return Err(bad_request("Email y contraseña son requeridos"));
    };
    if email.is_empty() || password.is_empty() {
        return Err(bad_request("Email y contraseña son requeridos"));
    }

    let sign_in = supabase.sign_in(&email, &password).await.map_err(|e| {
        let message = e.to_string();
        if message.contains("Invalid login credentials") {
            unauthorized("Email o contraseña incorrectos")
        } else if message.contains("Email not confirmed") {
            unauthorized("Por favor confirma tu email antes de iniciar sesión")
        } else if matches!(e, SupabaseError::NotConfigured) {
            config_error("Supabase no está configurado")
        } else {
            unauthorized("Error al iniciar sesión")
        }
    })?;

    let mut user = json!({
        "id": sign_in.user.id,
        "email": sign_in.user.email,
    });
    if let Some(profile) = supabase.profile(&sign_in.user.id).await {
        if let (Some(user_obj), Some(profile_obj)) = (user.as_object_mut(), profile.as_object()) {
            for (k, v) in profile_obj {
                user_obj.entry(k.clone()).or_insert(v.clone());
            }
        }
    }

    // Supabase sends expires_in on the grant; expires_at only on newer
    // versions. Derive the missing one so clients always get an epoch.
    let expires_at = sign_in.session.expires_at.or_else(|| {
        sign_in
            .session
            .expires_in
            .map(|secs| chrono::Utc::now().timestamp() + secs)
    });

    Ok(Json(json!({
        "success": true,
        "user": user,
        "session": {
            "access_token": sign_in.session.access_token,
            "refresh_token": sign_in.session.refresh_token,
            "expires_at": expires_at,
        },
    })))
}

#[derive(Deserialize)]
struct RegisterRequest {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    password: Option<String>,
    #[serde(default, alias = "fullName")]
    full_name: Option<String>,
    #[serde(default)]
    phone: Option<String>,
}

async fn handle_register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let supabase = require_supabase(&state)?;

    let (Some(email), Some(password)) = (body.email, body.password) else {
        return Err(bad_request("Email y contraseña son requeridos"));
    };
    if email.is_empty() || password.is_empty() {
        return Err(bad_request("Email y contraseña son requeridos"));
    }
    let min_len = state.config.auth.min_password_len;
    if password.chars().count() < min_len {
        return Err(bad_request(format!(
            "La contraseña debe tener al menos {} caracteres",
            min_len
        )));
    }

    let user = supabase
        .create_user(
            &email,
            &password,
            body.full_name.as_deref(),
            body.phone.as_deref(),
        )
        .await
        .map_err(|e| match e {
            SupabaseError::Api { message, .. } => bad_request(message),
            other => map_supabase_error(other),
        })?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "Usuario registrado exitosamente. Ya puedes iniciar sesión.",
            "userId": user.id,
        })),
    ))
}

#[derive(Deserialize)]
struct EmailRequest {
    #[serde(default)]
    email: Option<String>,
}

async fn handle_confirm_user(
    State(state): State<AppState>,
    Json(body): Json<EmailRequest>,
) -> Result<Json<Value>, AppError> {
    let supabase = require_supabase(&state)?;

    let Some(email) = body.email.filter(|e| !e.is_empty()) else {
        return Err(bad_request("Email es requerido"));
    };

    let user = supabase
        .find_user_by_email(&email)
        .await
        .map_err(|_| internal("Error al buscar usuario"))?
        .ok_or_else(|| not_found("Usuario no encontrado"))?;

    let confirmed = supabase
        .confirm_user(&user.id)
        .await
        .map_err(|_| internal("Error al confirmar usuario"))?;

    Ok(Json(json!({
        "success": true,
        "message": "Usuario confirmado correctamente",
        "user": { "id": confirmed.id, "email": confirmed.email },
    })))
}

#[derive(Deserialize)]
struct VerifyTokenRequest {
    #[serde(default)]
    access_token: Option<String>,
}

async fn handle_verify_token(
    State(state): State<AppState>,
    Json(body): Json<VerifyTokenRequest>,
) -> Result<Json<Value>, AppError> {
    let supabase = require_supabase(&state)?;

    let Some(token) = body.access_token.filter(|t| !t.is_empty()) else {
        return Err(bad_request("Token es requerido"));
    };

    let user = supabase
        .get_user(&token)
        .await
        .map_err(|_| unauthorized("Token inválido o expirado"))?;

    let mut user_json = json!({ "id": user.id, "email": user.email });
    if let Some(profile) = supabase.profile(&user.id).await {
        if let (Some(user_obj), Some(profile_obj)) =
            (user_json.as_object_mut(), profile.as_object())
        {
            for (k, v) in profile_obj {
                user_obj.entry(k.clone()).or_insert(v.clone());
            }
        }
    }

    Ok(Json(json!({ "success": true, "user": user_json })))
}

/// Neutral answer that never reveals whether an account exists.
fn forgot_password_neutral() -> Json<Value> {
    Json(json!({
        "success": true,
        "message": "Si el email existe, recibirás un enlace para restablecer tu contraseña.",
    }))
}

async fn handle_forgot_password(
    State(state): State<AppState>,
    Json(body): Json<EmailRequest>,
) -> Result<Json<Value>, AppError> {
    let supabase = require_supabase(&state)?;

    let Some(email) = body.email.filter(|e| !e.is_empty()) else {
        return Err(bad_request("Email es requerido"));
    };

    let user = match supabase.find_user_by_email(&email).await {
        Ok(Some(user)) => user,
        // Unknown address or lookup failure: same neutral answer, no
        // account enumeration.
        Ok(None) => return Ok(forgot_password_neutral()),
        Err(e) => {
            error!("forgot-password lookup failed: {}", e);
            return Ok(forgot_password_neutral());
        }
    };

    let reset_url = supabase
        .generate_recovery_link(&email)
        .await
        .map_err(|_| internal("Error al generar enlace de recuperación"))?;

    let user_name = user
        .user_metadata
        .as_ref()
        .and_then(|m| m.get("full_name"))
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .or_else(|| {
            supabase_display_name(&email)
        })
        .unwrap_or_else(|| email.clone());

    let mailer = MailClient::new(&state.config.mail)
        .map_err(|e| config_error(e.to_string()))?;
    let template = mail::password_reset_template(&user_name, &reset_url);

    mailer.send(&email, &template).await.map_err(|e| {
        error!("reset email failed: {}", e);
        internal("Error al enviar el email de recuperación")
    })?;

    Ok(Json(json!({
        "success": true,
        "message": "Revisa tu email para restablecer tu contraseña.",
    })))
}

fn supabase_display_name(email: &str) -> Option<String> {
    email.split('@').next().map(|s| s.to_string())
}

#[derive(Deserialize)]
struct ResetPasswordRequest {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

async fn handle_reset_password(
    State(state): State<AppState>,
    Json(body): Json<ResetPasswordRequest>,
) -> Result<Json<Value>, AppError> {
    let supabase = require_supabase(&state)?;

    let (Some(token), Some(password)) = (body.token, body.password) else {
        return Err(bad_request("Token y contraseña son requeridos"));
    };
    if token.is_empty() || password.is_empty() {
        return Err(bad_request("Token y contraseña son requeridos"));
    }
    let min_len = state.config.auth.min_password_len;
    if password.chars().count() < min_len {
        return Err(bad_request(format!(
            "La contraseña debe tener al menos {} caracteres",
            min_len
        )));
    }

    // Resolve the recovery token to its user, then update the password
    // for that user id.
    let user = supabase
        .get_user(&token)
        .await
        .map_err(|_| bad_request("Token inválido o expirado"))?;

    supabase
        .update_password(&user.id, &password)
        .await
        .map_err(|_| bad_request("Token inválido o expirado"))?;

    Ok(Json(json!({
        "success": true,
        "message": "Contraseña actualizada correctamente",
    })))
}

// ============ Daily content ============

fn daily_response(result: daily::DailyContent, key: &str) -> (StatusCode, Json<Value>) {
    let status = if result.source == ContentSource::Error {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::OK
    };
    (
        status,
        Json(json!({
            "success": result.success,
            "date": result.date,
            (key): result.content,
            "source": result.source,
        })),
    )
}

async fn handle_saint_today(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let result = daily::saint_today(state.supabase.as_deref()).await;
    daily_response(result, "saint")
}

async fn handle_gospel_today(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let result = daily::gospel_today(state.supabase.as_deref()).await;
    daily_response(result, "gospel")
}

// ============ Calendar ============

#[derive(Deserialize)]
struct CalendarQuery {
    #[serde(default)]
    filter: Option<String>,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    refresh: Option<bool>,
}

async fn handle_calendar_events(
    State(state): State<AppState>,
    Query(query): Query<CalendarQuery>,
) -> Result<Json<Value>, AppError> {
    let force = query.refresh.unwrap_or(false);

    let events = state.calendar.events(force).await.map_err(|e| {
        if e.to_string().contains("not configured") {
            config_error(e.to_string())
        } else {
            upstream("Error al obtener eventos del calendario")
        }
    })?;

    let now = chrono::Utc::now();
    let filtered = match query.filter.as_deref() {
        None => calendar::filter_events(&events, &Timeframe::Upcoming, now, usize::MAX),
        Some(name) => {
            let timeframe = Timeframe::parse(name, query.date.as_deref())
                .map_err(|e| bad_request(e.to_string()))?;
            let limit = query.limit.unwrap_or(5);
            calendar::filter_events(&events, &timeframe, now, limit)
        }
    };

    Ok(Json(json!({
        "events": filtered,
        "cached": state.calendar.is_cached().await,
    })))
}

// ============ Chat ============

#[derive(Deserialize)]
struct ChatRequest {
    #[serde(default)]
    message: Option<String>,
    #[serde(default, alias = "conversationHistory")]
    history: Option<Vec<HistoryMessage>>,
}

async fn handle_chat_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<ChatRequest>,
) -> Result<Json<Value>, AppError> {
    let Some(message) = body.message.filter(|m| !m.trim().is_empty()) else {
        return Err(bad_request("Message is required"));
    };

    let verdict = state.limiter.check(&client_ip(&headers)).await;
    if !verdict.allowed {
        info!(
            remaining = verdict.remaining,
            reset_at = verdict.reset_at,
            "chat rate limit exceeded"
        );
        return Err(rate_limited(
            "Hemos alcanzado el límite de solicitudes. Por favor, intenta de nuevo en unos minutos.",
        ));
    }

    let history = body.history.unwrap_or_default();
    let outcome = state.chat.handle(&message, &history).await.map_err(|e| {
        let message = e.to_string();
        error!("chat failed: {}", message);
        if message.contains("OPENAI_API_KEY") {
            config_error("La clave de API de OpenAI no está configurada en el servidor.")
        } else if message.contains("rate limit") {
            rate_limited(
                "Hemos alcanzado el límite de solicitudes. Por favor, intenta de nuevo en unos minutos.",
            )
        } else {
            internal("Lo siento, ocurrió un error al procesar tu mensaje.")
        }
    })?;

    let mut response = json!({
        "message": outcome.message,
        "attachments": outcome.attachments,
        "fromCache": outcome.from_cache,
    });
    if let Some(guardrail) = outcome.guardrail {
        response["guardrail"] = json!(guardrail);
    }
    if outcome.moderated {
        response["moderated"] = json!(true);
    }
    if outcome.generic {
        response["generic"] = json!(true);
    }

    Ok(Json(response))
}

// ============ Search ============

#[derive(Deserialize)]
struct SearchRequest {
    #[serde(default)]
    query: Option<String>,
    #[serde(default)]
    categoria: Option<String>,
}

async fn handle_search(
    State(state): State<AppState>,
    Json(body): Json<SearchRequest>,
) -> Result<Json<Value>, AppError> {
    let Some(query) = body.query.filter(|q| !q.trim().is_empty()) else {
        return Err(bad_request("query must not be empty"));
    };

    let matches = retrieval::search(
        &state.config,
        state.vector_index.as_ref(),
        None,
        &query,
        body.categoria.as_deref(),
    )
    .await
    .map_err(|e| {
        let message = e.to_string();
        if message.contains("invalid categoria") || message.contains("must not be empty") {
            bad_request(message)
        } else if message.contains("disabled") || message.contains("not set") {
            config_error(message)
        } else {
            upstream(message)
        }
    })?;

    Ok(Json(json!({
        "query": query,
        "count": matches.len(),
        "matches": matches,
    })))
}

// ============ Notifications ============

fn require_fcm(state: &AppState) -> Result<Arc<FcmClient>, AppError> {
    state
        .fcm
        .clone()
        .ok_or_else(|| config_error("Firebase no está configurado"))
}

async fn handle_notifications_send(
    State(state): State<AppState>,
    Json(payload): Json<NotificationPayload>,
) -> Result<Json<Value>, AppError> {
    if payload.title.trim().is_empty() || payload.body.trim().is_empty() {
        return Err(bad_request("title y body son requeridos"));
    }

    let supabase = require_supabase(&state)?;
    let fcm = require_fcm(&state)?;

    let tokens = supabase
        .push_tokens()
        .await
        .map_err(|_| internal("Error al obtener tokens"))?;

    if tokens.is_empty() {
        return Ok(Json(json!({
            "success": true,
            "total": 0,
            "successful": 0,
            "failed": 0,
            "message": "No hay dispositivos registrados. Los usuarios deben activar las notificaciones primero.",
        })));
    }

    info!("sending notification to {} devices", tokens.len());
    let summary = notify::send_to_all(fcm, tokens, payload).await;

    Ok(Json(json!({
        "success": true,
        "total": summary.total,
        "successful": summary.successful,
        "failed": summary.failed,
    })))
}

async fn handle_tokens_list(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let supabase = require_supabase(&state)?;

    let tokens = supabase
        .push_tokens()
        .await
        .map_err(|_| internal("Error al obtener tokens"))?;

    let enriched: Vec<Value> = tokens
        .iter()
        .map(|token| {
            let platform = notify::platform_from_ua(token.user_agent.as_deref());
            let (browser, os) = notify::browser_and_os(token.user_agent.as_deref());
            json!({
                "id": token.id,
                "tokenPreview": notify::token_preview(&token.token),
                "platform": platform,
                "browser": browser,
                "os": os,
                "userAgent": token.user_agent,
                "createdAt": token.created_at,
                "lastUsed": token.last_used,
            })
        })
        .collect();

    Ok(Json(json!({
        "success": true,
        "total": enriched.len(),
        "tokens": enriched,
    })))
}

#[derive(Deserialize)]
struct TokenDeleteRequest {
    #[serde(default, alias = "tokenId")]
    token_id: Option<i64>,
    #[serde(default, alias = "deleteInvalid")]
    delete_invalid: Option<bool>,
}

async fn handle_tokens_delete(
    State(state): State<AppState>,
    Json(body): Json<TokenDeleteRequest>,
) -> Result<Json<Value>, AppError> {
    let supabase = require_supabase(&state)?;

    if body.delete_invalid.unwrap_or(false) {
        let fcm = require_fcm(&state)?;
        let (total, deleted) = notify::prune_invalid_tokens(fcm, &supabase)
            .await
            .map_err(|e| internal(e.to_string()))?;
        return Ok(Json(json!({
            "success": true,
            "message": format!("{} tokens inválidos eliminados", deleted),
            "deleted": deleted,
            "total": total,
        })));
    }

    if let Some(token_id) = body.token_id {
        supabase
            .delete_push_tokens(&[token_id])
            .await
            .map_err(|_| internal("Error al eliminar token"))?;
        return Ok(Json(json!({
            "success": true,
            "message": "Token eliminado exitosamente",
        })));
    }

    Err(bad_request("Se requiere tokenId o deleteInvalid=true"))
}
