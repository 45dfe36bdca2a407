//! Chat assistant: OpenAI client, input guardrails, and the
//! tool-calling loop behind `POST /api/chat/message`.
//!
//! The pipeline in front of the model is deliberately cheap-first:
//! relevance guardrail, content moderation, canned replies for bare
//! courtesy messages, then the optional response cache — only then does
//! a completion run, with at most [`ChatConfig::max_tool_rounds`] tool
//! rounds. Tools are the parish calendar, semantic document search, and
//! the resource catalog; resource matches surface as attachments.

use anyhow::{bail, Result};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::cache::ResponseCache;
use crate::calendar::{self, CalendarStore, Timeframe};
use crate::config::{ChatConfig, Config};
use crate::index::VectorIndex;
use crate::models::{HistoryMessage, ResourceAttachment};
use crate::resources;
use crate::retrieval;

const CHAT_COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";
const MODERATIONS_URL: &str = "https://api.openai.com/v1/moderations";

const MAX_RETRIES: u32 = 3;

const AGENT_INSTRUCTIONS: &str = "Asistente parroquial. Responde breve y claro.

TOOLS: get_calendar_events, search_parish_info, get_resources (copia COMPLETO a attachments)

REGLAS CRÍTICAS:
- Usa tools, no adivines
- Inscripciones/formularios → get_resources + copia a attachments
- Casos complejos → deriva al párroco
- Tono acogedor y profesional

COHERENCIA: NO mezcles actividades distintas
- Si preguntan por \"Eloos\" → habla SOLO de Eloos
- Si preguntan por \"Cáritas\" → habla SOLO de Cáritas
- NO agregues otras actividades solo porque ocurren el mismo día";

const RELEVANCE_REDIRECT: &str = "Solo puedo ayudarte con información sobre la parroquia: \
     horarios de misas, eventos, catequesis, sacramentos, grupos parroquiales, etc. \
     ¿En qué puedo ayudarte relacionado con la parroquia?";

const MODERATED_REPLY: &str = "Lo siento, no puedo procesar ese tipo de contenido. \
     Por favor, reformula tu mensaje de manera apropiada.";

const EMPTY_REPLY: &str = "Lo siento, no pude generar una respuesta.";

// ============ Guardrails ============

const IRRELEVANT_KEYWORDS: &[&str] = &[
    "bitcoin",
    "cripto",
    "cryptocurrency",
    "ethereum",
    "invertir",
    "trading",
    "futbol",
    "fútbol",
    "deportes",
    "partido",
    "recetas",
    "cocina",
    "restaurante",
    "programación",
    "código",
    "javascript",
    "python",
    "videojuegos",
    "gaming",
    "política",
    "elecciones",
    "gobierno",
];

const PARISH_KEYWORDS: &[&str] = &[
    "parroquia",
    "iglesia",
    "misa",
    "sacramento",
    "fe",
    "dios",
    "jesús",
    "virgen",
    "catequesis",
    "bautizo",
    "bautismo",
    "comunión",
    "confirmación",
    "matrimonio",
    "párroco",
    "padre",
    "eloos",
    "cáritas",
];

/// Off-topic detection: an irrelevant keyword with no parish keyword to
/// excuse it short-circuits the request.
pub fn check_relevance(message: &str) -> Option<&'static str> {
    let normalized = message.to_lowercase();

    let has_irrelevant = IRRELEVANT_KEYWORDS.iter().any(|kw| normalized.contains(kw));
    let has_parish = PARISH_KEYWORDS.iter().any(|kw| normalized.contains(kw));

    if has_irrelevant && !has_parish {
        Some(RELEVANCE_REDIRECT)
    } else {
        None
    }
}

const GENERIC_PATTERNS: &[&str] = &[
    "gracias",
    "muchas gracias",
    "mil gracias",
    "vale",
    "ok",
    "okay",
    "de acuerdo",
    "entendido",
    "perfecto",
    "genial",
    "excelente",
    "bien",
    "vale gracias",
    "ok gracias",
    "gracias vale",
    "entendido gracias",
    "perfecto gracias",
    "genial gracias",
    "excelente gracias",
    "bien gracias",
    "super",
    "super gracias",
    "muy bien",
    "muy bien gracias",
    "claro",
    "por supuesto",
    "desde luego",
    "sí",
    "si",
    "no",
];

const GENERIC_REPLIES: &[&str] = &[
    "¡De nada! ¿Hay algo más en lo que pueda ayudarte?",
    "¡Encantado de ayudar! Si necesitas algo más, aquí estoy.",
    "¡Para eso estoy! ¿Tienes alguna otra pregunta?",
    "¡Un placer! No dudes en preguntar si necesitas más información.",
];

/// Canned reply for a bare courtesy message; `None` for real questions.
/// The pick is derived from the message so it is stable under test.
pub fn generic_reply(message: &str) -> Option<&'static str> {
    let normalized = crate::cache::normalize_question(message);
    if GENERIC_PATTERNS.contains(&normalized.as_str()) {
        let pick = normalized.len() % GENERIC_REPLIES.len();
        Some(GENERIC_REPLIES[pick])
    } else {
        None
    }
}

// ============ OpenAI client ============

/// One assistant turn: either final text or tool calls to run.
#[derive(Debug, Clone)]
pub struct AssistantTurn {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
}

#[derive(Debug, Clone)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// JSON-encoded arguments, exactly as the model produced them.
    pub arguments: String,
}

pub struct ChatClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f64,
}

impl ChatClient {
    pub fn from_config(config: &ChatConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;

        Ok(Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(60))
                .build()?,
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }

    /// POST with retry on 429 (exponential backoff: 1s, 2s, 4s).
    async fn post_with_retry(&self, url: &str, body: &Value) -> Result<Value> {
        let mut last_err = None;

        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1));
                debug!("rate limited, retrying in {:?}", delay);
                tokio::time::sleep(delay).await;
            }

            let response = match self
                .client
                .post(url)
                .bearer_auth(&self.api_key)
                .json(body)
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    last_err = Some(anyhow::anyhow!(e));
                    continue;
                }
            };

            let status = response.status();
            if status.is_success() {
                return Ok(response.json().await?);
            }

            let body_text = response.text().await.unwrap_or_default();
            if status.as_u16() == 429 {
                last_err = Some(anyhow::anyhow!("OpenAI rate limit: {}", body_text));
                continue;
            }
            bail!("OpenAI error {}: {}", status, body_text);
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("OpenAI request failed after retries")))
    }

    /// One completion with optional tools.
    pub async fn complete(&self, messages: &[Value], tools: Option<&Value>) -> Result<AssistantTurn> {
        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        });
        if let Some(tools) = tools {
            body["tools"] = tools.clone();
            body["tool_choice"] = json!("auto");
        }

        let response = self.post_with_retry(CHAT_COMPLETIONS_URL, &body).await?;
        let message = response
            .pointer("/choices/0/message")
            .ok_or_else(|| anyhow::anyhow!("No response from model"))?;

        let content = message
            .get("content")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());

        let tool_calls = message
            .get("tool_calls")
            .and_then(|v| v.as_array())
            .map(|calls| {
                calls
                    .iter()
                    .filter_map(|call| {
                        Some(ToolCall {
                            id: call.get("id")?.as_str()?.to_string(),
                            name: call.pointer("/function/name")?.as_str()?.to_string(),
                            arguments: call
                                .pointer("/function/arguments")?
                                .as_str()
                                .unwrap_or("{}")
                                .to_string(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(AssistantTurn {
            content,
            tool_calls,
        })
    }

    /// System + single user message, plain text back. Used by query
    /// expansion.
    pub async fn complete_simple(&self, system: &str, user: &str) -> Result<String> {
        let messages = vec![
            json!({ "role": "system", "content": system }),
            json!({ "role": "user", "content": user }),
        ];
        let turn = self.complete(&messages, None).await?;
        turn.content
            .ok_or_else(|| anyhow::anyhow!("empty completion"))
    }

    /// Whether the moderation endpoint flags the input. Moderation
    /// errors are swallowed — a moderation outage must not take the
    /// assistant down.
    pub async fn moderate(&self, input: &str) -> bool {
        let body = json!({ "input": input });
        match self.post_with_retry(MODERATIONS_URL, &body).await {
            Ok(response) => response
                .pointer("/results/0/flagged")
                .and_then(|v| v.as_bool())
                .unwrap_or(false),
            Err(e) => {
                warn!("moderation failed, treating as not flagged: {}", e);
                false
            }
        }
    }
}

// ============ Tool definitions ============

fn tool_definitions() -> Value {
    json!([
        {
            "type": "function",
            "function": {
                "name": "get_calendar_events",
                "description": "Obtiene eventos del calendario parroquial por fecha/periodo.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "timeframe": {
                            "type": "string",
                            "enum": ["upcoming", "today", "tomorrow", "week", "weekend", "next_week", "month"],
                            "description": "El periodo de tiempo para buscar eventos"
                        },
                        "limit": {
                            "type": "number",
                            "description": "Número máximo de eventos a devolver"
                        },
                        "date": {
                            "type": "string",
                            "description": "Fecha YYYY-MM-DD para el filtro month"
                        }
                    },
                    "required": ["timeframe"]
                }
            }
        },
        {
            "type": "function",
            "function": {
                "name": "search_parish_info",
                "description": "Busca información en documentos oficiales de la parroquia (PDFs, guías, boletines): sacramentos, grupos, horarios de actividades, normativas. NO para eventos con fecha (usa get_calendar_events) ni formularios (usa get_resources).",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "query": {
                            "type": "string",
                            "description": "Consulta del usuario sobre la parroquia. Debe ser descriptiva y clara."
                        },
                        "categoria": {
                            "type": "string",
                            "enum": crate::metadata::PASTORAL_CATEGORIES,
                            "description": "Categoría pastoral para filtrar resultados (opcional)"
                        }
                    },
                    "required": ["query"]
                }
            }
        },
        {
            "type": "function",
            "function": {
                "name": "get_resources",
                "description": "Busca formularios, PDFs y documentos parroquiales.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "query": {
                            "type": "string",
                            "description": "La consulta o tema del usuario para buscar recursos relacionados"
                        }
                    },
                    "required": ["query"]
                }
            }
        }
    ])
}

// ============ Engine ============

/// Outcome of one chat request, as shaped for the HTTP response.
#[derive(Debug, Clone)]
pub struct ChatOutcome {
    pub message: String,
    pub attachments: Option<Vec<ResourceAttachment>>,
    pub from_cache: bool,
    pub guardrail: Option<&'static str>,
    pub moderated: bool,
    pub generic: bool,
}

impl ChatOutcome {
    fn plain(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            attachments: None,
            from_cache: false,
            guardrail: None,
            moderated: false,
            generic: false,
        }
    }
}

pub struct ChatEngine {
    config: Arc<Config>,
    client: Option<ChatClient>,
    calendar: Arc<CalendarStore>,
    vector_index: Arc<dyn VectorIndex>,
    cache: ResponseCache,
}

impl ChatEngine {
    pub fn new(
        config: Arc<Config>,
        calendar: Arc<CalendarStore>,
        vector_index: Arc<dyn VectorIndex>,
        cache: ResponseCache,
    ) -> Self {
        let client = match ChatClient::from_config(&config.chat) {
            Ok(c) => Some(c),
            Err(e) => {
                warn!("chat client unavailable: {}", e);
                None
            }
        };
        Self {
            config,
            client,
            calendar,
            vector_index,
            cache,
        }
    }

    /// Full message pipeline. Rate limiting happens in the HTTP layer.
    pub async fn handle(&self, message: &str, history: &[HistoryMessage]) -> Result<ChatOutcome> {
        if let Some(redirect) = check_relevance(message) {
            info!("irrelevant query blocked");
            return Ok(ChatOutcome {
                guardrail: Some("relevance"),
                ..ChatOutcome::plain(redirect)
            });
        }

        let client = self
            .client
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;

        if self.config.chat.moderation && client.moderate(message).await {
            info!("message flagged by moderation");
            return Ok(ChatOutcome {
                moderated: true,
                ..ChatOutcome::plain(MODERATED_REPLY)
            });
        }

        if let Some(reply) = generic_reply(message) {
            return Ok(ChatOutcome {
                generic: true,
                ..ChatOutcome::plain(reply)
            });
        }

        if self.config.chat.cache {
            if let Some(cached) = self.cache.get(message).await {
                info!("chat cache hit");
                return Ok(ChatOutcome {
                    from_cache: true,
                    ..ChatOutcome::plain(cached)
                });
            }
        }

        let outcome = self.run_completion(client, message, history).await?;

        if self.config.chat.cache && outcome.attachments.is_none() {
            self.cache.set(message, &outcome.message).await;
        }

        Ok(outcome)
    }

    async fn run_completion(
        &self,
        client: &ChatClient,
        message: &str,
        history: &[HistoryMessage],
    ) -> Result<ChatOutcome> {
        let mut messages: Vec<Value> =
            vec![json!({ "role": "system", "content": AGENT_INSTRUCTIONS })];

        let start = history.len().saturating_sub(self.config.chat.max_history);
        for turn in &history[start..] {
            if turn.role == "user" || turn.role == "assistant" {
                messages.push(json!({ "role": turn.role, "content": turn.content }));
            }
        }
        messages.push(json!({ "role": "user", "content": message }));

        let tools = tool_definitions();
        let mut attachments: Vec<ResourceAttachment> = Vec::new();
        let mut turn = client.complete(&messages, Some(&tools)).await?;

        let mut rounds = 0usize;
        while !turn.tool_calls.is_empty() && rounds < self.config.chat.max_tool_rounds {
            rounds += 1;

            // Echo the assistant turn back verbatim, then answer each
            // tool call.
            let calls_json: Vec<Value> = turn
                .tool_calls
                .iter()
                .map(|c| {
                    json!({
                        "id": c.id,
                        "type": "function",
                        "function": { "name": c.name, "arguments": c.arguments },
                    })
                })
                .collect();
            messages.push(json!({
                "role": "assistant",
                "content": turn.content,
                "tool_calls": calls_json,
            }));

            for call in &turn.tool_calls {
                debug!(round = rounds, tool = %call.name, "executing tool");
                let result = self
                    .execute_tool(client, &call.name, &call.arguments, &mut attachments)
                    .await;
                messages.push(json!({
                    "role": "tool",
                    "tool_call_id": call.id,
                    "content": result,
                }));
            }

            turn = client.complete(&messages, Some(&tools)).await?;
        }

        let reply = turn
            .content
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| EMPTY_REPLY.to_string());

        Ok(ChatOutcome {
            message: reply,
            attachments: if attachments.is_empty() {
                None
            } else {
                Some(attachments)
            },
            from_cache: false,
            guardrail: None,
            moderated: false,
            generic: false,
        })
    }

    /// Run one tool. Failures come back as user-readable strings in the
    /// tool result — the model decides how to apologize.
    async fn execute_tool(
        &self,
        client: &ChatClient,
        name: &str,
        arguments: &str,
        attachments: &mut Vec<ResourceAttachment>,
    ) -> String {
        let args: Value = serde_json::from_str(arguments).unwrap_or_else(|_| json!({}));

        match name {
            "get_calendar_events" => self.calendar_tool(&args).await,
            "search_parish_info" => self.search_tool(client, &args).await,
            "get_resources" => {
                let query = args.get("query").and_then(|v| v.as_str()).unwrap_or("");
                let found = resources::search_resources(query);
                let result = json!({ "found": !found.is_empty(), "resources": found.clone() });
                attachments.extend(found);
                result.to_string()
            }
            other => json!({ "error": format!("Función desconocida: {}", other) }).to_string(),
        }
    }

    async fn calendar_tool(&self, args: &Value) -> String {
        let timeframe_name = args
            .get("timeframe")
            .and_then(|v| v.as_str())
            .unwrap_or("upcoming");
        let limit = args.get("limit").and_then(|v| v.as_u64()).unwrap_or(10) as usize;

        let timeframe = match Timeframe::parse(
            timeframe_name,
            args.get("date").and_then(|v| v.as_str()),
        ) {
            Ok(t) => t,
            Err(e) => return format!("No pude interpretar el periodo solicitado: {}", e),
        };

        match self.calendar.events(false).await {
            Ok(events) => {
                let now = chrono::Utc::now();
                let filtered = calendar::filter_events(&events, &timeframe, now, limit);
                calendar::render_events_markdown(&filtered, timeframe_name, now)
            }
            Err(e) => {
                warn!("calendar tool failed: {}", e);
                "Lo siento, no pude obtener los eventos del calendario en este momento.".to_string()
            }
        }
    }

    async fn search_tool(&self, client: &ChatClient, args: &Value) -> String {
        let query = args.get("query").and_then(|v| v.as_str()).unwrap_or("");
        let categoria = args.get("categoria").and_then(|v| v.as_str());

        match retrieval::search(
            &self.config,
            self.vector_index.as_ref(),
            Some(client),
            query,
            categoria,
        )
        .await
        {
            Ok(matches) => retrieval::assemble_context(&matches),
            Err(e) => {
                warn!("parish info search failed: {}", e);
                format!(
                    "Error al buscar información: {}. Por favor, intenta de nuevo o consulta \
                     directamente con la parroquia.",
                    e
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn irrelevant_topic_without_parish_context_blocked() {
        assert!(check_relevance("¿me conviene invertir en bitcoin?").is_some());
        assert!(check_relevance("¿cuándo juega el partido de futbol?").is_some());
    }

    #[test]
    fn parish_keyword_rescues_overlapping_topic() {
        // "padre" rescues an otherwise-blocked sports question.
        assert!(check_relevance("¿el padre organiza el torneo de futbol?").is_none());
    }

    #[test]
    fn normal_questions_pass_relevance() {
        assert!(check_relevance("¿qué documentos necesito para el bautismo?").is_none());
        assert!(check_relevance("horario de misas").is_none());
    }

    #[test]
    fn courtesy_messages_get_canned_reply() {
        assert!(generic_reply("gracias").is_some());
        assert!(generic_reply("¡Muchas gracias!").is_some());
        assert!(generic_reply("vale").is_some());
    }

    #[test]
    fn real_questions_are_not_generic() {
        assert!(generic_reply("gracias, ¿y la catequesis?").is_none());
        assert!(generic_reply("¿qué es eloos?").is_none());
    }

    #[test]
    fn generic_reply_is_stable() {
        assert_eq!(generic_reply("gracias"), generic_reply("gracias"));
    }

    #[test]
    fn tool_definitions_cover_the_three_tools() {
        let tools = tool_definitions();
        let names: Vec<&str> = tools
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t.pointer("/function/name").unwrap().as_str().unwrap())
            .collect();
        assert_eq!(
            names,
            vec!["get_calendar_events", "search_parish_info", "get_resources"]
        );
    }
}
