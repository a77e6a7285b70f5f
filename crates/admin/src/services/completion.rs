//! Chat-completion client for blog drafting.
//!
//! A thin collaborator: it builds the prompts, sends one non-streaming
//! request and parses the JSON document the model was asked to return.

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::instrument;

use crate::config::CompletionConfig;

const COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Errors that can occur when calling the completion API.
#[derive(Debug, Error)]
pub enum CompletionError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Rate limited by the API.
    #[error("rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// Authentication failed.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The reply was empty or not the requested JSON.
    #[error("parse error: {0}")]
    Parse(String),

    /// The API key cannot be sent as a header.
    #[error("invalid API key")]
    InvalidKey,
}

/// Sampling settings for one request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sampling {
    pub max_tokens: u32,
    pub temperature: f32,
    pub frequency_penalty: f32,
    pub presence_penalty: f32,
}

impl Sampling {
    /// Long-form article drafting.
    pub const ARTICLE: Self = Self {
        max_tokens: 3000,
        temperature: 0.7,
        frequency_penalty: 0.0,
        presence_penalty: 0.0,
    };

    /// Idea brainstorming; more varied output.
    pub const IDEAS: Self = Self {
        max_tokens: 1500,
        temperature: 0.8,
        frequency_penalty: 0.3,
        presence_penalty: 0.3,
    };
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
    frequency_penalty: f32,
    presence_penalty: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Value,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

/// A parsed JSON reply.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonCompletion {
    pub document: Value,
    pub usage: Value,
    pub model: String,
}

/// Completion API client.
#[derive(Clone)]
pub struct CompletionClient {
    inner: Arc<CompletionClientInner>,
}

struct CompletionClientInner {
    client: reqwest::Client,
    model: String,
}

impl CompletionClient {
    /// Create a new client.
    ///
    /// # Errors
    ///
    /// Returns error if the API key is not a valid header value or the HTTP
    /// client fails to build.
    pub fn new(config: &CompletionConfig) -> Result<Self, CompletionError> {
        let mut auth = HeaderValue::from_str(&format!(
            "Bearer {}",
            config.api_key.expose_secret()
        ))
        .map_err(|_| CompletionError::InvalidKey)?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(AUTHORIZATION, auth);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            inner: Arc::new(CompletionClientInner {
                client,
                model: config.model.clone(),
            }),
        })
    }

    /// Send a system and a user prompt and parse the reply as JSON.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails, the reply is empty, or the reply
    /// is not JSON even after removing code fences.
    #[instrument(skip(self, system, user), fields(model = %self.inner.model))]
    pub async fn complete_json(
        &self,
        system: &str,
        user: &str,
        sampling: Sampling,
    ) -> Result<JsonCompletion, CompletionError> {
        let request = ChatRequest {
            model: &self.inner.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            max_tokens: sampling.max_tokens,
            temperature: sampling.temperature,
            top_p: 1.0,
            frequency_penalty: sampling.frequency_penalty,
            presence_penalty: sampling.presence_penalty,
        };

        let response = self
            .inner
            .client
            .post(COMPLETIONS_URL)
            .json(&request)
            .send()
            .await?;
        let reply = handle_response(response).await?;

        let content = reply
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| CompletionError::Parse("empty completion".to_string()))?;

        let document = parse_json_reply(&content)?;
        Ok(JsonCompletion {
            document,
            usage: reply.usage,
            model: reply.model.unwrap_or_else(|| self.inner.model.clone()),
        })
    }
}

impl std::fmt::Debug for CompletionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionClient")
            .field("model", &self.inner.model)
            .finish_non_exhaustive()
    }
}

async fn handle_response(response: reqwest::Response) -> Result<ChatResponse, CompletionError> {
    let status = response.status();

    if status.is_success() {
        let body = response.text().await?;
        return serde_json::from_str(&body)
            .map_err(|e| CompletionError::Parse(format!("Failed to parse response: {e}")));
    }

    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse().ok())
            .unwrap_or(60);
        return Err(CompletionError::RateLimited(retry_after));
    }

    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(CompletionError::Unauthorized("Invalid API key".to_string()));
    }

    let body = response.text().await?;
    let message = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| v.pointer("/error/message").and_then(Value::as_str).map(String::from))
        .unwrap_or(body);
    Err(CompletionError::Api {
        status: status.as_u16(),
        message,
    })
}

/// Parse a reply as JSON, retrying once without Markdown code fences.
///
/// # Errors
///
/// Returns `Parse` if neither form is valid JSON.
pub fn parse_json_reply(content: &str) -> Result<Value, CompletionError> {
    serde_json::from_str(content).or_else(|first| {
        tracing::debug!(error = %first, "Completion reply is not bare JSON, removing fences");
        serde_json::from_str(clean_json_response(content))
            .map_err(|e| CompletionError::Parse(format!("reply is not valid JSON: {e}")))
    })
}

/// Strip a leading ```` ```json ```` or ```` ``` ```` fence and a trailing
/// ```` ``` ```` fence.
#[must_use]
pub fn clean_json_response(content: &str) -> &str {
    let trimmed = content.trim();
    let without_open = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_open
        .strip_suffix("```")
        .unwrap_or(without_open)
        .trim()
}

/// Article request sent by the dashboard editor.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleRequest {
    #[serde(default)]
    pub selected_idea: String,
    #[serde(default)]
    pub additional_context: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default = "default_audience")]
    pub target_audience: String,
    #[serde(default = "default_length")]
    pub article_length: String,
}

fn default_audience() -> String {
    "principiante".to_string()
}

fn default_length() -> String {
    "mediano".to_string()
}

/// Idea brainstorming request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IdeasRequest {
    #[serde(default, alias = "focusArea")]
    pub topic: Option<String>,
    #[serde(default, alias = "audienceLevel")]
    pub audience: Option<String>,
    #[serde(default)]
    pub count: Option<u32>,
}

pub const ARTICLE_SYSTEM_PROMPT: &str = "Eres un experto escritor especializado en santería \
yoruba y SEO. Escribe artículos informativos, respetuosos y culturalmente precisos, con \
subtítulos HTML y palabras clave integradas de forma natural. Tu respuesta debe ser ÚNICAMENTE \
un JSON válido con la estructura indicada, sin texto adicional.";

pub const IDEAS_SYSTEM_PROMPT: &str = "Eres un experto en santería yoruba y marketing de \
contenidos. Genera ideas originales para artículos de blog educativos, respetuosos y \
optimizados para SEO.";

impl ArticleRequest {
    /// The user prompt for this article.
    #[must_use]
    pub fn user_prompt(&self) -> String {
        let keywords = self.keywords.join(", ");
        let context = if self.additional_context.trim().is_empty() {
            "Ninguno específico"
        } else {
            self.additional_context.trim()
        };
        format!(
            r#"Crea un artículo completo sobre "{idea}" para un blog de santería yoruba.

DETALLES DEL ARTÍCULO:
- Audiencia objetivo: {audience}
- Longitud del artículo: {length} (corto: 500-800 palabras, mediano: 800-1500, largo: 1500+)
- Palabras clave a incluir naturalmente: {keywords}
- Contexto adicional: {context}

Responde ÚNICAMENTE con un JSON con esta estructura:
{{
  "title": "Título del artículo",
  "content": "Contenido en HTML con h2, h3, p y listas",
  "excerpt": "Resumen de 150-160 caracteres",
  "seoTitle": "Título SEO de máximo 60 caracteres",
  "seoDescription": "Meta descripción de 150-160 caracteres",
  "keywords": ["palabras", "clave"],
  "categories": ["categorías"],
  "tags": ["etiquetas"]
}}"#,
            idea = self.selected_idea.trim(),
            audience = self.target_audience,
            length = self.article_length,
        )
    }
}

impl IdeasRequest {
    /// Number of ideas to ask for.
    #[must_use]
    pub fn count(&self) -> u32 {
        self.count.unwrap_or(6).clamp(1, 20)
    }

    /// The user prompt for this brainstorm.
    #[must_use]
    pub fn user_prompt(&self) -> String {
        let mut prompt = format!(
            "Genera {} ideas únicas y atractivas para artículos de blog sobre santería yoruba.\n",
            self.count()
        );
        if let Some(topic) = self.topic.as_deref().filter(|t| !t.trim().is_empty()) {
            let _ = writeln!(prompt, "Área de enfoque: {}", topic.trim());
        }
        if let Some(audience) = self
            .audience
            .as_deref()
            .filter(|a| !a.trim().is_empty() && *a != "todos")
        {
            let _ = writeln!(prompt, "Nivel de audiencia: {}", audience.trim());
        }
        prompt.push_str(
            r#"
Cada idea incluye un título, una descripción breve, una categoría temática y un nivel de
dificultad (Principiante, Intermedio, Avanzado).

Responde ÚNICAMENTE con un JSON en este formato:
{"ideas": [{"title": "", "description": "", "category": "", "difficulty": ""}]}"#,
        );
        prompt
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_clean_json_response_strips_fences() {
        assert_eq!(clean_json_response("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(clean_json_response("```\n{\"a\":1}```"), "{\"a\":1}");
        assert_eq!(clean_json_response("  {\"a\":1}  "), "{\"a\":1}");
        assert_eq!(clean_json_response(""), "");
    }

    #[test]
    fn test_parse_json_reply() {
        assert_eq!(parse_json_reply("{\"ideas\":[]}").unwrap(), json!({"ideas": []}));
        assert_eq!(
            parse_json_reply("```json\n{\"title\":\"Oshun\"}\n```").unwrap(),
            json!({"title": "Oshun"})
        );
        assert!(matches!(
            parse_json_reply("Aquí tienes tu artículo"),
            Err(CompletionError::Parse(_))
        ));
    }

    #[test]
    fn test_article_request_defaults() {
        let request: ArticleRequest =
            serde_json::from_value(json!({"selectedIdea": "Los colores de Yemayá"})).unwrap();
        assert_eq!(request.target_audience, "principiante");
        assert_eq!(request.article_length, "mediano");

        let prompt = request.user_prompt();
        assert!(prompt.contains("\"Los colores de Yemayá\""));
        assert!(prompt.contains("Ninguno específico"));
    }

    #[test]
    fn test_ideas_request_prompt() {
        let request: IdeasRequest =
            serde_json::from_value(json!({"focusArea": "Orishas", "count": 3})).unwrap();
        assert_eq!(request.count(), 3);
        let prompt = request.user_prompt();
        assert!(prompt.starts_with("Genera 3 ideas"));
        assert!(prompt.contains("Área de enfoque: Orishas"));
        assert!(!prompt.contains("Nivel de audiencia"));

        assert_eq!(IdeasRequest::default().count(), 6);
    }

    #[test]
    fn test_error_display() {
        let err = CompletionError::RateLimited(60);
        assert_eq!(err.to_string(), "rate limited, retry after 60 seconds");
    }

    #[test]
    fn test_chat_response_deserialization() {
        let reply: ChatResponse = serde_json::from_value(json!({
            "model": "gpt-4-1106-preview",
            "choices": [{"message": {"role": "assistant", "content": "{}"}}],
            "usage": {"total_tokens": 12}
        }))
        .unwrap();
        assert_eq!(reply.choices.len(), 1);
        assert_eq!(reply.usage["total_tokens"], 12);
    }
}
