//! Text-generation providers.
//!
//! Calls are synchronous and bounded by the configured timeout. HTTP failures
//! are mapped onto [`CompilationError`] so callers see one error vocabulary
//! regardless of provider.

use std::time::Duration;

use serde_json::Value;

use bibquery_plan::CompilationError;

use crate::env::{env_flag, env_string, env_timeout, ConfigError};

// ============================================================================
// Environment
// ============================================================================

pub const BIBQUERY_LLM_PROVIDER_ENV: &str = "BIBQUERY_LLM_PROVIDER";
pub const BIBQUERY_LLM_TIMEOUT_SECS_ENV: &str = "BIBQUERY_LLM_TIMEOUT_SECS";
pub const BIBQUERY_LLM_MAX_OUTPUT_TOKENS_ENV: &str = "BIBQUERY_LLM_MAX_OUTPUT_TOKENS";
pub const BIBQUERY_LLM_JSON_REPAIR_ENV: &str = "BIBQUERY_LLM_JSON_REPAIR";

pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const OPENAI_MODEL_ENV: &str = "OPENAI_MODEL";
pub const OPENAI_BASE_URL_ENV: &str = "OPENAI_BASE_URL";
pub const ANTHROPIC_API_KEY_ENV: &str = "ANTHROPIC_API_KEY";
pub const ANTHROPIC_MODEL_ENV: &str = "ANTHROPIC_MODEL";
pub const ANTHROPIC_BASE_URL_ENV: &str = "ANTHROPIC_BASE_URL";
pub const ANTHROPIC_VERSION_ENV: &str = "ANTHROPIC_VERSION";

const DEFAULT_LLM_TIMEOUT_SECS: u64 = 60;
const DEFAULT_LLM_MAX_OUTPUT_TOKENS: u32 = 1200;

const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";
const DEFAULT_OPENAI_MODEL: &str = "gpt-4.1-mini";
const DEFAULT_ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_ANTHROPIC_MODEL: &str = "claude-3-5-haiku-latest";
const DEFAULT_ANTHROPIC_VERSION: &str = "2023-06-01";

// ============================================================================
// Provider interface
// ============================================================================

/// One completion request.
pub struct LlmRequest<'a> {
    pub system: &'a str,
    pub user: &'a str,
    /// JSON schema the response must satisfy, when the provider supports
    /// schema-constrained output.
    pub schema: Option<&'a Value>,
}

pub trait LlmProvider: Send + Sync {
    /// Provider name used in errors and logs (`"openai"`, `"anthropic"`).
    fn name(&self) -> &'static str;

    fn model(&self) -> &str;

    /// Return the raw text of the model's answer.
    fn complete(&self, request: &LlmRequest<'_>) -> Result<String, CompilationError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    OpenAi,
    Anthropic,
}

impl ProviderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
        }
    }

    pub fn api_key_env(self) -> &'static str {
        match self {
            Self::OpenAi => OPENAI_API_KEY_ENV,
            Self::Anthropic => ANTHROPIC_API_KEY_ENV,
        }
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            other => Err(ConfigError::Invalid {
                name: BIBQUERY_LLM_PROVIDER_ENV,
                value: other.to_string(),
                expected: "openai|anthropic",
            }),
        }
    }
}

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub provider: ProviderKind,
    pub model: String,
    pub base_url: String,
    /// Missing keys are reported at call time as
    /// [`CompilationError::MissingCredentials`].
    pub api_key: Option<String>,
    pub anthropic_version: String,
    pub timeout: Option<Duration>,
    pub max_output_tokens: u32,
    pub json_repair: bool,
}

impl LlmConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let provider = match env_string(BIBQUERY_LLM_PROVIDER_ENV)? {
            Some(v) => v.parse()?,
            None => ProviderKind::OpenAi,
        };

        let (model_env, base_env, default_model, default_base) = match provider {
            ProviderKind::OpenAi => (
                OPENAI_MODEL_ENV,
                OPENAI_BASE_URL_ENV,
                DEFAULT_OPENAI_MODEL,
                DEFAULT_OPENAI_BASE_URL,
            ),
            ProviderKind::Anthropic => (
                ANTHROPIC_MODEL_ENV,
                ANTHROPIC_BASE_URL_ENV,
                DEFAULT_ANTHROPIC_MODEL,
                DEFAULT_ANTHROPIC_BASE_URL,
            ),
        };

        let max_output_tokens = match env_string(BIBQUERY_LLM_MAX_OUTPUT_TOKENS_ENV)? {
            None => DEFAULT_LLM_MAX_OUTPUT_TOKENS,
            Some(v) => match v.parse::<u32>() {
                Ok(0) => DEFAULT_LLM_MAX_OUTPUT_TOKENS,
                Ok(n) => n.min(32_000),
                Err(_) => {
                    return Err(ConfigError::Invalid {
                        name: BIBQUERY_LLM_MAX_OUTPUT_TOKENS_ENV,
                        value: v,
                        expected: "integer tokens, e.g. 1200",
                    })
                }
            },
        };

        Ok(Self {
            provider,
            model: env_string(model_env)?.unwrap_or_else(|| default_model.to_string()),
            base_url: api_base_url(env_string(base_env)?.as_deref(), default_base),
            api_key: env_string(provider.api_key_env())?,
            anthropic_version: env_string(ANTHROPIC_VERSION_ENV)?
                .unwrap_or_else(|| DEFAULT_ANTHROPIC_VERSION.to_string()),
            timeout: env_timeout(BIBQUERY_LLM_TIMEOUT_SECS_ENV, DEFAULT_LLM_TIMEOUT_SECS)?,
            max_output_tokens,
            json_repair: env_flag(BIBQUERY_LLM_JSON_REPAIR_ENV),
        })
    }

    /// Build the configured provider. Fails only when its cargo feature is off.
    pub fn build_provider(&self) -> Result<Box<dyn LlmProvider>, ConfigError> {
        match self.provider {
            #[cfg(feature = "llm-openai")]
            ProviderKind::OpenAi => Ok(Box::new(OpenAiProvider::new(self.clone()))),
            #[cfg(not(feature = "llm-openai"))]
            ProviderKind::OpenAi => Err(ConfigError::FeatureDisabled {
                feature: "llm-openai",
            }),
            #[cfg(feature = "llm-anthropic")]
            ProviderKind::Anthropic => Ok(Box::new(AnthropicProvider::new(self.clone()))),
            #[cfg(not(feature = "llm-anthropic"))]
            ProviderKind::Anthropic => Err(ConfigError::FeatureDisabled {
                feature: "llm-anthropic",
            }),
        }
    }
}

/// The configured base URL (or `default`) with an `https://` scheme when none
/// is given and no trailing slash.
fn api_base_url(configured: Option<&str>, default: &str) -> String {
    let base = configured
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(default)
        .trim_end_matches('/');
    if base.contains("://") {
        base.to_string()
    } else {
        format!("https://{base}")
    }
}

// ============================================================================
// Error mapping
// ============================================================================

/// Map a non-success HTTP status onto the compilation error vocabulary.
pub fn classify_http_status(
    provider: ProviderKind,
    status: u16,
    body: &str,
) -> CompilationError {
    let detail = format!("http {status}: {}", clip_text(body, 300));
    match status {
        401 | 403 => CompilationError::MissingCredentials {
            provider: provider.as_str().to_string(),
            env_var: provider.api_key_env().to_string(),
            detail,
        },
        408 | 429 | 500..=599 => CompilationError::RateLimitedOrTimeout {
            provider: provider.as_str().to_string(),
            detail,
        },
        _ => CompilationError::invalid_response(format!("{}: {detail}", provider.as_str())),
    }
}

fn missing_key(provider: ProviderKind) -> CompilationError {
    CompilationError::MissingCredentials {
        provider: provider.as_str().to_string(),
        env_var: provider.api_key_env().to_string(),
        detail: format!("{} is not set", provider.api_key_env()),
    }
}

/// At most `max_chars` characters of `text`, with `…` appended when cut.
pub(crate) fn clip_text(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}…", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(any(feature = "llm-openai", feature = "llm-anthropic"))]
fn classify_transport(provider: ProviderKind, url: &str, err: reqwest::Error) -> CompilationError {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        CompilationError::RateLimitedOrTimeout {
            provider: provider.as_str().to_string(),
            detail: format!("failed to reach {url}: {err}"),
        }
    } else {
        CompilationError::invalid_response(format!("{}: {err}", provider.as_str()))
    }
}

#[cfg(any(feature = "llm-openai", feature = "llm-anthropic"))]
fn http_client(
    provider: ProviderKind,
    timeout: Option<Duration>,
) -> Result<reqwest::blocking::Client, CompilationError> {
    let mut builder = reqwest::blocking::Client::builder();
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    builder.build().map_err(|e| {
        CompilationError::invalid_response(format!(
            "{}: failed to build http client: {e}",
            provider.as_str()
        ))
    })
}

#[cfg(any(feature = "llm-openai", feature = "llm-anthropic"))]
fn read_success_json(
    provider: ProviderKind,
    url: &str,
    resp: reqwest::blocking::Response,
) -> Result<Value, CompilationError> {
    let status = resp.status();
    if !status.is_success() {
        let text = resp.text().unwrap_or_default();
        return Err(classify_http_status(provider, status.as_u16(), &text));
    }
    resp.json::<Value>().map_err(|e| {
        if e.is_timeout() {
            classify_transport(provider, url, e)
        } else {
            CompilationError::invalid_response(format!(
                "{} returned invalid JSON: {e}",
                provider.as_str()
            ))
        }
    })
}

// ============================================================================
// OpenAI (Responses API)
// ============================================================================

#[cfg(feature = "llm-openai")]
pub struct OpenAiProvider {
    config: LlmConfig,
}

#[cfg(feature = "llm-openai")]
impl OpenAiProvider {
    pub fn new(config: LlmConfig) -> Self {
        Self { config }
    }
}

/// Concatenated `output_text` parts of the `message` items in a Responses
/// API payload.
pub fn openai_extract_output_text(v: &Value) -> Option<String> {
    let mut out = String::new();
    for item in v.get("output")?.as_array()? {
        if item.get("type").and_then(Value::as_str) != Some("message") {
            continue;
        }
        let Some(content) = item.get("content").and_then(Value::as_array) else {
            continue;
        };
        for part in content {
            if part.get("type").and_then(Value::as_str) != Some("output_text") {
                continue;
            }
            if let Some(t) = part.get("text").and_then(Value::as_str) {
                if !out.is_empty() {
                    out.push('\n');
                }
                out.push_str(t);
            }
        }
    }
    let trimmed = out.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(feature = "llm-openai")]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        ProviderKind::OpenAi.as_str()
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    fn complete(&self, request: &LlmRequest<'_>) -> Result<String, CompilationError> {
        let kind = ProviderKind::OpenAi;
        let api_key = self.config.api_key.as_deref().ok_or_else(|| missing_key(kind))?;
        let url = format!("{}/v1/responses", self.config.base_url);

        let mut body = serde_json::json!({
            "model": self.config.model,
            "instructions": request.system,
            "input": request.user,
            "max_output_tokens": self.config.max_output_tokens,
        });
        if let Some(schema) = request.schema {
            body["text"] = serde_json::json!({
                "format": {
                    "type": "json_schema",
                    "name": "query_plan",
                    "schema": schema,
                    "strict": true
                }
            });
        }

        let client = http_client(kind, self.config.timeout)?;
        tracing::debug!(url = %url, model = %self.config.model, "openai request");
        let resp = client
            .post(&url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .map_err(|e| classify_transport(kind, &url, e))?;
        let v = read_success_json(kind, &url, resp)?;

        openai_extract_output_text(&v).ok_or_else(|| {
            CompilationError::invalid_response(
                "openai: no output_text in response (unexpected response shape)",
            )
        })
    }
}

// ============================================================================
// Anthropic (Messages API)
// ============================================================================

#[cfg(feature = "llm-anthropic")]
pub struct AnthropicProvider {
    config: LlmConfig,
}

#[cfg(feature = "llm-anthropic")]
impl AnthropicProvider {
    pub fn new(config: LlmConfig) -> Self {
        Self { config }
    }
}

/// Concatenated `text` blocks of a Messages API payload.
pub fn anthropic_extract_output_text(v: &Value) -> Option<String> {
    let mut out = String::new();
    for block in v.get("content")?.as_array()? {
        if block.get("type").and_then(Value::as_str) != Some("text") {
            continue;
        }
        if let Some(t) = block.get("text").and_then(Value::as_str) {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(t);
        }
    }
    let trimmed = out.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(feature = "llm-anthropic")]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &'static str {
        ProviderKind::Anthropic.as_str()
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    fn complete(&self, request: &LlmRequest<'_>) -> Result<String, CompilationError> {
        let kind = ProviderKind::Anthropic;
        let api_key = self.config.api_key.as_deref().ok_or_else(|| missing_key(kind))?;
        let url = format!("{}/v1/messages", self.config.base_url);

        // The Messages API has no schema-constrained mode; the schema goes
        // into the system prompt instead.
        let system = match request.schema {
            Some(schema) => format!(
                "{}\n\nRespond with a single JSON object matching this JSON schema:\n{schema}",
                request.system
            ),
            None => request.system.to_string(),
        };
        let body = serde_json::json!({
            "model": self.config.model,
            "max_tokens": self.config.max_output_tokens,
            "temperature": 0,
            "system": system,
            "messages": [
                { "role": "user", "content": request.user }
            ]
        });

        let client = http_client(kind, self.config.timeout)?;
        tracing::debug!(url = %url, model = %self.config.model, "anthropic request");
        let resp = client
            .post(&url)
            .header("x-api-key", api_key)
            .header("anthropic-version", &self.config.anthropic_version)
            .json(&body)
            .send()
            .map_err(|e| classify_transport(kind, &url, e))?;
        let v = read_success_json(kind, &url, resp)?;

        anthropic_extract_output_text(&v).ok_or_else(|| {
            CompilationError::invalid_response(
                "anthropic: no text blocks in response (unexpected response shape)",
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_mapping() {
        assert!(matches!(
            classify_http_status(ProviderKind::OpenAi, 401, "bad key"),
            CompilationError::MissingCredentials { ref env_var, .. } if env_var == OPENAI_API_KEY_ENV
        ));
        assert!(matches!(
            classify_http_status(ProviderKind::Anthropic, 403, ""),
            CompilationError::MissingCredentials { ref env_var, .. } if env_var == ANTHROPIC_API_KEY_ENV
        ));
        for status in [429, 500, 503] {
            assert!(matches!(
                classify_http_status(ProviderKind::OpenAi, status, ""),
                CompilationError::RateLimitedOrTimeout { .. }
            ));
        }
        assert!(matches!(
            classify_http_status(ProviderKind::OpenAi, 400, "{\"error\":{}}"),
            CompilationError::InvalidResponse { .. }
        ));
    }

    #[test]
    fn extracts_openai_output_text() {
        let v = json!({
            "output": [
                { "type": "reasoning", "summary": [] },
                { "type": "message", "content": [
                    { "type": "output_text", "text": "{\"filters\": []}" }
                ]}
            ]
        });
        assert_eq!(openai_extract_output_text(&v).as_deref(), Some("{\"filters\": []}"));
        assert_eq!(openai_extract_output_text(&json!({ "output": [] })), None);
    }

    #[test]
    fn extracts_anthropic_text_blocks() {
        let v = json!({ "content": [ { "type": "text", "text": " {} " } ] });
        assert_eq!(anthropic_extract_output_text(&v).as_deref(), Some("{}"));
    }

    #[test]
    fn base_url_overrides() {
        assert_eq!(api_base_url(Some("api.example.com/"), DEFAULT_OPENAI_BASE_URL), "https://api.example.com");
        assert_eq!(api_base_url(Some("http://localhost:8080/v1//"), DEFAULT_OPENAI_BASE_URL), "http://localhost:8080/v1");
        assert_eq!(api_base_url(Some("  "), DEFAULT_OPENAI_BASE_URL), DEFAULT_OPENAI_BASE_URL);
        assert_eq!(api_base_url(None, DEFAULT_ANTHROPIC_BASE_URL), DEFAULT_ANTHROPIC_BASE_URL);
    }

    #[test]
    fn clipping_counts_characters() {
        assert_eq!(clip_text("  short  ", 10), "short");
        assert_eq!(clip_text("Straßburger Drucke", 6), "Straßb…");
    }

    #[test]
    fn provider_names_parse() {
        assert_eq!("Anthropic".parse::<ProviderKind>().unwrap(), ProviderKind::Anthropic);
        assert!("ollama".parse::<ProviderKind>().is_err());
    }
}
