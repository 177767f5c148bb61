//! Completion providers and the request handed to a transport.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::error::AiError;

/// Key prefix issued by OpenRouter.
const OPENROUTER_KEY_PREFIX: &str = "sk-or-";

/// A completion service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Provider {
    #[default]
    #[serde(rename = "openai", alias = "open_ai")]
    OpenAi,
    #[serde(rename = "claude")]
    Claude,
    #[serde(rename = "deep_seek", alias = "deepseek")]
    DeepSeek,
    #[serde(rename = "kimi")]
    Kimi,
    #[serde(rename = "open_router", alias = "openrouter")]
    OpenRouter,
    #[serde(rename = "ollama")]
    Ollama,
}

impl Provider {
    pub const ALL: [Self; 6] = [
        Self::OpenAi,
        Self::Claude,
        Self::DeepSeek,
        Self::Kimi,
        Self::OpenRouter,
        Self::Ollama,
    ];

    /// Everything but a local Ollama server needs a key.
    pub const fn requires_api_key(self) -> bool {
        !matches!(self, Self::Ollama)
    }

    /// Providers speaking the OpenAI chat-completions protocol.
    pub const fn is_openai_compatible(self) -> bool {
        matches!(
            self,
            Self::OpenAi | Self::DeepSeek | Self::Kimi | Self::OpenRouter
        )
    }

    pub const fn default_base_url(self) -> &'static str {
        match self {
            Self::OpenAi => "https://api.openai.com",
            Self::Claude => "https://api.anthropic.com",
            Self::DeepSeek => "https://api.deepseek.com",
            Self::Kimi => "https://api.moonshot.cn",
            Self::OpenRouter => "https://openrouter.ai/api",
            Self::Ollama => "http://127.0.0.1:11434",
        }
    }

    pub const fn default_model(self) -> &'static str {
        match self {
            Self::OpenAi => "gpt-4o-mini",
            Self::Claude => "claude-3-5-sonnet-latest",
            Self::DeepSeek => "deepseek-chat",
            Self::Kimi => "moonshot-v1-8k",
            Self::OpenRouter => "openrouter/auto",
            Self::Ollama => "llama3",
        }
    }

    /// Human-readable name.
    pub const fn label(self) -> &'static str {
        match self {
            Self::OpenAi => "OpenAI",
            Self::Claude => "Claude",
            Self::DeepSeek => "DeepSeek",
            Self::Kimi => "Kimi",
            Self::OpenRouter => "OpenRouter",
            Self::Ollama => "Ollama",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// User-facing AI settings.
///
/// Empty strings mean "use the provider default".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AiConfig {
    pub provider: Provider,
    pub api_key: String,
    pub api_base_url: String,
    pub model: String,
    pub system_prompt: String,
    pub temperature: f32,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            api_key: String::new(),
            api_base_url: String::new(),
            model: String::new(),
            system_prompt: String::new(),
            temperature: 0.7,
        }
    }
}

impl AiConfig {
    /// Settings for `provider` with every other field at its default.
    pub fn for_provider(provider: Provider) -> Self {
        Self {
            provider,
            ..Self::default()
        }
    }

    /// Check the settings before anything is sent.
    ///
    /// # Errors
    /// Returns [`AiError::MissingCredential`] if the provider needs a key
    /// and none is set.
    pub fn validate(&self) -> Result<(), AiError> {
        let key = self.api_key.trim();
        if self.provider.requires_api_key() && key.is_empty() {
            return Err(AiError::MissingCredential {
                provider: self.provider,
            });
        }
        if self.provider == Provider::OpenRouter && !key.starts_with(OPENROUTER_KEY_PREFIX) {
            tracing::warn!(
                "provider is OpenRouter but the API key does not start with {OPENROUTER_KEY_PREFIX}"
            );
        }
        Ok(())
    }

    /// Base URL to call, falling back to the provider default.
    pub fn base_url(&self) -> &str {
        non_empty(&self.api_base_url).unwrap_or_else(|| self.provider.default_base_url())
    }

    /// Model to request, falling back to the provider default.
    pub fn model(&self) -> &str {
        non_empty(&self.model).unwrap_or_else(|| self.provider.default_model())
    }
}

fn non_empty(s: &str) -> Option<&str> {
    let s = s.trim();
    (!s.is_empty()).then_some(s)
}

/// One turn of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }
}

/// Everything a transport needs to start one streaming completion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub provider: Provider,
    pub api_key: String,
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<ChatMessage>>,
}

impl CompletionRequest {
    /// Build a single-prompt request from `config`.
    pub fn new(prompt: impl Into<String>, config: &AiConfig) -> Self {
        Self {
            provider: config.provider,
            api_key: config.api_key.trim().to_string(),
            prompt: prompt.into(),
            model: non_empty(&config.model).map(str::to_string),
            system_prompt: non_empty(&config.system_prompt).map(str::to_string),
            temperature: Some(config.temperature),
            base_url: non_empty(&config.api_base_url).map(str::to_string),
            messages: None,
        }
    }

    /// Send a conversation history instead of the bare prompt.
    #[must_use]
    pub fn with_messages(mut self, messages: Vec<ChatMessage>) -> Self {
        self.messages = Some(messages);
        self
    }

    /// Model that will actually be requested.
    pub fn model(&self) -> &str {
        self.model
            .as_deref()
            .unwrap_or_else(|| self.provider.default_model())
    }

    /// Upstream endpoint for the streaming call.
    pub fn endpoint_url(&self) -> String {
        let base = self
            .base_url
            .as_deref()
            .unwrap_or_else(|| self.provider.default_base_url());
        match self.provider {
            Provider::Claude => join_base_and_v1_path(base, "/messages"),
            Provider::Ollama => format!("{}/api/chat", base.trim_end_matches('/')),
            _ => join_base_and_v1_path(base, "/chat/completions"),
        }
    }

    /// JSON body in the upstream provider's wire shape.
    pub fn upstream_body(&self) -> Value {
        match self.provider {
            Provider::Claude => self.anthropic_body(),
            Provider::Ollama => {
                let mut body = json!({
                    "model": self.model(),
                    "messages": self.openai_messages(),
                    "stream": false,
                });
                if let Some(t) = self.temperature {
                    body["options"] = json!({ "temperature": t });
                }
                body
            }
            _ => {
                let mut body = json!({
                    "model": self.model(),
                    "messages": self.openai_messages(),
                    "stream": true,
                });
                if let Some(t) = self.temperature {
                    body["temperature"] = json!(t);
                }
                body
            }
        }
    }

    fn openai_messages(&self) -> Vec<Value> {
        if let Some(history) = &self.messages {
            return history
                .iter()
                .map(|m| json!({ "role": m.role, "content": m.content }))
                .collect();
        }
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &self.system_prompt {
            messages.push(json!({ "role": "system", "content": system }));
        }
        messages.push(json!({ "role": "user", "content": self.prompt }));
        messages
    }

    fn anthropic_body(&self) -> Value {
        let text_turn =
            |role: &str, text: &str| json!({ "role": role, "content": [{ "type": "text", "text": text }] });
        let messages: Vec<Value> = match &self.messages {
            Some(history) => history
                .iter()
                .map(|m| {
                    let role = if m.role == "assistant" { "assistant" } else { "user" };
                    text_turn(role, &m.content)
                })
                .collect(),
            None => vec![text_turn("user", &self.prompt)],
        };
        let mut body = json!({
            "model": self.model(),
            "messages": messages,
            "stream": true,
        });
        if let Some(system) = &self.system_prompt {
            body["system"] = json!(system);
        }
        if let Some(t) = self.temperature {
            body["temperature"] = json!(t);
        }
        body
    }
}

/// Append `tail` to `base`, inserting `/v1` unless the base already ends with it.
///
/// ```
/// use marksync::ai::join_base_and_v1_path;
///
/// assert_eq!(
///     join_base_and_v1_path("https://api.openai.com/", "/models"),
///     "https://api.openai.com/v1/models"
/// );
/// assert_eq!(
///     join_base_and_v1_path("http://localhost:8080/v1", "/models"),
///     "http://localhost:8080/v1/models"
/// );
/// ```
pub fn join_base_and_v1_path(base: &str, tail: &str) -> String {
    let base = base.trim_end_matches('/');
    if base.ends_with("/v1") {
        format!("{base}{tail}")
    } else {
        format!("{base}/v1{tail}")
    }
}

/// Model ids from a provider's model listing response.
///
/// OpenAI-style listings carry `data[].id`; Ollama's `/api/tags` carries
/// `models[].name`. Unknown shapes yield an empty list.
pub fn model_ids(provider: Provider, listing: &Value) -> Vec<String> {
    let (array, field) = match provider {
        Provider::Ollama => ("models", "name"),
        _ => ("data", "id"),
    };
    listing
        .get(array)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get(field).and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
