//! Static provider registry and request construction.

use std::fmt;
use std::str::FromStr;

use serde_json::{Value, json};
use tracing::warn;

use crate::llm::accumulator::DecodeMode;

/// Wire protocol spoken by a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// OpenAI-compatible chat completions over SSE.
    OpenAiCompatible,
    /// Anthropic messages API over SSE.
    Anthropic,
    /// Ollama chat API, newline-delimited JSON.
    Ollama,
}

impl Backend {
    /// Ollama inlines reasoning in the content field; the others tag it.
    pub fn decode_mode(&self) -> DecodeMode {
        match self {
            Backend::OpenAiCompatible | Backend::Anthropic => DecodeMode::Separated,
            Backend::Ollama => DecodeMode::Inline,
        }
    }
}

/// Supported providers. Several names share a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    OpenAi,
    ChatGpt,
    Bailian,
    Qwen,
    DeepSeek,
    SiliconFlow,
    Zai,
    Anthropic,
    Ollama,
}

/// Name table: every accepted spelling and the provider it selects.
const PROVIDER_NAMES: &[(&str, Provider)] = &[
    ("openai", Provider::OpenAi),
    ("chatgpt", Provider::ChatGpt),
    ("bailian", Provider::Bailian),
    ("qwen", Provider::Qwen),
    ("deepseek", Provider::DeepSeek),
    ("siliconflow", Provider::SiliconFlow),
    ("zai", Provider::Zai),
    ("zhipu", Provider::Zai),
    ("anthropic", Provider::Anthropic),
    ("claude", Provider::Anthropic),
    ("ollama", Provider::Ollama),
    ("local", Provider::Ollama),
];

const DASHSCOPE_BASE: &str = "https://dashscope.aliyuncs.com/compatible-mode/v1";
const DEFAULT_OLLAMA_HOST: &str = "http://localhost:11434";
const ANTHROPIC_VERSION: &str = "2023-06-01";

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::ChatGpt => "chatgpt",
            Provider::Bailian => "bailian",
            Provider::Qwen => "qwen",
            Provider::DeepSeek => "deepseek",
            Provider::SiliconFlow => "siliconflow",
            Provider::Zai => "zai",
            Provider::Anthropic => "anthropic",
            Provider::Ollama => "ollama",
        }
    }

    pub fn backend(&self) -> Backend {
        match self {
            Provider::Anthropic => Backend::Anthropic,
            Provider::Ollama => Backend::Ollama,
            _ => Backend::OpenAiCompatible,
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Provider::Zai => "glm-4.5-flash",
            Provider::Anthropic => "claude-haiku-4-5-20251001",
            Provider::Ollama => "qwen3:8b",
            _ => "qwen-turbo-latest",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            Provider::OpenAi | Provider::ChatGpt => "https://api.openai.com/v1",
            Provider::Bailian | Provider::Qwen => DASHSCOPE_BASE,
            Provider::DeepSeek => "https://api.deepseek.com/v1",
            Provider::SiliconFlow => "https://api.siliconflow.cn/v1",
            Provider::Zai => "https://open.bigmodel.cn/api/paas/v4",
            Provider::Anthropic => "https://api.anthropic.com",
            Provider::Ollama => DEFAULT_OLLAMA_HOST,
        }
    }

    /// Resolve a provider name, falling back to OpenAI for unknown names.
    pub fn resolve(name: &str) -> Provider {
        name.parse().unwrap_or_else(|_| {
            warn!(
                "Provider {} not found, falling back to default: {}",
                name,
                Provider::OpenAi
            );
            Provider::OpenAi
        })
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_lowercase();
        PROVIDER_NAMES
            .iter()
            .find(|(candidate, _)| *candidate == name)
            .map(|(_, provider)| *provider)
            .ok_or_else(|| format!("Unknown provider: {}", s))
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything needed to address one provider.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub provider: Provider,
    pub model: String,
    pub base_url: String,
    pub api_key: String,
    /// Anthropic `max_tokens`.
    pub max_tokens: u32,
    pub enable_thinking: bool,
}

impl ProviderConfig {
    /// Config with the provider's default model and endpoint.
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            model: provider.default_model().to_string(),
            base_url: provider.default_base_url().to_string(),
            api_key: String::new(),
            max_tokens: 1024,
            enable_thinking: false,
        }
    }

    pub fn backend(&self) -> Backend {
        self.provider.backend()
    }

    /// Build the streaming request for `prompt`.
    pub fn build_request(&self, prompt: &str) -> ChatRequest {
        let base = self.base_url.trim_end_matches('/');
        let messages = json!([{ "role": "user", "content": prompt }]);

        match self.backend() {
            Backend::OpenAiCompatible => {
                let mut body = json!({
                    "model": self.model,
                    "messages": messages,
                    "stream": true,
                    "stream_options": { "include_usage": true },
                });
                if self.provider == Provider::Zai {
                    let kind = if self.enable_thinking { "enabled" } else { "disabled" };
                    body["thinking"] = json!({ "type": kind });
                }
                let mut headers = vec![("Content-Type".to_string(), "application/json".to_string())];
                if !self.api_key.is_empty() {
                    headers.push(("Authorization".to_string(), format!("Bearer {}", self.api_key)));
                }
                ChatRequest {
                    url: format!("{}/chat/completions", base),
                    headers,
                    body,
                }
            }
            Backend::Anthropic => {
                let mut body = json!({
                    "model": self.model,
                    "messages": messages,
                    "max_tokens": self.max_tokens,
                    "stream": true,
                });
                if self.enable_thinking {
                    // Thinking budget must stay below max_tokens.
                    let budget = (self.max_tokens / 2).max(1024);
                    body["thinking"] = json!({ "type": "enabled", "budget_tokens": budget });
                    if budget >= self.max_tokens {
                        body["max_tokens"] = json!(budget * 2);
                    }
                }
                let headers = vec![
                    ("Content-Type".to_string(), "application/json".to_string()),
                    ("x-api-key".to_string(), self.api_key.clone()),
                    ("anthropic-version".to_string(), ANTHROPIC_VERSION.to_string()),
                ];
                ChatRequest {
                    url: format!("{}/v1/messages", base),
                    headers,
                    body,
                }
            }
            Backend::Ollama => ChatRequest {
                url: format!("{}/api/chat", base),
                headers: vec![("Content-Type".to_string(), "application/json".to_string())],
                body: json!({
                    "model": self.model,
                    "messages": messages,
                    "stream": true,
                }),
            },
        }
    }
}

/// A fully-built streaming request, ready for a transport.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Value,
}
