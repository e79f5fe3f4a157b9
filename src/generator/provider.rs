use std::time::Duration;

use serde::{Deserialize, Serialize};
#[cfg(feature = "network")]
use serde_json::{Value, json};

use crate::generator::{ContentGenerator, GeneratorError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    Anthropic,
}

impl ProviderKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "openai" | "open-ai" | "open_ai" => Some(ProviderKind::OpenAi),
            "anthropic" => Some(ProviderKind::Anthropic),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Anthropic => "anthropic",
        }
    }

    pub fn default_base_url(self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "https://api.openai.com/v1",
            ProviderKind::Anthropic => "https://api.anthropic.com/v1",
        }
    }

    pub fn default_model(self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "gpt-4o-mini",
            ProviderKind::Anthropic => "claude-3-5-haiku-latest",
        }
    }

    pub fn default_key_env(self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "OPENAI_API_KEY",
            ProviderKind::Anthropic => "ANTHROPIC_API_KEY",
        }
    }

    pub fn other(self) -> Self {
        match self {
            ProviderKind::OpenAi => ProviderKind::Anthropic,
            ProviderKind::Anthropic => ProviderKind::OpenAi,
        }
    }
}

/// Everything needed to talk to one provider. Resolved from config, mutated
/// by the credential-recovery flow.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderSettings {
    pub kind: ProviderKind,
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl ProviderSettings {
    pub fn defaults_for(kind: ProviderKind, timeout: Duration) -> Self {
        Self {
            kind,
            base_url: kind.default_base_url().to_string(),
            model: kind.default_model().to_string(),
            api_key: std::env::var(kind.default_key_env()).ok().filter(|k| !k.is_empty()),
            timeout,
        }
    }

    /// Settings for the other provider, keeping the timeout.
    pub fn switched(&self) -> Self {
        Self::defaults_for(self.kind.other(), self.timeout)
    }
}

pub struct HttpGenerator {
    settings: ProviderSettings,
}

impl HttpGenerator {
    pub fn new(settings: ProviderSettings) -> Self {
        Self { settings }
    }
}

#[cfg(feature = "network")]
impl ContentGenerator for HttpGenerator {
    fn complete(&mut self, prompt: &str) -> Result<String, GeneratorError> {
        let Some(api_key) = self.settings.api_key.clone() else {
            return Err(GeneratorError::Auth { status: 401 });
        };
        let client = reqwest::blocking::Client::builder()
            .timeout(self.settings.timeout)
            .build()
            .map_err(|e| GeneratorError::Network(e.to_string()))?;

        let base = self.settings.base_url.trim_end_matches('/');
        let request = match self.settings.kind {
            ProviderKind::OpenAi => client
                .post(format!("{base}/chat/completions"))
                .bearer_auth(&api_key)
                .json(&json!({
                    "model": self.settings.model,
                    "messages": [{"role": "user", "content": prompt}],
                    "temperature": 0.7,
                })),
            ProviderKind::Anthropic => client
                .post(format!("{base}/messages"))
                .header("x-api-key", &api_key)
                .header("anthropic-version", "2023-06-01")
                .json(&json!({
                    "model": self.settings.model,
                    "max_tokens": 4096,
                    "messages": [{"role": "user", "content": prompt}],
                })),
        };

        let response = request
            .send()
            .map_err(|e| GeneratorError::Network(e.to_string()))?;
        let status = response.status().as_u16();
        if status == 401 || status == 403 {
            return Err(GeneratorError::Auth { status });
        }
        let body = response
            .text()
            .map_err(|e| GeneratorError::Network(e.to_string()))?;
        if !(200..300).contains(&status) {
            return Err(GeneratorError::Http {
                status,
                body: body.chars().take(200).collect(),
            });
        }

        let value: Value = serde_json::from_str(&body)
            .map_err(|e| GeneratorError::Malformed(format!("provider envelope: {e}")))?;
        response_text(self.settings.kind, &value)
            .ok_or_else(|| GeneratorError::Malformed("provider envelope has no text".to_string()))
    }
}

#[cfg(not(feature = "network"))]
impl ContentGenerator for HttpGenerator {
    fn complete(&mut self, _prompt: &str) -> Result<String, GeneratorError> {
        Err(GeneratorError::Unavailable(format!(
            "built without the `network` feature ({} provider)",
            self.settings.kind.as_str()
        )))
    }
}

#[cfg(feature = "network")]
fn response_text(kind: ProviderKind, value: &Value) -> Option<String> {
    match kind {
        ProviderKind::OpenAi => value
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(str::to_string),
        ProviderKind::Anthropic => {
            let parts: Vec<&str> = value
                .get("content")?
                .as_array()?
                .iter()
                .filter(|block| block.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|block| block.get("text").and_then(Value::as_str))
                .collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.concat())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_parse() {
        assert_eq!(ProviderKind::parse("OpenAI"), Some(ProviderKind::OpenAi));
        assert_eq!(ProviderKind::parse(" anthropic "), Some(ProviderKind::Anthropic));
        assert_eq!(ProviderKind::parse("gemini"), None);
    }

    #[test]
    fn test_switched_flips_provider_and_keeps_timeout() {
        let settings = ProviderSettings::defaults_for(ProviderKind::OpenAi, Duration::from_secs(9));
        let switched = settings.switched();
        assert_eq!(switched.kind, ProviderKind::Anthropic);
        assert_eq!(switched.timeout, Duration::from_secs(9));
        assert_eq!(switched.base_url, "https://api.anthropic.com/v1");
    }

    #[cfg(feature = "network")]
    #[test]
    fn test_missing_key_is_auth_error_without_network() {
        let mut settings = ProviderSettings::defaults_for(ProviderKind::OpenAi, Duration::from_secs(1));
        settings.api_key = None;
        let mut generator = HttpGenerator::new(settings);
        assert_eq!(
            generator.complete("hi"),
            Err(GeneratorError::Auth { status: 401 })
        );
    }

    #[cfg(feature = "network")]
    #[test]
    fn test_envelope_text_extraction() {
        let openai = json!({"choices": [{"message": {"content": "{\"a\":1}"}}]});
        assert_eq!(response_text(ProviderKind::OpenAi, &openai).as_deref(), Some("{\"a\":1}"));
        let anthropic = json!({"content": [{"type": "text", "text": "part1 "}, {"type": "text", "text": "part2"}]});
        assert_eq!(
            response_text(ProviderKind::Anthropic, &anthropic).as_deref(),
            Some("part1 part2")
        );
    }
}
