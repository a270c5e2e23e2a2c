use crate::config::GenerationConfig;
use crate::error::GenerationError;
use crate::traits::{GenerationRequest, Generator};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Chat-completions client for OpenAI-compatible endpoints.
pub struct OpenAiGenerator {
    client: Client,
    api_key: String,
    base_url: String,
}

impl std::fmt::Debug for OpenAiGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiGenerator")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl OpenAiGenerator {
    /// Fails with `NotConfigured` without an api key and with `Unavailable`
    /// when the HTTP client cannot be built.
    pub fn from_config(config: &GenerationConfig) -> Result<Self, GenerationError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| GenerationError::NotConfigured("no api key configured".to_string()))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|error| GenerationError::Unavailable(format!("http client: {error}")))?;

        let mut base_url = config.base_url.clone();
        while base_url.ends_with('/') {
            base_url.pop();
        }

        Ok(Self {
            client,
            api_key,
            base_url,
        })
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl Generator for OpenAiGenerator {
    fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let body = ChatRequest {
            model: &request.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user,
                },
            ],
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()?;

        let status = response.status();
        let text = response.text()?;
        if !status.is_success() {
            return Err(GenerationError::CallFailed(format!(
                "chat completion returned {status}"
            )));
        }

        parse_completion(&text)
    }
}

fn parse_completion(body: &str) -> Result<String, GenerationError> {
    let parsed: ChatResponse = serde_json::from_str(body)
        .map_err(|error| GenerationError::CallFailed(format!("malformed response: {error}")))?;

    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .map(|content| content.trim().to_string())
        .ok_or(GenerationError::EmptyResponse {
            provider: "openai".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_is_not_configured() {
        let config = GenerationConfig::default();
        assert!(matches!(
            OpenAiGenerator::from_config(&config),
            Err(GenerationError::NotConfigured(_))
        ));

        let blank = GenerationConfig {
            api_key: Some("  ".to_string()),
            ..GenerationConfig::default()
        };
        assert!(OpenAiGenerator::from_config(&blank).is_err());
    }

    #[test]
    fn base_url_trailing_slashes_are_dropped() -> Result<(), GenerationError> {
        let config = GenerationConfig {
            api_key: Some("sk-test".to_string()),
            base_url: "http://localhost:8080/v1//".to_string(),
            ..GenerationConfig::default()
        };
        let generator = OpenAiGenerator::from_config(&config)?;
        assert_eq!(generator.base_url, "http://localhost:8080/v1");
        assert!(!format!("{generator:?}").contains("sk-test"));
        Ok(())
    }

    #[test]
    fn completion_content_is_trimmed() -> Result<(), GenerationError> {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"  42 \n"}}]}"#;
        assert_eq!(parse_completion(body)?, "42");
        Ok(())
    }

    #[test]
    fn empty_choices_are_reported() {
        assert!(matches!(
            parse_completion(r#"{"choices":[]}"#),
            Err(GenerationError::EmptyResponse { .. })
        ));
        assert!(matches!(
            parse_completion("<html>"),
            Err(GenerationError::CallFailed(_))
        ));
    }

    #[test]
    fn request_body_has_system_then_user() -> Result<(), serde_json::Error> {
        let body = ChatRequest {
            model: "gpt-4o-mini",
            messages: [
                ChatMessage {
                    role: "system",
                    content: "rules",
                },
                ChatMessage {
                    role: "user",
                    content: "question",
                },
            ],
            max_tokens: 1024,
            temperature: 0.0,
        };
        let encoded = serde_json::to_value(&body)?;
        assert_eq!(encoded["messages"][0]["role"], "system");
        assert_eq!(encoded["messages"][1]["content"], "question");
        assert_eq!(encoded["max_tokens"], 1024);
        assert_eq!(encoded["temperature"], 0.0);
        Ok(())
    }
}
