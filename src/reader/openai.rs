//! OpenAI chat-completions client, used both to read clocks and to rewrite
//! prompts.
//!
//! Blocking `reqwest`, one request per call, no retries. The API key is held
//! as a [`SecretString`] and only exposed when building the auth header.

use std::path::Path;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use super::parse::parse_prediction;
use super::PredictionSource;
use crate::error::{Error, Result};
use crate::training::rewriter::{clean_rewrite, rewrite_request, PromptRewriter};
use crate::types::Prediction;

pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// Model and request settings (`[model]` in clocktune.toml).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ModelConfig {
    pub endpoint: String,
    pub model: String,
    /// Token cap for clock readings
    pub max_tokens: u32,
    /// Token cap for prompt rewrites
    pub rewrite_max_tokens: u32,
    pub rewrite_temperature: f64,
    pub timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: 300,
            rewrite_max_tokens: 800,
            rewrite_temperature: 0.7,
            timeout_secs: 60,
        }
    }
}

/// `data:` URL for an image file, MIME type from the extension.
pub fn image_data_url(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    let mime = match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "image/png",
    };
    Ok(format!("data:{};base64,{}", mime, STANDARD.encode(bytes)))
}

/// Request body for reading one image.
pub fn vision_request(model: &str, prompt: &str, data_url: &str, max_tokens: u32) -> Value {
    json!({
        "model": model,
        "messages": [{
            "role": "user",
            "content": [
                {"type": "text", "text": prompt},
                {"type": "image_url", "image_url": {"url": data_url}}
            ]
        }],
        "max_tokens": max_tokens,
    })
}

/// Request body for a text-only completion.
pub fn text_request(model: &str, prompt: &str, max_tokens: u32, temperature: f64) -> Value {
    json!({
        "model": model,
        "messages": [{"role": "user", "content": prompt}],
        "max_tokens": max_tokens,
        "temperature": temperature,
    })
}

/// `choices[0].message.content` of a chat-completions response.
pub fn message_content(response: &Value) -> Result<String> {
    response
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|arr| arr.first())
        .and_then(|choice| choice.get("message"))
        .and_then(|msg| msg.get("content"))
        .and_then(|content| content.as_str())
        .map(|s| s.trim().to_string())
        .ok_or_else(|| Error::Parse("Invalid chat completion response format".to_string()))
}

#[derive(Debug)]
pub struct OpenAiClient {
    api_key: SecretString,
    config: ModelConfig,
    client: reqwest::blocking::Client,
}

impl OpenAiClient {
    pub fn new(api_key: SecretString, config: ModelConfig) -> Result<Self> {
        if api_key.expose_secret().trim().is_empty() {
            return Err(Error::MissingCredential);
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            api_key,
            config,
            client,
        })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    fn complete(&self, body: &Value) -> Result<String> {
        let response = self
            .client
            .post(&self.config.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key.expose_secret()))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .map_err(|e| Error::Transport(format!("API request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().unwrap_or_else(|_| "Unknown error".to_string());
            return Err(Error::Transport(format!("API returned error {}: {}", status, error_text)));
        }

        let response_json: Value = response
            .json()
            .map_err(|e| Error::Parse(format!("Failed to parse response: {}", e)))?;
        message_content(&response_json)
    }
}

impl PredictionSource for OpenAiClient {
    fn predict(&self, image: &Path, prompt: &str) -> Result<Prediction> {
        let data_url = image_data_url(image)?;
        let body = vision_request(&self.config.model, prompt, &data_url, self.config.max_tokens);
        let content = self.complete(&body)?;
        debug!(image = %image.display(), response = %content, "model response");
        Ok(parse_prediction(&content))
    }

    fn name(&self) -> &str {
        &self.config.model
    }
}

impl PromptRewriter for OpenAiClient {
    fn improve(&self, current: &str, feedback: &str) -> Result<String> {
        let body = text_request(
            &self.config.model,
            &rewrite_request(current, feedback),
            self.config.rewrite_max_tokens,
            self.config.rewrite_temperature,
        );
        let content = self.complete(&body).map_err(|e| Error::Rewrite(e.to_string()))?;
        clean_rewrite(&content)
    }

    fn name(&self) -> &str {
        &self.config.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_key_rejected() {
        let err = OpenAiClient::new(SecretString::from(String::from("  ")), ModelConfig::default()).unwrap_err();
        assert!(matches!(err, Error::MissingCredential));
    }

    #[test]
    fn test_debug_does_not_leak_key() {
        let client = OpenAiClient::new(SecretString::from(String::from("sk-test-123")), ModelConfig::default()).unwrap();
        assert!(!format!("{:?}", client).contains("sk-test-123"));
    }

    #[test]
    fn test_image_data_url() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clock_0000_analog.JPG");
        std::fs::write(&path, b"abc").unwrap();
        assert_eq!(image_data_url(&path).unwrap(), "data:image/jpeg;base64,YWJj");

        assert!(matches!(image_data_url(&dir.path().join("missing.png")), Err(Error::Io(_))));
    }

    #[test]
    fn test_vision_request_shape() {
        let body = vision_request("gpt-4o", "read it", "data:image/png;base64,AA==", 300);
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["max_tokens"], 300);
        let content = &body["messages"][0]["content"];
        assert_eq!(content[0]["text"], "read it");
        assert_eq!(content[1]["image_url"]["url"], "data:image/png;base64,AA==");
    }

    #[test]
    fn test_message_content() {
        let ok = json!({"choices": [{"message": {"content": "  {\"hour\": 1}  "}}]});
        assert_eq!(message_content(&ok).unwrap(), "{\"hour\": 1}");
        assert!(matches!(message_content(&json!({"error": "nope"})), Err(Error::Parse(_))));
    }
}
