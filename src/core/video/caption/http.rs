//! OpenAI-compatible chat-completions vision endpoint

use super::CaptionModel;
use crate::core::video::error::PipelineError;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use log::debug;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpCaptionConfig {
    /// Full chat-completions URL
    pub endpoint: String,
    pub model: String,
    /// Environment variable holding the bearer token, if any
    pub api_key_env: Option<String>,
    pub timeout_secs: u64,
    pub max_tokens: u32,
}

impl Default for HttpCaptionConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434/v1/chat/completions".to_string(),
            model: "llava".to_string(),
            api_key_env: Some("CAPTION_API_KEY".to_string()),
            timeout_secs: 60,
            max_tokens: 120,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct HttpCaptionModel {
    client: Client,
    config: HttpCaptionConfig,
    api_key: Option<String>,
}

impl HttpCaptionModel {
    pub fn new(config: HttpCaptionConfig) -> Result<Self, PipelineError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PipelineError::ModelLoadFailed(format!("HTTP client: {}", e)))?;
        let api_key = config
            .api_key_env
            .as_deref()
            .and_then(|name| env::var(name).ok())
            .filter(|key| !key.is_empty());

        Ok(Self {
            client,
            config,
            api_key,
        })
    }

    fn mime_type(image: &Path) -> &'static str {
        match image
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("jpg") | Some("jpeg") => "image/jpeg",
            Some("bmp") => "image/bmp",
            _ => "image/png",
        }
    }

    fn build_request(&self, image: &Path, prompt: &str) -> Result<serde_json::Value, PipelineError> {
        let bytes = fs::read(image)?;
        let data_url = format!(
            "data:{};base64,{}",
            Self::mime_type(image),
            BASE64.encode(bytes)
        );
        Ok(json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": prompt },
                    { "type": "image_url", "image_url": { "url": data_url } }
                ]
            }]
        }))
    }

    fn parse_response(body: &str) -> Result<String, PipelineError> {
        let response: ChatResponse = serde_json::from_str(body)
            .map_err(|e| PipelineError::Caption(format!("unexpected response: {}", e)))?;
        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| PipelineError::Caption("empty completion".to_string()))
    }
}

impl CaptionModel for HttpCaptionModel {
    fn name(&self) -> &str {
        &self.config.model
    }

    fn caption(&self, image: &Path, prompt: &str) -> Result<String, PipelineError> {
        let body = self.build_request(image, prompt)?;
        debug!("🌐 POST {} for {:?}", self.config.endpoint, image);

        let mut request = self
            .client
            .post(&self.config.endpoint)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(serde_json::to_string(&body)?);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send()?;
        let status = response.status();
        let text = response.text()?;
        if !status.is_success() {
            return Err(PipelineError::Caption(format!(
                "caption endpoint returned {}: {}",
                status,
                text.chars().take(200).collect::<String>()
            )));
        }
        Self::parse_response(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_response() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"Sales grew 12% in Q3 <chart>"}}]}"#;
        assert_eq!(
            HttpCaptionModel::parse_response(body).unwrap(),
            "Sales grew 12% in Q3 <chart>"
        );
    }

    #[test]
    fn test_parse_empty_response() {
        assert!(HttpCaptionModel::parse_response(r#"{"choices":[]}"#).is_err());
        assert!(HttpCaptionModel::parse_response("not json").is_err());
    }

    #[test]
    fn test_request_embeds_image() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("slide.jpg");
        fs::write(&image, b"jpegbytes").unwrap();

        let model = HttpCaptionModel::new(HttpCaptionConfig {
            api_key_env: None,
            ..Default::default()
        })
        .unwrap();
        let body = model.build_request(&image, "describe").unwrap();

        let url = body["messages"][0]["content"][1]["image_url"]["url"]
            .as_str()
            .unwrap();
        assert!(url.starts_with("data:image/jpeg;base64,"));
        assert_eq!(body["messages"][0]["content"][0]["text"], "describe");
    }
}
