//! Vision model client implementing the [`Identifier`] collaborator

use anyhow::Result;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use eggscan_core::{Identification, Identifier, parse_reply};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::config::IdentifyConfig;

const PROMPT: &str = "Identify the bird species that laid the eggs in this photo. \
Answer in exactly this format:\n\
Bird Name: [common name] ([scientific name])\n\
Confidence: [0-100%]";

#[derive(thiserror::Error, Debug)]
pub enum IdentifyError {
    #[error("API key not set: export {0}")]
    MissingApiKey(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: StatusCode, message: String },

    #[error("Unexpected response: {0}")]
    InvalidResponse(String),
}

#[derive(Serialize)]
struct Request<'a> {
    model: &'a str,
    messages: Vec<Message>,
    max_tokens: u32,
}

#[derive(Serialize)]
struct Message {
    role: &'static str,
    content: Vec<ContentPart>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Serialize)]
struct ImageUrl {
    url: String,
    detail: &'static str,
}

#[derive(Deserialize)]
struct Response {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ApiError,
}

#[derive(Deserialize)]
struct ApiError {
    message: String,
}

/// OpenAI-compatible chat-completions client that sends the image inline
pub struct OpenAiVision {
    model: String,
    endpoint: String,
    api_key_env: String,
    max_tokens: u32,
    client: Client,
}

impl OpenAiVision {
    pub fn new(config: &IdentifyConfig) -> Result<Self, IdentifyError> {
        let client = Client::builder().timeout(config.timeout()).build()?;

        Ok(Self {
            model: config.model.clone(),
            endpoint: format!("{}/chat/completions", config.api_base_url.trim_end_matches('/')),
            api_key_env: config.api_key_env.clone(),
            max_tokens: config.max_tokens,
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn request<'a>(&'a self, image: &[u8]) -> Request<'a> {
        let data_url = format!("data:image/jpeg;base64,{}", STANDARD.encode(image));

        Request {
            model: &self.model,
            messages: vec![Message {
                role: "user",
                content: vec![
                    ContentPart::Text {
                        text: PROMPT.to_string(),
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: data_url,
                            detail: "high",
                        },
                    },
                ],
            }],
            max_tokens: self.max_tokens,
        }
    }

    async fn complete(&self, image: &[u8]) -> Result<String, IdentifyError> {
        let api_key = std::env::var(&self.api_key_env)
            .map_err(|_| IdentifyError::MissingApiKey(self.api_key_env.clone()))?;

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&self.request(image))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        log::debug!("Vision response ({}): {} bytes", status, body.len());

        reply_content(status, &body)
    }
}

/// Extract the first choice's text from a chat-completions response body
fn reply_content(status: StatusCode, body: &str) -> Result<String, IdentifyError> {
    if !status.is_success() {
        let message = serde_json::from_str::<ErrorResponse>(body)
            .map(|e| e.error.message)
            .unwrap_or_else(|_| body.trim().to_string());
        return Err(IdentifyError::Api { status, message });
    }

    let response: Response =
        serde_json::from_str(body).map_err(|e| IdentifyError::InvalidResponse(e.to_string()))?;

    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| IdentifyError::InvalidResponse("No choices in response".to_string()))
}

#[async_trait]
impl Identifier for OpenAiVision {
    async fn identify(&self, image: &[u8]) -> Result<Identification> {
        let reply = self.complete(image).await?;
        let identification = parse_reply(&reply);
        log::info!(
            "Identified {} ({}) at {}",
            identification.label,
            identification.scientific_name,
            identification.confidence
        );
        Ok(identification)
    }
}
