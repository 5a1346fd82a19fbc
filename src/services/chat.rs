use anyhow::{Context, Result};
use base64::{engine::general_purpose, Engine};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::ai_service::{DensityEstimator, VisionModel};

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: MessageBody,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageBody {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ContentPart {
    Text {
        #[serde(rename = "type")]
        content_type: String,
        text: String,
    },
    ImageUrl {
        #[serde(rename = "type")]
        content_type: String,
        image_url: ImageData,
    },
}

impl ContentPart {
    fn text(text: impl Into<String>) -> Self {
        ContentPart::Text {
            content_type: "text".to_string(),
            text: text.into(),
        }
    }

    fn image(url: String) -> Self {
        ContentPart::ImageUrl {
            content_type: "image_url".to_string(),
            image_url: ImageData { url },
        }
    }
}

#[derive(Debug, Serialize)]
struct ImageData {
    url: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: MessageContent,
}

#[derive(Debug, Deserialize)]
struct MessageContent {
    content: String,
}

/// Client for OpenAI-compatible `/chat/completions` endpoints.
///
/// The vision model talks to OpenRouter and the density estimator to
/// Perplexity; both speak the same wire format.
pub struct ChatCompletionsClient {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl ChatCompletionsClient {
    pub fn new(base_url: String, api_key: String, model: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
            client,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: Vec<ChatMessage>) -> Result<String> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages,
        };

        log::info!("🤖 Sending request to {} with model: {}", self.base_url, self.model);
        log::debug!("📤 Request payload size: {} bytes", serde_json::to_string(&request)?.len());

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .header("X-Title", "Food Weight Estimator")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        log::debug!("📥 Chat completions response status: {}", status);

        if !status.is_success() {
            let error_text = response.text().await?;
            log::error!("❌ Chat completions API error ({}): {}", status, error_text);
            anyhow::bail!("Chat completions API error ({}): {}", status, error_text);
        }

        let response_text = response.text().await?;
        log::debug!("📄 Raw response size: {} bytes", response_text.len());

        let chat_response: ChatResponse = serde_json::from_str(&response_text)?;
        let content = chat_response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .context("chat completions response has no choices")?;

        log::debug!("💬 Response content: {}", content);
        Ok(content)
    }
}

#[async_trait::async_trait]
impl VisionModel for ChatCompletionsClient {
    async fn generate(&self, prompt: &str, image: Option<&str>) -> Result<String> {
        let mut content = vec![ContentPart::text(prompt)];
        if let Some(image) = image {
            content.push(ContentPart::image(image_url(image)?));
        }

        self.complete(vec![ChatMessage {
            role: "user".to_string(),
            content: MessageBody::Parts(content),
        }])
        .await
    }
}

#[async_trait::async_trait]
impl DensityEstimator for ChatCompletionsClient {
    async fn estimate(&self, system: &str, query: &str) -> Result<String> {
        self.complete(vec![
            ChatMessage {
                role: "system".to_string(),
                content: MessageBody::Text(system.to_string()),
            },
            ChatMessage {
                role: "user".to_string(),
                content: MessageBody::Text(query.to_string()),
            },
        ])
        .await
    }
}

/// Only remote `http(s)` URLs and inline base64 image data URLs are accepted.
/// Anything else, local paths included, is refused without touching the disk.
pub fn check_image_reference(image: &str) -> Result<()> {
    if image.starts_with("http://") || image.starts_with("https://") {
        return Ok(());
    }

    let Some(data_url) = image.strip_prefix("data:") else {
        anyhow::bail!("image must be an http(s) or data: URL");
    };
    let (media_type, payload) = data_url
        .split_once(";base64,")
        .context("data URL must carry base64 image data")?;
    if !media_type.starts_with("image/") {
        anyhow::bail!("data URL must have an image media type, got '{}'", media_type);
    }

    let bytes = general_purpose::STANDARD
        .decode(payload)
        .context("data URL payload is not valid base64")?;
    if bytes.is_empty() {
        anyhow::bail!("data URL payload is empty");
    }
    log::debug!("📊 Inline image size: {} bytes", bytes.len());

    Ok(())
}

fn image_url(image: &str) -> Result<String> {
    check_image_reference(image)?;
    Ok(image.to_string())
}
