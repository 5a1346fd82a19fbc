use anyhow::Result;

/// Trait for vision-language models (OpenRouter, Gemini, etc.)
#[async_trait::async_trait]
pub trait VisionModel: Send + Sync {
    /// `image` is a URL, a `data:` URL or a local file path.
    async fn generate(&self, prompt: &str, image: Option<&str>) -> Result<String>;
}

/// Trait for services that answer a system + user message pair with a number
#[async_trait::async_trait]
pub trait DensityEstimator: Send + Sync {
    async fn estimate(&self, system: &str, query: &str) -> Result<String>;
}
