use anyhow::{Context, Result};
use std::env;
use std::time::Duration;

const DEFAULT_OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";
const DEFAULT_VISION_MODEL: &str = "google/gemini-2.0-flash-001";
const DEFAULT_PERPLEXITY_BASE_URL: &str = "https://api.perplexity.ai";
const DEFAULT_DENSITY_MODEL: &str = "sonar-pro";
const DEFAULT_REFERENCE_PATH: &str = "data/food_density_reference.csv";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:5001";
const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone)]
pub struct Config {
    pub openrouter_api_key: String,
    pub openrouter_base_url: String,
    pub vision_model: String,
    pub perplexity_api_key: String,
    pub perplexity_base_url: String,
    pub density_model: String,
    pub reference_path: String,
    pub bind_addr: String,
    pub http_timeout: Duration,
}

impl Config {
    /// Reads the process environment (after `.env` has been loaded).
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .with_context(|| format!("{} must be set in .env file", key))
        };
        let or_default = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let http_timeout = match lookup("HTTP_TIMEOUT_SECS") {
            Some(secs) => secs
                .trim()
                .parse::<u64>()
                .with_context(|| format!("HTTP_TIMEOUT_SECS is not a number: {}", secs))?,
            None => DEFAULT_TIMEOUT_SECS,
        };

        Ok(Self {
            openrouter_api_key: required("OPENROUTER_API_KEY")?,
            openrouter_base_url: or_default("OPENROUTER_BASE_URL", DEFAULT_OPENROUTER_BASE_URL),
            vision_model: or_default("VISION_MODEL", DEFAULT_VISION_MODEL),
            perplexity_api_key: required("PERPLEXITY_API_KEY")?,
            perplexity_base_url: or_default("PERPLEXITY_BASE_URL", DEFAULT_PERPLEXITY_BASE_URL),
            density_model: or_default("DENSITY_MODEL", DEFAULT_DENSITY_MODEL),
            reference_path: or_default("DENSITY_REFERENCE_PATH", DEFAULT_REFERENCE_PATH),
            bind_addr: or_default("BIND_ADDR", DEFAULT_BIND_ADDR),
            http_timeout: Duration::from_secs(http_timeout),
        })
    }
}
