mod config;
mod handlers;
mod models;
mod services;
#[cfg(feature = "http-server")]
mod server; // HTTP API

use anyhow::Result;
use dotenv::dotenv;
use std::sync::Arc;

use config::Config;
use handlers::{DensityHandler, Predictor};
use services::{ChatCompletionsClient, DensityReference, DensityResolver};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables (RUST_LOG may come from .env)
    dotenv().ok();

    // Initialize logger
    env_logger::init();

    log::info!("🚀 Starting Food Weight Estimator...");

    let config = Config::from_env()?;

    let vision = Arc::new(ChatCompletionsClient::new(
        config.openrouter_base_url.clone(),
        config.openrouter_api_key.clone(),
        config.vision_model.clone(),
        config.http_timeout,
    )?);
    log::info!("✅ Vision model initialized: {}", vision.model());

    let estimator = Arc::new(ChatCompletionsClient::new(
        config.perplexity_base_url.clone(),
        config.perplexity_api_key.clone(),
        config.density_model.clone(),
        config.http_timeout,
    )?);
    log::info!("✅ Density estimator initialized: {}", estimator.model());

    // Loaded on first lookup
    let reference = Arc::new(DensityReference::from_path(&config.reference_path));
    log::info!("📚 Density reference: {}", config.reference_path);

    let resolver = Arc::new(DensityResolver::new(reference, estimator));
    let density_handler = Arc::new(DensityHandler::new(resolver));
    let predictor = Arc::new(Predictor::new(vision));

    #[cfg(feature = "http-server")]
    {
        let app = server::create_router(predictor, density_handler);
        let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
        log::info!("🌐 HTTP server listening on {}", config.bind_addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                tokio::signal::ctrl_c().await.ok();
                log::info!("🛑 Shutting down...");
            })
            .await?;
    }

    #[cfg(not(feature = "http-server"))]
    {
        let _ = (predictor, density_handler);
        log::warn!("⚠️ Built without the http-server feature, nothing to serve");
    }

    Ok(())
}
