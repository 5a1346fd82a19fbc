use std::sync::Arc;
use thiserror::Error;

use crate::models::DensityResult;
use crate::services::ai_service::DensityEstimator;
use crate::services::reference::DensityReference;

const DENSITY_SYSTEM_PROMPT: &str = "You are a precise scientific assistant specializing in food science and density measurements. \
Your responses must follow these rules:\n\
1. Provide only a single numerical value in g/ml (grams per milliliter)\n\
2. Round all values to 3 decimal places\n\
3. If a food has multiple forms (e.g., raw vs cooked), assume its most common consumed form\n\
4. If uncertain, provide your best estimate based on similar foods\n\
5. Do not include units, explanations, or any other text\n\
6. If the query is invalid or non-food, respond with '0.000'";

#[derive(Debug, Error)]
enum DensityError {
    #[error("density estimator call failed: {0:#}")]
    Estimator(anyhow::Error),
    #[error("invalid density value '{0}'")]
    Unparsable(String),
}

/// Resolves food densities: reference table first, estimator on a miss.
pub struct DensityResolver {
    reference: Arc<DensityReference>,
    estimator: Arc<dyn DensityEstimator>,
}

impl DensityResolver {
    pub fn new(reference: Arc<DensityReference>, estimator: Arc<dyn DensityEstimator>) -> Self {
        Self { reference, estimator }
    }

    /// Never fails; an unresolved density comes back as `None`.
    pub async fn resolve(&self, food_name: &str) -> DensityResult {
        let normalized = food_name.trim().to_lowercase();
        let table = self.reference.load().await;

        if let Some(density) = table.as_ref().and_then(|t| t.get(&normalized)) {
            log::info!("📚 Found reference density for {}: {}", food_name, density);
            return DensityResult::reference(round3(density));
        }

        let mut system = DENSITY_SYSTEM_PROMPT.to_string();
        if let Some(table) = table.as_ref().filter(|t| !t.is_empty()) {
            system.push_str("\n\nRefer to the following reference densities for guidance:\n\n");
            system.push_str(table.rendered());
        }

        match self.estimate(&system, food_name).await {
            Ok(density) => {
                log::info!("✅ Got density from API for {}: {}", food_name, density);
                DensityResult::api(Some(density))
            }
            Err(e) => {
                log::error!("❌ Density resolution failed for {}: {}", food_name, e);
                DensityResult::api(None)
            }
        }
    }

    async fn estimate(&self, system: &str, food_name: &str) -> Result<f64, DensityError> {
        let query = format!("What is the density of {}?", food_name);
        let reply = self
            .estimator
            .estimate(system, &query)
            .await
            .map_err(DensityError::Estimator)?;

        parse_density_reply(&reply)
            .map(round3)
            .ok_or_else(|| DensityError::Unparsable(reply.trim().to_string()))
    }
}

fn parse_density_reply(reply: &str) -> Option<f64> {
    reply.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}
