use serde_json::Value;
use std::sync::Arc;

use crate::models::ProcessedFood;
use crate::services::DensityResolver;

/// Resolves densities for a `{"foods": [{"name": ...}, ...]}` payload.
pub struct DensityHandler {
    resolver: Arc<DensityResolver>,
}

impl DensityHandler {
    pub fn new(resolver: Arc<DensityResolver>) -> Self {
        Self { resolver }
    }

    /// Items without a string `name` are skipped. Unresolved densities are
    /// reported as 0.0.
    pub async fn process_foods(&self, foods: &[Value]) -> Vec<ProcessedFood> {
        let mut processed = Vec::with_capacity(foods.len());

        for food in foods {
            let Some(name) = food.get("name").and_then(Value::as_str) else {
                log::warn!("⚠️ Skipping invalid food item: {}", food);
                continue;
            };

            let result = self.resolver.resolve(name).await;
            processed.push(ProcessedFood {
                food_name: name.to_string(),
                density: result.density.unwrap_or(0.0),
                source: result.source,
            });
        }

        processed
    }
}
