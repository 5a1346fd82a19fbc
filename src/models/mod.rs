use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Food name → volume in liters, in the order the vision model listed them.
pub type VolumeMap = IndexMap<String, f64>;

/// Food name → weight in grams.
pub type WeightMap = IndexMap<String, f64>;

/// Foods identified in an image, in the order the model listed them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoodList {
    names: Vec<String>,
}

impl FoodList {
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Comma separated form that gets threaded into the volume prompt.
    pub fn joined(&self) -> String {
        self.names.join(", ")
    }
}

impl std::fmt::Display for FoodList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.joined())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DensitySource {
    Reference, // Static reference table
    Api,       // Live estimation call
}

/// Density in g/ml plus where it came from. `density` is `None` when
/// resolution failed; `source` still names the path that was tried last.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DensityResult {
    pub density: Option<f64>,
    pub source: DensitySource,
}

impl DensityResult {
    pub fn reference(density: f64) -> Self {
        Self {
            density: Some(density),
            source: DensitySource::Reference,
        }
    }

    pub fn api(density: Option<f64>) -> Self {
        Self {
            density,
            source: DensitySource::Api,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DishDescription {
    pub name: String,
    pub description: String,
}

// HTTP payloads

#[derive(Debug, Clone, Deserialize)]
pub struct ImageRequest {
    pub image: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessedFood {
    pub food_name: String,
    pub density: f64, // 0.0 when unresolved
    pub source: DensitySource,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_food_list_joined() {
        let foods = FoodList::new(vec!["apple".to_string(), "rice".to_string()]);
        assert_eq!(foods.joined(), "apple, rice");
        assert_eq!(foods.to_string(), "apple, rice");
    }

    #[test]
    fn test_density_source_serialization() {
        let food = ProcessedFood {
            food_name: "Apple".to_string(),
            density: 0.853,
            source: DensitySource::Reference,
        };
        let json = serde_json::to_value(&food).unwrap();
        assert_eq!(json["source"], "reference");
        assert_eq!(json["food_name"], "Apple");
    }

    #[test]
    fn test_dish_description_rejects_extra_keys() {
        let json = r#"{"name": "Pad Thai", "description": "Half eaten", "extra": "x"}"#;
        assert!(serde_json::from_str::<DishDescription>(json).is_err());
    }
}
