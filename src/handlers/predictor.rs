use anyhow::{Context, Result};
use std::sync::Arc;

use crate::models::{DishDescription, FoodList, VolumeMap, WeightMap};
use crate::services::extractor::{extract, Extracted, Shape};
use crate::services::VisionModel;

const FOODS_PROMPT: &str = "You are given an image of some food that may be uneaten or partially eaten. \
Your task is to figure out all the different foods in the image and name them in JSON format. \
The JSON should have one key called 'foods' that holds an array of food names (strings). \
Show your thought process, and when you're done, wrap the JSON output in a json html tag. \
For parsing purposes, only include the json html tag in your response when you are returning the JSON.\n\
To figure out the foods, follow these steps:\n\
1. Isolate the foods if multiple foods exist in the image.\n\
2. Use your knowledge base to categorize each food.\n\
Here is an example JSON response that I expect from you:\n\
<json>{\"foods\": [\"apple\", \"orange\", \"chicken\"]}</json>";

const DESCRIPTION_PROMPT: &str = "You are given an image of some food. Your goal is to analyze the food contents and \
create a suitable name for the dish as well as a brief description of the dish. In the description, include details, \
like a percentage, about how much of the dish has been wasted.\n\n\
Rules to follow in your response:\n\
1. Show your thought process\n\
2. After showing your thought process, format your response in JSON. Wrap this JSON in a 'json' html tag so that \
I can parse it easily. Your JSON response should have two keys. One key called 'name' with the name of the dish as \
the value and one key called 'description' with the description of the dish as the value.\n\n\
Format your JSON response like this:\n\
<json>{\"name\": \"Dish name\", \"description\": \"Dish description\"}</json>";

fn volume_prompt(foods: &FoodList) -> String {
    format!(
        "You are given an image of some food that may be uneaten or partially eaten. \
         Your task is to figure out the volume of the foods (in Liters) in the image. \
         The foods in the images are: {}\n\n\
         Rules to follow in your response:\n\
         1. Show your thought process\n\
         2. After showing your thought process, format your response in JSON. Wrap this JSON in a 'json' html tag so that \
         I can parse it easily. Your JSON response should have a key for each food and the value of each key should be \
         the volume of that food (as a float).\n\n\
         Format your response like this:\n\
         <json>{{\"rice\": 0.25, \"fried tofu\": 0.33, \"fried garlic\": 0.03}}</json>",
        foods.joined()
    )
}

fn weight_prompt(volumes_json: &str) -> String {
    format!(
        "You are given this JSON string representing a dish where each key is a food and its value is its volume:\n\n\
         {}\n\n\
         Given the volume of the food, find its density and multiply it, mathematically not programmatically, \
         by its volume (volume is given in the JSON string in Liters) to get the weight of the food.\n\n\
         Rules to follow in your response:\n\
         1. Show your thought process\n\
         2. After showing your thought process, format your response in JSON. Wrap this JSON in a 'json' html tag so that \
         I can parse it easily. Your JSON response should have a key for each food and the value of each key should be \
         the weight (as a float in grams)\n\n\
         Format your JSON response like this:\n\
         <json>{{\"rice\": 100.0, \"fried tofu\": 120.5, \"fried garlic\": 80.0}}</json>",
        volumes_json
    )
}

/// Chains vision model calls for one image: foods → volumes → weights.
pub struct Predictor {
    vision: Arc<dyn VisionModel>,
}

impl Predictor {
    pub fn new(vision: Arc<dyn VisionModel>) -> Self {
        Self { vision }
    }

    /// One model call plus extraction of the expected shape.
    async fn ask(&self, prompt: &str, image: Option<&str>, shape: Shape, what: &str) -> Result<(String, Extracted)> {
        let response = self.vision.generate(prompt, image).await?;
        log::debug!("💬 {} response: {}", what, response);
        let extracted = extract(&response, shape).with_context(|| format!("failed to parse {}", what))?;
        Ok((response, extracted))
    }

    pub async fn get_foods(&self, image: &str) -> Result<FoodList> {
        log::info!("🍽️ Identifying foods in {}", image);
        match self.ask(FOODS_PROMPT, Some(image), Shape::SingleKeyArray, "food list").await? {
            (_, Extracted::FoodList(foods)) => {
                log::info!("✅ Foods identified: {}", foods);
                Ok(foods)
            }
            (_, other) => anyhow::bail!("unexpected food list extraction: {:?}", other),
        }
    }

    pub async fn get_volumes(&self, image: &str, foods: &FoodList) -> Result<(String, VolumeMap)> {
        log::info!("📏 Estimating volumes for: {}", foods);
        let prompt = volume_prompt(foods);
        match self.ask(&prompt, Some(image), Shape::FlatNumericMap, "volume map").await? {
            (response, Extracted::NumericMap(volumes)) => {
                warn_on_key_mismatch("volume", foods.names(), &volumes);
                Ok((response, volumes))
            }
            (_, other) => anyhow::bail!("unexpected volume map extraction: {:?}", other),
        }
    }

    pub async fn get_weights(&self, volumes: &VolumeMap) -> Result<(String, WeightMap)> {
        log::info!("⚖️ Estimating weights for {} foods", volumes.len());
        let prompt = weight_prompt(&serde_json::to_string(volumes)?);
        match self.ask(&prompt, None, Shape::FlatNumericMap, "weight map").await? {
            (response, Extracted::NumericMap(weights)) => {
                let names: Vec<String> = volumes.keys().cloned().collect();
                warn_on_key_mismatch("weight", &names, &weights);
                Ok((response, weights))
            }
            (_, other) => anyhow::bail!("unexpected weight map extraction: {:?}", other),
        }
    }

    pub async fn get_description(&self, image: &str) -> Result<Option<DishDescription>> {
        log::info!("📝 Describing dish in {}", image);
        match self.ask(DESCRIPTION_PROMPT, Some(image), Shape::TwoStringFields, "dish description").await? {
            (_, Extracted::Description(description)) => Ok(description),
            (_, other) => anyhow::bail!("unexpected description extraction: {:?}", other),
        }
    }

    pub async fn predict(&self, image: &str) -> Result<WeightMap> {
        let foods = self.get_foods(image).await?;
        let (_, volumes) = self.get_volumes(image, &foods).await?;
        let (_, weights) = self.get_weights(&volumes).await?;
        log::info!("🎉 Weight prediction complete: {:?}", weights);
        Ok(weights)
    }
}

/// Keys are not required to match across steps; mismatches are only logged.
fn warn_on_key_mismatch(step: &str, expected: &[String], map: &VolumeMap) {
    let missing: Vec<&str> = expected
        .iter()
        .filter(|name| !map.contains_key(name.as_str()))
        .map(String::as_str)
        .collect();
    let extra: Vec<&str> = map
        .keys()
        .filter(|key| !expected.contains(key))
        .map(String::as_str)
        .collect();

    if !missing.is_empty() || !extra.is_empty() {
        log::warn!(
            "⚠️ {} map keys differ from previous step (missing: {:?}, extra: {:?})",
            step,
            missing,
            extra
        );
    }
}
