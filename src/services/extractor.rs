use indexmap::IndexMap;
use regex::Regex;
use serde_json::value::RawValue;
use serde_json::Value;
use std::sync::OnceLock;
use thiserror::Error;

use crate::models::{DishDescription, FoodList, VolumeMap};

/// JSON layout a model response is expected to carry inside `<json>` tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// `{"foods": ["apple", "rice"]}`
    SingleKeyArray,
    /// `{"rice": 0.25, "tofu": 0.33}`
    FlatNumericMap,
    /// `{"name": "...", "description": "..."}`
    TwoStringFields,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Extracted {
    FoodList(FoodList),
    NumericMap(VolumeMap),
    Description(Option<DishDescription>),
}

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("no <json> tag found in the model response")]
    NoTagFound,
    #[error("invalid JSON content: {0}")]
    MalformedJson(#[from] serde_json::Error),
    #[error("unexpected JSON shape: {0}")]
    InvalidShape(String),
    #[error("the value for key '{key}' is not a non-negative float")]
    InvalidValueType { key: String },
}

fn json_tag() -> &'static Regex {
    static JSON_TAG: OnceLock<Regex> = OnceLock::new();
    JSON_TAG.get_or_init(|| Regex::new(r"(?s)<json>(.*?)</json>").expect("invalid json tag regex"))
}

/// Parse the first `<json>` block of a model response and validate it.
///
/// `TwoStringFields` never fails: any problem is logged and reported as
/// `Extracted::Description(None)`.
pub fn extract(text: &str, shape: Shape) -> Result<Extracted, ExtractionError> {
    match shape {
        Shape::SingleKeyArray => extract_food_list(text).map(Extracted::FoodList),
        Shape::FlatNumericMap => extract_numeric_map(text).map(Extracted::NumericMap),
        Shape::TwoStringFields => Ok(Extracted::Description(extract_description(text))),
    }
}

fn tagged_content(text: &str) -> Result<&str, ExtractionError> {
    let captures = json_tag().captures(text).ok_or(ExtractionError::NoTagFound)?;
    Ok(captures.get(1).map(|m| m.as_str().trim()).unwrap_or_default())
}

fn tagged_json(text: &str) -> Result<Value, ExtractionError> {
    Ok(serde_json::from_str(tagged_content(text)?)?)
}

fn extract_food_list(text: &str) -> Result<FoodList, ExtractionError> {
    let object = match tagged_json(text)? {
        Value::Object(map) if map.len() == 1 => map,
        _ => {
            return Err(ExtractionError::InvalidShape(
                "the JSON should contain exactly one key mapping to an array".to_string(),
            ))
        }
    };

    let Some((_, Value::Array(items))) = object.into_iter().next() else {
        return Err(ExtractionError::InvalidShape(
            "the value associated with the key should be an array".to_string(),
        ));
    };

    if items.is_empty() {
        return Err(ExtractionError::InvalidShape(
            "the food list is empty".to_string(),
        ));
    }

    let names = items
        .into_iter()
        .map(|item| match item {
            Value::String(name) if !name.trim().is_empty() => Ok(name),
            other => Err(ExtractionError::InvalidShape(format!(
                "food names must be non-empty strings, got {}",
                other
            ))),
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(FoodList::new(names))
}

fn extract_numeric_map(text: &str) -> Result<VolumeMap, ExtractionError> {
    let content = tagged_content(text)?;
    if !serde_json::from_str::<Value>(content)?.is_object() {
        return Err(ExtractionError::InvalidShape(
            "the JSON content must be an object".to_string(),
        ));
    }

    // Raw literals keep the model's key order and tell `100` apart from `100.0`
    let raw: IndexMap<String, Box<RawValue>> = serde_json::from_str(content)?;

    let mut map = VolumeMap::with_capacity(raw.len());
    for (key, value) in raw {
        match float_literal(value.get()) {
            Some(number) => {
                map.insert(key, number);
            }
            None => return Err(ExtractionError::InvalidValueType { key }),
        }
    }

    Ok(map)
}

/// A finite, non-negative JSON number written with a fraction or exponent.
fn float_literal(literal: &str) -> Option<f64> {
    let literal = literal.trim();
    if !literal.contains(['.', 'e', 'E']) {
        return None;
    }
    let number: f64 = literal.parse().ok()?;
    (number.is_finite() && !number.is_sign_negative()).then_some(number)
}

fn extract_description(text: &str) -> Option<DishDescription> {
    let value = match tagged_json(text) {
        Ok(value) => value,
        Err(e) => {
            log::warn!("⚠️ Could not extract dish description: {}", e);
            return None;
        }
    };

    match serde_json::from_value::<DishDescription>(value) {
        Ok(description) => Some(description),
        Err(e) => {
            log::warn!("⚠️ Dish description has an unexpected shape: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_food_list_is_joined() {
        let response = "The plate has an apple and rice.\n<json>{\"foods\": [\"apple\",\"rice\"]}</json>";
        let foods = extract_food_list(response).unwrap();
        assert_eq!(foods.joined(), "apple, rice");
    }

    #[test]
    fn test_tag_spanning_newlines() {
        let response = "Thinking...\n<json>\n{\n  \"foods\": [\"fried tofu\"]\n}\n</json>\nDone.";
        match extract(response, Shape::SingleKeyArray).unwrap() {
            Extracted::FoodList(foods) => assert_eq!(foods.joined(), "fried tofu"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_first_tag_wins() {
        let response = "<json>{\"foods\": [\"a\"]}</json> later <json>{\"foods\": [\"b\"]}</json>";
        assert_eq!(extract_food_list(response).unwrap().joined(), "a");
    }

    #[test]
    fn test_food_list_requires_single_key() {
        let response = "<json>{\"foods\": [\"apple\"], \"drinks\": [\"tea\"]}</json>";
        assert!(matches!(
            extract_food_list(response),
            Err(ExtractionError::InvalidShape(_))
        ));
    }

    #[test]
    fn test_food_list_requires_array() {
        let response = "<json>{\"foods\": \"apple\"}</json>";
        assert!(matches!(
            extract_food_list(response),
            Err(ExtractionError::InvalidShape(_))
        ));
    }

    #[test]
    fn test_food_list_rejects_empty_and_blank_names() {
        for response in [
            "<json>{\"foods\": []}</json>",
            "<json>{\"foods\": [\"\", \"  \"]}</json>",
            "<json>{\"foods\": [\"apple\", \" \"]}</json>",
        ] {
            assert!(
                matches!(extract_food_list(response), Err(ExtractionError::InvalidShape(_))),
                "accepted {}",
                response
            );
        }
    }

    #[test]
    fn test_no_tag_even_with_valid_json() {
        let response = "{\"foods\": [\"apple\"]}";
        assert!(matches!(
            extract(response, Shape::SingleKeyArray),
            Err(ExtractionError::NoTagFound)
        ));
        assert!(matches!(
            extract(response, Shape::FlatNumericMap),
            Err(ExtractionError::NoTagFound)
        ));
    }

    #[test]
    fn test_malformed_json() {
        // Single quotes are not JSON
        let response = "<json>{foods: ['apple']}</json>";
        let err = extract_food_list(response).unwrap_err();
        assert!(matches!(err, ExtractionError::MalformedJson(_)));
        assert!(err.to_string().starts_with("invalid JSON content"));
    }

    #[test]
    fn test_numeric_map_of_floats() {
        let response = "<json>{\"rice\": 0.25, \"fried tofu\": 0.33, \"fried garlic\": 0.03}</json>";
        let map = extract_numeric_map(response).unwrap();
        assert_eq!(map.len(), 3);
        assert_eq!(map["rice"], 0.25);
        assert_eq!(map["fried tofu"], 0.33);
        assert_eq!(map["fried garlic"], 0.03);
    }

    #[test]
    fn test_numeric_map_rejects_integer() {
        let response = "<json>{\"rice\": 100, \"tofu\": 120.5}</json>";
        match extract_numeric_map(response) {
            Err(ExtractionError::InvalidValueType { key }) => assert_eq!(key, "rice"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_numeric_map_rejects_integer_like_and_negative_values() {
        for (body, bad_key) in [
            ("{\"rice\": -0}", "rice"),
            ("{\"rice\": 0.2, \"tofu\": 100000000000000000000}", "tofu"),
            ("{\"rice\": -0.5}", "rice"),
            ("{\"rice\": -0.0}", "rice"),
        ] {
            let response = format!("<json>{}</json>", body);
            match extract_numeric_map(&response) {
                Err(ExtractionError::InvalidValueType { key }) => assert_eq!(key, bad_key),
                other => panic!("{} gave {:?}", body, other),
            }
        }
    }

    #[test]
    fn test_numeric_map_accepts_exponent_and_zero() {
        let response = "<json>{\"rice\": 2.5e-1, \"salt\": 0.0}</json>";
        let map = extract_numeric_map(response).unwrap();
        assert_eq!(map["rice"], 0.25);
        assert_eq!(map["salt"], 0.0);
    }

    #[test]
    fn test_numeric_map_keeps_model_order() {
        let response = "<json>{\"rice\": 0.25, \"apple\": 0.2, \"miso soup\": 0.3}</json>";
        let map = extract_numeric_map(response).unwrap();
        let keys: Vec<&str> = map.keys().map(String::as_str).collect();
        assert_eq!(keys, ["rice", "apple", "miso soup"]);
    }

    #[test]
    fn test_numeric_map_rejects_string() {
        let response = "<json>{\"rice\": \"0.25\"}</json>";
        assert!(matches!(
            extract_numeric_map(response),
            Err(ExtractionError::InvalidValueType { .. })
        ));
    }

    #[test]
    fn test_numeric_map_requires_object() {
        let response = "<json>[0.25, 0.33]</json>";
        assert!(matches!(
            extract_numeric_map(response),
            Err(ExtractionError::InvalidShape(_))
        ));
    }

    #[test]
    fn test_description() {
        let response = "Looks like pad thai.\n<json>\n{\"name\": \"Pad Thai\", \"description\": \"About 40% wasted\"}\n</json>";
        let description = extract_description(response).unwrap();
        assert_eq!(description.name, "Pad Thai");
        assert_eq!(description.description, "About 40% wasted");
    }

    #[test]
    fn test_description_failures_are_absent() {
        assert_eq!(extract_description("no tags here"), None);
        assert_eq!(extract_description("<json>{not json}</json>"), None);
        assert_eq!(extract_description("<json>{\"name\": \"x\"}</json>"), None);
        assert_eq!(
            extract_description("<json>{\"name\": 1, \"description\": \"x\"}</json>"),
            None
        );
        assert!(matches!(
            extract("nothing", Shape::TwoStringFields),
            Ok(Extracted::Description(None))
        ));
    }
}
