//! Parse LLM output into classifications and extraction records
//!
//! Every failure here becomes an `ExtractionError` of kind
//! `MalformedResponse` for the one caption involved.

use ricettario_domain::{
    CaptionId, ClassificationResult, CuisineType, Difficulty, DishType, ExtractionError,
    ExtractionRecord, MealType,
};
use serde_json::{Map, Value};

type Object = Map<String, Value>;

/// Parse a classification response
pub fn parse_classification(
    caption_id: &CaptionId,
    response: &str,
) -> Result<ClassificationResult, ExtractionError> {
    let obj = parse_object(response)?;

    let is_recipe = obj
        .get("is_recipe")
        .and_then(Value::as_bool)
        .ok_or_else(|| ExtractionError::malformed("Missing or invalid 'is_recipe'"))?;

    let confidence = obj
        .get("confidence")
        .and_then(Value::as_f64)
        .ok_or_else(|| ExtractionError::malformed("Missing or invalid 'confidence'"))?;
    check_unit_range("confidence", confidence)?;

    let reasoning = obj
        .get("reasoning")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    Ok(ClassificationResult {
        caption_id: caption_id.clone(),
        is_recipe,
        confidence,
        reasoning,
    })
}

/// Parse an extraction response
///
/// Lists accept either a JSON array or a single string. Scalars accept
/// strings or numbers. Enumerated fields parse leniently.
pub fn parse_extraction(response: &str) -> Result<ExtractionRecord, ExtractionError> {
    let obj = parse_object(response)?;

    let title = obj
        .get("title")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ExtractionError::malformed("Missing or empty 'title'"))?
        .to_string();

    let confidence_score = match obj.get("confidence_score") {
        None | Some(Value::Null) => 0.0,
        Some(v) => v
            .as_f64()
            .ok_or_else(|| ExtractionError::malformed("Invalid 'confidence_score'"))?,
    };
    check_unit_range("confidence_score", confidence_score)?;

    Ok(ExtractionRecord {
        title,
        ingredients: string_list(&obj, "ingredients"),
        instructions: string_list(&obj, "instructions"),
        main_protein: opt_string(&obj, "main_protein"),
        dish_type: opt_string(&obj, "dish_type").map(|s| DishType::parse_lenient(&s)),
        meal_type: opt_string(&obj, "meal_type").and_then(|s| MealType::parse(&s)),
        cuisine_type: opt_string(&obj, "cuisine_type").map(|s| CuisineType::parse_lenient(&s)),
        difficulty: opt_string(&obj, "difficulty").and_then(|s| Difficulty::parse(&s)),
        cooking_time: opt_string(&obj, "cooking_time"),
        prep_time: opt_string(&obj, "prep_time"),
        total_time: opt_string(&obj, "total_time"),
        servings: opt_string(&obj, "servings"),
        proteins: string_list(&obj, "proteins"),
        vegetables: string_list(&obj, "vegetables"),
        key_ingredients: string_list(&obj, "key_ingredients"),
        cooking_method: string_list(&obj, "cooking_method"),
        equipment: string_list(&obj, "equipment"),
        dietary_tags: string_list(&obj, "dietary_tags"),
        texture_tags: string_list(&obj, "texture_tags"),
        flavor_tags: string_list(&obj, "flavor_tags"),
        season_tags: string_list(&obj, "season_tags"),
        occasion_tags: string_list(&obj, "occasion_tags"),
        confidence_score,
    })
}

fn parse_object(response: &str) -> Result<Object, ExtractionError> {
    let json_str = extract_json(response)?;
    let value: Value = serde_json::from_str(&json_str)
        .map_err(|e| ExtractionError::malformed(format!("JSON parse error: {}", e)))?;
    match value {
        Value::Object(obj) => Ok(obj),
        _ => Err(ExtractionError::malformed("Expected JSON object")),
    }
}

/// Extract JSON from response, handling markdown code blocks
fn extract_json(response: &str) -> Result<String, ExtractionError> {
    let trimmed = response.trim();
    if trimmed.is_empty() {
        return Err(ExtractionError::malformed("Empty response"));
    }

    if trimmed.starts_with("```") {
        let lines: Vec<&str> = trimmed.lines().collect();
        if lines.len() < 2 {
            return Err(ExtractionError::malformed("Empty code block"));
        }

        // Skip the opening fence and, if present, the closing one
        let end = if lines[lines.len() - 1].trim() == "```" {
            lines.len() - 1
        } else {
            lines.len()
        };
        return Ok(lines[1..end].join("\n"));
    }

    Ok(trimmed.to_string())
}

fn check_unit_range(field: &str, value: f64) -> Result<(), ExtractionError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ExtractionError::malformed(format!(
            "'{}' {} out of range [0.0, 1.0]",
            field, value
        )))
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn opt_string(obj: &Object, key: &str) -> Option<String> {
    obj.get(key).and_then(scalar_to_string)
}

fn string_list(obj: &Object, key: &str) -> Vec<String> {
    match obj.get(key) {
        Some(Value::Array(items)) => items.iter().filter_map(scalar_to_string).collect(),
        Some(other) => scalar_to_string(other).into_iter().collect(),
        None => Vec::new(),
    }
}
