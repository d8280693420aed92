//! Prompt templates for classification and extraction
//!
//! Templates are plain text. Built-in defaults can be overridden by
//! `is_recipe.md` and `extract_details.md` in a prompts directory; a missing
//! file keeps the default for that stage.

use ricettario_llm::Prompt;
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::{debug, info};

/// File name of the classification template override
pub const IS_RECIPE_FILE: &str = "is_recipe.md";

/// File name of the extraction template override
pub const EXTRACT_DETAILS_FILE: &str = "extract_details.md";

/// The pair of templates driving the two pipeline stages
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplates {
    /// System prompt of the classification stage
    pub is_recipe: String,
    /// System prompt of the extraction stage
    pub extract_details: String,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self {
            is_recipe: DEFAULT_IS_RECIPE.to_string(),
            extract_details: DEFAULT_EXTRACT_DETAILS.to_string(),
        }
    }
}

impl PromptTemplates {
    /// Load templates from `dir`, falling back to the defaults per file
    pub fn load(dir: &Path) -> Result<Self, std::io::Error> {
        let mut templates = Self::default();

        let is_recipe = dir.join(IS_RECIPE_FILE);
        if is_recipe.exists() {
            templates.is_recipe = std::fs::read_to_string(&is_recipe)?;
            info!("Loaded classification prompt from {}", is_recipe.display());
        }

        let extract = dir.join(EXTRACT_DETAILS_FILE);
        if extract.exists() {
            templates.extract_details = std::fs::read_to_string(&extract)?;
            info!("Loaded extraction prompt from {}", extract.display());
        }

        Ok(templates)
    }

    /// Short stable hash of both templates
    ///
    /// Recorded with every run so history comparisons can tell whether the
    /// prompts changed between two runs.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.is_recipe.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.extract_details.as_bytes());
        let digest = format!("{:x}", hasher.finalize());
        digest[..12].to_string()
    }

    /// Prompt asking whether a caption is a recipe
    pub fn classification_prompt(&self, caption: &str) -> Prompt {
        debug!("Building classification prompt for {} chars", caption.len());
        Prompt::new(self.is_recipe.clone(), caption_message(caption))
    }

    /// Prompt asking for the structured recipe
    pub fn extraction_prompt(&self, caption: &str) -> Prompt {
        debug!("Building extraction prompt for {} chars", caption.len());
        Prompt::new(self.extract_details.clone(), caption_message(caption))
    }
}

fn caption_message(caption: &str) -> String {
    format!("Caption:\n---\n{}\n---\n\nRespond with a single JSON object.", caption.trim())
}

const DEFAULT_IS_RECIPE: &str = r#"You decide whether a social media caption contains a cooking recipe.

A caption is a recipe when it describes how to prepare a dish: a list of
ingredients, preparation steps, or both. Captions may be in Italian, English
or a mix of the two. Greetings, restaurant reviews, product promotions and
food photos without instructions are not recipes.

Answer with a JSON object and nothing else:

{
  "is_recipe": true | false,
  "confidence": number between 0.0 and 1.0,
  "reasoning": "one short sentence"
}"#;

const DEFAULT_EXTRACT_DETAILS: &str = r#"You extract a structured recipe from a social media caption.

Return one JSON object with these fields. Only "title" is required; omit or
leave empty anything the caption does not state.

{
  "title": "short English dish name",
  "ingredients": ["ingredient lines as written"],
  "instructions": ["one step per entry"],
  "main_protein": "chicken | beef | pork | fish | seafood | eggs | legumes | none | ...",
  "dish_type": "pasta | risotto | fish | meat | chicken | beef | pork | seafood | vegetarian | vegan | soup | salad | bread | pizza | sandwich | stir_fry | curry | dessert | smoothie | other",
  "meal_type": "breakfast | lunch | dinner | snack | dessert | appetizer",
  "cuisine_type": "italian | asian | chinese | japanese | thai | indian | mexican | mediterranean | french | american | middle_eastern | latin | african | other",
  "difficulty": "easy | medium | hard",
  "cooking_time": "free text, e.g. 20 minutes",
  "prep_time": "free text",
  "total_time": "free text",
  "servings": "free text, e.g. 2-4",
  "proteins": ["english names"],
  "vegetables": ["english names"],
  "key_ingredients": ["english names"],
  "cooking_method": ["baking", "frying", "..."],
  "equipment": ["oven", "pan", "..."],
  "dietary_tags": ["vegetarian", "gluten_free", "..."],
  "texture_tags": [],
  "flavor_tags": [],
  "season_tags": [],
  "occasion_tags": [],
  "confidence_score": number between 0.0 and 1.0
}

Use English for proteins, vegetables and key_ingredients. Common Italian
terms: pomodoro = tomato, zucchine = zucchini, aglio = garlic,
cipolla = onion, basilico = basil, parmigiano = parmesan,
olio d'oliva = olive oil, sale = salt, pepe = pepper."#;
