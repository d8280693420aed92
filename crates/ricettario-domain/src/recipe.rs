//! Recipe module - the structured record produced by extraction

use crate::{CaptionId, CaptionUnit};
use serde::{Deserialize, Serialize};

/// Kind of dish
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DishType {
    /// Pasta dishes
    Pasta,
    /// Risotto
    Risotto,
    /// Fish
    Fish,
    /// Generic meat
    Meat,
    /// Chicken
    Chicken,
    /// Beef
    Beef,
    /// Pork
    Pork,
    /// Seafood
    Seafood,
    /// Vegetarian
    Vegetarian,
    /// Vegan
    Vegan,
    /// Soup
    Soup,
    /// Salad
    Salad,
    /// Bread and baked doughs
    Bread,
    /// Pizza
    Pizza,
    /// Sandwich
    Sandwich,
    /// Stir fry
    StirFry,
    /// Curry
    Curry,
    /// Dessert
    Dessert,
    /// Smoothie
    Smoothie,
    /// Anything else
    Other,
}

impl DishType {
    /// Parse a dish type, mapping unknown values to [`DishType::Other`]
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_lowercase().replace([' ', '-'], "_").as_str() {
            "pasta" => DishType::Pasta,
            "risotto" => DishType::Risotto,
            "fish" => DishType::Fish,
            "meat" => DishType::Meat,
            "chicken" => DishType::Chicken,
            "beef" => DishType::Beef,
            "pork" => DishType::Pork,
            "seafood" => DishType::Seafood,
            "vegetarian" => DishType::Vegetarian,
            "vegan" => DishType::Vegan,
            "soup" => DishType::Soup,
            "salad" => DishType::Salad,
            "bread" => DishType::Bread,
            "pizza" => DishType::Pizza,
            "sandwich" => DishType::Sandwich,
            "stir_fry" => DishType::StirFry,
            "curry" => DishType::Curry,
            "dessert" => DishType::Dessert,
            "smoothie" => DishType::Smoothie,
            _ => DishType::Other,
        }
    }
}

/// Meal a recipe is intended for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MealType {
    /// Breakfast
    Breakfast,
    /// Lunch
    Lunch,
    /// Dinner
    Dinner,
    /// Snack
    Snack,
    /// Dessert
    Dessert,
    /// Appetizer
    Appetizer,
}

impl MealType {
    /// Parse a meal type; unknown values yield `None`
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "breakfast" => Some(MealType::Breakfast),
            "lunch" => Some(MealType::Lunch),
            "dinner" => Some(MealType::Dinner),
            "snack" => Some(MealType::Snack),
            "dessert" => Some(MealType::Dessert),
            "appetizer" => Some(MealType::Appetizer),
            _ => None,
        }
    }
}

/// Cuisine family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CuisineType {
    /// Italian
    Italian,
    /// Pan-asian
    Asian,
    /// Chinese
    Chinese,
    /// Japanese
    Japanese,
    /// Thai
    Thai,
    /// Indian
    Indian,
    /// Mexican
    Mexican,
    /// Mediterranean
    Mediterranean,
    /// French
    French,
    /// American
    American,
    /// Middle eastern
    MiddleEastern,
    /// Latin american
    Latin,
    /// African
    African,
    /// Anything else
    Other,
}

impl CuisineType {
    /// Parse a cuisine, mapping unknown values to [`CuisineType::Other`]
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_lowercase().replace([' ', '-'], "_").as_str() {
            "italian" => CuisineType::Italian,
            "asian" => CuisineType::Asian,
            "chinese" => CuisineType::Chinese,
            "japanese" => CuisineType::Japanese,
            "thai" => CuisineType::Thai,
            "indian" => CuisineType::Indian,
            "mexican" => CuisineType::Mexican,
            "mediterranean" => CuisineType::Mediterranean,
            "french" => CuisineType::French,
            "american" => CuisineType::American,
            "middle_eastern" => CuisineType::MiddleEastern,
            "latin" => CuisineType::Latin,
            "african" => CuisineType::African,
            _ => CuisineType::Other,
        }
    }
}

/// Preparation difficulty
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    /// Easy
    Easy,
    /// Medium
    Medium,
    /// Hard
    Hard,
}

impl Difficulty {
    /// Parse a difficulty; unknown values yield `None`
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "easy" => Some(Difficulty::Easy),
            "medium" => Some(Difficulty::Medium),
            "hard" => Some(Difficulty::Hard),
            _ => None,
        }
    }
}

/// Structured recipe extracted from an accepted caption
///
/// Only `title` is required. Lists default to empty, optional scalars to
/// `None`, and `confidence_score` to `0.0`. A record is immutable once the
/// pipeline hands it out; it is the terminal artifact for its caption.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExtractionRecord {
    /// Recipe title
    pub title: String,
    /// Ingredient lines
    #[serde(default)]
    pub ingredients: Vec<String>,
    /// Preparation steps
    #[serde(default)]
    pub instructions: Vec<String>,

    /// Main protein ("chicken", "none", ...)
    #[serde(default)]
    pub main_protein: Option<String>,
    /// Dish classification
    #[serde(default)]
    pub dish_type: Option<DishType>,
    /// Meal classification
    #[serde(default)]
    pub meal_type: Option<MealType>,
    /// Cuisine classification
    #[serde(default)]
    pub cuisine_type: Option<CuisineType>,
    /// Difficulty classification
    #[serde(default)]
    pub difficulty: Option<Difficulty>,

    /// Cooking time as free text ("20 minutes")
    #[serde(default)]
    pub cooking_time: Option<String>,
    /// Preparation time as free text
    #[serde(default)]
    pub prep_time: Option<String>,
    /// Total time as free text
    #[serde(default)]
    pub total_time: Option<String>,
    /// Servings as free text ("2-4")
    #[serde(default)]
    pub servings: Option<String>,

    /// Proteins used, English vocabulary
    #[serde(default)]
    pub proteins: Vec<String>,
    /// Vegetables used, English vocabulary
    #[serde(default)]
    pub vegetables: Vec<String>,
    /// Other notable ingredients, English vocabulary
    #[serde(default)]
    pub key_ingredients: Vec<String>,

    /// Cooking methods ("baking", "frying")
    #[serde(default)]
    pub cooking_method: Vec<String>,
    /// Equipment needed
    #[serde(default)]
    pub equipment: Vec<String>,

    /// Dietary tags ("vegetarian", "gluten_free")
    #[serde(default)]
    pub dietary_tags: Vec<String>,
    /// Texture tags
    #[serde(default)]
    pub texture_tags: Vec<String>,
    /// Flavor tags
    #[serde(default)]
    pub flavor_tags: Vec<String>,
    /// Season tags
    #[serde(default)]
    pub season_tags: Vec<String>,
    /// Occasion tags
    #[serde(default)]
    pub occasion_tags: Vec<String>,

    /// Extraction confidence in `[0.0, 1.0]`
    #[serde(default)]
    pub confidence_score: f64,
}

impl ExtractionRecord {
    /// Create a record with only a title set
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    /// Validate ranges and required fields
    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("title is empty".to_string());
        }
        if !(0.0..=1.0).contains(&self.confidence_score) {
            return Err(format!(
                "confidence_score {} out of range [0.0, 1.0]",
                self.confidence_score
            ));
        }
        Ok(())
    }

    /// Raise the confidence score to at least `confidence`
    pub fn with_min_confidence(mut self, confidence: f64) -> Self {
        self.confidence_score = self.confidence_score.max(confidence);
        self
    }
}

/// Flat output object for one accepted recipe
///
/// This is the shape consumed by the recipe browser: caption metadata followed
/// by every [`ExtractionRecord`] field at the top level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeOutput {
    /// Caption the recipe came from
    pub caption_id: CaptionId,
    /// Original caption text
    pub caption: String,
    /// Media reference of the post
    pub media_ref: Option<String>,
    /// Always true for emitted recipes
    pub is_recipe: bool,
    /// Extracted fields
    #[serde(flatten)]
    pub record: ExtractionRecord,
}

impl RecipeOutput {
    /// Combine a caption with its extracted record
    pub fn new(caption: &CaptionUnit, record: ExtractionRecord) -> Self {
        Self {
            caption_id: caption.id.clone(),
            caption: caption.raw_text.clone(),
            media_ref: caption.media_ref.clone(),
            is_recipe: true,
            record,
        }
    }
}
