//! Classification module - the is-this-a-recipe decision

use crate::CaptionId;
use serde::{Deserialize, Serialize};

/// Default confidence a positive classification must reach to be accepted
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.3;

/// Outcome of the classification stage for one caption
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    /// Caption this result belongs to
    pub caption_id: CaptionId,

    /// Whether the model considers the caption a recipe
    pub is_recipe: bool,

    /// Model confidence in `[0.0, 1.0]`
    pub confidence: f64,

    /// Short free-text justification from the model
    pub reasoning: String,
}

impl ClassificationResult {
    /// Rejection produced locally, without a model call
    pub fn rejected(caption_id: CaptionId, reasoning: impl Into<String>) -> Self {
        Self {
            caption_id,
            is_recipe: false,
            confidence: 1.0,
            reasoning: reasoning.into(),
        }
    }

    /// A caption moves on to extraction only when it is a recipe with enough confidence
    pub fn is_accepted(&self, min_confidence: f64) -> bool {
        self.is_recipe && self.confidence >= min_confidence
    }
}
