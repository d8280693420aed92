//! The two-stage classification/extraction pipeline
//!
//! A [`Stage`] knows how to turn a caption into a prompt and a response back
//! into a typed result. The concurrent executor and the batch job manager
//! both drive stages; neither knows which stage it is running.

use crate::parser::{parse_classification, parse_extraction};
use crate::prompt::PromptTemplates;
use ricettario_domain::{
    CaptionUnit, ClassificationResult, ExtractionError, ExtractionRecord,
};
use ricettario_llm::{CompletionService, LlmError, Prompt};
use std::sync::Arc;

/// One logical pass over captions
pub trait Stage: Send + Sync {
    /// Typed result of the stage
    type Output: Send;

    /// Label used in logs and progress events
    fn name(&self) -> &'static str;

    /// Build the prompt for one caption
    fn prompt(&self, caption: &CaptionUnit) -> Prompt;

    /// Parse a raw model response for one caption
    fn parse(&self, caption: &CaptionUnit, response: &str) -> Result<Self::Output, ExtractionError>;
}

/// Is-this-a-recipe stage
#[derive(Debug, Clone)]
pub struct ClassificationStage {
    templates: Arc<PromptTemplates>,
}

impl ClassificationStage {
    /// Create the stage over shared templates
    pub fn new(templates: Arc<PromptTemplates>) -> Self {
        Self { templates }
    }
}

impl Stage for ClassificationStage {
    type Output = ClassificationResult;

    fn name(&self) -> &'static str {
        "classification"
    }

    fn prompt(&self, caption: &CaptionUnit) -> Prompt {
        self.templates.classification_prompt(&caption.raw_text)
    }

    fn parse(&self, caption: &CaptionUnit, response: &str) -> Result<ClassificationResult, ExtractionError> {
        parse_classification(&caption.id, response)
    }
}

/// Structured extraction stage
#[derive(Debug, Clone)]
pub struct ExtractionStage {
    templates: Arc<PromptTemplates>,
}

impl ExtractionStage {
    /// Create the stage over shared templates
    pub fn new(templates: Arc<PromptTemplates>) -> Self {
        Self { templates }
    }
}

impl Stage for ExtractionStage {
    type Output = ExtractionRecord;

    fn name(&self) -> &'static str {
        "extraction"
    }

    fn prompt(&self, caption: &CaptionUnit) -> Prompt {
        self.templates.extraction_prompt(&caption.raw_text)
    }

    fn parse(&self, _caption: &CaptionUnit, response: &str) -> Result<ExtractionRecord, ExtractionError> {
        parse_extraction(response)
    }
}

/// Failure of a single stage call
#[derive(Debug, Clone, PartialEq)]
pub enum CallError {
    /// Retrying may help
    Transient(LlmError),
    /// Final for this caption
    Permanent(ExtractionError),
}

impl CallError {
    /// Sort a provider error into transient or permanent
    pub fn from_llm(error: LlmError) -> Self {
        if error.is_transient() {
            CallError::Transient(error)
        } else {
            CallError::Permanent(ExtractionError::rejected(error.to_string()))
        }
    }
}

/// Run one stage call: prompt, complete, parse
pub async fn call_stage<S: Stage>(
    llm: &dyn CompletionService,
    stage: &S,
    caption: &CaptionUnit,
) -> Result<S::Output, CallError> {
    let prompt = stage.prompt(caption);
    let response = llm.complete(&prompt).await.map_err(CallError::from_llm)?;
    stage.parse(caption, &response).map_err(CallError::Permanent)
}

/// Single-call access to both stages
///
/// `classify` and `extract` make exactly one completion call each, with no
/// retry. Bulk runs go through the executor or the batch manager instead.
pub struct Pipeline {
    llm: Arc<dyn CompletionService>,
    classification: ClassificationStage,
    extraction: ExtractionStage,
}

impl Pipeline {
    /// Create a pipeline over a completion service and templates
    pub fn new(llm: Arc<dyn CompletionService>, templates: Arc<PromptTemplates>) -> Self {
        Self {
            llm,
            classification: ClassificationStage::new(Arc::clone(&templates)),
            extraction: ExtractionStage::new(templates),
        }
    }

    /// The classification stage
    pub fn classification(&self) -> &ClassificationStage {
        &self.classification
    }

    /// The extraction stage
    pub fn extraction(&self) -> &ExtractionStage {
        &self.extraction
    }

    /// Decide whether a caption is a recipe
    pub async fn classify(&self, caption: &CaptionUnit) -> Result<ClassificationResult, CallError> {
        if caption.is_blank() {
            return Ok(ClassificationResult::rejected(caption.id.clone(), "empty caption"));
        }
        call_stage(self.llm.as_ref(), &self.classification, caption).await
    }

    /// Extract the structured recipe from a caption
    pub async fn extract(&self, caption: &CaptionUnit) -> Result<ExtractionRecord, CallError> {
        call_stage(self.llm.as_ref(), &self.extraction, caption).await
    }
}
