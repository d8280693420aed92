//! Caption module - the unit of work fed into the engine

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a caption as assigned by the caption source (e.g. a post pk)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CaptionId(String);

impl CaptionId {
    /// Create a caption id from any string-like value
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw id
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CaptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CaptionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for CaptionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A single social-media caption
///
/// Caption units are immutable once read from the caption source. The engine
/// never rewrites `raw_text`; normalization happens on a copy when computing
/// cache keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptionUnit {
    /// Source-assigned identifier
    pub id: CaptionId,

    /// Caption text exactly as scraped
    #[serde(alias = "caption", alias = "caption_text")]
    pub raw_text: String,

    /// Reference to the post media (thumbnail URL or shortcode)
    #[serde(default, alias = "thumbnail_url", skip_serializing_if = "Option::is_none")]
    pub media_ref: Option<String>,
}

impl CaptionUnit {
    /// Create a caption without a media reference
    pub fn new(id: impl Into<CaptionId>, raw_text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            raw_text: raw_text.into(),
            media_ref: None,
        }
    }

    /// Attach a media reference
    pub fn with_media_ref(mut self, media_ref: impl Into<String>) -> Self {
        self.media_ref = Some(media_ref.into());
        self
    }

    /// Whether the caption has any non-whitespace text
    pub fn is_blank(&self) -> bool {
        self.raw_text.trim().is_empty()
    }
}
