//! Remote OCR client abstraction.
//!
//! The pipeline treats OCR as an external collaborator with two recognition
//! modes: plain line-oriented text and a structured document parse that
//! returns markdown plus labeled text blocks. [`OcrClient`] is the seam —
//! the production implementation is [`volc::VolcOcrClient`]; tests inject a
//! mock.
//!
//! Per-page remote failures are *returned as data* (`success: false` with an
//! `error` string), never as `Err`. An `Err` from a client means something
//! structural went wrong (the request could not even be constructed).

pub mod signing;
pub mod volc;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Table output format requested from the structured parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableMode {
    Markdown,
    Html,
}

impl TableMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TableMode::Markdown => "markdown",
            TableMode::Html => "html",
        }
    }
}

/// Outcome of a plain (line-oriented) recognition call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlainOcr {
    pub success: bool,
    pub line_texts: Vec<String>,
    pub line_probs: Vec<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PlainOcr {
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

/// A labeled block from the structured document parse.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextBlock {
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub content: String,
}

/// Outcome of a structured document-parse call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StructuredOcr {
    pub success: bool,
    pub markdown: String,
    pub blocks: Vec<TextBlock>,
    /// Whether the provider labeled any block as a table.
    pub has_table: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StructuredOcr {
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

/// Remote OCR service contract consumed by the pipeline phases.
#[async_trait]
pub trait OcrClient: Send + Sync {
    /// Line-oriented text recognition with per-line confidences.
    async fn recognize_plain(&self, image: &[u8]) -> Result<PlainOcr>;

    /// Layout-aware document parse producing markdown and labeled blocks.
    async fn recognize_structured(&self, image: &[u8], table_mode: TableMode) -> Result<StructuredOcr>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_mode_as_str() {
        assert_eq!(TableMode::Markdown.as_str(), "markdown");
        assert_eq!(TableMode::Html.as_str(), "html");
    }

    #[test]
    fn test_failure_constructors() {
        let plain = PlainOcr::failure("timeout");
        assert!(!plain.success);
        assert_eq!(plain.error.as_deref(), Some("timeout"));
        assert!(plain.line_texts.is_empty());

        let structured = StructuredOcr::failure("bad image");
        assert!(!structured.success);
        assert!(!structured.has_table);
    }
}
