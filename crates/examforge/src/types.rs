//! Data model for every artifact the pipeline persists.
//!
//! All types here serialize to the JSON layouts the phases cache on disk:
//! one [`PageRecord`] per page from ingestion, one [`DetectionReport`] from
//! table detection, one [`TableGroupResult`] per table group from structured
//! parsing, and finally one [`Corpus`] document that downstream renderers
//! consume. Page numbers are the only stable keys across runs.

use serde::{Deserialize, Serialize};

/// Cached plain-OCR result for a single page (`page_{:03}.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageRecord {
    pub page_num: u32,
    pub filename: String,
    pub success: bool,
    pub timestamp: String,

    /// Watermark-filtered text lines, in reading order.
    #[serde(default)]
    pub line_texts: Vec<String>,

    /// Unfiltered lines as returned by the provider, kept for auditing.
    #[serde(default)]
    pub line_texts_raw: Vec<String>,

    /// Per-line recognition confidence, parallel to `line_texts_raw`.
    #[serde(default)]
    pub line_probs: Vec<f64>,

    #[serde(default)]
    pub raw_line_count: usize,
    #[serde(default)]
    pub filtered_line_count: usize,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Per-page classifier output of the table detector.
///
/// Derived from a page's lines and the configured thresholds; recomputed on
/// every run rather than persisted as a first-class entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDetection {
    pub has_table: bool,
    /// Additive signal score clamped to `[0, 1]`.
    pub confidence: f64,
    /// One entry per fired signal, with the measured value.
    pub reasons: Vec<String>,
    pub table_keywords_found: Vec<String>,
}

impl TableDetection {
    /// Detection for a page with no recognized text.
    pub fn empty() -> Self {
        Self {
            has_table: false,
            confidence: 0.0,
            reasons: vec!["no text".to_string()],
            table_keywords_found: Vec::new(),
        }
    }
}

/// Phase-2 output (`table_detection.json`): detected pages, details, and the
/// derived multi-page groups.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionReport {
    pub timestamp: String,
    pub total_pages: usize,
    pub table_pages: Vec<u32>,
    pub table_page_count: usize,
    /// Each group is a strictly consecutive ascending run of page numbers.
    pub table_groups: Vec<Vec<u32>>,
    pub table_group_count: usize,
    /// Details keyed by page number, only for pages with `has_table`.
    #[serde(default)]
    pub detection_details: std::collections::BTreeMap<String, TableDetection>,
}

/// Phase-3 output for one table group (`table_group_{:03}.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableGroupResult {
    pub group_id: String,
    pub pages: Vec<u32>,
    pub success: bool,
    pub timestamp: String,

    /// Per-page structured markdown, empty string for failed pages.
    pub markdown_parts: Vec<String>,

    /// Non-empty parts joined with blank-line separators.
    pub merged_markdown: String,

    #[serde(default)]
    pub errors: Vec<String>,
}

/// Reconciled content of one page, as embedded in the final corpus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageContent {
    pub page_num: u32,
    pub is_table_page: bool,
    /// `"ocr_normal"` for verbatim pages, `"hybrid"` after table splicing.
    pub source: String,
    /// Original plain-OCR lines.
    pub text: Vec<String>,
    /// Canonical per-page text after reconciliation.
    pub markdown: String,
}

/// Question-type section within an exam.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SectionType {
    #[serde(rename = "单项选择题")]
    SingleChoice,
    #[serde(rename = "多项选择题")]
    MultiChoice,
    #[serde(rename = "判断题")]
    Judge,
    #[serde(rename = "简答题")]
    ShortAnswer,
    #[serde(rename = "案例")]
    Case,
}

impl SectionType {
    /// Parse a section-type keyword as matched by the section header regex.
    pub fn from_header_keyword(kw: &str) -> Option<Self> {
        match kw {
            "单项选择题" => Some(Self::SingleChoice),
            "多项选择题" => Some(Self::MultiChoice),
            "判断题" => Some(Self::Judge),
            "简答题" => Some(Self::ShortAnswer),
            "案例" => Some(Self::Case),
            _ => None,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::SingleChoice => "单项选择题",
            Self::MultiChoice => "多项选择题",
            Self::Judge => "判断题",
            Self::ShortAnswer => "简答题",
            Self::Case => "案例分析题",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamSection {
    #[serde(rename = "type")]
    pub section_type: SectionType,
    pub start_page: u32,
    pub pages: Vec<u32>,
}

/// A logical exam document discovered by the structure extractor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Exam {
    /// `"{year}-{zero-padded month}"`, e.g. `"2024-05"`.
    pub exam_id: String,
    /// The matched header text.
    pub title: String,
    pub start_page: u32,
    pub sections: Vec<ExamSection>,
    /// Pages in discovery order, deduplicated. May be non-contiguous when a
    /// header match misfires; that is a heuristic limitation, not an
    /// invariant violation.
    pub pages: Vec<u32>,
}

/// Cross-source consistency warning attached to the final corpus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationWarning {
    pub page: u32,
    pub warning: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consistency_score: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusMetadata {
    pub source: String,
    pub total_pages: usize,
    pub table_pages: usize,
    pub detected_table_pages: usize,
    pub exam_count: usize,
    pub created_at: String,
    pub ocr_api: String,
}

/// Final pipeline output (`questions_final.json`), the only artifact
/// downstream renderers consume.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Corpus {
    pub metadata: CorpusMetadata,
    pub exams: Vec<Exam>,
    pub pages: Vec<PageContent>,
    pub validation_warnings: Vec<ValidationWarning>,
}

/// Per-phase summary written under the reports directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseReport {
    pub phase: String,
    pub timestamp: String,
    pub total_items: usize,
    pub success_count: usize,
    pub fail_count: usize,
    #[serde(default)]
    pub notes: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_record_roundtrip() {
        let record = PageRecord {
            page_num: 7,
            filename: "scan_007.png".to_string(),
            success: true,
            timestamp: "2026-01-01T00:00:00".to_string(),
            line_texts: vec!["1. 下列说法正确的是".to_string()],
            line_texts_raw: vec!["1. 下列说法正确的是".to_string()],
            line_probs: vec![0.98],
            raw_line_count: 1,
            filtered_line_count: 1,
            error: None,
        };
        let json = serde_json::to_string(&record).unwrap();
        assert!(!json.contains("\"error\""));
        let back: PageRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.page_num, 7);
        assert_eq!(back.line_texts, record.line_texts);
    }

    #[test]
    fn test_section_type_serde_uses_header_names() {
        let json = serde_json::to_string(&SectionType::SingleChoice).unwrap();
        assert_eq!(json, "\"单项选择题\"");
        let back: SectionType = serde_json::from_str("\"判断题\"").unwrap();
        assert_eq!(back, SectionType::Judge);
    }

    #[test]
    fn test_section_type_from_header_keyword() {
        assert_eq!(
            SectionType::from_header_keyword("多项选择题"),
            Some(SectionType::MultiChoice)
        );
        assert_eq!(SectionType::from_header_keyword("填空题"), None);
    }

    #[test]
    fn test_empty_detection() {
        let d = TableDetection::empty();
        assert!(!d.has_table);
        assert_eq!(d.confidence, 0.0);
    }
}
