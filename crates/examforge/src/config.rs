//! Pipeline configuration.
//!
//! One [`PipelineConfig`] value is the context object for a whole run: API
//! credentials and endpoint descriptors, the directory layout, rate/retry
//! settings, and every heuristic threshold the detector and reconciler
//! depend on. Nothing in the library reads ambient working-directory state;
//! the config is passed explicitly so tests can probe boundary values.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main pipeline configuration, loadable from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// OCR provider credentials.
    #[serde(default)]
    pub credentials: Credentials,

    /// OCR provider endpoint descriptors.
    #[serde(default)]
    pub api: ApiEndpoint,

    /// Input/output directory layout.
    #[serde(default)]
    pub paths: PipelinePaths,

    /// Maximum outbound requests per second. Every OCR call is followed by
    /// a sleep of `1/max_qps` seconds.
    #[serde(default = "default_max_qps")]
    pub max_qps: f64,

    /// Remote retry attempts for transient errors.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base retry delay in seconds; attempt `n` waits `n * retry_delay`.
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,

    /// Per-attempt request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Lines containing any of these are dropped during ingestion.
    #[serde(default = "default_watermark_keywords")]
    pub watermark_keywords: Vec<String>,

    /// Regex with one capture group extracting the page number from an
    /// image filename.
    #[serde(default = "default_image_pattern")]
    pub image_pattern: String,

    #[serde(default)]
    pub detector: DetectorConfig,

    #[serde(default)]
    pub reconciler: ReconcilerConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub access_key: String,
    #[serde(default)]
    pub secret_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiEndpoint {
    #[serde(default = "default_api_host")]
    pub host: String,
    #[serde(default = "default_api_region")]
    pub region: String,
    #[serde(default = "default_api_service")]
    pub service: String,
    #[serde(default = "default_plain_action")]
    pub plain_action: String,
    #[serde(default = "default_plain_version")]
    pub plain_version: String,
    #[serde(default = "default_structured_action")]
    pub structured_action: String,
    #[serde(default = "default_structured_version")]
    pub structured_version: String,
}

impl Default for ApiEndpoint {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            region: default_api_region(),
            service: default_api_service(),
            plain_action: default_plain_action(),
            plain_version: default_plain_version(),
            structured_action: default_structured_action(),
            structured_version: default_structured_version(),
        }
    }
}

/// Directory layout for one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelinePaths {
    /// Directory holding the scanned page images.
    #[serde(default = "default_image_dir")]
    pub image_dir: PathBuf,
    /// Root for all generated artifacts.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

impl Default for PipelinePaths {
    fn default() -> Self {
        Self {
            image_dir: default_image_dir(),
            output_dir: default_output_dir(),
        }
    }
}

impl PipelinePaths {
    /// Per-page plain-OCR cache files.
    pub fn raw_ocr_dir(&self) -> PathBuf {
        self.output_dir.join("raw_ocr")
    }

    /// Per-group structured-parse cache files.
    pub fn table_ocr_dir(&self) -> PathBuf {
        self.output_dir.join("table_ocr")
    }

    pub fn processed_dir(&self) -> PathBuf {
        self.output_dir.join("processed")
    }

    pub fn reports_dir(&self) -> PathBuf {
        self.output_dir.join("reports")
    }

    pub fn detection_file(&self) -> PathBuf {
        self.processed_dir().join("table_detection.json")
    }

    pub fn table_summary_file(&self) -> PathBuf {
        self.processed_dir().join("table_parsing_summary.json")
    }

    pub fn final_output_file(&self) -> PathBuf {
        self.processed_dir().join("questions_final.json")
    }

    pub fn merged_markdown_file(&self) -> PathBuf {
        self.processed_dir().join("merged_content.md")
    }

    pub fn standard_markdown_file(&self) -> PathBuf {
        self.output_dir.join("standard_corpus.md")
    }

    pub fn page_cache_file(&self, page_num: u32) -> PathBuf {
        self.raw_ocr_dir().join(format!("page_{page_num:03}.json"))
    }

    pub fn group_cache_file(&self, group_index: usize) -> PathBuf {
        self.table_ocr_dir().join(format!("table_group_{group_index:03}.json"))
    }

    pub fn group_markdown_file(&self, group_index: usize) -> PathBuf {
        self.table_ocr_dir().join(format!("table_group_{group_index:03}.md"))
    }

    /// Create every output directory this run writes into.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [
            self.raw_ocr_dir(),
            self.table_ocr_dir(),
            self.processed_dir(),
            self.reports_dir(),
        ] {
            std::fs::create_dir_all(&dir)?;
        }
        Ok(())
    }
}

/// Thresholds and keyword sets for the table detector and grouper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Any of these anywhere on the page fires the keyword signal.
    #[serde(default = "default_table_keywords")]
    pub table_keywords: Vec<String>,

    /// Subset of `table_keywords` that marks a page as a *real* table page
    /// for the reconciler. Pages flagged only by statistical signals (or by
    /// topic words like 膳食调查) never get a table spliced in.
    #[serde(default = "default_explicit_table_keywords")]
    pub explicit_table_keywords: Vec<String>,

    /// Short-line-ratio signal threshold.
    #[serde(default = "default_short_line_ratio")]
    pub short_line_ratio: f64,

    /// Lines shorter than this count as short.
    #[serde(default = "default_short_line_length")]
    pub short_line_length: usize,

    /// Digit-density signal threshold.
    #[serde(default = "default_digit_ratio")]
    pub digit_ratio: f64,

    /// A first line containing any of these stops table continuation onto
    /// that page.
    #[serde(default = "default_continuation_stop_markers")]
    pub continuation_stop_markers: Vec<String>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            table_keywords: default_table_keywords(),
            explicit_table_keywords: default_explicit_table_keywords(),
            short_line_ratio: default_short_line_ratio(),
            short_line_length: default_short_line_length(),
            digit_ratio: default_digit_ratio(),
            continuation_stop_markers: default_continuation_stop_markers(),
        }
    }
}

/// Heuristics for the content reconciler's splice automaton.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcilerConfig {
    /// Phrases that trigger a table insertion.
    #[serde(default = "default_trigger_markers")]
    pub trigger_markers: Vec<String>,

    /// Domain phrases identifying residual table-cell lines.
    #[serde(default = "default_debris_keywords")]
    pub debris_keywords: Vec<String>,

    /// Lines shorter than this (in chars) are debris while suppressing.
    #[serde(default = "default_debris_line_length")]
    pub debris_line_length: usize,

    /// A leading question number above this ends suppression outright.
    #[serde(default = "default_question_number_threshold")]
    pub question_number_threshold: u32,

    /// A numbered line longer than this is a question even with a small
    /// number.
    #[serde(default = "default_question_line_length")]
    pub question_line_length: usize,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            trigger_markers: default_trigger_markers(),
            debris_keywords: default_debris_keywords(),
            debris_line_length: default_debris_line_length(),
            question_number_threshold: default_question_number_threshold(),
            question_line_length: default_question_line_length(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            credentials: Credentials::default(),
            api: ApiEndpoint::default(),
            paths: PipelinePaths::default(),
            max_qps: default_max_qps(),
            max_retries: default_max_retries(),
            retry_delay_secs: default_retry_delay(),
            request_timeout_secs: default_request_timeout(),
            watermark_keywords: default_watermark_keywords(),
            image_pattern: default_image_pattern(),
            detector: DetectorConfig::default(),
            reconciler: ReconcilerConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Ok(toml::from_str(&content)?)
    }

    /// Fixed inter-request interval derived from `max_qps`.
    pub fn request_interval(&self) -> Duration {
        if self.max_qps <= 0.0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(1.0 / self.max_qps)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_max_qps() -> f64 {
    8.0
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_delay() -> u64 {
    2
}
fn default_request_timeout() -> u64 {
    120
}
fn default_image_pattern() -> String {
    r"_(\d+)\.png$".to_string()
}
fn default_image_dir() -> PathBuf {
    PathBuf::from("images")
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}
fn default_api_host() -> String {
    "visual.volcengineapi.com".to_string()
}
fn default_api_region() -> String {
    "cn-north-1".to_string()
}
fn default_api_service() -> String {
    "cv".to_string()
}
fn default_plain_action() -> String {
    "OCRNormal".to_string()
}
fn default_plain_version() -> String {
    "2020-08-26".to_string()
}
fn default_structured_action() -> String {
    "OCRPdf".to_string()
}
fn default_structured_version() -> String {
    "2021-08-23".to_string()
}
fn default_watermark_keywords() -> Vec<String> {
    vec!["小象教育".to_string(), "小象".to_string()]
}
fn default_table_keywords() -> Vec<String> {
    [
        "见下表",
        "如下表",
        "下表所示",
        "表格",
        "调查记录",
        "膳食调查",
        "食物频率",
    ]
    .map(String::from)
    .to_vec()
}
fn default_explicit_table_keywords() -> Vec<String> {
    ["见下表", "如下表", "下表所示", "表格", "调查记录"]
        .map(String::from)
        .to_vec()
}
fn default_short_line_ratio() -> f64 {
    0.35
}
fn default_short_line_length() -> usize {
    12
}
fn default_digit_ratio() -> f64 {
    0.08
}
fn default_continuation_stop_markers() -> Vec<String> {
    ["《", "》", "真题", "答案"].map(String::from).to_vec()
}
fn default_trigger_markers() -> Vec<String> {
    ["见下表", "如下表", "下表所示"].map(String::from).to_vec()
}
fn default_debris_keywords() -> Vec<String> {
    [
        "食物名称",
        "是否食用",
        "平均每次",
        "次/日",
        "次/周",
        "次/月",
        "次/年",
        "根据表格",
        "表某社区",
        "调查记录",
    ]
    .map(String::from)
    .to_vec()
}
fn default_debris_line_length() -> usize {
    15
}
fn default_question_number_threshold() -> u32 {
    20
}
fn default_question_line_length() -> usize {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.max_qps, 8.0);
        assert_eq!(config.max_retries, 3);
        assert!(config.detector.table_keywords.contains(&"见下表".to_string()));
        // The explicit set is a strict subset of the detector keywords.
        for kw in &config.detector.explicit_table_keywords {
            assert!(config.detector.table_keywords.contains(kw));
        }
        assert!(!config.detector.explicit_table_keywords.contains(&"膳食调查".to_string()));
    }

    #[test]
    fn test_request_interval() {
        let mut config = PipelineConfig::default();
        assert_eq!(config.request_interval(), Duration::from_millis(125));
        config.max_qps = 0.0;
        assert_eq!(config.request_interval(), Duration::ZERO);
    }

    #[test]
    fn test_from_toml_partial() {
        let toml_str = r#"
            max_qps = 2.0

            [paths]
            image_dir = "scans"
            output_dir = "out"

            [detector]
            short_line_length = 10
        "#;
        let config: PipelineConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.max_qps, 2.0);
        assert_eq!(config.paths.image_dir, PathBuf::from("scans"));
        assert_eq!(config.detector.short_line_length, 10);
        // Unspecified sections fall back to defaults.
        assert_eq!(config.detector.short_line_ratio, 0.35);
        assert_eq!(config.api.host, "visual.volcengineapi.com");
    }

    #[test]
    fn test_path_helpers() {
        let paths = PipelinePaths {
            image_dir: PathBuf::from("scans"),
            output_dir: PathBuf::from("out"),
        };
        assert_eq!(paths.page_cache_file(7), PathBuf::from("out/raw_ocr/page_007.json"));
        assert_eq!(
            paths.group_cache_file(1),
            PathBuf::from("out/table_ocr/table_group_001.json")
        );
        assert_eq!(
            paths.detection_file(),
            PathBuf::from("out/processed/table_detection.json")
        );
    }
}
