//! Phase orchestration.
//!
//! The pipeline runs four phases over a shared [`PipelineContext`]:
//!
//! 1. [`ingest`] — plain OCR of every page image, cached per page.
//! 2. [`detect`] — table-page detection and multi-page grouping.
//! 3. [`tables`] — structured re-parse of each table group, cached per group.
//! 4. [`merge`] — reconciliation, exam-structure extraction, final corpus.
//!
//! Phases are strictly sequential and process items in ascending page order;
//! resumability comes from per-item cache files checked before any OCR call.
//! A later phase that needs a missing prerequisite fails with a clear
//! `Validation` error instead of guessing.

pub mod detect;
pub mod ingest;
pub mod merge;
pub mod tables;

use crate::config::PipelineConfig;
use crate::error::{ExamforgeError, Result};
use crate::ocr::OcrClient;
use crate::types::{PageRecord, PhaseReport};
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

static PAGE_CACHE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^page_(\d+)\.json$").expect("valid regex"));
static GROUP_CACHE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^table_group_(\d+)\.json$").expect("valid regex"));

/// Context object for one pipeline run: configuration plus the OCR client.
pub struct PipelineContext {
    pub config: PipelineConfig,
    pub client: Arc<dyn OcrClient>,
}

impl PipelineContext {
    /// Create a context and the output directory tree it writes into.
    pub fn new(config: PipelineConfig, client: Arc<dyn OcrClient>) -> Result<Self> {
        config.paths.ensure_dirs()?;
        Ok(Self { config, client })
    }

    /// Mandatory pause after every outbound OCR call (`1/max_qps`).
    pub(crate) async fn pace(&self) {
        let interval = self.config.request_interval();
        if !interval.is_zero() {
            tokio::time::sleep(interval).await;
        }
    }

    /// Write a phase report under the reports directory.
    pub(crate) fn write_report(&self, report: &PhaseReport) -> Result<()> {
        let filename = format!(
            "{}_report_{}.json",
            report.phase,
            Utc::now().format("%Y%m%d_%H%M%S")
        );
        let path = self.config.paths.reports_dir().join(filename);
        write_json(&path, report)?;
        info!(path = %path.display(), "phase report written");
        Ok(())
    }
}

pub(crate) fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json)?;
    Ok(())
}

pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Enumerate page images, keyed by page number in ascending order.
pub(crate) fn list_page_images(config: &PipelineConfig) -> Result<BTreeMap<u32, PathBuf>> {
    let pattern = Regex::new(&config.image_pattern)
        .map_err(|e| ExamforgeError::validation_with_source("invalid image_pattern regex", e))?;

    let mut images = BTreeMap::new();
    for entry in std::fs::read_dir(&config.paths.image_dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if let Some(caps) = pattern.captures(name)
            && let Some(num) = caps.get(1)
            && let Ok(page_num) = num.as_str().parse::<u32>()
        {
            images.insert(page_num, entry.path());
        }
    }
    Ok(images)
}

/// Load all cached phase-1 page records, keyed by page number.
pub(crate) fn load_page_records(config: &PipelineConfig) -> Result<BTreeMap<u32, PageRecord>> {
    let dir = config.paths.raw_ocr_dir();
    let mut records = BTreeMap::new();
    if !dir.exists() {
        return Ok(records);
    }
    for entry in std::fs::read_dir(&dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if let Some(caps) = PAGE_CACHE_RE.captures(name)
            && let Ok(page_num) = caps[1].parse::<u32>()
        {
            let record: PageRecord = read_json(&entry.path())?;
            records.insert(page_num, record);
        }
    }
    Ok(records)
}

/// Load all cached phase-3 group results, in group order.
pub(crate) fn load_group_results(config: &PipelineConfig) -> Result<Vec<crate::types::TableGroupResult>> {
    let dir = config.paths.table_ocr_dir();
    let mut indexed: BTreeMap<u32, crate::types::TableGroupResult> = BTreeMap::new();
    if !dir.exists() {
        return Ok(Vec::new());
    }
    for entry in std::fs::read_dir(&dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if let Some(caps) = GROUP_CACHE_RE.captures(name)
            && let Ok(index) = caps[1].parse::<u32>()
        {
            indexed.insert(index, read_json(&entry.path())?);
        }
    }
    Ok(indexed.into_values().collect())
}
