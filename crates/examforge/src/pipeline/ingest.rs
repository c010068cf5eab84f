//! Phase 1: batch plain OCR of every page image.
//!
//! One OCR call per page, one cache file per page. Pages whose cache file
//! already exists are skipped, which is the pipeline's resumability story: a
//! rerun after interruption only pays for the missing pages. A failed page
//! is recorded with its error and the run continues.

use super::{PipelineContext, list_page_images, write_json};
use crate::error::Result;
use crate::types::{PageRecord, PhaseReport};
use chrono::Utc;
use tracing::{info, warn};

/// Options for the ingestion phase.
#[derive(Debug, Clone, Copy, Default)]
pub struct IngestOptions {
    /// First page to process (inclusive).
    pub start_page: Option<u32>,
    /// Last page to process (inclusive).
    pub end_page: Option<u32>,
    /// List planned work without calling the OCR client.
    pub dry_run: bool,
}

/// Drop lines containing any watermark keyword.
fn filter_watermark(lines: &[String], keywords: &[String]) -> Vec<String> {
    lines
        .iter()
        .filter(|line| !keywords.iter().any(|kw| line.contains(kw.as_str())))
        .cloned()
        .collect()
}

/// Run batch plain OCR over the configured image directory.
pub async fn run_ingest(ctx: &PipelineContext, options: IngestOptions) -> Result<PhaseReport> {
    let images = list_page_images(&ctx.config)?;
    info!(total = images.len(), "found page images");

    let in_range = |page: u32| {
        options.start_page.is_none_or(|s| page >= s) && options.end_page.is_none_or(|e| page <= e)
    };
    let planned: Vec<(u32, std::path::PathBuf)> = images
        .into_iter()
        .filter(|(page, _)| in_range(*page))
        .collect();

    let mut report = PhaseReport {
        phase: "phase1".to_string(),
        timestamp: Utc::now().to_rfc3339(),
        total_items: planned.len(),
        success_count: 0,
        fail_count: 0,
        notes: Vec::new(),
    };

    if options.dry_run {
        for (page, path) in &planned {
            report.notes.push(format!("would process page {page}: {}", path.display()));
        }
        info!(planned = planned.len(), "dry run, no OCR calls issued");
        return Ok(report);
    }

    let mut skipped = 0usize;
    for (page_num, image_path) in planned {
        let cache_file = ctx.config.paths.page_cache_file(page_num);
        if cache_file.exists() {
            skipped += 1;
            continue;
        }

        let filename = image_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let record = match std::fs::read(&image_path) {
            Ok(image) => {
                let outcome = ctx.client.recognize_plain(&image).await?;
                ctx.pace().await;

                if outcome.success {
                    let filtered = filter_watermark(&outcome.line_texts, &ctx.config.watermark_keywords);
                    PageRecord {
                        page_num,
                        filename,
                        success: true,
                        timestamp: Utc::now().to_rfc3339(),
                        raw_line_count: outcome.line_texts.len(),
                        filtered_line_count: filtered.len(),
                        line_texts: filtered,
                        line_texts_raw: outcome.line_texts,
                        line_probs: outcome.line_probs,
                        error: None,
                    }
                } else {
                    PageRecord {
                        page_num,
                        filename,
                        success: false,
                        timestamp: Utc::now().to_rfc3339(),
                        line_texts: Vec::new(),
                        line_texts_raw: Vec::new(),
                        line_probs: Vec::new(),
                        raw_line_count: 0,
                        filtered_line_count: 0,
                        error: outcome.error,
                    }
                }
            }
            Err(e) => {
                // Missing/unreadable source image: report and move on.
                PageRecord {
                    page_num,
                    filename,
                    success: false,
                    timestamp: Utc::now().to_rfc3339(),
                    line_texts: Vec::new(),
                    line_texts_raw: Vec::new(),
                    line_probs: Vec::new(),
                    raw_line_count: 0,
                    filtered_line_count: 0,
                    error: Some(format!("failed to read image: {e}")),
                }
            }
        };

        if record.success {
            report.success_count += 1;
            info!(page = page_num, lines = record.filtered_line_count, "page ingested");
        } else {
            report.fail_count += 1;
            warn!(page = page_num, error = record.error.as_deref().unwrap_or("?"), "page failed");
        }
        write_json(&cache_file, &record)?;
    }

    if skipped > 0 {
        report.notes.push(format!("skipped {skipped} already-cached pages"));
        info!(skipped, "resumed over cached pages");
    }
    ctx.write_report(&report)?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_watermark() {
        let lines = vec![
            "1. 正常题目".to_string(),
            "小象教育出品".to_string(),
            "A. 选项".to_string(),
        ];
        let keywords = vec!["小象".to_string()];
        let filtered = filter_watermark(&lines, &keywords);
        assert_eq!(filtered, vec!["1. 正常题目".to_string(), "A. 选项".to_string()]);
    }

    #[test]
    fn test_filter_watermark_no_keywords() {
        let lines = vec!["正文".to_string()];
        assert_eq!(filter_watermark(&lines, &[]), lines);
    }
}
