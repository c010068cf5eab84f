//! Phase 3: structured re-parse of every detected table group.
//!
//! Each group from the detection report gets one structured OCR call per
//! page, a merged markdown document, and a cache file; groups with an
//! existing cache file are skipped on rerun. A page that fails inside a
//! group is recorded in the group's `errors` and leaves an empty markdown
//! part so the surviving pages still merge in order.

use super::{PipelineContext, list_page_images, read_json, write_json};
use crate::error::{ExamforgeError, Result};
use crate::ocr::TableMode;
use crate::types::{DetectionReport, PhaseReport, TableGroupResult};
use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Serialize)]
struct TableParsingSummary {
    timestamp: String,
    total_groups: usize,
    success_count: usize,
    fail_count: usize,
    skipped_count: usize,
    group_ids: Vec<String>,
}

/// Run structured parsing for every table group in the detection report.
pub async fn run_table_parse(ctx: &PipelineContext) -> Result<PhaseReport> {
    let detection_path = ctx.config.paths.detection_file();
    if !detection_path.exists() {
        return Err(ExamforgeError::validation(
            "table detection results not found; run the detection phase first",
        ));
    }
    let detection: DetectionReport = read_json(&detection_path)?;
    let images = list_page_images(&ctx.config)?;

    let mut report = PhaseReport {
        phase: "phase3".to_string(),
        timestamp: Utc::now().to_rfc3339(),
        total_items: detection.table_groups.len(),
        success_count: 0,
        fail_count: 0,
        notes: Vec::new(),
    };
    let mut skipped = 0usize;
    let mut group_ids = Vec::new();

    for (i, group) in detection.table_groups.iter().enumerate() {
        let index = i + 1;
        let group_id = format!("group_{index:03}");
        group_ids.push(group_id.clone());

        let cache_file = ctx.config.paths.group_cache_file(index);
        if cache_file.exists() {
            let cached: TableGroupResult = read_json(&cache_file)?;
            if cached.success {
                report.success_count += 1;
            } else {
                report.fail_count += 1;
            }
            skipped += 1;
            continue;
        }

        info!(group = %group_id, pages = ?group, "parsing table group");
        let mut markdown_parts = Vec::with_capacity(group.len());
        let mut errors = Vec::new();

        for &page in group {
            let Some(image_path) = images.get(&page) else {
                errors.push(format!("page {page}: source image not found"));
                markdown_parts.push(String::new());
                continue;
            };
            let outcome = match std::fs::read(image_path) {
                Ok(image) => {
                    let outcome = ctx
                        .client
                        .recognize_structured(&image, TableMode::Markdown)
                        .await?;
                    ctx.pace().await;
                    outcome
                }
                Err(e) => {
                    errors.push(format!("page {page}: failed to read image: {e}"));
                    markdown_parts.push(String::new());
                    continue;
                }
            };

            if outcome.success {
                markdown_parts.push(outcome.markdown);
            } else {
                let message = outcome.error.unwrap_or_else(|| "unknown error".to_string());
                warn!(group = %group_id, page, error = %message, "structured parse failed");
                errors.push(format!("page {page}: {message}"));
                markdown_parts.push(String::new());
            }
        }

        let merged_markdown = markdown_parts
            .iter()
            .filter(|part| !part.is_empty())
            .cloned()
            .collect::<Vec<String>>()
            .join("\n\n");
        let success = !merged_markdown.is_empty();

        let result = TableGroupResult {
            group_id: group_id.clone(),
            pages: group.clone(),
            success,
            timestamp: Utc::now().to_rfc3339(),
            markdown_parts,
            merged_markdown,
            errors,
        };

        write_json(&cache_file, &result)?;
        // Companion .md for quick human inspection of the merged table.
        std::fs::write(ctx.config.paths.group_markdown_file(index), &result.merged_markdown)?;

        if result.success {
            report.success_count += 1;
            info!(group = %group_id, "table group parsed");
        } else {
            report.fail_count += 1;
            warn!(group = %group_id, errors = result.errors.len(), "table group failed");
        }
    }

    if skipped > 0 {
        report.notes.push(format!("skipped {skipped} already-cached groups"));
        info!(skipped, "resumed over cached table groups");
    }

    write_json(
        &ctx.config.paths.table_summary_file(),
        &TableParsingSummary {
            timestamp: report.timestamp.clone(),
            total_groups: detection.table_groups.len(),
            success_count: report.success_count,
            fail_count: report.fail_count,
            skipped_count: skipped,
            group_ids,
        },
    )?;
    ctx.write_report(&report)?;
    Ok(report)
}
