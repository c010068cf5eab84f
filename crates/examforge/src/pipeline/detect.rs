//! Phase 2: table-page detection over the cached phase-1 results.
//!
//! Purely local — no OCR calls. Produces `table_detection.json` with the
//! flagged pages, per-page signal details, and the derived multi-page
//! groups.

use super::{PipelineContext, load_page_records, write_json};
use crate::detect::{build_detection_report, detect_table};
use crate::error::Result;
use crate::types::{DetectionReport, PhaseReport};
use std::collections::BTreeMap;
use tracing::info;

/// Run detection and grouping; writes and returns the detection report.
pub fn run_detection(ctx: &PipelineContext) -> Result<DetectionReport> {
    let records = load_page_records(&ctx.config)?;
    info!(pages = records.len(), "loaded cached OCR results");

    let page_lines: BTreeMap<u32, Vec<String>> = records
        .iter()
        .map(|(&page, record)| (page, record.line_texts.clone()))
        .collect();

    let detections = page_lines
        .iter()
        .map(|(&page, lines)| (page, detect_table(lines, &ctx.config.detector)))
        .collect();

    let report = build_detection_report(&detections, &page_lines, &ctx.config.detector);
    for (page, detail) in &report.detection_details {
        info!(page = %page, confidence = detail.confidence, reasons = ?detail.reasons, "table page detected");
    }
    info!(
        table_pages = report.table_page_count,
        groups = report.table_group_count,
        "detection complete"
    );

    write_json(&ctx.config.paths.detection_file(), &report)?;

    ctx.write_report(&PhaseReport {
        phase: "phase2".to_string(),
        timestamp: report.timestamp.clone(),
        total_items: report.total_pages,
        success_count: report.table_page_count,
        fail_count: 0,
        notes: report
            .table_groups
            .iter()
            .enumerate()
            .map(|(i, group)| format!("group {}: pages {:?}", i + 1, group))
            .collect(),
    })?;

    Ok(report)
}
