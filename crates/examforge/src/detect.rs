//! Table-page detection and multi-page table grouping.
//!
//! [`detect_table`] scores a page's plain-OCR lines with four independent,
//! capped signals; keyword presence alone reaches the decision threshold, so
//! the statistical signals only promote borderline pages and raise
//! confidence. [`group_table_pages`] then chains adjacent flagged pages into
//! groups representing one logical (possibly multi-page) table, using a
//! continuation heuristic on the following page's first line.
//!
//! Both operations are pure functions of the line data and the configured
//! thresholds.

use crate::config::DetectorConfig;
use crate::types::{DetectionReport, TableDetection};
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

const KEYWORD_WEIGHT: f64 = 0.4;
const SHORT_LINE_WEIGHT: f64 = 0.3;
const DIGIT_WEIGHT: f64 = 0.2;
const REGULARITY_WEIGHT: f64 = 0.1;
/// Decision threshold; equal to the keyword weight by design.
const DECISION_THRESHOLD: f64 = 0.4;

/// Leading numbering: digit or CJK numeral followed by `.` or `、`.
static NUMBERING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\d一二三四五六七八九十]+[.、]").expect("valid regex"));

/// Score a single page's OCR lines for table-likeness.
pub fn detect_table(lines: &[String], config: &DetectorConfig) -> TableDetection {
    if lines.is_empty() {
        return TableDetection::empty();
    }

    let text = lines.join("\n");
    let mut score = 0.0;
    let mut reasons = Vec::new();

    let keywords_found: Vec<String> = config
        .table_keywords
        .iter()
        .filter(|kw| text.contains(kw.as_str()))
        .cloned()
        .collect();
    if !keywords_found.is_empty() {
        score += KEYWORD_WEIGHT;
        reasons.push(format!("table keywords present: {}", keywords_found.join(", ")));
    }

    // Tables produce many short cell fragments.
    let short_lines = lines
        .iter()
        .filter(|l| l.chars().count() < config.short_line_length)
        .count();
    let short_ratio = short_lines as f64 / lines.len() as f64;
    if short_ratio > config.short_line_ratio {
        score += SHORT_LINE_WEIGHT;
        reasons.push(format!("high short-line ratio: {short_ratio:.2}"));
    }

    let total_chars = text.chars().count();
    let digit_count = text.chars().filter(|c| c.is_ascii_digit()).count();
    let digit_ratio = if total_chars > 0 {
        digit_count as f64 / total_chars as f64
    } else {
        0.0
    };
    if digit_ratio > config.digit_ratio {
        score += DIGIT_WEIGHT;
        reasons.push(format!("digit-dense text: {digit_ratio:.2}"));
    }

    // Tabular rows tend to have similar lengths; count consecutive pairs
    // differing by less than 30%.
    if lines.len() >= 5 {
        let lengths: Vec<usize> = lines.iter().map(|l| l.chars().count()).collect();
        let similar_count = lengths
            .windows(2)
            .filter(|pair| {
                let (a, b) = (pair[0], pair[1]);
                a > 0 && (a.abs_diff(b) as f64) / (a as f64) < 0.3
            })
            .count();
        if similar_count >= 4 {
            score += REGULARITY_WEIGHT;
            reasons.push(format!("regular line lengths: {similar_count} similar pairs"));
        }
    }

    TableDetection {
        has_table: score >= DECISION_THRESHOLD,
        confidence: score.min(1.0),
        reasons,
        table_keywords_found: keywords_found,
    }
}

/// Whether `next_first_line` looks like the continuation of a table that is
/// open on the previous page, rather than the start of a new topic.
fn continues_table(next_first_line: &str, config: &DetectorConfig) -> bool {
    if NUMBERING_RE.is_match(next_first_line) {
        return false;
    }
    !config
        .continuation_stop_markers
        .iter()
        .any(|marker| next_first_line.contains(marker.as_str()))
}

/// Partition table-flagged pages into ordered groups of strictly
/// consecutive page numbers.
///
/// `page_lines` supplies each page's OCR lines for the continuation test;
/// pages missing from it never extend a group.
pub fn group_table_pages(
    table_pages: &[u32],
    page_lines: &BTreeMap<u32, Vec<String>>,
    config: &DetectorConfig,
) -> Vec<Vec<u32>> {
    let mut pages: Vec<u32> = table_pages.to_vec();
    pages.sort_unstable();
    pages.dedup();

    let Some((&first, rest)) = pages.split_first() else {
        return Vec::new();
    };

    let mut groups = Vec::new();
    let mut current = vec![first];
    let mut prev = first;

    for &page in rest {
        let continues = page == prev + 1
            && page_lines
                .get(&page)
                .and_then(|lines| lines.first())
                .is_some_and(|line| continues_table(line, config))
            && page_lines
                .get(&prev)
                .is_some_and(|lines| detect_table(lines, config).has_table);

        if continues {
            current.push(page);
        } else {
            groups.push(std::mem::replace(&mut current, vec![page]));
        }
        prev = page;
    }

    groups.push(current);
    groups
}

/// Assemble the phase-2 detection report from per-page detections.
pub fn build_detection_report(
    detections: &BTreeMap<u32, TableDetection>,
    page_lines: &BTreeMap<u32, Vec<String>>,
    config: &DetectorConfig,
) -> DetectionReport {
    let table_pages: Vec<u32> = detections
        .iter()
        .filter(|(_, d)| d.has_table)
        .map(|(&p, _)| p)
        .collect();

    let table_groups = group_table_pages(&table_pages, page_lines, config);

    let detection_details: BTreeMap<String, TableDetection> = detections
        .iter()
        .filter(|(_, d)| d.has_table)
        .map(|(&p, d)| (p.to_string(), d.clone()))
        .collect();

    DetectionReport {
        timestamp: Utc::now().to_rfc3339(),
        total_pages: detections.len(),
        table_page_count: table_pages.len(),
        table_pages,
        table_group_count: table_groups.len(),
        table_groups,
        detection_details,
    }
}
