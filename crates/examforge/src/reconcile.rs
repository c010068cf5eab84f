//! Cross-source content reconciliation.
//!
//! Each page has up to two transcriptions: the plain-OCR line list and, for
//! pages inside a detected table group, a structured markdown parse. The
//! reconciler merges them into one canonical per-page text:
//!
//! - Non-table pages pass through verbatim (lines joined with `\n`).
//! - Table pages get the first extracted markdown table spliced in at the
//!   first trigger phrase, after which a suppression automaton skips the
//!   plain-OCR debris that duplicated the table cells, until a line is
//!   recognized as a genuine new question.
//!
//! The automaton is an explicit two-state machine ([`MergeState`]) whose
//! transition predicates are standalone functions, so each heuristic can be
//! probed in isolation. Only the first table block is ever inserted and only
//! at the first trigger — pages with two distinct tables are a known
//! limitation of the source pipeline, intentionally preserved.

use crate::config::ReconcilerConfig;
use crate::types::PageContent;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

/// A contiguous markdown table block extracted from a structured parse.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkdownTable {
    pub start_line: usize,
    pub end_line: usize,
    pub markdown: String,
}

/// Splice automaton state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeState {
    Normal,
    /// A table was just inserted; plain-OCR duplicates of its cells are
    /// being skipped.
    Suppressing,
}

static QUESTION_NUMBER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+)[.、]").expect("valid regex"));
static DIGIT_UNIT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[\d.\s两个克g半]+$").expect("valid regex"));
static BARE_OPTION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-D][.、\s]*$").expect("valid regex"));
static ROW_LABEL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{1,2}[.、][\x{4e00}-\x{9fa5}]{1,6}$").expect("valid regex"));
static NUMBER_TOKEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+\.?\d*").expect("valid regex"));
static CJK_WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\x{4e00}-\x{9fa5}]{2,}").expect("valid regex"));

/// Extract markdown table blocks: maximal runs of `|`-prefixed lines with at
/// least two rows.
pub fn extract_markdown_tables(text: &str) -> Vec<MarkdownTable> {
    let lines: Vec<&str> = text.split('\n').collect();
    let mut tables = Vec::new();
    let mut start: Option<usize> = None;
    let mut rows: Vec<&str> = Vec::new();

    let flush = |start: &mut Option<usize>, rows: &mut Vec<&str>, end_line: usize, tables: &mut Vec<MarkdownTable>| {
        if let Some(s) = start.take()
            && rows.len() >= 2
        {
            tables.push(MarkdownTable {
                start_line: s,
                end_line,
                markdown: rows.join("\n"),
            });
        }
        rows.clear();
    };

    for (i, line) in lines.iter().copied().enumerate() {
        if line.trim_start().starts_with('|') {
            if start.is_none() {
                start = Some(i);
            }
            rows.push(line);
        } else {
            flush(&mut start, &mut rows, i.saturating_sub(1), &mut tables);
        }
    }
    let last = lines.len().saturating_sub(1);
    flush(&mut start, &mut rows, last, &mut tables);

    tables
}

/// Does this line announce an upcoming table? (explicit trigger phrases only)
pub fn is_table_trigger(line: &str, config: &ReconcilerConfig) -> bool {
    config.trigger_markers.iter().any(|m| line.contains(m.as_str()))
}

/// Is this a genuine new question that ends suppression?
///
/// Requires a leading question number, and then: the number exceeds the
/// configured threshold (table row labels stay small), or the line carries a
/// question-type marker, or the line is long enough to read as a stem.
pub fn is_question_boundary(line: &str, config: &ReconcilerConfig) -> bool {
    let trimmed = line.trim();
    let Some(caps) = QUESTION_NUMBER_RE.captures(trimmed) else {
        return false;
    };
    let number: u32 = caps[1].parse().unwrap_or(0);
    number > config.question_number_threshold
        || trimmed.contains('【')
        || trimmed.chars().count() > config.question_line_length
}

/// Does this line look like residual table data that the plain OCR emitted
/// cell by cell?
pub fn is_table_debris(line: &str, config: &ReconcilerConfig) -> bool {
    let trimmed = line.trim();
    config.debris_keywords.iter().any(|kw| line.contains(kw.as_str()))
        || trimmed.chars().count() < config.debris_line_length
        || DIGIT_UNIT_RE.is_match(trimmed)
        || BARE_OPTION_RE.is_match(trimmed)
        || ROW_LABEL_RE.is_match(trimmed)
}

/// Reconcile one page into its canonical content.
///
/// `table_markdown` is the page's table group's merged structured markdown;
/// it is only consulted when `is_table_page` is set (the caller applies the
/// explicit-keyword filter). Pure and idempotent.
pub fn reconcile_page(
    page_num: u32,
    ocr_lines: &[String],
    table_markdown: Option<&str>,
    is_table_page: bool,
    config: &ReconcilerConfig,
) -> PageContent {
    let verbatim = ocr_lines.join("\n");

    if !is_table_page {
        return PageContent {
            page_num,
            is_table_page: false,
            source: "ocr_normal".to_string(),
            text: ocr_lines.to_vec(),
            markdown: verbatim,
        };
    }

    let tables = table_markdown.map(extract_markdown_tables).unwrap_or_default();
    let Some(first_table) = tables.first() else {
        // Flagged page but nothing extractable: fall back to plain OCR.
        return PageContent {
            page_num,
            is_table_page: true,
            source: "ocr_normal".to_string(),
            text: ocr_lines.to_vec(),
            markdown: verbatim,
        };
    };

    let mut merged: Vec<String> = Vec::with_capacity(ocr_lines.len() + 1);
    let mut state = MergeState::Normal;
    let mut table_inserted = false;

    for line in ocr_lines {
        if !table_inserted && is_table_trigger(line, config) {
            merged.push(line.clone());
            merged.push(format!("\n{}\n", first_table.markdown));
            table_inserted = true;
            state = MergeState::Suppressing;
            continue;
        }

        if state == MergeState::Suppressing {
            if is_question_boundary(line, config) {
                state = MergeState::Normal;
                merged.push(line.clone());
                continue;
            }
            if is_table_debris(line, config) {
                continue;
            }
            // Not debris, not yet a question: keep the line but stay
            // suppressing until a real question boundary shows up.
        }

        merged.push(line.clone());
    }

    PageContent {
        page_num,
        is_table_page: true,
        source: "hybrid".to_string(),
        text: ocr_lines.to_vec(),
        markdown: merged.join("\n"),
    }
}

/// Cross-source consistency of a table page's two transcriptions.
#[derive(Debug, Clone, PartialEq)]
pub struct TableConsistency {
    pub consistency_score: f64,
    pub number_match_ratio: f64,
    pub word_match_ratio: f64,
    pub is_consistent: bool,
}

/// Compare the plain-OCR text with the structured table markdown by number
/// and CJK-word overlap. A low score means the two sources disagree and the
/// page deserves human review.
pub fn validate_table_content(ocr_text: &str, table_markdown: &str) -> TableConsistency {
    fn token_set(re: &Regex, text: &str) -> BTreeSet<String> {
        re.find_iter(text).map(|m| m.as_str().to_string()).collect()
    }

    fn overlap_ratio(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
        if a.is_empty() || b.is_empty() {
            return 0.0;
        }
        let common = a.intersection(b).count();
        common as f64 / a.len().max(b.len()) as f64
    }

    let number_match_ratio = overlap_ratio(
        &token_set(&NUMBER_TOKEN_RE, ocr_text),
        &token_set(&NUMBER_TOKEN_RE, table_markdown),
    );
    let word_match_ratio = overlap_ratio(
        &token_set(&CJK_WORD_RE, ocr_text),
        &token_set(&CJK_WORD_RE, table_markdown),
    );
    let consistency_score = (number_match_ratio + word_match_ratio) / 2.0;

    TableConsistency {
        consistency_score,
        number_match_ratio,
        word_match_ratio,
        is_consistent: consistency_score > 0.5,
    }
}
