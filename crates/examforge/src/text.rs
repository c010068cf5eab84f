//! Text format standardization.
//!
//! OCR output is inconsistent about spacing after question numbers and
//! option letters, and carries interference lines (watermark brands, URLs,
//! bare page numbers). [`standardize`] normalizes a document and returns a
//! change log so the renderer can report what it touched.

use once_cell::sync::Lazy;
use regex::Regex;

static QUESTION_SPACING_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+)\.(\S)").expect("valid regex"));
static OPTION_SPACING_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([A-D])\.(\S)").expect("valid regex"));
static ANSWER_SPACING_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+)\.【").expect("valid regex"));
static BARE_NUMBER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+$").expect("valid regex"));

/// Substrings whose presence marks a line as interference. A line that is
/// nothing but interference is dropped; partial matches are cut out.
const INTERFERENCE_PATTERNS: [&str; 5] = ["小象教育", "象教育", "抖音", "douyin", "www."];

/// Normalize spacing and strip interference. Returns the cleaned content
/// and a human-readable change log (one entry per modification).
pub fn standardize(content: &str) -> (String, Vec<String>) {
    let mut changes = Vec::new();
    let mut out_lines = Vec::new();

    for (i, line) in content.split('\n').enumerate() {
        let line_no = i + 1;
        let mut line = line.to_string();

        if QUESTION_SPACING_RE.is_match(&line) && !ANSWER_SPACING_RE.is_match(&line) {
            line = QUESTION_SPACING_RE.replace(&line, "$1. $2").into_owned();
            changes.push(format!("line {line_no}: spaced question number"));
        }

        if OPTION_SPACING_RE.is_match(&line) {
            line = OPTION_SPACING_RE.replace(&line, "$1. $2").into_owned();
            changes.push(format!("line {line_no}: spaced option letter"));
        }

        if ANSWER_SPACING_RE.is_match(&line) {
            line = ANSWER_SPACING_RE.replace(&line, "$1. 【").into_owned();
            changes.push(format!("line {line_no}: spaced answer marker"));
        }

        let trimmed = line.trim().to_string();
        if BARE_NUMBER_RE.is_match(&trimmed) {
            // Stray page number from the scan footer.
            changes.push(format!("line {line_no}: dropped bare page number '{trimmed}'"));
            continue;
        }

        let mut skip = false;
        for pattern in INTERFERENCE_PATTERNS {
            if !line.contains(pattern) {
                continue;
            }
            if trimmed == pattern {
                changes.push(format!("line {line_no}: dropped interference '{trimmed}'"));
                skip = true;
                break;
            }
            line = line.replace(pattern, "");
            changes.push(format!("line {line_no}: removed interference '{pattern}'"));
        }
        if skip {
            continue;
        }

        out_lines.push(line);
    }

    (out_lines.join("\n"), changes)
}

/// Collapse runs of three or more blank lines down to one blank line.
pub fn collapse_blank_lines(content: &str) -> String {
    static EXCESS_BLANKS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("valid regex"));
    EXCESS_BLANKS_RE.replace_all(content, "\n\n").into_owned()
}
