//! Standard markdown rendering of the final corpus.
//!
//! Consumes only the [`Corpus`] document: sorts exams chronologically
//! (newest first, answer-key documents after their exam), emits a linked
//! table of contents, and formats question pages into readable markdown
//! (bold question stems, bulleted options). Table pages pass through
//! verbatim since their markdown is already canonical.

use crate::text::{collapse_blank_lines, standardize};
use crate::types::{Corpus, PageContent, SectionType};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

static OPTION_LINE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([A-D])[.、:\s]+(.+)$").expect("valid regex"));
static QUESTION_LINE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+)[.、,\s]+(.+)$").expect("valid regex"));
static TOC_PAGE_REF_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"真题(答案)?\s*\d{2,3}").expect("valid regex"));
static SINGLE_CHOICE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[一二三四五六七八九十][、.]\s*单项选择题").expect("valid regex"));
static MULTI_CHOICE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[一二三四五六七八九十][、.]\s*多项选择题").expect("valid regex"));
static JUDGE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[一二三四五六七八九十][、.]\s*判断题").expect("valid regex"));

fn prefix_chars(text: &str, n: usize) -> String {
    text.chars().take(n).collect()
}

/// Table-of-contents pages carry no exam content and are skipped.
pub fn is_toc_page(text: &str) -> bool {
    if prefix_chars(text, 50).contains("目录") {
        return true;
    }
    TOC_PAGE_REF_RE.find_iter(text).count() > 5
}

/// Whether a document opens as an answer-key section.
pub fn is_answer_section(text: &str) -> bool {
    let head = prefix_chars(text, 150);
    head.contains("答案") || head.contains("解析")
}

/// Detect a section-type change on a page.
pub fn page_section_type(text: &str) -> Option<SectionType> {
    if SINGLE_CHOICE_RE.is_match(text) {
        return Some(SectionType::SingleChoice);
    }
    if MULTI_CHOICE_RE.is_match(text) {
        return Some(SectionType::MultiChoice);
    }
    if JUDGE_RE.is_match(text) {
        return Some(SectionType::Judge);
    }
    let head = prefix_chars(text, 100);
    if head.contains("技能") || head.contains("案例") {
        return Some(SectionType::Case);
    }
    None
}

/// Reflow a question page: bold stems, bulleted options, continuation lines
/// joined onto their question.
pub fn format_question_block(text: &str) -> String {
    let mut formatted: Vec<String> = Vec::new();
    let mut in_question = false;
    let mut buffer: Vec<String> = Vec::new();

    fn flush(buffer: &mut Vec<String>, formatted: &mut Vec<String>) {
        if !buffer.is_empty() {
            formatted.push(buffer.join(" "));
            buffer.clear();
        }
    }

    for raw in text.split('\n') {
        let line = raw.trim();
        if line.is_empty() {
            flush(&mut buffer, &mut formatted);
            formatted.push(String::new());
            continue;
        }

        if let Some(caps) = OPTION_LINE_RE.captures(line) {
            flush(&mut buffer, &mut formatted);
            formatted.push(format!("- **{}.** {}", &caps[1], &caps[2]));
            continue;
        }

        if let Some(caps) = QUESTION_LINE_RE.captures(line) {
            flush(&mut buffer, &mut formatted);
            formatted.push(String::new());
            formatted.push(format!("**{}. {}**", &caps[1], &caps[2]));
            in_question = true;
            continue;
        }

        if line.contains("【多选题】") || line.contains("【单选题】") {
            flush(&mut buffer, &mut formatted);
            formatted.push(String::new());
            formatted.push(format!("**{line}**"));
            continue;
        }

        let starts_like_option = line
            .chars()
            .next()
            .is_some_and(|c| matches!(c, 'A' | 'B' | 'C' | 'D' | '一' | '二' | '三'));
        if in_question && !starts_like_option {
            // Question stems wrap across OCR lines.
            buffer.push(line.to_string());
        } else {
            flush(&mut buffer, &mut formatted);
            formatted.push(line.to_string());
        }
    }

    flush(&mut buffer, &mut formatted);
    formatted.join("\n")
}

struct RenderedExam {
    year: String,
    month: u32,
    is_answer: bool,
    start_page: u32,
    end_page: u32,
    pages: Vec<u32>,
    title: String,
    anchor: String,
}

/// Render the corpus into one standard markdown document.
pub fn render_standard_markdown(corpus: &Corpus, generated_at: &str) -> String {
    let pages: BTreeMap<u32, &PageContent> = corpus.pages.iter().map(|p| (p.page_num, p)).collect();

    let mut exam_list: Vec<RenderedExam> = Vec::new();
    for exam in &corpus.exams {
        let first_page_content = pages
            .get(&exam.start_page)
            .map(|p| p.markdown.clone())
            .unwrap_or_default();
        if is_toc_page(&first_page_content) {
            continue;
        }

        let (year, month) = match exam.exam_id.split_once('-') {
            Some((y, m)) => (y.to_string(), m.parse::<u32>().unwrap_or(0)),
            None => (exam.exam_id.clone(), 0),
        };
        let is_answer = is_answer_section(&first_page_content);
        let end_page = exam.pages.last().copied().unwrap_or(exam.start_page);
        let suffix = if is_answer { "答案解析" } else { "统考真题" };
        let kind = if is_answer { "ans" } else { "exam" };

        exam_list.push(RenderedExam {
            anchor: format!("{}-{}", exam.exam_id, kind),
            title: format!("{year}年{month}月{suffix}"),
            year,
            month,
            is_answer,
            start_page: exam.start_page,
            end_page,
            pages: exam.pages.clone(),
        });
    }

    // Newest first; within a month the exam precedes its answer key.
    exam_list.sort_by(|a, b| (&b.year, b.month, a.is_answer).cmp(&(&a.year, a.month, b.is_answer)));

    let mut md = String::new();
    md.push_str("# 公共营养师三级历年真题及答案解析\n\n");
    md.push_str(&format!("> **生成时间**：{generated_at}  \n"));
    md.push_str(&format!("> **数据来源**：{}  \n", corpus.metadata.ocr_api));
    md.push_str(&format!("> **总页数**：{} 页  \n\n", corpus.metadata.total_pages));

    md.push_str("## 目录\n\n");
    md.push_str("| 序号 | 内容 | 页码范围 |\n");
    md.push_str("|:---:|:---|:---:|\n");
    for (i, exam) in exam_list.iter().enumerate() {
        md.push_str(&format!(
            "| {} | [{}](#{}) | 第{}-{}页 |\n",
            i + 1,
            exam.title,
            exam.anchor,
            exam.start_page,
            exam.end_page
        ));
    }
    md.push_str("\n---\n\n");

    for exam in &exam_list {
        let full_title = format!(
            "{}年{}月公共营养师三级{}",
            exam.year,
            exam.month,
            if exam.is_answer { "统考真题答案解析" } else { "统考真题" }
        );
        md.push_str(&format!("## {} {{#{}}}\n\n", full_title, exam.anchor));

        let mut current_section: Option<SectionType> = None;
        for page_num in &exam.pages {
            let Some(page) = pages.get(page_num) else { continue };
            let content = &page.markdown;
            if content.trim().is_empty() || is_toc_page(content) {
                continue;
            }

            if let Some(section) = page_section_type(content)
                && current_section != Some(section)
            {
                current_section = Some(section);
                md.push_str(&format!("\n### {}\n\n", section.display_name()));
            }

            if page.is_table_page {
                // Table markdown is already canonical; reflowing would
                // destroy the cell layout.
                md.push_str(content);
                md.push_str("\n\n");
            } else {
                let (cleaned, _) = standardize(content);
                md.push_str(&format_question_block(&cleaned));
                md.push('\n');
            }
        }
        md.push_str("\n---\n\n");
    }

    collapse_blank_lines(&md)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Corpus, CorpusMetadata, Exam};

    fn page(page_num: u32, markdown: &str, is_table: bool) -> PageContent {
        PageContent {
            page_num,
            is_table_page: is_table,
            source: "ocr_normal".to_string(),
            text: markdown.split('\n').map(str::to_string).collect(),
            markdown: markdown.to_string(),
        }
    }

    fn corpus(exams: Vec<Exam>, pages: Vec<PageContent>) -> Corpus {
        Corpus {
            metadata: CorpusMetadata {
                source: "test".to_string(),
                total_pages: pages.len(),
                table_pages: 0,
                detected_table_pages: 0,
                exam_count: exams.len(),
                created_at: "2026-01-01T00:00:00Z".to_string(),
                ocr_api: "volcengine".to_string(),
            },
            exams,
            pages,
            validation_warnings: Vec::new(),
        }
    }

    fn exam(exam_id: &str, start_page: u32, pages: Vec<u32>) -> Exam {
        Exam {
            exam_id: exam_id.to_string(),
            title: String::new(),
            start_page,
            sections: Vec::new(),
            pages,
        }
    }

    #[test]
    fn test_is_toc_page() {
        assert!(is_toc_page("目录\n2024年5月真题 21"));
        let many_refs = (21..=27).map(|n| format!("真题 {n}")).collect::<Vec<_>>().join("\n");
        assert!(is_toc_page(&many_refs));
        assert!(!is_toc_page("1. 普通题目"));
    }

    #[test]
    fn test_is_answer_section() {
        assert!(is_answer_section("2024年5月统考真题答案解析"));
        assert!(!is_answer_section("2024年5月统考真题"));
    }

    #[test]
    fn test_page_section_type() {
        assert_eq!(page_section_type("一、单项选择题"), Some(SectionType::SingleChoice));
        assert_eq!(page_section_type("三、判断题"), Some(SectionType::Judge));
        assert_eq!(page_section_type("技能考核部分"), Some(SectionType::Case));
        assert_eq!(page_section_type("普通文字"), None);
    }

    #[test]
    fn test_format_question_block() {
        let text = "21. 下列说法正确的是\nA. 甲\nB. 乙";
        let formatted = format_question_block(text);
        assert!(formatted.contains("**21. 下列说法正确的是**"));
        assert!(formatted.contains("- **A.** 甲"));
        assert!(formatted.contains("- **B.** 乙"));
    }

    #[test]
    fn test_format_question_block_joins_continuation() {
        let text = "21. 下列关于膳食调查\n说法正确的是\nA. 甲";
        let formatted = format_question_block(text);
        assert!(formatted.contains("**21. 下列关于膳食调查**"));
        assert!(formatted.contains("说法正确的是"));
        assert!(formatted.contains("- **A.** 甲"));
    }

    #[test]
    fn test_render_orders_exam_before_answers() {
        let c = corpus(
            vec![
                exam("2024-05", 10, vec![10]),
                exam("2024-05", 1, vec![1]),
                exam("2023-11", 20, vec![20]),
            ],
            vec![
                page(1, "2024年5月公共营养师三级统考真题\n1. 题目", false),
                page(10, "2024年5月统考真题答案解析\n1.【答案】B", false),
                page(20, "2023年11月公共营养师三级统考真题", false),
            ],
        );
        let md = render_standard_markdown(&c, "2026-01-01 00:00");
        let exam_pos = md.find("2024-05-exam").unwrap();
        let ans_pos = md.find("2024-05-ans").unwrap();
        let old_pos = md.find("2023-11-exam").unwrap();
        assert!(exam_pos < ans_pos);
        assert!(ans_pos < old_pos);
    }

    #[test]
    fn test_render_passes_table_pages_verbatim() {
        let table_md = "调查表见下表\n| 食物 | 数量 |\n|------|------|\n| 大米 | 150 |";
        let c = corpus(
            vec![exam("2024-05", 1, vec![1, 2])],
            vec![
                page(1, "2024年5月公共营养师三级统考真题", false),
                page(2, table_md, true),
            ],
        );
        let md = render_standard_markdown(&c, "2026-01-01 00:00");
        assert!(md.contains("| 食物 | 数量 |"));
    }

    #[test]
    fn test_render_skips_toc_start_exams() {
        let c = corpus(
            vec![exam("2024-05", 1, vec![1])],
            vec![page(1, "目录\n真题 21", false)],
        );
        let md = render_standard_markdown(&c, "2026-01-01 00:00");
        assert!(!md.contains("2024-05-exam"));
    }
}
