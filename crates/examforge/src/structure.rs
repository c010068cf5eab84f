//! Exam structure extraction.
//!
//! A linear scan over reconciled pages in page-number order. A page whose
//! text matches the exam header pattern (`YYYY年 M月 … 公共营养师/统考/真题`)
//! closes the currently open exam and opens a new one keyed by
//! `"{year}-{zero-padded month}"`. Section headers (`CJK numeral + 、/. +
//! question-type keyword`) open sections inside the current exam. Every page
//! seen while an exam is open is appended (deduplicated) to the exam and to
//! the open section. Output is in discovery order; chronological sorting is
//! the renderer's job.

use crate::types::{Exam, ExamSection, PageContent, SectionType};
use once_cell::sync::Lazy;
use regex::Regex;

static EXAM_HEADER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(20\d{2})\s*年\s*(\d{1,2})\s*月.*?(公共营养师|统考|真题)").expect("valid regex"));

static SECTION_HEADER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[一二三四五六七八九十]+[、.]\s*(单项选择题|多项选择题|判断题|简答题|案例)").expect("valid regex")
});

fn push_unique(pages: &mut Vec<u32>, page_num: u32) {
    if !pages.contains(&page_num) {
        pages.push(page_num);
    }
}

/// Segment the reconciled page stream into exams and their sections.
pub fn extract_exam_structure(pages: &[PageContent]) -> Vec<Exam> {
    let mut exams: Vec<Exam> = Vec::new();
    let mut current_exam: Option<Exam> = None;
    let mut current_section: Option<ExamSection> = None;

    let close_exam = |exam: Option<Exam>, section: Option<ExamSection>, exams: &mut Vec<Exam>| {
        if let Some(mut exam) = exam {
            if let Some(section) = section {
                exam.sections.push(section);
            }
            exams.push(exam);
        }
    };

    for page in pages {
        let text = if page.text.is_empty() {
            page.markdown.clone()
        } else {
            page.text.join("\n")
        };

        if let Some(caps) = EXAM_HEADER_RE.captures(&text) {
            close_exam(current_exam.take(), current_section.take(), &mut exams);

            let year = &caps[1];
            let month: u32 = caps[2].parse().unwrap_or(0);
            current_exam = Some(Exam {
                exam_id: format!("{year}-{month:02}"),
                title: caps[0].to_string(),
                start_page: page.page_num,
                sections: Vec::new(),
                pages: vec![page.page_num],
            });
            continue;
        }

        if let Some(exam) = current_exam.as_mut() {
            if let Some(caps) = SECTION_HEADER_RE.captures(&text)
                && let Some(section_type) = SectionType::from_header_keyword(&caps[1])
            {
                if let Some(done) = current_section.take() {
                    exam.sections.push(done);
                }
                current_section = Some(ExamSection {
                    section_type,
                    start_page: page.page_num,
                    pages: vec![page.page_num],
                });
            }

            push_unique(&mut exam.pages, page.page_num);
            if let Some(section) = current_section.as_mut() {
                push_unique(&mut section.pages, page.page_num);
            }
        }
    }

    close_exam(current_exam.take(), current_section.take(), &mut exams);
    exams
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(page_num: u32, text: &[&str]) -> PageContent {
        PageContent {
            page_num,
            is_table_page: false,
            source: "ocr_normal".to_string(),
            text: text.iter().map(|s| s.to_string()).collect(),
            markdown: text.join("\n"),
        }
    }

    #[test]
    fn test_two_headers_split_the_stream() {
        let mut pages = vec![page(1, &["2024年5月公共营养师三级统考真题"])];
        for n in 2..=9 {
            pages.push(page(n, &["1. 普通题目内容"]));
        }
        pages.push(page(10, &["2024年5月公共营养师三级统考真题答案解析"]));
        pages.push(page(11, &["1.【答案】B"]));

        let exams = extract_exam_structure(&pages);
        assert_eq!(exams.len(), 2);
        assert_eq!(exams[0].exam_id, "2024-05");
        assert_eq!(exams[1].exam_id, "2024-05");
        assert_eq!(exams[0].pages, (1..=9).collect::<Vec<u32>>());
        assert_eq!(exams[1].pages, vec![10, 11]);
        assert_eq!(exams[1].start_page, 10);
    }

    #[test]
    fn test_month_is_zero_padded() {
        let exams = extract_exam_structure(&[page(1, &["2023年11月公共营养师统考"])]);
        assert_eq!(exams[0].exam_id, "2023-11");
        let exams = extract_exam_structure(&[page(1, &["2023年 6 月统考真题"])]);
        assert_eq!(exams[0].exam_id, "2023-06");
    }

    #[test]
    fn test_sections_accumulate_pages() {
        let pages = vec![
            page(1, &["2024年5月公共营养师三级统考真题"]),
            page(2, &["一、单项选择题", "1. 题目"]),
            page(3, &["21. 更多单选题"]),
            page(4, &["二、多项选择题", "61. 题目"]),
            page(5, &["65. 更多多选题"]),
        ];
        let exams = extract_exam_structure(&pages);
        assert_eq!(exams.len(), 1);
        let sections = &exams[0].sections;
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].section_type, SectionType::SingleChoice);
        assert_eq!(sections[0].pages, vec![2, 3]);
        assert_eq!(sections[1].section_type, SectionType::MultiChoice);
        assert_eq!(sections[1].pages, vec![4, 5]);
    }

    #[test]
    fn test_pages_before_first_header_are_unassigned() {
        let pages = vec![
            page(1, &["目录页，没有任何考试标题"]),
            page(2, &["2022年6月真题"]),
            page(3, &["1. 题目"]),
        ];
        let exams = extract_exam_structure(&pages);
        assert_eq!(exams.len(), 1);
        assert_eq!(exams[0].pages, vec![2, 3]);
    }

    #[test]
    fn test_section_outside_exam_is_ignored() {
        let exams = extract_exam_structure(&[page(1, &["一、单项选择题"]) ]);
        assert!(exams.is_empty());
    }

    #[test]
    fn test_empty_input() {
        assert!(extract_exam_structure(&[]).is_empty());
    }

    #[test]
    fn test_markdown_fallback_when_text_lines_missing() {
        let mut p = page(1, &[]);
        p.markdown = "2021年6月公共营养师真题".to_string();
        let exams = extract_exam_structure(&[p]);
        assert_eq!(exams.len(), 1);
        assert_eq!(exams[0].exam_id, "2021-06");
    }
}
