//! Phase 4: reconciliation and corpus assembly.
//!
//! Joins the three upstream artifact sets — per-page plain OCR, the
//! detection report, and the per-group structured parses — into the final
//! corpus: reconciled page content, extracted exam structure, consistency
//! warnings, and the merged markdown document.

use super::{PipelineContext, load_group_results, load_page_records, read_json, write_json};
use crate::error::{ExamforgeError, Result};
use crate::reconcile::{reconcile_page, validate_table_content};
use crate::render::render_standard_markdown;
use crate::structure::extract_exam_structure;
use crate::types::{
    Corpus, CorpusMetadata, DetectionReport, PageContent, PhaseReport, ValidationWarning,
};
use chrono::Utc;
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Whether a flagged page was detected through an explicit table keyword,
/// as opposed to statistical signals or topic words alone. Only explicit
/// pages get structured markdown spliced in.
fn is_real_table_page(detection: &DetectionReport, page: u32, explicit: &[String]) -> bool {
    detection
        .detection_details
        .get(&page.to_string())
        .is_some_and(|d| d.table_keywords_found.iter().any(|kw| explicit.contains(kw)))
}

/// Run reconciliation and write the final corpus artifacts.
pub fn run_merge(ctx: &PipelineContext) -> Result<Corpus> {
    let records = load_page_records(&ctx.config)?;
    if records.is_empty() {
        return Err(ExamforgeError::validation(
            "no cached OCR results found; run the ingestion phase first",
        ));
    }
    let detection_path = ctx.config.paths.detection_file();
    if !detection_path.exists() {
        return Err(ExamforgeError::validation(
            "table detection results not found; run the detection phase first",
        ));
    }
    let detection: DetectionReport = read_json(&detection_path)?;
    let groups = load_group_results(&ctx.config)?;

    // Page -> merged structured markdown of the group it belongs to.
    let mut group_markdown: BTreeMap<u32, String> = BTreeMap::new();
    for group in &groups {
        if !group.success {
            continue;
        }
        for &page in &group.pages {
            group_markdown.insert(page, group.merged_markdown.clone());
        }
    }

    let explicit = &ctx.config.detector.explicit_table_keywords;
    let mut pages: Vec<PageContent> = Vec::with_capacity(records.len());
    let mut warnings: Vec<ValidationWarning> = Vec::new();
    let mut real_table_pages = 0usize;

    for (&page_num, record) in &records {
        if !record.success {
            warnings.push(ValidationWarning {
                page: page_num,
                warning: format!(
                    "page OCR failed: {}",
                    record.error.as_deref().unwrap_or("unknown error")
                ),
                consistency_score: None,
            });
        }

        let is_table_page = is_real_table_page(&detection, page_num, explicit);
        if is_table_page {
            real_table_pages += 1;
        }
        let table_markdown = if is_table_page {
            group_markdown.get(&page_num).map(String::as_str)
        } else {
            None
        };

        if let Some(markdown) = table_markdown {
            let ocr_text = record.line_texts.join("\n");
            let consistency = validate_table_content(&ocr_text, markdown);
            if !consistency.is_consistent {
                warn!(
                    page = page_num,
                    score = consistency.consistency_score,
                    "table content disagrees with plain OCR"
                );
                warnings.push(ValidationWarning {
                    page: page_num,
                    warning: format!(
                        "table markdown and plain OCR disagree (numbers {:.2}, words {:.2})",
                        consistency.number_match_ratio, consistency.word_match_ratio
                    ),
                    consistency_score: Some(consistency.consistency_score),
                });
            }
        }

        pages.push(reconcile_page(
            page_num,
            &record.line_texts,
            table_markdown,
            is_table_page,
            &ctx.config.reconciler,
        ));
    }

    let success_pages = records.values().filter(|r| r.success).count();
    let exams = extract_exam_structure(&pages);
    info!(
        pages = pages.len(),
        exams = exams.len(),
        table_pages = real_table_pages,
        warnings = warnings.len(),
        "corpus assembled"
    );

    let corpus = Corpus {
        metadata: CorpusMetadata {
            source: ctx.config.paths.image_dir.display().to_string(),
            total_pages: pages.len(),
            table_pages: real_table_pages,
            detected_table_pages: detection.table_page_count,
            exam_count: exams.len(),
            created_at: Utc::now().to_rfc3339(),
            ocr_api: format!("{} + {}", ctx.config.api.plain_action, ctx.config.api.structured_action),
        },
        exams,
        pages,
        validation_warnings: warnings,
    };

    write_json(&ctx.config.paths.final_output_file(), &corpus)?;
    std::fs::write(
        ctx.config.paths.merged_markdown_file(),
        merged_markdown_document(&corpus),
    )?;

    ctx.write_report(&PhaseReport {
        phase: "phase4".to_string(),
        timestamp: corpus.metadata.created_at.clone(),
        total_items: corpus.metadata.total_pages,
        success_count: success_pages,
        fail_count: corpus.metadata.total_pages - success_pages,
        notes: corpus
            .validation_warnings
            .iter()
            .map(|w| format!("page {}: {}", w.page, w.warning))
            .collect(),
    })?;

    Ok(corpus)
}

/// Concatenate every page's reconciled markdown with page separators.
fn merged_markdown_document(corpus: &Corpus) -> String {
    let mut out = String::new();
    for page in &corpus.pages {
        out.push_str(&format!("<!-- ===== 第 {} 页 ===== -->\n", page.page_num));
        if page.is_table_page {
            out.push_str("[表格页]\n");
        }
        out.push_str(&page.markdown);
        out.push_str("\n\n");
    }
    out
}

/// Render the distribution markdown from the persisted corpus.
pub fn run_render(ctx: &PipelineContext) -> Result<()> {
    let corpus_path = ctx.config.paths.final_output_file();
    if !corpus_path.exists() {
        return Err(ExamforgeError::validation(
            "final corpus not found; run the merge phase first",
        ));
    }
    let corpus: Corpus = read_json(&corpus_path)?;
    let generated_at = Utc::now().format("%Y-%m-%d %H:%M").to_string();
    let markdown = render_standard_markdown(&corpus, &generated_at);
    let path = ctx.config.paths.standard_markdown_file();
    std::fs::write(&path, markdown)?;
    info!(path = %path.display(), "standard markdown written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TableDetection;

    fn detection_with(page: u32, keywords: &[&str]) -> DetectionReport {
        let mut details = BTreeMap::new();
        details.insert(
            page.to_string(),
            TableDetection {
                has_table: true,
                confidence: 0.7,
                reasons: vec![],
                table_keywords_found: keywords.iter().map(|s| s.to_string()).collect(),
            },
        );
        DetectionReport {
            timestamp: String::new(),
            total_pages: 1,
            table_pages: vec![page],
            table_page_count: 1,
            table_groups: vec![vec![page]],
            table_group_count: 1,
            detection_details: details,
        }
    }

    #[test]
    fn test_explicit_keyword_marks_real_table_page() {
        let explicit = vec!["见下表".to_string()];
        let report = detection_with(5, &["见下表"]);
        assert!(is_real_table_page(&report, 5, &explicit));
    }

    #[test]
    fn test_topic_keyword_alone_is_not_real() {
        let explicit = vec!["见下表".to_string()];
        let report = detection_with(5, &["膳食调查"]);
        assert!(!is_real_table_page(&report, 5, &explicit));
        // Pages never flagged at all are not real either.
        assert!(!is_real_table_page(&report, 6, &explicit));
    }
}
