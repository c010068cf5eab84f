//! End-to-end pipeline tests with a mock OCR client.

use async_trait::async_trait;
use examforge::config::{PipelineConfig, PipelinePaths};
use examforge::error::{ExamforgeError, Result};
use examforge::ocr::{OcrClient, PlainOcr, StructuredOcr, TableMode};
use examforge::pipeline::{PipelineContext, detect, ingest, merge, tables};
use examforge::types::Corpus;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

/// Scripted OCR client. Images carry their page number as UTF-8 content so
/// the mock can look up the canned response.
struct MockOcr {
    plain: BTreeMap<u32, Vec<String>>,
    structured: BTreeMap<u32, String>,
    plain_calls: AtomicUsize,
    structured_calls: AtomicUsize,
}

impl MockOcr {
    fn page_of(image: &[u8]) -> Result<u32> {
        std::str::from_utf8(image)
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .ok_or_else(|| ExamforgeError::validation("mock got an unknown image"))
    }
}

#[async_trait]
impl OcrClient for MockOcr {
    async fn recognize_plain(&self, image: &[u8]) -> Result<PlainOcr> {
        self.plain_calls.fetch_add(1, Ordering::SeqCst);
        let page = Self::page_of(image)?;
        match self.plain.get(&page) {
            Some(lines) => Ok(PlainOcr {
                success: true,
                line_probs: vec![0.99; lines.len()],
                line_texts: lines.clone(),
                error: None,
            }),
            None => Ok(PlainOcr::failure("no such page")),
        }
    }

    async fn recognize_structured(&self, image: &[u8], _table_mode: TableMode) -> Result<StructuredOcr> {
        self.structured_calls.fetch_add(1, Ordering::SeqCst);
        let page = Self::page_of(image)?;
        match self.structured.get(&page) {
            Some(markdown) => Ok(StructuredOcr {
                success: true,
                markdown: markdown.clone(),
                blocks: Vec::new(),
                has_table: true,
                error: None,
            }),
            None => Ok(StructuredOcr::failure("no such page")),
        }
    }
}

fn lines(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Three-page booklet: a header page, an explicit table page with debris,
/// and a plain continuation page.
fn mock_client() -> MockOcr {
    let mut plain = BTreeMap::new();
    plain.insert(
        1,
        lines(&[
            "2024年5月公共营养师二级真题",
            "一、单项选择题（每题只有一个正确选项）",
            "1. 下列属于宏量营养素的是哪一种物质",
            "A. 维生素与矿物质等微量营养成分",
            "B. 蛋白质、脂肪和碳水化合物等成分",
        ]),
    );
    plain.insert(
        2,
        lines(&[
            "5. 根据某社区的膳食调查记录,见下表",
            "食物名称",
            "大米",
            "150",
            "次/日",
            "6. 下列关于膳食指南的说法正确的是",
            "A. 正确说法",
        ]),
    );
    plain.insert(3, lines(&["7. 普通题目一条", "A. 甲", "B. 乙"]));

    let mut structured = BTreeMap::new();
    structured.insert(
        2,
        "| 食物名称 | 数量 | 频率 |\n|------|------|------|\n| 大米 | 150 | 次/日 |".to_string(),
    );

    MockOcr {
        plain,
        structured,
        plain_calls: AtomicUsize::new(0),
        structured_calls: AtomicUsize::new(0),
    }
}

fn test_config(dir: &TempDir) -> PipelineConfig {
    let image_dir = dir.path().join("images");
    std::fs::create_dir_all(&image_dir).unwrap();
    for page in 1..=3u32 {
        std::fs::write(image_dir.join(format!("scan_{page}.png")), page.to_string()).unwrap();
    }
    PipelineConfig {
        paths: PipelinePaths {
            image_dir,
            output_dir: dir.path().join("output"),
        },
        max_qps: 0.0, // no pacing in tests
        ..PipelineConfig::default()
    }
}

async fn run_all(ctx: &PipelineContext) -> Corpus {
    ingest::run_ingest(ctx, Default::default()).await.unwrap();
    detect::run_detection(ctx).unwrap();
    tables::run_table_parse(ctx).await.unwrap();
    merge::run_merge(ctx).unwrap()
}

#[tokio::test]
async fn full_pipeline_produces_corpus() {
    let dir = tempfile::tempdir().unwrap();
    let client = Arc::new(mock_client());
    let ctx = PipelineContext::new(test_config(&dir), client.clone()).unwrap();

    let corpus = run_all(&ctx).await;

    assert_eq!(corpus.metadata.total_pages, 3);
    assert_eq!(corpus.metadata.table_pages, 1);
    assert_eq!(client.plain_calls.load(Ordering::SeqCst), 3);
    assert_eq!(client.structured_calls.load(Ordering::SeqCst), 1);

    // Exam structure recovered from the header page.
    assert_eq!(corpus.metadata.exam_count, 1);
    assert_eq!(corpus.exams[0].exam_id, "2024-05");
    assert_eq!(corpus.exams[0].start_page, 1);

    // The table page got the structured markdown spliced in and its debris
    // lines suppressed; the next question survives.
    let page2 = corpus.pages.iter().find(|p| p.page_num == 2).unwrap();
    assert!(page2.is_table_page);
    assert_eq!(page2.source, "hybrid");
    assert!(page2.markdown.contains("| 食物名称 | 数量 | 频率 |"));
    assert!(page2.markdown.contains("6. 下列关于膳食指南的说法正确的是"));
    assert!(!page2.markdown.contains("\n150\n"));

    // Non-table pages are carried verbatim.
    let page3 = corpus.pages.iter().find(|p| p.page_num == 3).unwrap();
    assert!(!page3.is_table_page);
    assert_eq!(page3.source, "ocr_normal");
    assert_eq!(page3.markdown, "7. 普通题目一条\nA. 甲\nB. 乙");

    // All final artifacts exist on disk.
    assert!(ctx.config.paths.final_output_file().exists());
    assert!(ctx.config.paths.merged_markdown_file().exists());
    assert!(ctx.config.paths.detection_file().exists());
    assert!(ctx.config.paths.table_summary_file().exists());
}

#[tokio::test]
async fn second_run_issues_no_ocr_calls() {
    let dir = tempfile::tempdir().unwrap();
    let client = Arc::new(mock_client());
    let ctx = PipelineContext::new(test_config(&dir), client.clone()).unwrap();

    let first = run_all(&ctx).await;
    let plain_before = client.plain_calls.load(Ordering::SeqCst);
    let structured_before = client.structured_calls.load(Ordering::SeqCst);

    let second = run_all(&ctx).await;

    // Every phase resumed from its cache files.
    assert_eq!(client.plain_calls.load(Ordering::SeqCst), plain_before);
    assert_eq!(client.structured_calls.load(Ordering::SeqCst), structured_before);
    assert_eq!(second.metadata.total_pages, first.metadata.total_pages);
    assert_eq!(second.exams.len(), first.exams.len());
}

#[tokio::test]
async fn dry_run_calls_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let client = Arc::new(mock_client());
    let ctx = PipelineContext::new(test_config(&dir), client.clone()).unwrap();

    let options = ingest::IngestOptions {
        dry_run: true,
        ..Default::default()
    };
    let report = ingest::run_ingest(&ctx, options).await.unwrap();

    assert_eq!(report.total_items, 3);
    assert_eq!(client.plain_calls.load(Ordering::SeqCst), 0);
    assert!(!ctx.config.paths.page_cache_file(1).exists());
}

#[tokio::test]
async fn page_range_limits_ingestion() {
    let dir = tempfile::tempdir().unwrap();
    let client = Arc::new(mock_client());
    let ctx = PipelineContext::new(test_config(&dir), client.clone()).unwrap();

    let options = ingest::IngestOptions {
        start_page: Some(2),
        end_page: Some(2),
        dry_run: false,
    };
    ingest::run_ingest(&ctx, options).await.unwrap();

    assert_eq!(client.plain_calls.load(Ordering::SeqCst), 1);
    assert!(!ctx.config.paths.page_cache_file(1).exists());
    assert!(ctx.config.paths.page_cache_file(2).exists());
    assert!(!ctx.config.paths.page_cache_file(3).exists());
}

#[tokio::test]
async fn table_parse_requires_detection_results() {
    let dir = tempfile::tempdir().unwrap();
    let client = Arc::new(mock_client());
    let ctx = PipelineContext::new(test_config(&dir), client).unwrap();

    ingest::run_ingest(&ctx, Default::default()).await.unwrap();
    let err = tables::run_table_parse(&ctx).await.unwrap_err();
    assert!(matches!(err, ExamforgeError::Validation { .. }));
}

#[tokio::test]
async fn merge_requires_upstream_phases() {
    let dir = tempfile::tempdir().unwrap();
    let client = Arc::new(mock_client());
    let ctx = PipelineContext::new(test_config(&dir), client).unwrap();

    let err = merge::run_merge(&ctx).unwrap_err();
    assert!(matches!(err, ExamforgeError::Validation { .. }));
}

#[tokio::test]
async fn failed_page_is_recorded_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let mut client = mock_client();
    client.plain.remove(&3); // page 3 now fails remotely
    let client = Arc::new(client);
    let ctx = PipelineContext::new(test_config(&dir), client).unwrap();

    let report = ingest::run_ingest(&ctx, Default::default()).await.unwrap();
    assert_eq!(report.success_count, 2);
    assert_eq!(report.fail_count, 1);

    // The failure is cached as data and surfaces as a corpus warning.
    detect::run_detection(&ctx).unwrap();
    tables::run_table_parse(&ctx).await.unwrap();
    let corpus = merge::run_merge(&ctx).unwrap();
    assert!(
        corpus
            .validation_warnings
            .iter()
            .any(|w| w.page == 3 && w.warning.contains("OCR failed"))
    );
}
