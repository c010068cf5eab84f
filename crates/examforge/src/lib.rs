//! Examforge - Exam Booklet Digitization Pipeline
//!
//! Examforge turns scanned exam-booklet page images into a structured
//! question corpus. A remote OCR service provides two views of each page —
//! plain line text and a layout-aware structured parse — and the pipeline
//! reconciles them: table pages get their garbled plain-text residue
//! replaced with real markdown tables, exam papers and their question-type
//! sections are recovered from headers, and everything lands in a single
//! JSON corpus plus a distribution-ready markdown rendering.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use examforge::config::PipelineConfig;
//! use examforge::ocr::volc::VolcOcrClient;
//! use examforge::pipeline::{PipelineContext, detect, ingest, merge, tables};
//! use std::sync::Arc;
//!
//! # async fn run() -> examforge::Result<()> {
//! let config = PipelineConfig::from_toml_file("examforge.toml")?;
//! let client = Arc::new(VolcOcrClient::new(&config)?);
//! let ctx = PipelineContext::new(config, client)?;
//!
//! ingest::run_ingest(&ctx, Default::default()).await?;
//! detect::run_detection(&ctx)?;
//! tables::run_table_parse(&ctx).await?;
//! merge::run_merge(&ctx)?;
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - **Phases** (`pipeline`): ingest, detect, tables, merge — strictly
//!   sequential, each resumable from per-item cache files
//! - **OCR** (`ocr`): the [`ocr::OcrClient`] seam with a signed
//!   Volcengine implementation
//! - **Heuristics** (`detect`, `reconcile`, `structure`): pure functions
//!   over page lines, independently testable
//! - **Output** (`render`, `text`): markdown standardization and rendering

#![deny(unsafe_code)]

pub mod config;
pub mod detect;
pub mod error;
pub mod ocr;
pub mod pipeline;
pub mod reconcile;
pub mod render;
pub mod structure;
pub mod text;
pub mod types;

pub use error::{ExamforgeError, Result};
pub use types::*;

pub use detect::{detect_table, group_table_pages};
pub use reconcile::{reconcile_page, validate_table_content};
pub use render::render_standard_markdown;
pub use structure::extract_exam_structure;
