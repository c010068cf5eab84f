//! Production OCR client for the Volcengine visual API.
//!
//! Wraps the two provider endpoints behind [`OcrClient`]: `OCRNormal`
//! (plain line recognition) and `OCRPdf` (structured document parse).
//! Transient failures (timeouts, network errors, unparseable bodies) retry
//! with linearly increasing delay; the provider's file size/format codes are
//! permanent and short-circuit. Exhausted retries yield a failure outcome,
//! never an `Err` — one bad page must not abort its phase.

use crate::config::{ApiEndpoint, Credentials, PipelineConfig};
use crate::error::{ExamforgeError, Result};
use crate::ocr::signing::{encode_form, sign_request};
use crate::ocr::{OcrClient, PlainOcr, StructuredOcr, TableMode, TextBlock};
use async_trait::async_trait;
use base64::Engine;
use chrono::Utc;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// Provider status code signalling success.
const CODE_OK: i64 = 10000;
/// File size / file format errors. Retrying cannot help.
const PERMANENT_CODES: [i64; 2] = [50205, 50207];

pub struct VolcOcrClient {
    http: reqwest::Client,
    api: ApiEndpoint,
    credentials: Credentials,
    max_retries: u32,
    retry_delay: Duration,
}

impl VolcOcrClient {
    pub fn new(config: &PipelineConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ExamforgeError::ocr_with_source("failed to build HTTP client", e))?;

        Ok(Self {
            http,
            api: config.api.clone(),
            credentials: config.credentials.clone(),
            max_retries: config.max_retries.max(1),
            retry_delay: config.retry_delay(),
        })
    }

    /// One signed POST with the provider's retry policy.
    ///
    /// Returns the final response JSON; after exhausted retries a synthetic
    /// `{"code": -1, "message": ...}` document carrying the last error.
    async fn call_api(&self, action: &str, version: &str, body_params: &[(&str, &str)]) -> Value {
        let body = encode_form(body_params);
        let mut last_error = String::new();

        for attempt in 1..=self.max_retries {
            let signed = sign_request(&self.api, &self.credentials, action, version, &body, Utc::now());
            let url = format!("https://{}/?{}", self.api.host, signed.query_string);

            let response = self
                .http
                .post(&url)
                .header("Content-Type", "application/x-www-form-urlencoded")
                .header("Host", &self.api.host)
                .header("X-Date", &signed.x_date)
                .header("Authorization", &signed.authorization)
                .body(body.clone())
                .send()
                .await;

            match response {
                Ok(resp) => match resp.text().await {
                    Ok(text) => match serde_json::from_str::<Value>(&text) {
                        Ok(value) => {
                            let code = response_code(&value);
                            if code == Some(CODE_OK) {
                                return value;
                            }
                            if let Some(c) = code
                                && is_permanent_code(c)
                            {
                                debug!(action, code = c, "permanent provider error, not retrying");
                                return value;
                            }
                            last_error = format!(
                                "{}: {}",
                                code.map_or_else(|| "?".to_string(), |c| c.to_string()),
                                response_message(&value)
                            );
                        }
                        Err(_) => last_error = "failed to parse response body".to_string(),
                    },
                    Err(e) => last_error = format!("failed to read response: {e}"),
                },
                Err(e) if e.is_timeout() => last_error = "request timed out".to_string(),
                Err(e) => last_error = format!("request error: {e}"),
            }

            if attempt < self.max_retries {
                let delay = self.retry_delay * attempt;
                warn!(action, attempt, error = %last_error, "OCR call failed, retrying");
                tokio::time::sleep(delay).await;
            }
        }

        serde_json::json!({
            "code": -1,
            "message": format!("failed after {} attempts: {}", self.max_retries, last_error),
        })
    }
}

/// Retrying cannot fix these; the response is returned as-is.
fn is_permanent_code(code: i64) -> bool {
    PERMANENT_CODES.contains(&code)
}

fn response_code(value: &Value) -> Option<i64> {
    value.get("code").and_then(Value::as_i64)
}

fn response_message(value: &Value) -> String {
    value
        .pointer("/ResponseMetadata/Error/Message")
        .or_else(|| value.get("message"))
        .and_then(Value::as_str)
        .unwrap_or("unknown error")
        .to_string()
}

fn string_array(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn number_array(value: Option<&Value>) -> Vec<f64> {
    value
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_f64).collect())
        .unwrap_or_default()
}

/// Pull labeled text blocks out of the structured response's embedded
/// `detail` payload. Any malformation degrades to an empty block list.
fn parse_detail_blocks(data: &Value) -> Vec<TextBlock> {
    let detail = match data.get("detail") {
        Some(Value::String(s)) if !s.is_empty() => match serde_json::from_str::<Value>(s) {
            Ok(parsed) => parsed,
            Err(_) => return Vec::new(),
        },
        Some(v @ Value::Array(_)) => v.clone(),
        _ => return Vec::new(),
    };

    detail
        .get(0)
        .and_then(|first| first.get("textblocks"))
        .and_then(Value::as_array)
        .map(|blocks| {
            blocks
                .iter()
                .map(|block| TextBlock {
                    label: block.get("label").and_then(Value::as_str).unwrap_or_default().to_string(),
                    content: block
                        .get("text")
                        .or_else(|| block.get("content"))
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                })
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl OcrClient for VolcOcrClient {
    async fn recognize_plain(&self, image: &[u8]) -> Result<PlainOcr> {
        let image_base64 = base64::engine::general_purpose::STANDARD.encode(image);
        let result = self
            .call_api(
                &self.api.plain_action,
                &self.api.plain_version,
                &[("image_base64", &image_base64)],
            )
            .await;

        if response_code(&result) == Some(CODE_OK) {
            let data = result.get("data").cloned().unwrap_or(Value::Null);
            Ok(PlainOcr {
                success: true,
                line_texts: string_array(data.get("line_texts")),
                line_probs: number_array(data.get("line_probs")),
                error: None,
            })
        } else {
            Ok(PlainOcr::failure(response_message(&result)))
        }
    }

    async fn recognize_structured(&self, image: &[u8], table_mode: TableMode) -> Result<StructuredOcr> {
        let image_base64 = base64::engine::general_purpose::STANDARD.encode(image);
        let result = self
            .call_api(
                &self.api.structured_action,
                &self.api.structured_version,
                &[
                    ("image_base64", &image_base64),
                    ("version", "v3"),
                    ("file_type", "image"),
                    ("table_mode", table_mode.as_str()),
                    ("filter_header", "true"),
                ],
            )
            .await;

        if response_code(&result) == Some(CODE_OK) {
            let data = result.get("data").cloned().unwrap_or(Value::Null);
            let blocks = parse_detail_blocks(&data);
            let has_table = blocks.iter().any(|b| b.label == "table");
            Ok(StructuredOcr {
                success: true,
                markdown: data
                    .get("markdown")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                blocks,
                has_table,
                error: None,
            })
        } else {
            Ok(StructuredOcr::failure(response_message(&result)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permanent_codes_short_circuit() {
        assert!(is_permanent_code(50205));
        assert!(is_permanent_code(50207));
        assert!(!is_permanent_code(CODE_OK));
        assert!(!is_permanent_code(50400));
        assert!(!is_permanent_code(-1));
    }

    #[test]
    fn test_response_code_extraction() {
        let ok = serde_json::json!({"code": 10000, "data": {}});
        assert_eq!(response_code(&ok), Some(10000));
        let missing = serde_json::json!({"data": {}});
        assert_eq!(response_code(&missing), None);
    }

    #[test]
    fn test_response_message_prefers_metadata_error() {
        let value = serde_json::json!({
            "code": 50400,
            "message": "outer",
            "ResponseMetadata": {"Error": {"Code": 50400, "Message": "inner"}},
        });
        assert_eq!(response_message(&value), "inner");
        let plain = serde_json::json!({"code": -1, "message": "outer"});
        assert_eq!(response_message(&plain), "outer");
    }

    #[test]
    fn test_parse_detail_blocks_from_embedded_string() {
        let data = serde_json::json!({
            "detail": "[{\"textblocks\":[{\"label\":\"table\",\"text\":\"|a|b|\"},{\"label\":\"text\",\"text\":\"hello\"}]}]"
        });
        let blocks = parse_detail_blocks(&data);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].label, "table");
        assert_eq!(blocks[1].content, "hello");
    }

    #[test]
    fn test_parse_detail_blocks_degrades_on_malformed_json() {
        let data = serde_json::json!({"detail": "{not json"});
        assert!(parse_detail_blocks(&data).is_empty());
        let empty = serde_json::json!({"detail": ""});
        assert!(parse_detail_blocks(&empty).is_empty());
        let missing = serde_json::json!({});
        assert!(parse_detail_blocks(&missing).is_empty());
    }
}
