//! HTTP table-structure service recognizer.
//!
//! Talks to a PP-Structure style layout + table-recognition service (for
//! example PaddleOCR hubserving's `structure_system` module). The request is
//!
//! ```json
//! {"images": ["<base64 png>"], "lang": "en"}
//! ```
//!
//! and the response carries one record list per submitted image:
//!
//! ```json
//! {"status": "000", "msg": "", "results": [[
//!   {"type": "table", "bbox": [x0, y0, x1, y1], "res": {"html": "<table>..."}},
//!   {"type": "text",  "bbox": [...], "res": [{"text": "...", "confidence": 0.98}]}
//! ]]}
//! ```
//!
//! Only a table record whose `res` is an object carries markup; for every
//! other record `res` is ignored.

use crate::config::ExtractionConfig;
use crate::error::{RecognizeError, TabexError};
use crate::pipeline::encode::encode_base64_png;
use crate::pipeline::recognize::{retry_with_backoff, Region, RegionKind, TableRecognizer};
use async_trait::async_trait;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::debug;

#[derive(Debug, Serialize)]
struct ServiceRequest<'a> {
    images: Vec<String>,
    lang: &'a str,
}

#[derive(Debug, Deserialize)]
struct ServiceResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    results: Vec<Vec<ServiceRecord>>,
}

#[derive(Debug, Deserialize)]
struct ServiceRecord {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    bbox: Option<Vec<f32>>,
    #[serde(default)]
    score: Option<f32>,
    #[serde(default)]
    res: serde_json::Value,
}

impl ServiceRecord {
    fn into_region(self) -> Region {
        let mut region = Region::new(RegionKind::from(self.kind.as_str()));
        if region.kind == RegionKind::Table {
            region.markup = self
                .res
                .as_object()
                .and_then(|res| res.get("html"))
                .and_then(|html| html.as_str())
                .map(str::to_string);
        }
        if let Some([x0, y0, x1, y1]) = self.bbox.as_deref() {
            region = region.with_bbox([*x0, *y0, *x1, *y1]);
        }
        if let Some(score) = self.score {
            region = region.with_score(score);
        }
        region
    }
}

/// Table recognizer backed by a remote structure-recognition service.
pub struct StructureServiceRecognizer {
    client: reqwest::Client,
    url: String,
    name: String,
    max_image_pixels: u32,
    max_retries: u32,
    retry_backoff_ms: u64,
}

impl StructureServiceRecognizer {
    pub fn new(url: impl Into<String>, config: &ExtractionConfig) -> Result<Self, TabexError> {
        let url = url.into();
        let client = reqwest::Client::builder().build().map_err(|e| {
            TabexError::RecognizerNotConfigured {
                backend: "structure-service".to_string(),
                hint: format!("Could not create HTTP client: {}", e),
            }
        })?;
        Ok(Self {
            client,
            name: format!("structure-service:{}", url),
            url,
            max_image_pixels: config.max_image_pixels,
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
        })
    }

    async fn post(&self, body: &ServiceRequest<'_>) -> Result<Vec<Region>, RecognizeError> {
        let response = self
            .client
            .post(&self.url)
            .json(body)
            .send()
            .await
            .map_err(|e| RecognizeError::new(format!("request failed: {}", e)))?;

        let status = response.status();
        if status.is_client_error() {
            return Err(RecognizeError::permanent(format!("service returned HTTP {}", status)));
        }
        if !status.is_success() {
            return Err(RecognizeError::new(format!("service returned HTTP {}", status)));
        }

        let text = response
            .text()
            .await
            .map_err(|e| RecognizeError::new(format!("could not read response: {}", e)))?;
        parse_response(&text)
    }
}

#[async_trait]
impl TableRecognizer for StructureServiceRecognizer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn recognize(
        &self,
        image: &DynamicImage,
        lang: &str,
    ) -> Result<Vec<Region>, RecognizeError> {
        let b64 = encode_base64_png(image, self.max_image_pixels)
            .map_err(|e| RecognizeError::permanent(format!("Image encoding failed: {}", e)))?;
        let body = ServiceRequest {
            images: vec![b64],
            lang,
        };
        let body = &body;

        let start = Instant::now();
        let regions = retry_with_backoff(&self.name, self.max_retries, self.retry_backoff_ms, || {
            self.post(body)
        })
        .await?;

        debug!(
            "{}: {} region(s) in {:?}",
            self.name,
            regions.len(),
            start.elapsed()
        );
        Ok(regions)
    }
}

/// Parse a service response body into regions of the first image.
fn parse_response(body: &str) -> Result<Vec<Region>, RecognizeError> {
    let response: ServiceResponse = serde_json::from_str(body)
        .map_err(|e| RecognizeError::permanent(format!("malformed service response: {}", e)))?;

    if let Some(status) = response.status.as_deref() {
        if status != "000" && status != "0" {
            return Err(RecognizeError::permanent(format!(
                "service status {}: {}",
                status,
                response.msg.unwrap_or_default()
            )));
        }
    }

    Ok(response
        .results
        .into_iter()
        .next()
        .unwrap_or_default()
        .into_iter()
        .map(ServiceRecord::into_region)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[test]
    fn parses_table_and_text_records() {
        let body = r#"{"status":"000","msg":"","results":[[
            {"type":"Table","bbox":[1,2,30,40],"res":{"html":"<table><tr><td>1</td></tr></table>"}},
            {"type":"text","bbox":[0,0,5,5],"res":[{"text":"hello","confidence":0.9}]}
        ]]}"#;
        let regions = parse_response(body).unwrap();
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].kind, RegionKind::Table);
        assert_eq!(
            regions[0].table_markup(),
            Some("<table><tr><td>1</td></tr></table>")
        );
        assert_eq!(regions[0].bbox, Some([1.0, 2.0, 30.0, 40.0]));
        assert_eq!(regions[1].kind, RegionKind::Text);
        assert_eq!(regions[1].markup, None);
    }

    #[test]
    fn table_without_html_has_no_markup() {
        let body = r#"{"results":[[{"type":"table","res":[]}]]}"#;
        let regions = parse_response(body).unwrap();
        assert_eq!(regions[0].kind, RegionKind::Table);
        assert_eq!(regions[0].table_markup(), None);
    }

    #[test]
    fn empty_results_is_no_regions() {
        assert!(parse_response(r#"{"status":"000","results":[]}"#)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn error_status_is_reported() {
        let err = parse_response(r#"{"status":"101","msg":"bad image","results":[]}"#).unwrap_err();
        assert!(err.message.contains("bad image"), "got {}", err.message);
        assert!(!err.retryable);
    }

    #[test]
    fn garbage_body_is_an_error() {
        assert!(parse_response("<html>502</html>").is_err());
    }

    #[tokio::test]
    async fn unreachable_service_fails() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/predict/structure_system", listener.local_addr().unwrap());
        drop(listener);

        let config = ExtractionConfig::builder()
            .max_retries(0)
            .build()
            .unwrap();
        let recognizer = StructureServiceRecognizer::new(url, &config).unwrap();
        let img = DynamicImage::new_rgb8(8, 8);
        let err = recognizer.recognize(&img, "en").await.unwrap_err();
        assert!(err.message.contains("request failed"), "got {}", err.message);
    }

    /// Serve `body` as JSON to every request and count the requests.
    async fn stub_service(body: &'static str) -> (String, Arc<AtomicUsize>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/predict/structure_system", listener.local_addr().unwrap());
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                let mut request = Vec::new();
                let mut chunk = [0u8; 4096];
                while !request_complete(&request) {
                    match socket.read(&mut chunk).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => request.extend_from_slice(&chunk[..n]),
                    }
                }
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        (url, calls)
    }

    fn request_complete(request: &[u8]) -> bool {
        let Some(head_end) = request.windows(4).position(|w| w == b"\r\n\r\n") else {
            return false;
        };
        let head = String::from_utf8_lossy(&request[..head_end]).to_ascii_lowercase();
        let body_len = head
            .lines()
            .find_map(|l| l.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(0);
        request.len() >= head_end + 4 + body_len
    }

    #[tokio::test]
    async fn model_error_is_one_call_with_default_config() {
        let (url, calls) = stub_service(r#"{"status":"101","msg":"bad image","results":[]}"#).await;
        let recognizer =
            StructureServiceRecognizer::new(url, &ExtractionConfig::default()).unwrap();

        let err = recognizer
            .recognize(&DynamicImage::new_rgb8(8, 8), "en")
            .await
            .unwrap_err();

        assert!(err.message.contains("bad image"), "got {}", err.message);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn model_error_is_not_retried_even_when_retries_are_enabled() {
        let (url, calls) = stub_service(r#"{"status":"101","msg":"bad image","results":[]}"#).await;
        let config = ExtractionConfig::builder()
            .max_retries(3)
            .retry_backoff_ms(1)
            .build()
            .unwrap();
        let recognizer = StructureServiceRecognizer::new(url, &config).unwrap();

        assert!(recognizer
            .recognize(&DynamicImage::new_rgb8(8, 8), "en")
            .await
            .is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn table_reply_becomes_regions() {
        let (url, calls) = stub_service(
            r#"{"status":"000","msg":"","results":[[{"type":"table","res":{"html":"<table><tr><td>1</td></tr></table>"}}]]}"#,
        )
        .await;
        let recognizer =
            StructureServiceRecognizer::new(url, &ExtractionConfig::default()).unwrap();

        let regions = recognizer
            .recognize(&DynamicImage::new_rgb8(8, 8), "en")
            .await
            .unwrap();

        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].kind, RegionKind::Table);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
