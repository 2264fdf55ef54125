//! Mistral OCR adapter.
//!
//! Three calls per document:
//!
//! 1. `POST /v1/files` (multipart, `purpose=ocr`) → file id
//! 2. `GET /v1/files/{id}/url` → short-lived signed URL
//! 3. `POST /v1/ocr` with the signed URL → one Markdown string per page,
//!    plus page images as base64 when requested
//!
//! Page Markdown is lowered with [`super::markdown::page_blocks`]. Mistral
//! image ids are only meaningful within their page, so payload keys are
//! qualified with the page index and the image blocks are rewritten to match.

use super::{http, markdown, ProviderAdapter, MISTRAL};
use crate::config::RecognitionOptions;
use crate::error::{AdapterError, OcrError};
use crate::raw::{BlockContent, BlockKind, RawDocument, RawImage, RawPage};
use async_trait::async_trait;
use base64::Engine;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::json;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_BASE_URL: &str = "https://api.mistral.ai";
pub const DEFAULT_MODEL: &str = "mistral-ocr-latest";

/// Connection settings for [`MistralAdapter`].
#[derive(Clone)]
pub struct MistralConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    /// Per-request network timeout.
    pub timeout: Duration,
}

impl MistralConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout: Duration::from_secs(120),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl fmt::Debug for MistralConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MistralConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .finish()
    }
}

// ── Wire types ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct UploadedFile {
    id: String,
}

#[derive(Debug, Deserialize)]
struct SignedUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OcrResponse {
    pages: Vec<OcrPage>,
}

#[derive(Debug, Deserialize)]
struct OcrPage {
    index: usize,
    #[serde(default)]
    markdown: String,
    #[serde(default)]
    images: Vec<OcrImage>,
    dimensions: Option<PageDimensions>,
}

#[derive(Debug, Deserialize)]
struct OcrImage {
    id: String,
    image_base64: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PageDimensions {
    width: f32,
    height: f32,
}

// ── Adapter ──────────────────────────────────────────────────────────────────

/// [`ProviderAdapter`] for the Mistral OCR API.
#[derive(Debug, Clone)]
pub struct MistralAdapter {
    config: MistralConfig,
    client: reqwest::Client,
}

impl MistralAdapter {
    pub fn new(config: MistralConfig) -> Result<Self, OcrError> {
        if config.api_key.trim().is_empty() {
            return Err(OcrError::InvalidConfig(
                "Mistral API key is empty\nSet MISTRAL_API_KEY or pass --mistral-api-key".into(),
            ));
        }
        let client = http::build_client(config.timeout)?;
        Ok(Self { config, client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    async fn upload(&self, pdf_bytes: &[u8]) -> Result<String, AdapterError> {
        let part = Part::bytes(pdf_bytes.to_vec())
            .file_name("document.pdf")
            .mime_str("application/pdf")
            .map_err(|e| AdapterError::unavailable(format!("upload: {e}")))?;
        let form = Form::new().text("purpose", "ocr").part("file", part);
        let request = self
            .client
            .post(self.url("/v1/files"))
            .bearer_auth(&self.config.api_key)
            .multipart(form);
        let file: UploadedFile = http::send_json(request, "mistral upload").await?;
        Ok(file.id)
    }

    async fn signed_url(&self, file_id: &str) -> Result<String, AdapterError> {
        let request = self
            .client
            .get(self.url(&format!("/v1/files/{file_id}/url")))
            .query(&[("expiry", "24")])
            .bearer_auth(&self.config.api_key);
        let signed: SignedUrl = http::send_json(request, "mistral signed url").await?;
        Ok(signed.url)
    }

    async fn ocr(&self, document_url: &str, include_images: bool) -> Result<OcrResponse, AdapterError> {
        let body = json!({
            "model": self.config.model,
            "document": {
                "type": "document_url",
                "document_url": document_url,
            },
            "include_image_base64": include_images,
        });
        let request = self
            .client
            .post(self.url("/v1/ocr"))
            .bearer_auth(&self.config.api_key)
            .json(&body);
        http::send_json(request, "mistral ocr").await
    }

    /// Uploaded files are kept by Mistral until deleted. Failure here only
    /// leaks storage, so it is logged and ignored.
    async fn delete_file(&self, file_id: &str) {
        let request = self
            .client
            .delete(self.url(&format!("/v1/files/{file_id}")))
            .bearer_auth(&self.config.api_key);
        if let Err(e) = http::send(request, "mistral delete").await {
            debug!("Could not delete uploaded file {}: {}", file_id, e);
        }
    }
}

/// Owns an uploaded file id until the file is deleted.
///
/// When `submit` is cancelled (caller dropped, deadline hit) the guard is
/// dropped with the id still set and schedules the delete on the current
/// runtime instead. Without a runtime the file is left for Mistral's own
/// retention to expire.
struct UploadedFileGuard {
    adapter: MistralAdapter,
    file_id: Option<String>,
}

impl UploadedFileGuard {
    fn new(adapter: &MistralAdapter, file_id: String) -> Self {
        Self {
            adapter: adapter.clone(),
            file_id: Some(file_id),
        }
    }

    fn file_id(&self) -> &str {
        self.file_id.as_deref().unwrap_or_default()
    }

    /// Delete in line. The id is released only once the request finished,
    /// so cancelling mid-delete still hands it to `drop`.
    async fn delete(mut self) {
        if let Some(id) = self.file_id.as_deref() {
            self.adapter.delete_file(id).await;
        }
        self.file_id = None;
    }
}

impl Drop for UploadedFileGuard {
    fn drop(&mut self) {
        let Some(file_id) = self.file_id.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                debug!("Submission cancelled; deleting uploaded file {} in background", file_id);
                let adapter = self.adapter.clone();
                handle.spawn(async move { adapter.delete_file(&file_id).await });
            }
            Err(_) => warn!("Uploaded file {} left on the server (no runtime)", file_id),
        }
    }
}

#[async_trait]
impl ProviderAdapter for MistralAdapter {
    fn provider_id(&self) -> &str {
        MISTRAL
    }

    async fn submit(
        &self,
        pdf_bytes: &[u8],
        options: &RecognitionOptions,
    ) -> Result<RawDocument, AdapterError> {
        let file_id = self.upload(pdf_bytes).await?;
        debug!("Uploaded {} bytes as {}", pdf_bytes.len(), file_id);
        let uploaded = UploadedFileGuard::new(self, file_id);

        let result = match self.signed_url(uploaded.file_id()).await {
            Ok(url) => self.ocr(&url, options.extract_images).await,
            Err(e) => Err(e),
        };
        uploaded.delete().await;

        let response = result?;
        info!("Mistral returned {} page(s)", response.pages.len());
        Ok(lower(response, options.extract_images))
    }
}

// ── Lowering ─────────────────────────────────────────────────────────────────

/// Convert an OCR response into the adapter-neutral representation.
pub(crate) fn lower(response: OcrResponse, extract_images: bool) -> RawDocument {
    let mut doc = RawDocument::default();

    for page in response.pages {
        let (width, height) = match &page.dimensions {
            Some(d) if d.width > 0.0 && d.height > 0.0 => (d.width, d.height),
            _ => (1.0, 1.0),
        };

        let mut blocks = markdown::page_blocks(&page.markdown, width, height);
        for block in blocks.iter_mut().filter(|b| b.kind == BlockKind::Image) {
            if let BlockContent::Text(id) = &block.content {
                block.content = BlockContent::Text(image_key(page.index, id));
            }
        }

        if extract_images {
            for image in page.images {
                let key = image_key(page.index, &image.id);
                let Some(encoded) = image.image_base64 else {
                    continue;
                };
                match decode_image(&encoded) {
                    Ok(data) => {
                        doc.images.insert(
                            key,
                            RawImage {
                                page_index: page.index,
                                data,
                            },
                        );
                    }
                    Err(e) => doc.warnings.push(format!(
                        "page {}: image '{}' has undecodable base64 payload: {}",
                        page.index + 1,
                        image.id,
                        e
                    )),
                }
            }
        }

        doc.pages
            .push(RawPage::new(page.index, width, height).with_blocks(blocks));
    }
    doc
}

fn image_key(page_index: usize, id: &str) -> String {
    format!("p{page_index}/{id}")
}

/// Decode a payload that may be a bare base64 string or a `data:` URI.
fn decode_image(encoded: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let payload = match encoded.split_once(";base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => encoded,
    };
    base64::engine::general_purpose::STANDARD.decode(payload.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::sync::mpsc;

    const RESPONSE: &str = r##"{
        "pages": [
            {
                "index": 1,
                "markdown": "Second page text",
                "images": [],
                "dimensions": {"dpi": 200, "height": 2200, "width": 1700}
            },
            {
                "index": 0,
                "markdown": "# Report\n\nIntro text.\n\n![img-0.jpeg](img-0.jpeg)",
                "images": [
                    {
                        "id": "img-0.jpeg",
                        "top_left_x": 10, "top_left_y": 20,
                        "bottom_right_x": 110, "bottom_right_y": 220,
                        "image_base64": "data:image/jpeg;base64,/9j/4AAQ"
                    }
                ],
                "dimensions": {"dpi": 200, "height": 2200, "width": 1700}
            }
        ],
        "model": "mistral-ocr-2503-completion",
        "usage_info": {"pages_processed": 2, "doc_size_bytes": 1234}
    }"##;

    fn response() -> OcrResponse {
        serde_json::from_str(RESPONSE).unwrap()
    }

    #[test]
    fn test_lower_pages_and_images() {
        let doc = lower(response(), true);
        assert_eq!(doc.pages.len(), 2);
        assert!(doc.warnings.is_empty());

        let first = doc.pages.iter().find(|p| p.index == 0).unwrap();
        assert_eq!((first.width, first.height), (1700.0, 2200.0));
        assert_eq!(first.blocks.len(), 3);
        let image = &first.blocks[2];
        assert_eq!(image.kind, BlockKind::Image);
        assert_eq!(image.content.as_text(), Some("p0/img-0.jpeg"));

        let payload = &doc.images["p0/img-0.jpeg"];
        assert_eq!(payload.page_index, 0);
        assert_eq!(payload.data, vec![0xff, 0xd8, 0xff, 0xe0, 0x00, 0x10]);
    }

    #[test]
    fn test_lower_without_images() {
        let doc = lower(response(), false);
        assert!(doc.images.is_empty());
        assert_eq!(doc.total_blocks(), 4);
    }

    #[test]
    fn test_bad_base64_is_a_warning() {
        let json = r#"{"pages":[{"index":0,"markdown":"![x](x.png)",
            "images":[{"id":"x.png","image_base64":"***not base64***"}]}]}"#;
        let doc = lower(serde_json::from_str(json).unwrap(), true);
        assert!(doc.images.is_empty());
        assert_eq!(doc.warnings.len(), 1);
        // Missing dimensions fall back to a unit page.
        assert_eq!((doc.pages[0].width, doc.pages[0].height), (1.0, 1.0));
    }

    #[test]
    fn test_decode_plain_and_data_uri() {
        assert_eq!(decode_image("aGk=").unwrap(), b"hi");
        assert_eq!(decode_image("data:image/png;base64,aGk=").unwrap(), b"hi");
    }

    #[test]
    fn test_empty_key_rejected() {
        assert!(matches!(
            MistralAdapter::new(MistralConfig::new("  ")),
            Err(OcrError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_debug_redacts_key() {
        let shown = format!("{:?}", MistralConfig::new("sk-secret"));
        assert!(!shown.contains("sk-secret"));
    }

    // ── Upload cleanup ───────────────────────────────────────────────────

    /// Read one HTTP/1.1 request including its body; returns the request line.
    async fn read_request(socket: &mut TcpStream) -> String {
        let mut data = Vec::new();
        let mut chunk = [0u8; 4096];
        let header_end = loop {
            if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
            match socket.read(&mut chunk).await {
                Ok(0) | Err(_) => return String::new(),
                Ok(n) => data.extend_from_slice(&chunk[..n]),
            }
        };
        let head = String::from_utf8_lossy(&data[..header_end]).to_string();
        let lower = head.to_lowercase();
        let body_len = lower
            .lines()
            .find_map(|l| l.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(0);
        let chunked = lower.contains("transfer-encoding: chunked");
        loop {
            let done = if chunked {
                data.ends_with(b"0\r\n\r\n")
            } else {
                data.len() >= header_end + body_len
            };
            if done {
                break;
            }
            match socket.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => data.extend_from_slice(&chunk[..n]),
            }
        }
        head.lines().next().unwrap_or_default().to_string()
    }

    /// Local stand-in for the Mistral files API. Every request line is sent
    /// to the returned channel; signed-URL requests never get an answer.
    async fn files_api() -> (String, mpsc::UnboundedReceiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let tx = tx.clone();
                tokio::spawn(async move {
                    let line = read_request(&mut socket).await;
                    let _ = tx.send(line.clone());
                    if line.starts_with("GET ") {
                        tokio::time::sleep(Duration::from_secs(30)).await;
                        return;
                    }
                    let body = if line.starts_with("POST /v1/files ") {
                        r#"{"id":"file-xyz"}"#
                    } else {
                        "{}"
                    };
                    let reply = format!(
                        "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                        body.len(),
                        body
                    );
                    let _ = socket.write_all(reply.as_bytes()).await;
                });
            }
        });
        (base, rx)
    }

    fn local_adapter(base: String) -> MistralAdapter {
        MistralAdapter::new(MistralConfig::new("sk-test").with_base_url(base)).unwrap()
    }

    async fn next_delete(requests: &mut mpsc::UnboundedReceiver<String>) -> String {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match requests.recv().await {
                    Some(line) if line.starts_with("DELETE ") => return line,
                    Some(_) => continue,
                    None => return String::new(),
                }
            }
        })
        .await
        .expect("no DELETE request arrived")
    }

    #[tokio::test]
    async fn test_cancelled_submit_still_deletes_upload() {
        let (base, mut requests) = files_api().await;
        let adapter = local_adapter(base);

        let outcome = tokio::time::timeout(
            Duration::from_millis(300),
            adapter.submit(b"%PDF-1.4 tiny", &RecognitionOptions::default()),
        )
        .await;
        assert!(outcome.is_err(), "submit should still be waiting on the signed URL");

        assert_eq!(
            next_delete(&mut requests).await,
            "DELETE /v1/files/file-xyz HTTP/1.1"
        );
    }

    #[tokio::test]
    async fn test_inline_delete_is_not_repeated_on_drop() {
        let (base, mut requests) = files_api().await;
        let adapter = local_adapter(base);

        UploadedFileGuard::new(&adapter, "file-once".into())
            .delete()
            .await;
        assert_eq!(
            next_delete(&mut requests).await,
            "DELETE /v1/files/file-once HTTP/1.1"
        );
        let again = tokio::time::timeout(Duration::from_millis(200), requests.recv()).await;
        assert!(again.is_err(), "unexpected extra request: {again:?}");
    }
}
