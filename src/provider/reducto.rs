//! Reducto adapter.
//!
//! `POST /upload` returns a `reducto://` file reference, `POST /parse` runs
//! layout analysis with one chunk per page. Large results come back as a
//! presigned URL instead of inline JSON and are fetched in a second request.
//!
//! Reducto blocks carry normalised (0..1) bounding boxes and a type label but
//! no column information, so the normaliser's clustering path orders them.
//! Figure crops are separate downloads; a crop that cannot be fetched turns
//! its block into an `unknown` placeholder rather than failing the document.

use super::{http, markdown, ProviderAdapter, REDUCTO};
use crate::config::RecognitionOptions;
use crate::error::{AdapterError, OcrError};
use crate::raw::{BlockKind, BoundingBox, RawBlock, RawDocument, RawImage, RawPage};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_BASE_URL: &str = "https://platform.reducto.ai";

/// Connection settings for [`ReductoAdapter`].
#[derive(Clone)]
pub struct ReductoConfig {
    pub api_key: String,
    pub base_url: String,
    /// Per-request network timeout. Parsing is synchronous on Reducto's side,
    /// so this must cover the whole parse of a large document.
    pub timeout: Duration,
}

impl ReductoConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(300),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl fmt::Debug for ReductoConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReductoConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

// ── Wire types ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct UploadResponse {
    file_id: String,
}

#[derive(Debug, Deserialize)]
struct ParseResponse {
    result: ParseResult,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    num_pages: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ParseResult {
    Full { chunks: Vec<Chunk> },
    Url { url: String },
}

/// Body behind a `type: "url"` result.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum UrlPayload {
    Full { chunks: Vec<Chunk> },
    Chunks(Vec<Chunk>),
}

#[derive(Debug, Deserialize)]
pub(crate) struct Chunk {
    #[serde(default)]
    blocks: Vec<Block>,
}

#[derive(Debug, Deserialize)]
struct Block {
    #[serde(rename = "type")]
    kind: String,
    bbox: ReductoBox,
    #[serde(default)]
    content: String,
    image_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReductoBox {
    left: f32,
    top: f32,
    width: f32,
    height: f32,
    /// 1-based.
    page: usize,
}

// ── Adapter ──────────────────────────────────────────────────────────────────

/// [`ProviderAdapter`] for the Reducto parse API.
#[derive(Debug, Clone)]
pub struct ReductoAdapter {
    config: ReductoConfig,
    client: reqwest::Client,
}

impl ReductoAdapter {
    pub fn new(config: ReductoConfig) -> Result<Self, OcrError> {
        if config.api_key.trim().is_empty() {
            return Err(OcrError::InvalidConfig(
                "Reducto API key is empty\nSet REDUCTO_API_KEY or pass --reducto-api-key".into(),
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
        let request = self
            .client
            .post(self.url("/upload"))
            .bearer_auth(&self.config.api_key)
            .multipart(Form::new().part("file", part));
        let uploaded: UploadResponse = http::send_json(request, "reducto upload").await?;
        Ok(uploaded.file_id)
    }

    async fn parse(&self, document_url: &str) -> Result<(Vec<Chunk>, Option<usize>), AdapterError> {
        let body = json!({
            "document_url": document_url,
            "options": { "chunking": { "chunk_mode": "page" } },
            "experimental_options": { "return_figure_images": true },
        });
        let request = self
            .client
            .post(self.url("/parse"))
            .bearer_auth(&self.config.api_key)
            .json(&body);
        let response: ParseResponse = http::send_json(request, "reducto parse").await?;
        let num_pages = response.usage.and_then(|u| u.num_pages);

        let chunks = match response.result {
            ParseResult::Full { chunks } => chunks,
            ParseResult::Url { url } => {
                debug!("Fetching large parse result from presigned URL");
                let payload: UrlPayload =
                    http::send_json(self.client.get(&url), "reducto result").await?;
                match payload {
                    UrlPayload::Full { chunks } | UrlPayload::Chunks(chunks) => chunks,
                }
            }
        };
        Ok((chunks, num_pages))
    }

    /// Download every figure crop; failures are left out of the map.
    async fn fetch_figures(&self, chunks: &[Chunk]) -> HashMap<String, Vec<u8>> {
        let mut figures = HashMap::new();
        let urls = chunks
            .iter()
            .flat_map(|c| &c.blocks)
            .filter(|b| b.kind == "Figure")
            .filter_map(|b| b.image_url.as_deref());
        for url in urls {
            if figures.contains_key(url) {
                continue;
            }
            match http::send(self.client.get(url), "reducto figure").await {
                Ok(response) => match response.bytes().await {
                    Ok(bytes) => {
                        figures.insert(url.to_string(), bytes.to_vec());
                    }
                    Err(e) => warn!("Figure download interrupted: {}", e),
                },
                Err(e) => warn!("Figure download failed: {}", e),
            }
        }
        figures
    }
}

#[async_trait]
impl ProviderAdapter for ReductoAdapter {
    fn provider_id(&self) -> &str {
        REDUCTO
    }

    async fn submit(
        &self,
        pdf_bytes: &[u8],
        options: &RecognitionOptions,
    ) -> Result<RawDocument, AdapterError> {
        let file_id = self.upload(pdf_bytes).await?;
        debug!("Uploaded {} bytes as {}", pdf_bytes.len(), file_id);

        let (chunks, num_pages) = self.parse(&file_id).await?;
        let figures = if options.extract_images {
            self.fetch_figures(&chunks).await
        } else {
            HashMap::new()
        };
        info!(
            "Reducto returned {} chunk(s), {} figure image(s)",
            chunks.len(),
            figures.len()
        );
        Ok(lower(chunks, num_pages, &figures, options.extract_images))
    }
}

// ── Lowering ─────────────────────────────────────────────────────────────────

/// Convert parsed chunks into the adapter-neutral representation.
///
/// `figures` maps figure URLs to downloaded bytes. Pages are unit squares
/// because Reducto boxes are already page-relative.
pub(crate) fn lower(
    chunks: Vec<Chunk>,
    num_pages: Option<usize>,
    figures: &HashMap<String, Vec<u8>>,
    extract_images: bool,
) -> RawDocument {
    let mut pages: BTreeMap<usize, RawPage> = BTreeMap::new();
    for index in 0..num_pages.unwrap_or(0) {
        pages.insert(index, RawPage::new(index, 1.0, 1.0));
    }

    let mut images = BTreeMap::new();
    let mut warnings = Vec::new();
    let mut figure_count = 0usize;

    for block in chunks.into_iter().flat_map(|c| c.blocks) {
        let index = block.bbox.page.saturating_sub(1);
        let bbox = BoundingBox::new(
            block.bbox.left,
            block.bbox.top,
            block.bbox.width,
            block.bbox.height,
        );
        let page = pages
            .entry(index)
            .or_insert_with(|| RawPage::new(index, 1.0, 1.0));

        match block.kind.as_str() {
            "Title" => page.blocks.push(RawBlock::heading(1, block.content, bbox)),
            "Section Header" => page.blocks.push(RawBlock::heading(2, block.content, bbox)),
            "List Item" => page.blocks.push(RawBlock::list_item(block.content, bbox)),
            "Table" => page.blocks.extend(markdown::table_cells(&block.content, bbox)),
            "Figure" => {
                figure_count += 1;
                let key = format!("figure-{figure_count}");
                if !extract_images {
                    page.blocks.push(RawBlock::image_ref(key, bbox));
                    continue;
                }
                match block.image_url.as_deref().and_then(|u| figures.get(u)) {
                    Some(data) => {
                        images.insert(
                            key.clone(),
                            RawImage {
                                page_index: index,
                                data: data.clone(),
                            },
                        );
                        page.blocks.push(RawBlock::image_ref(key, bbox));
                    }
                    None => {
                        warnings.push(format!(
                            "page {}: figure image could not be downloaded",
                            index + 1
                        ));
                        page.blocks.push(RawBlock::new(
                            BlockKind::Unknown,
                            "[figure unavailable]",
                            bbox,
                        ));
                    }
                }
            }
            "Text" | "Header" | "Footer" | "Page Number" | "Key Value" | "Comment"
            | "Signature" | "Discarded" => {
                page.blocks.push(RawBlock::paragraph(block.content, bbox))
            }
            other => {
                warnings.push(format!(
                    "page {}: unrecognised block type '{}'",
                    index + 1,
                    other
                ));
                page.blocks
                    .push(RawBlock::new(BlockKind::Unknown, block.content, bbox));
            }
        }
    }

    RawDocument {
        pages: pages.into_values().collect(),
        images,
        warnings,
    }
}
