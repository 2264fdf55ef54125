//! # edgequake-pdfocr
//!
//! Extract structured text and images from PDF documents through
//! interchangeable OCR backends.
//!
//! ## Why this crate?
//!
//! OCR services each return their own shape: Mistral hands back Markdown per
//! page, Reducto hands back typed layout blocks with bounding boxes. Code that
//! talks to one of them directly is stuck with its quirks. Here every backend
//! is an adapter that lowers its response into one intermediate form, and a
//! single layout normaliser turns that into reading-ordered text. Switching
//! vendors is a one-word change, and adding one is one adapter plus one
//! registration call.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF bytes
//!  │
//!  ├─ 1. Validate   %PDF- header, page-count estimate for the deadline
//!  ├─ 2. Submit     adapter call with retry/backoff under an overall deadline
//!  ├─ 3. Normalise  page sort/merge, column resolution, image naming
//!  ├─ 4. Serialise  Markdown-like text with page markers between pages
//!  └─ 5. Polish     deterministic whitespace cleanup
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdfocr::{MistralConfig, ProviderRegistry, RecognitionConfig,
//!     RecognitionOptions, Recognizer};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let api_key = std::env::var("MISTRAL_API_KEY")?;
//!     let registry = ProviderRegistry::with_builtin(Some(MistralConfig::new(api_key)), None)?;
//!     let recognizer = Recognizer::new(Arc::new(registry), RecognitionConfig::default());
//!
//!     let doc = recognizer
//!         .recognize_file("document.pdf", "mistral", &RecognitionOptions::default())
//!         .await?;
//!     println!("{}", doc.text);
//!     eprintln!("{} pages, {} images, {} warnings",
//!         doc.page_count, doc.images.len(), doc.warnings.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Adding a backend
//!
//! Implement [`ProviderAdapter`] and register a factory under a new id:
//!
//! ```rust
//! use async_trait::async_trait;
//! use edgequake_pdfocr::{AdapterError, ProviderAdapter, ProviderRegistry, RawDocument,
//!     RecognitionOptions};
//! use std::sync::Arc;
//!
//! struct Tesseract;
//!
//! #[async_trait]
//! impl ProviderAdapter for Tesseract {
//!     fn provider_id(&self) -> &str { "tesseract" }
//!
//!     async fn submit(&self, _pdf: &[u8], _options: &RecognitionOptions)
//!         -> Result<RawDocument, AdapterError> {
//!         Ok(RawDocument::default())
//!     }
//! }
//!
//! let mut registry = ProviderRegistry::new();
//! registry.register("tesseract", || Arc::new(Tesseract) as Arc<dyn ProviderAdapter>).unwrap();
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdfocr` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! edgequake-pdfocr = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod export;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod provider;
pub mod raw;
pub mod recognize;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    LayoutConfig, PageSeparator, RecognitionConfig, RecognitionConfigBuilder, RecognitionOptions,
};
pub use error::{AdapterError, OcrError, RecognitionCause};
pub use export::{write_document, ExportedDocument};
pub use output::{DocumentMetadata, DocumentModel, RecognitionStats};
pub use pipeline::input::{load_folder, load_inputs, DocumentInput};
pub use progress::{NoopProgressCallback, ProgressCallback, RecognitionProgressCallback};
pub use provider::{
    MistralAdapter, MistralConfig, ProviderAdapter, ProviderRegistry, ReductoAdapter,
    ReductoConfig,
};
pub use raw::{BlockContent, BlockKind, BoundingBox, RawBlock, RawDocument, RawImage, RawPage, StyleFlags};
pub use recognize::{RecognitionState, Recognizer};
pub use stream::{recognize_stream, DocumentResult, DocumentStream};
