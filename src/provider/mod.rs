//! Backend adapters and the registry that resolves them by identifier.
//!
//! An adapter owns everything specific to one OCR service: authentication,
//! upload and polling, response parsing, and the lowering of that response
//! into a [`RawDocument`]. It does not retry, enforce deadlines or order
//! blocks. The orchestrator and the normaliser own those concerns.

use crate::config::RecognitionOptions;
use crate::error::AdapterError;
use crate::raw::RawDocument;
use async_trait::async_trait;

pub mod http;
pub mod markdown;
pub mod mistral;
pub mod reducto;
pub mod registry;

pub use mistral::{MistralAdapter, MistralConfig};
pub use reducto::{ReductoAdapter, ReductoConfig};
pub use registry::{AdapterFactory, ProviderRegistry};

/// Identifier of the Mistral OCR adapter.
pub const MISTRAL: &str = "mistral";
/// Identifier of the Reducto adapter.
pub const REDUCTO: &str = "reducto";

/// Capability every OCR backend implements.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Stable identifier, recorded on every produced document.
    fn provider_id(&self) -> &str;

    /// Submit one PDF and return the backend's blocks.
    ///
    /// A future returned here may be dropped at any point (caller
    /// cancellation, overall deadline); implementations must not leave
    /// shared state half-updated across `.await` points.
    async fn submit(
        &self,
        pdf_bytes: &[u8],
        options: &RecognitionOptions,
    ) -> Result<RawDocument, AdapterError>;
}
