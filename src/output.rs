//! Canonical output of a recognition call.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The document as handed back to the caller.
///
/// `text` holds every page in reading order with page-boundary markers in
/// between. `images` maps stable, collision-free names (`page{N}_img{M}`) to
/// raw payloads; names appear in `text` as placeholder tokens where the image
/// sat on the page, but unreferenced payloads are kept too.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentModel {
    pub text: String,
    pub images: BTreeMap<String, Vec<u8>>,
    pub page_count: usize,
    pub provider_id: String,
    /// Non-fatal anomalies, e.g. "page 4: 2 block(s) had out-of-page bounding boxes".
    pub warnings: Vec<String>,
    pub stats: RecognitionStats,
}

impl DocumentModel {
    /// Everything except the text and image payloads, for a metadata file.
    pub fn metadata(&self) -> DocumentMetadata {
        DocumentMetadata {
            provider_id: self.provider_id.clone(),
            page_count: self.page_count,
            warnings: self.warnings.clone(),
            image_names: self.images.keys().cloned().collect(),
            stats: self.stats.clone(),
        }
    }
}

/// Timing and retry statistics for one recognition call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecognitionStats {
    /// Adapter submissions made, including the successful one.
    pub attempts: u32,
    /// Submissions that failed transiently and were retried.
    pub retries: u32,
    pub deadline_ms: u64,
    pub backend_duration_ms: u64,
    pub normalize_duration_ms: u64,
    pub total_duration_ms: u64,
    pub block_count: usize,
}

/// Serialisable summary written next to the text and images.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub provider_id: String,
    pub page_count: usize,
    pub warnings: Vec<String>,
    pub image_names: Vec<String>,
    pub stats: RecognitionStats,
}
