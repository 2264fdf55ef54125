//! Error types for the edgequake-pdfocr library.
//!
//! Two layers of errors reflect two distinct responsibilities:
//!
//! * [`AdapterError`]: what a backend adapter is allowed to report. It is
//!   deliberately narrow: the backend was unreachable, refused the document,
//!   or did not answer in time. Adapters never decide whether to retry.
//!
//! * [`OcrError`]: **Fatal**: returned as `Err(OcrError)` from every public
//!   entry point. The orchestrator is the only place that turns adapter
//!   errors into these, after its retry policy has run.
//!
//! Non-fatal anomalies (a malformed block, a missing image payload) are not
//! errors at all: they become warning strings on the
//! [`crate::output::DocumentModel`].

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-pdfocr library.
#[derive(Debug, Error)]
pub enum OcrError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Byte stream is empty or does not look like a PDF.
    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },

    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    // ── Registry errors ───────────────────────────────────────────────────
    /// No adapter factory is registered under this identifier.
    #[error("Unknown OCR provider '{id}'. Registered providers: [{}]", .known.join(", "))]
    UnknownProvider { id: String, known: Vec<String> },

    /// An adapter factory is already registered under this identifier.
    #[error("OCR provider '{id}' is already registered")]
    DuplicateProvider { id: String },

    /// The process-wide registry was installed twice.
    #[error("The process-wide provider registry is already installed")]
    RegistryAlreadyInstalled,

    // ── Backend errors ────────────────────────────────────────────────────
    /// The backend refused the document. Never retried.
    #[error("Provider '{provider}' rejected the document: {detail}")]
    BackendRejected { provider: String, detail: String },

    /// Retries or the overall deadline were exhausted.
    #[error("Recognition with provider '{provider}' failed after {attempts} attempt(s): {cause}")]
    RecognitionFailed {
        provider: String,
        attempts: u32,
        #[source]
        cause: RecognitionCause,
    },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failure reported by a [`crate::provider::ProviderAdapter`].
///
/// `BackendUnavailable` and `BackendTimeout` are transient and retried by the
/// orchestrator; `BackendRejected` is not.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum AdapterError {
    /// Network, authentication or server-side availability failure.
    #[error("backend unavailable: {detail}")]
    BackendUnavailable { detail: String },

    /// Backend-side validation failure: too large, too many pages, unsupported.
    #[error("backend rejected the document: {detail}")]
    BackendRejected { detail: String },

    /// No response within the adapter's own network timeout.
    #[error("backend timed out after {elapsed_ms}ms")]
    BackendTimeout { elapsed_ms: u64 },
}

impl AdapterError {
    pub fn unavailable(detail: impl Into<String>) -> Self {
        AdapterError::BackendUnavailable {
            detail: detail.into(),
        }
    }

    pub fn rejected(detail: impl Into<String>) -> Self {
        AdapterError::BackendRejected {
            detail: detail.into(),
        }
    }

    /// Whether a retry could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        !matches!(self, AdapterError::BackendRejected { .. })
    }
}

/// Why a recognition call ended in [`OcrError::RecognitionFailed`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecognitionCause {
    /// The last transient backend failure once retries ran out.
    #[error(transparent)]
    Backend(#[from] AdapterError),

    /// The overall deadline elapsed, possibly mid-attempt or mid-backoff.
    #[error("overall deadline of {deadline_ms}ms exceeded")]
    DeadlineExceeded {
        deadline_ms: u64,
        last_error: Option<AdapterError>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn rejected_is_not_transient() {
        assert!(!AdapterError::rejected("too many pages").is_transient());
        assert!(AdapterError::unavailable("503").is_transient());
        assert!(AdapterError::BackendTimeout { elapsed_ms: 30_000 }.is_transient());
    }

    #[test]
    fn unknown_provider_lists_known_ids() {
        let e = OcrError::UnknownProvider {
            id: "tesseract".into(),
            known: vec!["mistral".into(), "reducto".into()],
        };
        let msg = e.to_string();
        assert!(msg.contains("tesseract"), "got: {msg}");
        assert!(msg.contains("mistral, reducto"), "got: {msg}");
    }

    #[test]
    fn recognition_failed_exposes_cause_as_source() {
        let e = OcrError::RecognitionFailed {
            provider: "mistral".into(),
            attempts: 4,
            cause: RecognitionCause::Backend(AdapterError::unavailable("connection reset")),
        };
        assert!(e.to_string().contains("4 attempt(s)"));
        let source = e.source().map(|s| s.to_string()).unwrap_or_default();
        assert!(source.contains("connection reset"), "got: {source}");
    }

    #[test]
    fn deadline_display() {
        let cause = RecognitionCause::DeadlineExceeded {
            deadline_ms: 60_000,
            last_error: None,
        };
        assert!(cause.to_string().contains("60000ms"));
    }

    #[test]
    fn adapter_error_serialises() {
        let e = AdapterError::BackendTimeout { elapsed_ms: 12 };
        let json = serde_json::to_string(&e).unwrap();
        let back: AdapterError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, e);
    }
}
