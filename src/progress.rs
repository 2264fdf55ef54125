//! Progress-callback trait for recognition events.
//!
//! Inject an [`Arc<dyn RecognitionProgressCallback>`] via
//! [`crate::config::RecognitionConfigBuilder::progress_callback`] to receive
//! events as the orchestrator submits, retries and completes documents.
//!
//! # Why callbacks instead of channels?
//!
//! The callback approach is the least-invasive integration point: callers can
//! forward events to a channel, a metrics sink or a terminal progress bar
//! without the library knowing how the host application communicates. The
//! trait is `Send + Sync` because batch recognition runs several documents at
//! once.
//!
//! # Example
//!
//! ```rust
//! use edgequake_pdfocr::{RecognitionConfig, RecognitionProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct RetryCounter {
//!     retries: AtomicUsize,
//! }
//!
//! impl RecognitionProgressCallback for RetryCounter {
//!     fn on_retry_scheduled(&self, provider_id: &str, retry: u32, delay_ms: u64, error: String) {
//!         self.retries.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{provider_id}: retry {retry} in {delay_ms}ms ({error})");
//!     }
//! }
//!
//! let config = RecognitionConfig::builder()
//!     .progress_callback(Arc::new(RetryCounter { retries: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the orchestrator and the batch stream.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Methods may be called concurrently from different
/// tasks during batch recognition.
pub trait RecognitionProgressCallback: Send + Sync {
    /// Called once before a batch starts.
    ///
    /// # Arguments
    /// * `total_documents`: number of documents in the batch
    fn on_batch_start(&self, total_documents: usize) {
        let _ = total_documents;
    }

    /// Called just before the document is submitted to the backend.
    ///
    /// # Arguments
    /// * `provider_id`: backend handling the call
    /// * `attempt`: 1-indexed attempt number
    fn on_attempt_start(&self, provider_id: &str, attempt: u32) {
        let _ = (provider_id, attempt);
    }

    /// Called when a transient failure will be retried after a backoff.
    ///
    /// Takes `String` rather than `&str` so implementations can move the
    /// message into a spawned task.
    fn on_retry_scheduled(&self, provider_id: &str, retry: u32, delay_ms: u64, error: String) {
        let _ = (provider_id, retry, delay_ms, error);
    }

    /// Called when a document has been recognised and normalised.
    fn on_recognition_complete(&self, provider_id: &str, page_count: usize, warnings: usize) {
        let _ = (provider_id, page_count, warnings);
    }

    /// Called when a recognition call ends in a fatal error.
    fn on_recognition_failed(&self, provider_id: &str, error: String) {
        let _ = (provider_id, error);
    }

    /// Called when a batch document finishes, successfully or not.
    ///
    /// # Arguments
    /// * `name`: document name (file stem for folder input)
    /// * `success`: whether a `DocumentModel` was produced
    fn on_document_finished(&self, name: &str, success: bool) {
        let _ = (name, success);
    }

    /// Called once after every batch document has been attempted.
    fn on_batch_complete(&self, total_documents: usize, success_count: usize) {
        let _ = (total_documents, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl RecognitionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::RecognitionConfig`].
pub type ProgressCallback = Arc<dyn RecognitionProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        attempts: AtomicUsize,
        retries: AtomicUsize,
        completes: AtomicUsize,
        failures: AtomicUsize,
    }

    impl RecognitionProgressCallback for TrackingCallback {
        fn on_attempt_start(&self, _provider_id: &str, _attempt: u32) {
            self.attempts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_retry_scheduled(&self, _provider_id: &str, _retry: u32, _delay_ms: u64, _error: String) {
            self.retries.fetch_add(1, Ordering::SeqCst);
        }

        fn on_recognition_complete(&self, _provider_id: &str, _page_count: usize, _warnings: usize) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_recognition_failed(&self, _provider_id: &str, _error: String) {
            self.failures.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_batch_start(2);
        cb.on_attempt_start("mistral", 1);
        cb.on_retry_scheduled("mistral", 1, 1000, "503".into());
        cb.on_recognition_complete("mistral", 3, 0);
        cb.on_recognition_failed("reducto", "rejected".into());
        cb.on_document_finished("report", true);
        cb.on_batch_complete(2, 1);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        tracker.on_attempt_start("mistral", 1);
        tracker.on_retry_scheduled("mistral", 1, 1000, "timeout".into());
        tracker.on_attempt_start("mistral", 2);
        tracker.on_recognition_complete("mistral", 12, 1);

        assert_eq!(tracker.attempts.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.retries.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.failures.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_attempt_start("reducto", 1);
    }
}
