//! Recognition entry points: one PDF in, one [`DocumentModel`] out.
//!
//! [`Recognizer`] is the orchestrator. For each call it validates the bytes,
//! resolves the adapter, drives the submit/retry state machine under an
//! overall deadline, then runs the layout normaliser, serialiser and
//! post-processing.
//!
//! ## Retry and deadline
//!
//! ```text
//! Pending ──▶ Submitted ──▶ Succeeded
//!                │  ▲
//!        transient  │ backoff elapsed
//!                ▼  │
//!              Retrying ──(retries exhausted / rejected)──▶ Failed
//! ```
//!
//! Transient adapter failures (`BackendUnavailable`, `BackendTimeout`) are
//! retried with capped exponential backoff. `BackendRejected` ends the call
//! immediately. The deadline covers every attempt and every backoff sleep;
//! when it elapses the in-flight attempt is dropped.
//!
//! ## Cancellation
//!
//! Dropping the future returned by [`Recognizer::recognize`] drops the
//! adapter's in-flight HTTP request with it, which closes the connection.
//! No task is left running after the caller stops waiting.

use crate::config::{RecognitionConfig, RecognitionOptions};
use crate::error::{AdapterError, OcrError, RecognitionCause};
use crate::output::{DocumentModel, RecognitionStats};
use crate::pipeline::normalize::LayoutNormalizer;
use crate::pipeline::{input, markup, postprocess};
use crate::provider::{ProviderAdapter, ProviderRegistry};
use crate::raw::RawDocument;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Where a recognition call is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecognitionState {
    Pending,
    Submitted { attempt: u32 },
    Retrying { attempt: u32, delay_ms: u64 },
    Succeeded,
    Failed,
}

/// Mutable bookkeeping for one call, kept outside the deadline-bounded future
/// so the last error survives a timeout.
#[derive(Debug)]
struct RetryState {
    state: RecognitionState,
    attempts: u32,
    last_error: Option<AdapterError>,
}

impl RetryState {
    fn new() -> Self {
        Self {
            state: RecognitionState::Pending,
            attempts: 0,
            last_error: None,
        }
    }

    fn transition(&mut self, provider: &str, next: RecognitionState) {
        debug!("{}: {:?} → {:?}", provider, self.state, next);
        self.state = next;
    }
}

/// Recognition orchestrator. Cheap to clone; clones share the registry and
/// configuration.
#[derive(Clone)]
pub struct Recognizer {
    registry: Arc<ProviderRegistry>,
    config: Arc<RecognitionConfig>,
}

impl Recognizer {
    pub fn new(registry: Arc<ProviderRegistry>, config: RecognitionConfig) -> Self {
        Self {
            registry,
            config: Arc::new(config),
        }
    }

    /// Orchestrator over the process-wide registry installed with
    /// [`ProviderRegistry::install_global`].
    pub fn from_global(config: RecognitionConfig) -> Result<Self, OcrError> {
        let registry = ProviderRegistry::global().ok_or_else(|| {
            OcrError::InvalidConfig(
                "no provider registry installed\nCall ProviderRegistry::install_global at startup"
                    .into(),
            )
        })?;
        Ok(Self::new(registry, config))
    }

    pub fn config(&self) -> &RecognitionConfig {
        &self.config
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Recognise one PDF with the backend registered as `provider_id`.
    ///
    /// # Errors
    /// - [`OcrError::InvalidInput`] for empty or non-PDF bytes (before any
    ///   network call)
    /// - [`OcrError::UnknownProvider`] for an unregistered id
    /// - [`OcrError::BackendRejected`] when the backend refuses the document
    /// - [`OcrError::RecognitionFailed`] when retries or the deadline run out
    pub async fn recognize(
        &self,
        pdf_bytes: &[u8],
        provider_id: &str,
        options: &RecognitionOptions,
    ) -> Result<DocumentModel, OcrError> {
        let total_start = Instant::now();

        // ── Step 1: Validate input ───────────────────────────────────────────
        input::validate_pdf(pdf_bytes)?;

        // ── Step 2: Resolve adapter ──────────────────────────────────────────
        let adapter = self.registry.resolve(provider_id)?;
        let provider = adapter.provider_id().to_string();

        // ── Step 3: Budget ───────────────────────────────────────────────────
        let estimated_pages = input::estimate_page_count(pdf_bytes);
        let deadline = options
            .timeout_override
            .unwrap_or_else(|| self.config.deadline_for(estimated_pages));
        let max_retries = options.max_retries.unwrap_or(self.config.max_retries);
        info!(
            "Recognising {} bytes with '{}' (≈{} pages, deadline {}ms, max {} retries)",
            pdf_bytes.len(),
            provider,
            estimated_pages.map_or_else(|| "?".to_string(), |n| n.to_string()),
            deadline.as_millis(),
            max_retries
        );

        // ── Step 4: Submit with retry under the deadline ─────────────────────
        let backend_start = Instant::now();
        let mut run = RetryState::new();
        let outcome = tokio::time::timeout(
            deadline,
            self.submit_with_retry(adapter.as_ref(), pdf_bytes, options, max_retries, &mut run),
        )
        .await;
        let backend_duration_ms = backend_start.elapsed().as_millis() as u64;

        let raw = match outcome {
            Ok(Ok(raw)) => raw,
            Ok(Err(err)) => return Err(self.fail(&provider, &run, err)),
            Err(_) => {
                run.transition(&provider, RecognitionState::Failed);
                let err = OcrError::RecognitionFailed {
                    provider: provider.clone(),
                    attempts: run.attempts,
                    cause: RecognitionCause::DeadlineExceeded {
                        deadline_ms: deadline.as_millis() as u64,
                        last_error: run.last_error.clone(),
                    },
                };
                warn!("{}", err);
                self.report_failure(&provider, &err);
                return Err(err);
            }
        };

        // ── Step 5: Normalise, serialise, clean ──────────────────────────────
        let normalize_start = Instant::now();
        let normalized =
            LayoutNormalizer::new(&self.config.layout, options.extract_images).normalize(raw);
        let block_count = normalized.block_count();
        let page_count = normalized.pages.len();
        let text = postprocess::clean_text(&markup::serialize(&normalized, &self.config.layout));
        let normalize_duration_ms = normalize_start.elapsed().as_millis() as u64;

        for warning in &normalized.warnings {
            debug!("{}: {}", provider, warning);
        }

        let stats = RecognitionStats {
            attempts: run.attempts,
            retries: run.attempts.saturating_sub(1),
            deadline_ms: deadline.as_millis() as u64,
            backend_duration_ms,
            normalize_duration_ms,
            total_duration_ms: total_start.elapsed().as_millis() as u64,
            block_count,
        };

        info!(
            "Recognised {} page(s), {} block(s), {} image(s) with '{}' in {}ms ({} attempt(s), {} warning(s))",
            page_count,
            block_count,
            normalized.images.len(),
            provider,
            stats.total_duration_ms,
            stats.attempts,
            normalized.warnings.len()
        );
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_recognition_complete(&provider, page_count, normalized.warnings.len());
        }

        Ok(DocumentModel {
            text,
            images: normalized.images,
            page_count,
            provider_id: provider,
            warnings: normalized.warnings,
            stats,
        })
    }

    /// Read a PDF from disk and recognise it.
    pub async fn recognize_file(
        &self,
        path: impl AsRef<Path>,
        provider_id: &str,
        options: &RecognitionOptions,
    ) -> Result<DocumentModel, OcrError> {
        let bytes = input::read_pdf_file(path.as_ref()).await?;
        self.recognize(&bytes, provider_id, options).await
    }

    async fn submit_with_retry(
        &self,
        adapter: &dyn ProviderAdapter,
        pdf_bytes: &[u8],
        options: &RecognitionOptions,
        max_retries: u32,
        run: &mut RetryState,
    ) -> Result<RawDocument, AdapterError> {
        let provider = adapter.provider_id();
        loop {
            run.attempts += 1;
            let attempt = run.attempts;
            run.transition(provider, RecognitionState::Submitted { attempt });
            if let Some(ref cb) = self.config.progress_callback {
                cb.on_attempt_start(provider, attempt);
            }

            let err = match adapter.submit(pdf_bytes, options).await {
                Ok(raw) => {
                    run.transition(provider, RecognitionState::Succeeded);
                    return Ok(raw);
                }
                Err(err) => err,
            };

            // `attempt` failures so far; the next submission would be retry #attempt.
            if !err.is_transient() || attempt > max_retries {
                run.last_error = Some(err.clone());
                run.transition(provider, RecognitionState::Failed);
                return Err(err);
            }

            let delay = self.config.backoff_delay(attempt);
            let delay_ms = delay.as_millis() as u64;
            warn!(
                "{}: attempt {} failed ({}); retry {}/{} after {}ms",
                provider, attempt, err, attempt, max_retries, delay_ms
            );
            if let Some(ref cb) = self.config.progress_callback {
                cb.on_retry_scheduled(provider, attempt, delay_ms, err.to_string());
            }
            run.last_error = Some(err);
            run.transition(provider, RecognitionState::Retrying { attempt, delay_ms });
            tokio::time::sleep(delay).await;
        }
    }

    /// Map the final adapter error of a finished retry loop.
    fn fail(&self, provider: &str, run: &RetryState, err: AdapterError) -> OcrError {
        let error = match err {
            AdapterError::BackendRejected { detail } => OcrError::BackendRejected {
                provider: provider.to_string(),
                detail,
            },
            other => OcrError::RecognitionFailed {
                provider: provider.to_string(),
                attempts: run.attempts,
                cause: RecognitionCause::Backend(other),
            },
        };
        warn!("{}", error);
        self.report_failure(provider, &error);
        error
    }

    fn report_failure(&self, provider: &str, error: &OcrError) {
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_recognition_failed(provider, error.to_string());
        }
    }
}

impl std::fmt::Debug for Recognizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Recognizer")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raw::{BoundingBox, RawBlock, RawPage};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    const PDF: &[u8] = b"%PDF-1.7\n1 0 obj << /Type /Page >>\n";

    /// Fails with the scripted errors in order, then succeeds.
    struct Scripted {
        failures: Vec<AdapterError>,
        calls: AtomicU32,
    }

    #[async_trait]
    impl ProviderAdapter for Scripted {
        fn provider_id(&self) -> &str {
            "scripted"
        }

        async fn submit(
            &self,
            _pdf_bytes: &[u8],
            _options: &RecognitionOptions,
        ) -> Result<RawDocument, AdapterError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
            match self.failures.get(call) {
                Some(err) => Err(err.clone()),
                None => Ok(RawDocument {
                    pages: vec![RawPage::new(0, 100.0, 100.0).with_blocks(vec![
                        RawBlock::paragraph("hello", BoundingBox::new(0.0, 0.0, 50.0, 10.0)),
                    ])],
                    ..RawDocument::default()
                }),
            }
        }
    }

    fn recognizer(failures: Vec<AdapterError>) -> (Recognizer, Arc<Scripted>) {
        let adapter = Arc::new(Scripted {
            failures,
            calls: AtomicU32::new(0),
        });
        let shared = Arc::clone(&adapter);
        let mut registry = ProviderRegistry::new();
        registry
            .register("scripted", move || Arc::clone(&shared) as Arc<dyn ProviderAdapter>)
            .unwrap();
        let config = RecognitionConfig::builder()
            .retry_backoff_ms(1)
            .max_backoff_ms(2)
            .build()
            .unwrap();
        (Recognizer::new(Arc::new(registry), config), adapter)
    }

    #[tokio::test]
    async fn rejects_non_pdf_before_submitting() {
        let (rec, adapter) = recognizer(vec![]);
        let err = rec
            .recognize(b"hello", "scripted", &RecognitionOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, OcrError::InvalidInput { .. }));
        assert_eq!(adapter.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn retries_transient_failures() {
        let (rec, adapter) = recognizer(vec![
            AdapterError::unavailable("503"),
            AdapterError::BackendTimeout { elapsed_ms: 5 },
        ]);
        let doc = rec
            .recognize(PDF, "scripted", &RecognitionOptions::default())
            .await
            .unwrap();
        assert_eq!(doc.text, "hello\n");
        assert_eq!(doc.stats.attempts, 3);
        assert_eq!(doc.stats.retries, 2);
        assert_eq!(adapter.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn rejection_is_not_retried() {
        let (rec, adapter) = recognizer(vec![AdapterError::rejected("too many pages")]);
        let err = rec
            .recognize(PDF, "scripted", &RecognitionOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, OcrError::BackendRejected { ref detail, .. } if detail == "too many pages"));
        assert_eq!(adapter.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn option_overrides_retry_budget() {
        let (rec, adapter) = recognizer(vec![AdapterError::unavailable("down"); 5]);
        let options = RecognitionOptions::default().with_max_retries(1);
        match rec.recognize(PDF, "scripted", &options).await {
            Err(OcrError::RecognitionFailed { attempts, cause, .. }) => {
                assert_eq!(attempts, 2);
                assert_eq!(
                    cause,
                    RecognitionCause::Backend(AdapterError::unavailable("down"))
                );
            }
            other => panic!("expected RecognitionFailed, got {other:?}"),
        }
        assert_eq!(adapter.calls.load(Ordering::SeqCst), 2);
    }
}
