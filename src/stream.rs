//! Batch recognition: many documents, bounded concurrency, results as ready.
//!
//! ## Why stream?
//!
//! A folder of PDFs takes minutes. Yielding each document as soon as it
//! finishes lets callers write results to disk and drive a progress bar
//! while the rest are still in flight. Documents run independently: one
//! document's failure is just an `Err` item, never the end of the batch.
//!
//! Items arrive in completion order, not input order; each carries the
//! document name so callers can match them up.

use crate::config::RecognitionOptions;
use crate::error::OcrError;
use crate::output::DocumentModel;
use crate::pipeline::input::DocumentInput;
use crate::recognize::Recognizer;
use futures::stream::{self, StreamExt};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_stream::Stream;
use tracing::{info, warn};

/// One finished document: its name and the recognition outcome.
pub type DocumentResult = (String, Result<DocumentModel, OcrError>);

/// A boxed stream of per-document results.
pub type DocumentStream = Pin<Box<dyn Stream<Item = DocumentResult> + Send>>;

/// Recognise `documents` with at most `config.concurrency` in flight.
///
/// # Example
/// ```rust,no_run
/// use edgequake_pdfocr::{load_folder, recognize_stream, ProviderRegistry, MistralConfig,
///     RecognitionConfig, RecognitionOptions, Recognizer};
/// use futures::StreamExt;
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let registry = ProviderRegistry::with_builtin(Some(MistralConfig::new("sk-...")), None)?;
/// let recognizer = Recognizer::new(Arc::new(registry), RecognitionConfig::default());
/// let docs = load_folder("papers/".as_ref()).await?;
///
/// let mut results = recognize_stream(&recognizer, docs, "mistral", &RecognitionOptions::default());
/// while let Some((name, result)) = results.next().await {
///     match result {
///         Ok(doc) => println!("{name}: {} pages", doc.page_count),
///         Err(e) => eprintln!("{name}: {e}"),
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub fn recognize_stream(
    recognizer: &Recognizer,
    documents: Vec<DocumentInput>,
    provider_id: &str,
    options: &RecognitionOptions,
) -> DocumentStream {
    let total = documents.len();
    let concurrency = recognizer.config().concurrency.max(1);
    info!(
        "Starting batch of {} document(s) with '{}' ({} concurrent)",
        total, provider_id, concurrency
    );
    if let Some(ref cb) = recognizer.config().progress_callback {
        cb.on_batch_start(total);
    }

    let finished = Arc::new(AtomicUsize::new(0));
    let succeeded = Arc::new(AtomicUsize::new(0));
    let provider_id = provider_id.to_string();
    let options = options.clone();
    let recognizer = recognizer.clone();

    let s = stream::iter(documents.into_iter().map(move |doc| {
        let recognizer = recognizer.clone();
        let provider_id = provider_id.clone();
        let options = options.clone();
        let finished = Arc::clone(&finished);
        let succeeded = Arc::clone(&succeeded);
        async move {
            let result = recognizer
                .recognize(&doc.bytes, &provider_id, &options)
                .await;
            match &result {
                Ok(_) => {
                    succeeded.fetch_add(1, Ordering::SeqCst);
                }
                Err(e) => warn!("{}: {}", doc.name, e),
            }

            let done = finished.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(ref cb) = recognizer.config().progress_callback {
                cb.on_document_finished(&doc.name, result.is_ok());
                if done == total {
                    cb.on_batch_complete(total, succeeded.load(Ordering::SeqCst));
                }
            }
            (doc.name, result)
        }
    }))
    .buffer_unordered(concurrency);

    Box::pin(s)
}
