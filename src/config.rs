//! Configuration types for PDF recognition.
//!
//! Process-level behaviour (retry policy, deadline budget, layout thresholds)
//! lives in [`RecognitionConfig`], built via its [`RecognitionConfigBuilder`].
//! Per-call knobs that a caller may change on every request live in
//! [`RecognitionOptions`].
//!
//! Credentials are not configured here: each adapter is constructed with its
//! own config (see [`crate::provider::mistral::MistralConfig`]) before it is
//! registered.

use crate::error::OcrError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Configuration for the recognition orchestrator.
///
/// Built via [`RecognitionConfig::builder()`] or using
/// [`RecognitionConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_pdfocr::RecognitionConfig;
///
/// let config = RecognitionConfig::builder()
///     .max_retries(5)
///     .retry_backoff_ms(250)
///     .concurrency(8)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct RecognitionConfig {
    /// Maximum retries after the first attempt on a transient backend failure. Default: 3.
    ///
    /// Only `BackendUnavailable` and `BackendTimeout` are retried. A rejected
    /// document surfaces immediately.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds. Default: 1000.
    pub retry_backoff_ms: u64,

    /// Multiplier applied to the delay after each retry. Default: 2.
    ///
    /// With the defaults the wait sequence is 1 s → 2 s → 4 s.
    pub backoff_factor: u32,

    /// Upper bound on a single backoff delay in milliseconds. Default: 8000.
    pub max_backoff_ms: u64,

    /// Deadline budget granted per started block of 20 pages. Default: 60.
    pub budget_secs_per_20_pages: u64,

    /// Deadline used when the page count cannot be estimated. Default: 300.
    pub deadline_ceiling_secs: u64,

    /// Documents recognised at once by [`crate::stream::recognize_stream`]. Default: 4.
    ///
    /// Each document is a single network round trip to the backend, so the
    /// limit is about backend rate limits rather than local CPU.
    pub concurrency: usize,

    /// Thresholds used by the layout normaliser.
    pub layout: LayoutConfig,

    /// Optional progress callback for attempt and batch events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_backoff_ms: 1000,
            backoff_factor: 2,
            max_backoff_ms: 8000,
            budget_secs_per_20_pages: 60,
            deadline_ceiling_secs: 300,
            concurrency: 4,
            layout: LayoutConfig::default(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for RecognitionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecognitionConfig")
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("backoff_factor", &self.backoff_factor)
            .field("max_backoff_ms", &self.max_backoff_ms)
            .field("budget_secs_per_20_pages", &self.budget_secs_per_20_pages)
            .field("deadline_ceiling_secs", &self.deadline_ceiling_secs)
            .field("concurrency", &self.concurrency)
            .field("layout", &self.layout)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn RecognitionProgressCallback>"),
            )
            .finish()
    }
}

impl RecognitionConfig {
    /// Create a new builder for `RecognitionConfig`.
    pub fn builder() -> RecognitionConfigBuilder {
        RecognitionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Delay before retry number `retry` (1-based), exponential and capped.
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1);
        let factor = (self.backoff_factor as u64).saturating_pow(exponent);
        let ms = self
            .retry_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }

    /// Overall deadline for a document with an estimated page count.
    ///
    /// One budget unit per started block of 20 pages; the fixed ceiling when
    /// the page count is unknown.
    pub fn deadline_for(&self, estimated_pages: Option<usize>) -> Duration {
        match estimated_pages {
            Some(pages) if pages > 0 => {
                let blocks = pages.div_ceil(20) as u64;
                Duration::from_secs(self.budget_secs_per_20_pages.saturating_mul(blocks))
            }
            _ => Duration::from_secs(self.deadline_ceiling_secs),
        }
    }
}

/// Builder for [`RecognitionConfig`].
#[derive(Debug)]
pub struct RecognitionConfigBuilder {
    config: RecognitionConfig,
}

impl RecognitionConfigBuilder {
    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn backoff_factor(mut self, factor: u32) -> Self {
        self.config.backoff_factor = factor;
        self
    }

    pub fn max_backoff_ms(mut self, ms: u64) -> Self {
        self.config.max_backoff_ms = ms;
        self
    }

    pub fn budget_secs_per_20_pages(mut self, secs: u64) -> Self {
        self.config.budget_secs_per_20_pages = secs;
        self
    }

    pub fn deadline_ceiling_secs(mut self, secs: u64) -> Self {
        self.config.deadline_ceiling_secs = secs;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn layout(mut self, layout: LayoutConfig) -> Self {
        self.config.layout = layout;
        self
    }

    pub fn page_separator(mut self, sep: PageSeparator) -> Self {
        self.config.layout.page_separator = sep;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<RecognitionConfig, OcrError> {
        let c = &self.config;
        if c.backoff_factor == 0 {
            return Err(OcrError::InvalidConfig(
                "Backoff factor must be ≥ 1".into(),
            ));
        }
        if c.budget_secs_per_20_pages == 0 || c.deadline_ceiling_secs == 0 {
            return Err(OcrError::InvalidConfig(
                "Deadline budget and ceiling must be > 0 seconds".into(),
            ));
        }
        if c.concurrency == 0 {
            return Err(OcrError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        c.layout.validate()?;
        Ok(self.config)
    }
}

/// Per-call recognition options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionOptions {
    /// Replaces the page-count-derived deadline for this call.
    pub timeout_override: Option<Duration>,
    /// Replaces [`RecognitionConfig::max_retries`] for this call.
    pub max_retries: Option<u32>,
    /// Ask the backend for embedded images and keep their payloads. Default: true.
    pub extract_images: bool,
}

impl Default for RecognitionOptions {
    fn default() -> Self {
        Self {
            timeout_override: None,
            max_retries: None,
            extract_images: true,
        }
    }
}

impl RecognitionOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_override = Some(timeout);
        self
    }

    pub fn with_max_retries(mut self, n: u32) -> Self {
        self.max_retries = Some(n);
        self
    }

    pub fn without_images(mut self) -> Self {
        self.extract_images = false;
        self
    }
}

// ── Layout ───────────────────────────────────────────────────────────────

/// Thresholds for column resolution and table row grouping.
///
/// Ratios are fractions of the page dimension they refer to, so they work the
/// same for backends that report points, pixels or normalised 0–1 units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutConfig {
    /// Minimum horizontal gap, as a fraction of page width, that may separate
    /// two columns. Default: 0.04.
    pub column_gap_ratio: f32,

    /// Minimum vertical extent, as a fraction of page height, each column must
    /// span for a split to be kept. Default: 0.10.
    ///
    /// Rivers of whitespace inside a justified paragraph open gaps wider than
    /// `column_gap_ratio`, but the paragraph is far shorter than a real column.
    pub min_column_height_ratio: f32,

    /// Blocks at least this wide (fraction of page width) are treated as
    /// full-width and split the page into horizontal bands. Default: 0.55.
    pub spanning_width_ratio: f32,

    /// Table cells whose tops are within this fraction of page height belong
    /// to the same row. Default: 0.01.
    pub row_tolerance_ratio: f32,

    /// Marker inserted between pages. Default: [`PageSeparator::Comment`].
    pub page_separator: PageSeparator,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            column_gap_ratio: 0.04,
            min_column_height_ratio: 0.10,
            spanning_width_ratio: 0.55,
            row_tolerance_ratio: 0.01,
            page_separator: PageSeparator::default(),
        }
    }
}

impl LayoutConfig {
    fn validate(&self) -> Result<(), OcrError> {
        let ratios = [
            ("column_gap_ratio", self.column_gap_ratio),
            ("min_column_height_ratio", self.min_column_height_ratio),
            ("spanning_width_ratio", self.spanning_width_ratio),
            ("row_tolerance_ratio", self.row_tolerance_ratio),
        ];
        for (name, value) in ratios {
            if !value.is_finite() || value < 0.0 || value > 1.0 {
                return Err(OcrError::InvalidConfig(format!(
                    "{name} must be within 0–1, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// How to mark page boundaries in the serialised text.
///
/// The marker is always rendered between pages so downstream consumers can
/// locate page breaks.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum PageSeparator {
    /// HTML comment with page number: "<!-- page N -->" (default)
    #[default]
    Comment,
    /// Horizontal rule: "\n\n---\n\n"
    HorizontalRule,
    /// Custom string inserted between pages.
    Custom(String),
}

impl PageSeparator {
    /// Render the separator placed before the given page number (1-indexed).
    pub fn render(&self, page_num: usize) -> String {
        match self {
            PageSeparator::Comment => format!("\n\n<!-- page {} -->\n\n", page_num),
            PageSeparator::HorizontalRule => "\n\n---\n\n".to_string(),
            PageSeparator::Custom(s) => format!("\n\n{}\n\n", s),
        }
    }
}
