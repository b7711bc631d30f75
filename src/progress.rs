//! Progress-callback trait for per-page generation events.
//!
//! Inject an [`Arc<dyn GenerationProgressCallback>`] via
//! [`crate::config::BookConfigBuilder::progress_callback`] to receive events
//! as the pipeline works through each page.
//!
//! # Example
//!
//! ```rust
//! use kdp_bookgen::{BookConfig, GenerationProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: Arc<AtomicUsize>,
//! }
//!
//! impl GenerationProgressCallback for CountingCallback {
//!     fn on_page_complete(&self, index: usize, total: usize) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("Page {index}/{total} done");
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback {
//!     completed: Arc::new(AtomicUsize::new(0)),
//! });
//!
//! let config = BookConfig::builder()
//!     .progress_callback(counter as Arc<dyn GenerationProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the generation pipeline as it processes each page.
///
/// Pages are generated one at a time, so events for one run never
/// interleave. Implementations must still be `Send + Sync` because the
/// config is shared with the async runtime. All methods have no-op
/// defaults.
pub trait GenerationProgressCallback: Send + Sync {
    /// Called once, after backends are resolved and before page 1.
    fn on_generation_start(&self, total_pages: usize, local_backend_available: bool) {
        let _ = (total_pages, local_backend_available);
    }

    /// Called just before the backend call for a page.
    fn on_page_start(&self, index: usize, total_pages: usize) {
        let _ = (index, total_pages);
    }

    /// Called when a page finished with real content.
    fn on_page_complete(&self, index: usize, total_pages: usize) {
        let _ = (index, total_pages);
    }

    /// Called when a page completed in degraded form (e.g. the local
    /// diffusion call failed and the seed image was kept).
    fn on_page_warning(&self, index: usize, total_pages: usize, warning: &str) {
        let _ = (index, total_pages, warning);
    }

    /// Called when a page's backend call failed; the page holds error text.
    fn on_page_error(&self, index: usize, total_pages: usize, error: &str) {
        let _ = (index, total_pages, error);
    }

    /// Called when the cover could not be generated.
    fn on_cover_error(&self, error: &str) {
        let _ = error;
    }

    /// Called once after the document has been assembled.
    fn on_generation_complete(&self, total_pages: usize, success_count: usize) {
        let _ = (total_pages, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl GenerationProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::BookConfig`].
pub type ProgressCallback = Arc<dyn GenerationProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        starts: AtomicUsize,
        completes: AtomicUsize,
        warnings: AtomicUsize,
        errors: AtomicUsize,
    }

    impl GenerationProgressCallback for TrackingCallback {
        fn on_page_start(&self, _index: usize, _total: usize) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_page_complete(&self, _index: usize, _total: usize) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_page_warning(&self, _index: usize, _total: usize, _warning: &str) {
            self.warnings.fetch_add(1, Ordering::SeqCst);
        }

        fn on_page_error(&self, _index: usize, _total: usize, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_generation_start(5, false);
        cb.on_page_start(1, 5);
        cb.on_page_complete(1, 5);
        cb.on_page_warning(2, 5, "kept seed");
        cb.on_page_error(3, 5, "boom");
        cb.on_cover_error("no cover");
        cb.on_generation_complete(5, 4);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        tracker.on_page_start(1, 2);
        tracker.on_page_complete(1, 2);
        tracker.on_page_start(2, 2);
        tracker.on_page_error(2, 2, "quota");
        tracker.on_page_warning(2, 2, "degraded");

        assert_eq!(tracker.starts.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.warnings.load(Ordering::SeqCst), 1);
    }
}
