//! Human review of generated text pages.
//!
//! The pipeline calls [`PageReviewHook::review`] synchronously once per
//! successfully generated text page and stores whatever it returns. Image
//! pages and error pages are never reviewed.

use std::sync::Arc;

/// Finalises the text of a page before it is stored.
pub trait PageReviewHook: Send + Sync {
    /// Return the final text for page `index` (1-based).
    fn review(&self, index: usize, proposed: &str) -> String;
}

/// Accepts every proposed text unchanged. Used when no hook is configured.
pub struct AcceptAll;

impl PageReviewHook for AcceptAll {
    fn review(&self, _index: usize, proposed: &str) -> String {
        proposed.to_string()
    }
}

impl<F> PageReviewHook for F
where
    F: Fn(usize, &str) -> String + Send + Sync,
{
    fn review(&self, index: usize, proposed: &str) -> String {
        self(index, proposed)
    }
}

/// Convenience alias matching the type stored in [`crate::config::BookConfig`].
pub type ReviewHook = Arc<dyn PageReviewHook>;
