//! Error types for the kdp-bookgen library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`BookError`] — **Fatal**: the run cannot produce a book at all
//!   (invalid configuration, no text provider, the document writer failed).
//!   Returned as `Err(BookError)` from the top-level `generate*` functions.
//!
//! * [`BackendError`] — **Non-fatal**: a single page's backend call failed
//!   (network blip, bad key, quota) but every other page is fine. It is
//!   rendered into [`crate::output::PageContent::Error`] so the book still
//!   has a page at that index.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the kdp-bookgen library.
///
/// Page-level failures use [`BackendError`] and are stored in the page
/// record rather than propagated here.
#[derive(Debug, Error)]
pub enum BookError {
    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The text provider could not be created (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The HTTP client for the image services could not be built.
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),

    // ── Assembly errors ───────────────────────────────────────────────────
    /// A configured TrueType font could not be read or parsed.
    #[error("Failed to load font '{path}': {detail}")]
    FontLoadFailed { path: PathBuf, detail: String },

    /// The document writer failed; no partial document is returned.
    #[error("Document assembly failed: {0}")]
    Assembly(String),

    /// The metadata table could not be serialised.
    #[error("Metadata export failed: {0}")]
    Metadata(String),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single backend call.
///
/// The page generator turns it into an `[Error] <message>` page and moves
/// on to the next index.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendError {
    /// Connection refused, DNS failure, reset, ...
    #[error("network error: {0}")]
    Network(String),

    /// The call did not finish within the configured timeout.
    #[error("request timed out after {secs}s")]
    Timeout { secs: u64 },

    /// Non-success HTTP status that is not auth or rate-limit related.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Rejected credentials (401/403).
    #[error("authentication failed: {0}")]
    Auth(String),

    /// 429 or quota exhausted.
    #[error("rate limit or quota exceeded: {0}")]
    RateLimited(String),

    /// The provider reported an error in a well-formed response.
    #[error("API error: {0}")]
    Api(String),

    /// The response arrived but its payload could not be decoded.
    #[error("could not decode response: {0}")]
    Decode(String),

    /// A seeded backend was called without a seed image.
    #[error("this image backend requires a seed image")]
    MissingSeed,

    /// The seed image for this page could not be read.
    #[error("seed image unreadable: {0}")]
    SeedImage(String),

    /// The generated image could not be written to scratch storage.
    #[error("failed to stage image: {0}")]
    Staging(String),
}

impl BackendError {
    /// Classify an HTTP failure status into the matching variant.
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        match status {
            401 | 403 => BackendError::Auth(body),
            429 => BackendError::RateLimited(body),
            _ => BackendError::Http { status, body },
        }
    }

    /// Map a `reqwest` transport error, keeping timeouts distinguishable.
    pub fn from_reqwest(err: &reqwest::Error, timeout_secs: u64) -> Self {
        if err.is_timeout() {
            BackendError::Timeout { secs: timeout_secs }
        } else if err.is_decode() {
            BackendError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            BackendError::from_status(status.as_u16(), err.to_string())
        } else {
            BackendError::Network(err.to_string())
        }
    }

    /// Classify a provider error message from the LLM client.
    ///
    /// Provider errors only reach us as strings, so this keys off the
    /// status codes and phrases the major providers put in their messages.
    pub fn from_provider_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        if lower.contains("401")
            || lower.contains("403")
            || lower.contains("unauthorized")
            || lower.contains("invalid api key")
            || lower.contains("incorrect api key")
        {
            BackendError::Auth(message)
        } else if lower.contains("429") || lower.contains("rate limit") || lower.contains("quota") {
            BackendError::RateLimited(message)
        } else {
            BackendError::Api(message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert!(matches!(BackendError::from_status(401, "no"), BackendError::Auth(_)));
        assert!(matches!(BackendError::from_status(403, "no"), BackendError::Auth(_)));
        assert!(matches!(
            BackendError::from_status(429, "slow down"),
            BackendError::RateLimited(_)
        ));
        assert_eq!(
            BackendError::from_status(500, "boom"),
            BackendError::Http {
                status: 500,
                body: "boom".into()
            }
        );
    }

    #[test]
    fn provider_message_classification() {
        assert!(matches!(
            BackendError::from_provider_message("OpenAI returned 401 Unauthorized"),
            BackendError::Auth(_)
        ));
        assert!(matches!(
            BackendError::from_provider_message("You exceeded your current quota"),
            BackendError::RateLimited(_)
        ));
        assert!(matches!(
            BackendError::from_provider_message("model overloaded"),
            BackendError::Api(_)
        ));
    }

    #[test]
    fn timeout_display() {
        let e = BackendError::Timeout { secs: 5 };
        assert!(e.to_string().contains("5s"), "got: {e}");
    }

    #[test]
    fn font_error_display() {
        let e = BookError::FontLoadFailed {
            path: PathBuf::from("/fonts/DejaVuSans.ttf"),
            detail: "not a font".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("DejaVuSans.ttf"), "got: {msg}");
        assert!(msg.contains("not a font"), "got: {msg}");
    }
}
