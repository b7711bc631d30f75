//! # kdp-bookgen
//!
//! Generate print-ready books (coloring books, planners, storybooks,
//! journals, quote books) from a prompt, using a text model for written
//! pages and an image model for illustrated ones.
//!
//! Every run produces two artifacts: a paginated PDF (optional cover plus
//! one page per generated page) and a metadata table with one
//! `Title,Prompt,Type` row per page.
//!
//! ## Pipeline Overview
//!
//! ```text
//! BookConfig
//!  │
//!  ├─ 1. Resolve  text provider (edgequake-llm), image backends, font
//!  ├─ 2. Probe    local diffusion endpoint, once per run
//!  ├─ 3. Pages    sequential, one record per index; failures stay on their page
//!  ├─ 4. Cover    remote image, HD quality; failure only drops the cover
//!  ├─ 5. Assemble PDF (lopdf, embedded TrueType) + metadata rows
//!  └─ 6. Output   BookOutput { document, pages, metadata, stats }
//! ```
//!
//! Coloring pages with a seed image are redrawn by a locally hosted
//! Stable-Diffusion WebUI (img2img) when it answers the probe, and by the
//! remote images API otherwise. If a local call fails the page keeps its
//! seed image unchanged and carries a warning.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use kdp_bookgen::{generate_book, BookConfig, BookType};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY
//!     let config = BookConfig::builder()
//!         .book_type(BookType::Storybook)
//!         .page_count(8)
//!         .generate_cover(false)
//!         .build()?;
//!     let output = generate_book(&config).await?;
//!     std::fs::write("story.pdf", &output.document)?;
//!     std::fs::write("story.csv", output.metadata_csv()?)?;
//!     eprintln!("{} pages, {} failed", output.stats.total_pages, output.stats.failed_pages);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `kdpgen` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! kdp-bookgen = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod generate;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod review;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{BookConfig, BookConfigBuilder, BookType, DiffusionParams, SeedImage};
pub use error::{BackendError, BookError};
pub use generate::{
    check_local_backend, generate_book, generate_book_sync, generate_to_files, write_book,
};
pub use output::{
    BookOutput, CoverRecord, GenerationStats, MetadataRow, PageContent, PageMode, PageRecord,
};
pub use pipeline::image::{
    BackendKind, ImageBackend, ImageOutput, LocalDiffusionBackend, RemoteImageBackend,
};
pub use pipeline::text::{LlmTextBackend, TextBackend};
pub use progress::{GenerationProgressCallback, NoopProgressCallback, ProgressCallback};
pub use review::{AcceptAll, PageReviewHook, ReviewHook};
