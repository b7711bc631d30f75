//! Pipeline stages for book generation.
//!
//! Each submodule implements one step; the backends sit behind traits so
//! every stage can be tested with in-process mocks.
//!
//! ## Data Flow
//!
//! ```text
//! seeds ──▶ pages ──▶ store ──▶ assemble ──▶ pdf + metadata
//!            │  ▲
//!            ▼  │
//!        text / image (remote or local diffusion)
//! ```
//!
//! 1. [`seeds`]  — hand out each seed image once, loading files lazily
//! 2. [`pages`]  — the per-index loop; picks text or image, contains failures
//! 3. [`text`] / [`image`] — backend traits and their HTTP implementations;
//!    the only stages with network I/O
//! 4. [`postprocess`] — deterministic cleanup of completion text
//! 5. [`store`]  — scoped scratch storage for generated images
//! 6. [`assemble`] — ordered document construction through [`pdf`]
//!    (with [`fonts`]) and the [`metadata`] table

pub mod assemble;
pub mod encode;
pub mod fonts;
pub mod image;
pub mod metadata;
pub mod pages;
pub mod pdf;
pub mod postprocess;
pub mod seeds;
pub mod store;
pub mod text;
