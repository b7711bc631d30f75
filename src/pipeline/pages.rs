//! Page generation: one record per index, in order, no matter what fails.
//!
//! For each index `1..=page_count` the generator picks a path:
//!
//! | Book type | Seed at index | Call                                     | Mode           |
//! |-----------|---------------|------------------------------------------|----------------|
//! | Coloring  | yes           | routed backend, `generate(prompt, seed)` | `Seeded*`      |
//! | Coloring  | no            | remote, `generate(prompt, None)`         | `Unseeded`     |
//! | other     | —             | text, `complete(prompt (Page i))`        | `Text`         |
//!
//! Any failure is caught at the page: the record's content becomes
//! [`PageContent::Error`] and the loop moves on. Text pages go through the
//! review hook before they are stored.

use crate::config::BookType;
use crate::error::BackendError;
use crate::output::{PageContent, PageMode, PageRecord};
use crate::pipeline::image::{BackendKind, ImageOutput, ImageRouter};
use crate::pipeline::postprocess::clean_text;
use crate::pipeline::seeds::SeedImages;
use crate::pipeline::store::ImageStore;
use crate::pipeline::text::TextBackend;
use crate::progress::GenerationProgressCallback;
use crate::prompts;
use crate::review::PageReviewHook;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Drives the per-page loop for one run.
pub struct PageGenerator<'a> {
    book_type: BookType,
    page_count: usize,
    prompt: &'a str,
    text: &'a dyn TextBackend,
    images: &'a ImageRouter,
    review: &'a dyn PageReviewHook,
    progress: Option<&'a dyn GenerationProgressCallback>,
}

impl<'a> PageGenerator<'a> {
    pub fn new(
        book_type: BookType,
        page_count: usize,
        prompt: &'a str,
        text: &'a dyn TextBackend,
        images: &'a ImageRouter,
        review: &'a dyn PageReviewHook,
    ) -> Self {
        Self {
            book_type,
            page_count,
            prompt,
            text,
            images,
            review,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: &'a dyn GenerationProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Generate every page in index order.
    ///
    /// Always returns exactly `page_count` records.
    pub async fn run(&self, seeds: &mut SeedImages, store: &mut ImageStore) -> Vec<PageRecord> {
        let mut records = Vec::with_capacity(self.page_count);
        for index in 1..=self.page_count {
            if let Some(cb) = self.progress {
                cb.on_page_start(index, self.page_count);
            }
            let start = Instant::now();
            let record = self.generate_page(index, seeds, store).await;
            debug!("Page {}: {:?} in {:?}", index, record.mode, start.elapsed());
            self.report(&record);
            records.push(record);
        }
        records
    }

    async fn generate_page(
        &self,
        index: usize,
        seeds: &mut SeedImages,
        store: &mut ImageStore,
    ) -> PageRecord {
        let title = format!("Page {index}");
        let prompt = prompts::page_prompt(self.prompt, index);

        let (content, mode, warning) = if self.book_type.is_image_based() {
            self.image_page(index, seeds, store).await
        } else {
            (self.text_page(index, &prompt).await, PageMode::Text, None)
        };

        PageRecord {
            index,
            title,
            content,
            prompt,
            mode,
            warning,
        }
    }

    async fn text_page(&self, index: usize, prompt: &str) -> PageContent {
        match self.text.complete(prompt).await {
            Ok(raw) => {
                let proposed = clean_text(&raw);
                PageContent::Text(self.review.review(index, &proposed))
            }
            Err(e) => failed(index, e),
        }
    }

    async fn image_page(
        &self,
        index: usize,
        seeds: &mut SeedImages,
        store: &mut ImageStore,
    ) -> (PageContent, PageMode, Option<String>) {
        let (mode, result) = match seeds.take(index) {
            Some(Ok(seed)) => {
                let backend = self.images.backend(self.images.route(true));
                let output = backend.generate(self.prompt, Some(&seed)).await;
                (seeded_mode(backend.kind()), output)
            }
            Some(Err(e)) => {
                let backend = self.images.backend(self.images.route(true));
                (seeded_mode(backend.kind()), Err(e))
            }
            None => (
                PageMode::Unseeded,
                self.images.remote().generate(self.prompt, None).await,
            ),
        };

        match result {
            Ok(output) => {
                let warning = output.warning().map(str::to_string);
                if let Some(w) = &warning {
                    warn!("Page {}: {}", index, w);
                }
                (stage(index, &output, store), mode, warning)
            }
            Err(e) => (failed(index, e), mode, None),
        }
    }

    fn report(&self, record: &PageRecord) {
        let Some(cb) = self.progress else {
            return;
        };
        if let Some(w) = &record.warning {
            cb.on_page_warning(record.index, self.page_count, w);
        }
        match &record.content {
            PageContent::Error(msg) => cb.on_page_error(record.index, self.page_count, msg),
            _ => cb.on_page_complete(record.index, self.page_count),
        }
    }
}

/// The mode of a seeded page is decided by the backend that served it.
fn seeded_mode(kind: BackendKind) -> PageMode {
    match kind {
        BackendKind::Local => PageMode::SeededLocal,
        BackendKind::Remote => PageMode::SeededRemote,
    }
}

fn stage(index: usize, output: &ImageOutput, store: &mut ImageStore) -> PageContent {
    match store.put(output.image()) {
        Ok(handle) => PageContent::Image(handle),
        Err(e) => failed(index, BackendError::Staging(e.to_string())),
    }
}

fn failed(index: usize, err: BackendError) -> PageContent {
    info!("Page {} failed: {}", index, err);
    PageContent::Error(err.to_string())
}
