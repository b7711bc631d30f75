//! Eager (whole-book) generation entry points.
//!
//! [`generate_book`] runs the full pipeline and returns the finished PDF
//! bytes together with every page record and the metadata table. Nothing
//! is written to disk except scoped scratch images; use
//! [`generate_to_files`] to persist the outputs.

use crate::config::BookConfig;
use crate::error::{BackendError, BookError};
use crate::output::{BookOutput, CoverRecord, GenerationStats, PageMode, PageRecord};
use crate::pipeline::assemble::BookAssembler;
use crate::pipeline::fonts::PdfFont;
use crate::pipeline::image::{
    BackendKind, ImageBackend, ImageOutput, ImageRouter, LocalDiffusionBackend,
    RemoteImageBackend,
};
use crate::pipeline::pages::PageGenerator;
use crate::pipeline::pdf::PdfWriter;
use crate::pipeline::seeds::SeedImages;
use crate::pipeline::store::ImageStore;
use crate::pipeline::text::{LlmTextBackend, TextBackend};
use crate::prompts;
use crate::review::{AcceptAll, PageReviewHook};
use edgequake_llm::{LLMProvider, ProviderFactory};
use futures::future::BoxFuture;
use image::DynamicImage;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Generate a book.
///
/// This is the primary entry point for the library.
///
/// # Returns
/// `Ok(BookOutput)` whenever a document could be assembled, even if some
/// pages failed (check `output.stats.failed_pages`; failed pages carry
/// `[Error] <message>` text).
///
/// # Errors
/// Returns `Err(BookError)` only for fatal errors:
/// - invalid configuration
/// - no text or image provider for a book that needs one
/// - the configured font cannot be loaded
/// - the document writer or metadata export failed
pub async fn generate_book(config: &BookConfig) -> Result<BookOutput, BookError> {
    let total_start = Instant::now();
    config.validate()?;
    info!(
        "Starting {} generation: {} pages, cover: {}",
        config.book_type, config.page_count, config.generate_cover
    );

    // ── Step 1: Resolve backends and font ────────────────────────────────
    let text = resolve_text_backend(config).await?;
    let images = resolve_image_backends(config)?;
    let font = PdfFont::discover(config.font_path.as_deref())?;

    if !config.seed_images.is_empty() && config.active_seed_images().is_empty() {
        warn!(
            "{} seed images ignored: only coloring books use seed images",
            config.seed_images.len()
        );
    }

    // ── Step 2: Probe the local backend (once) ───────────────────────────
    let router = ImageRouter::prepare(images.pages, images.local, wants_local(config)).await;

    let progress = config.progress_callback.as_deref();
    if let Some(cb) = progress {
        cb.on_generation_start(config.page_count, router.local_available());
    }

    // ── Step 3: Generate pages ───────────────────────────────────────────
    let mut store = ImageStore::new()
        .map_err(|e| BookError::Internal(format!("scratch directory: {e}")))?;
    let mut seeds = SeedImages::new(config.active_seed_images());
    let review: &dyn PageReviewHook = config.review_hook.as_deref().unwrap_or(&AcceptAll);

    let generation_start = Instant::now();
    let mut generator = PageGenerator::new(
        config.book_type,
        config.page_count,
        config.effective_prompt(),
        text.as_ref(),
        &router,
        review,
    );
    if let Some(cb) = progress {
        generator = generator.with_progress(cb);
    }
    let pages = generator.run(&mut seeds, &mut store).await;

    // ── Step 4: Cover ────────────────────────────────────────────────────
    let cover = if config.generate_cover {
        generate_cover(config, images.cover.as_ref(), &mut store).await
    } else {
        None
    };
    let generation_duration_ms = generation_start.elapsed().as_millis() as u64;

    // ── Step 5: Assemble ─────────────────────────────────────────────────
    let assembly_start = Instant::now();
    let assembled = BookAssembler::new(config.book_type, &mut store).assemble(
        PdfWriter::new(font),
        cover.as_ref(),
        &pages,
    )?;
    let assembly_duration_ms = assembly_start.elapsed().as_millis() as u64;

    // ── Step 6: Stats ────────────────────────────────────────────────────
    let mut stats = page_stats(&pages);
    stats.document_pages = assembled.document_pages;
    stats.cover_generated = cover.is_some();
    stats.local_backend_available = router.local_available();
    stats.generation_duration_ms = generation_duration_ms;
    stats.assembly_duration_ms = assembly_duration_ms;
    stats.total_duration_ms = total_start.elapsed().as_millis() as u64;

    info!(
        "Generation complete: {}/{} pages succeeded ({} degraded), {}ms total",
        stats.total_pages - stats.failed_pages,
        stats.total_pages,
        stats.degraded_pages,
        stats.total_duration_ms
    );
    if let Some(cb) = progress {
        cb.on_generation_complete(stats.total_pages, stats.total_pages - stats.failed_pages);
    }

    Ok(BookOutput {
        document: assembled.document,
        pages,
        metadata: assembled.metadata,
        stats,
    })
}

/// Generate a book and write the PDF and the metadata CSV.
///
/// Both files are written atomically (temp file + rename); missing parent
/// directories are created.
pub async fn generate_to_files(
    config: &BookConfig,
    pdf_path: impl AsRef<Path>,
    csv_path: impl AsRef<Path>,
) -> Result<GenerationStats, BookError> {
    let output = generate_book(config).await?;
    write_book(&output, pdf_path, csv_path).await?;
    Ok(output.stats)
}

/// Write a finished book's PDF and metadata CSV.
///
/// Each file goes to a sibling temp file first and is renamed into place;
/// missing parent directories are created.
pub async fn write_book(
    output: &BookOutput,
    pdf_path: impl AsRef<Path>,
    csv_path: impl AsRef<Path>,
) -> Result<(), BookError> {
    let csv = output.metadata_csv()?;
    write_atomic(pdf_path.as_ref(), &output.document).await?;
    write_atomic(csv_path.as_ref(), csv.as_bytes()).await
}

/// Synchronous wrapper around [`generate_book`].
///
/// Creates a temporary tokio runtime internally.
pub fn generate_book_sync(config: &BookConfig) -> Result<BookOutput, BookError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| BookError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(generate_book(config))
}

/// Probe the configured local diffusion endpoint.
///
/// Does not require any API key.
pub async fn check_local_backend(config: &BookConfig) -> Result<bool, BookError> {
    let backend: Arc<dyn ImageBackend> = match &config.local_backend {
        Some(backend) => Arc::clone(backend),
        None => Arc::new(LocalDiffusionBackend::from_config(config)?),
    };
    Ok(backend.probe().await)
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Only seeded coloring pages can go to the local backend.
fn wants_local(config: &BookConfig) -> bool {
    config.use_local_image_backend && !config.active_seed_images().is_empty()
}

/// Write `bytes` to a sibling temp file, then rename over `path`.
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), BookError> {
    let fail = |source: std::io::Error| BookError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(fail)?;
    }

    let ext = path
        .extension()
        .map(|e| format!("{}.tmp", e.to_string_lossy()))
        .unwrap_or_else(|| "tmp".to_string());
    let tmp_path = path.with_extension(ext);
    tokio::fs::write(&tmp_path, bytes).await.map_err(fail)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(fail)?;
    debug!("Wrote {} ({} bytes)", path.display(), bytes.len());
    Ok(())
}

fn page_stats(pages: &[PageRecord]) -> GenerationStats {
    GenerationStats {
        total_pages: pages.len(),
        text_pages: pages
            .iter()
            .filter(|p| p.mode == PageMode::Text && !p.content.is_error())
            .count(),
        image_pages: pages.iter().filter(|p| p.content.image().is_some()).count(),
        failed_pages: pages.iter().filter(|p| p.content.is_error()).count(),
        degraded_pages: pages.iter().filter(|p| p.warning.is_some()).count(),
        ..Default::default()
    }
}

async fn generate_cover(
    config: &BookConfig,
    backend: &dyn ImageBackend,
    store: &mut ImageStore,
) -> Option<CoverRecord> {
    let prompt = prompts::cover_prompt(&config.cover_title);
    let staged = match backend.generate(&prompt, None).await {
        Ok(output) => store
            .put(output.image())
            .map_err(|e| BackendError::Staging(e.to_string())),
        Err(e) => Err(e),
    };
    match staged {
        Ok(image) => {
            info!("Cover generated");
            Some(CoverRecord {
                title: config.cover_title.clone(),
                image,
            })
        }
        Err(e) => {
            warn!("Cover generation failed, continuing without a cover: {}", e);
            if let Some(cb) = config.progress_callback.as_deref() {
                cb.on_cover_error(&e.to_string());
            }
            None
        }
    }
}

/// Stand-in for a backend the run never calls.
struct Unconfigured(&'static str);

impl TextBackend for Unconfigured {
    fn complete<'a>(&'a self, _prompt: &'a str) -> BoxFuture<'a, Result<String, BackendError>> {
        Box::pin(async move { Err(BackendError::Api(format!("{} is not configured", self.0))) })
    }
}

impl ImageBackend for Unconfigured {
    fn kind(&self) -> BackendKind {
        BackendKind::Remote
    }

    fn generate<'a>(
        &'a self,
        _prompt: &'a str,
        _seed: Option<&'a DynamicImage>,
    ) -> BoxFuture<'a, Result<ImageOutput, BackendError>> {
        Box::pin(async move { Err(BackendError::Api(format!("{} is not configured", self.0))) })
    }
}

struct ImageBackends {
    pages: Arc<dyn ImageBackend>,
    cover: Arc<dyn ImageBackend>,
    local: Option<Arc<dyn ImageBackend>>,
}

/// Build the remote (page and cover) and local image backends.
///
/// The remote service is only required when the run will call it: for
/// coloring books and for covers.
fn resolve_image_backends(config: &BookConfig) -> Result<ImageBackends, BookError> {
    let local: Option<Arc<dyn ImageBackend>> = match &config.local_backend {
        Some(backend) => Some(Arc::clone(backend)),
        None if wants_local(config) => {
            Some(Arc::new(LocalDiffusionBackend::from_config(config)?))
        }
        None => None,
    };

    if let Some(backend) = &config.image_backend {
        return Ok(ImageBackends {
            pages: Arc::clone(backend),
            cover: Arc::clone(backend),
            local,
        });
    }

    let api_key = config
        .api_key
        .clone()
        .or_else(|| std::env::var("OPENAI_API_KEY").ok())
        .filter(|k| !k.is_empty());
    let required = config.generate_cover || config.book_type.is_image_based();

    match api_key {
        Some(key) => {
            let pages = RemoteImageBackend::from_config(config, &key)?;
            let cover = RemoteImageBackend::from_config(config, &key)?
                .with_quality(&config.cover_image_quality);
            Ok(ImageBackends {
                pages: Arc::new(pages),
                cover: Arc::new(cover),
                local,
            })
        }
        None if required => Err(BookError::ProviderNotConfigured {
            provider: "images".to_string(),
            hint: "Set OPENAI_API_KEY (or pass an API key) to generate images and covers."
                .to_string(),
        }),
        None => {
            let unused: Arc<dyn ImageBackend> = Arc::new(Unconfigured("remote image backend"));
            Ok(ImageBackends {
                pages: Arc::clone(&unused),
                cover: unused,
                local,
            })
        }
    }
}

/// Resolve the text backend. Coloring books never call it, so they do not
/// need a provider.
async fn resolve_text_backend(config: &BookConfig) -> Result<Arc<dyn TextBackend>, BookError> {
    if let Some(backend) = &config.text_backend {
        return Ok(Arc::clone(backend));
    }
    if config.book_type.is_image_based() {
        return Ok(Arc::new(Unconfigured("text backend")));
    }
    let provider = resolve_provider(config).await?;
    Ok(Arc::new(LlmTextBackend::new(provider, config)))
}

fn create_text_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, BookError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        BookError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Named provider** (`config.provider_name`) with `config.text_model`;
///    the factory reads the matching API key from the environment.
/// 2. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`).
/// 3. **OpenAI** when `OPENAI_API_KEY` is set, with `config.text_model`.
/// 4. **Full auto-detection** (`ProviderFactory::from_env`).
async fn resolve_provider(config: &BookConfig) -> Result<Arc<dyn LLMProvider>, BookError> {
    if let Some(ref name) = config.provider_name {
        return create_text_provider(name, &config.text_model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_text_provider(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            return create_text_provider("openai", &config.text_model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| BookError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::PageContent;
    use crate::pipeline::store::ImageHandle;

    fn record(index: usize, content: PageContent, mode: PageMode, warning: bool) -> PageRecord {
        PageRecord {
            index,
            title: format!("Page {index}"),
            content,
            prompt: String::new(),
            mode,
            warning: warning.then(|| "kept seed".to_string()),
        }
    }

    #[test]
    fn stats_count_outcomes() {
        let handle = ImageHandle {
            id: 0,
            width: 1,
            height: 1,
        };
        let pages = vec![
            record(1, PageContent::Image(handle.clone()), PageMode::SeededLocal, true),
            record(2, PageContent::Image(handle), PageMode::Unseeded, false),
            record(3, PageContent::Error("x".into()), PageMode::Unseeded, false),
        ];
        let stats = page_stats(&pages);
        assert_eq!(stats.total_pages, 3);
        assert_eq!(stats.image_pages, 2);
        assert_eq!(stats.failed_pages, 1);
        assert_eq!(stats.degraded_pages, 1);
        assert_eq!(stats.text_pages, 0);
    }

    #[tokio::test]
    async fn atomic_write_creates_parents_and_leaves_no_temp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/nested/book.pdf");
        write_atomic(&path, b"%PDF-").await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"%PDF-");
        assert!(!path.with_extension("pdf.tmp").exists());
    }

    #[test]
    fn image_books_without_a_key_are_rejected() {
        let config = BookConfig {
            book_type: crate::config::BookType::Coloring,
            page_count: 5,
            api_key: Some(String::new()),
            ..Default::default()
        };
        // An empty explicit key does not fall through to the environment.
        assert!(matches!(
            resolve_image_backends(&config),
            Err(BookError::ProviderNotConfigured { .. })
        ));
    }

    #[test]
    fn local_backend_is_wanted_only_for_seeded_coloring_books() {
        let seed = crate::config::SeedImage::File("a.png".into());
        let coloring = |seeds: Vec<crate::config::SeedImage>, toggle: bool| BookConfig {
            book_type: crate::config::BookType::Coloring,
            seed_images: seeds,
            use_local_image_backend: toggle,
            ..Default::default()
        };
        assert!(wants_local(&coloring(vec![seed.clone()], true)));
        assert!(!wants_local(&coloring(vec![], true)));
        assert!(!wants_local(&coloring(vec![seed.clone()], false)));

        let story = BookConfig {
            seed_images: vec![seed],
            ..Default::default()
        };
        assert!(!wants_local(&story));
    }

    #[tokio::test]
    async fn write_book_places_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let output = BookOutput {
            document: b"%PDF-1.5".to_vec(),
            pages: Vec::new(),
            metadata: vec![crate::output::MetadataRow {
                title: "Page 1".into(),
                prompt: "p".into(),
                book_type: "Journal".into(),
            }],
            stats: GenerationStats::default(),
        };
        let pdf = dir.path().join("out/book.pdf");
        let csv = dir.path().join("out/book.csv");
        write_book(&output, &pdf, &csv).await.unwrap();

        assert_eq!(std::fs::read(&pdf).unwrap(), b"%PDF-1.5");
        let csv_text = std::fs::read_to_string(&csv).unwrap();
        assert!(csv_text.starts_with("Title,Prompt,Type\nPage 1,p,Journal"));
        assert!(!csv.with_extension("csv.tmp").exists());
    }

    #[tokio::test]
    async fn unconfigured_backends_report_errors() {
        let stub = Unconfigured("text backend");
        let err = TextBackend::complete(&stub, "hi").await.unwrap_err();
        assert!(err.to_string().contains("text backend is not configured"));
    }
}
