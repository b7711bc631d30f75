//! Configuration types for a book generation run.
//!
//! All run behaviour is controlled through [`BookConfig`], built via its
//! [`BookConfigBuilder`]. The config is immutable for the duration of one
//! run; the pipeline only ever borrows it.

use crate::error::BookError;
use crate::pipeline::image::ImageBackend;
use crate::pipeline::text::TextBackend;
use crate::progress::ProgressCallback;
use crate::prompts;
use crate::review::ReviewHook;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

/// Smallest book the generator will produce.
pub const MIN_PAGES: usize = 5;
/// Largest book the generator will produce.
pub const MAX_PAGES: usize = 50;

/// Configuration for one book generation run.
///
/// Built via [`BookConfig::builder()`] or using [`BookConfig::default()`].
///
/// # Example
/// ```rust
/// use kdp_bookgen::{BookConfig, BookType};
///
/// let config = BookConfig::builder()
///     .book_type(BookType::Storybook)
///     .page_count(12)
///     .generate_cover(false)
///     .build()
///     .unwrap();
/// assert_eq!(config.page_count, 12);
/// ```
#[derive(Clone)]
pub struct BookConfig {
    /// Kind of book; decides the default prompt and which backend pages use.
    pub book_type: BookType,

    /// Number of content pages. Range: 5–50. Default: 10.
    pub page_count: usize,

    /// Generate a cover illustration with the remote image backend. Default: true.
    pub generate_cover: bool,

    /// Title printed beneath the cover image. Default: "A Bedtime Story".
    pub cover_title: String,

    /// Prefer the local diffusion endpoint for seeded coloring pages. Default: true.
    ///
    /// Only takes effect when the endpoint answers the availability probe;
    /// otherwise every page falls back to the remote image backend.
    pub use_local_image_backend: bool,

    /// Prompt override. If None, uses the book type's template.
    pub prompt: Option<String>,

    /// Source images for coloring pages, one per page index in order.
    /// Ignored for other book types.
    pub seed_images: Vec<SeedImage>,

    /// Text model identifier. Default: "gpt-4o".
    pub text_model: String,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    /// If None, the provider is auto-detected from the environment.
    pub provider_name: Option<String>,

    /// Pre-constructed text backend. Takes precedence over `provider_name`.
    pub text_backend: Option<Arc<dyn TextBackend>>,

    /// Pre-constructed remote image backend (pages and cover).
    pub image_backend: Option<Arc<dyn ImageBackend>>,

    /// Pre-constructed local image backend. Takes precedence over `local_endpoint`.
    pub local_backend: Option<Arc<dyn ImageBackend>>,

    /// API key for the images API. If None, read from `OPENAI_API_KEY`.
    pub api_key: Option<String>,

    /// Base URL of the OpenAI-compatible images API. Default: "https://api.openai.com/v1".
    pub openai_base_url: String,

    /// Image model identifier. Default: "dall-e-3".
    pub image_model: String,

    /// Quality tier for page images. Default: "standard".
    pub page_image_quality: String,

    /// Quality tier for the cover image. Default: "hd".
    pub cover_image_quality: String,

    /// Base URL of the local diffusion service, used for both the
    /// availability probe and generation. Default: "http://127.0.0.1:7860".
    pub local_endpoint: String,

    /// Sampling parameters sent to the local diffusion endpoint.
    pub diffusion: DiffusionParams,

    /// Sampling temperature for text completion. Default: 0.8.
    pub temperature: f32,

    /// Maximum tokens per text page. Default: 1024.
    pub max_tokens: usize,

    /// Timeout for text and remote image calls in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Timeout for one local diffusion call in seconds. Default: 300.
    pub local_timeout_secs: u64,

    /// Timeout for the local availability probe in seconds. Default: 5.
    pub probe_timeout_secs: u64,

    /// TrueType font used for all document text. If None, the DejaVu Sans
    /// copy bundled with the crate is embedded.
    pub font_path: Option<PathBuf>,

    /// Human review of each generated text page. Default: accept as-is.
    pub review_hook: Option<ReviewHook>,

    /// Per-page progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for BookConfig {
    fn default() -> Self {
        Self {
            book_type: BookType::default(),
            page_count: 10,
            generate_cover: true,
            cover_title: "A Bedtime Story".to_string(),
            use_local_image_backend: true,
            prompt: None,
            seed_images: Vec::new(),
            text_model: "gpt-4o".to_string(),
            provider_name: None,
            text_backend: None,
            image_backend: None,
            local_backend: None,
            api_key: None,
            openai_base_url: "https://api.openai.com/v1".to_string(),
            image_model: "dall-e-3".to_string(),
            page_image_quality: "standard".to_string(),
            cover_image_quality: "hd".to_string(),
            local_endpoint: "http://127.0.0.1:7860".to_string(),
            diffusion: DiffusionParams::default(),
            temperature: 0.8,
            max_tokens: 1024,
            api_timeout_secs: 120,
            local_timeout_secs: 300,
            probe_timeout_secs: 5,
            font_path: None,
            review_hook: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for BookConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BookConfig")
            .field("book_type", &self.book_type)
            .field("page_count", &self.page_count)
            .field("generate_cover", &self.generate_cover)
            .field("cover_title", &self.cover_title)
            .field("use_local_image_backend", &self.use_local_image_backend)
            .field("prompt", &self.prompt)
            .field("seed_images", &self.seed_images.len())
            .field("text_model", &self.text_model)
            .field("provider_name", &self.provider_name)
            .field("text_backend", &self.text_backend.as_ref().map(|_| "<dyn TextBackend>"))
            .field("image_backend", &self.image_backend.as_ref().map(|_| "<dyn ImageBackend>"))
            .field("local_backend", &self.local_backend.as_ref().map(|_| "<dyn ImageBackend>"))
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("image_model", &self.image_model)
            .field("local_endpoint", &self.local_endpoint)
            .field("diffusion", &self.diffusion)
            .field("font_path", &self.font_path)
            .finish()
    }
}

impl BookConfig {
    /// Create a new builder for `BookConfig`.
    pub fn builder() -> BookConfigBuilder {
        BookConfigBuilder {
            config: Self::default(),
        }
    }

    /// The prompt every page is generated from: the override, else the template.
    pub fn effective_prompt(&self) -> &str {
        match self.prompt.as_deref() {
            Some(p) if !p.trim().is_empty() => p,
            _ => prompts::default_prompt(self.book_type),
        }
    }

    /// Seed images that apply to this run (empty unless the book is a coloring book).
    pub fn active_seed_images(&self) -> &[SeedImage] {
        if self.book_type == BookType::Coloring {
            &self.seed_images
        } else {
            &[]
        }
    }

    /// Check the invariants the builder enforces. Also used by the
    /// pipeline for configs assembled field-by-field.
    pub fn validate(&self) -> Result<(), BookError> {
        if !(MIN_PAGES..=MAX_PAGES).contains(&self.page_count) {
            return Err(BookError::InvalidConfig(format!(
                "page count must be {MIN_PAGES}–{MAX_PAGES}, got {}",
                self.page_count
            )));
        }
        if self.generate_cover && self.cover_title.trim().is_empty() {
            return Err(BookError::InvalidConfig(
                "cover title must not be empty when a cover is requested".into(),
            ));
        }
        if self.api_timeout_secs == 0 || self.probe_timeout_secs == 0 {
            return Err(BookError::InvalidConfig("timeouts must be ≥ 1s".into()));
        }
        self.diffusion.validate()
    }
}

/// Builder for [`BookConfig`].
#[derive(Debug)]
pub struct BookConfigBuilder {
    config: BookConfig,
}

impl BookConfigBuilder {
    pub fn book_type(mut self, book_type: BookType) -> Self {
        self.config.book_type = book_type;
        self
    }

    /// Page count; validated (not clamped) by [`build`](Self::build).
    pub fn page_count(mut self, n: usize) -> Self {
        self.config.page_count = n;
        self
    }

    pub fn generate_cover(mut self, v: bool) -> Self {
        self.config.generate_cover = v;
        self
    }

    pub fn cover_title(mut self, title: impl Into<String>) -> Self {
        self.config.cover_title = title.into();
        self
    }

    pub fn use_local_image_backend(mut self, v: bool) -> Self {
        self.config.use_local_image_backend = v;
        self
    }

    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.prompt = Some(prompt.into());
        self
    }

    pub fn seed_image(mut self, seed: SeedImage) -> Self {
        self.config.seed_images.push(seed);
        self
    }

    pub fn seed_images(mut self, seeds: impl IntoIterator<Item = SeedImage>) -> Self {
        self.config.seed_images.extend(seeds);
        self
    }

    pub fn text_model(mut self, model: impl Into<String>) -> Self {
        self.config.text_model = model.into();
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn text_backend(mut self, backend: Arc<dyn TextBackend>) -> Self {
        self.config.text_backend = Some(backend);
        self
    }

    pub fn image_backend(mut self, backend: Arc<dyn ImageBackend>) -> Self {
        self.config.image_backend = Some(backend);
        self
    }

    pub fn local_backend(mut self, backend: Arc<dyn ImageBackend>) -> Self {
        self.config.local_backend = Some(backend);
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn openai_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.openai_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn image_model(mut self, model: impl Into<String>) -> Self {
        self.config.image_model = model.into();
        self
    }

    pub fn page_image_quality(mut self, quality: impl Into<String>) -> Self {
        self.config.page_image_quality = quality.into();
        self
    }

    pub fn cover_image_quality(mut self, quality: impl Into<String>) -> Self {
        self.config.cover_image_quality = quality.into();
        self
    }

    pub fn local_endpoint(mut self, url: impl Into<String>) -> Self {
        self.config.local_endpoint = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn diffusion(mut self, params: DiffusionParams) -> Self {
        self.config.diffusion = params;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n.max(16);
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn local_timeout_secs(mut self, secs: u64) -> Self {
        self.config.local_timeout_secs = secs.max(1);
        self
    }

    pub fn probe_timeout_secs(mut self, secs: u64) -> Self {
        self.config.probe_timeout_secs = secs;
        self
    }

    pub fn font_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.font_path = Some(path.into());
        self
    }

    pub fn review_hook(mut self, hook: ReviewHook) -> Self {
        self.config.review_hook = Some(hook);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<BookConfig, BookError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// The kind of book being generated.
///
/// Coloring books are image-based; every other type is text-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BookType {
    Coloring,
    Planner,
    #[default]
    Storybook,
    Journal,
    Quote,
}

impl BookType {
    pub const ALL: [BookType; 5] = [
        BookType::Coloring,
        BookType::Planner,
        BookType::Storybook,
        BookType::Journal,
        BookType::Quote,
    ];

    /// Human-readable label, also written to the metadata `Type` column.
    pub fn label(self) -> &'static str {
        match self {
            BookType::Coloring => "Coloring Book",
            BookType::Planner => "Planner",
            BookType::Storybook => "Storybook",
            BookType::Journal => "Journal",
            BookType::Quote => "Quote Book",
        }
    }

    /// Whether pages of this type are images rather than text.
    pub fn is_image_based(self) -> bool {
        self == BookType::Coloring
    }
}

impl fmt::Display for BookType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for BookType {
    type Err = BookError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        BookType::ALL
            .into_iter()
            .find(|t| {
                t.label().to_lowercase() == wanted || format!("{t:?}").to_lowercase() == wanted
            })
            .ok_or_else(|| BookError::InvalidConfig(format!("unknown book type '{s}'")))
    }
}

/// One coloring-page source image.
#[derive(Clone)]
pub enum SeedImage {
    /// Read (PNG/JPEG) when its page is generated.
    File(PathBuf),
    /// Already decoded in memory.
    Decoded(DynamicImage),
}

impl fmt::Debug for SeedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SeedImage::File(p) => f.debug_tuple("File").field(p).finish(),
            SeedImage::Decoded(img) => write!(f, "Decoded({}x{})", img.width(), img.height()),
        }
    }
}

/// Sampling parameters for the local img2img endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffusionParams {
    pub sampler_name: String,
    pub cfg_scale: f32,
    pub steps: u32,
    pub denoising_strength: f32,
    pub width: u32,
    pub height: u32,
}

impl Default for DiffusionParams {
    fn default() -> Self {
        Self {
            sampler_name: "Euler a".to_string(),
            cfg_scale: 7.0,
            steps: 30,
            denoising_strength: 0.6,
            width: 512,
            height: 512,
        }
    }
}

impl DiffusionParams {
    fn validate(&self) -> Result<(), BookError> {
        if !(0.0..=1.0).contains(&self.denoising_strength) {
            return Err(BookError::InvalidConfig(format!(
                "denoising strength must be 0.0–1.0, got {}",
                self.denoising_strength
            )));
        }
        if self.steps == 0 || self.width == 0 || self.height == 0 {
            return Err(BookError::InvalidConfig(
                "diffusion steps and size must be non-zero".into(),
            ));
        }
        Ok(())
    }
}
