//! Image generation backends and the per-run selection policy.
//!
//! Two interchangeable sources sit behind [`ImageBackend`]:
//!
//! * [`RemoteImageBackend`] — an OpenAI-compatible `images/generations`
//!   endpoint. Text-to-image only; a seed image is ignored.
//! * [`LocalDiffusionBackend`] — a Stable Diffusion WebUI (`/sdapi/v1`)
//!   instance doing img2img from the page's seed image. It never fails a
//!   page: on any error it hands the seed back unchanged as
//!   [`ImageOutput::Fallback`].
//!
//! [`ImageRouter`] probes the local endpoint once per run and picks a
//! backend per page: local iff the toggle is on, the probe passed and the
//! page has a seed.

use crate::config::{BookConfig, DiffusionParams};
use crate::error::{BackendError, BookError};
use crate::pipeline::encode;
use futures::future::BoxFuture;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// What an image backend produced.
#[derive(Debug, Clone)]
pub enum ImageOutput {
    /// A freshly generated image.
    Generated(DynamicImage),
    /// Generation failed and the input seed is returned unchanged.
    Fallback { image: DynamicImage, reason: String },
}

impl ImageOutput {
    pub fn image(&self) -> &DynamicImage {
        match self {
            ImageOutput::Generated(img) => img,
            ImageOutput::Fallback { image, .. } => image,
        }
    }

    /// The degradation reason, if the seed was kept.
    pub fn warning(&self) -> Option<&str> {
        match self {
            ImageOutput::Generated(_) => None,
            ImageOutput::Fallback { reason, .. } => Some(reason.as_str()),
        }
    }
}

/// Which family a backend belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendKind {
    Remote,
    Local,
}

/// Produces an image from a prompt, optionally seeded by an input image.
pub trait ImageBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    fn generate<'a>(
        &'a self,
        prompt: &'a str,
        seed: Option<&'a DynamicImage>,
    ) -> BoxFuture<'a, Result<ImageOutput, BackendError>>;

    /// Lightweight reachability check. Backends without a status call are
    /// always considered available.
    fn probe(&self) -> BoxFuture<'_, bool> {
        Box::pin(async { true })
    }
}

// ── Remote ───────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct ImagesRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    size: &'a str,
    quality: &'a str,
    n: u32,
}

#[derive(Deserialize)]
struct ImagesResponse {
    #[serde(default)]
    data: Vec<ImageDatum>,
}

#[derive(Deserialize)]
struct ImageDatum {
    url: Option<String>,
    b64_json: Option<String>,
}

/// Output size requested from the remote service.
pub const REMOTE_IMAGE_SIZE: &str = "1024x1024";

/// OpenAI-compatible text-to-image backend.
pub struct RemoteImageBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    quality: String,
    timeout_secs: u64,
}

impl RemoteImageBackend {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self, BookError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| BookError::HttpClient(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            quality: "standard".to_string(),
            timeout_secs,
        })
    }

    /// Build from the run config with the page quality tier.
    pub fn from_config(config: &BookConfig, api_key: &str) -> Result<Self, BookError> {
        Ok(Self::new(
            &config.openai_base_url,
            api_key,
            &config.image_model,
            config.api_timeout_secs,
        )?
        .with_quality(&config.page_image_quality))
    }

    pub fn with_quality(mut self, quality: impl Into<String>) -> Self {
        self.quality = quality.into();
        self
    }

    async fn request(&self, prompt: &str) -> Result<DynamicImage, BackendError> {
        let url = format!("{}/images/generations", self.base_url);
        let body = ImagesRequest {
            model: &self.model,
            prompt,
            size: REMOTE_IMAGE_SIZE,
            quality: &self.quality,
            n: 1,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| BackendError::from_reqwest(&e, self.timeout_secs))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(BackendError::from_status(status.as_u16(), text));
        }

        let parsed: ImagesResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))?;
        let datum = parsed
            .data
            .into_iter()
            .next()
            .ok_or_else(|| BackendError::Api("images response contained no data".into()))?;

        if let Some(b64) = datum.b64_json {
            return encode::decode_base64_image(&b64);
        }
        let image_url = datum
            .url
            .ok_or_else(|| BackendError::Api("image entry has neither url nor b64_json".into()))?;
        self.fetch(&image_url).await
    }

    /// Materialise an image reference returned by the service.
    async fn fetch(&self, image_url: &str) -> Result<DynamicImage, BackendError> {
        debug!("Fetching generated image from {}", image_url);
        let response = self
            .client
            .get(image_url)
            .send()
            .await
            .map_err(|e| BackendError::from_reqwest(&e, self.timeout_secs))?;
        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::from_status(
                status.as_u16(),
                format!("image download failed: {image_url}"),
            ));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| BackendError::from_reqwest(&e, self.timeout_secs))?;
        encode::decode_image_bytes(&bytes)
    }
}

impl ImageBackend for RemoteImageBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Remote
    }

    fn generate<'a>(
        &'a self,
        prompt: &'a str,
        _seed: Option<&'a DynamicImage>,
    ) -> BoxFuture<'a, Result<ImageOutput, BackendError>> {
        Box::pin(async move {
            let start = Instant::now();
            let image = self.request(prompt).await?;
            debug!(
                "Remote image {}x{} ({}) in {:?}",
                image.width(),
                image.height(),
                self.quality,
                start.elapsed()
            );
            Ok(ImageOutput::Generated(image))
        })
    }
}

// ── Local diffusion ──────────────────────────────────────────────────────────

/// Status path used by the availability probe.
pub const PROBE_PATH: &str = "/sdapi/v1/sd-models";
/// Generation path (img2img).
pub const IMG2IMG_PATH: &str = "/sdapi/v1/img2img";

#[derive(Serialize)]
struct Img2ImgRequest<'a> {
    init_images: Vec<String>,
    prompt: &'a str,
    sampler_name: &'a str,
    cfg_scale: f32,
    steps: u32,
    denoising_strength: f32,
    width: u32,
    height: u32,
}

#[derive(Deserialize)]
struct Img2ImgResponse {
    #[serde(default)]
    images: Vec<String>,
}

/// Stable Diffusion WebUI img2img backend.
///
/// One base URL serves both the probe and generation.
pub struct LocalDiffusionBackend {
    client: reqwest::Client,
    endpoint: String,
    params: DiffusionParams,
    timeout_secs: u64,
    probe_timeout_secs: u64,
}

impl LocalDiffusionBackend {
    pub fn new(
        endpoint: impl Into<String>,
        params: DiffusionParams,
        timeout_secs: u64,
        probe_timeout_secs: u64,
    ) -> Result<Self, BookError> {
        // Per-request timeouts are set on each call; the probe uses a shorter one.
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| BookError::HttpClient(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            params,
            timeout_secs,
            probe_timeout_secs,
        })
    }

    pub fn from_config(config: &BookConfig) -> Result<Self, BookError> {
        Self::new(
            &config.local_endpoint,
            config.diffusion.clone(),
            config.local_timeout_secs,
            config.probe_timeout_secs,
        )
    }

    async fn img2img(&self, prompt: &str, seed: &DynamicImage) -> Result<DynamicImage, BackendError> {
        let init = encode::encode_png_base64(seed)
            .map_err(|e| BackendError::Decode(format!("seed encoding failed: {e}")))?;
        let body = Img2ImgRequest {
            init_images: vec![init],
            prompt,
            sampler_name: &self.params.sampler_name,
            cfg_scale: self.params.cfg_scale,
            steps: self.params.steps,
            denoising_strength: self.params.denoising_strength,
            width: self.params.width,
            height: self.params.height,
        };

        let response = self
            .client
            .post(format!("{}{}", self.endpoint, IMG2IMG_PATH))
            .timeout(Duration::from_secs(self.timeout_secs))
            .json(&body)
            .send()
            .await
            .map_err(|e| BackendError::from_reqwest(&e, self.timeout_secs))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(BackendError::from_status(status.as_u16(), text));
        }

        let parsed: Img2ImgResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))?;
        let first = parsed
            .images
            .first()
            .ok_or_else(|| BackendError::Api("img2img response contained no images".into()))?;
        encode::decode_base64_image(first)
    }
}

impl ImageBackend for LocalDiffusionBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    fn generate<'a>(
        &'a self,
        prompt: &'a str,
        seed: Option<&'a DynamicImage>,
    ) -> BoxFuture<'a, Result<ImageOutput, BackendError>> {
        Box::pin(async move {
            let seed = seed.ok_or(BackendError::MissingSeed)?;
            let start = Instant::now();
            match self.img2img(prompt, seed).await {
                Ok(image) => {
                    debug!("Local img2img in {:?}", start.elapsed());
                    Ok(ImageOutput::Generated(image))
                }
                Err(e) => {
                    warn!("Local diffusion failed, keeping the seed image: {}", e);
                    Ok(ImageOutput::Fallback {
                        image: seed.clone(),
                        reason: format!("local diffusion failed: {e}"),
                    })
                }
            }
        })
    }

    fn probe(&self) -> BoxFuture<'_, bool> {
        Box::pin(async move {
            let url = format!("{}{}", self.endpoint, PROBE_PATH);
            let result = self
                .client
                .get(&url)
                .timeout(Duration::from_secs(self.probe_timeout_secs))
                .send()
                .await;
            match result {
                Ok(resp) if resp.status() == reqwest::StatusCode::OK => true,
                Ok(resp) => {
                    debug!("Probe {} returned HTTP {}", url, resp.status());
                    false
                }
                Err(e) => {
                    debug!("Probe {} failed: {}", url, e);
                    false
                }
            }
        })
    }
}

// ── Selection policy ─────────────────────────────────────────────────────────

/// The route a page takes through the router.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Local,
    Remote,
}

/// Per-run backend selection with a cached availability probe.
pub struct ImageRouter {
    remote: Arc<dyn ImageBackend>,
    local: Option<Arc<dyn ImageBackend>>,
    local_available: bool,
}

impl ImageRouter {
    /// Probe the local backend (at most once) and fix the policy for the run.
    pub async fn prepare(
        remote: Arc<dyn ImageBackend>,
        local: Option<Arc<dyn ImageBackend>>,
        use_local: bool,
    ) -> Self {
        let local_available = match (&local, use_local) {
            (Some(backend), true) => {
                let ok = backend.probe().await;
                if ok {
                    info!("Local diffusion backend is available");
                } else {
                    warn!("Local diffusion backend is unreachable; using the remote backend for every page");
                }
                ok
            }
            _ => false,
        };
        Self {
            remote,
            local,
            local_available,
        }
    }

    pub fn local_available(&self) -> bool {
        self.local_available
    }

    /// Pick the route for a page.
    pub fn route(&self, has_seed: bool) -> Route {
        if has_seed && self.local_available && self.local.is_some() {
            Route::Local
        } else {
            Route::Remote
        }
    }

    /// The backend for a route. Falls back to remote if no local backend exists.
    pub fn backend(&self, route: Route) -> &Arc<dyn ImageBackend> {
        match (route, &self.local) {
            (Route::Local, Some(local)) => local,
            _ => &self.remote,
        }
    }

    pub fn remote(&self) -> &Arc<dyn ImageBackend> {
        &self.remote
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Probed {
        up: bool,
        probes: AtomicUsize,
    }

    impl ImageBackend for Probed {
        fn kind(&self) -> BackendKind {
            BackendKind::Local
        }

        fn generate<'a>(
            &'a self,
            _prompt: &'a str,
            _seed: Option<&'a DynamicImage>,
        ) -> BoxFuture<'a, Result<ImageOutput, BackendError>> {
            Box::pin(async { Err(BackendError::MissingSeed) })
        }

        fn probe(&self) -> BoxFuture<'_, bool> {
            self.probes.fetch_add(1, Ordering::SeqCst);
            let up = self.up;
            Box::pin(async move { up })
        }
    }

    fn remote() -> Arc<dyn ImageBackend> {
        Arc::new(RemoteImageBackend::new("http://127.0.0.1:9", "k", "dall-e-3", 1).unwrap())
    }

    fn seed() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb([10, 20, 30])))
    }

    #[tokio::test]
    async fn route_requires_toggle_availability_and_seed() {
        let local = Arc::new(Probed {
            up: true,
            probes: AtomicUsize::new(0),
        });
        let router = ImageRouter::prepare(remote(), Some(local.clone() as Arc<dyn ImageBackend>), true).await;
        assert!(router.local_available());
        assert_eq!(router.route(true), Route::Local);
        assert_eq!(router.route(false), Route::Remote);
        assert_eq!(router.backend(Route::Local).kind(), BackendKind::Local);
        assert_eq!(local.probes.load(Ordering::SeqCst), 1);

        let router = ImageRouter::prepare(remote(), Some(local.clone() as Arc<dyn ImageBackend>), false).await;
        assert_eq!(router.route(true), Route::Remote);
        assert_eq!(local.probes.load(Ordering::SeqCst), 1, "toggle off skips the probe");
    }

    #[tokio::test]
    async fn unavailable_local_is_disabled_for_the_run() {
        let local = Arc::new(Probed {
            up: false,
            probes: AtomicUsize::new(0),
        });
        let router = ImageRouter::prepare(remote(), Some(local.clone() as Arc<dyn ImageBackend>), true).await;
        assert!(!router.local_available());
        for _ in 0..5 {
            assert_eq!(router.route(true), Route::Remote);
        }
        assert_eq!(local.probes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unreachable_local_endpoint_is_unavailable() {
        // Port 9 (discard) is not served by anything in the test environment.
        let local =
            LocalDiffusionBackend::new("http://127.0.0.1:9", DiffusionParams::default(), 2, 1)
                .unwrap();
        assert!(!local.probe().await);
    }

    #[tokio::test]
    async fn local_network_failure_returns_seed_unchanged() {
        let local =
            LocalDiffusionBackend::new("http://127.0.0.1:9", DiffusionParams::default(), 2, 1)
                .unwrap();
        let seed = seed();
        let out = local.generate("fantasy", Some(&seed)).await.unwrap();
        assert!(out.warning().is_some());
        assert_eq!(out.image().to_rgb8().as_raw(), seed.to_rgb8().as_raw());
    }

    #[tokio::test]
    async fn local_without_seed_is_an_error() {
        let local =
            LocalDiffusionBackend::new("http://127.0.0.1:9", DiffusionParams::default(), 2, 1)
                .unwrap();
        assert_eq!(
            local.generate("x", None).await.unwrap_err(),
            BackendError::MissingSeed
        );
    }

    #[tokio::test]
    async fn remote_network_failure_is_an_error() {
        let err = remote().generate("x", None).await.unwrap_err();
        assert!(
            matches!(err, BackendError::Network(_) | BackendError::Timeout { .. }),
            "got: {err:?}"
        );
    }

    #[test]
    fn img2img_payload_shape() {
        let params = DiffusionParams::default();
        let body = Img2ImgRequest {
            init_images: vec!["AAAA".into()],
            prompt: "unicorn",
            sampler_name: &params.sampler_name,
            cfg_scale: params.cfg_scale,
            steps: params.steps,
            denoising_strength: params.denoising_strength,
            width: params.width,
            height: params.height,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["sampler_name"], "Euler a");
        assert_eq!(json["cfg_scale"], 7.0);
        assert_eq!(json["steps"], 30);
        assert_eq!(json["width"], 512);
        assert_eq!(json["init_images"][0], "AAAA");
    }

    #[test]
    fn images_request_shape() {
        let body = ImagesRequest {
            model: "dall-e-3",
            prompt: "unicorn",
            size: REMOTE_IMAGE_SIZE,
            quality: "hd",
            n: 1,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["size"], "1024x1024");
        assert_eq!(json["quality"], "hd");
        assert_eq!(json["n"], 1);
    }
}
