//! Image encoding: `DynamicImage` ⇄ base64 PNG.
//!
//! The local diffusion API takes and returns images as bare base64 strings
//! in its JSON bodies; the remote images API may return `b64_json` too.
//! PNG is used for seeds because it is lossless: line art loses its crisp
//! edges under JPEG compression, and img2img faithfully reproduces the
//! artefacts.

use crate::error::BackendError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Encode an image as a base64 PNG string.
pub fn encode_png_base64(img: &DynamicImage) -> Result<String, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;

    let b64 = STANDARD.encode(&buf);
    debug!("Encoded image → {} bytes base64", b64.len());
    Ok(b64)
}

/// Decode a base64 image payload (PNG or JPEG).
///
/// Some servers prefix the payload with a `data:image/png;base64,` URI
/// header; it is stripped before decoding.
pub fn decode_base64_image(payload: &str) -> Result<DynamicImage, BackendError> {
    let data = match payload.split_once(";base64,") {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => payload,
    };
    let bytes = STANDARD
        .decode(data.trim())
        .map_err(|e| BackendError::Decode(format!("invalid base64: {e}")))?;
    decode_image_bytes(&bytes)
}

/// Decode raw image bytes (PNG or JPEG).
pub fn decode_image_bytes(bytes: &[u8]) -> Result<DynamicImage, BackendError> {
    image::load_from_memory(bytes).map_err(|e| BackendError::Decode(format!("invalid image: {e}")))
}
