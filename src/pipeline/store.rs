//! Scoped scratch storage for generated images.
//!
//! Generated images are staged as PNG files in a private [`TempDir`] between
//! generation and embedding so a 50-page coloring book never holds 50
//! decoded bitmaps at once. [`ImageStore::take`] loads an image and deletes
//! its file in one step; whatever is left when the store is dropped
//! (including after a failed assembly) goes with the directory.

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tempfile::TempDir;
use tracing::debug;

/// Reference to a staged image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageHandle {
    pub id: usize,
    pub width: u32,
    pub height: u32,
}

/// Owner of the run's scratch directory.
pub struct ImageStore {
    dir: TempDir,
    next_id: usize,
}

impl ImageStore {
    pub fn new() -> std::io::Result<Self> {
        let dir = tempfile::Builder::new().prefix("kdp-bookgen-").tempdir()?;
        debug!("Scratch storage at {}", dir.path().display());
        Ok(Self { dir, next_id: 0 })
    }

    fn path_for(&self, id: usize) -> PathBuf {
        self.dir.path().join(format!("image-{id:03}.png"))
    }

    /// Stage an image and return its handle.
    pub fn put(&mut self, image: &DynamicImage) -> Result<ImageHandle, image::ImageError> {
        let id = self.next_id;
        image.save_with_format(self.path_for(id), image::ImageFormat::Png)?;
        self.next_id += 1;
        Ok(ImageHandle {
            id,
            width: image.width(),
            height: image.height(),
        })
    }

    /// Load a staged image and release its file.
    ///
    /// Each handle can be taken once; a second call fails because the file
    /// is gone.
    pub fn take(&mut self, handle: &ImageHandle) -> Result<DynamicImage, image::ImageError> {
        let path = self.path_for(handle.id);
        let image = image::open(&path)?;
        std::fs::remove_file(&path)?;
        Ok(image)
    }

    /// Number of images currently staged on disk.
    pub fn staged(&self) -> usize {
        std::fs::read_dir(self.dir.path())
            .map(|entries| entries.filter_map(Result::ok).count())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn red(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb([255, 0, 0])))
    }

    #[test]
    fn put_then_take_releases_file() {
        let mut store = ImageStore::new().unwrap();
        let handle = store.put(&red(8, 4)).unwrap();
        assert_eq!((handle.width, handle.height), (8, 4));
        assert_eq!(store.staged(), 1);

        let img = store.take(&handle).unwrap();
        assert_eq!(img.width(), 8);
        assert_eq!(store.staged(), 0);
        assert!(store.take(&handle).is_err(), "handle must be single-use");
    }

    #[test]
    fn drop_removes_directory() {
        let mut store = ImageStore::new().unwrap();
        store.put(&red(2, 2)).unwrap();
        let dir = store.dir.path().to_path_buf();
        drop(store);
        assert!(!dir.exists());
    }
}
