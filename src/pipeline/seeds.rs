//! Seed images for coloring pages.
//!
//! The caller supplies an ordered list of source images, one per page
//! index. Files are decoded lazily, when their page comes up, so an
//! unreadable file costs one error page instead of the whole run. Each slot
//! is handed out at most once.

use crate::config::SeedImage;
use crate::error::BackendError;
use image::DynamicImage;
use std::path::Path;
use tracing::debug;

/// The ordered, consume-once collection of seed images for a run.
pub struct SeedImages {
    slots: Vec<Option<SeedImage>>,
}

impl SeedImages {
    pub fn new(seeds: &[SeedImage]) -> Self {
        Self {
            slots: seeds.iter().cloned().map(Some).collect(),
        }
    }

    pub fn empty() -> Self {
        Self { slots: Vec::new() }
    }

    /// Number of supplied seeds, consumed or not.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Take the seed for page `index` (1-based).
    ///
    /// Returns `None` past the supplied count or when the slot was already
    /// taken; `Some(Err(_))` when the file cannot be decoded.
    pub fn take(&mut self, index: usize) -> Option<Result<DynamicImage, BackendError>> {
        let slot = self.slots.get_mut(index.checked_sub(1)?)?.take()?;
        Some(match slot {
            SeedImage::Decoded(img) => Ok(img),
            SeedImage::File(path) => load_seed(&path),
        })
    }
}

/// Decode a seed file and normalise it to RGB.
fn load_seed(path: &Path) -> Result<DynamicImage, BackendError> {
    let img = image::open(path)
        .map_err(|e| BackendError::SeedImage(format!("{}: {e}", path.display())))?;
    debug!("Loaded seed {} ({}x{})", path.display(), img.width(), img.height());
    Ok(DynamicImage::ImageRgb8(img.to_rgb8()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::path::PathBuf;

    fn decoded() -> SeedImage {
        SeedImage::Decoded(DynamicImage::ImageRgb8(RgbImage::from_pixel(2, 2, Rgb([1, 2, 3]))))
    }

    #[test]
    fn seeds_are_one_based_and_single_use() {
        let mut seeds = SeedImages::new(&[decoded(), decoded()]);
        assert_eq!(seeds.len(), 2);
        assert!(seeds.take(0).is_none());
        assert!(seeds.take(1).unwrap().is_ok());
        assert!(seeds.take(1).is_none(), "slot consumed");
        assert!(seeds.take(2).is_some());
        assert!(seeds.take(3).is_none(), "beyond supplied count");
    }

    #[test]
    fn files_load_lazily() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("page1.png");
        RgbImage::from_pixel(5, 3, Rgb([9, 9, 9])).save(&good).unwrap();
        let missing = PathBuf::from("/definitely/not/here.png");

        let mut seeds = SeedImages::new(&[SeedImage::File(good), SeedImage::File(missing)]);
        let first = seeds.take(1).unwrap().unwrap();
        assert_eq!((first.width(), first.height()), (5, 3));
        assert!(matches!(seeds.take(2), Some(Err(BackendError::SeedImage(_)))));
    }
}
