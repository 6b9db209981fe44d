use std::path::Path;

use image::DynamicImage;
use tracing::info;

use super::{TerrainError, TerrainResult};
use crate::config::PatchLayout;

/// A 2-D sampled image the grid reads its heights from.
///
/// Samples are row-major; the height of a pixel is its last channel byte.
pub trait HeightSource {
    /// Number of columns (grid z axis).
    fn width(&self) -> usize;
    /// Number of rows (grid x axis).
    fn height(&self) -> usize;
    fn bytes_per_pixel(&self) -> usize;
    fn data(&self) -> &[u8];

    /// Height sample at row `x`, column `z`, or `None` outside the image.
    fn sample(&self, x: usize, z: usize) -> Option<u8> {
        if x >= self.height() || z >= self.width() {
            return None;
        }
        let bpp = self.bytes_per_pixel().max(1);
        let index = (x * self.width() + z) * bpp + (bpp - 1);
        self.data().get(index).copied()
    }
}

/// Owned height samples, either built in memory or decoded from an image file.
#[derive(Debug, Clone, PartialEq)]
pub struct RawHeightSource {
    width: usize,
    height: usize,
    bytes_per_pixel: usize,
    data: Vec<u8>,
}

impl RawHeightSource {
    pub fn new(width: usize, height: usize, bytes_per_pixel: usize, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            bytes_per_pixel: bytes_per_pixel.max(1),
            data,
        }
    }

    /// Single-channel samples, one byte per pixel.
    pub fn from_heights(width: usize, height: usize, heights: Vec<u8>) -> Self {
        Self::new(width, height, 1, heights)
    }

    /// Builds samples from a function of (row, column).
    pub fn from_fn<F>(width: usize, height: usize, mut f: F) -> Self
    where
        F: FnMut(usize, usize) -> u8,
    {
        let mut data = Vec::with_capacity(width * height);
        for x in 0..height {
            for z in 0..width {
                data.push(f(x, z));
            }
        }
        Self::from_heights(width, height, data)
    }

    pub fn from_image(img: &DynamicImage) -> Self {
        let (width, height) = (img.width() as usize, img.height() as usize);
        match img {
            DynamicImage::ImageLuma8(_)
            | DynamicImage::ImageLumaA8(_)
            | DynamicImage::ImageRgb8(_)
            | DynamicImage::ImageRgba8(_) => Self::new(
                width,
                height,
                img.color().bytes_per_pixel() as usize,
                img.as_bytes().to_vec(),
            ),
            // Wider formats are reduced to 8-bit luminance.
            _ => Self::from_heights(width, height, img.to_luma8().into_raw()),
        }
    }

    pub fn open<P: AsRef<Path>>(path: P) -> TerrainResult<Self> {
        let path = path.as_ref();
        let img = image::open(path)?;
        let source = Self::from_image(&img);
        info!(
            "Loaded height source {:?}: {}x{} ({} bytes per pixel)",
            path, source.width, source.height, source.bytes_per_pixel
        );
        Ok(source)
    }
}

impl HeightSource for RawHeightSource {
    fn width(&self) -> usize {
        self.width
    }

    fn height(&self) -> usize {
        self.height
    }

    fn bytes_per_pixel(&self) -> usize {
        self.bytes_per_pixel
    }

    fn data(&self) -> &[u8] {
        &self.data
    }
}

/// Checks a source is usable for a terrain with the given layout.
///
/// Loading never fails on its own, so callers that take untrusted images run
/// this first.
pub fn validate_height_source<S: HeightSource + ?Sized>(
    source: &S,
    layout: &PatchLayout,
) -> TerrainResult<()> {
    let min = layout.patch_edge();
    if source.width() <= min || source.height() <= min {
        return Err(TerrainError::DegenerateSource {
            width: source.width(),
            height: source.height(),
            min,
        });
    }
    let expected = source.width() * source.height() * source.bytes_per_pixel();
    if source.data().len() < expected {
        return Err(TerrainError::TruncatedSource {
            expected,
            actual: source.data().len(),
        });
    }
    Ok(())
}
