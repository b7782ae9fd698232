//! Multi-threshold blob detection.
//!
//! The pipeline sweeps binarization levels over a grayscale image
//! ([`scanner`]), follows each region across levels and merges tracks that
//! land on the same spot ([`aggregate`]), then keeps the blobs that satisfy
//! the area and shape limits ([`filter`]).

pub mod aggregate;
pub mod config;
pub mod filter;
pub mod scanner;

use image::{DynamicImage, GrayImage};
use kornia::{
    image::{ImageError, ImageSize, allocator::CpuAllocator},
    imgproc,
};
use log::debug;

pub use aggregate::{BlobAggregator, BlobCandidate, aggregate, suppress_duplicates};
pub use config::{
    BlobColor, ConfigError, Connectivity, DetectionConfig, DetectionParams, Polarity,
    RepresentativeLevel,
};
pub use filter::accepts;
pub use scanner::{ConnectedRegion, LevelRegions, ThresholdScanner};

use scanner::CpuImage;

/// Errors that can occur while detecting blobs in one image.
#[derive(Debug, thiserror::Error)]
pub enum DetectionError {
    #[error("invalid image: {width}x{height} has no pixels")]
    InvalidImage { width: u32, height: u32 },
    #[error("kornia image error: {0}")]
    Kornia(#[from] ImageError),
}

/// Detects blobs and returns their integer pixel positions, row-major.
///
/// Sub-pixel centroids are truncated, not rounded. A blank image or one
/// without qualifying blobs yields an empty vector.
pub fn detect(image: &GrayImage, config: &DetectionConfig) -> Result<Vec<(i32, i32)>, DetectionError> {
    Ok(detect_blobs(image, config)?
        .iter()
        .map(|b| (b.centroid.0 as i32, b.centroid.1 as i32))
        .collect())
}

/// Like [`detect`], but keeps the full blob description.
pub fn detect_blobs(
    image: &GrayImage,
    config: &DetectionConfig,
) -> Result<Vec<BlobCandidate>, DetectionError> {
    run(ThresholdScanner::new(image, config)?, config)
}

/// Detects blobs in a color or grayscale image of any pixel format.
pub fn detect_from_image(
    source: &DynamicImage,
    config: &DetectionConfig,
) -> Result<Vec<(i32, i32)>, DetectionError> {
    let gray = grayscale(source)?;
    Ok(run(ThresholdScanner::from_gray(gray, config)?, config)?
        .iter()
        .map(|b| (b.centroid.0 as i32, b.centroid.1 as i32))
        .collect())
}

/// Converts to 8-bit luma through kornia's RGB weights.
pub(crate) fn grayscale(source: &DynamicImage) -> Result<CpuImage<u8, 1>, DetectionError> {
    let rgb = source.to_rgb8();
    let (width, height) = rgb.dimensions();
    if width == 0 || height == 0 {
        return Err(DetectionError::InvalidImage { width, height });
    }
    let image = CpuImage::<u8, 3>::new(
        ImageSize {
            width: width as usize,
            height: height as usize,
        },
        rgb.into_raw(),
        CpuAllocator,
    )?;
    let mut gray = CpuImage::<u8, 1>::from_size_val(image.size(), 0u8, CpuAllocator)?;
    imgproc::color::gray_from_rgb_u8(&image, &mut gray)?;
    Ok(gray)
}

fn run(
    scanner: ThresholdScanner<'_>,
    config: &DetectionConfig,
) -> Result<Vec<BlobCandidate>, DetectionError> {
    let mut aggregator = BlobAggregator::new(config);
    for level in scanner {
        aggregator.push_level(level?);
    }
    let tracked = aggregator.finish();
    let tracks = tracked.len();
    let candidates = suppress_duplicates(tracked, config);
    let total = candidates.len();
    let accepted: Vec<BlobCandidate> = candidates
        .into_iter()
        .filter(|c| accepts(c, config))
        .collect();
    debug!(
        "{} tracks, {} distinct blob candidates, {} accepted",
        tracks,
        total,
        accepted.len()
    );
    Ok(accepted)
}
