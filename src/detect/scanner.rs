//! Threshold sweep and connected-region extraction.
//!
//! [`ThresholdScanner`] binarizes the grayscale image once per threshold level
//! and labels the resulting mask. Each region carries its pixel area, mean
//! pixel centroid, boundary length and circularity.
//!
//! A region whose bounding box spans the whole frame is background, not a
//! blob, and is dropped. A uniform image therefore yields no regions.

use std::collections::VecDeque;
use std::f32::consts::PI;
use std::iter::StepBy;
use std::ops::RangeInclusive;

use image::{GrayImage, Luma};
use imageproc::contours::{BorderType, find_contours};
use imageproc::point::Point;
use kornia::{
    image::{Image, ImageError, ImageSize, allocator::CpuAllocator},
    imgproc,
};

use super::DetectionError;
use super::config::{Connectivity, DetectionConfig, Polarity};

pub(crate) type CpuImage<T, const C: usize> = Image<T, C, CpuAllocator>;

const MASK_ON: u8 = 255;

/// A maximal connected set of mask pixels at one threshold level.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectedRegion {
    pub polarity: Polarity,
    /// Pixel count.
    pub area: u32,
    /// Mean pixel coordinate `(x, y)`.
    pub centroid: (f32, f32),
    /// Length of the outer border; diagonal steps count `sqrt(2)`.
    pub perimeter: f32,
    /// `4*pi*area / perimeter^2`, clamped to `[0, 1]`.
    pub circularity: f32,
    /// Inclusive bounding box `[min_x, min_y, max_x, max_y]`.
    pub bbox: [u32; 4],
}

impl ConnectedRegion {
    fn spans_frame(&self, width: usize, height: usize) -> bool {
        let [min_x, min_y, max_x, max_y] = self.bbox;
        min_x == 0 && min_y == 0 && max_x as usize + 1 == width && max_y as usize + 1 == height
    }
}

/// All regions found at one threshold level.
#[derive(Debug, Clone)]
pub struct LevelRegions {
    pub level: u8,
    pub regions: Vec<ConnectedRegion>,
}

/// Lazy sweep over the configured threshold levels, ascending.
pub struct ThresholdScanner<'a> {
    config: &'a DetectionConfig,
    gray: CpuImage<u8, 1>,
    mask: CpuImage<u8, 1>,
    labels: Vec<u32>,
    levels: StepBy<RangeInclusive<u8>>,
}

impl<'a> ThresholdScanner<'a> {
    pub fn new(image: &GrayImage, config: &'a DetectionConfig) -> Result<Self, DetectionError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(DetectionError::InvalidImage { width, height });
        }
        let gray = CpuImage::<u8, 1>::new(
            ImageSize {
                width: width as usize,
                height: height as usize,
            },
            image.as_raw().clone(),
            CpuAllocator,
        )?;
        Self::from_gray(gray, config)
    }

    pub(crate) fn from_gray(
        gray: CpuImage<u8, 1>,
        config: &'a DetectionConfig,
    ) -> Result<Self, DetectionError> {
        let size = gray.size();
        if size.width == 0 || size.height == 0 {
            return Err(DetectionError::InvalidImage {
                width: size.width as u32,
                height: size.height as u32,
            });
        }
        let mask = CpuImage::<u8, 1>::from_size_val(size, 0u8, CpuAllocator)?;
        Ok(Self {
            config,
            labels: vec![0; size.width * size.height],
            levels: config.levels(),
            gray,
            mask,
        })
    }

    fn scan_level(&mut self, level: u8) -> Result<LevelRegions, DetectionError> {
        let params = self.config.params();
        let size = self.gray.size();
        let mut regions = Vec::new();
        for &polarity in params.blob_color.polarities() {
            binarize(&self.gray, &mut self.mask, level, polarity)?;
            self.labels.fill(0);
            regions.extend(
                label_regions(
                    self.mask.as_slice(),
                    &mut self.labels,
                    size.width,
                    size.height,
                    params.connectivity,
                    polarity,
                )
                .into_iter()
                .filter(|r| !r.spans_frame(size.width, size.height)),
            );
        }
        Ok(LevelRegions { level, regions })
    }
}

impl Iterator for ThresholdScanner<'_> {
    type Item = Result<LevelRegions, DetectionError>;

    fn next(&mut self) -> Option<Self::Item> {
        let level = self.levels.next()?;
        Some(self.scan_level(level))
    }
}

fn binarize(
    gray: &CpuImage<u8, 1>,
    mask: &mut CpuImage<u8, 1>,
    level: u8,
    polarity: Polarity,
) -> Result<(), ImageError> {
    match polarity {
        Polarity::Dark => imgproc::threshold::threshold_binary_inverse(gray, mask, level, MASK_ON),
        Polarity::Bright => match level.checked_sub(1) {
            Some(below) => imgproc::threshold::threshold_binary(gray, mask, below, MASK_ON),
            // nothing is above u8::MAX, so the inverse marks every sample
            None => imgproc::threshold::threshold_binary_inverse(gray, mask, u8::MAX, MASK_ON),
        },
    }
}

/// Labels every connected set of non-zero mask pixels in raster order.
///
/// `labels` must be zeroed and `width * height` long; on return it holds the
/// 1-based region index of every foreground pixel.
pub(crate) fn label_regions(
    mask: &[u8],
    labels: &mut [u32],
    width: usize,
    height: usize,
    connectivity: Connectivity,
    polarity: Polarity,
) -> Vec<ConnectedRegion> {
    let mut out = Vec::new();
    let mut queue = VecDeque::new();
    let mut next_label = 1u32;

    for start in 0..mask.len() {
        if mask[start] == 0 || labels[start] != 0 {
            continue;
        }

        let label = next_label;
        next_label += 1;
        labels[start] = label;
        queue.push_back(start);

        let mut sum_x = 0f64;
        let mut sum_y = 0f64;
        let mut count = 0u32;
        let mut bbox = [u32::MAX, u32::MAX, 0, 0];

        while let Some(idx) = queue.pop_front() {
            let y = idx / width;
            let x = idx % width;
            sum_x += x as f64;
            sum_y += y as f64;
            count += 1;
            bbox[0] = bbox[0].min(x as u32);
            bbox[1] = bbox[1].min(y as u32);
            bbox[2] = bbox[2].max(x as u32);
            bbox[3] = bbox[3].max(y as u32);

            for &(dx, dy) in connectivity.offsets() {
                let Some(next) = neighbour(x, y, dx, dy, width, height) else {
                    continue;
                };
                if mask[next] == 0 || labels[next] != 0 {
                    continue;
                }
                labels[next] = label;
                queue.push_back(next);
            }
        }

        let perimeter = region_perimeter(labels, width, bbox, label);
        out.push(ConnectedRegion {
            polarity,
            area: count,
            centroid: (
                (sum_x / count as f64) as f32,
                (sum_y / count as f64) as f32,
            ),
            perimeter,
            circularity: circularity(count, perimeter),
            bbox,
        });
    }

    out
}

fn neighbour(
    x: usize,
    y: usize,
    dx: isize,
    dy: isize,
    width: usize,
    height: usize,
) -> Option<usize> {
    let nx = x.checked_add_signed(dx)?;
    let ny = y.checked_add_signed(dy)?;
    (nx < width && ny < height).then_some(ny * width + nx)
}

/// Length of the outer border of region `label`, found by `find_contours`
/// on a crop of the region alone.
///
/// The crop keeps one background pixel on every side so the region's first
/// raster pixel is never on the crop edge.
fn region_perimeter(labels: &[u32], width: usize, bbox: [u32; 4], label: u32) -> f32 {
    let [min_x, min_y, max_x, max_y] = bbox;
    let mut crop = GrayImage::new(max_x - min_x + 3, max_y - min_y + 3);
    for y in min_y..=max_y {
        for x in min_x..=max_x {
            if labels[y as usize * width + x as usize] == label {
                crop.put_pixel(x - min_x + 1, y - min_y + 1, Luma([MASK_ON]));
            }
        }
    }
    find_contours::<i32>(&crop)
        .into_iter()
        .find(|c| c.border_type == BorderType::Outer)
        .map_or(0.0, |c| closed_length(&c.points))
}

/// Sum of the steps around a closed border, last point back to the first.
fn closed_length(points: &[Point<i32>]) -> f32 {
    if points.len() < 2 {
        return 0.0;
    }
    points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(a, b)| ((b.x - a.x) as f32).hypot((b.y - a.y) as f32))
        .sum()
}

fn circularity(area: u32, perimeter: f32) -> f32 {
    if perimeter <= 0.0 {
        return 1.0;
    }
    (4.0 * PI * area as f32 / (perimeter * perimeter)).clamp(0.0, 1.0)
}
