//! Detection parameters and their validated form.
//!
//! [`DetectionParams`] is a plain value the caller fills in (CLI flags, a JSON
//! file, a test). [`DetectionConfig::new`] checks it once and is the only way to
//! obtain a config the pipeline accepts, so stages never re-validate.

use std::iter::StepBy;
use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

/// Which side of the threshold counts as foreground.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Polarity {
    /// Pixels at or below the level.
    Dark,
    /// Pixels at or above the level.
    Bright,
}

/// Blob colors the scanner looks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlobColor {
    Dark,
    Bright,
    /// Both dark and bright regions; each region keeps its own polarity.
    Any,
}

impl BlobColor {
    pub fn polarities(self) -> &'static [Polarity] {
        match self {
            BlobColor::Dark => &[Polarity::Dark],
            BlobColor::Bright => &[Polarity::Bright],
            BlobColor::Any => &[Polarity::Dark, Polarity::Bright],
        }
    }
}

/// Pixel neighbourhood used when labeling mask regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Connectivity {
    /// Horizontal and vertical neighbours only.
    Four,
    /// Diagonal neighbours included.
    Eight,
}

impl Connectivity {
    pub(crate) fn offsets(self) -> &'static [(isize, isize)] {
        match self {
            Connectivity::Four => &[(-1, 0), (1, 0), (0, -1), (0, 1)],
            Connectivity::Eight => &[
                (-1, -1),
                (0, -1),
                (1, -1),
                (-1, 0),
                (1, 0),
                (-1, 1),
                (0, 1),
                (1, 1),
            ],
        }
    }
}

/// Threshold level whose measurements represent an aggregated blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepresentativeLevel {
    /// The first level at which the blob was seen.
    First,
    /// The level whose area is closest to the middle of `[min_area, max_area]`.
    AreaBandCenter,
}

/// Caller-supplied detection parameters. No field has a default here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionParams {
    pub min_area: u32,
    pub max_area: u32,
    pub use_circularity_filter: bool,
    pub min_circularity: f32,
    pub min_threshold: u8,
    pub max_threshold: u8,
    pub threshold_step: u8,
    pub centroid_match_tolerance: f32,
    pub min_repeatability: u32,
    pub blob_color: BlobColor,
    pub connectivity: Connectivity,
    pub representative: RepresentativeLevel,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("min area {min} exceeds max area {max}")]
    AreaBounds { min: u32, max: u32 },
    #[error("min circularity {0} is outside [0, 1]")]
    Circularity(f32),
    #[error("threshold step must be positive")]
    ZeroThresholdStep,
    #[error("min threshold {min} exceeds max threshold {max}")]
    ThresholdRange { min: u8, max: u8 },
    #[error("centroid match tolerance must be a positive finite number, got {0}")]
    MatchTolerance(f32),
    #[error("min repeatability must be at least 1")]
    ZeroRepeatability,
}

/// Validated detection configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionConfig {
    params: DetectionParams,
}

impl DetectionConfig {
    pub fn new(params: DetectionParams) -> Result<Self, ConfigError> {
        if params.min_area > params.max_area {
            return Err(ConfigError::AreaBounds {
                min: params.min_area,
                max: params.max_area,
            });
        }
        // NaN fails the range check as well.
        if !(0.0..=1.0).contains(&params.min_circularity) {
            return Err(ConfigError::Circularity(params.min_circularity));
        }
        if params.threshold_step == 0 {
            return Err(ConfigError::ZeroThresholdStep);
        }
        if params.min_threshold > params.max_threshold {
            return Err(ConfigError::ThresholdRange {
                min: params.min_threshold,
                max: params.max_threshold,
            });
        }
        let tol = params.centroid_match_tolerance;
        if !tol.is_finite() || tol <= 0.0 {
            return Err(ConfigError::MatchTolerance(tol));
        }
        if params.min_repeatability == 0 {
            return Err(ConfigError::ZeroRepeatability);
        }
        Ok(Self { params })
    }

    pub fn params(&self) -> &DetectionParams {
        &self.params
    }

    /// Threshold levels in ascending order, both ends inclusive.
    pub fn levels(&self) -> StepBy<RangeInclusive<u8>> {
        let p = &self.params;
        (p.min_threshold..=p.max_threshold).step_by(p.threshold_step as usize)
    }

    pub(crate) fn area_band_center(&self) -> f32 {
        (self.params.min_area as f32 + self.params.max_area as f32) * 0.5
    }
}

impl TryFrom<DetectionParams> for DetectionConfig {
    type Error = ConfigError;

    fn try_from(params: DetectionParams) -> Result<Self, Self::Error> {
        Self::new(params)
    }
}
