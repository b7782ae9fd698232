//! Multi-threshold blob counting for cropped counting-chamber images.

pub mod batch;
pub mod concentration;
pub mod detect;
pub mod logging;
pub mod overlay;
pub mod report;
pub mod synth;

pub use concentration::{ConcentrationError, concentration};
pub use detect::{DetectionConfig, DetectionError, DetectionParams, detect, detect_from_image};
pub use report::CountRecord;
