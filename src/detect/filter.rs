//! Area, shape and persistence gate applied to aggregated blobs.

use super::aggregate::BlobCandidate;
use super::config::DetectionConfig;

/// Area, circularity and repeatability gate. Every check must pass.
pub fn accepts(candidate: &BlobCandidate, config: &DetectionConfig) -> bool {
    let p = config.params();
    if !(p.min_area..=p.max_area).contains(&candidate.area) {
        return false;
    }
    if p.use_circularity_filter && candidate.circularity.clamp(0.0, 1.0) < p.min_circularity {
        return false;
    }
    candidate.repeatability >= p.min_repeatability
}
