//! Cells per millilitre from a single-frame count.

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConcentrationError {
    #[error("frame volume is zero")]
    DivisionByZero,
}

/// Returns `count * dilution / frame_volume_ml`, or `None` when either factor
/// is unknown.
///
/// The caller guarantees `frame_volume_ml > 0`; a zero volume is reported as
/// [`ConcentrationError::DivisionByZero`] instead of producing infinity.
pub fn concentration(
    count: usize,
    dilution: Option<f64>,
    frame_volume_ml: Option<f64>,
) -> Result<Option<f64>, ConcentrationError> {
    let (Some(dilution), Some(volume)) = (dilution, frame_volume_ml) else {
        return Ok(None);
    };
    if volume == 0.0 {
        return Err(ConcentrationError::DivisionByZero);
    }
    Ok(Some(count as f64 * dilution / volume))
}
