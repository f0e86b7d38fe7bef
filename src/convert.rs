//! Unit conversion for raw meter readings.

use thiserror::Error;

/// Error type for unit conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConvertError {
    /// The divisor field was zero; there is no sound default scale factor.
    #[error("divisor is zero")]
    ZeroDivisor,
    /// The scaled value does not fit in 64 bits.
    #[error("scaled value exceeds 64 bits")]
    Overflow,
}

/// Scale a raw reading into whole physical units (watts or watt-hours).
///
/// Computes `raw * multiplier * 1000 / divisor` with a single truncating
/// division at the end, matching the meter's documented scaling convention.
/// Sub-unit precision lost to truncation is accepted behavior. The
/// intermediate product is computed in 128 bits so it cannot wrap.
pub fn convert(raw: u32, multiplier: u32, divisor: u32) -> Result<u64, ConvertError> {
    if divisor == 0 {
        return Err(ConvertError::ZeroDivisor);
    }

    let scaled = u128::from(raw) * u128::from(multiplier) * 1000 / u128::from(divisor);
    u64::try_from(scaled).map_err(|_| ConvertError::Overflow)
}
