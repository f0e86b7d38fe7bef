//! Pipeline error taxonomy.
//!
//! None of these are recovered locally. The serial stream has no safe
//! resynchronization point, so the first fault of any kind ends the
//! pipeline; the top-level handler logs the diagnostic and exits non-zero.

use thiserror::Error;

use crate::convert::ConvertError;
use crate::message::ParseError;
use crate::scanner::ScanError;

/// Fatal pipeline fault.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Transport failure reading the serial stream.
    #[error("serial stream error: {0}")]
    Stream(#[from] std::io::Error),

    /// A registered fragment was present but not well-formed.
    #[error(transparent)]
    Frame(#[from] ScanError),

    /// A message field was not a valid integer in the device encoding.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// A reading could not be scaled.
    #[error(transparent)]
    Convert(#[from] ConvertError),
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;
