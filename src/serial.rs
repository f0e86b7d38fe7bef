//! Serial transport to the RAVEn stick.

use tokio_serial::{DataBits, Parity, SerialStream, StopBits};
use tracing::info;

use crate::config::SerialConfig;
use crate::error::{PipelineError, Result};

/// Open the configured serial port.
///
/// The stick's framing is fixed at 8N1; only port and baud rate vary.
pub fn open(config: &SerialConfig) -> Result<SerialStream> {
    let builder = tokio_serial::new(&config.port, config.baud_rate)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One);

    let stream = SerialStream::open(&builder).map_err(|e| {
        PipelineError::Stream(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("failed to open {}: {}", config.port, e),
        ))
    })?;

    info!(port = %config.port, baud = config.baud_rate, "Connected to serial port");
    Ok(stream)
}
