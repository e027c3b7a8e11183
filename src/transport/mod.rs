//! Transport: opening the physical serial port.
//!
//! The link itself is generic over any `AsyncRead + AsyncWrite` stream, so
//! tests run against `tokio::io::duplex` and production code hands it the
//! port opened here.
//!
//! # Example
//!
//! ```ignore
//! use zwave_serial::config::SerialSettings;
//! use zwave_serial::transport::open_serial;
//!
//! let port = open_serial(&SerialSettings::default())?;
//! let client = zwave_serial::ZWaveClient::builder().connect(port);
//! ```

use crate::config::SerialSettings;
use crate::error::Result;

/// Open the controller's serial port (8 data bits, no parity, one stop bit).
pub fn open_serial(settings: &SerialSettings) -> Result<tokio_serial::SerialStream> {
    use tokio_serial::SerialPortBuilderExt;

    tracing::debug!("Opening {} at {} baud", settings.path, settings.baud_rate);
    let port = tokio_serial::new(&settings.path, settings.baud_rate)
        .data_bits(tokio_serial::DataBits::Eight)
        .parity(tokio_serial::Parity::None)
        .stop_bits(tokio_serial::StopBits::One)
        .flow_control(tokio_serial::FlowControl::None)
        .open_native_async()
        .map_err(std::io::Error::from)?;
    Ok(port)
}
