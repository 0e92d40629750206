//! Opening the physical serial device.

use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::info;

use groveos_types::GroveError;

use crate::channel::{LinkConfig, SerialLink};

/// Open the serial device and wrap it in a [`SerialLink`].
///
/// A missing or unopenable device is fatal at startup; callers decide
/// whether to abort or run without a command channel.
pub fn open_port(path: &str, baud: u32, cfg: LinkConfig) -> Result<SerialLink<SerialStream>, GroveError> {
    let stream = tokio_serial::new(path, baud)
        .open_native_async()
        .map_err(|e| GroveError::Serial(format!("open {path} @ {baud}: {e}")))?;
    info!(path, baud, "serial device open");
    Ok(SerialLink::new(stream, cfg))
}
