//! Serial transport for the W1 link.
//!
//! The W1 talks RS-232 at 115200 baud, 8N1, no flow control. The driver
//! holds its port behind [`SharedPort`] so every command/response exchange
//! runs under one lock, and the `BufReader` wrapper gives line-oriented
//! reads for the `value:ack` replies.

use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::sync::Mutex;

/// Anything usable as the W1 serial link.
///
/// `tokio_serial::SerialStream` for hardware, `tokio::io::DuplexStream` in
/// tests.
pub trait SerialPortIO: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> SerialPortIO for T {}

/// Type-erased serial link.
pub type DynSerial = Box<dyn SerialPortIO>;

/// Shared, buffered serial link; the mutex serializes exchanges.
pub type SharedPort = Arc<Mutex<BufReader<DynSerial>>>;

/// Wrap a link for use by [`W1Driver`](crate::W1Driver).
///
/// ```
/// use daq_driver_andor::serial::wrap_shared;
///
/// # tokio_test::block_on(async {
/// let (_host, device) = tokio::io::duplex(64);
/// let port = wrap_shared(Box::new(device));
/// assert_eq!(std::sync::Arc::strong_count(&port), 1);
/// # });
/// ```
pub fn wrap_shared(port: DynSerial) -> SharedPort {
    Arc::new(Mutex::new(BufReader::new(port)))
}

/// Open a serial port, 8N1 with no flow control.
///
/// Port setup is a blocking OS call, so it runs on the blocking pool.
pub async fn open_serial(path: &str, baud_rate: u32) -> anyhow::Result<tokio_serial::SerialStream> {
    use anyhow::Context;
    use tokio_serial::SerialPortBuilderExt;

    let path = path.to_string();
    tokio::task::spawn_blocking(move || {
        tokio_serial::new(&path, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .with_context(|| format!("failed to open serial port {path}"))
    })
    .await
    .context("spawn_blocking for serial port opening failed")?
}
