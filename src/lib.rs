//! Andor/Yokogawa CSU-W1 Spinning Disk Confocal Driver
//!
//! Protocol Overview:
//! - Format: ASCII command/response over RS-232
//! - Baud: 115200, 8N1, no flow control
//! - Command terminator: CR (`\r`)
//! - Response: one line per command, `value:ack`, where ack is `A`
//!   (accepted) or `N` (rejected; `value` then carries a numeric error
//!   code, see [`describe_error_code`])
//!
//! The W1 scan head bundles the disk itself with its optical path: a
//! bright-field bypass, two selectable pinhole disks, the disk motor, a
//! dichroic turret, two camera filter wheels, a camera-path dichroic, and
//! an adjustable aperture. [`W1Driver`] keeps a snapshot of the last
//! settings the device acknowledged and [`W1Driver::apply`] moves the
//! hardware to a new [`DiskSettings`] target with the minimal command
//! sequence, one strictly sequential exchange at a time.
//!
//! # Usage
//!
//! ```rust,ignore
//! use daq_driver_andor::{DiskSettings, W1Config, W1Driver};
//!
//! let config: W1Config = toml::from_str(r#"port = "/dev/ttyUSB0""#)?;
//! let mut disk = W1Driver::connect(&config).await?;
//!
//! let mut settings = DiskSettings::factory_defaults(disk.max_speed());
//! settings.disk_speed = 2000;
//! disk.apply(&settings).await?;
//! ```

pub mod config;
pub mod error;
pub mod serial;
pub mod w1;

pub use config::{DiskSettings, PinholeDisk, W1Config};
pub use error::{describe_error_code, W1Error};
pub use serial::{open_serial, wrap_shared, DynSerial, SerialPortIO, SharedPort};
pub use w1::{Reply, W1Driver};
