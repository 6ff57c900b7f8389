//! Driver for the Andor/Yokogawa CSU-W1 spinning disk confocal unit.
//!
//! The unit answers every CR-terminated command with one `value:ack` line.
//! The driver records which settings the device has acknowledged and, on
//! each [`W1Driver::apply`], writes only the commands needed to reach the
//! new target. Exchanges are strictly sequential: a command's reply is
//! awaited (up to the read timeout) before the next command is written.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt};
use tracing::{debug, instrument, warn};

use crate::config::{DiskSettings, PinholeDisk, W1Config};
use crate::error::{describe_error_code, W1Error};
use crate::serial::{open_serial, wrap_shared, SharedPort};

/// Outcome of a single command/response exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// The device acknowledged; payload is the value field of the reply.
    Ack(String),
    /// Nothing arrived before the read timeout.
    NoResponse,
    /// The reply had no `value:ack` shape; raw text kept for diagnostics.
    Malformed(String),
}

/// Per-field record of what the device last acknowledged.
///
/// Every field starts out `None`, so the first `apply` writes all of them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Applied {
    bright_field_bypass: Option<bool>,
    spin_disk: Option<bool>,
    disk: Option<PinholeDisk>,
    disk_speed: Option<u32>,
    dichroic_mirror: Option<u8>,
    filter_wheel_pos1: Option<u8>,
    filter_wheel_pos2: Option<u8>,
    camera_dichroic_mirror: Option<u8>,
    aperture: Option<u8>,
}

/// Driver for one CSU-W1 unit.
///
/// Owns its serial connection exclusively. There are no retries and no
/// internal concurrency; recovery policy belongs to the caller.
pub struct W1Driver {
    port: Option<SharedPort>,
    timeout: Duration,
    max_speed: u32,
    applied: Applied,
}

impl std::fmt::Debug for W1Driver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("W1Driver")
            .field("connected", &self.port.is_some())
            .field("timeout", &self.timeout)
            .field("max_speed", &self.max_speed)
            .field("applied", &self.applied)
            .finish()
    }
}

impl W1Driver {
    /// Connect to the unit and run the initial synchronization.
    ///
    /// Opens the port, queries the maximum disk speed (`MS_MAX,?`), then
    /// applies the configured defaults as the first full pass.
    #[instrument(skip(config), fields(port = %config.port))]
    pub async fn connect(config: &W1Config) -> Result<Self, W1Error> {
        let stream = open_serial(&config.port, config.baud_rate)
            .await
            .map_err(|e| W1Error::Init {
                port: config.port.clone(),
                reason: format!("{e:#}"),
            })?;
        debug!(baud = config.baud_rate, "W1 serial port open");

        Self::open_with_port(
            wrap_shared(Box::new(stream)),
            Duration::from_millis(config.timeout_ms),
            config.defaults.clone(),
        )
        .await
    }

    /// Initialize over an already-open transport.
    ///
    /// Same startup sequence as [`connect`](Self::connect): the speed probe
    /// followed by a full pass of `defaults` (or
    /// [`DiskSettings::factory_defaults`] when `None`). Intended for tests
    /// and non-tty transports.
    pub async fn open_with_port(
        port: SharedPort,
        timeout: Duration,
        defaults: Option<DiskSettings>,
    ) -> Result<Self, W1Error> {
        let mut driver = Self {
            port: Some(port),
            timeout,
            max_speed: 0,
            applied: Applied::default(),
        };

        driver.max_speed = driver.query_max_speed().await?;
        debug!(max_speed = driver.max_speed, "W1 maximum disk speed");

        let defaults =
            defaults.unwrap_or_else(|| DiskSettings::factory_defaults(driver.max_speed));
        driver.apply(&defaults).await?;

        Ok(driver)
    }

    /// Device-reported maximum disk speed in RPM, read once at connect.
    pub fn max_speed(&self) -> u32 {
        self.max_speed
    }

    /// Whether the serial connection is still held.
    pub fn is_connected(&self) -> bool {
        self.port.is_some()
    }

    /// Drop the serial connection. Safe to call repeatedly.
    pub fn disconnect(&mut self) {
        if self.port.take().is_some() {
            debug!("W1 serial port closed");
        }
    }

    /// Push `target` to the device, writing only the fields that differ
    /// from the last acknowledged snapshot.
    ///
    /// The whole target is validated against the device bounds before
    /// anything is written. Commands go out in a fixed order (bypass,
    /// spin, disk, speed, dichroic, filter wheels, camera dichroic,
    /// aperture), and the two filter wheel positions travel in one command.
    ///
    /// A coded error reply aborts the pass immediately and leaves the
    /// snapshot as it was before the call. An exchange that times out or
    /// comes back unparseable is logged and the field stays unapplied, so
    /// its command is reissued on the next pass.
    #[instrument(skip(self, target), err)]
    pub async fn apply(&mut self, target: &DiskSettings) -> Result<(), W1Error> {
        target.validate(self.max_speed)?;
        let mut next = self.applied.clone();

        if next.bright_field_bypass != Some(target.bright_field_bypass) {
            let cmd = if target.bright_field_bypass {
                "BF_ON"
            } else {
                "BF_OFF"
            };
            if self.acknowledged(cmd).await? {
                next.bright_field_bypass = Some(target.bright_field_bypass);
            }
        }

        if next.spin_disk != Some(target.spin_disk) {
            let cmd = if target.spin_disk { "MS_RUN" } else { "MS_STOP" };
            if self.acknowledged(cmd).await? {
                next.spin_disk = Some(target.spin_disk);
            }
        }

        if next.disk != Some(target.disk) {
            let cmd = format!("DC_SLCT,{}", target.disk.select_arg());
            if self.acknowledged(&cmd).await? {
                next.disk = Some(target.disk);
            }
        }

        if next.disk_speed != Some(target.disk_speed) {
            let cmd = format!("MS,{}", target.disk_speed);
            if self.acknowledged(&cmd).await? {
                next.disk_speed = Some(target.disk_speed);
            }
        }

        if next.dichroic_mirror != Some(target.dichroic_mirror) {
            let cmd = format!("DMM_POS,1,{}", target.dichroic_mirror);
            if self.acknowledged(&cmd).await? {
                next.dichroic_mirror = Some(target.dichroic_mirror);
            }
        }

        // The wheels share one positioning command, so either change moves both.
        if next.filter_wheel_pos1 != Some(target.filter_wheel_pos1)
            || next.filter_wheel_pos2 != Some(target.filter_wheel_pos2)
        {
            let cmd = format!(
                "FW_POS,0,{},{}",
                target.filter_wheel_pos1, target.filter_wheel_pos2
            );
            if self.acknowledged(&cmd).await? {
                next.filter_wheel_pos1 = Some(target.filter_wheel_pos1);
                next.filter_wheel_pos2 = Some(target.filter_wheel_pos2);
            }
        }

        if next.camera_dichroic_mirror != Some(target.camera_dichroic_mirror) {
            let cmd = format!("PT_POS,1,{}", target.camera_dichroic_mirror);
            if self.acknowledged(&cmd).await? {
                next.camera_dichroic_mirror = Some(target.camera_dichroic_mirror);
            }
        }

        if next.aperture != Some(target.aperture) {
            let cmd = format!("AP_WIDTH,1,{}", target.aperture);
            if self.acknowledged(&cmd).await? {
                next.aperture = Some(target.aperture);
            }
        }

        self.applied = next;
        Ok(())
    }

    /// Send a raw command and read its single-line reply.
    ///
    /// The command is framed with a trailing CR. A coded `N` reply becomes
    /// [`W1Error::Command`]; an empty read window becomes
    /// [`Reply::NoResponse`], so callers can tell a silent device from a
    /// rejecting one.
    pub async fn command(&self, command: &str) -> Result<Reply, W1Error> {
        let port = self.port.as_ref().ok_or(W1Error::NotConnected)?;
        let mut guard = port.lock().await;

        guard
            .get_mut()
            .write_all(format!("{command}\r").as_bytes())
            .await?;
        guard.get_mut().flush().await?;

        // A reply line ends with CR; whatever arrived by the deadline is
        // kept, matching the line-at-timeout behavior of the hardware link.
        let mut raw = Vec::with_capacity(32);
        match tokio::time::timeout(self.timeout, guard.read_until(b'\r', &mut raw)).await {
            Ok(Ok(_)) | Err(_) => {}
            Ok(Err(e)) => return Err(e.into()),
        }
        drop(guard);

        let text = String::from_utf8_lossy(&raw);
        debug!(command, reply = %text.escape_debug(), "W1 exchange");
        parse_reply(&text)
    }

    /// Send one settings command; true if the device acknowledged it.
    async fn acknowledged(&self, command: &str) -> Result<bool, W1Error> {
        match self.command(command).await? {
            Reply::Ack(_) => Ok(true),
            Reply::NoResponse => {
                warn!(command, "no acknowledgement from W1");
                Ok(false)
            }
            Reply::Malformed(raw) => {
                warn!(command, reply = %raw, "unparseable W1 reply");
                Ok(false)
            }
        }
    }

    async fn query_max_speed(&self) -> Result<u32, W1Error> {
        const CMD: &str = "MS_MAX,?";
        match self.command(CMD).await? {
            Reply::Ack(value) => value.parse().map_err(|_| W1Error::BadReply {
                command: CMD.to_string(),
                reply: value,
            }),
            Reply::NoResponse => Err(W1Error::Unacknowledged {
                command: CMD.to_string(),
            }),
            Reply::Malformed(raw) => Err(W1Error::BadReply {
                command: CMD.to_string(),
                reply: raw,
            }),
        }
    }
}

/// Parse one reply line.
///
/// Grammar: `value:ack`, split on the first `:`. The terminating CR may
/// still be on the ack token, and stale terminators from the previous
/// exchange may precede the value.
fn parse_reply(raw: &str) -> Result<Reply, W1Error> {
    let line = raw.trim_start_matches(|c| c == '\r' || c == '\n');
    if line.trim().is_empty() {
        return Ok(Reply::NoResponse);
    }

    match line.split_once(':') {
        None => Ok(Reply::Malformed(line.trim_end().to_string())),
        Some((value, ack)) => {
            if ack.trim_end_matches(|c| c == '\r' || c == '\n') == "N" {
                let code = value.trim().to_string();
                let message = describe_error_code(&code);
                Err(W1Error::Command { code, message })
            } else {
                Ok(Reply::Ack(value.trim().to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_acknowledged_value() {
        assert_eq!(parse_reply("4000:A\r").unwrap(), Reply::Ack("4000".into()));
        assert_eq!(parse_reply("0:A").unwrap(), Reply::Ack("0".into()));
    }

    #[test]
    fn stale_terminators_are_skipped() {
        assert_eq!(
            parse_reply("\n4000:A\r").unwrap(),
            Reply::Ack("4000".into())
        );
    }

    #[test]
    fn coded_failure_becomes_command_error() {
        match parse_reply("30204:N\r") {
            Err(W1Error::Command { code, message }) => {
                assert_eq!(code, "30204");
                assert_eq!(message, "Disk rotation stopped");
            }
            other => panic!("expected Command error, got {other:?}"),
        }
    }

    #[test]
    fn unrecognized_code_decodes_to_unknown() {
        match parse_reply("99999:N\r") {
            Err(W1Error::Command { message, .. }) => assert_eq!(message, "Unknown error"),
            other => panic!("expected Command error, got {other:?}"),
        }
    }

    #[test]
    fn empty_read_is_no_response() {
        assert_eq!(parse_reply("").unwrap(), Reply::NoResponse);
        assert_eq!(parse_reply("\r\n").unwrap(), Reply::NoResponse);
    }

    #[test]
    fn missing_separator_is_malformed() {
        assert_eq!(
            parse_reply("garbage\r").unwrap(),
            Reply::Malformed("garbage".into())
        );
    }

    #[test]
    fn non_n_ack_counts_as_success() {
        // The hardware sends `A`; anything that is not `N` is accepted.
        assert_eq!(parse_reply("1:X\r").unwrap(), Reply::Ack("1".into()));
    }
}
