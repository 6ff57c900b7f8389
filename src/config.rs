//! Connection settings and the device configuration model.
//!
//! [`DiskSettings`] is the complete target state for the scan head; bounds
//! for the positional fields come from the device manual, while the disk
//! speed ceiling is reported by the hardware itself (`MS_MAX,?`) and passed
//! into [`DiskSettings::validate`].

use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

use crate::error::W1Error;

/// Connection settings for a W1 unit.
///
/// ```toml
/// port = "/dev/ttyUSB0"
/// baud_rate = 115200
/// timeout_ms = 100
///
/// [defaults]
/// bright_field_bypass = false
/// spin_disk = true
/// disk = "50-micron"
/// disk_speed = 4000
/// dichroic_mirror = 1
/// filter_wheel_pos1 = 3
/// filter_wheel_pos2 = 1
/// camera_dichroic_mirror = 1
/// aperture = 10
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct W1Config {
    /// Serial port path (e.g. "/dev/ttyUSB0", "COM4").
    pub port: String,
    /// Baud rate; the W1 ships at 115200.
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Per-command read timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Target for the initial synchronization. When omitted,
    /// [`DiskSettings::factory_defaults`] is used.
    #[serde(default)]
    pub defaults: Option<DiskSettings>,
}

fn default_baud_rate() -> u32 {
    115200
}

fn default_timeout_ms() -> u64 {
    100
}

impl W1Config {
    /// Load a configuration from a TOML file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("invalid W1 config in {}", path.display()))
    }
}

/// Pinhole disk selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum PinholeDisk {
    /// 50-micron pinhole disk (`DC_SLCT,1`).
    #[serde(rename = "50-micron")]
    Micron50,
    /// 25-micron pinhole disk (`DC_SLCT,2`).
    #[serde(rename = "25-micron")]
    Micron25,
}

impl PinholeDisk {
    /// Argument for the `DC_SLCT` command.
    pub(crate) fn select_arg(self) -> u8 {
        match self {
            PinholeDisk::Micron50 => 1,
            PinholeDisk::Micron25 => 2,
        }
    }
}

/// A complete target configuration for the scan head.
///
/// Every field is always populated; [`W1Driver::apply`](crate::W1Driver::apply)
/// diffs a target against the last acknowledged snapshot and only writes
/// what changed.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DiskSettings {
    /// Bypass the disk for bright-field imaging.
    pub bright_field_bypass: bool,
    /// Spin the disk.
    pub spin_disk: bool,
    /// Pinhole disk selection.
    pub disk: PinholeDisk,
    /// Disk speed in RPM, 1 up to the device-reported maximum.
    pub disk_speed: u32,
    /// Dichroic mirror position, 1-3.
    pub dichroic_mirror: u8,
    /// Camera 1 filter wheel position, 1-10.
    pub filter_wheel_pos1: u8,
    /// Camera 2 filter wheel position, 1-10.
    pub filter_wheel_pos2: u8,
    /// Camera dichroic mirror position, 1-3.
    pub camera_dichroic_mirror: u8,
    /// Aperture width, 1-10 (small to large).
    pub aperture: u8,
}

impl DiskSettings {
    /// Power-on defaults: 50-micron disk spinning at full speed, every
    /// positioner at its first position, camera 1 wheel on slot 3, aperture
    /// wide open.
    pub fn factory_defaults(max_speed: u32) -> Self {
        Self {
            bright_field_bypass: false,
            spin_disk: true,
            disk: PinholeDisk::Micron50,
            disk_speed: max_speed,
            dichroic_mirror: 1,
            filter_wheel_pos1: 3,
            filter_wheel_pos2: 1,
            camera_dichroic_mirror: 1,
            aperture: 10,
        }
    }

    /// Check every bounded field against its documented range.
    ///
    /// `max_speed` is the device-reported maximum from `MS_MAX,?`.
    pub fn validate(&self, max_speed: u32) -> Result<(), W1Error> {
        check_range("disk_speed", self.disk_speed, 1, max_speed)?;
        check_range("dichroic_mirror", self.dichroic_mirror.into(), 1, 3)?;
        check_range("filter_wheel_pos1", self.filter_wheel_pos1.into(), 1, 10)?;
        check_range("filter_wheel_pos2", self.filter_wheel_pos2.into(), 1, 10)?;
        check_range(
            "camera_dichroic_mirror",
            self.camera_dichroic_mirror.into(),
            1,
            3,
        )?;
        check_range("aperture", self.aperture.into(), 1, 10)?;
        Ok(())
    }
}

fn check_range(field: &'static str, value: u32, min: u32, max: u32) -> Result<(), W1Error> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(W1Error::SettingOutOfRange {
            field,
            value,
            min,
            max,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_uses_defaults() {
        let config: W1Config = toml::from_str(r#"port = "/dev/ttyUSB0""#).unwrap();
        assert_eq!(config.port, "/dev/ttyUSB0");
        assert_eq!(config.baud_rate, 115200);
        assert_eq!(config.timeout_ms, 100);
        assert!(config.defaults.is_none());
    }

    #[test]
    fn full_config_parses() {
        let config: W1Config = toml::from_str(
            r#"
            port = "COM4"
            baud_rate = 115200
            timeout_ms = 250

            [defaults]
            bright_field_bypass = false
            spin_disk = true
            disk = "25-micron"
            disk_speed = 2000
            dichroic_mirror = 2
            filter_wheel_pos1 = 5
            filter_wheel_pos2 = 6
            camera_dichroic_mirror = 1
            aperture = 7
            "#,
        )
        .unwrap();

        let defaults = config.defaults.unwrap();
        assert_eq!(defaults.disk, PinholeDisk::Micron25);
        assert_eq!(defaults.disk_speed, 2000);
        assert_eq!(defaults.filter_wheel_pos2, 6);
    }

    #[test]
    fn disk_select_arguments() {
        assert_eq!(PinholeDisk::Micron50.select_arg(), 1);
        assert_eq!(PinholeDisk::Micron25.select_arg(), 2);
    }

    #[test]
    fn factory_defaults_match_power_on_state() {
        let defaults = DiskSettings::factory_defaults(4000);
        assert!(!defaults.bright_field_bypass);
        assert!(defaults.spin_disk);
        assert_eq!(defaults.disk, PinholeDisk::Micron50);
        assert_eq!(defaults.disk_speed, 4000);
        assert_eq!(defaults.filter_wheel_pos1, 3);
        assert_eq!(defaults.aperture, 10);
        assert!(defaults.validate(4000).is_ok());
    }

    #[test]
    fn validate_rejects_out_of_range_fields() {
        let mut settings = DiskSettings::factory_defaults(4000);
        settings.disk_speed = 4001;
        match settings.validate(4000) {
            Err(W1Error::SettingOutOfRange { field, value, max, .. }) => {
                assert_eq!(field, "disk_speed");
                assert_eq!(value, 4001);
                assert_eq!(max, 4000);
            }
            other => panic!("expected SettingOutOfRange, got {other:?}"),
        }

        let mut settings = DiskSettings::factory_defaults(4000);
        settings.filter_wheel_pos1 = 11;
        assert!(settings.validate(4000).is_err());

        let mut settings = DiskSettings::factory_defaults(4000);
        settings.dichroic_mirror = 0;
        assert!(settings.validate(4000).is_err());
    }
}
