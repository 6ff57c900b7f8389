//! W1 spinning disk hardware check.
//!
//! Connects to the unit described by a TOML config, runs the initial
//! synchronization, and reports what the device accepted. Do not run this
//! during an acquisition: it owns the serial port while it runs.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use daq_driver_andor::{DiskSettings, W1Config, W1Driver};

#[derive(Parser)]
#[command(name = "disk_check", about = "Probe a CSU-W1 spinning disk unit")]
struct Args {
    /// Path to the W1 TOML configuration.
    #[arg(long, default_value = "config/w1.toml")]
    config: PathBuf,

    /// Serial port override.
    #[arg(long)]
    port: Option<String>,

    /// Stop the disk before exiting.
    #[arg(long)]
    stop: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut config = W1Config::load(&args.config)?;
    if let Some(port) = args.port {
        config.port = port;
    }

    println!("Connecting to W1 on {} ...", config.port);
    let mut driver = W1Driver::connect(&config)
        .await
        .context("W1 initialization failed")?;
    println!("Connected. Maximum disk speed: {} RPM", driver.max_speed());

    if args.stop {
        let mut settings = config
            .defaults
            .clone()
            .unwrap_or_else(|| DiskSettings::factory_defaults(driver.max_speed()));
        settings.spin_disk = false;
        driver
            .apply(&settings)
            .await
            .context("failed to stop the disk")?;
        println!("Disk stopped.");
    }

    driver.disconnect();
    Ok(())
}
