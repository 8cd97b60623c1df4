// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-thermal-stimulation project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

// Main entry point for the closed-loop thermal stimulation controller

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, warn};
use tokio::{signal, time};

use rust_thermal_stimulation::config::{self, Config};
use rust_thermal_stimulation::thermal_regulation::{
    create_instruments, export_session, SessionError, TemperatureSensor, ThermalControlLoop,
};

/// Closed-loop thermal regulation of an ultrasound stimulation
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (YAML format)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to a configuration to validate and exit
    #[arg(long)]
    validate_config: Option<PathBuf>,

    /// Output the configuration schema as JSON and exit
    #[arg(long)]
    show_config_schema: bool,

    /// Target temperature in °C
    #[arg(long)]
    setpoint: Option<f64>,

    /// Stimulation duration in seconds
    #[arg(long)]
    duration: Option<f64>,

    /// Control loop period in seconds
    #[arg(long)]
    tick_period: Option<f64>,

    /// Root directory of the session exports
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Use simulated instruments instead of the serial devices
    #[arg(long)]
    simulate: bool,

    /// Enable verbose logging (debug level)
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// Disable all logging output
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.quiet {
        log::LevelFilter::Off
    } else if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    if args.show_config_schema {
        return config::output_config_schema();
    }

    if let Some(validate_path) = args.validate_config {
        if !validate_path.exists() {
            return Err(anyhow::anyhow!(
                "Configuration file does not exist: {}",
                validate_path.display()
            ));
        }

        Config::from_file(&validate_path)
            .map_err(|err| anyhow::anyhow!("Configuration validation failed: {}", err))?;
        println!("Configuration file is valid: {}", validate_path.display());
        return Ok(());
    }

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from("config.yaml"));
    let mut config = Config::from_file(&config_path)?;

    config.apply_args(
        args.setpoint,
        args.duration,
        args.tick_period,
        args.output_dir.clone(),
        args.simulate,
    );
    config::utils::validate_specific_rules(&config)
        .context("Invalid configuration after command line overrides")?;

    info!("Thermal stimulation controller v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {:?}", config_path);

    let instruments = &config.instruments;
    let (mut sensor, actuator) = create_instruments(
        &instruments.thermometer,
        &instruments.signal_generator,
        &instruments.simulation,
    )
    .await?;

    match time::timeout(config.stimulation.io_timeout(), sensor.read_temperature()).await {
        Ok(Ok(temperature)) => info!("Current temperature: {:.1} °C", temperature),
        Ok(Err(fault)) => warn!("Initial temperature reading failed: {}", fault),
        Err(_) => warn!("Initial temperature reading timed out"),
    }

    let mut control_loop = ThermalControlLoop::new(sensor, actuator);
    control_loop.arm(config.stimulation.clone()).await?;

    let stop = control_loop.stop_handle();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping stimulation");
            stop.request_stop();
        }
    });

    let (report, failure) = match control_loop.run().await {
        Ok(report) => (report, None),
        Err(SessionError::Aborted(report)) => {
            let summary = report.summary();
            (*report, Some(summary))
        }
        Err(e) => return Err(e.into()),
    };

    let export = export_session(report.samples(), &config.output, &report.started_at);
    match &export {
        Ok(session_dir) => info!("Session data saved in {:?}", session_dir),
        Err(e) => error!("Failed to export session data: {:#}", e),
    }

    if let Some(summary) = failure {
        anyhow::bail!("Stimulation session aborted: {}", summary);
    }
    export.context("Session data was not saved")?;

    info!("Stimulation completed: {}", report.summary());
    Ok(())
}
