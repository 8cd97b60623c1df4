// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-thermal-stimulation project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Configuration utilities
//!
//! This module provides utility functions for working with configuration
//! settings, including validation and schema management.

use anyhow::{Context, Result};
use log::{debug, warn};

use super::Config;

/// JSON schema of the configuration file, generated from the configuration types
pub fn config_schema() -> serde_json::Value {
    schemars::schema_for!(Config).to_value()
}

/// Output the configuration JSON schema to the console.
///
/// This function is called when the `--show-config-schema` flag is provided
/// on the command line.
///
/// # Example
///
/// ```bash
/// ./thermal_stimulation --show-config-schema > config_schema.json
/// ```
pub fn output_config_schema() -> Result<()> {
    let formatted_schema =
        serde_json::to_string_pretty(&config_schema()).context("Failed to format JSON schema")?;
    println!("{}", formatted_schema);
    Ok(())
}

/// Validates the configuration against rules the JSON schema cannot express.
///
/// # Validation Rules
///
/// - **Stimulation**: finite positive timing, consistent PID bounds and gains,
///   a temperature window containing the setpoint, output bounds reachable under
///   the amplitude ceiling
/// - **Device ceiling**: the signal generator limit must be strictly positive
/// - **Thermometer channel**: the HH806 has channels 1 and 2 only
/// - **Pulse modulation**: positive period, duty cycle within 0..=100 %
/// - **Simulation**: positive cooling time constant, fault probability within 0..=1
pub fn validate_specific_rules(config: &Config) -> Result<()> {
    debug!("Performing additional validation checks");

    config
        .stimulation
        .validate()
        .context("Invalid stimulation section")?;

    let generator = &config.instruments.signal_generator;
    if !(generator.device_max_amplitude_vpp.is_finite() && generator.device_max_amplitude_vpp > 0.0)
    {
        anyhow::bail!(
            "Invalid signal generator ceiling: {} Vpp",
            generator.device_max_amplitude_vpp
        );
    }
    if generator.device_max_amplitude_vpp < config.stimulation.safety_limits.max_amplitude_vpp {
        warn!(
            "Signal generator ceiling {} Vpp is below the configured safety ceiling {} Vpp; the lower one applies",
            generator.device_max_amplitude_vpp, config.stimulation.safety_limits.max_amplitude_vpp
        );
    }
    if !(generator.pulse_period_s.is_finite() && generator.pulse_period_s > 0.0) {
        anyhow::bail!("Invalid pulse period: {} s", generator.pulse_period_s);
    }
    if !(0.0..=100.0).contains(&generator.pulse_duty_percent) {
        anyhow::bail!("Invalid pulse duty cycle: {} %", generator.pulse_duty_percent);
    }

    let channel = config.instruments.thermometer.channel;
    if !(1..=2).contains(&channel) {
        anyhow::bail!("Invalid thermometer channel: {} (expected 1 or 2)", channel);
    }

    let simulation = &config.instruments.simulation;
    if !(simulation.cooling_time_constant_s.is_finite() && simulation.cooling_time_constant_s > 0.0)
    {
        anyhow::bail!(
            "Invalid simulation cooling time constant: {} s",
            simulation.cooling_time_constant_s
        );
    }
    if !(0.0..=1.0).contains(&simulation.sensor_fault_probability) {
        anyhow::bail!(
            "Invalid simulated fault probability: {}",
            simulation.sensor_fault_probability
        );
    }

    Ok(())
}
