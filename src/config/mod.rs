// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-thermal-stimulation project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Configuration management for the thermal stimulation application
//!
//! The configuration is backed by a YAML file and validated against a JSON schema
//! generated from the configuration types themselves.
//!
//! ## Configuration Structure
//!
//! - `stimulation`: setpoint, duration, loop period, PID gains, safety limits, fault policy
//! - `instruments`: thermometer and signal generator connections, simulation model
//! - `output`: where and how session data is exported
//!
//! ## Usage
//!
//! ```no_run
//! use rust_thermal_stimulation::config::Config;
//!
//! // Load config from file, creates a default if not found
//! let mut config = Config::from_file("config.yaml").unwrap();
//!
//! // Apply command line overrides if needed
//! config.apply_args(
//!     Some(42.0), // Setpoint in °C
//!     Some(120.0), // Duration in seconds
//!     None,        // Tick period
//!     None,        // Output directory
//!     true,        // Simulated instruments
//! );
//!
//! println!("Setpoint: {} °C", config.stimulation.setpoint_celsius);
//! ```

pub mod instruments;
pub mod stimulation;
pub mod utils;

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, error};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub use instruments::{
    InstrumentsConfig, SignalGeneratorConfig, SignalGeneratorDriverType, SimulationConfig,
    ThermometerConfig, ThermometerDriverType,
};
pub use stimulation::{FaultPolicy, PidParameters, SafetyLimits, StimulationConfig};
pub use utils::{config_schema, output_config_schema};

/// Root configuration structure of the thermal stimulation application
///
/// Each section falls back to its defaults when absent from the file, so a minimal
/// configuration only lists what differs from the reference experiment.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
pub struct Config {
    /// Stimulation session parameters
    #[serde(default)]
    pub stimulation: StimulationConfig,

    /// Instrument connections
    #[serde(default)]
    pub instruments: InstrumentsConfig,

    /// Session data export
    #[serde(default)]
    pub output: OutputConfig,
}

/// Session data export settings
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct OutputConfig {
    /// Root directory; each session writes into a timestamped subdirectory
    #[serde(default = "default_output_directory")]
    pub directory: PathBuf,

    /// Write `y.csv` with `time,temp,volt` columns
    #[serde(default = "default_true")]
    pub csv: bool,

    /// Write `samples.json`
    #[serde(default)]
    pub json: bool,
}

fn default_output_directory() -> PathBuf {
    PathBuf::from("data")
}

fn default_true() -> bool {
    true
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_directory(),
            csv: true,
            json: false,
        }
    }
}

impl Config {
    /// Helper method to create a sample config file when validation fails
    fn create_sample_config<P: AsRef<Path>>(path: P) -> Result<()> {
        let sample_path = path.as_ref().with_extension("sample.yaml");
        debug!("Creating sample configuration file at {:?}", sample_path);

        if let Some(parent) = sample_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).with_context(|| {
                    format!(
                        "Failed to create parent directory for sample config at {:?}",
                        parent
                    )
                })?;
            }
        }

        Self::default()
            .save_to_file(&sample_path)
            .with_context(|| format!("Failed to save sample config to {:?}", sample_path))?;

        error!(
            "Sample configuration file created at {:?}\nPlease edit and rename it",
            sample_path
        );
        Ok(())
    }

    /// Load configuration from a file
    ///
    /// A missing file is created with the default configuration. A file that fails
    /// schema validation, deserialization or the additional rules leaves a
    /// `.sample.yaml` next to it and returns the error.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!(
                "Configuration file not found at {:?}, creating default",
                path
            );
            let default_config = Self::default();
            default_config.save_to_file(path)?;
            return Ok(default_config);
        }

        debug!("Loading configuration from {:?}", path);
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file at {:?}", path))?;

        let yaml_value: serde_yml::Value = serde_yml::from_str(&contents)
            .with_context(|| format!("Failed to parse YAML configuration from {:?}", path))?;

        let json_value = serde_json::to_value(&yaml_value).with_context(|| {
            format!("Failed to convert YAML to JSON for validation: {:?}", path)
        })?;

        let schema = config_schema();
        let validator = jsonschema::draft202012::options()
            .should_validate_formats(true)
            .build(&schema)
            .context("Failed to build the configuration schema validator")?;

        debug!("Validating {} configuration against schema", path.display());
        if let Err(error) = validator.validate(&json_value) {
            error!("Configuration validation error before deserialization");
            Self::create_sample_config(path)?;
            anyhow::bail!("Configuration validation failed: {}", error);
        }

        debug!("Schema validation passed, deserializing into Config structure");
        let config: Config = match serde_yml::from_str(&contents) {
            Ok(config) => config,
            Err(err) => {
                error!("Configuration deserialization error: {}", err);
                if let Err(e) = Self::create_sample_config(path) {
                    error!("Failed to create sample config: {}", e);
                }
                return Err(anyhow::anyhow!(
                    "Failed to deserialize configuration from {}: {}",
                    path.display(),
                    err
                ));
            }
        };

        if let Err(err) = utils::validate_specific_rules(&config) {
            error!("Configuration specific validation error: {}", err);
            Self::create_sample_config(path)?;
            return Err(err);
        }

        Ok(config)
    }

    /// Save the configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml =
            serde_yml::to_string(self).context("Failed to serialize configuration to YAML")?;

        let mut file = File::create(path.as_ref())
            .with_context(|| format!("Failed to create config file at {:?}", path.as_ref()))?;

        file.write_all(yaml.as_bytes())
            .with_context(|| format!("Failed to write configuration to {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Apply command line arguments to override configuration values.
    ///
    /// Only explicitly provided values override the file; `simulate` switches both
    /// instruments to their simulated drivers.
    pub fn apply_args(
        &mut self,
        setpoint_celsius: Option<f64>,
        duration_s: Option<f64>,
        tick_period_s: Option<f64>,
        output_directory: Option<PathBuf>,
        simulate: bool,
    ) {
        if let Some(setpoint) = setpoint_celsius {
            debug!("Overriding setpoint from command line: {}", setpoint);
            self.stimulation.setpoint_celsius = setpoint;
        }
        if let Some(duration) = duration_s {
            debug!("Overriding duration from command line: {}", duration);
            self.stimulation.duration_s = duration;
        }
        if let Some(period) = tick_period_s {
            debug!("Overriding tick period from command line: {}", period);
            self.stimulation.tick_period_s = period;
        }
        if let Some(directory) = output_directory {
            debug!("Overriding output directory from command line: {:?}", directory);
            self.output.directory = directory;
        }
        if simulate {
            debug!("Using simulated instruments");
            self.instruments.use_simulation();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_args_overrides_only_given_values() {
        let mut config = Config::default();
        config.apply_args(Some(40.0), None, Some(0.5), None, true);

        assert_eq!(config.stimulation.setpoint_celsius, 40.0);
        assert_eq!(config.stimulation.duration_s, 60.0);
        assert_eq!(config.stimulation.tick_period_s, 0.5);
        assert_eq!(config.output.directory, PathBuf::from("data"));
        assert!(config.instruments.is_simulated());
    }

    #[test]
    fn test_default_config_yaml_roundtrip() {
        let config = Config::default();
        let yaml = serde_yml::to_string(&config).unwrap();
        let parsed: Config = serde_yml::from_str(&yaml).unwrap();
        assert_eq!(parsed, config);
    }
}
