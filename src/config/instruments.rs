// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-thermal-stimulation project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Instrument configuration
//!
//! Serial connections of the thermometer and the signal generator, and the
//! parameters of the simulated instruments used with `driver: mock`.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Instruments section
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
pub struct InstrumentsConfig {
    /// Thermometer connection
    #[serde(default)]
    pub thermometer: ThermometerConfig,

    /// Signal generator connection and pulse modulation setup
    #[serde(default)]
    pub signal_generator: SignalGeneratorConfig,

    /// Thermal model shared by the simulated instruments
    #[serde(default)]
    pub simulation: SimulationConfig,
}

/// Thermometer driver type enumeration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ThermometerDriverType {
    /// Dual-channel HH806 thermocouple thermometer on a serial port
    Hh806,
    /// Simulated thermometer
    Mock,
}

/// Signal generator driver type enumeration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SignalGeneratorDriverType {
    /// SG386 RF signal generator on a serial port
    Sg386,
    /// Simulated signal generator
    Mock,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ThermometerConfig {
    #[serde(default = "default_thermometer_driver")]
    pub driver: ThermometerDriverType,

    /// Serial device node (19200 baud, 8E1, configured outside the application)
    #[serde(default = "default_thermometer_device")]
    pub device: String,

    /// Probe channel used for regulation (1 or 2)
    #[serde(default = "default_channel")]
    pub channel: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct SignalGeneratorConfig {
    #[serde(default = "default_signal_generator_driver")]
    pub driver: SignalGeneratorDriverType,

    /// Serial device node (9600 baud, RTS/CTS, configured outside the application)
    #[serde(default = "default_signal_generator_device")]
    pub device: String,

    /// RF carrier frequency in Hz
    #[serde(default = "default_carrier_frequency")]
    pub carrier_frequency_hz: f64,

    /// Modulation type code (4 = pulse)
    #[serde(default = "default_modulation_type")]
    pub modulation_type: u8,

    /// Modulation function code (3 = square)
    #[serde(default = "default_modulation_function")]
    pub modulation_function: u8,

    /// Pulse period in seconds
    #[serde(default = "default_pulse_period")]
    pub pulse_period_s: f64,

    /// Pulse duty cycle in percent
    #[serde(default = "default_pulse_duty")]
    pub pulse_duty_percent: f64,

    /// Highest amplitude the instrument accepts, in Vpp
    #[serde(default = "default_device_max_amplitude")]
    pub device_max_amplitude_vpp: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct SimulationConfig {
    /// Ambient and initial sample temperature
    #[serde(default = "default_ambient")]
    pub ambient_celsius: f64,

    /// Heating rate per squared Vpp, in °C/s/Vpp²
    #[serde(default = "default_heating_coefficient")]
    pub heating_celsius_per_s_per_vpp2: f64,

    /// Cooling time constant towards ambient, in seconds
    #[serde(default = "default_cooling_time_constant")]
    pub cooling_time_constant_s: f64,

    /// Half-width of the uniform reading noise in °C
    #[serde(default = "default_noise")]
    pub noise_celsius: f64,

    /// Probability of a simulated sensor fault on each reading
    #[serde(default)]
    pub sensor_fault_probability: f64,

    /// Random seed for reproducible runs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

fn default_thermometer_driver() -> ThermometerDriverType {
    ThermometerDriverType::Hh806
}
fn default_thermometer_device() -> String {
    "/dev/ttyUSB1".to_string()
}
fn default_channel() -> u8 {
    1
}
fn default_signal_generator_driver() -> SignalGeneratorDriverType {
    SignalGeneratorDriverType::Sg386
}
fn default_signal_generator_device() -> String {
    "/dev/ttyUSB0".to_string()
}
fn default_carrier_frequency() -> f64 {
    1e6
}
fn default_modulation_type() -> u8 {
    4
}
fn default_modulation_function() -> u8 {
    3
}
fn default_pulse_period() -> f64 {
    0.5
}
fn default_pulse_duty() -> f64 {
    95.0
}
fn default_device_max_amplitude() -> f64 {
    1.0
}
fn default_ambient() -> f64 {
    25.0
}
fn default_heating_coefficient() -> f64 {
    2.5
}
fn default_cooling_time_constant() -> f64 {
    30.0
}
fn default_noise() -> f64 {
    0.05
}

impl Default for ThermometerConfig {
    fn default() -> Self {
        Self {
            driver: default_thermometer_driver(),
            device: default_thermometer_device(),
            channel: default_channel(),
        }
    }
}

impl Default for SignalGeneratorConfig {
    fn default() -> Self {
        Self {
            driver: default_signal_generator_driver(),
            device: default_signal_generator_device(),
            carrier_frequency_hz: default_carrier_frequency(),
            modulation_type: default_modulation_type(),
            modulation_function: default_modulation_function(),
            pulse_period_s: default_pulse_period(),
            pulse_duty_percent: default_pulse_duty(),
            device_max_amplitude_vpp: default_device_max_amplitude(),
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            ambient_celsius: default_ambient(),
            heating_celsius_per_s_per_vpp2: default_heating_coefficient(),
            cooling_time_constant_s: default_cooling_time_constant(),
            noise_celsius: default_noise(),
            sensor_fault_probability: 0.0,
            seed: None,
        }
    }
}

impl InstrumentsConfig {
    /// Switch both instruments to their simulated drivers
    pub fn use_simulation(&mut self) {
        self.thermometer.driver = ThermometerDriverType::Mock;
        self.signal_generator.driver = SignalGeneratorDriverType::Mock;
    }

    pub fn is_simulated(&self) -> bool {
        self.thermometer.driver == ThermometerDriverType::Mock
            && self.signal_generator.driver == SignalGeneratorDriverType::Mock
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_names_are_snake_case() {
        let yaml = "thermometer:\n  driver: mock\nsignal_generator:\n  driver: sg386\n  device: /dev/ttyS3\n";
        let config: InstrumentsConfig = serde_yml::from_str(yaml).unwrap();

        assert_eq!(config.thermometer.driver, ThermometerDriverType::Mock);
        assert_eq!(config.thermometer.channel, 1);
        assert_eq!(config.signal_generator.driver, SignalGeneratorDriverType::Sg386);
        assert_eq!(config.signal_generator.device, "/dev/ttyS3");
        assert_eq!(config.signal_generator.pulse_duty_percent, 95.0);
    }

    #[test]
    fn test_use_simulation_switches_both_drivers() {
        let mut config = InstrumentsConfig::default();
        assert!(!config.is_simulated());
        config.use_simulation();
        assert!(config.is_simulated());
    }
}
