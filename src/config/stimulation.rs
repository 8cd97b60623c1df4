// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-thermal-stimulation project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Configuration of a stimulation session
//!
//! Setpoint, PID gains, loop timing, safety limits and fault policy. Everything
//! here is validated once, when the control loop is armed.

use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::thermal_regulation::error::ConfigurationError;

/// Stimulation session configuration
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct StimulationConfig {
    /// Target temperature in degrees Celsius
    #[serde(default = "default_setpoint")]
    pub setpoint_celsius: f64,

    /// Stimulation duration in seconds
    #[serde(default = "default_duration")]
    pub duration_s: f64,

    /// Control loop period in seconds
    #[serde(default = "default_tick_period")]
    pub tick_period_s: f64,

    /// PID controller parameters
    #[serde(default)]
    pub pid_parameters: PidParameters,

    /// Safety limits applied before any actuation
    #[serde(default)]
    pub safety_limits: SafetyLimits,

    /// Sensor and actuator fault handling
    #[serde(default)]
    pub fault_policy: FaultPolicy,
}

/// PID controller parameters
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct PidParameters {
    /// Proportional gain
    #[serde(default = "default_kp")]
    pub kp: f64,

    /// Integral gain
    #[serde(default = "default_ki")]
    pub ki: f64,

    /// Derivative gain
    #[serde(default)]
    pub kd: f64,

    /// Minimum output amplitude in Vpp
    #[serde(default = "default_output_min")]
    pub output_min: f64,

    /// Maximum output amplitude in Vpp
    #[serde(default = "default_output_max")]
    pub output_max: f64,

    /// Accept negative gains (reverse-acting loops)
    #[serde(default)]
    pub allow_negative_gains: bool,
}

/// Safety limits and protections
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct SafetyLimits {
    /// Absolute amplitude ceiling in Vpp
    #[serde(default = "default_max_amplitude")]
    pub max_amplitude_vpp: f64,

    /// Readings above this temperature are rejected
    #[serde(default = "default_max_safe_temperature")]
    pub max_safe_temperature_celsius: f64,

    /// Readings below this temperature are rejected
    #[serde(default = "default_min_valid_temperature")]
    pub min_valid_temperature_celsius: f64,

    /// Value reported by a thermometer with no probe attached (null disables the check)
    ///
    /// The HH806 driver already reports a missing probe as a fault, so this is
    /// only needed for instruments that return a plain dead value.
    #[serde(default = "default_probe_sentinel")]
    pub probe_sentinel_celsius: Option<f64>,
}

/// Fault handling policy
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct FaultPolicy {
    /// The loop faults out once consecutive skipped ticks exceed this count
    #[serde(default = "default_fault_threshold")]
    pub consecutive_sensor_fault_threshold: u32,

    /// Timeout of a single sensor or actuator call in milliseconds
    #[serde(default = "default_io_timeout")]
    pub io_timeout_ms: u64,
}

fn default_setpoint() -> f64 {
    37.0
}
fn default_duration() -> f64 {
    60.0
}
fn default_tick_period() -> f64 {
    1.0
}
fn default_kp() -> f64 {
    0.5
}
fn default_ki() -> f64 {
    0.1
}
fn default_output_min() -> f64 {
    0.00001
}
fn default_output_max() -> f64 {
    0.5
}
fn default_max_amplitude() -> f64 {
    0.5
}
fn default_max_safe_temperature() -> f64 {
    50.0
}
fn default_min_valid_temperature() -> f64 {
    -50.0
}
fn default_probe_sentinel() -> Option<f64> {
    None
}
fn default_fault_threshold() -> u32 {
    5
}
fn default_io_timeout() -> u64 {
    1000
}

impl Default for StimulationConfig {
    fn default() -> Self {
        Self {
            setpoint_celsius: default_setpoint(),
            duration_s: default_duration(),
            tick_period_s: default_tick_period(),
            pid_parameters: PidParameters::default(),
            safety_limits: SafetyLimits::default(),
            fault_policy: FaultPolicy::default(),
        }
    }
}

impl Default for PidParameters {
    fn default() -> Self {
        Self {
            kp: default_kp(),
            ki: default_ki(),
            kd: 0.0,
            output_min: default_output_min(),
            output_max: default_output_max(),
            allow_negative_gains: false,
        }
    }
}

impl Default for SafetyLimits {
    fn default() -> Self {
        Self {
            max_amplitude_vpp: default_max_amplitude(),
            max_safe_temperature_celsius: default_max_safe_temperature(),
            min_valid_temperature_celsius: default_min_valid_temperature(),
            probe_sentinel_celsius: default_probe_sentinel(),
        }
    }
}

impl Default for FaultPolicy {
    fn default() -> Self {
        Self {
            consecutive_sensor_fault_threshold: default_fault_threshold(),
            io_timeout_ms: default_io_timeout(),
        }
    }
}

fn require_finite(name: &'static str, value: f64) -> Result<(), ConfigurationError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ConfigurationError::NotFinite { name, value })
    }
}

fn require_positive(name: &'static str, value: f64) -> Result<(), ConfigurationError> {
    require_finite(name, value)?;
    if value > 0.0 {
        Ok(())
    } else {
        Err(ConfigurationError::NotPositive { name, value })
    }
}

/// Positive and representable as a non-zero `Duration`
fn require_duration(name: &'static str, seconds: f64) -> Result<(), ConfigurationError> {
    require_positive(name, seconds)?;
    match Duration::try_from_secs_f64(seconds) {
        Ok(duration) if !duration.is_zero() => Ok(()),
        Ok(_) => Err(ConfigurationError::NotPositive {
            name,
            value: seconds,
        }),
        Err(_) => Err(ConfigurationError::NotFinite {
            name,
            value: seconds,
        }),
    }
}

impl PidParameters {
    /// Check gains and output bounds
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let gains = [("kp", self.kp), ("ki", self.ki), ("kd", self.kd)];
        for (name, value) in gains {
            require_finite(name, value)?;
        }
        if !self.allow_negative_gains {
            if let Some((name, value)) = gains.into_iter().find(|(_, value)| *value < 0.0) {
                return Err(ConfigurationError::NegativeGain { name, value });
            }
        }

        require_finite("output_min", self.output_min)?;
        require_finite("output_max", self.output_max)?;
        if self.output_min >= self.output_max {
            return Err(ConfigurationError::InvertedBounds {
                min: self.output_min,
                max: self.output_max,
            });
        }
        Ok(())
    }
}

impl SafetyLimits {
    /// Check the amplitude ceiling and the temperature window
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        require_positive("max_amplitude_vpp", self.max_amplitude_vpp)?;
        require_finite(
            "max_safe_temperature_celsius",
            self.max_safe_temperature_celsius,
        )?;
        require_finite(
            "min_valid_temperature_celsius",
            self.min_valid_temperature_celsius,
        )?;
        if let Some(sentinel) = self.probe_sentinel_celsius {
            require_finite("probe_sentinel_celsius", sentinel)?;
        }
        if self.min_valid_temperature_celsius >= self.max_safe_temperature_celsius {
            return Err(ConfigurationError::InvertedTemperatureWindow {
                min: self.min_valid_temperature_celsius,
                max: self.max_safe_temperature_celsius,
            });
        }
        Ok(())
    }
}

impl StimulationConfig {
    /// Validate the whole session configuration
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        require_finite("setpoint_celsius", self.setpoint_celsius)?;
        require_duration("duration_s", self.duration_s)?;
        require_duration("tick_period_s", self.tick_period_s)?;
        if self.fault_policy.io_timeout_ms == 0 {
            return Err(ConfigurationError::NotPositive {
                name: "io_timeout_ms",
                value: 0.0,
            });
        }

        self.pid_parameters.validate()?;
        self.safety_limits.validate()?;

        let limits = &self.safety_limits;
        if self.setpoint_celsius < limits.min_valid_temperature_celsius
            || self.setpoint_celsius > limits.max_safe_temperature_celsius
        {
            return Err(ConfigurationError::SetpointOutOfRange {
                setpoint: self.setpoint_celsius,
                min: limits.min_valid_temperature_celsius,
                max: limits.max_safe_temperature_celsius,
            });
        }

        check_reachable_bounds(&self.pid_parameters, limits.max_amplitude_vpp)
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_secs_f64(self.tick_period_s)
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.duration_s)
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.fault_policy.io_timeout_ms)
    }
}

/// Output bounds must intersect `[-max_amplitude, max_amplitude]`, otherwise no
/// commanded amplitude can satisfy both.
pub fn check_reachable_bounds(
    parameters: &PidParameters,
    max_amplitude: f64,
) -> Result<(), ConfigurationError> {
    if parameters.output_min > max_amplitude || parameters.output_max < -max_amplitude {
        return Err(ConfigurationError::UnreachableBounds {
            min: parameters.output_min,
            max: parameters.output_max,
            max_amplitude,
        });
    }
    Ok(())
}
