// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-thermal-stimulation project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! PID controller driving the stimulus amplitude from the measured temperature
//!
//! The controller is a plain state machine: the caller supplies the elapsed time
//! since the previous accepted evaluation, so skipped ticks stretch `dt` instead
//! of being lost. Anti-windup is conditional integration: when the clamped output
//! differs from the raw output, the integral increment of that cycle is discarded.

use serde::{Deserialize, Serialize};

use crate::config::stimulation::PidParameters;
use crate::thermal_regulation::error::ConfigurationError;

/// PID controller components for analysis
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PidComponents {
    /// Proportional term value
    pub proportional: f64,
    /// Integral term that entered the raw output
    pub integral: f64,
    /// Derivative term value
    pub derivative: f64,
    /// Error value (setpoint - measurement)
    pub error: f64,
}

/// PID controller output including components for debugging
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidOutput {
    /// Output clamped to the configured bounds
    pub control_output: f64,
    /// Sum of the three terms before clamping
    pub raw_output: f64,
    /// True when the clamp changed the raw output
    pub saturated: bool,
    /// Individual PID components
    pub components: PidComponents,
}

/// PID controller for the stimulation amplitude
#[derive(Debug, Clone)]
pub struct PidController {
    /// Proportional gain
    kp: f64,
    /// Integral gain
    ki: f64,
    /// Derivative gain
    kd: f64,
    /// Target temperature in Celsius
    setpoint_celsius: f64,
    /// Integral accumulator (already multiplied by ki)
    integral: f64,
    /// Error of the previous evaluation, `None` before the first one
    previous_error: Option<f64>,
    /// Output limits
    output_min: f64,
    output_max: f64,
}

impl PidController {
    /// Create a new PID controller
    ///
    /// Gains and bounds are validated once here; evaluation never fails.
    pub fn new(
        parameters: &PidParameters,
        setpoint_celsius: f64,
    ) -> Result<Self, ConfigurationError> {
        parameters.validate()?;
        if !setpoint_celsius.is_finite() {
            return Err(ConfigurationError::NotFinite {
                name: "setpoint_celsius",
                value: setpoint_celsius,
            });
        }

        Ok(Self {
            kp: parameters.kp,
            ki: parameters.ki,
            kd: parameters.kd,
            setpoint_celsius,
            integral: 0.0,
            previous_error: None,
            output_min: parameters.output_min,
            output_max: parameters.output_max,
        })
    }

    /// Evaluate the control law and return the clamped output
    ///
    /// # Arguments
    /// * `measurement` - Current temperature in Celsius
    /// * `dt` - Seconds since the previous accepted evaluation (nominal period on the first call)
    pub fn evaluate(&mut self, measurement: f64, dt: f64) -> f64 {
        self.evaluate_detailed(measurement, dt).control_output
    }

    /// Evaluate the control law and return the output with its components
    pub fn evaluate_detailed(&mut self, measurement: f64, dt: f64) -> PidOutput {
        let error = self.setpoint_celsius - measurement;

        let proportional = self.kp * error;

        let candidate_integral = self.integral + self.ki * error * dt;

        // First call: previous_error = error, so the derivative kick is zero
        let previous_error = self.previous_error.unwrap_or(error);
        let derivative = if dt > 0.0 {
            self.kd * (error - previous_error) / dt
        } else {
            0.0
        };

        let raw_output = proportional + candidate_integral + derivative;
        let control_output = raw_output.clamp(self.output_min, self.output_max);
        let saturated = control_output != raw_output;

        // Anti-windup: freeze the accumulator while pinned at a limit
        if !saturated {
            self.integral = candidate_integral;
        }
        self.previous_error = Some(error);

        PidOutput {
            control_output,
            raw_output,
            saturated,
            components: PidComponents {
                proportional,
                integral: candidate_integral,
                derivative,
                error,
            },
        }
    }

    /// Reset PID controller state
    ///
    /// Clears the integral history so a restarted session does not inherit it.
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.previous_error = None;
    }

    pub fn setpoint(&self) -> f64 {
        self.setpoint_celsius
    }

    pub fn integral_accumulator(&self) -> f64 {
        self.integral
    }

    pub fn previous_error(&self) -> Option<f64> {
        self.previous_error
    }

    /// Output bounds as `(min, max)`
    pub fn output_bounds(&self) -> (f64, f64) {
        (self.output_min, self.output_max)
    }

    /// Output bound closest to zero, used to park the actuator
    pub fn safe_minimum(&self) -> f64 {
        if self.output_min >= 0.0 {
            self.output_min
        } else if self.output_max <= 0.0 {
            self.output_max
        } else {
            0.0
        }
    }
}
