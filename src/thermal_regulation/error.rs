// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-thermal-stimulation project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Error taxonomy of the thermal stimulation control core
//!
//! Faults are split by recovery policy:
//! - [`ConfigurationError`]: fatal, raised before the loop runs
//! - [`SensorFault`]: one bad or missing reading, the tick is skipped
//! - [`ActuatorFault`]: the output state is unknown, the loop faults out
//!
//! [`SessionError`] is what the control loop hands back to its caller.

use thiserror::Error;

use crate::thermal_regulation::daemon::{LoopState, SessionReport};

/// Malformed gains, bounds or limits detected while arming the loop
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("{name} must be a finite number (got {value})")]
    NotFinite { name: &'static str, value: f64 },

    #[error("{name} must be strictly positive (got {value})")]
    NotPositive { name: &'static str, value: f64 },

    #[error("{name} gain must not be negative (got {value})")]
    NegativeGain { name: &'static str, value: f64 },

    #[error("output bounds are inverted: min {min} >= max {max}")]
    InvertedBounds { min: f64, max: f64 },

    #[error(
        "output bounds [{min}, {max}] do not intersect the amplitude ceiling ±{max_amplitude}"
    )]
    UnreachableBounds {
        min: f64,
        max: f64,
        max_amplitude: f64,
    },

    #[error("temperature window is inverted: min {min} °C >= max {max} °C")]
    InvertedTemperatureWindow { min: f64, max: f64 },

    #[error("setpoint {setpoint} °C is outside the valid temperature window [{min}, {max}] °C")]
    SetpointOutOfRange { setpoint: f64, min: f64, max: f64 },
}

/// A single failed or missing temperature reading
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SensorFault {
    #[error("thermometer did not answer within {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    #[error("thermometer link error: {message}")]
    Io { message: String },

    #[error("malformed thermometer frame: {reason}")]
    MalformedFrame { reason: String },

    #[error("no probe attached to channel {channel}")]
    NoProbe { channel: u8 },

    #[error("simulated sensor fault")]
    Simulated,
}

/// A failed amplitude or output-enable command
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ActuatorFault {
    #[error("signal generator did not acknowledge within {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    #[error("signal generator link error: {message}")]
    Io { message: String },

    #[error("signal generator rejected '{command}': {reason}")]
    Rejected { command: String, reason: String },

    #[error("simulated actuator fault")]
    Simulated,
}

impl From<std::io::Error> for SensorFault {
    fn from(err: std::io::Error) -> Self {
        SensorFault::Io {
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for ActuatorFault {
    fn from(err: std::io::Error) -> Self {
        ActuatorFault::Io {
            message: err.to_string(),
        }
    }
}

/// Errors returned by the control loop to its caller
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("invalid stimulation configuration: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("actuator fault while arming: {0}")]
    Actuator(#[from] ActuatorFault),

    #[error("cannot {action} while the control loop is {state}")]
    InvalidState {
        action: &'static str,
        state: LoopState,
    },

    /// The session ended FAULTED, or its final output-disable failed.
    /// The report still holds every recorded sample.
    #[error("stimulation session aborted: {}", .0.summary())]
    Aborted(Box<SessionReport>),
}

impl SessionError {
    /// Session report attached to an aborted session, if any
    pub fn report(&self) -> Option<&SessionReport> {
        match self {
            SessionError::Aborted(report) => Some(report),
            _ => None,
        }
    }

    /// Take the report out of an aborted session
    pub fn into_report(self) -> Option<SessionReport> {
        match self {
            SessionError::Aborted(report) => Some(*report),
            _ => None,
        }
    }
}
