// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-thermal-stimulation project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Safety clamp between the control law and the hardware
//!
//! Readings are screened before they reach the PID controller, and every
//! commanded amplitude is magnitude-limited before it reaches the actuator.

use std::fmt;

use crate::config::stimulation::SafetyLimits;

/// Why a temperature reading was refused
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RejectReason {
    /// NaN or infinite
    NonFinite,
    /// Above the maximum safe temperature
    AboveSafeLimit { reading: f64, limit: f64 },
    /// Below the lowest plausible temperature
    BelowValidRange { reading: f64, limit: f64 },
    /// Equal to the dead-probe sentinel value
    ProbeSentinel { sentinel: f64 },
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::NonFinite => write!(f, "reading is not a finite number"),
            RejectReason::AboveSafeLimit { reading, limit } => {
                write!(f, "{reading} °C exceeds the safe limit of {limit} °C")
            }
            RejectReason::BelowValidRange { reading, limit } => {
                write!(f, "{reading} °C is below the valid range ({limit} °C)")
            }
            RejectReason::ProbeSentinel { sentinel } => {
                write!(f, "{sentinel} °C is the no-probe sentinel value")
            }
        }
    }
}

/// Outcome of a temperature screening
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TemperatureVerdict {
    Accept(f64),
    Reject(RejectReason),
}

/// Enforces the amplitude ceiling and the temperature window
#[derive(Debug, Clone)]
pub struct SafetyClamp {
    max_amplitude: f64,
    max_safe_temperature: f64,
    min_valid_temperature: f64,
    probe_sentinel: Option<f64>,
}

impl SafetyClamp {
    /// Build a clamp from validated limits
    pub fn new(limits: &SafetyLimits) -> Self {
        Self {
            max_amplitude: limits.max_amplitude_vpp,
            max_safe_temperature: limits.max_safe_temperature_celsius,
            min_valid_temperature: limits.min_valid_temperature_celsius,
            probe_sentinel: limits.probe_sentinel_celsius,
        }
    }

    /// Lower the amplitude ceiling to the device limit when the device is weaker
    pub fn with_device_ceiling(mut self, device_max_amplitude: f64) -> Self {
        if device_max_amplitude.is_finite() && device_max_amplitude > 0.0 {
            self.max_amplitude = self.max_amplitude.min(device_max_amplitude);
        }
        self
    }

    pub fn max_amplitude(&self) -> f64 {
        self.max_amplitude
    }

    /// Limit the magnitude of `requested`, keeping its sign
    ///
    /// Never increases the magnitude. NaN is mapped to zero output.
    pub fn clamp_amplitude(&self, requested: f64) -> f64 {
        if requested.is_nan() {
            return 0.0;
        }
        if requested.abs() <= self.max_amplitude {
            requested
        } else {
            self.max_amplitude.copysign(requested)
        }
    }

    /// Screen a raw thermometer reading
    pub fn validate_temperature(&self, reading: f64) -> TemperatureVerdict {
        if !reading.is_finite() {
            return TemperatureVerdict::Reject(RejectReason::NonFinite);
        }
        if reading > self.max_safe_temperature {
            return TemperatureVerdict::Reject(RejectReason::AboveSafeLimit {
                reading,
                limit: self.max_safe_temperature,
            });
        }
        if reading < self.min_valid_temperature {
            return TemperatureVerdict::Reject(RejectReason::BelowValidRange {
                reading,
                limit: self.min_valid_temperature,
            });
        }
        if let Some(sentinel) = self.probe_sentinel {
            if reading == sentinel {
                return TemperatureVerdict::Reject(RejectReason::ProbeSentinel { sentinel });
            }
        }
        TemperatureVerdict::Accept(reading)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clamp(max_amplitude: f64, sentinel: Option<f64>) -> SafetyClamp {
        SafetyClamp::new(&SafetyLimits {
            max_amplitude_vpp: max_amplitude,
            max_safe_temperature_celsius: 50.0,
            min_valid_temperature_celsius: -50.0,
            probe_sentinel_celsius: sentinel,
        })
    }

    #[test]
    fn test_clamp_amplitude_limits_magnitude_only() {
        let clamp = clamp(0.5, None);

        assert_eq!(clamp.clamp_amplitude(0.8), 0.5);
        assert_eq!(clamp.clamp_amplitude(-0.8), -0.5);
        assert_eq!(clamp.clamp_amplitude(0.3), 0.3);
        assert_eq!(clamp.clamp_amplitude(-0.3), -0.3);
        assert_eq!(clamp.clamp_amplitude(0.5), 0.5);
        assert_eq!(clamp.clamp_amplitude(0.0), 0.0);
        assert_eq!(clamp.clamp_amplitude(f64::INFINITY), 0.5);
        assert_eq!(clamp.clamp_amplitude(f64::NAN), 0.0);
    }

    #[test]
    fn test_clamp_never_increases_magnitude() {
        let clamp = clamp(0.25, None);
        let mut requested = -2.0;
        while requested <= 2.0 {
            let clamped = clamp.clamp_amplitude(requested);
            assert!(clamped.abs() <= requested.abs());
            assert!(clamped.abs() <= 0.25);
            assert!(clamped == 0.0 || clamped.signum() == requested.signum());
            requested += 0.05;
        }
    }

    #[test]
    fn test_device_ceiling_only_lowers_the_limit() {
        assert_eq!(clamp(0.5, None).with_device_ceiling(0.2).max_amplitude(), 0.2);
        assert_eq!(clamp(0.5, None).with_device_ceiling(2.0).max_amplitude(), 0.5);
        assert_eq!(
            clamp(0.5, None).with_device_ceiling(f64::NAN).max_amplitude(),
            0.5
        );
    }

    #[test]
    fn test_validate_temperature_window() {
        let clamp = clamp(0.5, None);

        assert_eq!(
            clamp.validate_temperature(f64::NAN),
            TemperatureVerdict::Reject(RejectReason::NonFinite)
        );
        assert_eq!(
            clamp.validate_temperature(f64::NEG_INFINITY),
            TemperatureVerdict::Reject(RejectReason::NonFinite)
        );
        assert!(matches!(
            clamp.validate_temperature(50.1),
            TemperatureVerdict::Reject(RejectReason::AboveSafeLimit { .. })
        ));
        assert!(matches!(
            clamp.validate_temperature(-50.1),
            TemperatureVerdict::Reject(RejectReason::BelowValidRange { .. })
        ));

        for reading in [-50.0, -12.5, 0.0, 21.3, 37.0, 50.0] {
            assert_eq!(
                clamp.validate_temperature(reading),
                TemperatureVerdict::Accept(reading)
            );
        }
    }

    #[test]
    fn test_probe_sentinel_is_not_a_measurement() {
        let clamp = clamp(0.5, Some(0.0));

        assert_eq!(
            clamp.validate_temperature(0.0),
            TemperatureVerdict::Reject(RejectReason::ProbeSentinel { sentinel: 0.0 })
        );
        assert_eq!(
            clamp.validate_temperature(0.1),
            TemperatureVerdict::Accept(0.1)
        );
    }

    #[test]
    fn test_default_limits_accept_freezing_point() {
        let clamp = SafetyClamp::new(&SafetyLimits::default());

        assert_eq!(clamp.validate_temperature(0.0), TemperatureVerdict::Accept(0.0));
        assert!(matches!(
            clamp.validate_temperature(-0.0),
            TemperatureVerdict::Accept(value) if value == 0.0
        ));
    }
}
