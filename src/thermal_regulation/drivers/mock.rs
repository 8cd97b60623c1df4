// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-thermal-stimulation project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Simulated instruments for thermal stimulation
//!
//! The simulated thermometer and signal generator share one
//! [`ThermalSampleSimulation`] through `Arc<Mutex<_>>`: the amplitude commanded on
//! the generator heats the sample the thermometer reads. Both drivers support
//! fault injection so the control loop's fault handling can be exercised without
//! hardware.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::instruments::SimulationConfig;
use crate::thermal_regulation::error::{ActuatorFault, SensorFault};
use crate::thermal_regulation::simulation::ThermalSampleSimulation;
use crate::thermal_regulation::{SignalActuator, TemperatureSensor};

/// Thermometer reading the shared thermal model with noise
pub struct SimulatedThermometer {
    model: Arc<Mutex<ThermalSampleSimulation>>,
    rng: StdRng,
    noise_celsius: f64,
    fault_probability: f64,
    /// Readings left to fail before the next real one
    pending_faults: u32,
}

impl SimulatedThermometer {
    pub fn new(model: Arc<Mutex<ThermalSampleSimulation>>, config: &SimulationConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_rng(&mut rand::rng()),
        };
        Self {
            model,
            rng,
            noise_celsius: config.noise_celsius.max(0.0),
            fault_probability: config.sensor_fault_probability.clamp(0.0, 1.0),
            pending_faults: 0,
        }
    }

    /// Make the next `count` readings fail
    pub fn inject_faults(&mut self, count: u32) {
        self.pending_faults = self.pending_faults.saturating_add(count);
    }

    fn model(&self) -> Result<MutexGuard<'_, ThermalSampleSimulation>, SensorFault> {
        self.model.lock().map_err(|_| SensorFault::Io {
            message: "thermal simulation state poisoned".to_string(),
        })
    }
}

#[async_trait]
impl TemperatureSensor for SimulatedThermometer {
    async fn read_temperature(&mut self) -> Result<f64, SensorFault> {
        if self.pending_faults > 0 {
            self.pending_faults -= 1;
            debug!("Injected sensor fault ({} left)", self.pending_faults);
            return Err(SensorFault::Simulated);
        }
        if self.fault_probability > 0.0 && self.rng.random_bool(self.fault_probability) {
            return Err(SensorFault::Simulated);
        }

        let temperature = self.model()?.temperature();
        let noise = if self.noise_celsius > 0.0 {
            self.rng
                .random_range(-self.noise_celsius..=self.noise_celsius)
        } else {
            0.0
        };
        Ok(temperature + noise)
    }
}

/// Signal generator driving the shared thermal model
pub struct SimulatedSignalGenerator {
    model: Arc<Mutex<ThermalSampleSimulation>>,
    max_amplitude_vpp: f64,
    /// Commands accepted before every further command fails
    fail_after: Option<u32>,
    commands: u32,
}

impl SimulatedSignalGenerator {
    pub fn new(model: Arc<Mutex<ThermalSampleSimulation>>, max_amplitude_vpp: f64) -> Self {
        Self {
            model,
            max_amplitude_vpp,
            fail_after: None,
            commands: 0,
        }
    }

    /// Fail every command after the first `count` ones
    pub fn fail_after_commands(mut self, count: u32) -> Self {
        self.fail_after = Some(count);
        self
    }

    /// Count the command and fail it once the injected limit is reached
    fn accept_command(&mut self) -> Result<(), ActuatorFault> {
        self.commands += 1;
        match self.fail_after {
            Some(limit) if self.commands > limit => Err(ActuatorFault::Simulated),
            _ => Ok(()),
        }
    }

    fn model(&self) -> Result<MutexGuard<'_, ThermalSampleSimulation>, ActuatorFault> {
        self.model.lock().map_err(|_| ActuatorFault::Io {
            message: "thermal simulation state poisoned".to_string(),
        })
    }
}

#[async_trait]
impl SignalActuator for SimulatedSignalGenerator {
    async fn set_output_amplitude(&mut self, amplitude_vpp: f64) -> Result<(), ActuatorFault> {
        self.accept_command()?;
        if !amplitude_vpp.is_finite() || amplitude_vpp.abs() > self.max_amplitude_vpp {
            return Err(ActuatorFault::Rejected {
                command: format!("AMPR {amplitude_vpp} VPP"),
                reason: format!("outside ±{} Vpp", self.max_amplitude_vpp),
            });
        }
        self.model()?.set_amplitude(amplitude_vpp);
        Ok(())
    }

    async fn set_output_enabled(&mut self, enabled: bool) -> Result<(), ActuatorFault> {
        self.accept_command()?;
        self.model()?.set_output_enabled(enabled);
        Ok(())
    }

    fn get_max_amplitude(&self) -> f64 {
        self.max_amplitude_vpp
    }
}
