// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-thermal-stimulation project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Thermal simulation of a stimulated sample
//!
//! First-order model shared by the simulated thermometer and signal generator:
//!
//! ```text
//! dT/dt = h·V² − (T − T_ambient) / τ
//! ```
//!
//! where `V` is the generator amplitude (zero while the output is disabled), `h`
//! the heating coefficient in °C/s/Vpp² and `τ` the cooling time constant. The
//! model is integrated with its exact exponential solution, so large steps stay
//! stable. Time is taken from `tokio::time`, which makes the simulation follow a
//! paused test clock.

use log::debug;
use tokio::time::Instant;

use crate::config::instruments::SimulationConfig;

/// Thermal state of the simulated sample
#[derive(Debug)]
pub struct ThermalSampleSimulation {
    temperature: f64,
    ambient_temperature: f64,
    heating_coefficient: f64,
    cooling_time_constant: f64,
    amplitude_vpp: f64,
    output_enabled: bool,
    last_update: Instant,
}

impl ThermalSampleSimulation {
    /// Start at ambient temperature, output disabled
    pub fn new(config: &SimulationConfig) -> Self {
        Self {
            temperature: config.ambient_celsius,
            ambient_temperature: config.ambient_celsius,
            heating_coefficient: config.heating_celsius_per_s_per_vpp2,
            cooling_time_constant: config.cooling_time_constant_s.max(f64::EPSILON),
            amplitude_vpp: 0.0,
            output_enabled: false,
            last_update: Instant::now(),
        }
    }

    /// Advance the model to the current instant
    pub fn update(&mut self) {
        let now = Instant::now();
        let dt = now.duration_since(self.last_update).as_secs_f64();
        self.last_update = now;
        if dt > 0.0 {
            self.step(dt);
        }
    }

    /// Advance the model by `dt` seconds
    pub fn step(&mut self, dt: f64) {
        let equilibrium = self.equilibrium_temperature();
        let decay = (-dt / self.cooling_time_constant).exp();
        self.temperature = equilibrium + (self.temperature - equilibrium) * decay;
    }

    /// Temperature the sample converges to with the current drive
    pub fn equilibrium_temperature(&self) -> f64 {
        let drive = if self.output_enabled {
            self.amplitude_vpp
        } else {
            0.0
        };
        self.ambient_temperature + self.heating_coefficient * self.cooling_time_constant * drive * drive
    }

    pub fn set_amplitude(&mut self, amplitude_vpp: f64) {
        self.update();
        self.amplitude_vpp = amplitude_vpp;
        debug!("Simulation amplitude set to {} Vpp", amplitude_vpp);
    }

    pub fn set_output_enabled(&mut self, enabled: bool) {
        self.update();
        self.output_enabled = enabled;
        debug!(
            "Simulation output {}",
            if enabled { "enabled" } else { "disabled" }
        );
    }

    /// Current noiseless sample temperature
    pub fn temperature(&mut self) -> f64 {
        self.update();
        self.temperature
    }

    pub fn amplitude(&self) -> f64 {
        self.amplitude_vpp
    }

    pub fn is_output_enabled(&self) -> bool {
        self.output_enabled
    }
}
