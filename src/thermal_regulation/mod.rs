// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-thermal-stimulation project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Closed-loop thermal regulation of a stimulation experiment
//!
//! This module provides:
//! - The collaborator traits the control core talks to (thermometer, signal generator)
//! - A PID controller with conditional-integration anti-windup
//! - A safety clamp screening readings and limiting amplitudes
//! - The fixed-cadence control loop and its session recorder
//! - Instrument drivers (HH806 thermometer, SG386 signal generator, simulation)

pub mod daemon;
pub mod drivers;
pub mod error;
pub mod pid;
pub mod recorder;
pub mod safety;
pub mod simulation;

use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{info, warn};
use tokio::fs::{File, OpenOptions};
use tokio::io::{self, Join};

use crate::config::instruments::{
    SignalGeneratorConfig, SignalGeneratorDriverType, SimulationConfig, ThermometerConfig,
    ThermometerDriverType,
};
use crate::thermal_regulation::drivers::{
    Hh806Thermometer, Sg386SignalGenerator, SimulatedSignalGenerator, SimulatedThermometer,
};
use crate::thermal_regulation::error::{ActuatorFault, SensorFault};
use crate::thermal_regulation::simulation::ThermalSampleSimulation;

pub use daemon::{LoopState, SessionReport, StopHandle, TerminationReason, ThermalControlLoop};
pub use error::{ConfigurationError, SessionError};
pub use pid::{PidComponents, PidController, PidOutput};
pub use recorder::{export_session, Sample, SessionRecorder, SessionSink};
pub use safety::{RejectReason, SafetyClamp, TemperatureVerdict};

/// Temperature sensor collaborator
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TemperatureSensor {
    /// Read the sample temperature in degrees Celsius
    async fn read_temperature(&mut self) -> Result<f64, SensorFault>;
}

/// Signal generator collaborator driving the stimulus amplitude
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SignalActuator {
    /// Set the output amplitude in Vpp
    async fn set_output_amplitude(&mut self, amplitude_vpp: f64) -> Result<(), ActuatorFault>;

    /// Switch the RF output on or off
    async fn set_output_enabled(&mut self, enabled: bool) -> Result<(), ActuatorFault>;

    /// Highest amplitude the device accepts, in Vpp
    fn get_max_amplitude(&self) -> f64;
}

/// Boxed thermometer owned by the control loop
pub type BoxedSensor = Box<dyn TemperatureSensor + Send>;
/// Boxed signal generator owned by the control loop
pub type BoxedActuator = Box<dyn SignalActuator + Send>;

/// Open a serial device node with separate read and write handles
///
/// A `tokio::fs::File` runs each read on a blocking thread and makes writes wait
/// for it, so a read left pending by a timeout would hold back the next request.
async fn open_serial_device(device: &str) -> std::io::Result<Join<File, File>> {
    let reader = OpenOptions::new().read(true).open(device).await?;
    let writer = OpenOptions::new().write(true).open(device).await?;
    Ok(io::join(reader, writer))
}

/// Create the thermometer and signal generator described by the configuration
///
/// Simulated instruments share one thermal model so the amplitude commanded on the
/// generator heats what the thermometer reads.
pub async fn create_instruments(
    thermometer: &ThermometerConfig,
    signal_generator: &SignalGeneratorConfig,
    simulation: &SimulationConfig,
) -> Result<(BoxedSensor, BoxedActuator)> {
    let shared_model = Arc::new(Mutex::new(ThermalSampleSimulation::new(simulation)));

    let sensor: BoxedSensor = match thermometer.driver {
        ThermometerDriverType::Hh806 => {
            let port = open_serial_device(&thermometer.device)
                .await
                .with_context(|| {
                    format!("Failed to open thermometer port {}", thermometer.device)
                })?;
            info!("Thermometer connection open on {}", thermometer.device);
            Box::new(Hh806Thermometer::new(port, thermometer.channel))
        }
        ThermometerDriverType::Mock => {
            info!("Using simulated thermometer");
            Box::new(SimulatedThermometer::new(shared_model.clone(), simulation))
        }
    };

    let actuator: BoxedActuator = match signal_generator.driver {
        SignalGeneratorDriverType::Sg386 => {
            let port = open_serial_device(&signal_generator.device)
                .await
                .with_context(|| {
                    format!(
                        "Failed to open signal generator port {}",
                        signal_generator.device
                    )
                })?;
            info!(
                "Signal generator connection open on {}",
                signal_generator.device
            );
            let mut generator =
                Sg386SignalGenerator::new(port, signal_generator.device_max_amplitude_vpp);
            let identity = generator
                .identify()
                .await
                .context("Signal generator did not identify itself")?;
            info!("Signal generator: {}", identity);
            generator
                .configure_pulse_modulation(signal_generator)
                .await
                .context("Failed to configure pulse modulation")?;
            match generator.status().await {
                Ok(status) => info!("Signal generator status: {}", status),
                Err(e) => warn!("Signal generator status unavailable: {}", e),
            }
            Box::new(generator)
        }
        SignalGeneratorDriverType::Mock => {
            info!("Using simulated signal generator");
            Box::new(SimulatedSignalGenerator::new(
                shared_model,
                signal_generator.device_max_amplitude_vpp,
            ))
        }
    };

    Ok((sensor, actuator))
}
