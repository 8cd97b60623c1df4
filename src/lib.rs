// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-thermal-stimulation project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Rust Thermal Stimulation library
//!
//! Closed-loop control of an ultrasound stimulation experiment: a thermometer
//! reading is fed to a PID controller whose output, screened by a safety clamp,
//! sets the amplitude of an RF signal generator at a fixed cadence. Every accepted
//! cycle is recorded and exported when the session ends.
//!
//! - [`config`]: YAML configuration with schema validation
//! - [`thermal_regulation`]: controller, safety clamp, control loop, recorder and drivers

pub mod config;
pub mod thermal_regulation;

pub use config::Config;
pub use thermal_regulation::{
    create_instruments, export_session, SessionError, SessionReport, ThermalControlLoop,
};
