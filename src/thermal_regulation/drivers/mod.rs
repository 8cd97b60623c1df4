// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-thermal-stimulation project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Instrument drivers for thermal stimulation
//!
//! This module provides the driver implementations behind the collaborator traits:
//! - HH806: Omega dual-channel thermocouple thermometer (binary serial protocol)
//! - SG386: Stanford Research Systems RF signal generator (text serial protocol)
//! - Mock: Simulated instruments sharing a thermal model, for testing and development

pub mod hh806;
pub mod mock;
pub mod sg386;

pub use hh806::Hh806Thermometer;
pub use mock::{SimulatedSignalGenerator, SimulatedThermometer};
pub use sg386::Sg386SignalGenerator;
