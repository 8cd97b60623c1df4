// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-thermal-stimulation project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Stanford Research Systems SG386 signal generator driver
//!
//! Commands are newline-terminated ASCII. Setting commands get no reply, so each
//! one is followed by `LERR?` and a non-zero error code is reported as a rejection.
//! The serial line (9600 baud, 8N1, RTS/CTS) is configured outside this driver.
//! Replies that arrive after their query timed out are discarded before the next
//! command is sent.

use async_trait::async_trait;
use futures::FutureExt;
use log::{debug, info, warn};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufStream};

use crate::config::instruments::SignalGeneratorConfig;
use crate::thermal_regulation::error::ActuatorFault;
use crate::thermal_regulation::SignalActuator;

/// SG386 on a byte stream
pub struct Sg386SignalGenerator<P> {
    stream: BufStream<P>,
    max_amplitude_vpp: f64,
}

impl<P> Sg386SignalGenerator<P>
where
    P: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(port: P, max_amplitude_vpp: f64) -> Self {
        Self {
            stream: BufStream::new(port),
            max_amplitude_vpp,
        }
    }

    fn discard_pending_input(&mut self) -> Result<usize, ActuatorFault> {
        let mut scratch = [0u8; 64];
        let mut discarded = 0;
        while let Some(read) = self.stream.read(&mut scratch).now_or_never() {
            match read? {
                0 => break,
                n => discarded += n,
            }
        }
        Ok(discarded)
    }

    async fn send(&mut self, command: &str) -> Result<(), ActuatorFault> {
        let stale = self.discard_pending_input()?;
        if stale > 0 {
            warn!("SG386: discarded {} bytes of stale reply before '{}'", stale, command);
        }
        debug!("SG386 <- {}", command);
        self.stream.write_all(command.as_bytes()).await?;
        self.stream.write_all(b"\n").await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Send a query and return its reply without the line terminator
    pub async fn query(&mut self, command: &str) -> Result<String, ActuatorFault> {
        self.send(command).await?;
        let mut reply = String::new();
        if self.stream.read_line(&mut reply).await? == 0 {
            return Err(ActuatorFault::Io {
                message: format!("connection closed while waiting for '{command}'"),
            });
        }
        let reply = reply.trim_end().to_string();
        debug!("SG386 -> {}", reply);
        Ok(reply)
    }

    /// Send a setting command and check the instrument's error queue
    async fn set(&mut self, command: String) -> Result<(), ActuatorFault> {
        self.send(&command).await?;
        let reply = self.query("LERR?").await?;
        match reply.parse::<i32>() {
            Ok(0) => Ok(()),
            Ok(code) => Err(ActuatorFault::Rejected {
                command,
                reason: format!("error code {code}"),
            }),
            Err(_) => Err(ActuatorFault::Rejected {
                command,
                reason: format!("unexpected error query reply '{reply}'"),
            }),
        }
    }

    /// Instrument identification string
    pub async fn identify(&mut self) -> Result<String, ActuatorFault> {
        self.query("*IDN?").await
    }

    /// Apply the carrier and pulse modulation preset of the experiment
    pub async fn configure_pulse_modulation(
        &mut self,
        config: &SignalGeneratorConfig,
    ) -> Result<(), ActuatorFault> {
        self.set(format!("TYPE {}", config.modulation_type)).await?;
        self.set(format!("PFNC {}", config.modulation_function))
            .await?;
        self.set(format!("FREQ {} Hz", config.carrier_frequency_hz))
            .await?;
        self.set(format!("PPER {} s", config.pulse_period_s)).await?;
        self.set(format!("PDTY {}", config.pulse_duty_percent))
            .await?;
        self.set("MODL 1".to_string()).await?;
        info!(
            "SG386 pulse modulation: carrier {} Hz, period {} s, duty {} %",
            config.carrier_frequency_hz, config.pulse_period_s, config.pulse_duty_percent
        );
        Ok(())
    }

    /// Frequency, amplitude, modulation and output state, for the startup log
    pub async fn status(&mut self) -> Result<String, ActuatorFault> {
        let frequency = self.query("FREQ?").await?;
        let amplitude = self.query("AMPR? VPP").await?;
        let modulation = self.query("MODL?").await?;
        let output = self.query("ENBR?").await?;
        Ok(format!(
            "frequency {frequency} Hz, amplitude {amplitude} Vpp, modulation {modulation}, output {output}"
        ))
    }
}

#[async_trait]
impl<P> SignalActuator for Sg386SignalGenerator<P>
where
    P: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn set_output_amplitude(&mut self, amplitude_vpp: f64) -> Result<(), ActuatorFault> {
        let command = format!("AMPR {amplitude_vpp:.6} VPP");
        if !amplitude_vpp.is_finite() || amplitude_vpp.abs() > self.max_amplitude_vpp {
            return Err(ActuatorFault::Rejected {
                command,
                reason: format!("outside the device range ±{} Vpp", self.max_amplitude_vpp),
            });
        }
        self.set(command).await
    }

    async fn set_output_enabled(&mut self, enabled: bool) -> Result<(), ActuatorFault> {
        self.set(format!("ENBR {}", u8::from(enabled))).await
    }

    fn get_max_amplitude(&self) -> f64 {
        self.max_amplitude_vpp
    }
}
