// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-thermal-stimulation project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Omega HH806 thermocouple thermometer driver
//!
//! The HH806 answers a fixed read request with a 15-byte binary frame holding
//! both channels:
//!
//! ```text
//! byte   0..4   header
//! byte   4      channel 1 sign (0x00 = no probe, 0x1f = negative)
//! bytes  5..7   channel 1 value, big-endian tenths of °C
//! byte   9      channel 2 sign
//! bytes 10..12  channel 2 value
//! ```
//!
//! Negative values are encoded relative to `0xffff`. The serial line (19200 baud,
//! 8 data bits, even parity, 1 stop bit) is configured outside this driver.
//!
//! A request abandoned on timeout can leave the tail of its frame in the link, so
//! pending input is discarded before every new request.

use async_trait::async_trait;
use futures::FutureExt;
use log::{debug, warn};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::thermal_regulation::error::SensorFault;
use crate::thermal_regulation::TemperatureSensor;

/// Length of a measurement frame
pub const FRAME_LENGTH: usize = 15;

/// First two header bytes: start marker and frame length
const FRAME_HEADER: [u8; 2] = [0x3e, FRAME_LENGTH as u8];

const SIGN_NO_PROBE: u8 = 0x00;
const SIGN_NEGATIVE: u8 = 0x1f;

/// Build a read request: `# LL ID CH N checksum CR LF`
///
/// The checksum is the byte sum of everything before it, modulo 256, written as
/// two uppercase hex digits.
pub fn read_request(device_id: u8, channel_code: u8) -> Vec<u8> {
    let body = format!("#0A{device_id:02X}{channel_code:02X}N");
    let checksum = body.bytes().fold(0u8, |sum, byte| sum.wrapping_add(byte));
    format!("{body}{checksum:02X}\r\n").into_bytes()
}

/// Extract one channel's temperature from a measurement frame
pub fn decode_channel(frame: &[u8], channel: u8) -> Result<f64, SensorFault> {
    if frame.len() < FRAME_LENGTH {
        return Err(SensorFault::MalformedFrame {
            reason: format!("expected {FRAME_LENGTH} bytes, got {}", frame.len()),
        });
    }

    if frame[..2] != FRAME_HEADER {
        return Err(SensorFault::MalformedFrame {
            reason: format!("unexpected header {:02x?}", &frame[..4]),
        });
    }

    let sign_index = match channel {
        1 => 4,
        2 => 9,
        other => {
            return Err(SensorFault::MalformedFrame {
                reason: format!("channel {other} does not exist"),
            })
        }
    };

    let sign = frame[sign_index];
    let raw = u16::from_be_bytes([frame[sign_index + 1], frame[sign_index + 2]]);

    match sign {
        SIGN_NO_PROBE => Err(SensorFault::NoProbe { channel }),
        SIGN_NEGATIVE => Ok(-f64::from(u16::MAX - raw) / 10.0),
        _ => Ok(f64::from(raw) / 10.0),
    }
}

/// HH806 thermometer on a byte stream
pub struct Hh806Thermometer<P> {
    port: P,
    channel: u8,
    request: Vec<u8>,
}

impl<P> Hh806Thermometer<P>
where
    P: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Read `channel` (1 or 2) through `port`
    pub fn new(port: P, channel: u8) -> Self {
        Self {
            port,
            channel,
            request: read_request(0, 0),
        }
    }

    /// Drop whatever the instrument already sent, without waiting for more
    fn discard_pending_input(&mut self) -> Result<usize, SensorFault> {
        let mut scratch = [0u8; 64];
        let mut discarded = 0;
        while let Some(read) = self.port.read(&mut scratch).now_or_never() {
            match read? {
                0 => break,
                n => discarded += n,
            }
        }
        Ok(discarded)
    }

    /// Send a read request and return the raw measurement frame
    pub async fn read_frame(&mut self) -> Result<[u8; FRAME_LENGTH], SensorFault> {
        let stale = self.discard_pending_input()?;
        if stale > 0 {
            warn!("HH806: discarded {} stale bytes before the request", stale);
        }

        self.port.write_all(&self.request).await?;
        self.port.flush().await?;

        let mut frame = [0u8; FRAME_LENGTH];
        self.port.read_exact(&mut frame).await?;
        Ok(frame)
    }

    /// Read both channels; a missing probe reads as `None`
    pub async fn read_both(&mut self) -> Result<(Option<f64>, Option<f64>), SensorFault> {
        let frame = self.read_frame().await?;
        let channel = |index| match decode_channel(&frame, index) {
            Ok(value) => Ok(Some(value)),
            Err(SensorFault::NoProbe { .. }) => Ok(None),
            Err(e) => Err(e),
        };
        Ok((channel(1)?, channel(2)?))
    }

    pub fn into_inner(self) -> P {
        self.port
    }
}

#[async_trait]
impl<P> TemperatureSensor for Hh806Thermometer<P>
where
    P: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn read_temperature(&mut self) -> Result<f64, SensorFault> {
        let frame = self.read_frame().await?;
        let temperature = decode_channel(&frame, self.channel)?;
        debug!("HH806 channel {}: {:.1} °C", self.channel, temperature);
        Ok(temperature)
    }
}
