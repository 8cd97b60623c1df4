// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-thermal-stimulation project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Session recorder and export sinks
//!
//! The recorder owns the sample history of one session. It is append-only and
//! only ever read back as a whole through [`SessionRecorder::export`], which is
//! what the export sinks consume once the session is over.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local, TimeZone};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::OutputConfig;

/// CSV file name inside a session directory
pub const CSV_FILE_NAME: &str = "y.csv";
/// JSON file name inside a session directory
pub const JSON_FILE_NAME: &str = "samples.json";

/// One accepted control cycle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Seconds since the session started
    pub elapsed_time_s: f64,
    /// Accepted temperature reading in degrees Celsius
    pub temperature_celsius: f64,
    /// Amplitude sent to the signal generator in Vpp
    pub commanded_amplitude_vpp: f64,
}

/// Sample refused by the recorder
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecorderError {
    #[error("sample at {elapsed_time_s} s is not after the last recorded sample ({last_s} s)")]
    OutOfOrder { elapsed_time_s: f64, last_s: f64 },

    #[error("sample contains a non-finite value")]
    NonFinite,
}

/// Append-only, time-ordered sample history
#[derive(Debug, Clone, Default)]
pub struct SessionRecorder {
    samples: Vec<Sample>,
}

impl SessionRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a sample; elapsed time must be strictly increasing
    pub fn record(&mut self, sample: Sample) -> Result<(), RecorderError> {
        if !(sample.elapsed_time_s.is_finite()
            && sample.temperature_celsius.is_finite()
            && sample.commanded_amplitude_vpp.is_finite())
        {
            return Err(RecorderError::NonFinite);
        }
        if let Some(last) = self.samples.last() {
            if sample.elapsed_time_s <= last.elapsed_time_s {
                return Err(RecorderError::OutOfOrder {
                    elapsed_time_s: sample.elapsed_time_s,
                    last_s: last.elapsed_time_s,
                });
            }
        }
        self.samples.push(sample);
        Ok(())
    }

    /// Full history in insertion (= time) order
    pub fn export(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn last(&self) -> Option<&Sample> {
        self.samples.last()
    }
}

/// Destination of a finished session
pub trait SessionSink {
    fn write(&mut self, samples: &[Sample]) -> Result<()>;
}

/// Row layout of the CSV export
#[derive(Serialize)]
struct CsvRow {
    time: f64,
    temp: f64,
    volt: f64,
}

/// CSV export with `time,temp,volt` columns
pub struct CsvSessionSink<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> CsvSessionSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: csv::WriterBuilder::new()
                .has_headers(false)
                .from_writer(writer),
        }
    }

    /// Recover the underlying writer
    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| anyhow::anyhow!("Failed to flush CSV writer: {}", e.error()))
    }
}

impl CsvSessionSink<File> {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(path.as_ref())
            .with_context(|| format!("Failed to create CSV export at {:?}", path.as_ref()))?;
        Ok(Self::new(file))
    }
}

impl<W: Write> SessionSink for CsvSessionSink<W> {
    fn write(&mut self, samples: &[Sample]) -> Result<()> {
        // Header even for an empty session
        self.writer
            .write_record(["time", "temp", "volt"])
            .context("Failed to write CSV header")?;
        for sample in samples {
            self.writer
                .serialize(CsvRow {
                    time: sample.elapsed_time_s,
                    temp: sample.temperature_celsius,
                    volt: sample.commanded_amplitude_vpp,
                })
                .context("Failed to write CSV row")?;
        }
        self.writer.flush().context("Failed to flush CSV export")?;
        Ok(())
    }
}

/// Pretty-printed JSON array export
pub struct JsonSessionSink<W: Write> {
    writer: W,
}

impl<W: Write> JsonSessionSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl JsonSessionSink<File> {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(path.as_ref())
            .with_context(|| format!("Failed to create JSON export at {:?}", path.as_ref()))?;
        Ok(Self::new(file))
    }
}

impl<W: Write> SessionSink for JsonSessionSink<W> {
    fn write(&mut self, samples: &[Sample]) -> Result<()> {
        serde_json::to_writer_pretty(&mut self.writer, samples)
            .context("Failed to serialize samples to JSON")?;
        self.writer.flush().context("Failed to flush JSON export")?;
        Ok(())
    }
}

/// Write a finished session into `<directory>/<%Y%m%d_%H-%M-%S>/`
///
/// Every enabled sink is attempted; the first failure is returned after the
/// others ran. Returns the session directory.
pub fn export_session<Tz: TimeZone>(
    samples: &[Sample],
    output: &OutputConfig,
    started_at: &DateTime<Tz>,
) -> Result<PathBuf> {
    let stamp = started_at
        .with_timezone(&Local)
        .format("%Y%m%d_%H-%M-%S")
        .to_string();
    let session_dir = output.directory.join(stamp);
    fs::create_dir_all(&session_dir)
        .with_context(|| format!("Failed to create session directory {:?}", session_dir))?;

    let mut sinks: Vec<(PathBuf, Box<dyn SessionSink>)> = Vec::new();
    let mut first_error = None;
    if output.csv {
        let path = session_dir.join(CSV_FILE_NAME);
        match CsvSessionSink::create(&path) {
            Ok(sink) => sinks.push((path, Box::new(sink))),
            Err(e) => first_error = first_error.or(Some(e)),
        }
    }
    if output.json {
        let path = session_dir.join(JSON_FILE_NAME);
        match JsonSessionSink::create(&path) {
            Ok(sink) => sinks.push((path, Box::new(sink))),
            Err(e) => first_error = first_error.or(Some(e)),
        }
    }

    for (path, mut sink) in sinks {
        match sink.write(samples) {
            Ok(()) => info!("Wrote {} samples to {:?}", samples.len(), path),
            Err(e) => {
                warn!("Export to {:?} failed: {:#}", path, e);
                first_error = first_error.or(Some(e));
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(session_dir),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(t: f64, temperature: f64, amplitude: f64) -> Sample {
        Sample {
            elapsed_time_s: t,
            temperature_celsius: temperature,
            commanded_amplitude_vpp: amplitude,
        }
    }

    #[test]
    fn test_record_keeps_insertion_order() {
        let mut recorder = SessionRecorder::new();
        for i in 0..5 {
            recorder
                .record(sample(i as f64, 20.0 + i as f64, 0.1))
                .unwrap();
        }

        let history = recorder.export();
        assert_eq!(history.len(), 5);
        assert!(history
            .windows(2)
            .all(|pair| pair[0].elapsed_time_s < pair[1].elapsed_time_s));
        assert_eq!(history[3].temperature_celsius, 23.0);
    }

    #[test]
    fn test_record_refuses_out_of_order_samples() {
        let mut recorder = SessionRecorder::new();
        recorder.record(sample(2.0, 30.0, 0.2)).unwrap();

        assert!(matches!(
            recorder.record(sample(2.0, 31.0, 0.2)),
            Err(RecorderError::OutOfOrder { .. })
        ));
        assert!(matches!(
            recorder.record(sample(1.0, 31.0, 0.2)),
            Err(RecorderError::OutOfOrder { .. })
        ));
        assert_eq!(
            recorder.record(sample(3.0, f64::NAN, 0.2)),
            Err(RecorderError::NonFinite)
        );
        assert_eq!(recorder.len(), 1);
        assert_eq!(recorder.last(), Some(&sample(2.0, 30.0, 0.2)));
    }

    #[test]
    fn test_csv_sink_writes_time_temp_volt_columns() {
        let samples = [sample(0.0, 21.5, 0.5), sample(1.0, 22.25, 0.25)];
        let mut sink = CsvSessionSink::new(Vec::new());
        sink.write(&samples).unwrap();

        let text = String::from_utf8(sink.into_inner().unwrap()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, vec!["time,temp,volt", "0.0,21.5,0.5", "1.0,22.25,0.25"]);
    }

    #[test]
    fn test_json_sink_writes_all_samples() {
        let samples = [sample(0.0, 21.5, 0.5), sample(1.0, 22.25, 0.25)];
        let mut sink = JsonSessionSink::new(Vec::new());
        sink.write(&samples).unwrap();

        let parsed: Vec<Sample> = serde_json::from_slice(&sink.into_inner()).unwrap();
        assert_eq!(parsed, samples);
    }

    #[test]
    fn test_export_session_writes_timestamped_directory() {
        let dir = tempfile::tempdir().unwrap();
        let output = OutputConfig {
            directory: dir.path().to_path_buf(),
            csv: true,
            json: true,
        };
        let started_at = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        let samples = [sample(0.0, 25.0, 0.5), sample(1.0, 25.5, 0.5)];

        let session_dir = export_session(&samples, &output, &started_at).unwrap();

        assert_eq!(session_dir, dir.path().join("20240309_14-05-07"));
        let csv = fs::read_to_string(session_dir.join(CSV_FILE_NAME)).unwrap();
        assert_eq!(csv.lines().count(), 3);
        let json: Vec<Sample> =
            serde_json::from_str(&fs::read_to_string(session_dir.join(JSON_FILE_NAME)).unwrap())
                .unwrap();
        assert_eq!(json, samples);
    }

    #[test]
    fn test_export_empty_session_still_writes_header() {
        let dir = tempfile::tempdir().unwrap();
        let output = OutputConfig {
            directory: dir.path().to_path_buf(),
            csv: true,
            json: false,
        };

        let session_dir = export_session(&[], &output, &Local::now()).unwrap();
        let csv = fs::read_to_string(session_dir.join(CSV_FILE_NAME)).unwrap();
        assert_eq!(csv.trim_end(), "time,temp,volt");
        assert!(!session_dir.join(JSON_FILE_NAME).exists());
    }
}
