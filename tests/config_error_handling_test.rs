// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-thermal-stimulation project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

use anyhow::Result;
use rust_thermal_stimulation::config::Config;
use std::fs;
use std::sync::Once;
use tempfile::tempdir;

static INIT: Once = Once::new();

// Setup logger for tests
fn setup() {
    INIT.call_once(|| {
        env_logger::builder()
            .filter_level(log::LevelFilter::Debug)
            .is_test(true)
            .init();
    });
}

#[test]
fn test_schema_error_creates_sample_file() -> Result<()> {
    setup();
    let temp_dir = tempdir()?;
    let config_path = temp_dir.path().join("config.yaml");

    let invalid_yaml = r#"
stimulation:
  setpoint_celsius: "warm"   # Number field with string value
  duration_s: []             # Array instead of number
"#;
    fs::write(&config_path, invalid_yaml)?;

    let result = Config::from_file(&config_path);
    assert!(result.is_err(), "Config loading should have failed");

    let sample_path = config_path.with_extension("sample.yaml");
    assert!(sample_path.exists(), "Sample config file was not created");

    let sample_config = Config::from_file(&sample_path)?;
    assert_eq!(sample_config.stimulation.setpoint_celsius, 37.0);

    Ok(())
}

#[test]
fn test_unknown_driver_is_rejected() -> Result<()> {
    setup();
    let temp_dir = tempdir()?;
    let config_path = temp_dir.path().join("config.yaml");

    fs::write(
        &config_path,
        "instruments:\n  thermometer:\n    driver: thermistor\n",
    )?;

    assert!(Config::from_file(&config_path).is_err());
    assert!(config_path.with_extension("sample.yaml").exists());
    Ok(())
}

#[test]
fn test_semantic_error_creates_sample_file() -> Result<()> {
    setup();
    let temp_dir = tempdir()?;
    let config_path = temp_dir.path().join("config.yaml");

    // Well-typed, but the output bounds are inverted
    let invalid_config = r#"
stimulation:
  pid_parameters:
    output_min: 0.4
    output_max: 0.1
"#;
    fs::write(&config_path, invalid_config)?;

    let error = Config::from_file(&config_path).unwrap_err();
    assert!(format!("{error:#}").contains("output bounds are inverted"));
    assert!(config_path.with_extension("sample.yaml").exists());

    Ok(())
}

#[test]
fn test_thermometer_channel_out_of_range() -> Result<()> {
    setup();
    let temp_dir = tempdir()?;
    let config_path = temp_dir.path().join("config.yaml");

    fs::write(&config_path, "instruments:\n  thermometer:\n    channel: 3\n")?;

    let error = Config::from_file(&config_path).unwrap_err();
    assert!(error.to_string().contains("thermometer channel"));
    Ok(())
}
