// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-thermal-stimulation project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Thermal stimulation control loop
//!
//! The loop owns the thermometer and the signal generator for the whole session and
//! drives them through `IDLE → ARMED → RUNNING → STOPPED` (or `RUNNING → FAULTED →
//! STOPPED`). Each tick reads the temperature, screens it through the safety clamp,
//! evaluates the PID controller, clamps the amplitude again and commands the
//! generator. Sensor faults skip the tick; actuator faults end the session.
//!
//! Ticks are driven by a single sequential `tokio::time::interval`; a stop request
//! is polled once per tick boundary.

use std::fmt;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::config::stimulation::{check_reachable_bounds, StimulationConfig};
use crate::thermal_regulation::error::{ActuatorFault, SensorFault, SessionError};
use crate::thermal_regulation::pid::PidController;
use crate::thermal_regulation::recorder::{Sample, SessionRecorder};
use crate::thermal_regulation::safety::{SafetyClamp, TemperatureVerdict};
use crate::thermal_regulation::{BoxedActuator, BoxedSensor};

/// Lifecycle of the control loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Armed,
    Running,
    Faulted,
    Stopped,
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoopState::Idle => "idle",
            LoopState::Armed => "armed",
            LoopState::Running => "running",
            LoopState::Faulted => "faulted",
            LoopState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Why a session ended
#[derive(Debug, Clone, PartialEq)]
pub enum TerminationReason {
    DurationElapsed,
    ExplicitStop,
    ConsecutiveSensorFaults(u32),
    ActuatorFault(String),
}

impl TerminationReason {
    /// True for the reasons that pass through the FAULTED state
    pub fn is_fault(&self) -> bool {
        matches!(
            self,
            TerminationReason::ConsecutiveSensorFaults(_) | TerminationReason::ActuatorFault(_)
        )
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationReason::DurationElapsed => write!(f, "stimulation duration elapsed"),
            TerminationReason::ExplicitStop => write!(f, "stop requested"),
            TerminationReason::ConsecutiveSensorFaults(count) => {
                write!(f, "{count} consecutive sensor faults")
            }
            TerminationReason::ActuatorFault(detail) => write!(f, "actuator fault: {detail}"),
        }
    }
}

/// Cooperative stop signal, polled at each tick boundary
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    requested: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the loop to stop at its next tick
    pub fn request_stop(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    fn clear(&self) {
        self.requested.store(false, Ordering::SeqCst);
    }
}

/// Outcome of a finished session
#[derive(Debug, Clone)]
pub struct SessionReport {
    /// Termination reason
    pub reason: TerminationReason,
    /// Every accepted cycle of the session
    pub recorder: SessionRecorder,
    /// Ticks that produced a sample
    pub accepted_ticks: u64,
    /// Ticks skipped on a sensor fault or a rejected reading
    pub skipped_ticks: u64,
    /// Wall-clock start of the RUNNING state
    pub started_at: DateTime<Utc>,
    /// Failure of the final output-disable command, if any
    pub shutdown_error: Option<ActuatorFault>,
}

impl SessionReport {
    pub fn samples(&self) -> &[Sample] {
        self.recorder.export()
    }

    /// One-line description for logs and error messages
    pub fn summary(&self) -> String {
        let mut summary = format!(
            "{} after {} accepted and {} skipped ticks",
            self.reason, self.accepted_ticks, self.skipped_ticks
        );
        if let Some(shutdown_error) = &self.shutdown_error {
            summary.push_str(&format!("; output disable failed: {shutdown_error}"));
        }
        summary
    }
}

/// Validated session parameters produced by `arm`
struct ArmedSession {
    config: StimulationConfig,
    pid: PidController,
    clamp: SafetyClamp,
    safe_amplitude: f64,
}

/// Fixed-cadence closed-loop controller of the stimulation amplitude
pub struct ThermalControlLoop {
    sensor: BoxedSensor,
    actuator: BoxedActuator,
    state: LoopState,
    state_history: Vec<LoopState>,
    session: Option<ArmedSession>,
    stop: StopHandle,
}

impl ThermalControlLoop {
    /// Take exclusive ownership of the instruments for the loop's lifetime
    pub fn new(sensor: BoxedSensor, actuator: BoxedActuator) -> Self {
        Self {
            sensor,
            actuator,
            state: LoopState::Idle,
            state_history: vec![LoopState::Idle],
            session: None,
            stop: StopHandle::new(),
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Every state the loop went through, oldest first
    pub fn state_history(&self) -> &[LoopState] {
        &self.state_history
    }

    /// Handle used to stop a running session from elsewhere
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Release the instruments
    pub fn into_instruments(self) -> (BoxedSensor, BoxedActuator) {
        (self.sensor, self.actuator)
    }

    fn transition(&mut self, next: LoopState) {
        debug!("Control loop {} -> {}", self.state, next);
        self.state = next;
        self.state_history.push(next);
    }

    /// Validate the configuration and park the actuator at its safe minimum
    ///
    /// The output is not enabled here; that happens when the session starts.
    pub async fn arm(&mut self, config: StimulationConfig) -> Result<(), SessionError> {
        if !matches!(self.state, LoopState::Idle | LoopState::Stopped) {
            return Err(SessionError::InvalidState {
                action: "arm",
                state: self.state,
            });
        }

        config.validate()?;

        let device_max_amplitude = self.actuator.get_max_amplitude();
        let clamp = SafetyClamp::new(&config.safety_limits).with_device_ceiling(device_max_amplitude);
        check_reachable_bounds(&config.pid_parameters, clamp.max_amplitude())?;

        let pid = PidController::new(&config.pid_parameters, config.setpoint_celsius)?;
        let safe_amplitude = clamp.clamp_amplitude(pid.safe_minimum());

        self.command_amplitude(safe_amplitude, config.io_timeout())
            .await?;

        info!(
            "Control loop armed: setpoint {:.2} °C, duration {:.1} s, period {:.3} s, \
             gains Kp={} Ki={} Kd={}, amplitude ceiling {} Vpp",
            config.setpoint_celsius,
            config.duration_s,
            config.tick_period_s,
            config.pid_parameters.kp,
            config.pid_parameters.ki,
            config.pid_parameters.kd,
            clamp.max_amplitude()
        );

        self.stop.clear();
        self.session = Some(ArmedSession {
            config,
            pid,
            clamp,
            safe_amplitude,
        });
        self.transition(LoopState::Armed);
        Ok(())
    }

    /// Start the armed session and run it to completion
    ///
    /// Returns the report when the session ends on its duration or on a stop
    /// request and the output was disabled. Faulted sessions and failed disables
    /// are returned as [`SessionError::Aborted`] carrying the same report.
    pub async fn run(&mut self) -> Result<SessionReport, SessionError> {
        if self.state != LoopState::Armed {
            return Err(SessionError::InvalidState {
                action: "start",
                state: self.state,
            });
        }
        let Some(mut session) = self.session.take() else {
            return Err(SessionError::InvalidState {
                action: "start",
                state: self.state,
            });
        };

        let io_timeout = session.config.io_timeout();
        let mut recorder = SessionRecorder::new();
        let mut accepted_ticks = 0u64;
        let mut skipped_ticks = 0u64;
        let started_at = Utc::now();

        session.pid.reset();
        self.transition(LoopState::Running);
        info!("Stimulation started at {}", started_at.to_rfc3339());

        let mut reason = match self.command_enabled(true, io_timeout).await {
            Err(fault) => {
                TerminationReason::ActuatorFault(format!("failed to enable output: {fault}"))
            }
            Ok(()) => {
                self.tick_loop(
                    &mut session,
                    &mut recorder,
                    &mut accepted_ticks,
                    &mut skipped_ticks,
                )
                .await
            }
        };

        if reason.is_fault() {
            error!("Control loop faulted: {}", reason);
            self.transition(LoopState::Faulted);
        }

        let shutdown_error = self.shutdown(session.safe_amplitude, io_timeout).await;
        if let (TerminationReason::ActuatorFault(detail), Some(shutdown_error)) =
            (&mut reason, &shutdown_error)
        {
            detail.push_str(&format!("; shutdown failed: {shutdown_error}"));
        }
        self.transition(LoopState::Stopped);

        let report = SessionReport {
            reason,
            recorder,
            accepted_ticks,
            skipped_ticks,
            started_at,
            shutdown_error,
        };
        info!("Stimulation stopped: {}", report.summary());

        if report.reason.is_fault() || report.shutdown_error.is_some() {
            Err(SessionError::Aborted(Box::new(report)))
        } else {
            Ok(report)
        }
    }

    /// Sense, compute, actuate and record until a termination condition is met
    async fn tick_loop(
        &mut self,
        session: &mut ArmedSession,
        recorder: &mut SessionRecorder,
        accepted_ticks: &mut u64,
        skipped_ticks: &mut u64,
    ) -> TerminationReason {
        let period = session.config.tick_period();
        let duration = session.config.duration();
        let io_timeout = session.config.io_timeout();
        let threshold = session.config.fault_policy.consecutive_sensor_fault_threshold;

        let t0 = Instant::now();
        let mut interval = time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut last_evaluation: Option<Instant> = None;
        let mut consecutive_faults = 0u32;

        loop {
            interval.tick().await;

            if self.stop.is_stop_requested() {
                return TerminationReason::ExplicitStop;
            }
            let now = Instant::now();
            let elapsed = now.duration_since(t0);
            if elapsed >= duration {
                return TerminationReason::DurationElapsed;
            }

            let skip_cause = match self.read_sensor(io_timeout).await {
                Err(fault) => Some(fault.to_string()),
                Ok(reading) => match session.clamp.validate_temperature(reading) {
                    TemperatureVerdict::Reject(reason) => Some(format!("reading rejected: {reason}")),
                    TemperatureVerdict::Accept(temperature) => {
                        consecutive_faults = 0;

                        // Skipped ticks stretch dt instead of shortening it
                        let dt = last_evaluation
                            .map(|last| now.duration_since(last))
                            .unwrap_or(period)
                            .as_secs_f64();
                        let output = session.pid.evaluate_detailed(temperature, dt);
                        let amplitude = session.clamp.clamp_amplitude(output.control_output);

                        if let Err(fault) = self.command_amplitude(amplitude, io_timeout).await {
                            return TerminationReason::ActuatorFault(fault.to_string());
                        }
                        last_evaluation = Some(now);

                        let sample = Sample {
                            elapsed_time_s: elapsed.as_secs_f64(),
                            temperature_celsius: temperature,
                            commanded_amplitude_vpp: amplitude,
                        };
                        match recorder.record(sample) {
                            Ok(()) => *accepted_ticks += 1,
                            Err(e) => error!("Sample at {:.1}s refused: {}", sample.elapsed_time_s, e),
                        }

                        debug!(
                            "t={:.1}s T={:.2}°C u={:.5}Vpp (P={:.4} I={:.4} D={:.4}, dt={:.3}s{})",
                            sample.elapsed_time_s,
                            temperature,
                            amplitude,
                            output.components.proportional,
                            output.components.integral,
                            output.components.derivative,
                            dt,
                            if output.saturated { ", saturated" } else { "" }
                        );
                        None
                    }
                },
            };

            if let Some(cause) = skip_cause {
                consecutive_faults += 1;
                *skipped_ticks += 1;
                warn!(
                    "Skipping tick at {:.1}s ({} consecutive): {}",
                    elapsed.as_secs_f64(),
                    consecutive_faults,
                    cause
                );
                if consecutive_faults > threshold {
                    return TerminationReason::ConsecutiveSensorFaults(consecutive_faults);
                }
            }
        }
    }

    /// Disable the output, then park the amplitude at its safe minimum
    ///
    /// Both commands are attempted whatever happens; the disable failure is returned.
    async fn shutdown(&mut self, safe_amplitude: f64, io_timeout: Duration) -> Option<ActuatorFault> {
        let disable_error = match self.command_enabled(false, io_timeout).await {
            Ok(()) => None,
            Err(fault) => {
                error!("Failed to disable stimulation output: {}", fault);
                Some(fault)
            }
        };

        if let Err(fault) = self.command_amplitude(safe_amplitude, io_timeout).await {
            warn!(
                "Failed to park amplitude at {} Vpp after stop: {}",
                safe_amplitude, fault
            );
        }

        disable_error
    }

    async fn read_sensor(&mut self, io_timeout: Duration) -> Result<f64, SensorFault> {
        match time::timeout(io_timeout, self.sensor.read_temperature()).await {
            Ok(result) => result,
            Err(_) => Err(SensorFault::Timeout {
                timeout_ms: io_timeout.as_millis() as u64,
            }),
        }
    }

    async fn command_amplitude(
        &mut self,
        amplitude_vpp: f64,
        io_timeout: Duration,
    ) -> Result<(), ActuatorFault> {
        match time::timeout(io_timeout, self.actuator.set_output_amplitude(amplitude_vpp)).await {
            Ok(result) => result,
            Err(_) => Err(ActuatorFault::Timeout {
                timeout_ms: io_timeout.as_millis() as u64,
            }),
        }
    }

    async fn command_enabled(
        &mut self,
        enabled: bool,
        io_timeout: Duration,
    ) -> Result<(), ActuatorFault> {
        match time::timeout(io_timeout, self.actuator.set_output_enabled(enabled)).await {
            Ok(result) => result,
            Err(_) => Err(ActuatorFault::Timeout {
                timeout_ms: io_timeout.as_millis() as u64,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::stimulation::PidParameters;
    use crate::thermal_regulation::{MockSignalActuator, MockTemperatureSensor};
    use approx::assert_relative_eq;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Actuator mock that records every command it receives
    fn recording_actuator(
        max_amplitude: f64,
    ) -> (MockSignalActuator, Arc<Mutex<Vec<f64>>>, Arc<Mutex<Vec<bool>>>) {
        let amplitudes = Arc::new(Mutex::new(Vec::new()));
        let enables = Arc::new(Mutex::new(Vec::new()));

        let mut actuator = MockSignalActuator::new();
        actuator
            .expect_get_max_amplitude()
            .return_const(max_amplitude);
        let log = amplitudes.clone();
        actuator
            .expect_set_output_amplitude()
            .returning(move |amplitude| {
                log.lock().unwrap().push(amplitude);
                Ok(())
            });
        let log = enables.clone();
        actuator
            .expect_set_output_enabled()
            .returning(move |enabled| {
                log.lock().unwrap().push(enabled);
                Ok(())
            });

        (actuator, amplitudes, enables)
    }

    fn scripted_sensor(readings: Vec<Result<f64, SensorFault>>, fallback: f64) -> MockTemperatureSensor {
        let mut queue = VecDeque::from(readings);
        let mut sensor = MockTemperatureSensor::new();
        sensor
            .expect_read_temperature()
            .returning(move || queue.pop_front().unwrap_or(Ok(fallback)));
        sensor
    }

    fn config(duration_s: f64) -> StimulationConfig {
        StimulationConfig {
            duration_s,
            ..StimulationConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_consecutive_sensor_faults_fault_the_loop() {
        let mut sensor = MockTemperatureSensor::new();
        sensor
            .expect_read_temperature()
            .times(6)
            .returning(|| Err(SensorFault::Simulated));
        let (actuator, amplitudes, enables) = recording_actuator(1.0);

        let mut control_loop = ThermalControlLoop::new(Box::new(sensor), Box::new(actuator));
        control_loop.arm(config(60.0)).await.unwrap();

        let error = control_loop.run().await.unwrap_err();
        let report = error.report().unwrap();

        assert_eq!(report.reason, TerminationReason::ConsecutiveSensorFaults(6));
        assert!(report.samples().is_empty());
        assert_eq!(report.skipped_ticks, 6);
        assert_eq!(
            enables.lock().unwrap().iter().filter(|enabled| !**enabled).count(),
            1
        );
        assert_eq!(*enables.lock().unwrap(), vec![true, false]);
        // Parked at the safe minimum when armed and again after the fault
        assert_eq!(*amplitudes.lock().unwrap(), vec![0.00001, 0.00001]);
        assert_eq!(
            control_loop.state_history(),
            &[
                LoopState::Idle,
                LoopState::Armed,
                LoopState::Running,
                LoopState::Faulted,
                LoopState::Stopped
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_duration_bounds_the_number_of_samples() {
        let sensor = scripted_sensor(vec![], 30.0);
        let (actuator, _amplitudes, enables) = recording_actuator(1.0);

        let mut control_loop = ThermalControlLoop::new(Box::new(sensor), Box::new(actuator));
        control_loop.arm(config(10.0)).await.unwrap();
        let report = control_loop.run().await.unwrap();

        assert_eq!(report.reason, TerminationReason::DurationElapsed);
        let samples = report.samples();
        assert!((9..=11).contains(&samples.len()), "got {} samples", samples.len());
        assert!(samples
            .windows(2)
            .all(|pair| pair[0].elapsed_time_s < pair[1].elapsed_time_s));
        assert_eq!(*enables.lock().unwrap(), vec![true, false]);
        assert_eq!(control_loop.state(), LoopState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_skipped_ticks_stretch_dt_and_record_nothing() {
        // Pure integral controller: output = sum(ki * error * dt)
        let mut stimulation = config(5.0);
        stimulation.setpoint_celsius = 40.0;
        stimulation.pid_parameters = PidParameters {
            kp: 0.0,
            ki: 0.1,
            kd: 0.0,
            output_min: 0.0,
            output_max: 10.0,
            allow_negative_gains: false,
        };
        stimulation.safety_limits.max_amplitude_vpp = 10.0;

        let sensor = scripted_sensor(
            vec![
                Ok(39.0),
                Err(SensorFault::Simulated),
                Ok(f64::NAN),
                Ok(39.0),
            ],
            39.0,
        );
        let (actuator, amplitudes, _enables) = recording_actuator(10.0);

        let mut control_loop = ThermalControlLoop::new(Box::new(sensor), Box::new(actuator));
        control_loop.arm(stimulation).await.unwrap();
        let report = control_loop.run().await.unwrap();

        let samples = report.samples();
        assert_eq!(report.skipped_ticks, 2);
        assert_eq!(samples.len(), 3);
        assert_eq!(samples[0].elapsed_time_s, 0.0);
        assert_eq!(samples[1].elapsed_time_s, 3.0);
        assert_eq!(samples[2].elapsed_time_s, 4.0);

        // First evaluation uses the nominal period, the second the 3 s gap
        assert_relative_eq!(samples[0].commanded_amplitude_vpp, 0.1, epsilon = 1e-12);
        assert_relative_eq!(samples[1].commanded_amplitude_vpp, 0.4, epsilon = 1e-12);
        assert_relative_eq!(samples[2].commanded_amplitude_vpp, 0.5, epsilon = 1e-12);

        let amplitudes = amplitudes.lock().unwrap();
        assert_eq!(amplitudes.len(), 5); // arm + 3 ticks + park
    }

    #[tokio::test(start_paused = true)]
    async fn test_recorded_amplitudes_respect_bounds_and_device_ceiling() {
        let sensor = scripted_sensor(vec![Ok(20.0), Ok(25.0), Ok(45.0), Ok(49.0)], 36.0);
        // Device weaker than the configured ceiling
        let (actuator, _amplitudes, _enables) = recording_actuator(0.3);

        let mut control_loop = ThermalControlLoop::new(Box::new(sensor), Box::new(actuator));
        control_loop.arm(config(8.0)).await.unwrap();
        let report = control_loop.run().await.unwrap();

        for sample in report.samples() {
            assert!(sample.commanded_amplitude_vpp <= 0.3);
            assert!(sample.commanded_amplitude_vpp >= 0.00001);
        }
        assert_eq!(report.samples()[0].commanded_amplitude_vpp, 0.3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_actuator_fault_ends_session_with_shutdown_attempt() {
        let sensor = scripted_sensor(vec![], 30.0);

        let enables = Arc::new(Mutex::new(Vec::new()));
        let mut actuator = MockSignalActuator::new();
        actuator.expect_get_max_amplitude().return_const(1.0);
        let mut calls = 0;
        actuator
            .expect_set_output_amplitude()
            .returning(move |_| {
                calls += 1;
                // arm, tick 0 and tick 1 succeed, then the link dies
                if calls <= 3 {
                    Ok(())
                } else {
                    Err(ActuatorFault::Io {
                        message: "broken pipe".to_string(),
                    })
                }
            });
        let log = enables.clone();
        actuator
            .expect_set_output_enabled()
            .returning(move |enabled| {
                log.lock().unwrap().push(enabled);
                if enabled {
                    Ok(())
                } else {
                    Err(ActuatorFault::Simulated)
                }
            });

        let mut control_loop = ThermalControlLoop::new(Box::new(sensor), Box::new(actuator));
        control_loop.arm(config(60.0)).await.unwrap();
        let error = control_loop.run().await.unwrap_err();
        let report = error.into_report().unwrap();

        match &report.reason {
            TerminationReason::ActuatorFault(detail) => {
                assert!(detail.contains("broken pipe"));
                assert!(detail.contains("shutdown failed"));
            }
            other => panic!("unexpected reason {other:?}"),
        }
        assert_eq!(report.samples().len(), 2);
        assert_eq!(report.shutdown_error, Some(ActuatorFault::Simulated));
        assert_eq!(*enables.lock().unwrap(), vec![true, false]);
        assert!(control_loop.state_history().contains(&LoopState::Faulted));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_disable_surfaces_after_normal_stop() {
        let sensor = scripted_sensor(vec![], 30.0);
        let mut actuator = MockSignalActuator::new();
        actuator.expect_get_max_amplitude().return_const(1.0);
        actuator.expect_set_output_amplitude().returning(|_| Ok(()));
        actuator
            .expect_set_output_enabled()
            .returning(|enabled| {
                if enabled {
                    Ok(())
                } else {
                    Err(ActuatorFault::Timeout { timeout_ms: 1000 })
                }
            });

        let mut control_loop = ThermalControlLoop::new(Box::new(sensor), Box::new(actuator));
        control_loop.arm(config(3.0)).await.unwrap();
        let error = control_loop.run().await.unwrap_err();
        let report = error.report().unwrap();

        assert_eq!(report.reason, TerminationReason::DurationElapsed);
        assert_eq!(
            report.shutdown_error,
            Some(ActuatorFault::Timeout { timeout_ms: 1000 })
        );
        assert_eq!(report.samples().len(), 3);
        assert!(!control_loop.state_history().contains(&LoopState::Faulted));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_request_is_honoured_at_next_tick() {
        let (actuator, _amplitudes, enables) = recording_actuator(1.0);
        let mut sensor = MockTemperatureSensor::new();

        let mut control_loop = {
            let mut reads = 0;
            let stop_slot: Arc<Mutex<Option<StopHandle>>> = Arc::new(Mutex::new(None));
            let slot = stop_slot.clone();
            sensor.expect_read_temperature().returning(move || {
                reads += 1;
                if reads == 3 {
                    if let Some(stop) = slot.lock().unwrap().as_ref() {
                        stop.request_stop();
                    }
                }
                Ok(30.0)
            });
            let control_loop = ThermalControlLoop::new(Box::new(sensor), Box::new(actuator));
            *stop_slot.lock().unwrap() = Some(control_loop.stop_handle());
            control_loop
        };

        control_loop.arm(config(60.0)).await.unwrap();
        let report = control_loop.run().await.unwrap();

        assert_eq!(report.reason, TerminationReason::ExplicitStop);
        assert_eq!(report.samples().len(), 3);
        assert_eq!(*enables.lock().unwrap(), vec![true, false]);
    }

    #[tokio::test]
    async fn test_invalid_configuration_is_rejected_before_running() {
        let sensor = MockTemperatureSensor::new();
        let mut actuator = MockSignalActuator::new();
        actuator.expect_get_max_amplitude().return_const(1.0);

        let mut control_loop = ThermalControlLoop::new(Box::new(sensor), Box::new(actuator));

        let mut bad = config(10.0);
        bad.pid_parameters.output_min = 1.0;
        bad.pid_parameters.output_max = 0.5;
        assert!(matches!(
            control_loop.arm(bad).await,
            Err(SessionError::Configuration(_))
        ));
        assert_eq!(control_loop.state(), LoopState::Idle);

        assert!(matches!(
            control_loop.run().await,
            Err(SessionError::InvalidState {
                action: "start",
                state: LoopState::Idle
            })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_can_be_rearmed_after_stop() {
        let sensor = scripted_sensor(vec![], 30.0);
        let (actuator, _amplitudes, enables) = recording_actuator(1.0);

        let mut control_loop = ThermalControlLoop::new(Box::new(sensor), Box::new(actuator));
        control_loop.arm(config(2.0)).await.unwrap();
        let first = control_loop.run().await.unwrap();

        control_loop.arm(config(3.0)).await.unwrap();
        let second = control_loop.run().await.unwrap();

        assert_eq!(first.samples().len(), 2);
        assert_eq!(second.samples().len(), 3);
        assert_eq!(second.samples()[0].elapsed_time_s, 0.0);
        assert_eq!(*enables.lock().unwrap(), vec![true, false, true, false]);
    }
}
