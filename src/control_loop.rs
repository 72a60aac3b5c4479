//! The cooperative control loop.
//!
//! One call to [`ControlLoop::tick`] does, in order:
//!
//! 1. poll the sensor once
//! 2. take one configuration snapshot
//! 3. advance a pending or active calibration (actuator parked), or
//! 4. if running with a fresh reading: reset on the idle→running edge, step the
//!    controller, drive the actuator and record an observation, else
//! 5. park the actuator at the armed minimum.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::actuator::{ActuatorMapper, DriveChannel, DutyOutput, DutyPair};
use crate::calibration::{CalibrationProgress, CalibrationSide, Calibrator};
use crate::context::{ControlConfig, LoopStatus, RigContext};
use crate::error::RigResult;
use crate::sensor::{BootClock, OrientationSensor, SensorFeed};
use crate::strategy::StrategyController;
use crate::telemetry::Observation;

/// Why the actuator was parked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParkReason {
    Stopped,
    SensorStale,
}

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    /// The controller drove the actuator.
    Active {
        observation: Observation,
        duties: DutyPair,
        recorded: bool,
    },
    /// The actuator was held at the armed minimum.
    Parked { reason: ParkReason, duties: DutyPair },
    /// A calibration run is collecting samples.
    Calibrating {
        side: CalibrationSide,
        samples_collected: u16,
        duties: DutyPair,
    },
    /// A calibration run finished on this tick.
    Calibrated {
        side: CalibrationSide,
        average: f32,
        duties: DutyPair,
    },
}

pub struct ControlLoop<S, A> {
    ctx: Arc<RigContext>,
    feed: SensorFeed<S>,
    actuator: A,
    mapper: ActuatorMapper,
    controller: StrategyController,
    calibrator: Calibrator,
    was_running: bool,
    seen_revision: u64,
}

impl<S, A> ControlLoop<S, A>
where
    S: OrientationSensor,
    A: DutyOutput,
{
    pub fn new(ctx: Arc<RigContext>, sensor: S, actuator: A, mapper: ActuatorMapper) -> Self {
        Self::with_calibrator(ctx, sensor, actuator, mapper, Calibrator::default())
    }

    pub fn with_calibrator(
        ctx: Arc<RigContext>,
        sensor: S,
        actuator: A,
        mapper: ActuatorMapper,
        calibrator: Calibrator,
    ) -> Self {
        Self {
            ctx,
            feed: SensorFeed::new(sensor),
            actuator,
            mapper,
            controller: StrategyController::new(),
            calibrator,
            was_running: false,
            seen_revision: 0,
        }
    }

    pub fn actuator(&self) -> &A {
        &self.actuator
    }

    pub fn actuator_mut(&mut self) -> &mut A {
        &mut self.actuator
    }

    pub fn sensor_mut(&mut self) -> &mut S {
        self.feed.sensor_mut()
    }

    /// Hold both channels at the armed minimum for `delay` so the ESCs arm.
    pub fn arm(&mut self, delay: Duration) -> RigResult<()> {
        self.park()?;
        info!(delay_ms = delay.as_millis() as u64, "arming ESCs");
        thread::sleep(delay);
        Ok(())
    }

    /// Tick until `shutdown` is set, pausing `period` between ticks.
    ///
    /// The actuator is parked before returning, also when a tick fails.
    pub fn run(&mut self, clock: &BootClock, period: Duration, shutdown: &AtomicBool) -> RigResult<()> {
        info!(period_us = period.as_micros() as u64, "control loop started");
        let result = loop {
            if shutdown.load(Ordering::Relaxed) {
                break Ok(());
            }
            if let Err(e) = self.tick(clock.micros()) {
                break Err(e);
            }
            if !period.is_zero() {
                thread::sleep(period);
            }
        };

        let parked = self.park();
        info!("control loop stopped");
        result.and(parked.map(|_| ()))
    }

    /// Run one tick at `now_micros` (microseconds since boot).
    pub fn tick(&mut self, now_micros: u64) -> RigResult<TickOutcome> {
        self.feed.poll(now_micros);
        let config = self.ctx.snapshot();
        if config.revision != self.seen_revision {
            debug!(revision = config.revision, ?config, "configuration changed");
            self.seen_revision = config.revision;
        }

        let outcome = match self.advance_calibration(now_micros)? {
            Some(outcome) => outcome,
            None if config.running && self.feed.is_fresh(now_micros) => {
                self.control(&config, now_micros)?
            }
            None => {
                let reason = if config.running {
                    ParkReason::SensorStale
                } else {
                    ParkReason::Stopped
                };
                let duties = self.park()?;
                self.end_session(reason);
                TickOutcome::Parked { reason, duties }
            }
        };

        self.ctx.publish_status(LoopStatus {
            last_sensor_update_micros: self.feed.last_update_micros(),
            calibrating: self.calibrator.active_side(),
            active: self.was_running,
        });
        Ok(outcome)
    }

    fn control(&mut self, config: &ControlConfig, now_micros: u64) -> RigResult<TickOutcome> {
        if !self.was_running {
            self.ctx.clear_telemetry();
            self.controller.reset(now_micros);
            self.was_running = true;
            info!(strategy = %config.strategy, "run session started");
        }

        let measurement = self.feed.angle();
        let step = self.controller.step(
            config.strategy,
            &config.gains,
            config.calibration.middle,
            measurement,
            now_micros,
        );
        let duties = self.apply(step.output)?;

        let observation = Observation {
            timestamp_micros: now_micros,
            measured_value: measurement,
            sensor_selector: config.sensor_selector,
            error: step.error,
            control_output: step.output,
            strategy: config.strategy,
        };
        let recorded = self.ctx.record_observation(observation);

        Ok(TickOutcome::Active {
            observation,
            duties,
            recorded,
        })
    }

    fn advance_calibration(&mut self, now_micros: u64) -> RigResult<Option<TickOutcome>> {
        if !self.calibrator.is_active() {
            let Some(side) = self.ctx.take_calibration_request() else {
                return Ok(None);
            };
            self.park()?;
            self.end_session(ParkReason::Stopped);
            self.calibrator.begin(side, now_micros);
            info!(%side, "calibration started");
        }

        let duties = self.park()?;
        let outcome = match self.calibrator.advance(now_micros, self.feed.angle()) {
            Some(CalibrationProgress::Collecting {
                side,
                samples_collected,
            }) => TickOutcome::Calibrating {
                side,
                samples_collected,
                duties,
            },
            Some(CalibrationProgress::Finished { side, average }) => {
                self.ctx
                    .update(|config| config.calibration.record(side, average));
                info!(%side, average, "calibration finished");
                TickOutcome::Calibrated {
                    side,
                    average,
                    duties,
                }
            }
            None => return Ok(None),
        };
        Ok(Some(outcome))
    }

    fn end_session(&mut self, reason: ParkReason) {
        if self.was_running {
            self.was_running = false;
            match reason {
                ParkReason::SensorStale => warn!("sensor stale, actuator parked"),
                ParkReason::Stopped => info!("run session ended"),
            }
        }
    }

    fn park(&mut self) -> RigResult<DutyPair> {
        self.apply(0.0)
    }

    fn apply(&mut self, command: f32) -> RigResult<DutyPair> {
        let duties = self.mapper.map_command(command);
        self.actuator.set_duty(DriveChannel::A, duties.a)?;
        self.actuator.set_duty(DriveChannel::B, duties.b)?;
        Ok(duties)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::CalibrationState;
    use crate::mocks::mock_output::RecordingOutput;
    use crate::mocks::mock_sensor::ScriptedSensor;
    use crate::strategy::{ControllerGains, Strategy};

    const ARMED: u32 = 3277;
    const FULL: u32 = 6554;

    fn running_config(strategy: Strategy, p: f32, middle: f32) -> ControlConfig {
        ControlConfig {
            running: true,
            strategy,
            gains: ControllerGains { p, i: 0.0, d: 0.0 },
            calibration: CalibrationState::from_extremes(middle, middle),
            ..ControlConfig::default()
        }
    }

    fn rig(
        config: ControlConfig,
        sensor: ScriptedSensor,
    ) -> (Arc<RigContext>, ControlLoop<ScriptedSensor, RecordingOutput>) {
        let ctx = Arc::new(RigContext::new(config));
        let control = ControlLoop::new(
            Arc::clone(&ctx),
            sensor,
            RecordingOutput::new(),
            ActuatorMapper::default(),
        );
        (ctx, control)
    }

    #[test]
    fn test_proportional_end_to_end() -> RigResult<()> {
        let (ctx, mut control) = rig(
            running_config(Strategy::Proportional, 0.5, 10.0),
            ScriptedSensor::constant(8.0),
        );

        let outcome = control.tick(1_000)?;

        let expected = Observation {
            timestamp_micros: 1_000,
            measured_value: 8.0,
            sensor_selector: 0,
            error: 2.0,
            control_output: 1.0,
            strategy: Strategy::Proportional,
        };
        assert_eq!(
            outcome,
            TickOutcome::Active {
                observation: expected,
                duties: DutyPair { a: FULL, b: ARMED },
                recorded: true,
            }
        );
        assert_eq!(control.actuator().last(), Some(DutyPair { a: FULL, b: ARMED }));
        assert_eq!(ctx.buffered_observations(), 1);
        assert_eq!(
            ctx.drain_telemetry(),
            "1000,8.000000000,0,2.000000000,1.000000000,1\n"
        );
        Ok(())
    }

    #[test]
    fn test_negative_error_drives_channel_b() -> RigResult<()> {
        let (_ctx, mut control) = rig(
            running_config(Strategy::BangBang, 0.0, 0.0),
            ScriptedSensor::constant(5.0),
        );

        control.tick(0)?;

        assert_eq!(control.actuator().last(), Some(DutyPair { a: ARMED, b: FULL }));
        Ok(())
    }

    #[test]
    fn test_sensor_never_reports() -> RigResult<()> {
        let (ctx, mut control) = rig(
            running_config(Strategy::Proportional, 0.5, 10.0),
            ScriptedSensor::silent(),
        );

        let outcome = control.tick(0)?;

        assert_eq!(
            outcome,
            TickOutcome::Parked {
                reason: ParkReason::SensorStale,
                duties: DutyPair { a: ARMED, b: ARMED },
            }
        );
        assert_eq!(ctx.buffered_observations(), 0);
        Ok(())
    }

    #[test]
    fn test_stale_sensor_parks_and_records_nothing() -> RigResult<()> {
        let (ctx, mut control) = rig(
            running_config(Strategy::BangBang, 0.0, 10.0),
            ScriptedSensor::with_script(vec![Some(8.0)], None),
        );

        assert!(matches!(control.tick(0)?, TickOutcome::Active { .. }));
        assert_eq!(ctx.buffered_observations(), 1);

        let outcome = control.tick(150_000)?;

        assert_eq!(
            outcome,
            TickOutcome::Parked {
                reason: ParkReason::SensorStale,
                duties: DutyPair { a: ARMED, b: ARMED },
            }
        );
        assert_eq!(control.actuator().last(), Some(DutyPair { a: ARMED, b: ARMED }));
        assert_eq!(ctx.buffered_observations(), 1);
        Ok(())
    }

    #[test]
    fn test_recovery_from_staleness_starts_new_session() -> RigResult<()> {
        let (ctx, mut control) = rig(
            ControlConfig {
                running: true,
                strategy: Strategy::Pid,
                gains: ControllerGains { p: 0.0, i: 1.0, d: 0.0 },
                ..ControlConfig::default()
            },
            ScriptedSensor::with_script(vec![Some(-1.0), Some(-1.0)], None),
        );

        control.tick(0)?;
        control.tick(1_000_000)?;
        assert!(ctx.buffered_observations() > 0);

        // 200ms without readings
        control.tick(1_200_000)?;

        control.sensor_mut().set_fallback(Some(-1.0));
        let outcome = control.tick(5_000_000)?;

        // integral was reset, so the 3.8s gap does not feed into it
        match outcome {
            TickOutcome::Active { observation, .. } => assert_eq!(observation.control_output, 0.0),
            other => panic!("expected active tick, got {other:?}"),
        }
        // telemetry was cleared on the new session edge
        assert_eq!(ctx.buffered_observations(), 1);
        Ok(())
    }

    #[test]
    fn test_stopped_parks_actuator() -> RigResult<()> {
        let (ctx, mut control) = rig(
            running_config(Strategy::Proportional, 0.5, 10.0),
            ScriptedSensor::constant(8.0),
        );
        control.tick(0)?;

        ctx.update(|config| config.running = false);
        let outcome = control.tick(1_000)?;

        assert_eq!(
            outcome,
            TickOutcome::Parked {
                reason: ParkReason::Stopped,
                duties: DutyPair { a: ARMED, b: ARMED },
            }
        );
        assert!(!ctx.loop_status().active);
        Ok(())
    }

    #[test]
    fn test_start_edge_clears_old_telemetry() -> RigResult<()> {
        let (ctx, mut control) = rig(
            running_config(Strategy::Proportional, 0.5, 10.0),
            ScriptedSensor::constant(8.0),
        );
        control.tick(0)?;
        control.tick(1_000)?;
        assert_eq!(ctx.buffered_observations(), 2);

        ctx.update(|config| config.running = false);
        control.tick(2_000)?;
        // data survives the stop so it can still be polled
        assert_eq!(ctx.buffered_observations(), 2);

        ctx.update(|config| config.running = true);
        control.tick(3_000)?;
        assert_eq!(ctx.buffered_observations(), 1);
        Ok(())
    }

    #[test]
    fn test_full_buffer_still_drives_actuator() -> RigResult<()> {
        let ctx = Arc::new(RigContext::with_telemetry(
            running_config(Strategy::Proportional, 0.5, 10.0),
            crate::telemetry::TelemetryRecorder::with_capacity(2),
        ));
        let mut control = ControlLoop::new(
            Arc::clone(&ctx),
            ScriptedSensor::constant(8.0),
            RecordingOutput::new(),
            ActuatorMapper::default(),
        );

        control.tick(0)?;
        control.tick(1)?;
        let outcome = control.tick(2)?;

        assert!(matches!(
            outcome,
            TickOutcome::Active { recorded: false, duties: DutyPair { a: FULL, b: ARMED }, .. }
        ));
        assert_eq!(ctx.buffered_observations(), 2);
        Ok(())
    }

    #[test]
    fn test_tick_uses_one_snapshot() -> RigResult<()> {
        let (ctx, mut control) = rig(
            running_config(Strategy::Proportional, 0.5, 10.0),
            ScriptedSensor::constant(8.0),
        );

        let outcome = control.tick(0)?;
        ctx.update(|config| config.strategy = Strategy::BangBang);

        match outcome {
            TickOutcome::Active { observation, .. } => {
                assert_eq!(observation.strategy, Strategy::Proportional)
            }
            other => panic!("expected active tick, got {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn test_calibration_runs_inside_loop() -> RigResult<()> {
        let ctx = Arc::new(RigContext::default());
        let mut control = ControlLoop::with_calibrator(
            Arc::clone(&ctx),
            ScriptedSensor::constant(4.0),
            RecordingOutput::new(),
            ActuatorMapper::default(),
            Calibrator::new(3, 10_000),
        );
        ctx.update(|config| config.calibration = CalibrationState::from_extremes(0.0, 20.0));

        assert!(ctx.request_calibration(CalibrationSide::Low));

        assert!(matches!(
            control.tick(0)?,
            TickOutcome::Calibrating { samples_collected: 1, .. }
        ));
        assert_eq!(ctx.loop_status().calibrating, Some(CalibrationSide::Low));
        // between samples the loop keeps ticking
        assert!(matches!(
            control.tick(5_000)?,
            TickOutcome::Calibrating { samples_collected: 1, .. }
        ));
        control.tick(10_000)?;
        let done = control.tick(20_000)?;

        assert_eq!(
            done,
            TickOutcome::Calibrated {
                side: CalibrationSide::Low,
                average: 4.0,
                duties: DutyPair { a: ARMED, b: ARMED },
            }
        );
        assert_eq!(ctx.snapshot().calibration, CalibrationState::from_extremes(4.0, 20.0));
        assert_eq!(ctx.loop_status().calibrating, None);
        // every calibrating tick parked the actuator
        assert!(control.actuator().writes.iter().all(|&(_, duty)| duty == ARMED));
        Ok(())
    }

    #[test]
    fn test_calibration_interrupts_running_session() -> RigResult<()> {
        let ctx = Arc::new(RigContext::new(running_config(Strategy::BangBang, 0.0, 10.0)));
        let mut control = ControlLoop::with_calibrator(
            Arc::clone(&ctx),
            ScriptedSensor::constant(8.0),
            RecordingOutput::new(),
            ActuatorMapper::default(),
            Calibrator::new(1, 10_000),
        );
        control.tick(0)?;
        ctx.request_calibration(CalibrationSide::High);

        assert!(matches!(control.tick(1_000)?, TickOutcome::Calibrated { .. }));
        assert!(!ctx.loop_status().active);

        // running resumes with a fresh session
        let outcome = control.tick(2_000)?;
        assert!(matches!(outcome, TickOutcome::Active { .. }));
        assert_eq!(ctx.buffered_observations(), 1);
        Ok(())
    }

    #[test]
    fn test_queued_calibrations_run_back_to_back() -> RigResult<()> {
        let ctx = Arc::new(RigContext::default());
        let mut control = ControlLoop::with_calibrator(
            Arc::clone(&ctx),
            ScriptedSensor::with_script(vec![Some(2.0), Some(6.0)], Some(6.0)),
            RecordingOutput::new(),
            ActuatorMapper::default(),
            Calibrator::new(1, 10_000),
        );
        ctx.request_calibration(CalibrationSide::Low);
        ctx.request_calibration(CalibrationSide::High);

        assert!(matches!(
            control.tick(0)?,
            TickOutcome::Calibrated { side: CalibrationSide::Low, .. }
        ));
        assert_eq!(ctx.pending_calibration(), Some(CalibrationSide::High));
        assert!(matches!(
            control.tick(1_000)?,
            TickOutcome::Calibrated { side: CalibrationSide::High, .. }
        ));

        assert_eq!(ctx.snapshot().calibration, CalibrationState::from_extremes(2.0, 6.0));
        assert_eq!(ctx.pending_calibration(), None);
        Ok(())
    }
}
