//! Control loop driver - sensor read, controller update, actuator write
//!
//! Every tick runs read → feed → clamp → regime switch → write → log in that
//! order on the calling thread. The stop signal is only checked between
//! ticks, so a tick that has started always completes.

pub mod regime;

use std::io::Write;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::actuator::controller::PidController;
use crate::actuator::Actuator;
use crate::error::{ControlError, ControlResult};
use crate::metrics::{MetricsReport, TimingMetrics};
use crate::record::RunLogWriter;
use crate::sensor::Sensor;
use crate::signal::StopSignal;
use regime::{Regime, RegimeSwitch};

// ============================================================================
// CONFIGURATION AND RESULTS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoopConfig {
    #[serde(rename = "interval_ms", deserialize_with = "millis::deserialize")]
    pub interval: Duration,
    pub output_min: f64,
    pub output_max: f64,
    /// Stop after this many ticks (skipped ones included).
    pub max_ticks: Option<u64>,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(500),
            output_min: 0.0,
            output_max: 100.0,
            max_ticks: None,
        }
    }
}

impl LoopConfig {
    pub fn validate(&self) -> ControlResult<()> {
        if !self.output_min.is_finite() || !self.output_max.is_finite() || self.output_min > self.output_max {
            return Err(ControlError::invalid(format!(
                "output range [{}, {}] is not a finite, ordered interval",
                self.output_min, self.output_max
            )));
        }
        Ok(())
    }
}

mod millis {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    /// Output written; `output` is the clamped value the actuator received.
    Applied { measurement: f64, output: f64 },
    /// Sensor unavailable, controller untouched.
    Skipped,
    /// Actuator refused the write twice; the controller was still fed.
    WriteRejected { measurement: f64, output: f64 },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub ticks: u64,
    pub applied: u64,
    pub skipped_reads: u64,
    pub retried_writes: u64,
    pub rejected_writes: u64,
    pub non_finite_outputs: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct LoopSummary {
    pub stats: LoopStats,
    pub metrics: MetricsReport,
}

// ============================================================================
// CONTROL LOOP
// ============================================================================

pub struct ControlLoop {
    config: LoopConfig,
    pid: PidController,
    sensor: Box<dyn Sensor + Send>,
    actuator: Box<dyn Actuator + Send>,
    regime: Option<RegimeSwitch>,
    run_log: Option<RunLogWriter<Box<dyn Write + Send>>>,
    stop: StopSignal,
    metrics: TimingMetrics,
    stats: LoopStats,
    last_written: Option<f64>,
}

impl ControlLoop {
    pub fn new(
        config: LoopConfig,
        pid: PidController,
        sensor: Box<dyn Sensor + Send>,
        actuator: Box<dyn Actuator + Send>,
        stop: StopSignal,
    ) -> ControlResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            pid,
            sensor,
            actuator,
            regime: None,
            run_log: None,
            stop,
            metrics: TimingMetrics::new(),
            stats: LoopStats::default(),
            last_written: None,
        })
    }

    pub fn with_regime(mut self, regime: RegimeSwitch) -> Self {
        self.regime = Some(regime);
        self
    }

    pub fn with_run_log<W: Write + Send + 'static>(mut self, log: RunLogWriter<W>) -> Self {
        self.run_log = Some(log.boxed());
        self
    }

    pub fn pid(&self) -> &PidController {
        &self.pid
    }

    pub fn pid_mut(&mut self) -> &mut PidController {
        &mut self.pid
    }

    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    pub fn metrics(&self) -> &TimingMetrics {
        &self.metrics
    }

    pub fn stop_signal(&self) -> &StopSignal {
        &self.stop
    }

    /// Tick until a stop is requested or `max_ticks` is reached.
    ///
    /// Transient collaborator failures are absorbed tick by tick; the first
    /// fatal one ends the run. The run log is flushed either way.
    pub fn run(&mut self) -> ControlResult<LoopSummary> {
        info!(
            sensor = self.sensor.name(),
            actuator = self.actuator.name(),
            setpoint = self.pid.setpoint(),
            interval_ms = self.config.interval.as_millis() as u64,
            "control loop starting"
        );

        let result = self.run_ticks();
        let flushed = self.flush_run_log();
        result?;
        flushed?;

        info!(ticks = self.stats.ticks, applied = self.stats.applied, "control loop stopped");
        Ok(self.summary())
    }

    fn run_ticks(&mut self) -> ControlResult<()> {
        while !self.stop.is_stop_requested() {
            if self.config.max_ticks.is_some_and(|max| self.stats.ticks >= max) {
                break;
            }

            let tick_start = Instant::now();
            self.tick()?;
            let elapsed = tick_start.elapsed();
            self.metrics.record_tick(elapsed, self.config.interval);

            if let Some(remaining) = self.config.interval.checked_sub(elapsed) {
                self.stop.sleep(remaining);
            }
        }
        Ok(())
    }

    /// Run exactly one tick.
    pub fn tick(&mut self) -> ControlResult<TickOutcome> {
        self.stats.ticks += 1;

        let read_start = Instant::now();
        let measurement = match self.sensor.read() {
            Ok(value) => value,
            Err(e @ ControlError::SensorUnavailable { .. }) => {
                self.stats.skipped_reads += 1;
                warn!(error = %e, "skipping tick");
                return Ok(TickOutcome::Skipped);
            }
            Err(e) => return Err(e),
        };
        self.metrics.record_read(read_start.elapsed());

        let raw = self.pid.feed(measurement);
        let output = self.condition_output(raw);
        let snapshot = self.pid.snapshot();

        if let Some(regime) = self.regime.as_mut() {
            match regime.apply(&mut self.pid, measurement) {
                Regime::Below { history_cleared: true } => {
                    info!(measurement, "dropped below setpoint, error history cleared")
                }
                other => debug!(?other, "regime"),
            }
        }

        let write_start = Instant::now();
        if !self.write_with_retry(output)? {
            return Ok(TickOutcome::WriteRejected { measurement, output });
        }
        self.metrics.record_write(write_start.elapsed());
        self.last_written = Some(output);
        self.stats.applied += 1;

        info!("PV = {:.2} | OUT = {:.2}", measurement, output);
        if let Some(log) = self.run_log.as_mut() {
            log.log_tick(&snapshot, output)?;
        }

        Ok(TickOutcome::Applied { measurement, output })
    }

    /// Clamp a finite output into range; replace a non-finite one with the
    /// last written value, or the range minimum before the first write.
    fn condition_output(&mut self, raw: f64) -> f64 {
        if raw.is_finite() {
            return raw.clamp(self.config.output_min, self.config.output_max);
        }
        self.stats.non_finite_outputs += 1;
        let held = self.last_written.unwrap_or(self.config.output_min);
        warn!(raw, held, "non-finite controller output, holding previous output");
        held
    }

    /// One retry on a busy actuator. `Ok(false)` means the tick gave up.
    fn write_with_retry(&mut self, value: f64) -> ControlResult<bool> {
        match self.actuator.write(value) {
            Ok(()) => return Ok(true),
            Err(e @ ControlError::ActuatorRejected { .. }) => {
                self.stats.retried_writes += 1;
                warn!(error = %e, "retrying actuator write");
            }
            Err(e) => return Err(e),
        }

        match self.actuator.write(value) {
            Ok(()) => Ok(true),
            Err(e @ ControlError::ActuatorRejected { .. }) => {
                self.stats.rejected_writes += 1;
                warn!(error = %e, "actuator write rejected twice, giving up on this tick");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    fn flush_run_log(&mut self) -> ControlResult<()> {
        match self.run_log.as_mut() {
            Some(log) => log.flush(),
            None => Ok(()),
        }
    }

    pub fn summary(&self) -> LoopSummary {
        LoopSummary {
            stats: self.stats,
            metrics: self.metrics.report(),
        }
    }
}
