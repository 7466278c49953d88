use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use lab_pid_control::actuator::pwm::SysfsPwm;
use lab_pid_control::sensor::array::ThermometerArray;
use lab_pid_control::sensor::w1therm::W1Thermometer;
use lab_pid_control::simulation::{SimulatedHeater, SimulatedThermometer, ThermalPlant};
use lab_pid_control::{
    Actuator, ControlLoop, ControlResult, LoopSummary, PidController, RegimeSwitch, RunConfig, RunLogWriter,
    Sensor, StopSignal, Term,
};

#[derive(Parser, Debug)]
#[clap(version, about = "PID heater stabilization loop")]
struct Opts {
    /// TOML run configuration
    #[clap(short, long, default_value = "config/stabilize.toml")]
    config: PathBuf,
    /// Setpoint, overrides the config file
    #[clap(short = 'T', long)]
    setpoint: Option<f64>,
    /// Proportional gain
    #[clap(long)]
    prop: Option<f64>,
    /// Integral gain
    #[clap(long)]
    intg: Option<f64>,
    /// Derivative gain
    #[clap(long)]
    diff: Option<f64>,
    /// Error history length in samples
    #[clap(long)]
    history: Option<usize>,
    /// Polling interval in milliseconds
    #[clap(long)]
    interval_ms: Option<u64>,
    /// Per-tick run log file
    #[clap(short = 'l', long)]
    log_file: Option<PathBuf>,
    /// Log error and term breakdown columns too
    #[clap(long)]
    extended_log: bool,
    /// Drive the simulated heater plant instead of hardware
    #[clap(long)]
    simulate: bool,
    /// Stop after this many ticks
    #[clap(long)]
    max_ticks: Option<u64>,
    /// Keep I and D enables fixed instead of switching by regime
    #[clap(long)]
    no_regime: bool,
}

impl Opts {
    fn apply(&self, config: &mut RunConfig) {
        if let Some(setpoint) = self.setpoint {
            config.setpoint = setpoint;
        }
        if let Some(p) = self.prop {
            config.pid.p = p;
        }
        if let Some(i) = self.intg {
            config.pid.i = i;
        }
        if let Some(d) = self.diff {
            config.pid.d = d;
        }
        if let Some(n) = self.history {
            config.pid.history_size = n;
        }
        if let Some(ms) = self.interval_ms {
            config.control.interval = Duration::from_millis(ms);
        }
        if let Some(path) = &self.log_file {
            config.log.path = Some(path.clone());
        }
        if self.extended_log {
            config.log.extended = true;
        }
        if self.simulate {
            config.simulation.enabled = true;
        }
        if self.max_ticks.is_some() {
            config.control.max_ticks = self.max_ticks;
        }
        if self.no_regime {
            config.regime.enabled = false;
        }
    }
}

type Collaborators = (Box<dyn Sensor + Send>, Box<dyn Actuator + Send>);

fn collaborators(config: &RunConfig) -> ControlResult<Collaborators> {
    if config.simulation.enabled {
        let plant = ThermalPlant::shared(config.simulation.plant);
        let dt_s = config.control.interval.as_secs_f64();
        let sensor: Box<dyn Sensor + Send> = Box::new(SimulatedThermometer::new(plant.clone()));
        let heater: Box<dyn Actuator + Send> = Box::new(SimulatedHeater::new(plant, dt_s));
        return Ok((sensor, heater));
    }

    let probes = config
        .hardware
        .thermometers
        .iter()
        .map(|id| {
            let probe = W1Thermometer::from_device_id(id);
            info!(path = %probe.path().display(), "thermometer");
            Box::new(probe) as Box<dyn Sensor + Send>
        })
        .collect();
    let sensor: Box<dyn Sensor + Send> = Box::new(ThermometerArray::new(probes)?);
    let heater: Box<dyn Actuator + Send> = Box::new(SysfsPwm::open(
        config.hardware.pwm_chip,
        config.hardware.pwm_channel,
        config.hardware.pwm_frequency_hz,
    )?);
    Ok((sensor, heater))
}

fn run(config: RunConfig) -> ControlResult<LoopSummary> {
    let mut pid = PidController::new(config.pid)?;
    pid.set_setpoint(config.setpoint);
    pid.set_enabled(Term::P, true);
    pid.set_enabled(Term::I, true);
    pid.set_enabled(Term::D, false);

    let stop = StopSignal::new();
    let _watcher = stop.install_os_handlers()?;

    let (sensor, actuator) = collaborators(&config)?;
    let mut control = ControlLoop::new(config.control, pid, sensor, actuator, stop)?;
    if let Some(regime) = RegimeSwitch::from_config(&config.regime) {
        control = control.with_regime(regime);
    }
    if let Some(path) = &config.log.path {
        info!(path = %path.display(), extended = config.log.extended, "run log");
        control = control.with_run_log(RunLogWriter::create(path, config.log.extended)?);
    }

    control.run()
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let opts = Opts::parse();
    let config = RunConfig::load(&opts.config).and_then(|mut config| {
        opts.apply(&mut config);
        config.validate()?;
        Ok(config)
    });
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    match run(config) {
        Ok(summary) => {
            let stats = summary.stats;
            let metrics = summary.metrics;
            info!(
                ticks = stats.ticks,
                applied = stats.applied,
                skipped_reads = stats.skipped_reads,
                retried_writes = stats.retried_writes,
                rejected_writes = stats.rejected_writes,
                non_finite_outputs = stats.non_finite_outputs,
                "run finished"
            );
            info!(
                "read p50 {:?} p99 {:?} | tick p50 {:?} p99 {:?} | {} overruns",
                metrics.read_p50, metrics.read_p99, metrics.tick_p50, metrics.tick_p99, metrics.overruns
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
