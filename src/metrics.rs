//! Metrics module - control loop timing

use hdrhistogram::Histogram;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// TIMING METRICS
// ============================================================================

#[derive(Clone)]
pub struct TimingMetrics {
    read_hist: Arc<Mutex<Histogram<u64>>>,
    write_hist: Arc<Mutex<Histogram<u64>>>,
    tick_hist: Arc<Mutex<Histogram<u64>>>,
    overruns: Arc<Mutex<u64>>,
}

fn histogram() -> Histogram<u64> {
    Histogram::new(3).expect("3 significant figures is within hdrhistogram's range")
}

impl Default for TimingMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl TimingMetrics {
    pub fn new() -> Self {
        Self {
            read_hist: Arc::new(Mutex::new(histogram())),
            write_hist: Arc::new(Mutex::new(histogram())),
            tick_hist: Arc::new(Mutex::new(histogram())),
            overruns: Arc::new(Mutex::new(0)),
        }
    }

    pub fn record_read(&self, duration: Duration) {
        self.read_hist.lock().record(duration.as_nanos() as u64).ok();
    }

    pub fn record_write(&self, duration: Duration) {
        self.write_hist.lock().record(duration.as_nanos() as u64).ok();
    }

    /// A tick that takes longer than the polling interval counts as an overrun.
    pub fn record_tick(&self, duration: Duration, interval: Duration) {
        self.tick_hist.lock().record(duration.as_nanos() as u64).ok();
        if duration > interval {
            *self.overruns.lock() += 1;
        }
    }

    pub fn report(&self) -> MetricsReport {
        let read = self.read_hist.lock();
        let write = self.write_hist.lock();
        let tick = self.tick_hist.lock();

        MetricsReport {
            read_p50: Duration::from_nanos(read.value_at_quantile(0.5)),
            read_p99: Duration::from_nanos(read.value_at_quantile(0.99)),
            write_p50: Duration::from_nanos(write.value_at_quantile(0.5)),
            write_p99: Duration::from_nanos(write.value_at_quantile(0.99)),
            tick_p50: Duration::from_nanos(tick.value_at_quantile(0.5)),
            tick_p99: Duration::from_nanos(tick.value_at_quantile(0.99)),
            ticks_recorded: tick.len(),
            overruns: *self.overruns.lock(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MetricsReport {
    pub read_p50: Duration,
    pub read_p99: Duration,
    pub write_p50: Duration,
    pub write_p99: Duration,
    pub tick_p50: Duration,
    pub tick_p99: Duration,
    pub ticks_recorded: u64,
    pub overruns: u64,
}
