//! Fixed-length error history used for the integral and derivative estimates

use crate::error::{ControlError, ControlResult};

/// The last `capacity` error samples, oldest first.
///
/// The buffer is always full: it starts as `capacity` zeros and every `push`
/// shifts the window by one, so the integration window has constant width
/// even before `capacity` real samples have been seen.
#[derive(Debug, Clone, PartialEq)]
pub struct RollingErrorBuffer {
    samples: Vec<f64>,
}

impl RollingErrorBuffer {
    pub fn new(capacity: usize) -> ControlResult<Self> {
        check_capacity(capacity)?;
        Ok(Self {
            samples: vec![0.0; capacity],
        })
    }

    pub fn capacity(&self) -> usize {
        self.samples.len()
    }

    /// Append `value` as the newest sample and drop the oldest one.
    pub fn push(&mut self, value: f64) {
        self.samples.rotate_left(1);
        if let Some(newest) = self.samples.last_mut() {
            *newest = value;
        }
    }

    pub fn clear(&mut self) {
        self.samples.iter_mut().for_each(|s| *s = 0.0);
    }

    pub fn values(&self) -> &[f64] {
        &self.samples
    }

    pub fn newest(&self) -> f64 {
        self.samples.last().copied().unwrap_or(0.0)
    }

    /// Change the window length, keeping the newest samples. Growing pads
    /// with zeros on the oldest side.
    pub fn resize(&mut self, capacity: usize) -> ControlResult<()> {
        check_capacity(capacity)?;
        let len = self.samples.len();
        if capacity < len {
            self.samples.drain(..len - capacity);
        } else if capacity > len {
            let mut grown = vec![0.0; capacity - len];
            grown.extend_from_slice(&self.samples);
            self.samples = grown;
        }
        Ok(())
    }

    /// Trapezoid rule with unit sample spacing over the whole window.
    pub fn trapezoid(&self) -> f64 {
        self.samples
            .windows(2)
            .map(|pair| (pair[0] + pair[1]) * 0.5)
            .sum()
    }

    /// Derivative estimate from the last nonzero first difference.
    ///
    /// With `diff[k] = v[k + 1] - v[k]`, the last nonzero difference at
    /// `k > 0` is divided by the number of differences after it
    /// (`diff.len() - 1 - k`). When it is the newest difference that count is
    /// zero and the difference is returned as is. Without a nonzero
    /// difference at `k > 0` the most recent raw difference is returned. A NaN
    /// difference counts as nonzero.
    pub fn derivative(&self) -> f64 {
        let diffs: Vec<f64> = self.samples.windows(2).map(|pair| pair[1] - pair[0]).collect();
        let Some(&latest) = diffs.last() else {
            return 0.0;
        };

        match diffs.iter().rposition(|d| *d != 0.0) {
            Some(k) if k > 0 => match diffs.len() - 1 - k {
                0 => diffs[k],
                after => diffs[k] / after as f64,
            },
            _ => latest,
        }
    }
}

fn check_capacity(capacity: usize) -> ControlResult<()> {
    if capacity < 1 {
        return Err(ControlError::invalid("history size must be at least 1"));
    }
    Ok(())
}
