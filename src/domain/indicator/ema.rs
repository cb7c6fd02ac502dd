//! Exponential moving average, smoothing `2 / (period + 1)`.
//!
//! Undefined until `period` values have been seen; the first defined value is
//! their simple mean.

pub fn calculate_ema(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut ema = ExponentialMean::new(period);
    values.iter().map(|&v| ema.push(v)).collect()
}

/// Incremental EMA with an SMA seed.
#[derive(Debug, Clone)]
pub struct ExponentialMean {
    period: usize,
    k: f64,
    count: usize,
    sum: f64,
    value: Option<f64>,
}

impl ExponentialMean {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            k: 2.0 / (period as f64 + 1.0),
            count: 0,
            sum: 0.0,
            value: None,
        }
    }

    pub fn push(&mut self, close: f64) -> Option<f64> {
        if self.period == 0 {
            return None;
        }
        self.count += 1;
        if self.count < self.period {
            self.sum += close;
        } else if self.count == self.period {
            self.sum += close;
            self.value = Some(self.sum / self.period as f64);
        } else if let Some(prev) = self.value {
            self.value = Some(close * self.k + prev * (1.0 - self.k));
        }
        self.value
    }

    pub fn value(&self) -> Option<f64> {
        self.value
    }
}
