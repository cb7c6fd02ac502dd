//! Two-series crossover detection.
//!
//! Crossed up at t: `x[t] > y[t]` and `x[t-1] <= y[t-1]`. Crossed down is the
//! mirror. Sustained equality or an already-crossed state is `NoCross`.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrossState {
    CrossedUp,
    CrossedDown,
    NoCross,
}

impl CrossState {
    pub fn between(prev_x: f64, prev_y: f64, x: f64, y: f64) -> Self {
        if x > y && prev_x <= prev_y {
            CrossState::CrossedUp
        } else if x < y && prev_x >= prev_y {
            CrossState::CrossedDown
        } else {
            CrossState::NoCross
        }
    }

    /// Undefined whenever either series lacks a value at t or t-1.
    pub fn from_options(
        prev_x: Option<f64>,
        prev_y: Option<f64>,
        x: Option<f64>,
        y: Option<f64>,
    ) -> Option<Self> {
        Some(Self::between(prev_x?, prev_y?, x?, y?))
    }

    pub fn is_up(self) -> bool {
        self == CrossState::CrossedUp
    }
}

/// Crossover state for every index of two aligned series.
pub fn calculate_crossover(x: &[Option<f64>], y: &[Option<f64>]) -> Vec<Option<CrossState>> {
    let len = x.len().min(y.len());
    (0..len)
        .map(|i| {
            if i == 0 {
                return None;
            }
            CrossState::from_options(x[i - 1], y[i - 1], x[i], y[i])
        })
        .collect()
}
