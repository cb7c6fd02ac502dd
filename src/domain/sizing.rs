//! Position sizing.
//!
//! quantity = floor(capital * risk_fraction / price), whole units only.
//! A zero result means "no trade" and must not be submitted.

pub fn position_size(capital: f64, risk_fraction: f64, price: f64) -> u64 {
    if !(capital.is_finite() && capital > 0.0) || !(price.is_finite() && price > 0.0) {
        return 0;
    }
    if !(risk_fraction > 0.0 && risk_fraction <= 1.0) {
        return 0;
    }
    let units = (capital * risk_fraction / price).floor();
    if units < 1.0 { 0 } else { units as u64 }
}
