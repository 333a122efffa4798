//! Half-integer divider solver for the RCG mux/divider.
//!
//! The divider field holds `2 * divisor - 1`, so a mux/divider can divide its
//! parent by 1, 1.5, 2, ... 16. The solver works on twice the divisor (`div`),
//! which is what the hardware code is derived from: `code = div - 1`.

/// Remainder tolerated when dividing the fixed GPLL0 reference
pub const GPLL_TOLERANCE: u64 = 5000;

/// Smallest `div` the hardware accepts (divisor 1.0)
pub const DIV_MIN: u32 = 2;
/// Largest `div` the 5-bit field can hold (divisor 16.0)
pub const DIV_MAX: u32 = 32;

/// Find `div = 2 * value / divisor` when the remainder is at most `tr`.
///
/// Fails when the remainder exceeds `tr` or when `div` would be below 2,
/// which would need a divisor below 1.
pub fn frac2_div_strict(value: u64, divisor: u64, tr: u64) -> Option<u32> {
    if divisor == 0 {
        return None;
    }
    let value2 = value.checked_mul(2)?;
    if value2 % divisor > tr {
        return None;
    }
    let div = value2 / divisor;
    if div < DIV_MIN as u64 {
        return None;
    }
    u32::try_from(div).ok()
}

/// `div` fits in the divider field
pub fn div_in_range(div: u32) -> bool {
    (DIV_MIN..=DIV_MAX).contains(&div)
}

/// Solver followed by the hardware range check
pub fn solve(value: u64, divisor: u64, tr: u64) -> Option<u32> {
    frac2_div_strict(value, divisor, tr).filter(|div| div_in_range(*div))
}

/// Output rate of `parent` divided by `div / 2`
pub fn div_rate(parent: u64, div: u32) -> u64 {
    parent * 2 / div as u64
}

/// Output rate for a divider field value
pub fn recalc_rate(parent: u64, code: u32) -> u64 {
    div_rate(parent, code + 1)
}
