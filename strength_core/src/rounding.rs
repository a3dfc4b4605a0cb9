//! Percentage and increment rounding.
//!
//! Plate math is done in `f64`. Quotients are nudged by a small epsilon
//! before flooring/ceiling so that `300 * 0.85` (which is
//! `254.99999999999997` in binary) still floors to `255` on a 2.5 grid.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const EPSILON: f64 = 1e-9;

/// Direction used when snapping a weight to an increment
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RoundingMode {
    #[default]
    Nearest,
    Floor,
    Ceil,
}

impl fmt::Display for RoundingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoundingMode::Nearest => write!(f, "nearest"),
            RoundingMode::Floor => write!(f, "floor"),
            RoundingMode::Ceil => write!(f, "ceil"),
        }
    }
}

impl FromStr for RoundingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "nearest" => Ok(RoundingMode::Nearest),
            "floor" | "down" => Ok(RoundingMode::Floor),
            "ceil" | "up" => Ok(RoundingMode::Ceil),
            other => Err(format!("Unknown rounding mode: {}", other)),
        }
    }
}

/// Increment plus mode, as configured on a program
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct RoundingPolicy {
    pub increment: f64,
    #[serde(default)]
    pub mode: RoundingMode,
}

impl Default for RoundingPolicy {
    fn default() -> Self {
        Self {
            increment: 2.5,
            mode: RoundingMode::Nearest,
        }
    }
}

impl RoundingPolicy {
    pub fn with_mode(self, mode: RoundingMode) -> Self {
        Self { mode, ..self }
    }

    pub fn apply(&self, value: f64) -> f64 {
        round_to_increment(value, self.increment, self.mode)
    }
}

/// Snap `value` to a multiple of `increment`
///
/// A non-positive or non-finite increment leaves the value untouched.
pub fn round_to_increment(value: f64, increment: f64, mode: RoundingMode) -> f64 {
    if !(increment.is_finite() && increment > 0.0) || !value.is_finite() {
        return value;
    }

    let steps = value / increment;
    let snapped = match mode {
        RoundingMode::Nearest => steps.round(),
        RoundingMode::Floor => (steps + EPSILON).floor(),
        RoundingMode::Ceil => (steps - EPSILON).ceil(),
    };

    tidy(snapped * increment)
}

/// Apply a fractional percentage (0.85 = 85%) and round
pub fn apply_percent(base: f64, percent: f64, increment: f64, mode: RoundingMode) -> f64 {
    round_to_increment(base * percent, increment, mode)
}

/// Drop binary noise below a millionth so 252.50000000000003 prints as 252.5
fn tidy(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f64 = 1e-6;

    #[test]
    fn test_percent_of_training_max_floors_cleanly() {
        assert_eq!(apply_percent(300.0, 0.85, 2.5, RoundingMode::Floor), 255.0);
    }

    #[test]
    fn test_modes_on_grid_miss() {
        assert_eq!(round_to_increment(101.0, 2.5, RoundingMode::Floor), 100.0);
        assert_eq!(round_to_increment(101.0, 2.5, RoundingMode::Ceil), 102.5);
        assert_eq!(round_to_increment(101.0, 2.5, RoundingMode::Nearest), 100.0);
        assert_eq!(round_to_increment(101.5, 2.5, RoundingMode::Nearest), 102.5);
    }

    #[test]
    fn test_zero_increment_is_identity() {
        assert_eq!(round_to_increment(101.3, 0.0, RoundingMode::Floor), 101.3);
        assert_eq!(round_to_increment(101.3, -5.0, RoundingMode::Ceil), 101.3);
    }

    #[test]
    fn test_floor_le_value_le_ceil() {
        for increment in [1.0, 2.5, 5.0, 0.5] {
            for i in 0..400 {
                let x = i as f64 * 0.37 + 20.0;
                let lo = round_to_increment(x, increment, RoundingMode::Floor);
                let hi = round_to_increment(x, increment, RoundingMode::Ceil);
                let near = round_to_increment(x, increment, RoundingMode::Nearest);

                assert!(lo <= x + TOLERANCE, "floor {} > {}", lo, x);
                assert!(x <= hi + TOLERANCE, "ceil {} < {}", hi, x);
                assert!((near - x).abs() <= increment / 2.0 + TOLERANCE);
            }
        }
    }

    #[test]
    fn test_policy_with_mode() {
        let policy = RoundingPolicy::default().with_mode(RoundingMode::Ceil);
        assert_eq!(policy.apply(100.1), 102.5);
        assert_eq!(policy.increment, 2.5);
    }

    #[test]
    fn test_parse_mode() {
        assert_eq!("FLOOR".parse::<RoundingMode>(), Ok(RoundingMode::Floor));
        assert!("sideways".parse::<RoundingMode>().is_err());
    }
}
