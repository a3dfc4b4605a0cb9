//! Small conversions shared by the engine, export and CLI output.

use chrono::{DateTime, NaiveDate, Utc};
use std::fmt::Display;

/// A binding's increment override wins over the rule's own increment
pub fn effective_increment(override_value: Option<f64>, rule_default: f64) -> f64 {
    override_value.unwrap_or(rule_default)
}

/// Calendar date a timestamp falls on (UTC)
pub fn date_of(at: DateTime<Utc>) -> NaiveDate {
    at.date_naive()
}

pub fn opt_timestamp(at: Option<DateTime<Utc>>) -> String {
    at.map(|t| t.to_rfc3339()).unwrap_or_default()
}

/// Display an optional value, empty when absent
pub fn opt_display<T: Display>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Format a weight without a trailing ".0"
pub fn format_weight(weight: f64) -> String {
    if weight.fract() == 0.0 {
        format!("{:.0}", weight)
    } else {
        let s = format!("{:.3}", weight);
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}
