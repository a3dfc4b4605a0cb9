//! Load strategies: turning a max (or a fixed value) into a working weight.
//!
//! Resolution is pure with respect to its inputs. Nothing is cached, since a
//! max can change between two resolutions of the same prescription.

use crate::blob::ConfigBlob;
use crate::rounding::{apply_percent, RoundingMode, RoundingPolicy};
use crate::types::{LookupEntry, MaxType};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Source of current maxes for load resolution
///
/// Implementations must return the most recent row of exactly `max_type`,
/// without the display tie-break applied by `maxes::current_max_for_display`.
pub trait MaxLookup {
    fn current_max(&self, user_id: &str, lift_id: Uuid, max_type: MaxType) -> Result<Option<f64>>;
}

/// Everything a strategy needs besides its own parameters
#[derive(Clone, Debug)]
pub struct LoadRequest<'a> {
    pub user_id: &'a str,
    pub lift_id: Uuid,
    /// Program default rounding; supplies the increment when a strategy has none
    pub rounding: RoundingPolicy,
    pub week_lookup: Option<LookupEntry>,
    pub day_lookup: Option<LookupEntry>,
}

/// A fixed working weight
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FixedWeight {
    pub weight: f64,
}

/// A percentage of a named max type
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PercentOfMax {
    pub max_type: MaxType,
    /// Fraction of the max: 0.85 = 85%
    pub percent: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub increment: Option<f64>,
    /// Scale the percent by the program's weekly lookup entry
    #[serde(default)]
    pub week_lookup: bool,
    /// Scale the percent by the program's daily lookup entry
    #[serde(default)]
    pub day_lookup: bool,
}

impl PercentOfMax {
    /// Percent after any opted-in lookups are applied
    pub fn effective_percent(&self, req: &LoadRequest<'_>) -> f64 {
        let mut percent = self.percent;
        if self.week_lookup {
            if let Some(entry) = req.week_lookup {
                percent = percent * entry.multiplier + entry.offset;
            }
        }
        if self.day_lookup {
            if let Some(entry) = req.day_lookup {
                percent = percent * entry.multiplier + entry.offset;
            }
        }
        percent
    }
}

/// Decoded load strategy
#[derive(Clone, Debug, PartialEq)]
pub enum LoadStrategy {
    FixedWeight(FixedWeight),
    PercentOfMax(PercentOfMax),
}

impl LoadStrategy {
    pub const FIXED_WEIGHT: &'static str = "fixed_weight";
    pub const PERCENT_OF_MAX: &'static str = "percent_of_max";

    pub fn from_blob(blob: &ConfigBlob) -> Result<Self> {
        let strategy = match (blob.kind.as_str(), blob.version) {
            (Self::FIXED_WEIGHT, 1) => LoadStrategy::FixedWeight(blob.decode()?),
            (Self::PERCENT_OF_MAX, 1) => LoadStrategy::PercentOfMax(blob.decode()?),
            _ => return Err(blob.unsupported("load strategy")),
        };
        strategy.validate()?;
        Ok(strategy)
    }

    pub fn to_blob(&self) -> Result<ConfigBlob> {
        match self {
            LoadStrategy::FixedWeight(p) => ConfigBlob::encode(Self::FIXED_WEIGHT, 1, p),
            LoadStrategy::PercentOfMax(p) => ConfigBlob::encode(Self::PERCENT_OF_MAX, 1, p),
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            LoadStrategy::FixedWeight(p) => {
                if !p.weight.is_finite() || p.weight < 0.0 {
                    return Err(Error::InvalidConfig(format!(
                        "fixed weight must be non-negative, got {}",
                        p.weight
                    )));
                }
            }
            LoadStrategy::PercentOfMax(p) => {
                if !p.percent.is_finite() || p.percent <= 0.0 {
                    return Err(Error::InvalidConfig(format!(
                        "percent must be positive, got {}",
                        p.percent
                    )));
                }
                if let Some(inc) = p.increment {
                    if !inc.is_finite() || inc < 0.0 {
                        return Err(Error::InvalidConfig(format!(
                            "increment must be non-negative, got {}",
                            inc
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Compute the working weight
    ///
    /// `mode` comes from the enclosing set scheme, since warm-up and work sets
    /// round the same strategy differently.
    pub fn resolve<M: MaxLookup + ?Sized>(
        &self,
        maxes: &M,
        req: &LoadRequest<'_>,
        mode: RoundingMode,
    ) -> Result<f64> {
        match self {
            LoadStrategy::FixedWeight(p) => Ok(p.weight),
            LoadStrategy::PercentOfMax(p) => {
                let max = maxes
                    .current_max(req.user_id, req.lift_id, p.max_type)?
                    .ok_or(Error::MaxNotFound {
                        lift: req.lift_id,
                        max_type: p.max_type,
                    })?;
                let increment = p.increment.unwrap_or(req.rounding.increment);
                let weight = apply_percent(max, p.effective_percent(req), increment, mode);

                tracing::debug!(
                    "Resolved {:.1}% of {} {} -> {}",
                    p.effective_percent(req) * 100.0,
                    p.max_type,
                    max,
                    weight
                );
                Ok(weight)
            }
        }
    }
}
