//! Set schemes: turning a working weight into concrete sets.
//!
//! `resolve` expands a scheme into the sets shown to the lifter. `set_count`
//! matches on the same variants to size the dashboard's duration estimate
//! without building the sets.

use crate::blob::ConfigBlob;
use crate::rounding::{apply_percent, RoundingMode, RoundingPolicy};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Upper bound on sets a single prescription may produce
pub const MAX_SETS: u32 = 100;

/// One concrete set to perform
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SetSpec {
    pub weight: f64,
    /// None for sets with no per-set target (MRS, total-reps placeholders)
    pub target_reps: Option<u32>,
    pub is_amrap: bool,
}

/// `sets` x `reps` at the working weight
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Fixed {
    pub sets: u32,
    pub reps: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RampStep {
    /// Fraction of the working weight
    pub percent: f64,
    pub reps: u32,
}

/// Ascending steps computed from the working weight
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Ramp {
    pub steps: Vec<RampStep>,
    #[serde(default)]
    pub last_amrap: bool,
}

/// Constant weight with reps dropping each set
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FatigueDrop {
    pub initial_reps: u32,
    pub drop_reps: u32,
    pub num_sets: u32,
}

/// Max-rep sets: every set taken to near failure
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Mrs {
    pub sets: u32,
}

/// Accumulate `target_total` reps in at most `set_cap` sets
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TotalReps {
    pub target_total: u32,
    pub set_cap: u32,
}

/// Fixed sets followed by one AMRAP set
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Amrap {
    #[serde(default)]
    pub sets_before: u32,
    pub working_reps: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub enum SchemeVariant {
    Fixed(Fixed),
    Ramp(Ramp),
    FatigueDrop(FatigueDrop),
    Mrs(Mrs),
    TotalReps(TotalReps),
    Amrap(Amrap),
}

/// Decoded set scheme plus its optional rounding override
#[derive(Clone, Debug, PartialEq)]
pub struct SetScheme {
    pub variant: SchemeVariant,
    /// Overrides the program's rounding mode for the working weight
    pub rounding: Option<RoundingMode>,
}

#[derive(Debug, Default, Deserialize)]
struct CommonParams {
    #[serde(default)]
    rounding: Option<RoundingMode>,
}

impl From<SchemeVariant> for SetScheme {
    fn from(variant: SchemeVariant) -> Self {
        Self {
            variant,
            rounding: None,
        }
    }
}

impl SetScheme {
    pub const FIXED: &'static str = "fixed";
    pub const RAMP: &'static str = "ramp";
    pub const FATIGUE_DROP: &'static str = "fatigue_drop";
    pub const MRS: &'static str = "mrs";
    pub const TOTAL_REPS: &'static str = "total_reps";
    pub const AMRAP: &'static str = "amrap";

    pub fn from_blob(blob: &ConfigBlob) -> Result<Self> {
        let variant = match (blob.kind.as_str(), blob.version) {
            (Self::FIXED, 1) => SchemeVariant::Fixed(blob.decode()?),
            (Self::RAMP, 1) => SchemeVariant::Ramp(blob.decode()?),
            (Self::FATIGUE_DROP, 1) => SchemeVariant::FatigueDrop(blob.decode()?),
            (Self::MRS, 1) => SchemeVariant::Mrs(blob.decode()?),
            (Self::TOTAL_REPS, 1) => SchemeVariant::TotalReps(blob.decode()?),
            (Self::AMRAP, 1) => SchemeVariant::Amrap(blob.decode()?),
            _ => return Err(blob.unsupported("set scheme")),
        };
        let common: CommonParams = blob.decode()?;

        let scheme = SetScheme {
            variant,
            rounding: common.rounding,
        };
        scheme.validate()?;
        Ok(scheme)
    }

    pub fn to_blob(&self) -> Result<ConfigBlob> {
        let mut blob = match &self.variant {
            SchemeVariant::Fixed(p) => ConfigBlob::encode(Self::FIXED, 1, p)?,
            SchemeVariant::Ramp(p) => ConfigBlob::encode(Self::RAMP, 1, p)?,
            SchemeVariant::FatigueDrop(p) => ConfigBlob::encode(Self::FATIGUE_DROP, 1, p)?,
            SchemeVariant::Mrs(p) => ConfigBlob::encode(Self::MRS, 1, p)?,
            SchemeVariant::TotalReps(p) => ConfigBlob::encode(Self::TOTAL_REPS, 1, p)?,
            SchemeVariant::Amrap(p) => ConfigBlob::encode(Self::AMRAP, 1, p)?,
        };
        if let Some(mode) = self.rounding {
            blob.params
                .insert("rounding".into(), serde_json::to_value(mode)?);
        }
        Ok(blob)
    }

    pub fn validate(&self) -> Result<()> {
        let problem = match &self.variant {
            _ if self.set_count() > MAX_SETS => Some(format!(
                "scheme produces {} sets, at most {} allowed",
                self.set_count(),
                MAX_SETS
            )),
            SchemeVariant::Fixed(p) if p.sets == 0 || p.reps == 0 => {
                Some("fixed scheme needs at least one set of one rep".to_string())
            }
            SchemeVariant::Ramp(p) if p.steps.is_empty() => {
                Some("ramp scheme has no steps".to_string())
            }
            SchemeVariant::Ramp(p) => p
                .steps
                .iter()
                .find(|s| !(s.percent > 0.0 && s.percent <= 2.0) || s.reps == 0)
                .map(|s| format!("ramp step {}% x {} is out of range", s.percent * 100.0, s.reps)),
            SchemeVariant::FatigueDrop(p) if p.num_sets == 0 || p.initial_reps == 0 => {
                Some("fatigue drop needs at least one set of one rep".to_string())
            }
            SchemeVariant::Mrs(p) if p.sets == 0 => Some("MRS scheme needs at least one set".to_string()),
            SchemeVariant::TotalReps(p) if p.target_total == 0 || p.set_cap == 0 => {
                Some("total reps scheme needs a positive target and set cap".to_string())
            }
            SchemeVariant::Amrap(p) if p.working_reps == 0 => {
                Some("AMRAP scheme needs a positive rep target".to_string())
            }
            _ => None,
        };

        match problem {
            Some(msg) => Err(Error::InvalidConfig(msg)),
            None => Ok(()),
        }
    }

    /// Rounding mode for the working weight
    pub fn primary_mode(&self, program_default: RoundingPolicy) -> RoundingMode {
        self.rounding.unwrap_or(program_default.mode)
    }

    /// Expand the working weight into ordered sets
    pub fn resolve(&self, working_weight: f64, rounding: RoundingPolicy) -> Vec<SetSpec> {
        let at_weight = |target_reps: Option<u32>, is_amrap: bool| SetSpec {
            weight: working_weight,
            target_reps,
            is_amrap,
        };

        match &self.variant {
            SchemeVariant::Fixed(p) => (0..p.sets).map(|_| at_weight(Some(p.reps), false)).collect(),

            SchemeVariant::Ramp(p) => {
                let last = p.steps.len().saturating_sub(1);
                let primary = self.primary_mode(rounding);
                p.steps
                    .iter()
                    .enumerate()
                    .map(|(i, step)| {
                        let mode = if i == last { primary } else { RoundingMode::Floor };
                        SetSpec {
                            weight: apply_percent(working_weight, step.percent, rounding.increment, mode),
                            target_reps: Some(step.reps),
                            is_amrap: i == last && p.last_amrap,
                        }
                    })
                    .collect()
            }

            SchemeVariant::FatigueDrop(p) => (0..p.num_sets)
                .map(|i| {
                    let reps = p
                        .initial_reps
                        .saturating_sub(p.drop_reps.saturating_mul(i))
                        .max(1);
                    at_weight(Some(reps), false)
                })
                .collect(),

            SchemeVariant::Mrs(p) => (0..p.sets).map(|_| at_weight(None, true)).collect(),

            SchemeVariant::TotalReps(p) => (0..p.set_cap).map(|_| at_weight(None, false)).collect(),

            SchemeVariant::Amrap(p) => (0..p.sets_before)
                .map(|_| at_weight(Some(p.working_reps), false))
                .chain(std::iter::once(at_weight(Some(p.working_reps), true)))
                .collect(),
        }
    }

    /// Number of sets `resolve` produces
    pub fn set_count(&self) -> u32 {
        match &self.variant {
            SchemeVariant::Fixed(p) => p.sets,
            SchemeVariant::Ramp(p) => u32::try_from(p.steps.len()).unwrap_or(u32::MAX),
            SchemeVariant::FatigueDrop(p) => p.num_sets,
            SchemeVariant::Mrs(p) => p.sets,
            SchemeVariant::TotalReps(p) => p.set_cap,
            SchemeVariant::Amrap(p) => p.sets_before.saturating_add(1),
        }
    }

    /// Rough session time for this scheme: work time per set plus rest between sets
    pub fn estimate_seconds(&self, rest_seconds: u32, seconds_per_set: u32) -> u32 {
        let sets = self.set_count();
        sets.saturating_mul(seconds_per_set)
            .saturating_add(sets.saturating_sub(1).saturating_mul(rest_seconds))
    }

    /// Total reps targeted, where the scheme has one
    pub fn volume_target(&self) -> Option<u32> {
        match &self.variant {
            SchemeVariant::TotalReps(p) => Some(p.target_total),
            SchemeVariant::Mrs(_) => None,
            _ => Some(
                self.resolve(0.0, RoundingPolicy::default())
                    .iter()
                    .filter_map(|s| s.target_reps)
                    .fold(0u32, u32::saturating_add),
            ),
        }
    }
}
