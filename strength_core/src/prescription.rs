//! Prescription and day resolution.
//!
//! A day resolves prescription by prescription. A missing max or a bad
//! configuration blob only knocks out its own prescription and is reported
//! as a gap; a structural problem (missing day, week or lift) fails the
//! whole resolution.

use crate::database::Database;
use crate::load_strategy::{LoadRequest, LoadStrategy};
use crate::navigator;
use crate::rounding::RoundingPolicy;
use crate::set_scheme::{SetScheme, SetSpec};
use crate::store::Store;
use crate::types::{Day, MaxType, Prescription, Program};
use crate::{Error, Result};
use serde::Serialize;
use uuid::Uuid;

/// A prescription turned into concrete sets
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct ResolvedPrescription {
    pub prescription_id: Uuid,
    pub lift_id: Uuid,
    pub lift_name: String,
    pub order: u32,
    pub weight: f64,
    pub sets: Vec<SetSpec>,
    pub notes: Option<String>,
    pub rest_seconds: Option<u32>,
}

impl ResolvedPrescription {
    /// One-line summary such as "Squat: 5 x 3 @ 100"
    pub fn summary(&self) -> String {
        let amrap = if self.sets.iter().any(|s| s.is_amrap) { "+" } else { "" };
        let reps = self
            .sets
            .last()
            .and_then(|s| s.target_reps)
            .map_or_else(|| "max".to_string(), |r| r.to_string());
        format!(
            "{}: {} x {}{} @ {}",
            self.lift_name,
            self.sets.len(),
            reps,
            amrap,
            self.weight
        )
    }
}

/// Why a prescription could not be resolved
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GapReason {
    MaxNotFound { max_type: MaxType },
    InvalidConfig { message: String },
}

impl std::fmt::Display for GapReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GapReason::MaxNotFound { max_type } => write!(f, "no {} recorded", max_type),
            GapReason::InvalidConfig { message } => write!(f, "invalid configuration: {}", message),
        }
    }
}

/// A prescription left out of a partially resolved day
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct PrescriptionGap {
    pub prescription_id: Uuid,
    pub lift_id: Uuid,
    pub lift_name: String,
    pub order: u32,
    pub reason: GapReason,
}

/// Result of resolving a day: resolved items plus an explicit gap list
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct ResolvedDay {
    pub day_id: Uuid,
    pub day_name: String,
    pub day_slug: String,
    pub week_number: u32,
    pub cycle_iteration: u32,
    pub day_index: u32,
    pub items: Vec<ResolvedPrescription>,
    pub gaps: Vec<PrescriptionGap>,
}

impl ResolvedDay {
    pub fn is_complete(&self) -> bool {
        self.gaps.is_empty()
    }
}

/// Who and where a day is being resolved for
#[derive(Clone, Debug)]
pub struct DayContext<'a> {
    pub user_id: &'a str,
    pub program: &'a Program,
    pub week_number: u32,
    pub cycle_iteration: u32,
    pub day_index: u32,
}

impl<'a> DayContext<'a> {
    fn load_request(&self, lift_id: Uuid, day: &Day) -> LoadRequest<'a> {
        let week_key = self.week_number.to_string();
        LoadRequest {
            user_id: self.user_id,
            lift_id,
            rounding: self.program.default_rounding,
            week_lookup: self
                .program
                .weekly_lookup
                .as_ref()
                .and_then(|t| t.get(&week_key)),
            day_lookup: self
                .program
                .daily_lookup
                .as_ref()
                .and_then(|t| t.get(&day.slug)),
        }
    }
}

/// Resolve one prescription against the user's current maxes
pub fn resolve_prescription(
    db: &Database,
    prescription: &Prescription,
    day: &Day,
    ctx: &DayContext<'_>,
) -> Result<ResolvedPrescription> {
    let lift = db.lift(prescription.lift_id)?;
    let strategy = LoadStrategy::from_blob(&prescription.load_strategy)?;
    let scheme = SetScheme::from_blob(&prescription.set_scheme)?;
    let rounding: RoundingPolicy = ctx.program.default_rounding;

    let request = ctx.load_request(lift.id, day);
    let weight = strategy.resolve(db, &request, scheme.primary_mode(rounding))?;
    let sets = scheme.resolve(weight, rounding);

    Ok(ResolvedPrescription {
        prescription_id: prescription.id,
        lift_id: lift.id,
        lift_name: lift.name.clone(),
        order: prescription.order,
        weight,
        sets,
        notes: prescription.notes.clone(),
        rest_seconds: prescription.rest_seconds,
    })
}

/// Resolve every prescription on a day, collecting per-prescription gaps
pub fn resolve_day(db: &Database, day_id: Uuid, ctx: &DayContext<'_>) -> Result<ResolvedDay> {
    let day = db.day(day_id)?;
    let mut items = Vec::new();
    let mut gaps = Vec::new();

    for prescription in db.prescriptions_for_day(day_id)? {
        match resolve_prescription(db, prescription, day, ctx) {
            Ok(item) => items.push(item),
            Err(e) if e.is_per_prescription() => {
                let lift_name = db.lift(prescription.lift_id)?.name.clone();
                tracing::warn!("Prescription {} ({}) left unresolved: {}", prescription.id, lift_name, e);
                let reason = match e {
                    Error::MaxNotFound { max_type, .. } => GapReason::MaxNotFound { max_type },
                    other => GapReason::InvalidConfig {
                        message: other.to_string(),
                    },
                };
                gaps.push(PrescriptionGap {
                    prescription_id: prescription.id,
                    lift_id: prescription.lift_id,
                    lift_name,
                    order: prescription.order,
                    reason,
                });
            }
            Err(e) => return Err(e),
        }
    }

    tracing::debug!(
        "Resolved day '{}': {} items, {} gaps",
        day.slug,
        items.len(),
        gaps.len()
    );

    Ok(ResolvedDay {
        day_id: day.id,
        day_name: day.name.clone(),
        day_slug: day.slug.clone(),
        week_number: ctx.week_number,
        cycle_iteration: ctx.cycle_iteration,
        day_index: ctx.day_index,
        items,
        gaps,
    })
}

/// Resolve the day the user's enrollment currently points at
pub fn resolve_current_day(db: &Database, user_id: &str) -> Result<ResolvedDay> {
    let enrollment = db.enrollment_for_user(user_id)?;
    let today = navigator::today(db, enrollment)?;
    let ctx = DayContext {
        user_id,
        program: today.program,
        week_number: enrollment.current_week,
        cycle_iteration: enrollment.current_cycle_iteration,
        day_index: enrollment.current_day_index,
    };
    resolve_day(db, today.day.id, &ctx)
}

/// `resolve_current_day` through a store read
pub fn resolve_today<S: Store>(store: &S, user_id: &str) -> Result<ResolvedDay> {
    store.read(|db| resolve_current_day(db, user_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{Fixture, USER};
    use crate::maxes::record_max;
    use crate::types::MaxType;

    #[test]
    fn test_day_resolves_in_configured_order() {
        let fx = Fixture::new();
        record_max(&fx.store, USER, fx.squat, MaxType::TrainingMax, 200.0, fx.date()).unwrap();
        record_max(&fx.store, USER, fx.bench, MaxType::TrainingMax, 100.0, fx.date()).unwrap();

        let day = resolve_today(&fx.store, USER).unwrap();
        assert!(day.is_complete());
        let lifts: Vec<_> = day.items.iter().map(|i| i.lift_id).collect();
        assert_eq!(lifts, vec![fx.squat, fx.bench, fx.row]);

        // 85% of 200, 5 x 3
        assert_eq!(day.items[0].weight, 170.0);
        assert_eq!(day.items[0].sets.len(), 5);
        // Fixed weight row ignores maxes entirely
        assert_eq!(day.items[2].weight, 60.0);
    }

    #[test]
    fn test_missing_max_is_a_gap_not_a_failure() {
        let fx = Fixture::new();
        record_max(&fx.store, USER, fx.squat, MaxType::TrainingMax, 200.0, fx.date()).unwrap();

        let day = resolve_today(&fx.store, USER).unwrap();
        assert!(!day.is_complete());
        assert_eq!(day.items.len(), 2);
        assert_eq!(day.gaps.len(), 1);
        assert_eq!(day.gaps[0].lift_id, fx.bench);
        assert_eq!(
            day.gaps[0].reason,
            GapReason::MaxNotFound {
                max_type: MaxType::TrainingMax
            }
        );
    }

    #[test]
    fn test_unenrolled_user_fails() {
        let fx = Fixture::new();
        let err = resolve_today(&fx.store, "stranger").unwrap_err();
        assert!(matches!(err, Error::EnrollmentNotFound(_)));
    }

    #[test]
    fn test_summary_line() {
        let item = ResolvedPrescription {
            prescription_id: Uuid::nil(),
            lift_id: Uuid::nil(),
            lift_name: "Squat".into(),
            order: 0,
            weight: 100.0,
            sets: vec![
                SetSpec {
                    weight: 100.0,
                    target_reps: Some(3),
                    is_amrap: false,
                },
                SetSpec {
                    weight: 100.0,
                    target_reps: Some(3),
                    is_amrap: true,
                },
            ],
            notes: None,
            rest_seconds: None,
        };
        assert_eq!(item.summary(), "Squat: 2 x 3+ @ 100");
    }
}
