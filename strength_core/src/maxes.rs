//! Lift max bookkeeping.
//!
//! Two distinct notions of "current max" live here and must stay distinct:
//! - `current_max_exact`: the most recent row of exactly the requested type.
//!   Load strategies use this and nothing else.
//! - `current_max_for_display`: the most recent row of any type, preferring
//!   TRAINING_MAX when dates tie. Dashboards use this.

use crate::database::Database;
use crate::load_strategy::MaxLookup;
use crate::store::Store;
use crate::types::{LiftMax, MaxType};
use crate::{Error, Result};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeSet;
use uuid::Uuid;

/// Record a max; a ONE_RM also seeds a TRAINING_MAX at the same date
///
/// Returns every row written (one or two).
pub fn record_max<S: Store>(
    store: &S,
    user_id: &str,
    lift_id: Uuid,
    max_type: MaxType,
    value: f64,
    effective_date: NaiveDate,
) -> Result<Vec<LiftMax>> {
    if !value.is_finite() || value <= 0.0 {
        return Err(Error::Validation(format!("max must be positive, got {}", value)));
    }

    store.transaction(|db| {
        db.lift(lift_id)?;

        let mut written = vec![db.upsert_max(LiftMax {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            lift_id,
            max_type,
            value,
            effective_date,
        })];

        if max_type == MaxType::OneRm
            && !db.max_exists(user_id, lift_id, MaxType::TrainingMax, effective_date)
        {
            written.push(db.upsert_max(LiftMax {
                id: Uuid::new_v4(),
                user_id: user_id.to_string(),
                lift_id,
                max_type: MaxType::TrainingMax,
                value,
                effective_date,
            }));
            tracing::debug!("Mirrored one_rm {} into training_max for lift {}", value, lift_id);
        }

        tracing::info!("Recorded {} {} for lift {} on {}", max_type, value, lift_id, effective_date);
        Ok(written)
    })
}

/// Most recent max of exactly `max_type`
pub fn current_max_exact(db: &Database, user_id: &str, lift_id: Uuid, max_type: MaxType) -> Option<LiftMax> {
    db.maxes_for(user_id, Some(lift_id))
        .into_iter()
        .filter(|m| m.max_type == max_type)
        .max_by_key(|m| m.effective_date)
        .cloned()
}

/// Most recent max of any type; TRAINING_MAX wins a date tie
pub fn current_max_for_display(db: &Database, user_id: &str, lift_id: Uuid) -> Option<LiftMax> {
    db.maxes_for(user_id, Some(lift_id))
        .into_iter()
        .max_by_key(|m| (m.effective_date, m.max_type == MaxType::TrainingMax))
        .cloned()
}

/// One line of the per-lift max snapshot
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct MaxSnapshotEntry {
    pub lift_id: Uuid,
    pub lift_name: String,
    pub max: LiftMax,
}

/// Display max for every lift the user has a max for, ordered by lift name
pub fn max_snapshot(db: &Database, user_id: &str) -> Result<Vec<MaxSnapshotEntry>> {
    let lifts: BTreeSet<Uuid> = db.maxes_for(user_id, None).iter().map(|m| m.lift_id).collect();

    let mut entries = Vec::with_capacity(lifts.len());
    for lift_id in lifts {
        if let Some(max) = current_max_for_display(db, user_id, lift_id) {
            entries.push(MaxSnapshotEntry {
                lift_id,
                lift_name: db.lift(lift_id)?.name.clone(),
                max,
            });
        }
    }
    entries.sort_by(|a, b| a.lift_name.cmp(&b.lift_name));
    Ok(entries)
}

/// Every recorded max for one lift, oldest first
pub fn max_history(db: &Database, user_id: &str, lift_id: Uuid) -> Vec<LiftMax> {
    db.maxes_for(user_id, Some(lift_id)).into_iter().cloned().collect()
}

impl MaxLookup for Database {
    fn current_max(&self, user_id: &str, lift_id: Uuid, max_type: MaxType) -> Result<Option<f64>> {
        Ok(current_max_exact(self, user_id, lift_id, max_type).map(|m| m.value))
    }
}
