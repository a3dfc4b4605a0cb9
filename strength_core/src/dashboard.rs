//! Read-only dashboard query.

use crate::database::{LoggedSetFilter, SessionCounts};
use crate::maxes::{max_snapshot, MaxSnapshotEntry};
use crate::prescription::{resolve_current_day, ResolvedDay};
use crate::set_scheme::SetScheme;
use crate::store::Store;
use crate::types::WorkoutSession;
use crate::Result;
use serde::Serialize;

/// Duration estimate knobs, from `[dashboard]` in the config
#[derive(Clone, Copy, Debug)]
pub struct EstimateSettings {
    pub seconds_per_set: u32,
    /// Used for prescriptions without their own rest time
    pub default_rest_seconds: u32,
}

impl Default for EstimateSettings {
    fn default() -> Self {
        Self {
            seconds_per_set: 45,
            default_rest_seconds: 120,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Dashboard {
    pub user_id: String,
    pub program: Option<String>,
    /// The next day, or why it could not be resolved
    pub next_day: std::result::Result<ResolvedDay, String>,
    pub estimated_minutes: Option<u32>,
    pub maxes: Vec<MaxSnapshotEntry>,
    pub sessions: SessionCounts,
    pub logged_sets: usize,
    pub active_session: Option<WorkoutSession>,
}

/// Estimated seconds for a resolved day, counting sets through the same scheme rules
fn estimate_day_seconds<S: Store>(store: &S, day: &ResolvedDay, settings: EstimateSettings) -> Result<u32> {
    store.read(|db| {
        let mut total: u32 = 0;
        for item in &day.items {
            let prescription = db.prescription(item.prescription_id)?;
            let scheme = SetScheme::from_blob(&prescription.set_scheme)?;
            let rest = item.rest_seconds.unwrap_or(settings.default_rest_seconds);
            total = total.saturating_add(scheme.estimate_seconds(rest, settings.seconds_per_set));
        }
        Ok(total)
    })
}

/// Gather everything the dashboard shows for one user
pub fn dashboard<S: Store>(store: &S, user_id: &str, settings: EstimateSettings) -> Result<Dashboard> {
    let mut dash = store.read(|db| {
        let enrollment = db.enrollment_for_user(user_id).ok();
        let program = match enrollment {
            Some(e) => Some(db.program(e.program_id)?.name.clone()),
            None => None,
        };

        Ok(Dashboard {
            user_id: user_id.to_string(),
            program,
            next_day: resolve_current_day(db, user_id).map_err(|e| e.to_string()),
            estimated_minutes: None,
            maxes: max_snapshot(db, user_id)?,
            sessions: db.session_counts(user_id),
            logged_sets: db
                .logged_sets(&LoggedSetFilter {
                    user_id: Some(user_id.to_string()),
                    ..Default::default()
                })
                .len(),
            active_session: enrollment.and_then(|e| db.active_session(e.id)).cloned(),
        })
    })?;

    if let Ok(day) = &dash.next_day {
        let seconds = estimate_day_seconds(store, day, settings)?;
        dash.estimated_minutes = Some(seconds.div_ceil(60));
    }

    tracing::debug!("Built dashboard for '{}'", user_id);
    Ok(dash)
}
