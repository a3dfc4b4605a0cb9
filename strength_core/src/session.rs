//! Workout sessions: start, log, complete, abandon.
//!
//! A session moves `in_progress -> completed` or `in_progress -> abandoned`
//! and never again. The one-active-session-per-enrollment rule is enforced
//! by the store's unique index inside the start transaction.

use crate::database::{Database, LoggedSetFilter};
use crate::engine::{apply_session_progressions, AppliedProgression};
use crate::navigator;
use crate::store::Store;
use crate::types::{LoggedSet, NewLoggedSet, SessionStatus, WorkoutSession};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// What completing (or reapplying) a session produced
#[derive(Clone, Debug, Serialize)]
pub struct SessionSummary {
    pub session: WorkoutSession,
    pub logged_sets: usize,
    pub progressions: Vec<AppliedProgression>,
}

impl SessionSummary {
    pub fn skipped(&self) -> impl Iterator<Item = &AppliedProgression> {
        self.progressions.iter().filter(|p| !p.is_applied())
    }
}

/// Fetch a session owned by `user_id`
fn owned_session<'a>(db: &'a Database, user_id: &str, session_id: Uuid) -> Result<&'a WorkoutSession> {
    let session = db.session(session_id)?;
    if session.user_id != user_id {
        return Err(Error::NotFound(format!("session {}", session_id)));
    }
    Ok(session)
}

fn require_in_progress(session: &WorkoutSession) -> Result<()> {
    if session.status.is_terminal() {
        return Err(Error::InvalidSessionTransition {
            session: session.id,
            status: session.status.to_string(),
        });
    }
    Ok(())
}

/// Start a session on the enrollment's current day
pub fn start_session<S: Store>(store: &S, user_id: &str, now: DateTime<Utc>) -> Result<WorkoutSession> {
    store.transaction(|db| {
        let enrollment = db.enrollment_for_user(user_id)?.clone();
        let day_id = navigator::today(db, &enrollment)?.day.id;

        let session = WorkoutSession {
            id: Uuid::new_v4(),
            enrollment_id: enrollment.id,
            user_id: user_id.to_string(),
            week_number: enrollment.current_week,
            cycle_iteration: enrollment.current_cycle_iteration,
            day_index: enrollment.current_day_index,
            day_id: Some(day_id),
            status: SessionStatus::InProgress,
            started_at: now,
            finished_at: None,
            advance: None,
        };
        db.insert_session(session.clone())?;

        tracing::info!(
            "Started session {} for '{}' (week {}, day {})",
            session.id,
            user_id,
            session.week_number,
            session.day_index
        );
        Ok(session)
    })
}

fn validate_new_set(db: &Database, input: &NewLoggedSet) -> Result<()> {
    if !input.weight.is_finite() || input.weight < 0.0 {
        return Err(Error::Validation(format!("weight must be non-negative, got {}", input.weight)));
    }
    if let Some(rpe) = input.rpe {
        if !(1.0..=10.0).contains(&rpe) {
            return Err(Error::Validation(format!("RPE must be between 1 and 10, got {}", rpe)));
        }
    }
    db.lift(input.lift_id)?;
    if let Some(prescription_id) = input.prescription_id {
        let prescription = db.prescription(prescription_id)?;
        if prescription.lift_id != input.lift_id {
            return Err(Error::Validation(format!(
                "prescription {} is for a different lift",
                prescription_id
            )));
        }
    }
    Ok(())
}

/// Append a set inside an open transaction; set numbers count per lift from 1
fn insert_set(db: &mut Database, session_id: Uuid, input: NewLoggedSet, now: DateTime<Utc>) -> Result<LoggedSet> {
    validate_new_set(db, &input)?;

    let previous = db
        .logged_sets(&LoggedSetFilter {
            session_id: Some(session_id),
            lift_id: Some(input.lift_id),
            ..Default::default()
        })
        .len() as u32;

    let set = LoggedSet {
        id: Uuid::new_v4(),
        session_id,
        prescription_id: input.prescription_id,
        lift_id: input.lift_id,
        set_number: previous + 1,
        weight: input.weight,
        target_reps: input.target_reps,
        reps_performed: input.reps_performed,
        is_amrap: input.is_amrap,
        rpe: input.rpe,
        created_at: now,
    };
    db.insert_logged_set(set.clone());
    Ok(set)
}

/// Log one performed set against an in-progress session
pub fn log_set<S: Store>(
    store: &S,
    user_id: &str,
    session_id: Uuid,
    input: NewLoggedSet,
    now: DateTime<Utc>,
) -> Result<LoggedSet> {
    store.transaction(|db| {
        require_in_progress(owned_session(db, user_id, session_id)?)?;
        let set = insert_set(db, session_id, input, now)?;
        tracing::debug!(
            "Logged set {} for lift {}: {} x {}",
            set.set_number,
            set.lift_id,
            set.weight,
            set.reps_performed
        );
        Ok(set)
    })
}

/// Complete a session, advance the enrollment, then run progressions
///
/// The extra sets, the status change and the enrollment advance commit
/// together. Progressions run afterwards, one transaction per binding.
pub fn complete_session<S: Store>(
    store: &S,
    user_id: &str,
    session_id: Uuid,
    extra_sets: Vec<NewLoggedSet>,
    finished_at: DateTime<Utc>,
) -> Result<SessionSummary> {
    let (session, logged_sets) = store.transaction(|db| {
        let session = owned_session(db, user_id, session_id)?.clone();
        require_in_progress(&session)?;
        if finished_at < session.started_at {
            return Err(Error::Validation("finished_at is before started_at".into()));
        }

        for input in extra_sets {
            insert_set(db, session_id, input, finished_at)?;
        }

        let advance = navigator::advance(db, session.enrollment_id, finished_at)?;
        let session = db.finish_session(session_id, SessionStatus::Completed, finished_at, Some(advance))?;
        let logged_sets = db
            .logged_sets(&LoggedSetFilter {
                session_id: Some(session_id),
                ..Default::default()
            })
            .len();
        Ok((session, logged_sets))
    })?;

    tracing::info!("Completed session {} with {} sets", session.id, logged_sets);
    let progressions = apply_session_progressions(store, session_id)?;

    for skipped in progressions.iter().filter(|p| !p.is_applied()) {
        tracing::warn!("{}", skipped.describe());
    }

    Ok(SessionSummary {
        session,
        logged_sets,
        progressions,
    })
}

/// Abandon a session; no progression runs and the enrollment stays put
pub fn abandon_session<S: Store>(
    store: &S,
    user_id: &str,
    session_id: Uuid,
    finished_at: DateTime<Utc>,
) -> Result<WorkoutSession> {
    store.transaction(|db| {
        owned_session(db, user_id, session_id)?;
        let session = db.finish_session(session_id, SessionStatus::Abandoned, finished_at, None)?;
        tracing::info!("Abandoned session {}", session_id);
        Ok(session)
    })
}

/// Re-run progressions for a completed session; already applied bindings are skipped
pub fn reapply_progressions<S: Store>(store: &S, user_id: &str, session_id: Uuid) -> Result<SessionSummary> {
    let (session, logged_sets) = store.read(|db| {
        let session = owned_session(db, user_id, session_id)?.clone();
        let count = db
            .logged_sets(&LoggedSetFilter {
                session_id: Some(session_id),
                ..Default::default()
            })
            .len();
        Ok((session, count))
    })?;

    let progressions = apply_session_progressions(store, session_id)?;
    Ok(SessionSummary {
        session,
        logged_sets,
        progressions,
    })
}

/// The user's in-progress session, if any
pub fn active_session<S: Store>(store: &S, user_id: &str) -> Result<Option<WorkoutSession>> {
    store.read(|db| {
        let enrollment = match db.enrollment_for_user(user_id) {
            Ok(e) => e,
            Err(Error::EnrollmentNotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        Ok(db.active_session(enrollment.id).cloned())
    })
}

pub fn logged_sets_for<S: Store>(store: &S, user_id: &str, session_id: Uuid) -> Result<Vec<LoggedSet>> {
    store.read(|db| {
        owned_session(db, user_id, session_id)?;
        Ok(db
            .logged_sets(&LoggedSetFilter {
                session_id: Some(session_id),
                ..Default::default()
            })
            .into_iter()
            .cloned()
            .collect())
    })
}
