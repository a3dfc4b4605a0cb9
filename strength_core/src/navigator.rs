//! Program navigation: where an enrollment is, and how it moves.
//!
//! The position `(week, cycle_iteration, day_index)` is a two-modulus ring
//! counter. The day index wraps at the number of days in the current week,
//! the week wraps at the cycle length, and each week wrap past the last
//! week bumps the cycle iteration.

use crate::database::Database;
use crate::store::Store;
use crate::types::{AdvanceOutcome, Cycle, Day, Enrollment, Program, Week, WeekDay};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An enrollment's position in its program
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Position {
    pub week: u32,
    pub cycle_iteration: u32,
    pub day_index: u32,
}

impl Position {
    pub fn start() -> Self {
        Self {
            week: 1,
            cycle_iteration: 1,
            day_index: 0,
        }
    }
}

impl From<&Enrollment> for Position {
    fn from(e: &Enrollment) -> Self {
        Self {
            week: e.current_week,
            cycle_iteration: e.current_cycle_iteration,
            day_index: e.current_day_index,
        }
    }
}

/// Advance the ring counter by one training day
pub fn advance_position(pos: Position, days_in_week: u32, length_weeks: u32) -> (Position, AdvanceOutcome) {
    let mut next = pos;
    let mut outcome = AdvanceOutcome::default();

    next.day_index += 1;
    if next.day_index >= days_in_week {
        next.day_index = 0;
        next.week += 1;
        outcome.week_completed = true;

        if next.week > length_weeks {
            next.week = 1;
            next.cycle_iteration += 1;
            outcome.cycle_completed = true;
        }
    }

    (next, outcome)
}

/// Everything pointed at by an enrollment's current position
#[derive(Debug)]
pub struct Today<'a> {
    pub program: &'a Program,
    pub cycle: &'a Cycle,
    pub week: &'a Week,
    pub week_day: &'a WeekDay,
    pub day: &'a Day,
    pub days_in_week: u32,
}

/// Resolve the Day an enrollment points at
pub fn today<'a>(db: &'a Database, enrollment: &Enrollment) -> Result<Today<'a>> {
    let program = db.program(enrollment.program_id)?;
    let cycle = db.cycle(program.cycle_id)?;
    let week = db.week(cycle.id, enrollment.current_week)?;
    let bindings = db.week_days(week.id);

    let week_day = bindings
        .get(enrollment.current_day_index as usize)
        .copied()
        .ok_or_else(|| {
            Error::DayNotFound(format!(
                "day index {} in week {} ({} days)",
                enrollment.current_day_index,
                week.week_number,
                bindings.len()
            ))
        })?;
    let day = db.day(week_day.day_id)?;

    Ok(Today {
        program,
        cycle,
        week,
        week_day,
        day,
        days_in_week: bindings.len() as u32,
    })
}

/// Move an enrollment to its next training day inside an open transaction
pub fn advance(db: &mut Database, enrollment_id: Uuid, now: DateTime<Utc>) -> Result<AdvanceOutcome> {
    let mut enrollment = db.enrollment(enrollment_id)?.clone();
    let program = db.program(enrollment.program_id)?;
    let cycle = db.cycle(program.cycle_id)?;
    let week = db.week(cycle.id, enrollment.current_week)?;
    let days_in_week = db.week_days(week.id).len() as u32;
    let length_weeks = cycle.length_weeks;

    let (next, outcome) = advance_position(Position::from(&enrollment), days_in_week, length_weeks);
    enrollment.current_week = next.week;
    enrollment.current_cycle_iteration = next.cycle_iteration;
    enrollment.current_day_index = next.day_index;
    enrollment.updated_at = now;

    tracing::info!(
        "Advanced enrollment {} to week {} day {} (cycle {})",
        enrollment.id,
        next.week,
        next.day_index,
        next.cycle_iteration
    );
    db.update_enrollment(enrollment)?;
    Ok(outcome)
}

/// Enroll a user in a program at its first day, replacing any prior enrollment
pub fn enroll<S: Store>(store: &S, user_id: &str, program_id: Uuid, now: DateTime<Utc>) -> Result<Enrollment> {
    store.transaction(|db| {
        db.program(program_id)?;

        if let Ok(existing) = db.enrollment_for_user(user_id) {
            if let Some(active) = db.active_session(existing.id) {
                return Err(Error::SessionAlreadyActive {
                    enrollment: active.enrollment_id,
                });
            }
        }

        let start = Position::start();
        let enrollment = Enrollment {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            program_id,
            current_week: start.week,
            current_cycle_iteration: start.cycle_iteration,
            current_day_index: start.day_index,
            enrolled_at: now,
            updated_at: now,
        };

        if let Some(previous) = db.put_enrollment(enrollment.clone()) {
            tracing::info!("Replaced enrollment {} for user '{}'", previous.id, user_id);
        }
        tracing::info!("Enrolled '{}' in program {}", user_id, program_id);
        Ok(enrollment)
    })
}

/// Remove a user's enrollment; fails while a session is in progress
pub fn unenroll<S: Store>(store: &S, user_id: &str) -> Result<Enrollment> {
    store.transaction(|db| {
        let id = db.enrollment_for_user(user_id)?.id;
        if db.active_session(id).is_some() {
            return Err(Error::SessionAlreadyActive { enrollment: id });
        }
        db.remove_enrollment(id)
            .ok_or_else(|| Error::EnrollmentNotFound(user_id.to_string()))
    })
}

pub fn enrollment_for_user<S: Store>(store: &S, user_id: &str) -> Result<Enrollment> {
    store.read(|db| db.enrollment_for_user(user_id).cloned())
}
