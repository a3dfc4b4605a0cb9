//! Tables and queries of the persistent store.
//!
//! `Database` is the whole persisted document. Every mutation goes through a
//! method here so uniqueness constraints hold no matter which caller writes:
//! - one IN_PROGRESS session per enrollment
//! - one enrollment per user
//! - one max per (user, lift, type, effective_date)
//! - one ledger row per progression idempotency key
//!
//! Callers only ever see a `Database` inside a `Store` read or transaction.

use crate::types::*;
use crate::{Error, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

pub const SCHEMA_VERSION: u32 = 1;

/// Filter for logged set queries; unset fields match everything
#[derive(Clone, Debug, Default)]
pub struct LoggedSetFilter {
    pub session_id: Option<Uuid>,
    pub lift_id: Option<Uuid>,
    pub user_id: Option<UserId>,
}

/// Filter for ledger queries; unset fields match everything
#[derive(Clone, Debug, Default)]
pub struct ProgressionLogFilter {
    pub user_id: Option<UserId>,
    pub lift_id: Option<Uuid>,
    pub progression_id: Option<Uuid>,
    pub limit: Option<usize>,
}

/// Session totals for one user
#[derive(Clone, Debug, Default, Serialize, PartialEq, Eq)]
pub struct SessionCounts {
    pub in_progress: usize,
    pub completed: usize,
    pub abandoned: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Database {
    #[serde(default = "current_schema")]
    schema_version: u32,
    #[serde(default)]
    lifts: BTreeMap<Uuid, Lift>,
    #[serde(default)]
    lift_maxes: Vec<LiftMax>,
    #[serde(default)]
    prescriptions: BTreeMap<Uuid, Prescription>,
    #[serde(default)]
    days: BTreeMap<Uuid, Day>,
    #[serde(default)]
    day_prescriptions: Vec<DayPrescription>,
    #[serde(default)]
    cycles: BTreeMap<Uuid, Cycle>,
    #[serde(default)]
    weeks: BTreeMap<Uuid, Week>,
    #[serde(default)]
    week_days: Vec<WeekDay>,
    #[serde(default)]
    programs: BTreeMap<Uuid, Program>,
    #[serde(default)]
    enrollments: BTreeMap<Uuid, Enrollment>,
    #[serde(default)]
    sessions: BTreeMap<Uuid, WorkoutSession>,
    /// Unique index: enrollment -> its IN_PROGRESS session
    #[serde(default)]
    active_sessions: BTreeMap<Uuid, Uuid>,
    #[serde(default)]
    logged_sets: Vec<LoggedSet>,
    #[serde(default)]
    progressions: BTreeMap<Uuid, Progression>,
    #[serde(default)]
    program_progressions: BTreeMap<Uuid, ProgramProgression>,
    #[serde(default)]
    progression_states: Vec<UserProgressionState>,
    #[serde(default)]
    failure_counters: Vec<FailureCounter>,
    #[serde(default)]
    progression_logs: Vec<ProgressionLog>,
    /// Unique index over ledger idempotency keys, rebuilt on load
    #[serde(skip)]
    log_keys: BTreeSet<IdempotencyKey>,
}

fn current_schema() -> u32 {
    SCHEMA_VERSION
}

impl Default for Database {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            lifts: BTreeMap::new(),
            lift_maxes: Vec::new(),
            prescriptions: BTreeMap::new(),
            days: BTreeMap::new(),
            day_prescriptions: Vec::new(),
            cycles: BTreeMap::new(),
            weeks: BTreeMap::new(),
            week_days: Vec::new(),
            programs: BTreeMap::new(),
            enrollments: BTreeMap::new(),
            sessions: BTreeMap::new(),
            active_sessions: BTreeMap::new(),
            logged_sets: Vec::new(),
            progressions: BTreeMap::new(),
            program_progressions: BTreeMap::new(),
            progression_states: Vec::new(),
            failure_counters: Vec::new(),
            progression_logs: Vec::new(),
            log_keys: BTreeSet::new(),
        }
    }
}

impl Database {
    /// Parse a persisted document and rebuild derived indexes
    pub fn from_json(contents: &str) -> Result<Self> {
        let mut db: Database = serde_json::from_str(contents)?;
        if db.schema_version > SCHEMA_VERSION {
            return Err(Error::Store(format!(
                "store schema version {} is newer than supported version {}",
                db.schema_version, SCHEMA_VERSION
            )));
        }
        db.rebuild_indexes();
        Ok(db)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    fn rebuild_indexes(&mut self) {
        self.log_keys = self.progression_logs.iter().map(ProgressionLog::key).collect();
        self.active_sessions = self
            .sessions
            .values()
            .filter(|s| s.status == SessionStatus::InProgress)
            .map(|s| (s.enrollment_id, s.id))
            .collect();
    }

    // ------------------------------------------------------------------
    // Lifts
    // ------------------------------------------------------------------

    pub fn insert_lift(&mut self, lift: Lift) -> Result<()> {
        if self.lift_by_slug(&lift.slug).is_some() {
            return Err(Error::Validation(format!("lift slug '{}' already exists", lift.slug)));
        }
        if let Some(parent) = lift.parent_id {
            self.lift(parent)?;
        }
        self.lifts.insert(lift.id, lift);
        Ok(())
    }

    pub fn lift(&self, id: Uuid) -> Result<&Lift> {
        self.lifts
            .get(&id)
            .ok_or_else(|| Error::NotFound(format!("lift {}", id)))
    }

    pub fn lift_by_slug(&self, slug: &str) -> Option<&Lift> {
        self.lifts.values().find(|l| l.slug == slug)
    }

    pub fn lifts(&self) -> impl Iterator<Item = &Lift> {
        self.lifts.values()
    }

    // ------------------------------------------------------------------
    // Lift maxes
    // ------------------------------------------------------------------

    /// Insert or replace the max for its (user, lift, type, date) key
    pub fn upsert_max(&mut self, max: LiftMax) -> LiftMax {
        if let Some(existing) = self.lift_maxes.iter_mut().find(|m| {
            m.user_id == max.user_id
                && m.lift_id == max.lift_id
                && m.max_type == max.max_type
                && m.effective_date == max.effective_date
        }) {
            existing.value = max.value;
            return existing.clone();
        }
        self.lift_maxes.push(max.clone());
        max
    }

    pub fn max_exists(&self, user_id: &str, lift_id: Uuid, max_type: MaxType, date: NaiveDate) -> bool {
        self.lift_maxes.iter().any(|m| {
            m.user_id == user_id && m.lift_id == lift_id && m.max_type == max_type && m.effective_date == date
        })
    }

    /// All maxes for a user, optionally for one lift, oldest first
    pub fn maxes_for(&self, user_id: &str, lift_id: Option<Uuid>) -> Vec<&LiftMax> {
        let mut rows: Vec<_> = self
            .lift_maxes
            .iter()
            .filter(|m| m.user_id == user_id && lift_id.map_or(true, |l| m.lift_id == l))
            .collect();
        rows.sort_by(|a, b| {
            a.effective_date
                .cmp(&b.effective_date)
                .then(a.max_type.cmp(&b.max_type))
        });
        rows
    }

    // ------------------------------------------------------------------
    // Prescriptions and days
    // ------------------------------------------------------------------

    pub fn insert_prescription(&mut self, prescription: Prescription) -> Result<()> {
        self.lift(prescription.lift_id)?;
        self.prescriptions.insert(prescription.id, prescription);
        Ok(())
    }

    pub fn prescription(&self, id: Uuid) -> Result<&Prescription> {
        self.prescriptions
            .get(&id)
            .ok_or_else(|| Error::NotFound(format!("prescription {}", id)))
    }

    pub fn insert_day(&mut self, day: Day) -> Result<()> {
        if self
            .days
            .values()
            .any(|d| d.slug == day.slug && d.program_id == day.program_id)
        {
            return Err(Error::Validation(format!("day slug '{}' already exists", day.slug)));
        }
        self.days.insert(day.id, day);
        Ok(())
    }

    pub fn day(&self, id: Uuid) -> Result<&Day> {
        self.days
            .get(&id)
            .ok_or_else(|| Error::DayNotFound(id.to_string()))
    }

    pub fn add_day_prescription(&mut self, link: DayPrescription) -> Result<()> {
        self.day(link.day_id)?;
        self.prescription(link.prescription_id)?;
        self.day_prescriptions.push(link);
        Ok(())
    }

    /// Prescriptions on a day in configured order (join order, then prescription order)
    pub fn prescriptions_for_day(&self, day_id: Uuid) -> Result<Vec<&Prescription>> {
        let mut links: Vec<_> = self
            .day_prescriptions
            .iter()
            .filter(|l| l.day_id == day_id)
            .collect();
        links.sort_by_key(|l| l.order);

        let mut rows = Vec::with_capacity(links.len());
        for link in links {
            rows.push((link.order, self.prescription(link.prescription_id)?));
        }
        rows.sort_by_key(|(order, p)| (*order, p.order));
        Ok(rows.into_iter().map(|(_, p)| p).collect())
    }

    // ------------------------------------------------------------------
    // Cycles, weeks, programs
    // ------------------------------------------------------------------

    pub fn insert_cycle(&mut self, cycle: Cycle) -> Result<()> {
        if cycle.length_weeks == 0 {
            return Err(Error::Validation(format!("cycle '{}' has zero weeks", cycle.name)));
        }
        self.cycles.insert(cycle.id, cycle);
        Ok(())
    }

    pub fn cycle(&self, id: Uuid) -> Result<&Cycle> {
        self.cycles
            .get(&id)
            .ok_or_else(|| Error::NotFound(format!("cycle {}", id)))
    }

    pub fn insert_week(&mut self, week: Week) -> Result<()> {
        let cycle = self.cycle(week.cycle_id)?;
        if week.week_number == 0 || week.week_number > cycle.length_weeks {
            return Err(Error::Validation(format!(
                "week {} outside cycle '{}' of {} weeks",
                week.week_number, cycle.name, cycle.length_weeks
            )));
        }
        if self.week(week.cycle_id, week.week_number).is_ok() {
            return Err(Error::Validation(format!(
                "week {} already exists in cycle '{}'",
                week.week_number, cycle.name
            )));
        }
        self.weeks.insert(week.id, week);
        Ok(())
    }

    pub fn week(&self, cycle_id: Uuid, week_number: u32) -> Result<&Week> {
        self.weeks
            .values()
            .find(|w| w.cycle_id == cycle_id && w.week_number == week_number)
            .ok_or(Error::WeekNotFound {
                cycle: cycle_id,
                week_number,
            })
    }

    pub fn add_week_day(&mut self, binding: WeekDay) -> Result<()> {
        if !self.weeks.contains_key(&binding.week_id) {
            return Err(Error::NotFound(format!("week {}", binding.week_id)));
        }
        self.day(binding.day_id)?;
        if self
            .week_days
            .iter()
            .any(|wd| wd.week_id == binding.week_id && wd.day_of_week == binding.day_of_week)
        {
            return Err(Error::Validation(format!(
                "week {} already has a day on {:?}",
                binding.week_id, binding.day_of_week
            )));
        }
        self.week_days.push(binding);
        Ok(())
    }

    /// Day bindings of a week in canonical Monday..Sunday order
    pub fn week_days(&self, week_id: Uuid) -> Vec<&WeekDay> {
        let mut days: Vec<_> = self.week_days.iter().filter(|wd| wd.week_id == week_id).collect();
        days.sort_by_key(|wd| wd.day_of_week);
        days
    }

    pub fn insert_program(&mut self, program: Program) -> Result<()> {
        if self.program_by_slug(&program.slug).is_some() {
            return Err(Error::Validation(format!("program slug '{}' already exists", program.slug)));
        }
        self.cycle(program.cycle_id)?;
        self.programs.insert(program.id, program);
        Ok(())
    }

    pub fn program(&self, id: Uuid) -> Result<&Program> {
        self.programs
            .get(&id)
            .ok_or_else(|| Error::NotFound(format!("program {}", id)))
    }

    pub fn program_by_slug(&self, slug: &str) -> Option<&Program> {
        self.programs.values().find(|p| p.slug == slug)
    }

    pub fn programs(&self) -> impl Iterator<Item = &Program> {
        self.programs.values()
    }

    // ------------------------------------------------------------------
    // Enrollments
    // ------------------------------------------------------------------

    /// Insert an enrollment, replacing any existing one for the same user
    pub fn put_enrollment(&mut self, enrollment: Enrollment) -> Option<Enrollment> {
        let previous = self
            .enrollments
            .values()
            .find(|e| e.user_id == enrollment.user_id)
            .map(|e| e.id);
        let removed = previous.and_then(|id| self.enrollments.remove(&id));
        self.enrollments.insert(enrollment.id, enrollment);
        removed
    }

    pub fn enrollment(&self, id: Uuid) -> Result<&Enrollment> {
        self.enrollments
            .get(&id)
            .ok_or_else(|| Error::NotFound(format!("enrollment {}", id)))
    }

    pub fn enrollment_for_user(&self, user_id: &str) -> Result<&Enrollment> {
        self.enrollments
            .values()
            .find(|e| e.user_id == user_id)
            .ok_or_else(|| Error::EnrollmentNotFound(user_id.to_string()))
    }

    pub fn update_enrollment(&mut self, enrollment: Enrollment) -> Result<()> {
        match self.enrollments.get_mut(&enrollment.id) {
            Some(slot) => {
                *slot = enrollment;
                Ok(())
            }
            None => Err(Error::NotFound(format!("enrollment {}", enrollment.id))),
        }
    }

    pub fn remove_enrollment(&mut self, id: Uuid) -> Option<Enrollment> {
        self.enrollments.remove(&id)
    }

    // ------------------------------------------------------------------
    // Sessions and logged sets
    // ------------------------------------------------------------------

    /// Insert a session; a second IN_PROGRESS session for one enrollment is rejected
    pub fn insert_session(&mut self, session: WorkoutSession) -> Result<()> {
        if session.status == SessionStatus::InProgress {
            if self.active_sessions.contains_key(&session.enrollment_id) {
                return Err(Error::SessionAlreadyActive {
                    enrollment: session.enrollment_id,
                });
            }
            self.active_sessions.insert(session.enrollment_id, session.id);
        }
        self.sessions.insert(session.id, session);
        Ok(())
    }

    pub fn session(&self, id: Uuid) -> Result<&WorkoutSession> {
        self.sessions
            .get(&id)
            .ok_or_else(|| Error::NotFound(format!("session {}", id)))
    }

    pub fn active_session(&self, enrollment_id: Uuid) -> Option<&WorkoutSession> {
        self.active_sessions
            .get(&enrollment_id)
            .and_then(|id| self.sessions.get(id))
    }

    /// Move a session to a terminal state
    pub fn finish_session(
        &mut self,
        id: Uuid,
        status: SessionStatus,
        finished_at: DateTime<Utc>,
        advance: Option<AdvanceOutcome>,
    ) -> Result<WorkoutSession> {
        let session = self
            .sessions
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("session {}", id)))?;

        if !session.status.can_transition_to(status) {
            return Err(Error::InvalidSessionTransition {
                session: id,
                status: session.status.to_string(),
            });
        }

        session.status = status;
        session.finished_at = Some(finished_at);
        session.advance = advance;
        self.active_sessions.remove(&session.enrollment_id);
        Ok(session.clone())
    }

    pub fn sessions_for_user(&self, user_id: &str) -> Vec<&WorkoutSession> {
        let mut sessions: Vec<_> = self.sessions.values().filter(|s| s.user_id == user_id).collect();
        sessions.sort_by_key(|s| s.started_at);
        sessions
    }

    pub fn session_counts(&self, user_id: &str) -> SessionCounts {
        let mut counts = SessionCounts::default();
        for session in self.sessions.values().filter(|s| s.user_id == user_id) {
            match session.status {
                SessionStatus::InProgress => counts.in_progress += 1,
                SessionStatus::Completed => counts.completed += 1,
                SessionStatus::Abandoned => counts.abandoned += 1,
            }
        }
        counts
    }

    pub fn insert_logged_set(&mut self, set: LoggedSet) {
        self.logged_sets.push(set);
    }

    /// Logged sets matching the filter, in insertion order
    pub fn logged_sets(&self, filter: &LoggedSetFilter) -> Vec<&LoggedSet> {
        self.logged_sets
            .iter()
            .filter(|s| filter.session_id.map_or(true, |id| s.session_id == id))
            .filter(|s| filter.lift_id.map_or(true, |id| s.lift_id == id))
            .filter(|s| match &filter.user_id {
                Some(user) => self
                    .sessions
                    .get(&s.session_id)
                    .map_or(false, |session| &session.user_id == user),
                None => true,
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Progressions
    // ------------------------------------------------------------------

    pub fn insert_progression(&mut self, progression: Progression) -> Result<()> {
        if self.progression_by_slug(&progression.slug).is_some() {
            return Err(Error::Validation(format!(
                "progression slug '{}' already exists",
                progression.slug
            )));
        }
        self.progressions.insert(progression.id, progression);
        Ok(())
    }

    pub fn progression(&self, id: Uuid) -> Result<&Progression> {
        self.progressions
            .get(&id)
            .ok_or_else(|| Error::NotFound(format!("progression {}", id)))
    }

    pub fn progression_by_slug(&self, slug: &str) -> Option<&Progression> {
        self.progressions.values().find(|p| p.slug == slug)
    }

    pub fn insert_binding(&mut self, binding: ProgramProgression) -> Result<()> {
        self.program(binding.program_id)?;
        self.progression(binding.progression_id)?;
        if let Some(lift) = binding.lift_id {
            self.lift(lift)?;
        }
        self.program_progressions.insert(binding.id, binding);
        Ok(())
    }

    pub fn binding(&self, id: Uuid) -> Result<&ProgramProgression> {
        self.program_progressions
            .get(&id)
            .ok_or_else(|| Error::NotFound(format!("progression binding {}", id)))
    }

    /// Enabled bindings for a lift: lift-specific or program-wide, ascending priority
    pub fn bindings_for(&self, program_id: Uuid, lift_id: Uuid) -> Vec<&ProgramProgression> {
        let mut bindings: Vec<_> = self
            .program_progressions
            .values()
            .filter(|b| b.program_id == program_id && b.enabled)
            .filter(|b| b.lift_id.map_or(true, |l| l == lift_id))
            .collect();
        bindings.sort_by_key(|b| (b.priority, b.id));
        bindings
    }

    pub fn progression_state(
        &self,
        user_id: &str,
        lift_id: Uuid,
        progression_id: Uuid,
    ) -> Option<&UserProgressionState> {
        self.progression_states.iter().find(|s| {
            s.user_id == user_id && s.lift_id == lift_id && s.progression_id == progression_id
        })
    }

    pub fn upsert_progression_state(&mut self, state: UserProgressionState) {
        match self.progression_states.iter_mut().find(|s| {
            s.user_id == state.user_id
                && s.lift_id == state.lift_id
                && s.progression_id == state.progression_id
        }) {
            Some(slot) => *slot = state,
            None => self.progression_states.push(state),
        }
    }

    pub fn failure_counter(
        &self,
        user_id: &str,
        lift_id: Uuid,
        progression_id: Uuid,
    ) -> Option<&FailureCounter> {
        self.failure_counters.iter().find(|c| {
            c.user_id == user_id && c.lift_id == lift_id && c.progression_id == progression_id
        })
    }

    pub fn upsert_failure_counter(&mut self, counter: FailureCounter) {
        match self.failure_counters.iter_mut().find(|c| {
            c.user_id == counter.user_id
                && c.lift_id == counter.lift_id
                && c.progression_id == counter.progression_id
        }) {
            Some(slot) => *slot = counter,
            None => self.failure_counters.push(counter),
        }
    }

    pub fn has_log(&self, key: &IdempotencyKey) -> bool {
        self.log_keys.contains(key)
    }

    /// Append a ledger row; returns false without writing when the key exists
    pub fn append_log(&mut self, log: ProgressionLog) -> bool {
        if !self.log_keys.insert(log.key()) {
            return false;
        }
        self.progression_logs.push(log);
        true
    }

    /// Ledger rows matching the filter, newest first
    pub fn progression_logs(&self, filter: &ProgressionLogFilter) -> Vec<&ProgressionLog> {
        let mut rows: Vec<_> = self
            .progression_logs
            .iter()
            .filter(|l| filter.user_id.as_ref().map_or(true, |u| &l.user_id == u))
            .filter(|l| filter.lift_id.map_or(true, |id| l.lift_id == id))
            .filter(|l| filter.progression_id.map_or(true, |id| l.progression_id == id))
            .collect();
        rows.sort_by(|a, b| b.applied_at.cmp(&a.applied_at));
        if let Some(limit) = filter.limit {
            rows.truncate(limit);
        }
        rows
    }
}
