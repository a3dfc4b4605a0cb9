//! Progression engine: applies a completed session's bindings.
//!
//! Each (lift, binding) pair runs in its own store transaction, in ascending
//! binding priority, so a later binding sees what an earlier one wrote and a
//! failure in one never rolls back another. The ledger's idempotency key
//! `(user, progression, lift, trigger, applied_at)` makes reapplying the same
//! session a no-op.

use crate::convert;
use crate::database::{Database, LoggedSetFilter, ProgressionLogFilter};
use crate::maxes::current_max_exact;
use crate::progression::{evaluate, Decision, Evaluation, Performance, ProgressionRule, RuleInput, SkipReason};
use crate::store::Store;
use crate::types::{
    FailureCounter, IdempotencyKey, LiftMax, LoggedSet, MaxType, ProgressionLog, SessionStatus,
    UserProgressionState, WorkoutSession,
};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

/// Result of running one binding for one lift
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BindingOutcome {
    Applied {
        log: ProgressionLog,
        retest_required: bool,
    },
    Skipped {
        reason: SkipReason,
    },
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct AppliedProgression {
    pub binding_id: Uuid,
    pub progression_id: Uuid,
    pub progression_name: String,
    pub lift_id: Uuid,
    pub lift_name: String,
    pub outcome: BindingOutcome,
}

impl AppliedProgression {
    pub fn is_applied(&self) -> bool {
        matches!(self.outcome, BindingOutcome::Applied { .. })
    }

    /// "Squat / stage: 100 -> 105" or "Bench / amrap: skipped (no AMRAP set logged)"
    pub fn describe(&self) -> String {
        match &self.outcome {
            BindingOutcome::Applied { log, retest_required } => format!(
                "{} / {}: {} -> {}{}",
                self.lift_name,
                self.progression_name,
                log.previous_value,
                log.new_value,
                if *retest_required { " (retest max)" } else { "" }
            ),
            BindingOutcome::Skipped { reason } => {
                format!("{} / {}: skipped ({})", self.lift_name, self.progression_name, reason)
            }
        }
    }
}

/// What a session contributes to progression: who, when, and which lifts
struct SessionWork {
    session: WorkoutSession,
    applied_at: DateTime<Utc>,
    pairs: Vec<(Uuid, Uuid)>,
}

/// Apply every enabled binding to every lift logged in a completed session
pub fn apply_session_progressions<S: Store>(store: &S, session_id: Uuid) -> Result<Vec<AppliedProgression>> {
    let work = store.read(|db| plan(db, session_id))?;
    let mut results = Vec::with_capacity(work.pairs.len());

    for (lift_id, binding_id) in work.pairs.iter().copied() {
        let (progression_id, progression_name, lift_name) = store.read(|db| {
            let binding = db.binding(binding_id)?;
            let progression = db.progression(binding.progression_id)?;
            Ok((progression.id, progression.name.clone(), db.lift(lift_id)?.name.clone()))
        })?;

        let outcome = match store.transaction(|db| apply_binding(db, &work, lift_id, binding_id)) {
            Ok(outcome) => outcome,
            Err(Error::InvalidStageTransition { stage }) => {
                tracing::error!("Progression '{}' exhausted its stages for lift {}", progression_name, lift_name);
                BindingOutcome::Skipped {
                    reason: SkipReason::StageExhausted { stage },
                }
            }
            Err(Error::InvalidConfig(message)) => {
                tracing::error!("Progression '{}' has invalid configuration: {}", progression_name, message);
                BindingOutcome::Skipped {
                    reason: SkipReason::InvalidConfig { message },
                }
            }
            Err(e) => return Err(e),
        };

        results.push(AppliedProgression {
            binding_id,
            progression_id,
            progression_name,
            lift_id,
            lift_name,
            outcome,
        });
    }

    let applied = results.iter().filter(|r| r.is_applied()).count();
    tracing::info!(
        "Session {}: {} progressions applied, {} skipped",
        work.session.id,
        applied,
        results.len() - applied
    );
    Ok(results)
}

/// Lifts in first-logged order, each paired with its bindings by priority
fn plan(db: &Database, session_id: Uuid) -> Result<SessionWork> {
    let session = db.session(session_id)?.clone();
    if session.status != SessionStatus::Completed {
        return Err(Error::InvalidSessionTransition {
            session: session.id,
            status: session.status.to_string(),
        });
    }
    let applied_at = session
        .finished_at
        .ok_or_else(|| Error::Store(format!("completed session {} has no finish time", session.id)))?;
    let program_id = db.enrollment(session.enrollment_id)?.program_id;

    let mut lifts: Vec<Uuid> = Vec::new();
    let filter = LoggedSetFilter {
        session_id: Some(session_id),
        ..Default::default()
    };
    for set in db.logged_sets(&filter) {
        if !lifts.contains(&set.lift_id) {
            lifts.push(set.lift_id);
        }
    }

    let pairs = lifts
        .iter()
        .flat_map(|&lift_id| {
            db.bindings_for(program_id, lift_id)
                .into_iter()
                .map(move |b| (lift_id, b.id))
        })
        .collect();

    Ok(SessionWork {
        session,
        applied_at,
        pairs,
    })
}

fn skipped(reason: SkipReason) -> Result<BindingOutcome> {
    Ok(BindingOutcome::Skipped { reason })
}

/// Run one binding for one lift inside an open transaction
fn apply_binding(db: &mut Database, work: &SessionWork, lift_id: Uuid, binding_id: Uuid) -> Result<BindingOutcome> {
    let session = &work.session;
    let user_id = session.user_id.as_str();
    let binding = db.binding(binding_id)?.clone();
    let progression = db.progression(binding.progression_id)?.clone();

    if !progression.trigger.fires_on(session.advance.unwrap_or_default()) {
        return skipped(SkipReason::TriggerNotReached);
    }

    let key = IdempotencyKey {
        user_id: user_id.to_string(),
        progression_id: progression.id,
        lift_id,
        trigger_type: progression.trigger,
        applied_at: work.applied_at,
    };
    if db.has_log(&key) {
        tracing::debug!("Progression '{}' already applied for lift {}", progression.slug, lift_id);
        return skipped(SkipReason::AlreadyApplied);
    }

    let rule = ProgressionRule::from_blob(&progression.rule)?;
    let sets: Vec<LoggedSet> = db
        .logged_sets(&LoggedSetFilter {
            session_id: Some(session.id),
            lift_id: Some(lift_id),
            ..Default::default()
        })
        .into_iter()
        .cloned()
        .collect();

    let max_type = rule.max_type();
    let previous = match current_max_exact(db, user_id, lift_id, max_type) {
        Some(max) => max.value,
        None => return skipped(SkipReason::NoMaxRecorded { max_type }),
    };
    let stage = db
        .progression_state(user_id, lift_id, progression.id)
        .map_or(0, |s| s.current_stage);
    let consecutive_failures = db
        .failure_counter(user_id, lift_id, progression.id)
        .map_or(0, |c| c.consecutive_failures);
    let rounding = db.program(db.enrollment(session.enrollment_id)?.program_id)?.default_rounding;
    let increment = convert::effective_increment(binding.increment_override, rule.default_increment());

    let input = RuleInput {
        previous,
        increment,
        stage,
        consecutive_failures,
        rounding,
    };
    let decision = match evaluate(&rule, Performance::new(&sets), input)? {
        Evaluation::Apply(decision) => decision,
        Evaluation::Skip(reason) => return skipped(reason),
    };

    persist(db, work, lift_id, progression.id, max_type, previous, &decision);

    let log = ProgressionLog {
        id: Uuid::new_v4(),
        user_id: user_id.to_string(),
        progression_id: progression.id,
        lift_id,
        previous_value: previous,
        new_value: decision.new_value,
        delta: decision.new_value - previous,
        trigger_type: progression.trigger,
        trigger_context: json!({
            "session_id": session.id,
            "binding_id": binding.id,
            "rule": progression.rule.kind,
            "increment": increment,
            "stage_from": stage,
            "stage_to": decision.new_stage,
            "success": decision.success,
            "retest_required": decision.retest_required,
            "deloaded": decision.deloaded,
            "total_reps": Performance::new(&sets).total_reps(),
            "logged_sets": sets
                .iter()
                .map(|s| json!({
                    "set_number": s.set_number,
                    "weight": s.weight,
                    "target_reps": s.target_reps,
                    "reps_performed": s.reps_performed,
                    "is_amrap": s.is_amrap,
                }))
                .collect::<Vec<_>>(),
        }),
        applied_at: work.applied_at,
    };

    if !db.append_log(log.clone()) {
        return skipped(SkipReason::AlreadyApplied);
    }

    tracing::info!(
        "Applied '{}' to lift {}: {} -> {}",
        progression.slug,
        lift_id,
        previous,
        decision.new_value
    );
    Ok(BindingOutcome::Applied {
        log,
        retest_required: decision.retest_required,
    })
}

/// Write the decision's max, stage and counter changes
fn persist(
    db: &mut Database,
    work: &SessionWork,
    lift_id: Uuid,
    progression_id: Uuid,
    max_type: MaxType,
    previous: f64,
    decision: &Decision,
) {
    let user_id = &work.session.user_id;
    let at = work.applied_at;

    if decision.new_value != previous {
        db.upsert_max(LiftMax {
            id: Uuid::new_v4(),
            user_id: user_id.clone(),
            lift_id,
            max_type,
            value: decision.new_value,
            effective_date: convert::date_of(at),
        });
    }

    if let Some(stage) = decision.new_stage {
        db.upsert_progression_state(UserProgressionState {
            user_id: user_id.clone(),
            lift_id,
            progression_id,
            current_stage: stage,
            extra: json!({ "retest_required": decision.retest_required }),
            updated_at: at,
        });
    }

    if let Some(update) = decision.counter {
        let previous = db.failure_counter(user_id, lift_id, progression_id).cloned();
        let (last_failure_at, last_success_at) = match previous {
            Some(c) => (c.last_failure_at, c.last_success_at),
            None => (None, None),
        };
        db.upsert_failure_counter(FailureCounter {
            user_id: user_id.clone(),
            lift_id,
            progression_id,
            consecutive_failures: update.consecutive_failures,
            last_failure_at: if update.failed { Some(at) } else { last_failure_at },
            last_success_at: if update.failed { last_success_at } else { Some(at) },
        });
    }
}

/// Ledger rows for a user, newest first
pub fn progression_history<S: Store>(store: &S, filter: ProgressionLogFilter) -> Result<Vec<ProgressionLog>> {
    store.read(|db| Ok(db.progression_logs(&filter).into_iter().cloned().collect()))
}
