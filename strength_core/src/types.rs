//! Core domain types for the strength training engine.
//!
//! This module defines the records the engine reads and writes:
//! - Lifts and recorded maxes
//! - Program structure (cycle, weeks, days, prescriptions)
//! - Enrollment position, workout sessions and logged sets
//! - Progression rules, their bindings and per-lifter progression state

use crate::blob::ConfigBlob;
use crate::rounding::RoundingPolicy;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Opaque authenticated user identifier, supplied by the host
pub type UserId = String;

// ============================================================================
// Lifts and Maxes
// ============================================================================

/// A lift (exercise) that prescriptions and maxes refer to
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Lift {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    /// Set when this lift is a variation of another lift
    pub parent_id: Option<Uuid>,
    pub is_competition: bool,
}

/// Kind of recorded max
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum MaxType {
    OneRm,
    TrainingMax,
}

impl fmt::Display for MaxType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaxType::OneRm => write!(f, "one_rm"),
            MaxType::TrainingMax => write!(f, "training_max"),
        }
    }
}

impl FromStr for MaxType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "one_rm" | "1rm" => Ok(MaxType::OneRm),
            "training_max" | "tm" => Ok(MaxType::TrainingMax),
            other => Err(format!("Unknown max type: {}", other)),
        }
    }
}

/// A recorded max for one lift on one date
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LiftMax {
    pub id: Uuid,
    pub user_id: UserId,
    pub lift_id: Uuid,
    pub max_type: MaxType,
    pub value: f64,
    pub effective_date: NaiveDate,
}

// ============================================================================
// Program Structure
// ============================================================================

/// One prescribed lift: which lift, how heavy, and how many sets/reps
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Prescription {
    pub id: Uuid,
    pub lift_id: Uuid,
    pub load_strategy: ConfigBlob,
    pub set_scheme: ConfigBlob,
    pub order: u32,
    pub notes: Option<String>,
    pub rest_seconds: Option<u32>,
}

/// A training day: an ordered collection of prescriptions
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Day {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    /// None for reusable days shared between programs
    pub program_id: Option<Uuid>,
}

/// Join row placing a prescription on a day
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DayPrescription {
    pub day_id: Uuid,
    pub prescription_id: Uuid,
    pub order: u32,
}

/// Canonical day of week; Monday sorts first
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum DayOfWeek {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl DayOfWeek {
    /// Mon=1 .. Sun=7
    pub fn ordinal(self) -> u8 {
        match self {
            DayOfWeek::Monday => 1,
            DayOfWeek::Tuesday => 2,
            DayOfWeek::Wednesday => 3,
            DayOfWeek::Thursday => 4,
            DayOfWeek::Friday => 5,
            DayOfWeek::Saturday => 6,
            DayOfWeek::Sunday => 7,
        }
    }
}

impl FromStr for DayOfWeek {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "monday" | "mon" => Ok(DayOfWeek::Monday),
            "tuesday" | "tue" => Ok(DayOfWeek::Tuesday),
            "wednesday" | "wed" => Ok(DayOfWeek::Wednesday),
            "thursday" | "thu" => Ok(DayOfWeek::Thursday),
            "friday" | "fri" => Ok(DayOfWeek::Friday),
            "saturday" | "sat" => Ok(DayOfWeek::Saturday),
            "sunday" | "sun" => Ok(DayOfWeek::Sunday),
            other => Err(format!("Unknown day of week: {}", other)),
        }
    }
}

/// A cycle: a fixed number of weeks that repeats
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Cycle {
    pub id: Uuid,
    pub name: String,
    pub length_weeks: u32,
}

/// One week of a cycle
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Week {
    pub id: Uuid,
    pub cycle_id: Uuid,
    pub week_number: u32,
    pub variant: Option<String>,
}

/// Binds a day to a canonical weekday within a week
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WeekDay {
    pub week_id: Uuid,
    pub day_id: Uuid,
    pub day_of_week: DayOfWeek,
}

/// Multiplier/offset pair consumed by load strategies that opt in
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct LookupEntry {
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default)]
    pub offset: f64,
}

fn default_multiplier() -> f64 {
    1.0
}

impl Default for LookupEntry {
    fn default() -> Self {
        Self {
            multiplier: 1.0,
            offset: 0.0,
        }
    }
}

/// Named mapping from a week number or day slug to a lookup entry
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq)]
pub struct LookupTable {
    pub name: String,
    #[serde(default)]
    pub entries: BTreeMap<String, LookupEntry>,
}

impl LookupTable {
    pub fn get(&self, key: &str) -> Option<LookupEntry> {
        self.entries.get(key).copied()
    }
}

/// A training program
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Program {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub cycle_id: Uuid,
    pub weekly_lookup: Option<LookupTable>,
    pub daily_lookup: Option<LookupTable>,
    pub default_rounding: RoundingPolicy,
    pub description: Option<String>,
}

// ============================================================================
// Enrollment and Sessions
// ============================================================================

/// A user's position within their active program
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Enrollment {
    pub id: Uuid,
    pub user_id: UserId,
    pub program_id: Uuid,
    /// 1-based
    pub current_week: u32,
    /// 1-based
    pub current_cycle_iteration: u32,
    /// 0-based index into the canonically ordered week-days of the current week
    pub current_day_index: u32,
    pub enrolled_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Lifecycle status of a workout session
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    InProgress,
    Completed,
    Abandoned,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, SessionStatus::InProgress)
    }

    /// Only IN_PROGRESS may move, and only to a terminal state
    pub fn can_transition_to(self, next: SessionStatus) -> bool {
        matches!(
            (self, next),
            (SessionStatus::InProgress, SessionStatus::Completed)
                | (SessionStatus::InProgress, SessionStatus::Abandoned)
        )
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::InProgress => write!(f, "in_progress"),
            SessionStatus::Completed => write!(f, "completed"),
            SessionStatus::Abandoned => write!(f, "abandoned"),
        }
    }
}

/// Which boundaries an enrollment advance crossed
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct AdvanceOutcome {
    pub week_completed: bool,
    pub cycle_completed: bool,
}

/// One workout, from start to completion or abandonment
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct WorkoutSession {
    pub id: Uuid,
    pub enrollment_id: Uuid,
    pub user_id: UserId,
    pub week_number: u32,
    pub cycle_iteration: u32,
    pub day_index: u32,
    pub day_id: Option<Uuid>,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Recorded when the session completes
    pub advance: Option<AdvanceOutcome>,
}

/// Immutable record of one performed set
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LoggedSet {
    pub id: Uuid,
    pub session_id: Uuid,
    pub prescription_id: Option<Uuid>,
    pub lift_id: Uuid,
    pub set_number: u32,
    pub weight: f64,
    pub target_reps: Option<u32>,
    pub reps_performed: u32,
    pub is_amrap: bool,
    pub rpe: Option<f32>,
    pub created_at: DateTime<Utc>,
}

/// Input for logging a set; ids and set numbers are assigned on insert
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct NewLoggedSet {
    pub prescription_id: Option<Uuid>,
    pub lift_id: Uuid,
    pub weight: f64,
    pub target_reps: Option<u32>,
    pub reps_performed: u32,
    #[serde(default)]
    pub is_amrap: bool,
    pub rpe: Option<f32>,
}

// ============================================================================
// Progressions
// ============================================================================

/// What event a progression reacts to
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    AfterSession,
    AfterWeek,
    AfterCycle,
}

impl TriggerType {
    /// Whether a completed session with this advance outcome fires the trigger
    pub fn fires_on(self, advance: AdvanceOutcome) -> bool {
        match self {
            TriggerType::AfterSession => true,
            TriggerType::AfterWeek => advance.week_completed,
            TriggerType::AfterCycle => advance.cycle_completed,
        }
    }
}

impl fmt::Display for TriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerType::AfterSession => write!(f, "after_session"),
            TriggerType::AfterWeek => write!(f, "after_week"),
            TriggerType::AfterCycle => write!(f, "after_cycle"),
        }
    }
}

/// A reusable progression rule
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Progression {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub trigger: TriggerType,
    /// Type-discriminated rule parameters, decoded by `ProgressionRule::from_blob`
    pub rule: ConfigBlob,
}

/// Binds a progression to a program, optionally for one lift only
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProgramProgression {
    pub id: Uuid,
    pub program_id: Uuid,
    pub progression_id: Uuid,
    /// None applies to every lift the program touches
    pub lift_id: Option<Uuid>,
    /// Ascending: lower runs first
    pub priority: i32,
    pub enabled: bool,
    pub increment_override: Option<f64>,
}

/// Per-lifter stage within one progression for one lift
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct UserProgressionState {
    pub user_id: UserId,
    pub lift_id: Uuid,
    pub progression_id: Uuid,
    pub current_stage: u32,
    #[serde(default)]
    pub extra: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}

/// Consecutive failure tracking for one (user, lift, progression)
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FailureCounter {
    pub user_id: UserId,
    pub lift_id: Uuid,
    pub progression_id: Uuid,
    pub consecutive_failures: u32,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
}

/// Append-only ledger row written once per applied binding
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ProgressionLog {
    pub id: Uuid,
    pub user_id: UserId,
    pub progression_id: Uuid,
    pub lift_id: Uuid,
    pub previous_value: f64,
    pub new_value: f64,
    pub delta: f64,
    pub trigger_type: TriggerType,
    pub trigger_context: serde_json::Value,
    pub applied_at: DateTime<Utc>,
}

/// At-most-once key for a progression trigger
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdempotencyKey {
    pub user_id: UserId,
    pub progression_id: Uuid,
    pub lift_id: Uuid,
    pub trigger_type: TriggerType,
    pub applied_at: DateTime<Utc>,
}

impl ProgressionLog {
    pub fn key(&self) -> IdempotencyKey {
        IdempotencyKey {
            user_id: self.user_id.clone(),
            progression_id: self.progression_id,
            lift_id: self.lift_id,
            trigger_type: self.trigger_type,
            applied_at: self.applied_at,
        }
    }
}
