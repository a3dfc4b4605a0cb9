//! Progression rules: turning logged performance into a new max or stage.
//!
//! Rules are pure. `evaluate` looks at one lift's logged sets from one
//! session plus the lifter's current max, stage and failure count, and
//! returns a `Decision`. Persisting that decision and writing the ledger is
//! the engine's job.
//!
//! Rule families:
//! - linear: fixed increment when every target set is met
//! - amrap: increment chosen from a step table by reps achieved on the AMRAP set
//! - stage: volume target per stage; failure walks the stage list, success adds weight
//! - failure_counter: success adds weight, N consecutive failures deload the max

use crate::blob::ConfigBlob;
use crate::rounding::RoundingPolicy;
use crate::set_scheme::MAX_SETS;
use crate::types::{LoggedSet, MaxType};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LinearRule {
    pub max_type: MaxType,
    pub increment: f64,
}

/// Reps at or above `min_reps` earn `multiplier` x the increment
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AmrapStep {
    pub min_reps: u32,
    pub multiplier: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AmrapRule {
    pub max_type: MaxType,
    pub increment: f64,
    pub steps: Vec<AmrapStep>,
}

impl AmrapRule {
    /// Multiplier for a rep count; reps below every step earn nothing
    pub fn multiplier_for(&self, reps: u32) -> f64 {
        self.steps
            .iter()
            .filter(|s| s.min_reps <= reps)
            .max_by_key(|s| s.min_reps)
            .map_or(0.0, |s| s.multiplier)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Stage {
    #[serde(default)]
    pub name: Option<String>,
    pub sets: u32,
    pub reps: u32,
}

impl Stage {
    pub fn volume_target(&self) -> u32 {
        self.sets.saturating_mul(self.reps)
    }
}

/// Stages grade a lift by total reps. The prescription's set scheme is not
/// switched with the stage, so programs using this rule should prescribe a
/// scheme whose volume matches the lifter's current stage.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct StageRule {
    pub max_type: MaxType,
    pub increment: f64,
    pub stages: Vec<Stage>,
    /// Failing the final stage resets to stage 0 and flags a retest.
    /// When false, exhausting the list is an `InvalidStageTransition`.
    #[serde(default = "default_true")]
    pub retest_on_exhaustion: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FailureCounterRule {
    pub max_type: MaxType,
    /// Added to the max on success
    #[serde(default)]
    pub increment: f64,
    /// Consecutive failures that trigger a deload
    pub threshold: u32,
    /// Fraction removed from the max on deload: 0.1 = 10%
    pub deload_percent: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ProgressionRule {
    Linear(LinearRule),
    Amrap(AmrapRule),
    Stage(StageRule),
    FailureCounter(FailureCounterRule),
}

impl ProgressionRule {
    pub const LINEAR: &'static str = "linear";
    pub const AMRAP: &'static str = "amrap";
    pub const STAGE: &'static str = "stage";
    pub const FAILURE_COUNTER: &'static str = "failure_counter";

    pub fn from_blob(blob: &ConfigBlob) -> Result<Self> {
        let rule = match (blob.kind.as_str(), blob.version) {
            (Self::LINEAR, 1) => ProgressionRule::Linear(blob.decode()?),
            (Self::AMRAP, 1) => ProgressionRule::Amrap(blob.decode()?),
            (Self::STAGE, 1) => ProgressionRule::Stage(blob.decode()?),
            (Self::FAILURE_COUNTER, 1) => ProgressionRule::FailureCounter(blob.decode()?),
            _ => return Err(blob.unsupported("progression")),
        };
        rule.validate()?;
        Ok(rule)
    }

    pub fn to_blob(&self) -> Result<ConfigBlob> {
        match self {
            ProgressionRule::Linear(r) => ConfigBlob::encode(Self::LINEAR, 1, r),
            ProgressionRule::Amrap(r) => ConfigBlob::encode(Self::AMRAP, 1, r),
            ProgressionRule::Stage(r) => ConfigBlob::encode(Self::STAGE, 1, r),
            ProgressionRule::FailureCounter(r) => ConfigBlob::encode(Self::FAILURE_COUNTER, 1, r),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let problem = match self {
            ProgressionRule::Amrap(r) if r.steps.is_empty() => Some("amrap rule has no steps".to_string()),
            ProgressionRule::Stage(r) if r.stages.is_empty() => Some("stage rule has no stages".to_string()),
            ProgressionRule::Stage(r) if r.stages.iter().any(|s| s.volume_target() == 0) => {
                Some("every stage needs at least one set of one rep".to_string())
            }
            ProgressionRule::Stage(r) if r.stages.iter().any(|s| s.sets > MAX_SETS) => {
                Some(format!("a stage may have at most {} sets", MAX_SETS))
            }
            ProgressionRule::FailureCounter(r) if r.threshold == 0 => {
                Some("failure threshold must be at least 1".to_string())
            }
            ProgressionRule::FailureCounter(r) if !(r.deload_percent > 0.0 && r.deload_percent < 1.0) => Some(
                format!("deload_percent must be between 0 and 1, got {}", r.deload_percent),
            ),
            _ => None,
        };

        match problem {
            Some(msg) => Err(Error::InvalidConfig(msg)),
            None => Ok(()),
        }
    }

    /// Which max this rule reads and writes
    pub fn max_type(&self) -> MaxType {
        match self {
            ProgressionRule::Linear(r) => r.max_type,
            ProgressionRule::Amrap(r) => r.max_type,
            ProgressionRule::Stage(r) => r.max_type,
            ProgressionRule::FailureCounter(r) => r.max_type,
        }
    }

    /// Increment used when a binding has no override
    pub fn default_increment(&self) -> f64 {
        match self {
            ProgressionRule::Linear(r) => r.increment,
            ProgressionRule::Amrap(r) => r.increment,
            ProgressionRule::Stage(r) => r.increment,
            ProgressionRule::FailureCounter(r) => r.increment,
        }
    }
}

// ============================================================================
// Performance summary
// ============================================================================

/// One lift's logged sets from one session
#[derive(Clone, Copy, Debug)]
pub struct Performance<'a> {
    pub sets: &'a [LoggedSet],
}

impl<'a> Performance<'a> {
    pub fn new(sets: &'a [LoggedSet]) -> Self {
        Self { sets }
    }

    pub fn total_reps(&self) -> u32 {
        self.sets.iter().map(|s| s.reps_performed).fold(0, u32::saturating_add)
    }

    /// Every set with a target hit it (AMRAP targets are minimums)
    pub fn all_targets_met(&self) -> bool {
        !self.sets.is_empty()
            && self
                .sets
                .iter()
                .all(|s| s.target_reps.map_or(true, |t| s.reps_performed >= t))
    }

    /// Best rep count on an AMRAP set
    pub fn amrap_reps(&self) -> Option<u32> {
        self.sets
            .iter()
            .filter(|s| s.is_amrap)
            .map(|s| s.reps_performed)
            .max()
    }
}

// ============================================================================
// Evaluation
// ============================================================================

/// Lifter state a rule evaluates against
#[derive(Clone, Copy, Debug)]
pub struct RuleInput {
    pub previous: f64,
    /// Binding override, else the rule's own increment
    pub increment: f64,
    pub stage: u32,
    pub consecutive_failures: u32,
    pub rounding: RoundingPolicy,
}

/// New failure counter values
#[derive(Clone, Copy, Debug, Serialize, PartialEq)]
pub struct CounterUpdate {
    pub consecutive_failures: u32,
    pub failed: bool,
}

/// What a rule decided
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct Decision {
    pub success: bool,
    pub new_value: f64,
    /// Set by stage rules
    pub new_stage: Option<u32>,
    /// Set by failure-counter rules
    pub counter: Option<CounterUpdate>,
    /// The stage list wrapped; the lifter should retest their max
    pub retest_required: bool,
    pub deloaded: bool,
}

impl Decision {
    fn unchanged(success: bool, input: &RuleInput) -> Self {
        Self {
            success,
            new_value: input.previous,
            new_stage: None,
            counter: None,
            retest_required: false,
            deloaded: false,
        }
    }
}

/// Why a binding did not apply
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    AlreadyApplied,
    TriggerNotReached,
    NoMaxRecorded { max_type: MaxType },
    NoLoggedSets,
    NoAmrapSet,
    StageExhausted { stage: u32 },
    InvalidConfig { message: String },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::AlreadyApplied => write!(f, "already applied"),
            SkipReason::TriggerNotReached => write!(f, "trigger not reached"),
            SkipReason::NoMaxRecorded { max_type } => write!(f, "no {} recorded", max_type),
            SkipReason::NoLoggedSets => write!(f, "no sets logged"),
            SkipReason::NoAmrapSet => write!(f, "no AMRAP set logged"),
            SkipReason::StageExhausted { stage } => {
                write!(f, "stage list exhausted at stage {} with no retest path", stage)
            }
            SkipReason::InvalidConfig { message } => write!(f, "invalid configuration: {}", message),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Evaluation {
    Apply(Decision),
    Skip(SkipReason),
}

/// Evaluate a rule against one lift's performance
pub fn evaluate(rule: &ProgressionRule, perf: Performance<'_>, input: RuleInput) -> Result<Evaluation> {
    if perf.sets.is_empty() {
        return Ok(Evaluation::Skip(SkipReason::NoLoggedSets));
    }

    let decision = match rule {
        ProgressionRule::Linear(_) => evaluate_linear(perf, &input),
        ProgressionRule::Amrap(r) => match perf.amrap_reps() {
            Some(reps) => evaluate_amrap(r, reps, &input),
            None => return Ok(Evaluation::Skip(SkipReason::NoAmrapSet)),
        },
        ProgressionRule::Stage(r) => evaluate_stage(r, perf, &input)?,
        ProgressionRule::FailureCounter(r) => evaluate_failure_counter(r, perf, &input),
    };

    Ok(Evaluation::Apply(decision))
}

fn evaluate_linear(perf: Performance<'_>, input: &RuleInput) -> Decision {
    if perf.all_targets_met() {
        Decision {
            new_value: input.previous + input.increment,
            ..Decision::unchanged(true, input)
        }
    } else {
        Decision::unchanged(false, input)
    }
}

fn evaluate_amrap(rule: &AmrapRule, reps: u32, input: &RuleInput) -> Decision {
    let multiplier = rule.multiplier_for(reps);
    let new_value = (input.previous + multiplier * input.increment).max(0.0);
    tracing::debug!("AMRAP {} reps -> multiplier {}", reps, multiplier);

    Decision {
        new_value,
        ..Decision::unchanged(multiplier > 0.0, input)
    }
}

fn evaluate_stage(rule: &StageRule, perf: Performance<'_>, input: &RuleInput) -> Result<Decision> {
    let last = rule.stages.len().saturating_sub(1) as u32;
    let stage = input.stage.min(last);
    let target = rule
        .stages
        .get(stage as usize)
        .map_or(0, Stage::volume_target);

    if perf.total_reps() >= target {
        return Ok(Decision {
            new_value: input.previous + input.increment,
            new_stage: Some(stage),
            ..Decision::unchanged(true, input)
        });
    }

    if stage < last {
        return Ok(Decision {
            new_stage: Some(stage + 1),
            ..Decision::unchanged(false, input)
        });
    }

    if !rule.retest_on_exhaustion {
        return Err(Error::InvalidStageTransition { stage });
    }

    Ok(Decision {
        new_stage: Some(0),
        retest_required: true,
        ..Decision::unchanged(false, input)
    })
}

fn evaluate_failure_counter(rule: &FailureCounterRule, perf: Performance<'_>, input: &RuleInput) -> Decision {
    if perf.all_targets_met() {
        return Decision {
            new_value: input.previous + input.increment,
            counter: Some(CounterUpdate {
                consecutive_failures: 0,
                failed: false,
            }),
            ..Decision::unchanged(true, input)
        };
    }

    let failures = input.consecutive_failures + 1;
    if failures >= rule.threshold {
        let reduced = input.rounding.apply(input.previous * (1.0 - rule.deload_percent));
        return Decision {
            new_value: reduced,
            counter: Some(CounterUpdate {
                consecutive_failures: 0,
                failed: true,
            }),
            deloaded: true,
            ..Decision::unchanged(false, input)
        };
    }

    Decision {
        counter: Some(CounterUpdate {
            consecutive_failures: failures,
            failed: true,
        }),
        ..Decision::unchanged(false, input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn set(target: Option<u32>, reps: u32, is_amrap: bool) -> LoggedSet {
        LoggedSet {
            id: Uuid::new_v4(),
            session_id: Uuid::nil(),
            prescription_id: None,
            lift_id: Uuid::nil(),
            set_number: 1,
            weight: 100.0,
            target_reps: target,
            reps_performed: reps,
            is_amrap,
            rpe: None,
            created_at: Utc::now(),
        }
    }

    fn input(previous: f64, increment: f64) -> RuleInput {
        RuleInput {
            previous,
            increment,
            stage: 0,
            consecutive_failures: 0,
            rounding: RoundingPolicy::default(),
        }
    }

    fn stage_rule(retest: bool) -> ProgressionRule {
        ProgressionRule::Stage(StageRule {
            max_type: MaxType::TrainingMax,
            increment: 5.0,
            stages: vec![
                Stage { name: Some("5x3".into()), sets: 5, reps: 3 },
                Stage { name: Some("6x2".into()), sets: 6, reps: 2 },
                Stage { name: Some("10x1".into()), sets: 10, reps: 1 },
            ],
            retest_on_exhaustion: retest,
        })
    }

    fn apply(eval: Evaluation) -> Decision {
        match eval {
            Evaluation::Apply(d) => d,
            Evaluation::Skip(r) => panic!("unexpected skip: {}", r),
        }
    }

    #[test]
    fn test_stage_success_adds_weight_keeps_stage() {
        let sets: Vec<_> = (0..5).map(|_| set(Some(3), 3, false)).collect();
        let d = apply(evaluate(&stage_rule(true), Performance::new(&sets), input(100.0, 5.0)).unwrap());
        assert!(d.success);
        assert_eq!(d.new_value, 105.0);
        assert_eq!(d.new_stage, Some(0));
    }

    #[test]
    fn test_stage_failure_advances_stage_same_weight() {
        // 10 of 15 reps
        let sets: Vec<_> = (0..5).map(|_| set(Some(3), 2, false)).collect();
        let d = apply(evaluate(&stage_rule(true), Performance::new(&sets), input(100.0, 5.0)).unwrap());
        assert!(!d.success);
        assert_eq!(d.new_value, 100.0);
        assert_eq!(d.new_stage, Some(1));
        assert!(!d.retest_required);
    }

    #[test]
    fn test_final_stage_failure_resets_and_signals_retest() {
        let sets = vec![set(Some(1), 1, false); 4];
        let mut at_last = input(100.0, 5.0);
        at_last.stage = 2;
        let d = apply(evaluate(&stage_rule(true), Performance::new(&sets), at_last).unwrap());
        assert_eq!(d.new_stage, Some(0));
        assert!(d.retest_required);
        assert_eq!(d.new_value, 100.0);
    }

    #[test]
    fn test_final_stage_failure_without_retest_path() {
        let sets = vec![set(Some(1), 1, false); 4];
        let mut at_last = input(100.0, 5.0);
        at_last.stage = 2;
        let err = evaluate(&stage_rule(false), Performance::new(&sets), at_last).unwrap_err();
        assert!(matches!(err, Error::InvalidStageTransition { stage: 2 }));
    }

    #[test]
    fn test_amrap_step_table() {
        let rule = AmrapRule {
            max_type: MaxType::TrainingMax,
            increment: 2.5,
            steps: vec![
                AmrapStep { min_reps: 0, multiplier: -1.0 },
                AmrapStep { min_reps: 2, multiplier: 0.0 },
                AmrapStep { min_reps: 4, multiplier: 1.0 },
                AmrapStep { min_reps: 6, multiplier: 2.0 },
            ],
        };
        assert_eq!(rule.multiplier_for(1), -1.0);
        assert_eq!(rule.multiplier_for(3), 0.0);
        assert_eq!(rule.multiplier_for(5), 1.0);
        assert_eq!(rule.multiplier_for(12), 2.0);

        let rule = ProgressionRule::Amrap(rule);
        let sets = vec![set(Some(5), 5, false), set(Some(5), 7, true)];
        let d = apply(evaluate(&rule, Performance::new(&sets), input(100.0, 2.5)).unwrap());
        assert_eq!(d.new_value, 105.0);
        assert!(d.success);

        let sets = vec![set(Some(5), 1, true)];
        let d = apply(evaluate(&rule, Performance::new(&sets), input(100.0, 2.5)).unwrap());
        assert_eq!(d.new_value, 97.5);
        assert!(!d.success);
    }

    #[test]
    fn test_amrap_without_amrap_set_skips() {
        let rule = ProgressionRule::Amrap(AmrapRule {
            max_type: MaxType::TrainingMax,
            increment: 2.5,
            steps: vec![AmrapStep { min_reps: 1, multiplier: 1.0 }],
        });
        let sets = vec![set(Some(5), 5, false)];
        let eval = evaluate(&rule, Performance::new(&sets), input(100.0, 2.5)).unwrap();
        assert_eq!(eval, Evaluation::Skip(SkipReason::NoAmrapSet));
    }

    #[test]
    fn test_linear_requires_every_target() {
        let rule = ProgressionRule::Linear(LinearRule {
            max_type: MaxType::TrainingMax,
            increment: 5.0,
        });
        let good = vec![set(Some(5), 5, false), set(Some(5), 6, false)];
        let bad = vec![set(Some(5), 5, false), set(Some(5), 4, false)];

        assert_eq!(apply(evaluate(&rule, Performance::new(&good), input(100.0, 5.0)).unwrap()).new_value, 105.0);
        assert_eq!(apply(evaluate(&rule, Performance::new(&bad), input(100.0, 5.0)).unwrap()).new_value, 100.0);
    }

    #[test]
    fn test_failure_counter_threshold_deloads_and_resets() {
        let rule = ProgressionRule::FailureCounter(FailureCounterRule {
            max_type: MaxType::TrainingMax,
            increment: 5.0,
            threshold: 3,
            deload_percent: 0.1,
        });
        let failed = vec![set(Some(5), 3, false)];

        let mut state = input(200.0, 5.0);
        for expected in 1..=2 {
            let d = apply(evaluate(&rule, Performance::new(&failed), state).unwrap());
            assert_eq!(d.counter.unwrap().consecutive_failures, expected);
            assert_eq!(d.new_value, 200.0);
            state.consecutive_failures = expected;
        }

        let d = apply(evaluate(&rule, Performance::new(&failed), state).unwrap());
        assert!(d.deloaded);
        assert_eq!(d.new_value, 180.0);
        assert_eq!(d.counter.unwrap().consecutive_failures, 0);
    }

    #[test]
    fn test_failure_counter_success_resets_any_streak() {
        let rule = ProgressionRule::FailureCounter(FailureCounterRule {
            max_type: MaxType::TrainingMax,
            increment: 2.5,
            threshold: 100,
            deload_percent: 0.1,
        });
        let good = vec![set(Some(5), 5, false)];
        for streak in [0, 1, 7, 99] {
            let mut state = input(100.0, 2.5);
            state.consecutive_failures = streak;
            let d = apply(evaluate(&rule, Performance::new(&good), state).unwrap());
            assert_eq!(
                d.counter,
                Some(CounterUpdate {
                    consecutive_failures: 0,
                    failed: false
                })
            );
        }
    }

    #[test]
    fn test_rule_blobs_validate() {
        let blob: ConfigBlob = serde_json::from_str(
            r#"{"type":"failure_counter","max_type":"training_max","threshold":3}"#,
        )
        .unwrap();
        // deload_percent is required
        assert!(ProgressionRule::from_blob(&blob).is_err());

        let blob: ConfigBlob = serde_json::from_str(
            r#"{"type":"failure_counter","max_type":"training_max","threshold":3,"deload_percent":0.1}"#,
        )
        .unwrap();
        let rule = ProgressionRule::from_blob(&blob).unwrap();
        assert_eq!(rule.default_increment(), 0.0);
        assert_eq!(rule.to_blob().unwrap().kind, "failure_counter");
    }

    #[test]
    fn test_no_sets_skips() {
        let eval = evaluate(&stage_rule(true), Performance::new(&[]), input(100.0, 5.0)).unwrap();
        assert_eq!(eval, Evaluation::Skip(SkipReason::NoLoggedSets));
    }

    #[test]
    fn test_oversized_stage_is_invalid_config() {
        let blob: ConfigBlob = serde_json::from_str(
            r#"{"type":"stage","max_type":"training_max","increment":5.0,"stages":[{"sets":100000,"reps":100000}]}"#,
        )
        .unwrap();
        let err = ProgressionRule::from_blob(&blob).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)), "{:?}", err);

        let huge = Stage { name: None, sets: u32::MAX, reps: 2 };
        assert_eq!(huge.volume_target(), u32::MAX);
    }

    #[test]
    fn test_total_reps_saturates() {
        let sets = [set(None, u32::MAX, false), set(None, 5, false)];
        assert_eq!(Performance::new(&sets).total_reps(), u32::MAX);
    }
}
