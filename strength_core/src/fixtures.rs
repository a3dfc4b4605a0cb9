//! Shared test program: two days a week over a two-week cycle.
//!
//! Day A (Monday): squat 85% TM 5x3, bench 85% TM 5x3, row 60 fixed 3x10.
//! Day B (Friday): bench 75% TM with an AMRAP finisher, squat 70% TM fatigue drop.

use crate::blob::ConfigBlob;
use crate::navigator;
use crate::rounding::RoundingPolicy;
use crate::store::{MemoryStore, Store};
use crate::types::*;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde_json::json;
use uuid::Uuid;

pub const USER: &str = "lifter-1";

pub struct Fixture {
    pub store: MemoryStore,
    pub squat: Uuid,
    pub bench: Uuid,
    pub row: Uuid,
    pub day_a: Uuid,
    pub day_b: Uuid,
    pub program: Uuid,
    pub now: DateTime<Utc>,
}

fn blob(value: serde_json::Value) -> ConfigBlob {
    serde_json::from_value(value).unwrap()
}

fn lift(name: &str) -> Lift {
    Lift {
        id: Uuid::new_v4(),
        name: name.into(),
        slug: name.to_lowercase(),
        parent_id: None,
        is_competition: true,
    }
}

fn prescription(lift_id: Uuid, order: u32, load: serde_json::Value, scheme: serde_json::Value) -> Prescription {
    Prescription {
        id: Uuid::new_v4(),
        lift_id,
        load_strategy: blob(load),
        set_scheme: blob(scheme),
        order,
        notes: None,
        rest_seconds: Some(180),
    }
}

impl Fixture {
    pub fn new() -> Self {
        let store = MemoryStore::new();
        let now = Utc.with_ymd_and_hms(2024, 6, 3, 17, 0, 0).unwrap();
        let (squat, bench, row) = (lift("Squat"), lift("Bench"), lift("Row"));
        let (squat_id, bench_id, row_id) = (squat.id, bench.id, row.id);

        let day_a = Day {
            id: Uuid::new_v4(),
            name: "Day A".into(),
            slug: "day-a".into(),
            program_id: None,
        };
        let day_b = Day {
            id: Uuid::new_v4(),
            name: "Day B".into(),
            slug: "day-b".into(),
            program_id: None,
        };
        let (day_a_id, day_b_id) = (day_a.id, day_b.id);

        let cycle = Cycle {
            id: Uuid::new_v4(),
            name: "Two week wave".into(),
            length_weeks: 2,
        };
        let program = Program {
            id: Uuid::new_v4(),
            name: "Fixture Program".into(),
            slug: "fixture".into(),
            cycle_id: cycle.id,
            weekly_lookup: None,
            daily_lookup: None,
            default_rounding: RoundingPolicy::default(),
            description: None,
        };
        let (cycle_id, program_id) = (cycle.id, program.id);

        store
            .transaction(|db| {
                for l in [squat, bench, row] {
                    db.insert_lift(l)?;
                }
                db.insert_day(day_a)?;
                db.insert_day(day_b)?;

                let a_items = [
                    // Inserted out of order; resolution sorts by `order`
                    prescription(
                        row_id,
                        2,
                        json!({"type": "fixed_weight", "weight": 60.0}),
                        json!({"type": "fixed", "sets": 3, "reps": 10}),
                    ),
                    prescription(
                        squat_id,
                        0,
                        json!({"type": "percent_of_max", "max_type": "training_max", "percent": 0.85}),
                        json!({"type": "fixed", "sets": 5, "reps": 3}),
                    ),
                    prescription(
                        bench_id,
                        1,
                        json!({"type": "percent_of_max", "max_type": "training_max", "percent": 0.85}),
                        json!({"type": "fixed", "sets": 5, "reps": 3}),
                    ),
                ];
                let b_items = [
                    prescription(
                        bench_id,
                        0,
                        json!({"type": "percent_of_max", "max_type": "training_max", "percent": 0.75}),
                        json!({"type": "amrap", "sets_before": 2, "working_reps": 5}),
                    ),
                    prescription(
                        squat_id,
                        1,
                        json!({"type": "percent_of_max", "max_type": "training_max", "percent": 0.7}),
                        json!({"type": "fatigue_drop", "initial_reps": 8, "drop_reps": 1, "num_sets": 3}),
                    ),
                ];

                for (day_id, items) in [(day_a_id, a_items.to_vec()), (day_b_id, b_items.to_vec())] {
                    for p in items {
                        let link = DayPrescription {
                            day_id,
                            prescription_id: p.id,
                            order: p.order,
                        };
                        db.insert_prescription(p)?;
                        db.add_day_prescription(link)?;
                    }
                }

                db.insert_cycle(cycle)?;
                for week_number in 1..=2 {
                    let week = Week {
                        id: Uuid::new_v4(),
                        cycle_id,
                        week_number,
                        variant: None,
                    };
                    let week_id = week.id;
                    db.insert_week(week)?;
                    // Friday bound first; canonical order still puts Monday first
                    db.add_week_day(WeekDay {
                        week_id,
                        day_id: day_b_id,
                        day_of_week: DayOfWeek::Friday,
                    })?;
                    db.add_week_day(WeekDay {
                        week_id,
                        day_id: day_a_id,
                        day_of_week: DayOfWeek::Monday,
                    })?;
                }
                db.insert_program(program)
            })
            .unwrap();

        navigator::enroll(&store, USER, program_id, now).unwrap();

        Self {
            store,
            squat: squat_id,
            bench: bench_id,
            row: row_id,
            day_a: day_a_id,
            day_b: day_b_id,
            program: program_id,
            now,
        }
    }

    pub fn date(&self) -> NaiveDate {
        self.now.date_naive()
    }

    pub fn enrollment_id(&self) -> Uuid {
        self.store
            .read(|db| Ok(db.enrollment_for_user(USER)?.id))
            .unwrap()
    }

    /// Create a progression and bind it to the fixture program
    pub fn bind(
        &self,
        slug: &str,
        trigger: TriggerType,
        rule: serde_json::Value,
        lift_id: Option<Uuid>,
        priority: i32,
    ) -> Uuid {
        let progression = Progression {
            id: Uuid::new_v4(),
            name: slug.replace('-', " "),
            slug: slug.into(),
            trigger,
            rule: blob(rule),
        };
        let progression_id = progression.id;
        let binding = ProgramProgression {
            id: Uuid::new_v4(),
            program_id: self.program,
            progression_id,
            lift_id,
            priority,
            enabled: true,
            increment_override: None,
        };

        self.store
            .transaction(|db| {
                db.insert_progression(progression)?;
                db.insert_binding(binding)
            })
            .unwrap();
        progression_id
    }
}
