//! Program bundles: a whole program described in one TOML or JSON file.
//!
//! Everything inside a bundle is referenced by slug. Importing validates the
//! bundle first and then writes lifts, days, prescriptions, the cycle and
//! its weeks, the program, progressions and bindings in one transaction.
//! Lifts already in the store are reused by slug; any other slug collision
//! rejects the import.

use crate::blob::ConfigBlob;
use crate::load_strategy::LoadStrategy;
use crate::progression::ProgressionRule;
use crate::rounding::RoundingPolicy;
use crate::set_scheme::SetScheme;
use crate::store::Store;
use crate::types::*;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use uuid::Uuid;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProgramBundle {
    pub program: ProgramDef,
    pub cycle: CycleDef,
    #[serde(default)]
    pub lifts: Vec<LiftDef>,
    #[serde(default)]
    pub days: Vec<DayDef>,
    #[serde(default)]
    pub weeks: Vec<WeekDef>,
    #[serde(default)]
    pub progressions: Vec<ProgressionDef>,
    #[serde(default)]
    pub bindings: Vec<BindingDef>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProgramDef {
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Falls back to the configured default rounding
    #[serde(default)]
    pub rounding: Option<RoundingPolicy>,
    #[serde(default)]
    pub weekly_lookup: Option<LookupTable>,
    #[serde(default)]
    pub daily_lookup: Option<LookupTable>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CycleDef {
    pub name: String,
    pub length_weeks: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LiftDef {
    pub slug: String,
    pub name: String,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub competition: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DayDef {
    pub slug: String,
    pub name: String,
    #[serde(default)]
    pub prescriptions: Vec<PrescriptionDef>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PrescriptionDef {
    pub lift: String,
    pub load: ConfigBlob,
    pub scheme: ConfigBlob,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub rest_seconds: Option<u32>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WeekDef {
    pub number: u32,
    #[serde(default)]
    pub variant: Option<String>,
    /// Weekday name -> day slug
    pub days: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProgressionDef {
    pub slug: String,
    pub name: String,
    pub trigger: TriggerType,
    pub rule: ConfigBlob,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BindingDef {
    pub progression: String,
    /// None binds the progression to every lift in the program
    #[serde(default)]
    pub lift: Option<String>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub increment_override: Option<f64>,
}

fn default_enabled() -> bool {
    true
}

/// What an import created
#[derive(Clone, Debug, Default, Serialize, PartialEq)]
pub struct ImportReport {
    pub program_id: Uuid,
    pub lifts_created: usize,
    pub lifts_reused: usize,
    pub days: usize,
    pub prescriptions: usize,
    pub weeks: usize,
    pub progressions: usize,
    pub bindings: usize,
}

impl ProgramBundle {
    /// Read a bundle; `.json` files are JSON, anything else TOML
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let bundle: ProgramBundle = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&contents)?,
            _ => toml::from_str(&contents)?,
        };
        tracing::info!("Loaded program bundle from {:?}", path);
        Ok(bundle)
    }

    /// Lifts ordered so every parent precedes its variations, at any depth.
    /// None when parents are missing from the bundle or form a loop.
    fn lifts_parent_first(&self) -> Option<Vec<&LiftDef>> {
        let mut placed: BTreeSet<&str> = BTreeSet::new();
        let mut ordered = Vec::with_capacity(self.lifts.len());
        let mut pending: Vec<&LiftDef> = self.lifts.iter().collect();

        while !pending.is_empty() {
            let (ready, blocked): (Vec<&LiftDef>, Vec<&LiftDef>) = pending
                .into_iter()
                .partition(|l| l.parent.as_deref().map_or(true, |p| placed.contains(p)));
            if ready.is_empty() {
                return None;
            }
            placed.extend(ready.iter().map(|l| l.slug.as_str()));
            ordered.extend(ready);
            pending = blocked;
        }
        Some(ordered)
    }

    /// Validate the bundle on its own terms; store collisions are checked on import
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.program.slug.is_empty() {
            errors.push("Program has empty slug".to_string());
        }
        if self.program.name.is_empty() {
            errors.push(format!("Program '{}' has empty name", self.program.slug));
        }
        if let Some(rounding) = &self.program.rounding {
            if !(rounding.increment > 0.0) {
                errors.push(format!("Rounding increment must be positive, got {}", rounding.increment));
            }
        }
        if self.cycle.length_weeks == 0 {
            errors.push(format!("Cycle '{}' has zero weeks", self.cycle.name));
        }

        let mut lift_slugs = BTreeSet::new();
        for lift in &self.lifts {
            if lift.slug.is_empty() {
                errors.push("Lift has empty slug".to_string());
            }
            if !lift_slugs.insert(lift.slug.as_str()) {
                errors.push(format!("Duplicate lift slug '{}'", lift.slug));
            }
        }
        let mut parents_known = true;
        for lift in &self.lifts {
            if let Some(parent) = &lift.parent {
                if !lift_slugs.contains(parent.as_str()) {
                    errors.push(format!("Lift '{}' references unknown parent '{}'", lift.slug, parent));
                    parents_known = false;
                }
            }
        }
        if parents_known && self.lifts_parent_first().is_none() {
            errors.push("Lift parents form a loop".to_string());
        }

        let mut day_slugs = BTreeSet::new();
        for day in &self.days {
            if !day_slugs.insert(day.slug.as_str()) {
                errors.push(format!("Duplicate day slug '{}'", day.slug));
            }
            if day.prescriptions.is_empty() {
                errors.push(format!("Day '{}' has no prescriptions", day.slug));
            }
            for (i, p) in day.prescriptions.iter().enumerate() {
                if !lift_slugs.contains(p.lift.as_str()) {
                    errors.push(format!("Day '{}' item {} references unknown lift '{}'", day.slug, i + 1, p.lift));
                }
                if let Err(e) = LoadStrategy::from_blob(&p.load) {
                    errors.push(format!("Day '{}' item {}: {}", day.slug, i + 1, e));
                }
                if let Err(e) = SetScheme::from_blob(&p.scheme) {
                    errors.push(format!("Day '{}' item {}: {}", day.slug, i + 1, e));
                }
            }
        }

        let mut week_numbers = BTreeSet::new();
        for week in &self.weeks {
            if week.number == 0 || week.number > self.cycle.length_weeks {
                errors.push(format!(
                    "Week {} is outside the {}-week cycle",
                    week.number, self.cycle.length_weeks
                ));
            }
            if !week_numbers.insert(week.number) {
                errors.push(format!("Duplicate week {}", week.number));
            }
            if week.days.is_empty() {
                errors.push(format!("Week {} has no training days", week.number));
            }
            for (weekday, day) in &week.days {
                if weekday.parse::<DayOfWeek>().is_err() {
                    errors.push(format!("Week {} has unknown weekday '{}'", week.number, weekday));
                }
                if !day_slugs.contains(day.as_str()) {
                    errors.push(format!("Week {} references unknown day '{}'", week.number, day));
                }
            }
        }
        for n in 1..=self.cycle.length_weeks {
            if !week_numbers.contains(&n) {
                errors.push(format!("Week {} of the cycle is not defined", n));
            }
        }

        let mut progression_slugs = BTreeSet::new();
        for p in &self.progressions {
            if !progression_slugs.insert(p.slug.as_str()) {
                errors.push(format!("Duplicate progression slug '{}'", p.slug));
            }
            if let Err(e) = ProgressionRule::from_blob(&p.rule) {
                errors.push(format!("Progression '{}': {}", p.slug, e));
            }
        }

        for b in &self.bindings {
            if !progression_slugs.contains(b.progression.as_str()) {
                errors.push(format!("Binding references unknown progression '{}'", b.progression));
            }
            if let Some(lift) = &b.lift {
                if !lift_slugs.contains(lift.as_str()) {
                    errors.push(format!("Binding for '{}' references unknown lift '{}'", b.progression, lift));
                }
            }
        }

        errors
    }
}

/// Validate and write a bundle in one transaction
pub fn import_bundle<S: Store>(store: &S, bundle: &ProgramBundle, default_rounding: RoundingPolicy) -> Result<ImportReport> {
    let errors = bundle.validate();
    if !errors.is_empty() {
        for e in &errors {
            tracing::warn!("Bundle '{}': {}", bundle.program.slug, e);
        }
        return Err(Error::Validation(errors.join("; ")));
    }

    let report = store.transaction(|db| {
        if db.program_by_slug(&bundle.program.slug).is_some() {
            return Err(Error::Validation(format!(
                "program '{}' already exists",
                bundle.program.slug
            )));
        }

        let mut report = ImportReport::default();
        let program_id = Uuid::new_v4();

        // Parents first so the parent check in insert_lift holds
        let mut lift_ids: HashMap<&str, Uuid> = HashMap::new();
        let lifts = bundle
            .lifts_parent_first()
            .ok_or_else(|| Error::Validation("lift parents form a loop".to_string()))?;
        for def in lifts {
            if let Some(existing) = db.lift_by_slug(&def.slug) {
                lift_ids.insert(def.slug.as_str(), existing.id);
                report.lifts_reused += 1;
                continue;
            }
            let parent_id = match &def.parent {
                Some(p) => Some(lookup(&lift_ids, p, "lift")?),
                None => None,
            };
            let lift = Lift {
                id: Uuid::new_v4(),
                name: def.name.clone(),
                slug: def.slug.clone(),
                parent_id,
                is_competition: def.competition,
            };
            lift_ids.insert(def.slug.as_str(), lift.id);
            db.insert_lift(lift)?;
            report.lifts_created += 1;
        }

        let mut day_ids: HashMap<&str, Uuid> = HashMap::new();
        for def in &bundle.days {
            let day = Day {
                id: Uuid::new_v4(),
                name: def.name.clone(),
                slug: def.slug.clone(),
                program_id: Some(program_id),
            };
            let day_id = day.id;
            db.insert_day(day)?;
            day_ids.insert(def.slug.as_str(), day_id);
            report.days += 1;

            for (order, p) in def.prescriptions.iter().enumerate() {
                let prescription = Prescription {
                    id: Uuid::new_v4(),
                    lift_id: lookup(&lift_ids, &p.lift, "lift")?,
                    load_strategy: p.load.clone(),
                    set_scheme: p.scheme.clone(),
                    order: order as u32,
                    notes: p.notes.clone(),
                    rest_seconds: p.rest_seconds,
                };
                let link = DayPrescription {
                    day_id,
                    prescription_id: prescription.id,
                    order: order as u32,
                };
                db.insert_prescription(prescription)?;
                db.add_day_prescription(link)?;
                report.prescriptions += 1;
            }
        }

        let cycle = Cycle {
            id: Uuid::new_v4(),
            name: bundle.cycle.name.clone(),
            length_weeks: bundle.cycle.length_weeks,
        };
        let cycle_id = cycle.id;
        db.insert_cycle(cycle)?;

        for def in &bundle.weeks {
            let week = Week {
                id: Uuid::new_v4(),
                cycle_id,
                week_number: def.number,
                variant: def.variant.clone(),
            };
            let week_id = week.id;
            db.insert_week(week)?;
            for (weekday, day) in &def.days {
                let day_of_week = weekday.parse::<DayOfWeek>().map_err(Error::Validation)?;
                db.add_week_day(WeekDay {
                    week_id,
                    day_id: lookup(&day_ids, day, "day")?,
                    day_of_week,
                })?;
            }
            report.weeks += 1;
        }

        db.insert_program(Program {
            id: program_id,
            name: bundle.program.name.clone(),
            slug: bundle.program.slug.clone(),
            cycle_id,
            weekly_lookup: bundle.program.weekly_lookup.clone(),
            daily_lookup: bundle.program.daily_lookup.clone(),
            default_rounding: bundle.program.rounding.unwrap_or(default_rounding),
            description: bundle.program.description.clone(),
        })?;

        let mut progression_ids: HashMap<&str, Uuid> = HashMap::new();
        for def in &bundle.progressions {
            let progression = Progression {
                id: Uuid::new_v4(),
                name: def.name.clone(),
                slug: def.slug.clone(),
                trigger: def.trigger,
                rule: def.rule.clone(),
            };
            progression_ids.insert(def.slug.as_str(), progression.id);
            db.insert_progression(progression)?;
            report.progressions += 1;
        }

        for def in &bundle.bindings {
            let lift_id = match &def.lift {
                Some(slug) => Some(lookup(&lift_ids, slug, "lift")?),
                None => None,
            };
            db.insert_binding(ProgramProgression {
                id: Uuid::new_v4(),
                program_id,
                progression_id: lookup(&progression_ids, &def.progression, "progression")?,
                lift_id,
                priority: def.priority,
                enabled: def.enabled,
                increment_override: def.increment_override,
            })?;
            report.bindings += 1;
        }

        report.program_id = program_id;
        Ok(report)
    })?;

    tracing::info!(
        "Imported program '{}': {} days, {} weeks, {} progressions",
        bundle.program.slug,
        report.days,
        report.weeks,
        report.progressions
    );
    Ok(report)
}

fn lookup(ids: &HashMap<&str, Uuid>, slug: &str, what: &str) -> Result<Uuid> {
    ids.get(slug)
        .copied()
        .ok_or_else(|| Error::NotFound(format!("{} '{}'", what, slug)))
}
