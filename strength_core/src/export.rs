//! CSV export of logged sets and the progression ledger.
//!
//! Files are written to a temp file in the target directory, synced, then
//! renamed into place, so a failed export never leaves a half-written CSV.

use crate::convert::{format_weight, opt_display, opt_timestamp};
use crate::database::{Database, LoggedSetFilter, ProgressionLogFilter};
use crate::types::{LoggedSet, ProgressionLog, WorkoutSession};
use crate::Result;
use serde::Serialize;
use std::path::Path;
use tempfile::NamedTempFile;

/// A row in the logged sets CSV
#[derive(Debug, Serialize)]
struct SetRow {
    session_id: String,
    started_at: String,
    finished_at: String,
    week: u32,
    cycle: u32,
    lift: String,
    set_number: u32,
    weight: String,
    target_reps: String,
    reps: u32,
    amrap: bool,
    rpe: String,
}

impl SetRow {
    fn new(set: &LoggedSet, session: &WorkoutSession, lift: &str) -> Self {
        SetRow {
            session_id: set.session_id.to_string(),
            started_at: session.started_at.to_rfc3339(),
            finished_at: opt_timestamp(session.finished_at),
            week: session.week_number,
            cycle: session.cycle_iteration,
            lift: lift.to_string(),
            set_number: set.set_number,
            weight: format_weight(set.weight),
            target_reps: opt_display(set.target_reps),
            reps: set.reps_performed,
            amrap: set.is_amrap,
            rpe: opt_display(set.rpe),
        }
    }
}

/// A row in the progression ledger CSV
#[derive(Debug, Serialize)]
struct LedgerRow {
    applied_at: String,
    progression_id: String,
    lift_id: String,
    trigger: String,
    previous_value: String,
    new_value: String,
    delta: String,
    session_id: String,
}

impl From<&ProgressionLog> for LedgerRow {
    fn from(log: &ProgressionLog) -> Self {
        LedgerRow {
            applied_at: log.applied_at.to_rfc3339(),
            progression_id: log.progression_id.to_string(),
            lift_id: log.lift_id.to_string(),
            trigger: log.trigger_type.to_string(),
            previous_value: format_weight(log.previous_value),
            new_value: format_weight(log.new_value),
            delta: format_weight(log.delta),
            session_id: log
                .trigger_context
                .get("session_id")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
        }
    }
}

fn write_csv<R: Serialize>(path: &Path, rows: &[R]) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;
    let temp = NamedTempFile::new_in(dir)?;

    {
        let mut writer = csv::Writer::from_writer(temp.as_file());
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
    }
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| crate::Error::Io(e.error))?;
    Ok(())
}

/// Write every logged set for a user, oldest session first
pub fn export_logged_sets(db: &Database, user_id: &str, path: &Path) -> Result<usize> {
    let mut rows = Vec::new();
    for session in db.sessions_for_user(user_id) {
        let filter = LoggedSetFilter {
            session_id: Some(session.id),
            ..Default::default()
        };
        for set in db.logged_sets(&filter) {
            let lift = db.lift(set.lift_id)?;
            rows.push(SetRow::new(set, session, &lift.name));
        }
    }

    write_csv(path, &rows)?;
    tracing::info!("Exported {} logged sets to {:?}", rows.len(), path);
    Ok(rows.len())
}

/// Write the user's progression ledger, oldest first
pub fn export_progression_log(db: &Database, user_id: &str, path: &Path) -> Result<usize> {
    let filter = ProgressionLogFilter {
        user_id: Some(user_id.to_string()),
        ..Default::default()
    };
    let rows: Vec<LedgerRow> = db
        .progression_logs(&filter)
        .into_iter()
        .rev()
        .map(LedgerRow::from)
        .collect();

    write_csv(path, &rows)?;
    tracing::info!("Exported {} ledger rows to {:?}", rows.len(), path);
    Ok(rows.len())
}
