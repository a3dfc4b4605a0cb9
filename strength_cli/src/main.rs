use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use strength_core::convert::{format_weight, opt_display};
use strength_core::database::ProgressionLogFilter;
use strength_core::prescription::GapReason;
use strength_core::*;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "lift")]
#[command(about = "Strength training program engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Authenticated user id
    #[arg(long, global = true, default_value = "default")]
    user: String,

    /// Print machine-readable JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a program bundle (TOML or JSON)
    Import { path: PathBuf },

    /// List imported programs
    Programs,

    /// Enroll in a program by slug, starting at week 1 day 1
    Enroll { program: String },

    /// Record or list lift maxes
    Max {
        #[command(subcommand)]
        action: MaxAction,
    },

    /// Show the day the enrollment points at
    Today,

    /// Start a session on today's day
    Start,

    /// Log a set against the active session
    Log {
        /// Lift slug
        lift: String,
        weight: f64,
        reps: u32,

        /// Target reps, if the set had one
        #[arg(long)]
        target: Option<u32>,

        #[arg(long)]
        amrap: bool,

        #[arg(long)]
        rpe: Option<f32>,
    },

    /// Complete the active session and apply progressions
    Complete,

    /// Abandon the active session
    Abandon,

    /// Re-run progressions for a completed session
    Reapply { session: Uuid },

    /// Show the progression ledger
    History {
        /// Only this lift
        #[arg(long)]
        lift: Option<String>,

        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Summary of maxes, sessions and the next day
    Dashboard,

    /// Export logged sets and the progression ledger as CSV
    Export {
        /// Output directory
        dir: PathBuf,
    },
}

#[derive(Subcommand)]
enum MaxAction {
    /// Record a max; a one_rm also seeds a training_max on the same date
    Record {
        lift: String,
        value: f64,

        /// one_rm (1rm) or training_max (tm)
        #[arg(long = "type", default_value = "training_max")]
        max_type: MaxType,

        /// Effective date, YYYY-MM-DD (default today)
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Current maxes, or one lift's history with --lift
    List {
        #[arg(long)]
        lift: Option<String>,
    },
}

fn main() {
    strength_core::logging::init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let data_dir = cli.data_dir.unwrap_or_else(|| config.data.data_dir.clone());
    tracing::debug!("Using data directory {:?}", data_dir);
    let store = FileStore::open(data_dir.join("store.json"))?;
    let ctx = Ctx {
        store: &store,
        user: &cli.user,
        json: cli.json,
        config: &config,
    };

    match cli.command {
        Commands::Import { path } => cmd_import(&ctx, &path),
        Commands::Programs => cmd_programs(&ctx),
        Commands::Enroll { program } => cmd_enroll(&ctx, &program),
        Commands::Max { action } => match action {
            MaxAction::Record {
                lift,
                value,
                max_type,
                date,
            } => cmd_max_record(&ctx, &lift, value, max_type, date),
            MaxAction::List { lift } => cmd_max_list(&ctx, lift.as_deref()),
        },
        Commands::Today => cmd_today(&ctx),
        Commands::Start => cmd_start(&ctx),
        Commands::Log {
            lift,
            weight,
            reps,
            target,
            amrap,
            rpe,
        } => cmd_log(&ctx, &lift, weight, reps, target, amrap, rpe),
        Commands::Complete => cmd_complete(&ctx),
        Commands::Abandon => cmd_abandon(&ctx),
        Commands::Reapply { session } => cmd_reapply(&ctx, session),
        Commands::History { lift, limit } => cmd_history(&ctx, lift.as_deref(), limit),
        Commands::Dashboard => cmd_dashboard(&ctx),
        Commands::Export { dir } => cmd_export(&ctx, &dir),
    }
}

struct Ctx<'a> {
    store: &'a FileStore,
    user: &'a str,
    json: bool,
    config: &'a Config,
}

impl Ctx<'_> {
    fn print_json<T: serde::Serialize>(&self, value: &T) -> Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }

    fn lift_id(&self, slug: &str) -> Result<Uuid> {
        self.store.read(|db| {
            db.lift_by_slug(slug)
                .map(|l| l.id)
                .ok_or_else(|| Error::NotFound(format!("lift '{}'", slug)))
        })
    }

    fn active_session(&self) -> Result<WorkoutSession> {
        session::active_session(self.store, self.user)?
            .ok_or_else(|| Error::NotFound(format!("active session for '{}'", self.user)))
    }
}

fn cmd_import(ctx: &Ctx, path: &Path) -> Result<()> {
    let bundle = ProgramBundle::load(path)?;
    let errors = bundle.validate();
    if !errors.is_empty() {
        eprintln!("Program bundle validation errors:");
        for error in &errors {
            eprintln!("  - {}", error);
        }
        return Err(Error::Validation(format!("{} problems in {}", errors.len(), path.display())));
    }

    let report = import_bundle(ctx.store, &bundle, ctx.config.rounding.policy())?;
    if ctx.json {
        return ctx.print_json(&report);
    }
    println!("✓ Imported '{}' ({})", bundle.program.name, bundle.program.slug);
    println!(
        "  {} days, {} weeks, {} progressions, {} lifts created, {} reused",
        report.days, report.weeks, report.progressions, report.lifts_created, report.lifts_reused
    );
    Ok(())
}

fn cmd_programs(ctx: &Ctx) -> Result<()> {
    let programs: Vec<(String, String)> = ctx
        .store
        .read(|db| Ok(db.programs().map(|p| (p.slug.clone(), p.name.clone())).collect()))?;
    if ctx.json {
        return ctx.print_json(&programs);
    }
    if programs.is_empty() {
        println!("No programs imported.");
    }
    for (slug, name) in programs {
        println!("  {:<24} {}", slug, name);
    }
    Ok(())
}

fn cmd_enroll(ctx: &Ctx, slug: &str) -> Result<()> {
    let program_id = ctx.store.read(|db| {
        db.program_by_slug(slug)
            .map(|p| p.id)
            .ok_or_else(|| Error::NotFound(format!("program '{}'", slug)))
    })?;
    let enrollment = navigator::enroll(ctx.store, ctx.user, program_id, Utc::now())?;
    if ctx.json {
        return ctx.print_json(&enrollment);
    }
    println!("✓ Enrolled '{}' in {}", ctx.user, slug);
    Ok(())
}

fn cmd_max_record(ctx: &Ctx, lift: &str, value: f64, max_type: MaxType, date: Option<NaiveDate>) -> Result<()> {
    let lift_id = ctx.lift_id(lift)?;
    let date = date.unwrap_or_else(|| Utc::now().date_naive());
    let written = maxes::record_max(ctx.store, ctx.user, lift_id, max_type, value, date)?;
    if ctx.json {
        return ctx.print_json(&written);
    }
    for max in written {
        println!("✓ {} {} = {} on {}", lift, max.max_type, format_weight(max.value), max.effective_date);
    }
    Ok(())
}

fn cmd_max_list(ctx: &Ctx, lift: Option<&str>) -> Result<()> {
    match lift {
        Some(slug) => {
            let lift_id = ctx.lift_id(slug)?;
            let history = ctx
                .store
                .read(|db| Ok(maxes::max_history(db, ctx.user, lift_id)))?;
            if ctx.json {
                return ctx.print_json(&history);
            }
            for max in history {
                println!("  {}  {:<13} {}", max.effective_date, max.max_type, format_weight(max.value));
            }
        }
        None => {
            let snapshot = ctx.store.read(|db| maxes::max_snapshot(db, ctx.user))?;
            if ctx.json {
                return ctx.print_json(&snapshot);
            }
            if snapshot.is_empty() {
                println!("No maxes recorded.");
            }
            for entry in snapshot {
                println!(
                    "  {:<16} {:>8}  ({} on {})",
                    entry.lift_name,
                    format_weight(entry.max.value),
                    entry.max.max_type,
                    entry.max.effective_date
                );
            }
        }
    }
    Ok(())
}

fn display_day(day: &ResolvedDay) {
    println!("\n╭─────────────────────────────────────────╮");
    println!("│  {}", day.day_name);
    println!("╰─────────────────────────────────────────╯");
    println!("  Week {} · Cycle {} · Day {}", day.week_number, day.cycle_iteration, day.day_index + 1);
    println!();

    for item in &day.items {
        println!("  {}", item.summary());
        for (i, set) in item.sets.iter().enumerate() {
            let reps = opt_display(set.target_reps);
            let reps = if reps.is_empty() { "max".to_string() } else { reps };
            println!(
                "    {}. {} x {}{}",
                i + 1,
                format_weight(set.weight),
                reps,
                if set.is_amrap { "+" } else { "" }
            );
        }
        if let Some(notes) = &item.notes {
            println!("    ℹ {}", notes);
        }
    }

    for gap in &day.gaps {
        let hint = match gap.reason {
            GapReason::MaxNotFound { .. } => " (record one with `lift max record`)",
            GapReason::InvalidConfig { .. } => "",
        };
        println!("  ! {}: {}{}", gap.lift_name, gap.reason, hint);
    }
    println!();
}

fn cmd_today(ctx: &Ctx) -> Result<()> {
    let day = resolve_today(ctx.store, ctx.user)?;
    if ctx.json {
        return ctx.print_json(&day);
    }
    display_day(&day);
    Ok(())
}

fn cmd_start(ctx: &Ctx) -> Result<()> {
    let session = start_session(ctx.store, ctx.user, Utc::now())?;
    if ctx.json {
        return ctx.print_json(&session);
    }
    println!("✓ Session started: {}", session.id);
    let day = resolve_today(ctx.store, ctx.user)?;
    display_day(&day);
    Ok(())
}

fn cmd_log(
    ctx: &Ctx,
    lift: &str,
    weight: f64,
    reps: u32,
    target: Option<u32>,
    amrap: bool,
    rpe: Option<f32>,
) -> Result<()> {
    let session = ctx.active_session()?;
    let lift_id = ctx.lift_id(lift)?;

    // Attach the day's prescription for this lift, if there is one
    let prescription_id = match session.day_id {
        Some(day_id) => ctx.store.read(|db| {
            Ok(db
                .prescriptions_for_day(day_id)?
                .into_iter()
                .find(|p| p.lift_id == lift_id)
                .map(|p| p.id))
        })?,
        None => None,
    };

    let set = log_set(
        ctx.store,
        ctx.user,
        session.id,
        NewLoggedSet {
            prescription_id,
            lift_id,
            weight,
            target_reps: target,
            reps_performed: reps,
            is_amrap: amrap,
            rpe,
        },
        Utc::now(),
    )?;
    if ctx.json {
        return ctx.print_json(&set);
    }
    println!(
        "✓ {} set {}: {} x {}{}",
        lift,
        set.set_number,
        format_weight(set.weight),
        set.reps_performed,
        if set.is_amrap { "+" } else { "" }
    );
    Ok(())
}

fn print_summary(summary: &SessionSummary) {
    println!("  Sets logged: {}", summary.logged_sets);
    if let Some(advance) = summary.session.advance {
        if advance.cycle_completed {
            println!("  Cycle complete!");
        } else if advance.week_completed {
            println!("  Week complete!");
        }
    }
    for p in &summary.progressions {
        println!("  {}", p.describe());
    }
}

fn cmd_complete(ctx: &Ctx) -> Result<()> {
    let session = ctx.active_session()?;
    let summary = complete_session(ctx.store, ctx.user, session.id, Vec::new(), Utc::now())?;
    if ctx.json {
        return ctx.print_json(&summary);
    }
    println!("\n✓ Session complete: {}", summary.session.id);
    print_summary(&summary);
    Ok(())
}

fn cmd_abandon(ctx: &Ctx) -> Result<()> {
    let session = ctx.active_session()?;
    let session = abandon_session(ctx.store, ctx.user, session.id, Utc::now())?;
    if ctx.json {
        return ctx.print_json(&session);
    }
    println!("✓ Session abandoned: {}", session.id);
    Ok(())
}

fn cmd_reapply(ctx: &Ctx, session_id: Uuid) -> Result<()> {
    let summary = session::reapply_progressions(ctx.store, ctx.user, session_id)?;
    if ctx.json {
        return ctx.print_json(&summary);
    }
    println!("✓ Reapplied progressions for {}", session_id);
    print_summary(&summary);
    Ok(())
}

fn cmd_history(ctx: &Ctx, lift: Option<&str>, limit: usize) -> Result<()> {
    let lift_id = match lift {
        Some(slug) => Some(ctx.lift_id(slug)?),
        None => None,
    };
    let rows = engine::progression_history(
        ctx.store,
        ProgressionLogFilter {
            user_id: Some(ctx.user.to_string()),
            lift_id,
            progression_id: None,
            limit: Some(limit),
        },
    )?;
    if ctx.json {
        return ctx.print_json(&rows);
    }
    if rows.is_empty() {
        println!("No progressions applied yet.");
    }
    let names: Vec<(String, String)> = ctx.store.read(|db| {
        rows.iter()
            .map(|r| Ok((db.lift(r.lift_id)?.name.clone(), db.progression(r.progression_id)?.name.clone())))
            .collect()
    })?;
    for (row, (lift_name, progression_name)) in rows.iter().zip(names) {
        println!(
            "  {}  {:<14} {:<20} {} -> {} ({:+})",
            row.applied_at.format("%Y-%m-%d %H:%M"),
            lift_name,
            progression_name,
            format_weight(row.previous_value),
            format_weight(row.new_value),
            row.delta
        );
    }
    Ok(())
}

fn cmd_dashboard(ctx: &Ctx) -> Result<()> {
    let dash = dashboard::dashboard(ctx.store, ctx.user, ctx.config.dashboard.estimate_settings())?;
    if ctx.json {
        return ctx.print_json(&dash);
    }

    println!("\n  {} · {}", dash.user_id, dash.program.as_deref().unwrap_or("not enrolled"));
    println!(
        "  Sessions: {} completed, {} abandoned, {} in progress · {} sets logged",
        dash.sessions.completed, dash.sessions.abandoned, dash.sessions.in_progress, dash.logged_sets
    );
    println!("\n  Maxes:");
    for entry in &dash.maxes {
        println!("    {:<16} {:>8}", entry.lift_name, format_weight(entry.max.value));
    }
    match &dash.next_day {
        Ok(day) => {
            let minutes = dash.estimated_minutes.map(|m| format!(" (~{} min)", m)).unwrap_or_default();
            println!("\n  Next: {}{}", day.day_name, minutes);
            for item in &day.items {
                println!("    {}", item.summary());
            }
            for gap in &day.gaps {
                println!("    ! {}: {}", gap.lift_name, gap.reason);
            }
        }
        Err(reason) => println!("\n  Next: unavailable ({})", reason),
    }
    if let Some(active) = &dash.active_session {
        println!("\n  Session in progress since {}", active.started_at.format("%Y-%m-%d %H:%M"));
    }
    println!();
    Ok(())
}

fn cmd_export(ctx: &Ctx, dir: &Path) -> Result<()> {
    let sets_path = dir.join("logged_sets.csv");
    let ledger_path = dir.join("progression_log.csv");
    let (sets, ledger) = ctx.store.read(|db| {
        Ok((
            export::export_logged_sets(db, ctx.user, &sets_path)?,
            export::export_progression_log(db, ctx.user, &ledger_path)?,
        ))
    })?;
    println!("✓ Exported {} sets to {}", sets, sets_path.display());
    println!("✓ Exported {} progression rows to {}", ledger, ledger_path.display());
    Ok(())
}
