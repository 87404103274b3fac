use clap::{Parser, Subcommand};
use lift_core::*;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "lift")]
#[command(about = "Workout session tracker", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Override user id
    #[arg(long, global = true)]
    user: Option<String>,

    /// Log engine activity to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a workout session, reading commands from stdin (default)
    Run {
        /// Plan file (JSON); uses the built-in sample plan when omitted
        #[arg(long)]
        plan: Option<PathBuf>,
    },

    /// Show recent workouts, newest first
    History {
        /// Number of workouts to show
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Append recent workouts to a CSV file
    Export {
        /// Output CSV path
        #[arg(long)]
        out: PathBuf,

        /// Number of workouts to export
        #[arg(long)]
        limit: Option<usize>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        lift_core::logging::init_with_level("debug");
    } else {
        lift_core::logging::init();
    }

    let mut config = Config::load()?;
    if let Some(data_dir) = cli.data_dir {
        config.data.data_dir = data_dir;
    }
    if let Some(user) = cli.user {
        config.user.user_id = user;
    }
    tracing::debug!(
        "Using data dir {:?} for user {}",
        config.data.data_dir,
        config.user.user_id
    );

    match cli.command {
        Some(Commands::Run { plan }) => cmd_run(&config, plan.as_deref()),
        Some(Commands::History { limit }) => cmd_history(&config, limit),
        Some(Commands::Export { out, limit }) => cmd_export(&config, &out, limit),
        None => cmd_run(&config, None),
    }
}

fn open_store(config: &Config) -> Arc<JsonlLogStore> {
    Arc::new(JsonlLogStore::new(config.data.history_path()))
}

fn cmd_run(config: &Config, plan_path: Option<&Path>) -> Result<()> {
    let plan = match plan_path {
        Some(path) => load_plan(path)?,
        None => sample_plan().clone(),
    };

    let engine = SessionEngine::new(open_store(config), config.user.user_id.clone());
    engine.start(&plan)?;

    display_plan(&plan);
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    run_session(&engine, &plan, stdin.lock(), &mut stdout)
}

fn cmd_history(config: &Config, limit: Option<usize>) -> Result<()> {
    let limit = limit.unwrap_or(config.history.default_limit);
    let store = open_store(config);
    let logs = store.fetch_history(&config.user.user_id, limit)?;

    if logs.is_empty() {
        println!("No workouts logged yet.");
        return Ok(());
    }

    println!(
        "{:<10}  {:<24}  {:>5}  {:>9}  {:>7}  {:>6}",
        "DATE", "WORKOUT", "MIN", "VOLUME", "SETS", "RATING"
    );
    for log in &logs {
        println!(
            "{:<10}  {:<24}  {:>5}  {:>9}  {:>7}  {:>6}",
            log.date_key,
            truncate(&log.workout_name, 24),
            log.duration_minutes,
            log.total_volume,
            format!("{}/{}", log.completed_sets, log.total_sets),
            "★".repeat(log.rating as usize),
        );
    }

    Ok(())
}

fn cmd_export(config: &Config, out: &Path, limit: Option<usize>) -> Result<()> {
    let limit = limit.unwrap_or(config.history.default_limit);
    let logs = open_store(config).fetch_history(&config.user.user_id, limit)?;

    let count = lift_core::export::write_csv(&logs, out)?;
    println!("✓ Exported {} workouts to {}", count, out.display());
    Ok(())
}

// ============================================================================
// Session loop
// ============================================================================

#[derive(Debug, PartialEq)]
enum SessionCommand {
    Log { reps: u32, weight: f64 },
    Skip,
    Next,
    Prev,
    Goto(usize),
    Status,
    Cancel,
    Done { rating: u8, note: String },
    Help,
}

/// Parse one input line; blank lines yield `None`
fn parse_command(line: &str) -> std::result::Result<Option<SessionCommand>, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };

    let command = match verb.to_lowercase().as_str() {
        "log" | "l" => {
            let reps = words
                .next()
                .ok_or("usage: log <reps> [weight]")?
                .parse::<u32>()
                .map_err(|_| "reps must be a whole number")?;
            let weight = match words.next() {
                Some(w) => w.parse::<f64>().map_err(|_| "weight must be a number")?,
                None => 0.0,
            };
            if !weight.is_finite() || weight < 0.0 {
                return Err("weight must be zero or more".into());
            }
            SessionCommand::Log { reps, weight }
        }
        "skip" | "s" => SessionCommand::Skip,
        "next" | "n" => SessionCommand::Next,
        "prev" | "p" => SessionCommand::Prev,
        "goto" | "g" => {
            let number = words
                .next()
                .ok_or("usage: goto <exercise number>")?
                .parse::<usize>()
                .map_err(|_| "exercise number must be a whole number")?;
            if number == 0 {
                return Err("exercise numbers start at 1".into());
            }
            SessionCommand::Goto(number - 1)
        }
        "status" | "st" => SessionCommand::Status,
        "cancel" | "quit" => SessionCommand::Cancel,
        "done" | "d" => {
            let rating = words
                .next()
                .ok_or("usage: done <rating 1-5> [note]")?
                .parse::<u8>()
                .map_err(|_| "rating must be a number from 1 to 5")?;
            let note = words.collect::<Vec<_>>().join(" ");
            SessionCommand::Done { rating, note }
        }
        "help" | "h" | "?" => SessionCommand::Help,
        other => return Err(format!("unknown command '{}' (try 'help')", other)),
    };

    Ok(Some(command))
}

fn run_session(
    engine: &SessionEngine,
    plan: &WorkoutPlan,
    input: impl BufRead,
    out: &mut impl Write,
) -> Result<()> {
    for line in input.lines() {
        let line = line?;
        let command = match parse_command(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(message) => {
                writeln!(out, "! {}", message)?;
                continue;
            }
        };

        let Some(snapshot) = engine.snapshot() else {
            break;
        };
        let current = snapshot.exercise_index;

        match command {
            SessionCommand::Log { reps, weight } => match engine.log_set(current, reps, weight) {
                SetOutcome::Logged {
                    set_index,
                    rest_seconds,
                } => {
                    writeln!(
                        out,
                        "✓ {} set {}/{}: {} x {}",
                        snapshot.exercise_name,
                        set_index + 1,
                        snapshot.sets_in_exercise,
                        reps,
                        weight
                    )?;
                    if let Some(secs) = rest_seconds {
                        writeln!(out, "  Rest {}s", secs)?;
                    }
                }
                other => report_ignored(out, other)?,
            },
            SessionCommand::Skip => match engine.skip_set(current) {
                SetOutcome::Skipped { set_index } => writeln!(
                    out,
                    "→ {} set {}/{} skipped",
                    snapshot.exercise_name,
                    set_index + 1,
                    snapshot.sets_in_exercise
                )?,
                other => report_ignored(out, other)?,
            },
            SessionCommand::Next => {
                engine.next_exercise();
                display_current(out, engine, plan)?;
            }
            SessionCommand::Prev => {
                engine.prev_exercise();
                display_current(out, engine, plan)?;
            }
            SessionCommand::Goto(index) => {
                engine.set_current_exercise(index);
                display_current(out, engine, plan)?;
            }
            SessionCommand::Status => {
                let rest = engine.tick();
                display_status(out, engine, rest)?;
            }
            SessionCommand::Help => display_help(out)?,
            SessionCommand::Cancel => {
                engine.cancel();
                writeln!(out, "Session cancelled. Nothing was saved.")?;
                return Ok(());
            }
            SessionCommand::Done { rating, note } => {
                if let Some(log) = engine.complete(rating, &note) {
                    display_summary(out, &log)?;
                    if engine.pending_count() > 0 {
                        writeln!(out, "! Could not save this workout; see log output.")?;
                    } else {
                        writeln!(out, "✓ Workout saved!")?;
                    }
                }
                return Ok(());
            }
        }
    }

    if engine.cancel() {
        writeln!(out, "Input ended without 'done'. Session cancelled.")?;
    }
    Ok(())
}

fn report_ignored(out: &mut impl Write, outcome: SetOutcome) -> io::Result<()> {
    let message = match outcome {
        SetOutcome::Ignored(IgnoreReason::SetAlreadyCompleted { set_index }) => format!(
            "set {} is already logged; skip or move to another exercise",
            set_index + 1
        ),
        SetOutcome::Ignored(IgnoreReason::StaleExerciseIndex { expected, got }) => format!(
            "exercise {} is not current (current is {})",
            got + 1,
            expected + 1
        ),
        SetOutcome::Ignored(IgnoreReason::NoActiveSession) => "no active session".into(),
        SetOutcome::Ignored(IgnoreReason::InvalidWeight) => {
            "weight must be zero or more".into()
        }
        _ => return Ok(()),
    };
    writeln!(out, "! {}", message)
}

// ============================================================================
// Display
// ============================================================================

fn display_plan(plan: &WorkoutPlan) {
    println!("\n╭─────────────────────────────────────────╮");
    println!("│  {}", plan.name.to_uppercase());
    println!("╰─────────────────────────────────────────╯");
    println!();
    println!(
        "  {} exercises, {} sets, ~{} min",
        plan.exercises.len(),
        plan.total_sets(),
        plan.estimated_duration_minutes
    );
    if !plan.target_muscles.is_empty() {
        println!("  Targets: {}", plan.target_muscles.join(", "));
    }

    if !plan.warmup.is_empty() {
        println!("\n  Warmup:");
        for step in &plan.warmup {
            println!("    • {} ({})", step.name, step.duration);
        }
    }

    if !plan.coach_note.is_empty() {
        println!("\n  ℹ {}", plan.coach_note);
    }

    println!();
    if let Some(first) = plan.exercises.first() {
        println!("Exercise 1/{}: {}", plan.exercises.len(), describe(first));
    }
    println!("Type 'help' for commands.");
}

fn describe(exercise: &Exercise) -> String {
    let mut text = format!("{} ({} sets", exercise.name, exercise.sets);
    if !exercise.rep_target.is_empty() {
        text.push_str(&format!(" x {}", exercise.rep_target));
    }
    if !exercise.suggested_load.is_empty() {
        text.push_str(&format!(" @ {}", exercise.suggested_load));
    }
    text.push(')');
    text
}

fn display_current(
    out: &mut impl Write,
    engine: &SessionEngine,
    plan: &WorkoutPlan,
) -> io::Result<()> {
    let Some(snapshot) = engine.snapshot() else {
        return Ok(());
    };
    let exercise = &plan.exercises[snapshot.exercise_index];

    writeln!(
        out,
        "Exercise {}/{}: {}",
        snapshot.exercise_index + 1,
        snapshot.exercise_count,
        describe(exercise)
    )?;
    if !exercise.instructions.is_empty() {
        writeln!(out, "  {}", exercise.instructions)?;
    }
    for tip in &exercise.tips {
        writeln!(out, "  • {}", tip)?;
    }
    if !exercise.alternatives.is_empty() {
        writeln!(out, "  Alternatives: {}", exercise.alternatives.join(", "))?;
    }
    Ok(())
}

fn display_status(out: &mut impl Write, engine: &SessionEngine, rest: RestStatus) -> io::Result<()> {
    let Some(snapshot) = engine.snapshot() else {
        return Ok(());
    };

    writeln!(
        out,
        "Exercise {}/{}: {}, set {}/{}",
        snapshot.exercise_index + 1,
        snapshot.exercise_count,
        snapshot.exercise_name,
        snapshot.set_index + 1,
        snapshot.sets_in_exercise
    )?;
    writeln!(
        out,
        "  {}/{} sets done, elapsed {}:{:02}",
        snapshot.completed_sets,
        snapshot.total_sets,
        snapshot.elapsed_secs / 60,
        snapshot.elapsed_secs % 60
    )?;
    if rest.active {
        writeln!(out, "  Resting: {}s left", rest.remaining_secs)?;
    }
    Ok(())
}

fn display_summary(out: &mut impl Write, log: &WorkoutLog) -> io::Result<()> {
    writeln!(out)?;
    writeln!(out, "── {} ({}) ──", log.workout_name, log.date_key)?;
    writeln!(out, "  Duration: {} min", log.duration_minutes)?;
    writeln!(out, "  Total volume: {}", log.total_volume)?;
    writeln!(
        out,
        "  Exercises completed: {}/{}",
        log.completed_exercises,
        log.exercises.len()
    )?;
    writeln!(out, "  Sets completed: {}/{}", log.completed_sets, log.total_sets)?;
    writeln!(out, "  Calories: {}", log.calories_burned)?;
    writeln!(out, "  Rating: {}", "★".repeat(log.rating as usize))?;
    if !log.note.is_empty() {
        writeln!(out, "  Note: {}", log.note)?;
    }
    Ok(())
}

fn display_help(out: &mut impl Write) -> io::Result<()> {
    writeln!(out, "Commands:")?;
    writeln!(out, "  log <reps> [weight]   record the current set")?;
    writeln!(out, "  skip                  skip the current set")?;
    writeln!(out, "  next | prev           change exercise")?;
    writeln!(out, "  goto <n>              jump to exercise n")?;
    writeln!(out, "  status                show progress and rest time")?;
    writeln!(out, "  done <1-5> [note]     finish and save")?;
    writeln!(out, "  cancel                discard the session")
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_with_and_without_weight() {
        assert_eq!(
            parse_command("log 10 22.5").unwrap(),
            Some(SessionCommand::Log {
                reps: 10,
                weight: 22.5
            })
        );
        assert_eq!(
            parse_command("  l 8 ").unwrap(),
            Some(SessionCommand::Log { reps: 8, weight: 0.0 })
        );
        assert!(parse_command("log").is_err());
        assert!(parse_command("log ten").is_err());
        assert!(parse_command("log 5 -3").is_err());
    }

    #[test]
    fn test_parse_goto_is_one_based() {
        assert_eq!(parse_command("goto 2").unwrap(), Some(SessionCommand::Goto(1)));
        assert!(parse_command("goto 0").is_err());
    }

    #[test]
    fn test_parse_done_keeps_note() {
        assert_eq!(
            parse_command("done 4 legs felt heavy").unwrap(),
            Some(SessionCommand::Done {
                rating: 4,
                note: "legs felt heavy".into()
            })
        );
        assert!(parse_command("done").is_err());
    }

    #[test]
    fn test_parse_blank_and_unknown() {
        assert_eq!(parse_command("   ").unwrap(), None);
        assert!(parse_command("jump").unwrap_err().contains("unknown command"));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("Legs", 10), "Legs");
        assert_eq!(truncate("Full Body Basics", 6), "Full …");
    }
}
