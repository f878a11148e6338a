//! sw - parameter sweep runner
//!
//! CLI entry point for inspecting recipes and running sweeps.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use colored::*;
use eyre::{Context, Result, eyre};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use paramsweep::cli::{Cli, Command};
use paramsweep::config::{self, Config};
use paramsweep::events::{self, EventBus, IterationResult, SweepEvent};
use paramsweep::{Collaborators, SimulatedTarget, SimulationConfig, SweepRecipe, SweepSpace, Sweeper, resume_point};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<tracing::Level>) -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sweeper")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Priority: CLI --log-level > config file > INFO
    let cli_level = cli_log_level.and_then(|s| {
        let level = config::parse_log_level(s);
        if level.is_none() {
            eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
        }
        level
    });
    let level = cli_level.or(config_log_level).unwrap_or(tracing::Level::INFO);

    let log_file = fs::File::create(log_dir.join("sweeper.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_log_level = config::load_log_level(cli.config.as_ref());
    setup_logging(cli.log_level.as_deref(), config_log_level).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Count { recipe } => cmd_count(&recipe),
        Command::Show { recipe, index } => cmd_show(&recipe, index),
        Command::Values { recipe, name } => cmd_values(&recipe, name.as_deref()),
        Command::Run {
            recipe,
            start_index,
            run_id,
            latency_ms,
            seed,
        } => {
            let mut recipe = load_recipe(&recipe)?;
            if let Some(start_index) = start_index {
                recipe.start_index = start_index;
            }
            if run_id.is_some() {
                recipe.run_id = run_id;
            }
            cmd_run(&config, recipe, simulation(latency_ms, seed)).await
        }
        Command::Resume {
            recipe,
            run_id,
            latency_ms,
            seed,
        } => cmd_resume(&config, &recipe, &run_id, simulation(latency_ms, seed)).await,
        Command::Events { run_id } => cmd_events(&config, &run_id),
    }
}

fn load_recipe(path: &Path) -> Result<SweepRecipe> {
    SweepRecipe::load(path).context("Failed to load recipe")
}

fn simulation(latency_ms: Option<u64>, seed: Option<u64>) -> SimulationConfig {
    let mut sim = SimulationConfig::default();
    if let Some(latency_ms) = latency_ms {
        sim.latency_ms = latency_ms;
    }
    if let Some(seed) = seed {
        sim.seed = seed;
    }
    sim
}

fn cmd_count(path: &Path) -> Result<()> {
    let recipe = load_recipe(path)?;
    let space = SweepSpace::new(&recipe);

    println!("{} {}", "Recipe:".bold(), recipe.name);
    for dim in space.dimensions() {
        println!("  {:<24} {}", dim.name.cyan(), dim.cardinality());
    }
    for name in space.skipped() {
        println!("  {:<24} {}", name.yellow(), "no values (skipped)".yellow());
    }
    println!("{} {}", "Total combinations:".bold(), space.total().to_string().green());
    Ok(())
}

fn cmd_show(path: &Path, index: u64) -> Result<()> {
    let recipe = load_recipe(path)?;
    let space = SweepSpace::new(&recipe);
    if index >= space.total() {
        return Err(eyre!("Index {} is out of range (total {})", index, space.total()));
    }

    let combination = space.combination(index);
    println!("{} {}/{}", "Index:".bold(), index, space.total());
    for assignment in combination.iter() {
        println!("  {:<24} {}", assignment.name.cyan(), assignment.value);
    }
    Ok(())
}

fn cmd_values(path: &Path, name: Option<&str>) -> Result<()> {
    let recipe = load_recipe(path)?;
    let space = SweepSpace::new(&recipe);

    if let Some(name) = name
        && !recipe.parameters.iter().any(|p| p.name == name)
    {
        return Err(eyre!("No parameter named '{}' in {}", name, path.display()));
    }

    for dim in space.dimensions().iter().filter(|d| name.is_none_or(|n| n == d.name)) {
        let values: Vec<String> = dim.values.iter().map(|v| v.to_string()).collect();
        println!("{} ({}): {}", dim.name.cyan(), dim.cardinality(), values.join(", "));
    }
    for skipped in space.skipped().iter().filter(|s| name.is_none_or(|n| n == s.as_str())) {
        println!("{}: {}", skipped.yellow(), "no values".yellow());
    }
    Ok(())
}

async fn cmd_run(config: &Config, recipe: SweepRecipe, sim: SimulationConfig) -> Result<()> {
    let runs_dir = config.runs_dir();
    fs::create_dir_all(&runs_dir).context(format!("Failed to create runs directory {}", runs_dir.display()))?;

    let target = Arc::new(SimulatedTarget::new(sim));
    let bus = Arc::new(EventBus::with_default_capacity());
    let logger = events::spawn_event_logger(&bus, &runs_dir);
    let printer = tokio::spawn(print_progress(bus.subscribe()));

    let sweeper = Sweeper::new(Collaborators::from_target(target), bus.clone(), config);
    let handle = sweeper.handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{}", "Stopping after the current step...".yellow());
            handle.stop();
        }
    });

    let summary = sweeper.run(&recipe).await.context("Sweep failed to start")?;

    drop(sweeper);
    drop(bus);
    if let Err(e) = printer.await {
        warn!(error = %e, "Progress printer ended abnormally");
    }
    if let Err(e) = logger.await {
        warn!(error = %e, "Event logger ended abnormally");
    }

    let mark = if summary.stopped { "■".yellow() } else { "✓".green() };
    println!(
        "{} Run {}: {} processed, {} failed, next index {}",
        mark,
        summary.run_id.cyan(),
        summary.processed,
        summary.failed,
        summary.next_index
    );
    if summary.stopped {
        println!("  resume with: sw resume <recipe> {}", summary.run_id);
    }
    println!("  events: {}", events::run_log_path(&runs_dir, &summary.run_id).display());
    Ok(())
}

async fn cmd_resume(config: &Config, path: &Path, run_id: &str, sim: SimulationConfig) -> Result<()> {
    let recipe = load_recipe(path)?;
    let entries = events::read_run_events(config.runs_dir(), run_id).context("Failed to read run events")?;
    if entries.is_empty() {
        return Err(eyre!("No events recorded for run {}", run_id));
    }

    let Some(checkpoint) = resume_point(&entries) else {
        println!("{} Run {} already completed", "✓".green(), run_id.cyan());
        return Ok(());
    };

    let total = SweepSpace::new(&recipe).total();
    if total != checkpoint.total {
        warn!(logged = checkpoint.total, current = total, "Recipe size differs from the logged run");
        eprintln!(
            "{} recipe now has {} combinations, run logged {}",
            "Warning:".yellow(),
            total,
            checkpoint.total
        );
    }

    info!(run_id, next_index = checkpoint.next_index, "Resuming run");
    println!("Resuming {} at index {}", run_id.cyan(), checkpoint.next_index);
    cmd_run(config, recipe.resume_at(checkpoint.next_index, checkpoint.run_id), sim).await
}

fn cmd_events(config: &Config, run_id: &str) -> Result<()> {
    let entries = events::read_run_events(config.runs_dir(), run_id).context("Failed to read run events")?;
    if entries.is_empty() {
        println!("No events for run {}", run_id);
        return Ok(());
    }

    for entry in entries {
        let ts = entry.timestamp.format("%Y-%m-%d %H:%M:%S%.3f");
        println!("{} {}", ts.to_string().dimmed(), describe(&entry.event));
    }
    Ok(())
}

async fn print_progress(mut rx: broadcast::Receiver<SweepEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                println!("{}", describe(&event));
                if matches!(event, SweepEvent::SweepCompleted { .. }) {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                eprintln!("{} {} events not shown", "Warning:".yellow(), n);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn describe(event: &SweepEvent) -> String {
    match event {
        SweepEvent::SweepStarted {
            run_id,
            recipe,
            start_index,
            total,
        } => format!(
            "{} {} ({}) from index {} of {}",
            "started".bold(),
            recipe,
            run_id.cyan(),
            start_index,
            total
        ),
        SweepEvent::IterationProgress {
            index,
            total,
            combination,
            result,
            ..
        } => {
            let label = match result {
                IterationResult::Captured { .. } => result.label().green(),
                IterationResult::NoResult => result.label().normal(),
                IterationResult::Failed { message } => format!("failed: {}", message).red(),
            };
            format!("[{}/{}] {} -> {}", index + 1, total, combination, label)
        }
        SweepEvent::SweepCompleted {
            processed,
            failed,
            stopped,
            next_index,
            ..
        } => format!(
            "{} {} processed, {} failed, next index {}",
            if *stopped { "stopped".yellow() } else { "completed".green() },
            processed,
            failed,
            next_index
        ),
        SweepEvent::Warning { context, message, .. } => format!("{} [{}] {}", "warning".yellow(), context, message),
        SweepEvent::Error { context, message, .. } => format!("{} [{}] {}", "error".red(), context, message),
    }
}
