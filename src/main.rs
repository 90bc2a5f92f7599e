use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;
use std::fs;
use std::path::PathBuf;

mod cli;

use chrono::NaiveDateTime;
use cli::Cli;
use cli::commands::Commands;
use pacer::capacity::{CapacityInfo, TimeWindow, WindowMode, resolve_window};
use pacer::clock::{Clock, ManualClock, SystemClock};
use pacer::config::{ConfigSource, FileConfigSource, GlobalConfig, MonitorConfig, load_config};
use pacer::monitor::{CapacityMonitor, MonitorEvent, is_blocked};
use pacer::usage::FileUsageProvider;

fn setup_logging(to_stderr: bool, verbose: bool) -> Result<()> {
    let default_filter = if verbose { "debug" } else { "info" };
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter));

    if to_stderr {
        builder.target(env_logger::Target::Stderr).init();
        return Ok(());
    }

    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("pacer")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("pacer.log");

    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    builder.target(env_logger::Target::Pipe(target)).init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

fn run_application(cli: &Cli, global: &GlobalConfig) -> Result<()> {
    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    match &cli.command {
        None => handle_status_command(None, global),
        Some(Commands::Window { at }) => handle_window_command(*at, global),
        Some(Commands::Status { at }) => handle_status_command(*at, global),
        Some(Commands::Watch { json }) => handle_watch_command(cli.config.as_ref(), *json, global),
        Some(Commands::Config) => handle_config_command(global),
    }
}

fn print_window(window: &TimeWindow) {
    let mode = match window.mode {
        WindowMode::Day => window.mode.as_str().green(),
        WindowMode::Night => window.mode.as_str().cyan(),
        WindowMode::OffHours => window.mode.as_str().yellow(),
    };
    println!(
        "{} {} ({:02}:00-{:02}:59, {})",
        "Window:".green(),
        mode,
        window.start_hour,
        window.end_hour,
        if window.is_active { "active" } else { "inactive" }
    );
    println!("  Next change: {}", window.next_transition.format("%Y-%m-%d %H:%M"));
}

fn print_capacity(capacity: &CapacityInfo, blocked: bool) {
    println!(
        "{} {:.1}% of {:.1}% threshold",
        "Capacity:".green(),
        capacity.current_percentage * 100.0,
        capacity.threshold * 100.0
    );
    if blocked {
        println!("  {}", "Dispatch blocked".red());
        if let Some(reason) = &capacity.reason {
            println!("  Reason: {}", reason);
        }
    } else {
        println!("  {}", "Dispatch allowed".green());
    }
}

fn handle_window_command(at: Option<NaiveDateTime>, global: &GlobalConfig) -> Result<()> {
    let config = MonitorConfig::resolve(global);
    let now = at.unwrap_or_else(|| SystemClock.now());
    info!("Resolving window at {}", now);

    print_window(&resolve_window(now, &config));
    Ok(())
}

fn handle_status_command(at: Option<NaiveDateTime>, global: &GlobalConfig) -> Result<()> {
    let config = MonitorConfig::resolve(global);
    let now = at.unwrap_or_else(|| SystemClock.now());
    let usage_file = global.usage.file_path();
    info!("Evaluating capacity at {} from {}", now, usage_file.display());

    let provider = FileUsageProvider::new(&usage_file, global.limits.daily_budget);
    let monitor = CapacityMonitor::with_clock(config.clone(), provider, ManualClock::new(now));

    let window = monitor.current_time_window(None)?;
    let capacity = monitor
        .current_capacity()
        .context(format!("Failed to read usage from {}", usage_file.display()))?;

    print_window(&window);
    print_capacity(&capacity, is_blocked(&capacity, &window, &config));
    Ok(())
}

fn print_event(event: &MonitorEvent, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(event)?);
        return Ok(());
    }

    match event {
        MonitorEvent::CapacityRestored(e) => println!(
            "{} {} ({} window, {:.1}% -> {:.1}%)",
            "Restored:".green(),
            e.reason,
            e.time_window.mode,
            e.previous_capacity.current_percentage * 100.0,
            e.new_capacity.current_percentage * 100.0
        ),
        MonitorEvent::CapacityExhausted(e) => println!(
            "{} {} window, {}",
            "Exhausted:".red(),
            e.time_window.mode,
            e.capacity.reason.as_deref().unwrap_or("outside active hours")
        ),
        MonitorEvent::CapacityWarning(e) => println!(
            "{} {:.1}% of {:.1}% threshold",
            "Warning:".yellow(),
            e.percentage * 100.0,
            e.threshold * 100.0
        ),
        MonitorEvent::MonitorStarted => println!("{}", "Monitor started".cyan()),
        MonitorEvent::MonitorStopped => println!("{}", "Monitor stopped".cyan()),
        MonitorEvent::MonitorError(e) => println!("{} {}", "Error:".red(), e.error),
    }
    Ok(())
}

async fn watch<C: ConfigSource + 'static>(source: C, global: &GlobalConfig, json: bool) -> Result<()> {
    let provider = FileUsageProvider::new(global.usage.file_path(), global.limits.daily_budget);
    let monitor = CapacityMonitor::new(source, provider);
    monitor.on_any(move |event| print_event(event, json));

    monitor.start().context("Failed to start capacity monitor")?;
    tokio::signal::ctrl_c().await.context("Failed to wait for Ctrl-C")?;

    info!("Ctrl-C received, shutting down");
    monitor.destroy();
    Ok(())
}

fn handle_watch_command(config_path: Option<&PathBuf>, json: bool, global: &GlobalConfig) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;

    match config_path {
        // An explicit file is re-read on every tick so edits apply live
        Some(path) => {
            info!("Watching with live config from {}", path.display());
            runtime.block_on(watch(FileConfigSource::new(path), global, json))
        }
        None => runtime.block_on(watch(MonitorConfig::resolve(global), global, json)),
    }
}

fn handle_config_command(global: &GlobalConfig) -> Result<()> {
    let config = MonitorConfig::resolve(global);
    print!("{}", config.to_yaml().context("Failed to render config")?);
    println!("usage_file: {}", global.usage.file_path().display());
    println!("daily_budget: {}", global.limits.daily_budget);

    let warnings = global.warnings();
    if warnings.is_empty() {
        println!("{}", "Configuration OK".green());
    } else {
        for warning in warnings {
            println!("{} {}", "Warning:".yellow(), warning);
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Setup logging
    setup_logging(cli.log_stderr, cli.verbose).context("Failed to setup logging")?;

    // Load configuration
    let global = load_config(cli.config.as_ref()).context("Failed to load configuration")?;

    info!("Starting with config from: {:?}", cli.config);

    // Run the main application logic
    run_application(&cli, &global).context("Application failed")?;

    Ok(())
}
