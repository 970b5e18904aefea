//! hostprobe - host diagnostics runner
//!
//! Main entry point. Parses the CLI, loads configuration, initializes
//! logging and dispatches to the command handlers below.

mod capture;
mod cli;
mod config;
mod error;
mod locator;
mod logging;
mod network;
mod orchestrator;
mod platform;
mod presets;
mod sandbox;
mod strategy;
mod system;
mod version;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};

use crate::cli::{Cli, Commands, RunArgs};
use crate::config::HostprobeConfig;
use crate::error::{Error, ErrorCode, Result};
use crate::locator::{BinaryLocator, LocateReport};
use crate::network::{FixedProbe, NetworkProbe, NetworkStatus, TcpProbe};
use crate::orchestrator::{
    ConsoleObserver, Orchestrator, OrchestratorSettings, RunConfig, TestSelection,
};
use crate::platform::Platform;
use crate::presets::PRESETS;
use crate::sandbox::SandboxBridge;
use crate::strategy::{
    ExecutionMode, ExecutionRequest, ExecutionStrategy, InProcessStrategy, ProcessStrategy,
};
use crate::system::BuiltinProbes;

fn main() -> Result<()> {
    // Parse CLI arguments first (before logging, so we know verbosity)
    let cli = Cli::parse();

    // Commands that don't need a configuration
    match &cli.command {
        Commands::Version => {
            version::print_version();
            return Ok(());
        }
        Commands::Presets => {
            print_presets();
            return Ok(());
        }
        Commands::Config { subcommand } => {
            logging::init_simple(tracing::Level::WARN)?;
            return handle_config_command(subcommand.clone());
        }
        _ => {}
    }

    let config_path = match &cli.command {
        Commands::Run(args) => args.config.clone(),
        Commands::Locate { config, .. } => config.clone(),
        _ => None,
    };

    let mut config = match HostprobeConfig::load(config_path.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => exit_with(&e),
    };

    // The guards must be kept alive for the lifetime of the program
    let log_guards = logging::init_logging(&config.logging, cli.verbose, cli.quiet)?;

    let build = version::build_info();
    info!(
        version = %build.full_version(),
        target = %build.target,
        profile = %build.profile,
        "Starting hostprobe"
    );

    let result = match cli.command {
        Commands::Run(args) => {
            apply_run_overrides(&mut config, &args).and_then(|_| run_diagnostics(config, &args, cli.quiet))
        }
        Commands::Locate { json, .. } => locate(&config, json),
        Commands::Version | Commands::Presets | Commands::Config { .. } => {
            // Already handled above
            unreachable!();
        }
    };

    match result {
        Ok(0) => Ok(()),
        Ok(code) => {
            drop(log_guards);
            std::process::exit(code);
        }
        Err(e) => {
            error!(error = %e.format_for_log(), "Command failed");
            drop(log_guards);
            exit_with(&e)
        }
    }
}

/// Print a terminal-formatted error and exit with its code
fn exit_with(e: &Error) -> ! {
    eprint!("{}", e.format_for_terminal());
    std::process::exit(e.exit_code());
}

// ─────────────────────────────────────────────────────────────────
// run
// ─────────────────────────────────────────────────────────────────

/// Fold command-line options over the loaded configuration
fn apply_run_overrides(config: &mut HostprobeConfig, args: &RunArgs) -> Result<()> {
    if let Some(tests) = &args.tests {
        config.selection.tests = Some(TestSelection::parse_list(tests)?);
        config.selection.preset = None;
    } else if let Some(preset) = args.preset {
        config.selection.preset = Some(preset);
        config.selection.tests = None;
    }

    if let Some(mode) = args.mode {
        config.helper.mode = mode;
    }

    let run = &mut config.run;
    if let Some(language) = args.language {
        run.language = language;
    }
    if let Some(method) = args.cpu_method {
        run.cpu_method = method;
    }
    if let Some(mode) = args.thread_mode {
        run.thread_mode = mode;
    }
    if let Some(method) = args.memory_method {
        run.memory_method = method;
    }
    if let Some(method) = args.disk_method {
        run.disk_method = method;
    }
    if let Some(path) = &args.disk_path {
        run.disk_path = Some(shellexpand::tilde(path).into_owned());
    }
    if args.disk_multi {
        run.disk_multi_check = true;
    }
    if let Some(location) = args.nt3_location {
        run.nt3_location = location;
    }
    if let Some(kind) = args.nt3_type {
        run.nt3_type = kind;
    }
    if let Some(nodes) = args.speed_nodes {
        run.speed_nodes = nodes;
    }

    if let Some(path) = &args.output {
        config.output.transcript = Some(shellexpand::tilde(path).into_owned());
    }

    config.validate()
}

/// Selection and run options after presets are applied.
///
/// Explicit tests win over a preset, which wins over the default set.
fn resolve_selection(config: &HostprobeConfig) -> Result<(TestSelection, RunConfig)> {
    let mut run = config.run.clone();
    let selection = match (&config.selection.tests, config.selection.preset) {
        (Some(tests), _) => tests.clone(),
        (None, Some(number)) => {
            let preset = presets::find(number)?;
            preset.adjust(&mut run);
            preset.selection()
        }
        (None, None) => presets::default_selection(),
    };
    Ok((selection, run))
}

/// Handle `hostprobe run`; returns the process exit code
fn run_diagnostics(config: HostprobeConfig, args: &RunArgs, quiet: bool) -> Result<i32> {
    let platform = Platform::detect();
    let (selection, run_config) = resolve_selection(&config)?;

    info!(
        platform = %platform,
        mode = %config.helper.mode,
        tests = %selection,
        "Run configuration resolved"
    );

    if args.dry_run {
        dry_run(&config, &platform, &selection, &run_config)?;
        return Ok(0);
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(num_cpus::get().clamp(2, 8))
        .thread_name("hostprobe")
        .build()
        .map_err(|e| Error::Internal(format!("Failed to create async runtime: {}", e)))?;

    runtime.block_on(async_run(config, platform, selection, run_config, quiet))
}

async fn async_run(
    config: HostprobeConfig,
    platform: Platform,
    selection: TestSelection,
    run_config: RunConfig,
    quiet: bool,
) -> Result<i32> {
    let strategy: Arc<dyn ExecutionStrategy> = match config.helper.mode {
        ExecutionMode::Process => Arc::new(ProcessStrategy::new(
            BinaryLocator::from_settings(&config.helper),
            platform,
        )),
        ExecutionMode::InProcess => Arc::new(InProcessStrategy::new(BuiltinProbes::new(platform))),
    };
    let network: Arc<dyn NetworkProbe> =
        if config.network.ipv4_targets.is_empty() && config.network.ipv6_targets.is_empty() {
            info!("No precheck targets configured, treating the network as unreachable");
            Arc::new(FixedProbe(NetworkStatus::unreachable()))
        } else {
            Arc::new(TcpProbe::from_strings(
                &config.network.ipv4_targets,
                &config.network.ipv6_targets,
            ))
        };
    let settings = OrchestratorSettings {
        network_timeout: config.network.timeout(),
        output_limit: config.output.limit_bytes,
    };

    let orchestrator = Orchestrator::new(strategy, network, platform, settings);
    let observer = Arc::new(ConsoleObserver::new(!quiet));
    let handle = orchestrator
        .start(selection, run_config, observer)?
        .ok_or_else(|| Error::Internal("a run is already in progress".to_string()))?;

    // Ctrl+C asks the run to stop at the next section boundary
    let cancel = handle.cancel_signal();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling run");
            cancel.cancel();
        }
    });

    let sink = handle.output();
    let report = handle.wait().await;
    interrupt.abort();

    info!(
        status = %report.status,
        sections = report.sections.len(),
        dropped_bytes = sink.dropped_bytes(),
        "Run complete"
    );

    if let Some(path) = &config.output.transcript {
        if let Err(e) = write_transcript(Path::new(path), &sink.contents()) {
            error!(error = %format!("{:#}", e), "Transcript not written");
            eprintln!("✗ {:#}", e);
            if report.exit_code() == 0 {
                return Ok(ErrorCode::IoWrite.exit_code());
            }
        }
    }

    Ok(report.exit_code())
}

fn write_transcript(path: &Path, text: &str) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    std::fs::write(path, text)
        .with_context(|| format!("writing transcript to {}", path.display()))?;
    info!(path = %path.display(), bytes = text.len(), "Transcript written");
    Ok(())
}

/// Print the command a run would execute
fn dry_run(
    config: &HostprobeConfig,
    platform: &Platform,
    selection: &TestSelection,
    run_config: &RunConfig,
) -> Result<()> {
    if config.helper.mode == ExecutionMode::InProcess {
        println!("in-process: built-in probes [{}] on {}", selection, platform);
        return Ok(());
    }

    let locator = BinaryLocator::from_settings(&config.helper);
    let handle = locator.locate(platform)?;
    let request = if platform.sandboxed {
        let (bridge, notice) = SandboxBridge::prepare(locator.search_context(), platform.arch);
        eprint!("{}", notice);
        ExecutionRequest::sandboxed(&bridge, handle.path(), selection, run_config)
    } else {
        ExecutionRequest::build(handle.path(), selection, run_config)
    };

    println!("{}", request.preview());
    if handle.owns_lifecycle() {
        eprintln!("note: extracted helper is removed on exit");
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────
// locate / presets / config
// ─────────────────────────────────────────────────────────────────

/// Handle `hostprobe locate`; exits non-zero when nothing was found
fn locate(config: &HostprobeConfig, json: bool) -> Result<i32> {
    let platform = Platform::detect();
    let locator = BinaryLocator::from_settings(&config.helper);
    let report = LocateReport::collect(&locator, &platform);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Platform : {}", report.platform);
        match (&report.helper, report.found_by) {
            (Some(path), Some(strategy)) => {
                println!("Helper   : {}", path.display());
                println!("Found by : {}", strategy);
            }
            _ => println!("Helper   : not found"),
        }
        if report.platform.sandboxed {
            match &report.shim {
                Some(shim) => println!("Shim     : {}", shim.display()),
                None => println!("Shim     : not found (helper would run directly)"),
            }
        }
        if report.helper.is_none() {
            println!();
            for attempt in &report.attempts {
                println!("- {} ({} paths checked)", attempt.strategy, attempt.checked.len());
                for path in &attempt.checked {
                    println!("    {}", path.display());
                }
                if let Some(note) = &attempt.note {
                    println!("    {}", note);
                }
            }
            if let Some(error) = &report.error {
                println!("\n{}", error);
            }
        }
    }

    Ok(if report.helper.is_some() {
        0
    } else {
        ErrorCode::HelperNotFound.exit_code()
    })
}

fn print_presets() {
    for preset in PRESETS.iter() {
        let extra = if preset.all_route_locations {
            " (route from all locations)"
        } else {
            ""
        };
        println!(
            "{:>2}  {:<16} {}{}",
            preset.number,
            preset.name,
            preset.selection(),
            extra
        );
    }
}

/// Handle configuration subcommands
fn handle_config_command(subcommand: cli::ConfigSubcommand) -> Result<()> {
    use cli::ConfigSubcommand;

    match subcommand {
        ConfigSubcommand::Show { config } => {
            let cfg = HostprobeConfig::load(config.as_deref())?;
            println!("{}", toml::to_string_pretty(&cfg)?);
        }
        ConfigSubcommand::Init { path, force } => {
            let written = config::init_config(path.as_deref(), force)?;
            println!("Configuration written to {}", written.display());
        }
        ConfigSubcommand::Validate { config } => {
            match HostprobeConfig::load(config.as_deref()) {
                Ok(_) => {
                    println!("Configuration is valid.");
                }
                Err(e) => exit_with(&e),
            }
        }
    }

    Ok(())
}
