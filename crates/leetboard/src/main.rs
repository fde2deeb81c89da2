mod server;

use std::fs;
use std::path::PathBuf;
use std::sync::mpsc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use leetboard_core::config::{Settings, load_config};
use leetboard_core::export::render_csv;
use leetboard_core::fetch::LeetcodeClient;
use leetboard_core::pins::PinStore;
use leetboard_core::pipeline::{CyclePlan, run_cycle};
use leetboard_core::runtime::{
    InitOptions, PathOverrides, ResolutionContext, ResolvedPaths, init_layout, inspect_runtime,
    normalize_for_display, resolve_paths,
};
use leetboard_core::scheduler::Scheduler;
use leetboard_core::snapshot::load_snapshot;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::server::AppState;

#[derive(Debug, Parser)]
#[command(
    name = "leetboard",
    version,
    about = "Class leaderboard of LeetCode solve counts, refreshed on a schedule"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH")]
    project_root: Option<PathBuf>,
    #[arg(long, global = true, value_name = "PATH")]
    data_dir: Option<PathBuf>,
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Print resolved runtime diagnostics")]
    diagnostics: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone)]
struct RuntimeOptions {
    project_root: Option<PathBuf>,
    data_dir: Option<PathBuf>,
    config: Option<PathBuf>,
    diagnostics: bool,
}

impl RuntimeOptions {
    fn from_cli(cli: &Cli) -> Self {
        Self {
            project_root: cli.project_root.clone(),
            data_dir: cli.data_dir.clone(),
            config: cli.config.clone(),
            diagnostics: cli.diagnostics,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Serve GET /data and POST /pin/{roll} while refreshing on a schedule
    Serve(ServeArgs),
    /// Run one refresh cycle and exit
    Refresh,
    /// Toggle the pin for a roll number
    Pin(PinArgs),
    /// Show resolved paths, file presence and settings
    Status,
    /// Create empty roster files and a default config.toml
    Init(InitArgs),
    /// Write the current snapshot as CSV
    ExportCsv(ExportCsvArgs),
}

#[derive(Debug, Args, Default)]
struct ServeArgs {
    #[arg(long, value_name = "ADDR", help = "Override the configured bind address")]
    bind: Option<String>,
    #[arg(long, help = "Serve existing files without running refresh cycles")]
    no_refresh: bool,
}

#[derive(Debug, Args)]
struct PinArgs {
    roll: String,
}

#[derive(Debug, Args)]
struct InitArgs {
    #[arg(long, help = "Overwrite an existing config.toml")]
    force: bool,
}

#[derive(Debug, Args)]
struct ExportCsvArgs {
    #[arg(long, value_name = "PATH", help = "Write to a file instead of stdout")]
    output: Option<PathBuf>,
    #[arg(long, value_name = "SECTION", help = "Only export one section")]
    section: Option<String>,
}

fn main() -> Result<()> {
    init_tracing()?;
    let cli = Cli::parse();
    let runtime = RuntimeOptions::from_cli(&cli);

    match cli.command {
        Some(Commands::Serve(args)) => run_serve(&runtime, args),
        Some(Commands::Refresh) => run_refresh(&runtime),
        Some(Commands::Pin(PinArgs { roll })) => run_pin(&runtime, &roll),
        Some(Commands::Status) => run_status(&runtime),
        Some(Commands::Init(args)) => run_init(&runtime, args),
        Some(Commands::ExportCsv(args)) => run_export_csv(&runtime, args),
        None => run_serve(&runtime, ServeArgs::default()),
    }
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive("info".parse()?)
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn run_serve(runtime: &RuntimeOptions, args: ServeArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let settings = load_settings(&paths)?;
    let bind = args.bind.unwrap_or_else(|| settings.bind.clone());
    if runtime.diagnostics {
        println!("[diagnostics]\n{}\n", paths.diagnostics());
    }

    // The blocking client owns its own runtime, so it is built before ours starts.
    let refresh = if args.no_refresh {
        None
    } else {
        let plan = CyclePlan::from_paths(&paths, &settings.profile_prefix);
        Some(Scheduler::new(
            plan,
            LeetcodeClient::new(&settings)?,
            settings.interval,
        ))
    };
    let state = AppState::new(paths.snapshot_path.clone(), paths.pins_path.clone());

    let tokio_runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    tokio_runtime.block_on(async move {
        // Dropping the sender after the server exits stops the scheduler.
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let scheduler = match refresh {
            Some(scheduler) => {
                info!(
                    interval_secs = scheduler.interval().as_secs(),
                    api = %settings.api_base_url,
                    "starting refresh scheduler"
                );
                Some(tokio::task::spawn_blocking(move || scheduler.run(stop_rx)))
            }
            None => {
                info!("refresh disabled, serving existing files");
                None
            }
        };

        let served = server::serve(&bind, state).await;
        drop(stop_tx);
        if let Some(handle) = scheduler {
            info!("waiting for the refresh scheduler to stop");
            let cycles = handle.await.context("refresh scheduler panicked")?;
            info!(cycles, "refresh scheduler joined");
        }
        served
    })
}

fn run_refresh(runtime: &RuntimeOptions) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let settings = load_settings(&paths)?;
    let plan = CyclePlan::from_paths(&paths, &settings.profile_prefix);
    let client = LeetcodeClient::new(&settings)?;
    let report = run_cycle(&plan, &client)?;

    println!("refresh complete");
    println!("snapshot_path: {}", normalize_for_display(&paths.snapshot_path));
    println!("students: {}", report.students);
    println!("fetched: {}", report.fetched);
    println!("skipped: {}", report.skipped);
    println!("failed: {}", report.failed);
    println!("pinned: {}", report.pinned);
    if runtime.diagnostics {
        println!("\n[diagnostics]\n{}", paths.diagnostics());
    }
    Ok(())
}

fn run_pin(runtime: &RuntimeOptions, roll: &str) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let store = PinStore::new(&paths.pins_path);
    let toggle = store.toggle(roll)?;

    println!("{}", toggle.message(roll.trim()));
    println!("pins_path: {}", normalize_for_display(store.path()));
    println!("pinned_count: {}", store.read().len());
    println!("note: takes effect on the next refresh cycle");
    Ok(())
}

fn run_status(runtime: &RuntimeOptions) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let status = inspect_runtime(&paths)?;
    let settings = load_settings(&paths)?;

    println!("project_root: {}", normalize_for_display(&paths.project_root));
    println!("data_dir: {}", normalize_for_display(&paths.data_dir));
    println!(
        "roster_files: {}/{}",
        status.roster_files_present,
        paths.roster.all().len()
    );
    println!("pins_exists: {}", format_flag(status.pins_exists));
    println!("snapshot_exists: {}", format_flag(status.snapshot_exists));
    if let Some(size) = status.snapshot_size_bytes {
        println!("snapshot_size_bytes: {size}");
    }
    println!(
        "config_path: {} (exists: {})",
        normalize_for_display(&paths.config_path),
        format_flag(status.config_exists)
    );
    println!("api_base_url: {}", settings.api_base_url);
    println!("interval_secs: {}", settings.interval.as_secs());
    println!("bind: {}", settings.bind);
    for warning in &status.warnings {
        println!("warning: {warning}");
    }
    if runtime.diagnostics {
        println!("\n[diagnostics]\n{}", paths.diagnostics());
    }
    Ok(())
}

fn run_init(runtime: &RuntimeOptions, args: InitArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let report = init_layout(&paths, &InitOptions { force: args.force })?;

    println!("Initialized leetboard layout");
    println!("project_root: {}", normalize_for_display(&paths.project_root));
    println!("data_dir: {}", normalize_for_display(&paths.data_dir));
    println!("config_path: {}", normalize_for_display(&paths.config_path));
    println!("created_dirs: {}", report.created_dirs.len());
    println!("created_roster_files: {}", report.created_roster_files.len());
    println!("wrote_config: {}", format_flag(report.wrote_config));
    if runtime.diagnostics {
        println!("\n[diagnostics]\n{}", paths.diagnostics());
    }
    Ok(())
}

fn run_export_csv(runtime: &RuntimeOptions, args: ExportCsvArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let records = load_snapshot(&paths.snapshot_path)?.unwrap_or_default();
    let csv = render_csv(&records, args.section.as_deref())?;

    match args.output {
        Some(output) => {
            fs::write(&output, csv)
                .with_context(|| format!("failed to write {}", output.display()))?;
            println!("exported: {}", normalize_for_display(&output));
            if let Some(section) = &args.section {
                println!("section: {section}");
            }
        }
        None => print!("{csv}"),
    }
    Ok(())
}

fn load_settings(paths: &ResolvedPaths) -> Result<Settings> {
    Ok(load_config(&paths.config_path)?.settings())
}

fn resolve_runtime_paths(runtime: &RuntimeOptions) -> Result<ResolvedPaths> {
    dotenvy::dotenv().ok();

    let context = ResolutionContext::from_process()?;
    let overrides = PathOverrides {
        project_root: runtime.project_root.clone(),
        data_dir: runtime.data_dir.clone(),
        config: runtime.config.clone(),
    };

    let initial = resolve_paths(&context, &overrides);
    let project_env = initial.project_root.join(".env");
    if project_env.exists() {
        let _ = dotenvy::from_path_override(&project_env);
        return Ok(resolve_paths(&context, &overrides));
    }
    Ok(initial)
}

fn format_flag(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}
