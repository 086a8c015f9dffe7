use clap::Parser;
use mimalloc::MiMalloc;
use regent::{Config, LoadRequest, ModuleOutcome, ProcessLock, RegistryCache};
use std::{path::PathBuf, process::ExitCode, sync::Arc};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Install, upgrade and remove modules of one database.
#[derive(Debug, Parser)]
#[command(name = "regent", version)]
struct Cli {
    /// Database to load.
    #[arg(short = 'd', long = "database")]
    database: String,

    /// Modules to install (comma separated).
    #[arg(short = 'i', long = "init", value_delimiter = ',')]
    init: Vec<String>,

    /// Modules to upgrade (comma separated).
    #[arg(short = 'u', long = "update", value_delimiter = ',')]
    update: Vec<String>,

    /// Modules to remove, with everything depending on them (comma separated).
    #[arg(long, value_delimiter = ',')]
    uninstall: Vec<String>,

    /// Skip demo data of newly installed modules.
    #[arg(long)]
    without_demo: bool,

    /// Addons directories, overriding `basic.addons_path` (comma separated).
    #[arg(long, value_delimiter = ',')]
    addons_path: Vec<PathBuf>,

    /// Configuration file; `regent.toml` is used when present.
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut cfg = match Config::load(cli.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("regent: {err}");
            return ExitCode::from(2);
        }
    };
    if !cli.addons_path.is_empty() {
        cfg.basic.addons_path = cli.addons_path;
    }
    cfg.basic.without_demo |= cli.without_demo;

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cfg.basic.loglevel.clone()));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_level(true)
                .with_target(false),
        )
        .init();

    info!(
        database = %cli.database,
        data_dir = %cfg.basic.data_dir.display(),
        addons_path = ?cfg.basic.addons_path,
        server_series = %cfg.basic.server_series,
        loglevel = %cfg.basic.loglevel,
        multi_process = cfg.registry.multi_process
    );

    let request = LoadRequest::new()
        .install(cli.init)
        .upgrade(cli.update)
        .remove(cli.uninstall)
        .with_demo(!cfg.basic.without_demo);

    let cache = RegistryCache::new(cfg, Arc::new(ProcessLock::new()));
    let code = match cache.new_registry(&cli.database, &request).await {
        Ok((registry, report)) => {
            for entry in report.failures().chain(report.skipped()) {
                match &entry.outcome {
                    ModuleOutcome::Failed { phase, error } => {
                        error!(module = %entry.module, %phase, %error, "module failed");
                    }
                    ModuleOutcome::Skipped { blocked_by } => {
                        warn!(module = %entry.module, %blocked_by, "module skipped");
                    }
                    _ => {}
                }
            }
            info!(
                database = %cli.database,
                modules = registry.loaded_modules().len(),
                models = registry.models().len(),
                installed = ?report.installed(),
                removed = ?report.removed(),
                warnings = report.warnings,
                "load finished"
            );
            ExitCode::from(u8::try_from(report.exit_code()).unwrap_or(1))
        }
        Err(err) => {
            error!(database = %cli.database, error = %err, "load aborted");
            ExitCode::FAILURE
        }
    };

    cache.clear_all().await;
    code
}
