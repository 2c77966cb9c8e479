// yba-ctl entry point
//
// Parses the command line, sets up logging, wires the production collaborators into
// the orchestrator and maps the outcome to an exit code.

use clap::Parser;
use log::{error, info};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use yba_ctl::backup::ShellScriptRunner;
use yba_ctl::cli::{Cli, Command};
use yba_ctl::config::{ConfigLocation, InstallerConfig};
use yba_ctl::database::connection::PostgresAdmin;
use yba_ctl::error::{InstallerError, InstallerResult};
use yba_ctl::installation::state_store::StateStore;
use yba_ctl::orchestrator::prompt::StdinConfirmer;
use yba_ctl::orchestrator::{
    default_check_sets, InstallOptions, Orchestrator, OrchestratorContext, OrchestratorParts,
    UpgradeOptions, VERSION_METADATA_FILE,
};
use yba_ctl::preflight::{failed_checks, format_results, should_fail};
use yba_ctl::services::{format_statuses, production_services, ServiceEnv};
use yba_ctl::utils::version::read_version_metadata;

fn main() {
    let cli = Cli::parse();

    let exe_path = match std::env::current_exe() {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error: cannot locate the yba-ctl binary: {}", e);
            std::process::exit(1);
        }
    };
    let mut context = OrchestratorContext {
        exe_path,
        config_path: PathBuf::new(),
        bundle_version: None,
    };
    // An installed yba-ctl finds the yba-ctl.yml that install copied beside it.
    let location = ConfigLocation::resolve(cli.config.as_deref(), &context.exe_dir());
    let config = match InstallerConfig::load_from(&location) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    context.config_path = location.path;

    let log_dir = yba_ctl::resolve_log_dir(&config.layout());
    if let Err(e) = yba_ctl::init_logging(cli.log_level.into(), &log_dir) {
        eprintln!("Warning: file logging unavailable ({}); continuing without it", e);
    }

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: failed to start async runtime: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(run(cli, config, context)) {
        error!(target: yba_ctl::FATAL_LOG_TARGET, "[PHASE: finalization] {}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: InstallerConfig, context: OrchestratorContext) -> InstallerResult<()> {
    let exe_dir = context.exe_dir();
    let bundle_version = read_version_metadata(&exe_dir.join(VERSION_METADATA_FILE))
        .await
        .ok();
    info!(
        "[PHASE: initialization] yba-ctl running from {:?}, bundle version {}, config {:?}",
        exe_dir,
        bundle_version.as_deref().unwrap_or("unknown"),
        context.config_path
    );

    let layout = config.layout();
    let env = ServiceEnv::new(
        config.clone(),
        exe_dir,
        bundle_version.clone().unwrap_or_else(|| "unknown".to_string()),
    );
    let registry = production_services(Arc::new(env))?;
    let install_root: PathBuf = layout.root().to_path_buf();

    let orchestrator = Orchestrator::new(OrchestratorParts {
        state_store: StateStore::new(layout.state_file()),
        script_runner: Arc::new(ShellScriptRunner {
            timeout: config.timeouts.script_secs.map(Duration::from_secs),
        }),
        db_admin: Arc::new(PostgresAdmin::default()),
        confirmer: Arc::new(StdinConfirmer { force: cli.force }),
        context: OrchestratorContext {
            bundle_version,
            ..context
        },
        check_sets: default_check_sets,
        config,
        layout,
        registry,
    });

    match cli.command {
        Command::Install {
            preflight,
            license_path,
        } => {
            orchestrator
                .install(&InstallOptions {
                    skip_preflight: preflight.skip_preflight,
                    license_path,
                })
                .await?;
        }
        Command::Upgrade {
            preflight,
            skip_version_checks,
        } => {
            orchestrator
                .upgrade(&UpgradeOptions {
                    skip_preflight: preflight.skip_preflight,
                    skip_version_checks,
                })
                .await?;
        }
        Command::CreateBackup(args) => {
            let req = args.to_request(&install_root);
            orchestrator
                .create_backup(&req, &args.preflight.skip_preflight)
                .await?;
        }
        Command::RestoreBackup(args) => {
            let req = args.to_request(&install_root);
            orchestrator
                .restore_backup(&req, &args.preflight.skip_preflight)
                .await?;
        }
        Command::Preflight { preflight } => {
            let results = orchestrator.preflight(&preflight.skip_preflight).await?;
            println!("{}", format_results(&results));
            if should_fail(&results) {
                return Err(InstallerError::PreflightFailed {
                    operation: "preflight".to_string(),
                    failed: failed_checks(&results),
                });
            }
        }
        Command::Status => {
            let report = orchestrator.status().await?;
            println!(
                "YugabyteDB Anywhere version: {}",
                report.version.as_deref().unwrap_or("unknown")
            );
            println!("{}", format_statuses(&report.statuses));
        }
        Command::Start => orchestrator.start_all().await?,
        Command::Stop => orchestrator.stop_all().await?,
        Command::Restart => orchestrator.restart_all().await?,
    }
    Ok(())
}
