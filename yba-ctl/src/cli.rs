// Command-line surface
//
// Flag spellings (snake_case, `createBackup`/`restoreBackup`) are what operators and
// existing automation already type; keep them stable.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

use crate::models::requests::{BackupRequest, RestoreRequest};

#[derive(Debug, Parser)]
#[command(
    name = "yba-ctl",
    version,
    about = "Install, upgrade, back up and restore YugabyteDB Anywhere on this host"
)]
pub struct Cli {
    /// Installer configuration file. Defaults to the yba-ctl.yml beside this binary,
    /// then /opt/yba-ctl/yba-ctl.yml.
    #[arg(long, global = true, env = "YBA_CTL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Console log level (the log files always record debug).
    #[arg(long = "log_level", global = true, value_enum, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,

    /// Answer yes to every confirmation prompt.
    #[arg(short = 'f', long, global = true)]
    pub force: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Clone, Default, Args)]
pub struct SkipPreflight {
    /// Preflight checks to skip, by name (comma-separated, repeatable).
    #[arg(short = 's', long = "skip_preflight", value_delimiter = ',', value_name = "CHECKS")]
    pub skip_preflight: Vec<String>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Install YugabyteDB Anywhere from this bundle.
    Install {
        #[command(flatten)]
        preflight: SkipPreflight,
        /// License file to install alongside YugabyteDB Anywhere.
        #[arg(short = 'l', long = "license-path")]
        license_path: Option<PathBuf>,
    },
    /// Upgrade the existing installation to this bundle's version.
    Upgrade {
        #[command(flatten)]
        preflight: SkipPreflight,
        /// Upgrade even if this bundle is not newer than the installed version.
        #[arg(long = "skip_version_checks")]
        skip_version_checks: bool,
    },
    /// Create a backup of the installation.
    #[command(name = "createBackup")]
    CreateBackup(CreateBackupArgs),
    /// Restore a backup created by createBackup (or a yugabundle backup).
    #[command(name = "restoreBackup")]
    RestoreBackup(RestoreBackupArgs),
    /// Run preflight checks and print the results.
    Preflight {
        #[command(flatten)]
        preflight: SkipPreflight,
    },
    /// Show the status of every service.
    Status,
    /// Start every service in dependency order.
    Start,
    /// Stop every service in reverse dependency order.
    Stop,
    /// Restart every service in dependency order.
    Restart,
}

#[derive(Debug, Clone, Args)]
pub struct CreateBackupArgs {
    /// Directory the backup archive is written to.
    #[arg(value_name = "outputPath")]
    pub output_path: PathBuf,

    /// Data directory to back up (defaults to the install root).
    #[arg(long = "data_dir")]
    pub data_dir: Option<PathBuf>,

    #[arg(long = "exclude_prometheus", alias = "exclude-prometheus")]
    pub exclude_prometheus: bool,

    /// Don't restart processes during execution.
    #[arg(long = "skip_restart")]
    pub skip_restart: bool,

    #[arg(long)]
    pub verbose: bool,

    #[command(flatten)]
    pub preflight: SkipPreflight,
}

impl CreateBackupArgs {
    pub fn to_request(&self, install_root: &Path) -> BackupRequest {
        BackupRequest {
            output_path: self.output_path.clone(),
            data_dir: self
                .data_dir
                .clone()
                .unwrap_or_else(|| install_root.to_path_buf()),
            exclude_prometheus: self.exclude_prometheus,
            skip_restart: self.skip_restart,
            verbose: self.verbose,
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct RestoreBackupArgs {
    /// Backup archive (.tar.gz) to restore.
    #[arg(value_name = "inputPath")]
    pub input_path: PathBuf,

    /// Where to un-tar the backup (defaults to the install root).
    #[arg(long)]
    pub destination: Option<PathBuf>,

    #[arg(long = "skip_restart")]
    pub skip_restart: bool,

    #[arg(long)]
    pub verbose: bool,

    /// Restore from a yugabundle installation backup.
    #[arg(long)]
    pub yugabundle: bool,

    /// Use pg_restore from $PATH instead of the bundled binary.
    #[arg(long = "use_system_pg")]
    pub use_system_pg: bool,

    /// Don't drop the yugaware database before a yugabundle restore.
    #[arg(long = "skip_dbdrop")]
    pub skip_dbdrop: bool,

    #[command(flatten)]
    pub preflight: SkipPreflight,
}

impl RestoreBackupArgs {
    pub fn to_request(&self, install_root: &Path) -> RestoreRequest {
        RestoreRequest {
            input_path: self.input_path.clone(),
            destination: self
                .destination
                .clone()
                .unwrap_or_else(|| install_root.to_path_buf()),
            skip_restart: self.skip_restart,
            verbose: self.verbose,
            yugabundle: self.yugabundle,
            use_system_pg: self.use_system_pg,
            skip_dbdrop: self.skip_dbdrop,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn skip_list_splits_on_commas_and_repeats() {
        let cli = Cli::try_parse_from([
            "yba-ctl",
            "install",
            "--skip_preflight",
            "disk_space,ports",
            "-s",
            "cpu",
        ])
        .unwrap();
        match cli.command {
            Command::Install {
                preflight,
                license_path,
            } => {
                assert_eq!(preflight.skip_preflight, vec!["disk_space", "ports", "cpu"]);
                assert_eq!(license_path, None);
            }
            other => panic!("parsed {:?}", other),
        }
        assert_eq!(cli.config, None);
        assert_eq!(cli.log_level, LogLevel::Info);
    }

    #[test]
    fn install_takes_license_path() {
        for flag in ["-l", "--license-path"] {
            let cli = Cli::try_parse_from(["yba-ctl", "install", flag, "/tmp/yba.lic"]).unwrap();
            let Command::Install { license_path, .. } = cli.command else {
                panic!("expected install");
            };
            assert_eq!(license_path, Some(PathBuf::from("/tmp/yba.lic")));
        }
    }

    #[test]
    fn create_backup_accepts_both_exclude_spellings() {
        for flag in ["--exclude_prometheus", "--exclude-prometheus"] {
            let cli = Cli::try_parse_from(["yba-ctl", "createBackup", "/backups", flag]).unwrap();
            let Command::CreateBackup(args) = cli.command else {
                panic!("expected createBackup");
            };
            let req = args.to_request(Path::new("/opt/yugabyte"));
            assert!(req.exclude_prometheus);
            assert_eq!(req.data_dir, PathBuf::from("/opt/yugabyte"));
            assert!(!req.verbose);
        }
    }

    #[test]
    fn restore_backup_flags() {
        let cli = Cli::try_parse_from([
            "yba-ctl",
            "-f",
            "restoreBackup",
            "/tmp/backup.tgz",
            "--yugabundle",
            "--skip_dbdrop",
            "--use_system_pg",
            "--destination",
            "/data",
        ])
        .unwrap();
        assert!(cli.force);
        let Command::RestoreBackup(args) = cli.command else {
            panic!("expected restoreBackup");
        };
        let req = args.to_request(Path::new("/opt/yugabyte"));
        assert!(req.yugabundle && req.skip_dbdrop && req.use_system_pg);
        assert!(!req.is_disruptive());
        assert_eq!(req.destination, PathBuf::from("/data"));
    }

    #[test]
    fn upgrade_version_bypass() {
        let cli = Cli::try_parse_from(["yba-ctl", "upgrade", "--skip_version_checks"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Upgrade {
                skip_version_checks: true,
                ..
            }
        ));
    }

    #[test]
    fn create_backup_requires_output_path() {
        assert!(Cli::try_parse_from(["yba-ctl", "createBackup"]).is_err());
    }
}
