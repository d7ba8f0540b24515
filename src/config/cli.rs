use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the Vitrina binary.
#[derive(Debug, Parser)]
#[command(
    name = "vitrina",
    version,
    about = "Storefront template sync and cache invalidation"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "VITRINA_CONFIG_FILE",
        value_name = "PATH",
        global = true
    )]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: GlobalOverrides,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Watch a template directory and mirror every change to storage.
    Watch(WatchArgs),
    /// Mirror a template directory once and exit.
    Sync(SyncArgs),
    /// Print the invalidation plan for a change without touching any cache.
    Plan(PlanArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct GlobalOverrides {
    /// Override the log level (`trace`, `debug`, `info`, `warn`, `error`).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Emit logs as JSON.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,

    /// Override the root directory of the filesystem object store.
    #[arg(long = "storage-root", value_name = "PATH", value_hint = ValueHint::DirPath, global = true)]
    pub storage_root: Option<PathBuf>,

    /// Override the directory every synchronized tree must live under.
    #[arg(long = "sandbox-root", value_name = "PATH", value_hint = ValueHint::DirPath, global = true)]
    pub sandbox_root: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct SyncTarget {
    /// Local template directory to mirror.
    #[arg(long = "dir", value_name = "DIR", value_hint = ValueHint::DirPath)]
    pub dir: PathBuf,

    /// Store whose deployed templates receive the files.
    #[arg(long = "store", value_name = "ID")]
    pub store_id: String,

    /// Override the destination bucket.
    #[arg(long = "bucket", value_name = "NAME")]
    pub bucket: Option<String>,

    /// Override the storage region.
    #[arg(long = "region", value_name = "REGION")]
    pub region: Option<String>,
}

#[derive(Debug, Args, Clone)]
pub struct WatchArgs {
    #[command(flatten)]
    pub target: SyncTarget,

    /// Mirror the whole tree once the watcher is ready.
    #[arg(long = "sync-all", action = clap::ArgAction::SetTrue)]
    pub sync_all: bool,
}

#[derive(Debug, Args, Clone)]
pub struct SyncArgs {
    #[command(flatten)]
    pub target: SyncTarget,
}

#[derive(Debug, Args, Clone)]
pub struct PlanArgs {
    /// Change type, e.g. `product_updated`.
    #[arg(long = "change-type", value_name = "TYPE")]
    pub change_type: String,

    #[arg(long = "store", value_name = "ID")]
    pub store_id: String,

    /// Id of the changed entity (a host name for `domain_updated`).
    #[arg(long = "entity", value_name = "ID")]
    pub entity_id: Option<String>,

    /// Template path that changed, relative to the theme root.
    #[arg(long = "path", value_name = "PATH")]
    pub path: Option<String>,
}

impl Command {
    /// Sync target of commands that mirror a directory.
    pub fn sync_target(&self) -> Option<&SyncTarget> {
        match self {
            Command::Watch(args) => Some(&args.target),
            Command::Sync(args) => Some(&args.target),
            Command::Plan(_) => None,
        }
    }
}
