use std::path::PathBuf;

use clap::Parser;
use url::Url;

pub mod op;
pub mod ops;

#[derive(Parser, Debug)]
#[command(name = "magic-folder", version, about = "Synchronize folders through a storage grid")]
pub struct Args {
    /// Application directory (default: ~/.magic-folder)
    #[arg(long, env = "MAGIC_FOLDER_DIR", global = true)]
    pub config_dir: Option<PathBuf>,

    /// Control API of the running daemon (default: from config.toml)
    #[arg(long, global = true)]
    pub remote: Option<Url>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info", global = true)]
    pub log_level: String,

    #[command(subcommand)]
    pub command: ops::Command,
}
