//! CLI command definitions and handlers.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use yshare_core::config::Config;

pub mod config;
pub mod serve;

/// Load configuration from `path`, or the default location.
///
/// A missing file yields defaults; a broken one is an error.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = path.map_or_else(Config::config_path, Path::to_path_buf);
    Config::load_from(&path).with_context(|| format!("loading {}", path.display()))
}

/// Y-Share - share files with a six-digit code
#[derive(Parser)]
#[command(name = "yshare")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand)]
pub enum Command {
    /// Start the web server
    Serve(ServeArgs),

    /// Manage configuration
    Config(ConfigArgs),
}

/// Arguments for the serve command
#[derive(Parser)]
pub struct ServeArgs {
    /// Port to listen on (overrides PORT and the config file)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Bind to localhost only
    #[arg(long)]
    pub localhost_only: bool,

    /// How long codes stay valid (e.g., 30s, 10m, 1h)
    #[arg(long)]
    pub ttl: Option<String>,

    /// Root URL of the HTTP blob store
    #[arg(long, env = "YSHARE_STORAGE_URL", conflicts_with = "memory")]
    pub storage_url: Option<String>,

    /// Keep uploads in memory instead of remote storage
    #[arg(long)]
    pub memory: bool,

    /// Configuration file to use instead of the default
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

/// Arguments for the config command
#[derive(Parser)]
pub struct ConfigArgs {
    /// Config subcommand
    #[command(subcommand)]
    pub action: ConfigAction,
}

/// Config subcommands
#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show the effective configuration
    Show,

    /// Show the configuration file path
    Path,

    /// Write a configuration file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}
