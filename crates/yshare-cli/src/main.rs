//! Y-Share CLI - share files with a six-digit code
//!
//! Runs the Y-Share web server. Senders upload files through the page and
//! get a code; receivers type the code within ten minutes to download.
//!
//! ## Quick Start
//!
//! ```bash
//! # Serve with in-memory storage on port 3000
//! yshare serve --memory
//!
//! # Serve against an HTTP object store
//! YSHARE_STORAGE_URL=https://blobs.example.com yshare serve
//! ```

#![allow(clippy::doc_markdown)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]

use anyhow::Result;
use clap::Parser;

mod commands;
pub mod ui;

use commands::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve(args) => commands::serve::run(args).await,
        Command::Config(args) => commands::config::run(args),
    }
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,yshare=info,yshare_core=info,tower_http=info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();
}
