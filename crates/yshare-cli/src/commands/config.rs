//! Config command implementation.

use anyhow::{bail, Context, Result};

use yshare_core::config::Config;

use super::{ConfigAction, ConfigArgs};

/// Run the config command.
pub fn run(args: ConfigArgs) -> Result<()> {
    match args.action {
        ConfigAction::Show => {
            let config = super::load_config(None)?.with_env_overrides()?;
            print!("{}", render(&config)?);
        }
        ConfigAction::Path => println!("{}", Config::config_path().display()),
        ConfigAction::Init { force } => {
            let path = Config::config_path();
            if path.exists() && !force {
                bail!(
                    "{} already exists (use --force to overwrite)",
                    path.display()
                );
            }
            Config::default().save_to(&path)?;
            println!("Wrote {}", path.display());
        }
    }
    Ok(())
}

/// Render `config` as TOML with the storage token masked.
fn render(config: &Config) -> Result<String> {
    let mut shown = config.clone();
    if shown.storage.token.is_some() {
        shown.storage.token = Some("********".to_string());
    }
    toml::to_string_pretty(&shown).context("serializing configuration")
}
