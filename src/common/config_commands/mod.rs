//! CLI handlers for `blockdrop config` subcommands.

mod init;
mod show;

use crate::common::config::{config_path, load_config_from, AppConfig};
use anyhow::{Context, Result};

fn defaults_toml() -> Result<String> {
    toml::to_string_pretty(&AppConfig::default()).context("Failed to serialize default config")
}

/// Print resolved config file path.
pub fn run_config_path() -> Result<()> {
    let stdout = std::io::stdout();
    let mut output = stdout.lock();
    show::path_config_with_writer(&config_path(), &mut output)
}

/// Print the effective configuration after file and environment layering.
pub fn run_config_show() -> Result<()> {
    let path = config_path();
    let config = load_config_from(&path)?;
    let stdout = std::io::stdout();
    let mut output = stdout.lock();
    let stderr = std::io::stderr();
    let mut err_output = stderr.lock();
    show::show_config_with_io(&path, &config, &mut output, &mut err_output)
}

/// Print the built-in defaults as TOML.
pub fn run_config_defaults() -> Result<()> {
    print!("{}", defaults_toml()?);
    Ok(())
}

/// Write a defaults file to the config path. Refuses to overwrite unless `force`.
pub fn run_config_init(force: bool) -> Result<bool> {
    let stdout = std::io::stdout();
    let mut output = stdout.lock();
    init::init_config(&config_path(), force, &mut output)
}
