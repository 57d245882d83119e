//! cli
//!
//! Command-line interface layer for redpod.
//!
//! # Responsibilities
//!
//! - Parse command-line arguments and global flags
//! - Load configuration for the selected pod
//! - Delegate to the library and format results
//!
//! The CLI holds no state of its own. Everything it prints comes from the
//! identity, federation, provider and sync layers.

pub mod args;
pub mod commands;

pub use args::{Cli, Command};

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use tracing::warn;

use crate::core::config::Config;

/// Flags shared by every command.
#[derive(Debug, Clone, Default)]
pub struct Context {
    pub pod: Option<PathBuf>,
    pub debug: bool,
    pub json: bool,
}

impl Context {
    pub fn from_cli(cli: &Cli) -> Self {
        Self {
            pod: cli.pod.clone(),
            debug: cli.debug,
            json: cli.json,
        }
    }

    /// The pod directory: `--pod`, else the current directory.
    pub fn pod_root(&self) -> Result<PathBuf> {
        match &self.pod {
            Some(path) => Ok(path.clone()),
            None => std::env::current_dir().context("Failed to read current directory"),
        }
    }

    /// Load global and pod configuration, logging any warnings.
    pub fn config(&self) -> Result<Config> {
        let root = self.pod_root()?;
        let loaded = Config::load(Some(&root)).context("Failed to load configuration")?;
        for warning in &loaded.warnings {
            warn!(path = %warning.path.display(), "{}", warning.message);
        }
        Ok(loaded.config)
    }

    /// Print `value` as pretty JSON.
    pub fn print_json<T: serde::Serialize>(&self, value: &T) -> Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }
}

/// Run the CLI application.
///
/// This is the main entry point called from `main.rs`.
pub fn run(cli: Cli) -> Result<()> {
    let ctx = Context::from_cli(&cli);
    commands::dispatch(cli.command, &ctx)
}
