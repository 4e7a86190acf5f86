//! Environment settings shared by the commands.
//!
//! Options come from an optional JSON config file, then command-line flags
//! override them.

use std::fs::read_to_string;
use std::io;
use std::path::PathBuf;

use miette::Diagnostic;
use serde::Deserialize;
use thiserror::Error;
use weft::lexer::Syntax;
use weft::Environment;

/// Contents of a `--config` file. Missing fields keep the library defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub autoescape: Option<bool>,
    pub throw_on_undefined: Option<bool>,
    pub trim_blocks: Option<bool>,
    pub lstrip_blocks: Option<bool>,
    pub syntax: Option<Syntax>,
}

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    #[diagnostic(code(weft::config::io))]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    #[diagnostic(code(weft::config::parse), help("expected a JSON object"))]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Flags that configure the template environment.
#[derive(Debug, Default, clap::Args)]
pub struct EnvArgs {
    /// JSON file with environment options
    #[arg(long, env = "WEFT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Disable HTML autoescaping
    #[arg(long)]
    pub no_autoescape: bool,
}

impl EnvArgs {
    /// Read the config file, if one was given.
    pub fn load_config(&self) -> Result<Config, ConfigError> {
        let Some(path) = &self.config else {
            return Ok(Config::default());
        };
        let display = path.display().to_string();
        let content = read_to_string(path).map_err(|source| ConfigError::Io {
            path: display.clone(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: display,
            source,
        })
    }

    /// Build an environment from the config file and flags.
    pub fn environment(&self) -> Result<Environment, ConfigError> {
        let config = self.load_config()?;
        Ok(self.apply(config))
    }

    fn apply(&self, config: Config) -> Environment {
        let autoescape = if self.no_autoescape {
            Some(false)
        } else {
            config.autoescape
        };
        Environment::builder()
            .maybe_autoescape(autoescape)
            .maybe_throw_on_undefined(config.throw_on_undefined)
            .maybe_trim_blocks(config.trim_blocks)
            .maybe_lstrip_blocks(config.lstrip_blocks)
            .maybe_syntax(config.syntax)
            .build()
    }
}
