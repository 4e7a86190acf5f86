//! Implementation of the `weft render` command.

use std::fs::read_to_string;
use std::path::{Path, PathBuf};

use miette::{miette, Result};
use serde_json::{Map as JsonMap, Value as JsonValue};
use tracing::debug;
use weft::{Error, FileSystemLoader, Value};

use crate::config::EnvArgs;
use crate::output::report_error;

/// Arguments for the render command.
#[derive(Debug, clap::Args)]
pub struct RenderArgs {
    /// Template name, relative to --dir
    pub template: String,

    /// Directory templates are loaded from
    #[arg(long, default_value = ".")]
    pub dir: PathBuf,

    /// JSON file with the render data (must hold an object)
    #[arg(long)]
    pub data: Option<PathBuf>,

    /// Variables in name=value format (repeatable). Values that parse as
    /// JSON are used as such, anything else is a string.
    #[arg(short = 'D', long = "var", value_parser = parse_key_val)]
    pub vars: Vec<(String, String)>,

    #[command(flatten)]
    pub env: EnvArgs,
}

/// Parse a key=value variable string.
fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("invalid variable format '{}': expected name=value", s))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

/// Run the render command.
pub fn run_render(args: RenderArgs) -> Result<i32> {
    let env = args.env.environment()?;
    env.add_loader(FileSystemLoader::new(&args.dir));

    let data = load_data(args.data.as_deref(), &args.vars)?;
    debug!(template = %args.template, "Rendering");

    match env.render(&args.template, data) {
        Ok(output) => {
            print!("{}", output);
            Ok(exitcode::OK)
        }
        Err(err) => {
            eprintln!("{:?}", report_error(&args.dir, &err));
            match err {
                Error::TemplateNotFound { .. } => Ok(exitcode::NOINPUT),
                _ => Ok(exitcode::DATAERR),
            }
        }
    }
}

/// Merge the data file and `--var` flags into the render data.
fn load_data(path: Option<&Path>, vars: &[(String, String)]) -> Result<Value> {
    let mut data = match path {
        Some(path) => {
            let content = read_to_string(path)
                .map_err(|e| miette!("Cannot read data file {}: {}", path.display(), e))?;
            match serde_json::from_str(&content) {
                Ok(JsonValue::Object(map)) => map,
                Ok(_) => return Err(miette!("Data file {} must hold a JSON object", path.display())),
                Err(e) => return Err(miette!("Invalid data file {}: {}", path.display(), e)),
            }
        }
        None => JsonMap::new(),
    };

    for (name, raw) in vars {
        let value =
            serde_json::from_str(raw).unwrap_or_else(|_| JsonValue::String(raw.clone()));
        data.insert(name.clone(), value);
    }
    Ok(Value::from(JsonValue::Object(data)))
}
