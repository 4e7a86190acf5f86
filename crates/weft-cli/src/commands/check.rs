//! Implementation of the `weft check` command.

use std::fs::read_to_string;
use std::path::PathBuf;

use miette::{miette, Report, Result};
use owo_colors::OwoColorize;
use serde::Serialize;
use tracing::debug;
use weft::Environment;

use super::{collect_templates, TemplateFile};
use crate::config::EnvArgs;
use crate::output::TemplateDiagnostic;

/// Arguments for the check command.
#[derive(Debug, clap::Args)]
pub struct CheckArgs {
    /// Template files or directories to check
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// File extensions to check inside directories (comma-separated)
    #[arg(long, value_delimiter = ',', default_value = "html,njk")]
    pub ext: Vec<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub env: EnvArgs,
}

/// JSON output for one checked file.
#[derive(Debug, Serialize)]
struct CheckResult {
    file: String,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    line: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    column: Option<usize>,
}

/// Run the check command.
pub fn run_check(args: CheckArgs) -> Result<i32> {
    let env = args.env.environment()?;

    let mut files = Vec::new();
    for path in &args.files {
        if path.is_dir() {
            files.extend(collect_templates(path, &args.ext)?);
        } else {
            files.push(TemplateFile {
                name: path.display().to_string(),
                path: path.clone(),
            });
        }
    }

    let mut results = Vec::with_capacity(files.len());
    for file in &files {
        let content = read_to_string(&file.path)
            .map_err(|e| miette!("Failed to read {}: {}", file.path.display(), e))?;
        results.push(check_file(&env, file, &content, args.json));
    }
    let failures = results.iter().filter(|r| !r.ok).count();

    if args.json {
        let output = serde_json::to_string_pretty(&results)
            .map_err(|e| miette!("Failed to serialize results: {}", e))?;
        println!("{}", output);
    } else if failures == 0 {
        println!("{} {} template(s) checked", "ok".green(), results.len());
    } else {
        eprintln!(
            "{} {} of {} template(s) failed",
            "error".red(),
            failures,
            results.len()
        );
    }

    if failures == 0 {
        Ok(exitcode::OK)
    } else {
        Ok(exitcode::DATAERR)
    }
}

/// Compile one template, printing a diagnostic on failure unless the
/// results are going to be printed as JSON.
fn check_file(env: &Environment, file: &TemplateFile, content: &str, json: bool) -> CheckResult {
    debug!(file = %file.name, "Checking template");
    match env.compile(content, &file.name) {
        Ok(_) => CheckResult {
            file: file.name.clone(),
            ok: true,
            error: None,
            line: None,
            column: None,
        },
        Err(err) => {
            let pos = err.pos();
            if !json {
                let diagnostic = TemplateDiagnostic::from_error(&file.name, content, &err);
                eprintln!("{:?}", Report::new(diagnostic));
            }
            CheckResult {
                file: file.name.clone(),
                ok: false,
                error: Some(err.to_string()),
                line: pos.map(|p| p.line),
                column: pos.map(|p| p.column),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str) -> TemplateFile {
        TemplateFile {
            name: name.to_string(),
            path: PathBuf::from(name),
        }
    }

    #[test]
    fn valid_templates_pass() {
        let env = Environment::default();
        let result = check_file(&env, &file("a.html"), "{% if x %}{{ x }}{% endif %}", true);
        assert!(result.ok);
        assert!(result.error.is_none());
    }

    #[test]
    fn failures_carry_positions() {
        let env = Environment::default();
        let result = check_file(&env, &file("a.html"), "line\n{% for x in %}", true);
        assert!(!result.ok);
        assert_eq!(result.line, Some(2));
        assert!(result.error.unwrap().starts_with("a.html: "));
    }
}
