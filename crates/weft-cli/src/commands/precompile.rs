//! Implementation of the `weft precompile` command.

use std::fs::write;
use std::path::PathBuf;

use miette::{miette, Result};
use tracing::info;
use weft::environment::precompile;
use weft::FileSystemLoader;

use super::collect_templates;
use crate::config::EnvArgs;
use crate::output::report_error;
use crate::output::table::format_bundle_table;

/// Arguments for the precompile command.
#[derive(Debug, clap::Args)]
pub struct PrecompileArgs {
    /// Directory holding the templates
    pub dir: PathBuf,

    /// Where to write the JSON bundle
    #[arg(short, long)]
    pub output: PathBuf,

    /// File extensions to include (comma-separated)
    #[arg(long, value_delimiter = ',', default_value = "html,njk")]
    pub ext: Vec<String>,

    /// Do not print the summary table
    #[arg(short, long)]
    pub quiet: bool,

    #[command(flatten)]
    pub env: EnvArgs,
}

/// Run the precompile command.
pub fn run_precompile(args: PrecompileArgs) -> Result<i32> {
    if !args.dir.is_dir() {
        return Err(miette!("{} is not a directory", args.dir.display()));
    }
    let env = args.env.environment()?;
    env.add_loader(FileSystemLoader::new(&args.dir));

    let files = collect_templates(&args.dir, &args.ext)?;
    if files.is_empty() {
        eprintln!("No templates found in {}", args.dir.display());
        return Ok(exitcode::NOINPUT);
    }

    let bundle = match precompile(&env, files.iter().map(|f| f.name.as_str())) {
        Ok(bundle) => bundle,
        Err(err) => {
            eprintln!("{:?}", report_error(&args.dir, &err));
            return Ok(exitcode::DATAERR);
        }
    };

    let json = bundle
        .to_json()
        .map_err(|e| miette!("Failed to serialize bundle: {}", e))?;
    write(&args.output, json)
        .map_err(|e| miette!("Failed to write {}: {}", args.output.display(), e))?;
    info!(templates = bundle.len(), output = %args.output.display(), "Wrote bundle");

    if !args.quiet {
        println!("{}", format_bundle_table(bundle.programs()));
        println!(
            "\nWrote {} template(s) to {}",
            bundle.len(),
            args.output.display()
        );
    }
    Ok(exitcode::OK)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;
    use weft::{Environment, PrecompiledLoader};

    use super::*;

    fn args(dir: &TempDir, output: PathBuf) -> PrecompileArgs {
        PrecompileArgs {
            dir: dir.path().to_path_buf(),
            output,
            ext: vec!["html".to_string()],
            quiet: true,
            env: EnvArgs::default(),
        }
    }

    #[test]
    fn writes_a_loadable_bundle() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("layouts")).unwrap();
        fs::write(
            dir.path().join("layouts/base.html"),
            "[{% block body %}{% endblock %}]",
        )
        .unwrap();
        fs::write(
            dir.path().join("page.html"),
            "{% extends 'layouts/base.html' %}{% block body %}{{ n }}{% endblock %}",
        )
        .unwrap();
        let out = TempDir::new().unwrap();
        let output = out.path().join("bundle.json");

        assert_eq!(run_precompile(args(&dir, output.clone())).unwrap(), exitcode::OK);

        let env = Environment::default();
        env.add_loader(PrecompiledLoader::from_path(&output).unwrap());
        assert_eq!(env.render("page.html", weft::data! { "n" => 1 }).unwrap(), "[1]");
    }

    #[test]
    fn broken_templates_fail_without_writing() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("bad.html"), "{% if %}").unwrap();
        let out = TempDir::new().unwrap();
        let output = out.path().join("bundle.json");

        assert_eq!(run_precompile(args(&dir, output.clone())).unwrap(), exitcode::DATAERR);
        assert!(!output.exists());
    }

    #[test]
    fn empty_directories_report_noinput() {
        let dir = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let output = out.path().join("bundle.json");
        assert_eq!(run_precompile(args(&dir, output)).unwrap(), exitcode::NOINPUT);
    }
}
