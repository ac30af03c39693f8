use std::env;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use fir_compiler::{compile_route, ActionRegistry, CompileOptions, FsSource};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CompileInput {
    route: String,
    files: Vec<String>,
    #[serde(default)]
    options: Option<CompileOptions>,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    if let Err(err) = run() {
        eprintln!("[fir-compiler] {err:#}");
        process::exit(1);
    }
}

fn run() -> Result<()> {
    let root = parse_root()?;

    let mut stdin_payload = String::new();
    io::stdin()
        .read_to_string(&mut stdin_payload)
        .context("failed to read stdin")?;
    if stdin_payload.trim().is_empty() {
        bail!("stdin payload is empty");
    }

    let payload: CompileInput =
        serde_json::from_str(&stdin_payload).context("invalid input JSON")?;
    validate_payload(&payload)?;

    if !root.is_dir() {
        bail!("template root '{}' is not a directory", root.display());
    }

    let options = payload.options.unwrap_or_default();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start runtime")?;

    let route = runtime.block_on(compile_route(
        Arc::new(FsSource::new(root)),
        &payload.route,
        &payload.files,
        Arc::new(ActionRegistry::default()),
        &options,
    ))?;

    let json = serde_json::to_string_pretty(&route).context("failed to serialize route")?;
    println!("{json}");
    Ok(())
}

fn parse_root() -> Result<PathBuf> {
    let mut root: Option<PathBuf> = None;
    let mut args = env::args().skip(1);

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--root" => {
                let value = args.next().context("missing value for --root")?;
                root = Some(PathBuf::from(value));
            }
            _ => bail!("unknown argument '{arg}'. usage: fir-compiler [--root <dir>] < input.json"),
        }
    }

    Ok(root.unwrap_or_else(|| PathBuf::from(".")))
}

fn validate_payload(payload: &CompileInput) -> Result<()> {
    if payload.route.trim().is_empty() {
        bail!("input.route must be a non-empty string");
    }
    if payload.files.is_empty() {
        bail!("input.files must list at least one template or directory");
    }
    if let Some(file) = payload.files.iter().find(|f| f.trim().is_empty()) {
        bail!("input.files contains an empty entry ({file:?})");
    }
    if payload.options.as_ref().is_some_and(|o| o.concurrency == 0) {
        bail!("input.options.concurrency must be at least 1");
    }
    Ok(())
}
