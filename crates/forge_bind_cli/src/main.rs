//! forge-bind command line
//!
//! Reads a `bind.toml`, generates the bindings and writes them to the
//! configured output directory.
//!
//! # Environment Variables
//!
//! - `FORGE_LOG` - Log level (default: "info")

mod config;

use anyhow::{bail, Context, Result};
use config::BindConfig;
use forge_bind::build::BindingsBuilder;
use std::env;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn usage() {
    eprintln!("forge-bind [config] [options]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  config                  Path to bind.toml (default: ./bind.toml)");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -o, --output <dir>      Override the output directory");
    eprintln!("  --no-transpile          Do not emit bindings.js");
    eprintln!("  --check                 Generate in memory without writing files");
    eprintln!("  -h, --help              Show this message");
}

struct Args {
    config: PathBuf,
    output: Option<PathBuf>,
    transpile: bool,
    check: bool,
}

fn parse_args(args: Vec<String>) -> Result<Option<Args>> {
    let mut parsed = Args {
        config: PathBuf::from("bind.toml"),
        output: None,
        transpile: true,
        check: false,
    };
    let mut config = None;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--output" | "-o" => {
                if i + 1 < args.len() {
                    parsed.output = Some(PathBuf::from(&args[i + 1]));
                    i += 2;
                    continue;
                }
                bail!("--output requires a value");
            }
            "--no-transpile" => parsed.transpile = false,
            "--check" => parsed.check = true,
            "--help" | "-h" => return Ok(None),
            arg if !arg.starts_with('-') && config.is_none() => config = Some(PathBuf::from(arg)),
            arg => bail!("Unknown argument: {}", arg),
        }
        i += 1;
    }

    if let Some(config) = config {
        parsed.config = config;
    }
    Ok(Some(parsed))
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_env("FORGE_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    let Some(args) = parse_args(env::args().skip(1).collect())? else {
        usage();
        return Ok(());
    };

    let config_path = env::current_dir()
        .context("resolving working directory")?
        .join(&args.config);
    let config = BindConfig::load(&config_path)?;
    let base = config_path
        .parent()
        .map(PathBuf::from)
        .unwrap_or_default();

    if config.input.descriptions.is_empty() {
        bail!(
            "{} lists no descriptions under [input]",
            config_path.display()
        );
    }

    let mut builder = BindingsBuilder::new()
        .codegen(config.codegen.clone())
        .transpile(args.transpile && config.output.transpile);
    for description in &config.input.descriptions {
        builder = builder.description_path(base.join(description));
    }
    for (name, ty) in config.types {
        builder = builder.type_info(name, ty.into_type_info());
    }

    if args.check {
        let artifacts = builder.generate().context("generating bindings")?;
        info!(
            interfaces = artifacts.interface_count,
            callbacks = artifacts.callback_count,
            "check passed"
        );
        return Ok(());
    }

    let out_dir = args.output.unwrap_or_else(|| base.join(&config.output.dir));
    let output = builder
        .out_dir(&out_dir)
        .build()
        .with_context(|| format!("generating bindings into {}", out_dir.display()))?;

    info!("Wrote {}", output.bindings_ts.display());
    if let Some(js) = &output.bindings_js {
        info!("Wrote {}", js.display());
    }
    info!("Wrote {}", output.native_rs.display());
    info!("Wrote {}", output.resolver_rs.display());
    info!("Wrote {}", output.description_json.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_defaults() {
        let parsed = parse_args(Vec::new()).unwrap().unwrap();
        assert_eq!(parsed.config, PathBuf::from("bind.toml"));
        assert!(parsed.output.is_none());
        assert!(parsed.transpile);
        assert!(!parsed.check);
    }

    #[test]
    fn test_all_flags() {
        let parsed = parse_args(args(&["idl/bind.toml", "-o", "out", "--no-transpile", "--check"]))
            .unwrap()
            .unwrap();
        assert_eq!(parsed.config, PathBuf::from("idl/bind.toml"));
        assert_eq!(parsed.output, Some(PathBuf::from("out")));
        assert!(!parsed.transpile);
        assert!(parsed.check);
    }

    #[test]
    fn test_bad_arguments() {
        assert!(parse_args(args(&["--output"])).is_err());
        assert!(parse_args(args(&["--verbose"])).is_err());
        assert!(parse_args(args(&["a.toml", "b.toml"])).is_err());
        assert!(parse_args(args(&["--help"])).unwrap().is_none());
    }
}
