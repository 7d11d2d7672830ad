use anyhow::{Context, Result, bail};
use recovery_od::{about, config::PipelineConfig, run_pipeline};
use std::env;
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn usage() {
    eprintln!(
        "Usage:\n  \
  recovery_od --version\n  \
  recovery_od run DATA_DIR OUT_DIR\n\n  \
  DATA_DIR holds the raw/ batch folders, annotation.csv and finalized_density.csv.\n  \
  Set RUST_LOG to change the log level (default recovery_od=info)."
    );
}

fn init_logging() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "recovery_od=info".into()))
        .with(fmt::layer().with_target(false))
        .init();
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.iter().any(|a| a == "--version" || a == "-V") {
        println!("{}", about::version_cli_text());
        return Ok(());
    }
    if args.len() < 2 || args.iter().any(|a| a == "--help" || a == "-h") {
        usage();
        return Ok(());
    }

    match args[1].as_str() {
        "run" => {
            if args.len() != 4 {
                usage();
                bail!("run expects DATA_DIR and OUT_DIR");
            }
            init_logging();
            let data_dir = PathBuf::from(&args[2]);
            let out_dir = PathBuf::from(&args[3]);
            let summary = run_pipeline(&data_dir, &out_dir, &PipelineConfig::default())
                .with_context(|| format!("pipeline failed for {}", data_dir.display()))?;
            println!(
                "{} extinct wells, {} contaminated blanks (cutoff {:.4}); outputs in {}",
                summary.classification.extinct.len(),
                summary.classification.contaminated.len(),
                summary.classification.growth_cutoff,
                out_dir.display()
            );
            Ok(())
        }
        other => {
            usage();
            bail!("unknown command '{other}'")
        }
    }
}
