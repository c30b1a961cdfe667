//! Generate device bindings from a directory of `.device` configurations.
//!
//! Usage:
//!   packetgen CONFIG_DIR --target c|java|matlab --out DIR [--jobs N] [-v...]
//!
//! Writes one source file and one `.ids` table per device. Exits with status 1
//! if any device failed; the others are still generated.

use clap::Parser;
use packetgen::driver::{generate, Options};
use packetgen::Target;
use std::path::PathBuf;
use tracing::Level;

#[derive(Debug, Parser)]
#[command(name = "packetgen", version, about = "Generate device bindings from packet schemas")]
struct Cli {
    /// Directory holding the `.device` configuration files.
    config_dir: PathBuf,

    /// Target language.
    #[arg(short, long)]
    target: Target,

    /// Output directory, created if missing.
    #[arg(short, long)]
    out: PathBuf,

    /// Number of worker threads.
    #[arg(short, long)]
    jobs: Option<usize>,

    /// More output per occurrence (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let options = Options {
        target: cli.target,
        out_dir: cli.out,
        jobs: cli.jobs,
    };
    let report = generate(&cli.config_dir, &options)?;

    for outcome in report.failures() {
        let what = outcome.device.as_deref().unwrap_or("<file>");
        match &outcome.error {
            Some(e) => eprintln!("{}: {}: {}", outcome.source.display(), what, e),
            None => eprintln!("{}: {}: failed", outcome.source.display(), what),
        }
    }
    for outcome in &report.outcomes {
        for path in &outcome.written {
            println!("{}", path.display());
        }
    }

    if !report.is_success() {
        std::process::exit(1);
    }
    Ok(())
}
