use std::path::PathBuf;

use clap::Parser;
use refetch_core::init_logging;

mod app;

#[derive(Debug, Parser)]
#[command(
    name = "refetch",
    about = "Poll a file for content changes and surface staleness notices"
)]
struct Args {
    /// File to poll
    path: PathBuf,

    /// Milliseconds between polls (overrides the config file)
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Apply new data silently instead of raising a notice
    #[arg(long)]
    immediate: bool,

    /// Start with polling disabled
    #[arg(long)]
    disabled: bool,

    /// Optional TOML config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Verbose JSON logs on stderr
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let args = Args::parse();
    init_logging(!args.verbose);

    let exit_code = match run(args) {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("refetch: {}", e);
            1
        }
    };
    std::process::exit(exit_code);
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let overrides = app::Overrides {
        interval_ms: args.interval_ms,
        immediate: args.immediate,
        disabled: args.disabled,
    };
    let config = app::resolve_config(args.config.as_deref(), &overrides)?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(app::watch_file(args.path, config))
}
