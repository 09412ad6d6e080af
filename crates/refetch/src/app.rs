//! File-watching front end over the polling controller.
//!
//! The polled "data source" is a file on disk: the loader snapshot is its
//! contents at startup, the poll path re-reads it every interval, and the
//! checksum is the sha256 of the bytes. Notices print to stdout; in the
//! default mode pressing Enter accepts the pending snapshot.

use std::error::Error;
use std::path::{Path, PathBuf};

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use refetch_core::{BytesSnapshot, Checksum, PollConfig, PolledLoader, SnapshotError, notices};

/// Command-line overrides applied on top of the config file.
pub struct Overrides {
    pub interval_ms: Option<u64>,
    pub immediate: bool,
    pub disabled: bool,
}

/// Load configuration: defaults, then the optional TOML file, then flags.
pub fn resolve_config(
    config_path: Option<&Path>,
    overrides: &Overrides,
) -> Result<PollConfig, Box<dyn Error>> {
    let mut config = match config_path {
        Some(path) => toml::from_str(&std::fs::read_to_string(path)?)?,
        None => PollConfig::default(),
    };

    if let Some(interval_ms) = overrides.interval_ms {
        config.interval_ms = interval_ms;
    }
    if overrides.immediate {
        config.immediate_update = true;
    }
    if overrides.disabled {
        config.enabled = false;
    }

    config.validate()?;
    Ok(config)
}

/// Poll `path` until Ctrl-C.
pub async fn watch_file(path: PathBuf, config: PollConfig) -> Result<(), Box<dyn Error>> {
    let initial = read_snapshot(&path)?;
    println!(
        "watching {} ({})",
        path.display(),
        short_checksum(&initial.content_checksum())
    );
    info!(
        event = "cli.watch.started",
        path = %path.display(),
        interval_ms = config.interval_ms,
        immediate_update = config.immediate_update,
    );

    let interactive = !config.immediate_update;
    let (sink, mut notice_rx) = notices::channel();
    let poll_path = path.clone();
    let loader = PolledLoader::spawn(initial, move || read_snapshot(&poll_path), config, sink)?;
    let mut watch = loader.subscribe();

    let cancel = CancellationToken::new();
    tokio::spawn(wait_for_shutdown_signal(cancel.clone()));

    let mut stdin_lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = interactive;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                println!();
                break;
            }
            Some(notice) = notice_rx.recv() => {
                println!("{}: {}", notice.title, notice.description);
                if let Some(action) = notice.actions.first() {
                    println!("press Enter to {}", action.title.to_lowercase());
                }
            }
            line = stdin_lines.next_line(), if stdin_open => {
                match line {
                    Ok(Some(_)) => {
                        let _ = loader.accept_pending();
                    }
                    Ok(None) => stdin_open = false,
                    Err(e) => {
                        warn!(event = "cli.watch.stdin_error", error = %e);
                        stdin_open = false;
                    }
                }
            }
            changed = watch.changed() => {
                // The sender only drops when the controller stops
                if changed.is_err() {
                    break;
                }
                let snapshot = watch.borrow_and_update().clone();
                println!("applied update ({})", short_checksum(&snapshot.content_checksum()));
            }
        }
    }

    loader.shutdown();
    info!(event = "cli.watch.stopped", path = %path.display());
    Ok(())
}

async fn wait_for_shutdown_signal(token: CancellationToken) {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!(event = "cli.watch.signal_received", signal = "SIGINT");
    }
    token.cancel();
}

fn read_snapshot(path: &Path) -> Result<BytesSnapshot, SnapshotError> {
    Ok(BytesSnapshot::new(std::fs::read(path)?))
}

fn short_checksum(checksum: &Checksum) -> String {
    let s = checksum.as_str();
    if s.len() > 12 {
        s[..12].to_string()
    } else {
        s.to_string()
    }
}
