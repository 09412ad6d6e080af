//! refetch-core: polling and staleness revalidation for loader-backed data
//!
//! This library keeps one authoritative data snapshot on display while a
//! secondary poll cycle runs underneath it. When the poll path fetches a
//! snapshot whose content checksum differs from the one on display, the
//! controller either swaps the new data in silently (immediate-update mode)
//! or raises a dismissible notice offering a "Refresh screen" action.
//!
//! # Main Entry Points
//!
//! - [`PolledLoader`] - Spawn and drive a polling controller
//! - [`Snapshot`] - Contract any polled data source must implement
//! - [`notices`] - Append-only notice channel consumed by the host app
//! - [`PollConfig`] - Controller configuration with defaults

pub mod checksum;
pub mod config;
pub mod controller;
pub mod errors;
pub mod logging;
pub mod notices;
pub mod snapshot;

pub use checksum::{Checksum, ChecksumPair};
pub use config::PollConfig;
pub use controller::PolledLoader;
pub use errors::{ControllerError, SnapshotError};
pub use notices::{ChannelSink, Notice, NoticeAction, NoticeSink, NoticeVariant, NullSink};
pub use snapshot::{BytesSnapshot, Snapshot};

// Re-export logging initialization
pub use logging::init_logging;
