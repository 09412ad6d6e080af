//! The polling controller.
//!
//! Split into a pure state machine ([`machine`]) that maps inputs to
//! effects, and an async driver ([`PolledLoader`]) that owns the timer,
//! the in-flight checksum resolutions, and the snapshot handoff.

pub mod machine;

mod driver;

pub use driver::PolledLoader;
pub use machine::{Effect, Input, Phase, PollMachine};
