//! # locwatch-replay
//!
//! Scripted host for the locwatch monitoring engine.
//!
//! Replays a JSON script of platform callbacks and API calls against a
//! [`locwatch_core::LocationEngine`] and prints every delegate callback and
//! platform request as a JSON line.
//!
//! - [`script`] - Script steps and loading
//! - [`platform`] - The scripted platform
//! - [`output`] - JSON-lines records and the delegate that writes them
//! - [`runner`] - The replay loop and configuration loading
//! - [`logging`] - Logging setup

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![warn(missing_docs)]

pub mod logging;
pub mod output;
pub mod platform;
pub mod runner;
pub mod script;

pub use output::{EventSink, JsonLinesDelegate, OutputRecord, PlatformCall};
pub use platform::{PlatformOptions, ScriptedPlatform};
pub use runner::{load_config, Replay, ReplaySummary};
pub use script::{load_script, parse_script, ReplayStep};
