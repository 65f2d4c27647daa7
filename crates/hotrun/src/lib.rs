//! # hotrun
//!
//! Watch a source tree, rebuild on change and keep the built program running.
//!
//! The [`Runner`] ties the pieces together: a [`Watcher`] feeds file changes
//! through a [`Debouncer`], each settled burst triggers one build, and a
//! successful build restarts the supervised process. A control endpoint
//! (see [`control::handle_request`]) switches between live rebuilding and a
//! debugger session, or shuts everything down.

pub mod config;
pub mod control;
pub mod debounce;
pub mod logging;
pub mod runner;
pub mod watcher;

pub use config::{Config, ConfigError};
pub use debounce::{Debouncer, Trigger};
pub use runner::{Mode, Runner, RunnerError, RunnerOptions, UnknownMode};
pub use watcher::{ChangeEvent, WatchError, Watcher};
