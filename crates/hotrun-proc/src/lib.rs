//! # hotrun-proc
//!
//! Build and run child processes for hotrun.
//!
//! A [`Builder`] runs the configured build command to completion and keeps the
//! stderr of the last failed build in an error log. A [`Worker`] owns one
//! long-running child in its own process group and can take the whole group
//! down on [`Worker::stop`].
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use hotrun_proc::{Builder, OutputCapture, Worker};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let builder = Builder::new("cargo build", "tmp/build_error.log");
//! if builder.build().await.is_ok() {
//!     let mut worker = Worker::new("target/debug/app --port 8080", OutputCapture::new());
//!     worker.run().unwrap();
//!     // ...
//!     worker.stop().await;
//! }
//! # }
//! ```

pub mod builder;
pub mod command;
pub mod error;
pub mod output;
pub mod tree;
pub mod worker;

pub use builder::Builder;
pub use error::{BuildError, CommandError, WorkerError};
pub use output::{OutputCapture, OutputLine, Stream};
pub use tree::{PlatformTree, ProcessTree};
pub use worker::Worker;
