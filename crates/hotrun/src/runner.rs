//! The rebuild/restart state machine.
//!
//! A [`Runner`] owns the watcher, the builder and at most one [`Worker`].
//! Filesystem changes flow through the [`Debouncer`] into the main loop,
//! which rebuilds and restarts the worker. The control endpoint drives
//! [`Runner::set_mode`] and [`Runner::stop`] concurrently; both take the
//! runner lock, so mode switches never interleave with a restart.

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use hotrun_proc::{BuildError, Builder, OutputCapture, Worker, WorkerError};
use thiserror::Error;
use tokio::sync::{mpsc, watch, Mutex};

use crate::debounce::{Debouncer, Trigger};
use crate::watcher::{WatchError, Watcher};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
	#[default]
	LiveRebuild,
	Debug,
}

impl Mode {
	pub fn as_str(&self) -> &'static str {
		match self {
			Mode::LiveRebuild => "LIVEREBUILD",
			Mode::Debug => "DEBUG",
		}
	}
}

impl fmt::Display for Mode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown mode {0}")]
pub struct UnknownMode(pub String);

impl FromStr for Mode {
	type Err = UnknownMode;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"LIVEREBUILD" => Ok(Mode::LiveRebuild),
			"DEBUG" => Ok(Mode::Debug),
			other => Err(UnknownMode(other.to_string())),
		}
	}
}

#[derive(Debug, Error)]
pub enum RunnerError {
	#[error(transparent)]
	Watch(#[from] WatchError),
	#[error("build error: {0}")]
	Build(#[source] BuildError),
	#[error("cannot start process: {0}")]
	Start(#[source] WorkerError),
	#[error("runner is stopped")]
	Stopped,
}

#[derive(Debug, Clone)]
pub struct RunnerOptions {
	pub build_delay: Duration,
	pub run_command: String,
	pub debug_command: String,
	pub build_before_debug: bool,
}

impl RunnerOptions {
	fn command_for(&self, mode: Mode) -> &str {
		match mode {
			Mode::LiveRebuild => &self.run_command,
			Mode::Debug => &self.debug_command,
		}
	}
}

struct State {
	mode: Mode,
	worker: Option<Worker>,
	stopped: bool,
}

pub struct Runner {
	options: RunnerOptions,
	builder: Builder,
	watcher: Watcher,
	debouncer: Debouncer,
	output: OutputCapture,
	state: Mutex<State>,
	triggers: std::sync::Mutex<Option<mpsc::UnboundedReceiver<Trigger>>>,
	quit: watch::Sender<bool>,
}

impl Runner {
	pub fn new(options: RunnerOptions, builder: Builder, watcher: Watcher) -> Self {
		let (debouncer, triggers) = Debouncer::new(options.build_delay);
		let (quit, _) = watch::channel(false);
		Self {
			options,
			builder,
			watcher,
			debouncer,
			output: OutputCapture::new(),
			state: Mutex::new(State {
				mode: Mode::default(),
				worker: None,
				stopped: false,
			}),
			triggers: std::sync::Mutex::new(Some(triggers)),
			quit,
		}
	}

	/// Use `output` for child stdout/stderr instead of echoing to the terminal.
	pub fn with_output(mut self, output: OutputCapture) -> Self {
		self.output = output;
		self
	}

	pub fn options(&self) -> &RunnerOptions {
		&self.options
	}

	pub fn output(&self) -> &OutputCapture {
		&self.output
	}

	pub fn watcher(&self) -> &Watcher {
		&self.watcher
	}

	pub async fn mode(&self) -> Mode {
		self.state.lock().await.mode
	}

	pub async fn has_worker(&self) -> bool {
		self.state.lock().await.worker.is_some()
	}

	pub async fn worker_pid(&self) -> Option<u32> {
		self.state.lock().await.worker.as_ref().and_then(|w| w.pid())
	}

	/// Run the build command once, outside the main loop.
	pub async fn build(&self) -> Result<(), BuildError> {
		self.builder.build().await
	}

	/// Start watching, do the initial build and launch the main loop.
	///
	/// A failed initial build is not an error: the runner waits for the next
	/// change with nothing running.
	pub async fn start(self: &Arc<Self>) -> Result<(), RunnerError> {
		self.watcher.start()?;

		let triggers = self
			.triggers
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.take();
		let Some(triggers) = triggers else {
			let _ = self.watcher.stop();
			return Err(RunnerError::Watch(WatchError::AlreadyStarted));
		};

		match self.builder.build().await {
			Ok(()) => {
				// A control request may have switched modes during the build.
				let mut state = self.state.lock().await;
				if !state.stopped && state.worker.is_none() && state.mode == Mode::LiveRebuild {
					if let Err(e) = self.start_worker(&mut state, Mode::LiveRebuild) {
						tracing::error!("{}", e);
					}
				}
			}
			Err(e) if e.is_failure() => {
				log_build_error(&e);
				tracing::warn!("initial build failed, waiting for changes");
			}
			Err(e) => {
				let _ = self.watcher.stop();
				return Err(RunnerError::Build(e));
			}
		}

		let debouncer = self.debouncer.clone();
		self.watcher.add_listener(move |event| debouncer.push(event));

		let runner = Arc::clone(self);
		tokio::spawn(async move {
			runner.main_loop(triggers).await;
		});

		Ok(())
	}

	/// Switch to `mode`, replacing the running process.
	///
	/// In [`Mode::Debug`] with `build_before_debug`, a failed build leaves the
	/// mode unchanged and nothing running.
	pub async fn set_mode(&self, mode: Mode) -> Result<(), RunnerError> {
		let mut state = self.state.lock().await;
		if state.stopped {
			return Err(RunnerError::Stopped);
		}

		tracing::info!("switching to {} mode", mode);
		stop_worker(&mut state).await;

		if mode == Mode::Debug && self.options.build_before_debug {
			if let Err(e) = self.builder.build().await {
				log_build_error(&e);
				return Err(RunnerError::Build(e));
			}
		}

		self.start_worker(&mut state, mode)
	}

	/// Stop the main loop, the running process and the watcher.
	pub async fn stop(&self) -> Result<(), RunnerError> {
		tracing::debug!("runner: stopping");
		self.quit.send_replace(true);

		{
			let mut state = self.state.lock().await;
			state.stopped = true;
			stop_worker(&mut state).await;
		}

		self.watcher.stop()?;
		Ok(())
	}

	fn start_worker(&self, state: &mut State, mode: Mode) -> Result<(), RunnerError> {
		state.mode = mode;
		let mut worker = Worker::new(self.options.command_for(mode), self.output.clone());
		worker.run().map_err(RunnerError::Start)?;
		state.worker = Some(worker);
		Ok(())
	}

	async fn main_loop(self: Arc<Self>, mut triggers: mpsc::UnboundedReceiver<Trigger>) {
		let mut quit = self.quit.subscribe();
		loop {
			tokio::select! {
				_ = async { let _ = quit.wait_for(|quit| *quit).await; } => break,
				trigger = triggers.recv() => {
					let Some(trigger) = trigger else { break };
					self.on_trigger(trigger).await;
					if *self.quit.borrow() {
						break;
					}
				}
			}
		}
		tracing::debug!("runner: main loop finished");
	}

	async fn on_trigger(&self, trigger: Trigger) {
		if self.mode().await == Mode::Debug {
			tracing::debug!("debug mode, ignoring {} change(s)", trigger.events.len());
			return;
		}

		for event in &trigger.events {
			tracing::debug!("changed: {}", event.path.display());
		}

		if let Err(e) = self.builder.build().await {
			log_build_error(&e);
			return;
		}

		let mut state = self.state.lock().await;
		if state.stopped || state.mode != Mode::LiveRebuild {
			return;
		}
		stop_worker(&mut state).await;
		if let Err(e) = self.start_worker(&mut state, Mode::LiveRebuild) {
			tracing::error!("{}", e);
		}
	}
}

async fn stop_worker(state: &mut State) {
	if let Some(mut worker) = state.worker.take() {
		worker.stop().await;
	}
}

fn log_build_error(e: &BuildError) {
	match e.stderr() {
		Some(stderr) if !stderr.trim().is_empty() => {
			tracing::error!("build failed:\n{}", stderr.trim_end())
		}
		Some(_) => tracing::error!("build failed"),
		None => tracing::error!("{}", e),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn mode_tokens() {
		assert_eq!("LIVEREBUILD".parse::<Mode>().unwrap(), Mode::LiveRebuild);
		assert_eq!("DEBUG".parse::<Mode>().unwrap(), Mode::Debug);
		assert_eq!(Mode::Debug.to_string(), "DEBUG");
		assert_eq!(Mode::default(), Mode::LiveRebuild);
	}

	#[test]
	fn mode_is_case_sensitive() {
		let err = "debug".parse::<Mode>().unwrap_err();
		assert_eq!(err.to_string(), "Unknown mode debug");
	}
}
