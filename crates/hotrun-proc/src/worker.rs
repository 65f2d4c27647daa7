use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, watch};

use crate::command;
use crate::error::WorkerError;
use crate::output::{OutputCapture, Stream};
use crate::tree::{PlatformTree, ProcessTree};

/// One supervised child process.
///
/// The child runs in its own process group. Whether it exits on its own or is
/// taken down by [`Worker::stop`], a single supervise task observes the end
/// and fires the finished latch exactly once.
pub struct Worker {
	command: String,
	output: OutputCapture,
	running: Option<Running>,
}

struct Running {
	pid: u32,
	quit: Option<oneshot::Sender<()>>,
	finished: watch::Receiver<bool>,
}

impl Worker {
	pub fn new(command: impl Into<String>, output: OutputCapture) -> Self {
		Self {
			command: command.into(),
			output,
			running: None,
		}
	}

	pub fn command(&self) -> &str {
		&self.command
	}

	pub fn pid(&self) -> Option<u32> {
		self.running.as_ref().map(|r| r.pid)
	}

	/// True once the child has exited or been killed. False if never started.
	pub fn is_finished(&self) -> bool {
		self.running
			.as_ref()
			.map(|r| *r.finished.borrow())
			.unwrap_or(false)
	}

	/// Start the child. Returns as soon as the process is spawned.
	pub fn run(&mut self) -> Result<(), WorkerError> {
		if self.running.is_some() {
			return Err(WorkerError::AlreadyRunning);
		}

		tracing::info!("running {}...", self.command);
		let (program, args) = command::split(&self.command)?;

		let mut cmd = Command::new(&program);
		cmd.args(&args)
			.stdin(Stdio::null())
			.stdout(Stdio::piped())
			.stderr(Stdio::piped());
		PlatformTree::prepare(&mut cmd);

		let mut child = cmd.spawn().map_err(|source| WorkerError::Spawn {
			command: self.command.clone(),
			source,
		})?;
		let pid = child.id().unwrap_or(0);

		if let Some(stdout) = child.stdout.take() {
			let out = self.output.clone();
			tokio::spawn(async move {
				pipe_lines(stdout, Stream::Stdout, out).await;
			});
		}
		if let Some(stderr) = child.stderr.take() {
			let out = self.output.clone();
			tokio::spawn(async move {
				pipe_lines(stderr, Stream::Stderr, out).await;
			});
		}

		let (quit_tx, quit_rx) = oneshot::channel();
		let (finished_tx, finished_rx) = watch::channel(false);
		let command = self.command.clone();

		tokio::spawn(async move {
			supervise(child, pid, command, quit_rx).await;
			let _ = finished_tx.send(true);
		});

		self.running = Some(Running {
			pid,
			quit: Some(quit_tx),
			finished: finished_rx,
		});
		Ok(())
	}

	/// Kill the child and its process group, then wait until it is gone.
	///
	/// Safe to call after the child exited on its own, and safe to call more
	/// than once.
	pub async fn stop(&mut self) {
		let Some(running) = self.running.as_mut() else {
			return;
		};

		if let Some(quit) = running.quit.take() {
			tracing::debug!("stopping {} (pid {})", self.command, running.pid);
			let _ = quit.send(());
		}

		let _ = running.finished.wait_for(|done| *done).await;
	}

	/// Wait for the child to finish without asking it to.
	pub async fn wait(&self) {
		if let Some(running) = self.running.as_ref() {
			let mut finished = running.finished.clone();
			let _ = finished.wait_for(|done| *done).await;
		}
	}
}

async fn supervise(mut child: Child, pid: u32, command: String, quit: oneshot::Receiver<()>) {
	let status = tokio::select! {
		status = child.wait() => status,
		_ = quit => {
			PlatformTree::terminate(pid);
			if let Err(e) = child.kill().await {
				tracing::debug!("error killing process {}: {}", pid, e);
			}
			PlatformTree::kill(pid);
			child.wait().await
		}
	};

	match status {
		Ok(status) => tracing::debug!("{} (pid {}) finished: {}", command, pid, status),
		Err(e) => tracing::debug!("error waiting for {} (pid {}): {}", command, pid, e),
	}
}

async fn pipe_lines<R: AsyncRead + Unpin>(reader: R, stream: Stream, output: OutputCapture) {
	let mut lines = BufReader::new(reader).split(b'\n');
	while let Ok(Some(line)) = lines.next_segment().await {
		output.write(stream, &line);
	}
}
