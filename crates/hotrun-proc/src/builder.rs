use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::sync::Mutex;

use crate::command;
use crate::error::BuildError;

/// Runs the build command and keeps the error log of the last failed build.
///
/// The error log only ever exists for the most recent build, and only when
/// that build failed. Builds are serialized: a second `build()` waits for
/// the first one to finish.
pub struct Builder {
	command: String,
	error_log: PathBuf,
	lock: Mutex<()>,
}

impl Builder {
	pub fn new(command: impl Into<String>, error_log: impl Into<PathBuf>) -> Self {
		Self {
			command: command.into(),
			error_log: error_log.into(),
			lock: Mutex::new(()),
		}
	}

	pub fn command(&self) -> &str {
		&self.command
	}

	pub fn error_log(&self) -> &Path {
		&self.error_log
	}

	pub async fn build(&self) -> Result<(), BuildError> {
		let _guard = self.lock.lock().await;

		self.remove_error_log();
		tracing::info!("building...");

		let (program, args) = match command::split(&self.command) {
			Ok(parts) => parts,
			Err(e) => return Err(self.failed(e.to_string())),
		};

		let mut child = Command::new(&program)
			.args(&args)
			.stdin(Stdio::null())
			.stdout(Stdio::inherit())
			.stderr(Stdio::piped())
			.spawn()
			.map_err(|source| BuildError::Spawn {
				command: self.command.clone(),
				source,
			})?;

		let mut stderr = Vec::new();
		if let Some(mut pipe) = child.stderr.take() {
			pipe.read_to_end(&mut stderr).await?;
		}

		let status = child.wait().await?;
		if !status.success() {
			tracing::debug!("build exited with {}", status);
			return Err(self.failed(String::from_utf8_lossy(&stderr).into_owned()));
		}

		tracing::info!("build finished");
		Ok(())
	}

	fn failed(&self, stderr: String) -> BuildError {
		if let Err(e) = self.write_error_log(&stderr) {
			tracing::warn!("cannot write {}: {}", self.error_log.display(), e);
		}
		BuildError::Failed { stderr }
	}

	fn write_error_log(&self, message: &str) -> std::io::Result<()> {
		if let Some(parent) = self.error_log.parent() {
			if !parent.as_os_str().is_empty() {
				fs::create_dir_all(parent)?;
			}
		}
		fs::write(&self.error_log, message)
	}

	fn remove_error_log(&self) {
		match fs::remove_file(&self.error_log) {
			Ok(()) => {}
			Err(e) if e.kind() == ErrorKind::NotFound => {}
			Err(e) => tracing::warn!("cannot remove {}: {}", self.error_log.display(), e),
		}
	}
}
