use std::io;

use thiserror::Error;

/// A command string that cannot be turned into a program and its arguments.
#[derive(Debug, Error)]
pub enum CommandError {
	#[error("empty command")]
	Empty,
	#[error("cannot parse command {command:?}: {reason}")]
	Parse { command: String, reason: String },
}

#[derive(Debug, Error)]
pub enum BuildError {
	/// The build ran (or its command could not be parsed) and failed.
	/// `stderr` holds everything the build wrote to standard error.
	#[error("build failed")]
	Failed { stderr: String },
	/// The build command could not be started at all.
	#[error("cannot execute build command {command:?}: {source}")]
	Spawn {
		command: String,
		#[source]
		source: io::Error,
	},
	#[error("build i/o error: {0}")]
	Io(#[from] io::Error),
}

impl BuildError {
	pub fn is_failure(&self) -> bool {
		matches!(self, BuildError::Failed { .. })
	}

	pub fn stderr(&self) -> Option<&str> {
		match self {
			BuildError::Failed { stderr } => Some(stderr),
			_ => None,
		}
	}
}

#[derive(Debug, Error)]
pub enum WorkerError {
	#[error(transparent)]
	Command(#[from] CommandError),
	#[error("cannot execute command {command:?}: {source}")]
	Spawn {
		command: String,
		#[source]
		source: io::Error,
	},
	#[error("worker already started")]
	AlreadyRunning,
}
