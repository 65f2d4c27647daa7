use std::io::{self, Write};

use owo_colors::OwoColorize;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
	Stdout,
	Stderr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
	pub stream: Stream,
	pub line: String,
}

/// Sink for the supervised child's output.
///
/// Lines are echoed to the terminal, colored by stream so they stand apart
/// from hotrun's own log, and broadcast to any subscriber.
#[derive(Clone)]
pub struct OutputCapture {
	sender: broadcast::Sender<OutputLine>,
	echo: bool,
}

impl OutputCapture {
	pub fn new() -> Self {
		let (sender, _) = broadcast::channel(256);
		Self { sender, echo: true }
	}

	/// A capture that only broadcasts, without writing to the terminal.
	pub fn quiet() -> Self {
		let (sender, _) = broadcast::channel(256);
		Self { sender, echo: false }
	}

	pub fn write(&self, stream: Stream, data: &[u8]) {
		let line = String::from_utf8_lossy(data);
		let line = line.trim_end_matches(['\r', '\n']);

		if self.echo {
			match stream {
				Stream::Stdout => {
					let _ = writeln!(io::stdout().lock(), "{}", line.green());
				}
				Stream::Stderr => {
					let _ = writeln!(io::stderr().lock(), "{}", line.red());
				}
			}
		}

		let _ = self.sender.send(OutputLine {
			stream,
			line: line.to_string(),
		});
	}

	pub fn subscribe(&self) -> broadcast::Receiver<OutputLine> {
		self.sender.subscribe()
	}
}

impl Default for OutputCapture {
	fn default() -> Self {
		Self::new()
	}
}
