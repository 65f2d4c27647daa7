//! The control protocol.
//!
//! One request per connection, one newline-terminated line each way:
//!
//! ```text
//! -> SETMODE DEBUG
//! <- OK Switched mode to DEBUG
//! ```
//!
//! Requests are `SETMODE <mode>` or `STOP`. Responses are `OK [message]` or
//! `ERR [message]`; the server closes the connection after replying.

use std::fmt;

use thiserror::Error;

pub const SET_MODE: &str = "SETMODE";
pub const STOP: &str = "STOP";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
	/// Switch the runner mode. The mode token is validated by the handler.
	SetMode { mode: String },
	Stop,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
	#[error("Command required")]
	Empty,
	#[error("Unknown command {0}")]
	UnknownCommand(String),
	#[error("Invalid number of arguments")]
	InvalidArguments,
	/// Not a UTF-8 line, or longer than the server accepts.
	#[error("Invalid request")]
	InvalidRequest,
	#[error("Malformed response {0:?}")]
	MalformedResponse(String),
}

impl Request {
	pub fn parse(line: &str) -> Result<Self, ProtocolError> {
		let mut parts = line.split_whitespace();
		let command = parts.next().ok_or(ProtocolError::Empty)?;
		let args: Vec<&str> = parts.collect();

		match command {
			SET_MODE => match args.as_slice() {
				[mode] => Ok(Request::SetMode {
					mode: mode.to_string(),
				}),
				_ => Err(ProtocolError::InvalidArguments),
			},
			STOP if args.is_empty() => Ok(Request::Stop),
			STOP => Err(ProtocolError::InvalidArguments),
			other => Err(ProtocolError::UnknownCommand(other.to_string())),
		}
	}
}

impl fmt::Display for Request {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Request::SetMode { mode } => write!(f, "{} {}", SET_MODE, mode),
			Request::Stop => f.write_str(STOP),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
	Ok(Option<String>),
	Err(String),
}

impl Response {
	pub fn ok(message: impl Into<String>) -> Self {
		Response::Ok(Some(message.into()))
	}

	pub fn err(message: impl Into<String>) -> Self {
		Response::Err(message.into())
	}

	pub fn is_ok(&self) -> bool {
		matches!(self, Response::Ok(_))
	}

	pub fn parse(line: &str) -> Result<Self, ProtocolError> {
		let line = line.trim_end_matches(['\r', '\n']);
		let (status, message) = match line.split_once(' ') {
			Some((status, message)) => (status, Some(message)),
			None => (line, None),
		};

		match status {
			"OK" => Ok(Response::Ok(message.map(str::to_string))),
			"ERR" => Ok(Response::Err(message.unwrap_or_default().to_string())),
			_ => Err(ProtocolError::MalformedResponse(line.to_string())),
		}
	}
}

impl fmt::Display for Response {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Response::Ok(None) => f.write_str("OK"),
			Response::Ok(Some(message)) => write!(f, "OK {}", message),
			Response::Err(message) if message.is_empty() => f.write_str("ERR"),
			Response::Err(message) => write!(f, "ERR {}", message),
		}
	}
}

impl From<ProtocolError> for Response {
	fn from(e: ProtocolError) -> Self {
		Response::Err(e.to_string())
	}
}

/// What a handler hands back to the server: the line to send, and whether
/// the server should signal shutdown once that line is out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
	pub response: Response,
	pub shutdown: bool,
}

impl Reply {
	/// `OK`, followed by a shutdown signal.
	pub fn shutdown() -> Self {
		Self {
			response: Response::Ok(None),
			shutdown: true,
		}
	}
}

impl From<Response> for Reply {
	fn from(response: Response) -> Self {
		Self {
			response,
			shutdown: false,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_set_mode() {
		assert_eq!(
			Request::parse("SETMODE DEBUG"),
			Ok(Request::SetMode { mode: "DEBUG".into() })
		);
		assert_eq!(
			Request::parse("SETMODE BOGUS\r\n"),
			Ok(Request::SetMode { mode: "BOGUS".into() })
		);
	}

	#[test]
	fn set_mode_needs_exactly_one_argument() {
		assert_eq!(Request::parse("SETMODE"), Err(ProtocolError::InvalidArguments));
		assert_eq!(
			Request::parse("SETMODE DEBUG now"),
			Err(ProtocolError::InvalidArguments)
		);
	}

	#[test]
	fn parses_stop() {
		assert_eq!(Request::parse("STOP"), Ok(Request::Stop));
		assert_eq!(Request::parse("STOP please"), Err(ProtocolError::InvalidArguments));
	}

	#[test]
	fn commands_are_case_sensitive() {
		assert_eq!(
			Request::parse("stop"),
			Err(ProtocolError::UnknownCommand("stop".into()))
		);
		assert_eq!(Request::parse(""), Err(ProtocolError::Empty));
	}

	#[test]
	fn protocol_errors_render_as_err_lines() {
		let r: Response = ProtocolError::UnknownCommand("PING".into()).into();
		assert_eq!(r.to_string(), "ERR Unknown command PING");
		let r: Response = ProtocolError::InvalidArguments.into();
		assert_eq!(r.to_string(), "ERR Invalid number of arguments");
		let r: Response = ProtocolError::InvalidRequest.into();
		assert_eq!(r.to_string(), "ERR Invalid request");
	}

	#[test]
	fn response_lines() {
		assert_eq!(Response::Ok(None).to_string(), "OK");
		assert_eq!(Response::ok("Switched mode to DEBUG").to_string(), "OK Switched mode to DEBUG");
		assert_eq!(Response::parse("OK\n"), Ok(Response::Ok(None)));
		assert_eq!(Response::parse("ERR Build error"), Ok(Response::err("Build error")));
		assert!(Response::parse("HELLO").is_err());
	}
}
