use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::TcpStream;

use thiserror::Error;

use crate::addr::ControlAddr;
use crate::protocol::{ProtocolError, Request, Response};

#[derive(Debug, Error)]
pub enum ClientError {
	/// Nothing is listening at the control address.
	#[error("cannot connect to {addr}: {source}")]
	NotRunning {
		addr: ControlAddr,
		#[source]
		source: io::Error,
	},
	#[error("io error: {0}")]
	Io(#[from] io::Error),
	#[error("connection closed without a response")]
	NoResponse,
	#[error(transparent)]
	Protocol(#[from] ProtocolError),
}

trait Stream: Read + Write {}
impl<T: Read + Write> Stream for T {}

/// Synchronous client for a hotrun control endpoint.
///
/// The server answers one request per connection, so a client is good for a
/// single [`ControlClient::send`].
pub struct ControlClient {
	stream: Box<dyn Stream>,
}

impl ControlClient {
	pub fn connect(addr: &ControlAddr) -> Result<Self, ClientError> {
		let stream: Box<dyn Stream> = match addr {
			ControlAddr::Tcp(socket_addr) => Box::new(TcpStream::connect(socket_addr).map_err(
				|source| ClientError::NotRunning {
					addr: addr.clone(),
					source,
				},
			)?),
			#[cfg(unix)]
			ControlAddr::Unix(path) => Box::new(
				std::os::unix::net::UnixStream::connect(path).map_err(|source| {
					ClientError::NotRunning {
						addr: addr.clone(),
						source,
					}
				})?,
			),
			#[cfg(not(unix))]
			ControlAddr::Unix(_) => {
				return Err(ClientError::Io(io::Error::new(
					io::ErrorKind::Unsupported,
					"unix sockets are not supported on this platform",
				)))
			}
		};
		Ok(Self { stream })
	}

	/// Send a request and read the single response line.
	pub fn send(mut self, request: &Request) -> Result<Response, ClientError> {
		let data = format!("{}\n", request);
		self.stream.write_all(data.as_bytes())?;
		self.stream.flush()?;

		let mut reader = BufReader::new(&mut self.stream);
		let mut line = String::new();
		if reader.read_line(&mut line)? == 0 {
			return Err(ClientError::NoResponse);
		}

		Ok(Response::parse(&line)?)
	}
}

/// Connect, send one request and return the response.
pub fn send(addr: &ControlAddr, request: &Request) -> Result<Response, ClientError> {
	ControlClient::connect(addr)?.send(request)
}
