use std::fmt;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

pub const DEFAULT_ADDRESS: &str = "127.0.0.1:55555";

/// Where the control endpoint listens.
///
/// Written as `host:port` (`:port` is shorthand for `127.0.0.1:port`) or
/// `unix:<path>` for a Unix domain socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlAddr {
	Tcp(SocketAddr),
	Unix(PathBuf),
}

#[derive(Debug, Error)]
pub enum AddrError {
	#[error("empty control address")]
	Empty,
	#[error("invalid control address {0:?}")]
	Invalid(String),
	#[error("unix sockets are not supported on this platform")]
	UnixUnsupported,
}

impl FromStr for ControlAddr {
	type Err = AddrError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let s = s.trim();
		if s.is_empty() {
			return Err(AddrError::Empty);
		}

		if let Some(path) = s.strip_prefix("unix:") {
			if !cfg!(unix) {
				return Err(AddrError::UnixUnsupported);
			}
			if path.is_empty() {
				return Err(AddrError::Invalid(s.to_string()));
			}
			return Ok(ControlAddr::Unix(PathBuf::from(path)));
		}

		let host_port = if s.starts_with(':') {
			format!("127.0.0.1{}", s)
		} else {
			s.to_string()
		};

		if let Ok(addr) = host_port.parse::<SocketAddr>() {
			return Ok(ControlAddr::Tcp(addr));
		}

		host_port
			.to_socket_addrs()
			.ok()
			.and_then(|mut addrs| addrs.next())
			.map(ControlAddr::Tcp)
			.ok_or_else(|| AddrError::Invalid(s.to_string()))
	}
}

impl fmt::Display for ControlAddr {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ControlAddr::Tcp(addr) => write!(f, "{}", addr),
			ControlAddr::Unix(path) => write!(f, "unix:{}", path.display()),
		}
	}
}

impl Default for ControlAddr {
	fn default() -> Self {
		ControlAddr::Tcp(SocketAddr::from(([127, 0, 0, 1], 55555)))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_tcp() {
		let addr: ControlAddr = "127.0.0.1:4000".parse().unwrap();
		assert_eq!(addr, ControlAddr::Tcp(SocketAddr::from(([127, 0, 0, 1], 4000))));
	}

	#[test]
	fn bare_port_is_loopback() {
		let addr: ControlAddr = ":55555".parse().unwrap();
		assert_eq!(addr, ControlAddr::default());
		assert_eq!(DEFAULT_ADDRESS.parse::<ControlAddr>().unwrap(), ControlAddr::default());
	}

	#[cfg(unix)]
	#[test]
	fn parses_unix() {
		let addr: ControlAddr = "unix:/tmp/hotrun.sock".parse().unwrap();
		assert_eq!(addr, ControlAddr::Unix(PathBuf::from("/tmp/hotrun.sock")));
		assert_eq!(addr.to_string(), "unix:/tmp/hotrun.sock");
	}

	#[test]
	fn rejects_garbage() {
		assert!(matches!("".parse::<ControlAddr>(), Err(AddrError::Empty)));
		assert!("not an address".parse::<ControlAddr>().is_err());
		assert!("unix:".parse::<ControlAddr>().is_err());
	}
}
