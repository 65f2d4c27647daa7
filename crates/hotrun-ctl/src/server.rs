use std::future::Future;
use std::io;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use crate::addr::ControlAddr;
use crate::protocol::{ProtocolError, Reply, Request, Response};

/// Longest request line the server reads, newline included.
pub const MAX_LINE: u64 = 4096;

/// A bound control endpoint, over TCP or a Unix domain socket.
pub enum ControlListener {
	Tcp(TcpListener),
	#[cfg(unix)]
	Unix {
		listener: tokio::net::UnixListener,
		socket: SocketFile,
	},
}

/// Removes the socket file when the listener goes away.
#[cfg(unix)]
pub struct SocketFile(std::path::PathBuf);

#[cfg(unix)]
impl Drop for SocketFile {
	fn drop(&mut self) {
		let _ = std::fs::remove_file(&self.0);
	}
}

impl ControlListener {
	pub async fn bind(addr: &ControlAddr) -> io::Result<Self> {
		match addr {
			ControlAddr::Tcp(addr) => Ok(ControlListener::Tcp(TcpListener::bind(addr).await?)),
			#[cfg(unix)]
			ControlAddr::Unix(path) => {
				if path.exists() {
					let _ = std::fs::remove_file(path);
				}
				let listener = tokio::net::UnixListener::bind(path)?;
				Ok(ControlListener::Unix {
					listener,
					socket: SocketFile(path.clone()),
				})
			}
			#[cfg(not(unix))]
			ControlAddr::Unix(_) => Err(io::Error::new(
				io::ErrorKind::Unsupported,
				"unix sockets are not supported on this platform",
			)),
		}
	}

	pub fn local_addr(&self) -> io::Result<ControlAddr> {
		match self {
			ControlListener::Tcp(listener) => Ok(ControlAddr::Tcp(listener.local_addr()?)),
			#[cfg(unix)]
			ControlListener::Unix { socket, .. } => Ok(ControlAddr::Unix(socket.0.clone())),
		}
	}

	/// Accept connections forever, answering one request per connection.
	///
	/// A [`Reply`] with `shutdown` set sends on `shutdown` once its response
	/// line has been written.
	pub async fn serve<F, Fut>(self, handler: F, shutdown: mpsc::Sender<()>)
	where
		F: Fn(Request) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = Reply> + Send + 'static,
	{
		let handler = Arc::new(handler);

		match self.local_addr() {
			Ok(addr) => tracing::info!("control endpoint listening on {}", addr),
			Err(e) => tracing::warn!("control endpoint address unknown: {}", e),
		}

		loop {
			let accepted = match &self {
				ControlListener::Tcp(listener) => listener
					.accept()
					.await
					.map(|(stream, _)| spawn_connection(stream, &handler, &shutdown)),
				#[cfg(unix)]
				ControlListener::Unix { listener, .. } => listener
					.accept()
					.await
					.map(|(stream, _)| spawn_connection(stream, &handler, &shutdown)),
			};

			if let Err(e) = accepted {
				tracing::error!("accept error: {}", e);
			}
		}
	}
}

fn spawn_connection<S, F, Fut>(stream: S, handler: &Arc<F>, shutdown: &mpsc::Sender<()>)
where
	S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
	F: Fn(Request) -> Fut + Send + Sync + 'static,
	Fut: Future<Output = Reply> + Send + 'static,
{
	let handler = Arc::clone(handler);
	let shutdown = shutdown.clone();
	tokio::spawn(async move {
		handle_connection(stream, handler, shutdown).await;
	});
}

async fn handle_connection<S, F, Fut>(stream: S, handler: Arc<F>, shutdown: mpsc::Sender<()>)
where
	S: AsyncRead + AsyncWrite + Unpin,
	F: Fn(Request) -> Fut + Send + Sync + 'static,
	Fut: Future<Output = Reply> + Send + 'static,
{
	let (reader, mut writer) = tokio::io::split(stream);
	let mut buf = Vec::new();

	match BufReader::new(reader).take(MAX_LINE).read_until(b'\n', &mut buf).await {
		Ok(0) => return,
		Ok(_) => {}
		Err(e) => {
			tracing::warn!("control read error: {}", e);
			return;
		}
	}

	let reply = match read_request(buf) {
		Ok(request) => {
			tracing::debug!("control request: {}", request);
			handler(request).await
		}
		Err(e) => {
			tracing::warn!("invalid control request: {}", e);
			Reply::from(Response::from(e))
		}
	};

	let data = format!("{}\n", reply.response);
	if let Err(e) = writer.write_all(data.as_bytes()).await {
		tracing::warn!("error returning response: {}", e);
		return;
	}
	let _ = writer.shutdown().await;

	if reply.shutdown {
		let _ = shutdown.try_send(());
	}
}

fn read_request(buf: Vec<u8>) -> Result<Request, ProtocolError> {
	if buf.last() != Some(&b'\n') && buf.len() as u64 >= MAX_LINE {
		return Err(ProtocolError::InvalidRequest);
	}
	let line = String::from_utf8(buf).map_err(|_| ProtocolError::InvalidRequest)?;
	Request::parse(&line)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn request_line_must_be_utf8() {
		assert_eq!(
			read_request(b"SETMODE \xff\xfe\n".to_vec()),
			Err(ProtocolError::InvalidRequest)
		);
		assert_eq!(read_request(b"STOP\n".to_vec()), Ok(Request::Stop));
	}

	#[test]
	fn request_line_is_bounded() {
		let long = vec![b'A'; MAX_LINE as usize];
		assert_eq!(read_request(long), Err(ProtocolError::InvalidRequest));
		// EOF without a newline still counts as a line.
		assert_eq!(read_request(b"STOP".to_vec()), Ok(Request::Stop));
	}
}
