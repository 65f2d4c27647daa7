pub mod addr;
pub mod client;
pub mod protocol;
pub mod server;

pub use addr::{AddrError, ControlAddr};
pub use client::{ClientError, ControlClient};
pub use protocol::{ProtocolError, Reply, Request, Response};
pub use server::ControlListener;
