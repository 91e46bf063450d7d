//! Datagram transports a [`YnlFamily`](crate::YnlFamily) talks through.
//!
//! The client only needs to send a datagram, receive one, and join or leave
//! multicast groups. [`NetlinkSocket`] does this against the kernel,
//! [`MemoryTransport`] against an in-process [`MemoryPeer`] that scripts the
//! kernel side (useful for tests and for running without privileges).

mod memory;

use std::future::Future;

pub use memory::{Datagram, MEMORY_PORT_ID, MemoryPeer, MemoryTransport, Request};

use crate::error::TransportError;
use crate::netlink::socket::NetlinkSocket;

/// A connected netlink datagram endpoint.
pub trait Transport: Send + Sync + 'static {
    /// Local port id. Replies addressed to other ports are not ours.
    fn port_id(&self) -> u32;

    /// Send one datagram, which may hold several netlink messages.
    fn send(&self, msg: &[u8]) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Receive one datagram.
    fn recv(&self) -> impl Future<Output = Result<Vec<u8>, TransportError>> + Send;

    /// Join a multicast group.
    fn add_membership(&mut self, group: u32) -> Result<(), TransportError>;

    /// Leave a multicast group.
    fn drop_membership(&mut self, group: u32) -> Result<(), TransportError>;
}

impl Transport for NetlinkSocket {
    fn port_id(&self) -> u32 {
        self.pid()
    }

    fn send(&self, msg: &[u8]) -> impl Future<Output = Result<(), TransportError>> + Send {
        NetlinkSocket::send(self, msg)
    }

    fn recv(&self) -> impl Future<Output = Result<Vec<u8>, TransportError>> + Send {
        self.recv_msg()
    }

    fn add_membership(&mut self, group: u32) -> Result<(), TransportError> {
        NetlinkSocket::add_membership(self, group)
    }

    fn drop_membership(&mut self, group: u32) -> Result<(), TransportError> {
        NetlinkSocket::drop_membership(self, group)
    }
}
