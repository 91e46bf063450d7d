//! Low-level async netlink socket operations.

use std::os::unix::io::{AsRawFd, RawFd};

use bytes::BytesMut;
use netlink_sys::{Socket, SocketAddr};
use tokio::io::Interest;
use tokio::io::unix::AsyncFd;

use crate::error::TransportError;

/// Default receive buffer size.
pub const DEFAULT_RECV_BUF: usize = 32768;

/// Async netlink socket bound to one protocol family.
pub struct NetlinkSocket {
    /// The underlying async file descriptor.
    fd: AsyncFd<Socket>,
    /// Local port ID (assigned by kernel).
    pid: u32,
    /// Netlink protocol number (e.g. 16 for NETLINK_GENERIC).
    protonum: u32,
    /// Size of the buffer handed to recv.
    recv_buf: usize,
}

impl NetlinkSocket {
    /// Create a new netlink socket for the given protocol number.
    ///
    /// Extended and capped ACKs are requested so errors carry extack
    /// attributes without echoing the whole request back.
    pub fn new(protonum: u32) -> Result<Self, TransportError> {
        let mut socket = Socket::new(protonum as isize)?;
        socket.set_non_blocking(true)?;

        // Bind to get a port ID
        let mut addr = SocketAddr::new(0, 0);
        socket.bind(&addr)?;
        socket.get_address(&mut addr)?;
        let pid = addr.port_number();

        // Ignore if not supported by the running kernel
        socket.set_ext_ack(true).ok();
        socket.set_cap_ack(true).ok();

        let fd = AsyncFd::new(socket)?;

        tracing::debug!(protonum, pid, "opened netlink socket");

        Ok(Self {
            fd,
            pid,
            protonum,
            recv_buf: DEFAULT_RECV_BUF,
        })
    }

    /// Set the receive buffer size used for each datagram.
    pub fn set_recv_buf(&mut self, size: usize) {
        self.recv_buf = size;
    }

    /// Get the local port ID.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Get the protocol number.
    pub fn protonum(&self) -> u32 {
        self.protonum
    }

    /// Subscribe to a multicast group.
    pub fn add_membership(&mut self, group: u32) -> Result<(), TransportError> {
        self.fd.get_mut().add_membership(group)?;
        Ok(())
    }

    /// Unsubscribe from a multicast group.
    pub fn drop_membership(&mut self, group: u32) -> Result<(), TransportError> {
        self.fd.get_mut().drop_membership(group)?;
        Ok(())
    }

    /// Send a message.
    pub async fn send(&self, msg: &[u8]) -> Result<(), TransportError> {
        loop {
            let mut guard = self.fd.ready(Interest::WRITABLE).await?;

            match guard.try_io(|inner| inner.get_ref().send(msg, 0)) {
                Ok(result) => {
                    result?;
                    return Ok(());
                }
                Err(_would_block) => continue,
            }
        }
    }

    /// Receive one datagram, allocating a buffer.
    pub async fn recv_msg(&self) -> Result<Vec<u8>, TransportError> {
        let mut buf = BytesMut::with_capacity(self.recv_buf);

        loop {
            let mut guard = self.fd.ready(Interest::READABLE).await?;

            match guard.try_io(|inner| inner.get_ref().recv(&mut buf, 0)) {
                Ok(result) => {
                    let _n = result?;
                    // buf has been advanced by recv, so buf[..] contains the data
                    return Ok(buf.to_vec());
                }
                Err(_would_block) => continue,
            }
        }
    }
}

impl AsRawFd for NetlinkSocket {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.get_ref().as_raw_fd()
    }
}
