//! In-process transport with a scriptable kernel side.

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;

use super::Transport;
use crate::error::{DecodeError, TransportError};
use crate::netlink::builder::MessageBuilder;
use crate::netlink::genl::{GENL_HDRLEN, GenlMsgHdr};
use crate::netlink::message::{MessageIter, NLM_F_ACK_TLVS, NLM_F_CAPPED, NLM_F_MULTI, NlMsgHdr, NlMsgType};

/// Port id the in-memory transport reports.
pub const MEMORY_PORT_ID: u32 = 4242;

type Groups = Arc<Mutex<BTreeSet<u32>>>;

/// Client end of an in-memory connection.
#[derive(Debug)]
pub struct MemoryTransport {
    pid: u32,
    to_peer: mpsc::UnboundedSender<Vec<u8>>,
    from_peer: tokio::sync::Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
    groups: Groups,
}

/// Kernel end of an in-memory connection.
///
/// Dropping the peer closes the connection: pending and future receives on
/// the transport fail with [`TransportError::Closed`].
#[derive(Debug)]
pub struct MemoryPeer {
    pid: u32,
    from_client: mpsc::UnboundedReceiver<Vec<u8>>,
    to_client: mpsc::UnboundedSender<Vec<u8>>,
    groups: Groups,
}

impl MemoryTransport {
    /// Create a connected transport/peer pair.
    pub fn pair() -> (MemoryTransport, MemoryPeer) {
        let (to_peer, from_client) = mpsc::unbounded_channel();
        let (to_client, from_peer) = mpsc::unbounded_channel();
        let groups = Groups::default();
        (
            MemoryTransport {
                pid: MEMORY_PORT_ID,
                to_peer,
                from_peer: tokio::sync::Mutex::new(from_peer),
                groups: groups.clone(),
            },
            MemoryPeer {
                pid: MEMORY_PORT_ID,
                from_client,
                to_client,
                groups,
            },
        )
    }
}

impl Transport for MemoryTransport {
    fn port_id(&self) -> u32 {
        self.pid
    }

    fn send(&self, msg: &[u8]) -> impl Future<Output = Result<(), TransportError>> + Send {
        let result = self
            .to_peer
            .send(msg.to_vec())
            .map_err(|_| TransportError::Closed);
        async move { result }
    }

    fn recv(&self) -> impl Future<Output = Result<Vec<u8>, TransportError>> + Send {
        async move {
            let mut rx = self.from_peer.lock().await;
            rx.recv().await.ok_or(TransportError::Closed)
        }
    }

    fn add_membership(&mut self, group: u32) -> Result<(), TransportError> {
        self.groups
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(group);
        Ok(())
    }

    fn drop_membership(&mut self, group: u32) -> Result<(), TransportError> {
        self.groups
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&group);
        Ok(())
    }
}

impl MemoryPeer {
    /// Port id of the client end.
    pub fn client_port_id(&self) -> u32 {
        self.pid
    }

    /// Wait for the next datagram from the client and split it into
    /// requests. `None` once the client is gone.
    pub async fn recv(&mut self) -> Option<Result<Vec<Request>, DecodeError>> {
        let datagram = self.from_client.recv().await?;
        Some(Request::parse_all(&datagram))
    }

    /// Wait for a datagram holding exactly one request.
    ///
    /// Panics if the client sent something else; meant for test scripts.
    pub async fn expect_request(&mut self) -> Request {
        match self.recv().await {
            Some(Ok(mut requests)) if requests.len() == 1 => requests.remove(0),
            other => panic!("expected a single request, got {:?}", other),
        }
    }

    /// Deliver a datagram to the client. Returns false if it is gone.
    pub fn send(&self, datagram: Datagram) -> bool {
        self.to_client.send(datagram.into_bytes()).is_ok()
    }

    /// Deliver raw bytes to the client.
    pub fn send_raw(&self, bytes: Vec<u8>) -> bool {
        self.to_client.send(bytes).is_ok()
    }

    /// Multicast groups the client currently belongs to.
    pub fn groups(&self) -> Vec<u32> {
        self.groups
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .copied()
            .collect()
    }
}

/// One request message as seen by the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// The netlink header.
    pub header: NlMsgHdr,
    /// Everything after the netlink header.
    pub payload: Vec<u8>,
    /// The complete message.
    pub bytes: Vec<u8>,
}

impl Request {
    fn parse_all(datagram: &[u8]) -> Result<Vec<Request>, DecodeError> {
        MessageIter::new(datagram)
            .map(|msg| {
                let (header, payload, bytes) = msg?;
                Ok(Request {
                    header,
                    payload: payload.to_vec(),
                    bytes: bytes.to_vec(),
                })
            })
            .collect()
    }

    /// Sequence number.
    pub fn seq(&self) -> u32 {
        self.header.nlmsg_seq
    }

    /// Generic netlink header, if the payload is long enough for one.
    pub fn genl(&self) -> Option<GenlMsgHdr> {
        GenlMsgHdr::from_bytes(&self.payload).ok()
    }

    /// Payload after the generic netlink header.
    pub fn genl_body(&self) -> &[u8] {
        self.payload.get(GENL_HDRLEN..).unwrap_or_default()
    }
}

/// Builder for datagrams sent by a [`MemoryPeer`].
///
/// Messages are addressed to the requester's port unless built with
/// [`Datagram::multicast`].
#[derive(Debug, Clone, Default)]
pub struct Datagram {
    buf: Vec<u8>,
}

impl Datagram {
    /// Start an empty datagram.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message with an arbitrary payload.
    pub fn message(mut self, msg_type: u16, flags: u16, seq: u32, port_id: u32, payload: &[u8]) -> Self {
        let mut builder = MessageBuilder::new(msg_type, flags);
        builder.set_seq(seq);
        builder.set_pid(port_id);
        builder.append_bytes(payload);
        self.buf.extend_from_slice(&builder.finish());
        self
    }

    /// Append a generic netlink reply to `req`.
    ///
    /// `body` holds whatever follows the generic header (fixed header and
    /// attributes). Dump parts should pass `NLM_F_MULTI` in `flags`.
    pub fn reply(self, req: &Request, cmd: u8, flags: u16, body: &[u8]) -> Self {
        let version = req.genl().map_or(1, |g| g.version);
        let mut payload = GenlMsgHdr::new(cmd, version).as_bytes().to_vec();
        payload.extend_from_slice(body);
        self.message(req.header.nlmsg_type, flags, req.seq(), req.header.nlmsg_pid, &payload)
    }

    /// Append a reply for a raw (non-generic) family.
    pub fn raw_reply(self, req: &Request, msg_type: u16, flags: u16, body: &[u8]) -> Self {
        self.message(msg_type, flags, req.seq(), req.header.nlmsg_pid, body)
    }

    /// Append an unsolicited generic netlink message (sequence and port 0).
    pub fn multicast(self, family_id: u16, cmd: u8, version: u8, body: &[u8]) -> Self {
        let mut payload = GenlMsgHdr::new(cmd, version).as_bytes().to_vec();
        payload.extend_from_slice(body);
        self.message(family_id, 0, 0, 0, &payload)
    }

    /// Append a positive ACK for `req`.
    pub fn ack(self, req: &Request) -> Self {
        self.error(req, 0, &[])
    }

    /// Append an error reply with the given negative errno and raw
    /// extended ACK attributes.
    pub fn error(self, req: &Request, errno: i32, extack: &[u8]) -> Self {
        let mut flags = NLM_F_CAPPED;
        if !extack.is_empty() {
            flags |= NLM_F_ACK_TLVS;
        }
        let mut payload = errno.to_ne_bytes().to_vec();
        payload.extend_from_slice(req.header.as_bytes());
        payload.extend_from_slice(extack);
        self.message(NlMsgType::ERROR, flags, req.seq(), req.header.nlmsg_pid, &payload)
    }

    /// Append the end of a dump, with an optional negative error code.
    pub fn done(self, req: &Request, code: i32) -> Self {
        self.message(
            NlMsgType::DONE,
            NLM_F_MULTI,
            req.seq(),
            req.header.nlmsg_pid,
            &code.to_ne_bytes(),
        )
    }

    /// Check if nothing was appended.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// The datagram bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}
