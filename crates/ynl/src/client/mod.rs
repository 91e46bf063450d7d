//! Family client: send requests described by a [`SpecFamily`] and decode
//! what comes back.
//!
//! A [`YnlFamily`] owns one transport. Requests are serialized through a
//! session lock, so a family can be shared between tasks behind an `Arc`.
//! Every message received while a request is outstanding is either fed to
//! that request's [`Exchange`](exchange::Exchange) or, if it is a
//! notification of this family, queued for [`check_ntf`](YnlFamily::check_ntf)
//! and friends.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use ynl::{Attrs, SpecFamily, YnlFamily};
//!
//! let spec = Arc::new(SpecFamily::from_json(&std::fs::read_to_string("netdev.json")?)?);
//! let netdev = YnlFamily::new(spec).await?;
//! for dev in netdev.dump("dev-get", &Attrs::new()).await? {
//!     println!("{}", dev.attrs);
//! }
//! ```

mod config;
mod exchange;
mod ntf;
mod resolve;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{Instant, timeout, timeout_at};

pub use config::{ClientConfig, DEFAULT_NTF_QUEUE_DEPTH, RequestFlags};
pub use ntf::Notifications;
pub use resolve::FamilyCache;

use exchange::{Exchange, Step};
use ntf::NtfQueue;
use resolve::resolve_family;

use crate::codec::extack::annotate;
use crate::codec::message::{Message, RequestHeader, decode_message, encode_request};
use crate::codec::value::Attrs;
use crate::error::{EncodeError, Error, Result, TransportError};
use crate::netlink::message::{MessageIter, NLM_F_ACK, NLM_F_DUMP, NLM_F_REQUEST, NlMsgHdr, NlMsgType};
use crate::netlink::socket::NetlinkSocket;
use crate::spec::{OpMode, SpecFamily, SpecOperation};
use crate::transport::Transport;

/// Mutable state guarded by the session lock.
struct Session<T> {
    transport: T,
    seq: u32,
    ntf: NtfQueue,
}

impl<T> Session<T> {
    fn next_seq(&mut self) -> u32 {
        let seq = self.seq;
        self.seq = self.seq.wrapping_add(1);
        if self.seq == 0 {
            self.seq = 1;
        }
        seq
    }
}

/// One request of a batch.
struct Call<'c> {
    op: &'c SpecOperation,
    mode: OpMode,
    attrs: &'c Attrs,
    flags: u16,
}

/// A client bound to one netlink family.
pub struct YnlFamily<T: Transport = NetlinkSocket> {
    spec: Arc<SpecFamily>,
    family_id: u16,
    port_id: u32,
    groups: HashMap<String, u32>,
    config: ClientConfig,
    session: Mutex<Session<T>>,
}

impl YnlFamily<NetlinkSocket> {
    /// Open a kernel socket for `spec` with the default configuration.
    pub async fn new(spec: Arc<SpecFamily>) -> Result<Self> {
        Self::with_config(spec, ClientConfig::default()).await
    }

    /// Open a kernel socket for `spec`.
    ///
    /// Generic netlink families are resolved through `nlctrl` before this
    /// returns, so a missing kernel module shows up here as
    /// [`Error::is_not_found`].
    pub async fn with_config(spec: Arc<SpecFamily>, config: ClientConfig) -> Result<Self> {
        let mut socket = NetlinkSocket::new(spec.protonum())?;
        socket.set_recv_buf(config.recv_buf);
        Self::with_transport(spec, socket, config).await
    }
}

impl<T: Transport> YnlFamily<T> {
    /// Bind `spec` to an already open transport.
    pub async fn with_transport(spec: Arc<SpecFamily>, transport: T, config: ClientConfig) -> Result<Self> {
        let mut session = Session {
            transport,
            seq: 1,
            ntf: NtfQueue::new(config.ntf_queue_depth),
        };

        let (family_id, groups) = if spec.is_genetlink() {
            let seq = session.next_seq();
            let info = resolve_family(&session.transport, &config.cache, spec.name(), seq).await?;
            (info.id, info.mcast_groups)
        } else {
            let groups = spec
                .mcast_groups()
                .iter()
                .filter_map(|g| g.value.map(|v| (g.name.clone(), v)))
                .collect();
            (0, groups)
        };

        let port_id = session.transport.port_id();
        tracing::debug!(family = spec.name(), id = family_id, port_id, "family ready");

        Ok(Self {
            spec,
            family_id,
            port_id,
            groups,
            config,
            session: Mutex::new(session),
        })
    }

    /// Fail requests that do not complete within `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = Some(timeout);
        self
    }

    /// The family description.
    pub fn spec(&self) -> &Arc<SpecFamily> {
        &self.spec
    }

    /// Resolved generic netlink family id, 0 for raw families.
    pub fn family_id(&self) -> u16 {
        self.family_id
    }

    /// Local port id of the transport.
    pub fn port_id(&self) -> u32 {
        self.port_id
    }

    /// Multicast group id by name.
    pub fn mcast_group_id(&self, name: &str) -> Option<u32> {
        self.groups.get(name).copied()
    }

    /// All known multicast groups.
    pub fn mcast_groups(&self) -> &HashMap<String, u32> {
        &self.groups
    }

    /// Client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Perform `op` in do mode.
    ///
    /// Returns the reply, or `None` for operations the kernel only
    /// acknowledges.
    pub async fn do_op(&self, op: &str, attrs: &Attrs) -> Result<Option<Message>> {
        self.do_with_flags(op, attrs, RequestFlags::NONE).await
    }

    /// Perform `op` in do mode with extra request flags.
    pub async fn do_with_flags(&self, op: &str, attrs: &Attrs, flags: RequestFlags) -> Result<Option<Message>> {
        let call = Call {
            op: self.operation(op)?,
            mode: OpMode::Do,
            attrs,
            flags: NLM_F_REQUEST | NLM_F_ACK | flags.bits(),
        };
        let replies = self.transact_one(call).await?;
        Ok(replies.into_iter().next())
    }

    /// Perform `op` in dump mode and collect every reply.
    ///
    /// A dump interrupted by a concurrent change fails with
    /// [`Error::DumpInterrupted`]; partial results are not returned.
    pub async fn dump(&self, op: &str, attrs: &Attrs) -> Result<Vec<Message>> {
        let call = Call {
            op: self.operation(op)?,
            mode: OpMode::Dump,
            attrs,
            flags: NLM_F_REQUEST | NLM_F_DUMP,
        };
        self.transact_one(call).await
    }

    /// Send several do requests in one datagram.
    ///
    /// Every request is encoded before anything is sent; an encoding error
    /// fails the whole batch. Each request then succeeds or fails on its
    /// own, in submission order.
    pub async fn do_multi(&self, requests: &[(&str, Attrs)]) -> Result<Vec<Result<Option<Message>>>> {
        let mut calls = Vec::with_capacity(requests.len());
        for (op, attrs) in requests {
            calls.push(Call {
                op: self.operation(op)?,
                mode: OpMode::Do,
                attrs,
                flags: NLM_F_REQUEST | NLM_F_ACK,
            });
        }
        let results = self.transact(calls).await?;
        Ok(results
            .into_iter()
            .map(|r| r.map(|replies| replies.into_iter().next()))
            .collect())
    }

    /// Join a multicast group by name.
    pub async fn subscribe(&self, group: &str) -> Result<()> {
        let id = self.group(group)?;
        self.session.lock().await.transport.add_membership(id)?;
        tracing::debug!(family = self.spec.name(), group, id, "subscribed");
        Ok(())
    }

    /// Leave a multicast group by name.
    pub async fn unsubscribe(&self, group: &str) -> Result<()> {
        let id = self.group(group)?;
        self.session.lock().await.transport.drop_membership(id)?;
        tracing::debug!(family = self.spec.name(), group, id, "unsubscribed");
        Ok(())
    }

    /// Take every notification received so far without blocking.
    pub async fn check_ntf(&self) -> Result<Vec<Message>> {
        let mut session = self.session.lock().await;
        loop {
            let datagram = match timeout(Duration::ZERO, session.transport.recv()).await {
                Ok(datagram) => datagram?,
                Err(_) => break,
            };
            self.route_datagram(&datagram, &mut session.ntf)?;
        }
        Ok(session.ntf.drain())
    }

    /// Collect notifications for `duration`.
    pub async fn poll_ntf(&self, duration: Duration) -> Result<Vec<Message>> {
        let deadline = Instant::now() + duration;
        let mut session = self.session.lock().await;
        loop {
            let datagram = match timeout_at(deadline, session.transport.recv()).await {
                Ok(datagram) => datagram?,
                Err(_) => break,
            };
            self.route_datagram(&datagram, &mut session.ntf)?;
        }
        Ok(session.ntf.drain())
    }

    /// Wait for the next notification.
    pub async fn next_ntf(&self) -> Result<Message> {
        let mut session = self.session.lock().await;
        loop {
            if let Some(msg) = session.ntf.pop() {
                return Ok(msg);
            }
            let datagram = session.transport.recv().await?;
            self.route_datagram(&datagram, &mut session.ntf)?;
        }
    }

    /// Notifications as a [`Stream`](tokio_stream::Stream).
    pub fn notifications(&self) -> Notifications<'_, T> {
        Notifications::new(self)
    }

    /// Number of notifications dropped because the queue was full.
    pub async fn ntf_dropped(&self) -> u64 {
        self.session.lock().await.ntf.dropped()
    }

    fn operation(&self, name: &str) -> Result<&SpecOperation> {
        self.spec
            .operation(name)
            .ok_or_else(|| EncodeError::UnknownOperation(name.to_string()).into())
    }

    fn group(&self, name: &str) -> Result<u32> {
        self.mcast_group_id(name)
            .ok_or_else(|| Error::UnknownGroup(name.to_string()))
    }

    fn msg_type(&self, op: &SpecOperation) -> Result<u16> {
        if self.spec.is_genetlink() {
            return Ok(self.family_id);
        }
        u16::try_from(op.value).map_err(|_| {
            EncodeError::OutOfRange {
                attr: op.name.clone(),
                value: op.value.to_string(),
            }
            .into()
        })
    }

    async fn transact_one(&self, call: Call<'_>) -> Result<Vec<Message>> {
        self.transact(vec![call])
            .await?
            .into_iter()
            .next()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    /// Send a batch and wait until every request has completed or failed.
    async fn transact(&self, calls: Vec<Call<'_>>) -> Result<Vec<Result<Vec<Message>>>> {
        let mut session = self.session.lock().await;

        let mut datagram = Vec::new();
        let mut pending = Vec::with_capacity(calls.len());
        for call in &calls {
            let hdr = RequestHeader {
                msg_type: self.msg_type(call.op)?,
                flags: call.flags,
                seq: session.next_seq(),
                port_id: self.port_id,
            };
            let request = encode_request(&self.spec, call.op, call.mode, call.attrs, hdr)?;
            datagram.extend_from_slice(&request);
            let exchange = Exchange::new(&call.op.name, hdr.seq, self.port_id, call.mode == OpMode::Dump);
            pending.push((exchange, request, None::<Error>));
        }

        tracing::debug!(
            family = self.spec.name(),
            requests = calls.len(),
            len = datagram.len(),
            "sending"
        );
        session.transport.send(&datagram).await?;
        for (exchange, _, _) in &mut pending {
            exchange.sent();
        }

        let deadline = self.config.timeout.map(|t| (Instant::now() + t, t));
        while pending.iter().any(|(ex, _, _)| !ex.is_finished()) {
            let datagram = match deadline {
                Some((at, limit)) => timeout_at(at, session.transport.recv())
                    .await
                    .map_err(|_| TransportError::Timeout(limit))??,
                None => session.transport.recv().await?,
            };

            for msg in MessageIter::new(&datagram) {
                let (hdr, payload, _) = msg?;
                let slot = pending
                    .iter_mut()
                    .zip(&calls)
                    .find(|((ex, _, _), _)| !ex.is_finished() && ex.matches(&hdr));
                let Some(((exchange, request, failure), call)) = slot else {
                    self.route(&hdr, payload, &mut session.ntf);
                    continue;
                };
                if let Step::Failed(mut err) = exchange.feed(&hdr, payload) {
                    if let Error::Netlink(nl) = &mut err {
                        annotate(&self.spec, call.op, request, &mut nl.extack);
                    }
                    tracing::debug!(op = %call.op.name, seq = hdr.nlmsg_seq, error = %err, "request failed");
                    *failure = Some(err);
                }
            }
        }

        Ok(pending
            .into_iter()
            .zip(&calls)
            .map(|((exchange, _, failure), call)| match failure {
                Some(err) => Err(err),
                None => self.decode_replies(call.op, exchange),
            })
            .collect())
    }

    fn decode_replies(&self, op: &SpecOperation, exchange: Exchange) -> Result<Vec<Message>> {
        exchange
            .into_replies()
            .iter()
            .map(|reply| {
                decode_message(&self.spec, &reply.header, &reply.payload, Some(op), self.config.decode)
                    .map_err(Error::from)
            })
            .collect()
    }

    fn route_datagram(&self, datagram: &[u8], queue: &mut NtfQueue) -> Result<()> {
        for msg in MessageIter::new(datagram) {
            let (hdr, payload, _) = msg?;
            self.route(&hdr, payload, queue);
        }
        Ok(())
    }

    /// Queue a message that answers no outstanding request if it is a
    /// notification of this family.
    fn route(&self, hdr: &NlMsgHdr, payload: &[u8], queue: &mut NtfQueue) {
        if hdr.nlmsg_type < NlMsgType::MIN_TYPE {
            tracing::debug!(msg_type = hdr.nlmsg_type, seq = hdr.nlmsg_seq, "dropping stray control message");
            return;
        }
        if self.spec.is_genetlink() && hdr.nlmsg_type != self.family_id {
            tracing::debug!(msg_type = hdr.nlmsg_type, "dropping message of another family");
            return;
        }
        match decode_message(&self.spec, hdr, payload, None, self.config.decode) {
            Ok(msg) if self.spec.operation(&msg.op).is_some_and(SpecOperation::is_ntf) => {
                tracing::trace!(op = %msg.op, "queued notification");
                queue.push(msg);
            }
            Ok(msg) => {
                tracing::debug!(op = %msg.op, seq = msg.seq, "dropping unsolicited reply");
            }
            Err(err) => {
                tracing::debug!(error = %err, seq = hdr.nlmsg_seq, "dropping undecodable message");
            }
        }
    }
}

impl<T: Transport> std::fmt::Debug for YnlFamily<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YnlFamily")
            .field("family", &self.spec.name())
            .field("family_id", &self.family_id)
            .field("port_id", &self.port_id)
            .finish_non_exhaustive()
    }
}
