//! Request/response state machine.
//!
//! An [`Exchange`] tracks one request from the moment it is sent until its
//! replies are complete:
//!
//! ```text
//! Idle -> Sent -> Receiving* -> Complete | Failed
//! ```
//!
//! It is fed every message whose sequence number and port id match the
//! request and answers with a [`Step`]. Messages that do not match are not
//! its business; the client routes them to the notification path.

use std::io;

use crate::error::{DecodeError, Error, NlError, TransportError};
use crate::netlink::extack::ExtAck;
use crate::netlink::message::{NLM_F_ACK_TLVS, NlMsgError, NlMsgHdr, NlMsgType};

/// Where an exchange stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum State {
    Idle,
    Sent,
    Receiving,
    Complete,
    Failed,
}

/// Outcome of feeding one message.
#[derive(Debug)]
pub(crate) enum Step {
    /// More messages are expected.
    Continue,
    /// All replies arrived.
    Complete,
    /// The request failed; replies collected so far are discarded.
    Failed(Error),
}

/// A data message belonging to an exchange, kept undecoded.
#[derive(Debug, Clone)]
pub(crate) struct RawReply {
    pub(crate) header: NlMsgHdr,
    pub(crate) payload: Vec<u8>,
}

#[derive(Debug)]
pub(crate) struct Exchange {
    op: String,
    seq: u32,
    port_id: u32,
    dump: bool,
    state: State,
    replies: Vec<RawReply>,
}

impl Exchange {
    pub(crate) fn new(op: impl Into<String>, seq: u32, port_id: u32, dump: bool) -> Self {
        Self {
            op: op.into(),
            seq,
            port_id,
            dump,
            state: State::Idle,
            replies: Vec::new(),
        }
    }

    pub(crate) fn sent(&mut self) {
        if self.state == State::Idle {
            self.state = State::Sent;
        }
    }

    pub(crate) fn state(&self) -> State {
        self.state
    }

    pub(crate) fn is_finished(&self) -> bool {
        matches!(self.state, State::Complete | State::Failed)
    }

    /// Check if a message answers this request.
    pub(crate) fn matches(&self, hdr: &NlMsgHdr) -> bool {
        hdr.nlmsg_seq == self.seq && hdr.nlmsg_pid == self.port_id
    }

    /// Advance with one matching message.
    pub(crate) fn feed(&mut self, hdr: &NlMsgHdr, payload: &[u8]) -> Step {
        if self.is_finished() {
            tracing::debug!(op = %self.op, seq = self.seq, "message after completion ignored");
            return Step::Continue;
        }

        let step = match hdr.nlmsg_type {
            NlMsgType::NOOP => Step::Continue,
            NlMsgType::ERROR => self.on_error(hdr, payload),
            NlMsgType::DONE => self.on_done(hdr, payload),
            NlMsgType::OVERRUN => Step::Failed(
                TransportError::Io(io::Error::from_raw_os_error(libc::ENOBUFS)).into(),
            ),
            _ => {
                if self.dump && hdr.is_dump_interrupted() {
                    Step::Failed(Error::DumpInterrupted {
                        op: self.op.clone(),
                    })
                } else {
                    self.replies.push(RawReply {
                        header: *hdr,
                        payload: payload.to_vec(),
                    });
                    Step::Continue
                }
            }
        };

        self.state = match &step {
            Step::Continue => State::Receiving,
            Step::Complete => State::Complete,
            Step::Failed(_) => {
                self.replies.clear();
                State::Failed
            }
        };
        step
    }

    fn on_error(&self, hdr: &NlMsgHdr, payload: &[u8]) -> Step {
        let err = match NlMsgError::from_bytes(payload) {
            Ok(err) => err,
            Err(e) => return Step::Failed(e.into()),
        };
        if err.is_ack() {
            return Step::Complete;
        }
        let extack = extack_at(hdr, payload, err.ext_ack_offset(hdr.nlmsg_flags));
        Step::Failed(NlError::from_errno(err.error).with_extack(extack).into())
    }

    fn on_done(&self, hdr: &NlMsgHdr, payload: &[u8]) -> Step {
        if self.dump && hdr.is_dump_interrupted() {
            return Step::Failed(Error::DumpInterrupted {
                op: self.op.clone(),
            });
        }
        let code = match payload.get(..4) {
            Some(b) => i32::from_ne_bytes([b[0], b[1], b[2], b[3]]),
            None => 0,
        };
        if code < 0 {
            let extack = extack_at(hdr, payload, 4);
            return Step::Failed(NlError::from_errno(code).with_extack(extack).into());
        }
        Step::Complete
    }

    pub(crate) fn into_replies(self) -> Vec<RawReply> {
        self.replies
    }
}

/// Extended ACK attributes starting at `offset`, if the message has any.
fn extack_at(hdr: &NlMsgHdr, payload: &[u8], offset: usize) -> ExtAck {
    if hdr.nlmsg_flags & NLM_F_ACK_TLVS == 0 {
        return ExtAck::default();
    }
    let Some(data) = payload.get(offset..) else {
        return ExtAck::default();
    };
    ExtAck::parse(data).unwrap_or_else(|e: DecodeError| {
        tracing::warn!(error = %e, "malformed extended ACK");
        ExtAck::default()
    })
}
