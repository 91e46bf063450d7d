//! Whole netlink messages: headers, fixed header and attributes.

use super::decode::{DecodeOptions, Decoder};
use super::encode::Encoder;
use super::value::{Attrs, Value};
use crate::error::{DecodeError, EncodeError};
use crate::netlink::attr::nla_align;
use crate::netlink::builder::{AttrBuffer, MessageBuilder};
use crate::netlink::genl::{GENL_HDRLEN, GenlMsgHdr};
use crate::netlink::message::{NLMSG_HDRLEN, NlMsgHdr};
use crate::spec::{OpMode, SpecFamily, SpecOperation};

/// A decoded netlink message.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// `nlmsg_type`.
    pub msg_type: u16,
    /// `nlmsg_flags`.
    pub flags: u16,
    /// `nlmsg_seq`.
    pub seq: u32,
    /// `nlmsg_pid`.
    pub port_id: u32,
    /// Name of the operation the message belongs to.
    pub op: String,
    /// Generic netlink command.
    pub cmd: Option<u8>,
    /// Generic netlink version.
    pub version: Option<u8>,
    /// Members of the fixed header, if the operation has one.
    pub fixed_header: Option<Attrs>,
    /// Decoded attributes.
    pub attrs: Attrs,
}

impl Message {
    /// Look up a top-level attribute, falling back to fixed header members.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attrs
            .get(name)
            .or_else(|| self.fixed_header.as_ref().and_then(|h| h.get(name)))
    }
}

/// Everything needed to put one request on the wire.
#[derive(Debug, Clone, Copy)]
pub struct RequestHeader {
    /// `nlmsg_type`: the family id (genetlink) or the message type (raw).
    pub msg_type: u16,
    pub flags: u16,
    pub seq: u32,
    pub port_id: u32,
}

/// Serialize a request for `op`.
///
/// Members of the operation's fixed header are taken from `attrs` by name,
/// everything else is encoded with the operation's attribute set. Missing
/// required attributes fail before any byte is produced.
pub fn encode_request(
    family: &SpecFamily,
    op: &SpecOperation,
    mode: OpMode,
    attrs: &Attrs,
    hdr: RequestHeader,
) -> Result<Vec<u8>, EncodeError> {
    let request = op.request(mode).ok_or_else(|| EncodeError::UnsupportedMode {
        op: op.name.clone(),
        mode: mode.as_str(),
    })?;
    for name in &request.required {
        if !attrs.contains(name) {
            return Err(EncodeError::MissingAttr {
                op: op.name.clone(),
                attr: name.clone(),
            });
        }
    }

    let encoder = Encoder::new(family);
    let mut builder = MessageBuilder::new(hdr.msg_type, hdr.flags);
    builder.set_seq(hdr.seq);
    builder.set_pid(hdr.port_id);

    if family.is_genetlink() {
        let cmd = u8::try_from(op.value).map_err(|_| EncodeError::OutOfRange {
            attr: op.name.clone(),
            value: op.value.to_string(),
        })?;
        builder.append_bytes(GenlMsgHdr::new(cmd, family.version()).as_bytes());
    }

    let mut rest = attrs.clone();
    if let Some(header) = &op.fixed_header {
        builder.append_bytes(&encoder.encode_struct(header, attrs)?);
        if let Some(st) = family.struct_def(header) {
            for member in st.members() {
                rest.remove(&member.name);
            }
        }
    }

    match &op.attribute_set {
        Some(set) => {
            let set = family.need_attr_set(set)?;
            let mut buf = AttrBuffer::new();
            encoder.encode_set(set, &rest, None, &mut buf)?;
            builder.append_attrs(&buf);
        }
        None => {
            if let Some((name, _)) = rest.iter().next() {
                return Err(EncodeError::UnknownAttr {
                    set: op.name.clone(),
                    name: name.to_string(),
                });
            }
        }
    }

    Ok(builder.finish())
}

/// Offset of the first attribute in a message of `op`.
pub fn attrs_offset(family: &SpecFamily, op: &SpecOperation) -> usize {
    let mut offset = NLMSG_HDRLEN;
    if family.is_genetlink() {
        offset += GENL_HDRLEN;
    }
    if let Some(st) = op.fixed_header.as_deref().and_then(|h| family.struct_def(h)) {
        offset += nla_align(st.size());
    }
    offset
}

/// Find the operation a received message belongs to.
///
/// `hint` is the operation of the outstanding request, if any; it wins
/// when its reply value matches. Otherwise notifications are preferred over
/// replies of other operations.
pub fn lookup_op<'f>(
    family: &'f SpecFamily,
    value: u32,
    hint: Option<&'f SpecOperation>,
) -> Option<&'f SpecOperation> {
    hint.filter(|op| op.rsp_value == value)
        .or_else(|| family.ntf_by_value(value))
        .or_else(|| family.op_by_rsp_value(value))
}

/// Decode one message given its header and payload.
pub fn decode_message(
    family: &SpecFamily,
    hdr: &NlMsgHdr,
    payload: &[u8],
    hint: Option<&SpecOperation>,
    opts: DecodeOptions,
) -> Result<Message, DecodeError> {
    let (cmd, version, body, value) = if family.is_genetlink() {
        let genl = GenlMsgHdr::from_bytes(payload)?;
        (
            Some(genl.cmd),
            Some(genl.version),
            &payload[GENL_HDRLEN..],
            u32::from(genl.cmd),
        )
    } else {
        (None, None, payload, u32::from(hdr.nlmsg_type))
    };

    let op = lookup_op(family, value, hint).ok_or(DecodeError::UnknownMessage {
        msg_type: hdr.nlmsg_type,
        cmd,
    })?;

    let decoder = Decoder::with_options(family, opts);
    let mut offset = NLMSG_HDRLEN + (payload.len() - body.len());
    let mut body = body;
    let mut fixed_header = None;
    if let Some(header) = &op.fixed_header {
        let (members, size) = decoder.decode_struct(header, body)?;
        let size = nla_align(size).min(body.len());
        body = &body[size..];
        offset += size;
        fixed_header = Some(members);
    }

    let attrs = match &op.attribute_set {
        Some(set) => decoder.decode_set(family.need_attr_set(set)?, body, offset, None)?,
        None => Attrs::new(),
    };

    tracing::trace!(op = %op.name, seq = hdr.nlmsg_seq, attrs = attrs.len(), "decoded message");

    Ok(Message {
        msg_type: hdr.nlmsg_type,
        flags: hdr.nlmsg_flags,
        seq: hdr.nlmsg_seq,
        port_id: hdr.nlmsg_pid,
        op: op.name.clone(),
        cmd,
        version,
        fixed_header,
        attrs,
    })
}
