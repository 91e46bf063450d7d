//! Generic Netlink header and control family (`nlctrl`) messages.
//!
//! GENL messages carry an additional header after the standard netlink
//! header:
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ nlmsghdr (16 bytes)                     │
//! │   nlmsg_len, nlmsg_type (family_id),    │
//! │   nlmsg_flags, nlmsg_seq, nlmsg_pid     │
//! ├─────────────────────────────────────────┤
//! │ genlmsghdr (4 bytes)                    │
//! │   cmd (u8), version (u8), reserved (u16)│
//! ├─────────────────────────────────────────┤
//! │ Attributes (TLV format)                 │
//! └─────────────────────────────────────────┘
//! ```
//!
//! Family ids are assigned dynamically and resolved by name through the
//! control family, which has the fixed id [`GENL_ID_CTRL`].

use std::collections::HashMap;

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use super::attr::AttrIter;
use super::builder::{AttrBuffer, MessageBuilder};
use super::message::{NLM_F_ACK, NLM_F_REQUEST};
use crate::error::DecodeError;

/// Control family id (fixed, not dynamically assigned).
pub const GENL_ID_CTRL: u16 = 0x10;

/// Generic Netlink message header.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct GenlMsgHdr {
    /// Command identifier (family-specific)
    pub cmd: u8,
    /// Interface version
    pub version: u8,
    /// Reserved for future use
    pub reserved: u16,
}

/// Size of the GENL header in bytes.
pub const GENL_HDRLEN: usize = std::mem::size_of::<GenlMsgHdr>();

impl GenlMsgHdr {
    /// Create a new GENL header with the given command and version.
    #[inline]
    pub const fn new(cmd: u8, version: u8) -> Self {
        Self {
            cmd,
            version,
            reserved: 0,
        }
    }

    /// Parse a header from the start of a message payload.
    pub fn from_bytes(data: &[u8]) -> Result<Self, DecodeError> {
        Self::read_from_prefix(data)
            .map(|(hdr, _)| hdr)
            .map_err(|_| DecodeError::Truncated {
                offset: super::message::NLMSG_HDRLEN,
                needed: GENL_HDRLEN,
                available: data.len(),
            })
    }

    /// Get the header as a byte slice.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        <Self as IntoBytes>::as_bytes(self)
    }
}

/// Control family commands
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CtrlCmd {
    Unspec = 0,
    NewFamily = 1,
    DelFamily = 2,
    GetFamily = 3,
    NewOps = 4,
    DelOps = 5,
    GetOps = 6,
    NewMcastGrp = 7,
    DelMcastGrp = 8,
    GetMcastGrp = 9,
    GetPolicy = 10,
}

/// Control family attributes
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CtrlAttr {
    Unspec = 0,
    FamilyId = 1,
    FamilyName = 2,
    Version = 3,
    HdrSize = 4,
    MaxAttr = 5,
    Ops = 6,
    McastGroups = 7,
    Policy = 8,
    OpPolicy = 9,
    Op = 10,
}

/// Control family multicast group attributes
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CtrlAttrMcastGrp {
    Unspec = 0,
    Name = 1,
    Id = 2,
}

/// Information about a Generic Netlink family, as reported by `nlctrl`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FamilyInfo {
    /// Dynamically assigned family ID (used as nlmsg_type).
    pub id: u16,
    /// Family version.
    pub version: u8,
    /// Header size (additional bytes after genlmsghdr).
    pub hdr_size: u32,
    /// Maximum attribute number.
    pub max_attr: u32,
    /// Multicast groups: name -> group ID.
    pub mcast_groups: HashMap<String, u32>,
}

/// Build a `CTRL_CMD_GETFAMILY` request for `name`.
pub fn get_family_request(name: &str) -> MessageBuilder {
    let mut builder = MessageBuilder::new(GENL_ID_CTRL, NLM_F_REQUEST | NLM_F_ACK);
    builder.append_bytes(GenlMsgHdr::new(CtrlCmd::GetFamily as u8, 1).as_bytes());
    let mut attrs = AttrBuffer::new();
    attrs.append_attr_str(CtrlAttr::FamilyName as u16, name);
    builder.append_attrs(&attrs);
    builder
}

/// Parse the payload (genl header included) of a `CTRL_CMD_NEWFAMILY` reply.
pub fn parse_family(payload: &[u8]) -> Result<FamilyInfo, DecodeError> {
    GenlMsgHdr::from_bytes(payload)?;
    parse_family_attrs(&payload[GENL_HDRLEN..])
}

/// Parse family attributes from a `CTRL_CMD_GETFAMILY` response.
pub fn parse_family_attrs(data: &[u8]) -> Result<FamilyInfo, DecodeError> {
    let mut id: Option<u16> = None;
    let mut info = FamilyInfo::default();

    for attr in AttrIter::new(data) {
        let attr = attr?;
        match attr.kind() {
            t if t == CtrlAttr::FamilyId as u16 => {
                id = Some(u16::from_ne_bytes(fixed(attr.payload, "family-id")?));
            }
            t if t == CtrlAttr::Version as u16 => {
                info.version = u32::from_ne_bytes(fixed(attr.payload, "version")?) as u8;
            }
            t if t == CtrlAttr::HdrSize as u16 => {
                info.hdr_size = u32::from_ne_bytes(fixed(attr.payload, "hdrsize")?);
            }
            t if t == CtrlAttr::MaxAttr as u16 => {
                info.max_attr = u32::from_ne_bytes(fixed(attr.payload, "maxattr")?);
            }
            t if t == CtrlAttr::McastGroups as u16 => {
                info.mcast_groups = parse_mcast_groups(attr.payload)?;
            }
            _ => {}
        }
    }

    info.id = id.ok_or_else(|| DecodeError::Payload {
        attr: "family-id".into(),
        expected: 2,
        actual: 0,
    })?;
    Ok(info)
}

/// Parse multicast groups from CTRL_ATTR_MCAST_GROUPS.
fn parse_mcast_groups(data: &[u8]) -> Result<HashMap<String, u32>, DecodeError> {
    let mut groups = HashMap::new();

    // An indexed array of nests, one per group
    for group in AttrIter::new(data) {
        let group = group?;
        let mut name: Option<String> = None;
        let mut grp_id: Option<u32> = None;

        for attr in AttrIter::new(group.payload) {
            let attr = attr?;
            match attr.kind() {
                t if t == CtrlAttrMcastGrp::Name as u16 => {
                    let len = attr
                        .payload
                        .iter()
                        .position(|&b| b == 0)
                        .unwrap_or(attr.payload.len());
                    let text = std::str::from_utf8(&attr.payload[..len]).map_err(|_| {
                        DecodeError::InvalidUtf8 {
                            attr: "mcast-grp-name".into(),
                        }
                    })?;
                    name = Some(text.to_string());
                }
                t if t == CtrlAttrMcastGrp::Id as u16 => {
                    grp_id = Some(u32::from_ne_bytes(fixed(attr.payload, "mcast-grp-id")?));
                }
                _ => {}
            }
        }

        if let (Some(name), Some(id)) = (name, grp_id) {
            groups.insert(name, id);
        }
    }

    Ok(groups)
}

fn fixed<const N: usize>(data: &[u8], attr: &str) -> Result<[u8; N], DecodeError> {
    data.get(..N)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| DecodeError::Payload {
            attr: attr.to_string(),
            expected: N,
            actual: data.len(),
        })
}
