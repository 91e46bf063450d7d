//! Netlink wire primitives.
//!
//! This module contains the fixed parts of the protocol that do not depend
//! on any family description: message and attribute headers, the generic
//! netlink header, the `nlctrl` family, extended ACKs and the socket.
//!
//! # Layout
//!
//! ```text
//! nlmsghdr | [genlmsghdr] | [fixed header] | nlattr TLV stream
//! ```
//!
//! Attribute headers are `(len: u16, type: u16)`; the two high bits of
//! `type` are the nested and net-byteorder flags, payloads are padded to a
//! 4-byte boundary.

pub mod attr;
pub mod builder;
pub mod extack;
pub mod genl;
pub mod message;
pub mod socket;

pub use attr::{AttrIter, NLA_HDRLEN, NlAttr, RawAttr, nla_align};
pub use builder::{AttrBuffer, MessageBuilder, NestToken};
pub use extack::{ExtAck, ExtAckPolicy};
pub use genl::{FamilyInfo, GENL_HDRLEN, GENL_ID_CTRL, GenlMsgHdr};
pub use message::{MessageIter, NLMSG_HDRLEN, NlMsgError, NlMsgHdr, NlMsgType};
pub use socket::NetlinkSocket;

/// Netlink protocol constants in one namespace.
pub struct Netlink;

impl Netlink {
    // Socket options
    pub const SOL_NETLINK: i32 = 270;
    pub const NETLINK_ADD_MEMBERSHIP: i32 = 1;
    pub const NETLINK_CAP_ACK: i32 = 10;
    pub const NETLINK_EXT_ACK: i32 = 11;
    pub const NETLINK_GET_STRICT_CHK: i32 = 12;

    // Protocol numbers
    pub const NETLINK_ROUTE: u32 = 0;
    pub const NETLINK_NETFILTER: u32 = 12;
    pub const NETLINK_GENERIC: u32 = 16;

    // Message types
    pub const NLMSG_NOOP: u16 = NlMsgType::NOOP;
    pub const NLMSG_ERROR: u16 = NlMsgType::ERROR;
    pub const NLMSG_DONE: u16 = NlMsgType::DONE;
    pub const NLMSG_OVERRUN: u16 = NlMsgType::OVERRUN;

    // Message flags
    pub const NLM_F_REQUEST: u16 = message::NLM_F_REQUEST;
    pub const NLM_F_MULTI: u16 = message::NLM_F_MULTI;
    pub const NLM_F_ACK: u16 = message::NLM_F_ACK;
    pub const NLM_F_ECHO: u16 = message::NLM_F_ECHO;
    pub const NLM_F_DUMP_INTR: u16 = message::NLM_F_DUMP_INTR;
    pub const NLM_F_ROOT: u16 = message::NLM_F_ROOT;
    pub const NLM_F_MATCH: u16 = message::NLM_F_MATCH;
    pub const NLM_F_DUMP: u16 = message::NLM_F_DUMP;
    pub const NLM_F_REPLACE: u16 = message::NLM_F_REPLACE;
    pub const NLM_F_EXCL: u16 = message::NLM_F_EXCL;
    pub const NLM_F_CREATE: u16 = message::NLM_F_CREATE;
    pub const NLM_F_APPEND: u16 = message::NLM_F_APPEND;
    pub const NLM_F_CAPPED: u16 = message::NLM_F_CAPPED;
    pub const NLM_F_ACK_TLVS: u16 = message::NLM_F_ACK_TLVS;

    // Attribute flags
    pub const NLA_F_NESTED: u16 = attr::NLA_F_NESTED;
    pub const NLA_F_NET_BYTEORDER: u16 = attr::NLA_F_NET_BYTEORDER;
    pub const NLA_TYPE_MASK: u16 = attr::NLA_TYPE_MASK;

    // Generic netlink control family
    pub const GENL_ID_CTRL: u16 = genl::GENL_ID_CTRL;

    // Extended ACK attributes
    pub const NLMSGERR_ATTR_MSG: u16 = extack::NLMSGERR_ATTR_MSG;
    pub const NLMSGERR_ATTR_OFFS: u16 = extack::NLMSGERR_ATTR_OFFS;
    pub const NLMSGERR_ATTR_COOKIE: u16 = extack::NLMSGERR_ATTR_COOKIE;
    pub const NLMSGERR_ATTR_POLICY: u16 = extack::NLMSGERR_ATTR_POLICY;
    pub const NLMSGERR_ATTR_MISS_TYPE: u16 = extack::NLMSGERR_ATTR_MISS_TYPE;
    pub const NLMSGERR_ATTR_MISS_NEST: u16 = extack::NLMSGERR_ATTR_MISS_NEST;
}
