//! Spec-driven encoding and decoding of netlink payloads.
//!
//! Values are exchanged as [`Attrs`], an ordered map from attribute names
//! to [`Value`]s. The [`Encoder`] turns such a map into an attribute
//! stream using a resolved [`SpecFamily`](crate::SpecFamily), the
//! [`Decoder`] does the reverse. [`message`] wraps both with the netlink,
//! generic netlink and fixed headers.

pub mod decode;
pub mod encode;
pub mod extack;
pub mod message;
pub mod scalar;
pub mod value;

pub use decode::{DecodeOptions, Decoder, UnknownAttrPolicy};
pub use encode::Encoder;
pub use message::{Message, RequestHeader};
pub use value::{Attrs, Value};

/// Attributes visible while coding one nesting level.
///
/// Sub-message selectors are looked up here: first among the siblings of
/// the attribute being coded, then outward through the enclosing levels.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Scope<'s> {
    pub(crate) attrs: &'s Attrs,
    pub(crate) parent: Option<&'s Scope<'s>>,
}

impl<'s> Scope<'s> {
    pub(crate) fn find(&self, name: &str) -> Option<&'s Value> {
        self.attrs
            .get(name)
            .or_else(|| self.parent.and_then(|p| p.find(name)))
    }
}

/// A small link-style family covering every attribute kind.
#[cfg(test)]
pub(crate) fn test_family() -> crate::spec::SpecFamily {
    use crate::spec::desc::*;
    use crate::spec::{ByteOrder, DisplayHint, SpecFamily};

    let desc = FamilyDesc::new("linkish")
        .version(2)
        .definition(DefinitionDesc::enumeration(
            "link-state",
            vec![
                EnumEntryDesc::named("down"),
                EnumEntryDesc::named("up"),
                EnumEntryDesc::named("dormant"),
            ],
        ))
        .definition(DefinitionDesc::flags(
            "link-flags",
            vec![
                EnumEntryDesc::named("up"),
                EnumEntryDesc::named("broadcast"),
                EnumEntryDesc::named("loopback"),
                EnumEntryDesc::named("running"),
                EnumEntryDesc::named("multicast"),
            ],
        ))
        .definition(DefinitionDesc::structure(
            "link-hdr",
            vec![
                StructMemberDesc::new("family", "u8"),
                StructMemberDesc::new("pad", "pad").len(1),
                StructMemberDesc::new("type", "u16"),
                StructMemberDesc::new("index", "s32"),
            ],
        ))
        .definition(DefinitionDesc::structure(
            "vlan-hdr",
            vec![
                StructMemberDesc::new("vid", "u16"),
                StructMemberDesc::new("proto", "u16").byte_order(ByteOrder::BigEndian),
                StructMemberDesc::new("qos", "u8"),
            ],
        ))
        .attr_set(
            AttrSetDesc::new("link")
                .attr(AttrDesc::new("unspec", "unused").value(0))
                .attr(AttrDesc::new("ifindex", "u32"))
                .attr(AttrDesc::new("ifname", "string"))
                .attr(AttrDesc::new("mtu", "u32"))
                .attr(AttrDesc::new("flags", "u32").with_enum("link-flags"))
                .attr(AttrDesc::new("state", "u8").with_enum("link-state"))
                .attr(AttrDesc::new("kind", "string"))
                .attr(AttrDesc::new("linkinfo", "sub-message").sub_message("link-kind", "kind"))
                .attr(AttrDesc::new("address", "binary").display_hint(DisplayHint::Mac))
                .attr(AttrDesc::new("local", "binary").display_hint(DisplayHint::Ipv4))
                .attr(AttrDesc::new("stats", "nest").nested("stats"))
                .attr(AttrDesc::new("alt-name", "string").multi())
                .attr(AttrDesc::new("ports", "indexed-array").sub_type("nest").nested("port"))
                .attr(AttrDesc::new("vids", "indexed-array").sub_type("u16"))
                .attr(AttrDesc::new("queues", "nest-type-value").nested("stats"))
                .attr(AttrDesc::new("offset", "s16"))
                .attr(AttrDesc::new("rate", "uint"))
                .attr(AttrDesc::new("change", "bitfield32"))
                .attr(AttrDesc::new("gateway", "u32")
                    .byte_order(ByteOrder::BigEndian)
                    .display_hint(DisplayHint::Ipv4))
                .attr(AttrDesc::new("carrier", "flag"))
                .attr(AttrDesc::new("vlan", "binary").with_struct("vlan-hdr"))
                .attr(AttrDesc::new("pad", "pad"))
                .attr(AttrDesc::new("bytes", "u64"))
                .attr(AttrDesc::new("features", "u32").display_hint(DisplayHint::Hex)),
        )
        .attr_set(
            AttrSetDesc::new("stats")
                .attr(AttrDesc::new("rx", "u64"))
                .attr(AttrDesc::new("tx", "u64")),
        )
        .attr_set(
            AttrSetDesc::new("port")
                .attr(AttrDesc::new("id", "u32"))
                .attr(AttrDesc::new("name", "string")),
        )
        .attr_set(
            AttrSetDesc::new("vlan-attrs")
                .attr(AttrDesc::new("prio", "u8"))
                .attr(AttrDesc::new("egress", "nest").nested("stats")),
        )
        .attr_set(
            AttrSetDesc::new("bridge-attrs")
                .attr(AttrDesc::new("stp", "flag"))
                .attr(AttrDesc::new("cost", "u32")),
        )
        .sub_message(
            SubMessageDesc::new("link-kind")
                .format(SubMessageFormatDesc::attrs("vlan", "vlan-attrs").with_header("vlan-hdr"))
                .format(SubMessageFormatDesc::attrs("bridge", "bridge-attrs"))
                .format(SubMessageFormatDesc::empty("dummy")),
        )
        .op(OperationDesc::new("getlink")
            .attribute_set("link")
            .fixed_header("link-hdr")
            .do_mode(
                OpMsgDesc::attrs(["ifindex", "ifname"]).required(["ifindex"]),
                Some(OpMsgDesc::attrs(["ifindex", "ifname", "mtu", "flags"])),
            )
            .dump_mode(
                OpMsgDesc::default(),
                Some(OpMsgDesc::attrs(["ifindex", "ifname", "mtu", "flags"])),
            ))
        .op(OperationDesc::new("setlink")
            .attribute_set("link")
            .fixed_header("link-hdr")
            .do_mode(OpMsgDesc::attrs(["ifindex", "mtu", "linkinfo"]), None))
        .op(OperationDesc::new("link-ntf").notify("getlink").mcgrp("link"))
        .mcast_group("link", None);

    match SpecFamily::resolve(&desc) {
        Ok(family) => family,
        Err(err) => panic!("test family does not resolve: {}", err),
    }
}
