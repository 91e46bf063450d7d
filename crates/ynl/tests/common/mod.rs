//! Common test utilities for integration tests.
//!
//! Provides a small generic netlink family, a raw-family variant, and
//! helpers that play the kernel side of a [`MemoryTransport`].

use std::sync::Arc;

use ynl::client::{ClientConfig, FamilyCache};
use ynl::codec::Encoder;
use ynl::netlink::builder::AttrBuffer;
use ynl::netlink::genl::{CtrlAttr, CtrlAttrMcastGrp, CtrlCmd};
use ynl::spec::{
    AttrDesc, AttrSetDesc, DefinitionDesc, EnumEntryDesc, FamilyDesc, OpMsgDesc, OperationDesc,
    ProtocolKind, StructMemberDesc, SubMessageDesc, SubMessageFormatDesc,
};
use ynl::transport::{Datagram, MemoryPeer};
use ynl::{Attrs, MemoryTransport, SpecFamily, YnlFamily};

/// Family id the scripted `nlctrl` hands out.
pub const FAMILY_ID: u16 = 0x1c;

/// Id of the `mgmt` multicast group.
pub const MGMT_GROUP: u32 = 7;

/// Command ids of the test family.
pub const CMD_DEV_GET: u8 = 1;
pub const CMD_DEV_SET: u8 = 2;
pub const CMD_DEV_ADD_NTF: u8 = 3;

fn dev_sets(desc: FamilyDesc) -> FamilyDesc {
    desc.definition(DefinitionDesc::enumeration(
        "dev-state",
        vec![EnumEntryDesc::named("down"), EnumEntryDesc::named("up")],
    ))
    .definition(DefinitionDesc::flags(
        "dev-flags",
        vec![
            EnumEntryDesc::named("up"),
            EnumEntryDesc::named("running"),
            EnumEntryDesc::named("multicast"),
        ],
    ))
    .attr_set(
        AttrSetDesc::new("dev")
            .attr(AttrDesc::new("ifindex", "u32"))
            .attr(AttrDesc::new("name", "string"))
            .attr(AttrDesc::new("mtu", "u32"))
            .attr(AttrDesc::new("state", "u32").with_enum("dev-state"))
            .attr(AttrDesc::new("flags", "u32").with_enum("dev-flags"))
            .attr(AttrDesc::new("stats", "nest").nested("stats"))
            .attr(AttrDesc::new("kind", "string"))
            .attr(AttrDesc::new("info", "sub-message").sub_message("dev-kind", "kind")),
    )
    .attr_set(
        AttrSetDesc::new("stats")
            .attr(AttrDesc::new("rx", "u64"))
            .attr(AttrDesc::new("tx", "u64")),
    )
    .attr_set(AttrSetDesc::new("vlan-attrs").attr(AttrDesc::new("id", "u16")))
    .sub_message(
        SubMessageDesc::new("dev-kind")
            .format(SubMessageFormatDesc::attrs("vlan", "vlan-attrs"))
            .format(SubMessageFormatDesc::empty("dummy")),
    )
}

fn dev_reply() -> OpMsgDesc {
    OpMsgDesc::attrs(["ifindex", "name", "mtu", "state", "flags", "stats"])
}

/// Generic netlink family used by most tests.
pub fn genl_family() -> Arc<SpecFamily> {
    let desc = dev_sets(FamilyDesc::new("devtest"))
        .op(OperationDesc::new("dev-get")
            .attribute_set("dev")
            .do_mode(OpMsgDesc::attrs(["ifindex"]).required(["ifindex"]), Some(dev_reply()))
            .dump_mode(OpMsgDesc::default(), Some(dev_reply())))
        .op(OperationDesc::new("dev-set")
            .attribute_set("dev")
            .do_mode(OpMsgDesc::attrs(["ifindex", "mtu", "kind", "info"]), None))
        .op(OperationDesc::new("dev-add-ntf").notify("dev-get").mcgrp("mgmt"))
        .mcast_group("mgmt", None);
    Arc::new(SpecFamily::resolve(&desc).expect("test family resolves"))
}

/// Raw family with a fixed header and per-direction message types.
pub fn raw_family() -> Arc<SpecFamily> {
    let desc = dev_sets(
        FamilyDesc::new("rawtest")
            .protocol(ProtocolKind::NetlinkRaw)
            .protonum(0)
            .fixed_header("dev-hdr"),
    )
    .definition(DefinitionDesc::structure(
        "dev-hdr",
        vec![
            StructMemberDesc::new("family", "u8"),
            StructMemberDesc::new("pad", "pad").len(3),
            StructMemberDesc::new("index", "s32"),
        ],
    ))
    .op(OperationDesc::new("getdev")
        .attribute_set("dev")
        .do_mode(
            OpMsgDesc::attrs(["name"]).value(18),
            Some(dev_reply().value(16)),
        )
        .dump_mode(OpMsgDesc::default().value(18), Some(dev_reply().value(16))))
    .op(OperationDesc::new("newdev-ntf")
        .value(16)
        .attribute_set("dev")
        .event(dev_reply())
        .mcgrp("dev"))
    .mcast_group("dev", Some(1));
    Arc::new(SpecFamily::resolve(&desc).expect("raw test family resolves"))
}

/// Client configuration with a private family cache.
pub fn config() -> ClientConfig {
    ClientConfig::new().family_cache(Arc::new(FamilyCache::new()))
}

/// Answer a `CTRL_CMD_GETFAMILY` request.
pub async fn serve_getfamily(peer: &mut MemoryPeer) {
    let req = peer.expect_request().await;
    assert_eq!(req.header.nlmsg_type, ynl::netlink::GENL_ID_CTRL);

    let mut attrs = AttrBuffer::new();
    attrs.append_attr(CtrlAttr::FamilyId as u16, &FAMILY_ID.to_ne_bytes());
    attrs.append_attr_str(CtrlAttr::FamilyName as u16, "devtest");
    attrs.append_attr_u32(CtrlAttr::Version as u16, 1);
    let groups = attrs.nest_start(CtrlAttr::McastGroups as u16);
    let group = attrs.nest_start(1);
    attrs.append_attr_str(CtrlAttrMcastGrp::Name as u16, "mgmt");
    attrs.append_attr_u32(CtrlAttrMcastGrp::Id as u16, MGMT_GROUP);
    attrs.nest_end(group);
    attrs.nest_end(groups);

    let reply = Datagram::new()
        .reply(&req, CtrlCmd::NewFamily as u8, 0, attrs.as_bytes())
        .ack(&req);
    assert!(peer.send(reply));
}

/// Connect a client for the generic test family.
pub async fn connect() -> (YnlFamily<MemoryTransport>, MemoryPeer) {
    connect_with(config()).await
}

/// Connect a client for the generic test family with `config`.
pub async fn connect_with(config: ClientConfig) -> (YnlFamily<MemoryTransport>, MemoryPeer) {
    let (transport, mut peer) = MemoryTransport::pair();
    let (family, ()) = tokio::join!(
        YnlFamily::with_transport(genl_family(), transport, config),
        serve_getfamily(&mut peer),
    );
    (family.expect("family resolves"), peer)
}

/// Encode `attrs` in `set` of `family`.
pub fn body(family: &SpecFamily, set: &str, attrs: &Attrs) -> Vec<u8> {
    Encoder::new(family)
        .encode_attrs(set, attrs)
        .expect("test attributes encode")
}

/// A `dev` reply body.
pub fn dev(ifindex: u32, name: &str) -> Attrs {
    Attrs::new()
        .with("ifindex", ifindex)
        .with("name", name)
        .with("mtu", 1500u32)
}

/// Install a tracing subscriber once, honoring `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Skip the test if netlink sockets cannot be opened here.
#[macro_export]
macro_rules! require_netlink {
    ($result:expr) => {
        match $result {
            Ok(family) => family,
            Err(ynl::Error::Transport(err)) => {
                eprintln!("Skipping test: netlink unavailable ({})", err);
                return;
            }
            Err(err) => panic!("unexpected error: {}", err),
        }
    };
}
