//! The `nlctrl` family against the running kernel.
//!
//! Querying generic netlink families needs no privileges; the tests skip
//! themselves only where netlink sockets cannot be opened at all.

use std::sync::Arc;

use ynl::spec::{AttrDesc, AttrSetDesc, FamilyDesc, OpMsgDesc, OperationDesc};
use ynl::{Attrs, SpecFamily, Value, YnlFamily};

use crate::common::init_tracing;

fn nlctrl() -> Arc<SpecFamily> {
    let info = || {
        OpMsgDesc::attrs(["family-id", "family-name", "version", "hdrsize", "maxattr", "ops", "mcast-groups"])
            .value(1)
    };
    let desc = FamilyDesc::new("nlctrl")
        .version(2)
        .attr_set(
            AttrSetDesc::new("ctrl-attrs")
                .attr(AttrDesc::new("family-id", "u16").value(1))
                .attr(AttrDesc::new("family-name", "string"))
                .attr(AttrDesc::new("version", "u32"))
                .attr(AttrDesc::new("hdrsize", "u32"))
                .attr(AttrDesc::new("maxattr", "u32"))
                .attr(AttrDesc::new("ops", "indexed-array").sub_type("nest").nested("op-attrs"))
                .attr(AttrDesc::new("mcast-groups", "indexed-array")
                    .sub_type("nest")
                    .nested("mcast-group-attrs")),
        )
        .attr_set(
            AttrSetDesc::new("op-attrs")
                .attr(AttrDesc::new("id", "u32").value(1))
                .attr(AttrDesc::new("flags", "u32")),
        )
        .attr_set(
            AttrSetDesc::new("mcast-group-attrs")
                .attr(AttrDesc::new("name", "string").value(1))
                .attr(AttrDesc::new("id", "u32")),
        )
        .op(OperationDesc::new("getfamily")
            .value(3)
            .attribute_set("ctrl-attrs")
            .do_mode(
                OpMsgDesc::attrs(["family-name"]).required(["family-name"]),
                Some(info()),
            )
            .dump_mode(OpMsgDesc::default(), Some(info())))
        .mcast_group("notify", None);
    Arc::new(SpecFamily::resolve(&desc).expect("nlctrl description resolves"))
}

#[tokio::test]
async fn test_nlctrl_getfamily() {
    init_tracing();
    let family = require_netlink!(YnlFamily::new(nlctrl()).await);
    assert_eq!(family.family_id(), ynl::netlink::GENL_ID_CTRL);
    assert!(family.mcast_group_id("notify").is_some());

    let request = Attrs::new().with("family-name", "nlctrl");
    let msg = family.do_op("getfamily", &request).await.unwrap().unwrap();
    assert_eq!(msg.get("family-id"), Some(&Value::Uint(0x10)));
    assert_eq!(msg.get("family-name"), Some(&Value::String("nlctrl".into())));

    let groups = msg.get("mcast-groups").and_then(Value::as_list).unwrap();
    assert!(groups.iter().any(|g| {
        g.as_nest()
            .and_then(|g| g.get("name"))
            .and_then(Value::as_str)
            == Some("notify")
    }));
}

#[tokio::test]
async fn test_nlctrl_dump() {
    let family = require_netlink!(YnlFamily::new(nlctrl()).await);

    let families = family.dump("getfamily", &Attrs::new()).await.unwrap();
    assert!(families.iter().any(|m| {
        m.get("family-name").and_then(Value::as_str) == Some("nlctrl")
    }));
}

#[tokio::test]
async fn test_nlctrl_unknown_family() {
    let family = require_netlink!(YnlFamily::new(nlctrl()).await);

    let request = Attrs::new().with("family-name", "no-such-family");
    let err = family.do_op("getfamily", &request).await.unwrap_err();
    assert!(err.is_not_found());
}
