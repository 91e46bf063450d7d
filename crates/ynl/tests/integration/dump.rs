//! Dump requests.

use ynl::netlink::message::{NLM_F_ACK, NLM_F_DUMP, NLM_F_DUMP_INTR, NLM_F_MULTI, NLM_F_REQUEST};
use ynl::transport::Datagram;
use ynl::{Attrs, Error, Value};

use crate::common::{CMD_DEV_GET, body, connect, dev, genl_family};

#[tokio::test]
async fn test_dump_collects_all_parts() {
    let (family, mut peer) = connect().await;
    let spec = genl_family();

    let empty = Attrs::new();
    let (replies, ()) = tokio::join!(family.dump("dev-get", &empty), async {
        let req = peer.expect_request().await;
        assert_eq!(req.header.nlmsg_flags, NLM_F_REQUEST | NLM_F_DUMP);
        assert_eq!(req.header.nlmsg_flags & NLM_F_ACK, 0);
        assert!(req.genl_body().is_empty());

        peer.send(
            Datagram::new()
                .reply(&req, CMD_DEV_GET, NLM_F_MULTI, &body(&spec, "dev", &dev(1, "lo")))
                .reply(&req, CMD_DEV_GET, NLM_F_MULTI, &body(&spec, "dev", &dev(2, "eth0"))),
        );
        peer.send(
            Datagram::new()
                .reply(&req, CMD_DEV_GET, NLM_F_MULTI, &body(&spec, "dev", &dev(3, "eth1")))
                .done(&req, 0),
        );
    });

    let replies = replies.unwrap();
    let names: Vec<_> = replies
        .iter()
        .map(|m| m.get("name").and_then(Value::as_str).unwrap().to_string())
        .collect();
    assert_eq!(names, ["lo", "eth0", "eth1"]);
    assert!(replies.iter().all(|m| m.op == "dev-get"));
}

#[tokio::test]
async fn test_dump_empty() {
    let (family, mut peer) = connect().await;

    let empty = Attrs::new();
    let (replies, ()) = tokio::join!(family.dump("dev-get", &empty), async {
        let req = peer.expect_request().await;
        peer.send(Datagram::new().done(&req, 0));
    });
    assert!(replies.unwrap().is_empty());
}

#[tokio::test]
async fn test_dump_nested_stats() {
    let (family, mut peer) = connect().await;
    let spec = genl_family();

    let stats = Attrs::new().with("rx", 100u64).with("tx", 42u64);
    let entry = dev(1, "lo").with("stats", stats.clone());

    let empty = Attrs::new();
    let (replies, ()) = tokio::join!(family.dump("dev-get", &empty), async {
        let req = peer.expect_request().await;
        peer.send(
            Datagram::new()
                .reply(&req, CMD_DEV_GET, NLM_F_MULTI, &body(&spec, "dev", &entry))
                .done(&req, 0),
        );
    });

    let replies = replies.unwrap();
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].get("stats"), Some(&Value::Nest(stats)));
}

#[tokio::test]
async fn test_dump_interrupted() {
    let (family, mut peer) = connect().await;
    let spec = genl_family();

    let empty = Attrs::new();
    let (replies, ()) = tokio::join!(family.dump("dev-get", &empty), async {
        let req = peer.expect_request().await;
        peer.send(
            Datagram::new()
                .reply(&req, CMD_DEV_GET, NLM_F_MULTI, &body(&spec, "dev", &dev(1, "lo")))
                .reply(
                    &req,
                    CMD_DEV_GET,
                    NLM_F_MULTI | NLM_F_DUMP_INTR,
                    &body(&spec, "dev", &dev(2, "eth0")),
                )
                .done(&req, 0),
        );
    });

    let err = replies.unwrap_err();
    assert!(matches!(err, Error::DumpInterrupted { ref op } if op == "dev-get"));
}

#[tokio::test]
async fn test_dump_done_with_error() {
    let (family, mut peer) = connect().await;
    let spec = genl_family();

    let empty = Attrs::new();
    let (replies, ()) = tokio::join!(family.dump("dev-get", &empty), async {
        let req = peer.expect_request().await;
        peer.send(
            Datagram::new()
                .reply(&req, CMD_DEV_GET, NLM_F_MULTI, &body(&spec, "dev", &dev(1, "lo")))
                .done(&req, -libc::EBUSY),
        );
    });

    let err = replies.unwrap_err();
    assert_eq!(err.errno(), Some(libc::EBUSY));
}

#[tokio::test]
async fn test_dump_then_do() {
    let (family, mut peer) = connect().await;

    let empty = Attrs::new();
    let (replies, ()) = tokio::join!(family.dump("dev-get", &empty), async {
        let req = peer.expect_request().await;
        peer.send(Datagram::new().done(&req, 0));
    });
    replies.unwrap();

    // The session is free again after the dump completed.
    let request = Attrs::new().with("ifindex", 1u32);
    let (reply, ()) = tokio::join!(family.do_op("dev-set", &request), async {
        let req = peer.expect_request().await;
        peer.send(Datagram::new().ack(&req));
    });
    assert_eq!(reply.unwrap(), None);
}
