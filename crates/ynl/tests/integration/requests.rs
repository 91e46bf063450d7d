//! Family resolution and do requests.

use std::sync::Arc;
use std::time::Duration;

use ynl::client::{FamilyCache, RequestFlags};
use ynl::codec::Decoder;
use ynl::netlink::message::{NLM_F_ACK, NLM_F_CREATE, NLM_F_EXCL, NLM_F_REQUEST};
use ynl::transport::{Datagram, MEMORY_PORT_ID};
use ynl::{Attrs, EncodeError, Error, MemoryTransport, Value, YnlFamily};

use crate::common::{
    CMD_DEV_GET, CMD_DEV_SET, FAMILY_ID, MGMT_GROUP, body, config, connect, dev, genl_family,
    init_tracing, serve_getfamily,
};

#[tokio::test]
async fn test_resolve_family() {
    init_tracing();
    let (family, _peer) = connect().await;
    assert_eq!(family.family_id(), FAMILY_ID);
    assert_eq!(family.port_id(), MEMORY_PORT_ID);
    assert_eq!(family.mcast_group_id("mgmt"), Some(MGMT_GROUP));
    assert_eq!(family.mcast_group_id("other"), None);
    assert_eq!(family.spec().name(), "devtest");
}

#[tokio::test]
async fn test_family_cache_reused() {
    let cache = Arc::new(FamilyCache::new());

    let (transport, mut peer) = MemoryTransport::pair();
    let (first, ()) = tokio::join!(
        YnlFamily::with_transport(genl_family(), transport, config().family_cache(cache.clone())),
        serve_getfamily(&mut peer),
    );
    assert_eq!(first.unwrap().family_id(), FAMILY_ID);
    assert_eq!(cache.get("devtest").unwrap().id, FAMILY_ID);

    // Nobody answers on the second connection; a lookup would hang.
    let (transport, _peer) = MemoryTransport::pair();
    let second = tokio::time::timeout(
        Duration::from_secs(1),
        YnlFamily::with_transport(genl_family(), transport, config().family_cache(cache)),
    )
    .await
    .expect("cached family resolves without a request")
    .unwrap();
    assert_eq!(second.family_id(), FAMILY_ID);
    assert_eq!(second.mcast_group_id("mgmt"), Some(MGMT_GROUP));
}

#[tokio::test]
async fn test_do_with_reply() {
    let (family, mut peer) = connect().await;
    let spec = genl_family();

    let reply_attrs = dev(3, "eth0")
        .with("state", Value::Enum("up".into()))
        .with(
            "flags",
            Value::Flags {
                names: vec!["up".into(), "running".into()],
                residual: 0,
            },
        );
    let reply_body = body(&spec, "dev", &reply_attrs);

    let request = Attrs::new().with("ifindex", 3u32);
    let (reply, ()) = tokio::join!(family.do_op("dev-get", &request), async {
        let req = peer.expect_request().await;
        assert_eq!(req.header.nlmsg_type, FAMILY_ID);
        assert_eq!(req.header.nlmsg_flags, NLM_F_REQUEST | NLM_F_ACK);
        assert_eq!(req.header.nlmsg_pid, MEMORY_PORT_ID);
        let genl = req.genl().unwrap();
        assert_eq!(genl.cmd, CMD_DEV_GET);
        assert_eq!(genl.version, 1);

        let sent = Decoder::new(&spec).decode_attrs("dev", req.genl_body()).unwrap();
        assert_eq!(sent.get("ifindex"), Some(&Value::Uint(3)));

        peer.send(Datagram::new().reply(&req, CMD_DEV_GET, 0, &reply_body).ack(&req));
    });

    let msg = reply.unwrap().expect("dev-get has a reply");
    assert_eq!(msg.op, "dev-get");
    assert_eq!(msg.cmd, Some(CMD_DEV_GET));
    assert_eq!(msg.get("name"), Some(&Value::String("eth0".into())));
    assert_eq!(msg.get("mtu"), Some(&Value::Uint(1500)));
    assert_eq!(msg.get("state"), Some(&Value::Enum("up".into())));
    assert_eq!(
        msg.get("flags"),
        Some(&Value::Flags {
            names: vec!["up".into(), "running".into()],
            residual: 0,
        })
    );
}

#[tokio::test]
async fn test_do_ack_only() {
    let (family, mut peer) = connect().await;

    let request = Attrs::new().with("ifindex", 3u32).with("mtu", 9000u32);
    let flags = RequestFlags::CREATE | RequestFlags::EXCL;
    let (reply, ()) = tokio::join!(family.do_with_flags("dev-set", &request, flags), async {
        let req = peer.expect_request().await;
        assert_eq!(
            req.header.nlmsg_flags,
            NLM_F_REQUEST | NLM_F_ACK | NLM_F_CREATE | NLM_F_EXCL
        );
        assert_eq!(req.genl().unwrap().cmd, CMD_DEV_SET);
        peer.send(Datagram::new().ack(&req));
    });
    assert_eq!(reply.unwrap(), None);
}

#[tokio::test]
async fn test_sequence_numbers_advance() {
    let (family, mut peer) = connect().await;
    let request = Attrs::new().with("ifindex", 1u32);

    let mut seqs = Vec::new();
    for _ in 0..2 {
        let (reply, seq) = tokio::join!(family.do_op("dev-set", &request), async {
            let req = peer.expect_request().await;
            peer.send(Datagram::new().ack(&req));
            req.seq()
        });
        reply.unwrap();
        seqs.push(seq);
    }
    assert_ne!(seqs[0], 0);
    assert_eq!(seqs[1], seqs[0] + 1);
}

#[tokio::test]
async fn test_sub_message_request() {
    let (family, mut peer) = connect().await;
    let spec = genl_family();

    let request = Attrs::new()
        .with("ifindex", 4u32)
        .with("kind", "vlan")
        .with("info", Attrs::new().with("id", 10u16));
    let (reply, ()) = tokio::join!(family.do_op("dev-set", &request), async {
        let req = peer.expect_request().await;
        let sent = Decoder::new(&spec).decode_attrs("dev", req.genl_body()).unwrap();
        assert_eq!(sent.get("kind"), Some(&Value::String("vlan".into())));
        assert_eq!(
            sent.get("info"),
            Some(&Value::Nest(Attrs::new().with("id", 10u16)))
        );
        peer.send(Datagram::new().ack(&req));
    });
    reply.unwrap();
}

#[tokio::test]
async fn test_encode_errors_send_nothing() {
    let (family, mut peer) = connect().await;

    let err = family.do_op("dev-get", &Attrs::new()).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Encode(EncodeError::MissingAttr { ref attr, .. }) if attr == "ifindex"
    ));

    let err = family.do_op("dev-frobnicate", &Attrs::new()).await.unwrap_err();
    assert!(matches!(err, Error::Encode(EncodeError::UnknownOperation(_))));

    let err = family
        .do_op("dev-set", &Attrs::new().with("colour", "blue"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Encode(EncodeError::UnknownAttr { .. })));

    // A sub-message needs its selector.
    let err = family
        .do_op("dev-set", &Attrs::new().with("info", Attrs::new()))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Encode(EncodeError::MissingSelector { .. })));

    // dev-set has no dump mode.
    let err = family.dump("dev-set", &Attrs::new()).await.unwrap_err();
    assert!(matches!(err, Error::Encode(EncodeError::UnsupportedMode { .. })));

    drop(family);
    assert!(peer.recv().await.is_none());
}

#[tokio::test]
async fn test_do_multi() {
    let (family, mut peer) = connect().await;
    let spec = genl_family();

    let requests = [
        ("dev-get", Attrs::new().with("ifindex", 1u32)),
        ("dev-get", Attrs::new().with("ifindex", 2u32)),
        ("dev-set", Attrs::new().with("ifindex", 1u32).with("mtu", 1400u32)),
    ];
    let (results, ()) = tokio::join!(family.do_multi(&requests), async {
        let reqs = peer.recv().await.unwrap().unwrap();
        assert_eq!(reqs.len(), 3);
        assert_eq!(reqs[1].seq(), reqs[0].seq() + 1);
        assert_eq!(reqs[2].seq(), reqs[1].seq() + 1);

        // Answer out of order; replies are matched by sequence number.
        peer.send(Datagram::new().ack(&reqs[2]));
        peer.send(
            Datagram::new()
                .error(&reqs[1], -libc::ENODEV, &[])
                .reply(&reqs[0], CMD_DEV_GET, 0, &body(&spec, "dev", &dev(1, "lo")))
                .ack(&reqs[0]),
        );
    });

    let results = results.unwrap();
    assert_eq!(results.len(), 3);
    let first = results[0].as_ref().unwrap().as_ref().unwrap();
    assert_eq!(first.get("name"), Some(&Value::String("lo".into())));
    let second = results[1].as_ref().unwrap_err();
    assert!(second.is_not_found());
    assert_eq!(second.errno(), Some(libc::ENODEV));
    assert!(matches!(results[2], Ok(None)));
}
