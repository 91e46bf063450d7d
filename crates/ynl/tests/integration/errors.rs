//! Kernel errors, extended ACKs and transport failures.

use std::time::Duration;

use ynl::codec::decode::unknown_key;
use ynl::netlink::attr::AttrIter;
use ynl::netlink::builder::AttrBuffer;
use ynl::netlink::extack::{NLMSGERR_ATTR_MISS_TYPE, NLMSGERR_ATTR_MSG, NLMSGERR_ATTR_OFFS};
use ynl::netlink::{GENL_HDRLEN, NLMSG_HDRLEN};
use ynl::transport::Datagram;
use ynl::{Attrs, Error, TransportError, UnknownAttrPolicy, Value};

use crate::common::{CMD_DEV_GET, body, config, connect, connect_with, dev, genl_family};

#[tokio::test]
async fn test_error_names_bad_attribute() {
    let (family, mut peer) = connect().await;

    let request = Attrs::new().with("ifindex", 3u32).with("mtu", 100_000u32);
    let (reply, ()) = tokio::join!(family.do_op("dev-set", &request), async {
        let req = peer.expect_request().await;
        let mtu = AttrIter::with_offset(req.genl_body(), NLMSG_HDRLEN + GENL_HDRLEN)
            .map(|a| a.unwrap())
            .find(|a| a.kind() == 3)
            .expect("mtu attribute in request");

        let mut extack = AttrBuffer::new();
        extack.append_attr_str(NLMSGERR_ATTR_MSG, "mtu out of range");
        extack.append_attr_u32(NLMSGERR_ATTR_OFFS, mtu.offset as u32);
        peer.send(Datagram::new().error(&req, -libc::ERANGE, extack.as_bytes()));
    });

    let Err(Error::Netlink(err)) = reply else {
        panic!("expected a netlink error, got {:?}", reply);
    };
    assert_eq!(err.code, libc::ERANGE);
    assert_eq!(err.extack.msg.as_deref(), Some("mtu out of range"));
    assert_eq!(err.extack.bad_attr.as_deref(), Some(".mtu"));
}

#[tokio::test]
async fn test_error_names_missing_attribute() {
    let (family, mut peer) = connect().await;

    let request = Attrs::new().with("mtu", 1500u32);
    let (reply, ()) = tokio::join!(family.do_op("dev-set", &request), async {
        let req = peer.expect_request().await;
        let mut extack = AttrBuffer::new();
        extack.append_attr_u32(NLMSGERR_ATTR_MISS_TYPE, 1);
        peer.send(Datagram::new().error(&req, -libc::EINVAL, extack.as_bytes()));
    });

    let err = reply.unwrap_err();
    let Error::Netlink(err) = err else {
        panic!("expected a netlink error");
    };
    assert_eq!(err.code, libc::EINVAL);
    assert_eq!(err.extack.miss_type, Some(1));
    assert_eq!(err.extack.miss_type_name.as_deref(), Some(".ifindex"));
}

#[tokio::test]
async fn test_timeout() {
    let (family, mut peer) = connect_with(config().timeout(Duration::from_millis(50))).await;

    let request = Attrs::new().with("ifindex", 1u32);
    let (reply, _req) = tokio::join!(family.do_op("dev-set", &request), peer.expect_request());

    let err = reply.unwrap_err();
    assert!(matches!(
        err,
        Error::Transport(TransportError::Timeout(d)) if d == Duration::from_millis(50)
    ));
}

#[tokio::test]
async fn test_with_timeout_builder() {
    let (family, mut peer) = connect().await;
    let family = family.with_timeout(Duration::from_millis(20));
    assert_eq!(family.config().get_timeout(), Some(Duration::from_millis(20)));

    let empty = Attrs::new();
    let (reply, _req) = tokio::join!(family.dump("dev-get", &empty), peer.expect_request());
    assert!(matches!(
        reply,
        Err(Error::Transport(TransportError::Timeout(_)))
    ));
}

#[tokio::test]
async fn test_closed_peer() {
    let (family, peer) = connect().await;
    drop(peer);

    let err = family
        .do_op("dev-set", &Attrs::new().with("ifindex", 1u32))
        .await
        .unwrap_err();
    assert!(err.is_closed());
}

#[tokio::test]
async fn test_peer_closes_mid_request() {
    let (family, mut peer) = connect().await;

    let request = Attrs::new().with("ifindex", 1u32);
    let (reply, ()) = tokio::join!(family.do_op("dev-get", &request), async move {
        let _req = peer.expect_request().await;
        drop(peer);
    });
    assert!(reply.unwrap_err().is_closed());
}

#[tokio::test]
async fn test_malformed_reply() {
    let (family, mut peer) = connect().await;

    let request = Attrs::new().with("ifindex", 1u32);
    let (reply, ()) = tokio::join!(family.do_op("dev-get", &request), async {
        let req = peer.expect_request().await;
        // Attribute header claims 12 bytes, only 8 follow.
        let broken = [12, 0, 1, 0, 3, 0, 0, 0];
        peer.send(Datagram::new().reply(&req, CMD_DEV_GET, 0, &broken).ack(&req));
    });
    assert!(matches!(reply, Err(Error::Decode(_))));
}

fn with_unknown_attr() -> Vec<u8> {
    let mut data = body(&genl_family(), "dev", &dev(1, "lo"));
    let mut extra = AttrBuffer::new();
    extra.append_attr_u32(40, 0xdead);
    data.extend_from_slice(extra.as_bytes());
    data
}

#[tokio::test]
async fn test_unknown_reply_attributes_preserved() {
    let (family, mut peer) = connect().await;

    let request = Attrs::new().with("ifindex", 1u32);
    let (reply, ()) = tokio::join!(family.do_op("dev-get", &request), async {
        let req = peer.expect_request().await;
        peer.send(
            Datagram::new()
                .reply(&req, CMD_DEV_GET, 0, &with_unknown_attr())
                .ack(&req),
        );
    });

    let msg = reply.unwrap().unwrap();
    assert_eq!(
        msg.get(&unknown_key(40)),
        Some(&Value::Binary(0xdeadu32.to_ne_bytes().to_vec()))
    );
    assert_eq!(msg.get("name"), Some(&Value::String("lo".into())));
}

#[tokio::test]
async fn test_unknown_reply_attributes_skipped() {
    let (family, mut peer) = connect_with(config().unknown_attrs(UnknownAttrPolicy::Skip)).await;

    let request = Attrs::new().with("ifindex", 1u32);
    let (reply, ()) = tokio::join!(family.do_op("dev-get", &request), async {
        let req = peer.expect_request().await;
        peer.send(
            Datagram::new()
                .reply(&req, CMD_DEV_GET, 0, &with_unknown_attr())
                .ack(&req),
        );
    });

    let msg = reply.unwrap().unwrap();
    assert_eq!(msg.attrs.len(), 3);
    assert!(msg.get(&unknown_key(40)).is_none());
}
