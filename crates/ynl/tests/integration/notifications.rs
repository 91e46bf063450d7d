//! Multicast subscription and notification delivery.

use std::time::Duration;

use tokio_stream::StreamExt;
use ynl::netlink::GenlMsgHdr;
use ynl::transport::Datagram;
use ynl::{Attrs, Error, Value};

use crate::common::{
    CMD_DEV_ADD_NTF, CMD_DEV_GET, FAMILY_ID, MGMT_GROUP, body, config, connect, connect_with, dev,
    genl_family,
};

fn ntf(ifindex: u32, name: &str) -> Datagram {
    Datagram::new().multicast(
        FAMILY_ID,
        CMD_DEV_ADD_NTF,
        1,
        &body(&genl_family(), "dev", &dev(ifindex, name)),
    )
}

fn ifindex(msg: &ynl::Message) -> u64 {
    msg.get("ifindex").and_then(Value::as_u64).unwrap()
}

#[tokio::test]
async fn test_subscribe() {
    let (family, peer) = connect().await;

    family.subscribe("mgmt").await.unwrap();
    assert_eq!(peer.groups(), [MGMT_GROUP]);

    family.unsubscribe("mgmt").await.unwrap();
    assert!(peer.groups().is_empty());

    let err = family.subscribe("monitor").await.unwrap_err();
    assert!(matches!(err, Error::UnknownGroup(ref g) if g == "monitor"));
}

#[tokio::test]
async fn test_check_ntf_does_not_block() {
    let (family, peer) = connect().await;
    assert!(family.check_ntf().await.unwrap().is_empty());

    peer.send(ntf(5, "veth0"));
    let ntfs = family.check_ntf().await.unwrap();
    assert_eq!(ntfs.len(), 1);
    assert_eq!(ntfs[0].op, "dev-add-ntf");
    assert_eq!(ntfs[0].seq, 0);
    assert_eq!(ntfs[0].get("name"), Some(&Value::String("veth0".into())));

    assert!(family.check_ntf().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_ntf_during_request() {
    let (family, mut peer) = connect().await;
    let spec = genl_family();

    let request = Attrs::new().with("ifindex", 1u32);
    let (reply, ()) = tokio::join!(family.do_op("dev-get", &request), async {
        let req = peer.expect_request().await;
        peer.send(ntf(7, "br0"));
        peer.send(
            Datagram::new()
                .reply(&req, CMD_DEV_GET, 0, &body(&spec, "dev", &dev(1, "lo")))
                .ack(&req),
        );
    });

    let msg = reply.unwrap().unwrap();
    assert_eq!(ifindex(&msg), 1);

    let ntfs = family.check_ntf().await.unwrap();
    assert_eq!(ntfs.len(), 1);
    assert_eq!(ifindex(&ntfs[0]), 7);
}

#[tokio::test]
async fn test_stray_reply_is_not_a_notification() {
    let (family, mut peer) = connect().await;
    let spec = genl_family();

    let request = Attrs::new().with("ifindex", 1u32);
    let (reply, ()) = tokio::join!(family.do_op("dev-get", &request), async {
        let req = peer.expect_request().await;
        let mut payload = GenlMsgHdr::new(CMD_DEV_GET, 1).as_bytes().to_vec();
        payload.extend_from_slice(&body(&spec, "dev", &dev(9, "old")));
        let stale = Datagram::new().message(
            FAMILY_ID,
            0,
            req.seq().wrapping_add(100),
            req.header.nlmsg_pid,
            &payload,
        );
        peer.send(stale);
        peer.send(
            Datagram::new()
                .reply(&req, CMD_DEV_GET, 0, &body(&spec, "dev", &dev(1, "lo")))
                .ack(&req),
        );
    });

    assert_eq!(ifindex(&reply.unwrap().unwrap()), 1);
    assert!(family.check_ntf().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_other_family_ignored() {
    let (family, peer) = connect().await;

    peer.send(Datagram::new().multicast(FAMILY_ID + 1, CMD_DEV_ADD_NTF, 1, &[]));
    peer.send(ntf(2, "dummy0"));

    let ntfs = family.check_ntf().await.unwrap();
    assert_eq!(ntfs.len(), 1);
    assert_eq!(ifindex(&ntfs[0]), 2);
}

#[tokio::test]
async fn test_poll_ntf() {
    let (family, peer) = connect().await;

    peer.send(ntf(1, "a"));
    // Two notifications in one datagram.
    peer.send_raw([ntf(2, "b").into_bytes(), ntf(3, "c").into_bytes()].concat());

    let ntfs = family.poll_ntf(Duration::from_millis(20)).await.unwrap();
    let ids: Vec<_> = ntfs.iter().map(ifindex).collect();
    assert_eq!(ids, [1, 2, 3]);
}

#[tokio::test]
async fn test_notification_stream() {
    let (family, peer) = connect().await;
    family.subscribe("mgmt").await.unwrap();

    peer.send(ntf(4, "tap0"));
    let mut ntfs = family.notifications();
    let msg = tokio::time::timeout(Duration::from_secs(1), ntfs.next())
        .await
        .expect("notification arrives")
        .unwrap()
        .unwrap();
    assert_eq!(msg.op, "dev-add-ntf");
    assert_eq!(ifindex(&msg), 4);
}

#[tokio::test]
async fn test_next_ntf_waits() {
    let (family, peer) = connect().await;

    let (msg, ()) = tokio::join!(family.next_ntf(), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        peer.send(ntf(6, "late"));
    });
    assert_eq!(ifindex(&msg.unwrap()), 6);
}

#[tokio::test]
async fn test_queue_drops_oldest() {
    let (family, peer) = connect_with(config().ntf_queue_depth(2)).await;

    for i in 1..=3 {
        peer.send(ntf(i, "x"));
    }
    let ntfs = family.check_ntf().await.unwrap();
    let ids: Vec<_> = ntfs.iter().map(ifindex).collect();
    assert_eq!(ids, [2, 3]);
    assert_eq!(family.ntf_dropped().await, 1);
}

#[tokio::test]
async fn test_notification_stream_ends_when_closed() {
    let (family, peer) = connect().await;

    peer.send(ntf(5, "tap1"));
    drop(peer);

    let items: Vec<_> = tokio::time::timeout(Duration::from_secs(1), family.notifications().collect())
        .await
        .expect("stream ends");
    assert_eq!(items.len(), 2);
    assert_eq!(ifindex(items[0].as_ref().unwrap()), 5);
    assert!(items[1].as_ref().unwrap_err().is_closed());
}
