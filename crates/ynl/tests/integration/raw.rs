//! Classic netlink families: static message types and fixed headers.

use ynl::codec::{Decoder, Encoder};
use ynl::netlink::message::{NLM_F_DUMP, NLM_F_MULTI, NLM_F_REQUEST};
use ynl::transport::{Datagram, MemoryPeer};
use ynl::{Attrs, MemoryTransport, Value, YnlFamily};

use crate::common::{config, dev, raw_family};

const RTM_NEWDEV: u16 = 16;
const RTM_GETDEV: u16 = 18;

async fn connect_raw() -> (YnlFamily<MemoryTransport>, MemoryPeer) {
    let (transport, peer) = MemoryTransport::pair();
    let family = YnlFamily::with_transport(raw_family(), transport, config())
        .await
        .unwrap();
    (family, peer)
}

/// Fixed header followed by attributes.
fn dev_message(index: i32, name: &str) -> Vec<u8> {
    let spec = raw_family();
    let encoder = Encoder::new(&spec);
    let mut data = encoder
        .encode_struct("dev-hdr", &Attrs::new().with("index", index))
        .unwrap();
    data.extend_from_slice(&encoder.encode_attrs("dev", &dev(index as u32, name)).unwrap());
    data
}

#[tokio::test]
async fn test_raw_family_needs_no_resolution() {
    let (family, _peer) = connect_raw().await;
    assert_eq!(family.family_id(), 0);
    assert_eq!(family.mcast_group_id("dev"), Some(1));
}

#[tokio::test]
async fn test_raw_do() {
    let (family, mut peer) = connect_raw().await;
    let spec = raw_family();

    let request = Attrs::new().with("index", 5i32).with("name", "eth0");
    let (reply, ()) = tokio::join!(family.do_op("getdev", &request), async {
        let req = peer.expect_request().await;
        assert_eq!(req.header.nlmsg_type, RTM_GETDEV);

        let decoder = Decoder::new(&spec);
        let (hdr, size) = decoder.decode_struct("dev-hdr", &req.payload).unwrap();
        assert_eq!(size, 8);
        assert_eq!(hdr.get("index"), Some(&Value::Sint(5)));
        assert_eq!(hdr.get("family"), Some(&Value::Uint(0)));
        let attrs = decoder.decode_attrs("dev", &req.payload[8..]).unwrap();
        assert_eq!(attrs.get("name"), Some(&Value::String("eth0".into())));
        assert!(attrs.get("index").is_none());

        peer.send(
            Datagram::new()
                .raw_reply(&req, RTM_NEWDEV, 0, &dev_message(5, "eth0"))
                .ack(&req),
        );
    });

    let msg = reply.unwrap().unwrap();
    assert_eq!(msg.op, "getdev");
    assert_eq!(msg.msg_type, RTM_NEWDEV);
    assert_eq!(msg.cmd, None);
    assert_eq!(msg.get("index"), Some(&Value::Sint(5)));
    assert_eq!(msg.get("name"), Some(&Value::String("eth0".into())));
    assert_eq!(
        msg.fixed_header.as_ref().and_then(|h| h.get("index")),
        Some(&Value::Sint(5))
    );
}

#[tokio::test]
async fn test_raw_dump() {
    let (family, mut peer) = connect_raw().await;

    let empty = Attrs::new();
    let (replies, ()) = tokio::join!(family.dump("getdev", &empty), async {
        let req = peer.expect_request().await;
        assert_eq!(req.header.nlmsg_type, RTM_GETDEV);
        assert_eq!(req.header.nlmsg_flags, NLM_F_REQUEST | NLM_F_DUMP);
        peer.send(
            Datagram::new()
                .raw_reply(&req, RTM_NEWDEV, NLM_F_MULTI, &dev_message(1, "lo"))
                .raw_reply(&req, RTM_NEWDEV, NLM_F_MULTI, &dev_message(2, "eth0"))
                .done(&req, 0),
        );
    });

    let replies = replies.unwrap();
    assert_eq!(replies.len(), 2);
    assert!(replies.iter().all(|m| m.op == "getdev"));
    assert_eq!(replies[1].get("index"), Some(&Value::Sint(2)));
}

#[tokio::test]
async fn test_raw_notification() {
    let (family, peer) = connect_raw().await;

    family.subscribe("dev").await.unwrap();
    assert_eq!(peer.groups(), [1]);

    peer.send(Datagram::new().message(RTM_NEWDEV, 0, 0, 0, &dev_message(3, "veth0")));
    let ntfs = family.check_ntf().await.unwrap();
    assert_eq!(ntfs.len(), 1);
    assert_eq!(ntfs[0].op, "newdev-ntf");
    assert_eq!(ntfs[0].get("name"), Some(&Value::String("veth0".into())));
    assert_eq!(ntfs[0].get("index"), Some(&Value::Sint(3)));
}
