//! Generic netlink family resolution through `nlctrl`.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use super::exchange::{Exchange, Step};
use crate::error::{DecodeError, Error, Result};
use crate::netlink::genl::{FamilyInfo, get_family_request, parse_family};
use crate::netlink::message::MessageIter;
use crate::transport::Transport;

/// Cache of resolved family ids and multicast groups, keyed by name.
///
/// Ids are assigned when a family registers and stay valid until its
/// module is unloaded, so a process-wide cache is shared by default.
#[derive(Debug, Default)]
pub struct FamilyCache {
    families: RwLock<HashMap<String, FamilyInfo>>,
}

impl FamilyCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide cache.
    pub fn shared() -> Arc<FamilyCache> {
        static SHARED: OnceLock<Arc<FamilyCache>> = OnceLock::new();
        SHARED.get_or_init(|| Arc::new(FamilyCache::new())).clone()
    }

    /// Cached information for `name`.
    pub fn get(&self, name: &str) -> Option<FamilyInfo> {
        self.families
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Remember information for `name`.
    pub fn insert(&self, name: impl Into<String>, info: FamilyInfo) {
        self.families
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), info);
    }

    /// Forget everything, e.g. after a module reload.
    pub fn clear(&self) {
        self.families
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// Ask the control family for `name`, consulting `cache` first.
pub(crate) async fn resolve_family<T: Transport>(
    transport: &T,
    cache: &FamilyCache,
    name: &str,
    seq: u32,
) -> Result<FamilyInfo> {
    if let Some(info) = cache.get(name) {
        return Ok(info);
    }

    let port_id = transport.port_id();
    let mut builder = get_family_request(name);
    builder.set_seq(seq);
    builder.set_pid(port_id);
    transport.send(&builder.finish()).await?;

    let mut exchange = Exchange::new("getfamily", seq, port_id, false);
    exchange.sent();
    loop {
        let datagram = transport.recv().await?;
        for msg in MessageIter::new(&datagram) {
            let (hdr, payload, _) = msg?;
            if !exchange.matches(&hdr) {
                tracing::debug!(seq = hdr.nlmsg_seq, "unrelated message during family lookup");
                continue;
            }
            match exchange.feed(&hdr, payload) {
                Step::Continue => {}
                Step::Complete => return finish(exchange, cache, name),
                Step::Failed(err) => return Err(err),
            }
        }
    }
}

fn finish(exchange: Exchange, cache: &FamilyCache, name: &str) -> Result<FamilyInfo> {
    let reply = exchange
        .into_replies()
        .into_iter()
        .next()
        .ok_or_else(|| DecodeError::Payload {
            attr: "family".into(),
            expected: 1,
            actual: 0,
        })?;
    let info = parse_family(&reply.payload).map_err(Error::from)?;
    tracing::debug!(family = name, id = info.id, groups = info.mcast_groups.len(), "resolved family");
    cache.insert(name, info.clone());
    Ok(info)
}
