//! Client configuration and request flags.

use std::ops::BitOr;
use std::sync::Arc;
use std::time::Duration;

use super::resolve::FamilyCache;
use crate::codec::decode::{DecodeOptions, UnknownAttrPolicy};
use crate::netlink::message::{NLM_F_APPEND, NLM_F_CREATE, NLM_F_ECHO, NLM_F_EXCL, NLM_F_REPLACE};
use crate::netlink::socket::DEFAULT_RECV_BUF;

/// Default number of notifications kept while nobody reads them.
pub const DEFAULT_NTF_QUEUE_DEPTH: usize = 1024;

/// Settings for a [`YnlFamily`](super::YnlFamily).
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use ynl::client::ClientConfig;
///
/// let config = ClientConfig::new()
///     .timeout(Duration::from_secs(2))
///     .ntf_queue_depth(64);
/// assert_eq!(config.get_timeout(), Some(Duration::from_secs(2)));
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub(crate) timeout: Option<Duration>,
    pub(crate) ntf_queue_depth: usize,
    pub(crate) decode: DecodeOptions,
    pub(crate) recv_buf: usize,
    pub(crate) cache: Arc<FamilyCache>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: None,
            ntf_queue_depth: DEFAULT_NTF_QUEUE_DEPTH,
            decode: DecodeOptions::default(),
            recv_buf: DEFAULT_RECV_BUF,
            cache: FamilyCache::shared(),
        }
    }
}

impl ClientConfig {
    /// Default configuration: no timeout, process-wide family cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail a request with [`TransportError::Timeout`](crate::error::TransportError::Timeout)
    /// when its replies do not complete in time.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Wait for replies indefinitely.
    pub fn no_timeout(mut self) -> Self {
        self.timeout = None;
        self
    }

    /// Number of notifications queued before the oldest is dropped.
    pub fn ntf_queue_depth(mut self, depth: usize) -> Self {
        self.ntf_queue_depth = depth.max(1);
        self
    }

    /// Decoder settings for replies and notifications.
    pub fn decode_options(mut self, opts: DecodeOptions) -> Self {
        self.decode = opts;
        self
    }

    /// Handling of attribute ids missing from the description.
    pub fn unknown_attrs(mut self, policy: UnknownAttrPolicy) -> Self {
        self.decode.unknown_attrs = policy;
        self
    }

    /// Fail decoding on flag bits the description does not name.
    pub fn strict_flags(mut self, strict: bool) -> Self {
        self.decode.strict_flags = strict;
        self
    }

    /// Receive buffer size for kernel sockets.
    pub fn recv_buf(mut self, size: usize) -> Self {
        self.recv_buf = size;
        self
    }

    /// Use a private family id cache instead of the process-wide one.
    pub fn family_cache(mut self, cache: Arc<FamilyCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Configured timeout.
    pub fn get_timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Configured notification queue depth.
    pub fn get_ntf_queue_depth(&self) -> usize {
        self.ntf_queue_depth
    }
}

/// Extra `nlmsg_flags` for a `do` request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct RequestFlags(u16);

impl RequestFlags {
    /// No extra flags.
    pub const NONE: Self = Self(0);
    /// Create the object if it does not exist.
    pub const CREATE: Self = Self(NLM_F_CREATE);
    /// Fail if the object already exists.
    pub const EXCL: Self = Self(NLM_F_EXCL);
    /// Replace an existing object.
    pub const REPLACE: Self = Self(NLM_F_REPLACE);
    /// Append to the end of a list.
    pub const APPEND: Self = Self(NLM_F_APPEND);
    /// Echo the request back.
    pub const ECHO: Self = Self(NLM_F_ECHO);

    /// Raw flag bits.
    pub fn bits(self) -> u16 {
        self.0
    }

    /// Check if every bit of `other` is set.
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for RequestFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}
