//! Spec-driven netlink codec and family client.
//!
//! Netlink families are described in YNL form: attribute sets, enums,
//! structs, sub-messages and operations. This crate resolves such a
//! description into a [`SpecFamily`] and uses it to encode requests and
//! decode replies and notifications without any family-specific code.
//!
//! # Features
//!
//! - `serde` - Load family descriptions from JSON, convert [`Value`]s
//!   to and from `serde_json::Value`
//! - `full` - All features enabled
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use ynl::{Attrs, SpecFamily, YnlFamily};
//!
//! #[tokio::main]
//! async fn main() -> ynl::Result<()> {
//!     let spec = Arc::new(SpecFamily::from_json(include_str!("netdev.json"))?);
//!     let netdev = YnlFamily::new(spec).await?;
//!
//!     let dev = netdev
//!         .do_op("dev-get", &Attrs::new().with("ifindex", 1u32))
//!         .await?;
//!     println!("{:?}", dev.map(|m| m.attrs));
//!     Ok(())
//! }
//! ```
//!
//! # Notifications
//!
//! ```ignore
//! use tokio_stream::StreamExt;
//!
//! netdev.subscribe("mgmt").await?;
//! let mut ntfs = netdev.notifications();
//! while let Some(msg) = ntfs.next().await {
//!     let msg = msg?;
//!     println!("{}: {}", msg.op, msg.attrs);
//! }
//! ```
//!
//! # Testing without a kernel
//!
//! [`MemoryTransport`] pairs a client with a scripted [`MemoryPeer`] that
//! plays the kernel side, so whole request/reply exchanges can be tested
//! unprivileged.

pub mod client;
pub mod codec;
pub mod error;
pub mod netlink;
pub mod spec;
pub mod transport;

pub use client::{ClientConfig, FamilyCache, Notifications, RequestFlags, YnlFamily};
pub use codec::{Attrs, DecodeOptions, Message, UnknownAttrPolicy, Value};
pub use error::{DecodeError, EncodeError, Error, NlError, Result, SpecError, TransportError};
pub use netlink::Netlink;
pub use netlink::extack::ExtAck;
pub use spec::{
    FamilyDesc, SpecAttr, SpecAttrSet, SpecEnumEntry, SpecEnumSet, SpecFamily, SpecOperation,
    SpecSubMessage, SpecSubMessageFormat,
};
pub use transport::{MemoryPeer, MemoryTransport, Transport};
