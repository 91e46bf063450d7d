//! Family description model.
//!
//! A family is described by [`FamilyDesc`] (unresolved, mirrors the YNL
//! layout) and resolved once into a [`SpecFamily`]. Resolution assigns
//! default ids, flattens `extends` inheritance, copies `subset-of` types and
//! checks every reference, so the codec never has to deal with a dangling
//! name.
//!
//! # Example
//!
//! ```
//! use ynl::spec::{AttrDesc, AttrSetDesc, FamilyDesc, OpMsgDesc, OperationDesc};
//! use ynl::SpecFamily;
//!
//! let desc = FamilyDesc::new("netdev")
//!     .attr_set(AttrSetDesc::new("dev").attr(AttrDesc::new("ifindex", "u32")))
//!     .op(OperationDesc::new("dev-get")
//!         .attribute_set("dev")
//!         .do_mode(OpMsgDesc::attrs(["ifindex"]), Some(OpMsgDesc::attrs(["ifindex"]))));
//! let family = SpecFamily::resolve(&desc).unwrap();
//! assert_eq!(family.attr_set("dev").unwrap().get("ifindex").unwrap().value, 1);
//! ```

pub mod attr;
pub mod desc;
pub mod enums;
pub mod family;
pub mod structs;
pub mod submsg;

pub use attr::{ArrayItem, AttrType, ByteOrder, DisplayHint, IntKind, SpecAttr, SpecAttrSet};
pub use desc::{
    AttrDesc, AttrSetDesc, DefinitionDesc, DefinitionKind, EnumEntryDesc, FamilyDesc,
    McastGroupDesc, OpModeDesc, OpMsgDesc, OperationDesc, OperationsDesc, ProtocolKind,
    StructMemberDesc, SubMessageDesc, SubMessageFormatDesc,
};
pub use enums::{SpecEnumEntry, SpecEnumSet};
pub use family::{OpMode, SpecFamily, SpecMcastGroup, SpecOpMessage, SpecOperation};
pub use structs::{MemberType, SpecStruct, SpecStructMember};
pub use submsg::{SpecSubMessage, SpecSubMessageFormat};
