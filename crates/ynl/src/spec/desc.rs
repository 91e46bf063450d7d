//! Unresolved family descriptions.
//!
//! These types mirror the YNL family description layout. They can be built
//! in code with the builder methods or, with the `serde` feature,
//! deserialized from JSON using the same kebab-case keys as the YAML specs.
//! Nothing here is validated; [`SpecFamily::resolve`](super::SpecFamily::resolve)
//! turns a [`FamilyDesc`] into the checked, flattened model.

use super::attr::{ByteOrder, DisplayHint};

/// Netlink protocol flavour of a family.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum ProtocolKind {
    /// Generic netlink; ids resolved through `nlctrl`.
    #[default]
    Genetlink,
    /// Generic netlink with fixed headers and legacy attribute types.
    GenetlinkLegacy,
    /// Generic netlink with C-style naming.
    GenetlinkC,
    /// A classic netlink protocol with static message types.
    NetlinkRaw,
}

impl ProtocolKind {
    /// Check if messages carry a `genlmsghdr`.
    pub fn is_genetlink(self) -> bool {
        !matches!(self, Self::NetlinkRaw)
    }
}

/// Root of a family description.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case", default))]
pub struct FamilyDesc {
    pub name: String,
    pub protocol: ProtocolKind,
    /// Netlink protocol number, required for `netlink-raw`.
    pub protonum: Option<u32>,
    /// Generic netlink version put in every request.
    pub version: Option<u8>,
    pub definitions: Vec<DefinitionDesc>,
    pub attribute_sets: Vec<AttrSetDesc>,
    pub sub_messages: Vec<SubMessageDesc>,
    pub operations: OperationsDesc,
    pub mcast_groups: McastGroupsDesc,
}

impl FamilyDesc {
    /// Start a generic netlink family description.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Set the protocol flavour.
    pub fn protocol(mut self, protocol: ProtocolKind) -> Self {
        self.protocol = protocol;
        self
    }

    /// Set the netlink protocol number.
    pub fn protonum(mut self, protonum: u32) -> Self {
        self.protonum = Some(protonum);
        self
    }

    /// Set the generic netlink version.
    pub fn version(mut self, version: u8) -> Self {
        self.version = Some(version);
        self
    }

    /// Set the default fixed header of all operations.
    pub fn fixed_header(mut self, name: impl Into<String>) -> Self {
        self.operations.fixed_header = Some(name.into());
        self
    }

    /// Add an enum, flags or struct definition.
    pub fn definition(mut self, def: DefinitionDesc) -> Self {
        self.definitions.push(def);
        self
    }

    /// Add an attribute set.
    pub fn attr_set(mut self, set: AttrSetDesc) -> Self {
        self.attribute_sets.push(set);
        self
    }

    /// Add a sub-message.
    pub fn sub_message(mut self, msg: SubMessageDesc) -> Self {
        self.sub_messages.push(msg);
        self
    }

    /// Add an operation.
    pub fn op(mut self, op: OperationDesc) -> Self {
        self.operations.list.push(op);
        self
    }

    /// Add a multicast group.
    pub fn mcast_group(mut self, name: impl Into<String>, value: Option<u32>) -> Self {
        self.mcast_groups.list.push(McastGroupDesc {
            name: name.into(),
            value,
        });
        self
    }

    /// Parse a description from JSON.
    #[cfg(feature = "serde")]
    pub fn from_json(text: &str) -> Result<Self, crate::error::SpecError> {
        serde_json::from_str(text).map_err(|e| crate::error::SpecError::Invalid(e.to_string()))
    }
}

/// Kind of a top-level definition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum DefinitionKind {
    /// Named constant, ignored at runtime.
    #[default]
    Const,
    /// Enumeration of distinct values.
    Enum,
    /// Enumeration of bit positions.
    Flags,
    /// Packed C struct.
    Struct,
}

/// A definition in the `definitions` section.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case", default))]
pub struct DefinitionDesc {
    pub name: String,
    #[cfg_attr(feature = "serde", serde(rename = "type"))]
    pub kind: DefinitionKind,
    /// First value of an enum (or first bit of a flags set).
    pub value_start: Option<u64>,
    pub entries: Vec<EnumEntryDesc>,
    pub members: Vec<StructMemberDesc>,
}

impl DefinitionDesc {
    /// Describe an enum.
    pub fn enumeration(name: impl Into<String>, entries: Vec<EnumEntryDesc>) -> Self {
        Self {
            name: name.into(),
            kind: DefinitionKind::Enum,
            entries,
            ..Default::default()
        }
    }

    /// Describe a flags set.
    pub fn flags(name: impl Into<String>, entries: Vec<EnumEntryDesc>) -> Self {
        Self {
            kind: DefinitionKind::Flags,
            ..Self::enumeration(name, entries)
        }
    }

    /// Describe a struct.
    pub fn structure(name: impl Into<String>, members: Vec<StructMemberDesc>) -> Self {
        Self {
            name: name.into(),
            kind: DefinitionKind::Struct,
            members,
            ..Default::default()
        }
    }

    /// Set the first value.
    pub fn value_start(mut self, start: u64) -> Self {
        self.value_start = Some(start);
        self
    }
}

/// One enum entry, either a bare name or a map with an explicit value.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum EnumEntryDesc {
    /// Value follows the previous entry.
    Name(String),
    /// Entry with an optional explicit value.
    Entry {
        name: String,
        #[cfg_attr(feature = "serde", serde(default))]
        value: Option<u64>,
        #[cfg_attr(feature = "serde", serde(default))]
        doc: Option<String>,
    },
}

impl EnumEntryDesc {
    /// Entry whose value follows the previous one.
    pub fn named(name: impl Into<String>) -> Self {
        Self::Name(name.into())
    }

    /// Entry with an explicit value.
    pub fn valued(name: impl Into<String>, value: u64) -> Self {
        Self::Entry {
            name: name.into(),
            value: Some(value),
            doc: None,
        }
    }

    /// Entry name.
    pub fn name(&self) -> &str {
        match self {
            Self::Name(name) | Self::Entry { name, .. } => name,
        }
    }

    /// Explicit value, if given.
    pub fn value(&self) -> Option<u64> {
        match self {
            Self::Name(_) => None,
            Self::Entry { value, .. } => *value,
        }
    }

    /// Documentation, if given.
    pub fn doc(&self) -> Option<&str> {
        match self {
            Self::Name(_) => None,
            Self::Entry { doc, .. } => doc.as_deref(),
        }
    }
}

/// A struct member.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case", default))]
pub struct StructMemberDesc {
    pub name: String,
    #[cfg_attr(feature = "serde", serde(rename = "type"))]
    pub ty: String,
    /// Length of `binary` and `pad` members.
    pub len: Option<usize>,
    pub byte_order: Option<ByteOrder>,
    #[cfg_attr(feature = "serde", serde(rename = "enum"))]
    pub enum_name: Option<String>,
    pub display_hint: Option<DisplayHint>,
}

impl StructMemberDesc {
    /// Describe a member.
    pub fn new(name: impl Into<String>, ty: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: ty.into(),
            ..Default::default()
        }
    }

    /// Set the length of a binary or pad member.
    pub fn len(mut self, len: usize) -> Self {
        self.len = Some(len);
        self
    }

    /// Set the byte order.
    pub fn byte_order(mut self, order: ByteOrder) -> Self {
        self.byte_order = Some(order);
        self
    }

    /// Name values through an enum.
    pub fn with_enum(mut self, name: impl Into<String>) -> Self {
        self.enum_name = Some(name.into());
        self
    }

    /// Set the display hint.
    pub fn display_hint(mut self, hint: DisplayHint) -> Self {
        self.display_hint = Some(hint);
        self
    }
}

/// An attribute set.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case", default))]
pub struct AttrSetDesc {
    pub name: String,
    /// Attributes are a selection of another set's attributes.
    pub subset_of: Option<String>,
    /// Attributes are added to (and may override) another set's.
    pub extends: Option<String>,
    pub attributes: Vec<AttrDesc>,
}

impl AttrSetDesc {
    /// Start an attribute set description.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Make this set a subset of `parent`.
    pub fn subset_of(mut self, parent: impl Into<String>) -> Self {
        self.subset_of = Some(parent.into());
        self
    }

    /// Inherit the attributes of `parent`.
    pub fn extends(mut self, parent: impl Into<String>) -> Self {
        self.extends = Some(parent.into());
        self
    }

    /// Add an attribute.
    pub fn attr(mut self, attr: AttrDesc) -> Self {
        self.attributes.push(attr);
        self
    }
}

/// An attribute.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case", default))]
pub struct AttrDesc {
    pub name: String,
    #[cfg_attr(feature = "serde", serde(rename = "type"))]
    pub ty: String,
    /// Explicit attribute id.
    pub value: Option<u16>,
    pub nested_attributes: Option<String>,
    /// Element type of an indexed array.
    pub sub_type: Option<String>,
    pub sub_message: Option<String>,
    /// Sibling attribute selecting the sub-message format.
    pub selector: Option<String>,
    #[cfg_attr(feature = "serde", serde(rename = "enum"))]
    pub enum_name: Option<String>,
    pub enum_as_flags: bool,
    pub byte_order: Option<ByteOrder>,
    pub display_hint: Option<DisplayHint>,
    pub multi_attr: bool,
    #[cfg_attr(feature = "serde", serde(rename = "struct"))]
    pub struct_name: Option<String>,
}

impl AttrDesc {
    /// Describe an attribute of the given type.
    pub fn new(name: impl Into<String>, ty: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: ty.into(),
            ..Default::default()
        }
    }

    /// Name-only entry of a subset.
    pub fn subset(name: impl Into<String>) -> Self {
        Self::new(name, "")
    }

    /// Set an explicit id.
    pub fn value(mut self, value: u16) -> Self {
        self.value = Some(value);
        self
    }

    /// Set the nested attribute set.
    pub fn nested(mut self, set: impl Into<String>) -> Self {
        self.nested_attributes = Some(set.into());
        self
    }

    /// Set the indexed array element type.
    pub fn sub_type(mut self, ty: impl Into<String>) -> Self {
        self.sub_type = Some(ty.into());
        self
    }

    /// Make this a sub-message selected by the sibling `selector`.
    pub fn sub_message(mut self, name: impl Into<String>, selector: impl Into<String>) -> Self {
        self.sub_message = Some(name.into());
        self.selector = Some(selector.into());
        self
    }

    /// Name values through an enum.
    pub fn with_enum(mut self, name: impl Into<String>) -> Self {
        self.enum_name = Some(name.into());
        self
    }

    /// Treat the enum as bit positions.
    pub fn as_flags(mut self) -> Self {
        self.enum_as_flags = true;
        self
    }

    /// Set the byte order.
    pub fn byte_order(mut self, order: ByteOrder) -> Self {
        self.byte_order = Some(order);
        self
    }

    /// Set the display hint.
    pub fn display_hint(mut self, hint: DisplayHint) -> Self {
        self.display_hint = Some(hint);
        self
    }

    /// Allow the attribute to repeat.
    pub fn multi(mut self) -> Self {
        self.multi_attr = true;
        self
    }

    /// Lay a binary payload out as a struct.
    pub fn with_struct(mut self, name: impl Into<String>) -> Self {
        self.struct_name = Some(name.into());
        self
    }
}

/// A sub-message definition.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case", default))]
pub struct SubMessageDesc {
    pub name: String,
    pub formats: Vec<SubMessageFormatDesc>,
}

impl SubMessageDesc {
    /// Start a sub-message description.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            formats: Vec::new(),
        }
    }

    /// Add a format.
    pub fn format(mut self, format: SubMessageFormatDesc) -> Self {
        self.formats.push(format);
        self
    }
}

/// One format of a sub-message.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case", default))]
pub struct SubMessageFormatDesc {
    /// Selector value choosing this format.
    pub value: String,
    pub attribute_set: Option<String>,
    pub fixed_header: Option<String>,
}

impl SubMessageFormatDesc {
    /// Format decoded with an attribute set.
    pub fn attrs(value: impl Into<String>, set: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            attribute_set: Some(set.into()),
            fixed_header: None,
        }
    }

    /// Format that is only a struct.
    pub fn header(value: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            attribute_set: None,
            fixed_header: Some(name.into()),
        }
    }

    /// Format with no payload.
    pub fn empty(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            ..Default::default()
        }
    }

    /// Add a fixed header in front of the attributes.
    pub fn with_header(mut self, name: impl Into<String>) -> Self {
        self.fixed_header = Some(name.into());
        self
    }
}

/// The `operations` section.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case", default))]
pub struct OperationsDesc {
    /// Fixed header shared by all operations.
    pub fixed_header: Option<String>,
    pub list: Vec<OperationDesc>,
}

/// One operation.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case", default))]
pub struct OperationDesc {
    pub name: String,
    /// Command id (genetlink) or request message type (raw).
    pub value: Option<u32>,
    pub attribute_set: Option<String>,
    pub fixed_header: Option<String>,
    #[cfg_attr(feature = "serde", serde(rename = "do"))]
    pub do_: Option<OpModeDesc>,
    pub dump: Option<OpModeDesc>,
    /// Operation whose reply layout this notification shares.
    pub notify: Option<String>,
    /// Event layout of a notification-only operation.
    pub event: Option<OpMsgDesc>,
    pub mcgrp: Option<String>,
}

impl OperationDesc {
    /// Start an operation description.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Set the command id.
    pub fn value(mut self, value: u32) -> Self {
        self.value = Some(value);
        self
    }

    /// Set the governing attribute set.
    pub fn attribute_set(mut self, set: impl Into<String>) -> Self {
        self.attribute_set = Some(set.into());
        self
    }

    /// Set a fixed header overriding the family default.
    pub fn fixed_header(mut self, name: impl Into<String>) -> Self {
        self.fixed_header = Some(name.into());
        self
    }

    /// Describe the `do` mode.
    pub fn do_mode(mut self, request: OpMsgDesc, reply: Option<OpMsgDesc>) -> Self {
        self.do_ = Some(OpModeDesc {
            request: Some(request),
            reply,
        });
        self
    }

    /// Describe the `dump` mode.
    pub fn dump_mode(mut self, request: OpMsgDesc, reply: Option<OpMsgDesc>) -> Self {
        self.dump = Some(OpModeDesc {
            request: Some(request),
            reply,
        });
        self
    }

    /// Mark as a notification sharing `op`'s reply layout.
    pub fn notify(mut self, op: impl Into<String>) -> Self {
        self.notify = Some(op.into());
        self
    }

    /// Mark as an event with the given attributes.
    pub fn event(mut self, msg: OpMsgDesc) -> Self {
        self.event = Some(msg);
        self
    }

    /// Set the multicast group notifications are sent to.
    pub fn mcgrp(mut self, group: impl Into<String>) -> Self {
        self.mcgrp = Some(group.into());
        self
    }
}

/// Request and reply of one mode.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case", default))]
pub struct OpModeDesc {
    pub request: Option<OpMsgDesc>,
    pub reply: Option<OpMsgDesc>,
}

/// Attribute list of one message direction.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case", default))]
pub struct OpMsgDesc {
    /// Message type override for raw families.
    pub value: Option<u32>,
    pub attributes: Vec<String>,
    /// Attributes that must be supplied by the caller.
    pub required: Vec<String>,
}

impl OpMsgDesc {
    /// Message carrying the given attributes.
    pub fn attrs<I, S>(attrs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            attributes: attrs.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Mark attributes as required.
    pub fn required<I, S>(mut self, attrs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required = attrs.into_iter().map(Into::into).collect();
        self
    }

    /// Override the message type.
    pub fn value(mut self, value: u32) -> Self {
        self.value = Some(value);
        self
    }
}

/// The `mcast-groups` section.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case", default))]
pub struct McastGroupsDesc {
    pub list: Vec<McastGroupDesc>,
}

/// One multicast group.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case", default))]
pub struct McastGroupDesc {
    pub name: String,
    /// Static group id (raw families).
    pub value: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_accessors() {
        let e = EnumEntryDesc::named("up");
        assert_eq!(e.name(), "up");
        assert_eq!(e.value(), None);
        let e = EnumEntryDesc::valued("down", 7);
        assert_eq!(e.value(), Some(7));
        assert_eq!(e.doc(), None);
    }

    #[test]
    fn test_builder() {
        let desc = FamilyDesc::new("demo")
            .version(2)
            .attr_set(AttrSetDesc::new("main").attr(AttrDesc::new("id", "u32").value(3)))
            .op(OperationDesc::new("get")
                .attribute_set("main")
                .do_mode(OpMsgDesc::attrs(["id"]).required(["id"]), None));
        assert_eq!(desc.version, Some(2));
        assert_eq!(desc.attribute_sets[0].attributes[0].value, Some(3));
        let op = &desc.operations.list[0];
        assert_eq!(op.do_.as_ref().unwrap().request.as_ref().unwrap().required, ["id"]);
        assert!(desc.protocol.is_genetlink());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_from_json() {
        let desc = FamilyDesc::from_json(
            r#"{
                "name": "demo",
                "protocol": "netlink-raw",
                "protonum": 0,
                "definitions": [
                    {"name": "state", "type": "enum", "entries": ["a", {"name": "b", "value": 5}]}
                ],
                "attribute-sets": [
                    {"name": "main", "attributes": [
                        {"name": "state", "type": "u8", "enum": "state"},
                        {"name": "addr", "type": "binary", "display-hint": "ipv4"}
                    ]}
                ],
                "operations": {"list": [
                    {"name": "get", "value": 18, "attribute-set": "main",
                     "do": {"request": {"attributes": ["state"]}}}
                ]}
            }"#,
        )
        .unwrap();
        assert_eq!(desc.protocol, ProtocolKind::NetlinkRaw);
        assert_eq!(desc.definitions[0].kind, DefinitionKind::Enum);
        assert_eq!(desc.definitions[0].entries[1].value(), Some(5));
        let attr = &desc.attribute_sets[0].attributes[0];
        assert_eq!(attr.enum_name.as_deref(), Some("state"));
        assert_eq!(
            desc.attribute_sets[0].attributes[1].display_hint,
            Some(DisplayHint::Ipv4)
        );
        assert!(desc.operations.list[0].do_.is_some());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_from_json_invalid() {
        assert!(FamilyDesc::from_json("{\"name\": 3}").is_err());
    }
}
