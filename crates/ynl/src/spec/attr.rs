//! Attribute definitions and attribute sets.

use std::collections::HashMap;

use super::desc::AttrDesc;
use crate::error::SpecError;

/// Byte order of a multi-byte scalar.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum ByteOrder {
    /// Host byte order (the netlink default).
    #[default]
    Host,
    /// Network byte order.
    BigEndian,
    /// Little endian regardless of host.
    LittleEndian,
}

/// Presentation hint for binary and integer payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum DisplayHint {
    /// Colon separated hex octets.
    Mac,
    /// IPv4 address.
    Ipv4,
    /// IPv6 address.
    Ipv6,
    /// IPv4 or IPv6 address depending on payload length.
    Ipv4OrV6,
    /// Plain lowercase hex string.
    Hex,
    /// RFC 4122 formatted UUID.
    Uuid,
}

/// Integer wire types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntKind {
    U8,
    U16,
    U32,
    U64,
    S8,
    S16,
    S32,
    S64,
    /// Unsigned, 4 or 8 bytes on the wire.
    Uint,
    /// Signed, 4 or 8 bytes on the wire.
    Sint,
}

impl IntKind {
    /// Parse a type name such as `u32` or `sint`.
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "u8" => Self::U8,
            "u16" => Self::U16,
            "u32" => Self::U32,
            "u64" => Self::U64,
            "s8" => Self::S8,
            "s16" => Self::S16,
            "s32" => Self::S32,
            "s64" => Self::S64,
            "uint" => Self::Uint,
            "sint" => Self::Sint,
            _ => return None,
        })
    }

    /// Fixed wire width, or `None` for the variable width kinds.
    pub fn width(self) -> Option<usize> {
        match self {
            Self::U8 | Self::S8 => Some(1),
            Self::U16 | Self::S16 => Some(2),
            Self::U32 | Self::S32 => Some(4),
            Self::U64 | Self::S64 => Some(8),
            Self::Uint | Self::Sint => None,
        }
    }

    /// Check if the kind is signed.
    pub fn is_signed(self) -> bool {
        matches!(
            self,
            Self::S8 | Self::S16 | Self::S32 | Self::S64 | Self::Sint
        )
    }

    /// Type name as used in family descriptions.
    pub fn name(self) -> &'static str {
        match self {
            Self::U8 => "u8",
            Self::U16 => "u16",
            Self::U32 => "u32",
            Self::U64 => "u64",
            Self::S8 => "s8",
            Self::S16 => "s16",
            Self::S32 => "s32",
            Self::S64 => "s64",
            Self::Uint => "uint",
            Self::Sint => "sint",
        }
    }
}

/// Element type of an indexed array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArrayItem {
    /// Each element is a nest of the named attribute set.
    Nest(String),
    /// Each element is an integer.
    Int(IntKind),
    /// Each element is raw bytes.
    Binary,
    /// Each element is a string.
    String,
}

/// Wire type of an attribute.
///
/// Encoding and decoding match exhaustively on this type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrType {
    /// Placeholder id, never on the wire.
    Unused,
    /// Alignment padding, skipped on decode.
    Pad,
    /// Presence-only attribute.
    Flag,
    /// Integer scalar.
    Int(IntKind),
    /// NUL-terminated string.
    String,
    /// Raw bytes, optionally laid out as a struct.
    Binary {
        /// Struct describing the payload.
        struct_name: Option<String>,
    },
    /// Nested attribute set.
    Nest {
        /// The nested set.
        set: String,
    },
    /// Sequence of TLVs whose type is the element index.
    IndexedArray(ArrayItem),
    /// Nest keyed by attribute type, each holding a nest of `set`.
    NestTypeValue {
        /// Set describing each value.
        set: String,
    },
    /// `struct nla_bitfield32` (value + selector).
    Bitfield32,
    /// Polymorphic nest selected by a sibling attribute.
    SubMessage {
        /// The sub-message definition.
        name: String,
        /// Name of the selector attribute.
        selector: String,
    },
}

impl AttrType {
    /// Resolve the type of an attribute description.
    pub fn from_desc(desc: &AttrDesc) -> Result<Self, SpecError> {
        let missing = |what: &str| {
            SpecError::Invalid(format!("attribute '{}' needs '{}'", desc.name, what))
        };

        if let Some(kind) = IntKind::parse(&desc.ty) {
            return Ok(Self::Int(kind));
        }

        Ok(match desc.ty.as_str() {
            "unused" => Self::Unused,
            "pad" => Self::Pad,
            "flag" => Self::Flag,
            "string" => Self::String,
            "binary" => Self::Binary {
                struct_name: desc.struct_name.clone(),
            },
            "nest" => Self::Nest {
                set: desc
                    .nested_attributes
                    .clone()
                    .ok_or_else(|| missing("nested-attributes"))?,
            },
            "nest-type-value" => Self::NestTypeValue {
                set: desc
                    .nested_attributes
                    .clone()
                    .ok_or_else(|| missing("nested-attributes"))?,
            },
            "indexed-array" => {
                let sub_type = desc.sub_type.as_deref().ok_or_else(|| missing("sub-type"))?;
                let item = match sub_type {
                    "nest" => ArrayItem::Nest(
                        desc.nested_attributes
                            .clone()
                            .ok_or_else(|| missing("nested-attributes"))?,
                    ),
                    "binary" => ArrayItem::Binary,
                    "string" => ArrayItem::String,
                    other => ArrayItem::Int(IntKind::parse(other).ok_or_else(|| {
                        SpecError::UnknownType {
                            attr: desc.name.clone(),
                            ty: other.to_string(),
                        }
                    })?),
                };
                Self::IndexedArray(item)
            }
            "bitfield32" => Self::Bitfield32,
            "sub-message" => Self::SubMessage {
                name: desc.sub_message.clone().ok_or_else(|| missing("sub-message"))?,
                selector: desc.selector.clone().ok_or_else(|| missing("selector"))?,
            },
            other => {
                return Err(SpecError::UnknownType {
                    attr: desc.name.clone(),
                    ty: other.to_string(),
                });
            }
        })
    }

    /// Short name used in error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Unused => "unused",
            Self::Pad => "pad",
            Self::Flag => "flag",
            Self::Int(kind) => kind.name(),
            Self::String => "string",
            Self::Binary { .. } => "binary",
            Self::Nest { .. } => "nest",
            Self::IndexedArray(_) => "indexed-array",
            Self::NestTypeValue { .. } => "nest-type-value",
            Self::Bitfield32 => "bitfield32",
            Self::SubMessage { .. } => "sub-message",
        }
    }

    /// Attribute set this type recurses into, if any.
    pub fn nested_set(&self) -> Option<&str> {
        match self {
            Self::Nest { set } | Self::NestTypeValue { set } => Some(set),
            Self::IndexedArray(ArrayItem::Nest(set)) => Some(set),
            _ => None,
        }
    }
}

/// A single attribute definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecAttr {
    /// Attribute name.
    pub name: String,
    /// Attribute type id on the wire.
    pub value: u16,
    /// Wire type.
    pub ty: AttrType,
    /// Byte order of scalar payloads.
    pub byte_order: ByteOrder,
    /// Enum used to name integer values.
    pub enum_name: Option<String>,
    /// Treat the enum as a set of bit positions.
    pub enum_as_flags: bool,
    /// Presentation hint.
    pub display_hint: Option<DisplayHint>,
    /// Attribute may repeat; occurrences are collected into a list.
    pub multi_attr: bool,
}

impl SpecAttr {
    /// Resolve a description with the given id.
    pub fn from_desc(desc: &AttrDesc, value: u16) -> Result<Self, SpecError> {
        Ok(Self {
            name: desc.name.clone(),
            value,
            ty: AttrType::from_desc(desc)?,
            byte_order: desc.byte_order.unwrap_or_default(),
            enum_name: desc.enum_name.clone(),
            enum_as_flags: desc.enum_as_flags,
            display_hint: desc.display_hint,
            multi_attr: desc.multi_attr,
        })
    }
}

/// A named collection of attributes, flattened at load time.
#[derive(Debug, Clone, Default)]
pub struct SpecAttrSet {
    name: String,
    subset_of: Option<String>,
    attrs: Vec<SpecAttr>,
    by_id: HashMap<u16, usize>,
    by_name: HashMap<String, usize>,
}

impl SpecAttrSet {
    /// Create an empty set.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Set name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the set this one is a subset of.
    pub fn subset_of(&self) -> Option<&str> {
        self.subset_of.as_deref()
    }

    pub(crate) fn set_subset_of(&mut self, parent: impl Into<String>) {
        self.subset_of = Some(parent.into());
    }

    /// Look up an attribute by name.
    pub fn get(&self, name: &str) -> Option<&SpecAttr> {
        self.by_name.get(name).map(|&idx| &self.attrs[idx])
    }

    /// Look up an attribute by type id (flags already masked).
    pub fn by_id(&self, id: u16) -> Option<&SpecAttr> {
        self.by_id.get(&id).map(|&idx| &self.attrs[idx])
    }

    /// Attributes in declaration order.
    pub fn attrs(&self) -> impl Iterator<Item = &SpecAttr> {
        self.attrs.iter()
    }

    /// Number of attributes.
    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    /// Check if the set has no attributes.
    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }

    /// Add an attribute declared directly in this set.
    ///
    /// Any id or name collision is an error.
    pub fn insert(&mut self, attr: SpecAttr) -> Result<(), SpecError> {
        if let Some(&idx) = self.by_id.get(&attr.value) {
            return Err(SpecError::AttrIdConflict {
                set: self.name.clone(),
                id: attr.value,
                existing: self.attrs[idx].name.clone(),
                new: attr.name,
            });
        }
        if self.by_name.contains_key(&attr.name) {
            return Err(SpecError::Invalid(format!(
                "attribute set '{}' declares '{}' twice",
                self.name, attr.name
            )));
        }
        self.push(attr);
        Ok(())
    }

    /// Merge an attribute over an inherited definition.
    ///
    /// On an id collision the new attribute replaces the inherited one when
    /// both have the same wire type; differing types are an error.
    pub fn override_with(&mut self, attr: SpecAttr) -> Result<(), SpecError> {
        match self.by_id.get(&attr.value).copied() {
            Some(idx) if self.attrs[idx].ty != attr.ty => Err(SpecError::AttrIdConflict {
                set: self.name.clone(),
                id: attr.value,
                existing: self.attrs[idx].name.clone(),
                new: attr.name,
            }),
            Some(idx) => {
                self.by_name.remove(&self.attrs[idx].name);
                if let Some(&other) = self.by_name.get(&attr.name) {
                    if other != idx {
                        return Err(SpecError::Invalid(format!(
                            "attribute set '{}' declares '{}' twice",
                            self.name, attr.name
                        )));
                    }
                }
                self.by_name.insert(attr.name.clone(), idx);
                self.attrs[idx] = attr;
                Ok(())
            }
            None => self.insert(attr),
        }
    }

    fn push(&mut self, attr: SpecAttr) {
        let idx = self.attrs.len();
        self.by_id.insert(attr.value, idx);
        self.by_name.insert(attr.name.clone(), idx);
        self.attrs.push(attr);
    }
}
