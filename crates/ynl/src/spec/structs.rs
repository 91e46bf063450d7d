//! Packed struct definitions used for fixed headers and binary attributes.

use super::attr::{ByteOrder, DisplayHint, IntKind};
use super::desc::{DefinitionDesc, StructMemberDesc};
use crate::error::SpecError;

/// Wire type of a struct member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberType {
    /// Fixed width integer.
    Int(IntKind),
    /// Opaque bytes of the given length.
    Binary(usize),
    /// Padding of the given length, skipped on decode.
    Pad(usize),
}

impl MemberType {
    /// Size on the wire.
    pub fn size(self) -> usize {
        match self {
            // Variable width kinds are rejected at resolve time.
            Self::Int(kind) => kind.width().unwrap_or(0),
            Self::Binary(len) | Self::Pad(len) => len,
        }
    }
}

/// One member of a struct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecStructMember {
    pub name: String,
    pub ty: MemberType,
    pub byte_order: ByteOrder,
    pub enum_name: Option<String>,
    pub display_hint: Option<DisplayHint>,
}

impl SpecStructMember {
    fn from_desc(desc: &StructMemberDesc) -> Result<Self, SpecError> {
        let len = || {
            desc.len.ok_or_else(|| {
                SpecError::Invalid(format!("struct member '{}' needs 'len'", desc.name))
            })
        };

        let ty = match desc.ty.as_str() {
            "binary" => MemberType::Binary(len()?),
            "pad" => MemberType::Pad(len()?),
            other => match IntKind::parse(other) {
                Some(kind) if kind.width().is_some() => MemberType::Int(kind),
                _ => {
                    return Err(SpecError::UnknownType {
                        attr: desc.name.clone(),
                        ty: other.to_string(),
                    });
                }
            },
        };

        Ok(Self {
            name: desc.name.clone(),
            ty,
            byte_order: desc.byte_order.unwrap_or_default(),
            enum_name: desc.enum_name.clone(),
            display_hint: desc.display_hint,
        })
    }
}

/// A packed struct: members laid out back to back in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecStruct {
    name: String,
    members: Vec<SpecStructMember>,
    size: usize,
}

impl SpecStruct {
    /// Resolve a struct definition.
    pub fn from_desc(desc: &DefinitionDesc) -> Result<Self, SpecError> {
        let members = desc
            .members
            .iter()
            .map(SpecStructMember::from_desc)
            .collect::<Result<Vec<_>, _>>()?;
        let size = members.iter().map(|m| m.ty.size()).sum();
        Ok(Self {
            name: desc.name.clone(),
            members,
            size,
        })
    }

    /// Struct name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Members in layout order.
    pub fn members(&self) -> &[SpecStructMember] {
        &self.members
    }

    /// Look up a member by name.
    pub fn member(&self, name: &str) -> Option<&SpecStructMember> {
        self.members.iter().find(|m| m.name == name)
    }

    /// Total size in bytes.
    pub fn size(&self) -> usize {
        self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let desc = DefinitionDesc::structure(
            "ifinfomsg",
            vec![
                StructMemberDesc::new("family", "u8"),
                StructMemberDesc::new("pad", "pad").len(1),
                StructMemberDesc::new("type", "u16"),
                StructMemberDesc::new("index", "s32"),
                StructMemberDesc::new("flags", "u32"),
                StructMemberDesc::new("change", "u32"),
            ],
        );
        let s = SpecStruct::from_desc(&desc).unwrap();
        assert_eq!(s.size(), 16);
        assert_eq!(s.members().len(), 6);
        assert_eq!(s.member("index").unwrap().ty, MemberType::Int(IntKind::S32));
    }

    #[test]
    fn test_variable_width_rejected() {
        let desc = DefinitionDesc::structure("s", vec![StructMemberDesc::new("x", "uint")]);
        assert!(matches!(
            SpecStruct::from_desc(&desc).unwrap_err(),
            SpecError::UnknownType { .. }
        ));
    }

    #[test]
    fn test_binary_needs_len() {
        let desc = DefinitionDesc::structure("s", vec![StructMemberDesc::new("mac", "binary")]);
        assert!(SpecStruct::from_desc(&desc).is_err());
    }
}
