//! Attribute stream decoding driven by attribute sets.

use super::Scope;
use super::scalar::{decode_int, decode_string, format_binary};
use super::value::{Attrs, Value};
use crate::error::{DecodeError, SpecError};
use crate::netlink::attr::{AttrIter, NLA_HDRLEN, RawAttr, nla_align};
use crate::spec::{
    ArrayItem, AttrType, ByteOrder, DisplayHint, IntKind, MemberType, SpecAttr, SpecAttrSet,
    SpecFamily, SpecStruct,
};

/// What to do with attribute ids the set does not describe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UnknownAttrPolicy {
    /// Keep the raw payload under `unknown-<id>`.
    #[default]
    Preserve,
    /// Drop the attribute.
    Skip,
}

/// Decoder settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Handling of unknown attribute ids.
    pub unknown_attrs: UnknownAttrPolicy,
    /// Fail on flag bits without an enum entry instead of keeping them as
    /// a residual.
    pub strict_flags: bool,
}

/// Key under which an unknown attribute is preserved.
pub fn unknown_key(id: u16) -> String {
    format!("unknown-{}", id)
}

/// Decodes attribute streams of one family.
#[derive(Debug, Clone, Copy)]
pub struct Decoder<'a> {
    family: &'a SpecFamily,
    opts: DecodeOptions,
}

impl<'a> Decoder<'a> {
    /// Create a decoder with default options.
    pub fn new(family: &'a SpecFamily) -> Self {
        Self::with_options(family, DecodeOptions::default())
    }

    /// Create a decoder with the given options.
    pub fn with_options(family: &'a SpecFamily, opts: DecodeOptions) -> Self {
        Self { family, opts }
    }

    /// Decode an attribute stream governed by the named set.
    pub fn decode_attrs(&self, set: &str, data: &[u8]) -> Result<Attrs, DecodeError> {
        let set = self.family.need_attr_set(set)?;
        self.decode_set(set, data, 0, None)
    }

    /// Decode a packed struct, returning its members and the bytes consumed.
    pub fn decode_struct(&self, name: &str, data: &[u8]) -> Result<(Attrs, usize), DecodeError> {
        let st = self.family.need_struct(name)?;
        Ok((self.struct_members(st, data)?, st.size()))
    }

    /// Decode a stream whose first header sits at `base` in the message.
    pub(crate) fn decode_set(
        &self,
        set: &SpecAttrSet,
        data: &[u8],
        base: usize,
        parent: Option<&Scope<'_>>,
    ) -> Result<Attrs, DecodeError> {
        let mut out = Attrs::new();

        for raw in AttrIter::with_offset(data, base) {
            let raw = raw?;
            let Some(attr) = set.by_id(raw.kind()) else {
                match self.opts.unknown_attrs {
                    UnknownAttrPolicy::Preserve => {
                        out.push(unknown_key(raw.kind()), Value::Binary(raw.payload.to_vec()))
                    }
                    UnknownAttrPolicy::Skip => {
                        tracing::trace!(set = set.name(), id = raw.kind(), "skipping unknown attribute")
                    }
                }
                continue;
            };

            let scope = Scope {
                attrs: &out,
                parent,
            };
            let Some(value) = self.decode_attr(attr, &raw, &scope)? else {
                continue;
            };

            if attr.multi_attr {
                match out.get_mut(&attr.name) {
                    Some(Value::List(items)) => items.push(value),
                    _ => out.insert(attr.name.clone(), Value::List(vec![value])),
                }
            } else {
                out.insert(attr.name.clone(), value);
            }
        }

        Ok(out)
    }

    fn decode_attr(
        &self,
        attr: &SpecAttr,
        raw: &RawAttr<'_>,
        scope: &Scope<'_>,
    ) -> Result<Option<Value>, DecodeError> {
        let payload = raw.payload;
        let inner = raw.offset + NLA_HDRLEN;

        let value = match &attr.ty {
            AttrType::Unused | AttrType::Pad => return Ok(None),
            AttrType::Flag => Value::Flag,
            AttrType::Int(kind) => {
                let order = if raw.header.is_net_byteorder() {
                    ByteOrder::BigEndian
                } else {
                    attr.byte_order
                };
                let value = decode_int(*kind, order, payload, &attr.name)?;
                self.present_int(attr, *kind, value)?
            }
            AttrType::String => Value::String(decode_string(payload, &attr.name)?),
            AttrType::Binary {
                struct_name: Some(name),
            } => {
                let st = self.family.need_struct(name)?;
                Value::Nest(self.struct_members(st, payload)?)
            }
            AttrType::Binary { struct_name: None } => match attr.display_hint {
                Some(hint) => format_binary(hint, payload),
                None => Value::Binary(payload.to_vec()),
            },
            AttrType::Nest { set } => {
                let set = self.family.need_attr_set(set)?;
                Value::Nest(self.decode_set(set, payload, inner, Some(scope))?)
            }
            AttrType::IndexedArray(item) => {
                Value::List(self.decode_array(attr, item, payload, inner, scope)?)
            }
            AttrType::NestTypeValue { set } => {
                let set = self.family.need_attr_set(set)?;
                let mut entries = Attrs::new();
                for entry in AttrIter::with_offset(payload, inner) {
                    let entry = entry?;
                    let nested =
                        self.decode_set(set, entry.payload, entry.offset + NLA_HDRLEN, Some(scope))?;
                    entries.insert(entry.kind().to_string(), Value::Nest(nested));
                }
                Value::Nest(entries)
            }
            AttrType::Bitfield32 => {
                if payload.len() != 8 {
                    return Err(DecodeError::Payload {
                        attr: attr.name.clone(),
                        expected: 8,
                        actual: payload.len(),
                    });
                }
                let value = u32::from_ne_bytes([payload[0], payload[1], payload[2], payload[3]]);
                let selector = u32::from_ne_bytes([payload[4], payload[5], payload[6], payload[7]]);
                Value::Bitfield32 { value, selector }
            }
            AttrType::SubMessage { name, selector } => {
                Value::Nest(self.decode_sub_message(attr, name, selector, payload, inner, scope)?)
            }
        };

        Ok(Some(value))
    }

    /// Apply enum and display hint to a decoded integer.
    fn present_int(&self, attr: &SpecAttr, kind: IntKind, value: Value) -> Result<Value, DecodeError> {
        if let Some(enum_name) = &attr.enum_name {
            let Some(bits) = value.as_u64() else {
                return Ok(value);
            };
            let set = self.family.need_enum(enum_name)?;
            if attr.enum_as_flags || set.is_flags() {
                let (names, residual) = set.decode_flags(bits);
                if residual != 0 && self.opts.strict_flags {
                    return Err(SpecError::UnmappedBits {
                        enum_name: enum_name.clone(),
                        bits: residual,
                    }
                    .into());
                }
                return Ok(Value::Flags { names, residual });
            }
            return Ok(match set.name_of(bits) {
                Some(name) => Value::Enum(name.to_string()),
                None => value,
            });
        }

        match (attr.display_hint, kind, &value) {
            (Some(DisplayHint::Ipv4), IntKind::U32, Value::Uint(v)) => {
                Ok(Value::Ip(std::net::Ipv4Addr::from(*v as u32).into()))
            }
            (Some(DisplayHint::Hex), _, Value::Uint(v)) => Ok(Value::String(format!("{:#x}", v))),
            _ => Ok(value),
        }
    }

    fn decode_array(
        &self,
        attr: &SpecAttr,
        item: &ArrayItem,
        payload: &[u8],
        base: usize,
        scope: &Scope<'_>,
    ) -> Result<Vec<Value>, DecodeError> {
        let mut items = Vec::new();
        for entry in AttrIter::with_offset(payload, base) {
            let entry = entry?;
            let value = match item {
                ArrayItem::Nest(set) => {
                    let set = self.family.need_attr_set(set)?;
                    Value::Nest(self.decode_set(
                        set,
                        entry.payload,
                        entry.offset + NLA_HDRLEN,
                        Some(scope),
                    )?)
                }
                ArrayItem::Int(kind) => {
                    let order = if entry.header.is_net_byteorder() {
                        ByteOrder::BigEndian
                    } else {
                        attr.byte_order
                    };
                    let value = decode_int(*kind, order, entry.payload, &attr.name)?;
                    self.present_int(attr, *kind, value)?
                }
                ArrayItem::Binary => match attr.display_hint {
                    Some(hint) => format_binary(hint, entry.payload),
                    None => Value::Binary(entry.payload.to_vec()),
                },
                ArrayItem::String => Value::String(decode_string(entry.payload, &attr.name)?),
            };
            items.push(value);
        }
        Ok(items)
    }

    fn decode_sub_message(
        &self,
        attr: &SpecAttr,
        name: &str,
        selector: &str,
        payload: &[u8],
        base: usize,
        scope: &Scope<'_>,
    ) -> Result<Attrs, DecodeError> {
        let key = scope
            .find(selector)
            .and_then(Value::selector_key)
            .ok_or_else(|| DecodeError::MissingSelector {
                attr: attr.name.clone(),
                selector: selector.to_string(),
            })?;
        let msg = self.family.need_sub_message(name)?;
        let format = msg
            .format(&key)
            .ok_or_else(|| DecodeError::UnknownSelectorValue {
                attr: attr.name.clone(),
                value: key.clone(),
            })?;

        let mut out = Attrs::new();
        let mut consumed = 0;
        if let Some(header) = &format.fixed_header {
            let st = self.family.need_struct(header)?;
            out = self.struct_members(st, payload)?;
            consumed = nla_align(st.size());
        }
        if let Some(set) = &format.attribute_set {
            let set = self.family.need_attr_set(set)?;
            let rest = payload.get(consumed..).unwrap_or_default();
            out.extend(self.decode_set(set, rest, base + consumed, Some(scope))?);
        }
        Ok(out)
    }

    fn struct_members(&self, st: &SpecStruct, data: &[u8]) -> Result<Attrs, DecodeError> {
        if data.len() < st.size() {
            return Err(DecodeError::Payload {
                attr: st.name().to_string(),
                expected: st.size(),
                actual: data.len(),
            });
        }

        let mut out = Attrs::new();
        let mut offset = 0;
        for member in st.members() {
            let size = member.ty.size();
            let bytes = &data[offset..offset + size];
            offset += size;

            let value = match member.ty {
                MemberType::Pad(_) => continue,
                MemberType::Binary(_) => match member.display_hint {
                    Some(hint) => format_binary(hint, bytes),
                    None => Value::Binary(bytes.to_vec()),
                },
                MemberType::Int(kind) => {
                    let value = decode_int(kind, member.byte_order, bytes, &member.name)?;
                    match (&member.enum_name, value.as_u64()) {
                        (Some(enum_name), Some(v)) => {
                            let set = self.family.need_enum(enum_name)?;
                            if set.is_flags() {
                                let (names, residual) = set.decode_flags(v);
                                Value::Flags { names, residual }
                            } else {
                                set.name_of(v)
                                    .map(|n| Value::Enum(n.to_string()))
                                    .unwrap_or(value)
                            }
                        }
                        _ => value,
                    }
                }
            };
            out.insert(member.name.clone(), value);
        }
        Ok(out)
    }
}
