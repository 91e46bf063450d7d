//! Attribute stream encoding driven by attribute sets.

use std::net::IpAddr;

use super::Scope;
use super::scalar::{encode_int, parse_binary, parse_hex_int};
use super::value::{Attrs, Value};
use crate::error::EncodeError;
use crate::netlink::attr::{NLA_HDRLEN, NLA_TYPE_MASK};
use crate::netlink::builder::{AttrBuffer, NestToken};
use crate::spec::{
    ArrayItem, AttrType, ByteOrder, DisplayHint, IntKind, MemberType, SpecAttr, SpecAttrSet,
    SpecEnumSet, SpecFamily, SpecStruct, SpecStructMember,
};

/// Largest payload a single attribute can carry.
const MAX_PAYLOAD: usize = u16::MAX as usize - NLA_HDRLEN;

/// Encodes value trees of one family.
#[derive(Debug, Clone, Copy)]
pub struct Encoder<'a> {
    family: &'a SpecFamily,
}

impl<'a> Encoder<'a> {
    /// Create an encoder.
    pub fn new(family: &'a SpecFamily) -> Self {
        Self { family }
    }

    /// Encode `attrs` as an attribute stream of the named set.
    ///
    /// Attributes are written in the order they appear in `attrs`.
    pub fn encode_attrs(&self, set: &str, attrs: &Attrs) -> Result<Vec<u8>, EncodeError> {
        let set = self.family.need_attr_set(set)?;
        let mut buf = AttrBuffer::new();
        self.encode_set(set, attrs, None, &mut buf)?;
        Ok(buf.into_bytes())
    }

    /// Pack struct members taken by name from `attrs`.
    ///
    /// Missing members are zero; other entries of `attrs` are ignored.
    pub fn encode_struct(&self, name: &str, attrs: &Attrs) -> Result<Vec<u8>, EncodeError> {
        let st = self.family.need_struct(name)?;
        self.pack_struct(st, attrs)
    }

    pub(crate) fn encode_set(
        &self,
        set: &SpecAttrSet,
        attrs: &Attrs,
        parent: Option<&Scope<'_>>,
        buf: &mut AttrBuffer,
    ) -> Result<(), EncodeError> {
        let scope = Scope { attrs, parent };

        for (name, value) in attrs.iter() {
            let Some(attr) = set.get(name) else {
                if let Some(id) = unknown_id(name) {
                    let bytes = value.as_bytes().ok_or_else(|| mismatch(name, "binary", value))?;
                    check_len(name, bytes.len())?;
                    buf.append_attr(id, bytes);
                    continue;
                }
                return Err(EncodeError::UnknownAttr {
                    set: set.name().to_string(),
                    name: name.to_string(),
                });
            };

            match value {
                Value::List(items) if attr.multi_attr => {
                    for item in items {
                        self.encode_attr(attr, item, &scope, buf)?;
                    }
                }
                _ => self.encode_attr(attr, value, &scope, buf)?,
            }
        }
        Ok(())
    }

    fn encode_attr(
        &self,
        attr: &SpecAttr,
        value: &Value,
        scope: &Scope<'_>,
        buf: &mut AttrBuffer,
    ) -> Result<(), EncodeError> {
        let id = attr.value;
        match &attr.ty {
            AttrType::Unused => return Err(mismatch(&attr.name, "no value", value)),
            AttrType::Pad => {
                let len = match value {
                    Value::Binary(b) => b.len(),
                    _ => 0,
                };
                buf.append_attr(id, &vec![0; len]);
            }
            AttrType::Flag => match value {
                Value::Flag => buf.append_attr_empty(id),
                _ => return Err(mismatch(&attr.name, "flag", value)),
            },
            AttrType::Int(kind) => {
                let n = self.int_value(attr, value)?;
                let bytes = int_bytes(&attr.name, *kind, attr.byte_order, n)?;
                buf.append_attr(id, &bytes);
            }
            AttrType::String => match value {
                Value::String(s) | Value::Enum(s) => {
                    check_len(&attr.name, s.len() + 1)?;
                    buf.append_attr_str(id, s);
                }
                _ => return Err(mismatch(&attr.name, "string", value)),
            },
            AttrType::Binary { struct_name } => {
                let bytes = match (struct_name, value) {
                    (Some(name), Value::Nest(members)) => {
                        self.pack_struct(self.family.need_struct(name)?, members)?
                    }
                    _ => self.binary_value(attr, value)?,
                };
                check_len(&attr.name, bytes.len())?;
                buf.append_attr(id, &bytes);
            }
            AttrType::Nest { set } => {
                let Value::Nest(nested) = value else {
                    return Err(mismatch(&attr.name, "nest", value));
                };
                let set = self.family.need_attr_set(set)?;
                let token = buf.nest_start(id);
                self.encode_set(set, nested, Some(scope), buf)?;
                close_nest(&attr.name, buf, token)?;
            }
            AttrType::IndexedArray(item) => {
                let Value::List(items) = value else {
                    return Err(mismatch(&attr.name, "list", value));
                };
                let token = buf.nest_start(id);
                for (idx, element) in items.iter().enumerate() {
                    let idx = u16::try_from(idx)
                        .ok()
                        .filter(|i| *i <= NLA_TYPE_MASK)
                        .ok_or_else(|| EncodeError::TooLarge {
                            attr: attr.name.clone(),
                            len: items.len(),
                        })?;
                    self.encode_array_item(attr, item, idx, element, scope, buf)?;
                }
                close_nest(&attr.name, buf, token)?;
            }
            AttrType::NestTypeValue { set } => {
                let Value::Nest(entries) = value else {
                    return Err(mismatch(&attr.name, "nest", value));
                };
                let set = self.family.need_attr_set(set)?;
                let token = buf.nest_start(id);
                for (key, entry) in entries.iter() {
                    let ty = key
                        .parse::<u16>()
                        .ok()
                        .filter(|t| *t <= NLA_TYPE_MASK)
                        .ok_or_else(|| EncodeError::UnknownAttr {
                            set: set.name().to_string(),
                            name: key.to_string(),
                        })?;
                    let Value::Nest(nested) = entry else {
                        return Err(mismatch(&attr.name, "nest", entry));
                    };
                    let inner = buf.nest_start(ty);
                    self.encode_set(set, nested, Some(scope), buf)?;
                    close_nest(&attr.name, buf, inner)?;
                }
                close_nest(&attr.name, buf, token)?;
            }
            AttrType::Bitfield32 => {
                let (bits, selector) = match value {
                    Value::Bitfield32 { value, selector } => (*value, *selector),
                    other => {
                        let n = self.int_value(attr, other)?;
                        let bits = u32::try_from(n).map_err(|_| EncodeError::OutOfRange {
                            attr: attr.name.clone(),
                            value: n.to_string(),
                        })?;
                        (bits, bits)
                    }
                };
                let mut bytes = bits.to_ne_bytes().to_vec();
                bytes.extend_from_slice(&selector.to_ne_bytes());
                buf.append_attr(id, &bytes);
            }
            AttrType::SubMessage { name, selector } => {
                let Value::Nest(nested) = value else {
                    return Err(mismatch(&attr.name, "nest", value));
                };
                self.encode_sub_message(attr, name, selector, nested, scope, buf)?;
            }
        }
        Ok(())
    }

    fn encode_array_item(
        &self,
        attr: &SpecAttr,
        item: &ArrayItem,
        idx: u16,
        element: &Value,
        scope: &Scope<'_>,
        buf: &mut AttrBuffer,
    ) -> Result<(), EncodeError> {
        match item {
            ArrayItem::Nest(set) => {
                let Value::Nest(nested) = element else {
                    return Err(mismatch(&attr.name, "nest", element));
                };
                let set = self.family.need_attr_set(set)?;
                let token = buf.nest_start(idx);
                self.encode_set(set, nested, Some(scope), buf)?;
                close_nest(&attr.name, buf, token)?;
            }
            ArrayItem::Int(kind) => {
                let n = self.int_value(attr, element)?;
                buf.append_attr(idx, &int_bytes(&attr.name, *kind, attr.byte_order, n)?);
            }
            ArrayItem::Binary => {
                let bytes = self.binary_value(attr, element)?;
                check_len(&attr.name, bytes.len())?;
                buf.append_attr(idx, &bytes);
            }
            ArrayItem::String => match element {
                Value::String(s) => buf.append_attr_str(idx, s),
                _ => return Err(mismatch(&attr.name, "string", element)),
            },
        }
        Ok(())
    }

    fn encode_sub_message(
        &self,
        attr: &SpecAttr,
        name: &str,
        selector: &str,
        nested: &Attrs,
        scope: &Scope<'_>,
        buf: &mut AttrBuffer,
    ) -> Result<(), EncodeError> {
        let key = scope
            .find(selector)
            .and_then(Value::selector_key)
            .ok_or_else(|| EncodeError::MissingSelector {
                attr: attr.name.clone(),
                selector: selector.to_string(),
            })?;
        let msg = self.family.need_sub_message(name)?;
        let format = msg
            .format(&key)
            .ok_or_else(|| EncodeError::UnknownSelectorValue {
                attr: attr.name.clone(),
                value: key.clone(),
            })?;

        let token = buf.nest_start(attr.value);
        let mut rest = nested.clone();
        if let Some(header) = &format.fixed_header {
            let st = self.family.need_struct(header)?;
            let packed = self.pack_struct(st, nested)?;
            for member in st.members() {
                rest.remove(&member.name);
            }
            buf.append_raw(&packed);
        }
        match &format.attribute_set {
            Some(set) => {
                let set = self.family.need_attr_set(set)?;
                self.encode_set(set, &rest, Some(scope), buf)?;
            }
            None => {
                if let Some((name, _)) = rest.iter().next() {
                    return Err(EncodeError::UnknownAttr {
                        set: msg.name().to_string(),
                        name: name.to_string(),
                    });
                }
            }
        }
        close_nest(&attr.name, buf, token)
    }

    /// Integer (as i128) for an int-typed attribute, resolving enum names.
    fn int_value(&self, attr: &SpecAttr, value: &Value) -> Result<i128, EncodeError> {
        match value {
            Value::Uint(v) => Ok((*v).into()),
            Value::Sint(v) => Ok((*v).into()),
            Value::String(text)
                if attr.enum_name.is_none() && matches!(attr.display_hint, Some(DisplayHint::Hex)) =>
            {
                hex_int(&attr.name, text)
            }
            Value::Enum(name) | Value::String(name) => {
                let set = self.enum_of(&attr.name, attr.enum_name.as_deref(), value)?;
                if attr.enum_as_flags || set.is_flags() {
                    Ok(set.encode_flags([name.as_str()])?.into())
                } else {
                    Ok(set.value_of(name)?.into())
                }
            }
            Value::Flags { names, residual } => {
                let set = self.enum_of(&attr.name, attr.enum_name.as_deref(), value)?;
                Ok((set.encode_flags(names)? | residual).into())
            }
            Value::List(items) => {
                let set = self.enum_of(&attr.name, attr.enum_name.as_deref(), value)?;
                let mut names = Vec::with_capacity(items.len());
                for item in items {
                    names.push(
                        item.as_str()
                            .ok_or_else(|| mismatch(&attr.name, "flag names", item))?,
                    );
                }
                Ok(set.encode_flags(names)?.into())
            }
            Value::Ip(IpAddr::V4(addr)) => Ok(u32::from(*addr).into()),
            _ => Err(mismatch(&attr.name, "integer", value)),
        }
    }

    /// Enum an integer field names its values with.
    fn enum_of(
        &self,
        field: &str,
        enum_name: Option<&str>,
        value: &Value,
    ) -> Result<&'a SpecEnumSet, EncodeError> {
        let enum_name = enum_name.ok_or_else(|| mismatch(field, "integer", value))?;
        Ok(self.family.need_enum(enum_name)?)
    }

    fn binary_value(&self, attr: &SpecAttr, value: &Value) -> Result<Vec<u8>, EncodeError> {
        match value {
            Value::Binary(b) => Ok(b.clone()),
            Value::Ip(IpAddr::V4(addr)) => Ok(addr.octets().to_vec()),
            Value::Ip(IpAddr::V6(addr)) => Ok(addr.octets().to_vec()),
            Value::String(s) => match attr.display_hint {
                Some(hint) => parse_binary(hint, s).ok_or_else(|| EncodeError::OutOfRange {
                    attr: attr.name.clone(),
                    value: s.clone(),
                }),
                None => Err(mismatch(&attr.name, "binary", value)),
            },
            _ => Err(mismatch(&attr.name, "binary", value)),
        }
    }

    fn pack_struct(&self, st: &SpecStruct, attrs: &Attrs) -> Result<Vec<u8>, EncodeError> {
        let mut out = Vec::with_capacity(st.size());
        for member in st.members() {
            let value = attrs.get(&member.name);
            match member.ty {
                MemberType::Pad(len) => out.resize(out.len() + len, 0),
                MemberType::Binary(len) => {
                    let mut bytes = match value {
                        None => Vec::new(),
                        Some(Value::Binary(b)) => b.clone(),
                        Some(Value::String(s)) => member
                            .display_hint
                            .and_then(|hint| parse_binary(hint, s))
                            .ok_or_else(|| EncodeError::OutOfRange {
                                attr: member.name.clone(),
                                value: s.clone(),
                            })?,
                        Some(other) => return Err(mismatch(&member.name, "binary", other)),
                    };
                    if bytes.len() > len {
                        return Err(EncodeError::TooLarge {
                            attr: member.name.clone(),
                            len: bytes.len(),
                        });
                    }
                    bytes.resize(len, 0);
                    out.extend_from_slice(&bytes);
                }
                MemberType::Int(kind) => {
                    let n = match value {
                        None => 0,
                        Some(v) => self.member_int(member, v)?,
                    };
                    out.extend_from_slice(&int_bytes(&member.name, kind, member.byte_order, n)?);
                }
            }
        }
        Ok(out)
    }

    fn member_int(&self, member: &SpecStructMember, value: &Value) -> Result<i128, EncodeError> {
        match value {
            Value::Uint(v) => Ok((*v).into()),
            Value::Sint(v) => Ok((*v).into()),
            Value::String(text)
                if member.enum_name.is_none()
                    && matches!(member.display_hint, Some(DisplayHint::Hex)) =>
            {
                hex_int(&member.name, text)
            }
            Value::Enum(name) | Value::String(name) => {
                let set = self.enum_of(&member.name, member.enum_name.as_deref(), value)?;
                if set.is_flags() {
                    Ok(set.encode_flags([name.as_str()])?.into())
                } else {
                    Ok(set.value_of(name)?.into())
                }
            }
            Value::Flags { names, residual } => {
                let set = self.enum_of(&member.name, member.enum_name.as_deref(), value)?;
                Ok((set.encode_flags(names)? | residual).into())
            }
            _ => Err(mismatch(&member.name, "integer", value)),
        }
    }
}

fn int_bytes(name: &str, kind: IntKind, order: ByteOrder, n: i128) -> Result<Vec<u8>, EncodeError> {
    encode_int(kind, order, n).ok_or_else(|| EncodeError::OutOfRange {
        attr: name.to_string(),
        value: n.to_string(),
    })
}

fn hex_int(name: &str, text: &str) -> Result<i128, EncodeError> {
    parse_hex_int(text)
        .map(i128::from)
        .ok_or_else(|| EncodeError::OutOfRange {
            attr: name.to_string(),
            value: text.to_string(),
        })
}

fn mismatch(attr: &str, expected: &'static str, found: &Value) -> EncodeError {
    EncodeError::TypeMismatch {
        attr: attr.to_string(),
        expected,
        found: found.kind_name(),
    }
}

fn check_len(attr: &str, len: usize) -> Result<(), EncodeError> {
    if len > MAX_PAYLOAD {
        return Err(EncodeError::TooLarge {
            attr: attr.to_string(),
            len,
        });
    }
    Ok(())
}

fn close_nest(attr: &str, buf: &mut AttrBuffer, token: NestToken) -> Result<(), EncodeError> {
    check_len(attr, buf.nest_payload_len(token))?;
    buf.nest_end(token);
    Ok(())
}

/// Id of an `unknown-<id>` key as produced by the decoder.
fn unknown_id(name: &str) -> Option<u16> {
    name.strip_prefix("unknown-")?
        .parse::<u16>()
        .ok()
        .filter(|id| *id <= NLA_TYPE_MASK)
}
