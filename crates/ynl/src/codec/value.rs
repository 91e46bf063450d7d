//! Decoded attribute values.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// One attribute value.
///
/// The variant produced by the decoder is picked by the attribute's wire
/// type together with its enum and display hint. The encoder accepts a few
/// more shapes than it produces, so a value tree read from JSON (where enum
/// names are plain strings and flag sets plain lists) encodes as well.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Presence of a flag attribute.
    Flag,
    /// Unsigned integer.
    Uint(u64),
    /// Signed integer.
    Sint(i64),
    /// Text.
    String(String),
    /// Raw bytes.
    Binary(Vec<u8>),
    /// Enum entry name.
    Enum(String),
    /// Flag entry names plus bits without an entry.
    Flags {
        names: Vec<String>,
        residual: u64,
    },
    /// `struct nla_bitfield32`.
    Bitfield32 { value: u32, selector: u32 },
    /// Address decoded through an `ipv4`/`ipv6` display hint.
    Ip(IpAddr),
    /// Nested attributes, struct members or sub-message contents.
    Nest(Attrs),
    /// Indexed array elements or repeated `multi-attr` occurrences.
    List(Vec<Value>),
}

impl Value {
    /// Variant name used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Flag => "flag",
            Self::Uint(_) => "unsigned integer",
            Self::Sint(_) => "signed integer",
            Self::String(_) => "string",
            Self::Binary(_) => "binary",
            Self::Enum(_) => "enum name",
            Self::Flags { .. } => "flag set",
            Self::Bitfield32 { .. } => "bitfield32",
            Self::Ip(_) => "ip address",
            Self::Nest(_) => "nest",
            Self::List(_) => "list",
        }
    }

    /// Unsigned value, if this is a non-negative integer.
    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            Self::Uint(v) => Some(v),
            Self::Sint(v) => u64::try_from(v).ok(),
            _ => None,
        }
    }

    /// Signed value, if this is an integer that fits.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Self::Uint(v) => i64::try_from(v).ok(),
            Self::Sint(v) => Some(v),
            _ => None,
        }
    }

    /// Text of a string or enum value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) | Self::Enum(s) => Some(s),
            _ => None,
        }
    }

    /// Bytes of a binary value.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Binary(b) => Some(b),
            _ => None,
        }
    }

    /// Nested attributes.
    pub fn as_nest(&self) -> Option<&Attrs> {
        match self {
            Self::Nest(attrs) => Some(attrs),
            _ => None,
        }
    }

    /// List elements.
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Key used to pick a sub-message format when this value is a selector.
    pub fn selector_key(&self) -> Option<String> {
        match self {
            Self::String(s) | Self::Enum(s) => Some(s.clone()),
            Self::Uint(v) => Some(v.to_string()),
            Self::Sint(v) => Some(v.to_string()),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flag => write!(f, "true"),
            Self::Uint(v) => write!(f, "{}", v),
            Self::Sint(v) => write!(f, "{}", v),
            Self::String(s) | Self::Enum(s) => write!(f, "{}", s),
            Self::Binary(b) => {
                for byte in b {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
            Self::Flags { names, residual } => {
                write!(f, "[{}", names.join(","))?;
                if *residual != 0 {
                    if !names.is_empty() {
                        write!(f, ",")?;
                    }
                    write!(f, "{:#x}", residual)?;
                }
                write!(f, "]")
            }
            Self::Bitfield32 { value, selector } => {
                write!(f, "{:#x}/{:#x}", value, selector)
            }
            Self::Ip(addr) => write!(f, "{}", addr),
            Self::Nest(attrs) => write!(f, "{}", attrs),
            Self::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

macro_rules! impl_from_int {
    ($variant:ident: $($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Self::$variant(v.into())
                }
            }
        )*
    };
}

impl_from_int!(Uint: u8, u16, u32, u64);
impl_from_int!(Sint: i8, i16, i32, i64);

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Self::Binary(b)
    }
}

impl From<&[u8]> for Value {
    fn from(b: &[u8]) -> Self {
        Self::Binary(b.to_vec())
    }
}

impl From<IpAddr> for Value {
    fn from(addr: IpAddr) -> Self {
        Self::Ip(addr)
    }
}

impl From<Ipv4Addr> for Value {
    fn from(addr: Ipv4Addr) -> Self {
        Self::Ip(addr.into())
    }
}

impl From<Ipv6Addr> for Value {
    fn from(addr: Ipv6Addr) -> Self {
        Self::Ip(addr.into())
    }
}

impl From<Attrs> for Value {
    fn from(attrs: Attrs) -> Self {
        Self::Nest(attrs)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::List(items)
    }
}

/// Ordered attribute name to value mapping.
///
/// Order is the wire order on decode and is kept on encode. Names are
/// unique unless pushed explicitly with [`push`](Self::push).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attrs {
    entries: Vec<(String, Value)>,
}

impl Attrs {
    /// Create an empty mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Set `name`, replacing an existing value in place.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    /// Append without checking for an existing entry.
    pub fn push(&mut self, name: impl Into<String>, value: Value) {
        self.entries.push((name.into(), value));
    }

    /// First value stored under `name`.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub(crate) fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.entries
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// Check if `name` is present.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Remove and return the value stored under `name`.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        let idx = self.entries.iter().position(|(n, _)| n == name)?;
        Some(self.entries.remove(idx).1)
    }

    /// Entries in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Move all entries of `other` to the end of this mapping.
    pub fn extend(&mut self, other: Attrs) {
        self.entries.extend(other.entries);
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Attrs {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut attrs = Self::new();
        for (k, v) in iter {
            attrs.insert(k, v);
        }
        attrs
    }
}

impl IntoIterator for Attrs {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl fmt::Display for Attrs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (name, value)) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", name, value)?;
        }
        write!(f, "}}")
    }
}

#[cfg(feature = "serde")]
mod json {
    use serde::ser::{SerializeMap, SerializeSeq};
    use serde::{Serialize, Serializer};

    use super::{Attrs, Value};

    impl Serialize for Value {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            match self {
                Value::Flag => serializer.serialize_bool(true),
                Value::Uint(v) => serializer.serialize_u64(*v),
                Value::Sint(v) => serializer.serialize_i64(*v),
                Value::String(s) | Value::Enum(s) => serializer.serialize_str(s),
                Value::Binary(_) | Value::Ip(_) => serializer.collect_str(self),
                Value::Flags { names, residual } => {
                    let extra = usize::from(*residual != 0);
                    let mut seq = serializer.serialize_seq(Some(names.len() + extra))?;
                    for name in names {
                        seq.serialize_element(name)?;
                    }
                    if *residual != 0 {
                        seq.serialize_element(residual)?;
                    }
                    seq.end()
                }
                Value::Bitfield32 { value, selector } => {
                    let mut map = serializer.serialize_map(Some(2))?;
                    map.serialize_entry("value", value)?;
                    map.serialize_entry("selector", selector)?;
                    map.end()
                }
                Value::Nest(attrs) => attrs.serialize(serializer),
                Value::List(items) => items.serialize(serializer),
            }
        }
    }

    impl Serialize for Attrs {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            let mut map = serializer.serialize_map(Some(self.len()))?;
            for (name, value) in self.iter() {
                map.serialize_entry(name, value)?;
            }
            map.end()
        }
    }

    impl Value {
        /// Convert a JSON value.
        ///
        /// Objects become nests, arrays lists, `true` a flag and numbers
        /// integers. `false` and `null` have no netlink representation and
        /// map to `None`.
        pub fn from_json(json: &serde_json::Value) -> Option<Self> {
            Some(match json {
                serde_json::Value::Null | serde_json::Value::Bool(false) => return None,
                serde_json::Value::Bool(true) => Self::Flag,
                serde_json::Value::Number(n) => match (n.as_u64(), n.as_i64()) {
                    (Some(v), _) => Self::Uint(v),
                    (None, Some(v)) => Self::Sint(v),
                    _ => return None,
                },
                serde_json::Value::String(s) => Self::String(s.clone()),
                serde_json::Value::Array(items) => {
                    Self::List(items.iter().filter_map(Self::from_json).collect())
                }
                serde_json::Value::Object(_) => Self::Nest(Attrs::from_json(json)?),
            })
        }

        /// Convert to a JSON value.
        pub fn to_json(&self) -> serde_json::Value {
            serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
        }
    }

    impl Attrs {
        /// Convert a JSON object, skipping members without a netlink value.
        pub fn from_json(json: &serde_json::Value) -> Option<Self> {
            let object = json.as_object()?;
            Some(
                object
                    .iter()
                    .filter_map(|(k, v)| Value::from_json(v).map(|v| (k.clone(), v)))
                    .collect(),
            )
        }

        /// Convert to a JSON object.
        pub fn to_json(&self) -> serde_json::Value {
            serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
        }
    }
}
