//! Extended ACK attributes (`NLMSGERR_ATTR_*`) attached to error and done
//! messages.

use std::fmt;

use super::attr::AttrIter;
use crate::error::DecodeError;

/// Extended ACK attribute types.
pub const NLMSGERR_ATTR_MSG: u16 = 1;
pub const NLMSGERR_ATTR_OFFS: u16 = 2;
pub const NLMSGERR_ATTR_COOKIE: u16 = 3;
pub const NLMSGERR_ATTR_POLICY: u16 = 4;
pub const NLMSGERR_ATTR_MISS_TYPE: u16 = 5;
pub const NLMSGERR_ATTR_MISS_NEST: u16 = 6;

/// Policy attribute types nested in `NLMSGERR_ATTR_POLICY`.
pub const NL_POLICY_TYPE_ATTR_TYPE: u16 = 1;
pub const NL_POLICY_TYPE_ATTR_MIN_VALUE_S: u16 = 2;
pub const NL_POLICY_TYPE_ATTR_MAX_VALUE_S: u16 = 3;
pub const NL_POLICY_TYPE_ATTR_MIN_VALUE_U: u16 = 4;
pub const NL_POLICY_TYPE_ATTR_MAX_VALUE_U: u16 = 5;
pub const NL_POLICY_TYPE_ATTR_MIN_LENGTH: u16 = 6;
pub const NL_POLICY_TYPE_ATTR_MAX_LENGTH: u16 = 7;
pub const NL_POLICY_TYPE_ATTR_MASK: u16 = 12;

/// Policy the kernel applied to the offending attribute.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtAckPolicy {
    /// Kernel policy type (`NL_ATTR_TYPE_*`).
    pub attr_type: Option<u32>,
    pub min_value_s: Option<i64>,
    pub max_value_s: Option<i64>,
    pub min_value_u: Option<u64>,
    pub max_value_u: Option<u64>,
    pub min_length: Option<u32>,
    pub max_length: Option<u32>,
    pub mask: Option<u64>,
}

/// Extended ACK information.
///
/// The raw fields come straight from the wire; `bad_attr` and
/// `miss_type_name` are filled in by the client when the offending
/// attribute can be located in the request it sent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtAck {
    /// Error message from the kernel.
    pub msg: Option<String>,
    /// Offset of the offending attribute within the request.
    pub bad_attr_offset: Option<u32>,
    /// Dotted path of the offending attribute (e.g. `.info.ifname`).
    pub bad_attr: Option<String>,
    /// Opaque cookie.
    pub cookie: Option<Vec<u8>>,
    /// Policy of the offending attribute.
    pub policy: Option<ExtAckPolicy>,
    /// Type id of a missing attribute.
    pub miss_type: Option<u16>,
    /// Name of the missing attribute.
    pub miss_type_name: Option<String>,
    /// Offset of the nest the missing attribute belongs in.
    pub miss_nest: Option<u32>,
}

impl ExtAck {
    /// Parse extended ACK attributes.
    pub fn parse(data: &[u8]) -> Result<Self, DecodeError> {
        let mut ext = Self::default();

        for attr in AttrIter::new(data) {
            let attr = attr?;
            match attr.kind() {
                NLMSGERR_ATTR_MSG => {
                    let len = attr
                        .payload
                        .iter()
                        .position(|&b| b == 0)
                        .unwrap_or(attr.payload.len());
                    ext.msg = Some(String::from_utf8_lossy(&attr.payload[..len]).into_owned());
                }
                NLMSGERR_ATTR_OFFS => ext.bad_attr_offset = Some(read_u32(attr.payload, "offs")?),
                NLMSGERR_ATTR_COOKIE => ext.cookie = Some(attr.payload.to_vec()),
                NLMSGERR_ATTR_POLICY => ext.policy = Some(parse_policy(attr.payload)?),
                NLMSGERR_ATTR_MISS_TYPE => {
                    ext.miss_type = Some(read_u32(attr.payload, "miss-type")? as u16)
                }
                NLMSGERR_ATTR_MISS_NEST => {
                    ext.miss_nest = Some(read_u32(attr.payload, "miss-nest")?)
                }
                _ => {}
            }
        }

        Ok(ext)
    }

    /// Check if no extended information is present.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl fmt::Display for ExtAck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(msg) = &self.msg {
            parts.push(msg.clone());
        }
        match (&self.bad_attr, self.bad_attr_offset) {
            (Some(path), _) => parts.push(format!("bad attribute {}", path)),
            (None, Some(offs)) => parts.push(format!("bad attribute at offset {}", offs)),
            _ => {}
        }
        match (&self.miss_type_name, self.miss_type) {
            (Some(name), _) => parts.push(format!("missing attribute {}", name)),
            (None, Some(ty)) => parts.push(format!("missing attribute type {}", ty)),
            _ => {}
        }
        if let Some(policy) = &self.policy {
            if let (Some(min), Some(max)) = (policy.min_value_u, policy.max_value_u) {
                parts.push(format!("valid range {}..={}", min, max));
            } else if let (Some(min), Some(max)) = (policy.min_value_s, policy.max_value_s) {
                parts.push(format!("valid range {}..={}", min, max));
            }
            if let Some(max) = policy.max_length {
                parts.push(format!("max length {}", max));
            }
        }
        write!(f, "{}", parts.join("; "))
    }
}

fn parse_policy(data: &[u8]) -> Result<ExtAckPolicy, DecodeError> {
    let mut policy = ExtAckPolicy::default();
    for attr in AttrIter::new(data) {
        let attr = attr?;
        match attr.kind() {
            NL_POLICY_TYPE_ATTR_TYPE => policy.attr_type = Some(read_u32(attr.payload, "type")?),
            NL_POLICY_TYPE_ATTR_MIN_VALUE_S => {
                policy.min_value_s = Some(read_u64(attr.payload, "min-value-s")? as i64)
            }
            NL_POLICY_TYPE_ATTR_MAX_VALUE_S => {
                policy.max_value_s = Some(read_u64(attr.payload, "max-value-s")? as i64)
            }
            NL_POLICY_TYPE_ATTR_MIN_VALUE_U => {
                policy.min_value_u = Some(read_u64(attr.payload, "min-value-u")?)
            }
            NL_POLICY_TYPE_ATTR_MAX_VALUE_U => {
                policy.max_value_u = Some(read_u64(attr.payload, "max-value-u")?)
            }
            NL_POLICY_TYPE_ATTR_MIN_LENGTH => {
                policy.min_length = Some(read_u32(attr.payload, "min-length")?)
            }
            NL_POLICY_TYPE_ATTR_MAX_LENGTH => {
                policy.max_length = Some(read_u32(attr.payload, "max-length")?)
            }
            NL_POLICY_TYPE_ATTR_MASK => policy.mask = Some(read_u64(attr.payload, "mask")?),
            _ => {}
        }
    }
    Ok(policy)
}

fn read_u32(data: &[u8], attr: &str) -> Result<u32, DecodeError> {
    data.get(..4)
        .and_then(|b| b.try_into().ok())
        .map(u32::from_ne_bytes)
        .ok_or_else(|| DecodeError::Payload {
            attr: attr.to_string(),
            expected: 4,
            actual: data.len(),
        })
}

fn read_u64(data: &[u8], attr: &str) -> Result<u64, DecodeError> {
    data.get(..8)
        .and_then(|b| b.try_into().ok())
        .map(u64::from_ne_bytes)
        .ok_or_else(|| DecodeError::Payload {
            attr: attr.to_string(),
            expected: 8,
            actual: data.len(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netlink::builder::AttrBuffer;

    #[test]
    fn test_parse_extack() {
        let mut attrs = AttrBuffer::new();
        attrs.append_attr_str(NLMSGERR_ATTR_MSG, "Attribute failed policy validation");
        attrs.append_attr_u32(NLMSGERR_ATTR_OFFS, 24);
        let policy = attrs.nest_start(NLMSGERR_ATTR_POLICY);
        attrs.append_attr(NL_POLICY_TYPE_ATTR_MIN_VALUE_U, &1u64.to_ne_bytes());
        attrs.append_attr(NL_POLICY_TYPE_ATTR_MAX_VALUE_U, &16u64.to_ne_bytes());
        attrs.nest_end(policy);

        let ext = ExtAck::parse(attrs.as_bytes()).unwrap();
        assert_eq!(ext.msg.as_deref(), Some("Attribute failed policy validation"));
        assert_eq!(ext.bad_attr_offset, Some(24));
        let policy = ext.policy.clone().unwrap();
        assert_eq!(policy.min_value_u, Some(1));
        assert_eq!(policy.max_value_u, Some(16));
        assert!(ext.to_string().contains("valid range 1..=16"));
    }

    #[test]
    fn test_parse_missing() {
        let mut attrs = AttrBuffer::new();
        attrs.append_attr_u32(NLMSGERR_ATTR_MISS_TYPE, 3);
        attrs.append_attr_u32(NLMSGERR_ATTR_MISS_NEST, 20);
        let ext = ExtAck::parse(attrs.as_bytes()).unwrap();
        assert_eq!(ext.miss_type, Some(3));
        assert_eq!(ext.miss_nest, Some(20));
        assert!(!ext.is_empty());
    }

    #[test]
    fn test_empty() {
        assert!(ExtAck::parse(&[]).unwrap().is_empty());
    }
}
