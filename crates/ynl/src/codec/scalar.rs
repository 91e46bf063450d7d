//! Scalar payloads: integers in any byte order and display-hinted binaries.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use super::value::Value;
use crate::error::DecodeError;
use crate::spec::{ByteOrder, DisplayHint, IntKind};

macro_rules! to_bytes {
    ($v:expr, $order:expr) => {
        match $order {
            ByteOrder::Host => $v.to_ne_bytes().to_vec(),
            ByteOrder::BigEndian => $v.to_be_bytes().to_vec(),
            ByteOrder::LittleEndian => $v.to_le_bytes().to_vec(),
        }
    };
}

macro_rules! from_bytes {
    ($ty:ty, $bytes:expr, $order:expr) => {
        match $order {
            ByteOrder::Host => <$ty>::from_ne_bytes($bytes),
            ByteOrder::BigEndian => <$ty>::from_be_bytes($bytes),
            ByteOrder::LittleEndian => <$ty>::from_le_bytes($bytes),
        }
    };
}

/// Inclusive range of values a kind can carry.
pub fn int_range(kind: IntKind) -> (i128, i128) {
    match kind {
        IntKind::U8 => (0, u8::MAX.into()),
        IntKind::U16 => (0, u16::MAX.into()),
        IntKind::U32 => (0, u32::MAX.into()),
        IntKind::U64 | IntKind::Uint => (0, u64::MAX.into()),
        IntKind::S8 => (i8::MIN.into(), i8::MAX.into()),
        IntKind::S16 => (i16::MIN.into(), i16::MAX.into()),
        IntKind::S32 => (i32::MIN.into(), i32::MAX.into()),
        IntKind::S64 | IntKind::Sint => (i64::MIN.into(), i64::MAX.into()),
    }
}

/// Encode an integer, or `None` if it does not fit `kind`.
///
/// `uint` and `sint` use 4 bytes when the value fits and 8 otherwise.
pub fn encode_int(kind: IntKind, order: ByteOrder, value: i128) -> Option<Vec<u8>> {
    let (min, max) = int_range(kind);
    if value < min || value > max {
        return None;
    }

    let width = match kind {
        IntKind::Uint if value <= i128::from(u32::MAX) => 4,
        IntKind::Sint if i32::try_from(value).is_ok() => 4,
        _ => kind.width().unwrap_or(8),
    };

    // Two's complement truncation to the wire width.
    let bits = value as u64;
    Some(match width {
        1 => vec![bits as u8],
        2 => to_bytes!(bits as u16, order),
        4 => to_bytes!(bits as u32, order),
        _ => to_bytes!(bits, order),
    })
}

/// Decode an integer payload.
pub fn decode_int(
    kind: IntKind,
    order: ByteOrder,
    data: &[u8],
    attr: &str,
) -> Result<Value, DecodeError> {
    let width = match kind.width() {
        Some(width) => width,
        None if data.len() == 4 || data.len() == 8 => data.len(),
        None => 4,
    };
    if data.len() != width {
        return Err(DecodeError::Payload {
            attr: attr.to_string(),
            expected: width,
            actual: data.len(),
        });
    }

    let bits: u64 = match width {
        1 => data[0].into(),
        2 => from_bytes!(u16, [data[0], data[1]], order).into(),
        4 => from_bytes!(u32, [data[0], data[1], data[2], data[3]], order).into(),
        _ => {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(data);
            from_bytes!(u64, buf, order)
        }
    };

    Ok(if kind.is_signed() {
        let v = match width {
            1 => i64::from(bits as u8 as i8),
            2 => i64::from(bits as u16 as i16),
            4 => i64::from(bits as u32 as i32),
            _ => bits as i64,
        };
        Value::Sint(v)
    } else {
        Value::Uint(bits)
    })
}

/// Render a binary payload according to a display hint.
///
/// Payloads whose length does not suit the hint stay binary.
pub fn format_binary(hint: DisplayHint, data: &[u8]) -> Value {
    match hint {
        DisplayHint::Ipv4 | DisplayHint::Ipv6 | DisplayHint::Ipv4OrV6 => match data.len() {
            4 => Value::Ip(IpAddr::V4(Ipv4Addr::new(data[0], data[1], data[2], data[3]))),
            16 => {
                let mut octets = [0u8; 16];
                octets.copy_from_slice(data);
                Value::Ip(IpAddr::V6(Ipv6Addr::from(octets)))
            }
            _ => Value::Binary(data.to_vec()),
        },
        DisplayHint::Mac => Value::String(
            data.iter()
                .map(|b| format!("{:02x}", b))
                .collect::<Vec<_>>()
                .join(":"),
        ),
        DisplayHint::Hex => Value::String(hex(data)),
        DisplayHint::Uuid if data.len() == 16 => {
            let h = hex(data);
            Value::String(format!(
                "{}-{}-{}-{}-{}",
                &h[..8],
                &h[8..12],
                &h[12..16],
                &h[16..20],
                &h[20..]
            ))
        }
        DisplayHint::Uuid => Value::String(hex(data)),
    }
}

/// Parse a display-hinted string back into bytes.
pub fn parse_binary(hint: DisplayHint, text: &str) -> Option<Vec<u8>> {
    match hint {
        DisplayHint::Ipv4 | DisplayHint::Ipv6 | DisplayHint::Ipv4OrV6 => {
            match text.parse::<IpAddr>().ok()? {
                IpAddr::V4(addr) => Some(addr.octets().to_vec()),
                IpAddr::V6(addr) => Some(addr.octets().to_vec()),
            }
        }
        DisplayHint::Mac if text.is_empty() => Some(Vec::new()),
        DisplayHint::Mac => text
            .split(':')
            .map(|part| u8::from_str_radix(part, 16).ok())
            .collect(),
        DisplayHint::Hex => unhex(text),
        DisplayHint::Uuid => unhex(&text.replace('-', "")),
    }
}

/// Parse an integer printed with a hex display hint, such as `0xff`.
pub fn parse_hex_int(text: &str) -> Option<u64> {
    u64::from_str_radix(text.strip_prefix("0x")?, 16).ok()
}

fn hex(data: &[u8]) -> String {
    data.iter().map(|b| format!("{:02x}", b)).collect()
}

fn unhex(text: &str) -> Option<Vec<u8>> {
    let text = text.strip_prefix("0x").unwrap_or(text);
    if text.len() % 2 != 0 || !text.is_ascii() {
        return None;
    }
    (0..text.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&text[i..i + 2], 16).ok())
        .collect()
}

/// Payload of a string attribute, up to the first NUL.
pub fn decode_string(data: &[u8], attr: &str) -> Result<String, DecodeError> {
    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    std::str::from_utf8(&data[..end])
        .map(str::to_string)
        .map_err(|_| DecodeError::InvalidUtf8 {
            attr: attr.to_string(),
        })
}
