//! Map extended ACK offsets back to attribute names.
//!
//! The kernel reports the offending attribute as a byte offset into the
//! request it received. Since the request is still at hand, the offset can
//! be walked with the family description to produce a dotted path such as
//! `.linkinfo.prio` or `.ports[2].name`.

use super::decode::unknown_key;
use super::message::attrs_offset;
use crate::netlink::attr::{AttrIter, NLA_HDRLEN};
use crate::netlink::extack::ExtAck;
use crate::spec::{ArrayItem, AttrType, SpecAttrSet, SpecFamily, SpecOperation};

/// An attribute found at a given offset.
#[derive(Debug, Clone)]
struct Located<'f> {
    path: String,
    /// Set of the attribute's payload, when it is a nest of known layout.
    nested: Option<&'f SpecAttrSet>,
}

/// Fill in the symbolic fields of `ext` using the request that caused it.
pub fn annotate(family: &SpecFamily, op: &SpecOperation, request: &[u8], ext: &mut ExtAck) {
    if let Some(offset) = ext.bad_attr_offset {
        ext.bad_attr = attr_path(family, op, request, offset as usize);
    }
    if let Some(miss_type) = ext.miss_type {
        ext.miss_type_name = missing_attr(family, op, request, ext.miss_nest, miss_type);
    }
}

/// Dotted path of the attribute covering `offset` in `request`.
pub fn attr_path(
    family: &SpecFamily,
    op: &SpecOperation,
    request: &[u8],
    offset: usize,
) -> Option<String> {
    let set = family.attr_set(op.attribute_set.as_deref()?)?;
    let start = attrs_offset(family, op);
    let data = request.get(start..)?;
    locate(family, set, data, start, offset, String::new()).map(|l| l.path)
}

/// Path of an attribute the kernel reported missing.
///
/// `nest` is the offset of the enclosing nest, if the attribute was
/// expected below the top level.
pub fn missing_attr(
    family: &SpecFamily,
    op: &SpecOperation,
    request: &[u8],
    nest: Option<u32>,
    miss_type: u16,
) -> Option<String> {
    let top = family.attr_set(op.attribute_set.as_deref()?)?;
    let (prefix, set) = match nest {
        None => (String::new(), top),
        Some(offset) => {
            let start = attrs_offset(family, op);
            let data = request.get(start..)?;
            let found = locate(family, top, data, start, offset as usize, String::new())?;
            (found.path, found.nested?)
        }
    };
    let name = set
        .by_id(miss_type)
        .map(|a| a.name.clone())
        .unwrap_or_else(|| unknown_key(miss_type));
    Some(format!("{}.{}", prefix, name))
}

fn locate<'f>(
    family: &'f SpecFamily,
    set: &'f SpecAttrSet,
    data: &[u8],
    base: usize,
    target: usize,
    prefix: String,
) -> Option<Located<'f>> {
    for raw in AttrIter::with_offset(data, base) {
        let raw = raw.ok()?;
        let end = raw.offset + raw.header.nla_len as usize;
        if target < raw.offset || target >= end {
            continue;
        }

        let attr = set.by_id(raw.kind());
        let name = attr.map_or_else(|| unknown_key(raw.kind()), |a| a.name.clone());
        let path = format!("{}.{}", prefix, name);
        let inner = raw.offset + NLA_HDRLEN;

        let Some(attr) = attr else {
            return Some(Located { path, nested: None });
        };

        match &attr.ty {
            AttrType::Nest { set: nested } => {
                let nested = family.attr_set(nested)?;
                if target == raw.offset {
                    return Some(Located {
                        path,
                        nested: Some(nested),
                    });
                }
                return locate(family, nested, raw.payload, inner, target, path.clone())
                    .or(Some(Located { path, nested: None }));
            }
            AttrType::IndexedArray(item) => {
                let item_set = match item {
                    ArrayItem::Nest(name) => family.attr_set(name),
                    _ => None,
                };
                return Some(locate_entry(family, item_set, raw.payload, inner, target, path, |k| {
                    format!("[{}]", k)
                }));
            }
            AttrType::NestTypeValue { set: nested } => {
                let item_set = family.attr_set(nested);
                return Some(locate_entry(family, item_set, raw.payload, inner, target, path, |k| {
                    format!(".{}", k)
                }));
            }
            _ => return Some(Located { path, nested: None }),
        }
    }
    None
}

/// Resolve `target` inside a container whose entries are keyed by type id.
fn locate_entry<'f>(
    family: &'f SpecFamily,
    item_set: Option<&'f SpecAttrSet>,
    data: &[u8],
    base: usize,
    target: usize,
    path: String,
    key: impl Fn(u16) -> String,
) -> Located<'f> {
    if target < base {
        return Located { path, nested: None };
    }
    for entry in AttrIter::with_offset(data, base) {
        let Ok(entry) = entry else {
            break;
        };
        let end = entry.offset + entry.header.nla_len as usize;
        if target < entry.offset || target >= end {
            continue;
        }
        let entry_path = format!("{}{}", path, key(entry.kind()));
        if target == entry.offset {
            return Located {
                path: entry_path,
                nested: item_set,
            };
        }
        let inner = locate_in(family, item_set, entry.payload, entry.offset + NLA_HDRLEN, target, &entry_path);
        return inner.unwrap_or(Located {
            path: entry_path,
            nested: None,
        });
    }
    Located { path, nested: None }
}

fn locate_in<'f>(
    family: &'f SpecFamily,
    set: Option<&'f SpecAttrSet>,
    data: &[u8],
    base: usize,
    target: usize,
    prefix: &str,
) -> Option<Located<'f>> {
    locate(family, set?, data, base, target, prefix.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::message::{RequestHeader, encode_request};
    use crate::codec::test_family;
    use crate::codec::value::{Attrs, Value};
    use crate::netlink::attr::nla_align;
    use crate::spec::OpMode;

    fn request(attrs: &Attrs) -> Vec<u8> {
        let family = test_family();
        let op = family.operation("setlink").unwrap();
        let hdr = RequestHeader {
            msg_type: 0x20,
            flags: 0,
            seq: 1,
            port_id: 0,
        };
        encode_request(&family, op, OpMode::Do, attrs, hdr).unwrap()
    }

    #[test]
    fn test_top_level_offset() {
        let family = test_family();
        let op = family.operation("setlink").unwrap();
        let attrs = Attrs::new().with("ifindex", 3u32).with("mtu", 9000u32);
        let msg = request(&attrs);
        let start = attrs_offset(&family, op);
        assert_eq!(start, 16 + 4 + 8);

        assert_eq!(attr_path(&family, op, &msg, start).as_deref(), Some(".ifindex"));
        assert_eq!(attr_path(&family, op, &msg, start + 8).as_deref(), Some(".mtu"));
        // Pointing at the payload still names the attribute.
        assert_eq!(attr_path(&family, op, &msg, start + 12).as_deref(), Some(".mtu"));
        assert_eq!(attr_path(&family, op, &msg, 4), None);
        assert_eq!(attr_path(&family, op, &msg, msg.len() + 4), None);
    }

    #[test]
    fn test_nested_offset() {
        let family = test_family();
        let op = family.operation("setlink").unwrap();
        let stats = Attrs::new().with("rx", 1u64).with("tx", 2u64);
        let attrs = Attrs::new()
            .with("ifindex", 3u32)
            .with("stats", Value::Nest(stats));
        let msg = request(&attrs);
        let start = attrs_offset(&family, op);
        let stats_at = start + 8;
        let tx_at = stats_at + NLA_HDRLEN + nla_align(NLA_HDRLEN + 8);

        assert_eq!(attr_path(&family, op, &msg, stats_at).as_deref(), Some(".stats"));
        assert_eq!(attr_path(&family, op, &msg, tx_at).as_deref(), Some(".stats.tx"));
    }

    #[test]
    fn test_indexed_array_offset() {
        let family = test_family();
        let op = family.operation("setlink").unwrap();
        let ports = vec![
            Value::Nest(Attrs::new().with("id", 1u32)),
            Value::Nest(Attrs::new().with("id", 2u32).with("name", "p2")),
        ];
        let attrs = Attrs::new().with("ports", Value::List(ports));
        let msg = request(&attrs);
        let start = attrs_offset(&family, op);
        // ports header, first entry (4 + 8), second entry header, id
        let second = start + NLA_HDRLEN + 12;
        let name = second + NLA_HDRLEN + 8;

        assert_eq!(attr_path(&family, op, &msg, second).as_deref(), Some(".ports[1]"));
        assert_eq!(attr_path(&family, op, &msg, name).as_deref(), Some(".ports[1].name"));
    }

    #[test]
    fn test_annotate_missing() {
        let family = test_family();
        let op = family.operation("setlink").unwrap();
        let attrs = Attrs::new().with("stats", Value::Nest(Attrs::new().with("rx", 1u64)));
        let msg = request(&attrs);
        let start = attrs_offset(&family, op);

        let mut ext = ExtAck {
            miss_type: Some(2),
            miss_nest: Some(start as u32),
            ..Default::default()
        };
        annotate(&family, op, &msg, &mut ext);
        assert_eq!(ext.miss_type_name.as_deref(), Some(".stats.tx"));

        let mut ext = ExtAck {
            miss_type: Some(1),
            bad_attr_offset: Some(start as u32),
            ..Default::default()
        };
        annotate(&family, op, &msg, &mut ext);
        assert_eq!(ext.miss_type_name.as_deref(), Some(".ifindex"));
        assert_eq!(ext.bad_attr.as_deref(), Some(".stats"));
        assert!(ext.to_string().contains("bad attribute .stats"));
    }
}
