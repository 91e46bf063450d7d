//! Netlink attribute (nlattr) handling.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::error::DecodeError;

/// Netlink attribute alignment.
pub const NLA_ALIGNTO: usize = 4;

/// Align a length to NLA_ALIGNTO boundary.
#[inline]
pub const fn nla_align(len: usize) -> usize {
    (len + NLA_ALIGNTO - 1) & !(NLA_ALIGNTO - 1)
}

/// Size of the attribute header.
pub const NLA_HDRLEN: usize = 4;

/// Attribute type flags.
pub const NLA_F_NESTED: u16 = 1 << 15;
pub const NLA_F_NET_BYTEORDER: u16 = 1 << 14;
pub const NLA_TYPE_MASK: u16 = !(NLA_F_NESTED | NLA_F_NET_BYTEORDER);

/// Netlink attribute header (mirrors struct nlattr).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct NlAttr {
    /// Length including header.
    pub nla_len: u16,
    /// Attribute type with flag bits.
    pub nla_type: u16,
}

impl NlAttr {
    /// Create a new attribute header.
    pub fn new(attr_type: u16, data_len: usize) -> Self {
        Self {
            nla_len: (NLA_HDRLEN + data_len) as u16,
            nla_type: attr_type,
        }
    }

    /// Get the attribute type without flags.
    pub fn kind(&self) -> u16 {
        self.nla_type & NLA_TYPE_MASK
    }

    /// Check if this is a nested attribute.
    pub fn is_nested(&self) -> bool {
        self.nla_type & NLA_F_NESTED != 0
    }

    /// Check if the payload is in network byte order.
    pub fn is_net_byteorder(&self) -> bool {
        self.nla_type & NLA_F_NET_BYTEORDER != 0
    }

    /// Convert to bytes.
    pub fn as_bytes(&self) -> &[u8] {
        <Self as IntoBytes>::as_bytes(self)
    }

    /// Parse from bytes, reporting `offset` on failure.
    pub fn from_bytes(data: &[u8], offset: usize) -> Result<Self, DecodeError> {
        Self::read_from_prefix(data)
            .map(|(attr, _)| attr)
            .map_err(|_| DecodeError::Truncated {
                offset,
                needed: NLA_HDRLEN,
                available: data.len(),
            })
    }
}

/// One attribute as found on the wire.
#[derive(Debug, Clone, Copy)]
pub struct RawAttr<'a> {
    /// The attribute header.
    pub header: NlAttr,
    /// Payload without header or padding.
    pub payload: &'a [u8],
    /// Offset of the header, relative to the start of the iterated stream
    /// plus the base offset given to the iterator.
    pub offset: usize,
}

impl RawAttr<'_> {
    /// Attribute type without flags.
    pub fn kind(&self) -> u16 {
        self.header.kind()
    }

    /// Length of header plus payload plus padding.
    pub fn full_len(&self) -> usize {
        nla_align(self.header.nla_len as usize)
    }
}

/// Iterator over netlink attributes in a buffer.
///
/// Every header is validated: a length shorter than the header or longer
/// than the remaining buffer yields an error and ends iteration. Trailing
/// bytes too short to hold a header are also an error.
pub struct AttrIter<'a> {
    data: &'a [u8],
    offset: usize,
    failed: bool,
}

impl<'a> AttrIter<'a> {
    /// Create a new attribute iterator.
    pub fn new(data: &'a [u8]) -> Self {
        Self::with_offset(data, 0)
    }

    /// Create an iterator whose reported offsets start at `offset`.
    pub fn with_offset(data: &'a [u8], offset: usize) -> Self {
        Self {
            data,
            offset,
            failed: false,
        }
    }

    /// Check if there are no more attributes.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl<'a> Iterator for AttrIter<'a> {
    type Item = Result<RawAttr<'a>, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.data.is_empty() {
            return None;
        }

        let header = match NlAttr::from_bytes(self.data, self.offset) {
            Ok(h) => h,
            Err(e) => {
                self.failed = true;
                return Some(Err(e));
            }
        };

        let len = header.nla_len as usize;
        if len < NLA_HDRLEN {
            self.failed = true;
            return Some(Err(DecodeError::BadLength {
                offset: self.offset,
                len,
            }));
        }
        if len > self.data.len() {
            self.failed = true;
            return Some(Err(DecodeError::Truncated {
                offset: self.offset,
                needed: len,
                available: self.data.len(),
            }));
        }

        let attr = RawAttr {
            header,
            payload: &self.data[NLA_HDRLEN..len],
            offset: self.offset,
        };

        // The final attribute may arrive without its padding.
        let advance = nla_align(len).min(self.data.len());
        self.data = &self.data[advance..];
        self.offset += advance;

        Some(Ok(attr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attr(kind: u16, payload: &[u8]) -> Vec<u8> {
        let mut buf = NlAttr::new(kind, payload.len()).as_bytes().to_vec();
        buf.extend_from_slice(payload);
        buf.resize(nla_align(buf.len()), 0);
        buf
    }

    #[test]
    fn test_align() {
        assert_eq!(nla_align(0), 0);
        assert_eq!(nla_align(1), 4);
        assert_eq!(nla_align(4), 4);
        assert_eq!(nla_align(5), 8);
    }

    #[test]
    fn test_iter_skips_padding() {
        let mut buf = attr(1, &[7]);
        buf.extend(attr(2, &5u32.to_ne_bytes()));

        let attrs: Vec<_> = AttrIter::new(&buf).collect::<Result<_, _>>().unwrap();
        assert_eq!(attrs.len(), 2);
        assert_eq!(attrs[0].kind(), 1);
        assert_eq!(attrs[0].payload, &[7]);
        assert_eq!(attrs[1].offset, 8);
        assert_eq!(attrs[1].payload, &5u32.to_ne_bytes());
    }

    #[test]
    fn test_flags_masked() {
        let buf = attr(3 | NLA_F_NESTED, &[]);
        let first = AttrIter::new(&buf).next().unwrap().unwrap();
        assert_eq!(first.kind(), 3);
        assert!(first.header.is_nested());
    }

    #[test]
    fn test_short_length_is_error() {
        let buf = [2u8, 0, 1, 0];
        let err = AttrIter::new(&buf).next().unwrap().unwrap_err();
        assert_eq!(err, DecodeError::BadLength { offset: 0, len: 2 });
    }

    #[test]
    fn test_overlong_length_is_error() {
        let mut buf = attr(1, &[1, 2, 3, 4]);
        buf.truncate(6);
        let err = AttrIter::new(&buf).next().unwrap().unwrap_err();
        assert!(matches!(err, DecodeError::Truncated { offset: 0, needed: 8, available: 6 }));
    }

    #[test]
    fn test_trailing_garbage_is_error() {
        let mut buf = attr(1, &[1, 2, 3, 4]);
        buf.extend_from_slice(&[0, 0]);
        let mut iter = AttrIter::with_offset(&buf, 16);
        assert!(iter.next().unwrap().is_ok());
        let err = iter.next().unwrap().unwrap_err();
        assert!(matches!(err, DecodeError::Truncated { offset: 24, .. }));
        assert!(iter.next().is_none());
    }
}
