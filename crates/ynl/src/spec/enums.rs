//! Enum and flags definitions.

use std::collections::HashMap;

use super::desc::{DefinitionDesc, DefinitionKind};
use crate::error::SpecError;

/// One named value of an enum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecEnumEntry {
    /// Entry name.
    pub name: String,
    /// Value, or bit position for flags.
    pub value: u64,
    /// Documentation.
    pub doc: Option<String>,
}

impl SpecEnumEntry {
    /// Bit mask of this entry when the enum is used as flags.
    pub fn mask(&self) -> u64 {
        1u64 << self.value
    }
}

/// A named enumeration.
///
/// Entries of a `flags` definition are bit positions; any enum can also be
/// used as flags by an attribute that declares `enum-as-flags`.
#[derive(Debug, Clone)]
pub struct SpecEnumSet {
    name: String,
    flags: bool,
    entries: Vec<SpecEnumEntry>,
    by_name: HashMap<String, usize>,
    by_value: HashMap<u64, usize>,
}

impl SpecEnumSet {
    /// Resolve an enum or flags definition.
    ///
    /// Values start at `value-start` (default 0) and each entry without an
    /// explicit value takes the previous value plus one.
    pub fn from_desc(desc: &DefinitionDesc) -> Result<Self, SpecError> {
        let flags = match desc.kind {
            DefinitionKind::Enum => false,
            DefinitionKind::Flags => true,
            other => {
                return Err(SpecError::Invalid(format!(
                    "definition '{}' of kind {:?} is not an enum",
                    desc.name, other
                )));
            }
        };

        let mut set = Self {
            name: desc.name.clone(),
            flags,
            entries: Vec::with_capacity(desc.entries.len()),
            by_name: HashMap::new(),
            by_value: HashMap::new(),
        };

        let mut next = desc.value_start.unwrap_or(0);
        for entry in &desc.entries {
            let value = entry.value().unwrap_or(next);
            if flags && value >= 64 {
                return Err(SpecError::Invalid(format!(
                    "flags '{}' entry '{}' has bit {} beyond 63",
                    desc.name,
                    entry.name(),
                    value
                )));
            }
            set.push(SpecEnumEntry {
                name: entry.name().to_string(),
                value,
                doc: entry.doc().map(str::to_string),
            })?;
            next = value.saturating_add(1);
        }

        Ok(set)
    }

    fn push(&mut self, entry: SpecEnumEntry) -> Result<(), SpecError> {
        if self.by_name.contains_key(&entry.name) {
            return Err(SpecError::Invalid(format!(
                "enum '{}' declares '{}' twice",
                self.name, entry.name
            )));
        }
        if !self.flags && self.by_value.contains_key(&entry.value) {
            return Err(SpecError::DuplicateEnumValue {
                enum_name: self.name.clone(),
                value: entry.value,
            });
        }
        let idx = self.entries.len();
        self.by_name.insert(entry.name.clone(), idx);
        self.by_value.entry(entry.value).or_insert(idx);
        self.entries.push(entry);
        Ok(())
    }

    /// Enum name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Check if this is a `flags` definition.
    pub fn is_flags(&self) -> bool {
        self.flags
    }

    /// Entries in declaration order.
    pub fn entries(&self) -> &[SpecEnumEntry] {
        &self.entries
    }

    /// Look up an entry by name.
    pub fn entry(&self, name: &str) -> Option<&SpecEnumEntry> {
        self.by_name.get(name).map(|&idx| &self.entries[idx])
    }

    /// Value of the named entry.
    pub fn value_of(&self, name: &str) -> Result<u64, SpecError> {
        self.entry(name)
            .map(|e| e.value)
            .ok_or_else(|| SpecError::UnknownEnumEntry {
                enum_name: self.name.clone(),
                entry: name.to_string(),
            })
    }

    /// Name of the entry with the given value.
    pub fn name_of(&self, value: u64) -> Option<&str> {
        self.by_value
            .get(&value)
            .map(|&idx| self.entries[idx].name.as_str())
    }

    /// Union of the masks of the named entries.
    pub fn encode_flags<I, S>(&self, names: I) -> Result<u64, SpecError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        names.into_iter().try_fold(0u64, |acc, name| {
            let name = name.as_ref();
            let entry = self.entry(name).ok_or_else(|| SpecError::UnknownEnumEntry {
                enum_name: self.name.clone(),
                entry: name.to_string(),
            })?;
            Ok(acc | entry.mask())
        })
    }

    /// Split a bit mask into entry names and the bits no entry covers.
    pub fn decode_flags(&self, bits: u64) -> (Vec<String>, u64) {
        let mut names = Vec::new();
        let mut residual = bits;
        for entry in &self.entries {
            if residual & entry.mask() != 0 {
                names.push(entry.name.clone());
                residual &= !entry.mask();
            }
        }
        (names, residual)
    }

    /// Like [`decode_flags`](Self::decode_flags) but fails on unmapped bits.
    pub fn decode_flags_strict(&self, bits: u64) -> Result<Vec<String>, SpecError> {
        match self.decode_flags(bits) {
            (names, 0) => Ok(names),
            (_, residual) => Err(SpecError::UnmappedBits {
                enum_name: self.name.clone(),
                bits: residual,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::desc::EnumEntryDesc;

    fn entries(names: &[&str]) -> Vec<EnumEntryDesc> {
        names.iter().map(|n| EnumEntryDesc::named(*n)).collect()
    }

    fn five_flags() -> SpecEnumSet {
        SpecEnumSet::from_desc(&DefinitionDesc::flags(
            "feat",
            entries(&["a", "b", "c", "d", "e"]),
        ))
        .unwrap()
    }

    #[test]
    fn test_enum_values() {
        let desc = DefinitionDesc::enumeration(
            "state",
            vec![
                EnumEntryDesc::named("down"),
                EnumEntryDesc::named("up"),
                EnumEntryDesc::valued("testing", 10),
                EnumEntryDesc::named("dormant"),
            ],
        );
        let set = SpecEnumSet::from_desc(&desc).unwrap();
        assert_eq!(set.value_of("down").unwrap(), 0);
        assert_eq!(set.value_of("up").unwrap(), 1);
        assert_eq!(set.value_of("dormant").unwrap(), 11);
        assert_eq!(set.name_of(10), Some("testing"));
        assert_eq!(set.name_of(2), None);
        assert!(!set.is_flags());
    }

    #[test]
    fn test_value_start() {
        let desc = DefinitionDesc::enumeration("x", entries(&["one", "two"])).value_start(1);
        let set = SpecEnumSet::from_desc(&desc).unwrap();
        assert_eq!(set.value_of("one").unwrap(), 1);
        assert_eq!(set.value_of("two").unwrap(), 2);
    }

    #[test]
    fn test_unknown_name() {
        let set = five_flags();
        let err = set.value_of("z").unwrap_err();
        assert!(matches!(err, SpecError::UnknownEnumEntry { .. }));
        assert!(set.encode_flags(["a", "z"]).is_err());
    }

    #[test]
    fn test_duplicate_value() {
        let desc = DefinitionDesc::enumeration(
            "dup",
            vec![EnumEntryDesc::valued("a", 1), EnumEntryDesc::valued("b", 1)],
        );
        assert!(matches!(
            SpecEnumSet::from_desc(&desc).unwrap_err(),
            SpecError::DuplicateEnumValue { value: 1, .. }
        ));
    }

    #[test]
    fn test_flags_all_subsets() {
        let set = five_flags();
        let names = ["a", "b", "c", "d", "e"];
        for mask in 0u32..32 {
            let subset: Vec<&str> = names
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) != 0)
                .map(|(_, n)| *n)
                .collect();
            let bits = set.encode_flags(&subset).unwrap();
            assert_eq!(bits, mask as u64);
            let (decoded, residual) = set.decode_flags(bits);
            assert_eq!(decoded, subset);
            assert_eq!(residual, 0);
        }
    }

    #[test]
    fn test_flags_residual() {
        let set = five_flags();
        let (names, residual) = set.decode_flags(0b1_0000_0011);
        assert_eq!(names, ["a", "b"]);
        assert_eq!(residual, 0b1_0000_0000);

        let err = set.decode_flags_strict(0b1_0000_0011).unwrap_err();
        assert_eq!(
            err,
            SpecError::UnmappedBits {
                enum_name: "feat".into(),
                bits: 0x100
            }
        );
        assert_eq!(set.decode_flags_strict(0b101).unwrap(), ["a", "c"]);
    }

    #[test]
    fn test_flags_bit_too_large() {
        let desc = DefinitionDesc::flags("big", vec![EnumEntryDesc::valued("x", 64)]);
        assert!(SpecEnumSet::from_desc(&desc).is_err());
    }

    #[test]
    fn test_struct_is_not_enum() {
        let desc = DefinitionDesc::structure("s", vec![]);
        assert!(SpecEnumSet::from_desc(&desc).is_err());
    }
}
