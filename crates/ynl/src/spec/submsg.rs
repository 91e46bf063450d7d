//! Sub-messages: nests whose layout is picked by a sibling attribute.

use std::collections::HashMap;

use super::desc::SubMessageDesc;
use crate::error::SpecError;

/// Layout of one sub-message variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecSubMessageFormat {
    /// Selector value choosing this format.
    pub value: String,
    /// Attribute set of the payload.
    pub attribute_set: Option<String>,
    /// Struct preceding the attributes.
    pub fixed_header: Option<String>,
}

/// A sub-message definition.
///
/// Formats are keyed by the selector value rendered as a string, which is
/// the enum entry name for enum selectors and the decimal value otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecSubMessage {
    name: String,
    formats: HashMap<String, SpecSubMessageFormat>,
}

impl SpecSubMessage {
    /// Resolve a sub-message description.
    pub fn from_desc(desc: &SubMessageDesc) -> Result<Self, SpecError> {
        let mut formats = HashMap::with_capacity(desc.formats.len());
        for format in &desc.formats {
            let resolved = SpecSubMessageFormat {
                value: format.value.clone(),
                attribute_set: format.attribute_set.clone(),
                fixed_header: format.fixed_header.clone(),
            };
            if formats.insert(format.value.clone(), resolved).is_some() {
                return Err(SpecError::Invalid(format!(
                    "sub-message '{}' declares format '{}' twice",
                    desc.name, format.value
                )));
            }
        }
        Ok(Self {
            name: desc.name.clone(),
            formats,
        })
    }

    /// Sub-message name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Format for a selector value.
    pub fn format(&self, value: &str) -> Option<&SpecSubMessageFormat> {
        self.formats.get(value)
    }

    /// All formats, in no particular order.
    pub fn formats(&self) -> impl Iterator<Item = &SpecSubMessageFormat> {
        self.formats.values()
    }
}
