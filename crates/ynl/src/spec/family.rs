//! Family resolution: turning a [`FamilyDesc`] into a checked [`SpecFamily`].

use std::collections::{HashMap, HashSet};

use super::attr::{AttrType, SpecAttr, SpecAttrSet};
use super::desc::{
    AttrSetDesc, DefinitionKind, FamilyDesc, OpModeDesc, OpMsgDesc, OperationDesc, ProtocolKind,
};
use super::enums::SpecEnumSet;
use super::structs::SpecStruct;
use super::submsg::SpecSubMessage;
use crate::error::SpecError;
use crate::netlink::Netlink;

/// Attribute list of one direction of an operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpecOpMessage {
    /// Attributes the message may carry.
    pub attributes: Vec<String>,
    /// Attributes the caller must supply.
    pub required: Vec<String>,
}

impl SpecOpMessage {
    fn from_desc(desc: &OpMsgDesc) -> Self {
        Self {
            attributes: desc.attributes.clone(),
            required: desc.required.clone(),
        }
    }
}

/// Request mode of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpMode {
    /// Single request, single (optional) reply.
    Do,
    /// Request answered by a multi-part dump.
    Dump,
}

impl OpMode {
    /// Mode name as used in descriptions.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Do => "do",
            Self::Dump => "dump",
        }
    }
}

/// A resolved operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecOperation {
    pub name: String,
    /// Command id (genetlink) or message type (raw) of requests.
    pub value: u32,
    /// Command id or message type of replies.
    pub rsp_value: u32,
    pub attribute_set: Option<String>,
    pub fixed_header: Option<String>,
    pub do_request: Option<SpecOpMessage>,
    pub do_reply: Option<SpecOpMessage>,
    pub dump_request: Option<SpecOpMessage>,
    pub dump_reply: Option<SpecOpMessage>,
    /// Operation whose reply this notification mirrors.
    pub notify: Option<String>,
    pub event: Option<SpecOpMessage>,
    pub mcgrp: Option<String>,
}

impl SpecOperation {
    /// Check if the operation supports `do`.
    pub fn is_do(&self) -> bool {
        self.do_request.is_some()
    }

    /// Check if the operation supports `dump`.
    pub fn is_dump(&self) -> bool {
        self.dump_request.is_some()
    }

    /// Check if the operation is a notification or event.
    pub fn is_ntf(&self) -> bool {
        self.notify.is_some() || self.event.is_some()
    }

    /// Request layout for a mode.
    pub fn request(&self, mode: OpMode) -> Option<&SpecOpMessage> {
        match mode {
            OpMode::Do => self.do_request.as_ref(),
            OpMode::Dump => self.dump_request.as_ref(),
        }
    }

    /// Reply layout for a mode.
    pub fn reply(&self, mode: OpMode) -> Option<&SpecOpMessage> {
        match mode {
            OpMode::Do => self.do_reply.as_ref(),
            OpMode::Dump => self.dump_reply.as_ref(),
        }
    }
}

/// A multicast group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecMcastGroup {
    pub name: String,
    /// Static id; generic netlink groups are resolved at runtime.
    pub value: Option<u32>,
}

/// A fully resolved netlink family.
///
/// Built once with [`resolve`](Self::resolve) and immutable afterwards;
/// share it between clients through an `Arc`.
#[derive(Debug, Clone)]
pub struct SpecFamily {
    name: String,
    protocol: ProtocolKind,
    protonum: u32,
    version: u8,
    enums: HashMap<String, SpecEnumSet>,
    structs: HashMap<String, SpecStruct>,
    attr_sets: HashMap<String, SpecAttrSet>,
    sub_msgs: HashMap<String, SpecSubMessage>,
    ops: Vec<SpecOperation>,
    ops_by_name: HashMap<String, usize>,
    rsp_by_value: HashMap<u32, usize>,
    ntf_by_value: HashMap<u32, usize>,
    mcast_groups: Vec<SpecMcastGroup>,
}

impl SpecFamily {
    /// Resolve and validate a family description.
    pub fn resolve(desc: &FamilyDesc) -> Result<Self, SpecError> {
        if desc.name.is_empty() {
            return Err(SpecError::Invalid("family has no name".into()));
        }

        let protonum = match (desc.protocol, desc.protonum) {
            (_, Some(protonum)) => protonum,
            (ProtocolKind::NetlinkRaw, None) => {
                return Err(SpecError::Invalid(format!(
                    "netlink-raw family '{}' needs a protonum",
                    desc.name
                )));
            }
            (_, None) => Netlink::NETLINK_GENERIC,
        };

        let mut enums = HashMap::new();
        let mut structs = HashMap::new();
        for def in &desc.definitions {
            let duplicate = match def.kind {
                DefinitionKind::Const => false,
                DefinitionKind::Enum | DefinitionKind::Flags => enums
                    .insert(def.name.clone(), SpecEnumSet::from_desc(def)?)
                    .is_some(),
                DefinitionKind::Struct => structs
                    .insert(def.name.clone(), SpecStruct::from_desc(def)?)
                    .is_some(),
            };
            if duplicate {
                return Err(SpecError::Invalid(format!(
                    "definition '{}' declared twice",
                    def.name
                )));
            }
        }

        let attr_sets = resolve_attr_sets(&desc.attribute_sets)?;

        let mut sub_msgs = HashMap::new();
        for msg in &desc.sub_messages {
            if sub_msgs
                .insert(msg.name.clone(), SpecSubMessage::from_desc(msg)?)
                .is_some()
            {
                return Err(SpecError::Invalid(format!(
                    "sub-message '{}' declared twice",
                    msg.name
                )));
            }
        }

        let mut family = Self {
            name: desc.name.clone(),
            protocol: desc.protocol,
            protonum,
            version: desc.version.unwrap_or(1),
            enums,
            structs,
            attr_sets,
            sub_msgs,
            ops: Vec::new(),
            ops_by_name: HashMap::new(),
            rsp_by_value: HashMap::new(),
            ntf_by_value: HashMap::new(),
            mcast_groups: desc
                .mcast_groups
                .list
                .iter()
                .map(|g| SpecMcastGroup {
                    name: g.name.clone(),
                    value: g.value,
                })
                .collect(),
        };

        family.resolve_ops(desc)?;
        family.validate()?;

        tracing::debug!(
            family = %family.name,
            attr_sets = family.attr_sets.len(),
            ops = family.ops.len(),
            "resolved family"
        );

        Ok(family)
    }

    /// Parse and resolve a JSON family description.
    #[cfg(feature = "serde")]
    pub fn from_json(text: &str) -> Result<Self, SpecError> {
        Self::resolve(&FamilyDesc::from_json(text)?)
    }

    fn resolve_ops(&mut self, desc: &FamilyDesc) -> Result<(), SpecError> {
        let default_header = desc.operations.fixed_header.clone();
        let mut next = 1u32;

        for op in &desc.operations.list {
            let value = op.value.unwrap_or(next);
            next = value.saturating_add(1);

            let resolved = self.resolve_op(op, value, default_header.clone());
            let idx = self.ops.len();
            if self.ops_by_name.insert(op.name.clone(), idx).is_some() {
                return Err(SpecError::Invalid(format!(
                    "operation '{}' declared twice",
                    op.name
                )));
            }
            if resolved.is_ntf() {
                self.ntf_by_value.entry(resolved.rsp_value).or_insert(idx);
            } else {
                self.rsp_by_value.entry(resolved.rsp_value).or_insert(idx);
            }
            self.ops.push(resolved);
        }

        // Notifications take their layout from the operation they mirror.
        for idx in 0..self.ops.len() {
            let Some(target) = self.ops[idx].notify.clone() else {
                continue;
            };
            let &target_idx = self
                .ops_by_name
                .get(&target)
                .ok_or_else(|| SpecError::UnknownOperation(target.clone()))?;
            let source = &self.ops[target_idx];
            let attribute_set = source.attribute_set.clone();
            let fixed_header = source.fixed_header.clone();
            let reply = source.do_reply.clone().or_else(|| source.dump_reply.clone());
            let op = &mut self.ops[idx];
            if op.attribute_set.is_none() {
                op.attribute_set = attribute_set;
            }
            if op.fixed_header.is_none() {
                op.fixed_header = fixed_header;
            }
            if op.event.is_none() {
                op.event = reply;
            }
        }

        Ok(())
    }

    fn resolve_op(&self, op: &OperationDesc, value: u32, default_header: Option<String>) -> SpecOperation {
        let mode = |m: &Option<OpModeDesc>| {
            m.as_ref().map(|m| {
                (
                    m.request.as_ref().map(SpecOpMessage::from_desc).unwrap_or_default(),
                    m.reply.as_ref().map(SpecOpMessage::from_desc),
                    m.request.as_ref().and_then(|r| r.value),
                    m.reply.as_ref().and_then(|r| r.value),
                )
            })
        };
        let do_mode = mode(&op.do_);
        let dump_mode = mode(&op.dump);

        // Raw families may use distinct message types per direction.
        let req_value = do_mode
            .as_ref()
            .and_then(|m| m.2)
            .or_else(|| dump_mode.as_ref().and_then(|m| m.2))
            .unwrap_or(value);
        let rsp_value = do_mode
            .as_ref()
            .and_then(|m| m.3)
            .or_else(|| dump_mode.as_ref().and_then(|m| m.3))
            .unwrap_or(req_value);

        let (do_request, do_reply) = match do_mode {
            Some((req, rsp, _, _)) => (Some(req), rsp),
            None => (None, None),
        };
        let (dump_request, dump_reply) = match dump_mode {
            Some((req, rsp, _, _)) => (Some(req), rsp),
            None => (None, None),
        };

        SpecOperation {
            name: op.name.clone(),
            value: req_value,
            rsp_value,
            attribute_set: op.attribute_set.clone(),
            fixed_header: op.fixed_header.clone().or(default_header),
            do_request,
            do_reply,
            dump_request,
            dump_reply,
            notify: op.notify.clone(),
            event: op.event.as_ref().map(SpecOpMessage::from_desc),
            mcgrp: op.mcgrp.clone(),
        }
    }

    /// Check every cross reference in the resolved model.
    fn validate(&self) -> Result<(), SpecError> {
        for set in self.attr_sets.values() {
            for attr in set.attrs() {
                self.validate_attr(attr)?;
            }
        }

        for st in self.structs.values() {
            for member in st.members() {
                if let Some(name) = &member.enum_name {
                    self.need_enum(name)?;
                }
            }
        }

        for msg in self.sub_msgs.values() {
            for format in msg.formats() {
                if let Some(set) = &format.attribute_set {
                    self.need_attr_set(set)?;
                }
                if let Some(header) = &format.fixed_header {
                    self.need_struct(header)?;
                }
            }
        }

        for op in &self.ops {
            if let Some(header) = &op.fixed_header {
                self.need_struct(header)?;
            }
            let messages = [
                &op.do_request,
                &op.do_reply,
                &op.dump_request,
                &op.dump_reply,
                &op.event,
            ];
            let Some(set_name) = &op.attribute_set else {
                if messages
                    .iter()
                    .filter_map(|m| m.as_ref())
                    .any(|m| !m.attributes.is_empty())
                {
                    return Err(SpecError::Invalid(format!(
                        "operation '{}' lists attributes but has no attribute set",
                        op.name
                    )));
                }
                continue;
            };
            let set = self.need_attr_set(set_name)?;
            for msg in messages.into_iter().flatten() {
                for name in msg.attributes.iter().chain(&msg.required) {
                    if set.get(name).is_none() {
                        return Err(SpecError::UnknownAttr {
                            set: set_name.clone(),
                            name: name.clone(),
                        });
                    }
                }
            }
        }

        Ok(())
    }

    fn validate_attr(&self, attr: &SpecAttr) -> Result<(), SpecError> {
        if let Some(set) = attr.ty.nested_set() {
            self.need_attr_set(set)?;
        }
        match &attr.ty {
            AttrType::Binary {
                struct_name: Some(name),
            } => {
                self.need_struct(name)?;
            }
            AttrType::SubMessage { name, .. } => {
                self.need_sub_message(name)?;
            }
            _ => {}
        }
        if let Some(name) = &attr.enum_name {
            self.need_enum(name)?;
        }
        Ok(())
    }

    /// Family name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Protocol flavour.
    pub fn protocol(&self) -> ProtocolKind {
        self.protocol
    }

    /// Check if messages carry a generic netlink header.
    pub fn is_genetlink(&self) -> bool {
        self.protocol.is_genetlink()
    }

    /// Netlink protocol number of the socket.
    pub fn protonum(&self) -> u32 {
        self.protonum
    }

    /// Generic netlink version used in requests.
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Look up an enum.
    pub fn enum_set(&self, name: &str) -> Option<&SpecEnumSet> {
        self.enums.get(name)
    }

    /// Look up a struct.
    pub fn struct_def(&self, name: &str) -> Option<&SpecStruct> {
        self.structs.get(name)
    }

    /// Look up an attribute set.
    pub fn attr_set(&self, name: &str) -> Option<&SpecAttrSet> {
        self.attr_sets.get(name)
    }

    /// Look up a sub-message.
    pub fn sub_message(&self, name: &str) -> Option<&SpecSubMessage> {
        self.sub_msgs.get(name)
    }

    /// Look up an operation by name.
    pub fn operation(&self, name: &str) -> Option<&SpecOperation> {
        self.ops_by_name.get(name).map(|&idx| &self.ops[idx])
    }

    /// Operations in declaration order.
    pub fn operations(&self) -> &[SpecOperation] {
        &self.ops
    }

    /// Request/response operation whose replies carry `value`.
    pub fn op_by_rsp_value(&self, value: u32) -> Option<&SpecOperation> {
        self.rsp_by_value.get(&value).map(|&idx| &self.ops[idx])
    }

    /// Notification carrying `value`.
    pub fn ntf_by_value(&self, value: u32) -> Option<&SpecOperation> {
        self.ntf_by_value.get(&value).map(|&idx| &self.ops[idx])
    }

    /// Multicast groups.
    pub fn mcast_groups(&self) -> &[SpecMcastGroup] {
        &self.mcast_groups
    }

    /// Look up a multicast group.
    pub fn mcast_group(&self, name: &str) -> Option<&SpecMcastGroup> {
        self.mcast_groups.iter().find(|g| g.name == name)
    }

    pub(crate) fn need_attr_set(&self, name: &str) -> Result<&SpecAttrSet, SpecError> {
        self.attr_set(name)
            .ok_or_else(|| SpecError::UnknownAttrSet(name.to_string()))
    }

    pub(crate) fn need_enum(&self, name: &str) -> Result<&SpecEnumSet, SpecError> {
        self.enum_set(name)
            .ok_or_else(|| SpecError::UnknownEnum(name.to_string()))
    }

    pub(crate) fn need_struct(&self, name: &str) -> Result<&SpecStruct, SpecError> {
        self.struct_def(name)
            .ok_or_else(|| SpecError::UnknownStruct(name.to_string()))
    }

    pub(crate) fn need_sub_message(&self, name: &str) -> Result<&SpecSubMessage, SpecError> {
        self.sub_message(name)
            .ok_or_else(|| SpecError::UnknownSubMessage(name.to_string()))
    }
}

/// Flatten all attribute sets.
///
/// Full sets are resolved first, following `extends` depth-first; subsets
/// then copy their attributes from the resolved parent.
fn resolve_attr_sets(descs: &[AttrSetDesc]) -> Result<HashMap<String, SpecAttrSet>, SpecError> {
    let mut by_name = HashMap::with_capacity(descs.len());
    for desc in descs {
        if by_name.insert(desc.name.as_str(), desc).is_some() {
            return Err(SpecError::Invalid(format!(
                "attribute set '{}' declared twice",
                desc.name
            )));
        }
    }

    let mut resolved = HashMap::with_capacity(descs.len());
    for desc in descs.iter().filter(|d| d.subset_of.is_none()) {
        resolve_full_set(&desc.name, &by_name, &mut resolved, &mut Vec::new())?;
    }

    for desc in descs {
        let Some(parent_name) = &desc.subset_of else {
            continue;
        };
        let parent = resolved
            .get(parent_name.as_str())
            .ok_or_else(|| SpecError::UnknownAttrSet(parent_name.clone()))?;
        let mut set = SpecAttrSet::new(&desc.name);
        set.set_subset_of(parent_name);
        for attr in &desc.attributes {
            let base = parent.get(&attr.name).ok_or_else(|| SpecError::UnknownAttr {
                set: parent_name.clone(),
                name: attr.name.clone(),
            })?;
            set.insert(base.clone())?;
        }
        resolved.insert(desc.name.clone(), set);
    }

    Ok(resolved)
}

fn resolve_full_set<'a>(
    name: &'a str,
    descs: &HashMap<&'a str, &'a AttrSetDesc>,
    done: &mut HashMap<String, SpecAttrSet>,
    stack: &mut Vec<&'a str>,
) -> Result<(), SpecError> {
    if done.contains_key(name) {
        return Ok(());
    }
    if stack.contains(&name) {
        return Err(SpecError::InheritanceCycle(name.to_string()));
    }
    let desc = descs
        .get(name)
        .ok_or_else(|| SpecError::UnknownAttrSet(name.to_string()))?;
    if desc.subset_of.is_some() {
        return Err(SpecError::Invalid(format!(
            "attribute set '{}' cannot be extended, it is a subset",
            name
        )));
    }

    let mut set = SpecAttrSet::new(name);
    let inherited = match desc.extends.as_deref() {
        Some(parent) => {
            stack.push(name);
            resolve_full_set(parent, descs, done, stack)?;
            stack.pop();
            let parent = done
                .get(parent)
                .ok_or_else(|| SpecError::UnknownAttrSet(parent.to_string()))?;
            for attr in parent.attrs() {
                set.insert(attr.clone())?;
            }
            true
        }
        None => false,
    };

    let mut own = HashSet::new();
    let mut next = 1u16;
    for attr in &desc.attributes {
        let value = attr.value.unwrap_or(next);
        if value > Netlink::NLA_TYPE_MASK {
            return Err(SpecError::Invalid(format!(
                "attribute '{}' id {} exceeds the attribute type range",
                attr.name, value
            )));
        }
        if !own.insert(value) {
            return Err(SpecError::AttrIdConflict {
                set: name.to_string(),
                id: value,
                existing: set
                    .by_id(value)
                    .map(|a| a.name.clone())
                    .unwrap_or_default(),
                new: attr.name.clone(),
            });
        }
        let resolved = SpecAttr::from_desc(attr, value)?;
        if inherited {
            set.override_with(resolved)?;
        } else {
            set.insert(resolved)?;
        }
        next = value + 1;
    }

    done.insert(name.to_string(), set);
    Ok(())
}
