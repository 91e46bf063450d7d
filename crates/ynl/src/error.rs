//! Error types for spec resolution, encoding, decoding and netlink I/O.

use std::fmt;
use std::io;
use std::time::Duration;

use crate::netlink::extack::ExtAck;

/// Result type for ynl operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while using a netlink family.
///
/// Each variant wraps one error class. Spec errors happen once at load
/// time, encode errors before anything is sent, decode and netlink errors
/// while processing replies, transport errors on the socket itself.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The family description is malformed or inconsistent.
    #[error(transparent)]
    Spec(#[from] SpecError),

    /// The request does not match the family description.
    #[error(transparent)]
    Encode(#[from] EncodeError),

    /// Bytes received from the transport could not be decoded.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The kernel answered with an error code.
    #[error(transparent)]
    Netlink(#[from] NlError),

    /// Socket-level failure.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A dump was interrupted by a concurrent change (`NLM_F_DUMP_INTR`).
    #[error("dump of '{op}' interrupted, results are inconsistent")]
    DumpInterrupted {
        /// The operation being dumped.
        op: String,
    },

    /// Multicast group name not known for this family.
    #[error("unknown multicast group: {0}")]
    UnknownGroup(String),
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::Transport(TransportError::Io(err))
    }
}

impl Error {
    /// Check if this is a "not found" error (ENOENT, ENODEV).
    pub fn is_not_found(&self) -> bool {
        matches!(self.errno(), Some(libc::ENOENT) | Some(libc::ENODEV))
    }

    /// Check if this is a permission error (EPERM, EACCES).
    pub fn is_permission_denied(&self) -> bool {
        matches!(self.errno(), Some(libc::EPERM) | Some(libc::EACCES))
    }

    /// Check if this is an "already exists" error (EEXIST).
    pub fn is_already_exists(&self) -> bool {
        self.errno() == Some(libc::EEXIST)
    }

    /// Check if the transport was closed underneath a pending request.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Transport(TransportError::Closed))
    }

    /// Get the errno value if this is a kernel error.
    pub fn errno(&self) -> Option<i32> {
        match self {
            Self::Netlink(err) => Some(err.code),
            _ => None,
        }
    }
}

/// Errors found while resolving a family description.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpecError {
    /// Referenced attribute set does not exist.
    #[error("unknown attribute set: {0}")]
    UnknownAttrSet(String),

    /// Referenced enum or flags definition does not exist.
    #[error("unknown enum: {0}")]
    UnknownEnum(String),

    /// Referenced struct definition does not exist.
    #[error("unknown struct: {0}")]
    UnknownStruct(String),

    /// Referenced sub-message does not exist.
    #[error("unknown sub-message: {0}")]
    UnknownSubMessage(String),

    /// Attribute name not present in a set.
    #[error("attribute set '{set}' has no attribute '{name}'")]
    UnknownAttr {
        /// The attribute set searched.
        set: String,
        /// The missing attribute name.
        name: String,
    },

    /// Operation referenced by another operation does not exist.
    #[error("unknown operation: {0}")]
    UnknownOperation(String),

    /// Attribute type string not recognised.
    #[error("attribute '{attr}' has unsupported type '{ty}'")]
    UnknownType {
        /// The attribute (or struct member) name.
        attr: String,
        /// The type string from the description.
        ty: String,
    },

    /// Enum entry name not present.
    #[error("enum '{enum_name}' has no entry '{entry}'")]
    UnknownEnumEntry {
        /// The enum searched.
        enum_name: String,
        /// The missing entry.
        entry: String,
    },

    /// Value has bits with no flags entry.
    #[error("enum '{enum_name}' has no entries for bits {bits:#x}")]
    UnmappedBits {
        /// The flags enum.
        enum_name: String,
        /// The bits without an entry.
        bits: u64,
    },

    /// Two entries of a (non-flags) enum share a value.
    #[error("enum '{enum_name}' has duplicate value {value}")]
    DuplicateEnumValue {
        /// The enum.
        enum_name: String,
        /// The duplicated value.
        value: u64,
    },

    /// Two attributes share an id with different definitions.
    #[error("attribute set '{set}': id {id} used by '{existing}' and '{new}'")]
    AttrIdConflict {
        /// The attribute set.
        set: String,
        /// The contested id.
        id: u16,
        /// The attribute already registered.
        existing: String,
        /// The conflicting attribute.
        new: String,
    },

    /// Attribute set inheritance forms a cycle.
    #[error("attribute set '{0}' extends itself")]
    InheritanceCycle(String),

    /// Any other inconsistency.
    #[error("invalid family description: {0}")]
    Invalid(String),
}

/// Errors raised while serializing a request.
///
/// A request that fails to encode is never sent.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EncodeError {
    /// Operation name not present in the family.
    #[error("unknown operation: {0}")]
    UnknownOperation(String),

    /// Operation has no `do`/`dump` definition.
    #[error("operation '{op}' does not support {mode}")]
    UnsupportedMode {
        /// The operation.
        op: String,
        /// "do" or "dump".
        mode: &'static str,
    },

    /// Attribute name not present in the governing set.
    #[error("attribute set '{set}' has no attribute '{name}'")]
    UnknownAttr {
        /// The attribute set.
        set: String,
        /// The attribute name supplied by the caller.
        name: String,
    },

    /// Attribute marked required by the operation was not supplied.
    #[error("operation '{op}' requires attribute '{attr}'")]
    MissingAttr {
        /// The operation.
        op: String,
        /// The missing attribute.
        attr: String,
    },

    /// Value kind does not fit the attribute type.
    #[error("attribute '{attr}' expects {expected}, got {found}")]
    TypeMismatch {
        /// The attribute.
        attr: String,
        /// What the spec wants.
        expected: &'static str,
        /// What the caller supplied.
        found: &'static str,
    },

    /// Integer does not fit the wire width.
    #[error("value {value} out of range for attribute '{attr}'")]
    OutOfRange {
        /// The attribute.
        attr: String,
        /// The offending value, rendered.
        value: String,
    },

    /// Sub-message selector attribute missing among siblings.
    #[error("sub-message '{attr}' needs selector '{selector}' to be supplied")]
    MissingSelector {
        /// The sub-message attribute.
        attr: String,
        /// The selector attribute name.
        selector: String,
    },

    /// Selector value has no sub-message format.
    #[error("sub-message '{attr}' has no format for selector value '{value}'")]
    UnknownSelectorValue {
        /// The sub-message attribute.
        attr: String,
        /// The selector value.
        value: String,
    },

    /// Attribute payload exceeds the 16-bit length field.
    #[error("attribute '{attr}' payload of {len} bytes does not fit in a netlink attribute")]
    TooLarge {
        /// The attribute.
        attr: String,
        /// Payload length.
        len: usize,
    },

    /// Enum lookup failed.
    #[error(transparent)]
    Spec(#[from] SpecError),
}

/// Errors raised while parsing bytes received from the transport.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeError {
    /// A header or payload runs past the end of the buffer.
    #[error("truncated at offset {offset}: need {needed} bytes, {available} available")]
    Truncated {
        /// Offset of the offending header.
        offset: usize,
        /// Bytes the header declares or requires.
        needed: usize,
        /// Bytes left in the buffer.
        available: usize,
    },

    /// A length field smaller than its own header.
    #[error("invalid length {len} at offset {offset}")]
    BadLength {
        /// Offset of the offending header.
        offset: usize,
        /// The declared length.
        len: usize,
    },

    /// Scalar payload of the wrong size.
    #[error("attribute '{attr}' payload is {actual} bytes, expected {expected}")]
    Payload {
        /// The attribute.
        attr: String,
        /// Expected payload size.
        expected: usize,
        /// Actual payload size.
        actual: usize,
    },

    /// String attribute is not UTF-8.
    #[error("attribute '{attr}' is not valid UTF-8")]
    InvalidUtf8 {
        /// The attribute.
        attr: String,
    },

    /// Sub-message selector not decoded before the sub-message.
    #[error("sub-message '{attr}' selector '{selector}' not found among decoded attributes")]
    MissingSelector {
        /// The sub-message attribute.
        attr: String,
        /// The selector attribute name.
        selector: String,
    },

    /// Selector value has no sub-message format.
    #[error("sub-message '{attr}' has no format for selector value '{value}'")]
    UnknownSelectorValue {
        /// The sub-message attribute.
        attr: String,
        /// The selector value.
        value: String,
    },

    /// Message type or command not described by the family.
    #[error("no operation for message type {msg_type} (cmd {cmd:?})")]
    UnknownMessage {
        /// The nlmsg_type.
        msg_type: u16,
        /// The genetlink command, if any.
        cmd: Option<u8>,
    },

    /// Description references something that is missing.
    #[error(transparent)]
    Spec(#[from] SpecError),
}

/// Error returned by the kernel in an `NLMSG_ERROR` (or `NLMSG_DONE`) message.
#[derive(Debug, Clone, PartialEq)]
pub struct NlError {
    /// Positive errno value.
    pub code: i32,
    /// Human-readable description of the errno.
    pub message: String,
    /// Extended ACK attributes attached to the error.
    pub extack: ExtAck,
}

impl NlError {
    /// Create from the (negative) error field of a netlink error message.
    pub fn from_errno(error: i32) -> Self {
        let code = error.saturating_abs();
        Self {
            code,
            message: io::Error::from_raw_os_error(code).to_string(),
            extack: ExtAck::default(),
        }
    }

    /// Attach extended ACK information.
    pub fn with_extack(mut self, extack: ExtAck) -> Self {
        self.extack = extack;
        self
    }
}

impl fmt::Display for NlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "netlink error: {} (errno {})", self.message, self.code)?;
        if !self.extack.is_empty() {
            write!(f, ": {}", self.extack)?;
        }
        Ok(())
    }
}

impl std::error::Error for NlError {}

/// Socket-level failures.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// I/O error from socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The transport was closed or abandoned.
    #[error("transport closed")]
    Closed,

    /// No complete reply arrived within the configured timeout.
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}
