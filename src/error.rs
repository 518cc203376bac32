//! Error types for the codec

use thiserror::Error;

/// Result type for codec operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Top-level error carried by every fallible crate operation
#[derive(Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Field(#[from] FieldError),
}

/// Metadata rule violations, raised once per type at registration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("in {type_name}: field id {id} assigned more than once")]
    DuplicateFieldId { type_name: String, id: u32 },

    #[error("in {type_name}: fallback constructor targets id {id} but no field carries that id")]
    OrphanConstructorId { type_name: String, id: u32 },

    #[error("in {type_name}: more than one fallback constructor targets id {id}")]
    DuplicateConstructorId { type_name: String, id: u32 },

    #[error("in {type_name}: field {field} has no accessor binding")]
    UnboundAccessor { type_name: String, field: String },
}

/// Registry misuse or lookup failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("cannot register {type_name}: no storage name declared")]
    NotAnnotated { type_name: String },

    #[error("storage name {name:?} already owned by {existing} (rejected {conflicting})")]
    DuplicateName {
        name: String,
        existing: String,
        conflicting: String,
    },

    #[error("no registry entry for {name}")]
    NotFound { name: String },
}

/// Failure to turn an encoded name back into a type descriptor
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("malformed type name {input:?}: {reason}")]
    MalformedName { input: String, reason: String },

    #[error("type name nests deeper than {max} levels")]
    TooDeep { max: usize },

    #[error("registry has no entry for storage name {0:?}")]
    UnknownRegisteredName(String),

    #[error("host-native name {0:?} did not resolve to a known type")]
    UnresolvedNative(String),
}

/// Per-field failure while moving values through the host channel
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FieldError {
    #[error("corrupt payload at key {key}: {reason}")]
    Corrupt { key: String, reason: String },

    #[error("field {field} of {type_name}: stored value does not match the declared type: {reason}")]
    Mismatch {
        type_name: String,
        field: String,
        reason: String,
    },

    #[error("instance is not a {expected}")]
    NotStorable { expected: &'static str },

    #[error("field {field} has no accessor binding")]
    Unbound { field: String },

    #[error("inheritance chain exceeds {max} generations")]
    ChainTooDeep { max: u32 },
}
