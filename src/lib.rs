//! Stowage
//!
//! A schema-evolution-aware object codec: objects are serialized and
//! deserialized through a declarative schema table keyed by stable numeric
//! field identifiers, so stored data survives type renames, field
//! reordering, and fields added or removed across versions.
//!
//! ## Features
//!
//! - **Stable Identity**: every value persists under `(generation, field id)`,
//!   never under a name or a declaration position
//! - **Symbolic Type Names**: registered types encode under a storage name
//!   decoupled from the host type path, with recursive support for generics
//! - **Fallback Chain**: a missing key resolves through fallback constructor,
//!   then static default, then the instance's constructed value
//! - **Custom Hooks**: a type can take over its own serialization, and can
//!   observe the moment read-back completes
//! - **Projection**: stored data can be inspected as a plain string-keyed
//!   JSON map without the original type definitions
//!
//! ## Architecture
//!
//! ```text
//! host engine
//! ├── NameBinder ──── name::encode / decode ──── TypeRegistry
//! └── Surrogate ───── write / read walk
//!                      ├── fields::stored_fields
//!                      └── FieldSink / FieldSource (ValueBag)
//! ```

pub mod bag;
pub mod error;
pub mod fields;
pub mod meta;
pub mod name;
pub mod registry;
pub mod surrogate;
pub mod validate;

pub use bag::{Fetch, FieldSink, FieldSource, StorageKey, ValueBag};
pub use error::{
    DecodeError, FieldError, RegistryError, Result, StoreError, ValidationError,
};
pub use fields::{stored_fields, ResolvedField};
pub use meta::{CustomStored, Fallback, Field, LoadCompleted, TypeMeta};
pub use name::{
    decode, encode_type, resolve, type_name_of, BaseName, DecodedType, TypeName,
    REGISTRY_MARKER,
};
pub use registry::{registry, TypeRegistry};
pub use surrogate::{NameBinder, StoreBinder, Surrogate};
pub use validate::{check_all, validate};
