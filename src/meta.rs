//! Declarative per-type metadata
//!
//! Rust has no runtime reflection, so the schema table is built explicitly:
//! the embedding application constructs one [`TypeMeta`] per participating
//! type at startup and hands the batch to the registry. A meta carries the
//! type's storage name, its stored fields with stable numeric ids, fallback
//! constructors for schema evolution, and optional hook bindings that let a
//! type take over its own serialization.

use std::any::{Any, TypeId};
use std::fmt;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::bag::{FieldSink, FieldSource};
use crate::error::FieldError;

pub(crate) type GetFn = Box<dyn Fn(&dyn Any) -> Result<Value, FieldError> + Send + Sync>;
pub(crate) type SetFn = Box<dyn Fn(&mut dyn Any, Value) -> Result<(), FieldError> + Send + Sync>;
pub(crate) type FallbackFn = Box<dyn Fn(&dyn Any) -> Result<Value, FieldError> + Send + Sync>;
pub(crate) type WriteHookFn =
    Box<dyn Fn(&dyn Any, &mut dyn FieldSink) -> Result<(), FieldError> + Send + Sync>;
pub(crate) type ReadHookFn =
    Box<dyn Fn(&mut dyn Any, &dyn FieldSource) -> Result<(), FieldError> + Send + Sync>;
pub(crate) type CompletedFn = Box<dyn Fn(&mut dyn Any) + Send + Sync>;
pub(crate) type ProjectRefFn =
    Box<dyn for<'a> Fn(&'a dyn Any) -> Result<&'a dyn Any, FieldError> + Send + Sync>;
pub(crate) type ProjectMutFn =
    Box<dyn for<'a> Fn(&'a mut dyn Any) -> Result<&'a mut dyn Any, FieldError> + Send + Sync>;

/// Opt-out of generic field walking: the type moves its own values through
/// the channel with a symmetric store/load pair.
pub trait CustomStored: Any {
    fn store(&self, sink: &mut dyn FieldSink) -> Result<(), FieldError>;
    fn load(&mut self, source: &dyn FieldSource) -> Result<(), FieldError>;
}

/// Invoked once after read-back has fully populated the instance.
pub trait LoadCompleted: Any {
    fn load_completed(&mut self);
}

/// One stored field: a stable numeric id plus type-erased accessors bridging
/// the concrete field to the untyped value channel.
///
/// The field name is diagnostic only; it never participates in the storage
/// identity, so fields can be renamed freely between versions.
pub struct Field {
    pub id: u32,
    pub name: &'static str,
    pub default: Option<Value>,
    get: Option<GetFn>,
    set: Option<SetFn>,
}

impl Field {
    /// A field with full accessor bindings.
    pub fn bound<T, V, G, S>(id: u32, name: &'static str, get: G, set: S) -> Self
    where
        T: 'static,
        V: Serialize + DeserializeOwned + 'static,
        G: Fn(&T) -> V + Send + Sync + 'static,
        S: Fn(&mut T, V) + Send + Sync + 'static,
    {
        let get_fn: GetFn = Box::new(move |obj| {
            let obj = obj.downcast_ref::<T>().ok_or(FieldError::NotStorable {
                expected: std::any::type_name::<T>(),
            })?;
            serde_json::to_value(get(obj)).map_err(|e| FieldError::Mismatch {
                type_name: std::any::type_name::<T>().to_string(),
                field: name.to_string(),
                reason: e.to_string(),
            })
        });
        let set_fn: SetFn = Box::new(move |obj, value| {
            let obj = obj.downcast_mut::<T>().ok_or(FieldError::NotStorable {
                expected: std::any::type_name::<T>(),
            })?;
            let typed = serde_json::from_value(value).map_err(|e| FieldError::Mismatch {
                type_name: std::any::type_name::<T>().to_string(),
                field: name.to_string(),
                reason: e.to_string(),
            })?;
            set(obj, typed);
            Ok(())
        });
        Self {
            id,
            name,
            default: None,
            get: Some(get_fn),
            set: Some(set_fn),
        }
    }

    /// A field declared without accessors. Validation rejects it; the variant
    /// exists so a schema stub is representable (and reported) rather than
    /// silently unreachable.
    pub fn declared(id: u32, name: &'static str) -> Self {
        Self {
            id,
            name,
            default: None,
            get: None,
            set: None,
        }
    }

    /// Attach a static default, used when no stored value exists and no
    /// fallback constructor targets this id.
    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn is_bound(&self) -> bool {
        self.get.is_some() && self.set.is_some()
    }

    pub(crate) fn read(&self, obj: &dyn Any) -> Result<Value, FieldError> {
        match &self.get {
            Some(get) => get(obj),
            None => Err(FieldError::Unbound {
                field: self.name.to_string(),
            }),
        }
    }

    pub(crate) fn write(&self, obj: &mut dyn Any, value: Value) -> Result<(), FieldError> {
        match &self.set {
            Some(set) => set(obj, value),
            None => Err(FieldError::Unbound {
                field: self.name.to_string(),
            }),
        }
    }
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("default", &self.default)
            .field("bound", &self.is_bound())
            .finish()
    }
}

/// A fallback constructor: computes a value for field `id` when the stored
/// key is absent. Takes priority over the field's static default. The closure
/// sees the partially populated instance, so it may read sibling fields
/// already set earlier in the walk.
pub struct Fallback {
    pub id: u32,
    pub(crate) call: FallbackFn,
}

impl fmt::Debug for Fallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fallback").field("id", &self.id).finish()
    }
}

/// Link from a type to its embedded base: the parent's identity plus the
/// projections that narrow an instance view to the embedded base value, so
/// the parent generation's accessors see the type they were declared on.
pub(crate) struct ParentLink {
    pub(crate) parent: TypeId,
    pub(crate) project_ref: ProjectRefFn,
    pub(crate) project_mut: ProjectMutFn,
}

/// Schema-table entry for one type.
pub struct TypeMeta {
    type_id: TypeId,
    native_name: &'static str,
    storage_name: Option<String>,
    generic_args: Vec<TypeId>,
    pub(crate) parent: Option<ParentLink>,
    fields: Vec<Field>,
    fallbacks: Vec<Fallback>,
    pub(crate) custom: Option<(WriteHookFn, ReadHookFn)>,
    pub(crate) completed: Option<CompletedFn>,
}

impl TypeMeta {
    /// An annotated type carrying a storage name.
    pub fn of<T: 'static>(storage_name: impl Into<String>) -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            native_name: std::any::type_name::<T>(),
            storage_name: Some(storage_name.into()),
            generic_args: Vec::new(),
            parent: None,
            fields: Vec::new(),
            fallbacks: Vec::new(),
            custom: None,
            completed: None,
        }
    }

    /// An unannotated descriptor: a host-native type that only participates
    /// as a generic argument or an embedded base.
    pub fn native<T: 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            native_name: std::any::type_name::<T>(),
            storage_name: None,
            generic_args: Vec::new(),
            parent: None,
            fields: Vec::new(),
            fallbacks: Vec::new(),
            custom: None,
            completed: None,
        }
    }

    pub fn with_field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    /// Register a fallback constructor for field `id`.
    pub fn with_fallback<T, V, F>(mut self, id: u32, f: F) -> Self
    where
        T: 'static,
        V: Serialize + 'static,
        F: Fn(&T) -> V + Send + Sync + 'static,
    {
        let call: FallbackFn = Box::new(move |obj| {
            let obj = obj.downcast_ref::<T>().ok_or(FieldError::NotStorable {
                expected: std::any::type_name::<T>(),
            })?;
            serde_json::to_value(f(obj)).map_err(|e| FieldError::Mismatch {
                type_name: std::any::type_name::<T>().to_string(),
                field: format!("#{id}"),
                reason: e.to_string(),
            })
        });
        self.fallbacks.push(Fallback { id, call });
        self
    }

    /// Declare the embedded base whose fields continue the chain at the next
    /// generation index. The projections narrow an instance of `T` to its
    /// embedded `B` value; the base generation's accessors run against that
    /// view.
    pub fn extends<T, B, R, M>(mut self, project_ref: R, project_mut: M) -> Self
    where
        T: 'static,
        B: 'static,
        R: Fn(&T) -> &B + Send + Sync + 'static,
        M: Fn(&mut T) -> &mut B + Send + Sync + 'static,
    {
        let by_ref: ProjectRefFn = Box::new(move |obj| {
            let obj = obj.downcast_ref::<T>().ok_or(FieldError::NotStorable {
                expected: std::any::type_name::<T>(),
            })?;
            Ok(project_ref(obj) as &dyn Any)
        });
        let by_mut: ProjectMutFn = Box::new(move |obj| {
            let obj = obj.downcast_mut::<T>().ok_or(FieldError::NotStorable {
                expected: std::any::type_name::<T>(),
            })?;
            Ok(project_mut(obj) as &mut dyn Any)
        });
        self.parent = Some(ParentLink {
            parent: TypeId::of::<B>(),
            project_ref: by_ref,
            project_mut: by_mut,
        });
        self
    }

    /// Append a generic argument descriptor, in declaration order.
    pub fn arg<A: 'static>(mut self) -> Self {
        self.generic_args.push(TypeId::of::<A>());
        self
    }

    /// Bind the custom read/write hook pair of `T`'s [`CustomStored`] impl.
    pub fn custom<T: CustomStored + 'static>(mut self) -> Self {
        let write: WriteHookFn = Box::new(|obj, sink| {
            obj.downcast_ref::<T>()
                .ok_or(FieldError::NotStorable {
                    expected: std::any::type_name::<T>(),
                })?
                .store(sink)
        });
        let read: ReadHookFn = Box::new(|obj, source| {
            obj.downcast_mut::<T>()
                .ok_or(FieldError::NotStorable {
                    expected: std::any::type_name::<T>(),
                })?
                .load(source)
        });
        self.custom = Some((write, read));
        self
    }

    /// Bind `T`'s [`LoadCompleted`] impl as the post-read hook.
    pub fn on_loaded<T: LoadCompleted + 'static>(mut self) -> Self {
        self.completed = Some(Box::new(|obj| {
            if let Some(obj) = obj.downcast_mut::<T>() {
                obj.load_completed();
            }
        }));
        self
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn native_name(&self) -> &'static str {
        self.native_name
    }

    pub fn storage_name(&self) -> Option<&str> {
        self.storage_name.as_deref()
    }

    pub fn generic_args(&self) -> &[TypeId] {
        &self.generic_args
    }

    pub fn parent(&self) -> Option<TypeId> {
        self.parent.as_ref().map(|link| link.parent)
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn fallbacks(&self) -> &[Fallback] {
        &self.fallbacks
    }

    pub fn is_generic(&self) -> bool {
        !self.generic_args.is_empty()
    }

    pub fn arity(&self) -> usize {
        self.generic_args.len()
    }

    pub fn has_custom_hooks(&self) -> bool {
        self.custom.is_some()
    }

    /// Name used in diagnostics: the storage name when present, the
    /// host-native path otherwise.
    pub fn describe(&self) -> &str {
        self.storage_name().unwrap_or(self.native_name)
    }
}

impl fmt::Debug for TypeMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeMeta")
            .field("native_name", &self.native_name)
            .field("storage_name", &self.storage_name)
            .field("arity", &self.arity())
            .field("fields", &self.fields)
            .field("fallbacks", &self.fallbacks)
            .field("custom", &self.custom.is_some())
            .field("completed", &self.completed.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Default)]
    struct Point {
        x: i32,
        y: i32,
    }

    fn point_meta() -> TypeMeta {
        TypeMeta::of::<Point>("R_POINT")
            .with_field(Field::bound(0, "x", |p: &Point| p.x, |p: &mut Point, v| p.x = v))
            .with_field(
                Field::bound(1, "y", |p: &Point| p.y, |p: &mut Point, v| p.y = v)
                    .default_value(json!(123)),
            )
    }

    #[test]
    fn test_accessor_bridge() {
        let meta = point_meta();
        let mut p = Point { x: 7, y: 0 };

        let v = meta.fields()[0].read(&p).unwrap();
        assert_eq!(v, json!(7));

        meta.fields()[1].write(&mut p, json!(9)).unwrap();
        assert_eq!(p.y, 9);
    }

    #[test]
    fn test_accessor_rejects_wrong_instance() {
        let meta = point_meta();
        let not_a_point = String::from("nope");
        let err = meta.fields()[0].read(&not_a_point).unwrap_err();
        assert!(matches!(err, FieldError::NotStorable { .. }));
    }

    #[test]
    fn test_set_rejects_mismatched_value() {
        let meta = point_meta();
        let mut p = Point::default();
        let err = meta.fields()[0].write(&mut p, json!("a string")).unwrap_err();
        assert!(matches!(err, FieldError::Mismatch { .. }));
    }

    #[test]
    fn test_declared_field_is_unbound() {
        let field = Field::declared(3, "stub");
        assert!(!field.is_bound());
        let p = Point::default();
        assert!(matches!(field.read(&p), Err(FieldError::Unbound { .. })));
    }

    #[test]
    fn test_describe_prefers_storage_name() {
        assert_eq!(point_meta().describe(), "R_POINT");
        assert!(TypeMeta::native::<i32>().describe().contains("i32"));
    }
}
