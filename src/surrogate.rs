//! Object-Graph Binding
//!
//! Moves one instance's field values through the host channel. The write
//! path walks the inheritance chain from the most-derived type upward and
//! deposits every stored field under its `(generation, id)` key. The read
//! path walks identically, resolving an absent key through the fallback
//! chain: fallback constructor first, then static default, then the value
//! the instance was constructed with. A type that binds custom hooks skips
//! the generic walk entirely.
//!
//! At each step up the chain the instance view is narrowed through the
//! child's projection, so every generation's accessors and fallback
//! constructors run against the type they were declared on.

use std::any::Any;
use std::sync::Arc;

use tracing::trace;

use crate::bag::{Fetch, FieldSink, FieldSource, StorageKey};
use crate::error::{FieldError, RegistryError, Result};
use crate::fields::stored_fields;
use crate::meta::TypeMeta;
use crate::name::{decode, encode_type, DecodedType};
use crate::registry::TypeRegistry;

/// Guard against corrupted parent links; no sane type hierarchy gets close.
const MAX_GENERATIONS: u32 = 64;

/// Host hookpoint: bind a type to its encoded name and back.
pub trait NameBinder {
    fn bind_to_name(&self, instance: &dyn Any) -> Result<String>;
    fn bind_to_type(&self, name: &str) -> Result<DecodedType>;
}

/// Registry-backed [`NameBinder`].
pub struct StoreBinder<'r> {
    registry: &'r TypeRegistry,
}

impl<'r> StoreBinder<'r> {
    pub fn new(registry: &'r TypeRegistry) -> Self {
        Self { registry }
    }
}

impl NameBinder for StoreBinder<'_> {
    fn bind_to_name(&self, instance: &dyn Any) -> Result<String> {
        encode_type(self.registry, instance.type_id())
    }

    fn bind_to_type(&self, name: &str) -> Result<DecodedType> {
        Ok(decode(name, self.registry)?)
    }
}

/// Per-instance value surrogate the host engine invokes for each object it
/// encounters.
pub struct Surrogate<'r> {
    registry: &'r TypeRegistry,
}

impl<'r> Surrogate<'r> {
    pub fn new(registry: &'r TypeRegistry) -> Self {
        Self { registry }
    }

    fn meta_for(&self, instance: &dyn Any) -> Result<Arc<TypeMeta>> {
        self.registry.lookup_id(instance.type_id()).ok_or_else(|| {
            RegistryError::NotFound {
                name: format!("{:?}", instance.type_id()),
            }
            .into()
        })
    }

    fn parent_meta(&self, meta: &TypeMeta) -> Result<Arc<TypeMeta>> {
        let parent_id = meta.parent().ok_or_else(|| RegistryError::NotFound {
            name: format!("parent of {}", meta.describe()),
        })?;
        self.registry.lookup_id(parent_id).ok_or_else(|| {
            RegistryError::NotFound {
                name: format!("parent of {}", meta.describe()),
            }
            .into()
        })
    }

    /// Write every stored field of `instance` into the sink.
    pub fn write(&self, instance: &dyn Any, sink: &mut dyn FieldSink) -> Result<()> {
        let mut meta = self.meta_for(instance)?;
        if let Some((write_hook, _)) = &meta.custom {
            return Ok(write_hook(instance, sink)?);
        }

        let mut view: &dyn Any = instance;
        let mut generation = 0u32;
        loop {
            if generation >= MAX_GENERATIONS {
                return Err(FieldError::ChainTooDeep {
                    max: MAX_GENERATIONS,
                }
                .into());
            }
            for resolved in stored_fields(&meta) {
                let key = StorageKey::new(generation, resolved.field.id);
                let value = resolved.field.read(view)?;
                sink.put(key, value)?;
            }
            let Some(link) = &meta.parent else {
                return Ok(());
            };
            let parent = self.parent_meta(&meta)?;
            view = (link.project_ref)(view)?;
            meta = parent;
            generation += 1;
        }
    }

    /// Populate `instance` from the source.
    ///
    /// Succeeds only with every declared field covered: by a stored value,
    /// a fallback constructor, a static default, or the instance's own
    /// constructed value. Any fetch failure other than an absent key aborts
    /// the read.
    pub fn read(&self, instance: &mut dyn Any, source: &dyn FieldSource) -> Result<()> {
        let meta = self.meta_for(instance)?;
        if let Some((_, read_hook)) = &meta.custom {
            read_hook(&mut *instance, source)?;
        } else {
            self.read_fields(&mut *instance, source, Arc::clone(&meta))?;
        }

        if let Some(completed) = &meta.completed {
            completed(instance);
        }
        Ok(())
    }

    fn read_fields(
        &self,
        instance: &mut dyn Any,
        source: &dyn FieldSource,
        root: Arc<TypeMeta>,
    ) -> Result<()> {
        let mut meta = root;
        let mut view: &mut dyn Any = instance;
        let mut generation = 0u32;
        loop {
            if generation >= MAX_GENERATIONS {
                return Err(FieldError::ChainTooDeep {
                    max: MAX_GENERATIONS,
                }
                .into());
            }
            for resolved in stored_fields(&meta) {
                let key = StorageKey::new(generation, resolved.field.id);
                match source.fetch(key) {
                    Fetch::Found(value) => resolved.field.write(view, value)?,
                    Fetch::Absent => {
                        if let Some(ctor) = resolved.fallback {
                            trace!(key = %key, field = resolved.field.name, "absent key, running fallback constructor");
                            let value = (ctor.call)(&*view)?;
                            resolved.field.write(view, value)?;
                        } else if let Some(default) = &resolved.field.default {
                            trace!(key = %key, field = resolved.field.name, "absent key, applying default");
                            resolved.field.write(view, default.clone())?;
                        }
                        // No fallback and no default: the constructed value
                        // stands.
                    }
                    Fetch::Corrupt(reason) => {
                        return Err(FieldError::Corrupt {
                            key: key.to_string(),
                            reason,
                        }
                        .into());
                    }
                }
            }
            let Some(link) = &meta.parent else {
                return Ok(());
            };
            let parent = self.parent_meta(&meta)?;
            view = (link.project_mut)(view)?;
            meta = parent;
            generation += 1;
        }
    }
}
