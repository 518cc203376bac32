//! Type Registry
//!
//! Process-wide mapping from storage name to type descriptor. Populated
//! additively at startup (or whenever a plugin makes new types visible) and
//! read concurrently for the lifetime of the process: entries are never
//! removed, so a plain read-write lock is enough. Nothing here re-enters
//! the lock or waits on another, so there is no deadlock path.

use std::any::TypeId;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, OnceLock, RwLock};

use tracing::debug;

use crate::error::{RegistryError, Result};
use crate::meta::TypeMeta;
use crate::name::bare_path;
use crate::validate::validate;

#[derive(Default)]
struct Inner {
    /// Storage name -> canonical descriptor. For a generic family this is the
    /// first monomorphization registered under the name.
    by_name: HashMap<String, Arc<TypeMeta>>,
    /// Every descriptor the registry knows, annotated or not.
    known: HashMap<TypeId, Arc<TypeMeta>>,
    /// Which known types went through full registration.
    registered: HashSet<TypeId>,
    /// Host-native path -> type, for decoding unregistered names. Keyed by
    /// the bare path (no generic suffix), since encoded names substitute
    /// arguments positionally; the first monomorphization declared owns the
    /// path.
    by_native: HashMap<&'static str, TypeId>,
}

/// The registry. Injectable for tests; a process-wide default is available
/// through [`registry()`].
#[derive(Default)]
pub struct TypeRegistry {
    inner: RwLock<Inner>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an annotated type.
    ///
    /// Validates the meta first; an invalid meta is never inserted.
    /// Idempotent by type identity: registering the same type twice returns
    /// the existing entry untouched. A second *distinct* type claiming the
    /// same storage name is rejected, except for further monomorphizations of
    /// the same generic family (same name, same arity), which join the known
    /// set without disturbing the name entry.
    pub fn register(&self, meta: TypeMeta) -> Result<Arc<TypeMeta>> {
        validate(&meta)?;
        let name = match meta.storage_name() {
            Some(name) => name.to_string(),
            None => {
                return Err(RegistryError::NotAnnotated {
                    type_name: meta.native_name().to_string(),
                }
                .into())
            }
        };

        let mut inner = self.inner.write().expect("registry lock poisoned");
        if inner.registered.contains(&meta.type_id()) {
            // Identity no-op. known always holds the entry at this point.
            return Ok(Arc::clone(&inner.known[&meta.type_id()]));
        }

        if let Some(existing) = inner.by_name.get(&name) {
            let same_family = existing.type_id() != meta.type_id()
                && existing.is_generic()
                && meta.is_generic()
                && existing.arity() == meta.arity();
            if !same_family {
                return Err(RegistryError::DuplicateName {
                    name,
                    existing: existing.native_name().to_string(),
                    conflicting: meta.native_name().to_string(),
                }
                .into());
            }
            debug!(name = %name, native = meta.native_name(), "registered monomorphization");
            return Ok(Self::insert(&mut inner, meta, true));
        }

        debug!(name = %name, native = meta.native_name(), "registered type");
        let arc = Self::insert(&mut inner, meta, true);
        inner.by_name.insert(name, Arc::clone(&arc));
        Ok(arc)
    }

    /// Make an unannotated descriptor known, so it can appear as a generic
    /// argument or an embedded base. Idempotent by type identity.
    pub fn declare(&self, meta: TypeMeta) -> Result<Arc<TypeMeta>> {
        validate(&meta)?;
        let mut inner = self.inner.write().expect("registry lock poisoned");
        if let Some(existing) = inner.known.get(&meta.type_id()) {
            return Ok(Arc::clone(existing));
        }
        debug!(native = meta.native_name(), "declared native type");
        Ok(Self::insert(&mut inner, meta, false))
    }

    fn insert(inner: &mut Inner, meta: TypeMeta, registered: bool) -> Arc<TypeMeta> {
        let arc = Arc::new(meta);
        inner
            .by_native
            .entry(bare_path(arc.native_name()))
            .or_insert(arc.type_id());
        inner.known.insert(arc.type_id(), Arc::clone(&arc));
        if registered {
            inner.registered.insert(arc.type_id());
        }
        arc
    }

    /// Explicit startup registration pass over a metadata batch.
    pub fn register_all(&self, metas: impl IntoIterator<Item = TypeMeta>) -> Result<()> {
        for meta in metas {
            if meta.storage_name().is_some() {
                self.register(meta)?;
            } else {
                self.declare(meta)?;
            }
        }
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<TypeMeta>> {
        self.inner
            .read()
            .expect("registry lock poisoned")
            .by_name
            .get(name)
            .cloned()
    }

    /// Like [`lookup`](Self::lookup), but absence is an error.
    pub fn require(&self, name: &str) -> Result<Arc<TypeMeta>> {
        self.lookup(name).ok_or_else(|| {
            RegistryError::NotFound {
                name: name.to_string(),
            }
            .into()
        })
    }

    pub fn lookup_id(&self, id: TypeId) -> Option<Arc<TypeMeta>> {
        self.inner
            .read()
            .expect("registry lock poisoned")
            .known
            .get(&id)
            .cloned()
    }

    pub fn lookup_native(&self, native_name: &str) -> Option<Arc<TypeMeta>> {
        let inner = self.inner.read().expect("registry lock poisoned");
        let id = inner.by_native.get(native_name)?;
        inner.known.get(id).cloned()
    }

    /// The monomorphization of the family registered under `name` whose
    /// declared generic arguments are exactly `args`. Distinguishes the
    /// entries a plain [`lookup`](Self::lookup) collapses, since the name
    /// slot only holds the first monomorphization registered.
    pub fn lookup_monomorphization(&self, name: &str, args: &[TypeId]) -> Option<Arc<TypeMeta>> {
        self.inner
            .read()
            .expect("registry lock poisoned")
            .known
            .values()
            .find(|meta| meta.storage_name() == Some(name) && meta.generic_args() == args)
            .cloned()
    }

    /// Same selection for an unregistered generic known by its bare host
    /// path.
    pub fn lookup_native_monomorphization(
        &self,
        path: &str,
        args: &[TypeId],
    ) -> Option<Arc<TypeMeta>> {
        self.inner
            .read()
            .expect("registry lock poisoned")
            .known
            .values()
            .find(|meta| bare_path(meta.native_name()) == path && meta.generic_args() == args)
            .cloned()
    }

    pub fn is_registered(&self, id: TypeId) -> bool {
        self.inner
            .read()
            .expect("registry lock poisoned")
            .registered
            .contains(&id)
    }

    /// Number of distinct storage names registered.
    pub fn len(&self) -> usize {
        self.inner.read().expect("registry lock poisoned").by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The process-wide default registry. Lives for the process lifetime; there
/// is no teardown.
pub fn registry() -> &'static TypeRegistry {
    static GLOBAL: OnceLock<TypeRegistry> = OnceLock::new();
    GLOBAL.get_or_init(TypeRegistry::new)
}
