//! Field resolution
//!
//! Enumerates the fields a type stores (own declarations only, never
//! inherited ones) and joins each with the fallback constructor targeting
//! its id, so the read path has the whole fallback chain in one place.

use crate::meta::{Fallback, Field, TypeMeta};

/// One stored field together with its matching fallback constructor.
#[derive(Debug)]
pub struct ResolvedField<'m> {
    pub field: &'m Field,
    pub fallback: Option<&'m Fallback>,
}

/// The fields `meta` stores, in declaration order. Empty when the type has no
/// stored members.
pub fn stored_fields(meta: &TypeMeta) -> Vec<ResolvedField<'_>> {
    meta.fields()
        .iter()
        .map(|field| ResolvedField {
            field,
            fallback: meta.fallbacks().iter().find(|c| c.id == field.id),
        })
        .collect()
}
