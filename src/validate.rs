//! Metadata validation
//!
//! Checked once per type, normally inside registration. Pure over the meta:
//! revalidating an already-valid entry is a no-op, and nothing here touches
//! the registry.

use std::collections::HashSet;

use crate::error::ValidationError;
use crate::meta::TypeMeta;

/// Check one meta against the metadata rules.
///
/// Rejects duplicate field ids, fallback constructors targeting a missing or
/// already-claimed id, and fields declared without an accessor binding.
pub fn validate(meta: &TypeMeta) -> Result<(), ValidationError> {
    let mut ids = HashSet::new();
    for field in meta.fields() {
        if !ids.insert(field.id) {
            return Err(ValidationError::DuplicateFieldId {
                type_name: meta.describe().to_string(),
                id: field.id,
            });
        }
    }

    let mut claimed = HashSet::new();
    for ctor in meta.fallbacks() {
        if !ids.contains(&ctor.id) {
            return Err(ValidationError::OrphanConstructorId {
                type_name: meta.describe().to_string(),
                id: ctor.id,
            });
        }
        if !claimed.insert(ctor.id) {
            return Err(ValidationError::DuplicateConstructorId {
                type_name: meta.describe().to_string(),
                id: ctor.id,
            });
        }
    }

    for field in meta.fields() {
        if !field.is_bound() {
            return Err(ValidationError::UnboundAccessor {
                type_name: meta.describe().to_string(),
                field: field.name.to_string(),
            });
        }
    }

    Ok(())
}

/// Validate a whole metadata batch before registering any of it.
pub fn check_all<'a, I>(metas: I) -> Result<(), ValidationError>
where
    I: IntoIterator<Item = &'a TypeMeta>,
{
    for meta in metas {
        validate(meta)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::{Field, TypeMeta};

    #[derive(Default)]
    struct Subject {
        a: i32,
        b: i32,
    }

    fn field(id: u32, name: &'static str) -> Field {
        Field::bound(id, name, |s: &Subject| s.a, |s: &mut Subject, v| s.a = v)
    }

    #[test]
    fn test_valid_meta_passes_and_revalidates() {
        let meta = TypeMeta::of::<Subject>("R_SUBJECT")
            .with_field(field(0, "a"))
            .with_field(field(1, "b"))
            .with_fallback(1, |s: &Subject| s.a + s.b);

        assert!(validate(&meta).is_ok());
        // Idempotent: a second pass over the same meta changes nothing.
        assert!(validate(&meta).is_ok());
    }

    #[test]
    fn test_duplicate_field_id() {
        let meta = TypeMeta::of::<Subject>("R_SUBJECT")
            .with_field(field(0, "a"))
            .with_field(field(0, "b"));

        assert!(matches!(
            validate(&meta),
            Err(ValidationError::DuplicateFieldId { id: 0, .. })
        ));
    }

    #[test]
    fn test_orphan_constructor() {
        let meta = TypeMeta::of::<Subject>("R_SUBJECT")
            .with_field(field(0, "a"))
            .with_fallback(7, |_: &Subject| 0);

        assert!(matches!(
            validate(&meta),
            Err(ValidationError::OrphanConstructorId { id: 7, .. })
        ));
    }

    #[test]
    fn test_duplicate_constructor() {
        let meta = TypeMeta::of::<Subject>("R_SUBJECT")
            .with_field(field(0, "a"))
            .with_fallback(0, |_: &Subject| 1)
            .with_fallback(0, |_: &Subject| 2);

        assert!(matches!(
            validate(&meta),
            Err(ValidationError::DuplicateConstructorId { id: 0, .. })
        ));
    }

    #[test]
    fn test_unbound_accessor() {
        let meta = TypeMeta::of::<Subject>("R_SUBJECT").with_field(Field::declared(0, "stub"));

        assert!(matches!(
            validate(&meta),
            Err(ValidationError::UnboundAccessor { .. })
        ));
    }

    #[test]
    fn test_check_all_stops_at_first_failure() {
        let good = TypeMeta::of::<Subject>("R_GOOD").with_field(field(0, "a"));
        let bad = TypeMeta::of::<Subject>("R_BAD")
            .with_field(field(0, "a"))
            .with_field(field(0, "b"));

        assert!(check_all([&good, &bad]).is_err());
        assert!(check_all([&good]).is_ok());
    }
}
