//! End-to-end codec tests
//!
//! Drives the public surface the way a host engine would: register the
//! schema table at startup, bind instances to encoded names, move field
//! values through a bag, and read them back across simulated schema
//! versions.

use serde::{Deserialize, Serialize};
use stowage::{
    decode, encode_type, Field, NameBinder, StorageKey, StoreBinder, Surrogate, TypeMeta,
    TypeRegistry, ValueBag,
};

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Test {
    x: i32,
    y: i32,
    z: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct GTest<T1, T2> {
    x: T1,
    y: T2,
}

fn test_meta() -> TypeMeta {
    TypeMeta::of::<Test>("R_TEST")
        .with_field(Field::bound(0, "x", |t: &Test| t.x, |t: &mut Test, v| t.x = v))
        .with_field(
            Field::bound(1, "y", |t: &Test| t.y, |t: &mut Test, v| t.y = v)
                .default_value(serde_json::json!(123)),
        )
        .with_field(Field::bound(2, "z", |t: &Test| t.z, |t: &mut Test, v| t.z = v))
        .with_fallback(2, |_: &Test| 321)
}

fn gtest_meta<T1, T2>() -> TypeMeta
where
    T1: Serialize + for<'de> Deserialize<'de> + Clone + 'static,
    T2: Serialize + for<'de> Deserialize<'de> + Clone + 'static,
{
    TypeMeta::of::<GTest<T1, T2>>("R_GTEST")
        .arg::<T1>()
        .arg::<T2>()
        .with_field(Field::bound(
            0,
            "x",
            |g: &GTest<T1, T2>| g.x.clone(),
            |g: &mut GTest<T1, T2>, v| g.x = v,
        ))
        .with_field(Field::bound(
            1,
            "y",
            |g: &GTest<T1, T2>| g.y.clone(),
            |g: &mut GTest<T1, T2>, v| g.y = v,
        ))
}

/// The schema table an embedding application would register at startup.
fn build_registry() -> TypeRegistry {
    let reg = TypeRegistry::new();
    reg.declare(TypeMeta::native::<i32>()).unwrap();
    reg.declare(TypeMeta::native::<Vec<Test>>().arg::<Test>())
        .unwrap();
    reg.register_all([
        test_meta(),
        gtest_meta::<i32, Test>(),
        gtest_meta::<GTest<i32, Test>, Vec<Test>>(),
    ])
    .unwrap();
    reg
}

#[test]
fn full_round_trip_through_binder_and_surrogate() {
    init_tracing();
    let reg = build_registry();
    let binder = StoreBinder::new(&reg);
    let surrogate = Surrogate::new(&reg);

    let original = Test { x: 42, y: 7, z: 9 };

    let name = binder.bind_to_name(&original).unwrap();
    let mut bag = ValueBag::new();
    surrogate.write(&original, &mut bag).unwrap();

    // The consumer sees only the encoded name and the keyed values.
    let decoded = binder.bind_to_type(&name).unwrap();
    assert_eq!(decoded.meta.storage_name(), Some("R_TEST"));

    let mut restored = Test::default();
    surrogate.read(&mut restored, &bag).unwrap();
    assert_eq!(restored, original);
}

#[test]
fn nested_generic_name_round_trip() {
    init_tracing();
    let reg = build_registry();

    let encoded = encode_type(
        &reg,
        std::any::TypeId::of::<GTest<GTest<i32, Test>, Vec<Test>>>(),
    )
    .unwrap();

    // Both symbolic components are recognizable in the encoded form.
    assert!(encoded.contains("R_GTEST"), "missing family name in {encoded}");
    assert!(encoded.contains("R_TEST"), "missing element name in {encoded}");

    let decoded = decode(&encoded, &reg).unwrap();
    assert_eq!(decoded.meta.storage_name(), Some("R_GTEST"));
    assert_eq!(decoded.args.len(), 2);
    assert_eq!(decoded.args[0].meta.storage_name(), Some("R_GTEST"));
    assert_eq!(decoded.args[0].args[1].meta.storage_name(), Some("R_TEST"));
    // Registry identity: each level resolves to the exact monomorphization
    // that was encoded, not the family's first entry.
    assert_eq!(
        decoded.meta.type_id(),
        std::any::TypeId::of::<GTest<GTest<i32, Test>, Vec<Test>>>()
    );
    assert_eq!(
        decoded.args[0].meta.type_id(),
        std::any::TypeId::of::<GTest<i32, Test>>()
    );
    // The container argument stays host-native, its element resolves
    // symbolically.
    assert_eq!(decoded.args[1].meta.storage_name(), None);
    assert_eq!(decoded.args[1].args[0].meta.storage_name(), Some("R_TEST"));
}

#[test]
fn generic_instance_round_trip() {
    init_tracing();
    let reg = build_registry();
    let surrogate = Surrogate::new(&reg);

    let original = GTest {
        x: 5i32,
        y: Test { x: 1, y: 2, z: 3 },
    };
    let mut bag = ValueBag::new();
    surrogate.write(&original, &mut bag).unwrap();

    let mut restored = GTest::<i32, Test>::default();
    surrogate.read(&mut restored, &bag).unwrap();
    assert_eq!(restored, original);
}

#[test]
fn schema_evolution_fills_new_fields() {
    init_tracing();
    let reg = build_registry();
    let surrogate = Surrogate::new(&reg);

    // Data produced by an older schema that knew neither y nor z.
    let mut bag = ValueBag::new();
    surrogate.write(&Test { x: 10, y: 0, z: 0 }, &mut bag).unwrap();
    bag.remove(StorageKey::new(0, 1)).unwrap();
    bag.remove(StorageKey::new(0, 2)).unwrap();

    let mut restored = Test::default();
    surrogate.read(&mut restored, &bag).unwrap();
    assert_eq!(restored.x, 10);
    assert_eq!(restored.y, 123, "static default covers field 1");
    assert_eq!(restored.z, 321, "fallback constructor covers field 2");
}

#[test]
fn projection_without_type_definitions() {
    init_tracing();
    let reg = build_registry();
    let surrogate = Surrogate::new(&reg);

    let mut bag = ValueBag::new();
    surrogate.write(&Test { x: 1, y: 2, z: 3 }, &mut bag).unwrap();

    let projection = bag.projection();
    assert_eq!(projection.len(), 3);
    assert_eq!(projection["0_0"], serde_json::json!(1));
    assert_eq!(projection["0_1"], serde_json::json!(2));
    assert_eq!(projection["0_2"], serde_json::json!(3));

    let json = bag.projection_json().unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["0_2"], serde_json::json!(3));
}

#[test]
fn stale_name_fails_cleanly() {
    init_tracing();
    let reg = build_registry();
    let binder = StoreBinder::new(&reg);

    // A name from a registry this process never populated.
    let err = binder.bind_to_type("R_RETIRED,>stowage<").unwrap_err();
    assert!(matches!(
        err,
        stowage::StoreError::Decode(stowage::DecodeError::UnknownRegisteredName(_))
    ));
}
