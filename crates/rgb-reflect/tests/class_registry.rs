//! Integration tests for class registration, instancing and reflective calls

use std::sync::Arc;

use rgb_reflect::prelude::*;
use rgb_reflect::{ApiType, PropertyHint};

// ============================================================================
// Test Classes
// ============================================================================

#[derive(Default)]
struct Base {
    x: i64,
}

impl NativeClass for Base {}

#[derive(Default)]
struct Derived {
    base: Base,
    label: String,
}

impl NativeClass for Derived {
    fn base(&self) -> Option<&dyn NativeClass> {
        Some(&self.base)
    }

    fn base_mut(&mut self) -> Option<&mut dyn NativeClass> {
        Some(&mut self.base)
    }
}

fn derived() -> Box<dyn NativeClass> {
    Box::new(Derived::default())
}

fn base() -> Box<dyn NativeClass> {
    Box::new(Base::default())
}

#[derive(Default)]
struct Grid {
    cells: [i64; 4],
}

impl NativeClass for Grid {}

fn grid() -> Box<dyn NativeClass> {
    Box::new(Grid::default())
}

fn setup_grid() -> Arc<Context> {
    let ctx = setup();
    let db = ctx.class_db();
    db.register_class("Grid", "Object", Some(grid)).unwrap();
    db.bind_method(
        "Grid",
        MethodBind::new("set_cell", |g: &mut Grid, index: i64, value: i64| {
            g.cells[index as usize] = value;
        })
        .with_arg_names(["index", "value"]),
    )
    .unwrap();
    db.bind_method(
        "Grid",
        MethodBind::new("get_cell", |g: &Grid, index: i64| g.cells[index as usize])
            .with_arg_names(["index"]),
    )
    .unwrap();
    db.bind_method("Grid", MethodBind::new("reset", |g: &mut Grid| g.cells = [0; 4]))
        .unwrap();
    ctx
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("rgb_reflect=debug")
        .with_test_writer()
        .try_init();
}

fn setup() -> Arc<Context> {
    init_tracing();
    let ctx = Context::new(Config::default());
    let db = ctx.class_db();
    db.register_class("Base", "", None).unwrap();
    db.register_class("Derived", "Base", Some(derived)).unwrap();
    ctx
}

// ============================================================================
// End-to-end Scenarios
// ============================================================================

#[test]
fn test_instance_requires_factory() {
    let ctx = setup();
    let object = ctx.instance("Derived").unwrap();
    assert!(!object.get_instance_id().is_null());
    assert_eq!(object.get_class(), "Derived");
    assert!(ctx.class_db().is_parent_class("Derived", "Base"));

    assert!(!ctx.class_db().can_instance("Base"));
    assert!(ctx.instance("Base").is_err());

    // Giving Base a factory through a fresh registration makes it instantiable.
    let other = Context::new(Config::default());
    other.class_db().register_class("Base", "", Some(base)).unwrap();
    assert!(other.instance("Base").is_ok());
}

#[test]
fn test_call_with_too_many_arguments() {
    let ctx = setup();
    ctx.class_db()
        .bind_method("Derived", MethodBind::new("get_value", |_: &Derived| 42_i64))
        .unwrap();
    let object = ctx.instance("Derived").unwrap();

    assert_eq!(object.call("get_value", &[]), Ok(Variant::Int(42)));
    assert_eq!(
        object.call("get_value", &[Variant::Int(1)]),
        Err(CallError::TooManyArguments { expected: 0 })
    );
}

#[test]
fn test_property_through_accessors() {
    let ctx = setup();
    let db = ctx.class_db();
    db.bind_method(
        "Derived",
        MethodBind::new("set_x", |d: &mut Derived, x: i64| d.base.x = x).with_arg_names(["x"]),
    )
    .unwrap();
    db.bind_method("Derived", MethodBind::new("get_x", |d: &Derived| d.base.x))
        .unwrap();
    db.add_property(
        "Derived",
        PropertyInfo::new(VariantType::Int, "x"),
        "set_x",
        "get_x",
        None,
    )
    .unwrap();

    let object = ctx.instance("Derived").unwrap();
    assert!(object.set("x", &Variant::Int(5)));
    assert_eq!(object.get("x"), Some(Variant::Int(5)));

    assert!(!object.set("nonexistent_prop", &Variant::Int(5)));
    assert_eq!(object.get("nonexistent_prop"), None);
    assert_eq!(object.get("x"), Some(Variant::Int(5)));
}

// ============================================================================
// Hierarchy
// ============================================================================

#[test]
fn test_inheritance_closure() {
    let ctx = setup();
    let db = ctx.class_db();
    db.register_class("Leaf", "Derived", Some(derived)).unwrap();
    db.register_class("Sibling", "Base", None).unwrap();

    assert!(db.is_parent_class("Leaf", "Base"));
    assert!(db.is_parent_class("Leaf", "Leaf"));
    assert!(!db.is_parent_class("Base", "Leaf"));
    assert!(!db.is_parent_class("Sibling", "Derived"));

    assert_eq!(
        db.get_inheriters_from_class("Base"),
        ["Derived", "Leaf", "Sibling"]
    );
    assert_eq!(db.get_direct_inheriters_from_class("Base"), ["Derived", "Sibling"]);
    assert_eq!(db.get_parent_class("Leaf"), "Derived");
}

#[test]
fn test_parent_must_be_registered_first() {
    let ctx = Context::new(Config::default());
    let db = ctx.class_db();
    assert_eq!(
        db.register_class("Child", "Parent", None),
        Err(ReflectError::ParentNotRegistered {
            class: "Child".into(),
            parent: "Parent".into(),
        })
    );
    assert!(!db.class_exists("Child"));

    db.register_class("Parent", "Object", None).unwrap();
    db.register_class("Child", "Parent", None).unwrap();
    assert_eq!(
        db.register_class("Child", "Parent", None),
        Err(ReflectError::ClassAlreadyRegistered("Child".into()))
    );
}

// ============================================================================
// Method Binding
// ============================================================================

#[test]
fn test_child_method_shadows_parent() {
    let ctx = setup();
    let db = ctx.class_db();
    db.bind_method("Base", MethodBind::new("describe", |_: &Base| "base"))
        .unwrap();
    db.bind_method("Derived", MethodBind::new("describe", |_: &Derived| "derived"))
        .unwrap();
    db.bind_method("Base", MethodBind::new("base_x", |b: &Base| b.x))
        .unwrap();

    let object = ctx.instance("Derived").unwrap();
    assert_eq!(object.call("describe", &[]), Ok(Variant::from("derived")));
    assert_eq!(object.call("base_x", &[]), Ok(Variant::Int(0)));
    assert_eq!(object.call("missing", &[]), Err(CallError::InvalidMethod));
}

#[test]
fn test_duplicate_bind_is_rejected() {
    let ctx = setup();
    let db = ctx.class_db();
    db.bind_method("Derived", MethodBind::new("f", |_: &Derived| ()))
        .unwrap();
    assert!(matches!(
        db.bind_method("Derived", MethodBind::new("f", |_: &Derived| ())),
        Err(ReflectError::MethodAlreadyBound { .. })
    ));
}

#[test]
fn test_default_arguments_fill_trailing() {
    let ctx = setup();
    ctx.class_db()
        .bind_method(
            "Derived",
            MethodBind::new("add", |_: &Derived, a: i64, b: i64| a + b)
                .with_arg_names(["a", "b"])
                .with_defaults([Variant::Int(10)]),
        )
        .unwrap();
    let object = ctx.instance("Derived").unwrap();

    assert_eq!(object.call("add", &[Variant::Int(1)]), Ok(Variant::Int(11)));
    assert_eq!(
        object.call("add", &[Variant::Int(1), Variant::Int(2)]),
        Ok(Variant::Int(3))
    );
    assert_eq!(
        object.call("add", &[]),
        Err(CallError::TooFewArguments { expected: 1 })
    );
    assert_eq!(
        object.call("add", &[Variant::from("one")]),
        Err(CallError::InvalidArgument {
            argument: 0,
            expected: VariantType::Int
        })
    );

    let bind = ctx.class_db().get_method("Derived", "add").unwrap();
    assert_eq!(bind.default_argument(1), Some(&Variant::Int(10)));
    assert!(!bind.has_default_argument(0));
}

#[test]
fn test_mutating_method_sees_state() {
    let ctx = setup();
    ctx.class_db()
        .bind_method(
            "Derived",
            MethodBind::new("relabel", |d: &mut Derived, label: String| {
                std::mem::replace(&mut d.label, label)
            }),
        )
        .unwrap();
    let object = ctx.instance("Derived").unwrap();
    object.call("relabel", &[Variant::from("a")]).unwrap();
    assert_eq!(
        object.call("relabel", &[Variant::from("b")]),
        Ok(Variant::from("a"))
    );
    assert_eq!(
        object.with_native(|d: &Derived| d.label.clone()),
        Ok("b".to_owned())
    );
}

// ============================================================================
// Properties and Defaults
// ============================================================================

#[test]
fn test_property_listing_and_defaults() {
    let ctx = setup();
    let db = ctx.class_db();
    db.bind_method("Derived", MethodBind::new("set_x", |d: &mut Derived, x: i64| d.base.x = x))
        .unwrap();
    db.bind_method("Derived", MethodBind::new("get_x", |d: &Derived| d.base.x))
        .unwrap();
    db.add_property_group("Derived", "Motion", "").unwrap();
    db.add_property(
        "Derived",
        PropertyInfo::new(VariantType::Int, "x").with_hint(PropertyHint::Range, "0,100"),
        "set_x",
        "get_x",
        None,
    )
    .unwrap();

    let names: Vec<String> = db
        .get_property_list("Derived", true, None)
        .into_iter()
        .map(|p| p.name)
        .collect();
    assert_eq!(names, ["Motion", "x"]);
    assert_eq!(db.get_property_type("Derived", "x"), Some(VariantType::Int));

    assert_eq!(
        ctx.class_get_default_property_value("Derived", "x"),
        Some(Variant::Int(0))
    );
    assert_eq!(ctx.class_get_default_property_value("Derived", "y"), None);
    assert_eq!(ctx.object_db().get_object_count(), 0);
}

#[test]
fn test_indexed_property() {
    let ctx = setup_grid();
    let db = ctx.class_db();
    db.add_property(
        "Grid",
        PropertyInfo::new(VariantType::Int, "c2"),
        "set_cell",
        "get_cell",
        Some(2),
    )
    .unwrap();
    assert_eq!(db.get_property_index("Grid", "c2"), Some(2));

    let object = ctx.instance("Grid").unwrap();
    assert!(object.set("c2", &Variant::Int(9)));
    let cells = object.with_native(|g: &Grid| g.cells).unwrap();
    assert_eq!(cells, [0, 0, 9, 0]);
    assert_eq!(object.get("c2"), Some(Variant::Int(9)));
}

#[test]
fn test_readonly_property_write_is_noop() {
    let ctx = setup_grid();
    let db = ctx.class_db();
    db.bind_method("Grid", MethodBind::new("get_ro", |_: &Grid| 11_i64))
        .unwrap();
    db.add_property("Grid", PropertyInfo::new(VariantType::Int, "ro"), "", "get_ro", None)
        .unwrap();

    let object = ctx.instance("Grid").unwrap();
    assert!(object.set("ro", &Variant::Int(3)));
    assert_eq!(object.get("ro"), Some(Variant::Int(11)));
    assert_eq!(db.get_property_setter("Grid", "ro"), Some(String::new()));
}

#[test]
fn test_get_falls_back_to_constant() {
    let ctx = setup_grid();
    ctx.class_db()
        .bind_integer_constant("Grid", "", "LIMIT", 7)
        .unwrap();

    let object = ctx.instance("Grid").unwrap();
    assert_eq!(object.get("LIMIT"), Some(Variant::Int(7)));
    assert!(!object.set("LIMIT", &Variant::Int(1)));
}

#[test]
fn test_add_property_checks_arity() {
    let ctx = setup_grid();
    let db = ctx.class_db();

    let bad_setter = db.add_property(
        "Grid",
        PropertyInfo::new(VariantType::Int, "cells"),
        "reset",
        "",
        None,
    );
    assert!(matches!(
        bad_setter,
        Err(ReflectError::InvalidAccessor { role: "setter", .. })
    ));

    let bad_getter = db.add_property(
        "Grid",
        PropertyInfo::new(VariantType::Int, "cells"),
        "",
        "set_cell",
        None,
    );
    assert!(matches!(
        bad_getter,
        Err(ReflectError::InvalidAccessor { role: "getter", .. })
    ));
    assert!(!db.has_property("Grid", "cells", true));
}

// ============================================================================
// API Hash
// ============================================================================

fn register_pair(ctx: &Context, reversed: bool) {
    let db = ctx.class_db();
    let mut order = ["Alpha", "Beta"];
    if reversed {
        order.reverse();
    }
    for class in order {
        db.register_class(class, "Object", Some(base)).unwrap();
        db.bind_method(
            class,
            MethodBind::new("scale", |_: &Base, factor: f64| factor * 2.0).with_arg_names(["factor"]),
        )
        .unwrap();
        db.bind_integer_constant(class, "", "LIMIT", 8).unwrap();
    }
}

#[test]
fn test_api_hash_is_order_independent() {
    let a = Context::new(Config::default());
    let b = Context::new(Config::default());
    register_pair(&a, false);
    register_pair(&b, true);
    assert_eq!(
        a.class_db().get_api_hash(ApiType::Core),
        b.class_db().get_api_hash(ApiType::Core)
    );

    b.class_db()
        .bind_integer_constant("Beta", "", "EXTRA", 1)
        .unwrap();
    assert_ne!(
        a.class_db().get_api_hash(ApiType::Core),
        b.class_db().get_api_hash(ApiType::Core)
    );
}

#[test]
fn test_api_hash_tracks_version() {
    let a = Context::new(Config::default().with_api_version("one"));
    let b = Context::new(Config::default().with_api_version("two"));
    assert_ne!(
        a.class_db().get_api_hash(ApiType::Core),
        b.class_db().get_api_hash(ApiType::Core)
    );
}

// ============================================================================
// Lifecycle
// ============================================================================

#[test]
fn test_free_unregisters() {
    let ctx = setup();
    let object = ctx.instance("Derived").unwrap();
    let id = object.get_instance_id();
    assert!(ctx.object_db().instance_validate(id));

    object.free().unwrap();
    assert!(object.is_freed());
    assert!(ctx.object_db().get_instance(id).is_none());
    assert_eq!(object.free(), Err(ReflectError::ObjectFreed(id)));
    assert_eq!(object.call("get_class", &[]), Err(CallError::InstanceIsNull));
}

#[test]
fn test_ids_are_unique() {
    let ctx = setup();
    let a = ctx.instance("Derived").unwrap();
    let b = ctx.instance("Derived").unwrap();
    assert_ne!(a.get_instance_id(), b.get_instance_id());
    assert_eq!(ctx.object_db().get_object_count(), 2);
    assert_eq!(ctx.cleanup(), 2);
}
