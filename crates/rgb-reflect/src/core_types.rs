//! Registration of `Object` and `RefCounted`.
//!
//! Every context starts with these two classes. `Object` exposes its own
//! reflective surface (property access, calls, metadata and signals) so
//! tooling and script bridges can drive objects purely by name.

use tracing::{debug, error};

use crate::call_error::{CallError, CallResult};
use crate::class_db::ClassDb;
use crate::context::Context;
use crate::error::{ReflectError, ReflectResult};
use crate::method_bind::MethodBind;
use crate::method_info::MethodInfo;
use crate::native::{Bare, NativeClass};
use crate::object::Object;
use crate::object_db::ObjectId;
use crate::property_info::{PropertyInfo, PropertyUsage};
use crate::signal::ConnectFlags;
use crate::variant::{Variant, VariantType};

fn bare() -> Box<dyn NativeClass> {
    Box::new(Bare)
}

fn resolve(object: &Object, id: ObjectId) -> Option<Object> {
    let target = object.context().object_db().get_instance(id);
    if target.is_none() {
        error!("{}: no object with id {}", object, id);
    }
    target
}

fn listed<T: Into<Variant>>(items: Vec<T>) -> Vec<Variant> {
    items.into_iter().map(Into::into).collect()
}

/// Leading `String` argument of a vararg bind.
fn leading_name(args: &[Variant]) -> Result<(&str, &[Variant]), CallError> {
    let Some((first, rest)) = args.split_first() else {
        return Err(CallError::TooFewArguments { expected: 1 });
    };
    let name = first.as_str().ok_or(CallError::InvalidArgument {
        argument: 0,
        expected: VariantType::String,
    })?;
    Ok((name, rest))
}

fn emit_signal_vararg(object: &Object, args: &[Variant]) -> CallResult {
    let (signal, rest) = leading_name(args)?;
    let _ = object.emit_signal(signal, rest);
    Ok(Variant::Nil)
}

fn call_vararg(object: &Object, args: &[Variant]) -> CallResult {
    let (method, rest) = leading_name(args)?;
    object.call(method, rest)
}

fn call_deferred_vararg(object: &Object, args: &[Variant]) -> CallResult {
    let (method, rest) = leading_name(args)?;
    object.call_deferred(method, rest.to_vec());
    Ok(Variant::Nil)
}

fn connect(
    object: &Object,
    signal: String,
    target: ObjectId,
    method: String,
    binds: Vec<Variant>,
    flags: i64,
) -> ReflectResult<()> {
    let Some(target) = resolve(object, target) else {
        return Err(ReflectError::ObjectFreed(target));
    };
    object.connect(
        &signal,
        &target,
        &method,
        binds,
        ConnectFlags::from_bits_retain(flags as u32),
    )
}

fn add_user_signal(object: &Object, signal: String, arguments: Vec<Variant>) {
    let info = MethodInfo::new(signal).with_args(
        arguments
            .iter()
            .filter_map(Variant::as_dictionary)
            .map(PropertyInfo::from_dict),
    );
    let _ = object.add_user_signal(info);
}

fn bind_object_methods(db: &ClassDb) -> ReflectResult<()> {
    let bind = |method: MethodBind| db.bind_method("Object", method).map(drop);

    bind(MethodBind::new("get_class", |o: &Object| o.get_class().to_owned()))?;
    bind(
        MethodBind::new("is_class", |o: &Object, class: String| o.is_class(&class))
            .with_arg_names(["class"]),
    )?;
    bind(
        MethodBind::new("set", |o: &Object, property: String, value: Variant| {
            o.set(&property, &value);
        })
        .with_arg_names(["property", "value"]),
    )?;
    bind(
        MethodBind::new("get", |o: &Object, property: String| {
            o.get(&property).unwrap_or_default()
        })
        .with_arg_names(["property"]),
    )?;
    bind(MethodBind::new("get_property_list", |o: &Object| {
        listed(o.get_property_list(false))
    }))?;
    bind(MethodBind::new("get_method_list", |o: &Object| {
        listed(o.get_method_list())
    }))?;
    bind(
        MethodBind::new("notification", |o: &Object, what: i32, reversed: bool| {
            o.notification(what, reversed);
        })
        .with_arg_names(["what", "reversed"])
        .with_defaults([Variant::Bool(false)]),
    )?;
    bind(MethodBind::new("to_string", |o: &Object| o.to_string()))?;
    bind(MethodBind::new("get_instance_id", |o: &Object| {
        o.get_instance_id().raw() as i64
    }))?;

    bind(
        MethodBind::new("set_meta", |o: &Object, name: String, value: Variant| {
            o.set_meta(&name, value);
        })
        .with_arg_names(["name", "value"]),
    )?;
    bind(
        MethodBind::new("remove_meta", |o: &Object, name: String| o.remove_meta(&name))
            .with_arg_names(["name"]),
    )?;
    bind(
        MethodBind::new("get_meta", |o: &Object, name: String| {
            o.get_meta(&name).unwrap_or_default()
        })
        .with_arg_names(["name"]),
    )?;
    bind(
        MethodBind::new("has_meta", |o: &Object, name: String| o.has_meta(&name))
            .with_arg_names(["name"]),
    )?;
    bind(MethodBind::new("get_meta_list", |o: &Object| o.get_meta_list()))?;

    bind(
        MethodBind::new("add_user_signal", add_user_signal)
            .with_arg_names(["signal", "arguments"])
            .with_defaults([Variant::Array(Vec::new())]),
    )?;
    bind(
        MethodBind::new("has_user_signal", |o: &Object, signal: String| {
            o.has_user_signal(&signal)
        })
        .with_arg_names(["signal"]),
    )?;
    bind(MethodBind::vararg(
        "emit_signal",
        MethodInfo::new("emit_signal").with_arg(VariantType::String, "signal"),
        emit_signal_vararg,
    ))?;
    bind(MethodBind::vararg(
        "call",
        MethodInfo::new("call")
            .with_arg(VariantType::String, "method")
            .with_return(
                PropertyInfo::new(VariantType::Nil, "")
                    .with_usage(PropertyUsage::DEFAULT | PropertyUsage::NIL_IS_VARIANT),
            ),
        call_vararg,
    ))?;
    bind(MethodBind::vararg(
        "call_deferred",
        MethodInfo::new("call_deferred").with_arg(VariantType::String, "method"),
        call_deferred_vararg,
    ))?;
    bind(
        MethodBind::new("set_deferred", |o: &Object, property: String, value: Variant| {
            o.set_deferred(&property, value);
        })
        .with_arg_names(["property", "value"]),
    )?;
    bind(
        MethodBind::new("callv", |o: &Object, method: String, args: Vec<Variant>| {
            o.callv(&method, &args).unwrap_or_default()
        })
        .with_arg_names(["method", "arg_array"]),
    )?;
    bind(
        MethodBind::new("has_method", |o: &Object, method: String| o.has_method(&method))
            .with_arg_names(["method"]),
    )?;

    bind(MethodBind::new("get_signal_list", |o: &Object| {
        listed(o.get_signal_list())
    }))?;
    bind(
        MethodBind::new("get_signal_connection_list", |o: &Object, signal: String| {
            listed(o.get_signal_connection_list(&signal))
        })
        .with_arg_names(["signal"]),
    )?;
    bind(MethodBind::new("get_incoming_connections", |o: &Object| {
        listed(o.get_signals_connected_to_this())
    }))?;
    bind(
        MethodBind::new("connect", connect)
            .with_arg_names(["signal", "target", "method", "binds", "flags"])
            .with_defaults([Variant::Array(Vec::new()), Variant::Int(0)]),
    )?;
    bind(
        MethodBind::new(
            "disconnect",
            |o: &Object, signal: String, target: ObjectId, method: String| {
                if let Some(target) = resolve(o, target) {
                    let _ = o.disconnect(&signal, &target, &method);
                }
            },
        )
        .with_arg_names(["signal", "target", "method"]),
    )?;
    bind(
        MethodBind::new(
            "is_connected",
            |o: &Object, signal: String, target: ObjectId, method: String| {
                resolve(o, target)
                    .is_some_and(|target| o.is_connected(&signal, &target, &method).unwrap_or(false))
            },
        )
        .with_arg_names(["signal", "target", "method"]),
    )?;
    bind(
        MethodBind::new("set_block_signals", |o: &Object, enable: bool| {
            o.set_block_signals(enable);
        })
        .with_arg_names(["enable"]),
    )?;
    bind(MethodBind::new("is_blocking_signals", |o: &Object| {
        o.is_blocking_signals()
    }))?;
    bind(MethodBind::new("property_list_changed_notify", |o: &Object| {
        o.property_list_changed_notify();
    }))?;
    bind(MethodBind::new("is_queued_for_deletion", |o: &Object| {
        o.is_queued_for_deletion()
    }))?;
    Ok(())
}

fn declare_object_hooks(db: &ClassDb) -> ReflectResult<()> {
    let variant_return =
        PropertyInfo::new(VariantType::Nil, "").with_usage(PropertyUsage::DEFAULT | PropertyUsage::NIL_IS_VARIANT);

    db.add_signal("Object", MethodInfo::new("script_changed"))?;

    db.add_virtual_method(
        "Object",
        MethodInfo::new("_notification").with_arg(VariantType::Int, "what"),
    )?;
    db.add_virtual_method(
        "Object",
        MethodInfo::new("_set")
            .with_arg(VariantType::String, "property")
            .with_args([PropertyInfo::new(VariantType::Nil, "value")
                .with_usage(PropertyUsage::DEFAULT | PropertyUsage::NIL_IS_VARIANT)])
            .with_return(PropertyInfo::new(VariantType::Bool, "")),
    )?;
    db.add_virtual_method(
        "Object",
        MethodInfo::new("_get")
            .with_arg(VariantType::String, "property")
            .with_return(variant_return),
    )?;
    db.add_virtual_method(
        "Object",
        MethodInfo::new("_get_property_list")
            .with_return(PropertyInfo::new(VariantType::Array, "")),
    )?;
    db.add_virtual_method("Object", MethodInfo::new("_init"))?;
    db.add_virtual_method(
        "Object",
        MethodInfo::new("_to_string").with_return(PropertyInfo::new(VariantType::String, "")),
    )?;

    db.bind_integer_constant(
        "Object",
        "",
        "NOTIFICATION_POSTINITIALIZE",
        i64::from(Object::NOTIFICATION_POSTINITIALIZE),
    )?;
    db.bind_integer_constant(
        "Object",
        "",
        "NOTIFICATION_PREDELETE",
        i64::from(Object::NOTIFICATION_PREDELETE),
    )?;
    for (name, flag) in [
        ("CONNECT_DEFERRED", ConnectFlags::DEFERRED),
        ("CONNECT_PERSIST", ConnectFlags::PERSIST),
        ("CONNECT_ONESHOT", ConnectFlags::ONESHOT),
        ("CONNECT_REFERENCE_COUNTED", ConnectFlags::REFERENCE_COUNTED),
    ] {
        db.bind_integer_constant("Object", "ConnectFlags", name, i64::from(flag.bits()))?;
    }
    Ok(())
}

/// Register `Object` (with its reflective surface) and `RefCounted`.
pub fn register_core_types(ctx: &Context) -> ReflectResult<()> {
    let db = ctx.class_db();
    db.register_class("Object", "", Some(bare))?;
    bind_object_methods(db)?;
    declare_object_hooks(db)?;
    db.register_class("RefCounted", "Object", Some(bare))?;
    debug!("Registered core types");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Config;

    #[test]
    fn test_object_surface() {
        let ctx = Context::new(Config::default());
        let db = ctx.class_db();
        for method in [
            "get_class",
            "is_class",
            "set",
            "get",
            "emit_signal",
            "call",
            "call_deferred",
            "connect",
            "disconnect",
            "is_connected",
            "get_meta_list",
        ] {
            assert!(db.has_method("Object", method, true), "{method}");
        }
        assert!(db.has_method("RefCounted", "connect", false));
        assert!(!db.has_method("RefCounted", "connect", true));
        assert!(db.has_signal("RefCounted", "script_changed"));
        assert_eq!(
            db.get_enum_constants("Object", "ConnectFlags", true),
            [
                "CONNECT_DEFERRED",
                "CONNECT_PERSIST",
                "CONNECT_ONESHOT",
                "CONNECT_REFERENCE_COUNTED"
            ]
        );
        assert_eq!(db.get_integer_constant("RefCounted", "NOTIFICATION_PREDELETE"), Some(1));
    }

    #[test]
    fn test_reflective_calls() {
        let ctx = Context::new(Config::default());
        let object = ctx.instance("Object").unwrap();

        assert_eq!(object.call("get_class", &[]), Ok(Variant::from("Object")));
        assert_eq!(
            object.call("is_class", &[Variant::from("Object")]),
            Ok(Variant::Bool(true))
        );
        assert_eq!(
            object.call("call", &[Variant::from("get_class")]),
            Ok(Variant::from("Object"))
        );
        assert_eq!(
            object.call("call", &[]),
            Err(CallError::TooFewArguments { expected: 1 })
        );
        assert_eq!(
            object.call("call", &[Variant::Int(3)]),
            Err(CallError::InvalidArgument {
                argument: 0,
                expected: VariantType::String
            })
        );

        object
            .call("set_meta", &[Variant::from("k"), Variant::Int(4)])
            .unwrap();
        assert_eq!(
            object.call("get_meta", &[Variant::from("k")]),
            Ok(Variant::Int(4))
        );
    }

    #[test]
    fn test_reflective_connect_returns_status() {
        let ctx = Context::new(Config::default());
        let source = ctx.instance("Object").unwrap();
        let target = ctx.instance("Object").unwrap();
        let args = [
            Variant::from("script_changed"),
            Variant::Object(target.get_instance_id()),
            Variant::from("get_class"),
        ];
        assert_eq!(source.call("connect", &args), Ok(Variant::Int(0)));
        assert_eq!(source.call("connect", &args), Ok(Variant::Int(31)));
        assert_eq!(source.call("is_connected", &args), Ok(Variant::Bool(true)));
        source.call("disconnect", &args).unwrap();
        assert_eq!(source.call("is_connected", &args), Ok(Variant::Bool(false)));
    }
}
