//! Serializable descriptions of registered classes.

use rgb_reflect::{
    ApiType, ClassDb, MethodFlags, MethodInfo, PropertyInfo, PropertyUsage, Variant,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::IntrospectError;

/// One argument, return value or signal parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgumentDescriptor {
    pub name: String,
    /// Type name, `Variant` for untyped slots.
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub hint: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub hint_string: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodDescriptor {
    pub name: String,
    pub arguments: Vec<ArgumentDescriptor>,
    #[serde(rename = "return")]
    pub return_value: ArgumentDescriptor,
    /// Defaults for the trailing arguments.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub defaults: Vec<Value>,
    pub flags: u32,
    pub is_virtual: bool,
    pub is_vararg: bool,
    pub is_const: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub hint: i64,
    pub hint_string: String,
    pub usage: u32,
    /// Group and category markers have no accessors.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub setter: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub getter: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalDescriptor {
    pub name: String,
    pub arguments: Vec<ArgumentDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstantDescriptor {
    pub name: String,
    pub value: i64,
    #[serde(default, rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_name: Option<String>,
}

/// Everything a class declares itself, excluding inherited members.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassDescriptor {
    pub name: String,
    pub inherits: String,
    pub api: String,
    pub instantiable: bool,
    pub methods: Vec<MethodDescriptor>,
    pub properties: Vec<PropertyDescriptor>,
    pub signals: Vec<SignalDescriptor>,
    pub constants: Vec<ConstantDescriptor>,
}

fn is_zero(value: &i64) -> bool {
    *value == 0
}

/// Stable lowercase name of an API partition.
#[must_use]
pub fn api_name(api: ApiType) -> &'static str {
    match api {
        ApiType::Core => "core",
        ApiType::Editor => "editor",
        ApiType::None => "none",
    }
}

/// JSON rendering of a [`Variant`]. Object references become their raw id.
#[must_use]
pub fn variant_to_json(value: &Variant) -> Value {
    match value {
        Variant::Nil => Value::Null,
        Variant::Bool(b) => Value::Bool(*b),
        Variant::Int(i) => Value::from(*i),
        Variant::Float(f) => serde_json::Number::from_f64(*f).map_or(Value::Null, Value::Number),
        Variant::String(s) => Value::String(s.clone()),
        Variant::Array(items) => Value::Array(items.iter().map(variant_to_json).collect()),
        Variant::Dictionary(dict) => Value::Object(
            dict.iter()
                .map(|(k, v)| (k.as_str().map_or_else(|| k.to_string(), str::to_owned), variant_to_json(v)))
                .collect(),
        ),
        Variant::Object(id) => Value::from(id.raw()),
    }
}

impl ArgumentDescriptor {
    fn from_info(info: &PropertyInfo) -> Self {
        let type_name = if info.usage.contains(PropertyUsage::NIL_IS_VARIANT) {
            "Variant".to_owned()
        } else if !info.class_name.is_empty() {
            info.class_name.clone()
        } else {
            info.variant_type.name().to_owned()
        };
        Self {
            name: info.name.clone(),
            type_name,
            hint: info.hint.as_i64(),
            hint_string: info.hint_string.clone(),
        }
    }
}

impl MethodDescriptor {
    fn from_info(info: &MethodInfo) -> Self {
        Self {
            name: info.name.clone(),
            arguments: info.arguments.iter().map(ArgumentDescriptor::from_info).collect(),
            return_value: ArgumentDescriptor::from_info(&info.return_val),
            defaults: info.default_arguments.iter().map(variant_to_json).collect(),
            flags: info.flags.bits(),
            is_virtual: info.flags.contains(MethodFlags::VIRTUAL),
            is_vararg: info.flags.contains(MethodFlags::VARARG),
            is_const: info.flags.contains(MethodFlags::CONST),
        }
    }
}

impl SignalDescriptor {
    fn from_info(info: &MethodInfo) -> Self {
        Self {
            name: info.name.clone(),
            arguments: info.arguments.iter().map(ArgumentDescriptor::from_info).collect(),
        }
    }
}

impl ClassDescriptor {
    /// Describe `class` as registered in `class_db`.
    pub fn capture(class_db: &ClassDb, class: &str) -> Result<Self, IntrospectError> {
        if !class_db.class_exists(class) {
            return Err(IntrospectError::ClassNotFound(class.to_owned()));
        }

        let methods = class_db
            .get_method_list(class, true, false)
            .iter()
            .map(MethodDescriptor::from_info)
            .collect();

        let properties = class_db
            .get_property_list(class, true, None)
            .into_iter()
            .map(|info| PropertyDescriptor {
                setter: class_db
                    .get_property_setter(class, &info.name)
                    .unwrap_or_default(),
                getter: class_db
                    .get_property_getter(class, &info.name)
                    .unwrap_or_default(),
                type_name: info.variant_type.name().to_owned(),
                hint: info.hint.as_i64(),
                usage: info.usage.bits(),
                hint_string: info.hint_string,
                name: info.name,
            })
            .collect();

        let signals = class_db
            .get_signal_list(class, true)
            .iter()
            .map(SignalDescriptor::from_info)
            .collect();

        let constants = class_db
            .get_integer_constant_list(class, true)
            .into_iter()
            .filter_map(|name| {
                let value = class_db.get_integer_constant(class, &name)?;
                let enum_name = class_db.get_integer_constant_enum(class, &name, true);
                Some(ConstantDescriptor {
                    name,
                    value,
                    enum_name,
                })
            })
            .collect();

        Ok(Self {
            name: class.to_owned(),
            inherits: class_db.get_parent_class_nocheck(class).unwrap_or_default(),
            api: api_name(class_db.get_api_type(class)).to_owned(),
            instantiable: class_db.can_instance(class),
            methods,
            properties,
            signals,
            constants,
        })
    }

    #[must_use]
    pub fn method(&self, name: &str) -> Option<&MethodDescriptor> {
        self.methods.iter().find(|m| m.name == name)
    }

    #[must_use]
    pub fn property(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.properties.iter().find(|p| p.name == name)
    }
}

#[cfg(test)]
mod tests {
    use rgb_reflect::{Config, Context, MethodBind, NativeClass, PropertyHint, VariantType};

    use super::*;

    #[derive(Default)]
    struct Lamp {
        energy: f64,
    }

    impl NativeClass for Lamp {}

    fn lamp() -> Box<dyn NativeClass> {
        Box::new(Lamp::default())
    }

    fn registry() -> std::sync::Arc<Context> {
        let ctx = Context::new(Config::default());
        let db = ctx.class_db();
        db.register_class("Lamp", "Object", Some(lamp)).unwrap();
        db.bind_method(
            "Lamp",
            MethodBind::new("set_energy", |l: &mut Lamp, energy: f64| l.energy = energy)
                .with_arg_names(["energy"]),
        )
        .unwrap();
        db.bind_method("Lamp", MethodBind::new("get_energy", |l: &Lamp| l.energy))
            .unwrap();
        db.add_property(
            "Lamp",
            PropertyInfo::new(VariantType::Float, "energy").with_hint(PropertyHint::Range, "0,16"),
            "set_energy",
            "get_energy",
            None,
        )
        .unwrap();
        db.add_signal("Lamp", MethodInfo::new("toggled").with_arg(VariantType::Bool, "on"))
            .unwrap();
        db.bind_integer_constant("Lamp", "Mode", "MODE_OFF", 0).unwrap();
        ctx
    }

    #[test]
    fn test_capture_class() {
        let ctx = registry();
        let lamp = ClassDescriptor::capture(ctx.class_db(), "Lamp").unwrap();

        assert_eq!(lamp.inherits, "Object");
        assert_eq!(lamp.api, "core");
        assert!(lamp.instantiable);

        let setter = lamp.method("set_energy").unwrap();
        assert_eq!(setter.arguments[0].name, "energy");
        assert_eq!(setter.arguments[0].type_name, "float");
        assert!(!setter.is_const);
        assert!(lamp.method("get_energy").unwrap().is_const);

        let energy = lamp.property("energy").unwrap();
        assert_eq!(energy.setter, "set_energy");
        assert_eq!(energy.hint_string, "0,16");

        assert_eq!(lamp.signals[0].name, "toggled");
        assert_eq!(lamp.constants[0].enum_name.as_deref(), Some("Mode"));
    }

    #[test]
    fn test_capture_unknown_class() {
        let ctx = registry();
        assert!(matches!(
            ClassDescriptor::capture(ctx.class_db(), "Nope"),
            Err(IntrospectError::ClassNotFound(_))
        ));
    }

    #[test]
    fn test_variant_json() {
        let value = Variant::Array(vec![Variant::Nil, Variant::Int(2), Variant::from("s")]);
        assert_eq!(variant_to_json(&value), serde_json::json!([null, 2, "s"]));
    }
}
