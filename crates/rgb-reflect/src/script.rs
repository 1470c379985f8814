//! Script instance capability.
//!
//! A scripting bridge attaches a [`ScriptInstance`] to an object to override
//! or extend its properties, methods and signals. The object consults it
//! before the class table on every dispatch. Nothing in this crate implements
//! the trait outside of tests.

use crate::call_error::CallResult;
use crate::method_info::MethodInfo;
use crate::object::Object;
use crate::property_info::PropertyInfo;
use crate::variant::{Variant, VariantType};

/// Per-object script state.
///
/// All methods take `&self`; implementations keep their own interior
/// mutability. `owner` is the object the instance is attached to.
pub trait ScriptInstance: Send + Sync {
    /// Returns `true` when the script owns `name`.
    fn set(&self, name: &str, value: &Variant) -> bool;

    fn get(&self, name: &str) -> Option<Variant>;

    fn get_property_list(&self) -> Vec<PropertyInfo> {
        Vec::new()
    }

    fn get_property_type(&self, _name: &str) -> Option<VariantType> {
        None
    }

    fn has_method(&self, method: &str) -> bool;

    fn get_method_list(&self) -> Vec<MethodInfo> {
        Vec::new()
    }

    /// `Err(CallError::InvalidMethod)` lets dispatch fall through to the
    /// native class.
    fn call(&self, owner: &Object, method: &str, args: &[Variant]) -> CallResult;

    /// Call `method` on every script in the inheritance chain, base last.
    fn call_multilevel(&self, owner: &Object, method: &str, args: &[Variant]) {
        let _ = self.call(owner, method, args);
    }

    /// Call `method` on every script in the inheritance chain, base first.
    fn call_multilevel_reversed(&self, owner: &Object, method: &str, args: &[Variant]) {
        let _ = self.call(owner, method, args);
    }

    fn notification(&self, _owner: &Object, _what: i32) {}

    /// Text used by `Object::to_string`, when the script overrides it.
    fn to_string(&self) -> Option<String> {
        None
    }

    fn has_script_signal(&self, _signal: &str) -> bool {
        false
    }

    fn get_script_signal_list(&self) -> Vec<MethodInfo> {
        Vec::new()
    }

    /// Last-resort store tried after every native stage.
    fn property_set_fallback(&self, _name: &str, _value: &Variant) -> bool {
        false
    }

    fn property_get_fallback(&self, _name: &str) -> Option<Variant> {
        None
    }

    /// A script that failed to load is invalid; relaxed signal checking
    /// accepts connections to it.
    fn is_valid(&self) -> bool {
        true
    }

    fn is_tool(&self) -> bool {
        false
    }

    fn script_path(&self) -> String {
        String::new()
    }
}

