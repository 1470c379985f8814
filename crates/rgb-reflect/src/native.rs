//! Native state carried by objects.
//!
//! Every object owns one boxed [`NativeClass`] value created by its class
//! factory. A derived class embeds its parent's state and exposes it through
//! [`NativeClass::base`] / [`NativeClass::base_mut`], so a method bound on a
//! parent class finds its receiver by walking that chain.

use core::any::Any;

use crate::property_info::PropertyInfo;
use crate::variant::Variant;

/// Upcast to `Any`, implemented for every `'static` type.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// State and native hooks of one registered class.
///
/// All hooks have defaults, so plain data structs only need an empty impl
/// (plus `base`/`base_mut` when they extend another native type).
pub trait NativeClass: AsAny + Send {
    /// Embedded parent state, if this type extends another native type.
    fn base(&self) -> Option<&dyn NativeClass> {
        None
    }

    fn base_mut(&mut self) -> Option<&mut dyn NativeClass> {
        None
    }

    /// Dynamic property hook tried after the class property table.
    fn set_named(&mut self, _name: &str, _value: &Variant) -> bool {
        false
    }

    fn get_named(&self, _name: &str) -> Option<Variant> {
        None
    }

    /// Extra properties reported by the dynamic hook.
    fn property_list(&self) -> Vec<PropertyInfo> {
        Vec::new()
    }

    /// Generic key/value store tried after [`NativeClass::set_named`].
    fn setvar(&mut self, _key: &Variant, _value: &Variant) -> bool {
        false
    }

    fn getvar(&self, _key: &Variant) -> Option<Variant> {
        None
    }

    /// Rewrite a property right before it is listed.
    fn validate_property(&self, _property: &mut PropertyInfo) {}

    fn notification(&mut self, _what: i32) {}

    /// Returning `false` vetoes deletion.
    fn predelete(&mut self) -> bool {
        true
    }
}

/// State of classes that carry no native data.
#[derive(Debug, Clone, Copy, Default)]
pub struct Bare;

impl NativeClass for Bare {}

/// Find the `T` in `data` or one of its embedded parents.
pub fn downcast_ref<T: NativeClass>(data: &dyn NativeClass) -> Option<&T> {
    let mut current = data;
    loop {
        if let Some(found) = (*current).as_any().downcast_ref::<T>() {
            return Some(found);
        }
        current = current.base()?;
    }
}

/// Mutable counterpart of [`downcast_ref`].
pub fn downcast_mut<T: NativeClass>(data: &mut dyn NativeClass) -> Option<&mut T> {
    let mut current = data;
    loop {
        if (*current).as_any().is::<T>() {
            return (*current).as_any_mut().downcast_mut::<T>();
        }
        current = current.base_mut()?;
    }
}
