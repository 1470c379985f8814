//! Type-erased native methods.
//!
//! A [`MethodBind`] wraps an ordinary Rust function behind the uniform
//! `call(object, args) -> CallResult` contract. Three receiver forms are
//! supported:
//!
//! - `Fn(&mut T, ...)` and `Fn(&T, ...)` for methods on native state `T`
//! - `Fn(&Object, ...)` for methods that need the object handle itself
//!
//! plus a vararg form that receives the raw argument slice.
//!
//! ```ignore
//! let bind = MethodBind::new("set_speed", |this: &mut Mover, speed: f64| this.speed = speed)
//!     .with_arg_names(["speed"])
//!     .with_defaults([Variant::Float(1.0)]);
//! ```

use core::fmt;
use core::sync::atomic::{AtomicU32, Ordering};

use smallvec::SmallVec;
use tracing::warn;

use crate::call_error::{CallError, CallResult};
use crate::method_info::{MethodFlags, MethodInfo};
use crate::native::NativeClass;
use crate::object::Object;
use crate::property_info::{PropertyInfo, PropertyUsage};
use crate::variant::{FromVariant, ToVariant, Variant, VariantType};

/// Global counter for method ids.
static NEXT_METHOD_ID: AtomicU32 = AtomicU32::new(1);

/// Type-erased invocation entry point.
pub type Invoker = Box<dyn Fn(&Object, &[Variant]) -> CallResult + Send + Sync>;

/// Declared type of one argument or of the return value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgumentType {
    pub variant_type: VariantType,
    /// Untyped `Variant` slot; reported with `NIL_IS_VARIANT`.
    pub is_variant: bool,
}

impl ArgumentType {
    fn of_arg<A: FromVariant>() -> Self {
        Self {
            variant_type: A::VARIANT_TYPE,
            is_variant: A::IS_VARIANT,
        }
    }

    fn of_return<R: ToVariant>() -> Option<Self> {
        R::RETURNS.then_some(Self {
            variant_type: R::VARIANT_TYPE,
            is_variant: R::IS_VARIANT,
        })
    }

    fn usage(self) -> PropertyUsage {
        if self.is_variant {
            PropertyUsage::DEFAULT | PropertyUsage::NIL_IS_VARIANT
        } else {
            PropertyUsage::DEFAULT
        }
    }
}

/// Receiver markers used to tell the [`NativeMethod`] impls apart.
pub mod marker {
    pub struct MutSelf;
    pub struct RefSelf;
    pub struct HandleSelf;
}

/// A Rust function that can be bound as a reflective method.
///
/// Implemented for functions and closures of up to five arguments whose
/// arguments implement [`FromVariant`] and whose return type implements
/// [`ToVariant`]. `Marker` only disambiguates the impls.
pub trait NativeMethod<Marker>: Send + Sync + 'static {
    const IS_CONST: bool;

    fn argument_types() -> Vec<ArgumentType>;

    fn return_type() -> Option<ArgumentType>;

    fn into_invoker(self) -> Invoker;
}

fn argument<A: FromVariant>(args: &[Variant], index: usize) -> Result<A, CallError> {
    let value = args
        .get(index)
        .ok_or(CallError::TooFewArguments { expected: index + 1 })?;
    A::from_variant(value).ok_or(CallError::InvalidArgument {
        argument: index,
        expected: A::VARIANT_TYPE,
    })
}

macro_rules! impl_native_method {
    ($($arg:ident $idx:tt),*) => {
        impl<T, R, F, $($arg,)*> NativeMethod<(marker::MutSelf, T, fn($($arg),*) -> R)> for F
        where
            T: NativeClass,
            R: ToVariant + 'static,
            F: Fn(&mut T, $($arg),*) -> R + Send + Sync + 'static,
            $($arg: FromVariant + 'static,)*
        {
            const IS_CONST: bool = false;

            fn argument_types() -> Vec<ArgumentType> {
                vec![$(ArgumentType::of_arg::<$arg>()),*]
            }

            fn return_type() -> Option<ArgumentType> {
                ArgumentType::of_return::<R>()
            }

            #[allow(non_snake_case, unused_variables)]
            fn into_invoker(self) -> Invoker {
                Box::new(move |object: &Object, args: &[Variant]| {
                    $(let $arg = argument::<$arg>(args, $idx)?;)*
                    let ret = object.with_native_mut(|this: &mut T| (self)(this, $($arg),*))?;
                    Ok(ret.to_variant())
                })
            }
        }

        impl<T, R, F, $($arg,)*> NativeMethod<(marker::RefSelf, T, fn($($arg),*) -> R)> for F
        where
            T: NativeClass,
            R: ToVariant + 'static,
            F: Fn(&T, $($arg),*) -> R + Send + Sync + 'static,
            $($arg: FromVariant + 'static,)*
        {
            const IS_CONST: bool = true;

            fn argument_types() -> Vec<ArgumentType> {
                vec![$(ArgumentType::of_arg::<$arg>()),*]
            }

            fn return_type() -> Option<ArgumentType> {
                ArgumentType::of_return::<R>()
            }

            #[allow(non_snake_case, unused_variables)]
            fn into_invoker(self) -> Invoker {
                Box::new(move |object: &Object, args: &[Variant]| {
                    $(let $arg = argument::<$arg>(args, $idx)?;)*
                    let ret = object.with_native(|this: &T| (self)(this, $($arg),*))?;
                    Ok(ret.to_variant())
                })
            }
        }

        impl<R, F, $($arg,)*> NativeMethod<(marker::HandleSelf, fn($($arg),*) -> R)> for F
        where
            R: ToVariant + 'static,
            F: Fn(&Object, $($arg),*) -> R + Send + Sync + 'static,
            $($arg: FromVariant + 'static,)*
        {
            const IS_CONST: bool = false;

            fn argument_types() -> Vec<ArgumentType> {
                vec![$(ArgumentType::of_arg::<$arg>()),*]
            }

            fn return_type() -> Option<ArgumentType> {
                ArgumentType::of_return::<R>()
            }

            #[allow(non_snake_case, unused_variables)]
            fn into_invoker(self) -> Invoker {
                Box::new(move |object: &Object, args: &[Variant]| {
                    $(let $arg = argument::<$arg>(args, $idx)?;)*
                    Ok((self)(object, $($arg),*).to_variant())
                })
            }
        }
    };
}

impl_native_method!();
impl_native_method!(A0 0);
impl_native_method!(A0 0, A1 1);
impl_native_method!(A0 0, A1 1, A2 2);
impl_native_method!(A0 0, A1 1, A2 2, A3 3);
impl_native_method!(A0 0, A1 1, A2 2, A3 3, A4 4);

/// One bound native method.
pub struct MethodBind {
    name: String,
    method_id: u32,
    instance_class: String,
    argument_types: Vec<ArgumentType>,
    argument_names: Vec<String>,
    return_type: Option<ArgumentType>,
    /// Defaults for the trailing arguments, in declaration order.
    default_arguments: Vec<Variant>,
    hint_flags: AtomicU32,
    is_const: bool,
    /// Declared signature of a vararg method.
    vararg: Option<MethodInfo>,
    invoker: Invoker,
}

impl MethodBind {
    /// Bind a typed function or closure.
    pub fn new<M, F: NativeMethod<M>>(name: impl Into<String>, method: F) -> Self {
        Self {
            name: name.into(),
            method_id: NEXT_METHOD_ID.fetch_add(1, Ordering::Relaxed),
            instance_class: String::new(),
            argument_types: F::argument_types(),
            argument_names: Vec::new(),
            return_type: F::return_type(),
            default_arguments: Vec::new(),
            hint_flags: AtomicU32::new(MethodFlags::DEFAULT.bits()),
            is_const: F::IS_CONST,
            vararg: None,
            invoker: method.into_invoker(),
        }
    }

    /// Bind a method that takes any number of arguments.
    ///
    /// `info` only describes the method for listings and hashing; arguments
    /// are passed through unchecked.
    pub fn vararg<F>(name: impl Into<String>, info: MethodInfo, method: F) -> Self
    where
        F: Fn(&Object, &[Variant]) -> CallResult + Send + Sync + 'static,
    {
        let argument_names = info.arguments.iter().map(|a| a.name.clone()).collect();
        let argument_types = info
            .arguments
            .iter()
            .map(|a| ArgumentType {
                variant_type: a.variant_type,
                is_variant: a.usage.contains(PropertyUsage::NIL_IS_VARIANT),
            })
            .collect();
        let return_type = Some(ArgumentType {
            variant_type: info.return_val.variant_type,
            is_variant: info.return_val.variant_type == VariantType::Nil,
        });
        Self {
            name: name.into(),
            method_id: NEXT_METHOD_ID.fetch_add(1, Ordering::Relaxed),
            instance_class: String::new(),
            argument_types,
            argument_names,
            return_type,
            default_arguments: info.default_arguments.clone(),
            hint_flags: AtomicU32::new(info.flags.bits()),
            is_const: false,
            vararg: Some(info),
            invoker: Box::new(method),
        }
    }

    /// Name the arguments, in declaration order.
    #[must_use]
    pub fn with_arg_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.argument_names = names.into_iter().map(Into::into).collect();
        self
    }

    /// Defaults for the last `defaults.len()` arguments, in declaration order.
    #[must_use]
    pub fn with_defaults(mut self, defaults: impl IntoIterator<Item = Variant>) -> Self {
        let mut defaults: Vec<Variant> = defaults.into_iter().collect();
        let argc = self.argument_count();
        if self.vararg.is_none() && defaults.len() > argc {
            warn!(
                "Method '{}' declares {} defaults for {} arguments, extra defaults dropped",
                self.name,
                defaults.len(),
                argc
            );
            defaults.drain(..defaults.len() - argc);
        }
        self.default_arguments = defaults;
        self
    }

    #[must_use]
    pub fn with_flags(self, flags: MethodFlags) -> Self {
        self.set_hint_flags(flags);
        self
    }

    pub(crate) fn set_instance_class(&mut self, class: &str) {
        class.clone_into(&mut self.instance_class);
    }

    pub(crate) fn set_hint_flags(&self, flags: MethodFlags) {
        self.hint_flags.store(flags.bits(), Ordering::Relaxed);
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn method_id(&self) -> u32 {
        self.method_id
    }

    /// Class the method was bound on; empty until bound.
    #[must_use]
    pub fn instance_class(&self) -> &str {
        &self.instance_class
    }

    #[must_use]
    pub fn argument_count(&self) -> usize {
        self.argument_types.len()
    }

    #[must_use]
    pub fn argument_names(&self) -> &[String] {
        &self.argument_names
    }

    #[must_use]
    pub fn is_const(&self) -> bool {
        self.is_const
    }

    #[must_use]
    pub fn is_vararg(&self) -> bool {
        self.vararg.is_some()
    }

    #[must_use]
    pub fn has_return(&self) -> bool {
        self.return_type.is_some()
    }

    /// Declared hint flags plus `CONST` / `VARARG` as applicable.
    #[must_use]
    pub fn hint_flags(&self) -> MethodFlags {
        let mut flags = MethodFlags::from_bits_retain(self.hint_flags.load(Ordering::Relaxed));
        if self.is_const {
            flags |= MethodFlags::CONST;
        }
        if self.is_vararg() {
            flags |= MethodFlags::VARARG;
        }
        flags
    }

    /// Type of argument `index`, or of the return value for `-1`.
    #[must_use]
    pub fn argument_type(&self, index: i32) -> VariantType {
        if index < 0 {
            return self
                .return_type
                .map_or(VariantType::Nil, |t| t.variant_type);
        }
        self.argument_types
            .get(index as usize)
            .map_or(VariantType::Nil, |t| t.variant_type)
    }

    #[must_use]
    pub fn argument_info(&self, index: usize) -> PropertyInfo {
        if let Some(vararg) = &self.vararg {
            return vararg.arguments.get(index).cloned().unwrap_or_else(|| {
                PropertyInfo::new(VariantType::Nil, format!("arg_{index}"))
                    .with_usage(PropertyUsage::DEFAULT | PropertyUsage::NIL_IS_VARIANT)
            });
        }
        let Some(ty) = self.argument_types.get(index) else {
            return PropertyInfo::new(VariantType::Nil, format!("arg_{index}"))
                .with_usage(PropertyUsage::DEFAULT | PropertyUsage::NIL_IS_VARIANT);
        };
        let name = self
            .argument_names
            .get(index)
            .cloned()
            .unwrap_or_else(|| format!("_unnamed_arg{index}"));
        PropertyInfo::new(ty.variant_type, name).with_usage(ty.usage())
    }

    #[must_use]
    pub fn return_info(&self) -> PropertyInfo {
        if let Some(vararg) = &self.vararg {
            return vararg.return_val.clone();
        }
        match self.return_type {
            Some(ty) => PropertyInfo::new(ty.variant_type, "").with_usage(ty.usage()),
            None => PropertyInfo::default(),
        }
    }

    fn first_default_index(&self) -> usize {
        self.argument_count()
            .saturating_sub(self.default_arguments.len())
    }

    #[must_use]
    pub fn has_default_argument(&self, index: usize) -> bool {
        index >= self.first_default_index() && index < self.argument_count()
    }

    #[must_use]
    pub fn default_argument(&self, index: usize) -> Option<&Variant> {
        if !self.has_default_argument(index) {
            return None;
        }
        self.default_arguments
            .get(index - self.first_default_index())
    }

    #[must_use]
    pub fn default_arguments(&self) -> &[Variant] {
        &self.default_arguments
    }

    #[must_use]
    pub fn default_argument_count(&self) -> usize {
        self.default_arguments.len()
    }

    /// Full signature as reported by method listings.
    #[must_use]
    pub fn to_method_info(&self) -> MethodInfo {
        MethodInfo {
            name: self.name.clone(),
            return_val: self.return_info(),
            flags: self.hint_flags(),
            id: self.method_id,
            arguments: (0..self.argument_count())
                .map(|i| self.argument_info(i))
                .collect(),
            default_arguments: self.default_arguments.clone(),
        }
    }

    /// Validate `args`, fill trailing defaults, and invoke.
    ///
    /// Nothing runs when validation fails.
    pub fn call(&self, object: &Object, args: &[Variant]) -> CallResult {
        if self.is_vararg() {
            return (self.invoker)(object, args);
        }

        let argc = self.argument_count();
        if args.len() > argc {
            return Err(CallError::TooManyArguments { expected: argc });
        }
        let first_default = self.first_default_index();
        if args.len() < first_default {
            return Err(CallError::TooFewArguments {
                expected: first_default,
            });
        }

        for (i, (arg, declared)) in args.iter().zip(&self.argument_types).enumerate() {
            if !Variant::can_convert_strict(arg.get_type(), declared.variant_type) {
                return Err(CallError::InvalidArgument {
                    argument: i,
                    expected: declared.variant_type,
                });
            }
        }

        if args.len() == argc {
            return (self.invoker)(object, args);
        }

        let mut full: SmallVec<[Variant; 8]> = args.iter().cloned().collect();
        full.extend(
            self.default_arguments[args.len() - first_default..]
                .iter()
                .cloned(),
        );
        (self.invoker)(object, &full)
    }

    /// Invoke without count or type validation.
    ///
    /// Arguments that fail to convert still produce an error, but no
    /// defaults are applied.
    pub fn ptrcall(&self, object: &Object, args: &[Variant]) -> CallResult {
        (self.invoker)(object, args)
    }
}

impl fmt::Debug for MethodBind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodBind")
            .field("name", &self.name)
            .field("method_id", &self.method_id)
            .field("instance_class", &self.instance_class)
            .field("argument_count", &self.argument_count())
            .field("defaults", &self.default_arguments.len())
            .field("vararg", &self.is_vararg())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Counter {
        value: i64,
    }

    impl NativeClass for Counter {}

    #[test]
    fn test_signature_from_closure() {
        let bind = MethodBind::new("add", |this: &mut Counter, by: i64, scale: f64| {
            this.value += (by as f64 * scale) as i64;
            this.value
        })
        .with_arg_names(["by", "scale"])
        .with_defaults([Variant::Float(1.0)]);

        assert_eq!(bind.argument_count(), 2);
        assert_eq!(bind.argument_type(0), VariantType::Int);
        assert_eq!(bind.argument_type(1), VariantType::Float);
        assert_eq!(bind.argument_type(-1), VariantType::Int);
        assert!(bind.has_return());
        assert!(!bind.is_const());
        assert!(!bind.has_default_argument(0));
        assert!(bind.has_default_argument(1));
        assert_eq!(bind.default_argument(1), Some(&Variant::Float(1.0)));
        assert_eq!(bind.argument_info(0).name, "by");
    }

    #[test]
    fn test_const_and_void() {
        let getter = MethodBind::new("get", |this: &Counter| this.value);
        assert!(getter.is_const());
        assert!(getter.hint_flags().contains(MethodFlags::CONST));

        let setter = MethodBind::new("set", |this: &mut Counter, v: i64| this.value = v);
        assert!(!setter.has_return());
        assert_eq!(setter.return_info().variant_type, VariantType::Nil);
    }

    #[test]
    fn test_method_ids_are_unique() {
        let a = MethodBind::new("a", |_: &Counter| ());
        let b = MethodBind::new("b", |_: &Counter| ());
        assert_ne!(a.method_id(), b.method_id());
    }

    #[test]
    fn test_extra_defaults_dropped() {
        let bind = MethodBind::new("one", |_: &Counter, v: i64| v)
            .with_defaults([Variant::Int(1), Variant::Int(2)]);
        assert_eq!(bind.default_arguments(), &[Variant::Int(2)]);
    }

    #[test]
    fn test_vararg_info() {
        let info = MethodInfo::new("emit").with_arg(VariantType::String, "signal");
        let bind = MethodBind::vararg("emit", info, |_, _| Ok(Variant::Nil));
        assert!(bind.is_vararg());
        assert!(bind.hint_flags().contains(MethodFlags::VARARG));
        assert_eq!(bind.argument_info(0).name, "signal");
        let extra = bind.argument_info(3);
        assert_eq!(extra.name, "arg_3");
        assert!(extra.usage.contains(PropertyUsage::NIL_IS_VARIANT));
    }

    #[test]
    fn test_variant_argument_is_flagged() {
        let bind = MethodBind::new("any", |_: &Counter, v: Variant| v);
        let arg = bind.argument_info(0);
        assert_eq!(arg.variant_type, VariantType::Nil);
        assert!(arg.usage.contains(PropertyUsage::NIL_IS_VARIANT));
    }
}
