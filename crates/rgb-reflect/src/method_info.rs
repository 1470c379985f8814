//! Method and signal signatures.

use bitflags::bitflags;

use crate::property_info::PropertyInfo;
use crate::variant::{Dictionary, Variant, VariantType};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MethodFlags: u32 {
        const NORMAL = 1;
        const EDITOR = 1 << 1;
        const EDITOR_ONLY = 1 << 2;
        const CONST = 1 << 3;
        const VIRTUAL = 1 << 5;
        const VARARG = 1 << 7;

        const DEFAULT = Self::NORMAL.bits();
    }
}

impl Default for MethodFlags {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Signature of a method, virtual hook, or signal.
///
/// Signals use the same shape: `arguments` describes the emitted values and
/// `return_val` is unused.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MethodInfo {
    pub name: String,
    pub return_val: PropertyInfo,
    pub flags: MethodFlags,
    pub id: u32,
    pub arguments: Vec<PropertyInfo>,
    /// Defaults for the trailing arguments, in declaration order.
    pub default_arguments: Vec<Variant>,
}

impl MethodInfo {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_args(mut self, arguments: impl IntoIterator<Item = PropertyInfo>) -> Self {
        self.arguments.extend(arguments);
        self
    }

    #[must_use]
    pub fn with_arg(mut self, variant_type: VariantType, name: impl Into<String>) -> Self {
        self.arguments.push(PropertyInfo::new(variant_type, name));
        self
    }

    #[must_use]
    pub fn with_return(mut self, return_val: PropertyInfo) -> Self {
        self.return_val = return_val;
        self
    }

    #[must_use]
    pub fn with_flags(mut self, flags: MethodFlags) -> Self {
        self.flags = flags;
        self
    }

    #[must_use]
    pub fn with_defaults(mut self, defaults: impl IntoIterator<Item = Variant>) -> Self {
        self.default_arguments.extend(defaults);
        self
    }

    #[must_use]
    pub fn to_dict(&self) -> Dictionary {
        let mut d = Dictionary::new();
        d.insert("name", self.name.as_str());
        d.insert(
            "args",
            self.arguments
                .iter()
                .map(|a| Variant::Dictionary(a.to_dict()))
                .collect::<Vec<_>>(),
        );
        d.insert("default_args", self.default_arguments.clone());
        d.insert("flags", i64::from(self.flags.bits()));
        d.insert("id", i64::from(self.id));
        d.insert("return", self.return_val.to_dict());
        d
    }

    /// `id` is not read back; it is assigned by whoever owns the method.
    #[must_use]
    pub fn from_dict(dict: &Dictionary) -> Self {
        let mut info = Self::default();
        if let Some(name) = dict.get_str("name").and_then(Variant::as_str) {
            name.clone_into(&mut info.name);
        }
        if let Some(args) = dict.get_str("args").and_then(Variant::as_array) {
            info.arguments = args
                .iter()
                .map(|a| a.as_dictionary().map(PropertyInfo::from_dict).unwrap_or_default())
                .collect();
        }
        if let Some(defaults) = dict.get_str("default_args").and_then(Variant::as_array) {
            info.default_arguments = defaults.to_vec();
        }
        if let Some(ret) = dict.get_str("return").and_then(Variant::as_dictionary) {
            info.return_val = PropertyInfo::from_dict(ret);
        }
        if let Some(flags) = dict.get_str("flags").and_then(Variant::as_int) {
            info.flags = MethodFlags::from_bits_retain(flags as u32);
        }
        info
    }
}

impl From<MethodInfo> for Variant {
    fn from(value: MethodInfo) -> Self {
        Self::Dictionary(value.to_dict())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MethodInfo {
        MethodInfo::new("move_to")
            .with_arg(VariantType::Float, "x")
            .with_arg(VariantType::Float, "y")
            .with_defaults([Variant::Float(0.0)])
            .with_return(PropertyInfo::new(VariantType::Bool, ""))
            .with_flags(MethodFlags::NORMAL | MethodFlags::CONST)
    }

    #[test]
    fn test_default_flags() {
        assert_eq!(MethodInfo::new("f").flags, MethodFlags::NORMAL);
        assert_eq!(MethodFlags::VARARG.bits(), 128);
        assert_eq!(MethodFlags::VIRTUAL.bits(), 32);
    }

    #[test]
    fn test_dict_shape() {
        let mut info = sample();
        info.id = 12;
        let dict = info.to_dict();
        let keys: Vec<_> = dict.keys().filter_map(Variant::as_str).collect();
        assert_eq!(keys, ["name", "args", "default_args", "flags", "id", "return"]);
        assert_eq!(dict.get_str("id"), Some(&Variant::Int(12)));
        assert_eq!(dict.get_str("flags"), Some(&Variant::Int(9)));
    }

    #[test]
    fn test_from_dict_ignores_id() {
        let mut info = sample();
        info.id = 12;
        let back = MethodInfo::from_dict(&info.to_dict());
        assert_eq!(back.id, 0);
        info.id = 0;
        assert_eq!(back, info);
    }

    #[test]
    fn test_from_empty_dict() {
        let info = MethodInfo::from_dict(&Dictionary::new());
        assert_eq!(info, MethodInfo::default());
    }
}
