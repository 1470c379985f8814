//! Property descriptors.

use bitflags::bitflags;

use crate::variant::{Dictionary, Variant, VariantType};

/// Editor hint describing how a property's value should be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(i8)]
pub enum PropertyHint {
    #[default]
    None = 0,
    /// `"min,max,step[,slider]"`
    Range = 1,
    ExpRange = 2,
    /// `"val1,val2,..."`
    Enum = 3,
    ExpEasing = 4,
    /// `"flag1,flag2,..."` as bit flags
    Flags = 7,
    Layers2DRenderer = 8,
    Layers2DPhysics = 9,
    Layers2DNavigation = 10,
    Layers3DRenderer = 11,
    Layers3DPhysics = 12,
    Layers3DNavigation = 13,
    File = 14,
    Dir = 15,
    GlobalFile = 16,
    GlobalDir = 17,
    ResourceType = 18,
    MultilineText = 19,
    PlaceholderText = 20,
    ColorNoAlpha = 21,
    ImageCompressLossy = 22,
    ImageCompressLossless = 23,
    ObjectId = 24,
    TypeString = 25,
    NodePathToEditedNode = 26,
    PropertyOfVariantType = 27,
    ObjectTooBig = 28,
    NodePathValidTypes = 29,
    SaveFile = 30,
    IntIsObjectId = 31,
    EnumSuggestion = 32,
    LocaleId = 33,
}

impl PropertyHint {
    const ALL: [Self; 32] = [
        Self::None,
        Self::Range,
        Self::ExpRange,
        Self::Enum,
        Self::ExpEasing,
        Self::Flags,
        Self::Layers2DRenderer,
        Self::Layers2DPhysics,
        Self::Layers2DNavigation,
        Self::Layers3DRenderer,
        Self::Layers3DPhysics,
        Self::Layers3DNavigation,
        Self::File,
        Self::Dir,
        Self::GlobalFile,
        Self::GlobalDir,
        Self::ResourceType,
        Self::MultilineText,
        Self::PlaceholderText,
        Self::ColorNoAlpha,
        Self::ImageCompressLossy,
        Self::ImageCompressLossless,
        Self::ObjectId,
        Self::TypeString,
        Self::NodePathToEditedNode,
        Self::PropertyOfVariantType,
        Self::ObjectTooBig,
        Self::NodePathValidTypes,
        Self::SaveFile,
        Self::IntIsObjectId,
        Self::EnumSuggestion,
        Self::LocaleId,
    ];

    #[must_use]
    pub const fn as_i64(self) -> i64 {
        self as i64
    }

    /// Unknown values map to `None`.
    #[must_use]
    pub fn from_i64(value: i64) -> Self {
        Self::ALL
            .into_iter()
            .find(|h| h.as_i64() == value)
            .unwrap_or_default()
    }
}

bitflags! {
    /// Where and how a property is used.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PropertyUsage: u32 {
        const STORAGE = 1;
        const EDITOR = 1 << 1;
        const CHECKABLE = 1 << 4;
        const CHECKED = 1 << 5;
        const INTERNATIONALIZED = 1 << 6;
        const GROUP = 1 << 7;
        const CATEGORY = 1 << 8;
        const NO_INSTANCE_STATE = 1 << 11;
        const RESTART_IF_CHANGED = 1 << 12;
        const SCRIPT_VARIABLE = 1 << 13;
        const STORE_IF_NULL = 1 << 14;
        const NIL_IS_VARIANT = 1 << 19;
        const INTERNAL = 1 << 20;
        const ARRAY = 1 << 26;

        const DEFAULT = Self::STORAGE.bits() | Self::EDITOR.bits();
        const NOEDITOR = Self::STORAGE.bits();
    }
}

impl Default for PropertyUsage {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Describes one reflective property, or a grouping marker when `usage`
/// contains `GROUP` or `CATEGORY`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PropertyInfo {
    pub name: String,
    pub class_name: String,
    pub variant_type: VariantType,
    pub hint: PropertyHint,
    pub hint_string: String,
    pub usage: PropertyUsage,
}

impl PropertyInfo {
    #[must_use]
    pub fn new(variant_type: VariantType, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            variant_type,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_hint(mut self, hint: PropertyHint, hint_string: impl Into<String>) -> Self {
        self.hint = hint;
        self.hint_string = hint_string.into();
        self
    }

    #[must_use]
    pub fn with_usage(mut self, usage: PropertyUsage) -> Self {
        self.usage = usage;
        self
    }

    #[must_use]
    pub fn with_class_name(mut self, class_name: impl Into<String>) -> Self {
        self.class_name = class_name.into();
        self
    }

    /// A property group marker; `prefix` selects the properties it gathers.
    #[must_use]
    pub fn group(name: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hint_string: prefix.into(),
            usage: PropertyUsage::GROUP,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn to_dict(&self) -> Dictionary {
        let mut d = Dictionary::new();
        d.insert("name", self.name.as_str());
        d.insert("class_name", self.class_name.as_str());
        d.insert("type", self.variant_type.as_i64());
        d.insert("hint", self.hint.as_i64());
        d.insert("hint_string", self.hint_string.as_str());
        d.insert("usage", i64::from(self.usage.bits()));
        d
    }

    /// Keys missing from `dict` keep their default value.
    #[must_use]
    pub fn from_dict(dict: &Dictionary) -> Self {
        let mut info = Self::default();
        if let Some(name) = dict.get_str("name").and_then(Variant::as_str) {
            name.clone_into(&mut info.name);
        }
        if let Some(class_name) = dict.get_str("class_name").and_then(Variant::as_str) {
            class_name.clone_into(&mut info.class_name);
        }
        if let Some(ty) = dict
            .get_str("type")
            .and_then(Variant::as_int)
            .and_then(VariantType::from_i64)
        {
            info.variant_type = ty;
        }
        if let Some(hint) = dict.get_str("hint").and_then(Variant::as_int) {
            info.hint = PropertyHint::from_i64(hint);
        }
        if let Some(hint_string) = dict.get_str("hint_string").and_then(Variant::as_str) {
            hint_string.clone_into(&mut info.hint_string);
        }
        if let Some(usage) = dict.get_str("usage").and_then(Variant::as_int) {
            info.usage = PropertyUsage::from_bits_retain(usage as u32);
        }
        info
    }
}

impl From<PropertyInfo> for Variant {
    fn from(value: PropertyInfo) -> Self {
        Self::Dictionary(value.to_dict())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_usage() {
        let info = PropertyInfo::new(VariantType::Int, "x");
        assert_eq!(info.usage, PropertyUsage::STORAGE | PropertyUsage::EDITOR);
        assert_eq!(PropertyUsage::NOEDITOR, PropertyUsage::STORAGE);
    }

    #[test]
    fn test_dict_keys() {
        let info = PropertyInfo::new(VariantType::Float, "speed")
            .with_hint(PropertyHint::Range, "0,10,0.1")
            .with_usage(PropertyUsage::STORAGE);
        let dict = info.to_dict();
        let keys: Vec<_> = dict.keys().filter_map(Variant::as_str).collect();
        assert_eq!(
            keys,
            ["name", "class_name", "type", "hint", "hint_string", "usage"]
        );
        assert_eq!(dict.get_str("type"), Some(&Variant::Int(3)));
        assert_eq!(dict.get_str("hint"), Some(&Variant::Int(1)));
        assert_eq!(PropertyInfo::from_dict(&dict), info);
    }

    #[test]
    fn test_from_partial_dict() {
        let dict: Dictionary = [("name", Variant::from("only_name"))].into_iter().collect();
        let info = PropertyInfo::from_dict(&dict);
        assert_eq!(info.name, "only_name");
        assert_eq!(info.variant_type, VariantType::Nil);
        assert_eq!(info.usage, PropertyUsage::DEFAULT);
    }

    #[test]
    fn test_hint_values_are_stable() {
        assert_eq!(PropertyHint::Flags.as_i64(), 7);
        assert_eq!(PropertyHint::File.as_i64(), 14);
        assert_eq!(PropertyHint::LocaleId.as_i64(), 33);
        assert_eq!(PropertyHint::from_i64(5), PropertyHint::None);
        assert_eq!(PropertyHint::from_i64(18), PropertyHint::ResourceType);
    }

    #[test]
    fn test_group_marker() {
        let group = PropertyInfo::group("Motion", "motion_");
        assert_eq!(group.variant_type, VariantType::Nil);
        assert_eq!(group.usage, PropertyUsage::GROUP);
        assert_eq!(group.hint_string, "motion_");
    }
}
