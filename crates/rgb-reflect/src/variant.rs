//! Dynamically typed values passed through reflective calls.

use core::fmt;

use crate::hash::{
    HASH_SEED, float_equal, hash_djb2, hash_djb2_one_32, hash_djb2_one_64, hash_djb2_one_float,
};
use crate::object_db::ObjectId;

/// Runtime type tag of a [`Variant`].
///
/// The discriminants are part of the API hash and of the dictionary
/// interchange format; never reorder them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[repr(u8)]
pub enum VariantType {
    #[default]
    Nil = 0,
    Bool = 1,
    Int = 2,
    Float = 3,
    String = 4,
    Array = 5,
    Dictionary = 6,
    Object = 7,
}

impl VariantType {
    pub const ALL: [Self; 8] = [
        Self::Nil,
        Self::Bool,
        Self::Int,
        Self::Float,
        Self::String,
        Self::Array,
        Self::Dictionary,
        Self::Object,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Nil => "Nil",
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::String => "String",
            Self::Array => "Array",
            Self::Dictionary => "Dictionary",
            Self::Object => "Object",
        }
    }

    #[must_use]
    pub const fn as_i64(self) -> i64 {
        self as i64
    }

    #[must_use]
    pub fn from_i64(value: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_i64() == value)
    }
}

impl fmt::Display for VariantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Insertion-ordered map from [`Variant`] keys to values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dictionary {
    entries: Vec<(Variant, Variant)>,
}

impl Dictionary {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn get(&self, key: &Variant) -> Option<&Variant> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Lookup by string key, the common case for interchange dictionaries.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&Variant> {
        self.entries
            .iter()
            .find(|(k, _)| k.as_str() == Some(key))
            .map(|(_, v)| v)
    }

    #[must_use]
    pub fn contains_key(&self, key: &Variant) -> bool {
        self.get(key).is_some()
    }

    /// Insert or replace; a replaced entry keeps its position.
    pub fn insert(&mut self, key: impl Into<Variant>, value: impl Into<Variant>) -> Option<Variant> {
        let key = key.into();
        let value = value.into();
        if let Some((_, slot)) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            return Some(core::mem::replace(slot, value));
        }
        self.entries.push((key, value));
        None
    }

    pub fn remove(&mut self, key: &Variant) -> Option<Variant> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(index).1)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Variant, &Variant)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &Variant> {
        self.entries.iter().map(|(k, _)| k)
    }

    pub fn values(&self) -> impl Iterator<Item = &Variant> {
        self.entries.iter().map(|(_, v)| v)
    }

    #[must_use]
    pub fn hash(&self) -> u32 {
        self.entries.iter().fold(
            hash_djb2_one_32(VariantType::Dictionary as u32, HASH_SEED),
            |h, (k, v)| hash_djb2_one_32(v.hash(), hash_djb2_one_32(k.hash(), h)),
        )
    }
}

impl<K: Into<Variant>, V: Into<Variant>> FromIterator<(K, V)> for Dictionary {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut dict = Self::new();
        for (k, v) in iter {
            dict.insert(k, v);
        }
        dict
    }
}

/// A dynamically typed value.
///
/// `Object` holds an instance id, never an owning handle: resolving it goes
/// through the object registry and yields nothing once the object is gone.
#[derive(Debug, Clone, Default)]
pub enum Variant {
    #[default]
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Vec<Variant>),
    Dictionary(Dictionary),
    Object(ObjectId),
}

impl Variant {
    #[must_use]
    pub const fn get_type(&self) -> VariantType {
        match self {
            Self::Nil => VariantType::Nil,
            Self::Bool(_) => VariantType::Bool,
            Self::Int(_) => VariantType::Int,
            Self::Float(_) => VariantType::Float,
            Self::String(_) => VariantType::String,
            Self::Array(_) => VariantType::Array,
            Self::Dictionary(_) => VariantType::Dictionary,
            Self::Object(_) => VariantType::Object,
        }
    }

    #[must_use]
    pub const fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }

    /// Whether a value of type `from` may be passed where `to` is declared.
    ///
    /// `Nil` as a target means "any value"; a `Nil` value only satisfies an
    /// `Object` slot (the null object).
    #[must_use]
    pub fn can_convert_strict(from: VariantType, to: VariantType) -> bool {
        use VariantType as T;

        if from == to {
            return true;
        }
        if to == T::Nil {
            return true;
        }
        if from == T::Nil {
            return to == T::Object;
        }
        match to {
            T::Bool => matches!(from, T::Int | T::Float),
            T::Int => matches!(from, T::Bool | T::Float),
            T::Float => matches!(from, T::Bool | T::Int),
            _ => false,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_array(&self) -> Option<&[Variant]> {
        match self {
            Self::Array(a) => Some(a),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_dictionary(&self) -> Option<&Dictionary> {
        match self {
            Self::Dictionary(d) => Some(d),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_object_id(&self) -> Option<ObjectId> {
        match self {
            Self::Object(id) => Some(*id),
            _ => None,
        }
    }

    /// Stable 32-bit hash, used when default argument values are folded
    /// into the API hash.
    #[must_use]
    pub fn hash(&self) -> u32 {
        match self {
            Self::Nil => 0,
            Self::Bool(b) => u32::from(*b),
            Self::Int(i) => *i as u32,
            Self::Float(f) => hash_djb2_one_float(*f, HASH_SEED),
            Self::String(s) => hash_djb2(s),
            Self::Array(items) => items.iter().fold(
                hash_djb2_one_32(VariantType::Array as u32, HASH_SEED),
                |h, v| hash_djb2_one_32(v.hash(), h),
            ),
            Self::Dictionary(d) => d.hash(),
            Self::Object(id) => hash_djb2_one_64(id.raw(), u64::from(HASH_SEED)) as u32,
        }
    }
}

impl PartialEq for Variant {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Nil, Self::Nil) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => float_equal(*a, *b),
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => a == b,
            (Self::Dictionary(a), Self::Dictionary(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nil => f.write_str("Null"),
            Self::Bool(b) => f.write_str(if *b { "True" } else { "False" }),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::String(s) => f.write_str(s),
            Self::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Self::Dictionary(d) => {
                f.write_str("{")?;
                for (i, (k, v)) in d.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}:{v}")?;
                }
                f.write_str("}")
            }
            Self::Object(id) if id.is_null() => f.write_str("[Object:null]"),
            Self::Object(id) => write!(f, "[Object:{}]", id.raw()),
        }
    }
}

/// Conversion of a Rust return value into a [`Variant`].
pub trait ToVariant {
    /// Declared type advertised for reflection. `Nil` means "any".
    const VARIANT_TYPE: VariantType;
    /// `false` only for `()`.
    const RETURNS: bool = true;
    /// `true` when the value is an untyped `Variant`.
    const IS_VARIANT: bool = false;

    fn to_variant(self) -> Variant;
}

/// Conversion of a reflective argument into a Rust value.
///
/// Accepts exactly the source types allowed by
/// [`Variant::can_convert_strict`].
pub trait FromVariant: Sized {
    const VARIANT_TYPE: VariantType;
    const IS_VARIANT: bool = false;

    fn from_variant(value: &Variant) -> Option<Self>;
}

impl ToVariant for () {
    const VARIANT_TYPE: VariantType = VariantType::Nil;
    const RETURNS: bool = false;

    fn to_variant(self) -> Variant {
        Variant::Nil
    }
}

impl ToVariant for Variant {
    const VARIANT_TYPE: VariantType = VariantType::Nil;
    const IS_VARIANT: bool = true;

    fn to_variant(self) -> Variant {
        self
    }
}

impl FromVariant for Variant {
    const VARIANT_TYPE: VariantType = VariantType::Nil;
    const IS_VARIANT: bool = true;

    fn from_variant(value: &Variant) -> Option<Self> {
        Some(value.clone())
    }
}

impl From<bool> for Variant {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl ToVariant for bool {
    const VARIANT_TYPE: VariantType = VariantType::Bool;

    fn to_variant(self) -> Variant {
        Variant::Bool(self)
    }
}

impl FromVariant for bool {
    const VARIANT_TYPE: VariantType = VariantType::Bool;

    fn from_variant(value: &Variant) -> Option<Self> {
        match value {
            Variant::Bool(b) => Some(*b),
            Variant::Int(i) => Some(*i != 0),
            Variant::Float(f) => Some(*f != 0.0),
            _ => None,
        }
    }
}

macro_rules! impl_int_variant {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Variant {
                fn from(value: $ty) -> Self {
                    Self::Int(value as i64)
                }
            }

            impl ToVariant for $ty {
                const VARIANT_TYPE: VariantType = VariantType::Int;

                fn to_variant(self) -> Variant {
                    Variant::Int(self as i64)
                }
            }

            impl FromVariant for $ty {
                const VARIANT_TYPE: VariantType = VariantType::Int;

                fn from_variant(value: &Variant) -> Option<Self> {
                    match value {
                        Variant::Int(i) => Some(*i as $ty),
                        Variant::Bool(b) => Some(<$ty>::from(*b)),
                        Variant::Float(f) => Some(*f as $ty),
                        _ => None,
                    }
                }
            }
        )*
    };
}

impl_int_variant!(i8, i16, i32, i64, u8, u16, u32, u64, usize);

macro_rules! impl_float_variant {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Variant {
                fn from(value: $ty) -> Self {
                    Self::Float(f64::from(value))
                }
            }

            impl ToVariant for $ty {
                const VARIANT_TYPE: VariantType = VariantType::Float;

                fn to_variant(self) -> Variant {
                    Variant::Float(f64::from(self))
                }
            }

            impl FromVariant for $ty {
                const VARIANT_TYPE: VariantType = VariantType::Float;

                fn from_variant(value: &Variant) -> Option<Self> {
                    match value {
                        Variant::Float(f) => Some(*f as $ty),
                        Variant::Int(i) => Some(*i as $ty),
                        Variant::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
                        _ => None,
                    }
                }
            }
        )*
    };
}

impl_float_variant!(f32, f64);

impl From<&str> for Variant {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for Variant {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl ToVariant for String {
    const VARIANT_TYPE: VariantType = VariantType::String;

    fn to_variant(self) -> Variant {
        Variant::String(self)
    }
}

impl ToVariant for &str {
    const VARIANT_TYPE: VariantType = VariantType::String;

    fn to_variant(self) -> Variant {
        Variant::String(self.to_owned())
    }
}

impl FromVariant for String {
    const VARIANT_TYPE: VariantType = VariantType::String;

    fn from_variant(value: &Variant) -> Option<Self> {
        value.as_str().map(str::to_owned)
    }
}

impl From<Vec<Variant>> for Variant {
    fn from(value: Vec<Variant>) -> Self {
        Self::Array(value)
    }
}

impl ToVariant for Vec<Variant> {
    const VARIANT_TYPE: VariantType = VariantType::Array;

    fn to_variant(self) -> Variant {
        Variant::Array(self)
    }
}

impl FromVariant for Vec<Variant> {
    const VARIANT_TYPE: VariantType = VariantType::Array;

    fn from_variant(value: &Variant) -> Option<Self> {
        value.as_array().map(<[Variant]>::to_vec)
    }
}

impl ToVariant for Vec<String> {
    const VARIANT_TYPE: VariantType = VariantType::Array;

    fn to_variant(self) -> Variant {
        Variant::Array(self.into_iter().map(Variant::String).collect())
    }
}

impl From<Dictionary> for Variant {
    fn from(value: Dictionary) -> Self {
        Self::Dictionary(value)
    }
}

impl ToVariant for Dictionary {
    const VARIANT_TYPE: VariantType = VariantType::Dictionary;

    fn to_variant(self) -> Variant {
        Variant::Dictionary(self)
    }
}

impl FromVariant for Dictionary {
    const VARIANT_TYPE: VariantType = VariantType::Dictionary;

    fn from_variant(value: &Variant) -> Option<Self> {
        value.as_dictionary().cloned()
    }
}

impl From<ObjectId> for Variant {
    fn from(value: ObjectId) -> Self {
        Self::Object(value)
    }
}

impl ToVariant for ObjectId {
    const VARIANT_TYPE: VariantType = VariantType::Object;

    fn to_variant(self) -> Variant {
        Variant::Object(self)
    }
}

impl FromVariant for ObjectId {
    const VARIANT_TYPE: VariantType = VariantType::Object;

    fn from_variant(value: &Variant) -> Option<Self> {
        match value {
            Variant::Object(id) => Some(*id),
            Variant::Nil => Some(ObjectId::NULL),
            _ => None,
        }
    }
}
