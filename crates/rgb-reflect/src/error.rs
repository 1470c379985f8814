//! Usage errors reported by the registry and the object model.

use thiserror::Error;

use crate::object_db::ObjectId;
use crate::variant::{ToVariant, Variant, VariantType};

/// Misuse of the reflection API, or a soft status from signal emission.
///
/// Each of these is also logged through `tracing::error!` where it is
/// detected; the failed operation leaves all state untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReflectError {
    #[error("class '{0}' is already registered")]
    ClassAlreadyRegistered(String),

    #[error("class '{class}' inherits from unregistered class '{parent}'")]
    ParentNotRegistered { class: String, parent: String },

    #[error("class not found: {0}")]
    ClassNotFound(String),

    #[error("class '{0}' is disabled")]
    ClassDisabled(String),

    #[error("class '{0}' has no factory")]
    ClassNotInstantiable(String),

    #[error("class '{0}' belongs to the editor API and cannot be instanced outside the editor")]
    PrivilegedApi(String),

    #[error("method '{class}::{method}' is already bound")]
    MethodAlreadyBound { class: String, method: String },

    #[error("method '{class}::{method}' has {names} argument names but only {arguments} arguments")]
    TooManyArgumentNames {
        class: String,
        method: String,
        names: usize,
        arguments: usize,
    },

    #[error("method not found: {class}::{method}")]
    MethodNotFound { class: String, method: String },

    #[error("constant '{class}::{name}' is already bound")]
    ConstantAlreadyBound { class: String, name: String },

    #[error("signal '{class}::{signal}' is already declared")]
    SignalAlreadyDeclared { class: String, signal: String },

    #[error("property '{class}::{property}' is already registered")]
    PropertyAlreadyRegistered { class: String, property: String },

    #[error("invalid {role} '{method}' for property '{class}::{property}'")]
    InvalidAccessor {
        class: String,
        property: String,
        role: &'static str,
        method: String,
    },

    #[error("user signal name cannot be empty")]
    EmptySignalName,

    #[error("signal '{0}' already exists")]
    UserSignalExists(String),

    #[error("nonexistent signal: {0}")]
    SignalNotFound(String),

    #[error("attempt to disconnect signal '{signal}' while emitting (locks: {locks})")]
    SignalLocked { signal: String, locks: u32 },

    #[error("signal '{signal}' is already connected to {target:?}::{method}")]
    AlreadyConnected {
        signal: String,
        target: ObjectId,
        method: String,
    },

    #[error("signal '{signal}' is not connected to {target:?}::{method}")]
    NotConnected {
        signal: String,
        target: ObjectId,
        method: String,
    },

    #[error("signals are blocked")]
    SignalsBlocked,

    #[error("signal '{0}' has no connections")]
    SignalUnavailable(String),

    #[error("{failed} deliveries of signal '{signal}' failed")]
    DeliveryFailed { signal: String, failed: usize },

    #[error("object {0:?} is locked and can't be freed")]
    ObjectLocked(ObjectId),

    #[error("attempt to delete object {0:?} in the middle of a signal emission from it")]
    DeleteWhileEmitting(ObjectId),

    #[error("deletion of object {0:?} was cancelled")]
    FreeCancelled(ObjectId),

    #[error("object {0:?} was already freed")]
    ObjectFreed(ObjectId),

    #[error("object {0:?} is already registered")]
    ObjectAlreadyRegistered(ObjectId),
}

/// Result type for registry and object operations.
pub type ReflectResult<T> = Result<T, ReflectError>;

impl ReflectError {
    /// Numeric status reported to reflective callers (0 is success).
    #[must_use]
    pub const fn code(&self) -> i64 {
        match self {
            Self::SignalUnavailable(_) => 2,
            Self::ObjectLocked(_) | Self::SignalLocked { .. } | Self::DeleteWhileEmitting(_) => 23,
            Self::SignalsBlocked => 28,
            Self::ClassAlreadyRegistered(_)
            | Self::MethodAlreadyBound { .. }
            | Self::ConstantAlreadyBound { .. }
            | Self::SignalAlreadyDeclared { .. }
            | Self::PropertyAlreadyRegistered { .. }
            | Self::UserSignalExists(_)
            | Self::ObjectAlreadyRegistered(_) => 32,
            Self::ClassNotFound(_) | Self::ObjectFreed(_) => 33,
            Self::DeliveryFailed { .. } | Self::MethodNotFound { .. } => 37,
            Self::ParentNotRegistered { .. }
            | Self::TooManyArgumentNames { .. }
            | Self::InvalidAccessor { .. }
            | Self::EmptySignalName
            | Self::SignalNotFound(_)
            | Self::AlreadyConnected { .. }
            | Self::NotConnected { .. } => 31,
            Self::ClassDisabled(_)
            | Self::ClassNotInstantiable(_)
            | Self::PrivilegedApi(_)
            | Self::FreeCancelled(_) => 1,
        }
    }
}

impl ToVariant for ReflectResult<()> {
    const VARIANT_TYPE: VariantType = VariantType::Int;

    fn to_variant(self) -> Variant {
        Variant::Int(self.map_or_else(|err| err.code(), |()| 0))
    }
}

/// Log the error at the call site and return it.
macro_rules! fail {
    ($err:expr) => {{
        let err = $err;
        tracing::error!("{}", err);
        return Err(err);
    }};
}

pub(crate) use fail;
