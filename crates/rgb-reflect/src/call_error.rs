//! Errors returned by reflective calls.

use thiserror::Error;

use crate::variant::{Variant, VariantType};

/// Why a reflective call did not run.
///
/// A successful call is simply `Ok`; there is no "ok" variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CallError {
    #[error("method not found")]
    InvalidMethod,

    #[error("cannot convert argument {argument} to {expected}")]
    InvalidArgument {
        argument: usize,
        expected: VariantType,
    },

    #[error("too many arguments, expected {expected}")]
    TooManyArguments { expected: usize },

    #[error("too few arguments, expected {expected}")]
    TooFewArguments { expected: usize },

    #[error("instance is null")]
    InstanceIsNull,
}

/// Result of a reflective call.
pub type CallResult = Result<Variant, CallError>;

impl CallError {
    /// Human-readable description of a failed call, naming the method and
    /// the offending argument.
    #[must_use]
    pub fn describe(&self, class: &str, method: &str, args: &[Variant]) -> String {
        match *self {
            Self::InvalidArgument { argument, expected } => {
                let got = args
                    .get(argument)
                    .map_or(VariantType::Nil, Variant::get_type);
                format!(
                    "Invalid type in method '{class}.{method}'. Cannot convert argument {} from {got} to {expected}",
                    argument + 1
                )
            }
            Self::TooManyArguments { expected } => format!(
                "Invalid call to method '{class}.{method}'. Expected {expected} arguments, got {}",
                args.len()
            ),
            Self::TooFewArguments { expected } => format!(
                "Invalid call to method '{class}.{method}'. Expected {expected} arguments, got {}",
                args.len()
            ),
            Self::InvalidMethod => format!("Method not found: '{class}.{method}'"),
            Self::InstanceIsNull => format!("Instance is null while calling '{class}.{method}'"),
        }
    }
}
