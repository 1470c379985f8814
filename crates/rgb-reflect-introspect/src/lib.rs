//! Introspection layer for RGB Reflect.
//!
//! Turns a class registry into serializable descriptors so tooling and
//! other languages can consume the reflected API without linking the
//! runtime, and compares dumps to catch API drift between builds.
//!
//! # Usage
//!
//! ```ignore
//! use rgb_reflect::{ApiType, Config, Context};
//! use rgb_reflect_introspect::ApiDump;
//!
//! let ctx = Context::new(Config::default());
//! let dump = ApiDump::capture(ctx.class_db(), ApiType::Core)?;
//! dump.save("api.json")?;
//!
//! let previous = ApiDump::load("api.previous.json")?;
//! if !previous.diff(&dump).is_empty() {
//!     tracing::warn!("API changed");
//! }
//! ```

mod descriptor;
mod dump;
mod error;
mod snapshot;

pub use descriptor::{
    ArgumentDescriptor, ClassDescriptor, ConstantDescriptor, MethodDescriptor, PropertyDescriptor,
    SignalDescriptor, api_name, variant_to_json,
};
pub use dump::{ApiDiff, ApiDump, DUMP_FORMAT};
pub use error::IntrospectError;
pub use snapshot::{ObjectEntry, ObjectSnapshot};
