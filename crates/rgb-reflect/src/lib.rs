#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::redundant_pub_crate)]
#![allow(clippy::float_cmp)]

//! RGB Reflect - class registry, object model and signals
//!
//! Runtime reflection for engine objects: classes are registered by name
//! with a parent, bound methods, constants, signals and properties, and
//! objects are driven through that table without compile-time knowledge of
//! their type.
//!
//! # Key Concepts
//!
//! - **ClassDb**: the class registry (hierarchy, methods, properties, API hash)
//! - **ObjectDb**: live instances by [`ObjectId`]
//! - **Object**: a reference-counted handle to one live instance
//! - **MethodBind**: a typed Rust function exposed as a reflective method
//! - **Signal**: a named event; connections deliver it to target methods
//! - **Context**: bundles the registries; one per runtime
//!
//! # Example
//!
//! ```ignore
//! use rgb_reflect::prelude::*;
//!
//! #[derive(Default)]
//! struct Counter {
//!     value: i64,
//! }
//!
//! impl NativeClass for Counter {}
//!
//! let ctx = Context::new(Config::default());
//! let db = ctx.class_db();
//! db.register_class("Counter", "Object", Some(|| Box::new(Counter::default())))?;
//! db.bind_method("Counter", MethodBind::new("add", |c: &mut Counter, n: i64| {
//!     c.value += n;
//!     c.value
//! }))?;
//!
//! let counter = ctx.instance("Counter")?;
//! assert_eq!(counter.call("add", &[Variant::Int(2)]), Ok(Variant::Int(2)));
//! ```

mod call_error;
mod class_db;
mod config;
mod context;
mod core_types;
mod dispatch;
mod error;
pub mod hash;
mod message_queue;
mod method_bind;
mod method_info;
mod native;
mod object;
mod object_db;
mod property_info;
mod script;
mod signal;
mod variant;

pub use call_error::{CallError, CallResult};
pub use class_db::{ApiType, ClassDb, ClassInfo, Factory, PropertySetGet, PropertyWrite};
pub use config::{Config, VERSION};
pub use context::Context;
pub use dispatch::{Resolution, resolver_stages};
pub use error::{ReflectError, ReflectResult};
pub use message_queue::{Message, MessageQueue};
pub use method_bind::{ArgumentType, Invoker, MethodBind, NativeMethod, marker};
pub use method_info::{MethodFlags, MethodInfo};
pub use native::{AsAny, Bare, NativeClass, downcast_mut, downcast_ref};
pub use object::Object;
pub use object_db::{ObjectDb, ObjectId};
pub use property_info::{PropertyHint, PropertyInfo, PropertyUsage};
pub use script::ScriptInstance;
pub use signal::{ConnectFlags, Connection};
pub use variant::{Dictionary, FromVariant, ToVariant, Variant, VariantType};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        CallError, CallResult, ClassDb, Config, ConnectFlags, Context, MethodBind, MethodInfo,
        NativeClass, Object, ObjectId, PropertyInfo, PropertyUsage, ReflectError, ReflectResult,
        ScriptInstance, Variant, VariantType,
    };
}
