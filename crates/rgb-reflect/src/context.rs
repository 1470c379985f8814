//! The runtime context.
//!
//! A [`Context`] bundles the class registry, the instance registry and the
//! deferred message queue. Most programs install one with [`Context::init`]
//! and reach it through [`Context::global`]; tests build isolated ones with
//! [`Context::new`].

use std::sync::Arc;

use hashbrown::HashMap;
use once_cell::sync::OnceCell;
use tracing::{debug, error, info, warn};

use crate::class_db::{ClassDb, DEFAULT_VALUE_USAGE};
pub use crate::config::Config;
use crate::core_types::register_core_types;
use crate::error::ReflectResult;
use crate::message_queue::MessageQueue;
use crate::object::Object;
use crate::object_db::ObjectDb;
use crate::variant::Variant;

static GLOBAL: OnceCell<Arc<Context>> = OnceCell::new();

pub struct Context {
    class_db: ClassDb,
    object_db: ObjectDb,
    message_queue: MessageQueue,
    config: Config,
}

impl Context {
    /// A fresh context with `Object` and `RefCounted` registered.
    #[must_use]
    pub fn new(config: Config) -> Arc<Self> {
        let class_db = ClassDb::new(config.api_version.clone());
        class_db.set_editor_hint(config.editor_hint);
        let ctx = Arc::new(Self {
            class_db,
            object_db: ObjectDb::new(),
            message_queue: MessageQueue::new(),
            config,
        });
        if let Err(err) = register_core_types(&ctx) {
            error!("Core type registration failed: {}", err);
        }
        ctx
    }

    /// Install the process-wide context. Later calls return the first one.
    pub fn init(config: Config) -> Arc<Self> {
        Arc::clone(GLOBAL.get_or_init(|| {
            info!("Initializing reflection runtime ({})", config.api_version);
            Self::new(config)
        }))
    }

    /// The process-wide context, if [`Context::init`] has run.
    #[must_use]
    pub fn global() -> Option<Arc<Self>> {
        GLOBAL.get().cloned()
    }

    #[must_use]
    pub fn class_db(&self) -> &ClassDb {
        &self.class_db
    }

    #[must_use]
    pub fn object_db(&self) -> &ObjectDb {
        &self.object_db
    }

    #[must_use]
    pub fn message_queue(&self) -> &MessageQueue {
        &self.message_queue
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Instance `class` through its registered factory.
    pub fn instance(self: &Arc<Self>, class: &str) -> ReflectResult<Object> {
        let (class, factory) = self.class_db.resolve_factory(class)?;
        let object = Object::new(Arc::clone(self), &class, factory());
        self.object_db.add_instance(&object)?;
        object.notification(Object::NOTIFICATION_POSTINITIALIZE, false);
        Ok(object)
    }

    /// Drain queued deferred calls. Meant for the frame driver.
    pub fn flush_messages(&self) -> usize {
        self.message_queue.flush(&self.object_db)
    }

    /// Value a fresh instance of `class` reports for `property`.
    ///
    /// The first query per class instances a probe object, records every
    /// stored or edited property and frees the probe again.
    pub fn class_get_default_property_value(
        self: &Arc<Self>,
        class: &str,
        property: &str,
    ) -> Option<Variant> {
        if !self.class_db.has_cached_default_values(class) {
            if !self.class_db.can_instance(class) {
                return None;
            }
            let probe = self.instance(class).ok()?;
            let mut values = HashMap::new();
            for info in probe.get_property_list(false) {
                if info.usage.intersects(DEFAULT_VALUE_USAGE) {
                    if let Some(value) = probe.get(&info.name) {
                        values.insert(info.name, value);
                    }
                }
            }
            if let Err(err) = probe.free() {
                warn!("Default value probe for '{}' was not freed: {}", class, err);
            }
            debug!("Cached {} default values for '{}'", values.len(), class);
            self.class_db.store_default_values(class, values);
        }
        self.class_db.cached_default_value(class, property)
    }

    /// Free every object still alive, after reporting it as leaked, then
    /// clear the class table. Returns the number of leaked objects.
    pub fn cleanup(&self) -> usize {
        while !self.message_queue.is_empty() {
            self.flush_messages();
        }
        let leaked = self.object_db.cleanup();
        let count = leaked.len();
        for object in leaked {
            object.release();
        }
        self.class_db.cleanup();
        count
    }
}

impl core::fmt::Debug for Context {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Context")
            .field("class_db", &self.class_db)
            .field("object_db", &self.object_db)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReflectError;

    #[test]
    fn test_new_registers_core_types() {
        let ctx = Context::new(Config::default());
        assert!(ctx.class_db().class_exists("Object"));
        assert!(ctx.class_db().is_parent_class("RefCounted", "Object"));
        assert_eq!(ctx.class_db().version(), ctx.config().api_version);
    }

    #[test]
    fn test_contexts_are_isolated() {
        let a = Context::new(Config::default());
        let b = Context::new(Config::default());
        a.class_db().register_class("OnlyA", "Object", None).unwrap();
        assert!(!b.class_db().class_exists("OnlyA"));
    }

    #[test]
    fn test_instance_unknown_class() {
        let ctx = Context::new(Config::default());
        assert_eq!(
            ctx.instance("Nope").unwrap_err(),
            ReflectError::ClassNotFound("Nope".into())
        );
    }

    #[test]
    fn test_global_is_installed_once() {
        let first = Context::init(Config::default().with_api_version("global-1"));
        let second = Context::init(Config::default().with_api_version("global-2"));
        assert!(Arc::ptr_eq(&first, &second));
        assert!(Context::global().is_some());
    }

    #[test]
    fn test_cleanup_frees_leaks() {
        let ctx = Context::new(Config::default());
        let object = ctx.instance("Object").unwrap();
        assert_eq!(ctx.cleanup(), 1);
        assert!(object.is_freed());
        assert!(ctx.class_db().is_empty());
    }
}
