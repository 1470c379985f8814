//! The instance registry.
//!
//! Maps instance ids to live objects so connections and deferred messages
//! can hold an id instead of an owning handle. A stale id simply resolves to
//! nothing.

use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};

use hashbrown::HashMap;
use parking_lot::RwLock;
use tracing::{trace, warn};

use crate::error::{ReflectError, ReflectResult, fail};
use crate::object::Object;

/// Process-unique instance id. Zero is the null id.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ObjectId(u64);

impl ObjectId {
    pub const NULL: Self = Self(0);

    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }

    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.0)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Live instances keyed by id.
pub struct ObjectDb {
    instances: RwLock<HashMap<ObjectId, Object>>,
    /// Last id handed out; ids start at 2 and are never reused.
    counter: AtomicU64,
}

impl Default for ObjectDb {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectDb {
    #[must_use]
    pub fn new() -> Self {
        Self {
            instances: RwLock::new(HashMap::new()),
            counter: AtomicU64::new(1),
        }
    }

    /// Assign the next id to `object` and register it.
    pub fn add_instance(&self, object: &Object) -> ReflectResult<ObjectId> {
        let current = object.get_instance_id();
        if !current.is_null() {
            fail!(ReflectError::ObjectAlreadyRegistered(current));
        }
        let id = ObjectId(self.counter.fetch_add(1, Ordering::Relaxed) + 1);
        object.assign_instance_id(id);
        self.instances.write().insert(id, object.clone());
        trace!("Registered instance {}:{}", object.get_class(), id);
        Ok(id)
    }

    /// Unregister `id`; returns whether it was present.
    pub fn remove_instance(&self, id: ObjectId) -> bool {
        self.instances.write().remove(&id).is_some()
    }

    #[must_use]
    pub fn get_instance(&self, id: ObjectId) -> Option<Object> {
        if id.is_null() {
            return None;
        }
        self.instances.read().get(&id).cloned()
    }

    #[must_use]
    pub fn instance_validate(&self, id: ObjectId) -> bool {
        self.instances.read().contains_key(&id)
    }

    #[must_use]
    pub fn get_object_count(&self) -> usize {
        self.instances.read().len()
    }

    /// Visit every live object. The table is not locked while `visitor` runs.
    pub fn debug_objects(&self, mut visitor: impl FnMut(&Object)) {
        let objects: Vec<Object> = self.instances.read().values().cloned().collect();
        for object in &objects {
            visitor(object);
        }
    }

    /// Report and drain whatever is still registered.
    ///
    /// Returns the leaked objects ordered by id so the caller can free them.
    pub fn cleanup(&self) -> Vec<Object> {
        let mut leaked: Vec<(ObjectId, Object)> = self.instances.write().drain().collect();
        if leaked.is_empty() {
            return Vec::new();
        }
        leaked.sort_by_key(|(id, _)| *id);
        warn!("ObjectDB instances still exist!");
        for (_, object) in &leaked {
            warn!("Leaked instance: {}", leak_label(object));
        }
        leaked.into_iter().map(|(_, object)| object).collect()
    }
}

/// `Class:id`, plus the script path when one is attached.
fn leak_label(object: &Object) -> String {
    let mut label = format!("{}:{}", object.get_class(), object.get_instance_id());
    let path = object
        .get_script_instance()
        .map(|script| script.script_path())
        .unwrap_or_default();
    if !path.is_empty() {
        label.push_str(" - Resource path: ");
        label.push_str(&path);
    }
    label
}

impl fmt::Debug for ObjectDb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectDb")
            .field("objects", &self.get_object_count())
            .finish_non_exhaustive()
    }
}
