//! Snapshot of live objects for leak reports and debugging tools.

use rgb_reflect::ObjectDb;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectEntry {
    pub id: u64,
    pub class: String,
    /// Path of the attached script, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub meta: Vec<String>,
    /// Number of connections across all of the object's signals.
    pub outgoing: usize,
    pub incoming: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectSnapshot {
    /// Sorted by id.
    pub objects: Vec<ObjectEntry>,
}

impl ObjectSnapshot {
    #[must_use]
    pub fn capture(object_db: &ObjectDb) -> Self {
        let mut objects = Vec::with_capacity(object_db.get_object_count());
        object_db.debug_objects(|object| {
            objects.push(ObjectEntry {
                id: object.get_instance_id().raw(),
                class: object.get_class().to_owned(),
                script: object.get_script_instance().map(|s| s.script_path()),
                meta: object.get_meta_list(),
                outgoing: object.get_all_signal_connections().len(),
                incoming: object.get_signals_connected_to_this().len(),
            });
        });
        objects.sort_by_key(|entry| entry.id);
        Self { objects }
    }

    /// Live object count per class, sorted by class name.
    #[must_use]
    pub fn count_by_class(&self) -> Vec<(String, usize)> {
        let mut counts: Vec<(String, usize)> = Vec::new();
        let mut classes: Vec<&str> = self.objects.iter().map(|o| o.class.as_str()).collect();
        classes.sort_unstable();
        for class in classes {
            if let Some((last, count)) = counts.last_mut() {
                if last.as_str() == class {
                    *count += 1;
                    continue;
                }
            }
            counts.push((class.to_owned(), 1));
        }
        counts
    }
}
