//! Whole-registry API dumps and their comparison.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use rgb_reflect::{ApiType, ClassDb};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::descriptor::{ClassDescriptor, api_name};
use crate::IntrospectError;

/// Bumped whenever the dump layout changes incompatibly.
pub const DUMP_FORMAT: u32 = 1;

/// Every exposed class of one API partition, plus its hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiDump {
    pub format: u32,
    pub version: String,
    pub api: String,
    pub hash: u64,
    /// Sorted by class name.
    pub classes: Vec<ClassDescriptor>,
}

/// Difference between two dumps of the same partition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    /// Present in both dumps with a different description.
    pub changed: Vec<String>,
    pub hash_changed: bool,
}

impl ApiDiff {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty() && !self.hash_changed
    }
}

impl ApiDump {
    /// Capture the exposed classes of `api` from `class_db`.
    pub fn capture(class_db: &ClassDb, api: ApiType) -> Result<Self, IntrospectError> {
        let mut classes = Vec::new();
        for class in class_db.get_class_list() {
            if class_db.get_api_type(&class) != api || !class_db.is_class_exposed(&class) {
                continue;
            }
            classes.push(ClassDescriptor::capture(class_db, &class)?);
        }
        let dump = Self {
            format: DUMP_FORMAT,
            version: class_db.version().to_owned(),
            api: api_name(api).to_owned(),
            hash: class_db.get_api_hash(api),
            classes,
        };
        debug!(
            "Captured {} API: {} classes, hash {:#x}",
            dump.api,
            dump.classes.len(),
            dump.hash
        );
        Ok(dump)
    }

    #[must_use]
    pub fn class(&self, name: &str) -> Option<&ClassDescriptor> {
        self.classes.iter().find(|c| c.name == name)
    }

    pub fn to_json(&self) -> Result<String, IntrospectError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> Result<String, IntrospectError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, IntrospectError> {
        let dump: Self = serde_json::from_str(json)?;
        if dump.format != DUMP_FORMAT {
            return Err(IntrospectError::UnsupportedFormat {
                found: dump.format,
                expected: DUMP_FORMAT,
            });
        }
        Ok(dump)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), IntrospectError> {
        let path = path.as_ref();
        fs::write(path, self.to_json_pretty()?)?;
        info!("Wrote {} API dump to {}", self.api, path.display());
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, IntrospectError> {
        Self::from_json(&fs::read_to_string(path)?)
    }

    /// What changed going from `self` to `newer`.
    #[must_use]
    pub fn diff(&self, newer: &Self) -> ApiDiff {
        let old: BTreeSet<&str> = self.classes.iter().map(|c| c.name.as_str()).collect();
        let new: BTreeSet<&str> = newer.classes.iter().map(|c| c.name.as_str()).collect();

        let changed = old
            .intersection(&new)
            .filter(|name| self.class(name) != newer.class(name))
            .map(|name| (*name).to_owned())
            .collect();

        ApiDiff {
            added: new.difference(&old).map(|name| (*name).to_owned()).collect(),
            removed: old.difference(&new).map(|name| (*name).to_owned()).collect(),
            changed,
            hash_changed: self.hash != newer.hash,
        }
    }
}

#[cfg(test)]
mod tests {
    use rgb_reflect::{Config, Context, MethodBind, NativeClass};

    use super::*;

    struct Probe;

    impl NativeClass for Probe {}

    fn probe() -> Box<dyn NativeClass> {
        Box::new(Probe)
    }

    #[test]
    fn test_capture_includes_core_types() {
        let ctx = Context::new(Config::default());
        let dump = ApiDump::capture(ctx.class_db(), ApiType::Core).unwrap();
        assert_eq!(dump.hash, ctx.class_db().get_api_hash(ApiType::Core));
        let names: Vec<&str> = dump.classes.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["Object", "RefCounted"]);
        assert!(dump.class("Object").unwrap().method("connect").is_some());
    }

    #[test]
    fn test_editor_partition_is_separate() {
        let ctx = Context::new(Config::default());
        ctx.class_db().set_current_api(ApiType::Editor);
        ctx.class_db()
            .register_class("Gizmo", "Object", Some(probe))
            .unwrap();

        let core = ApiDump::capture(ctx.class_db(), ApiType::Core).unwrap();
        let editor = ApiDump::capture(ctx.class_db(), ApiType::Editor).unwrap();
        assert!(core.class("Gizmo").is_none());
        assert_eq!(editor.classes.len(), 1);
        assert!(!editor.classes[0].instantiable);
    }

    #[test]
    fn test_diff() {
        let ctx = Context::new(Config::default());
        let before = ApiDump::capture(ctx.class_db(), ApiType::Core).unwrap();
        assert!(before.diff(&before).is_empty());

        let db = ctx.class_db();
        db.register_class("Probe", "Object", Some(probe)).unwrap();
        db.bind_method("RefCounted", MethodBind::new("ping", |_: &Probe| ()))
            .unwrap();
        let after = ApiDump::capture(db, ApiType::Core).unwrap();

        let diff = before.diff(&after);
        assert_eq!(diff.added, ["Probe"]);
        assert!(diff.removed.is_empty());
        assert_eq!(diff.changed, ["RefCounted"]);
        assert!(diff.hash_changed);

        let reverse = after.diff(&before);
        assert_eq!(reverse.removed, ["Probe"]);
    }

    #[test]
    fn test_json_round_trip() {
        let ctx = Context::new(Config::default());
        let dump = ApiDump::capture(ctx.class_db(), ApiType::Core).unwrap();
        let parsed = ApiDump::from_json(&dump.to_json().unwrap()).unwrap();
        assert_eq!(parsed, dump);
    }

    #[test]
    fn test_rejects_other_format() {
        let ctx = Context::new(Config::default());
        let mut dump = ApiDump::capture(ctx.class_db(), ApiType::Core).unwrap();
        dump.format = DUMP_FORMAT + 1;
        assert!(matches!(
            ApiDump::from_json(&dump.to_json().unwrap()),
            Err(IntrospectError::UnsupportedFormat { .. })
        ));
    }
}
