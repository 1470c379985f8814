//! Reflective property access.
//!
//! `Object::set` and `Object::get` walk a fixed list of resolver stages.
//! Each stage either handles the name, rejects it (stopping the walk with
//! an invalid result) or passes it on:
//!
//! 1. the attached script
//! 2. the class property table
//! 3. the reserved `script` and `__meta__` names
//! 4. the native `set_named` / `get_named` hook
//! 5. the native key/value store
//! 6. the script fallback store

use tracing::{error, trace};

use crate::class_db::PropertyWrite;
use crate::object::Object;
use crate::variant::Variant;

/// Outcome of one resolver stage.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution<T> {
    Handled(T),
    /// The stage owns the name but the access is invalid.
    Rejected,
    Pass,
}

type SetStage = fn(&Object, &str, &Variant) -> Resolution<()>;
type GetStage = fn(&Object, &str) -> Resolution<Variant>;

const SET_STAGES: [(&str, SetStage); 6] = [
    ("script", set_script),
    ("class", set_class_table),
    ("reserved", set_reserved),
    ("native", set_native),
    ("keyed", set_keyed),
    ("script fallback", set_script_fallback),
];

const GET_STAGES: [(&str, GetStage); 6] = [
    ("script", get_script),
    ("class", get_class_table),
    ("reserved", get_reserved),
    ("native", get_native),
    ("keyed", get_keyed),
    ("script fallback", get_script_fallback),
];

/// Names of the resolver stages, in the order they are tried.
#[must_use]
pub fn resolver_stages() -> impl Iterator<Item = &'static str> {
    SET_STAGES.iter().map(|(name, _)| *name)
}

fn set_script(object: &Object, name: &str, value: &Variant) -> Resolution<()> {
    match object.script_instance() {
        Some(script) if script.set(name, value) => Resolution::Handled(()),
        _ => Resolution::Pass,
    }
}

fn get_script(object: &Object, name: &str) -> Resolution<Variant> {
    object
        .script_instance()
        .and_then(|script| script.get(name))
        .map_or(Resolution::Pass, Resolution::Handled)
}

fn set_class_table(object: &Object, name: &str, value: &Variant) -> Resolution<()> {
    match object.class_db().set_property(object, name, value) {
        PropertyWrite::Unhandled => Resolution::Pass,
        PropertyWrite::Handled(true) => Resolution::Handled(()),
        PropertyWrite::Handled(false) => Resolution::Rejected,
    }
}

fn get_class_table(object: &Object, name: &str) -> Resolution<Variant> {
    object
        .class_db()
        .get_property(object, name)
        .map_or(Resolution::Pass, Resolution::Handled)
}

fn set_reserved(object: &Object, name: &str, value: &Variant) -> Resolution<()> {
    match name {
        "script" => {
            if value.is_nil() {
                object.set_script_instance(None);
                Resolution::Handled(())
            } else {
                error!("{}: only Nil can be assigned to 'script'", object);
                Resolution::Rejected
            }
        }
        "__meta__" => match value.as_dictionary() {
            Some(dict) => {
                object.state().metadata = dict.clone();
                Resolution::Handled(())
            }
            None => Resolution::Rejected,
        },
        _ => Resolution::Pass,
    }
}

fn get_reserved(object: &Object, name: &str) -> Resolution<Variant> {
    match name {
        "script" => Resolution::Handled(
            object
                .script_instance()
                .map_or(Variant::Nil, |script| Variant::String(script.script_path())),
        ),
        "__meta__" => Resolution::Handled(Variant::Dictionary(object.state().metadata.clone())),
        _ => Resolution::Pass,
    }
}

fn set_native(object: &Object, name: &str, value: &Variant) -> Resolution<()> {
    if object.native_mut().set_named(name, value) {
        Resolution::Handled(())
    } else {
        Resolution::Pass
    }
}

fn get_native(object: &Object, name: &str) -> Resolution<Variant> {
    object
        .native_mut()
        .get_named(name)
        .map_or(Resolution::Pass, Resolution::Handled)
}

fn set_keyed(object: &Object, name: &str, value: &Variant) -> Resolution<()> {
    if object.native_mut().setvar(&Variant::from(name), value) {
        Resolution::Handled(())
    } else {
        Resolution::Pass
    }
}

fn get_keyed(object: &Object, name: &str) -> Resolution<Variant> {
    object
        .native_mut()
        .getvar(&Variant::from(name))
        .map_or(Resolution::Pass, Resolution::Handled)
}

fn set_script_fallback(object: &Object, name: &str, value: &Variant) -> Resolution<()> {
    match object.script_instance() {
        Some(script) if script.property_set_fallback(name, value) => Resolution::Handled(()),
        _ => Resolution::Pass,
    }
}

fn get_script_fallback(object: &Object, name: &str) -> Resolution<Variant> {
    object
        .script_instance()
        .and_then(|script| script.property_get_fallback(name))
        .map_or(Resolution::Pass, Resolution::Handled)
}

impl Object {
    /// Write property `name`. Returns whether some stage accepted it.
    pub fn set(&self, name: &str, value: &Variant) -> bool {
        if self.is_freed() {
            return false;
        }
        for (stage, resolve) in SET_STAGES {
            match resolve(self, name, value) {
                Resolution::Handled(()) => {
                    trace!("{}.{} set by {} stage", self, name, stage);
                    return true;
                }
                Resolution::Rejected => return false,
                Resolution::Pass => {}
            }
        }
        false
    }

    /// Read property `name`; `None` when no stage knows it.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Variant> {
        if self.is_freed() {
            return None;
        }
        for (stage, resolve) in GET_STAGES {
            match resolve(self, name) {
                Resolution::Handled(value) => {
                    trace!("{}.{} read by {} stage", self, name, stage);
                    return Some(value);
                }
                Resolution::Rejected => return None,
                Resolution::Pass => {}
            }
        }
        None
    }
}
