//! Signals and connections.
//!
//! Each object keeps its own signal table: signal name to the slots
//! connected to it, keyed by `(target id, method)`. Targets are stored by id
//! and re-resolved through the instance registry on every delivery, so a
//! freed target is skipped rather than dangling. Each target also records
//! the connections pointing at it, which lets destruction unwind both
//! directions without scanning other objects.

use std::collections::BTreeMap;

use bitflags::bitflags;
use smallvec::SmallVec;
use tracing::{debug, error, trace};

use crate::call_error::CallError;
use crate::error::{ReflectError, ReflectResult, fail};
use crate::method_info::MethodInfo;
use crate::object::Object;
use crate::object_db::ObjectId;
use crate::variant::{Dictionary, Variant};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ConnectFlags: u32 {
        /// Deliver through the message queue instead of calling directly.
        const DEFERRED = 1;
        /// Saved with the scene; authored in the editor.
        const PERSIST = 1 << 1;
        /// Disconnect after the first emission.
        const ONESHOT = 1 << 2;
        /// Repeated connects stack a counter instead of failing.
        const REFERENCE_COUNTED = 1 << 3;
    }
}

/// One slot seen from the emitting side.
#[derive(Debug, Clone, PartialEq)]
pub struct Connection {
    pub source: ObjectId,
    pub signal: String,
    pub target: ObjectId,
    pub method: String,
    /// Appended to the emitted arguments on every delivery.
    pub binds: Vec<Variant>,
    pub flags: ConnectFlags,
}

impl Connection {
    #[must_use]
    pub fn to_dict(&self) -> Dictionary {
        let mut d = Dictionary::new();
        d.insert("source", self.source);
        d.insert("signal", self.signal.as_str());
        d.insert("target", self.target);
        d.insert("method", self.method.as_str());
        d.insert("binds", self.binds.clone());
        d.insert("flags", i64::from(self.flags.bits()));
        d
    }

    /// Keys missing from `dict` keep their default value.
    #[must_use]
    pub fn from_dict(dict: &Dictionary) -> Self {
        let object = |key| {
            dict.get_str(key)
                .and_then(Variant::as_object_id)
                .unwrap_or_default()
        };
        let string = |key| {
            dict.get_str(key)
                .and_then(Variant::as_str)
                .map(ToOwned::to_owned)
                .unwrap_or_default()
        };
        Self {
            source: object("source"),
            signal: string("signal"),
            target: object("target"),
            method: string("method"),
            binds: dict
                .get_str("binds")
                .and_then(Variant::as_array)
                .map(<[Variant]>::to_vec)
                .unwrap_or_default(),
            flags: dict
                .get_str("flags")
                .and_then(Variant::as_int)
                .map(|f| ConnectFlags::from_bits_retain(f as u32))
                .unwrap_or_default(),
        }
    }
}

impl From<Connection> for Variant {
    fn from(value: Connection) -> Self {
        Self::Dictionary(value.to_dict())
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Slot {
    pub(crate) conn: Connection,
    pub(crate) reference_count: i32,
}

/// Per-object state of one signal.
#[derive(Debug, Clone, Default)]
pub(crate) struct SignalData {
    /// Declaration of a user signal; unnamed for class and script signals.
    pub(crate) user: MethodInfo,
    pub(crate) slots: BTreeMap<(ObjectId, String), Slot>,
    /// Depth of emissions currently iterating this signal.
    pub(crate) lock: u32,
}

impl SignalData {
    fn is_user(&self) -> bool {
        !self.user.name.is_empty()
    }
}

impl Object {
    /// Declare a signal on this instance only.
    pub fn add_user_signal(&self, signal: MethodInfo) -> ReflectResult<()> {
        if signal.name.is_empty() {
            fail!(ReflectError::EmptySignalName);
        }
        if self.class_db().has_signal(self.get_class(), &signal.name) {
            fail!(ReflectError::UserSignalExists(signal.name));
        }
        let mut state = self.state();
        if state.signals.contains_key(&signal.name) {
            fail!(ReflectError::UserSignalExists(signal.name));
        }
        state.signals.insert(
            signal.name.clone(),
            SignalData {
                user: signal,
                ..SignalData::default()
            },
        );
        Ok(())
    }

    #[must_use]
    pub fn has_user_signal(&self, signal: &str) -> bool {
        self.state()
            .signals
            .get(signal)
            .is_some_and(SignalData::is_user)
    }

    /// Declared by the class table or by the attached script.
    fn has_declared_signal(&self, signal: &str) -> bool {
        self.class_db().has_signal(self.get_class(), signal)
            || self
                .script_instance()
                .is_some_and(|script| script.has_script_signal(signal))
    }

    /// Connect `signal` to `method` on `target`.
    pub fn connect(
        &self,
        signal: &str,
        target: &Object,
        method: &str,
        binds: Vec<Variant>,
        flags: ConnectFlags,
    ) -> ReflectResult<()> {
        if self.is_freed() {
            fail!(ReflectError::ObjectFreed(self.get_instance_id()));
        }
        if target.is_freed() {
            fail!(ReflectError::ObjectFreed(target.get_instance_id()));
        }
        let needs_entry = !self.state().signals.contains_key(signal);
        if needs_entry {
            let relaxed = self.context().config().relaxed_signals
                && self
                    .script_instance()
                    .is_some_and(|script| !script.is_valid());
            if !relaxed && !self.has_declared_signal(signal) {
                error!(
                    "In Object of type '{}': Attempt to connect nonexistent signal '{}' to method '{}.{}'",
                    self.get_class(),
                    signal,
                    target.get_class(),
                    method
                );
                return Err(ReflectError::SignalNotFound(signal.to_owned()));
            }
        }

        let conn = Connection {
            source: self.get_instance_id(),
            signal: signal.to_owned(),
            target: target.get_instance_id(),
            method: method.to_owned(),
            binds,
            flags,
        };
        {
            let mut state = self.state();
            let data = state.signals.entry(signal.to_owned()).or_default();
            let key = (conn.target, conn.method.clone());
            if let Some(slot) = data.slots.get_mut(&key) {
                if flags.contains(ConnectFlags::REFERENCE_COUNTED) {
                    slot.reference_count += 1;
                    return Ok(());
                }
                fail!(ReflectError::AlreadyConnected {
                    signal: signal.to_owned(),
                    target: conn.target,
                    method: conn.method,
                });
            }
            data.slots.insert(
                key,
                Slot {
                    conn: conn.clone(),
                    reference_count: i32::from(flags.contains(ConnectFlags::REFERENCE_COUNTED)),
                },
            );
        }
        trace!("Connected {}.{} -> {}.{}", self, signal, target, method);
        target.state().connections.push(conn);
        Ok(())
    }

    /// Remove one connection, or one reference of a reference-counted one.
    ///
    /// Fails while `signal` is being emitted from this object.
    pub fn disconnect(&self, signal: &str, target: &Object, method: &str) -> ReflectResult<()> {
        self.disconnect_slot(signal, target.get_instance_id(), method, false)
    }

    /// `force` drops the slot regardless of its reference count and of any
    /// emission in progress; destruction uses it to unwind.
    pub(crate) fn disconnect_slot(
        &self,
        signal: &str,
        target: ObjectId,
        method: &str,
        force: bool,
    ) -> ReflectResult<()> {
        let key = (target, method.to_owned());
        let removed = {
            let mut state = self.state();
            let Some(data) = state.signals.get_mut(signal) else {
                fail!(ReflectError::SignalNotFound(signal.to_owned()));
            };
            if !force && data.lock > 0 {
                fail!(ReflectError::SignalLocked {
                    signal: signal.to_owned(),
                    locks: data.lock,
                });
            }
            let Some(slot) = data.slots.get_mut(&key) else {
                fail!(ReflectError::NotConnected {
                    signal: signal.to_owned(),
                    target,
                    method: method.to_owned(),
                });
            };
            if !force {
                slot.reference_count -= 1;
                if slot.reference_count > 0 {
                    return Ok(());
                }
            }
            let removed = data.slots.remove(&key);
            let drop_entry = data.slots.is_empty() && !data.is_user();
            if drop_entry {
                state.signals.remove(signal);
            }
            removed
        };

        if let Some(slot) = removed {
            if let Some(peer) = self.context().object_db().get_instance(target) {
                peer.remove_incoming(&slot.conn);
            }
        }
        Ok(())
    }

    fn remove_incoming(&self, conn: &Connection) {
        let mut state = self.state();
        if let Some(pos) = state.connections.iter().position(|c| {
            c.source == conn.source && c.signal == conn.signal && c.method == conn.method
        }) {
            state.connections.remove(pos);
        }
    }

    fn has_slot(&self, signal: &str, target: ObjectId, method: &str) -> bool {
        self.state().signals.get(signal).is_some_and(|data| {
            data.slots
                .contains_key(&(target, method.to_owned()))
        })
    }

    /// Fails when `signal` is neither connected nor declared anywhere.
    pub fn is_connected(&self, signal: &str, target: &Object, method: &str) -> ReflectResult<bool> {
        {
            let state = self.state();
            if let Some(data) = state.signals.get(signal) {
                return Ok(data
                    .slots
                    .contains_key(&(target.get_instance_id(), method.to_owned())));
            }
        }
        if self.has_declared_signal(signal) {
            return Ok(false);
        }
        fail!(ReflectError::SignalNotFound(signal.to_owned()));
    }

    /// Deliver `signal` to every connected slot.
    ///
    /// Delivery iterates a snapshot of the slot table, so handlers may
    /// connect, disconnect or free objects freely; new slots only see later
    /// emissions. One-shot slots are removed after the loop.
    pub fn emit_signal(&self, signal: &str, args: &[Variant]) -> ReflectResult<()> {
        let snapshot: Vec<Connection> = {
            let mut state = self.state();
            if state.block_signals {
                return Err(ReflectError::SignalsBlocked);
            }
            let snapshot = state.signals.get_mut(signal).map(|data| {
                data.lock += 1;
                data.slots.values().map(|slot| slot.conn.clone()).collect()
            });
            drop(state);
            let Some(snapshot) = snapshot else {
                if !self.has_declared_signal(signal) {
                    error!("Can't emit non-existing signal \"{}\"", signal);
                }
                return Err(ReflectError::SignalUnavailable(signal.to_owned()));
            };
            snapshot
        };

        let _call_lock = self.lock_calls();
        let ctx = self.context();
        let editor_hint = ctx.class_db().is_editor_hint();
        let tool_script = self.script_instance().is_some_and(|s| s.is_tool());
        let mut failed = 0;
        let mut oneshots = Vec::new();

        for conn in &snapshot {
            let Some(target) = ctx.object_db().get_instance(conn.target) else {
                debug!("Skipping slot {}.{}: target is gone", conn.target, conn.method);
                continue;
            };
            let call_args: SmallVec<[Variant; 8]> =
                args.iter().chain(&conn.binds).cloned().collect();

            if conn.flags.contains(ConnectFlags::DEFERRED) {
                ctx.message_queue()
                    .push_call(conn.target, &conn.method, call_args.into_vec(), true);
            } else if let Err(err) = target.call(&conn.method, &call_args) {
                if conn.flags.contains(ConnectFlags::PERSIST) && editor_hint && !tool_script {
                    continue;
                }
                if err == CallError::InvalidMethod && !ctx.class_db().class_exists(target.get_class()) {
                    // Target class not registered yet.
                } else {
                    error!(
                        "Error calling method from signal '{}': {}",
                        signal,
                        err.describe(target.get_class(), &conn.method, &call_args)
                    );
                    failed += 1;
                }
            }

            let oneshot = conn.flags.contains(ConnectFlags::ONESHOT)
                && !(conn.flags.contains(ConnectFlags::PERSIST) && editor_hint);
            if oneshot {
                oneshots.push(conn);
            }
        }

        if let Some(data) = self.state().signals.get_mut(signal) {
            data.lock = data.lock.saturating_sub(1);
        }

        for conn in oneshots {
            if self.has_slot(signal, conn.target, &conn.method) {
                // A nested emission still holding the lock reports its own error.
                let _ = self.disconnect_slot(signal, conn.target, &conn.method, false);
            }
        }

        if failed > 0 {
            return Err(ReflectError::DeliveryFailed {
                signal: signal.to_owned(),
                failed,
            });
        }
        Ok(())
    }

    /// While set, every emission returns [`ReflectError::SignalsBlocked`].
    pub fn set_block_signals(&self, block: bool) {
        self.state().block_signals = block;
    }

    #[must_use]
    pub fn is_blocking_signals(&self) -> bool {
        self.state().block_signals
    }

    /// Script signals, then class signals, then user signals.
    #[must_use]
    pub fn get_signal_list(&self) -> Vec<MethodInfo> {
        let mut out = self
            .script_instance()
            .map(|script| script.get_script_signal_list())
            .unwrap_or_default();
        out.extend(self.class_db().get_signal_list(self.get_class(), false));
        let state = self.state();
        let mut user: Vec<&SignalData> = state.signals.values().filter(|s| s.is_user()).collect();
        user.sort_by(|a, b| a.user.name.cmp(&b.user.name));
        out.extend(user.into_iter().map(|s| s.user.clone()));
        out
    }

    #[must_use]
    pub fn get_signal_connection_list(&self, signal: &str) -> Vec<Connection> {
        self.state()
            .signals
            .get(signal)
            .map(|data| data.slots.values().map(|s| s.conn.clone()).collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn get_all_signal_connections(&self) -> Vec<Connection> {
        let state = self.state();
        let mut names: Vec<&String> = state.signals.keys().collect();
        names.sort();
        names
            .into_iter()
            .flat_map(|name| state.signals[name.as_str()].slots.values())
            .map(|slot| slot.conn.clone())
            .collect()
    }

    #[must_use]
    pub fn get_persistent_signal_connection_count(&self) -> usize {
        self.state()
            .signals
            .values()
            .flat_map(|data| data.slots.values())
            .filter(|slot| slot.conn.flags.contains(ConnectFlags::PERSIST))
            .count()
    }

    /// Connections of other objects' signals that target this one.
    #[must_use]
    pub fn get_signals_connected_to_this(&self) -> Vec<Connection> {
        self.state().connections.clone()
    }

    pub(crate) fn is_emitting(&self) -> bool {
        self.state().signals.values().any(|data| data.lock > 0)
    }

    /// Disconnect everything in both directions. Used by destruction.
    pub(crate) fn unwind_signals(&self) {
        let (own, incoming) = {
            let mut state = self.state();
            let own: Vec<Connection> = state
                .signals
                .drain()
                .flat_map(|(_, data)| data.slots.into_values().map(|slot| slot.conn))
                .collect();
            (own, core::mem::take(&mut state.connections))
        };

        let db = self.context().object_db();
        for conn in &own {
            if let Some(peer) = db.get_instance(conn.target) {
                peer.remove_incoming(conn);
            }
        }
        for conn in &incoming {
            if let Some(source) = db.get_instance(conn.source) {
                if source.has_slot(&conn.signal, conn.target, &conn.method) {
                    let _ = source.disconnect_slot(&conn.signal, conn.target, &conn.method, true);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_values() {
        assert_eq!(ConnectFlags::DEFERRED.bits(), 1);
        assert_eq!(ConnectFlags::PERSIST.bits(), 2);
        assert_eq!(ConnectFlags::ONESHOT.bits(), 4);
        assert_eq!(ConnectFlags::REFERENCE_COUNTED.bits(), 8);
    }

    #[test]
    fn test_connection_dict() {
        let conn = Connection {
            source: ObjectId::from_raw(2),
            signal: "changed".into(),
            target: ObjectId::from_raw(3),
            method: "on_changed".into(),
            binds: vec![Variant::Int(1)],
            flags: ConnectFlags::ONESHOT,
        };
        let dict = conn.to_dict();
        let keys: Vec<_> = dict.keys().filter_map(Variant::as_str).collect();
        assert_eq!(keys, ["source", "signal", "target", "method", "binds", "flags"]);
        assert_eq!(Connection::from_dict(&dict), conn);
    }

    #[test]
    fn test_connection_from_empty_dict() {
        let conn = Connection::from_dict(&Dictionary::new());
        assert!(conn.source.is_null());
        assert!(conn.signal.is_empty());
        assert_eq!(conn.flags, ConnectFlags::empty());
    }
}
