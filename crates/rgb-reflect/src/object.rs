//! The object model.
//!
//! An [`Object`] is a cheap, clonable handle to one instance: its id, class,
//! native state, optional script instance, metadata and signal table. The
//! instance registry holds one handle per live object; connections and
//! deferred messages refer to objects by id only.
//!
//! Objects are destroyed explicitly with [`Object::free`]. Handles that
//! outlive destruction stay valid as values but every call on them reports
//! [`CallError::InstanceIsNull`].
//!
//! Two locks live inside each object. `data` guards the native state and is
//! held only while a typed method body runs. `state` guards everything else
//! and is never held across a call into user code.

use core::any::type_name;
use core::fmt;
use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, error, trace};

use crate::call_error::{CallError, CallResult};
use crate::class_db::ClassDb;
use crate::context::Context;
use crate::error::{ReflectError, ReflectResult, fail};
use crate::method_info::MethodInfo;
use crate::native::{NativeClass, downcast_mut, downcast_ref};
use crate::object_db::ObjectId;
use crate::property_info::{PropertyHint, PropertyInfo, PropertyUsage};
use crate::script::ScriptInstance;
use crate::signal::{Connection, SignalData};
use crate::variant::{Dictionary, Variant, VariantType};

pub(crate) struct ObjectState {
    pub(crate) signals: HashMap<String, SignalData>,
    /// Connections of other objects that target this one.
    pub(crate) connections: Vec<Connection>,
    pub(crate) metadata: Dictionary,
    pub(crate) block_signals: bool,
    pub(crate) script: Option<Arc<dyn ScriptInstance>>,
    pub(crate) edited: bool,
    pub(crate) edited_version: u32,
}

struct ObjectInner {
    id: AtomicU64,
    class: String,
    ctx: Arc<Context>,
    data: Mutex<Box<dyn NativeClass>>,
    state: Mutex<ObjectState>,
    /// 1 at rest; raised by every reflective call and emission in progress.
    lock_index: AtomicU32,
    destroyed: AtomicBool,
    predelete_ok: AtomicBool,
    queued_for_deletion: AtomicBool,
}

/// Handle to one object.
#[derive(Clone)]
pub struct Object(Arc<ObjectInner>);

/// Keeps `lock_index` raised for the duration of a call.
pub(crate) struct CallLock<'a>(&'a AtomicU32);

impl Drop for CallLock<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl Object {
    pub const NOTIFICATION_POSTINITIALIZE: i32 = 0;
    pub const NOTIFICATION_PREDELETE: i32 = 1;

    pub(crate) fn new(ctx: Arc<Context>, class: &str, data: Box<dyn NativeClass>) -> Self {
        Self(Arc::new(ObjectInner {
            id: AtomicU64::new(0),
            class: class.to_owned(),
            ctx,
            data: Mutex::new(data),
            state: Mutex::new(ObjectState {
                signals: HashMap::new(),
                connections: Vec::new(),
                metadata: Dictionary::new(),
                block_signals: false,
                script: None,
                edited: false,
                edited_version: 0,
            }),
            lock_index: AtomicU32::new(1),
            destroyed: AtomicBool::new(false),
            predelete_ok: AtomicBool::new(true),
            queued_for_deletion: AtomicBool::new(false),
        }))
    }

    pub(crate) fn assign_instance_id(&self, id: ObjectId) {
        self.0.id.store(id.raw(), Ordering::Release);
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, ObjectState> {
        self.0.state.lock()
    }

    pub(crate) fn lock_calls(&self) -> CallLock<'_> {
        self.0.lock_index.fetch_add(1, Ordering::AcqRel);
        CallLock(&self.0.lock_index)
    }

    pub(crate) fn class_db(&self) -> &ClassDb {
        self.0.ctx.class_db()
    }

    // ------------------------------------------------------------------
    // Identity
    // ------------------------------------------------------------------

    #[must_use]
    pub fn get_instance_id(&self) -> ObjectId {
        ObjectId::from_raw(self.0.id.load(Ordering::Acquire))
    }

    #[must_use]
    pub fn get_class(&self) -> &str {
        &self.0.class
    }

    /// Whether this object's class is `class` or derives from it.
    #[must_use]
    pub fn is_class(&self, class: &str) -> bool {
        self.class_db().is_parent_class(self.get_class(), class)
    }

    #[must_use]
    pub fn context(&self) -> &Arc<Context> {
        &self.0.ctx
    }

    #[must_use]
    pub fn is_freed(&self) -> bool {
        self.0.destroyed.load(Ordering::Acquire)
    }

    /// Whether both handles refer to the same object.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    // ------------------------------------------------------------------
    // Native state
    // ------------------------------------------------------------------

    /// Run `f` on the native `T` carried by this object (or one of the
    /// parent types it embeds).
    pub fn with_native<T: NativeClass, R>(&self, f: impl FnOnce(&T) -> R) -> Result<R, CallError> {
        if self.is_freed() {
            return Err(CallError::InstanceIsNull);
        }
        let data = self.0.data.lock();
        match downcast_ref::<T>(data.as_ref()) {
            Some(this) => Ok(f(this)),
            None => {
                error!("{} does not carry native state {}", self, type_name::<T>());
                Err(CallError::InvalidMethod)
            }
        }
    }

    pub fn with_native_mut<T: NativeClass, R>(
        &self,
        f: impl FnOnce(&mut T) -> R,
    ) -> Result<R, CallError> {
        if self.is_freed() {
            return Err(CallError::InstanceIsNull);
        }
        let mut data = self.0.data.lock();
        match downcast_mut::<T>(data.as_mut()) {
            Some(this) => Ok(f(this)),
            None => {
                error!("{} does not carry native state {}", self, type_name::<T>());
                Err(CallError::InvalidMethod)
            }
        }
    }

    pub(crate) fn native_mut(&self) -> MutexGuard<'_, Box<dyn NativeClass>> {
        self.0.data.lock()
    }

    // ------------------------------------------------------------------
    // Calls
    // ------------------------------------------------------------------

    /// Invoke `method` by name: script first, then the class table.
    ///
    /// `free` destroys the object, except on `RefCounted` objects and while
    /// another reflective call or emission on it is in progress.
    pub fn call(&self, method: &str, args: &[Variant]) -> CallResult {
        if self.is_freed() {
            return Err(CallError::InstanceIsNull);
        }
        if method == "free" {
            if !args.is_empty() {
                return Err(CallError::TooManyArguments { expected: 0 });
            }
            if self.is_class("RefCounted") {
                error!("Can't 'free' a reference");
                return Err(CallError::InvalidMethod);
            }
            if self.0.lock_index.load(Ordering::Acquire) > 1 {
                error!("Object is locked and can't be freed");
                return Err(CallError::InvalidMethod);
            }
            // Refusals are logged by `free`.
            let _ = self.free();
            return Ok(Variant::Nil);
        }

        let _lock = self.lock_calls();
        if let Some(script) = self.script_instance() {
            match script.call(self, method, args) {
                Err(CallError::InvalidMethod) => {}
                result => return result,
            }
        }
        match self.class_db().get_method(self.get_class(), method) {
            Some(bind) => bind.call(self, args),
            None => Err(CallError::InvalidMethod),
        }
    }

    /// [`Object::call`] with the arguments packed in one array.
    pub fn callv(&self, method: &str, args: &[Variant]) -> CallResult {
        self.call(method, args)
    }

    /// Call `method` on the script chain, then the native bind. Errors are
    /// ignored.
    pub fn call_multilevel(&self, method: &str, args: &[Variant]) {
        if method == "free" {
            let _ = self.free();
            return;
        }
        let _lock = self.lock_calls();
        if let Some(script) = self.script_instance() {
            script.call_multilevel(self, method, args);
        }
        if let Some(bind) = self.class_db().get_method(self.get_class(), method) {
            let _ = bind.call(self, args);
        }
    }

    /// Native bind first, then the script chain base first.
    pub fn call_multilevel_reversed(&self, method: &str, args: &[Variant]) {
        let _lock = self.lock_calls();
        if let Some(bind) = self.class_db().get_method(self.get_class(), method) {
            let _ = bind.call(self, args);
        }
        if let Some(script) = self.script_instance() {
            script.call_multilevel_reversed(self, method, args);
        }
    }

    #[must_use]
    pub fn has_method(&self, method: &str) -> bool {
        if method == "free" {
            return true;
        }
        if self
            .script_instance()
            .is_some_and(|script| script.has_method(method))
        {
            return true;
        }
        self.class_db().has_method(self.get_class(), method, false)
    }

    /// Queue `method` for the next message flush.
    pub fn call_deferred(&self, method: &str, args: Vec<Variant>) {
        self.context()
            .message_queue()
            .push_call(self.get_instance_id(), method, args, false);
    }

    /// Queue a property write for the next message flush.
    pub fn set_deferred(&self, property: &str, value: Variant) {
        self.context()
            .message_queue()
            .push_set(self.get_instance_id(), property, value);
    }

    /// Free on the next message flush.
    pub fn queue_free(&self) {
        if self.0.queued_for_deletion.swap(true, Ordering::AcqRel) {
            return;
        }
        self.call_deferred("free", Vec::new());
    }

    #[must_use]
    pub fn is_queued_for_deletion(&self) -> bool {
        self.0.queued_for_deletion.load(Ordering::Acquire)
    }

    /// Native hook then script, or script then native hook when `reversed`.
    pub fn notification(&self, what: i32, reversed: bool) {
        let script = self.script_instance();
        if reversed {
            if let Some(script) = &script {
                script.notification(self, what);
            }
            self.native_mut().notification(what);
        } else {
            self.native_mut().notification(what);
            if let Some(script) = &script {
                script.notification(self, what);
            }
        }
    }

    // ------------------------------------------------------------------
    // Destruction
    // ------------------------------------------------------------------

    /// Destroy the object now.
    ///
    /// Sends `NOTIFICATION_PREDELETE`, honours a veto, disconnects every
    /// signal in both directions and unregisters the object.
    pub fn free(&self) -> ReflectResult<()> {
        let id = self.get_instance_id();
        if self.is_freed() {
            fail!(ReflectError::ObjectFreed(id));
        }
        if self.is_emitting() {
            fail!(ReflectError::DeleteWhileEmitting(id));
        }

        self.0.predelete_ok.store(true, Ordering::Release);
        self.notification(Self::NOTIFICATION_PREDELETE, true);
        let native_ok = self.native_mut().predelete();
        if !native_ok || !self.0.predelete_ok.load(Ordering::Acquire) {
            fail!(ReflectError::FreeCancelled(id));
        }

        self.unwind_signals();
        self.context().object_db().remove_instance(id);
        debug!("Freed {}", self);
        self.release();
        Ok(())
    }

    /// Veto a [`Object::free`] in progress. Only meaningful from a
    /// `NOTIFICATION_PREDELETE` handler.
    pub fn cancel_free(&self) {
        self.0.predelete_ok.store(false, Ordering::Release);
    }

    /// Mark destroyed and drop attached state without unwinding signals.
    pub(crate) fn release(&self) {
        self.0.destroyed.store(true, Ordering::Release);
        let mut state = self.state();
        state.script = None;
        state.metadata.clear();
        state.signals.clear();
        state.connections.clear();
    }

    // ------------------------------------------------------------------
    // Listings
    // ------------------------------------------------------------------

    /// Every property this object reports, in inspector order.
    ///
    /// Script variables come first when `reversed`, last otherwise.
    #[must_use]
    pub fn get_property_list(&self, reversed: bool) -> Vec<PropertyInfo> {
        let script = self.script_instance();
        let mut out = Vec::new();
        let script_variables = |out: &mut Vec<PropertyInfo>, script: &Arc<dyn ScriptInstance>| {
            out.push(PropertyInfo::new(VariantType::Nil, "Script Variables").with_usage(PropertyUsage::CATEGORY));
            out.extend(script.get_property_list());
        };

        if reversed {
            if let Some(script) = &script {
                script_variables(&mut out, script);
            }
        }

        out.extend(
            self.class_db()
                .get_property_list(self.get_class(), false, Some(self)),
        );
        let mut dynamic = self.native_mut().property_list();
        for property in &mut dynamic {
            self.validate_property(property);
        }
        out.extend(dynamic);

        out.push(
            PropertyInfo::new(VariantType::Object, "script")
                .with_hint(PropertyHint::ResourceType, "Script"),
        );
        if !self.state().metadata.is_empty() {
            out.push(
                PropertyInfo::new(VariantType::Dictionary, "__meta__")
                    .with_usage(PropertyUsage::NOEDITOR | PropertyUsage::INTERNAL),
            );
        }

        if !reversed {
            if let Some(script) = &script {
                script_variables(&mut out, script);
            }
        }
        out
    }

    /// Class methods, then script methods.
    #[must_use]
    pub fn get_method_list(&self) -> Vec<MethodInfo> {
        let mut out = self
            .class_db()
            .get_method_list(self.get_class(), false, false);
        if let Some(script) = self.script_instance() {
            out.extend(script.get_method_list());
        }
        out
    }

    /// Declared type of `property`, falling back to the type of its current
    /// value.
    #[must_use]
    pub fn get_static_property_type(&self, property: &str) -> Option<VariantType> {
        if let Some(ty) = self.class_db().get_property_type(self.get_class(), property) {
            return Some(ty);
        }
        if let Some(ty) = self
            .script_instance()
            .and_then(|script| script.get_property_type(property))
        {
            return Some(ty);
        }
        self.get(property).map(|value| value.get_type())
    }

    /// Let the native hook rewrite `property` before it is listed.
    pub fn validate_property(&self, property: &mut PropertyInfo) {
        self.native_mut().validate_property(property);
    }

    /// Tell editors the property list changed.
    pub fn property_list_changed_notify(&self) {
        self.state().edited = true;
        trace!("Property list of {} changed", self);
    }

    // ------------------------------------------------------------------
    // Metadata
    // ------------------------------------------------------------------

    /// Attach `value` under `name`; `Nil` removes the entry.
    pub fn set_meta(&self, name: &str, value: Variant) {
        let mut state = self.state();
        if value.is_nil() {
            state.metadata.remove(&Variant::from(name));
        } else {
            state.metadata.insert(name, value);
        }
    }

    #[must_use]
    pub fn get_meta(&self, name: &str) -> Option<Variant> {
        self.state().metadata.get_str(name).cloned()
    }

    #[must_use]
    pub fn has_meta(&self, name: &str) -> bool {
        self.state().metadata.get_str(name).is_some()
    }

    pub fn remove_meta(&self, name: &str) {
        self.set_meta(name, Variant::Nil);
    }

    #[must_use]
    pub fn get_meta_list(&self) -> Vec<String> {
        self.state()
            .metadata
            .keys()
            .filter_map(Variant::as_str)
            .map(ToOwned::to_owned)
            .collect()
    }

    // ------------------------------------------------------------------
    // Script
    // ------------------------------------------------------------------

    /// Attach or detach a script instance. Emits `script_changed`.
    pub fn set_script_instance(&self, script: Option<Arc<dyn ScriptInstance>>) {
        {
            let mut state = self.state();
            let unchanged = match (&state.script, &script) {
                (None, None) => true,
                (Some(a), Some(b)) => Arc::ptr_eq(a, b),
                _ => false,
            };
            if unchanged {
                return;
            }
            state.script = script;
            state.edited = true;
        }
        let _ = self.emit_signal("script_changed", &[]);
    }

    #[must_use]
    pub fn get_script_instance(&self) -> Option<Arc<dyn ScriptInstance>> {
        self.script_instance()
    }

    pub(crate) fn script_instance(&self) -> Option<Arc<dyn ScriptInstance>> {
        self.state().script.clone()
    }

    // ------------------------------------------------------------------
    // Editor bookkeeping
    // ------------------------------------------------------------------

    pub fn set_edited(&self, edited: bool) {
        let mut state = self.state();
        state.edited = edited;
        state.edited_version = state.edited_version.wrapping_add(1);
    }

    #[must_use]
    pub fn is_edited(&self) -> bool {
        self.state().edited
    }

    #[must_use]
    pub fn get_edited_version(&self) -> u32 {
        self.state().edited_version
    }
}

impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Object {}

/// `[Class:id]`, unless the script supplies its own text.
impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(text) = self
            .script_instance()
            .and_then(|script| script.to_string())
        {
            return f.write_str(&text);
        }
        write!(f, "[{}:{}]", self.get_class(), self.get_instance_id())
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("id", &self.get_instance_id())
            .field("class", &self.get_class())
            .field("freed", &self.is_freed())
            .finish_non_exhaustive()
    }
}
