//! The class registry.
//!
//! One [`ClassDb`] describes every registered class: its parent, factory,
//! methods, constants, enums, signals and properties. The whole table sits
//! behind a single read/write lock. Registration takes the write lock, every
//! query takes the read lock, and no user code runs while either is held:
//! method binds are handed out as `Arc`s and invoked after the guard drops.
//!
//! Classes must be registered parent-first. Registering a class whose parent
//! is unknown fails and leaves the table untouched.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use hashbrown::{HashMap, HashSet};
use parking_lot::RwLock;
use tracing::{debug, error};

use crate::error::{ReflectError, ReflectResult, fail};
use crate::hash::{BuildStableHasher, HASH_SEED, hash_djb2, hash_djb2_one_64};
use crate::method_bind::MethodBind;
use crate::method_info::{MethodFlags, MethodInfo};
use crate::native::NativeClass;
use crate::object::Object;
use crate::property_info::{PropertyInfo, PropertyUsage};
use crate::variant::{Variant, VariantType};

/// Creates the native state of a new instance of exactly one class.
pub type Factory = fn() -> Box<dyn NativeClass>;

/// API partition a class belongs to. Each partition is hashed separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum ApiType {
    #[default]
    Core,
    /// Only instantiable while running as the editor.
    Editor,
    None,
}

/// Accessors backing one registered property.
#[derive(Debug, Clone)]
pub struct PropertySetGet {
    /// Leading index argument for indexed accessors.
    pub index: Option<i64>,
    /// Empty when the property is read-only.
    pub setter: String,
    pub getter: String,
    pub variant_type: VariantType,
    set_bind: Option<Arc<MethodBind>>,
    get_bind: Option<Arc<MethodBind>>,
}

/// Registry record for one class.
#[derive(Debug)]
pub struct ClassInfo {
    name: String,
    /// Empty for a root class.
    inherits: String,
    api: ApiType,
    disabled: bool,
    exposed: bool,
    creation_func: Option<Factory>,
    method_map: HashMap<String, Arc<MethodBind>>,
    method_order: Vec<String>,
    constant_map: HashMap<String, i64>,
    constant_order: Vec<String>,
    enum_map: HashMap<String, Vec<String>>,
    signal_map: HashMap<String, MethodInfo>,
    property_list: Vec<PropertyInfo>,
    property_setget: HashMap<String, PropertySetGet>,
    methods_in_properties: HashSet<String>,
    virtual_methods: Vec<MethodInfo>,
}

impl ClassInfo {
    fn new(name: &str, inherits: &str, api: ApiType, creation_func: Option<Factory>) -> Self {
        Self {
            name: name.to_owned(),
            inherits: inherits.to_owned(),
            api,
            disabled: false,
            exposed: true,
            creation_func,
            method_map: HashMap::new(),
            method_order: Vec::new(),
            constant_map: HashMap::new(),
            constant_order: Vec::new(),
            enum_map: HashMap::new(),
            signal_map: HashMap::new(),
            property_list: Vec::new(),
            property_setget: HashMap::new(),
            methods_in_properties: HashSet::new(),
            virtual_methods: Vec::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn inherits(&self) -> &str {
        &self.inherits
    }

    #[must_use]
    pub fn api(&self) -> ApiType {
        self.api
    }
}

/// Outcome of a reflective property write through the class table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyWrite {
    /// No class in the chain declares the property.
    Unhandled,
    /// The property exists; `true` when the write succeeded.
    Handled(bool),
}

#[derive(Default)]
struct ClassDbInner {
    classes: HashMap<String, ClassInfo, BuildStableHasher>,
    compat_classes: HashMap<String, String>,
    resource_base_extensions: BTreeMap<String, String>,
    default_values: HashMap<String, HashMap<String, Variant>>,
    current_api: ApiType,
}

impl ClassDbInner {
    /// `class` followed by each of its ancestors.
    fn chain<'a>(&'a self, class: &str) -> impl Iterator<Item = &'a ClassInfo> + use<'a> {
        let mut next = self.classes.get(class);
        core::iter::from_fn(move || {
            let current = next?;
            next = self.classes.get(current.inherits.as_str());
            Some(current)
        })
    }

    fn is_parent_class(&self, class: &str, inherits: &str) -> bool {
        self.chain(class).any(|c| c.name == inherits)
    }

    fn get_method(&self, class: &str, method: &str) -> Option<Arc<MethodBind>> {
        self.chain(class)
            .find_map(|c| c.method_map.get(method))
            .cloned()
    }

    /// Class entry used for instancing, resolving compatibility aliases when
    /// the direct entry is missing, disabled or abstract.
    fn resolve_instantiable(&self, class: &str) -> Option<&ClassInfo> {
        let direct = self.classes.get(class);
        if direct.is_some_and(|t| !t.disabled && t.creation_func.is_some()) {
            return direct;
        }
        self.compat_classes
            .get(class)
            .and_then(|alias| self.classes.get(alias))
            .or(direct)
    }

    fn class_mut(&mut self, class: &str) -> ReflectResult<&mut ClassInfo> {
        match self.classes.get_mut(class) {
            Some(info) => Ok(info),
            None => fail!(ReflectError::ClassNotFound(class.to_owned())),
        }
    }
}

/// Process-wide (or per-context) class table.
pub struct ClassDb {
    inner: RwLock<ClassDbInner>,
    version: String,
    editor_hint: AtomicBool,
}

impl Default for ClassDb {
    fn default() -> Self {
        Self::new(crate::VERSION)
    }
}

impl ClassDb {
    /// `version` seeds the API hash.
    #[must_use]
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            inner: RwLock::new(ClassDbInner::default()),
            version: version.into(),
            editor_hint: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Whether editor-only classes may be instanced.
    #[must_use]
    pub fn is_editor_hint(&self) -> bool {
        self.editor_hint.load(Ordering::Relaxed)
    }

    pub fn set_editor_hint(&self, editor_hint: bool) {
        self.editor_hint.store(editor_hint, Ordering::Relaxed);
    }

    /// Partition stamped on classes registered from now on.
    pub fn set_current_api(&self, api: ApiType) {
        self.inner.write().current_api = api;
    }

    #[must_use]
    pub fn current_api(&self) -> ApiType {
        self.inner.read().current_api
    }

    // ------------------------------------------------------------------
    // Registration and hierarchy
    // ------------------------------------------------------------------

    /// Register `class` under `parent` (empty for a root class).
    ///
    /// `factory` is `None` for abstract classes.
    pub fn register_class(
        &self,
        class: &str,
        parent: &str,
        factory: Option<Factory>,
    ) -> ReflectResult<()> {
        let mut inner = self.inner.write();
        if inner.classes.contains_key(class) {
            fail!(ReflectError::ClassAlreadyRegistered(class.to_owned()));
        }
        if !parent.is_empty() && !inner.classes.contains_key(parent) {
            fail!(ReflectError::ParentNotRegistered {
                class: class.to_owned(),
                parent: parent.to_owned(),
            });
        }
        let api = inner.current_api;
        inner
            .classes
            .insert(class.to_owned(), ClassInfo::new(class, parent, api, factory));
        debug!("Registered class '{}' (inherits '{}')", class, parent);
        Ok(())
    }

    /// Resolve `old` to `new` when instancing a class that no longer exists.
    pub fn add_compatibility_class(&self, old: &str, new: &str) {
        self.inner
            .write()
            .compat_classes
            .insert(old.to_owned(), new.to_owned());
    }

    #[must_use]
    pub fn class_exists(&self, class: &str) -> bool {
        self.inner.read().classes.contains_key(class)
    }

    /// Inclusive: a class counts as its own parent.
    #[must_use]
    pub fn is_parent_class(&self, class: &str, inherits: &str) -> bool {
        self.inner.read().is_parent_class(class, inherits)
    }

    /// Direct parent, empty for root classes. Logs when `class` is unknown.
    #[must_use]
    pub fn get_parent_class(&self, class: &str) -> String {
        let inner = self.inner.read();
        match inner.classes.get(class) {
            Some(info) => info.inherits.clone(),
            None => {
                error!("Cannot get parent of unknown class '{}'", class);
                String::new()
            }
        }
    }

    #[must_use]
    pub fn get_parent_class_nocheck(&self, class: &str) -> Option<String> {
        self.inner
            .read()
            .classes
            .get(class)
            .map(|info| info.inherits.clone())
    }

    /// Every registered class, sorted.
    #[must_use]
    pub fn get_class_list(&self) -> Vec<String> {
        let mut list: Vec<String> = self.inner.read().classes.keys().cloned().collect();
        list.sort();
        list
    }

    /// Every class deriving from `base`, excluding `base` itself, sorted.
    #[must_use]
    pub fn get_inheriters_from_class(&self, base: &str) -> Vec<String> {
        let inner = self.inner.read();
        let mut list: Vec<String> = inner
            .classes
            .keys()
            .filter(|name| name.as_str() != base && inner.is_parent_class(name, base))
            .cloned()
            .collect();
        list.sort();
        list
    }

    /// Immediate children of `base`, sorted.
    #[must_use]
    pub fn get_direct_inheriters_from_class(&self, base: &str) -> Vec<String> {
        let inner = self.inner.read();
        let mut list: Vec<String> = inner
            .classes
            .values()
            .filter(|info| info.inherits == base)
            .map(|info| info.name.clone())
            .collect();
        list.sort();
        list
    }

    /// `ApiType::None` for unknown classes.
    #[must_use]
    pub fn get_api_type(&self, class: &str) -> ApiType {
        self.inner
            .read()
            .classes
            .get(class)
            .map_or(ApiType::None, |info| info.api)
    }

    pub fn set_class_enabled(&self, class: &str, enabled: bool) -> ReflectResult<()> {
        self.inner.write().class_mut(class)?.disabled = !enabled;
        Ok(())
    }

    #[must_use]
    pub fn is_class_enabled(&self, class: &str) -> bool {
        let inner = self.inner.read();
        let mut info = inner.classes.get(class);
        if info.is_none_or(|t| t.creation_func.is_none()) {
            if let Some(alias) = inner.compat_classes.get(class) {
                info = inner.classes.get(alias);
            }
        }
        match info {
            Some(info) => !info.disabled,
            None => {
                error!("Cannot get class '{}'", class);
                false
            }
        }
    }

    pub fn set_class_exposed(&self, class: &str, exposed: bool) -> ReflectResult<()> {
        self.inner.write().class_mut(class)?.exposed = exposed;
        Ok(())
    }

    #[must_use]
    pub fn is_class_exposed(&self, class: &str) -> bool {
        match self.inner.read().classes.get(class) {
            Some(info) => info.exposed,
            None => {
                error!("Cannot get class '{}'", class);
                false
            }
        }
    }

    /// Whether `instance(class)` would produce an object.
    #[must_use]
    pub fn can_instance(&self, class: &str) -> bool {
        let inner = self.inner.read();
        let Some(info) = inner.resolve_instantiable(class) else {
            error!("Cannot get class '{}'", class);
            return false;
        };
        if info.api == ApiType::Editor && !self.is_editor_hint() {
            return false;
        }
        !info.disabled && info.creation_func.is_some()
    }

    /// Resolve the concrete class name and factory used to instance `class`.
    pub fn resolve_factory(&self, class: &str) -> ReflectResult<(String, Factory)> {
        let inner = self.inner.read();
        let Some(info) = inner.resolve_instantiable(class) else {
            fail!(ReflectError::ClassNotFound(class.to_owned()));
        };
        if info.disabled {
            fail!(ReflectError::ClassDisabled(info.name.clone()));
        }
        let Some(factory) = info.creation_func else {
            fail!(ReflectError::ClassNotInstantiable(info.name.clone()));
        };
        if info.api == ApiType::Editor && !self.is_editor_hint() {
            fail!(ReflectError::PrivilegedApi(info.name.clone()));
        }
        Ok((info.name.clone(), factory))
    }

    // ------------------------------------------------------------------
    // Methods
    // ------------------------------------------------------------------

    /// Bind `method` on `class`.
    ///
    /// A class may shadow a method of the same name bound on an ancestor;
    /// binding the same name twice on one class fails.
    pub fn bind_method(&self, class: &str, mut method: MethodBind) -> ReflectResult<Arc<MethodBind>> {
        let mut inner = self.inner.write();
        let info = inner.class_mut(class)?;
        if info.method_map.contains_key(method.name()) {
            fail!(ReflectError::MethodAlreadyBound {
                class: class.to_owned(),
                method: method.name().to_owned(),
            });
        }
        if !method.is_vararg() && method.argument_names().len() > method.argument_count() {
            fail!(ReflectError::TooManyArgumentNames {
                class: class.to_owned(),
                method: method.name().to_owned(),
                names: method.argument_names().len(),
                arguments: method.argument_count(),
            });
        }
        method.set_instance_class(class);
        let name = method.name().to_owned();
        let bind = Arc::new(method);
        info.method_order.push(name.clone());
        info.method_map.insert(name, Arc::clone(&bind));
        Ok(bind)
    }

    /// Most-derived bind of `method`, searching `class` then its ancestors.
    #[must_use]
    pub fn get_method(&self, class: &str, method: &str) -> Option<Arc<MethodBind>> {
        self.inner.read().get_method(class, method)
    }

    #[must_use]
    pub fn has_method(&self, class: &str, method: &str, no_inheritance: bool) -> bool {
        let inner = self.inner.read();
        let mut chain = inner.chain(class);
        if no_inheritance {
            chain.next().is_some_and(|c| c.method_map.contains_key(method))
        } else {
            chain.any(|c| c.method_map.contains_key(method))
        }
    }

    pub fn set_method_flags(&self, class: &str, method: &str, flags: MethodFlags) -> ReflectResult<()> {
        let inner = self.inner.write();
        let Some(info) = inner.classes.get(class) else {
            fail!(ReflectError::ClassNotFound(class.to_owned()));
        };
        let Some(bind) = info.method_map.get(method) else {
            fail!(ReflectError::MethodNotFound {
                class: class.to_owned(),
                method: method.to_owned(),
            });
        };
        bind.set_hint_flags(flags);
        Ok(())
    }

    /// Declare an overridable hook; it is listed but has no native bind.
    pub fn add_virtual_method(&self, class: &str, method: MethodInfo) -> ReflectResult<()> {
        let mut inner = self.inner.write();
        let mut method = method;
        method.flags |= MethodFlags::VIRTUAL;
        inner.class_mut(class)?.virtual_methods.push(method);
        Ok(())
    }

    #[must_use]
    pub fn get_virtual_methods(&self, class: &str, no_inheritance: bool) -> Vec<MethodInfo> {
        let inner = self.inner.read();
        let mut out = Vec::new();
        for info in inner.chain(class) {
            out.extend(info.virtual_methods.iter().cloned());
            if no_inheritance {
                break;
            }
        }
        out
    }

    /// Virtual hooks first, then bound methods in registration order, for
    /// `class` and (unless `no_inheritance`) its ancestors. Disabled classes
    /// contribute nothing.
    #[must_use]
    pub fn get_method_list(
        &self,
        class: &str,
        no_inheritance: bool,
        exclude_from_properties: bool,
    ) -> Vec<MethodInfo> {
        let inner = self.inner.read();
        let mut out = Vec::new();
        for info in inner.chain(class) {
            if !info.disabled {
                out.extend(info.virtual_methods.iter().cloned());
                for name in &info.method_order {
                    if exclude_from_properties && info.methods_in_properties.contains(name) {
                        continue;
                    }
                    if let Some(bind) = info.method_map.get(name) {
                        out.push(bind.to_method_info());
                    }
                }
            }
            if no_inheritance {
                break;
            }
        }
        out
    }

    // ------------------------------------------------------------------
    // Constants and enums
    // ------------------------------------------------------------------

    /// Bind an integer constant, optionally as a member of `enum_name`.
    ///
    /// A qualified enum name (`Outer.Inner`) is stored under its last part.
    pub fn bind_integer_constant(
        &self,
        class: &str,
        enum_name: &str,
        name: &str,
        value: i64,
    ) -> ReflectResult<()> {
        let mut inner = self.inner.write();
        let info = inner.class_mut(class)?;
        if info.constant_map.contains_key(name) {
            fail!(ReflectError::ConstantAlreadyBound {
                class: class.to_owned(),
                name: name.to_owned(),
            });
        }
        info.constant_map.insert(name.to_owned(), value);
        if !enum_name.is_empty() {
            let enum_name = enum_name.rsplit('.').next().unwrap_or(enum_name);
            info.enum_map
                .entry(enum_name.to_owned())
                .or_default()
                .push(name.to_owned());
        }
        info.constant_order.push(name.to_owned());
        Ok(())
    }

    /// Constant names in binding order, own class first.
    #[must_use]
    pub fn get_integer_constant_list(&self, class: &str, no_inheritance: bool) -> Vec<String> {
        let inner = self.inner.read();
        let mut out = Vec::new();
        for info in inner.chain(class) {
            out.extend(info.constant_order.iter().cloned());
            if no_inheritance {
                break;
            }
        }
        out
    }

    #[must_use]
    pub fn get_integer_constant(&self, class: &str, name: &str) -> Option<i64> {
        self.inner
            .read()
            .chain(class)
            .find_map(|c| c.constant_map.get(name).copied())
    }

    /// Enum that `name` belongs to, if any.
    #[must_use]
    pub fn get_integer_constant_enum(
        &self,
        class: &str,
        name: &str,
        no_inheritance: bool,
    ) -> Option<String> {
        let inner = self.inner.read();
        for info in inner.chain(class) {
            let found = info
                .enum_map
                .iter()
                .find(|(_, constants)| constants.iter().any(|c| c == name));
            if let Some((enum_name, _)) = found {
                return Some(enum_name.clone());
            }
            if no_inheritance {
                break;
            }
        }
        None
    }

    /// Enum names, each class's sorted, own class first.
    #[must_use]
    pub fn get_enum_list(&self, class: &str, no_inheritance: bool) -> Vec<String> {
        let inner = self.inner.read();
        let mut out = Vec::new();
        for info in inner.chain(class) {
            let mut names: Vec<String> = info.enum_map.keys().cloned().collect();
            names.sort();
            out.extend(names);
            if no_inheritance {
                break;
            }
        }
        out
    }

    #[must_use]
    pub fn get_enum_constants(&self, class: &str, enum_name: &str, no_inheritance: bool) -> Vec<String> {
        let inner = self.inner.read();
        let mut out = Vec::new();
        for info in inner.chain(class) {
            if let Some(constants) = info.enum_map.get(enum_name) {
                out.extend(constants.iter().cloned());
            }
            if no_inheritance {
                break;
            }
        }
        out
    }

    // ------------------------------------------------------------------
    // Signals
    // ------------------------------------------------------------------

    /// Declare a signal. Fails if `class` or an ancestor already declares it.
    pub fn add_signal(&self, class: &str, signal: MethodInfo) -> ReflectResult<()> {
        let mut inner = self.inner.write();
        if !inner.classes.contains_key(class) {
            fail!(ReflectError::ClassNotFound(class.to_owned()));
        }
        if inner
            .chain(class)
            .any(|c| c.signal_map.contains_key(&signal.name))
        {
            fail!(ReflectError::SignalAlreadyDeclared {
                class: class.to_owned(),
                signal: signal.name,
            });
        }
        let info = inner.class_mut(class)?;
        info.signal_map.insert(signal.name.clone(), signal);
        Ok(())
    }

    #[must_use]
    pub fn has_signal(&self, class: &str, signal: &str) -> bool {
        self.inner
            .read()
            .chain(class)
            .any(|c| c.signal_map.contains_key(signal))
    }

    #[must_use]
    pub fn get_signal(&self, class: &str, signal: &str) -> Option<MethodInfo> {
        self.inner
            .read()
            .chain(class)
            .find_map(|c| c.signal_map.get(signal))
            .cloned()
    }

    /// Declared signals, each class's sorted by name, own class first.
    #[must_use]
    pub fn get_signal_list(&self, class: &str, no_inheritance: bool) -> Vec<MethodInfo> {
        let inner = self.inner.read();
        let mut out = Vec::new();
        for info in inner.chain(class) {
            let mut signals: Vec<&MethodInfo> = info.signal_map.values().collect();
            signals.sort_by(|a, b| a.name.cmp(&b.name));
            out.extend(signals.into_iter().cloned());
            if no_inheritance {
                break;
            }
        }
        out
    }

    // ------------------------------------------------------------------
    // Properties
    // ------------------------------------------------------------------

    /// Insert a group marker gathering the properties that start with `prefix`.
    pub fn add_property_group(&self, class: &str, name: &str, prefix: &str) -> ReflectResult<()> {
        let mut inner = self.inner.write();
        inner
            .class_mut(class)?
            .property_list
            .push(PropertyInfo::group(name, prefix));
        Ok(())
    }

    /// Register a property backed by already-bound accessors.
    ///
    /// The setter must take one argument (two when `index` is set) and the
    /// getter none (one when indexed). Either may be empty.
    pub fn add_property(
        &self,
        class: &str,
        property: PropertyInfo,
        setter: &str,
        getter: &str,
        index: Option<i64>,
    ) -> ReflectResult<()> {
        let mut inner = self.inner.write();
        if !inner.classes.contains_key(class) {
            fail!(ReflectError::ClassNotFound(class.to_owned()));
        }
        let extra = usize::from(index.is_some());

        let set_bind = if setter.is_empty() {
            None
        } else {
            match inner.get_method(class, setter) {
                Some(bind) if bind.argument_count() == 1 + extra => Some(bind),
                _ => fail!(ReflectError::InvalidAccessor {
                    class: class.to_owned(),
                    property: property.name,
                    role: "setter",
                    method: setter.to_owned(),
                }),
            }
        };
        let get_bind = if getter.is_empty() {
            None
        } else {
            match inner.get_method(class, getter) {
                Some(bind) if bind.argument_count() == extra => Some(bind),
                _ => fail!(ReflectError::InvalidAccessor {
                    class: class.to_owned(),
                    property: property.name,
                    role: "getter",
                    method: getter.to_owned(),
                }),
            }
        };

        let info = inner.class_mut(class)?;
        if info.property_setget.contains_key(&property.name) {
            fail!(ReflectError::PropertyAlreadyRegistered {
                class: class.to_owned(),
                property: property.name,
            });
        }
        if !setter.is_empty() {
            info.methods_in_properties.insert(setter.to_owned());
        }
        if !getter.is_empty() {
            info.methods_in_properties.insert(getter.to_owned());
        }
        info.property_setget.insert(
            property.name.clone(),
            PropertySetGet {
                index,
                setter: setter.to_owned(),
                getter: getter.to_owned(),
                variant_type: property.variant_type,
                set_bind,
                get_bind,
            },
        );
        info.property_list.push(property);
        Ok(())
    }

    /// Properties of `class` (and ancestors unless `no_inheritance`), own
    /// class first. `validator`, when given, rewrites each entry.
    #[must_use]
    pub fn get_property_list(
        &self,
        class: &str,
        no_inheritance: bool,
        validator: Option<&Object>,
    ) -> Vec<PropertyInfo> {
        let mut out = Vec::new();
        {
            let inner = self.inner.read();
            for info in inner.chain(class) {
                out.extend(info.property_list.iter().cloned());
                if no_inheritance {
                    break;
                }
            }
        }
        if let Some(validator) = validator {
            for property in &mut out {
                validator.validate_property(property);
            }
        }
        out
    }

    fn find_setget(&self, class: &str, property: &str) -> Option<PropertySetGet> {
        self.inner
            .read()
            .chain(class)
            .find_map(|c| c.property_setget.get(property))
            .cloned()
    }

    /// Write `property` on `object` through its registered setter.
    ///
    /// A property without a setter accepts the write as a successful no-op.
    pub fn set_property(&self, object: &Object, property: &str, value: &Variant) -> PropertyWrite {
        let Some(psg) = self.find_setget(object.get_class(), property) else {
            return PropertyWrite::Unhandled;
        };
        if psg.setter.is_empty() {
            return PropertyWrite::Handled(true);
        }
        let result = match psg.index {
            Some(index) => {
                let args = [Variant::Int(index), value.clone()];
                match &psg.set_bind {
                    Some(bind) => bind.call(object, &args),
                    None => object.call(&psg.setter, &args),
                }
            }
            None => {
                let args = core::slice::from_ref(value);
                match &psg.set_bind {
                    Some(bind) => bind.call(object, args),
                    None => object.call(&psg.setter, args),
                }
            }
        };
        PropertyWrite::Handled(result.is_ok())
    }

    /// Read `property` on `object` through its getter, falling back to a
    /// constant of the same name. `None` when neither exists.
    #[must_use]
    pub fn get_property(&self, object: &Object, property: &str) -> Option<Variant> {
        enum Found {
            Accessor(PropertySetGet),
            Constant(i64),
        }

        let found = {
            let inner = self.inner.read();
            inner.chain(object.get_class()).find_map(|c| {
                c.property_setget
                    .get(property)
                    .map(|psg| Found::Accessor(psg.clone()))
                    .or_else(|| c.constant_map.get(property).map(|v| Found::Constant(*v)))
            })
        }?;

        match found {
            Found::Constant(value) => Some(Variant::Int(value)),
            Found::Accessor(psg) if psg.getter.is_empty() => Some(Variant::Nil),
            Found::Accessor(psg) => {
                let index_arg;
                let args: &[Variant] = match psg.index {
                    Some(index) => {
                        index_arg = [Variant::Int(index)];
                        &index_arg
                    }
                    None => &[],
                };
                let result = match &psg.get_bind {
                    Some(bind) => bind.call(object, args),
                    None => object.call(&psg.getter, args),
                };
                Some(result.unwrap_or_default())
            }
        }
    }

    #[must_use]
    pub fn has_property(&self, class: &str, property: &str, no_inheritance: bool) -> bool {
        let inner = self.inner.read();
        let mut chain = inner.chain(class);
        if no_inheritance {
            chain
                .next()
                .is_some_and(|c| c.property_setget.contains_key(property))
        } else {
            chain.any(|c| c.property_setget.contains_key(property))
        }
    }

    /// Index of an indexed property; `None` when missing or not indexed.
    #[must_use]
    pub fn get_property_index(&self, class: &str, property: &str) -> Option<i64> {
        self.find_setget(class, property)?.index
    }

    #[must_use]
    pub fn get_property_type(&self, class: &str, property: &str) -> Option<VariantType> {
        self.find_setget(class, property).map(|psg| psg.variant_type)
    }

    #[must_use]
    pub fn get_property_setter(&self, class: &str, property: &str) -> Option<String> {
        self.find_setget(class, property).map(|psg| psg.setter)
    }

    #[must_use]
    pub fn get_property_getter(&self, class: &str, property: &str) -> Option<String> {
        self.find_setget(class, property).map(|psg| psg.getter)
    }

    // ------------------------------------------------------------------
    // Default values
    // ------------------------------------------------------------------

    pub(crate) fn cached_default_value(&self, class: &str, property: &str) -> Option<Variant> {
        self.inner
            .read()
            .default_values
            .get(class)
            .and_then(|values| values.get(property))
            .cloned()
    }

    pub(crate) fn has_cached_default_values(&self, class: &str) -> bool {
        self.inner.read().default_values.contains_key(class)
    }

    pub(crate) fn store_default_values(&self, class: &str, values: HashMap<String, Variant>) {
        self.inner
            .write()
            .default_values
            .insert(class.to_owned(), values);
    }

    // ------------------------------------------------------------------
    // Resource extensions
    // ------------------------------------------------------------------

    /// First registration of an extension wins.
    pub fn add_resource_base_extension(&self, extension: &str, class: &str) {
        self.inner
            .write()
            .resource_base_extensions
            .entry(extension.to_owned())
            .or_insert_with(|| class.to_owned());
    }

    #[must_use]
    pub fn get_resource_base_extensions(&self) -> Vec<String> {
        self.inner
            .read()
            .resource_base_extensions
            .keys()
            .cloned()
            .collect()
    }

    /// Extensions registered for `class` or any of its ancestors, sorted.
    #[must_use]
    pub fn get_extensions_for_type(&self, class: &str) -> Vec<String> {
        let inner = self.inner.read();
        inner
            .resource_base_extensions
            .iter()
            .filter(|(_, base)| inner.is_parent_class(class, base))
            .map(|(ext, _)| ext.clone())
            .collect()
    }

    // ------------------------------------------------------------------
    // API hash
    // ------------------------------------------------------------------

    /// Fingerprint of every exposed class in partition `api`.
    ///
    /// Classes, methods, constants, signals and accessors are folded in
    /// alphabetical order, so the result depends neither on registration
    /// order nor on map iteration order.
    #[must_use]
    pub fn get_api_hash(&self, api: ApiType) -> u64 {
        let inner = self.inner.read();
        let mut hash = hash_djb2_one_64(u64::from(hash_djb2(&self.version)), u64::from(HASH_SEED));

        let mut names: Vec<&String> = inner.classes.keys().collect();
        names.sort();

        for name in names {
            let info = &inner.classes[name.as_str()];
            if info.api != api || !info.exposed {
                continue;
            }
            hash = fold_str(&info.name, hash);
            hash = fold_str(&info.inherits, hash);

            let mut methods: Vec<&String> = info.method_map.keys().collect();
            methods.sort();
            for method in methods {
                let bind = &info.method_map[method.as_str()];
                hash = fold_str(bind.name(), hash);
                hash = hash_djb2_one_64(bind.argument_count() as u64, hash);
                hash = hash_djb2_one_64(bind.argument_type(-1) as u64, hash);
                for i in 0..bind.argument_count() {
                    let arg = bind.argument_info(i);
                    hash = hash_djb2_one_64(arg.variant_type as u64, hash);
                    hash = fold_str(&arg.name, hash);
                    hash = hash_djb2_one_64(arg.hint.as_i64() as u64, hash);
                    hash = fold_str(&arg.hint_string, hash);
                }
                hash = hash_djb2_one_64(bind.default_argument_count() as u64, hash);
                for default in bind.default_arguments() {
                    hash = hash_djb2_one_64(u64::from(default.hash()), hash);
                }
                hash = hash_djb2_one_64(u64::from(bind.hint_flags().bits()), hash);
            }

            let mut constants: Vec<(&String, &i64)> = info.constant_map.iter().collect();
            constants.sort_by(|a, b| a.0.cmp(b.0));
            for (constant, value) in constants {
                hash = fold_str(constant, hash);
                hash = hash_djb2_one_64(*value as u64, hash);
            }

            let mut signals: Vec<&MethodInfo> = info.signal_map.values().collect();
            signals.sort_by(|a, b| a.name.cmp(&b.name));
            for signal in signals {
                hash = fold_str(&signal.name, hash);
                for arg in &signal.arguments {
                    hash = hash_djb2_one_64(arg.variant_type as u64, hash);
                }
            }

            let mut setgets: Vec<(&String, &PropertySetGet)> = info.property_setget.iter().collect();
            setgets.sort_by(|a, b| a.0.cmp(b.0));
            for (property, psg) in setgets {
                hash = fold_str(property, hash);
                hash = fold_str(&psg.setter, hash);
                hash = fold_str(&psg.getter, hash);
            }

            for property in &info.property_list {
                hash = fold_str(&property.name, hash);
                hash = hash_djb2_one_64(property.variant_type as u64, hash);
                hash = hash_djb2_one_64(property.hint.as_i64() as u64, hash);
                hash = fold_str(&property.hint_string, hash);
                hash = hash_djb2_one_64(u64::from(property.usage.bits()), hash);
            }
        }
        hash
    }

    /// Drop every class and method bind.
    pub fn cleanup(&self) {
        let mut inner = self.inner.write();
        let count = inner.classes.len();
        *inner = ClassDbInner::default();
        debug!("Class registry cleared ({} classes)", count);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().classes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().classes.is_empty()
    }
}

fn fold_str(s: &str, hash: u64) -> u64 {
    hash_djb2_one_64(u64::from(hash_djb2(s)), hash)
}

impl core::fmt::Debug for ClassDb {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ClassDb")
            .field("classes", &self.len())
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

/// Usage flags that make a property part of an instance's default state.
pub(crate) const DEFAULT_VALUE_USAGE: PropertyUsage =
    PropertyUsage::STORAGE.union(PropertyUsage::EDITOR);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::Bare;

    fn bare() -> Box<dyn NativeClass> {
        Box::new(Bare)
    }

    fn db() -> ClassDb {
        let db = ClassDb::new("test");
        db.register_class("Object", "", Some(bare)).unwrap();
        db.register_class("Node", "Object", Some(bare)).unwrap();
        db.register_class("Sprite", "Node", Some(bare)).unwrap();
        db.register_class("Abstract", "Object", None).unwrap();
        db
    }

    #[test]
    fn test_register_requires_parent() {
        let db = db();
        assert!(matches!(
            db.register_class("Orphan", "Missing", Some(bare)),
            Err(ReflectError::ParentNotRegistered { .. })
        ));
        assert!(!db.class_exists("Orphan"));
        assert_eq!(
            db.register_class("Node", "Object", None),
            Err(ReflectError::ClassAlreadyRegistered("Node".into()))
        );
    }

    #[test]
    fn test_hierarchy_queries() {
        let db = db();
        assert!(db.is_parent_class("Sprite", "Object"));
        assert!(db.is_parent_class("Sprite", "Sprite"));
        assert!(!db.is_parent_class("Object", "Node"));
        assert_eq!(db.get_parent_class("Sprite"), "Node");
        assert_eq!(db.get_parent_class("Object"), "");
        assert_eq!(db.get_parent_class_nocheck("Nope"), None);
        assert_eq!(
            db.get_class_list(),
            ["Abstract", "Node", "Object", "Sprite"]
        );
        assert_eq!(
            db.get_inheriters_from_class("Object"),
            ["Abstract", "Node", "Sprite"]
        );
        assert_eq!(
            db.get_direct_inheriters_from_class("Object"),
            ["Abstract", "Node"]
        );
    }

    #[test]
    fn test_instancing_gates() {
        let db = db();
        assert!(db.can_instance("Node"));
        assert!(!db.can_instance("Abstract"));
        assert!(!db.can_instance("Missing"));

        db.set_class_enabled("Node", false).unwrap();
        assert!(!db.can_instance("Node"));
        assert!(!db.is_class_enabled("Node"));
        assert!(matches!(
            db.resolve_factory("Node"),
            Err(ReflectError::ClassDisabled(_))
        ));
    }

    #[test]
    fn test_compatibility_alias() {
        let db = db();
        db.add_compatibility_class("OldSprite", "Sprite");
        assert!(db.can_instance("OldSprite"));
        let (class, _) = db.resolve_factory("OldSprite").unwrap();
        assert_eq!(class, "Sprite");
        assert!(db.is_class_enabled("OldSprite"));
    }

    #[test]
    fn test_editor_api_requires_editor_hint() {
        let db = db();
        db.set_current_api(ApiType::Editor);
        db.register_class("Inspector", "Object", Some(bare)).unwrap();
        db.set_current_api(ApiType::Core);

        assert_eq!(db.get_api_type("Inspector"), ApiType::Editor);
        assert!(!db.can_instance("Inspector"));
        assert!(matches!(
            db.resolve_factory("Inspector"),
            Err(ReflectError::PrivilegedApi(_))
        ));
        db.set_editor_hint(true);
        assert!(db.can_instance("Inspector"));
    }

    #[test]
    fn test_constants_and_enums() {
        let db = db();
        db.bind_integer_constant("Object", "", "MAX", 10).unwrap();
        db.bind_integer_constant("Node", "Node.Mode", "MODE_A", 0).unwrap();
        db.bind_integer_constant("Node", "Node.Mode", "MODE_B", 1).unwrap();
        assert!(db.bind_integer_constant("Node", "", "MODE_A", 5).is_err());

        assert_eq!(db.get_integer_constant("Sprite", "MAX"), Some(10));
        assert_eq!(db.get_integer_constant("Sprite", "MODE_B"), Some(1));
        assert_eq!(db.get_integer_constant("Object", "MODE_B"), None);
        assert_eq!(
            db.get_integer_constant_list("Node", false),
            ["MODE_A", "MODE_B", "MAX"]
        );
        assert_eq!(db.get_integer_constant_list("Node", true), ["MODE_A", "MODE_B"]);
        assert_eq!(db.get_enum_list("Sprite", false), ["Mode"]);
        assert_eq!(db.get_enum_constants("Node", "Mode", true), ["MODE_A", "MODE_B"]);
        assert_eq!(
            db.get_integer_constant_enum("Sprite", "MODE_A", false),
            Some("Mode".into())
        );
        assert_eq!(db.get_integer_constant_enum("Sprite", "MODE_A", true), None);
    }

    #[test]
    fn test_signals_checked_along_chain() {
        let db = db();
        db.add_signal("Node", MethodInfo::new("ready")).unwrap();
        assert!(matches!(
            db.add_signal("Sprite", MethodInfo::new("ready")),
            Err(ReflectError::SignalAlreadyDeclared { .. })
        ));
        assert!(db.has_signal("Sprite", "ready"));
        assert!(!db.has_signal("Object", "ready"));
        assert_eq!(db.get_signal_list("Sprite", true).len(), 0);
        assert_eq!(db.get_signal_list("Sprite", false).len(), 1);
    }

    #[test]
    fn test_virtual_methods_listed_first() {
        let db = db();
        db.add_virtual_method("Node", MethodInfo::new("_ready")).unwrap();
        db.bind_method("Node", MethodBind::vararg("rpc", MethodInfo::new("rpc"), |_, _| Ok(Variant::Nil)))
            .unwrap();

        let list = db.get_method_list("Node", true, false);
        assert_eq!(list[0].name, "_ready");
        assert!(list[0].flags.contains(MethodFlags::VIRTUAL));
        assert_eq!(list[1].name, "rpc");
        assert_eq!(db.get_virtual_methods("Sprite", false).len(), 1);
        assert!(db.get_virtual_methods("Sprite", true).is_empty());
    }

    #[test]
    fn test_method_flags_can_be_changed() {
        let db = db();
        let bind = db
            .bind_method("Node", MethodBind::vararg("rpc", MethodInfo::new("rpc"), |_, _| Ok(Variant::Nil)))
            .unwrap();
        db.set_method_flags("Node", "rpc", MethodFlags::NORMAL | MethodFlags::EDITOR)
            .unwrap();
        assert!(bind.hint_flags().contains(MethodFlags::EDITOR));
        assert!(db.set_method_flags("Node", "missing", MethodFlags::NORMAL).is_err());
        assert_eq!(
            db.set_method_flags("Missing", "rpc", MethodFlags::NORMAL),
            Err(ReflectError::ClassNotFound("Missing".into()))
        );
        assert!(
            db.get_method_list("Node", true, false)[0]
                .flags
                .contains(MethodFlags::EDITOR)
        );
    }

    #[test]
    fn test_resource_extensions() {
        let db = db();
        db.add_resource_base_extension("node", "Node");
        db.add_resource_base_extension("obj", "Object");
        db.add_resource_base_extension("node", "Sprite");

        assert_eq!(db.get_resource_base_extensions(), ["node", "obj"]);
        assert_eq!(db.get_extensions_for_type("Sprite"), ["node", "obj"]);
        assert_eq!(db.get_extensions_for_type("Object"), ["obj"]);
    }

    #[test]
    fn test_api_hash_skips_hidden_classes() {
        let db = db();
        let before = db.get_api_hash(ApiType::Core);
        db.set_class_exposed("Abstract", false).unwrap();
        assert_ne!(before, db.get_api_hash(ApiType::Core));
        assert!(!db.is_class_exposed("Abstract"));

        let editor_before = db.get_api_hash(ApiType::Editor);
        db.bind_integer_constant("Node", "", "LIMIT", 3).unwrap();
        assert_eq!(editor_before, db.get_api_hash(ApiType::Editor));
    }

    #[test]
    fn test_api_hash_depends_on_version() {
        let a = ClassDb::new("1.0");
        let b = ClassDb::new("1.1");
        assert_ne!(a.get_api_hash(ApiType::Core), b.get_api_hash(ApiType::Core));
    }

    #[test]
    fn test_cleanup_empties_registry() {
        let db = db();
        assert_eq!(db.len(), 4);
        db.cleanup();
        assert!(db.is_empty());
        assert!(!db.class_exists("Object"));
    }
}
