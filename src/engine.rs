//! The engine instance.
//!
//! One engine embeds one script runtime: it owns the foreign handle
//! table, the canonical null marker, the global registration table and
//! the named-type cache, and it fronts the conversion, proxy and
//! operator layers behind one surface. Engines are independent; values
//! never share handles across engines, though a channel registered
//! into two engines connects their scripts.

use std::sync::Arc;

use tracing::debug;

use rustc_hash::FxHashMap;

use crate::convert::{ConversionContext, Converted};
use crate::descriptor::{DescriptorCache, TypeDescriptor, TypeHash};
use crate::error::{ConvertError, ScriptError};
use crate::handles::{HandleId, HandleTable, ProxyEntry};
use crate::host::func::{HostFn, MethodSpec};
use crate::host::value::{HostValue, NullSentinel};
use crate::vm::table::{new_table, TableRef};
use crate::vm::value::{ScriptFn, ScriptValue, TableKey};

pub struct Engine {
    handles: HandleTable,
    null_id: HandleId,
    globals: TableRef,
    types: DescriptorCache,
    /// Method implementations, keyed by the named type they hang off.
    methods: FxHashMap<TypeHash, Vec<MethodSpec>>,
}

impl Default for Engine {
    fn default() -> Self {
        Engine::new()
    }
}

impl Engine {
    pub fn new() -> Engine {
        let mut handles = HandleTable::new();
        // The null marker is one canonical handle per engine; every
        // absent container position converts to this same handle.
        let null_id = handles.insert(ProxyEntry {
            value: HostValue::opaque(NullSentinel),
            descriptor: TypeDescriptor::any(),
        });
        Engine {
            handles,
            null_id,
            globals: new_table(),
            types: DescriptorCache::new(),
            methods: FxHashMap::default(),
        }
    }

    // ========================================================================
    // Conversion surface
    // ========================================================================

    /// Convert a host value for script consumption, with no declared
    /// type.
    pub fn to_foreign(&mut self, value: &HostValue, proxify: bool) -> ScriptValue {
        let mut cx = ConversionContext::new();
        crate::convert::to_foreign(self, &mut cx, value, None, proxify)
    }

    /// Same, with the host-declared type driving named-subtype wrapping
    /// and field renames.
    pub fn to_foreign_typed(
        &mut self,
        value: &HostValue,
        declared: &Arc<TypeDescriptor>,
        proxify: bool,
    ) -> ScriptValue {
        let mut cx = ConversionContext::new();
        crate::convert::to_foreign(self, &mut cx, value, Some(declared), proxify)
    }

    /// Convert a script value to the target host type.
    ///
    /// A top-level failure is an error; element failures inside
    /// composites come back as a partial status on a usable result.
    pub fn from_foreign(
        &mut self,
        value: &ScriptValue,
        target: &Arc<TypeDescriptor>,
    ) -> Result<Converted, ConvertError> {
        let mut cx = ConversionContext::new();
        let converted = crate::convert::from_foreign(self, &mut cx, value, target)?;
        Ok(Converted {
            value: converted,
            status: cx.into_status(),
        })
    }

    /// Wrap a host callable as a script function value.
    pub fn wrap_callable(&mut self, callable: HostFn) -> ScriptValue {
        ScriptValue::Function(crate::adapter::wrap_callable(callable))
    }

    // ========================================================================
    // Handles
    // ========================================================================

    /// Mint a foreign handle over a host value.
    pub fn make_foreign(
        &mut self,
        value: HostValue,
        descriptor: Arc<TypeDescriptor>,
    ) -> ScriptValue {
        let id = self.handles.insert(ProxyEntry { value, descriptor });
        ScriptValue::Foreign(id)
    }

    pub fn handle(&self, id: HandleId) -> Result<&ProxyEntry, ConvertError> {
        self.handles.get(id)
    }

    pub fn handle_mut(&mut self, id: HandleId) -> Result<&mut ProxyEntry, ConvertError> {
        self.handles.get_mut(id)
    }

    /// Release a handle's bookkeeping. The wrapped host value lives on
    /// wherever the host still holds it. The null marker is permanent.
    pub fn finalize(&mut self, id: HandleId) -> bool {
        if id == self.null_id {
            return false;
        }
        self.handles.finalize(id)
    }

    /// Live handles, the null marker included.
    pub fn live_handles(&self) -> usize {
        self.handles.live_count()
    }

    /// The canonical absent-value handle.
    pub fn null_marker(&self) -> ScriptValue {
        ScriptValue::Foreign(self.null_id)
    }

    pub fn is_null_marker(&self, value: &ScriptValue) -> bool {
        match value {
            ScriptValue::Foreign(id) => self
                .handles
                .get(*id)
                .map(|entry| entry.value.is_null_sentinel())
                .unwrap_or(false),
            _ => false,
        }
    }

    /// Replace a proxy handle with a plain copy of its contents.
    /// Non-handle values come back unchanged.
    pub fn unproxify(&mut self, value: &ScriptValue) -> ScriptValue {
        match value {
            ScriptValue::Foreign(id) => match self.handles.get(*id) {
                Ok(entry) => {
                    let held = entry.value.clone();
                    let descriptor = entry.descriptor.clone();
                    let mut cx = ConversionContext::new();
                    crate::convert::to_foreign(self, &mut cx, &held, Some(&descriptor), false)
                }
                Err(_) => ScriptValue::Nil,
            },
            other => other.clone(),
        }
    }

    /// The wrapped host type's name, for script-side introspection.
    pub fn proxy_type_name(&self, value: &ScriptValue) -> Option<String> {
        match value {
            ScriptValue::Foreign(id) => self
                .handles
                .get(*id)
                .ok()
                .map(|entry| entry.descriptor.display_name()),
            _ => None,
        }
    }

    // ========================================================================
    // Named types
    // ========================================================================

    /// Define a named type; the first definition of a name wins.
    pub fn define_type(&mut self, descriptor: Arc<TypeDescriptor>) -> Arc<TypeDescriptor> {
        self.types.define(descriptor)
    }

    pub fn lookup_type(&self, name: &str) -> Option<Arc<TypeDescriptor>> {
        self.types.lookup(name)
    }

    /// Attach a method to a named type. Member lookup on handles of
    /// that type resolves it by its script-visible name.
    pub fn register_method(&mut self, type_name: &str, spec: MethodSpec) {
        self.methods
            .entry(TypeHash::from_name(type_name))
            .or_default()
            .push(spec);
    }

    /// Resolve a method on a descriptor's named type.
    pub fn method_of(&self, descriptor: &TypeDescriptor, name: &str) -> Option<MethodSpec> {
        let type_name = descriptor.name.as_deref()?;
        self.methods
            .get(&TypeHash::from_name(type_name))?
            .iter()
            .find(|m| &*m.name == name)
            .cloned()
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Expose host values to script code.
    ///
    /// With a namespace, entries land in a table under that global
    /// name, created on first use and reused afterwards. Without one,
    /// entries become globals directly. Values are proxified;
    /// callables wrap through the function adapter.
    pub fn register(&mut self, namespace: Option<&str>, entries: &[(&str, HostValue)]) {
        debug!(namespace = namespace.unwrap_or(""), count = entries.len(), "registering");
        let target = match namespace {
            Some(name) => {
                let existing = self.globals.borrow().get(&TableKey::str(name));
                match existing {
                    ScriptValue::Table(t) => t,
                    _ => {
                        let t = new_table();
                        self.globals
                            .borrow_mut()
                            .set(TableKey::str(name), ScriptValue::Table(t.clone()));
                        t
                    }
                }
            }
            None => self.globals.clone(),
        };
        for (name, value) in entries {
            let converted = self.to_foreign(value, true);
            target.borrow_mut().set(TableKey::str(name), converted);
        }
    }

    pub fn globals(&self) -> TableRef {
        self.globals.clone()
    }

    pub fn global(&self, name: &str) -> ScriptValue {
        self.globals.borrow().get(&TableKey::str(name))
    }

    // ========================================================================
    // Proxy operation surface
    // ========================================================================

    pub fn index_get(&mut self, id: HandleId, key: &ScriptValue) -> Result<ScriptValue, ConvertError> {
        crate::proxy::index_get(self, id, key)
    }

    pub fn index_set(
        &mut self,
        id: HandleId,
        key: &ScriptValue,
        value: &ScriptValue,
    ) -> Result<(), ConvertError> {
        crate::proxy::index_set(self, id, key, value)
    }

    pub fn length(&self, id: HandleId) -> Result<usize, ConvertError> {
        crate::proxy::length(self, id)
    }

    pub fn iterate(&mut self, id: HandleId) -> Result<ScriptFn, ConvertError> {
        crate::proxy::iterate(self, id)
    }

    pub fn call(
        &mut self,
        id: HandleId,
        args: &[ScriptValue],
    ) -> Result<Vec<ScriptValue>, ScriptError> {
        crate::proxy::call(self, id, args)
    }

    pub fn equals(&self, id: HandleId, other: &ScriptValue) -> Result<bool, ConvertError> {
        crate::proxy::equals(self, id, other)
    }

    pub fn to_text(&self, id: HandleId) -> Result<String, ConvertError> {
        crate::proxy::text_form(self, id)
    }

    // ========================================================================
    // Script-object access
    // ========================================================================

    /// Read a member of a host-held script object.
    pub fn script_get(
        &mut self,
        object: &HostValue,
        key: &ScriptValue,
    ) -> Result<HostValue, ConvertError> {
        let HostValue::Script(inner) = object else {
            return Err(ConvertError::conversion(
                object.type_name(),
                "script object",
            ));
        };
        let ScriptValue::Table(table) = &**inner else {
            return Err(ConvertError::NotIndexable {
                type_name: inner.type_name().to_string(),
            });
        };
        let Some(table_key) = TableKey::from_value(key) else {
            return Err(ConvertError::conversion(key.type_name(), "table key"));
        };
        let found = table.borrow().get(&table_key);
        let mut cx = ConversionContext::new();
        crate::convert::from_foreign(self, &mut cx, &found, &TypeDescriptor::any())
    }

    /// Write a member of a host-held script object.
    pub fn script_set(
        &mut self,
        object: &HostValue,
        key: &ScriptValue,
        value: &HostValue,
    ) -> Result<(), ConvertError> {
        let HostValue::Script(inner) = object else {
            return Err(ConvertError::conversion(
                object.type_name(),
                "script object",
            ));
        };
        let ScriptValue::Table(table) = &**inner else {
            return Err(ConvertError::NotIndexable {
                type_name: inner.type_name().to_string(),
            });
        };
        let Some(table_key) = TableKey::from_value(key) else {
            return Err(ConvertError::conversion(key.type_name(), "table key"));
        };
        let converted = self.to_foreign(value, false);
        table.borrow_mut().set(table_key, converted);
        Ok(())
    }

    /// Call a host-held script function with host arguments.
    pub fn script_call(
        &mut self,
        object: &HostValue,
        args: &[HostValue],
    ) -> Result<Vec<HostValue>, ScriptError> {
        let HostValue::Script(inner) = object else {
            return Err(ConvertError::NotCallable {
                type_name: object.type_name().to_string(),
            }
            .into());
        };
        let ScriptValue::Function(func) = (**inner).clone() else {
            return Err(ConvertError::NotCallable {
                type_name: inner.type_name().to_string(),
            }
            .into());
        };
        let script_args: Vec<ScriptValue> =
            args.iter().map(|a| self.to_foreign(a, true)).collect();
        let results = func.call(self, &script_args)?;
        let mut out = Vec::with_capacity(results.len());
        for result in &results {
            let mut cx = ConversionContext::new();
            let value = crate::convert::from_foreign(self, &mut cx, result, &TypeDescriptor::any())?;
            out.push(value);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::Category;

    #[test]
    fn null_marker_is_canonical() {
        let mut engine = Engine::new();
        let a = engine.null_marker();
        let b = engine.null_marker();
        assert!(a.same_value(&b));
        assert!(engine.is_null_marker(&a));
        assert!(!engine.is_null_marker(&ScriptValue::Nil));
    }

    #[test]
    fn null_marker_survives_finalize() {
        let mut engine = Engine::new();
        let ScriptValue::Foreign(id) = engine.null_marker() else {
            panic!("expected a handle");
        };
        assert!(!engine.finalize(id));
        assert!(engine.is_null_marker(&engine.null_marker()));
    }

    #[test]
    fn register_creates_and_reuses_a_namespace() {
        let mut engine = Engine::new();
        engine.register(Some("util"), &[("x", HostValue::Int(1))]);
        engine.register(Some("util"), &[("y", HostValue::Int(2))]);
        let ScriptValue::Table(ns) = engine.global("util") else {
            panic!("expected a namespace table");
        };
        assert!(!ns.borrow().get(&TableKey::str("x")).is_nil());
        assert!(!ns.borrow().get(&TableKey::str("y")).is_nil());
    }

    #[test]
    fn register_without_namespace_lands_in_globals() {
        let mut engine = Engine::new();
        engine.register(None, &[("answer", HostValue::Int(42))]);
        assert!(matches!(engine.global("answer"), ScriptValue::Number(n) if n == 42.0));
    }

    #[test]
    fn handle_entries_are_mutable_in_place() {
        let mut engine = Engine::new();
        let sv = engine.make_foreign(
            HostValue::Int(1),
            TypeDescriptor::named_scalar("Count", Category::Signed),
        );
        let ScriptValue::Foreign(id) = sv else {
            panic!("expected a handle");
        };
        engine.handle_mut(id).unwrap().value = HostValue::Int(5);
        assert!(engine.handle(id).unwrap().value.host_eq(&HostValue::Int(5)));
    }

    #[test]
    fn finalized_handles_read_stale() {
        let mut engine = Engine::new();
        let sv = engine.make_foreign(
            HostValue::Int(1),
            TypeDescriptor::named_scalar("Count", Category::Signed),
        );
        let ScriptValue::Foreign(id) = sv else {
            panic!("expected a handle");
        };
        assert!(engine.finalize(id));
        assert!(matches!(engine.handle(id), Err(ConvertError::StaleHandle)));
        assert!(!engine.finalize(id));
    }

    #[test]
    fn proxy_type_name_reports_the_descriptor() {
        let mut engine = Engine::new();
        let sv = engine.make_foreign(
            HostValue::Float(1.5),
            TypeDescriptor::named_scalar("Celsius", Category::Float),
        );
        assert_eq!(engine.proxy_type_name(&sv).as_deref(), Some("Celsius"));
        assert_eq!(engine.proxy_type_name(&ScriptValue::Nil), None);
    }
}
