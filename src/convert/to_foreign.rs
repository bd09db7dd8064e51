//! Host-to-script conversion.
//!
//! Total: every host value becomes some script value. Scalars become
//! native literals so script code can do arithmetic on them; composites
//! either deep-copy into tables or wrap as proxy handles, driven by the
//! `proxify` flag. Complex numbers, channels and opaque references have
//! no native script form and always wrap.

use std::sync::Arc;

use tracing::trace;

use crate::convert::context::ConversionContext;
use crate::descriptor::{descriptor_for, TypeDescriptor};
use crate::engine::Engine;
use crate::host::value::{HostKey, HostValue};
use crate::vm::table::new_table;
use crate::vm::value::{ScriptValue, TableKey};

/// Convert a host value for script consumption.
///
/// `declared` is the host-declared type when one exists; it supplies
/// named-subtype identity and field renames. `proxify` asks for live
/// handles instead of copies wherever the value category supports
/// aliasing.
pub fn to_foreign(
    engine: &mut Engine,
    cx: &mut ConversionContext,
    value: &HostValue,
    declared: Option<&Arc<TypeDescriptor>>,
    proxify: bool,
) -> ScriptValue {
    let (concrete, was_ref) = match value.normalize() {
        Ok(pair) => pair,
        Err(err) => {
            cx.record_issue(err);
            return ScriptValue::Nil;
        }
    };

    match &concrete {
        HostValue::Nil => ScriptValue::Nil,

        HostValue::Bool(b) => {
            if proxify && is_named(declared) {
                wrap(engine, value, declared)
            } else {
                ScriptValue::Bool(*b)
            }
        }
        HostValue::Int(i) => {
            if proxify && is_named(declared) {
                wrap(engine, value, declared)
            } else {
                ScriptValue::Number(*i as f64)
            }
        }
        HostValue::Uint(u) => {
            if proxify && is_named(declared) {
                wrap(engine, value, declared)
            } else {
                ScriptValue::Number(*u as f64)
            }
        }
        HostValue::Float(x) => {
            if proxify && is_named(declared) {
                wrap(engine, value, declared)
            } else {
                ScriptValue::Number(*x)
            }
        }
        HostValue::Str(s) => {
            if proxify && is_named(declared) {
                wrap(engine, value, declared)
            } else {
                ScriptValue::str(s)
            }
        }

        // No native script form for these; always a handle.
        HostValue::Complex(_) | HostValue::Chan(_) => wrap(engine, value, declared),

        HostValue::Seq(items) => {
            if proxify {
                return wrap(engine, value, declared);
            }
            let identity = concrete.identity().unwrap_or_default();
            let is_empty = items.borrow().is_empty();
            if !is_empty {
                if let Some(seen) = cx.lookup_to_script(identity) {
                    return seen;
                }
            }
            let table = new_table();
            let result = ScriptValue::Table(table.clone());
            if !is_empty {
                cx.mark_to_script(identity, result.clone());
            }
            let elem_ty = declared.and_then(|d| d.elem.as_ref()).cloned();
            let snapshot = items.borrow().clone();
            for (i, item) in snapshot.iter().enumerate() {
                let converted = copy_element(engine, cx, item, elem_ty.as_ref());
                table
                    .borrow_mut()
                    .set(TableKey::number((i + 1) as f64), converted);
            }
            result
        }

        HostValue::Map(entries) => {
            if proxify {
                return wrap(engine, value, declared);
            }
            let identity = concrete.identity().unwrap_or_default();
            let is_empty = entries.borrow().is_empty();
            if !is_empty {
                if let Some(seen) = cx.lookup_to_script(identity) {
                    return seen;
                }
            }
            let table = new_table();
            let result = ScriptValue::Table(table.clone());
            if !is_empty {
                cx.mark_to_script(identity, result.clone());
            }
            let value_ty = declared.and_then(|d| d.value.as_ref()).cloned();
            let snapshot: Vec<(HostKey, HostValue)> = entries
                .borrow()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            for (key, item) in &snapshot {
                let script_key = match table_key(key) {
                    Some(k) => k,
                    None => continue,
                };
                let converted = copy_element(engine, cx, item, value_ty.as_ref());
                table.borrow_mut().set(script_key, converted);
            }
            result
        }

        HostValue::Record(record) => {
            // Only a record reached through a reference can alias host
            // memory; a by-value record copies even when proxified.
            if proxify && was_ref {
                return wrap(engine, value, declared);
            }
            let identity = concrete.identity().unwrap_or_default();
            if let Some(seen) = cx.lookup_to_script(identity) {
                return seen;
            }
            let table = new_table();
            let result = ScriptValue::Table(table.clone());
            cx.mark_to_script(identity, result.clone());
            let descriptor = record.borrow().descriptor().clone();
            let snapshot: Vec<HostValue> = (0..record.borrow().field_count())
                .filter_map(|i| record.borrow().get(i).cloned())
                .collect();
            for (i, field) in descriptor.fields.iter().enumerate() {
                let Some(item) = snapshot.get(i) else { break };
                let converted = copy_element(engine, cx, item, Some(&field.ty));
                table
                    .borrow_mut()
                    .set(TableKey::str(field.script_name()), converted);
            }
            result
        }

        HostValue::Func(func) => {
            ScriptValue::Function(crate::adapter::wrap_callable(func.clone()))
        }

        // The host held a script value; hand the original back.
        HostValue::Script(inner) => (**inner).clone(),

        HostValue::Opaque(opaque) => {
            if let Some(err) = opaque.downcast_ref::<anyhow::Error>() {
                return ScriptValue::str(err.to_string());
            }
            wrap(engine, value, declared)
        }

        // normalize never leaves a reference level on top.
        HostValue::Ref(_) => ScriptValue::Nil,
    }
}

/// An absent element inside a copied container keeps its position as
/// the null marker; a bare nil would erase the key.
fn copy_element(
    engine: &mut Engine,
    cx: &mut ConversionContext,
    item: &HostValue,
    declared: Option<&Arc<TypeDescriptor>>,
) -> ScriptValue {
    if item.is_nil() {
        return engine.null_marker();
    }
    to_foreign(engine, cx, item, declared, false)
}

fn is_named(declared: Option<&Arc<TypeDescriptor>>) -> bool {
    declared.is_some_and(|d| d.is_named())
}

/// Mint a handle. The pre-normalization value is wrapped so reference
/// levels survive inside the entry and writes reach host memory.
fn wrap(
    engine: &mut Engine,
    original: &HostValue,
    declared: Option<&Arc<TypeDescriptor>>,
) -> ScriptValue {
    let descriptor = declared
        .cloned()
        .unwrap_or_else(|| descriptor_for(original));
    trace!(type_name = %descriptor.display_name(), "wrapping host value as foreign handle");
    engine.make_foreign(original.clone(), descriptor)
}

fn table_key(key: &HostKey) -> Option<TableKey> {
    match key {
        HostKey::Bool(b) => Some(TableKey::Bool(*b)),
        HostKey::Int(i) => Some(TableKey::number(*i as f64)),
        HostKey::Uint(u) => Some(TableKey::number(*u as f64)),
        HostKey::Float(x) => Some(TableKey::number(x.0)),
        HostKey::Str(s) => Some(TableKey::str(s)),
    }
}
