//! Foreign-handle operations.
//!
//! Script code sees a handle as one opaque value; everything it can do
//! with it (index, assign, measure, iterate, call, compare, print)
//! lands here and is dispatched on the wrapped value's category. Writes
//! through a handle reach live host memory; the handle wraps the shared
//! container, not a copy.

use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;

use tracing::trace;

use crate::convert::{from_foreign, to_foreign, ConversionContext};
use crate::descriptor::TypeDescriptor;
use crate::engine::Engine;
use crate::error::{ConvertError, ScriptError};
use crate::handles::HandleId;
use crate::host::channel::ChanPayload;
use crate::host::func::{HostFn, MethodSpec};
use crate::host::value::{HostKey, HostValue};
use crate::vm::task::PendingOp;
use crate::vm::value::{ScriptFn, ScriptValue};

fn entry_parts(
    engine: &Engine,
    id: HandleId,
) -> Result<(HostValue, Arc<TypeDescriptor>), ConvertError> {
    let entry = engine.handle(id)?;
    Ok((entry.value.clone(), entry.descriptor.clone()))
}

/// The descriptor proxy behavior dispatches on: for handles wrapping a
/// record, the record's own declared type wins over a derived one.
fn behavior_descriptor(concrete: &HostValue, descriptor: &Arc<TypeDescriptor>) -> Arc<TypeDescriptor> {
    match concrete {
        HostValue::Record(r) => r.borrow().descriptor().clone(),
        _ => descriptor.clone(),
    }
}

// ============================================================================
// Indexed reads
// ============================================================================

pub fn index_get(
    engine: &mut Engine,
    id: HandleId,
    key: &ScriptValue,
) -> Result<ScriptValue, ConvertError> {
    let (value, descriptor) = entry_parts(engine, id)?;
    let (concrete, _) = value.normalize()?;
    let descriptor = behavior_descriptor(&concrete, &descriptor);

    match &concrete {
        HostValue::Seq(items) => {
            if let ScriptValue::Str(name) = key {
                if let Some(f) = seq_builtin(id, &descriptor, name) {
                    return Ok(f);
                }
                if let Some(f) = method_value(engine, &value, &descriptor, name) {
                    return Ok(f);
                }
                return Err(ConvertError::NoSuchMember {
                    name: name.to_string(),
                    on: descriptor.display_name(),
                });
            }
            let index = seq_index(key, items.borrow().len())?;
            let item = items.borrow()[index].clone();
            let elem = descriptor.elem.clone();
            let mut cx = ConversionContext::new();
            Ok(to_foreign(engine, &mut cx, &item, elem.as_ref(), true))
        }

        HostValue::Map(entries) => {
            let key_ty = descriptor.key.clone().unwrap_or_else(TypeDescriptor::any);
            let mut cx = ConversionContext::new();
            let host_key = from_foreign(engine, &mut cx, key, &key_ty)
                .ok()
                .and_then(|v| HostKey::from_host(&v));
            if let Some(host_key) = host_key {
                if let Some(found) = entries.borrow().get(&host_key).cloned() {
                    let value_ty = descriptor.value.clone();
                    let mut cx = ConversionContext::new();
                    return Ok(to_foreign(engine, &mut cx, &found, value_ty.as_ref(), true));
                }
            }
            // Missing string keys fall back to method lookup before nil.
            if let ScriptValue::Str(name) = key {
                if let Some(f) = method_value(engine, &value, &descriptor, name) {
                    return Ok(f);
                }
            }
            Ok(ScriptValue::Nil)
        }

        HostValue::Record(record) => {
            let ScriptValue::Str(name) = key else {
                return Err(ConvertError::NotIndexable {
                    type_name: descriptor.display_name(),
                });
            };
            if let Some(index) = descriptor.field_index(name) {
                let item = record.borrow().get(index).cloned().unwrap_or(HostValue::Nil);
                let field_ty = descriptor.fields[index].ty.clone();
                let mut cx = ConversionContext::new();
                return Ok(to_foreign(engine, &mut cx, &item, Some(&field_ty), true));
            }
            if let Some(f) = method_value(engine, &value, &descriptor, name) {
                return Ok(f);
            }
            Err(ConvertError::NoSuchMember {
                name: name.to_string(),
                on: descriptor.display_name(),
            })
        }

        HostValue::Chan(_) => {
            let ScriptValue::Str(name) = key else {
                return Err(ConvertError::NotIndexable {
                    type_name: "channel".into(),
                });
            };
            chan_member(id, name)
        }

        HostValue::Complex(c) => {
            if let ScriptValue::Str(name) = key {
                match &**name {
                    "real" => return Ok(ScriptValue::Number(c.re)),
                    "imag" => return Ok(ScriptValue::Number(c.im)),
                    _ => {
                        if let Some(f) = method_value(engine, &value, &descriptor, name) {
                            return Ok(f);
                        }
                        return Err(ConvertError::NoSuchMember {
                            name: name.to_string(),
                            on: "complex".into(),
                        });
                    }
                }
            }
            Err(ConvertError::NotIndexable {
                type_name: "complex".into(),
            })
        }

        // Named scalars and opaque references: member access reaches
        // methods only.
        _ => {
            if let ScriptValue::Str(name) = key {
                if let Some(f) = method_value(engine, &value, &descriptor, name) {
                    return Ok(f);
                }
                return Err(ConvertError::NoSuchMember {
                    name: name.to_string(),
                    on: descriptor.display_name(),
                });
            }
            Err(ConvertError::NotIndexable {
                type_name: descriptor.display_name(),
            })
        }
    }
}

// ============================================================================
// Indexed writes
// ============================================================================

pub fn index_set(
    engine: &mut Engine,
    id: HandleId,
    key: &ScriptValue,
    new_value: &ScriptValue,
) -> Result<(), ConvertError> {
    let (value, descriptor) = entry_parts(engine, id)?;
    let (concrete, _) = value.normalize()?;
    let descriptor = behavior_descriptor(&concrete, &descriptor);
    trace!(type_name = %descriptor.display_name(), "handle write");

    match &concrete {
        HostValue::Seq(items) => {
            let index = seq_index(key, items.borrow().len())?;
            let elem = descriptor.elem.clone().unwrap_or_else(TypeDescriptor::any);
            let mut cx = ConversionContext::new();
            let converted = from_foreign(engine, &mut cx, new_value, &elem)?;
            items.borrow_mut()[index] = converted;
            Ok(())
        }

        HostValue::Map(entries) => {
            let key_ty = descriptor.key.clone().unwrap_or_else(TypeDescriptor::any);
            let mut cx = ConversionContext::new();
            let host_key = HostKey::from_host(&from_foreign(engine, &mut cx, key, &key_ty)?)
                .ok_or_else(|| ConvertError::conversion(key.type_name(), "mapping key"))?;
            if new_value.is_nil() {
                entries.borrow_mut().remove(&host_key);
                return Ok(());
            }
            let value_ty = descriptor.value.clone().unwrap_or_else(TypeDescriptor::any);
            let mut cx = ConversionContext::new();
            let converted = from_foreign(engine, &mut cx, new_value, &value_ty)?;
            entries.borrow_mut().insert(host_key, converted);
            Ok(())
        }

        HostValue::Record(record) => {
            let ScriptValue::Str(name) = key else {
                return Err(ConvertError::NotIndexable {
                    type_name: descriptor.display_name(),
                });
            };
            let Some(index) = descriptor.field_index(name) else {
                return Err(ConvertError::NoSuchMember {
                    name: name.to_string(),
                    on: descriptor.display_name(),
                });
            };
            let field_ty = descriptor.fields[index].ty.clone();
            let mut cx = ConversionContext::new();
            let converted = from_foreign(engine, &mut cx, new_value, &field_ty)?;
            record.borrow_mut().set(index, converted);
            Ok(())
        }

        _ => Err(ConvertError::NotIndexable {
            type_name: descriptor.display_name(),
        }),
    }
}

// ============================================================================
// Length, iteration, equality, text
// ============================================================================

pub fn length(engine: &Engine, id: HandleId) -> Result<usize, ConvertError> {
    let (value, descriptor) = entry_parts(engine, id)?;
    let (concrete, _) = value.normalize()?;
    match &concrete {
        HostValue::Seq(items) => Ok(items.borrow().len()),
        HostValue::Map(entries) => Ok(entries.borrow().len()),
        HostValue::Str(s) => Ok(s.len()),
        _ => Err(ConvertError::NotIndexable {
            type_name: descriptor.display_name(),
        }),
    }
}

/// Build a stateful iterator function over the handle's contents.
///
/// Sequences yield `(index, value)` in order; mappings yield
/// `(key, value)` over a key snapshot in no particular order; records
/// yield `(field name, value)` in declaration order. Exhaustion yields
/// nil.
pub fn iterate(engine: &mut Engine, id: HandleId) -> Result<ScriptFn, ConvertError> {
    let (value, descriptor) = entry_parts(engine, id)?;
    let (concrete, _) = value.normalize()?;
    let descriptor = behavior_descriptor(&concrete, &descriptor);

    match concrete {
        HostValue::Seq(items) => {
            let elem = descriptor.elem.clone();
            let cursor = Rc::new(Cell::new(0usize));
            Ok(ScriptFn::new(move |engine, _args| {
                let i = cursor.get();
                let item = items.borrow().get(i).cloned();
                match item {
                    Some(item) => {
                        cursor.set(i + 1);
                        let mut cx = ConversionContext::new();
                        let sv = to_foreign(engine, &mut cx, &item, elem.as_ref(), true);
                        Ok(vec![ScriptValue::Number((i + 1) as f64), sv])
                    }
                    None => Ok(vec![ScriptValue::Nil]),
                }
            }))
        }

        HostValue::Map(entries) => {
            let value_ty = descriptor.value.clone();
            let keys: Vec<HostKey> = entries.borrow().keys().cloned().collect();
            let cursor = Rc::new(Cell::new(0usize));
            Ok(ScriptFn::new(move |engine, _args| {
                loop {
                    let i = cursor.get();
                    let Some(key) = keys.get(i) else {
                        return Ok(vec![ScriptValue::Nil]);
                    };
                    cursor.set(i + 1);
                    // Entries removed since the snapshot are skipped.
                    let Some(item) = entries.borrow().get(key).cloned() else {
                        continue;
                    };
                    let mut cx = ConversionContext::new();
                    let key_sv = to_foreign(engine, &mut cx, &key.to_host(), None, false);
                    let val_sv = to_foreign(engine, &mut cx, &item, value_ty.as_ref(), true);
                    return Ok(vec![key_sv, val_sv]);
                }
            }))
        }

        HostValue::Record(record) => {
            let cursor = Rc::new(Cell::new(0usize));
            Ok(ScriptFn::new(move |engine, _args| {
                let i = cursor.get();
                let rec_desc = record.borrow().descriptor().clone();
                let Some(field) = rec_desc.fields.get(i) else {
                    return Ok(vec![ScriptValue::Nil]);
                };
                cursor.set(i + 1);
                let item = record.borrow().get(i).cloned().unwrap_or(HostValue::Nil);
                let mut cx = ConversionContext::new();
                let sv = to_foreign(engine, &mut cx, &item, Some(&field.ty), true);
                Ok(vec![ScriptValue::str(field.script_name()), sv])
            }))
        }

        _ => Err(ConvertError::NotIndexable {
            type_name: descriptor.display_name(),
        }),
    }
}

/// Handle equality, as exposed to script comparison.
pub fn equals(engine: &Engine, id: HandleId, other: &ScriptValue) -> Result<bool, ConvertError> {
    let (value, _) = entry_parts(engine, id)?;
    match other {
        ScriptValue::Foreign(other_id) => {
            let (other_value, _) = entry_parts(engine, *other_id)?;
            Ok(value.host_eq(&other_value))
        }
        _ => Ok(false),
    }
}

/// The uniform text rendering of a handle's wrapped value.
pub fn text_form(engine: &Engine, id: HandleId) -> Result<String, ConvertError> {
    let (value, _) = entry_parts(engine, id)?;
    Ok(value.to_string())
}

// ============================================================================
// Calls
// ============================================================================

pub fn call(
    engine: &mut Engine,
    id: HandleId,
    args: &[ScriptValue],
) -> Result<Vec<ScriptValue>, ScriptError> {
    let (value, descriptor) = entry_parts(engine, id)?;
    let (concrete, _) = value.normalize()?;
    match concrete {
        HostValue::Func(func) => crate::adapter::FunctionAdapter::new(func).invoke(engine, args),
        _ => Err(ConvertError::NotCallable {
            type_name: descriptor.display_name(),
        }
        .into()),
    }
}

// ============================================================================
// Members
// ============================================================================

/// Resolve a method and bind the receiver, producing a script callable.
fn method_value(
    engine: &Engine,
    receiver: &HostValue,
    descriptor: &Arc<TypeDescriptor>,
    name: &str,
) -> Option<ScriptValue> {
    let spec = engine.method_of(descriptor, name)?;
    let bound = bind_method(receiver, &spec);
    Some(ScriptValue::Function(crate::adapter::wrap_callable(bound)))
}

/// Prepend the receiver to the method's callable.
///
/// A by-ref method on a handle holding a plain value gets the value
/// behind a fresh reference, the way a host language takes the address
/// of an addressable copy.
fn bind_method(receiver: &HostValue, spec: &MethodSpec) -> HostFn {
    let receiver = if spec.by_ref && !matches!(receiver, HostValue::Ref(_)) {
        HostValue::reference(receiver.clone())
    } else {
        receiver.clone()
    };
    let signature = spec.func.signature();
    let bound_signature = TypeDescriptor::callable(
        signature.params.iter().skip(1).cloned().collect(),
        signature.variadic.clone(),
        signature.returns.clone(),
    );
    let inner = spec.func.clone();
    HostFn::new(bound_signature, move |args: &[HostValue]| {
        let mut full = Vec::with_capacity(args.len() + 1);
        full.push(receiver.clone());
        full.extend_from_slice(args);
        inner.invoke(&full)
    })
}

/// Built-in sequence members, before descriptor methods.
fn seq_builtin(
    id: HandleId,
    descriptor: &Arc<TypeDescriptor>,
    name: &str,
) -> Option<ScriptValue> {
    let elem = descriptor.elem.clone().unwrap_or_else(TypeDescriptor::any);
    match name {
        // append(v, ...) grows the shared sequence and returns the
        // same handle.
        "append" => Some(ScriptValue::Function(ScriptFn::new(move |engine, args| {
            let (value, _) = entry_parts(engine, id)?;
            let (concrete, _) = value.normalize()?;
            let HostValue::Seq(items) = concrete else {
                return Err(ScriptError::runtime("append target is not a sequence"));
            };
            for arg in args {
                let mut cx = ConversionContext::new();
                let converted = from_foreign(engine, &mut cx, arg, &elem)?;
                items.borrow_mut().push(converted);
            }
            Ok(vec![ScriptValue::Foreign(id)])
        }))),
        // sub(i, j): 1-based inclusive copy.
        "sub" => Some(ScriptValue::Function(ScriptFn::new(move |engine, args| {
            let (value, descriptor) = entry_parts(engine, id)?;
            let (concrete, _) = value.normalize()?;
            let HostValue::Seq(items) = concrete else {
                return Err(ScriptError::runtime("sub target is not a sequence"));
            };
            let len = items.borrow().len();
            let lo = arg_index(args.first(), 1);
            let hi = arg_index(args.get(1), len as i64);
            if lo < 1 || hi > len as i64 || lo > hi + 1 {
                return Err(ConvertError::IndexOutOfRange { index: lo, len }.into());
            }
            let copy: Vec<HostValue> =
                items.borrow()[(lo - 1) as usize..hi as usize].to_vec();
            Ok(vec![engine.make_foreign(HostValue::seq(copy), descriptor)])
        }))),
        _ => None,
    }
}

fn arg_index(arg: Option<&ScriptValue>, default: i64) -> i64 {
    match arg {
        Some(ScriptValue::Number(n)) if n.fract() == 0.0 => *n as i64,
        _ => default,
    }
}

/// Channel members: each returns a function that suspends the task
/// with the pending operation for the driver to perform.
fn chan_member(id: HandleId, name: &str) -> Result<ScriptValue, ConvertError> {
    match name {
        "send" => Ok(ScriptValue::Function(ScriptFn::new(move |engine, args| {
            let (value, _) = entry_parts(engine, id)?;
            let (concrete, _) = value.normalize()?;
            let HostValue::Chan(chan) = concrete else {
                return Err(ScriptError::runtime("send target is not a channel"));
            };
            let arg = args.first().cloned().unwrap_or(ScriptValue::Nil);
            let mut cx = ConversionContext::new();
            let elem = chan.elem().clone();
            let converted = from_foreign(engine, &mut cx, &arg, &elem)?;
            let payload = ChanPayload::from_host(&converted)?;
            Err(ScriptError::Suspended(PendingOp::Send { chan, payload }))
        }))),
        "recv" => Ok(ScriptValue::Function(ScriptFn::new(move |engine, _args| {
            let (value, _) = entry_parts(engine, id)?;
            let (concrete, _) = value.normalize()?;
            let HostValue::Chan(chan) = concrete else {
                return Err(ScriptError::runtime("recv target is not a channel"));
            };
            Err(ScriptError::Suspended(PendingOp::Recv { chan }))
        }))),
        "close" => Ok(ScriptValue::Function(ScriptFn::new(move |engine, _args| {
            let (value, _) = entry_parts(engine, id)?;
            let (concrete, _) = value.normalize()?;
            let HostValue::Chan(chan) = concrete else {
                return Err(ScriptError::runtime("close target is not a channel"));
            };
            Err(ScriptError::Suspended(PendingOp::Close { chan }))
        }))),
        _ => Err(ConvertError::NoSuchMember {
            name: name.to_string(),
            on: "channel".into(),
        }),
    }
}

fn seq_index(key: &ScriptValue, len: usize) -> Result<usize, ConvertError> {
    let index = match key {
        ScriptValue::Number(n) if n.fract() == 0.0 => *n as i64,
        _ => {
            return Err(ConvertError::conversion(key.type_name(), "sequence index"));
        }
    };
    if index < 1 || index > len as i64 {
        return Err(ConvertError::IndexOutOfRange { index, len });
    }
    Ok((index - 1) as usize)
}
