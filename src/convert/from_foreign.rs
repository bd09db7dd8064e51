//! Script-to-host conversion.
//!
//! Partial by design: a script value only becomes a host value when the
//! target type can represent it exactly. Numeric narrowing checks
//! integrality and declared width; kind mismatches fail instead of
//! coercing. Inside composites a failing element records an issue and
//! leaves the target's zero value, so one bad element does not abort
//! the whole conversion.

use std::sync::Arc;

use tracing::trace;

use crate::convert::context::ConversionContext;
use crate::descriptor::{Category, TypeDescriptor};
use crate::engine::Engine;
use crate::error::ConvertError;
use crate::host::complex::Complex64;
use crate::host::record::Record;
use crate::host::value::{HostKey, HostValue};
use crate::vm::table::{table_identity, TableRef};
use crate::vm::value::{ScriptValue, TableKey};

/// Convert a script value to a host value of the target type.
pub fn from_foreign(
    engine: &mut Engine,
    cx: &mut ConversionContext,
    value: &ScriptValue,
    target: &Arc<TypeDescriptor>,
) -> Result<HostValue, ConvertError> {
    // Nil zeroes any target; a reference target zeroes to nil itself.
    if value.is_nil() {
        return Ok(TypeDescriptor::zero_value(target));
    }

    if target.is_reference() {
        return convert_reference(engine, cx, value, target);
    }

    match value {
        ScriptValue::Nil => Ok(TypeDescriptor::zero_value(target)),

        ScriptValue::Bool(b) => match target.category {
            Category::Bool => Ok(HostValue::Bool(*b)),
            _ if target.is_open() => Ok(HostValue::Bool(*b)),
            _ => Err(mismatch(value, target)),
        },

        ScriptValue::Number(n) => number_to_host(*n, target).ok_or_else(|| match target.category {
            Category::Signed | Category::Unsigned => ConvertError::Narrowing {
                value: *n,
                target: target.display_name(),
            },
            _ => mismatch(value, target),
        }),

        ScriptValue::Str(s) => match target.category {
            Category::Text => Ok(HostValue::Str(s.to_string())),
            _ if target.is_open() => Ok(HostValue::Str(s.to_string())),
            _ => Err(mismatch(value, target)),
        },

        ScriptValue::Function(_) => {
            if target.is_open() {
                // Script callables cross as two-way script handles; the
                // host calls back through the engine.
                Ok(HostValue::Script(Box::new(value.clone())))
            } else {
                Err(mismatch(value, target))
            }
        }

        ScriptValue::Foreign(id) => {
            let entry = engine.handle(*id)?;
            let held = entry.value.clone();
            if held.is_null_sentinel() {
                return Ok(TypeDescriptor::zero_value(target));
            }
            if target.is_open() {
                return Ok(held);
            }
            let (concrete, _) = held.normalize()?;
            host_to_target(&concrete, &held, target)
        }

        ScriptValue::Table(table) => convert_table(engine, cx, table, target),
    }
}

fn mismatch(value: &ScriptValue, target: &Arc<TypeDescriptor>) -> ConvertError {
    ConvertError::conversion(value.type_name(), target.display_name())
}

/// Exact numeric narrowing. `None` means the number cannot become the
/// target exactly.
fn number_to_host(n: f64, target: &Arc<TypeDescriptor>) -> Option<HostValue> {
    match target.category {
        Category::Signed => {
            if n.fract() != 0.0 {
                return None;
            }
            let (lo, hi) = target.width.unwrap_or(crate::descriptor::NumWidth::W64).signed_range();
            if n < lo as f64 || n > hi as f64 {
                return None;
            }
            Some(HostValue::Int(n as i64))
        }
        Category::Unsigned => {
            if n.fract() != 0.0 || n < 0.0 {
                return None;
            }
            let hi = target.width.unwrap_or(crate::descriptor::NumWidth::W64).unsigned_max();
            if n > hi as f64 {
                return None;
            }
            Some(HostValue::Uint(n as u64))
        }
        Category::Float => Some(HostValue::Float(n)),
        Category::Complex => Some(HostValue::Complex(Complex64::from_real(n))),
        _ if target.is_open() => Some(HostValue::Float(n)),
        _ => None,
    }
}

/// Convert a handle's host value to a (different) host target type.
/// Same category passes through and keeps sharing; numerics cross-kind
/// convert exactly; anything else is a mismatch.
fn host_to_target(
    concrete: &HostValue,
    held: &HostValue,
    target: &Arc<TypeDescriptor>,
) -> Result<HostValue, ConvertError> {
    let have = Category::of(concrete);
    if have == target.category {
        // Composite handles alias; scalars still honor declared width.
        return match concrete {
            HostValue::Int(i) => int_to_target(*i, target),
            HostValue::Uint(u) => uint_to_target(*u, target),
            _ => Ok(held.clone()),
        };
    }
    match concrete {
        HostValue::Int(i) => int_to_target(*i, target),
        HostValue::Uint(u) => uint_to_target(*u, target),
        HostValue::Float(x) => number_to_host(*x, target).ok_or_else(|| ConvertError::Narrowing {
            value: *x,
            target: target.display_name(),
        }),
        _ => Err(ConvertError::conversion(
            concrete.type_name(),
            target.display_name(),
        )),
    }
}

fn int_to_target(i: i64, target: &Arc<TypeDescriptor>) -> Result<HostValue, ConvertError> {
    let narrow = || ConvertError::Narrowing {
        value: i as f64,
        target: target.display_name(),
    };
    match target.category {
        Category::Signed => {
            let (lo, hi) = target.width.unwrap_or(crate::descriptor::NumWidth::W64).signed_range();
            if i < lo || i > hi {
                return Err(narrow());
            }
            Ok(HostValue::Int(i))
        }
        Category::Unsigned => {
            if i < 0 {
                return Err(narrow());
            }
            let hi = target.width.unwrap_or(crate::descriptor::NumWidth::W64).unsigned_max();
            if (i as u64) > hi {
                return Err(narrow());
            }
            Ok(HostValue::Uint(i as u64))
        }
        Category::Float => Ok(HostValue::Float(i as f64)),
        Category::Complex => Ok(HostValue::Complex(Complex64::from_real(i as f64))),
        _ => Err(ConvertError::conversion("integer", target.display_name())),
    }
}

fn uint_to_target(u: u64, target: &Arc<TypeDescriptor>) -> Result<HostValue, ConvertError> {
    let narrow = || ConvertError::Narrowing {
        value: u as f64,
        target: target.display_name(),
    };
    match target.category {
        Category::Unsigned => {
            let hi = target.width.unwrap_or(crate::descriptor::NumWidth::W64).unsigned_max();
            if u > hi {
                return Err(narrow());
            }
            Ok(HostValue::Uint(u))
        }
        Category::Signed => {
            let (_, hi) = target.width.unwrap_or(crate::descriptor::NumWidth::W64).signed_range();
            if u > hi as u64 {
                return Err(narrow());
            }
            Ok(HostValue::Int(u as i64))
        }
        Category::Float => Ok(HostValue::Float(u as f64)),
        Category::Complex => Ok(HostValue::Complex(Complex64::from_real(u as f64))),
        _ => Err(ConvertError::conversion(
            "unsigned integer",
            target.display_name(),
        )),
    }
}

fn convert_reference(
    engine: &mut Engine,
    cx: &mut ConversionContext,
    value: &ScriptValue,
    target: &Arc<TypeDescriptor>,
) -> Result<HostValue, ConvertError> {
    // A handle that already holds a reference aliases straight through.
    if let ScriptValue::Foreign(id) = value {
        let held = engine.handle(*id)?.value.clone();
        if matches!(held, HostValue::Ref(_)) {
            return Ok(held);
        }
    }
    let elem = target.elem.as_ref().cloned().unwrap_or_else(TypeDescriptor::any);
    let inner = from_foreign(engine, cx, value, &elem)?;
    Ok(HostValue::reference(inner))
}

fn convert_table(
    engine: &mut Engine,
    cx: &mut ConversionContext,
    table: &TableRef,
    target: &Arc<TypeDescriptor>,
) -> Result<HostValue, ConvertError> {
    let identity = table_identity(table);
    if let Some(seen) = cx.lookup_to_host(identity) {
        return Ok(seen);
    }
    trace!(target = %target.display_name(), "converting table");

    match target.category {
        Category::Sequence => {
            let elem = target.elem.as_ref().cloned().unwrap_or_else(TypeDescriptor::any);
            let n = table.borrow().seq_len();
            let out: HostValue = HostValue::seq(Vec::with_capacity(n));
            if n > 0 {
                cx.mark_to_host(identity, out.clone());
            }
            let HostValue::Seq(items) = &out else {
                unreachable!()
            };
            for i in 1..=n {
                let sv = table.borrow().get(&TableKey::number(i as f64));
                let converted = match from_foreign(engine, cx, &sv, &elem) {
                    Ok(v) => v,
                    Err(err) => {
                        cx.record_issue(err);
                        TypeDescriptor::zero_value(&elem)
                    }
                };
                items.borrow_mut().push(converted);
            }
            Ok(out)
        }

        Category::Mapping => {
            let key_ty = target.key.as_ref().cloned().unwrap_or_else(TypeDescriptor::any);
            let value_ty = target.value.as_ref().cloned().unwrap_or_else(TypeDescriptor::any);
            let out = HostValue::empty_map();
            let not_empty = !table.borrow().is_empty();
            if not_empty {
                cx.mark_to_host(identity, out.clone());
            }
            let HostValue::Map(entries) = &out else {
                unreachable!()
            };
            let pairs: Vec<(TableKey, ScriptValue)> = table
                .borrow()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            for (key, sv) in &pairs {
                let host_key = match from_foreign(engine, cx, &key.to_value(), &key_ty)
                    .map(|v| HostKey::from_host(&v))
                {
                    Ok(Some(k)) => k,
                    Ok(None) => {
                        cx.record_issue(ConvertError::conversion(
                            key.to_value().type_name(),
                            "mapping key",
                        ));
                        continue;
                    }
                    Err(err) => {
                        cx.record_issue(err);
                        continue;
                    }
                };
                let converted = match from_foreign(engine, cx, sv, &value_ty) {
                    Ok(v) => v,
                    Err(err) => {
                        cx.record_issue(err);
                        TypeDescriptor::zero_value(&value_ty)
                    }
                };
                entries.borrow_mut().insert(host_key, converted);
            }
            Ok(out)
        }

        Category::Record => {
            let record = Record::zeroed(target).into_ref();
            let out = HostValue::Record(record.clone());
            cx.mark_to_host(identity, out.clone());
            let pairs: Vec<(TableKey, ScriptValue)> = table
                .borrow()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            for (key, sv) in &pairs {
                // Non-string keys and keys naming no declared field are
                // silently ignored.
                let Some(name) = key.as_str() else { continue };
                let Some(index) = target.field_index(name) else {
                    continue;
                };
                let field_ty = target.fields[index].ty.clone();
                match from_foreign(engine, cx, sv, &field_ty) {
                    Ok(v) => {
                        record.borrow_mut().set(index, v);
                    }
                    Err(err) => cx.record_issue(err),
                }
            }
            Ok(out)
        }

        // Open target: infer. Keys exactly 1..n make a sequence;
        // anything else, the empty table included, makes a mapping.
        _ if target.is_open() => {
            let inferred = if table.borrow().is_sequence() {
                TypeDescriptor::seq(TypeDescriptor::any())
            } else {
                TypeDescriptor::map(TypeDescriptor::any(), TypeDescriptor::any())
            };
            convert_table(engine, cx, table, &inferred)
        }

        _ => Err(ConvertError::conversion("table", target.display_name())),
    }
}
