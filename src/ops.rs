//! Operator emulation for foreign scalar handles.
//!
//! Named host subtypes of numbers and strings wrap as handles so they
//! keep their methods, which means script operators on them arrive
//! here instead of at native arithmetic. Operands promote to a common
//! numeric kind, the operation runs host-side, and the result re-wraps
//! as a handle of the named type when exactly one named type is in
//! play, or falls back to a native script value otherwise.

use std::sync::Arc;

use crate::descriptor::{Category, TypeDescriptor};
use crate::engine::Engine;
use crate::error::{ConvertError, ScriptError};
use crate::host::complex::Complex64;
use crate::host::value::HostValue;
use crate::vm::value::ScriptValue;

/// Arithmetic operators dispatched onto handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
}

impl ArithOp {
    pub fn symbol(self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
            ArithOp::Rem => "%",
            ArithOp::Pow => "^",
        }
    }
}

/// The promoted kind both operands are brought to before computing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NumKind {
    Signed,
    Unsigned,
    Float,
    Complex,
}

/// A scalar operand extracted from a script value, with the named host
/// type it carried, if any.
struct Operand {
    value: HostValue,
    named: Option<Arc<TypeDescriptor>>,
}

fn operand(engine: &Engine, op: &'static str, sv: &ScriptValue) -> Result<Operand, ConvertError> {
    let bad = |type_name: &str| ConvertError::TypeMismatch {
        op,
        lhs: type_name.to_string(),
        rhs: String::new(),
    };
    match sv {
        ScriptValue::Number(n) => Ok(Operand {
            value: HostValue::Float(*n),
            named: None,
        }),
        ScriptValue::Str(s) => Ok(Operand {
            value: HostValue::Str(s.to_string()),
            named: None,
        }),
        ScriptValue::Foreign(id) => {
            let entry = engine.handle(*id)?;
            let descriptor = entry.descriptor.clone();
            let (concrete, _) = entry.value.normalize()?;
            match concrete {
                HostValue::Int(_)
                | HostValue::Uint(_)
                | HostValue::Float(_)
                | HostValue::Complex(_)
                | HostValue::Str(_) => Ok(Operand {
                    value: concrete,
                    named: descriptor.is_named().then_some(descriptor),
                }),
                other => Err(bad(other.type_name())),
            }
        }
        other => Err(bad(other.type_name())),
    }
}

fn kind_of(value: &HostValue) -> NumKind {
    match value {
        HostValue::Int(_) => NumKind::Signed,
        HostValue::Uint(_) => NumKind::Unsigned,
        HostValue::Complex(_) => NumKind::Complex,
        _ => NumKind::Float,
    }
}

/// The common kind two operands promote to: equal kinds stay put, any
/// complex operand promotes both, anything else meets at float.
fn common_kind(a: NumKind, b: NumKind) -> NumKind {
    if a == b {
        a
    } else if a == NumKind::Complex || b == NumKind::Complex {
        NumKind::Complex
    } else {
        NumKind::Float
    }
}

fn as_f64(value: &HostValue, op: &'static str, other: &HostValue) -> Result<f64, ConvertError> {
    match value {
        HostValue::Int(i) => Ok(*i as f64),
        HostValue::Uint(u) => Ok(*u as f64),
        HostValue::Float(x) => Ok(*x),
        // Strings participate in arithmetic when they parse as numbers.
        HostValue::Str(s) => s.trim().parse::<f64>().map_err(|_| mismatch(op, value, other)),
        _ => Err(mismatch(op, value, other)),
    }
}

fn as_complex(value: &HostValue, op: &'static str, other: &HostValue) -> Result<Complex64, ConvertError> {
    match value {
        HostValue::Complex(c) => Ok(*c),
        _ => as_f64(value, op, other).map(Complex64::from_real),
    }
}

fn mismatch(op: &'static str, lhs: &HostValue, rhs: &HostValue) -> ConvertError {
    ConvertError::TypeMismatch {
        op,
        lhs: lhs.type_name().to_string(),
        rhs: rhs.type_name().to_string(),
    }
}

// ============================================================================
// Arithmetic
// ============================================================================

pub fn arith(
    engine: &mut Engine,
    op: ArithOp,
    lhs: &ScriptValue,
    rhs: &ScriptValue,
) -> Result<ScriptValue, ScriptError> {
    let a = operand(engine, op.symbol(), lhs)?;
    let b = operand(engine, op.symbol(), rhs)?;

    // Exponentiation always computes in floating point.
    let kind = if op == ArithOp::Pow {
        common_kind(
            common_kind(kind_of(&a.value), kind_of(&b.value)),
            NumKind::Float,
        )
    } else {
        common_kind(kind_of(&a.value), kind_of(&b.value))
    };

    let result = match kind {
        NumKind::Signed => {
            let (HostValue::Int(x), HostValue::Int(y)) = (&a.value, &b.value) else {
                return Err(mismatch(op.symbol(), &a.value, &b.value).into());
            };
            int_arith(op, *x, *y)?
        }
        NumKind::Unsigned => {
            let (HostValue::Uint(x), HostValue::Uint(y)) = (&a.value, &b.value) else {
                return Err(mismatch(op.symbol(), &a.value, &b.value).into());
            };
            uint_arith(op, *x, *y)?
        }
        NumKind::Float => {
            let x = as_f64(&a.value, op.symbol(), &b.value)?;
            let y = as_f64(&b.value, op.symbol(), &a.value)?;
            HostValue::Float(float_arith(op, x, y))
        }
        NumKind::Complex => {
            let x = as_complex(&a.value, op.symbol(), &b.value)?;
            let y = as_complex(&b.value, op.symbol(), &a.value)?;
            HostValue::Complex(complex_arith(op, x, y)?)
        }
    };

    Ok(rewrap(engine, result, a.named.as_ref(), b.named.as_ref()))
}

fn int_arith(op: ArithOp, x: i64, y: i64) -> Result<HostValue, ScriptError> {
    Ok(match op {
        ArithOp::Add => HostValue::Int(x.wrapping_add(y)),
        ArithOp::Sub => HostValue::Int(x.wrapping_sub(y)),
        ArithOp::Mul => HostValue::Int(x.wrapping_mul(y)),
        ArithOp::Div => {
            if y == 0 {
                return Err(ScriptError::runtime("integer divide by zero"));
            }
            HostValue::Int(x.wrapping_div(y))
        }
        ArithOp::Rem => {
            if y == 0 {
                return Err(ScriptError::runtime("integer divide by zero"));
            }
            HostValue::Int(x.wrapping_rem(y))
        }
        ArithOp::Pow => HostValue::Float((x as f64).powf(y as f64)),
    })
}

fn uint_arith(op: ArithOp, x: u64, y: u64) -> Result<HostValue, ScriptError> {
    Ok(match op {
        ArithOp::Add => HostValue::Uint(x.wrapping_add(y)),
        ArithOp::Sub => HostValue::Uint(x.wrapping_sub(y)),
        ArithOp::Mul => HostValue::Uint(x.wrapping_mul(y)),
        ArithOp::Div => {
            if y == 0 {
                return Err(ScriptError::runtime("integer divide by zero"));
            }
            HostValue::Uint(x / y)
        }
        ArithOp::Rem => {
            if y == 0 {
                return Err(ScriptError::runtime("integer divide by zero"));
            }
            HostValue::Uint(x % y)
        }
        ArithOp::Pow => HostValue::Float((x as f64).powf(y as f64)),
    })
}

fn float_arith(op: ArithOp, x: f64, y: f64) -> f64 {
    match op {
        ArithOp::Add => x + y,
        ArithOp::Sub => x - y,
        ArithOp::Mul => x * y,
        ArithOp::Div => x / y,
        ArithOp::Rem => x % y,
        ArithOp::Pow => x.powf(y),
    }
}

fn complex_arith(op: ArithOp, x: Complex64, y: Complex64) -> Result<Complex64, ScriptError> {
    Ok(match op {
        ArithOp::Add => x + y,
        ArithOp::Sub => x - y,
        ArithOp::Mul => x * y,
        ArithOp::Div => x / y,
        ArithOp::Pow => x.powc(y),
        ArithOp::Rem => {
            return Err(ConvertError::TypeMismatch {
                op: "%",
                lhs: "complex".into(),
                rhs: "complex".into(),
            }
            .into());
        }
    })
}

/// Decide the result's form from the operands' named types.
///
/// One named type in play (one side named, or both the same) keeps it:
/// the result wraps as a handle of that type, cast to its kind. Two
/// different named types cancel out to a native script value. Complex
/// results always wrap; there is no native complex.
fn rewrap(
    engine: &mut Engine,
    result: HostValue,
    a: Option<&Arc<TypeDescriptor>>,
    b: Option<&Arc<TypeDescriptor>>,
) -> ScriptValue {
    let named = match (a, b) {
        (Some(a), Some(b)) if a.name == b.name => Some(a.clone()),
        (Some(_), Some(_)) => None,
        (Some(a), None) => Some(a.clone()),
        (None, Some(b)) => Some(b.clone()),
        (None, None) => None,
    };

    if let Some(named) = named {
        let cast = cast_to_kind(&result, named.category);
        return engine.make_foreign(cast, named);
    }
    match result {
        HostValue::Complex(_) => {
            let descriptor = crate::descriptor::descriptor_for(&result);
            engine.make_foreign(result, descriptor)
        }
        HostValue::Int(i) => ScriptValue::Number(i as f64),
        HostValue::Uint(u) => ScriptValue::Number(u as f64),
        HostValue::Float(x) => ScriptValue::Number(x),
        HostValue::Str(s) => ScriptValue::str(s),
        other => {
            let descriptor = crate::descriptor::descriptor_for(&other);
            engine.make_foreign(other, descriptor)
        }
    }
}

/// Cast a computed result into a named type's kind, truncating the way
/// host numeric conversions truncate.
fn cast_to_kind(value: &HostValue, category: Category) -> HostValue {
    match (value, category) {
        (HostValue::Float(x), Category::Signed) => HostValue::Int(*x as i64),
        (HostValue::Float(x), Category::Unsigned) => HostValue::Uint(*x as u64),
        (HostValue::Int(i), Category::Unsigned) => HostValue::Uint(*i as u64),
        (HostValue::Int(i), Category::Float) => HostValue::Float(*i as f64),
        (HostValue::Uint(u), Category::Signed) => HostValue::Int(*u as i64),
        (HostValue::Uint(u), Category::Float) => HostValue::Float(*u as f64),
        (HostValue::Int(i), Category::Complex) => HostValue::Complex(Complex64::from_real(*i as f64)),
        (HostValue::Uint(u), Category::Complex) => HostValue::Complex(Complex64::from_real(*u as f64)),
        (HostValue::Float(x), Category::Complex) => HostValue::Complex(Complex64::from_real(*x)),
        _ => value.clone(),
    }
}

// ============================================================================
// Comparison, concatenation, negation
// ============================================================================

/// Ordered comparison in the operands' common kind. Integer kinds
/// compare in their own domain, since f64 cannot hold every 64-bit
/// integer exactly; strings compare lexicographically; complex numbers
/// have no order.
pub fn lt(engine: &Engine, lhs: &ScriptValue, rhs: &ScriptValue) -> Result<bool, ScriptError> {
    let a = operand(engine, "<", lhs)?;
    let b = operand(engine, "<", rhs)?;
    match (&a.value, &b.value) {
        (HostValue::Str(x), HostValue::Str(y)) => Ok(x < y),
        (HostValue::Complex(_), _) | (_, HostValue::Complex(_)) => {
            Err(mismatch("<", &a.value, &b.value).into())
        }
        (HostValue::Str(_), _) | (_, HostValue::Str(_)) => {
            Err(mismatch("<", &a.value, &b.value).into())
        }
        (HostValue::Int(x), HostValue::Int(y)) => Ok(x < y),
        (HostValue::Uint(x), HostValue::Uint(y)) => Ok(x < y),
        (x, y) => Ok(as_f64(x, "<", y)? < as_f64(y, "<", x)?),
    }
}

/// Script equality across handles and natives. Never raises; values of
/// incomparable kinds are just unequal.
pub fn eq(engine: &Engine, lhs: &ScriptValue, rhs: &ScriptValue) -> bool {
    match (lhs, rhs) {
        (ScriptValue::Foreign(a), ScriptValue::Foreign(b)) => {
            match (engine.handle(*a), engine.handle(*b)) {
                (Ok(ea), Ok(eb)) => ea.value.host_eq(&eb.value),
                _ => false,
            }
        }
        _ => lhs.same_value(rhs),
    }
}

/// String concatenation, with named text subtypes kept on the result.
pub fn concat(
    engine: &mut Engine,
    lhs: &ScriptValue,
    rhs: &ScriptValue,
) -> Result<ScriptValue, ScriptError> {
    let a = operand(engine, "..", lhs)?;
    let b = operand(engine, "..", rhs)?;
    let text = scalar_text(&a.value) + &scalar_text(&b.value);
    let named = match (&a.named, &b.named) {
        (Some(x), _) if x.category == Category::Text => Some(x.clone()),
        (_, Some(y)) if y.category == Category::Text => Some(y.clone()),
        _ => None,
    };
    match named {
        Some(named) => Ok(engine.make_foreign(HostValue::Str(text), named)),
        None => Ok(ScriptValue::str(text)),
    }
}

fn scalar_text(value: &HostValue) -> String {
    value.to_string()
}

/// Unary negation, kind-preserving.
pub fn neg(engine: &mut Engine, operand_sv: &ScriptValue) -> Result<ScriptValue, ScriptError> {
    let a = operand(engine, "-", operand_sv)?;
    let result = match &a.value {
        HostValue::Int(i) => HostValue::Int(i.wrapping_neg()),
        HostValue::Uint(u) => HostValue::Uint(u.wrapping_neg()),
        HostValue::Float(x) => HostValue::Float(-x),
        HostValue::Complex(c) => HostValue::Complex(-*c),
        other => {
            let x = as_f64(other, "-", other)?;
            HostValue::Float(-x)
        }
    };
    Ok(rewrap(engine, result, a.named.as_ref(), None))
}
