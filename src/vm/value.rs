//! Script-side dynamic values.
//!
//! This is the capability surface the conversion engine needs from the
//! embedded interpreter: nil, booleans, double-precision numbers,
//! immutable strings, shared tables, callables and foreign handles.

use std::fmt;
use std::rc::Rc;

use ordered_float::OrderedFloat;

use crate::engine::Engine;
use crate::error::ScriptError;
use crate::handles::HandleId;
use crate::vm::table::TableRef;

/// A script value.
#[derive(Clone)]
pub enum ScriptValue {
    Nil,
    Bool(bool),
    /// The single numeric kind of the scripting runtime.
    Number(f64),
    Str(Rc<str>),
    Table(TableRef),
    Function(ScriptFn),
    /// A handle onto engine-owned host data.
    Foreign(HandleId),
}

impl ScriptValue {
    pub fn str(s: impl AsRef<str>) -> ScriptValue {
        ScriptValue::Str(s.as_ref().into())
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, ScriptValue::Nil)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            ScriptValue::Nil => "nil",
            ScriptValue::Bool(_) => "boolean",
            ScriptValue::Number(_) => "number",
            ScriptValue::Str(_) => "string",
            ScriptValue::Table(_) => "table",
            ScriptValue::Function(_) => "function",
            ScriptValue::Foreign(_) => "userdata",
        }
    }

    /// Raw equality: value equality for scalars, identity for tables,
    /// functions and handles. No operator dispatch happens here.
    pub fn same_value(&self, other: &ScriptValue) -> bool {
        match (self, other) {
            (ScriptValue::Nil, ScriptValue::Nil) => true,
            (ScriptValue::Bool(a), ScriptValue::Bool(b)) => a == b,
            (ScriptValue::Number(a), ScriptValue::Number(b)) => a == b,
            (ScriptValue::Str(a), ScriptValue::Str(b)) => a == b,
            (ScriptValue::Table(a), ScriptValue::Table(b)) => Rc::ptr_eq(a, b),
            (ScriptValue::Function(a), ScriptValue::Function(b)) => a.ptr_eq(b),
            (ScriptValue::Foreign(a), ScriptValue::Foreign(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for ScriptValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptValue::Nil => write!(f, "nil"),
            ScriptValue::Bool(b) => write!(f, "{b}"),
            ScriptValue::Number(n) => write!(f, "{n}"),
            ScriptValue::Str(s) => write!(f, "{s:?}"),
            ScriptValue::Table(t) => write!(f, "table@{:p}", Rc::as_ptr(t)),
            ScriptValue::Function(func) => write!(f, "{func:?}"),
            ScriptValue::Foreign(id) => write!(f, "userdata({id:?})"),
        }
    }
}

/// A script-invocable function value.
///
/// Both script-defined closures and adapter-wrapped host callables take
/// this shape: invoked with an engine and arguments, returning multiple
/// values or raising a [`ScriptError`].
#[derive(Clone)]
pub struct ScriptFn {
    inner: Rc<dyn Fn(&mut Engine, &[ScriptValue]) -> Result<Vec<ScriptValue>, ScriptError>>,
}

impl ScriptFn {
    pub fn new<F>(f: F) -> ScriptFn
    where
        F: Fn(&mut Engine, &[ScriptValue]) -> Result<Vec<ScriptValue>, ScriptError> + 'static,
    {
        ScriptFn { inner: Rc::new(f) }
    }

    pub fn call(
        &self,
        engine: &mut Engine,
        args: &[ScriptValue],
    ) -> Result<Vec<ScriptValue>, ScriptError> {
        (self.inner)(engine, args)
    }

    pub fn ptr_eq(&self, other: &ScriptFn) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for ScriptFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "function@{:p}", Rc::as_ptr(&self.inner))
    }
}

/// A hashable table key. Tables reject nil and non-scalar keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TableKey {
    Bool(bool),
    Number(OrderedFloat<f64>),
    Str(Rc<str>),
}

impl TableKey {
    pub fn number(n: f64) -> TableKey {
        TableKey::Number(OrderedFloat(n))
    }

    pub fn str(s: impl AsRef<str>) -> TableKey {
        TableKey::Str(s.as_ref().into())
    }

    pub fn from_value(value: &ScriptValue) -> Option<TableKey> {
        match value {
            ScriptValue::Bool(b) => Some(TableKey::Bool(*b)),
            ScriptValue::Number(n) => Some(TableKey::number(*n)),
            ScriptValue::Str(s) => Some(TableKey::Str(s.clone())),
            _ => None,
        }
    }

    pub fn to_value(&self) -> ScriptValue {
        match self {
            TableKey::Bool(b) => ScriptValue::Bool(*b),
            TableKey::Number(n) => ScriptValue::Number(n.0),
            TableKey::Str(s) => ScriptValue::Str(s.clone()),
        }
    }

    /// The key as a positive 1-based sequence index, when it is an
    /// integral number.
    pub fn as_index(&self) -> Option<i64> {
        match self {
            TableKey::Number(n) if n.0.fract() == 0.0 && n.0 >= 1.0 && n.0 <= i64::MAX as f64 => {
                Some(n.0 as i64)
            }
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            TableKey::Str(s) => Some(s),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_equality_and_identity() {
        assert!(ScriptValue::Number(1.0).same_value(&ScriptValue::Number(1.0)));
        assert!(ScriptValue::str("a").same_value(&ScriptValue::str("a")));
        assert!(!ScriptValue::Number(1.0).same_value(&ScriptValue::str("1")));
    }

    #[test]
    fn integral_keys_index_sequences() {
        assert_eq!(TableKey::number(3.0).as_index(), Some(3));
        assert_eq!(TableKey::number(3.5).as_index(), None);
        assert_eq!(TableKey::number(0.0).as_index(), None);
        assert_eq!(TableKey::str("x").as_index(), None);
    }
}
