//! The dynamic host-side value model.
//!
//! [`HostValue`] stands in for the reflection layer of the original
//! host runtime: a single enum covering every category the conversion
//! engine can classify. Composites are shared behind `Rc<RefCell<..>>`
//! so that foreign handles alias live host memory, and an explicit
//! [`HostValue::Ref`] variant models one reference/pointer level.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use ordered_float::OrderedFloat;
use rustc_hash::FxHashMap;

use crate::error::ConvertError;
use crate::host::channel::ChannelRef;
use crate::host::complex::Complex64;
use crate::host::func::HostFn;
use crate::host::record::RecordRef;
use crate::vm::value::ScriptValue;

/// Shared sequence storage.
pub type SeqRef = Rc<RefCell<Vec<HostValue>>>;
/// Shared mapping storage.
pub type MapRef = Rc<RefCell<FxHashMap<HostKey, HostValue>>>;
/// One explicit reference level.
pub type HostRef = Rc<RefCell<HostValue>>;
/// Opaque host data exposed to script by reference only.
pub type OpaqueRef = Rc<dyn Any>;

/// Maximum reference-chain depth the normalization pass will follow.
pub const REF_DEPTH_LIMIT: usize = 64;

/// The sentinel standing in for an absent host value inside copied
/// composites.
///
/// The scripting language's own "nothing" cannot always occupy a
/// container position without losing positional information, so absent
/// elements copy as a handle of this sentinel instead; converting it
/// back yields the target's zero value.
#[derive(Debug)]
pub struct NullSentinel;

/// A host value, dynamically typed.
#[derive(Clone)]
pub enum HostValue {
    /// Absent: a nil pointer, empty interface, or missing entry.
    Nil,
    Bool(bool),
    Int(i64),
    Uint(u64),
    Float(f64),
    Complex(Complex64),
    Str(String),
    Seq(SeqRef),
    Map(MapRef),
    Record(RecordRef),
    Chan(ChannelRef),
    Func(HostFn),
    /// A two-way handle onto a script value held by the host side.
    Script(Box<ScriptValue>),
    Opaque(OpaqueRef),
    /// One explicit reference/pointer level.
    Ref(HostRef),
}

impl HostValue {
    pub fn str(s: impl Into<String>) -> HostValue {
        HostValue::Str(s.into())
    }

    pub fn seq(items: Vec<HostValue>) -> HostValue {
        HostValue::Seq(Rc::new(RefCell::new(items)))
    }

    pub fn empty_seq() -> HostValue {
        HostValue::seq(Vec::new())
    }

    pub fn map(entries: Vec<(HostKey, HostValue)>) -> HostValue {
        HostValue::Map(Rc::new(RefCell::new(entries.into_iter().collect())))
    }

    pub fn empty_map() -> HostValue {
        HostValue::Map(Rc::new(RefCell::new(FxHashMap::default())))
    }

    /// Wrap a value behind a fresh reference level.
    pub fn reference(value: HostValue) -> HostValue {
        HostValue::Ref(Rc::new(RefCell::new(value)))
    }

    pub fn opaque<T: Any>(value: T) -> HostValue {
        HostValue::Opaque(Rc::new(value))
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, HostValue::Nil)
    }

    /// Whether this is the absent-value sentinel.
    pub fn is_null_sentinel(&self) -> bool {
        match self {
            HostValue::Opaque(o) => o.downcast_ref::<NullSentinel>().is_some(),
            _ => false,
        }
    }

    /// Memory identity of a shared composite, for cycle tracking and
    /// handle equality. Scalars have no identity.
    pub fn identity(&self) -> Option<usize> {
        match self {
            HostValue::Seq(s) => Some(Rc::as_ptr(s) as usize),
            HostValue::Map(m) => Some(Rc::as_ptr(m) as usize),
            HostValue::Record(r) => Some(Rc::as_ptr(r) as usize),
            HostValue::Ref(r) => Some(Rc::as_ptr(r) as usize),
            HostValue::Chan(c) => Some(c.identity()),
            HostValue::Opaque(o) => Some(Rc::as_ptr(o) as *const () as usize),
            _ => None,
        }
    }

    /// Follow reference levels down to a concrete value.
    ///
    /// Returns the concrete value and whether any reference level was
    /// crossed on the way. An absent value at any level normalizes to
    /// `Nil`. The chain depth is guarded; host code can tie reference
    /// knots and the engine must not recurse forever on them.
    pub fn normalize(&self) -> Result<(HostValue, bool), ConvertError> {
        let mut current = self.clone();
        let mut was_ref = false;
        let mut depth = 0usize;
        while let HostValue::Ref(inner) = current {
            was_ref = true;
            depth += 1;
            if depth > REF_DEPTH_LIMIT {
                return Err(ConvertError::ReferenceDepth {
                    limit: REF_DEPTH_LIMIT,
                });
            }
            current = inner.borrow().clone();
        }
        Ok((current, was_ref))
    }

    /// Host-side equality: identity for shared composites, value
    /// equality for scalars and records. Mismatched host types compare
    /// unequal rather than failing.
    pub fn host_eq(&self, other: &HostValue) -> bool {
        match (self, other) {
            (HostValue::Nil, HostValue::Nil) => true,
            (HostValue::Bool(a), HostValue::Bool(b)) => a == b,
            (HostValue::Int(a), HostValue::Int(b)) => a == b,
            (HostValue::Uint(a), HostValue::Uint(b)) => a == b,
            (HostValue::Float(a), HostValue::Float(b)) => a == b,
            (HostValue::Complex(a), HostValue::Complex(b)) => a == b,
            (HostValue::Str(a), HostValue::Str(b)) => a == b,
            (HostValue::Seq(a), HostValue::Seq(b)) => Rc::ptr_eq(a, b),
            (HostValue::Map(a), HostValue::Map(b)) => Rc::ptr_eq(a, b),
            (HostValue::Record(a), HostValue::Record(b)) => {
                if Rc::ptr_eq(a, b) {
                    return true;
                }
                let (a, b) = (a.borrow(), b.borrow());
                a.same_type(&b) && a.fields_eq(&b)
            }
            (HostValue::Chan(a), HostValue::Chan(b)) => a.identity() == b.identity(),
            (HostValue::Func(a), HostValue::Func(b)) => a.ptr_eq(b),
            (HostValue::Opaque(a), HostValue::Opaque(b)) => Rc::ptr_eq(a, b),
            (HostValue::Ref(a), HostValue::Ref(b)) => {
                Rc::ptr_eq(a, b) || a.borrow().host_eq(&b.borrow())
            }
            (HostValue::Script(a), HostValue::Script(b)) => a.same_value(b),
            _ => false,
        }
    }

    /// Name used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            HostValue::Nil => "nil",
            HostValue::Bool(_) => "bool",
            HostValue::Int(_) => "integer",
            HostValue::Uint(_) => "unsigned integer",
            HostValue::Float(_) => "float",
            HostValue::Complex(_) => "complex",
            HostValue::Str(_) => "string",
            HostValue::Seq(_) => "sequence",
            HostValue::Map(_) => "mapping",
            HostValue::Record(_) => "record",
            HostValue::Chan(_) => "channel",
            HostValue::Func(_) => "function",
            HostValue::Script(_) => "script object",
            HostValue::Opaque(_) => "opaque reference",
            HostValue::Ref(_) => "reference",
        }
    }
}

impl fmt::Display for HostValue {
    /// The default text rendering, used for the uniform text-conversion
    /// operation on foreign handles.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostValue::Nil => write!(f, "nil"),
            HostValue::Bool(v) => write!(f, "{v}"),
            HostValue::Int(v) => write!(f, "{v}"),
            HostValue::Uint(v) => write!(f, "{v}"),
            HostValue::Float(v) => write!(f, "{v}"),
            HostValue::Complex(v) => write!(f, "{v}"),
            HostValue::Str(v) => write!(f, "{v}"),
            HostValue::Seq(s) => {
                write!(f, "[")?;
                for (i, item) in s.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            HostValue::Map(m) => {
                write!(f, "map[")?;
                for (i, (k, v)) in m.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{k}:{v}")?;
                }
                write!(f, "]")
            }
            HostValue::Record(r) => write!(f, "{}", r.borrow()),
            HostValue::Chan(_) => write!(f, "channel"),
            HostValue::Func(_) => write!(f, "function"),
            HostValue::Script(_) => write!(f, "script object"),
            HostValue::Opaque(o) => {
                if o.downcast_ref::<NullSentinel>().is_some() {
                    write!(f, "null")
                } else {
                    write!(f, "opaque")
                }
            }
            HostValue::Ref(r) => write!(f, "&{}", r.borrow()),
        }
    }
}

impl fmt::Debug for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostValue({self})")
    }
}

/// A hashable mapping key.
///
/// Floats are wrapped in [`OrderedFloat`] so that numeric keys hash
/// consistently; this mirrors how the script side keys its tables.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HostKey {
    Bool(bool),
    Int(i64),
    Uint(u64),
    Float(OrderedFloat<f64>),
    Str(String),
}

impl HostKey {
    /// Downgrade a host value to a key, when the value is hashable.
    pub fn from_host(value: &HostValue) -> Option<HostKey> {
        match value {
            HostValue::Bool(b) => Some(HostKey::Bool(*b)),
            HostValue::Int(i) => Some(HostKey::Int(*i)),
            HostValue::Uint(u) => Some(HostKey::Uint(*u)),
            HostValue::Float(x) => Some(HostKey::Float(OrderedFloat(*x))),
            HostValue::Str(s) => Some(HostKey::Str(s.clone())),
            _ => None,
        }
    }

    pub fn to_host(&self) -> HostValue {
        match self {
            HostKey::Bool(b) => HostValue::Bool(*b),
            HostKey::Int(i) => HostValue::Int(*i),
            HostKey::Uint(u) => HostValue::Uint(*u),
            HostKey::Float(x) => HostValue::Float(x.0),
            HostKey::Str(s) => HostValue::Str(s.clone()),
        }
    }

    /// String view, for the method-lookup fallback on mapping reads.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            HostKey::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for HostKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostKey::Bool(b) => write!(f, "{b}"),
            HostKey::Int(i) => write!(f, "{i}"),
            HostKey::Uint(u) => write!(f, "{u}"),
            HostKey::Float(x) => write!(f, "{}", x.0),
            HostKey::Str(s) => write!(f, "{s}"),
        }
    }
}
