//! Static descriptions of host types.
//!
//! A [`TypeDescriptor`] is derived once per distinct host type and
//! shared behind an [`Arc`]. It records the conversion [`Category`],
//! element/key/field metadata for composites, and parameter and return
//! metadata for callables. Descriptors are plain data and cross threads
//! freely; method implementations live in the engine's registry.
//!
//! Descriptor identity is a deterministic 64-bit hash of the qualified
//! name ([`TypeHash`]), so a descriptor can be looked up before or
//! after registration without order dependencies.

use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;
use lazy_static::lazy_static;
use rustc_hash::FxHashMap;
use xxhash_rust::xxh64::xxh64;

use crate::host::value::HostValue;

/// Conversion category a host type is classified into.
///
/// The set is closed: anything unrecognized classifies as
/// [`Category::Opaque`], which is always legal to wrap as a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Bool,
    /// Signed integer of any width.
    Signed,
    /// Unsigned integer of any width.
    Unsigned,
    Float,
    /// Complex number; the scripting runtime has no native equivalent.
    Complex,
    Text,
    Sequence,
    Mapping,
    Record,
    Channel,
    Callable,
    /// Opaque host reference: method lookup only.
    Opaque,
}

impl Category {
    /// Classify a host value. Deterministic and total; never fails.
    pub fn of(value: &HostValue) -> Category {
        match value {
            HostValue::Bool(_) => Category::Bool,
            HostValue::Int(_) => Category::Signed,
            HostValue::Uint(_) => Category::Unsigned,
            HostValue::Float(_) => Category::Float,
            HostValue::Complex(_) => Category::Complex,
            HostValue::Str(_) => Category::Text,
            HostValue::Seq(_) => Category::Sequence,
            HostValue::Map(_) => Category::Mapping,
            HostValue::Record(_) => Category::Record,
            HostValue::Chan(_) => Category::Channel,
            HostValue::Func(_) => Category::Callable,
            HostValue::Ref(_) | HostValue::Nil | HostValue::Script(_) | HostValue::Opaque(_) => {
                Category::Opaque
            }
        }
    }

    /// True for the scalar categories that native script literals exist for.
    pub fn is_scalar(self) -> bool {
        matches!(
            self,
            Category::Bool
                | Category::Signed
                | Category::Unsigned
                | Category::Float
                | Category::Complex
                | Category::Text
        )
    }

    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            Category::Signed | Category::Unsigned | Category::Float | Category::Complex
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            Category::Bool => "bool",
            Category::Signed => "integer",
            Category::Unsigned => "unsigned integer",
            Category::Float => "float",
            Category::Complex => "complex",
            Category::Text => "string",
            Category::Sequence => "sequence",
            Category::Mapping => "mapping",
            Category::Record => "record",
            Category::Channel => "channel",
            Category::Callable => "function",
            Category::Opaque => "opaque reference",
        }
    }
}

/// Classify a host value into its conversion category.
///
/// Free-function form of [`Category::of`]; pure, no failure mode.
pub fn classify(value: &HostValue) -> Category {
    Category::of(value)
}

bitflags! {
    /// Structural traits carried by a descriptor alongside its category.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TypeTraits: u8 {
        /// A named subtype of a primitive (not the bare primitive), so
        /// method calls and operator overloading stay available on it.
        const NAMED = 1 << 0;
        /// One explicit reference/pointer level; `elem` is the target.
        const REFERENCE = 1 << 1;
        /// Open target: the script value drives the conversion.
        const OPEN = 1 << 2;
        /// Callable with a variadic tail.
        const VARIADIC = 1 << 3;
    }
}

/// Declared width of a numeric type, for exact narrowing checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumWidth {
    W8,
    W16,
    W32,
    W64,
}

impl NumWidth {
    /// Inclusive signed range for this width.
    pub fn signed_range(self) -> (i64, i64) {
        match self {
            NumWidth::W8 => (i8::MIN as i64, i8::MAX as i64),
            NumWidth::W16 => (i16::MIN as i64, i16::MAX as i64),
            NumWidth::W32 => (i32::MIN as i64, i32::MAX as i64),
            NumWidth::W64 => (i64::MIN, i64::MAX),
        }
    }

    /// Inclusive unsigned maximum for this width.
    pub fn unsigned_max(self) -> u64 {
        match self {
            NumWidth::W8 => u8::MAX as u64,
            NumWidth::W16 => u16::MAX as u64,
            NumWidth::W32 => u32::MAX as u64,
            NumWidth::W64 => u64::MAX,
        }
    }
}

/// One declared record field, with an optional script-facing rename.
///
/// The rename takes priority over the declared name in both conversion
/// directions.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: Arc<str>,
    pub rename: Option<Arc<str>>,
    pub ty: Arc<TypeDescriptor>,
}

impl FieldSpec {
    pub fn new(name: &str, ty: Arc<TypeDescriptor>) -> Self {
        FieldSpec {
            name: name.into(),
            rename: None,
            ty,
        }
    }

    pub fn renamed(name: &str, rename: &str, ty: Arc<TypeDescriptor>) -> Self {
        FieldSpec {
            name: name.into(),
            rename: Some(rename.into()),
            ty,
        }
    }

    /// The name script code addresses this field by.
    pub fn script_name(&self) -> &str {
        self.rename.as_deref().unwrap_or(&self.name)
    }

    /// Whether a script-side key addresses this field.
    pub fn matches(&self, key: &str) -> bool {
        self.script_name() == key
    }
}

/// Static description of a host type.
///
/// Built once per distinct type and immutable thereafter. All composite
/// descriptors share their component descriptors by [`Arc`].
#[derive(Debug, Clone)]
pub struct TypeDescriptor {
    /// Name of a named subtype or record type; `None` for bare primitives.
    pub name: Option<Arc<str>>,
    pub category: Category,
    pub traits: TypeTraits,
    /// Declared numeric width; `None` means the natural 64-bit width.
    pub width: Option<NumWidth>,
    /// Element type: sequence element, channel element, reference target.
    pub elem: Option<Arc<TypeDescriptor>>,
    /// Mapping key type.
    pub key: Option<Arc<TypeDescriptor>>,
    /// Mapping value type.
    pub value: Option<Arc<TypeDescriptor>>,
    /// Declared record fields, in storage order.
    pub fields: Vec<FieldSpec>,
    /// Fixed callable parameters, in order.
    pub params: Vec<Arc<TypeDescriptor>>,
    /// Variadic tail element type, if any.
    pub variadic: Option<Arc<TypeDescriptor>>,
    /// Callable return types, in order.
    pub returns: Vec<Arc<TypeDescriptor>>,
}

impl TypeDescriptor {
    fn bare(category: Category) -> TypeDescriptor {
        TypeDescriptor {
            name: None,
            category,
            traits: TypeTraits::empty(),
            width: None,
            elem: None,
            key: None,
            value: None,
            fields: Vec::new(),
            params: Vec::new(),
            variadic: None,
            returns: Vec::new(),
        }
    }

    /// The canonical descriptor for a bare primitive category.
    pub fn primitive(category: Category) -> Arc<TypeDescriptor> {
        match category {
            Category::Bool => BOOL.clone(),
            Category::Signed => SIGNED.clone(),
            Category::Unsigned => UNSIGNED.clone(),
            Category::Float => FLOAT.clone(),
            Category::Complex => COMPLEX.clone(),
            Category::Text => TEXT.clone(),
            _ => ANY.clone(),
        }
    }

    /// The open target: conversion driven by the script value's kind.
    pub fn any() -> Arc<TypeDescriptor> {
        ANY.clone()
    }

    /// A named subtype of a primitive category, e.g. a host `Celsius`
    /// over floats.
    pub fn named_scalar(name: &str, category: Category) -> Arc<TypeDescriptor> {
        debug_assert!(category.is_scalar());
        let mut d = TypeDescriptor::bare(category);
        d.name = Some(name.into());
        d.traits = TypeTraits::NAMED;
        Arc::new(d)
    }

    /// Same, with an explicit numeric width for narrowing checks.
    pub fn named_scalar_width(
        name: &str,
        category: Category,
        width: NumWidth,
    ) -> Arc<TypeDescriptor> {
        let mut d = TypeDescriptor::bare(category);
        d.name = Some(name.into());
        d.traits = TypeTraits::NAMED;
        d.width = Some(width);
        Arc::new(d)
    }

    pub fn seq(elem: Arc<TypeDescriptor>) -> Arc<TypeDescriptor> {
        let mut d = TypeDescriptor::bare(Category::Sequence);
        d.elem = Some(elem);
        Arc::new(d)
    }

    pub fn map(key: Arc<TypeDescriptor>, value: Arc<TypeDescriptor>) -> Arc<TypeDescriptor> {
        let mut d = TypeDescriptor::bare(Category::Mapping);
        d.key = Some(key);
        d.value = Some(value);
        Arc::new(d)
    }

    pub fn record(name: &str, fields: Vec<FieldSpec>) -> Arc<TypeDescriptor> {
        let mut d = TypeDescriptor::bare(Category::Record);
        d.name = Some(name.into());
        d.fields = fields;
        Arc::new(d)
    }

    pub fn channel(elem: Arc<TypeDescriptor>) -> Arc<TypeDescriptor> {
        let mut d = TypeDescriptor::bare(Category::Channel);
        d.elem = Some(elem);
        Arc::new(d)
    }

    /// One explicit reference level over `target`.
    pub fn reference(target: Arc<TypeDescriptor>) -> Arc<TypeDescriptor> {
        let mut d = TypeDescriptor::bare(target.category);
        d.name = target.name.clone();
        d.traits = target.traits | TypeTraits::REFERENCE;
        d.elem = Some(target);
        Arc::new(d)
    }

    pub fn callable(
        params: Vec<Arc<TypeDescriptor>>,
        variadic: Option<Arc<TypeDescriptor>>,
        returns: Vec<Arc<TypeDescriptor>>,
    ) -> Arc<TypeDescriptor> {
        let mut d = TypeDescriptor::bare(Category::Callable);
        if variadic.is_some() {
            d.traits = TypeTraits::VARIADIC;
        }
        d.params = params;
        d.variadic = variadic;
        d.returns = returns;
        Arc::new(d)
    }

    pub fn is_named(&self) -> bool {
        self.traits.contains(TypeTraits::NAMED)
    }

    pub fn is_reference(&self) -> bool {
        self.traits.contains(TypeTraits::REFERENCE)
    }

    pub fn is_open(&self) -> bool {
        self.traits.contains(TypeTraits::OPEN)
    }

    /// Human-readable name used in error messages.
    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) => name.to_string(),
            None => self.category.name().to_string(),
        }
    }

    /// Index of the field addressed by a script-side key, rename first.
    pub fn field_index(&self, key: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.matches(key))
    }

    /// The zero value of a type, used for absent positions. Takes the
    /// shared descriptor so a zeroed record can carry it.
    pub fn zero_value(this: &Arc<TypeDescriptor>) -> HostValue {
        if this.is_reference() {
            return HostValue::Nil;
        }
        match this.category {
            Category::Bool => HostValue::Bool(false),
            Category::Signed => HostValue::Int(0),
            Category::Unsigned => HostValue::Uint(0),
            Category::Float => HostValue::Float(0.0),
            Category::Complex => HostValue::Complex(crate::host::complex::Complex64::ZERO),
            Category::Text => HostValue::Str(String::new()),
            Category::Sequence => HostValue::empty_seq(),
            Category::Mapping => HostValue::empty_map(),
            Category::Record => {
                HostValue::Record(crate::host::record::Record::zeroed(this).into_ref())
            }
            Category::Channel | Category::Callable | Category::Opaque => HostValue::Nil,
        }
    }
}

// ============================================================================
// Descriptor identity and cache
// ============================================================================

/// Deterministic 64-bit identity for a named type.
///
/// Hashes are computed from the qualified name with a domain-mixing
/// constant, so the same name always yields the same hash regardless of
/// registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeHash(pub u64);

/// Domain marker mixed into every type-name hash.
const TYPE_DOMAIN: u64 = 0x6d6f6f6e_62726964;

impl TypeHash {
    pub fn from_name(name: &str) -> TypeHash {
        TypeHash(xxh64(name.as_bytes(), TYPE_DOMAIN))
    }
}

impl fmt::Display for TypeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Engine-owned cache of named descriptors, keyed by [`TypeHash`].
#[derive(Debug, Default)]
pub struct DescriptorCache {
    entries: FxHashMap<TypeHash, Arc<TypeDescriptor>>,
}

impl DescriptorCache {
    pub fn new() -> Self {
        DescriptorCache::default()
    }

    /// Insert a named descriptor; returns the cached instance, which is
    /// the existing one when the name was already defined.
    pub fn define(&mut self, descriptor: Arc<TypeDescriptor>) -> Arc<TypeDescriptor> {
        let Some(name) = descriptor.name.as_deref() else {
            return descriptor;
        };
        let hash = TypeHash::from_name(name);
        self.entries.entry(hash).or_insert(descriptor).clone()
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<TypeDescriptor>> {
        self.entries.get(&TypeHash::from_name(name)).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

lazy_static! {
    static ref BOOL: Arc<TypeDescriptor> = Arc::new(TypeDescriptor::bare(Category::Bool));
    static ref SIGNED: Arc<TypeDescriptor> = Arc::new(TypeDescriptor::bare(Category::Signed));
    static ref UNSIGNED: Arc<TypeDescriptor> = Arc::new(TypeDescriptor::bare(Category::Unsigned));
    static ref FLOAT: Arc<TypeDescriptor> = Arc::new(TypeDescriptor::bare(Category::Float));
    static ref COMPLEX: Arc<TypeDescriptor> = Arc::new(TypeDescriptor::bare(Category::Complex));
    static ref TEXT: Arc<TypeDescriptor> = Arc::new(TypeDescriptor::bare(Category::Text));
    static ref ANY: Arc<TypeDescriptor> = {
        let mut d = TypeDescriptor::bare(Category::Opaque);
        d.traits = TypeTraits::OPEN;
        Arc::new(d)
    };
}

/// Derive a descriptor from a concrete value, for conversions with no
/// declared type.
pub fn descriptor_for(value: &HostValue) -> Arc<TypeDescriptor> {
    match value {
        HostValue::Seq(_) => TypeDescriptor::seq(TypeDescriptor::any()),
        HostValue::Map(_) => TypeDescriptor::map(TypeDescriptor::any(), TypeDescriptor::any()),
        HostValue::Record(r) => r.borrow().descriptor().clone(),
        HostValue::Chan(ch) => TypeDescriptor::channel(ch.elem().clone()),
        HostValue::Func(f) => f.signature().clone(),
        HostValue::Ref(inner) => TypeDescriptor::reference(descriptor_for(&inner.borrow())),
        other => TypeDescriptor::primitive(Category::of(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_is_total() {
        assert_eq!(classify(&HostValue::Bool(true)), Category::Bool);
        assert_eq!(classify(&HostValue::Int(-1)), Category::Signed);
        assert_eq!(classify(&HostValue::Uint(1)), Category::Unsigned);
        assert_eq!(classify(&HostValue::Float(0.5)), Category::Float);
        assert_eq!(classify(&HostValue::Str("x".into())), Category::Text);
        assert_eq!(classify(&HostValue::empty_seq()), Category::Sequence);
        assert_eq!(classify(&HostValue::empty_map()), Category::Mapping);
        assert_eq!(classify(&HostValue::Nil), Category::Opaque);
    }

    #[test]
    fn named_scalar_carries_trait() {
        let celsius = TypeDescriptor::named_scalar("Celsius", Category::Float);
        assert!(celsius.is_named());
        assert_eq!(celsius.display_name(), "Celsius");
        let bare = TypeDescriptor::primitive(Category::Float);
        assert!(!bare.is_named());
    }

    #[test]
    fn rename_takes_priority_over_name() {
        let text = TypeDescriptor::primitive(Category::Text);
        let desc = TypeDescriptor::record(
            "Config",
            vec![
                FieldSpec::renamed("Name", "nm", text.clone()),
                FieldSpec::new("Age", TypeDescriptor::primitive(Category::Signed)),
            ],
        );
        assert_eq!(desc.field_index("nm"), Some(0));
        // The declared name is shadowed by the rename.
        assert_eq!(desc.field_index("Name"), None);
        assert_eq!(desc.field_index("Age"), Some(1));
    }

    #[test]
    fn type_hash_deterministic() {
        assert_eq!(TypeHash::from_name("Celsius"), TypeHash::from_name("Celsius"));
        assert_ne!(TypeHash::from_name("Celsius"), TypeHash::from_name("Kelvin"));
    }

    #[test]
    fn cache_returns_first_definition() {
        let mut cache = DescriptorCache::new();
        let first = cache.define(TypeDescriptor::named_scalar("Meters", Category::Float));
        let second = cache.define(TypeDescriptor::named_scalar("Meters", Category::Float));
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn width_ranges() {
        assert_eq!(NumWidth::W8.signed_range(), (-128, 127));
        assert_eq!(NumWidth::W16.unsigned_max(), 65535);
    }

    #[test]
    fn reference_descriptor_keeps_category() {
        let target = TypeDescriptor::named_scalar("Count", Category::Signed);
        let r = TypeDescriptor::reference(target);
        assert!(r.is_reference());
        assert_eq!(r.category, Category::Signed);
        assert!(r.is_named());
    }
}
