//! Type-erased host callables.

use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use crate::descriptor::TypeDescriptor;
use crate::host::value::HostValue;

/// The fault type host callables return and the adapter translates into
/// script runtime errors.
pub type HostFault = anyhow::Error;

/// Anything the host exposes as callable.
///
/// Implementations receive arguments already converted to host values
/// per the callable's declared signature and return host values to be
/// converted back.
pub trait HostCallable {
    fn invoke(&self, args: &[HostValue]) -> Result<Vec<HostValue>, HostFault>;
}

impl<F> HostCallable for F
where
    F: Fn(&[HostValue]) -> Result<Vec<HostValue>, HostFault>,
{
    fn invoke(&self, args: &[HostValue]) -> Result<Vec<HostValue>, HostFault> {
        self(args)
    }
}

/// A host callable paired with its declared signature.
#[derive(Clone)]
pub struct HostFn {
    signature: Arc<TypeDescriptor>,
    inner: Rc<dyn HostCallable>,
}

impl HostFn {
    /// `signature` must be a [`Category::Callable`] descriptor; its
    /// params, variadic tail and returns drive the function adapter.
    ///
    /// [`Category::Callable`]: crate::descriptor::Category::Callable
    pub fn new<C: HostCallable + 'static>(signature: Arc<TypeDescriptor>, callable: C) -> HostFn {
        HostFn {
            signature,
            inner: Rc::new(callable),
        }
    }

    pub fn signature(&self) -> &Arc<TypeDescriptor> {
        &self.signature
    }

    pub fn invoke(&self, args: &[HostValue]) -> Result<Vec<HostValue>, HostFault> {
        self.inner.invoke(args)
    }

    /// Identity comparison; host functions have no value equality.
    pub fn ptr_eq(&self, other: &HostFn) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

/// A method implementation registered on a named host type.
///
/// The callable's declared params include the receiver in first
/// position. `by_ref` methods need the receiver behind a reference;
/// the proxy layer materializes one when the handle holds a plain
/// value.
#[derive(Debug, Clone)]
pub struct MethodSpec {
    pub name: Arc<str>,
    pub by_ref: bool,
    pub func: HostFn,
}

impl MethodSpec {
    pub fn new(name: &str, func: HostFn) -> Self {
        MethodSpec {
            name: name.into(),
            by_ref: false,
            func,
        }
    }

    pub fn by_ref(name: &str, func: HostFn) -> Self {
        MethodSpec {
            name: name.into(),
            by_ref: true,
            func,
        }
    }
}

impl fmt::Debug for HostFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "HostFn({} params, {} returns)",
            self.signature.params.len(),
            self.signature.returns.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::Category;

    fn double() -> HostFn {
        let sig = TypeDescriptor::callable(
            vec![TypeDescriptor::primitive(Category::Signed)],
            None,
            vec![TypeDescriptor::primitive(Category::Signed)],
        );
        HostFn::new(sig, |args: &[HostValue]| {
            let HostValue::Int(n) = args[0] else {
                anyhow::bail!("expected an integer");
            };
            Ok(vec![HostValue::Int(n * 2)])
        })
    }

    #[test]
    fn invoke_through_erasure() {
        let f = double();
        let out = f.invoke(&[HostValue::Int(21)]).unwrap();
        assert!(out[0].host_eq(&HostValue::Int(42)));
    }

    #[test]
    fn identity_not_value_equality() {
        let f = double();
        let g = double();
        assert!(f.ptr_eq(&f.clone()));
        assert!(!f.ptr_eq(&g));
    }
}
