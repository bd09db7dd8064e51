//! Adapting host callables for script invocation.
//!
//! The adapter converts arguments per the callable's declared
//! signature, collects a variadic tail, fences host panics, and
//! converts return values back with proxification on. Host faults and
//! panics surface as script runtime errors, never as process aborts.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

use tracing::trace;

use crate::convert::{from_foreign, to_foreign, ConversionContext};
use crate::engine::Engine;
use crate::error::{ConvertError, ScriptError};
use crate::host::func::HostFn;
use crate::host::value::HostValue;
use crate::vm::value::{ScriptFn, ScriptValue};

/// A host callable prepared for script invocation.
pub struct FunctionAdapter {
    callable: HostFn,
}

impl FunctionAdapter {
    pub fn new(callable: HostFn) -> FunctionAdapter {
        FunctionAdapter { callable }
    }

    /// Invoke with script arguments, returning script values.
    ///
    /// Surplus arguments are discarded; missing fixed arguments are an
    /// arity error. Nil is accepted for any parameter and converts to
    /// its zero value.
    pub fn invoke(
        &self,
        engine: &mut Engine,
        args: &[ScriptValue],
    ) -> Result<Vec<ScriptValue>, ScriptError> {
        let signature = self.callable.signature().clone();
        let fixed = signature.params.len();
        if args.len() < fixed {
            return Err(ConvertError::Arity {
                expected: fixed,
                got: args.len(),
            }
            .into());
        }

        let mut host_args = Vec::with_capacity(args.len());
        for (i, param) in signature.params.iter().enumerate() {
            let mut cx = ConversionContext::new();
            match from_foreign(engine, &mut cx, &args[i], param) {
                Ok(v) => host_args.push(v),
                Err(err) => {
                    return Err(ScriptError::runtime(
                        ConvertError::Argument {
                            index: i + 1,
                            expected: param.display_name(),
                            got: args[i].type_name().to_string(),
                        }
                        .to_string()
                            + ": "
                            + &err.to_string(),
                    ));
                }
            }
        }
        if let Some(tail) = &signature.variadic {
            for (i, arg) in args.iter().enumerate().skip(fixed) {
                let mut cx = ConversionContext::new();
                match from_foreign(engine, &mut cx, arg, tail) {
                    Ok(v) => host_args.push(v),
                    Err(err) => {
                        return Err(ScriptError::runtime(
                            ConvertError::Argument {
                                index: i + 1,
                                expected: tail.display_name(),
                                got: arg.type_name().to_string(),
                            }
                            .to_string()
                                + ": "
                                + &err.to_string(),
                        ));
                    }
                }
            }
        }

        trace!(args = host_args.len(), "invoking host callable");
        let outcome = catch_unwind(AssertUnwindSafe(|| self.callable.invoke(&host_args)));
        let returned = match outcome {
            Ok(Ok(values)) => values,
            Ok(Err(fault)) => return Err(ScriptError::runtime(fault.to_string())),
            Err(payload) => return Err(ScriptError::runtime(panic_message(payload))),
        };

        let mut out = Vec::with_capacity(returned.len());
        for (i, value) in returned.iter().enumerate() {
            let declared = signature.returns.get(i);
            // A record returned by value still proxifies: it goes out
            // behind a fresh reference so the script sees one handle,
            // not a fresh copy per return.
            let value = match value {
                HostValue::Record(_) => HostValue::reference(value.clone()),
                _ => value.clone(),
            };
            let mut cx = ConversionContext::new();
            out.push(to_foreign(engine, &mut cx, &value, declared, true));
        }
        Ok(out)
    }
}

/// A panic payload's best text form.
fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "host function panicked".to_string()
    }
}

/// Wrap a host callable as a script function value.
pub fn wrap_callable(callable: HostFn) -> ScriptFn {
    let adapter = Rc::new(FunctionAdapter::new(callable));
    ScriptFn::new(move |engine, args| adapter.invoke(engine, args))
}
