//! Host-side channels.
//!
//! A [`HostChannel`] pairs a crossbeam sender and receiver behind one
//! shared handle, so a channel can be registered into several engine
//! instances running on different threads and carry values between the
//! scripts they run. Host values are not sendable across threads (they
//! share composites by `Rc`), so payloads are restricted to the
//! [`ChanPayload`] scalar subset.

use std::sync::Arc;
use std::sync::Mutex;

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};

use crate::descriptor::TypeDescriptor;
use crate::error::ConvertError;
use crate::host::complex::Complex64;
use crate::host::value::HostValue;

/// Shared channel handle. `Arc`, not `Rc`: channels cross threads.
pub type ChannelRef = Arc<HostChannel>;

/// A value that can travel through a channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ChanPayload {
    Nil,
    Bool(bool),
    Int(i64),
    Uint(u64),
    Float(f64),
    Complex(Complex64),
    Str(String),
}

impl ChanPayload {
    /// Restrict a host value to the sendable subset.
    pub fn from_host(value: &HostValue) -> Result<ChanPayload, ConvertError> {
        match value {
            HostValue::Nil => Ok(ChanPayload::Nil),
            HostValue::Bool(b) => Ok(ChanPayload::Bool(*b)),
            HostValue::Int(i) => Ok(ChanPayload::Int(*i)),
            HostValue::Uint(u) => Ok(ChanPayload::Uint(*u)),
            HostValue::Float(x) => Ok(ChanPayload::Float(*x)),
            HostValue::Complex(c) => Ok(ChanPayload::Complex(*c)),
            HostValue::Str(s) => Ok(ChanPayload::Str(s.clone())),
            other => Err(ConvertError::conversion(
                other.type_name(),
                "channel payload",
            )),
        }
    }

    pub fn into_host(self) -> HostValue {
        match self {
            ChanPayload::Nil => HostValue::Nil,
            ChanPayload::Bool(b) => HostValue::Bool(b),
            ChanPayload::Int(i) => HostValue::Int(i),
            ChanPayload::Uint(u) => HostValue::Uint(u),
            ChanPayload::Float(x) => HostValue::Float(x),
            ChanPayload::Complex(c) => HostValue::Complex(c),
            ChanPayload::Str(s) => HostValue::Str(s),
        }
    }
}

/// A host channel with Go-like semantics: optionally buffered, closable
/// from the sending side, receivable until drained.
pub struct HostChannel {
    tx: Mutex<Option<Sender<ChanPayload>>>,
    rx: Receiver<ChanPayload>,
    elem: Arc<TypeDescriptor>,
}

impl HostChannel {
    /// `capacity: None` gives an unbounded channel; `Some(0)` a
    /// rendezvous channel; `Some(n)` a buffer of `n`.
    pub fn new(capacity: Option<usize>, elem: Arc<TypeDescriptor>) -> ChannelRef {
        let (tx, rx) = match capacity {
            Some(n) => bounded(n),
            None => unbounded(),
        };
        Arc::new(HostChannel {
            tx: Mutex::new(Some(tx)),
            rx,
            elem,
        })
    }

    pub fn elem(&self) -> &Arc<TypeDescriptor> {
        &self.elem
    }

    /// Blocking send. Fails if the channel has been closed.
    pub fn send(&self, payload: ChanPayload) -> Result<(), ConvertError> {
        let tx = match self.tx.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        match tx {
            Some(tx) => tx
                .send(payload)
                .map_err(|_| ConvertError::conversion("value", "closed channel")),
            None => Err(ConvertError::conversion("value", "closed channel")),
        }
    }

    /// Blocking receive. Returns `(Some(payload), true)` on success and
    /// `(None, false)` once the channel is closed and drained.
    pub fn recv(&self) -> (Option<ChanPayload>, bool) {
        match self.rx.recv() {
            Ok(payload) => (Some(payload), true),
            Err(_) => (None, false),
        }
    }

    /// Close the sending side. Buffered payloads stay receivable.
    /// Idempotent.
    pub fn close(&self) {
        let mut guard = match self.tx.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.take();
    }

    pub fn is_closed(&self) -> bool {
        match self.tx.lock() {
            Ok(guard) => guard.is_none(),
            Err(poisoned) => poisoned.into_inner().is_none(),
        }
    }

    /// Stable identity of this channel handle.
    pub fn identity(&self) -> usize {
        self as *const HostChannel as usize
    }
}

impl std::fmt::Debug for HostChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostChannel")
            .field("closed", &self.is_closed())
            .field("elem", &self.elem.display_name())
            .finish()
    }
}
