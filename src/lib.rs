//! Bidirectional value conversion and proxying between a Rust host and
//! an embedded dynamically-typed scripting runtime.
//!
//! The engine moves values across the boundary in both directions:
//! host scalars become native script literals, host containers either
//! deep-copy into tables or wrap as live proxy handles, and script
//! values convert back under exact-narrowing rules with per-element
//! issue accumulation. Around that core sit operator emulation for
//! named scalar handles, a function adapter with a panic fence, and a
//! driver that services channel operations for suspended script tasks.
//!
//! ```
//! use moonbridge::{Engine, HostValue};
//!
//! let mut engine = Engine::new();
//! let table = engine.to_foreign(
//!     &HostValue::seq(vec![HostValue::Int(1), HostValue::Int(2)]),
//!     false,
//! );
//! assert_eq!(engine.proxy_type_name(&table), None); // a copy, not a handle
//! ```

pub mod adapter;
pub mod convert;
pub mod descriptor;
pub mod driver;
pub mod engine;
pub mod error;
pub mod handles;
pub mod host;
pub mod ops;
pub mod proxy;
pub mod vm;

pub use adapter::FunctionAdapter;
pub use convert::{ConversionContext, Converted};
pub use descriptor::{
    classify, descriptor_for, Category, DescriptorCache, FieldSpec, NumWidth, TypeDescriptor,
    TypeHash, TypeTraits,
};
pub use driver::Driver;
pub use engine::Engine;
pub use error::{ConversionStatus, ConvertError, ScriptError};
pub use handles::{HandleId, HandleTable, ProxyEntry};
pub use host::channel::{ChanPayload, ChannelRef, HostChannel};
pub use host::complex::Complex64;
pub use host::func::{HostCallable, HostFault, HostFn, MethodSpec};
pub use host::record::{Record, RecordRef};
pub use host::value::{HostKey, HostValue, NullSentinel};
pub use ops::ArithOp;
pub use vm::table::{new_table, Table, TableRef};
pub use vm::task::{ChanOutcome, PendingOp, ResumeInput, ScriptTask, TaskStep};
pub use vm::value::{ScriptFn, ScriptValue, TableKey};
