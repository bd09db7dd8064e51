//! The host-side value model: dynamic values, records, channels and
//! type-erased callables.

pub mod channel;
pub mod complex;
pub mod func;
pub mod record;
pub mod value;
