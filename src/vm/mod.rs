//! The minimal interpreter surface the engine converts against:
//! dynamic values, tables and the cooperative task protocol.

pub mod table;
pub mod task;
pub mod value;
