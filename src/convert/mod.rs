//! The two conversion directions and their shared call-scoped state.

pub mod context;
pub mod from_foreign;
pub mod to_foreign;

pub use context::{ConversionContext, Converted};
pub use from_foreign::from_foreign;
pub use to_foreign::to_foreign;
