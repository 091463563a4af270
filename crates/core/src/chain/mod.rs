#![forbid(unsafe_code)]

mod allocator;
mod edit;
mod ids;
mod types;
mod validate;

pub use allocator::*;
pub use edit::*;
pub use ids::*;
pub use types::*;
pub use validate::*;
