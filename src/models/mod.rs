//! Data models for Transfer API entities

mod endpoint;
mod file;
mod operation;
mod task;

pub use endpoint::*;
pub use file::*;
pub use operation::*;
pub use task::*;
