//! Error types and the shared error taxonomy

mod core_error;
mod kind;

pub use core_error::{CoreError, CoreResult};
pub use kind::ErrorKind;
