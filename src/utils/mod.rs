//! Shared utilities

pub mod completion;
pub mod error;
pub mod executor;

pub use completion::Completion;
pub use error::{CamcorderError, CamcorderResult, ErrorResponse};
pub use executor::CallbackExecutor;
