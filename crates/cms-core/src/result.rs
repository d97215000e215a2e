//! Convenience result type alias for the CMS host.

use crate::error::AppError;

/// A specialized `Result` type for host operations.
pub type AppResult<T> = Result<T, AppError>;
