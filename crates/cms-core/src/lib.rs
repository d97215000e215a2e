//! # cms-core
//!
//! Core crate for the CMS host. Contains configuration schemas, the unified
//! error system, and the small set of contracts shared between the host and
//! its plugin subsystem (most notably [`traits::PluginSettings`]).
//!
//! This crate has **no** internal dependencies on other workspace crates.

pub mod config;
pub mod error;
pub mod response;
pub mod result;
pub mod traits;

pub use error::AppError;
pub use result::AppResult;
