//! C ABI shared between the host and plugins built as dynamic libraries.

pub mod abi;
