//! Symbols a dynamic plugin library must export.
//!
//! A plugin library is built as a `cdylib` and exports two functions, usually
//! through [`export_deploy_bean!`](crate::export_deploy_bean):
//!
//! ```c
//! uint32_t cms_plugin_abi_version();
//! BeanBox* cms_create_deploy_bean();
//! ```
//!
//! The host and the plugin must be compiled against the same `cms-plugin`
//! version and toolchain; the version symbol guards against the first.

use crate::traits::DeployBean;

/// ABI revision understood by this host.
pub const PLUGIN_ABI_VERSION: u32 = 1;

/// Name of the ABI version symbol.
pub const ABI_VERSION_SYMBOL: &[u8] = b"cms_plugin_abi_version";

/// Name of the bean factory symbol.
pub const CREATE_BEAN_SYMBOL: &[u8] = b"cms_create_deploy_bean";

/// Bean as handed across the library boundary. Boxed twice so the raw
/// pointer stays thin.
pub type BeanBox = Box<dyn DeployBean>;

/// Signature of `cms_plugin_abi_version`.
pub type AbiVersionFn = unsafe extern "C" fn() -> u32;

/// Signature of `cms_create_deploy_bean`. Ownership of the returned pointer
/// passes to the caller.
#[allow(improper_ctypes_definitions)]
pub type CreateBeanFn = unsafe extern "C" fn() -> *mut BeanBox;
