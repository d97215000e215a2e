//! A dynamic plugin library named `fixture`, built on demand by the
//! `cms-plugin` loader tests. Features swap the exported symbols for broken
//! variants.

use cms_plugin::prelude::*;

/// Name the library's bean reports.
pub const FIXTURE_NAME: &str = "fixture";

#[derive(Debug, Default)]
pub struct FixturePlugin;

#[async_trait]
impl DeployBean for FixturePlugin {
    fn name(&self) -> &str {
        FIXTURE_NAME
    }

    fn version(&self) -> Option<&str> {
        Some(env!("CARGO_PKG_VERSION"))
    }
}

#[cfg(not(any(feature = "abi-mismatch", feature = "null-factory")))]
export_deploy_bean!(FixturePlugin);

#[cfg(feature = "abi-mismatch")]
mod exports {
    use cms_plugin::ffi::abi::{BeanBox, PLUGIN_ABI_VERSION};

    #[unsafe(no_mangle)]
    pub extern "C" fn cms_plugin_abi_version() -> u32 {
        PLUGIN_ABI_VERSION + 1
    }

    #[unsafe(no_mangle)]
    #[allow(improper_ctypes_definitions)]
    pub extern "C" fn cms_create_deploy_bean() -> *mut BeanBox {
        let bean: BeanBox = Box::new(super::FixturePlugin);
        Box::into_raw(Box::new(bean))
    }
}

#[cfg(all(feature = "null-factory", not(feature = "abi-mismatch")))]
mod exports {
    use cms_plugin::ffi::abi::{BeanBox, PLUGIN_ABI_VERSION};

    #[unsafe(no_mangle)]
    pub extern "C" fn cms_plugin_abi_version() -> u32 {
        PLUGIN_ABI_VERSION
    }

    #[unsafe(no_mangle)]
    #[allow(improper_ctypes_definitions)]
    pub extern "C" fn cms_create_deploy_bean() -> *mut BeanBox {
        std::ptr::null_mut()
    }
}
