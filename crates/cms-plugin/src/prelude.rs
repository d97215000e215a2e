//! Prelude for plugin authors.

pub use async_trait::async_trait;

pub use cms_core::error::AppError;
pub use cms_core::traits::PluginSettings;

pub use crate::api::context::{DeployPaths, InitContext};
pub use crate::error::PluginError;
pub use crate::handlers::HandlerContribution;
pub use crate::resource::CachedResource;
pub use crate::traits::DeployBean;

pub use crate::export_deploy_bean;
pub use crate::contributions;
