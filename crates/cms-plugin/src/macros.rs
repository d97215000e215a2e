//! Convenience macros for plugin authors.

/// Exports a [`DeployBean`](crate::traits::DeployBean) from a `cdylib` plugin.
///
/// # Example
/// ```rust,ignore
/// #[derive(Debug, Default)]
/// struct SamplePlugin;
///
/// #[async_trait]
/// impl DeployBean for SamplePlugin {
///     fn name(&self) -> &str {
///         "sample-plugin"
///     }
/// }
///
/// cms_plugin::export_deploy_bean!(SamplePlugin::default());
/// ```
#[macro_export]
macro_rules! export_deploy_bean {
    ($constructor:expr) => {
        #[unsafe(no_mangle)]
        pub extern "C" fn cms_plugin_abi_version() -> u32 {
            $crate::ffi::abi::PLUGIN_ABI_VERSION
        }

        #[unsafe(no_mangle)]
        #[allow(improper_ctypes_definitions)]
        pub extern "C" fn cms_create_deploy_bean() -> *mut $crate::ffi::abi::BeanBox {
            let bean: $crate::ffi::abi::BeanBox = Box::new($constructor);
            Box::into_raw(Box::new(bean))
        }
    };
}

/// Builds a [`HandlerContribution`](crate::handlers::HandlerContribution) list.
///
/// Handlers extracting `State<S>` take the state up front; it is cloned into
/// every route.
///
/// # Example
/// ```rust,ignore
/// contributions![
///     get "/catalog/health" => health,
/// ];
///
/// contributions![
///     state = Arc::clone(&self.state);
///     get "/catalog/layouts" => list_layouts,
///     get "/catalog/layouts/{name}" => get_layout,
/// ]
/// ```
#[macro_export]
macro_rules! contributions {
    (state = $state:expr; $($method:ident $path:literal => $handler:expr),* $(,)?) => {{
        let state = $state;
        vec![$($crate::handlers::HandlerContribution::new(
            $crate::__contribution_method!($method),
            $path,
            $handler,
            ::std::clone::Clone::clone(&state),
        )),*]
    }};
    ($($method:ident $path:literal => $handler:expr),* $(,)?) => {
        vec![$($crate::handlers::HandlerContribution::$method($path, $handler)),*]
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __contribution_method {
    (get) => {
        $crate::__private::axum::http::Method::GET
    };
    (post) => {
        $crate::__private::axum::http::Method::POST
    };
    (put) => {
        $crate::__private::axum::http::Method::PUT
    };
    (delete) => {
        $crate::__private::axum::http::Method::DELETE
    };
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::extract::State;

    use crate::handlers::{HandlerId, HandlerSet};

    async fn ping() -> &'static str {
        "pong"
    }

    async fn greeting(State(name): State<Arc<String>>) -> String {
        format!("hello {name}")
    }

    #[test]
    fn test_contributions_with_and_without_state() {
        let plain = contributions![get "/ping" => ping];
        let stateful = contributions![
            state = Arc::new("world".to_string());
            get "/hello" => greeting,
            delete "/hello" => greeting,
        ];

        let mut set = HandlerSet::new();
        assert_eq!(set.merge("sample", plain).unwrap(), 1);
        assert_eq!(set.merge("other", stateful).unwrap(), 2);
        assert!(set.contains(&HandlerId::new(axum::http::Method::DELETE, "/hello")));
    }
}
