//! Request handlers contributed by plugins and their merge into the host
//! dispatcher.
//!
//! A handler is identified by its method and normalised path, where
//! parameter names do not matter (`/layouts/{name}` and `/layouts/{id}` are
//! the same identity). The first plugin to claim an identity keeps it; a
//! later contribution that collides is rejected as a whole.
//!
//! Every accepted batch is also mounted on a trial router while merging, so
//! routes the router itself refuses (a catch-all next to a parameter at the
//! same position, overlapping method routes) are rejected at merge time and
//! never reach [`HandlerSet::into_router`].

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use axum::Router;
use axum::handler::Handler;
use axum::http::{Method, StatusCode};
use axum::routing::{self, MethodFilter, MethodRouter};

use crate::error::PluginError;
use crate::manager::panic_message;

/// Method and normalised path of a handler.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HandlerId {
    /// HTTP method.
    pub method: Method,
    /// Path as contributed, in axum `{param}` syntax.
    pub path: String,
}

impl HandlerId {
    /// Creates an identity.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
        }
    }

    /// Path with parameter names erased.
    pub fn normalised_path(&self) -> String {
        normalise(&self.path)
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

/// One routable handler offered by a plugin.
///
/// The route is built here from the handler and answers `id.method` only.
/// Methods the router cannot filter on leave the contribution unroutable;
/// merging it fails with [`PluginError::InvalidHandler`].
pub struct HandlerContribution {
    id: HandlerId,
    route: Option<MethodRouter>,
}

impl fmt::Debug for HandlerContribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerContribution")
            .field("id", &self.id.to_string())
            .field("routable", &self.route.is_some())
            .finish()
    }
}

impl HandlerContribution {
    /// Handler extracting `State<S>`, served for `method` at `path`.
    pub fn new<H, T, S>(method: Method, path: impl Into<String>, handler: H, state: S) -> Self
    where
        H: Handler<T, S>,
        T: 'static,
        S: Clone + Send + Sync + 'static,
    {
        let route =
            method_filter(&method).map(|filter| routing::on(filter, handler).with_state(state));
        Self {
            id: HandlerId::new(method, path),
            route,
        }
    }

    /// `GET` handler.
    pub fn get<H, T>(path: impl Into<String>, handler: H) -> Self
    where
        H: Handler<T, ()>,
        T: 'static,
    {
        Self::new(Method::GET, path, handler, ())
    }

    /// `POST` handler.
    pub fn post<H, T>(path: impl Into<String>, handler: H) -> Self
    where
        H: Handler<T, ()>,
        T: 'static,
    {
        Self::new(Method::POST, path, handler, ())
    }

    /// `PUT` handler.
    pub fn put<H, T>(path: impl Into<String>, handler: H) -> Self
    where
        H: Handler<T, ()>,
        T: 'static,
    {
        Self::new(Method::PUT, path, handler, ())
    }

    /// `DELETE` handler.
    pub fn delete<H, T>(path: impl Into<String>, handler: H) -> Self
    where
        H: Handler<T, ()>,
        T: 'static,
    {
        Self::new(Method::DELETE, path, handler, ())
    }

    /// Identity of the handler.
    pub fn id(&self) -> &HandlerId {
        &self.id
    }
}

/// Who claimed a normalised path shape first.
#[derive(Debug, Clone)]
struct Shape {
    path: String,
    owner: String,
}

/// Identities and shapes claimed by the batch being merged.
#[derive(Debug, Default)]
struct Batch {
    keys: HashSet<(Method, String)>,
    shapes: HashMap<String, String>,
}

/// Handlers merged into the host dispatcher, each exactly once.
#[derive(Default)]
pub struct HandlerSet {
    /// Owner per `(method, normalised path)`.
    owners: HashMap<(Method, String), String>,
    /// Concrete path per normalised path; parameter names must agree.
    shapes: HashMap<String, Shape>,
    /// Merged identities in merge order, with their plugin.
    merged: Vec<(String, HandlerId)>,
    /// Router serving the merged handlers.
    router: Router,
    /// Merged handlers plus reservations; detects router-level conflicts.
    layout: Router,
}

impl fmt::Debug for HandlerSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerSet")
            .field("handlers", &self.ids())
            .finish()
    }
}

impl HandlerSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims an identity without a route, for handlers the host serves itself.
    pub fn reserve(&mut self, owner: &str, id: HandlerId) -> Result<(), PluginError> {
        let key = self.check(owner, &id, &Batch::default())?;
        let filter = method_filter(&id.method).ok_or_else(|| unroutable(owner, &id))?;
        let placeholder = routing::on(filter, || async { StatusCode::NOT_FOUND });
        self.layout = mount(self.layout.clone(), owner, &id, placeholder)?;
        self.claim(owner, &id, key);
        Ok(())
    }

    /// Merges every contribution of one plugin, or none of them.
    pub fn merge(
        &mut self,
        plugin: &str,
        contributions: Vec<HandlerContribution>,
    ) -> Result<usize, PluginError> {
        let mut batch = Batch::default();
        for contribution in &contributions {
            if contribution.route.is_none() {
                return Err(unroutable(plugin, &contribution.id));
            }
            let key = self.check(plugin, &contribution.id, &batch)?;
            batch
                .shapes
                .insert(key.1.clone(), contribution.id.path.clone());
            batch.keys.insert(key);
        }

        let mut router = self.router.clone();
        let mut layout = self.layout.clone();
        let mut ids = Vec::with_capacity(contributions.len());
        for HandlerContribution { id, route } in contributions {
            let Some(route) = route else {
                continue;
            };
            layout = mount(layout, plugin, &id, route.clone())?;
            router = mount(router, plugin, &id, route)?;
            ids.push(id);
        }

        self.router = router;
        self.layout = layout;
        let count = ids.len();
        for id in ids {
            let key = (id.method.clone(), id.normalised_path());
            self.claim(plugin, &id, key);
            self.merged.push((plugin.to_string(), id));
        }
        Ok(count)
    }

    /// Number of merged handlers, excluding reservations.
    pub fn len(&self) -> usize {
        self.merged.len()
    }

    /// Whether no handler was merged.
    pub fn is_empty(&self) -> bool {
        self.merged.is_empty()
    }

    /// Identities of merged handlers, in merge order.
    pub fn ids(&self) -> Vec<String> {
        self.merged.iter().map(|(_, id)| id.to_string()).collect()
    }

    /// Whether an identity is claimed, by a route or a reservation.
    pub fn contains(&self, id: &HandlerId) -> bool {
        self.owners
            .contains_key(&(id.method.clone(), id.normalised_path()))
    }

    /// Plugin (or host component) owning an identity.
    pub fn owner(&self, id: &HandlerId) -> Option<&str> {
        self.owners
            .get(&(id.method.clone(), id.normalised_path()))
            .map(String::as_str)
    }

    /// The router serving every merged handler.
    pub fn into_router(self) -> Router {
        self.router
    }

    fn check(
        &self,
        plugin: &str,
        id: &HandlerId,
        batch: &Batch,
    ) -> Result<(Method, String), PluginError> {
        validate_path(&id.path).map_err(|message| PluginError::InvalidHandler {
            path: id.path.clone(),
            plugin: plugin.to_string(),
            message,
        })?;

        let normalised = id.normalised_path();
        let conflict = |owner: &str| PluginError::HandlerConflict {
            handler: id.to_string(),
            plugin: plugin.to_string(),
            owner: owner.to_string(),
        };

        if let Some(shape) = self.shapes.get(&normalised) {
            if shape.path != id.path {
                return Err(conflict(&shape.owner));
            }
        }
        if let Some(path) = batch.shapes.get(&normalised) {
            if *path != id.path {
                return Err(conflict(plugin));
            }
        }

        let key = (id.method.clone(), normalised);
        if let Some(owner) = self.owners.get(&key) {
            return Err(conflict(owner));
        }
        if batch.keys.contains(&key) {
            return Err(conflict(plugin));
        }
        Ok(key)
    }

    fn claim(&mut self, owner: &str, id: &HandlerId, key: (Method, String)) {
        self.shapes
            .entry(key.1.clone())
            .or_insert_with(|| Shape {
                path: id.path.clone(),
                owner: owner.to_string(),
            });
        self.owners.insert(key, owner.to_string());
    }
}

/// Adds `route` to `router`, turning the router's insertion panic into an error.
fn mount(
    router: Router,
    plugin: &str,
    id: &HandlerId,
    route: MethodRouter,
) -> Result<Router, PluginError> {
    let path = id.path.clone();
    let mounted = panic::catch_unwind(AssertUnwindSafe(move || router.route(&path, route)));
    mounted.map_err(|payload| {
        let message = panic_message(&*payload);
        drop(payload);
        PluginError::RouteRejected {
            handler: id.to_string(),
            plugin: plugin.to_string(),
            message,
        }
    })
}

fn method_filter(method: &Method) -> Option<MethodFilter> {
    MethodFilter::try_from(method.clone()).ok()
}

fn unroutable(plugin: &str, id: &HandlerId) -> PluginError {
    PluginError::InvalidHandler {
        path: id.path.clone(),
        plugin: plugin.to_string(),
        message: format!("method {} cannot be routed", id.method),
    }
}

/// Replaces `{name}` with `{}` and `{*name}` with `{*}`.
fn normalise(path: &str) -> String {
    path.split('/')
        .map(|segment| match param_name(segment) {
            Some((true, _)) => "{*}",
            Some((false, _)) => "{}",
            None => segment,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// For a `{name}` or `{*name}` segment, returns `(is_catch_all, name)`.
fn param_name(segment: &str) -> Option<(bool, &str)> {
    let inner = segment.strip_prefix('{')?.strip_suffix('}')?;
    match inner.strip_prefix('*') {
        Some(name) => Some((true, name)),
        None => Some((false, inner)),
    }
}

fn validate_path(path: &str) -> Result<(), String> {
    if !path.starts_with('/') {
        return Err("path must start with '/'".to_string());
    }
    if path.contains("//") {
        return Err("path contains an empty segment".to_string());
    }

    let segments: Vec<&str> = path[1..].split('/').collect();
    let mut names = HashSet::new();
    for (index, segment) in segments.iter().enumerate() {
        if segment.starts_with(':') || segment.starts_with('*') {
            return Err(format!("segment '{segment}' uses unsupported parameter syntax"));
        }

        match param_name(segment) {
            Some((catch_all, name)) => {
                let valid = !name.is_empty()
                    && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
                if !valid {
                    return Err(format!("invalid parameter name in '{segment}'"));
                }
                if catch_all && index + 1 != segments.len() {
                    return Err("catch-all parameter must be the last segment".to_string());
                }
                if !names.insert(name) {
                    return Err(format!("parameter '{name}' appears twice"));
                }
            }
            None if segment.contains('{') || segment.contains('}') => {
                return Err(format!("malformed parameter in '{segment}'"));
            }
            None => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn ok() -> &'static str {
        "ok"
    }

    #[test]
    fn test_normalise_erases_parameter_names() {
        assert_eq!(normalise("/layouts/{name}"), "/layouts/{}");
        assert_eq!(normalise("/files/{*rest}"), "/files/{*}");
        assert_eq!(normalise("/plain"), "/plain");
    }

    #[test]
    fn test_validate_path() {
        assert!(validate_path("/catalog/layouts/{name}").is_ok());
        assert!(validate_path("/assets/{*path}").is_ok());
        assert!(validate_path("catalog").is_err());
        assert!(validate_path("/catalog/:name").is_err());
        assert!(validate_path("/assets/{*path}/tail").is_err());
        assert!(validate_path("/a/{b").is_err());
        assert!(validate_path("/a/{x}/{x}").is_err());
        assert!(validate_path("/a//b").is_err());
    }

    #[test]
    fn test_merge_is_all_or_nothing() {
        let mut set = HandlerSet::new();
        set.merge("first", vec![HandlerContribution::get("/shared", ok)])
            .unwrap();

        let err = set
            .merge(
                "second",
                vec![
                    HandlerContribution::get("/own", ok),
                    HandlerContribution::get("/shared", ok),
                ],
            )
            .unwrap_err();
        assert!(matches!(err, PluginError::HandlerConflict { ref owner, .. } if owner == "first"));
        assert_eq!(set.len(), 1);
        assert!(!set.contains(&HandlerId::new(Method::GET, "/own")));
    }

    #[test]
    fn test_same_shape_different_names_conflict() {
        let mut set = HandlerSet::new();
        set.merge("first", vec![HandlerContribution::get("/items/{id}", ok)])
            .unwrap();

        let err = set
            .merge("second", vec![HandlerContribution::post("/items/{name}", ok)])
            .unwrap_err();
        assert!(matches!(err, PluginError::HandlerConflict { .. }));

        set.merge("second", vec![HandlerContribution::post("/items/{id}", ok)])
            .unwrap();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_reserved_identity_blocks_plugins() {
        let mut set = HandlerSet::new();
        set.reserve("host", HandlerId::new(Method::GET, "/api/plugins"))
            .unwrap();

        let err = set
            .merge("sneaky", vec![HandlerContribution::get("/api/plugins", ok)])
            .unwrap_err();
        assert!(matches!(err, PluginError::HandlerConflict { ref owner, .. } if owner == "host"));
        assert!(set.is_empty());
    }

    #[test]
    fn test_duplicate_within_batch() {
        let mut set = HandlerSet::new();
        let err = set
            .merge(
                "twice",
                vec![
                    HandlerContribution::get("/x", ok),
                    HandlerContribution::get("/x", ok),
                ],
            )
            .unwrap_err();
        assert!(matches!(err, PluginError::HandlerConflict { .. }));
        assert!(set.is_empty());
    }

    #[test]
    fn test_catch_all_beside_parameter_is_rejected() {
        let mut set = HandlerSet::new();
        set.merge("files", vec![HandlerContribution::get("/files/{id}", ok)])
            .unwrap();

        let err = set
            .merge(
                "greedy",
                vec![
                    HandlerContribution::get("/greedy/own", ok),
                    HandlerContribution::get("/files/{*rest}", ok),
                ],
            )
            .unwrap_err();
        assert!(matches!(err, PluginError::RouteRejected { ref plugin, .. } if plugin == "greedy"));
        assert_eq!(err.reason(), crate::error::FailureReason::HandlerConflict);
        assert_eq!(set.ids(), ["GET /files/{id}"]);
        assert!(!set.contains(&HandlerId::new(Method::GET, "/greedy/own")));

        // The surviving set still builds a router.
        let _router = set.into_router();
    }

    #[test]
    fn test_contribution_answers_only_its_method() {
        let mut set = HandlerSet::new();
        set.merge("reader", vec![HandlerContribution::get("/x", ok)])
            .unwrap();
        set.merge("writer", vec![HandlerContribution::post("/x", ok)])
            .unwrap();
        assert_eq!(set.len(), 2);
        let _router = set.into_router();
    }

    #[test]
    fn test_unroutable_method_is_invalid() {
        let mut set = HandlerSet::new();
        let method = Method::from_bytes(b"PURGE").unwrap();
        let err = set
            .merge("odd", vec![HandlerContribution::new(method, "/cache", ok, ())])
            .unwrap_err();
        assert!(matches!(err, PluginError::InvalidHandler { .. }));
        assert!(set.is_empty());
    }

    #[test]
    fn test_reservation_takes_part_in_router_conflicts() {
        let mut set = HandlerSet::new();
        set.reserve("host", HandlerId::new(Method::GET, "/api/{id}"))
            .unwrap();

        let err = set
            .merge("api", vec![HandlerContribution::post("/api/{*rest}", ok)])
            .unwrap_err();
        assert!(matches!(err, PluginError::RouteRejected { .. }));
        assert!(set.is_empty());
    }
}
