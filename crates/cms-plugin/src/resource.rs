//! Resources a plugin caches during `init()` and serves afterwards.

use std::fmt;
use std::sync::OnceLock;

use crate::error::PluginError;

/// A value loaded at most once and read many times.
///
/// Reading before a successful load yields
/// [`PluginError::ResourceNotLoaded`] rather than an empty value, so a plugin
/// whose `init()` failed answers with a typed error instead of a blank page.
pub struct CachedResource<T> {
    /// Resource identifier used in errors.
    name: String,
    /// Loaded value.
    value: OnceLock<T>,
}

impl<T> CachedResource<T> {
    /// Creates an empty resource.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: OnceLock::new(),
        }
    }

    /// Resource identifier.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stores the value. Returns `false` if a value was already stored, in
    /// which case the existing value is kept.
    pub fn load(&self, value: T) -> bool {
        self.value.set(value).is_ok()
    }

    /// Loads the value with `f` unless already loaded.
    pub fn load_with<E>(&self, f: impl FnOnce() -> Result<T, E>) -> Result<&T, E> {
        if let Some(value) = self.value.get() {
            return Ok(value);
        }
        let value = f()?;
        Ok(self.value.get_or_init(|| value))
    }

    /// The loaded value.
    pub fn get(&self) -> Result<&T, PluginError> {
        self.value
            .get()
            .ok_or_else(|| PluginError::resource_not_loaded(&self.name))
    }

    /// Whether a value has been stored.
    pub fn is_loaded(&self) -> bool {
        self.value.get().is_some()
    }
}

impl<T> fmt::Debug for CachedResource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedResource")
            .field("name", &self.name)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_before_load() {
        let page: CachedResource<String> = CachedResource::new("apicatalog.html");
        let err = page.get().unwrap_err();
        assert!(matches!(err, PluginError::ResourceNotLoaded { ref resource } if resource == "apicatalog.html"));
        assert!(!page.is_loaded());
    }

    #[test]
    fn test_load_is_idempotent() {
        let page = CachedResource::new("page");
        assert!(page.load("first".to_string()));
        assert!(!page.load("second".to_string()));
        assert_eq!(page.get().unwrap(), "first");
    }

    #[test]
    fn test_load_with_keeps_failure_retryable() {
        let page: CachedResource<u32> = CachedResource::new("page");
        let failed: Result<&u32, &str> = page.load_with(|| Err("missing"));
        assert!(failed.is_err());
        assert!(!page.is_loaded());

        assert_eq!(*page.load_with(|| Ok::<_, &str>(7)).unwrap(), 7);
        assert_eq!(*page.load_with(|| Ok::<_, &str>(9)).unwrap(), 7);
    }
}
