//! Naming convention for nested plugin archives.
//!
//! Nested plugins live directly under a fixed library segment of the host
//! package and are named `<plugin-name>-<version>.<ext>`. The version starts
//! at the first `-` that is followed by a digit, so `sample-plugin-1.0.jar`
//! yields the name `sample-plugin` and the version `1.0`.

/// A host package entry that matches the nested plugin convention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NestedArchiveName {
    /// Plugin name derived from the file name.
    pub name: String,
    /// Version derived from the file name.
    pub version: String,
    /// File name without the library segment.
    pub file_name: String,
}

/// Matches entry paths against `<segment>/<name>-<version>.<ext>`.
#[derive(Debug, Clone)]
pub struct NamingConvention {
    /// Library segment without leading or trailing slashes.
    segment: String,
    /// Accepted extensions, lowercase, without the dot.
    extensions: Vec<String>,
}

impl NamingConvention {
    /// Creates a convention for the given segment and extensions.
    pub fn new(segment: &str, extensions: &[String]) -> Self {
        Self {
            segment: segment.trim_matches('/').to_string(),
            extensions: extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }

    /// Library segment entries must live under.
    pub fn segment(&self) -> &str {
        &self.segment
    }

    /// Returns the parsed name if `entry_path` is a nested plugin archive.
    pub fn matches(&self, entry_path: &str) -> Option<NestedArchiveName> {
        let path = entry_path.trim_start_matches('/');
        let file_name = if self.segment.is_empty() {
            path
        } else {
            path.strip_prefix(self.segment.as_str())?.strip_prefix('/')?
        };

        if file_name.is_empty() || file_name.contains('/') {
            return None;
        }

        let (stem, ext) = file_name.rsplit_once('.')?;
        if !self
            .extensions
            .iter()
            .any(|accepted| accepted.eq_ignore_ascii_case(ext))
        {
            return None;
        }

        let (name, version) = split_name_version(stem)?;
        Some(NestedArchiveName {
            name: name.to_string(),
            version: version.to_string(),
            file_name: file_name.to_string(),
        })
    }
}

/// Splits `name-1.2.3` at the first dash followed by a digit.
fn split_name_version(stem: &str) -> Option<(&str, &str)> {
    let bytes = stem.as_bytes();
    let split = bytes
        .windows(2)
        .position(|pair| pair[0] == b'-' && pair[1].is_ascii_digit())?;

    let (name, rest) = stem.split_at(split);
    let version = &rest[1..];
    if name.is_empty() || version.is_empty() {
        return None;
    }
    Some((name, version))
}
