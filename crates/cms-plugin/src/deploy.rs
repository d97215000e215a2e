//! Deployment of static assets shipped inside plugins.
//!
//! A plugin archive may carry three asset trees under `META-INF/`:
//!
//! | Source              | Target                          |
//! |---------------------|---------------------------------|
//! | `META-INF/frontend` | `static_path`                   |
//! | `META-INF/server`   | `<document_root>/resources`     |
//! | `META-INF/dump`     | `dump_path`                     |
//!
//! Flat plugins provide the same trees as `frontend/`, `server/` and `dump/`
//! subdirectories of their assets directory. Files already on disk are kept
//! unless `rewrite` is set.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Component, Path, PathBuf};

use tracing::{debug, info};
use zip::ZipArchive;

use cms_core::config::PluginsConfig;

use crate::api::context::DeployPaths;
use crate::error::PluginError;

/// Buffer size for copying entries.
const BUFFER_SIZE: usize = 64 * 1024;

/// Asset trees a plugin can ship.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    /// Files served to browsers.
    Frontend,
    /// Server-side resources.
    Server,
    /// Data dumps.
    Dump,
}

impl AssetKind {
    /// All kinds, in deployment order.
    pub const ALL: [AssetKind; 3] = [Self::Frontend, Self::Server, Self::Dump];

    /// Directory name of the tree.
    pub fn dir_name(self) -> &'static str {
        match self {
            Self::Frontend => "frontend",
            Self::Server => "server",
            Self::Dump => "dump",
        }
    }

    fn target_root(self, paths: &DeployPaths) -> PathBuf {
        match self {
            Self::Frontend => paths.static_path.clone(),
            Self::Server => paths.resources_dir(),
            Self::Dump => paths.dump_path.clone(),
        }
    }
}

/// Limits guarding against archive bombs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtractionLimits {
    /// Maximum number of entries in one archive.
    pub max_entries: usize,
    /// Maximum total bytes written for one plugin.
    pub max_total_size: u64,
    /// Maximum uncompressed/compressed ratio of a single entry.
    pub max_ratio: f64,
}

impl Default for ExtractionLimits {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            max_total_size: 1_000_000_000,
            max_ratio: 10.0,
        }
    }
}

/// Outcome of deploying one plugin's assets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeployStats {
    /// Files written.
    pub copied: usize,
    /// Files left untouched because they already existed.
    pub skipped: usize,
    /// Bytes written.
    pub bytes: u64,
}

/// Copies plugin asset trees to their configured destinations.
#[derive(Debug, Clone)]
pub struct AssetDeployer {
    paths: DeployPaths,
    rewrite: bool,
    limits: ExtractionLimits,
}

impl AssetDeployer {
    /// Creates a deployer.
    pub fn new(paths: DeployPaths, rewrite: bool, limits: ExtractionLimits) -> Self {
        Self {
            paths,
            rewrite,
            limits,
        }
    }

    /// Creates a deployer from the plugin configuration section.
    pub fn from_config(config: &PluginsConfig) -> Self {
        Self::new(
            DeployPaths::from_config(config),
            config.rewrite,
            ExtractionLimits {
                max_entries: config.threshold_entries,
                max_total_size: config.threshold_size,
                max_ratio: config.threshold_ratio,
            },
        )
    }

    /// Target directories.
    pub fn paths(&self) -> &DeployPaths {
        &self.paths
    }

    /// Deploys the `META-INF/{frontend,server,dump}` trees of a plugin archive.
    pub fn deploy_archive(&self, archive_path: &Path) -> Result<DeployStats, PluginError> {
        let location = archive_path.display().to_string();
        let file = File::open(archive_path)?;
        let mut archive = ZipArchive::new(file)?;

        if archive.len() > self.limits.max_entries {
            return Err(PluginError::class_load(
                &location,
                format!(
                    "archive holds {} entries, limit is {}",
                    archive.len(),
                    self.limits.max_entries
                ),
            ));
        }

        let mut stats = DeployStats::default();
        for index in 0..archive.len() {
            let mut entry = archive.by_index(index)?;

            let Some(relative) = entry.enclosed_name() else {
                debug!(entry = %entry.name(), "Skipping entry outside of the archive root");
                continue;
            };
            let Some((kind, rest)) = classify(&relative) else {
                continue;
            };
            let target = kind.target_root(&self.paths).join(rest);

            if entry.is_dir() {
                fs::create_dir_all(&target)?;
                continue;
            }

            let compressed = entry.compressed_size();
            if compressed > 0 {
                let ratio = entry.size() as f64 / compressed as f64;
                if ratio > self.limits.max_ratio {
                    return Err(PluginError::class_load(
                        &location,
                        format!(
                            "entry '{}' compression ratio {ratio:.1} exceeds {}",
                            entry.name(),
                            self.limits.max_ratio
                        ),
                    ));
                }
            }

            if target.exists() && !self.rewrite {
                stats.skipped += 1;
                continue;
            }

            let budget = self.limits.max_total_size.saturating_sub(stats.bytes);
            stats.bytes += copy_limited(&mut entry, &target, budget, &location)?;
            stats.copied += 1;
        }

        info!(
            archive = %location,
            copied = stats.copied,
            skipped = stats.skipped,
            bytes = stats.bytes,
            "Plugin assets deployed"
        );
        Ok(stats)
    }

    /// Deploys the `frontend/`, `server/` and `dump/` subdirectories of `dir`.
    pub fn deploy_directory(&self, dir: &Path) -> Result<DeployStats, PluginError> {
        let location = dir.display().to_string();
        let mut stats = DeployStats::default();
        let mut seen = 0usize;

        for kind in AssetKind::ALL {
            let source_root = dir.join(kind.dir_name());
            if !source_root.is_dir() {
                continue;
            }
            let target_root = kind.target_root(&self.paths);

            let mut dirs_to_visit = vec![source_root.clone()];
            while let Some(current) = dirs_to_visit.pop() {
                for item in fs::read_dir(&current)? {
                    let path = item?.path();
                    seen += 1;
                    if seen > self.limits.max_entries {
                        return Err(PluginError::class_load(
                            &location,
                            format!("more than {} asset files", self.limits.max_entries),
                        ));
                    }

                    let Ok(rest) = path.strip_prefix(&source_root) else {
                        continue;
                    };
                    let target = target_root.join(rest);

                    if path.is_dir() {
                        fs::create_dir_all(&target)?;
                        dirs_to_visit.push(path);
                        continue;
                    }
                    if target.exists() && !self.rewrite {
                        stats.skipped += 1;
                        continue;
                    }

                    let budget = self.limits.max_total_size.saturating_sub(stats.bytes);
                    let mut source = File::open(&path)?;
                    stats.bytes += copy_limited(&mut source, &target, budget, &location)?;
                    stats.copied += 1;
                }
            }
        }

        info!(
            dir = %location,
            copied = stats.copied,
            skipped = stats.skipped,
            bytes = stats.bytes,
            "Plugin assets deployed"
        );
        Ok(stats)
    }
}

/// Maps `META-INF/<kind>/<rest>` to its asset kind and remaining path.
fn classify(relative: &Path) -> Option<(AssetKind, PathBuf)> {
    let mut components = relative.components();
    match components.next()? {
        Component::Normal(first) if first == "META-INF" => {}
        _ => return None,
    }
    let second = match components.next()? {
        Component::Normal(second) => second.to_str()?,
        _ => return None,
    };
    let kind = AssetKind::ALL
        .into_iter()
        .find(|kind| kind.dir_name() == second)?;

    let rest: PathBuf = components.collect();
    if rest.as_os_str().is_empty() {
        return None;
    }
    Some((kind, rest))
}

/// Copies at most `budget` bytes from `reader` to `target`.
fn copy_limited(
    reader: &mut impl Read,
    target: &Path,
    budget: u64,
    location: &str,
) -> Result<u64, PluginError> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut out = File::create(target)?;
    let mut buffer = vec![0u8; BUFFER_SIZE];
    let mut written = 0u64;
    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        written += n as u64;
        if written > budget {
            drop(out);
            let _ = fs::remove_file(target);
            return Err(PluginError::class_load(
                location,
                "deployed assets exceed the size threshold",
            ));
        }
        out.write_all(&buffer[..n])?;
    }
    Ok(written)
}
