//! Loading plugin libraries built as `cdylib`s.
//!
//! The `plugin-fixture` workspace crate is compiled on demand into its own
//! target directory, once per feature set.

#![cfg(feature = "dynamic")]

use std::env::consts::{DLL_PREFIX, DLL_SUFFIX};
use std::io::{Cursor, Write};
use std::path::Path;
use std::process::Command;
use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use zip::CompressionMethod;
use zip::write::SimpleFileOptions;

use cms_core::config::PluginsConfig;
use cms_plugin::descriptor::{PluginDescriptor, PluginStatus};
use cms_plugin::error::FailureReason;
use cms_plugin::handlers::HandlerSet;
use cms_plugin::loader::DynamicModuleLoader;
use cms_plugin::manager::LifecycleManager;
use cms_plugin::registry::PluginRegistry;
use cms_plugin::scanner::{ArchiveScanner, HostPackage, ScannerOptions};

fn library_file() -> String {
    format!("{DLL_PREFIX}plugin_fixture{DLL_SUFFIX}")
}

/// Builds `plugin-fixture` with `features` and returns the library bytes.
fn fixture_library(features: &[&str]) -> Vec<u8> {
    static BUILD: Mutex<()> = Mutex::new(());
    let _guard = BUILD.lock().unwrap_or_else(PoisonError::into_inner);

    let workspace = Path::new(env!("CARGO_MANIFEST_DIR")).join("../..");
    let target_dir = workspace.join("target").join("plugin-fixture");
    let mut command = Command::new(env!("CARGO"));
    command
        .current_dir(&workspace)
        .args(["build", "--quiet", "-p", "plugin-fixture", "--target-dir"])
        .arg(&target_dir);
    if !features.is_empty() {
        command.arg("--features").arg(features.join(","));
    }
    let status = command.status().expect("cargo should start");
    assert!(status.success(), "building plugin-fixture {features:?} failed");

    std::fs::read(target_dir.join("debug").join(library_file())).unwrap()
}

fn stored_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in entries {
        writer.start_file(*name, options).unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// A host package with one nested unit `<name>-0.1.0.jar` shipping `library`.
fn host_package(name: &str, library: &[u8]) -> HostPackage {
    let entry = format!("native/{}", library_file());
    let manifest = format!("name = \"{name}\"\nversion = \"0.1.0\"\nlibrary = \"{entry}\"\n");
    let nested = stored_zip(&[("META-INF/plugin.toml", manifest.as_bytes()), (&entry, library)]);
    let host = stored_zip(&[(&format!("lib/{name}-0.1.0.jar"), &nested)]);
    HostPackage::Memory {
        label: "host.zip".to_string(),
        bytes: Bytes::from(host),
    }
}

fn discover(staging: &Path, package: &HostPackage) -> Vec<PluginDescriptor> {
    let scanner = ArchiveScanner::new(ScannerOptions {
        staging_dir: staging.to_path_buf(),
        max_entry_size: u64::MAX,
        ..ScannerOptions::default()
    })
    .with_loader(DynamicModuleLoader::new());
    scanner.discover(package)
}

fn is_empty_dir(dir: &Path) -> bool {
    match std::fs::read_dir(dir) {
        Ok(mut entries) => entries.next().is_none(),
        Err(_) => true,
    }
}

fn assert_class_load(found: &[PluginDescriptor], needle: &str) {
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].status(), PluginStatus::Failed);
    assert!(found[0].handle().is_none());
    let failure = found[0].failure().unwrap();
    assert_eq!(failure.reason, FailureReason::ClassLoad);
    assert!(
        failure.message.contains(needle),
        "'{}' does not mention '{needle}'",
        failure.message
    );
}

#[tokio::test]
async fn test_library_bean_boots_and_is_released_at_shutdown() {
    let staging = tempfile::tempdir().unwrap();
    let library = fixture_library(&[]);

    let found = discover(staging.path(), &host_package("fixture", &library));
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].status(), PluginStatus::Discovered);
    let handle = found[0].handle().unwrap();
    assert_eq!(handle.bean().name(), "fixture");
    assert!(handle.is_isolated());
    let loaded = handle.library().unwrap().path().to_path_buf();
    assert!(loaded.starts_with(staging.path()));
    assert!(loaded.exists());

    let mut config = PluginsConfig::default();
    config.enable("fixture");
    let manager = LifecycleManager::new(PluginRegistry::from_descriptors(found), Arc::new(config));
    let (host, handlers) = manager.run(HandlerSet::new()).await.unwrap();
    assert_eq!(host.report().status("fixture"), Some(PluginStatus::Initialized));
    assert!(handlers.is_empty());

    host.shutdown().await;
    assert!(!loaded.exists());
    assert!(is_empty_dir(staging.path()));
}

#[test]
fn test_abi_mismatch_is_class_load() {
    let staging = tempfile::tempdir().unwrap();
    let library = fixture_library(&["abi-mismatch"]);

    let found = discover(staging.path(), &host_package("fixture", &library));
    assert_class_load(&found, "ABI version");
    assert!(is_empty_dir(staging.path()));
}

#[test]
fn test_null_factory_is_class_load() {
    let staging = tempfile::tempdir().unwrap();
    let library = fixture_library(&["null-factory"]);

    let found = discover(staging.path(), &host_package("fixture", &library));
    assert_class_load(&found, "returned null");
    assert!(is_empty_dir(staging.path()));
}

#[test]
fn test_library_released_when_bean_name_disagrees() {
    let staging = tempfile::tempdir().unwrap();
    let library = fixture_library(&[]);

    let found = discover(staging.path(), &host_package("renamed", &library));
    assert_class_load(&found, "'fixture'");
    assert!(is_empty_dir(staging.path()));
}

#[test]
fn test_unloadable_library_is_class_load() {
    let staging = tempfile::tempdir().unwrap();

    let found = discover(staging.path(), &host_package("fixture", b"not a shared object"));
    assert_class_load(&found, "failed to open library");
    assert!(is_empty_dir(staging.path()));
}
