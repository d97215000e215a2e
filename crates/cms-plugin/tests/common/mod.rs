#![allow(dead_code)]

use std::io::{Cursor, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use zip::write::SimpleFileOptions;

use cms_core::traits::PluginSettings;
use cms_plugin::api::context::InitContext;
use cms_plugin::handlers::HandlerContribution;
use cms_plugin::traits::{DEFAULT_INIT_ORDER, DeployBean};

/// Builds a zip archive in memory.
pub fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in entries {
        writer
            .start_file(*name, SimpleFileOptions::default())
            .unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// A nested plugin sub-archive with a manifest and optional extra entries.
pub fn plugin_archive(name: &str, version: &str, extra: &[(&str, &[u8])]) -> Vec<u8> {
    let manifest = format!("name = \"{name}\"\nversion = \"{version}\"\n");
    let mut entries: Vec<(&str, &[u8])> = vec![("META-INF/plugin.toml", manifest.as_bytes())];
    entries.extend_from_slice(extra);
    zip_bytes(&entries)
}

/// What a [`TestBean`] does when initialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    Succeed,
    Fail,
    Panic,
    Hang,
}

/// Call counters shared between a test and its beans.
#[derive(Debug, Default)]
pub struct Calls {
    pub init: AtomicUsize,
    pub shutdown: AtomicUsize,
    pub order: std::sync::Mutex<Vec<String>>,
}

impl Calls {
    pub fn init_count(&self) -> usize {
        self.init.load(Ordering::SeqCst)
    }

    pub fn order(&self) -> Vec<String> {
        self.order.lock().unwrap().clone()
    }
}

/// Configurable bean for lifecycle tests.
#[derive(Debug)]
pub struct TestBean {
    pub name: String,
    pub behavior: Behavior,
    pub routes: Vec<&'static str>,
    pub init_order: i32,
    pub calls: Arc<Calls>,
}

impl TestBean {
    pub fn new(name: &str, behavior: Behavior, calls: &Arc<Calls>) -> Self {
        Self {
            name: name.to_string(),
            behavior,
            routes: Vec::new(),
            init_order: DEFAULT_INIT_ORDER,
            calls: Arc::clone(calls),
        }
    }

    pub fn with_init_order(mut self, order: i32) -> Self {
        self.init_order = order;
        self
    }

    pub fn with_routes(mut self, routes: &[&'static str]) -> Self {
        self.routes = routes.to_vec();
        self
    }
}

#[async_trait]
impl DeployBean for TestBean {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_enabled(&self, settings: &dyn PluginSettings) -> bool {
        settings.enabled(&self.name)
    }

    fn init_order(&self) -> i32 {
        self.init_order
    }

    async fn init(&self, _ctx: &InitContext) -> anyhow::Result<()> {
        self.calls.init.fetch_add(1, Ordering::SeqCst);
        self.calls
            .order
            .lock()
            .unwrap()
            .push(format!("init:{}", self.name));
        match self.behavior {
            Behavior::Succeed => Ok(()),
            Behavior::Fail => anyhow::bail!("{} refuses to start", self.name),
            Behavior::Panic => panic!("{} blew up", self.name),
            Behavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            }
        }
    }

    fn contribute_handlers(&self) -> Vec<HandlerContribution> {
        self.routes
            .iter()
            .map(|path| {
                let body = self.name.clone();
                HandlerContribution::get(*path, move || async move { body })
            })
            .collect()
    }

    async fn shutdown(&self) -> anyhow::Result<()> {
        self.calls.shutdown.fetch_add(1, Ordering::SeqCst);
        self.calls
            .order
            .lock()
            .unwrap()
            .push(format!("shutdown:{}", self.name));
        Ok(())
    }
}
