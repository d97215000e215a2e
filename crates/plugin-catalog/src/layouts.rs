//! In-memory layout table.

use anyhow::Context;
use serde_json::Value;

use crate::model::Layout;

/// Layouts in configuration order, unique by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayoutTable {
    layouts: Vec<Layout>,
}

impl LayoutTable {
    /// Builds the table; the content layout is added when not configured.
    /// Later entries with an already used name are rejected.
    pub fn new(layouts: Vec<Layout>) -> anyhow::Result<Self> {
        let mut table = Self::default();
        for layout in layouts {
            anyhow::ensure!(
                table.get(&layout.name).is_none(),
                "layout '{}' is defined more than once",
                layout.name
            );
            table.layouts.push(layout);
        }
        if table.get(crate::model::CONTENT_LAYOUT).is_none() {
            table.layouts.push(Layout::content());
        }
        Ok(table)
    }

    /// Parses the `layouts` setting: an array of layout tables.
    pub fn from_setting(value: Option<Value>) -> anyhow::Result<Self> {
        let layouts = match value {
            Some(value) => serde_json::from_value(value).context("invalid 'layouts' setting")?,
            None => Vec::new(),
        };
        Self::new(layouts)
    }

    pub fn get(&self, name: &str) -> Option<&Layout> {
        self.layouts.iter().find(|layout| layout.name == name)
    }

    pub fn all(&self) -> &[Layout] {
        &self.layouts
    }

    pub fn len(&self) -> usize {
        self.layouts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layouts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_missing_setting_yields_content_layout() {
        let table = LayoutTable::from_setting(None).unwrap();
        assert_eq!(table.len(), 1);
        assert!(table.get("contentLayout").is_some());
    }

    #[test]
    fn test_configured_order_is_kept() {
        let table = LayoutTable::from_setting(Some(json!([
            { "name": "product" },
            { "name": "contentLayout", "html": "<div/>" },
            { "name": "article" }
        ])))
        .unwrap();

        let names: Vec<&str> = table.all().iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, ["product", "contentLayout", "article"]);
        assert_eq!(table.get("contentLayout").unwrap().html.as_deref(), Some("<div/>"));
    }

    #[test]
    fn test_duplicate_and_malformed_layouts_are_rejected() {
        assert!(LayoutTable::from_setting(Some(json!([{ "name": "a" }, { "name": "a" }]))).is_err());
        assert!(LayoutTable::from_setting(Some(json!({ "name": "a" }))).is_err());
    }
}
