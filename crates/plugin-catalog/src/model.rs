//! Layout models shared with the admin frontend.

use serde::{Deserialize, Serialize};

/// Name of the layout used for plain content nodes.
pub const CONTENT_LAYOUT: &str = "contentLayout";

/// How the admin UI renders an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AttributeType {
    Text,
    Image,
    File,
    Html,
    Boolean,
    Enum,
    Array,
}

/// One entity attribute as shown by a layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutApiAttribute {
    /// Rendered as a column in table view.
    #[serde(default)]
    pub table: bool,
    /// Entity attribute this entry refers to.
    pub key: String,
    /// Column header.
    #[serde(default)]
    pub name: Option<String>,
    /// Editor used for the value.
    #[serde(default = "default_resolve")]
    pub resolve: AttributeType,
    /// HTML tag wrapping the value.
    #[serde(default)]
    pub tag: Option<String>,
}

fn default_resolve() -> AttributeType {
    AttributeType::Text
}

/// Table view and field organisation of a catalog entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Layout {
    #[serde(default)]
    pub id: Option<i64>,
    pub name: String,
    #[serde(default)]
    pub html: Option<String>,
    #[serde(default)]
    pub bread_crumb_element_name: Option<String>,
    #[serde(default)]
    pub attributes: Vec<LayoutApiAttribute>,
}

impl Layout {
    /// The built-in layout for content nodes.
    pub fn content() -> Self {
        Self {
            id: None,
            name: CONTENT_LAYOUT.to_string(),
            html: None,
            bread_crumb_element_name: None,
            attributes: Vec::new(),
        }
    }
}
