//! Response models of the admin panel endpoints.

use serde::{Deserialize, Serialize};

/// A UI module available to the current user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminModule {
    /// Frontend component rendering the module.
    pub class_name: String,
}

/// Information about the current user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    /// Display name.
    pub name: String,
    /// Avatar path.
    pub picture: String,
    /// Modules the user may open.
    pub modules: Vec<AdminModule>,
}

impl UserInfo {
    /// Stub returned when nobody is signed in.
    pub fn anonymous() -> Self {
        Self {
            name: "Anonymous".to_string(),
            picture: "images/faces/user-tie-solid.svg".to_string(),
            modules: vec![AdminModule {
                class_name: "UserPanel".to_string(),
            }],
        }
    }
}
