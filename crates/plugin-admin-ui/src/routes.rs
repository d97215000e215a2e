use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::response::Html;
use bytes::Bytes;
use tracing::info;

use cms_core::error::AppError;

use crate::model::UserInfo;
use crate::plugin::AdminUiState;

/// `GET /apicatalog` and `GET /apicatalog/{*path}`; client-side routes share the page.
pub(crate) async fn api_catalog(
    State(state): State<Arc<AdminUiState>>,
) -> Result<Html<Bytes>, AppError> {
    info!("API catalog page requested");
    let page = state.page.get()?;
    Ok(Html(page.clone()))
}

/// `GET /admin-ui/userinfo`
pub(crate) async fn user_info() -> Json<UserInfo> {
    info!("User information requested");
    Json(UserInfo::anonymous())
}
