use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use tracing::debug;

use cms_core::error::AppError;

use crate::model::Layout;
use crate::plugin::CatalogState;

/// `GET /catalog/layouts`
pub(crate) async fn list_layouts(
    State(state): State<Arc<CatalogState>>,
) -> Result<Json<Vec<Layout>>, AppError> {
    let table = state.layouts.get()?;
    Ok(Json(table.all().to_vec()))
}

/// `GET /catalog/layouts/{name}`
pub(crate) async fn get_layout(
    State(state): State<Arc<CatalogState>>,
    Path(name): Path<String>,
) -> Result<Json<Layout>, AppError> {
    debug!(layout = %name, "Looking for layout");
    let table = state.layouts.get()?;
    table
        .get(&name)
        .cloned()
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("Layout '{name}' not found")))
}
