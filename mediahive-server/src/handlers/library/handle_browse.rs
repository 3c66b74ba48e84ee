use axum::{
    Extension, Json,
    extract::{Query, State},
};
use mediahive_core::{Access, DirectoryListing, FileInfo};

use super::LibraryQuery;
use crate::errors::AppResult;
use crate::infra::app_state::AppState;

/// GET `/browse` - lists one directory of a library root.
pub async fn browse_handler(
    State(state): State<AppState>,
    Extension(access): Extension<Access>,
    Query(query): Query<LibraryQuery>,
) -> AppResult<Json<DirectoryListing>> {
    let listing = state
        .library()
        .browse(query.path_or_root(), query.library_id(), access)
        .await?;
    Ok(Json(listing))
}

/// GET `/info` - size, timestamps and media kind of one file.
pub async fn file_info_handler(
    State(state): State<AppState>,
    Extension(access): Extension<Access>,
    Query(query): Query<LibraryQuery>,
) -> AppResult<Json<FileInfo>> {
    let info = state
        .library()
        .file_info(query.required_path()?, query.library_id(), access)
        .await?;
    Ok(Json(info))
}
