use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Query, State},
};
use mediahive_core::{
    Access, ArchiveBrowseContext, ArchiveBrowseRequest, ArchivePages, ArchiveScope,
    ExtractedArchive,
};
use serde::Deserialize;

use super::LibraryQuery;
use crate::errors::{AppError, AppResult};
use crate::infra::app_state::AppState;

/// POST `/archive/extract` - unpacks an archive into the cache. The target
/// comes from a JSON body or, failing that, the query string.
pub async fn extract_archive_handler(
    State(state): State<AppState>,
    Extension(access): Extension<Access>,
    Query(query): Query<LibraryQuery>,
    body: Bytes,
) -> AppResult<Json<ExtractedArchive>> {
    let target = if body.iter().all(u8::is_ascii_whitespace) {
        query
    } else {
        serde_json::from_slice::<LibraryQuery>(&body)
            .map_err(|err| AppError::bad_request(format!("Invalid request body: {err}")))?
    };

    let extracted = state
        .library()
        .extract_archive(target.required_path()?, target.library_id(), access)
        .await?;
    Ok(Json(extracted))
}

/// GET `/archive/pages` - image pages in reading order.
pub async fn archive_pages_handler(
    State(state): State<AppState>,
    Extension(access): Extension<Access>,
    Query(query): Query<LibraryQuery>,
) -> AppResult<Json<ArchivePages>> {
    let pages = state
        .library()
        .archive_pages(query.required_path()?, query.library_id(), access)
        .await?;
    Ok(Json(pages))
}

#[derive(Debug, Default, Deserialize)]
pub struct ArchiveBrowseQuery {
    #[serde(flatten)]
    pub target: LibraryQuery,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub subpath: Option<String>,
    #[serde(default)]
    pub root: Option<String>,
}

impl ArchiveBrowseQuery {
    fn into_request(self) -> AppResult<ArchiveBrowseRequest> {
        let scope = match self.scope.as_deref().map(str::trim) {
            None | Some("") => ArchiveScope::default(),
            Some(scope) if scope.eq_ignore_ascii_case("library") => ArchiveScope::Library,
            Some(scope) if scope.eq_ignore_ascii_case("extracted") => ArchiveScope::Extracted,
            Some(other) => {
                return Err(AppError::bad_request(format!(
                    "Unknown archive scope `{other}`; expected `library` or `extracted`"
                )));
            }
        };
        let archive_path = self.target.required_path()?.to_string();

        Ok(ArchiveBrowseRequest {
            archive_path,
            library_id: self.target.library,
            scope,
            subpath: self.subpath,
            root: self.root,
        })
    }
}

/// GET `/archive/browse` - one directory inside an extracted archive.
pub async fn browse_archive_handler(
    State(state): State<AppState>,
    Extension(access): Extension<Access>,
    Query(query): Query<ArchiveBrowseQuery>,
) -> AppResult<Json<ArchiveBrowseContext>> {
    let request = query.into_request()?;
    let context = state.library().browse_archive(&request, access).await?;
    Ok(Json(context))
}
