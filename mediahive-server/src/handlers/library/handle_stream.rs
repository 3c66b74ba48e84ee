use axum::{
    Extension,
    body::Body,
    extract::{Query, State},
    http::{HeaderMap, StatusCode, header},
    response::Response,
};
use mediahive_config::util::parse_bool;
use mediahive_core::Access;
use serde::Deserialize;
use tokio_util::io::ReaderStream;
use tracing::debug;

use super::LibraryQuery;
use crate::errors::{AppError, AppResult};
use crate::infra::app_state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct StreamQuery {
    #[serde(flatten)]
    pub target: LibraryQuery,
    #[serde(default)]
    pub transcode: Option<String>,
    #[serde(default)]
    pub ios: Option<String>,
    #[serde(default)]
    pub optimize: Option<String>,
}

impl StreamQuery {
    /// `transcode=true`, `ios=true` or `optimize=ios` force the readiness
    /// gate to transcode even a pass-through source.
    pub fn force_transcode(&self) -> bool {
        let flag = |value: &Option<String>| value.as_deref().and_then(parse_bool).unwrap_or(false);
        flag(&self.transcode)
            || flag(&self.ios)
            || self
                .optimize
                .as_deref()
                .is_some_and(|value| value.eq_ignore_ascii_case("ios"))
    }
}

/// GET `/stream` - serves a file, honouring `Range: bytes=...`.
pub async fn stream_handler(
    State(state): State<AppState>,
    Extension(access): Extension<Access>,
    Query(query): Query<StreamQuery>,
    headers: HeaderMap,
) -> AppResult<Response> {
    let range = headers
        .get(header::RANGE)
        .and_then(|value| value.to_str().ok());

    let stream = state
        .library()
        .open_stream(
            query.target.required_path()?,
            query.target.library_id(),
            access,
            range,
            query.force_transcode(),
        )
        .await?;

    debug!(
        path = %stream.path.display(),
        range = ?stream.range,
        transcoded = stream.transcoded,
        "streaming file"
    );

    let mut builder = Response::builder()
        .header(header::CONTENT_TYPE, stream.content_type.as_str())
        .header(header::CONTENT_LENGTH, stream.content_length())
        .header(header::ACCEPT_RANGES, "bytes");

    builder = match stream.range {
        Some(range) => builder
            .status(StatusCode::PARTIAL_CONTENT)
            .header(header::CONTENT_RANGE, range.content_range(stream.total_size)),
        None => builder.status(StatusCode::OK),
    };

    builder
        .body(Body::from_stream(ReaderStream::new(stream.reader)))
        .map_err(|err| AppError::internal(format!("failed to build stream response: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(transcode: Option<&str>, ios: Option<&str>, optimize: Option<&str>) -> StreamQuery {
        StreamQuery {
            target: LibraryQuery::default(),
            transcode: transcode.map(str::to_string),
            ios: ios.map(str::to_string),
            optimize: optimize.map(str::to_string),
        }
    }

    #[test]
    fn force_transcode_flags() {
        assert!(!query(None, None, None).force_transcode());
        assert!(query(Some("true"), None, None).force_transcode());
        assert!(query(None, Some("1"), None).force_transcode());
        assert!(query(None, None, Some("iOS")).force_transcode());
        assert!(!query(Some("false"), None, Some("web")).force_transcode());
    }
}
