use std::path::{Component, Path, PathBuf};

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use percent_encoding::percent_decode_str;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;

use super::{AppState, HttpError};

const INDEX_FILE: &str = "index.html";

/// Extension -> MIME type table, exactly the set the document-root static
/// file route is required to recognize. Anything else serves as
/// `application/octet-stream`.
const MIME_TABLE: &[(&str, &str)] = &[
    ("html", "text/html"),
    ("htm", "text/html"),
    ("css", "text/css"),
    ("gif", "image/gif"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("ico", "image/x-icon"),
    ("svg", "image/svg+xml"),
    ("js", "application/javascript"),
    ("eot", "application/vnd.ms-fontobject"),
    ("woff", "application/font-woff"),
    ("mp3", "audio/mpeg"),
    ("ogg", "audio/ogg"),
    ("ogx", "application/ogg"),
];

pub fn guess_content_type(path: &Path) -> &'static str {
    path.extension()
        .and_then(|ext| ext.to_str())
        .and_then(|ext| {
            MIME_TABLE
                .iter()
                .find(|(known, _)| known.eq_ignore_ascii_case(ext))
                .map(|(_, mime)| *mime)
        })
        .unwrap_or("application/octet-stream")
}

/// Serves whatever request didn't match a catalog route: percent-decodes
/// the path, refuses any `..` component, and resolves the remainder
/// against the document root. `/` and the empty path map to `index.html`;
/// directories are refused with `404` rather than listed.
pub async fn serve_static(
    State(state): State<AppState>,
    uri: axum::http::Uri,
    headers: HeaderMap,
) -> Response {
    match resolve_under_root(&state.document_root, uri.path()) {
        Ok(resolved) => match serve_file_with_range(&resolved, headers.get(header::RANGE)).await {
            Ok(response) => response,
            Err(err) => err.into_response(),
        },
        Err(err) => err.into_response(),
    }
}

/// Resolves a request path against `root`, rejecting traversal attempts.
/// The empty path and `/` resolve to `index.html`. The result is
/// canonicalized and checked to still live under `root` — a defense
/// against absolute-path components or `..` sequences the component scan
/// missed after following any remaining indirection.
fn resolve_under_root(root: &Path, raw_path: &str) -> Result<PathBuf, HttpError> {
    let decoded = percent_decode_str(raw_path)
        .decode_utf8()
        .map_err(|_| HttpError::BadRequest("path is not valid UTF-8".to_string()))?;

    let trimmed = decoded.trim_start_matches('/');
    let relative = if trimmed.is_empty() {
        PathBuf::from(INDEX_FILE)
    } else {
        PathBuf::from(trimmed)
    };

    for component in relative.components() {
        match component {
            Component::Normal(_) => {}
            _ => return Err(HttpError::NotFound),
        }
    }

    let candidate = root.join(&relative);

    let canonical_root = root.canonicalize().map_err(|_| HttpError::NotFound)?;
    let canonical_candidate = candidate.canonicalize().map_err(|_| HttpError::NotFound)?;

    if !canonical_candidate.starts_with(&canonical_root) {
        return Err(HttpError::NotFound);
    }
    if canonical_candidate.is_dir() {
        return Err(HttpError::NotFound);
    }

    Ok(canonical_candidate)
}

/// A byte range resolved against an actual file size. `Full` covers the
/// no-`Range`-header case and the spec's "start given but no end" case,
/// both of which reply `200` with the entire file.
enum RangeOutcome {
    Full,
    Partial { start: u64, end_inclusive: u64 },
}

/// Parses a `Range: bytes=start-end` header per this server's contract,
/// which deliberately differs from the general HTTP range spec: a range
/// with a start but no end is *not* "from start to EOF" — it is treated
/// as a request for the whole file, replying `200` rather than `206`.
/// Anything else unparsable (missing header, multi-range, non-numeric,
/// suffix-length ranges) also falls back to the full file.
fn parse_range(header_value: Option<&axum::http::HeaderValue>, file_size: u64) -> RangeOutcome {
    let Some(value) = header_value.and_then(|v| v.to_str().ok()) else {
        return RangeOutcome::Full;
    };
    let Some(spec) = value.strip_prefix("bytes=") else {
        return RangeOutcome::Full;
    };
    let Some((start_str, end_str)) = spec.split_once('-') else {
        return RangeOutcome::Full;
    };
    if end_str.is_empty() {
        return RangeOutcome::Full;
    }
    let (Ok(start), Ok(end)) = (start_str.parse::<u64>(), end_str.parse::<u64>()) else {
        return RangeOutcome::Full;
    };
    if start > end || start >= file_size {
        return RangeOutcome::Full;
    }

    RangeOutcome::Partial {
        start,
        end_inclusive: end.min(file_size.saturating_sub(1)),
    }
}

/// Serves a single file on disk, honoring a `Range` header. Shared by the
/// static document-root route and `/stream`: both are "read bytes from a
/// resolved path", differing only in how the path is resolved.
pub async fn serve_file_with_range(
    path: &Path,
    range_header: Option<&axum::http::HeaderValue>,
) -> Result<Response, HttpError> {
    let file = tokio::fs::File::open(path)
        .await
        .map_err(|_| HttpError::NotFound)?;
    let metadata = file.metadata().await.map_err(|_| HttpError::NotFound)?;
    let file_size = metadata.len();
    let content_type = guess_content_type(path);

    match parse_range(range_header, file_size) {
        RangeOutcome::Full => {
            let stream = ReaderStream::new(file);
            Ok((
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, content_type.to_string()),
                    (header::CONTENT_LENGTH, file_size.to_string()),
                ],
                Body::from_stream(stream),
            )
                .into_response())
        }
        RangeOutcome::Partial {
            start,
            end_inclusive,
        } => {
            let mut file = file;
            file.seek(std::io::SeekFrom::Start(start))
                .await
                .map_err(|_| HttpError::NotFound)?;
            let len = end_inclusive - start + 1;
            let stream = ReaderStream::new(file.take(len));

            Ok((
                StatusCode::PARTIAL_CONTENT,
                [
                    (header::CONTENT_TYPE, content_type.to_string()),
                    (header::CONTENT_LENGTH, len.to_string()),
                    (
                        header::CONTENT_RANGE,
                        format!("bytes {start}-{end_inclusive}/{file_size}"),
                    ),
                ],
                Body::from_stream(stream),
            )
                .into_response())
        }
    }
}
