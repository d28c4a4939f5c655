//! Preview routes.
//!
//! ```text
//! GET /{handle}/post/{slug}[/image]
//! GET /{flags}/{handle}/post/{slug}[/image]
//! ```

use std::collections::HashMap;

use axum::extract::{Extension, Query};
use axum::http::{HeaderValue, StatusCode, Uri, header};
use axum::response::{Html, IntoResponse, Response};
use tracing::{debug, warn};

use linkpeek_embed::{EmbedData, EmbedJobId};

use crate::app::errors::{coordinator_error_to_response, json_error, not_found};
use crate::app::page;
use crate::app::services::AppServices;

/// What an embed path asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedPath {
    pub id: EmbedJobId,
    pub image: bool,
}

impl EmbedPath {
    /// Parse a request path. `None` for anything that is not a valid embed path.
    pub fn parse(path: &str) -> Option<Self> {
        let path = path.strip_prefix('/')?;
        let path = path.strip_suffix('/').unwrap_or(path);
        let segments: Vec<&str> = path.split('/').collect();

        let (flags, rest) = match segments.as_slice() {
            [_, "post", _] | [_, "post", _, "image"] => (None, &segments[..]),
            [flags, rest @ ..] => (Some(*flags), rest),
            [] => return None,
        };

        let (handle, slug, image) = match rest {
            [handle, "post", slug] => (*handle, *slug, false),
            [handle, "post", slug, "image"] => (*handle, *slug, true),
            _ => return None,
        };

        let id = EmbedJobId::from_url_parts(flags, handle, slug).ok()?;
        Some(Self { id, image })
    }
}

/// Fallback handler serving every embed path.
pub async fn embed(
    Extension(services): Extension<AppServices>,
    uri: Uri,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let Some(EmbedPath { id, image }) = EmbedPath::parse(uri.path()) else {
        return not_found();
    };

    let data = match services.embeds.lookup(&id, services.settings.job_timeout).await {
        Ok(Some(data)) => data,
        Ok(None) => {
            debug!(id = %id, "embed not ready before timeout");
            return not_found();
        }
        Err(err) => {
            warn!(id = %id, error = %err, "embed lookup failed");
            return coordinator_error_to_response(&err);
        }
    };

    if image {
        return image_response(&data);
    }

    let image_url = page::image_url(&services.settings.base_url, &id);
    let debug = query.contains_key("debug");
    Html(page::render(&id, &data, &image_url, debug)).into_response()
}

fn image_response(data: &EmbedData) -> Response {
    let bytes = match data.screenshot.decode() {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(error = %err, "stored screenshot is not valid base64");
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "invalid_screenshot", err.to_string());
        }
    };

    let content_type = HeaderValue::from_str(&data.screenshot.mime_type)
        .unwrap_or(HeaderValue::from_static("application/octet-stream"));

    ([(header::CONTENT_TYPE, content_type)], bytes).into_response()
}
