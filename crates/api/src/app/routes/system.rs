use axum::extract::Extension;
use axum::response::{IntoResponse, Redirect};

use crate::app::services::AppServices;

pub async fn health() -> &'static str {
    "ok"
}

pub async fn home(Extension(services): Extension<AppServices>) -> impl IntoResponse {
    Redirect::temporary(&services.settings.home_redirect)
}
