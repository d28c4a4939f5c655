//! HTTP application wiring (Axum router + service wiring).
//!
//! - `services.rs`: coordinator wiring and request-independent settings
//! - `routes/`: HTTP routes + handlers
//! - `page.rs`: HTML rendering of preview pages
//! - `errors.rs`: consistent error responses

use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

pub mod errors;
pub mod page;
pub mod routes;
pub mod services;

use services::AppServices;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
///
/// Embed paths have a variable number of leading segments (optional flags),
/// so they are matched by the fallback handler rather than the route table.
pub fn build_app(services: AppServices) -> Router {
    Router::new()
        .route("/", get(routes::system::home))
        .route("/health", get(routes::system::health))
        .fallback(routes::embed::embed)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(Extension(services)),
        )
}
