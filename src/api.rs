pub(crate) mod auth;
pub(crate) mod error;
pub(crate) mod health;
pub(crate) mod metrics;
pub(crate) mod stories;
pub(crate) mod users;

use axum::{
    Router,
    routing::{delete, get, post, put},
};
use tower_http::trace::TraceLayer;

use crate::app::AppState;

pub(crate) fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::live))
        .route("/health/live", get(health::live))
        .route("/health/ready", get(health::ready))
        .route("/metrics", get(metrics::exporter))
        .route("/api/stories/feed", get(stories::feed))
        .route("/api/stories/breaking", get(stories::breaking))
        .route("/api/stories/search", get(stories::search))
        .route("/api/stories/{id}", get(stories::get_story))
        .route("/api/stories/{id}/sources", get(stories::sources))
        .route("/api/stories/{id}/interact", post(stories::interact))
        .route("/api/users/profile", get(users::profile))
        .route("/api/users/preferences", put(users::update_preferences))
        .route("/api/notifications/register", post(users::register_device))
        .route(
            "/api/notifications/device-token/{token}",
            delete(users::remove_device),
        )
        .route("/api/admin/metrics", get(metrics::admin_metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
