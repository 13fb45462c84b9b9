// HTTP routes configuration

use crate::core::state::AppState;
use crate::handlers::{auth, fallback, game, health};
use axum::{
    http::{header, Method},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

/// Browser clients may call the API from any origin. Credentials are not
/// advertised, so cross-origin calls only reach the public endpoints.
fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Account endpoints
        .route("/", post(auth::login_handler))
        .route("/register", post(auth::register_handler))
        .route("/logout", get(auth::logout_handler))

        // Game endpoints (require a session)
        .route("/game", get(game::profile_handler))
        .route("/click", post(game::click_handler))
        .route("/upgrade", post(game::upgrade_handler))
        .route("/reset", post(game::reset_handler))

        // Public endpoints
        .route("/bonus_status", get(game::bonus_status_handler))
        .route("/health", get(health::health_handler))

        // 404 fallback for all unmatched routes
        .fallback(fallback::fallback_handler)

        .layer(cors_layer())
        .with_state(state)
}
