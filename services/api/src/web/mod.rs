pub mod auth;
pub mod chat_task;
pub mod classroom;
pub mod middleware;
pub mod protocol;
pub mod rest;
pub mod speech;
pub mod state;
pub mod timers;
pub mod ws_handler;


use axum::{
    extract::DefaultBodyLimit,
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::warn;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use self::auth::{login_handler, logout_handler, register_handler};
use self::middleware::resolve_learner;
use self::rest::{
    append_history_handler, clear_history_handler, generate_image_handler,
    generate_lesson_handler, get_history_handler, get_preferences_handler, get_stats_handler,
    report_handler, update_preferences_handler, update_stats_handler, ApiDoc,
};
use self::state::AppState;

pub use ws_handler::ws_handler;

/// Whiteboard screenshots and lesson plans can be large.
const BODY_LIMIT: usize = 10 * 1024 * 1024;

/// Builds the complete application router.
pub fn router(app_state: Arc<AppState>) -> Router {
    // Public routes (no learner required)
    let public_routes = Router::new()
        .route("/auth/register", post(register_handler))
        .route("/auth/login", post(login_handler))
        .route("/auth/logout", post(logout_handler))
        .route("/lessons", post(generate_lesson_handler))
        .route("/images", post(generate_image_handler));

    // Routes that act on behalf of a learner
    let learner_routes = Router::new()
        .route("/stats", get(get_stats_handler).post(update_stats_handler))
        .route("/history", get(get_history_handler).post(append_history_handler))
        .route("/history/clear", post(clear_history_handler))
        .route("/history/{id}/report", get(report_handler))
        .route(
            "/preferences",
            get(get_preferences_handler).put(update_preferences_handler),
        )
        .route("/classroom", get(ws_handler))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            resolve_learner,
        ));

    let api_router = Router::new()
        .merge(public_routes)
        .merge(learner_routes)
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(cors_layer(&app_state.config.allowed_origin))
        .with_state(app_state);

    Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}

fn cors_layer(origin: &str) -> CorsLayer {
    let allow_origin = match origin.parse::<HeaderValue>() {
        Ok(value) => AllowOrigin::exact(value),
        Err(_) => {
            warn!(%origin, "ALLOWED_ORIGIN is not a valid header value; allowing no origins");
            AllowOrigin::list(Vec::<HeaderValue>::new())
        }
    };
    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT])
}
