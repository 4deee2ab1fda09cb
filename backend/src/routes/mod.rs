//! Route definitions for the Farm Surveillance Platform

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post, put},
    Router,
};

use crate::{handlers, middleware::auth_middleware, AppState};

/// Request body cap for multipart image uploads
const MAX_UPLOAD_BODY_BYTES: usize = 64 * 1024 * 1024;

/// Create API routes
pub fn api_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        // Health check (public)
        .route("/health", get(handlers::health_check))
        // Auth routes (public)
        .nest("/auth", auth_routes())
        // Boundary mapping links (public, token in path)
        .nest("/mapping", mapping_routes())
        // Protected routes
        .nest("/profile", profile_routes(state))
        .nest("/catalog", catalog_routes(state))
        .nest("/seasons", season_routes(state))
        .nest("/farms", farm_routes(state))
        .nest("/calculator", calculator_routes(state))
        .nest("/sessions", session_routes(state))
        .nest("/observations", observation_routes(state))
        .nest("/dashboard", dashboard_routes(state))
        .nest("/records", record_routes(state))
}

/// Authentication routes (public)
fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(handlers::register))
        .route("/login", post(handlers::login))
        .route("/refresh", post(handlers::refresh))
}

fn mapping_routes() -> Router<AppState> {
    Router::new().route(
        "/:token",
        get(handlers::open_mapping_link).post(handlers::submit_boundary),
    )
}

fn profile_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(handlers::get_profile).put(handlers::update_profile),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
}

/// Reference data routes (protected)
fn catalog_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/regions", get(handlers::list_regions))
        .route("/plant-types", get(handlers::list_plant_types))
        .route("/plant-parts", get(handlers::list_plant_parts))
        .route("/pests", get(handlers::list_pests))
        .route("/diseases", get(handlers::list_diseases))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
}

fn season_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_stages))
        .route("/current", get(handlers::current_stage))
        .route("/timeline", get(handlers::timeline))
        .route("/deduplicate", post(handlers::deduplicate_stages))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
}

/// Farm management routes (protected)
fn farm_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_farms).post(handlers::create_farm))
        .route(
            "/:farm_id",
            get(handlers::get_farm)
                .put(handlers::update_farm)
                .delete(handlers::delete_farm),
        )
        .route("/:farm_id/boundary", put(handlers::set_boundary))
        .route("/:farm_id/mapping-link", post(handlers::create_mapping_link))
        .route("/:farm_id/recommendations", get(handlers::recommendations))
        .route("/:farm_id/stats", get(handlers::farm_stats))
        .route("/:farm_id/calculations", get(handlers::calculation_history))
        .route(
            "/:farm_id/records",
            get(handlers::list_records).post(handlers::create_record),
        )
        .route(
            "/:farm_id/sessions",
            get(handlers::list_sessions).post(handlers::start_session),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
}

fn calculator_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/", post(handlers::calculator::calculate))
        .route("/preview", get(handlers::calculator::preview))
        .route("/options", get(handlers::calculator::options))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
}

/// Survey session routes (protected)
fn session_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/:session_id",
            get(handlers::get_session).delete(handlers::delete_session),
        )
        .route("/:session_id/active", get(handlers::active_session))
        .route("/:session_id/finish", post(handlers::finish_session))
        .route("/:session_id/abandon", post(handlers::abandon_session))
        .route("/:session_id/export.csv", get(handlers::export_session_csv))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
}

fn observation_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/", post(handlers::create_observation))
        .route("/draft", post(handlers::autosave_observation))
        .route(
            "/:observation_id/images",
            post(handlers::upload_observation_images)
                .layer(DefaultBodyLimit::max(MAX_UPLOAD_BODY_BYTES)),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
}

fn dashboard_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::get_dashboard))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
}

fn record_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::session_records))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
}
