pub mod auth;
mod error;
mod excel;
mod products;
mod profile;
mod programs;
pub mod session;
mod users;
mod validation;

pub use error::ApiError;

use axum::{
    http::{header, HeaderValue, Method},
    middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Auth routes (public, except validate-password)
    let auth_routes = Router::new()
        .route("/signup", post(auth::signup))
        .route("/login", post(auth::login))
        .route("/forgot-password", post(auth::forgot_password))
        .route("/reset-password", post(auth::reset_password))
        .merge(
            Router::new()
                .route("/validate-password", post(auth::validate_password))
                .layer(middleware::from_fn_with_state(
                    state.clone(),
                    auth::auth_middleware,
                )),
        );

    // Admin-only routes; the role gate runs after the auth layer below
    let admin_routes = Router::new()
        .route("/users", get(users::list_users))
        .layer(middleware::from_fn(auth::admin_middleware));

    // Protected API routes
    let api_routes = Router::new()
        .merge(admin_routes)
        // Users
        .route("/users/update-profile", put(users::update_profile))
        .route(
            "/users/:id",
            get(users::get_user).delete(users::delete_user),
        )
        // Profile
        .route(
            "/profile",
            get(profile::get_profile).put(profile::update_profile),
        )
        .route("/upload", post(profile::upload_photo))
        // Product catalog
        .route(
            "/productos",
            get(products::list_products).post(products::create_product),
        )
        .route(
            "/productos/categorias",
            get(products::list_categories).post(products::create_category),
        )
        .route(
            "/productos/categorias/:id",
            put(products::update_category).delete(products::delete_category),
        )
        .route("/productos/export-excel", get(excel::export_excel))
        .route(
            "/productos/import-excel",
            get(excel::import_excel_get).post(excel::import_excel),
        )
        .route("/productos/buscar/:codigo", get(products::get_product_by_code))
        .route("/productos/actualizar-stock", put(products::update_stock))
        .route(
            "/productos/:id",
            get(products::get_product)
                .put(products::update_product)
                .delete(products::delete_product),
        )
        // Programs
        .route("/programs/start", post(programs::start_program))
        .route("/programs/active", get(programs::active_programs))
        // Protected by auth
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/auth", auth_routes)
        .nest("/api", api_routes)
        .layer(cors_layer(&state.config))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(config: &Config) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    match config.server.frontend_url.parse::<HeaderValue>() {
        Ok(origin) => layer.allow_origin(origin),
        Err(_) => {
            tracing::warn!(
                frontend_url = %config.server.frontend_url,
                "Invalid frontend_url, allowing any origin"
            );
            layer.allow_origin(Any)
        }
    }
}

async fn health_check() -> &'static str {
    "OK"
}
