//! services/api/src/web/rest.rs
//!
//! Assembles the REST routes and holds the master definition for the OpenAPI
//! document.

use crate::web::{
    auth::{self, AuthResponse, LoginRequest, SignupRequest},
    cart::{self, CheckoutRequest},
    middleware::require_auth,
    preferences, recipes,
    reminders::{self, NewReminderType, ParseRequest, ReminderView, SnoozeRequest},
    state::AppState,
    ws_handler::ws_handler,
};
use axum::{
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{delete, get, patch, post},
    Router,
};
use std::sync::Arc;
use tower_http::services::ServeDir;
use utoipa::OpenApi;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::signup_handler,
        auth::login_handler,
        auth::logout_handler,
        reminders::list_reminders_handler,
        reminders::create_reminder_handler,
        reminders::update_reminder_handler,
        reminders::delete_reminder_handler,
        reminders::complete_reminder_handler,
        reminders::snooze_reminder_handler,
        reminders::parse_reminder_handler,
        reminders::list_reminder_types_handler,
        reminders::add_reminder_type_handler,
        reminders::delete_reminder_type_handler,
        cart::get_cart_handler,
        cart::clear_cart_handler,
        cart::add_cart_item_handler,
        cart::update_cart_item_handler,
        cart::remove_cart_item_handler,
        cart::checkout_handler,
        cart::list_orders_handler,
        recipes::generate_recipe_handler,
        recipes::list_recipes_handler,
        recipes::save_recipe_handler,
        recipes::delete_recipe_handler,
        recipes::recommend_vendors_handler,
        preferences::get_preferences_handler,
        preferences::update_preferences_handler,
        preferences::upload_avatar_handler,
    ),
    components(
        schemas(
            SignupRequest,
            LoginRequest,
            AuthResponse,
            ReminderView,
            SnoozeRequest,
            ParseRequest,
            NewReminderType,
            CheckoutRequest,
        )
    ),
    tags(
        (name = "Reminders API", description = "Reminders, recurring events, the cart and the AI assistant.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// Router
//=========================================================================================

const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Builds every route of the API. CORS and the docs UI are layered on by the binary.
pub fn router(app_state: Arc<AppState>) -> Router {
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/auth/signup", post(auth::signup_handler))
        .route("/auth/login", post(auth::login_handler))
        .route("/auth/logout", post(auth::logout_handler));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route(
            "/reminders",
            get(reminders::list_reminders_handler).post(reminders::create_reminder_handler),
        )
        .route("/reminders/parse", post(reminders::parse_reminder_handler))
        .route(
            "/reminders/{id}",
            patch(reminders::update_reminder_handler).delete(reminders::delete_reminder_handler),
        )
        .route("/reminders/{id}/complete", post(reminders::complete_reminder_handler))
        .route("/reminders/{id}/snooze", post(reminders::snooze_reminder_handler))
        .route(
            "/reminder-types",
            get(reminders::list_reminder_types_handler).post(reminders::add_reminder_type_handler),
        )
        .route("/reminder-types/{id}", delete(reminders::delete_reminder_type_handler))
        .route("/cart", get(cart::get_cart_handler).delete(cart::clear_cart_handler))
        .route("/cart/items", post(cart::add_cart_item_handler))
        .route(
            "/cart/items/{id}",
            patch(cart::update_cart_item_handler).delete(cart::remove_cart_item_handler),
        )
        .route("/cart/checkout", post(cart::checkout_handler))
        .route("/orders", get(cart::list_orders_handler))
        .route("/recipes/generate", post(recipes::generate_recipe_handler))
        .route(
            "/recipes",
            get(recipes::list_recipes_handler).post(recipes::save_recipe_handler),
        )
        .route("/recipes/{id}", delete(recipes::delete_recipe_handler))
        .route("/vendors/recommend", post(recipes::recommend_vendors_handler))
        .route(
            "/preferences",
            get(preferences::get_preferences_handler).put(preferences::update_preferences_handler),
        )
        .route("/preferences/avatar", post(preferences::upload_avatar_handler))
        .route("/ws", get(ws_handler))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ));

    let avatars = ServeDir::new(&app_state.config.avatar_dir);

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .nest_service("/avatars", avatars)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(app_state)
}
