//! services/api/src/web/cart.rs
//!
//! REST handlers for the cart, checkout and the order history.

use crate::error::HttpResult;
use crate::web::state::AppState;
use crate::web::workspace::UserWorkspace;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use reminders_core::cart::{AddOutcome, CartItem, CartItemUpdate, CartLine, Order};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

//=========================================================================================
// Request/Response Types
//=========================================================================================

/// The cart as the client renders it.
#[derive(Debug, Serialize)]
pub struct CartView {
    pub lines: Vec<CartLine>,
    pub total: f64,
}

impl CartView {
    fn of(ws: &UserWorkspace) -> Self {
        Self {
            lines: ws.cart.lines().to_vec(),
            total: ws.cart.total(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AddItemResponse {
    #[serde(flatten)]
    pub outcome: AddOutcome,
    pub cart: CartView,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct CheckoutRequest {
    /// Links the order to one of the user's reminders, e.g. the birthday it is for.
    #[serde(default)]
    pub reminder_id: Option<String>,
    /// Sent again unchanged when a checkout is retried, so the order is placed once.
    #[serde(default)]
    pub idempotency_key: Option<Uuid>,
}

//=========================================================================================
// Handlers
//=========================================================================================

/// GET /cart
#[utoipa::path(
    get,
    path = "/cart",
    responses((status = 200, description = "The cart lines and their total"))
)]
pub async fn get_cart_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> HttpResult<Json<CartView>> {
    let workspace = state.workspace(user_id).await?;
    let ws = workspace.lock().await;
    Ok(Json(CartView::of(&ws)))
}

/// DELETE /cart - Remove every line
#[utoipa::path(
    delete,
    path = "/cart",
    responses((status = 204, description = "Cart emptied"))
)]
pub async fn clear_cart_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> HttpResult<StatusCode> {
    let workspace = state.workspace(user_id).await?;
    let mut ws = workspace.lock().await;
    ws.clear_cart(state.db.as_ref()).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /cart/items - Add an item, merging it with an identical line
#[utoipa::path(
    post,
    path = "/cart/items",
    request_body(content_type = "application/json", description = "A cart item tagged by `type`: service, prepared_dish, ingredients, chef_service or vendor_product."),
    responses(
        (status = 200, description = "`added`, `merged` or `ignored`, with the resulting cart")
    )
)]
pub async fn add_cart_item_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(item): Json<CartItem>,
) -> HttpResult<Json<AddItemResponse>> {
    let workspace = state.workspace(user_id).await?;
    let mut ws = workspace.lock().await;
    let outcome = ws
        .add_to_cart(state.db.as_ref(), item, state.clock.now())
        .await?;
    Ok(Json(AddItemResponse {
        outcome,
        cart: CartView::of(&ws),
    }))
}

/// PATCH /cart/items/{id} - Change quantity, vendor or price; quantity 0 removes the line
#[utoipa::path(
    patch,
    path = "/cart/items/{id}",
    params(("id" = Uuid, Path, description = "Cart line id")),
    request_body(content_type = "application/json", description = "Any of quantity, vendor and price."),
    responses(
        (status = 200, description = "The resulting cart"),
        (status = 404, description = "Unknown cart line")
    )
)]
pub async fn update_cart_item_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(line_id): Path<Uuid>,
    Json(update): Json<CartItemUpdate>,
) -> HttpResult<Json<CartView>> {
    let workspace = state.workspace(user_id).await?;
    let mut ws = workspace.lock().await;
    ws.update_cart_item(state.db.as_ref(), line_id, &update).await?;
    Ok(Json(CartView::of(&ws)))
}

/// DELETE /cart/items/{id}
#[utoipa::path(
    delete,
    path = "/cart/items/{id}",
    params(("id" = Uuid, Path, description = "Cart line id")),
    responses(
        (status = 200, description = "The resulting cart"),
        (status = 404, description = "Unknown cart line")
    )
)]
pub async fn remove_cart_item_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(line_id): Path<Uuid>,
) -> HttpResult<Json<CartView>> {
    let workspace = state.workspace(user_id).await?;
    let mut ws = workspace.lock().await;
    ws.remove_cart_item(state.db.as_ref(), line_id).await?;
    Ok(Json(CartView::of(&ws)))
}

/// POST /cart/checkout - Turn the cart into an order
#[utoipa::path(
    post,
    path = "/cart/checkout",
    request_body = CheckoutRequest,
    responses(
        (status = 201, description = "The new order"),
        (status = 400, description = "The cart is empty"),
        (status = 404, description = "Unknown reminder to link")
    )
)]
pub async fn checkout_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(req): Json<CheckoutRequest>,
) -> HttpResult<impl IntoResponse> {
    let workspace = state.workspace(user_id).await?;
    let mut ws = workspace.lock().await;
    let order = ws
        .checkout(
            state.db.as_ref(),
            req.reminder_id,
            req.idempotency_key,
            state.clock.now(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// GET /orders - Order history, newest first
#[utoipa::path(
    get,
    path = "/orders",
    responses((status = 200, description = "Past orders"))
)]
pub async fn list_orders_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> HttpResult<Json<Vec<Order>>> {
    let workspace = state.workspace(user_id).await?;
    let ws = workspace.lock().await;
    Ok(Json(ws.cart.orders().to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn add_response_flattens_the_outcome() {
        let line_id = Uuid::nil();
        let response = AddItemResponse {
            outcome: AddOutcome::Merged(line_id),
            cart: CartView {
                lines: Vec::new(),
                total: 0.0,
            },
        };
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["outcome"], json!("merged"));
        assert_eq!(value["line_id"], json!(line_id));
        assert_eq!(value["cart"]["total"], json!(0.0));
    }
}
