//! Customer order endpoints.

use axum::extract::{Path, Query, State};
use std::sync::Arc;

use super::auth::AuthUser;
use super::error::{ApiError, ValidationErrorBuilder};
use super::response::ApiResponse;
use super::validation::{validate_address, validate_max_len, validate_payment_method, JsonBody};
use crate::commerce::checkout::{self, PlaceOrder};
use crate::db::{Order, OrderResponse, PageQuery, Pagination, PlaceOrderRequest};
use crate::AppState;

const DEFAULT_PAGE_SIZE: i64 = 10;

fn validate_place_order(request: PlaceOrderRequest) -> Result<PlaceOrder, ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    validate_address(&request.shipping_address, "shippingAddress", &mut errors);
    if let Some(billing) = &request.billing_address {
        validate_address(billing, "billingAddress", &mut errors);
    }
    if let Some(notes) = &request.notes {
        errors.check("notes", validate_max_len(notes, 500, "Notes"));
    }

    let payment_method = match validate_payment_method(&request.payment_method) {
        Ok(method) => Some(method),
        Err(e) => {
            errors.add("paymentMethod", e);
            None
        }
    };

    errors.finish()?;
    let payment_method =
        payment_method.ok_or_else(|| ApiError::validation_field("paymentMethod", "Invalid payment method"))?;

    Ok(PlaceOrder {
        shipping_address: request.shipping_address.normalized(),
        billing_address: request.billing_address.map(|a| a.normalized()),
        payment_method,
        notes: request.notes,
    })
}

/// POST /api/orders - place an order from the caller's cart
pub async fn create_order(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    JsonBody(request): JsonBody<PlaceOrderRequest>,
) -> Result<ApiResponse, ApiError> {
    let input = validate_place_order(request)?;
    let order = checkout::place_order(&state.db, &state.config.checkout, &user.id, input).await?;

    Ok(ApiResponse::created()
        .message("Order created successfully")
        .with("order", order))
}

/// GET /api/orders - the caller's orders, newest first
pub async fn list_orders(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Query(query): Query<PageQuery>,
) -> Result<ApiResponse, ApiError> {
    let (page, limit) = query.resolve(DEFAULT_PAGE_SIZE);

    let orders: Vec<Order> = sqlx::query_as(
        "SELECT * FROM orders WHERE user_id = ? ORDER BY created_at DESC LIMIT ? OFFSET ?",
    )
    .bind(&user.id)
    .bind(limit)
    .bind(Pagination::offset(page, limit))
    .fetch_all(&state.db)
    .await?;

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE user_id = ?")
        .bind(&user.id)
        .fetch_one(&state.db)
        .await?;

    let mut responses: Vec<OrderResponse> = Vec::with_capacity(orders.len());
    for order in orders {
        responses.push(checkout::with_items(&state.db, order).await?);
    }

    Ok(ApiResponse::ok()
        .with("orders", responses)
        .with("pagination", Pagination::new(page, limit, total)))
}

/// GET /api/orders/:id - owner or admin
pub async fn get_order(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<ApiResponse, ApiError> {
    let order = checkout::load_order(&state.db, &id)
        .await?
        .ok_or_else(|| ApiError::not_found("Order not found"))?;

    if order.user != user.id && !user.is_admin() {
        return Err(ApiError::forbidden("Access denied"));
    }

    Ok(ApiResponse::ok().with("order", order))
}

/// PUT /api/orders/:id/cancel
pub async fn cancel_order(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<ApiResponse, ApiError> {
    let order = checkout::cancel_order(&state.db, &user.id, &id).await?;

    Ok(ApiResponse::ok()
        .message("Order cancelled successfully")
        .with("order", order))
}
