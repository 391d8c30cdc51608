//! Cart endpoints. Every write replies with the full cart.

use axum::extract::{Path, State};
use std::sync::Arc;

use super::auth::AuthUser;
use super::error::{ApiError, ValidationErrorBuilder};
use super::response::ApiResponse;
use super::validation::{validate_uuid, JsonBody};
use crate::commerce::cart;
use crate::db::{AddToCartRequest, CartLineResponse, DbPool, MergeCartRequest, UpdateCartRequest};
use crate::AppState;

async fn cart_payload(db: &DbPool, user_id: &str) -> Result<Vec<CartLineResponse>, ApiError> {
    Ok(cart::load_cart(db, user_id)
        .await?
        .into_iter()
        .map(CartLineResponse::from)
        .collect())
}

pub async fn get_cart(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> Result<ApiResponse, ApiError> {
    let cart = cart_payload(&state.db, &user.id).await?;
    Ok(ApiResponse::ok().with("cart", cart))
}

pub async fn add_to_cart(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    JsonBody(request): JsonBody<AddToCartRequest>,
) -> Result<ApiResponse, ApiError> {
    let quantity = request.quantity.unwrap_or(1);

    let mut errors = ValidationErrorBuilder::new();
    errors.check(
        "productId",
        validate_uuid(&request.product_id, "product ID")
            .map_err(|_| "Invalid product ID".to_string()),
    );
    if quantity < 1 {
        errors.add("quantity", "Quantity must be at least 1");
    }
    errors.finish()?;

    cart::add_item(&state.db, &user.id, &request.product_id, quantity).await?;

    let cart = cart_payload(&state.db, &user.id).await?;
    Ok(ApiResponse::ok()
        .message("Item added to cart")
        .with("cart", cart))
}

pub async fn update_cart_item(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(product_id): Path<String>,
    JsonBody(request): JsonBody<UpdateCartRequest>,
) -> Result<ApiResponse, ApiError> {
    let quantity = match request.quantity {
        Some(q) if q >= 0 => q,
        _ => {
            return Err(ApiError::validation_field(
                "quantity",
                "Quantity must be 0 or more",
            ))
        }
    };

    cart::update_item(&state.db, &user.id, &product_id, quantity).await?;

    let message = if quantity == 0 {
        "Item removed from cart"
    } else {
        "Cart updated"
    };
    let cart = cart_payload(&state.db, &user.id).await?;
    Ok(ApiResponse::ok().message(message).with("cart", cart))
}

pub async fn remove_cart_item(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(product_id): Path<String>,
) -> Result<ApiResponse, ApiError> {
    cart::remove_item(&state.db, &user.id, &product_id).await?;

    let cart = cart_payload(&state.db, &user.id).await?;
    Ok(ApiResponse::ok()
        .message("Item removed from cart")
        .with("cart", cart))
}

pub async fn clear_cart(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> Result<ApiResponse, ApiError> {
    cart::clear_cart(&state.db, &user.id).await?;
    Ok(ApiResponse::ok()
        .message("Cart cleared")
        .with("cart", Vec::<CartLineResponse>::new()))
}

/// POST /api/cart/merge - fold an anonymous session's cart into the user's
pub async fn merge_cart(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    JsonBody(request): JsonBody<MergeCartRequest>,
) -> Result<ApiResponse, ApiError> {
    let merged = cart::merge_guest_cart(&state.db, &user.id, &request.guest_cart).await?;
    tracing::debug!(
        user_id = %user.id,
        merged,
        offered = request.guest_cart.len(),
        "Guest cart merged"
    );

    let cart = cart_payload(&state.db, &user.id).await?;
    Ok(ApiResponse::ok()
        .message("Cart merged successfully")
        .with("cart", cart))
}
