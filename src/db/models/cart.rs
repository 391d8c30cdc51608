//! Cart and wishlist models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::product::ProductResponse;

/// One cart line; `id` preserves the order lines were added in
#[derive(Debug, Clone, FromRow)]
pub struct CartItem {
    pub id: i64,
    pub user_id: String,
    pub product_id: String,
    pub quantity: i64,
    pub added_at: String,
}

/// Cart line as returned to clients, with the live product when it still exists
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLineResponse {
    pub product_id: String,
    pub quantity: i64,
    pub product: Option<ProductResponse>,
    pub added_at: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddToCartRequest {
    #[serde(default)]
    pub product_id: String,
    pub quantity: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateCartRequest {
    pub quantity: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuestCartLine {
    pub product_id: String,
    pub quantity: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeCartRequest {
    #[serde(default)]
    pub guest_cart: Vec<GuestCartLine>,
}
