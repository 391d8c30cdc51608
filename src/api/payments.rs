//! Razorpay checkout endpoints.

use axum::extract::State;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::auth::AuthUser;
use super::error::{ApiError, ValidationErrorBuilder};
use super::response::ApiResponse;
use super::validation::JsonBody;
use crate::commerce::checkout;
use crate::db::{self, to_json_column, PaymentStatus};
use crate::payments::GatewayOrderRequest;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreatePaymentOrderRequest {
    pub amount: Option<f64>,
    pub currency: Option<String>,
    pub receipt: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct VerifyPaymentRequest {
    #[serde(default)]
    pub razorpay_order_id: String,
    #[serde(default)]
    pub razorpay_payment_id: String,
    #[serde(default)]
    pub razorpay_signature: String,
    #[serde(rename = "orderId", default, skip_serializing)]
    pub order_id: Option<String>,
}

/// POST /api/payments/razorpay/order
pub async fn create_razorpay_order(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    JsonBody(request): JsonBody<CreatePaymentOrderRequest>,
) -> Result<ApiResponse, ApiError> {
    let amount = match request.amount {
        Some(amount) if amount > 0.0 && amount.is_finite() => amount,
        _ => {
            return Err(ApiError::validation_field(
                "amount",
                "Amount must be greater than 0",
            ))
        }
    };

    let gateway_request = GatewayOrderRequest {
        amount,
        currency: request
            .currency
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| state.config.payments.currency.clone()),
        receipt: request
            .receipt
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| format!("receipt_{}", chrono::Utc::now().timestamp_millis())),
    };

    let order = state
        .payments
        .create_order(gateway_request)
        .await
        .map_err(|e| {
            tracing::error!(user_id = %user.id, "Razorpay order creation failed: {:#}", e);
            ApiError::dependency("Failed to create payment order")
        })?;

    tracing::info!(user_id = %user.id, gateway_order = %order.id, "Payment order created");
    Ok(ApiResponse::ok().with("order", order))
}

/// POST /api/payments/razorpay/verify
pub async fn verify_razorpay_payment(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    JsonBody(request): JsonBody<VerifyPaymentRequest>,
) -> Result<ApiResponse, ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    if request.razorpay_order_id.is_empty() {
        errors.add("razorpay_order_id", "Razorpay order ID is required");
    }
    if request.razorpay_payment_id.is_empty() {
        errors.add("razorpay_payment_id", "Razorpay payment ID is required");
    }
    if request.razorpay_signature.is_empty() {
        errors.add("razorpay_signature", "Razorpay signature is required");
    }
    errors.finish()?;

    let verified = state.payments.verify_payment(
        &request.razorpay_order_id,
        &request.razorpay_payment_id,
        &request.razorpay_signature,
    );
    if !verified {
        tracing::warn!(
            user_id = %user.id,
            gateway_order = %request.razorpay_order_id,
            "Payment signature mismatch"
        );
        return Err(ApiError::bad_request("Payment verification failed"));
    }

    let order_id = request.order_id.as_deref().filter(|id| !id.is_empty());
    let order = match order_id {
        Some(id) => checkout::find_order(&state.db, id).await?,
        None => None,
    };
    if order.is_none() && order_id.is_some() {
        // Valid signature with nothing local to update
        tracing::warn!(
            order_id = ?order_id,
            gateway_order = %request.razorpay_order_id,
            "Verified payment for unknown order"
        );
    }

    if let Some(order) = order {
        let order_id = order.id.as_str();
        if order.user_id != user.id && !user.is_admin() {
            return Err(ApiError::forbidden("Access denied"));
        }

        sqlx::query(
            "UPDATE orders SET payment_status = ?, payment_details = ?, updated_at = ? WHERE id = ?",
        )
        .bind(PaymentStatus::Completed.to_string())
        .bind(to_json_column(&request))
        .bind(db::now())
        .bind(order_id)
        .execute(&state.db)
        .await?;

        tracing::info!(order_id = %order_id, "Order payment completed");
    }

    Ok(ApiResponse::ok().message("Payment verified successfully"))
}
