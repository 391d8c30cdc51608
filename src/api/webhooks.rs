//! Payment provider webhooks.
//!
//! Events are logged and acknowledged; order state is driven by the Razorpay
//! verify endpoint, not by these callbacks.

use axum::{body::Bytes, http::HeaderMap, Json};
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Deserialize)]
struct StripeEvent {
    #[serde(rename = "type")]
    event_type: Option<String>,
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PayPalEvent {
    event_type: Option<String>,
    id: Option<String>,
}

fn parse<T: for<'de> Deserialize<'de>>(provider: &str, body: &[u8]) -> Option<T> {
    match serde_json::from_slice(body) {
        Ok(event) => Some(event),
        Err(e) => {
            tracing::warn!(provider, "Unparseable webhook payload: {}", e);
            None
        }
    }
}

fn received() -> Json<Value> {
    Json(json!({ "received": true }))
}

/// POST /api/webhooks/stripe
pub async fn stripe_webhook(headers: HeaderMap, body: Bytes) -> Json<Value> {
    let signed = headers.contains_key("stripe-signature");

    if let Some(event) = parse::<StripeEvent>("stripe", &body) {
        tracing::info!(
            event_type = event.event_type.as_deref().unwrap_or("unknown"),
            event_id = event.id.as_deref().unwrap_or("-"),
            signed,
            "Stripe webhook received"
        );
    }

    received()
}

/// POST /api/webhooks/paypal
pub async fn paypal_webhook(headers: HeaderMap, body: Bytes) -> Json<Value> {
    let signed = headers.contains_key("paypal-transmission-sig");

    if let Some(event) = parse::<PayPalEvent>("paypal", &body) {
        tracing::info!(
            event_type = event.event_type.as_deref().unwrap_or("unknown"),
            event_id = event.id.as_deref().unwrap_or("-"),
            signed,
            "PayPal webhook received"
        );
    }

    received()
}
