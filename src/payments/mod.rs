//! Payment gateway integration.
//!
//! Only Razorpay is wired up: the gateway creates a provider-side order and,
//! after checkout, the client posts back the provider's ids and signature,
//! which we check with HMAC-SHA256 over `order_id|payment_id`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::config::PaymentsConfig;

type HmacSha256 = Hmac<Sha256>;

/// Provider order creation request, amount in major units (rupees)
#[derive(Debug, Clone)]
pub struct GatewayOrderRequest {
    pub amount: f64,
    pub currency: String,
    pub receipt: String,
}

#[derive(Debug, Serialize)]
struct RazorpayOrderBody<'a> {
    amount: i64,
    currency: &'a str,
    receipt: &'a str,
}

/// Provider order as returned by the gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    #[serde(default)]
    pub receipt: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_order(&self, request: GatewayOrderRequest) -> Result<GatewayOrder>;

    /// Check the signature the provider handed to the client
    fn verify_payment(&self, order_id: &str, payment_id: &str, signature: &str) -> bool;
}

/// Convert major units to the smallest currency unit
pub fn to_minor_units(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

/// HMAC-SHA256 of `order_id|payment_id`, hex encoded, compared in constant time
pub fn verify_razorpay_signature(
    secret: &str,
    order_id: &str,
    payment_id: &str,
    signature: &str,
) -> bool {
    let expected = match hex::decode(signature) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };

    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(m) => m,
        Err(_) => return false,
    };
    mac.update(order_id.as_bytes());
    mac.update(b"|");
    mac.update(payment_id.as_bytes());

    mac.verify_slice(&expected).is_ok()
}

pub struct RazorpayClient {
    key_id: Option<String>,
    key_secret: Option<String>,
    api_base: String,
    client: reqwest::Client,
}

impl RazorpayClient {
    pub fn new(config: &PaymentsConfig) -> Self {
        Self {
            key_id: config.razorpay_key_id.clone(),
            key_secret: config.razorpay_key_secret.clone(),
            api_base: config.razorpay_api_base.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl PaymentGateway for RazorpayClient {
    async fn create_order(&self, request: GatewayOrderRequest) -> Result<GatewayOrder> {
        let (key_id, key_secret) = match (&self.key_id, &self.key_secret) {
            (Some(id), Some(secret)) => (id, secret),
            _ => anyhow::bail!("Razorpay credentials not configured"),
        };

        let body = RazorpayOrderBody {
            amount: to_minor_units(request.amount),
            currency: &request.currency,
            receipt: &request.receipt,
        };

        let response = self
            .client
            .post(format!("{}/orders", self.api_base))
            .basic_auth(key_id, Some(key_secret))
            .json(&body)
            .send()
            .await
            .context("Failed to reach Razorpay")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Razorpay API error: {} - {}", status, body);
        }

        response
            .json()
            .await
            .context("Failed to parse Razorpay order response")
    }

    fn verify_payment(&self, order_id: &str, payment_id: &str, signature: &str) -> bool {
        match &self.key_secret {
            Some(secret) => verify_razorpay_signature(secret, order_id, payment_id, signature),
            None => {
                tracing::warn!("Razorpay secret not configured, rejecting payment verification");
                false
            }
        }
    }
}
