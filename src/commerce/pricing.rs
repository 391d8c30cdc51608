//! Order totals and order numbers.

use rand::Rng;
use serde::Serialize;

use crate::config::CheckoutConfig;

const BASE36: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Money columns of an order, computed once at placement
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OrderTotals {
    pub subtotal: f64,
    pub tax: f64,
    pub shipping: f64,
    pub discount: f64,
    pub total: f64,
}

impl OrderTotals {
    pub fn compute(subtotal: f64, config: &CheckoutConfig) -> Self {
        let tax = round2(subtotal * config.tax_rate);
        let shipping = if subtotal > config.free_shipping_threshold {
            0.0
        } else {
            config.shipping_fee
        };
        let discount = 0.0;

        Self {
            subtotal,
            tax,
            shipping,
            discount,
            total: subtotal + tax + shipping - discount,
        }
    }
}

/// Round to cents
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// `ORD-` + last six digits of the epoch millis + three random base-36 chars.
///
/// Collisions are possible and surface as a unique-index violation.
pub fn generate_order_number() -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let mut rng = rand::rng();
    let suffix: String = (0..3)
        .map(|_| BASE36[rng.random_range(0..BASE36.len())] as char)
        .collect();
    format!("ORD-{:06}{}", millis.rem_euclid(1_000_000), suffix)
}
