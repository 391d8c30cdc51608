//! Checkout saga log and inventory ledger models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Lifecycle of one order placement attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckoutStatus {
    /// Placement in progress (or crashed mid-way)
    Open,
    /// Order persisted and cart cleared
    Completed,
    /// Stopped on an unavailable line; earlier decrements still applied
    Aborted,
    /// Aborted and every applied decrement reversed
    Compensated,
}

impl std::fmt::Display for CheckoutStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckoutStatus::Open => write!(f, "open"),
            CheckoutStatus::Completed => write!(f, "completed"),
            CheckoutStatus::Aborted => write!(f, "aborted"),
            CheckoutStatus::Compensated => write!(f, "compensated"),
        }
    }
}

impl std::str::FromStr for CheckoutStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "open" => Ok(CheckoutStatus::Open),
            "completed" => Ok(CheckoutStatus::Completed),
            "aborted" => Ok(CheckoutStatus::Aborted),
            "compensated" => Ok(CheckoutStatus::Compensated),
            _ => Err(format!("Unknown checkout status: {}", s)),
        }
    }
}

impl From<String> for CheckoutStatus {
    fn from(s: String) -> Self {
        s.parse().unwrap_or(CheckoutStatus::Open)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Checkout {
    pub id: String,
    pub user_id: String,
    pub status: String,
    pub order_id: Option<String>,
    pub failure: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Checkout {
    pub fn status_enum(&self) -> CheckoutStatus {
        CheckoutStatus::from(self.status.clone())
    }
}

/// Why stock moved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdjustmentReason {
    Sale,
    Cancellation,
    Restock,
    Compensation,
}

impl std::fmt::Display for AdjustmentReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AdjustmentReason::Sale => write!(f, "sale"),
            AdjustmentReason::Cancellation => write!(f, "cancellation"),
            AdjustmentReason::Restock => write!(f, "restock"),
            AdjustmentReason::Compensation => write!(f, "compensation"),
        }
    }
}

/// Ledger row written for every inventory adjustment
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct InventoryAdjustment {
    pub id: i64,
    pub product_id: String,
    pub requested_delta: i64,
    pub applied_delta: i64,
    pub quantity_after: i64,
    pub reason: String,
    pub checkout_id: Option<String>,
    pub order_id: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutDetail {
    #[serde(flatten)]
    pub checkout: Checkout,
    pub adjustments: Vec<InventoryAdjustment>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CheckoutQuery {
    pub status: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}
