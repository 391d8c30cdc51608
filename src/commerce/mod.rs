//! Order workflow: availability, stock adjustments, pricing, carts and checkout.
//!
//! Handlers in `api` validate input and then call into these modules; nothing
//! here knows about HTTP.

pub mod cart;
pub mod checkout;
pub mod inventory;
pub mod pricing;

use thiserror::Error;

use crate::db::{CheckoutStatus, OrderStatus};

/// Business-rule failures raised by the order workflow
#[derive(Debug, Error)]
pub enum CommerceError {
    #[error("Cart is empty")]
    EmptyCart,

    #[error("Insufficient stock for {product}")]
    InsufficientStock { product: String },

    /// A cart write asked for more than the product can supply
    #[error("{0}")]
    Unavailable(&'static str),

    #[error("Order cannot be cancelled at this stage (status: {status})")]
    NotCancellable { status: OrderStatus },

    #[error("Checkout cannot be compensated (status: {status})")]
    NotCompensable { status: CheckoutStatus },

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Access denied")]
    Forbidden,

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, CommerceError>;
