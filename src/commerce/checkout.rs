//! Order placement and cancellation.
//!
//! Placement walks the cart in order, decrementing stock line by line as it
//! goes, so a stock failure on line N leaves lines 1..N-1 decremented. Every
//! attempt is recorded in `checkouts` and every stock move carries the
//! checkout id in the ledger, which is enough to undo an aborted attempt
//! later with [`compensate_checkout`]. With `checkout.compensate_on_failure`
//! set, that undo happens immediately.
//!
//! Availability checks and decrements are separate statements. Two concurrent
//! checkouts can both pass the check and oversell; the decrement then clamps
//! at zero and the ledger records the shortfall.

use tracing::{error, info, warn};

use super::cart;
use super::inventory::{self, LedgerRef};
use super::pricing::{generate_order_number, OrderTotals};
use super::{CommerceError, Result};
use crate::api::metrics::{record_order_cancelled, record_order_failed, record_order_placed};
use crate::config::CheckoutConfig;
use crate::db::{
    self, Address, AdjustmentReason, Checkout, CheckoutDetail, CheckoutStatus, DbPool, Order,
    OrderItem, OrderResponse, OrderStatus, PaymentMethod,
};

/// Validated order placement input
#[derive(Debug, Clone)]
pub struct PlaceOrder {
    pub shipping_address: Address,
    pub billing_address: Option<Address>,
    pub payment_method: PaymentMethod,
    pub notes: Option<String>,
}

/// Line-item snapshot taken before the order row exists
struct Snapshot {
    product_id: String,
    name: String,
    price: f64,
    quantity: i64,
    image: Option<String>,
    total: f64,
}

/// Turn the user's cart into an order.
pub async fn place_order(
    db: &DbPool,
    config: &CheckoutConfig,
    user_id: &str,
    input: PlaceOrder,
) -> Result<OrderResponse> {
    let lines = cart::load_cart(db, user_id).await?;
    if lines.is_empty() {
        return Err(CommerceError::EmptyCart);
    }

    let checkout_id = open_checkout(db, user_id).await?;

    match run_placement(db, config, user_id, &checkout_id, lines, input).await {
        Ok(order) => {
            record_order_placed();
            info!(
                order_id = %order.id,
                order_number = %order.order_number,
                total = order.total,
                "Order placed"
            );
            Ok(order)
        }
        Err(err) => {
            record_order_failed();
            if let Err(e) = fail_checkout(db, config, &checkout_id, &err).await {
                error!(checkout_id = %checkout_id, error = %e, "Failed to record aborted checkout");
            }
            Err(err)
        }
    }
}

async fn open_checkout(db: &DbPool, user_id: &str) -> Result<String> {
    let id = uuid::Uuid::new_v4().to_string();
    let now = db::now();
    sqlx::query(
        "INSERT INTO checkouts (id, user_id, status, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(user_id)
    .bind(CheckoutStatus::Open.to_string())
    .bind(&now)
    .bind(&now)
    .execute(db)
    .await?;
    Ok(id)
}

async fn run_placement(
    db: &DbPool,
    config: &CheckoutConfig,
    user_id: &str,
    checkout_id: &str,
    lines: Vec<cart::CartLine>,
    input: PlaceOrder,
) -> Result<OrderResponse> {
    let refs = LedgerRef {
        checkout_id: Some(checkout_id),
        order_id: None,
    };

    let mut subtotal = 0.0;
    let mut snapshots = Vec::with_capacity(lines.len());

    for line in lines {
        let quantity = line.item.quantity;
        let Some(product) = line.product else {
            warn!(
                checkout_id = %checkout_id,
                product_id = %line.item.product_id,
                "Skipping cart line for deleted product"
            );
            continue;
        };

        if !product.is_available(quantity) {
            return Err(CommerceError::InsufficientStock {
                product: product.name,
            });
        }

        let total = product.price * quantity as f64;
        subtotal += total;
        snapshots.push(Snapshot {
            product_id: product.id.clone(),
            image: product.primary_image().map(|img| img.url),
            name: product.name.clone(),
            price: product.price,
            quantity,
            total,
        });

        inventory::adjust(db, &product.id, -quantity, AdjustmentReason::Sale, refs).await?;
    }

    let totals = OrderTotals::compute(subtotal, config);
    let shipping = input.shipping_address.normalized();
    let billing = input
        .billing_address
        .map(|a| a.normalized())
        .unwrap_or_else(|| shipping.clone());

    let order_id = uuid::Uuid::new_v4().to_string();
    let order_number = generate_order_number();
    let now = db::now();

    let mut tx = db.begin().await?;

    sqlx::query(
        r#"INSERT INTO orders
           (id, order_number, user_id, shipping_address, billing_address, payment_method,
            payment_status, order_status, subtotal, tax, shipping, discount, total, notes,
            created_at, updated_at)
           VALUES (?, ?, ?, ?, ?, ?, 'pending', 'pending', ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&order_id)
    .bind(&order_number)
    .bind(user_id)
    .bind(db::to_json_column(&shipping))
    .bind(db::to_json_column(&billing))
    .bind(input.payment_method.to_string())
    .bind(totals.subtotal)
    .bind(totals.tax)
    .bind(totals.shipping)
    .bind(totals.discount)
    .bind(totals.total)
    .bind(&input.notes)
    .bind(&now)
    .bind(&now)
    .execute(&mut *tx)
    .await?;

    for item in &snapshots {
        sqlx::query(
            r#"INSERT INTO order_items (order_id, product_id, name, price, quantity, image, total)
               VALUES (?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&order_id)
        .bind(&item.product_id)
        .bind(&item.name)
        .bind(item.price)
        .bind(item.quantity)
        .bind(&item.image)
        .bind(item.total)
        .execute(&mut *tx)
        .await?;
    }

    // The order, the cleared cart and the completed checkout commit together
    sqlx::query("DELETE FROM cart_items WHERE user_id = ?")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("UPDATE inventory_adjustments SET order_id = ? WHERE checkout_id = ?")
        .bind(&order_id)
        .bind(checkout_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("UPDATE checkouts SET status = ?, order_id = ?, updated_at = ? WHERE id = ?")
        .bind(CheckoutStatus::Completed.to_string())
        .bind(&order_id)
        .bind(db::now())
        .bind(checkout_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    load_order(db, &order_id)
        .await?
        .ok_or(CommerceError::NotFound("Order"))
}

async fn fail_checkout(
    db: &DbPool,
    config: &CheckoutConfig,
    checkout_id: &str,
    reason: &CommerceError,
) -> Result<()> {
    // Only an attempt that never produced an order can abort
    let aborted = sqlx::query(
        r#"UPDATE checkouts SET status = ?, failure = ?, updated_at = ?
           WHERE id = ? AND status = ? AND order_id IS NULL"#,
    )
    .bind(CheckoutStatus::Aborted.to_string())
    .bind(reason.to_string())
    .bind(db::now())
    .bind(checkout_id)
    .bind(CheckoutStatus::Open.to_string())
    .execute(db)
    .await?
    .rows_affected();

    if aborted == 0 {
        warn!(checkout_id = %checkout_id, reason = %reason, "Checkout already settled, not aborting");
        return Ok(());
    }

    warn!(checkout_id = %checkout_id, reason = %reason, "Checkout aborted");

    if config.compensate_on_failure {
        compensate_checkout(db, checkout_id).await?;
    }
    Ok(())
}

/// Reverse every stock decrement an aborted checkout applied.
///
/// The checkout is claimed by flipping `aborted` to `compensated` before any
/// stock moves, so a checkout is never compensated twice. Checkouts linked to
/// an order are never compensable.
pub async fn compensate_checkout(db: &DbPool, checkout_id: &str) -> Result<CheckoutDetail> {
    let claimed = sqlx::query(
        r#"UPDATE checkouts SET status = ?, updated_at = ?
           WHERE id = ? AND status = ? AND order_id IS NULL"#,
    )
    .bind(CheckoutStatus::Compensated.to_string())
    .bind(db::now())
    .bind(checkout_id)
    .bind(CheckoutStatus::Aborted.to_string())
    .execute(db)
    .await?
    .rows_affected();

    if claimed == 0 {
        let checkout = find_checkout(db, checkout_id)
            .await?
            .ok_or(CommerceError::NotFound("Checkout"))?;
        return Err(CommerceError::NotCompensable {
            status: checkout.status_enum(),
        });
    }

    let refs = LedgerRef {
        checkout_id: Some(checkout_id),
        order_id: None,
    };

    let sales = inventory::ledger_for_checkout(db, checkout_id).await?;
    let mut restored = 0;
    for entry in sales
        .iter()
        .filter(|e| e.reason == AdjustmentReason::Sale.to_string() && e.applied_delta != 0)
    {
        inventory::adjust(
            db,
            &entry.product_id,
            -entry.applied_delta,
            AdjustmentReason::Compensation,
            refs,
        )
        .await?;
        restored += 1;
    }

    info!(checkout_id = %checkout_id, lines = restored, "Checkout compensated");

    get_checkout(db, checkout_id).await
}

/// Cancel one of the caller's orders and put its stock back.
///
/// Restock re-adds the ordered quantity even if the original decrement was
/// clamped at zero.
pub async fn cancel_order(db: &DbPool, user_id: &str, order_id: &str) -> Result<OrderResponse> {
    let order = find_order(db, order_id)
        .await?
        .ok_or(CommerceError::NotFound("Order"))?;

    if order.user_id != user_id {
        return Err(CommerceError::Forbidden);
    }

    let status = order.status_enum();
    if !status.is_cancellable() {
        return Err(CommerceError::NotCancellable { status });
    }

    // Conditional on the status so two concurrent cancels restock once
    let updated = sqlx::query(
        r#"UPDATE orders SET order_status = 'cancelled', updated_at = ?
           WHERE id = ? AND order_status IN ('pending', 'confirmed')"#,
    )
    .bind(db::now())
    .bind(order_id)
    .execute(db)
    .await?
    .rows_affected();

    if updated == 0 {
        let current = find_order(db, order_id)
            .await?
            .map(|o| o.status_enum())
            .unwrap_or(OrderStatus::Cancelled);
        return Err(CommerceError::NotCancellable { status: current });
    }

    let refs = LedgerRef {
        checkout_id: None,
        order_id: Some(order_id),
    };
    for item in order_items(db, order_id).await? {
        inventory::adjust(
            db,
            &item.product_id,
            item.quantity,
            AdjustmentReason::Cancellation,
            refs,
        )
        .await?;
    }

    record_order_cancelled();
    info!(order_id = %order_id, "Order cancelled");

    load_order(db, order_id)
        .await?
        .ok_or(CommerceError::NotFound("Order"))
}

pub async fn find_order(db: &DbPool, order_id: &str) -> Result<Option<Order>> {
    let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = ?")
        .bind(order_id)
        .fetch_optional(db)
        .await?;
    Ok(order)
}

pub async fn order_items(db: &DbPool, order_id: &str) -> Result<Vec<OrderItem>> {
    let items =
        sqlx::query_as::<_, OrderItem>("SELECT * FROM order_items WHERE order_id = ? ORDER BY id")
            .bind(order_id)
            .fetch_all(db)
            .await?;
    Ok(items)
}

/// Order with its line items
pub async fn load_order(db: &DbPool, order_id: &str) -> Result<Option<OrderResponse>> {
    match find_order(db, order_id).await? {
        Some(order) => Ok(Some(with_items(db, order).await?)),
        None => Ok(None),
    }
}

pub async fn with_items(db: &DbPool, order: Order) -> Result<OrderResponse> {
    let items = order_items(db, &order.id).await?;
    Ok(OrderResponse::new(order, items))
}

pub async fn find_checkout(db: &DbPool, checkout_id: &str) -> Result<Option<Checkout>> {
    let checkout = sqlx::query_as::<_, Checkout>("SELECT * FROM checkouts WHERE id = ?")
        .bind(checkout_id)
        .fetch_optional(db)
        .await?;
    Ok(checkout)
}

/// Checkout with its ledger entries
pub async fn get_checkout(db: &DbPool, checkout_id: &str) -> Result<CheckoutDetail> {
    let checkout = find_checkout(db, checkout_id)
        .await?
        .ok_or(CommerceError::NotFound("Checkout"))?;
    let adjustments = inventory::ledger_for_checkout(db, checkout_id).await?;
    Ok(CheckoutDetail {
        checkout,
        adjustments,
    })
}

/// Placement attempts, newest first, optionally filtered by status
pub async fn list_checkouts(
    db: &DbPool,
    status: Option<CheckoutStatus>,
    limit: i64,
    offset: i64,
) -> Result<(Vec<Checkout>, i64)> {
    let status = status.map(|s| s.to_string());

    let checkouts = sqlx::query_as::<_, Checkout>(
        r#"SELECT * FROM checkouts WHERE (? IS NULL OR status = ?)
           ORDER BY created_at DESC LIMIT ? OFFSET ?"#,
    )
    .bind(&status)
    .bind(&status)
    .bind(limit)
    .bind(offset)
    .fetch_all(db)
    .await?;

    let total: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM checkouts WHERE (? IS NULL OR status = ?)")
            .bind(&status)
            .bind(&status)
            .fetch_one(db)
            .await?;

    Ok((checkouts, total))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commerce::testing;

    fn address() -> Address {
        Address {
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            email: "ada@example.com".to_string(),
            phone: "5550100".to_string(),
            address: "1 Analytical Way".to_string(),
            city: "London".to_string(),
            state: "LDN".to_string(),
            zip_code: "00001".to_string(),
            country: String::new(),
        }
    }

    fn input() -> PlaceOrder {
        PlaceOrder {
            shipping_address: address(),
            billing_address: None,
            payment_method: PaymentMethod::Card,
            notes: None,
        }
    }

    async fn cart_size(pool: &DbPool, user: &str) -> usize {
        cart::load_cart(pool, user).await.unwrap().len()
    }

    #[tokio::test]
    async fn test_empty_cart_is_rejected() {
        let pool = testing::pool().await;
        let user = testing::user(&pool, "empty@example.com").await;

        let err = place_order(&pool, &CheckoutConfig::default(), &user, input())
            .await
            .unwrap_err();
        assert!(matches!(err, CommerceError::EmptyCart));

        let (checkouts, _) = list_checkouts(&pool, None, 10, 0).await.unwrap();
        assert!(checkouts.is_empty());
    }

    #[tokio::test]
    async fn test_places_every_line_and_clears_cart() {
        let pool = testing::pool().await;
        let user = testing::user(&pool, "buyer@example.com").await;
        let a = testing::product(&pool, "A", 100.0, 5).await;
        let b = testing::product(&pool, "B", 50.0, 3).await;
        let c = testing::product(&pool, "C", 25.0, 10).await;

        cart::add_item(&pool, &user, &a, 2).await.unwrap();
        cart::add_item(&pool, &user, &b, 3).await.unwrap();
        cart::add_item(&pool, &user, &c, 1).await.unwrap();

        let order = place_order(&pool, &CheckoutConfig::default(), &user, input())
            .await
            .unwrap();

        assert_eq!(order.items.len(), 3);
        assert_eq!(order.items[0].name, "A");
        assert_eq!(order.items[0].image.as_deref(), Some("A.jpg"));
        assert_eq!(order.subtotal, 375.0);
        assert_eq!(order.tax, 30.0);
        assert_eq!(order.shipping, 40.0);
        assert_eq!(order.total, 445.0);
        assert_eq!(order.order_status, OrderStatus::Pending);
        assert_eq!(order.shipping_address.country, "USA");
        assert_eq!(order.billing_address, Some(order.shipping_address.clone()));

        assert_eq!(cart_size(&pool, &user).await, 0);
        assert_eq!(testing::quantity(&pool, &a).await, 3);
        assert_eq!(testing::quantity(&pool, &b).await, 0);
        assert_eq!(testing::quantity(&pool, &c).await, 9);

        let (checkouts, _) = list_checkouts(&pool, Some(CheckoutStatus::Completed), 10, 0)
            .await
            .unwrap();
        assert_eq!(checkouts.len(), 1);
        assert_eq!(checkouts[0].order_id.as_deref(), Some(order.id.as_str()));
    }

    #[tokio::test]
    async fn test_single_line_totals() {
        let pool = testing::pool().await;
        let user = testing::user(&pool, "buyer@example.com").await;
        let a = testing::product(&pool, "A", 100.0, 5).await;
        cart::add_item(&pool, &user, &a, 2).await.unwrap();

        let order = place_order(&pool, &CheckoutConfig::default(), &user, input())
            .await
            .unwrap();
        assert_eq!(order.subtotal, 200.0);
        assert_eq!(order.tax, 16.0);
        assert_eq!(order.shipping, 40.0);
        assert_eq!(order.total, 256.0);
    }

    #[tokio::test]
    async fn test_insufficient_stock_keeps_earlier_decrements() {
        let pool = testing::pool().await;
        let user = testing::user(&pool, "buyer@example.com").await;
        let first = testing::product(&pool, "First", 10.0, 5).await;
        let scarce = testing::product(&pool, "Scarce", 10.0, 3).await;

        cart::add_item(&pool, &user, &first, 2).await.unwrap();
        cart::add_item(&pool, &user, &scarce, 3).await.unwrap();
        sqlx::query("UPDATE products SET quantity = 2 WHERE id = ?")
            .bind(&scarce)
            .execute(&pool)
            .await
            .unwrap();

        let err = place_order(&pool, &CheckoutConfig::default(), &user, input())
            .await
            .unwrap_err();
        match err {
            CommerceError::InsufficientStock { product } => assert_eq!(product, "Scarce"),
            other => panic!("unexpected error: {other:?}"),
        }

        assert_eq!(testing::quantity(&pool, &first).await, 3);
        assert_eq!(testing::quantity(&pool, &scarce).await, 2);
        assert_eq!(cart_size(&pool, &user).await, 2);

        let orders: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(orders, 0);

        let (aborted, _) = list_checkouts(&pool, Some(CheckoutStatus::Aborted), 10, 0)
            .await
            .unwrap();
        assert_eq!(aborted.len(), 1);
        assert!(aborted[0].failure.as_deref().unwrap().contains("Scarce"));

        // Repair afterwards through the ledger
        let detail = compensate_checkout(&pool, &aborted[0].id).await.unwrap();
        assert_eq!(detail.checkout.status_enum(), CheckoutStatus::Compensated);
        assert_eq!(testing::quantity(&pool, &first).await, 5);

        let again = compensate_checkout(&pool, &aborted[0].id).await.unwrap_err();
        assert!(matches!(again, CommerceError::NotCompensable { .. }));
        assert_eq!(testing::quantity(&pool, &first).await, 5);
    }

    #[tokio::test]
    async fn test_compensate_on_failure_restores_immediately() {
        let pool = testing::pool().await;
        let user = testing::user(&pool, "buyer@example.com").await;
        let first = testing::product(&pool, "First", 10.0, 5).await;
        let gone = testing::product_with(&pool, "Gone", 10.0, 5, true, "active").await;

        cart::add_item(&pool, &user, &first, 4).await.unwrap();
        cart::add_item(&pool, &user, &gone, 1).await.unwrap();
        sqlx::query("UPDATE products SET status = 'archived' WHERE id = ?")
            .bind(&gone)
            .execute(&pool)
            .await
            .unwrap();

        let config = CheckoutConfig {
            compensate_on_failure: true,
            ..Default::default()
        };
        let err = place_order(&pool, &config, &user, input()).await.unwrap_err();
        assert!(matches!(err, CommerceError::InsufficientStock { .. }));

        assert_eq!(testing::quantity(&pool, &first).await, 5);
        let (compensated, _) = list_checkouts(&pool, Some(CheckoutStatus::Compensated), 10, 0)
            .await
            .unwrap();
        assert_eq!(compensated.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_completion_rolls_back_order() {
        let pool = testing::pool().await;
        let user = testing::user(&pool, "buyer@example.com").await;
        let a = testing::product(&pool, "A", 10.0, 5).await;
        cart::add_item(&pool, &user, &a, 2).await.unwrap();

        sqlx::query(
            r#"CREATE TRIGGER reject_completion BEFORE UPDATE ON checkouts
               WHEN NEW.status = 'completed'
               BEGIN SELECT RAISE(ABORT, 'completion rejected'); END"#,
        )
        .execute(&pool)
        .await
        .unwrap();

        let config = CheckoutConfig {
            compensate_on_failure: true,
            ..Default::default()
        };
        let err = place_order(&pool, &config, &user, input()).await.unwrap_err();
        assert!(matches!(err, CommerceError::Database(_)));

        let orders: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(orders, 0);
        assert_eq!(cart_size(&pool, &user).await, 1);
        assert_eq!(testing::quantity(&pool, &a).await, 5);

        let (compensated, _) = list_checkouts(&pool, Some(CheckoutStatus::Compensated), 10, 0)
            .await
            .unwrap();
        assert_eq!(compensated.len(), 1);
        assert!(compensated[0].order_id.is_none());
    }

    #[tokio::test]
    async fn test_checkout_with_order_is_never_compensated() {
        let pool = testing::pool().await;
        let user = testing::user(&pool, "buyer@example.com").await;
        let a = testing::product(&pool, "A", 10.0, 5).await;
        cart::add_item(&pool, &user, &a, 2).await.unwrap();

        let order = place_order(&pool, &CheckoutConfig::default(), &user, input())
            .await
            .unwrap();
        let (checkouts, _) = list_checkouts(&pool, None, 10, 0).await.unwrap();
        let checkout_id = checkouts[0].id.clone();

        // Even if the row is forced back to aborted, the linked order blocks the undo
        sqlx::query("UPDATE checkouts SET status = 'aborted' WHERE id = ?")
            .bind(&checkout_id)
            .execute(&pool)
            .await
            .unwrap();

        let err = compensate_checkout(&pool, &checkout_id).await.unwrap_err();
        assert!(matches!(err, CommerceError::NotCompensable { .. }));
        assert_eq!(testing::quantity(&pool, &a).await, 3);

        cancel_order(&pool, &user, &order.id).await.unwrap();
        assert_eq!(testing::quantity(&pool, &a).await, 5);
    }

    #[tokio::test]
    async fn test_deleted_product_lines_are_skipped() {
        let pool = testing::pool().await;
        let user = testing::user(&pool, "buyer@example.com").await;
        let kept = testing::product(&pool, "Kept", 100.0, 5).await;
        let removed = testing::product(&pool, "Removed", 100.0, 5).await;

        cart::add_item(&pool, &user, &removed, 1).await.unwrap();
        cart::add_item(&pool, &user, &kept, 1).await.unwrap();
        testing::delete_product(&pool, &removed).await;

        let order = place_order(&pool, &CheckoutConfig::default(), &user, input())
            .await
            .unwrap();
        assert_eq!(order.items.len(), 1);
        assert_eq!(order.items[0].product_id, kept);
        assert_eq!(cart_size(&pool, &user).await, 0);
    }

    #[tokio::test]
    async fn test_cancel_pending_restores_stock() {
        let pool = testing::pool().await;
        let user = testing::user(&pool, "buyer@example.com").await;
        let a = testing::product(&pool, "A", 300.0, 4).await;
        let b = testing::product(&pool, "B", 300.0, 2).await;
        cart::add_item(&pool, &user, &a, 1).await.unwrap();
        cart::add_item(&pool, &user, &b, 2).await.unwrap();

        let order = place_order(&pool, &CheckoutConfig::default(), &user, input())
            .await
            .unwrap();
        assert_eq!(order.shipping, 0.0);
        assert_eq!(order.total, 900.0 + 72.0);

        let cancelled = cancel_order(&pool, &user, &order.id).await.unwrap();
        assert_eq!(cancelled.order_status, OrderStatus::Cancelled);
        assert_eq!(testing::quantity(&pool, &a).await, 4);
        assert_eq!(testing::quantity(&pool, &b).await, 2);

        let twice = cancel_order(&pool, &user, &order.id).await.unwrap_err();
        assert!(matches!(
            twice,
            CommerceError::NotCancellable {
                status: OrderStatus::Cancelled
            }
        ));
        assert_eq!(testing::quantity(&pool, &a).await, 4);
    }

    #[tokio::test]
    async fn test_cancel_shipped_is_rejected() {
        let pool = testing::pool().await;
        let user = testing::user(&pool, "buyer@example.com").await;
        let a = testing::product(&pool, "A", 10.0, 4).await;
        cart::add_item(&pool, &user, &a, 1).await.unwrap();

        let order = place_order(&pool, &CheckoutConfig::default(), &user, input())
            .await
            .unwrap();
        sqlx::query("UPDATE orders SET order_status = 'shipped' WHERE id = ?")
            .bind(&order.id)
            .execute(&pool)
            .await
            .unwrap();

        let err = cancel_order(&pool, &user, &order.id).await.unwrap_err();
        assert!(matches!(
            err,
            CommerceError::NotCancellable {
                status: OrderStatus::Shipped
            }
        ));

        let current = find_order(&pool, &order.id).await.unwrap().unwrap();
        assert_eq!(current.status_enum(), OrderStatus::Shipped);
        assert_eq!(testing::quantity(&pool, &a).await, 3);
    }

    #[tokio::test]
    async fn test_cancel_requires_owner() {
        let pool = testing::pool().await;
        let owner = testing::user(&pool, "owner@example.com").await;
        let other = testing::user(&pool, "other@example.com").await;
        let a = testing::product(&pool, "A", 10.0, 4).await;
        cart::add_item(&pool, &owner, &a, 1).await.unwrap();

        let order = place_order(&pool, &CheckoutConfig::default(), &owner, input())
            .await
            .unwrap();

        assert!(matches!(
            cancel_order(&pool, &other, &order.id).await,
            Err(CommerceError::Forbidden)
        ));
        assert!(matches!(
            cancel_order(&pool, &owner, "missing").await,
            Err(CommerceError::NotFound("Order"))
        ));
    }
}
