//! Availability predicate and the single stock mutation primitive.
//!
//! After a product is created, `adjust` is the only code path that writes
//! `products.quantity`. Each call runs in its own SQLite transaction and
//! leaves a row in `inventory_adjustments`.

use serde::Serialize;
use tracing::debug;

use super::Result;
use crate::api::metrics::record_inventory_adjustment;
use crate::db::{self, AdjustmentReason, DbPool, InventoryAdjustment, Product, ProductStatus};

/// Whether `requested` units of a product may be bought.
///
/// Inactive, draft and archived products are never available. Products that
/// do not track inventory are always available while active.
pub fn is_available(
    status: ProductStatus,
    track_inventory: bool,
    quantity: i64,
    requested: i64,
) -> bool {
    status == ProductStatus::Active && (!track_inventory || quantity >= requested)
}

/// Outcome of one `adjust` call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockChange {
    pub tracked: bool,
    pub before: i64,
    pub after: i64,
    pub requested_delta: i64,
    pub applied_delta: i64,
}

/// Units of a decrement that were swallowed by the floor at zero.
///
/// A later blind restock of the full requested amount overstates stock by
/// exactly this much.
pub fn clamp_loss(change: &StockChange) -> i64 {
    if change.tracked && change.requested_delta < 0 {
        change.applied_delta - change.requested_delta
    } else {
        0
    }
}

/// Saga references recorded on the ledger row
#[derive(Debug, Clone, Copy, Default)]
pub struct LedgerRef<'a> {
    pub checkout_id: Option<&'a str>,
    pub order_id: Option<&'a str>,
}

pub async fn find_product(db: &DbPool, product_id: &str) -> Result<Option<Product>> {
    let product = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = ?")
        .bind(product_id)
        .fetch_optional(db)
        .await?;
    Ok(product)
}

/// Add `delta` units (negative to remove) to a product's stock.
///
/// Tracked products end at `max(0, quantity + delta)`; untracked products keep
/// their quantity. Returns `None` when the product no longer exists.
pub async fn adjust(
    db: &DbPool,
    product_id: &str,
    delta: i64,
    reason: AdjustmentReason,
    refs: LedgerRef<'_>,
) -> Result<Option<StockChange>> {
    let mut tx = db.begin().await?;

    let row: Option<(i64, bool)> =
        sqlx::query_as("SELECT quantity, track_inventory FROM products WHERE id = ?")
            .bind(product_id)
            .fetch_optional(&mut *tx)
            .await?;

    let Some((before, tracked)) = row else {
        debug!(product_id = %product_id, "Skipping adjustment for missing product");
        return Ok(None);
    };

    let after = if tracked { (before + delta).max(0) } else { before };
    let now = db::now();

    sqlx::query("UPDATE products SET quantity = ?, updated_at = ? WHERE id = ?")
        .bind(after)
        .bind(&now)
        .bind(product_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query(
        r#"INSERT INTO inventory_adjustments
           (product_id, requested_delta, applied_delta, quantity_after, reason, checkout_id, order_id, created_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(product_id)
    .bind(delta)
    .bind(after - before)
    .bind(after)
    .bind(reason.to_string())
    .bind(refs.checkout_id)
    .bind(refs.order_id)
    .bind(&now)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    record_inventory_adjustment(reason);

    let change = StockChange {
        tracked,
        before,
        after,
        requested_delta: delta,
        applied_delta: after - before,
    };

    if clamp_loss(&change) > 0 {
        tracing::warn!(
            product_id = %product_id,
            requested = delta,
            applied = change.applied_delta,
            "Stock decrement clamped at zero"
        );
    }

    Ok(Some(change))
}

/// Ledger rows written on behalf of one checkout, oldest first
pub async fn ledger_for_checkout(
    db: &DbPool,
    checkout_id: &str,
) -> Result<Vec<InventoryAdjustment>> {
    let rows = sqlx::query_as::<_, InventoryAdjustment>(
        "SELECT * FROM inventory_adjustments WHERE checkout_id = ? ORDER BY id",
    )
    .bind(checkout_id)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commerce::testing;

    #[test]
    fn test_inactive_never_available() {
        for status in [
            ProductStatus::Inactive,
            ProductStatus::Draft,
            ProductStatus::Archived,
        ] {
            assert!(!is_available(status, true, 1_000, 1));
            assert!(!is_available(status, false, 1_000, 1));
        }
    }

    #[test]
    fn test_untracked_always_available_when_active() {
        assert!(is_available(ProductStatus::Active, false, 0, 50));
        assert!(is_available(ProductStatus::Active, false, -3, 1));
    }

    #[test]
    fn test_tracked_requires_quantity() {
        assert!(is_available(ProductStatus::Active, true, 3, 3));
        assert!(!is_available(ProductStatus::Active, true, 2, 3));
    }

    #[test]
    fn test_clamp_loss() {
        let clamped = StockChange {
            tracked: true,
            before: 2,
            after: 0,
            requested_delta: -5,
            applied_delta: -2,
        };
        assert_eq!(clamp_loss(&clamped), 3);

        let exact = StockChange {
            tracked: true,
            before: 5,
            after: 0,
            requested_delta: -5,
            applied_delta: -5,
        };
        assert_eq!(clamp_loss(&exact), 0);

        let untracked = StockChange {
            tracked: false,
            before: 0,
            after: 0,
            requested_delta: -5,
            applied_delta: 0,
        };
        assert_eq!(clamp_loss(&untracked), 0);
    }

    #[tokio::test]
    async fn test_adjust_floors_at_zero_and_records_ledger() {
        let pool = testing::pool().await;
        let id = testing::product(&pool, "Kettle", 30.0, 2).await;

        let change = adjust(&pool, &id, -5, AdjustmentReason::Sale, LedgerRef::default())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(change.after, 0);
        assert_eq!(change.applied_delta, -2);
        assert_eq!(testing::quantity(&pool, &id).await, 0);

        let (requested, applied, reason): (i64, i64, String) = sqlx::query_as(
            "SELECT requested_delta, applied_delta, reason FROM inventory_adjustments WHERE product_id = ?",
        )
        .bind(&id)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!((requested, applied, reason.as_str()), (-5, -2, "sale"));
    }

    #[tokio::test]
    async fn test_adjust_untracked_is_noop() {
        let pool = testing::pool().await;
        let id = testing::product_with(&pool, "E-book", 5.0, 7, false, "active").await;

        let change = adjust(&pool, &id, -3, AdjustmentReason::Sale, LedgerRef::default())
            .await
            .unwrap()
            .unwrap();
        assert!(!change.tracked);
        assert_eq!(change.applied_delta, 0);
        assert_eq!(testing::quantity(&pool, &id).await, 7);
    }

    #[tokio::test]
    async fn test_adjust_missing_product() {
        let pool = testing::pool().await;
        let change = adjust(
            &pool,
            "does-not-exist",
            4,
            AdjustmentReason::Restock,
            LedgerRef::default(),
        )
        .await
        .unwrap();
        assert!(change.is_none());
    }
}
