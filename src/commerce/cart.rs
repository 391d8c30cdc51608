//! Per-user carts.
//!
//! Lines are kept in insertion order. A line may outlive its product; readers
//! see `product: None` for it and checkout skips it.

use tracing::debug;

use super::inventory::find_product;
use super::{CommerceError, Result};
use crate::db::{self, CartItem, CartLineResponse, DbPool, GuestCartLine, Product};

#[derive(Debug, Clone)]
pub struct CartLine {
    pub item: CartItem,
    pub product: Option<Product>,
}

impl From<CartLine> for CartLineResponse {
    fn from(line: CartLine) -> Self {
        Self {
            product_id: line.item.product_id,
            quantity: line.item.quantity,
            product: line.product.map(Into::into),
            added_at: line.item.added_at,
        }
    }
}

/// A user's cart lines with their live products
pub async fn load_cart(db: &DbPool, user_id: &str) -> Result<Vec<CartLine>> {
    let items = sqlx::query_as::<_, CartItem>(
        "SELECT * FROM cart_items WHERE user_id = ? ORDER BY id",
    )
    .bind(user_id)
    .fetch_all(db)
    .await?;

    let mut lines = Vec::with_capacity(items.len());
    for item in items {
        let product = find_product(db, &item.product_id).await?;
        lines.push(CartLine { item, product });
    }
    Ok(lines)
}

/// Add to an existing line or append a new one
async fn upsert_line(db: &DbPool, user_id: &str, product_id: &str, quantity: i64) -> Result<()> {
    sqlx::query(
        r#"INSERT INTO cart_items (user_id, product_id, quantity, added_at)
           VALUES (?, ?, ?, ?)
           ON CONFLICT(user_id, product_id) DO UPDATE SET quantity = quantity + excluded.quantity"#,
    )
    .bind(user_id)
    .bind(product_id)
    .bind(quantity)
    .bind(db::now())
    .execute(db)
    .await?;
    Ok(())
}

/// Add `quantity` units of a product.
///
/// Only the requested quantity is checked against stock, not the resulting
/// line total.
pub async fn add_item(db: &DbPool, user_id: &str, product_id: &str, quantity: i64) -> Result<()> {
    let available = find_product(db, product_id)
        .await?
        .map(|p| p.is_available(quantity))
        .unwrap_or(false);

    if !available {
        return Err(CommerceError::Unavailable(
            "Product not available or insufficient stock",
        ));
    }

    upsert_line(db, user_id, product_id, quantity).await
}

/// Set a line's quantity; zero removes it
pub async fn update_item(
    db: &DbPool,
    user_id: &str,
    product_id: &str,
    quantity: i64,
) -> Result<()> {
    let exists: Option<i64> =
        sqlx::query_scalar("SELECT id FROM cart_items WHERE user_id = ? AND product_id = ?")
            .bind(user_id)
            .bind(product_id)
            .fetch_optional(db)
            .await?;

    if exists.is_none() {
        return Err(CommerceError::NotFound("Item in cart"));
    }

    if quantity == 0 {
        return remove_item(db, user_id, product_id).await;
    }

    let available = find_product(db, product_id)
        .await?
        .map(|p| p.is_available(quantity))
        .unwrap_or(false);

    if !available {
        return Err(CommerceError::Unavailable("Insufficient stock"));
    }

    sqlx::query("UPDATE cart_items SET quantity = ? WHERE user_id = ? AND product_id = ?")
        .bind(quantity)
        .bind(user_id)
        .bind(product_id)
        .execute(db)
        .await?;
    Ok(())
}

pub async fn remove_item(db: &DbPool, user_id: &str, product_id: &str) -> Result<()> {
    sqlx::query("DELETE FROM cart_items WHERE user_id = ? AND product_id = ?")
        .bind(user_id)
        .bind(product_id)
        .execute(db)
        .await?;
    Ok(())
}

pub async fn clear_cart(db: &DbPool, user_id: &str) -> Result<()> {
    sqlx::query("DELETE FROM cart_items WHERE user_id = ?")
        .bind(user_id)
        .execute(db)
        .await?;
    Ok(())
}

/// Fold an anonymous session's cart into the user's cart.
///
/// Lines for missing or unavailable products are dropped. Each line is
/// written on its own, so a failure leaves earlier lines merged. Returns the
/// number of lines merged.
pub async fn merge_guest_cart(
    db: &DbPool,
    user_id: &str,
    lines: &[GuestCartLine],
) -> Result<usize> {
    let mut merged = 0;

    for line in lines {
        if line.quantity < 1 {
            debug!(product_id = %line.product_id, "Dropping guest line with non-positive quantity");
            continue;
        }

        let available = find_product(db, &line.product_id)
            .await?
            .map(|p| p.is_available(line.quantity))
            .unwrap_or(false);

        if !available {
            debug!(product_id = %line.product_id, "Dropping unavailable guest line");
            continue;
        }

        upsert_line(db, user_id, &line.product_id, line.quantity).await?;
        merged += 1;
    }

    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commerce::testing;

    #[tokio::test]
    async fn test_add_accumulates_in_insertion_order() {
        let pool = testing::pool().await;
        let user = testing::user(&pool, "cart@example.com").await;
        let a = testing::product(&pool, "A", 10.0, 10).await;
        let b = testing::product(&pool, "B", 20.0, 10).await;

        add_item(&pool, &user, &b, 1).await.unwrap();
        add_item(&pool, &user, &a, 2).await.unwrap();
        add_item(&pool, &user, &b, 3).await.unwrap();

        let cart = load_cart(&pool, &user).await.unwrap();
        assert_eq!(cart.len(), 2);
        assert_eq!(cart[0].item.product_id, b);
        assert_eq!(cart[0].item.quantity, 4);
        assert_eq!(cart[1].item.product_id, a);
    }

    #[tokio::test]
    async fn test_add_rejects_unavailable() {
        let pool = testing::pool().await;
        let user = testing::user(&pool, "cart@example.com").await;
        let low = testing::product(&pool, "Low", 10.0, 1).await;
        let draft = testing::product_with(&pool, "Draft", 10.0, 50, true, "draft").await;

        assert!(matches!(
            add_item(&pool, &user, &low, 2).await,
            Err(CommerceError::Unavailable(_))
        ));
        assert!(matches!(
            add_item(&pool, &user, &draft, 1).await,
            Err(CommerceError::Unavailable(_))
        ));
        assert!(matches!(
            add_item(&pool, &user, "missing", 1).await,
            Err(CommerceError::Unavailable(_))
        ));
        assert!(load_cart(&pool, &user).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_zero_removes_and_missing_line_is_not_found() {
        let pool = testing::pool().await;
        let user = testing::user(&pool, "cart@example.com").await;
        let a = testing::product(&pool, "A", 10.0, 5).await;

        assert!(matches!(
            update_item(&pool, &user, &a, 1).await,
            Err(CommerceError::NotFound(_))
        ));

        add_item(&pool, &user, &a, 1).await.unwrap();
        update_item(&pool, &user, &a, 5).await.unwrap();
        assert_eq!(load_cart(&pool, &user).await.unwrap()[0].item.quantity, 5);

        assert!(matches!(
            update_item(&pool, &user, &a, 6).await,
            Err(CommerceError::Unavailable(_))
        ));

        update_item(&pool, &user, &a, 0).await.unwrap();
        assert!(load_cart(&pool, &user).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_deleted_product_line_survives_with_no_product() {
        let pool = testing::pool().await;
        let user = testing::user(&pool, "cart@example.com").await;
        let a = testing::product(&pool, "A", 10.0, 5).await;

        add_item(&pool, &user, &a, 1).await.unwrap();
        testing::delete_product(&pool, &a).await;

        let cart = load_cart(&pool, &user).await.unwrap();
        assert_eq!(cart.len(), 1);
        assert!(cart[0].product.is_none());
    }

    #[tokio::test]
    async fn test_merge_drops_out_of_stock_lines() {
        let pool = testing::pool().await;
        let user = testing::user(&pool, "merge@example.com").await;
        let in_stock = testing::product(&pool, "In", 10.0, 10).await;
        let sold_out = testing::product(&pool, "Out", 10.0, 0).await;
        let owned = testing::product(&pool, "Owned", 10.0, 10).await;

        add_item(&pool, &user, &owned, 1).await.unwrap();

        let guest = vec![
            GuestCartLine {
                product_id: sold_out.clone(),
                quantity: 1,
            },
            GuestCartLine {
                product_id: in_stock.clone(),
                quantity: 2,
            },
            GuestCartLine {
                product_id: owned.clone(),
                quantity: 3,
            },
            GuestCartLine {
                product_id: "ghost".to_string(),
                quantity: 1,
            },
        ];

        let merged = merge_guest_cart(&pool, &user, &guest).await.unwrap();
        assert_eq!(merged, 2);

        let cart = load_cart(&pool, &user).await.unwrap();
        let quantities: Vec<(String, i64)> = cart
            .into_iter()
            .map(|l| (l.item.product_id, l.item.quantity))
            .collect();
        assert_eq!(quantities, vec![(owned, 4), (in_stock, 2)]);
    }
}
