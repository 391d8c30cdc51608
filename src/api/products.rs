//! Catalog endpoints: public browsing, admin maintenance and reviews.

use axum::extract::{Path, Query, State};
use serde::Serialize;
use std::sync::Arc;

use super::auth::{AdminUser, AuthUser};
use super::error::{ApiError, ValidationErrorBuilder};
use super::response::ApiResponse;
use super::validation::{validate_max_len, validate_required, JsonBody};
use crate::commerce::inventory::find_product;
use crate::db::{
    self, CreateProductRequest, CreateReviewRequest, DbPool, NewProduct, PageQuery, Pagination,
    Product, ProductQuery, ProductResponse, ProductReview, ProductStatus, UpdateProductRequest,
};
use crate::AppState;

const DEFAULT_PAGE_SIZE: i64 = 12;

/// Typed value for a dynamically built WHERE clause
enum Param {
    Text(String),
    Real(f64),
}

/// ORDER BY clause for the `sort` query parameter; unknown values sort newest first
fn sort_clause(sort: Option<&str>) -> &'static str {
    match sort {
        Some("price_asc") | Some("price") => "price ASC, created_at DESC",
        Some("price_desc") | Some("-price") => "price DESC, created_at DESC",
        Some("rating") => "average_rating DESC, review_count DESC",
        Some("popular") => "sales_count DESC, view_count DESC",
        Some("name") => "name ASC",
        _ => "created_at DESC",
    }
}

fn validate_price(value: Option<f64>, field: &str, errors: &mut ValidationErrorBuilder) {
    if let Some(v) = value {
        if !v.is_finite() || v < 0.0 {
            errors.add(field, "Price cannot be negative");
        }
    }
}

fn validate_discount(value: Option<f64>, errors: &mut ValidationErrorBuilder) {
    if let Some(pct) = value {
        if !(0.0..=100.0).contains(&pct) {
            errors.add("discountPercentage", "Discount must be between 0 and 100");
        }
    }
}

fn validate_status(value: Option<&str>, errors: &mut ValidationErrorBuilder) {
    if let Some(status) = value {
        if status.parse::<ProductStatus>().is_err() {
            errors.add("status", "Invalid product status");
        }
    }
}

fn validate_create_request(req: &CreateProductRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    errors.check("name", validate_required(&req.name, "Product name is required"));
    errors.check("name", validate_max_len(req.name.trim(), 100, "Product name"));
    errors.check(
        "description",
        validate_required(&req.description, "Product description is required"),
    );
    errors.check(
        "description",
        validate_max_len(&req.description, 1000, "Description"),
    );
    errors.check(
        "category",
        validate_required(&req.category, "Product category is required"),
    );
    match req.price {
        Some(_) => validate_price(req.price, "price", &mut errors),
        None => {
            errors.add("price", "Product price is required");
        }
    }
    validate_price(req.original_price, "originalPrice", &mut errors);
    if req.inventory.quantity.is_some_and(|q| q < 0) {
        errors.add("inventory.quantity", "Quantity cannot be negative");
    }
    validate_discount(req.discount_percentage, &mut errors);
    validate_status(req.status.as_deref(), &mut errors);

    errors.finish()
}

fn validate_update_request(req: &UpdateProductRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    if let Some(name) = &req.name {
        errors.check("name", validate_required(name, "Product name is required"));
        errors.check("name", validate_max_len(name.trim(), 100, "Product name"));
    }
    if let Some(description) = &req.description {
        errors.check("description", validate_max_len(description, 1000, "Description"));
    }
    if let Some(category) = &req.category {
        errors.check(
            "category",
            validate_required(category, "Product category is required"),
        );
    }
    validate_price(req.price, "price", &mut errors);
    validate_price(req.original_price, "originalPrice", &mut errors);
    validate_discount(req.discount_percentage, &mut errors);
    validate_status(req.status.as_deref(), &mut errors);

    if req
        .inventory
        .as_ref()
        .is_some_and(|inventory| inventory.quantity.is_some())
    {
        errors.add(
            "inventory.quantity",
            "Stock cannot be set directly, use PUT /api/admin/products/:id/inventory",
        );
    }

    errors.finish()
}

async fn require_product(db: &DbPool, id: &str) -> Result<Product, ApiError> {
    find_product(db, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Product not found"))
}

/// GET /api/products - active catalog with filters and pagination
pub async fn list_products(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ProductQuery>,
) -> Result<ApiResponse, ApiError> {
    let (page, limit) = PageQuery {
        page: query.page,
        limit: query.limit,
    }
    .resolve(DEFAULT_PAGE_SIZE);

    let mut conditions = vec!["status = 'active'".to_string()];
    let mut params: Vec<Param> = Vec::new();

    if let Some(category) = query.category.as_deref().filter(|c| !c.is_empty()) {
        conditions.push("category = ?".to_string());
        params.push(Param::Text(category.to_string()));
    }
    if let Some(brand) = query.brand.as_deref().filter(|b| !b.is_empty()) {
        conditions.push("brand = ?".to_string());
        params.push(Param::Text(brand.to_string()));
    }
    if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        conditions.push("(name LIKE ? OR description LIKE ? OR tags LIKE ?)".to_string());
        let pattern = format!("%{}%", search);
        for _ in 0..3 {
            params.push(Param::Text(pattern.clone()));
        }
    }
    if let Some(min) = query.min_price {
        conditions.push("price >= ?".to_string());
        params.push(Param::Real(min));
    }
    if let Some(max) = query.max_price {
        conditions.push("price <= ?".to_string());
        params.push(Param::Real(max));
    }
    if let Some(featured) = query.featured {
        conditions.push(format!("featured = {}", i64::from(featured)));
    }

    let where_clause = format!("WHERE {}", conditions.join(" AND "));

    let count_sql = format!("SELECT COUNT(*) FROM products {}", where_clause);
    let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
    for param in &params {
        count_query = match param {
            Param::Text(v) => count_query.bind(v),
            Param::Real(v) => count_query.bind(v),
        };
    }
    let total = count_query.fetch_one(&state.db).await?;

    let sql = format!(
        "SELECT * FROM products {} ORDER BY {} LIMIT ? OFFSET ?",
        where_clause,
        sort_clause(query.sort.as_deref())
    );
    let mut list_query = sqlx::query_as::<_, Product>(&sql);
    for param in &params {
        list_query = match param {
            Param::Text(v) => list_query.bind(v),
            Param::Real(v) => list_query.bind(v),
        };
    }
    let products = list_query
        .bind(limit)
        .bind(Pagination::offset(page, limit))
        .fetch_all(&state.db)
        .await?;

    Ok(ApiResponse::ok()
        .with(
            "products",
            products
                .into_iter()
                .map(ProductResponse::from)
                .collect::<Vec<_>>(),
        )
        .with("pagination", Pagination::new(page, limit, total)))
}

/// GET /api/products/featured
pub async fn featured_products(
    State(state): State<Arc<AppState>>,
) -> Result<ApiResponse, ApiError> {
    let products: Vec<Product> = sqlx::query_as(
        "SELECT * FROM products WHERE status = 'active' AND featured = 1 ORDER BY created_at DESC LIMIT 8",
    )
    .fetch_all(&state.db)
    .await?;

    Ok(ApiResponse::ok().with(
        "products",
        products
            .into_iter()
            .map(ProductResponse::from)
            .collect::<Vec<_>>(),
    ))
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct CategoryCount {
    pub name: String,
    pub count: i64,
}

/// GET /api/products/categories
pub async fn list_categories(
    State(state): State<Arc<AppState>>,
) -> Result<ApiResponse, ApiError> {
    let categories: Vec<CategoryCount> = sqlx::query_as(
        r#"
        SELECT category AS name, COUNT(*) AS count
        FROM products
        WHERE status = 'active'
        GROUP BY category
        ORDER BY category
        "#,
    )
    .fetch_all(&state.db)
    .await?;

    Ok(ApiResponse::ok().with("categories", categories))
}

/// GET /api/products/:id - also counts the view
pub async fn get_product(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<ApiResponse, ApiError> {
    let result = sqlx::query("UPDATE products SET view_count = view_count + 1 WHERE id = ?")
        .bind(&id)
        .execute(&state.db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Product not found"));
    }

    let product = require_product(&state.db, &id).await?;
    let reviews: Vec<ProductReview> = sqlx::query_as(
        "SELECT * FROM product_reviews WHERE product_id = ? ORDER BY created_at DESC",
    )
    .bind(&id)
    .fetch_all(&state.db)
    .await?;

    Ok(ApiResponse::ok()
        .with("product", ProductResponse::from(product))
        .with("reviews", reviews))
}

pub async fn insert_product(db: &DbPool, product: &NewProduct) -> Result<(), sqlx::Error> {
    let now = db::now();
    sqlx::query(
        r#"
        INSERT INTO products (
            id, name, description, price, original_price, category, subcategory, brand,
            images, quantity, sku, track_inventory, shipping, seo_title, seo_description,
            slug, tags, attributes, variants, status, featured, on_sale, sale_start,
            sale_end, discount_percentage, created_by, created_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&product.id)
    .bind(&product.name)
    .bind(&product.description)
    .bind(product.price)
    .bind(product.original_price)
    .bind(&product.category)
    .bind(&product.subcategory)
    .bind(&product.brand)
    .bind(&product.images)
    .bind(product.quantity)
    .bind(&product.sku)
    .bind(product.track_inventory)
    .bind(&product.shipping)
    .bind(&product.seo_title)
    .bind(&product.seo_description)
    .bind(&product.slug)
    .bind(&product.tags)
    .bind(&product.attributes)
    .bind(&product.variants)
    .bind(product.status.to_string())
    .bind(product.featured)
    .bind(product.on_sale)
    .bind(&product.sale_start)
    .bind(&product.sale_end)
    .bind(product.discount_percentage)
    .bind(&product.created_by)
    .bind(&now)
    .bind(&now)
    .execute(db)
    .await?;
    Ok(())
}

/// POST /api/products (admin)
pub async fn create_product(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    JsonBody(request): JsonBody<CreateProductRequest>,
) -> Result<ApiResponse, ApiError> {
    validate_create_request(&request)?;

    let product = NewProduct::from_request(request, &admin.id);
    insert_product(&state.db, &product).await?;

    tracing::info!(product_id = %product.id, slug = %product.slug, "Product created");

    let created = require_product(&state.db, &product.id).await?;
    Ok(ApiResponse::created()
        .message("Product created successfully")
        .with("product", ProductResponse::from(created)))
}

/// PUT /api/products/:id (admin)
pub async fn update_product(
    State(state): State<Arc<AppState>>,
    AdminUser(_admin): AdminUser,
    Path(id): Path<String>,
    JsonBody(request): JsonBody<UpdateProductRequest>,
) -> Result<ApiResponse, ApiError> {
    validate_update_request(&request)?;
    let mut product = require_product(&state.db, &id).await?;

    if let Some(name) = request.name {
        product.name = name.trim().to_string();
    }
    if let Some(description) = request.description {
        product.description = description;
    }
    if let Some(price) = request.price {
        product.price = price;
    }
    if request.original_price.is_some() {
        product.original_price = request.original_price;
    }
    if let Some(category) = request.category {
        product.category = category.trim().to_string();
    }
    if request.subcategory.is_some() {
        product.subcategory = request.subcategory;
    }
    if request.brand.is_some() {
        product.brand = request.brand;
    }
    if let Some(images) = request.images {
        product.images = db::to_json_column(&images);
    }
    if let Some(inventory) = request.inventory {
        if inventory.sku.is_some() {
            product.sku = inventory.sku;
        }
        if let Some(track) = inventory.track_inventory {
            product.track_inventory = track;
        }
    }
    if let Some(shipping) = request.shipping {
        product.shipping = db::to_json_column(&shipping);
    }
    if let Some(seo) = request.seo {
        if seo.meta_title.is_some() {
            product.seo_title = seo.meta_title;
        }
        if seo.meta_description.is_some() {
            product.seo_description = seo.meta_description;
        }
        if let Some(slug) = seo.slug.filter(|s| !s.trim().is_empty()) {
            product.slug = Some(db::generate_slug(&slug));
        }
    }
    if let Some(tags) = request.tags {
        product.tags = db::to_json_column(&tags);
    }
    if let Some(attributes) = request.attributes {
        product.attributes = db::to_json_column(&attributes);
    }
    if let Some(variants) = request.variants {
        product.variants = db::to_json_column(&variants);
    }
    // Stored in canonical form so SQL filters and availability agree
    if let Some(status) = request.status.and_then(|s| s.parse::<ProductStatus>().ok()) {
        product.status = status.to_string();
    }
    if let Some(featured) = request.featured {
        product.featured = featured;
    }
    if let Some(on_sale) = request.on_sale {
        product.on_sale = on_sale;
    }
    if request.sale_start.is_some() {
        product.sale_start = request.sale_start;
    }
    if request.sale_end.is_some() {
        product.sale_end = request.sale_end;
    }
    if request.discount_percentage.is_some() {
        product.discount_percentage = request.discount_percentage;
    }

    sqlx::query(
        r#"
        UPDATE products SET
            name = ?, description = ?, price = ?, original_price = ?, category = ?,
            subcategory = ?, brand = ?, images = ?, sku = ?, track_inventory = ?,
            shipping = ?, seo_title = ?, seo_description = ?, slug = ?, tags = ?,
            attributes = ?, variants = ?, status = ?, featured = ?, on_sale = ?,
            sale_start = ?, sale_end = ?, discount_percentage = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&product.name)
    .bind(&product.description)
    .bind(product.price)
    .bind(product.original_price)
    .bind(&product.category)
    .bind(&product.subcategory)
    .bind(&product.brand)
    .bind(&product.images)
    .bind(&product.sku)
    .bind(product.track_inventory)
    .bind(&product.shipping)
    .bind(&product.seo_title)
    .bind(&product.seo_description)
    .bind(&product.slug)
    .bind(&product.tags)
    .bind(&product.attributes)
    .bind(&product.variants)
    .bind(&product.status)
    .bind(product.featured)
    .bind(product.on_sale)
    .bind(&product.sale_start)
    .bind(&product.sale_end)
    .bind(product.discount_percentage)
    .bind(db::now())
    .bind(&id)
    .execute(&state.db)
    .await?;

    let updated = require_product(&state.db, &id).await?;
    Ok(ApiResponse::ok()
        .message("Product updated successfully")
        .with("product", ProductResponse::from(updated)))
}

/// DELETE /api/products/:id (admin). Cart lines pointing at it are left
/// in place and skipped at checkout.
pub async fn delete_product(
    State(state): State<Arc<AppState>>,
    AdminUser(_admin): AdminUser,
    Path(id): Path<String>,
) -> Result<ApiResponse, ApiError> {
    let result = sqlx::query("DELETE FROM products WHERE id = ?")
        .bind(&id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Product not found"));
    }

    tracing::info!(product_id = %id, "Product deleted");
    Ok(ApiResponse::ok().message("Product deleted successfully"))
}

fn validate_review(req: &CreateReviewRequest) -> Result<i64, ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    let rating = req.rating.unwrap_or(0);
    if !(1..=5).contains(&rating) {
        errors.add("rating", "Rating must be between 1 and 5");
    }
    if let Some(comment) = &req.comment {
        errors.check("comment", validate_max_len(comment, 500, "Comment"));
    }
    errors.finish()?;
    Ok(rating)
}

/// POST /api/products/:id/reviews
pub async fn add_review(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    JsonBody(request): JsonBody<CreateReviewRequest>,
) -> Result<ApiResponse, ApiError> {
    let rating = validate_review(&request)?;
    require_product(&state.db, &id).await?;

    let existing: Option<(String,)> =
        sqlx::query_as("SELECT id FROM product_reviews WHERE product_id = ? AND user_id = ?")
            .bind(&id)
            .bind(&user.id)
            .fetch_optional(&state.db)
            .await?;
    if existing.is_some() {
        return Err(ApiError::bad_request("You have already reviewed this product"));
    }

    let (verified,): (bool,) = sqlx::query_as(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM orders o
            JOIN order_items i ON i.order_id = o.id
            WHERE o.user_id = ? AND o.order_status = 'delivered' AND i.product_id = ?
        )
        "#,
    )
    .bind(&user.id)
    .bind(&id)
    .fetch_one(&state.db)
    .await?;

    let review_id = uuid::Uuid::new_v4().to_string();
    let mut tx = state.db.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO product_reviews (id, product_id, user_id, rating, title, comment, verified, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&review_id)
    .bind(&id)
    .bind(&user.id)
    .bind(rating)
    .bind(&request.title)
    .bind(&request.comment)
    .bind(verified)
    .bind(db::now())
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        UPDATE products SET
            average_rating = (SELECT ROUND(AVG(rating), 1) FROM product_reviews WHERE product_id = ?),
            review_count = (SELECT COUNT(*) FROM product_reviews WHERE product_id = ?),
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&id)
    .bind(&id)
    .bind(db::now())
    .bind(&id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    let review: ProductReview = sqlx::query_as("SELECT * FROM product_reviews WHERE id = ?")
        .bind(&review_id)
        .fetch_one(&state.db)
        .await?;
    let product = require_product(&state.db, &id).await?;

    Ok(ApiResponse::created()
        .message("Review added successfully")
        .with("review", review)
        .with("averageRating", product.average_rating)
        .with("reviewCount", product.review_count))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::error::ErrorCode;
    use crate::db::InventoryInput;

    #[test]
    fn test_sort_clause_defaults_to_newest() {
        assert_eq!(sort_clause(None), "created_at DESC");
        assert_eq!(sort_clause(Some("bogus")), "created_at DESC");
        assert!(sort_clause(Some("price_desc")).starts_with("price DESC"));
    }

    #[test]
    fn test_create_validation() {
        let err = validate_create_request(&CreateProductRequest::default()).unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);

        let valid = CreateProductRequest {
            name: "Desk Lamp".to_string(),
            description: "Warm light".to_string(),
            price: Some(19.99),
            category: "home".to_string(),
            ..Default::default()
        };
        assert!(validate_create_request(&valid).is_ok());

        let negative = CreateProductRequest {
            price: Some(-1.0),
            ..valid.clone()
        };
        assert!(validate_create_request(&negative).is_err());

        let bad_status = CreateProductRequest {
            status: Some("hidden".to_string()),
            ..valid
        };
        assert!(validate_create_request(&bad_status).is_err());
    }

    #[test]
    fn test_update_rejects_direct_stock_edits() {
        let request = UpdateProductRequest {
            inventory: Some(InventoryInput {
                quantity: Some(50),
                ..Default::default()
            }),
            ..Default::default()
        };
        let err = validate_update_request(&request).unwrap_err();
        assert!(err.message().contains("inventory"));

        let sku_only = UpdateProductRequest {
            inventory: Some(InventoryInput {
                sku: Some("LAMP-1".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(validate_update_request(&sku_only).is_ok());
    }

    #[test]
    fn test_review_validation() {
        assert_eq!(
            validate_review(&CreateReviewRequest {
                rating: Some(4),
                ..Default::default()
            })
            .unwrap(),
            4
        );
        assert!(validate_review(&CreateReviewRequest::default()).is_err());
        assert!(validate_review(&CreateReviewRequest {
            rating: Some(5),
            comment: Some("x".repeat(501)),
            ..Default::default()
        })
        .is_err());
    }
}
