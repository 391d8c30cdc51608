//! Back-office endpoints: dashboard, users, orders, stock and checkout repair.

use axum::extract::{Path, Query, State};
use serde::Serialize;
use sqlx::FromRow;
use std::sync::Arc;

use super::auth::{create_user, find_user, find_user_by_email, issue_token, validate_credentials, verify_password, AdminUser};
use super::error::{ApiError, ValidationErrorBuilder};
use super::response::ApiResponse;
use super::validation::{validate_email, validate_name, validate_password, JsonBody};
use crate::commerce::checkout;
use crate::commerce::inventory::{self, LedgerRef};
use crate::db::{
    self, AdjustInventoryRequest, AdjustmentReason, AdminUpdateOrderRequest,
    AdminUpdateUserRequest, CheckoutQuery, CheckoutStatus, DbPool, LoginRequest, Order,
    OrderListQuery, OrderResponse, OrderStatus, PageQuery, Pagination, PaymentStatus, Product,
    ProductResponse, RegisterRequest, User, UserResponse, UserRole,
};
use crate::AppState;

const DEFAULT_PAGE_SIZE: i64 = 20;

/// POST /api/admin/login - admins only
pub async fn login(
    State(state): State<Arc<AppState>>,
    JsonBody(request): JsonBody<LoginRequest>,
) -> Result<ApiResponse, ApiError> {
    validate_credentials(&request)?;

    let user = find_user_by_email(&state.db, &request.email)
        .await?
        .filter(User::is_admin)
        .ok_or_else(|| ApiError::unauthorized("Invalid credentials"))?;

    if !verify_password(&request.password, &user.password_hash) {
        return Err(ApiError::unauthorized("Invalid credentials"));
    }

    let token = issue_token(&state.config.auth, &user)?;
    tracing::info!(user_id = %user.id, "Admin logged in");

    Ok(ApiResponse::ok()
        .message("Login successful")
        .with("token", token)
        .with("user", UserResponse::from(user)))
}

/// POST /api/admin/create-admin - first-run bootstrap, refused once an admin exists
pub async fn create_admin(
    State(state): State<Arc<AppState>>,
    JsonBody(request): JsonBody<RegisterRequest>,
) -> Result<ApiResponse, ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    errors
        .check("firstName", validate_name(&request.first_name, "First name"))
        .check("lastName", validate_name(&request.last_name, "Last name"))
        .check("email", validate_email(&request.email))
        .check("password", validate_password(&request.password));
    errors.finish()?;

    let admins: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE role = 'admin'")
        .fetch_one(&state.db)
        .await?;
    if admins > 0 {
        return Err(ApiError::invalid_state("Admin user already exists"));
    }

    if find_user_by_email(&state.db, &request.email).await?.is_some() {
        return Err(ApiError::bad_request("User with this email already exists"));
    }

    let admin = create_user(
        &state.db,
        &request.first_name,
        &request.last_name,
        &request.email,
        &request.password,
        UserRole::Admin,
        true,
    )
    .await?;

    tracing::info!(email = %admin.email, "Admin user created");

    Ok(ApiResponse::created()
        .message("Admin user created successfully")
        .with("admin", UserResponse::from(admin)))
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CustomerSummary {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

/// Order as the back office sees it, with the customer's name attached
#[derive(Debug, Serialize)]
pub struct AdminOrderView {
    #[serde(flatten)]
    pub order: OrderResponse,
    pub customer: Option<CustomerSummary>,
}

async fn admin_views(db: &DbPool, orders: Vec<Order>) -> Result<Vec<AdminOrderView>, ApiError> {
    let mut views = Vec::with_capacity(orders.len());
    for order in orders {
        let customer: Option<CustomerSummary> = sqlx::query_as(
            "SELECT id, first_name, last_name, email FROM users WHERE id = ?",
        )
        .bind(&order.user_id)
        .fetch_optional(db)
        .await?;
        views.push(AdminOrderView {
            order: checkout::with_items(db, order).await?,
            customer,
        });
    }
    Ok(views)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_users: i64,
    pub total_products: i64,
    pub total_orders: i64,
    pub total_revenue: f64,
}

#[derive(Debug, Serialize, FromRow)]
pub struct MonthlyRevenue {
    pub year: i64,
    pub month: i64,
    pub revenue: f64,
    pub orders: i64,
}

/// GET /api/admin/dashboard
pub async fn dashboard(
    State(state): State<Arc<AppState>>,
    AdminUser(_admin): AdminUser,
) -> Result<ApiResponse, ApiError> {
    let total_users: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE role = 'user'")
        .fetch_one(&state.db)
        .await?;
    let total_products: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
        .fetch_one(&state.db)
        .await?;
    let total_orders: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders")
        .fetch_one(&state.db)
        .await?;
    let total_revenue: f64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(total), 0.0) FROM orders WHERE payment_status = 'completed'",
    )
    .fetch_one(&state.db)
    .await?;

    let recent: Vec<Order> =
        sqlx::query_as("SELECT * FROM orders ORDER BY created_at DESC LIMIT 5")
            .fetch_all(&state.db)
            .await?;
    let recent_orders = admin_views(&state.db, recent).await?;

    let low_stock: Vec<Product> = sqlx::query_as(
        "SELECT * FROM products WHERE status = 'active' AND quantity <= ? ORDER BY quantity ASC LIMIT 5",
    )
    .bind(state.config.checkout.low_stock_threshold)
    .fetch_all(&state.db)
    .await?;

    // Timestamps are RFC 3339 text, so year and month are fixed-width prefixes
    let since = (chrono::Utc::now() - chrono::Duration::days(365)).to_rfc3339();
    let monthly_revenue: Vec<MonthlyRevenue> = sqlx::query_as(
        r#"
        SELECT
            CAST(substr(created_at, 1, 4) AS INTEGER) AS year,
            CAST(substr(created_at, 6, 2) AS INTEGER) AS month,
            SUM(total) AS revenue,
            COUNT(*) AS orders
        FROM orders
        WHERE payment_status = 'completed' AND created_at >= ?
        GROUP BY year, month
        ORDER BY year, month
        "#,
    )
    .bind(&since)
    .fetch_all(&state.db)
    .await?;

    Ok(ApiResponse::ok()
        .with(
            "stats",
            DashboardStats {
                total_users,
                total_products,
                total_orders,
                total_revenue,
            },
        )
        .with("recentOrders", recent_orders)
        .with(
            "lowStockProducts",
            low_stock
                .into_iter()
                .map(ProductResponse::from)
                .collect::<Vec<_>>(),
        )
        .with("monthlyRevenue", monthly_revenue))
}

/// GET /api/admin/users
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    AdminUser(_admin): AdminUser,
    Query(query): Query<PageQuery>,
) -> Result<ApiResponse, ApiError> {
    let (page, limit) = query.resolve(DEFAULT_PAGE_SIZE);

    let users: Vec<User> =
        sqlx::query_as("SELECT * FROM users ORDER BY created_at DESC LIMIT ? OFFSET ?")
            .bind(limit)
            .bind(Pagination::offset(page, limit))
            .fetch_all(&state.db)
            .await?;
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(&state.db)
        .await?;

    Ok(ApiResponse::ok()
        .with(
            "users",
            users.into_iter().map(UserResponse::from).collect::<Vec<_>>(),
        )
        .with("pagination", Pagination::new(page, limit, total)))
}

/// PUT /api/admin/users/:id
pub async fn update_user(
    State(state): State<Arc<AppState>>,
    AdminUser(_admin): AdminUser,
    Path(id): Path<String>,
    JsonBody(request): JsonBody<AdminUpdateUserRequest>,
) -> Result<ApiResponse, ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    if let Some(name) = &request.first_name {
        errors.check("firstName", validate_name(name, "First name"));
    }
    if let Some(name) = &request.last_name {
        errors.check("lastName", validate_name(name, "Last name"));
    }
    if let Some(email) = &request.email {
        errors.check("email", validate_email(email));
    }
    let role = match request.role.as_deref() {
        Some(role) => match role.parse::<UserRole>() {
            Ok(role) => Some(role),
            Err(_) => {
                errors.add("role", "Invalid role");
                None
            }
        },
        None => None,
    };
    errors.finish()?;

    let user = find_user(&state.db, &id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    let email = match &request.email {
        Some(email) => {
            let email = email.trim().to_lowercase();
            if email != user.email && find_user_by_email(&state.db, &email).await?.is_some() {
                return Err(ApiError::bad_request("Email is already in use"));
            }
            email
        }
        None => user.email.clone(),
    };

    sqlx::query(
        r#"
        UPDATE users
        SET first_name = ?, last_name = ?, email = ?, role = ?, is_verified = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(request.first_name.as_deref().map(str::trim).unwrap_or(user.first_name.as_str()))
    .bind(request.last_name.as_deref().map(str::trim).unwrap_or(user.last_name.as_str()))
    .bind(&email)
    .bind(role.unwrap_or_else(|| user.role_enum()).to_string())
    .bind(request.is_verified.unwrap_or(user.is_verified))
    .bind(db::now())
    .bind(&id)
    .execute(&state.db)
    .await?;

    let updated = find_user(&state.db, &id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    Ok(ApiResponse::ok()
        .message("User updated successfully")
        .with("user", UserResponse::from(updated)))
}

/// DELETE /api/admin/users/:id - admin accounts cannot be deleted
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    AdminUser(_admin): AdminUser,
    Path(id): Path<String>,
) -> Result<ApiResponse, ApiError> {
    let user = find_user(&state.db, &id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    if user.is_admin() {
        return Err(ApiError::bad_request("Cannot delete admin user"));
    }

    sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(&id)
        .execute(&state.db)
        .await?;

    tracing::info!(user_id = %id, "User deleted");
    Ok(ApiResponse::ok().message("User deleted successfully"))
}

/// GET /api/admin/orders
pub async fn list_orders(
    State(state): State<Arc<AppState>>,
    AdminUser(_admin): AdminUser,
    Query(query): Query<OrderListQuery>,
) -> Result<ApiResponse, ApiError> {
    let (page, limit) = PageQuery {
        page: query.page,
        limit: query.limit,
    }
    .resolve(DEFAULT_PAGE_SIZE);

    let status = query.status.filter(|s| !s.is_empty());
    let payment_status = query.payment_status.filter(|s| !s.is_empty());

    let orders: Vec<Order> = sqlx::query_as(
        r#"
        SELECT * FROM orders
        WHERE (? IS NULL OR order_status = ?) AND (? IS NULL OR payment_status = ?)
        ORDER BY created_at DESC LIMIT ? OFFSET ?
        "#,
    )
    .bind(&status)
    .bind(&status)
    .bind(&payment_status)
    .bind(&payment_status)
    .bind(limit)
    .bind(Pagination::offset(page, limit))
    .fetch_all(&state.db)
    .await?;

    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM orders WHERE (? IS NULL OR order_status = ?) AND (? IS NULL OR payment_status = ?)",
    )
    .bind(&status)
    .bind(&status)
    .bind(&payment_status)
    .bind(&payment_status)
    .fetch_one(&state.db)
    .await?;

    Ok(ApiResponse::ok()
        .with("orders", admin_views(&state.db, orders).await?)
        .with("pagination", Pagination::new(page, limit, total)))
}

/// PUT /api/admin/orders/:id - fulfilment fields only, stock is never touched here
pub async fn update_order(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
    JsonBody(request): JsonBody<AdminUpdateOrderRequest>,
) -> Result<ApiResponse, ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    let order_status = match request.order_status.as_deref().filter(|s| !s.is_empty()) {
        Some(s) => match s.parse::<OrderStatus>() {
            Ok(status) => Some(status),
            Err(_) => {
                errors.add("orderStatus", "Invalid order status");
                None
            }
        },
        None => None,
    };
    let payment_status = match request.payment_status.as_deref().filter(|s| !s.is_empty()) {
        Some(s) => match s.parse::<PaymentStatus>() {
            Ok(status) => Some(status),
            Err(_) => {
                errors.add("paymentStatus", "Invalid payment status");
                None
            }
        },
        None => None,
    };
    errors.finish()?;

    let order = checkout::find_order(&state.db, &id)
        .await?
        .ok_or_else(|| ApiError::not_found("Order not found"))?;

    sqlx::query(
        r#"
        UPDATE orders
        SET order_status = ?, payment_status = ?, tracking_number = ?, shipping_carrier = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(order_status.map(|s| s.to_string()).unwrap_or(order.order_status))
    .bind(payment_status.map(|s| s.to_string()).unwrap_or(order.payment_status))
    .bind(
        request
            .tracking_number
            .map(|t| t.trim().to_string())
            .or(order.tracking_number),
    )
    .bind(
        request
            .shipping_carrier
            .map(|c| c.trim().to_string())
            .or(order.shipping_carrier),
    )
    .bind(db::now())
    .bind(&id)
    .execute(&state.db)
    .await?;

    tracing::info!(order_id = %id, admin_id = %admin.id, "Order updated by admin");

    let order = checkout::load_order(&state.db, &id)
        .await?
        .ok_or_else(|| ApiError::not_found("Order not found"))?;
    Ok(ApiResponse::ok()
        .message("Order updated successfully")
        .with("order", order))
}

/// PUT /api/admin/products/:id/inventory - manual restock or write-off
pub async fn adjust_inventory(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
    JsonBody(request): JsonBody<AdjustInventoryRequest>,
) -> Result<ApiResponse, ApiError> {
    if request.delta == 0 {
        return Err(ApiError::validation_field("delta", "Delta must not be zero"));
    }

    let change = inventory::adjust(
        &state.db,
        &id,
        request.delta,
        AdjustmentReason::Restock,
        LedgerRef::default(),
    )
    .await?
    .ok_or_else(|| ApiError::not_found("Product not found"))?;

    tracing::info!(
        product_id = %id,
        admin_id = %admin.id,
        delta = request.delta,
        quantity = change.after,
        "Inventory adjusted"
    );

    let product = inventory::find_product(&state.db, &id)
        .await?
        .ok_or_else(|| ApiError::not_found("Product not found"))?;

    Ok(ApiResponse::ok()
        .message("Inventory updated successfully")
        .with("adjustment", change)
        .with("product", ProductResponse::from(product)))
}

/// GET /api/admin/checkouts - order placement attempts
pub async fn list_checkouts(
    State(state): State<Arc<AppState>>,
    AdminUser(_admin): AdminUser,
    Query(query): Query<CheckoutQuery>,
) -> Result<ApiResponse, ApiError> {
    let status = match query.status.as_deref().filter(|s| !s.is_empty()) {
        Some(s) => Some(
            s.parse::<CheckoutStatus>()
                .map_err(|_| ApiError::validation_field("status", "Invalid checkout status"))?,
        ),
        None => None,
    };
    let (page, limit) = PageQuery {
        page: query.page,
        limit: query.limit,
    }
    .resolve(DEFAULT_PAGE_SIZE);

    let (checkouts, total) =
        checkout::list_checkouts(&state.db, status, limit, Pagination::offset(page, limit))
            .await?;

    Ok(ApiResponse::ok()
        .with("checkouts", checkouts)
        .with("pagination", Pagination::new(page, limit, total)))
}

/// GET /api/admin/checkouts/:id - one attempt with its stock ledger
pub async fn get_checkout(
    State(state): State<Arc<AppState>>,
    AdminUser(_admin): AdminUser,
    Path(id): Path<String>,
) -> Result<ApiResponse, ApiError> {
    let detail = checkout::get_checkout(&state.db, &id).await?;
    Ok(ApiResponse::ok().with("checkout", detail))
}

/// POST /api/admin/checkouts/:id/compensate - put back stock an aborted checkout took
pub async fn compensate_checkout(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
) -> Result<ApiResponse, ApiError> {
    let detail = checkout::compensate_checkout(&state.db, &id).await?;
    tracing::info!(checkout_id = %id, admin_id = %admin.id, "Checkout compensated");

    Ok(ApiResponse::ok()
        .message("Checkout compensated")
        .with("checkout", detail))
}
