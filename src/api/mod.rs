pub mod admin;
pub mod auth;
mod cart;
pub mod error;
pub mod metrics;
mod orders;
mod payments;
pub mod products;
pub mod rate_limit;
pub mod response;
pub mod validation;
mod webhooks;

use axum::{
    http::{header, HeaderValue, Method},
    middleware,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use self::error::ApiError;
use self::rate_limit::RateLimitTier;
use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/verify/:token", post(auth::verify_email))
        .route("/resend-verification", post(auth::resend_verification))
        .route(
            "/public-resend-verification",
            post(auth::public_resend_verification),
        )
        .route("/forgot-password", post(auth::forgot_password))
        .route("/reset-password/:token", post(auth::reset_password))
        .route("/me", get(auth::me))
        .route("/update-profile", put(auth::update_profile))
        .route("/change-password", put(auth::change_password))
        .route("/wishlist", get(auth::get_wishlist))
        .route("/wishlist/:product_id", post(auth::add_to_wishlist))
        .route("/wishlist/:product_id", delete(auth::remove_from_wishlist))
        .layer(middleware::from_fn_with_state(
            (state.clone(), RateLimitTier::Auth),
            rate_limit::throttle,
        ));

    let product_routes = Router::new()
        .route("/", get(products::list_products))
        .route("/", post(products::create_product))
        .route("/featured", get(products::featured_products))
        .route("/categories", get(products::list_categories))
        .route("/:id", get(products::get_product))
        .route("/:id", put(products::update_product))
        .route("/:id", delete(products::delete_product))
        .route("/:id/reviews", post(products::add_review));

    let cart_routes = Router::new()
        .route("/", get(cart::get_cart))
        .route("/", post(cart::add_to_cart))
        .route("/", delete(cart::clear_cart))
        .route("/merge", post(cart::merge_cart))
        .route("/:product_id", put(cart::update_cart_item))
        .route("/:product_id", delete(cart::remove_cart_item));

    let order_routes = Router::new()
        .route("/", post(orders::create_order))
        .route("/", get(orders::list_orders))
        .route("/:id", get(orders::get_order))
        .route("/:id/cancel", put(orders::cancel_order));

    let admin_routes = Router::new()
        .route("/login", post(admin::login))
        .route("/create-admin", post(admin::create_admin))
        .route("/dashboard", get(admin::dashboard))
        .route("/users", get(admin::list_users))
        .route("/users/:id", put(admin::update_user))
        .route("/users/:id", delete(admin::delete_user))
        .route("/orders", get(admin::list_orders))
        .route("/orders/:id", put(admin::update_order))
        .route("/products/:id/inventory", put(admin::adjust_inventory))
        .route("/checkouts", get(admin::list_checkouts))
        .route("/checkouts/:id", get(admin::get_checkout))
        .route("/checkouts/:id/compensate", post(admin::compensate_checkout));

    let payment_routes = Router::new()
        .route("/razorpay/order", post(payments::create_razorpay_order))
        .route("/razorpay/verify", post(payments::verify_razorpay_payment));

    let webhook_routes = Router::new()
        .route("/stripe", post(webhooks::stripe_webhook))
        .route("/paypal", post(webhooks::paypal_webhook))
        .layer(middleware::from_fn_with_state(
            (state.clone(), RateLimitTier::Webhook),
            rate_limit::throttle,
        ));

    // Auth and webhooks carry their own tiers
    let api_routes = Router::new()
        .nest("/products", product_routes)
        .nest("/cart", cart_routes)
        .nest("/orders", order_routes)
        .nest("/admin", admin_routes)
        .nest("/payments", payment_routes)
        .layer(middleware::from_fn_with_state(
            (state.clone(), RateLimitTier::Api),
            rate_limit::throttle,
        ))
        .nest("/auth", auth_routes)
        .nest("/webhooks", webhook_routes);

    Router::new()
        .route("/api/health", get(health_check))
        .route("/metrics", get(metrics::metrics_endpoint))
        .nest("/api", api_routes)
        .fallback(not_found)
        .layer(middleware::from_fn(metrics::metrics_middleware))
        .layer(cors_layer(&state.config.frontend.url))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(frontend_url: &str) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true);

    match HeaderValue::from_str(frontend_url) {
        Ok(origin) => cors.allow_origin(origin),
        Err(_) => {
            tracing::warn!(url = %frontend_url, "Frontend URL is not a valid origin, CORS disabled");
            cors
        }
    }
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "OK",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn not_found() -> ApiError {
    ApiError::not_found("Route not found")
}
