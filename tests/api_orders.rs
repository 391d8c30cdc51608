mod common;

use axum::http::{Method, StatusCode};
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;

use common::{shipping_order, TestApp, GATEWAY_SECRET};
use dealdrop::config::Config;
use dealdrop::db::UserRole;

#[tokio::test]
async fn test_order_lifecycle_moves_stock() {
    let app = TestApp::new().await;
    let admin = app.user_token("admin@example.com", UserRole::Admin).await;
    let buyer = app.user_token("buyer@example.com", UserRole::User).await;
    let product = app.create_product(&admin, "Desk Lamp", 100.0, 5).await;

    let (status, body) = app
        .post("/api/cart", Some(&buyer), json!({ "productId": product, "quantity": 2 }))
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["cart"][0]["quantity"], 2);

    let (status, body) = app.post("/api/orders", Some(&buyer), shipping_order()).await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    let order = &body["order"];
    assert_eq!(order["orderStatus"], "pending");
    assert_eq!(order["subtotal"], 200.0);
    assert_eq!(order["tax"], 16.0);
    assert_eq!(order["shipping"], 40.0);
    assert_eq!(order["total"], 256.0);
    assert_eq!(order["shippingAddress"]["country"], "USA");
    let order_id = order["id"].as_str().unwrap().to_string();

    assert_eq!(app.stock(&product).await, 3);

    let (_, body) = app.get("/api/cart", Some(&buyer)).await;
    assert_eq!(body["cart"].as_array().unwrap().len(), 0);

    let (status, body) = app.get("/api/orders", Some(&buyer)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pagination"]["total"], 1);
    assert_eq!(body["orders"][0]["items"][0]["quantity"], 2);

    let uri = format!("/api/orders/{}/cancel", order_id);
    let (status, body) = app.request(Method::PUT, &uri, Some(&buyer), None).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["order"]["orderStatus"], "cancelled");
    assert_eq!(app.stock(&product).await, 5);

    // Second cancel is refused and does not restock again
    let (status, body) = app.request(Method::PUT, &uri, Some(&buyer), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_state");
    assert_eq!(app.stock(&product).await, 5);
}

#[tokio::test]
async fn test_order_visible_to_owner_and_admin_only() {
    let app = TestApp::new().await;
    let admin = app.user_token("admin@example.com", UserRole::Admin).await;
    let buyer = app.user_token("buyer@example.com", UserRole::User).await;
    let stranger = app.user_token("stranger@example.com", UserRole::User).await;
    let product = app.create_product(&admin, "Kettle", 30.0, 10).await;

    app.post("/api/cart", Some(&buyer), json!({ "productId": product }))
        .await;
    let (_, body) = app.post("/api/orders", Some(&buyer), shipping_order()).await;
    let uri = format!("/api/orders/{}", body["order"]["id"].as_str().unwrap());

    let (status, body) = app.get(&uri, Some(&stranger)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "Access denied");

    let (status, _) = app.get(&uri, Some(&admin)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app.get(&uri, Some(&buyer)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["order"]["items"][0]["name"], "Kettle");
}

#[tokio::test]
async fn test_empty_cart_is_rejected() {
    let app = TestApp::new().await;
    let buyer = app.user_token("buyer@example.com", UserRole::User).await;

    let (status, body) = app.post("/api/orders", Some(&buyer), shipping_order()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Cart is empty");
}

#[tokio::test]
async fn test_invalid_shipping_address_lists_fields() {
    let app = TestApp::new().await;
    let buyer = app.user_token("buyer@example.com", UserRole::User).await;

    let (status, body) = app
        .post(
            "/api/orders",
            Some(&buyer),
            json!({
                "shippingAddress": { "firstName": "Grace" },
                "paymentMethod": "card"
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation_error");
    assert!(body["errors"]["shippingAddress.city"].is_array(), "{}", body);
}

/// Second line out of stock: the first line's decrement stays until an admin
/// compensates the checkout.
#[tokio::test]
async fn test_aborted_checkout_compensated_by_admin() {
    let app = TestApp::new().await;
    let admin = app.user_token("admin@example.com", UserRole::Admin).await;
    let buyer = app.user_token("buyer@example.com", UserRole::User).await;
    let plenty = app.create_product(&admin, "Widget A", 10.0, 5).await;
    let scarce = app.create_product(&admin, "Widget B", 10.0, 1).await;

    app.post("/api/cart", Some(&buyer), json!({ "productId": plenty, "quantity": 2 }))
        .await;
    app.post("/api/cart", Some(&buyer), json!({ "productId": scarce, "quantity": 1 }))
        .await;

    let (status, body) = app
        .put(
            &format!("/api/admin/products/{}/inventory", scarce),
            Some(&admin),
            json!({ "delta": -1 }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["product"]["inventory"]["quantity"], 0);

    let (status, body) = app.post("/api/orders", Some(&buyer), shipping_order()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Insufficient stock for Widget B");
    assert_eq!(app.stock(&plenty).await, 3);

    let (status, body) = app
        .get("/api/admin/checkouts?status=aborted", Some(&admin))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pagination"]["total"], 1);
    let checkout_id = body["checkouts"][0]["id"].as_str().unwrap().to_string();

    let (_, body) = app
        .get(&format!("/api/admin/checkouts/{}", checkout_id), Some(&admin))
        .await;
    assert_eq!(body["checkout"]["adjustments"][0]["appliedDelta"], -2);

    let uri = format!("/api/admin/checkouts/{}/compensate", checkout_id);
    let (status, body) = app.request(Method::POST, &uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["checkout"]["status"], "compensated");
    assert_eq!(app.stock(&plenty).await, 5);

    let (status, body) = app.request(Method::POST, &uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_state");
    assert_eq!(app.stock(&plenty).await, 5);
}

#[tokio::test]
async fn test_compensate_on_failure_restores_stock_immediately() {
    let mut config = Config::default();
    config.checkout.compensate_on_failure = true;
    let app = TestApp::with_config(config).await;
    let admin = app.user_token("admin@example.com", UserRole::Admin).await;
    let buyer = app.user_token("buyer@example.com", UserRole::User).await;
    let plenty = app.create_product(&admin, "Gadget A", 10.0, 4).await;
    let scarce = app.create_product(&admin, "Gadget B", 10.0, 1).await;

    app.post("/api/cart", Some(&buyer), json!({ "productId": plenty, "quantity": 3 }))
        .await;
    app.post("/api/cart", Some(&buyer), json!({ "productId": scarce, "quantity": 1 }))
        .await;
    app.put(
        &format!("/api/admin/products/{}/inventory", scarce),
        Some(&admin),
        json!({ "delta": -1 }),
    )
    .await;

    let (status, _) = app.post("/api/orders", Some(&buyer), shipping_order()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(app.stock(&plenty).await, 4);

    let (_, body) = app
        .get("/api/admin/checkouts?status=compensated", Some(&admin))
        .await;
    assert_eq!(body["pagination"]["total"], 1);
}

#[tokio::test]
async fn test_admin_routes_require_admin_role() {
    let app = TestApp::new().await;
    let buyer = app.user_token("buyer@example.com", UserRole::User).await;

    let (status, body) = app.get("/api/admin/dashboard", Some(&buyer)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(
        body["message"],
        "User role user is not authorized to access this route"
    );

    let (status, body) = app.get("/api/admin/dashboard", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Not authorized, no token");
}

#[tokio::test]
async fn test_admin_dashboard_counts_completed_revenue() {
    let app = TestApp::new().await;
    let admin = app.user_token("admin@example.com", UserRole::Admin).await;
    let buyer = app.user_token("buyer@example.com", UserRole::User).await;
    let product = app.create_product(&admin, "Blender", 50.0, 8).await;

    app.post("/api/cart", Some(&buyer), json!({ "productId": product, "quantity": 2 }))
        .await;
    let (_, body) = app.post("/api/orders", Some(&buyer), shipping_order()).await;
    let order_id = body["order"]["id"].as_str().unwrap().to_string();

    let (status, body) = app
        .put(
            &format!("/api/admin/orders/{}", order_id),
            Some(&admin),
            json!({ "paymentStatus": "completed", "orderStatus": "shipped", "trackingNumber": "TRK1" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["order"]["orderStatus"], "shipped");
    assert_eq!(body["order"]["trackingNumber"], "TRK1");

    let (status, body) = app.get("/api/admin/dashboard", Some(&admin)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["stats"]["totalUsers"], 1);
    assert_eq!(body["stats"]["totalOrders"], 1);
    assert_eq!(body["stats"]["totalRevenue"], body["recentOrders"][0]["total"]);
    assert_eq!(body["lowStockProducts"][0]["name"], "Blender");
    assert_eq!(body["monthlyRevenue"][0]["orders"], 1);

    let (status, body) = app
        .put(
            &format!("/api/admin/orders/{}", order_id),
            Some(&admin),
            json!({ "orderStatus": "teleported" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation_error");
}

#[tokio::test]
async fn test_admin_cannot_delete_admin() {
    let app = TestApp::new().await;
    let admin = app.user_token("admin@example.com", UserRole::Admin).await;

    let admin_id: String = sqlx::query_scalar("SELECT id FROM users WHERE email = 'admin@example.com'")
        .fetch_one(app.db())
        .await
        .unwrap();

    let (status, body) = app
        .request(
            Method::DELETE,
            &format!("/api/admin/users/{}", admin_id),
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Cannot delete admin user");
}

#[tokio::test]
async fn test_payment_verification_completes_order() {
    let app = TestApp::new().await;
    let admin = app.user_token("admin@example.com", UserRole::Admin).await;
    let buyer = app.user_token("buyer@example.com", UserRole::User).await;
    let product = app.create_product(&admin, "Headphones", 120.0, 3).await;

    app.post("/api/cart", Some(&buyer), json!({ "productId": product }))
        .await;
    let (_, body) = app.post("/api/orders", Some(&buyer), shipping_order()).await;
    let order_id = body["order"]["id"].as_str().unwrap().to_string();

    let (status, body) = app
        .post(
            "/api/payments/razorpay/order",
            Some(&buyer),
            json!({ "amount": 209.6 }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["order"]["amount"], 20960);
    assert_eq!(body["order"]["currency"], "INR");

    let (status, body) = app
        .post(
            "/api/payments/razorpay/verify",
            Some(&buyer),
            json!({
                "razorpay_order_id": "order_test_1",
                "razorpay_payment_id": "pay_1",
                "razorpay_signature": "00ff",
                "orderId": order_id
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Payment verification failed");

    let mut mac = Hmac::<Sha256>::new_from_slice(GATEWAY_SECRET.as_bytes()).unwrap();
    mac.update(b"order_test_1|pay_1");
    let signature = hex::encode(mac.finalize().into_bytes());

    let (status, body) = app
        .post(
            "/api/payments/razorpay/verify",
            Some(&buyer),
            json!({
                "razorpay_order_id": "order_test_1",
                "razorpay_payment_id": "pay_1",
                "razorpay_signature": signature,
                "orderId": order_id
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);

    let (_, body) = app
        .get(&format!("/api/orders/{}", order_id), Some(&buyer))
        .await;
    assert_eq!(body["order"]["paymentStatus"], "completed");

    // A genuine signature for an order this shop does not know still verifies
    let (status, body) = app
        .post(
            "/api/payments/razorpay/verify",
            Some(&buyer),
            json!({
                "razorpay_order_id": "order_test_1",
                "razorpay_payment_id": "pay_1",
                "razorpay_signature": signature,
                "orderId": "no-such-order"
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["message"], "Payment verified successfully");
}

#[tokio::test]
async fn test_webhooks_acknowledge_without_auth() {
    let app = TestApp::new().await;

    let (status, body) = app
        .post("/api/webhooks/stripe", None, json!({ "type": "charge.succeeded" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "received": true }));

    let (status, _) = app
        .post("/api/webhooks/paypal", None, json!({ "event_type": "PAYMENT.SALE.COMPLETED" }))
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_unknown_route_is_json_404() {
    let app = TestApp::new().await;

    let (status, body) = app.get("/api/nothing-here", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "not_found");

    let (status, body) = app.get("/api/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "OK");
}
