#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

use dealdrop::api::auth::{create_user, issue_token};
use dealdrop::config::Config;
use dealdrop::db::{self, DbPool, UserRole};
use dealdrop::notifications::{EmailMessage, EmailSender};
use dealdrop::payments::{verify_razorpay_signature, GatewayOrder, GatewayOrderRequest, PaymentGateway};
use dealdrop::AppState;

pub const GATEWAY_SECRET: &str = "test_gateway_secret";

/// Captures outgoing mail instead of sending it
#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<EmailMessage>>,
}

#[async_trait]
impl EmailSender for RecordingMailer {
    async fn send(&self, message: EmailMessage) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push(message);
        Ok(())
    }
}

impl RecordingMailer {
    /// Token at the end of the link in the most recent email
    pub fn last_token(&self) -> String {
        let sent = self.sent.lock().unwrap();
        let message = sent.last().expect("no email sent");
        let link = message
            .text
            .lines()
            .find(|line| line.starts_with("http"))
            .expect("no link in email");
        link.rsplit('/').next().unwrap().to_string()
    }
}

pub struct FakeGateway;

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_order(&self, request: GatewayOrderRequest) -> anyhow::Result<GatewayOrder> {
        Ok(GatewayOrder {
            id: "order_test_1".to_string(),
            amount: dealdrop::payments::to_minor_units(request.amount),
            currency: request.currency,
            receipt: Some(request.receipt),
            status: Some("created".to_string()),
        })
    }

    fn verify_payment(&self, order_id: &str, payment_id: &str, signature: &str) -> bool {
        verify_razorpay_signature(GATEWAY_SECRET, order_id, payment_id, signature)
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
    pub mailer: Arc<RecordingMailer>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(Config::default()).await
    }

    pub async fn with_config(config: Config) -> Self {
        let pool = db::init_memory().await.unwrap();
        let mailer = Arc::new(RecordingMailer::default());
        let state = Arc::new(AppState::new(
            config,
            pool,
            mailer.clone(),
            Arc::new(FakeGateway),
        ));
        let router = dealdrop::api::create_router(state.clone());
        Self {
            router,
            state,
            mailer,
        }
    }

    pub fn db(&self) -> &DbPool {
        &self.state.db
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.request(Method::GET, uri, token, None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.request(Method::POST, uri, token, Some(body)).await
    }

    pub async fn put(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.request(Method::PUT, uri, token, Some(body)).await
    }

    /// Create a verified account and return its bearer token
    pub async fn user_token(&self, email: &str, role: UserRole) -> String {
        let user = create_user(self.db(), "Test", "Person", email, "secret123", role, true)
            .await
            .unwrap();
        issue_token(&self.state.config.auth, &user).unwrap()
    }

    pub async fn create_product(&self, admin: &str, name: &str, price: f64, quantity: i64) -> String {
        let (status, body) = self
            .post(
                "/api/products",
                Some(admin),
                json!({
                    "name": name,
                    "description": format!("{} for testing", name),
                    "price": price,
                    "category": "Electronics",
                    "inventory": { "quantity": quantity }
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        body["product"]["id"].as_str().unwrap().to_string()
    }

    pub async fn stock(&self, product_id: &str) -> i64 {
        sqlx::query_scalar("SELECT quantity FROM products WHERE id = ?")
            .bind(product_id)
            .fetch_one(self.db())
            .await
            .unwrap()
    }
}

pub fn shipping_order() -> Value {
    json!({
        "shippingAddress": {
            "firstName": "Grace",
            "lastName": "Hopper",
            "email": "grace@example.com",
            "phone": "5550100200",
            "address": "1 Harbor Way",
            "city": "Arlington",
            "state": "VA",
            "zipCode": "22201"
        },
        "paymentMethod": "card"
    })
}
