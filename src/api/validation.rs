//! Input validation for API requests.
//!
//! Validators return `Result<(), String>` and are collected per field with
//! `ValidationErrorBuilder::check`, so one response lists every bad field.

use axum::{
    async_trait,
    extract::{FromRequest, Request},
    Json,
};
use lazy_static::lazy_static;
use regex::Regex;
use serde::de::DeserializeOwned;

use super::error::{ApiError, ValidationErrorBuilder};
use crate::db::{Address, PaymentMethod};

lazy_static! {
    /// Pragmatic email check: one @, no spaces, dotted domain
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9-]+(\.[A-Za-z0-9-]+)*\.[A-Za-z]{2,}$"
    ).unwrap();
}

pub const MIN_PASSWORD_LEN: usize = 6;

/// JSON body extractor whose rejections use the API error envelope
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(JsonBody(value)),
            Err(rejection) => Err(ApiError::bad_request(rejection.body_text())),
        }
    }
}

/// Validate an email address
pub fn validate_email(email: &str) -> Result<(), String> {
    let email = email.trim();
    if email.is_empty() || email.len() > 254 || !EMAIL_REGEX.is_match(email) {
        return Err("Please provide a valid email".to_string());
    }
    Ok(())
}

/// Validate a person's name (at least two characters after trimming)
pub fn validate_name(name: &str, label: &str) -> Result<(), String> {
    let name = name.trim();
    if name.chars().count() < 2 {
        return Err(format!("{} must be at least 2 characters", label));
    }
    if name.chars().count() > 50 {
        return Err(format!("{} cannot exceed 50 characters", label));
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), String> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        ));
    }
    Ok(())
}

/// Validate a UUID string
pub fn validate_uuid(id: &str, field_name: &str) -> Result<(), String> {
    if id.is_empty() {
        return Err(format!("{} is required", field_name));
    }

    if uuid::Uuid::parse_str(id).is_err() {
        return Err(format!("Invalid {} format", field_name));
    }

    Ok(())
}

pub fn validate_required(value: &str, message: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(message.to_string());
    }
    Ok(())
}

pub fn validate_max_len(value: &str, max: usize, label: &str) -> Result<(), String> {
    if value.chars().count() > max {
        return Err(format!("{} cannot exceed {} characters", label, max));
    }
    Ok(())
}

/// Any non-blank number is accepted; formats vary too much by country
pub fn validate_phone(phone: &str) -> Result<(), String> {
    validate_required(phone, "Phone number is required")
}

pub fn validate_payment_method(method: &str) -> Result<PaymentMethod, String> {
    method
        .parse::<PaymentMethod>()
        .map_err(|_| "Invalid payment method".to_string())
}

/// Every field of a shipping address except the country is required
pub fn validate_address(address: &Address, prefix: &str, errors: &mut ValidationErrorBuilder) {
    let field = |name: &str| format!("{}.{}", prefix, name);

    errors.check(
        &field("firstName"),
        validate_required(&address.first_name, "First name is required"),
    );
    errors.check(
        &field("lastName"),
        validate_required(&address.last_name, "Last name is required"),
    );
    errors.check(
        &field("email"),
        validate_email(&address.email).map_err(|_| "Valid email is required".to_string()),
    );
    errors.check(&field("phone"), validate_phone(&address.phone));
    errors.check(
        &field("address"),
        validate_required(&address.address, "Address is required"),
    );
    errors.check(
        &field("city"),
        validate_required(&address.city, "City is required"),
    );
    errors.check(
        &field("state"),
        validate_required(&address.state, "State is required"),
    );
    errors.check(
        &field("zipCode"),
        validate_required(&address.zip_code, "Zip code is required"),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_email() {
        assert!(validate_email("buyer@example.com").is_ok());
        assert!(validate_email("first.last+tag@shop.co.in").is_ok());
        assert!(validate_email("  padded@example.com ").is_ok());

        assert!(validate_email("").is_err());
        assert!(validate_email("no-at-sign").is_err());
        assert!(validate_email("two@@example.com").is_err());
        assert!(validate_email("space @example.com").is_err());
        assert!(validate_email("user@localhost").is_err());
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("Al", "First name").is_ok());
        assert!(validate_name(" A ", "First name").is_err());
        assert!(validate_name("", "Last name")
            .unwrap_err()
            .starts_with("Last name"));
    }

    #[test]
    fn test_validate_password() {
        assert!(validate_password("secret").is_ok());
        assert!(validate_password("12345").is_err());
    }

    #[test]
    fn test_validate_uuid() {
        assert!(validate_uuid("550e8400-e29b-41d4-a716-446655440000", "productId").is_ok());
        assert!(validate_uuid("", "productId").is_err());
        assert!(validate_uuid("not-a-uuid", "productId").is_err());
    }

    #[test]
    fn test_validate_phone() {
        assert!(validate_phone("+91 98765 43210").is_ok());
        assert!(validate_phone("(555) 010-0199").is_ok());
        assert!(validate_phone("12345").is_ok());
        assert!(validate_phone("").is_err());
        assert!(validate_phone("   ").is_err());
    }

    #[test]
    fn test_validate_payment_method() {
        assert_eq!(
            validate_payment_method("upi_gpay").unwrap(),
            PaymentMethod::UpiGpay
        );
        assert!(validate_payment_method("cash").is_err());
    }

    #[test]
    fn test_validate_address_lists_every_missing_field() {
        let mut errors = ValidationErrorBuilder::new();
        validate_address(&Address::default(), "shippingAddress", &mut errors);
        let err = errors.build().unwrap();
        assert!(err.message().contains("8 fields"));

        let complete = Address {
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            email: "ada@example.com".to_string(),
            phone: "5550100199".to_string(),
            address: "1 Analytical Way".to_string(),
            city: "London".to_string(),
            state: "LDN".to_string(),
            zip_code: "00001".to_string(),
            country: String::new(),
        };
        let mut errors = ValidationErrorBuilder::new();
        validate_address(&complete, "shippingAddress", &mut errors);
        assert!(errors.is_empty());
    }
}
