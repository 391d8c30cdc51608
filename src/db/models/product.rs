//! Catalog models: products, images, reviews.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::HashMap;

use super::common::{parse_json_column, to_json_column};
use crate::commerce::inventory;

/// Product lifecycle status; only `Active` products are purchasable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus {
    #[default]
    Active,
    Inactive,
    Draft,
    Archived,
}

impl std::fmt::Display for ProductStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProductStatus::Active => write!(f, "active"),
            ProductStatus::Inactive => write!(f, "inactive"),
            ProductStatus::Draft => write!(f, "draft"),
            ProductStatus::Archived => write!(f, "archived"),
        }
    }
}

impl std::str::FromStr for ProductStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(ProductStatus::Active),
            "inactive" => Ok(ProductStatus::Inactive),
            "draft" => Ok(ProductStatus::Draft),
            "archived" => Ok(ProductStatus::Archived),
            _ => Err(format!("Unknown product status: {}", s)),
        }
    }
}

impl From<String> for ProductStatus {
    fn from(s: String) -> Self {
        // Unknown statuses must never make a product purchasable
        s.parse().unwrap_or(ProductStatus::Inactive)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProductImage {
    pub url: String,
    #[serde(default)]
    pub alt: String,
    #[serde(default)]
    pub is_primary: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Dimensions {
    pub length: Option<f64>,
    pub width: Option<f64>,
    pub height: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ShippingInfo {
    pub weight: Option<f64>,
    pub dimensions: Option<Dimensions>,
    #[serde(default)]
    pub free_shipping: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProductAttribute {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProductVariant {
    pub name: Option<String>,
    pub price: Option<f64>,
    pub inventory: Option<i64>,
    pub sku: Option<String>,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

/// Product row
#[derive(Debug, Clone, FromRow)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub description: String,
    pub price: f64,
    pub original_price: Option<f64>,
    pub category: String,
    pub subcategory: Option<String>,
    pub brand: Option<String>,
    pub images: Option<String>,
    pub quantity: i64,
    pub sku: Option<String>,
    pub track_inventory: bool,
    pub shipping: Option<String>,
    pub seo_title: Option<String>,
    pub seo_description: Option<String>,
    pub slug: Option<String>,
    pub tags: Option<String>,
    pub attributes: Option<String>,
    pub variants: Option<String>,
    pub average_rating: f64,
    pub review_count: i64,
    pub status: String,
    pub featured: bool,
    pub on_sale: bool,
    pub sale_start: Option<String>,
    pub sale_end: Option<String>,
    pub discount_percentage: Option<f64>,
    pub created_by: String,
    pub sales_count: i64,
    pub view_count: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl Product {
    pub fn status_enum(&self) -> ProductStatus {
        ProductStatus::from(self.status.clone())
    }

    pub fn images(&self) -> Vec<ProductImage> {
        parse_json_column(self.images.as_deref())
    }

    /// The image flagged primary, else the first one
    pub fn primary_image(&self) -> Option<ProductImage> {
        let images = self.images();
        images
            .iter()
            .find(|img| img.is_primary)
            .cloned()
            .or_else(|| images.into_iter().next())
    }

    /// Whether `requested` units may be bought right now
    pub fn is_available(&self, requested: i64) -> bool {
        inventory::is_available(
            self.status_enum(),
            self.track_inventory,
            self.quantity,
            requested,
        )
    }

    /// Sale price when a discount is active, else the list price
    pub fn discount_price(&self) -> f64 {
        match self.discount_percentage {
            Some(pct) if self.on_sale && pct > 0.0 => self.price * (1.0 - pct / 100.0),
            _ => self.price,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryView {
    pub quantity: i64,
    pub sku: Option<String>,
    pub track_inventory: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeoView {
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
    pub slug: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductResponse {
    pub id: String,
    pub name: String,
    pub description: String,
    pub price: f64,
    pub original_price: Option<f64>,
    pub discount_price: f64,
    pub category: String,
    pub subcategory: Option<String>,
    pub brand: Option<String>,
    pub images: Vec<ProductImage>,
    pub primary_image: Option<ProductImage>,
    pub inventory: InventoryView,
    pub shipping: ShippingInfo,
    pub seo: SeoView,
    pub tags: Vec<String>,
    pub attributes: Vec<ProductAttribute>,
    pub variants: Vec<ProductVariant>,
    pub average_rating: f64,
    pub review_count: i64,
    pub status: ProductStatus,
    pub featured: bool,
    pub on_sale: bool,
    pub sale_start: Option<String>,
    pub sale_end: Option<String>,
    pub discount_percentage: Option<f64>,
    pub created_by: String,
    pub sales_count: i64,
    pub view_count: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Product> for ProductResponse {
    fn from(p: Product) -> Self {
        let images = p.images();
        let primary_image = p.primary_image();
        let discount_price = p.discount_price();
        let status = p.status_enum();
        Self {
            images,
            primary_image,
            discount_price,
            status,
            inventory: InventoryView {
                quantity: p.quantity,
                sku: p.sku,
                track_inventory: p.track_inventory,
            },
            shipping: parse_json_column(p.shipping.as_deref()),
            seo: SeoView {
                meta_title: p.seo_title,
                meta_description: p.seo_description,
                slug: p.slug,
            },
            tags: parse_json_column(p.tags.as_deref()),
            attributes: parse_json_column(p.attributes.as_deref()),
            variants: parse_json_column(p.variants.as_deref()),
            id: p.id,
            name: p.name,
            description: p.description,
            price: p.price,
            original_price: p.original_price,
            category: p.category,
            subcategory: p.subcategory,
            brand: p.brand,
            average_rating: p.average_rating,
            review_count: p.review_count,
            featured: p.featured,
            on_sale: p.on_sale,
            sale_start: p.sale_start,
            sale_end: p.sale_end,
            discount_percentage: p.discount_percentage,
            created_by: p.created_by,
            sales_count: p.sales_count,
            view_count: p.view_count,
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryInput {
    pub quantity: Option<i64>,
    pub sku: Option<String>,
    pub track_inventory: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeoInput {
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
    pub slug: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProductRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: Option<f64>,
    pub original_price: Option<f64>,
    #[serde(default)]
    pub category: String,
    pub subcategory: Option<String>,
    pub brand: Option<String>,
    #[serde(default)]
    pub images: Vec<ProductImage>,
    #[serde(default)]
    pub inventory: InventoryInput,
    pub shipping: Option<ShippingInfo>,
    #[serde(default)]
    pub seo: SeoInput,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub attributes: Vec<ProductAttribute>,
    #[serde(default)]
    pub variants: Vec<ProductVariant>,
    pub status: Option<String>,
    pub featured: Option<bool>,
    pub on_sale: Option<bool>,
    pub sale_start: Option<String>,
    pub sale_end: Option<String>,
    pub discount_percentage: Option<f64>,
}

/// Partial product update. Stock levels are not editable here; they move
/// only through the inventory adjustment endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub original_price: Option<f64>,
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub brand: Option<String>,
    pub images: Option<Vec<ProductImage>>,
    pub inventory: Option<InventoryInput>,
    pub shipping: Option<ShippingInfo>,
    pub seo: Option<SeoInput>,
    pub tags: Option<Vec<String>>,
    pub attributes: Option<Vec<ProductAttribute>>,
    pub variants: Option<Vec<ProductVariant>>,
    pub status: Option<String>,
    pub featured: Option<bool>,
    pub on_sale: Option<bool>,
    pub sale_start: Option<String>,
    pub sale_end: Option<String>,
    pub discount_percentage: Option<f64>,
}

/// A validated product ready for insertion, with derived fields computed once
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub id: String,
    pub name: String,
    pub description: String,
    pub price: f64,
    pub original_price: Option<f64>,
    pub category: String,
    pub subcategory: Option<String>,
    pub brand: Option<String>,
    pub images: Option<String>,
    pub quantity: i64,
    pub sku: Option<String>,
    pub track_inventory: bool,
    pub shipping: Option<String>,
    pub seo_title: Option<String>,
    pub seo_description: Option<String>,
    pub slug: String,
    pub tags: Option<String>,
    pub attributes: Option<String>,
    pub variants: Option<String>,
    pub status: ProductStatus,
    pub featured: bool,
    pub on_sale: bool,
    pub sale_start: Option<String>,
    pub sale_end: Option<String>,
    pub discount_percentage: Option<f64>,
    pub created_by: String,
}

impl NewProduct {
    /// Build from an already-validated request
    pub fn from_request(req: CreateProductRequest, created_by: &str) -> Self {
        let slug = req
            .seo
            .slug
            .clone()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| generate_slug(&req.name));

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: req.name.trim().to_string(),
            description: req.description,
            price: req.price.unwrap_or(0.0),
            original_price: req.original_price,
            category: req.category.trim().to_string(),
            subcategory: req.subcategory,
            brand: req.brand,
            images: to_json_column(&req.images),
            quantity: req.inventory.quantity.unwrap_or(0),
            sku: req.inventory.sku,
            track_inventory: req.inventory.track_inventory.unwrap_or(true),
            shipping: to_json_column(&req.shipping.unwrap_or_default()),
            seo_title: req.seo.meta_title,
            seo_description: req.seo.meta_description,
            slug,
            tags: to_json_column(&req.tags),
            attributes: to_json_column(&req.attributes),
            variants: to_json_column(&req.variants),
            status: req
                .status
                .and_then(|s| s.parse().ok())
                .unwrap_or_default(),
            featured: req.featured.unwrap_or(false),
            on_sale: req.on_sale.unwrap_or(false),
            sale_start: req.sale_start,
            sale_end: req.sale_end,
            discount_percentage: req.discount_percentage,
            created_by: created_by.to_string(),
        }
    }
}

/// Generate a URL-friendly slug from a name
pub fn generate_slug(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// Product review row
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ProductReview {
    pub id: String,
    pub product_id: String,
    pub user_id: String,
    pub rating: i64,
    pub title: Option<String>,
    pub comment: Option<String>,
    pub verified: bool,
    pub helpful: i64,
    pub created_at: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateReviewRequest {
    pub rating: Option<i64>,
    pub title: Option<String>,
    pub comment: Option<String>,
}

/// Catalog listing filters (`GET /api/products`)
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub category: Option<String>,
    pub brand: Option<String>,
    pub search: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub featured: Option<bool>,
    pub sort: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdjustInventoryRequest {
    pub delta: i64,
}
