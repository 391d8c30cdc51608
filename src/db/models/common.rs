//! Common types and utilities shared across models.

use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Helper to parse a JSON column, falling back to the type's default
pub fn parse_json_column<T: DeserializeOwned + Default>(json: Option<&str>) -> T {
    json.and_then(|s| serde_json::from_str(s).ok())
        .unwrap_or_default()
}

/// Helper to serialize a value into a JSON column
pub fn to_json_column<T: Serialize>(value: &T) -> Option<String> {
    serde_json::to_string(value).ok()
}

/// Query parameters accepted by every paginated listing
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl PageQuery {
    /// Resolve page/limit the way the storefront always has: missing or
    /// non-positive values fall back to page 1 and the endpoint's default size
    pub fn resolve(&self, default_limit: i64) -> (i64, i64) {
        let page = self.page.filter(|p| *p > 0).unwrap_or(1);
        let limit = self
            .limit
            .filter(|l| *l > 0)
            .unwrap_or(default_limit)
            .min(100);
        (page, limit)
    }
}

/// Pagination block included in list responses
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub pages: i64,
}

impl Pagination {
    pub fn new(page: i64, limit: i64, total: i64) -> Self {
        let pages = if limit > 0 { (total + limit - 1) / limit } else { 0 };
        Self {
            page,
            limit,
            total,
            pages,
        }
    }

    /// Row offset for the SQL `OFFSET` clause
    pub fn offset(page: i64, limit: i64) -> i64 {
        (page - 1) * limit
    }
}
