use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Category {
    pub category_id: String,
    pub name: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Product {
    pub product_id: String,
    pub user_id: String,
    pub category_id: Option<String>,
    /// Barcode used by the checkout flow and Excel import matching.
    pub code: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub price: f64,
    pub stock: i64,
    pub image: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}
