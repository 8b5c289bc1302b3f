use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Company profile owned by a single user.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Company {
    pub company_id: String,
    pub user_id: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub phone: Option<String>,
    pub photo: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}
