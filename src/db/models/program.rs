use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Program {
    pub program_id: String,
    pub duration: i64,
    pub mode: String,
    pub active: bool,
    pub created_at: String,
}
