//! Audit timestamps shared by every persisted entity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

/// Creation, modification and soft-delete timestamps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Audit {
    pub created_date: DateTime<Utc>,
    pub updated_date: Option<DateTime<Utc>>,
    /// Set when the row is soft-deleted; such rows are hidden from default reads
    pub deleted_date: Option<DateTime<Utc>>,
}

impl Audit {
    pub fn new() -> Self {
        Self {
            created_date: Utc::now(),
            updated_date: None,
            deleted_date: None,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_date.is_some()
    }
}

impl Default for Audit {
    fn default() -> Self {
        Self::new()
    }
}
