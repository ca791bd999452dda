//! Publisher model and the book/publisher join entity

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::audit::Audit;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Publisher {
    pub id: Uuid,
    pub name: String,
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub audit: Audit,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct BookPublisher {
    pub id: Uuid,
    pub book_id: Uuid,
    pub publisher_id: Uuid,
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub audit: Audit,
}

/// Create or rename a publisher
#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
pub struct PublisherRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
}
