//! Author model and the author/book join entity

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::audit::Audit;

/// Author model from database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Author {
    pub id: Uuid,
    pub name: String,
    pub identity_number: String,
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub audit: Audit,
}

/// Link between an author and a book
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct AuthorBook {
    pub id: Uuid,
    pub author_id: Uuid,
    pub book_id: Uuid,
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub audit: Audit,
}

/// Create author request
#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
pub struct CreateAuthor {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(min = 1, max = 50))]
    pub identity_number: String,
}

/// Update author request
#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
pub struct UpdateAuthor {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(min = 1, max = 50))]
    pub identity_number: String,
}
