//! Library member model

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::audit::Audit;

/// Member model from database. Each member belongs to exactly one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Member {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    /// Argon2 hash
    #[serde(skip_serializing, default)]
    #[schema(write_only)]
    pub password: String,
    pub user_id: Uuid,
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub audit: Audit,
}

impl Member {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Create member request.
/// Without `user_id` a user account is created with the same email and password.
#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
pub struct CreateMember {
    #[validate(length(min = 1, max = 100))]
    pub first_name: String,
    #[validate(length(min = 1, max = 100))]
    pub last_name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 6))]
    pub password: String,
    pub user_id: Option<Uuid>,
}

/// Update member request
#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
pub struct UpdateMember {
    #[validate(length(min = 1, max = 100))]
    pub first_name: String,
    #[validate(length(min = 1, max = 100))]
    pub last_name: String,
    #[validate(email)]
    pub email: String,
    /// New password, kept unchanged when absent
    #[validate(length(min = 6))]
    pub password: Option<String>,
}
