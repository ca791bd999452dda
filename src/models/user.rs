//! User, operation claim and claim assignment models

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use super::audit::Audit;
use crate::error::{AppError, AppResult};

/// Second factor configured for a user
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema,
)]
#[repr(i32)]
pub enum AuthenticatorType {
    #[default]
    None = 0,
    Email = 1,
    Otp = 2,
}

impl From<AuthenticatorType> for i32 {
    fn from(kind: AuthenticatorType) -> Self {
        kind as i32
    }
}

/// User account from database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    /// Argon2 hash
    #[serde(skip_serializing, default)]
    #[schema(write_only)]
    pub password_hash: String,
    pub authenticator_type: AuthenticatorType,
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub audit: Audit,
}

/// Named capability, e.g. `Books.Create`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct OperationClaim {
    pub id: Uuid,
    pub name: String,
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub audit: Audit,
}

/// Grant of an operation claim to a user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct UserOperationClaim {
    pub id: Uuid,
    pub user_id: Uuid,
    pub operation_claim_id: Uuid,
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub audit: Audit,
}

/// Create user request
#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
pub struct CreateUser {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 6))]
    pub password: String,
    #[serde(default)]
    pub authenticator_type: AuthenticatorType,
}

/// Update user request
#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
pub struct UpdateUser {
    #[validate(email)]
    pub email: String,
    /// New password, kept unchanged when absent
    #[validate(length(min = 6))]
    pub password: Option<String>,
    pub authenticator_type: AuthenticatorType,
}

/// Create or rename an operation claim
#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
pub struct OperationClaimRequest {
    #[validate(length(min = 2, max = 100))]
    pub name: String,
}

/// Grant a claim to a user
#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
pub struct CreateUserOperationClaim {
    pub user_id: Uuid,
    pub operation_claim_id: Uuid,
}

/// Claim assignment search parameters
#[derive(Debug, Clone, Default, Serialize, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct UserOperationClaimQuery {
    pub user_id: Option<Uuid>,
    pub operation_claim_id: Option<Uuid>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

/// JWT claims identifying the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserClaims {
    /// User id
    pub sub: String,
    pub email: String,
    pub exp: i64,
    pub iat: i64,
}

impl UserClaims {
    pub fn new(user: &User, expiration_hours: u64) -> Self {
        let now = Utc::now();
        let hours = i64::try_from(expiration_hours).unwrap_or(i64::MAX / 3600);
        Self {
            sub: user.id.to_string(),
            email: user.email.clone(),
            exp: (now + chrono::Duration::hours(hours)).timestamp(),
            iat: now.timestamp(),
        }
    }

    /// Create a new JWT token
    pub fn create_token(&self, secret: &str) -> Result<String, jsonwebtoken::errors::Error> {
        use jsonwebtoken::{encode, EncodingKey, Header};
        encode(
            &Header::default(),
            self,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
    }

    /// Parse JWT token
    pub fn from_token(token: &str, secret: &str) -> Result<Self, jsonwebtoken::errors::Error> {
        use jsonwebtoken::{decode, DecodingKey, Validation};
        let token_data = decode::<Self>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::default(),
        )?;
        Ok(token_data.claims)
    }

    pub fn user_id(&self) -> AppResult<Uuid> {
        Uuid::parse_str(&self.sub)
            .map_err(|_| AppError::Authentication("Invalid subject in token".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_round_trip_keeps_subject() {
        let user = User {
            id: Uuid::new_v4(),
            email: "reader@library.local".to_string(),
            password_hash: String::new(),
            authenticator_type: AuthenticatorType::None,
            audit: Audit::new(),
        };
        let token = UserClaims::new(&user, 1).create_token("secret").unwrap();
        let claims = UserClaims::from_token(&token, "secret").unwrap();
        assert_eq!(claims.user_id().unwrap(), user.id);
        assert!(UserClaims::from_token(&token, "other-secret").is_err());
    }

    #[test]
    fn test_password_hash_is_not_serialized() {
        let user = User {
            id: Uuid::new_v4(),
            email: "reader@library.local".to_string(),
            password_hash: "$argon2id$secret".to_string(),
            authenticator_type: AuthenticatorType::Email,
            audit: Audit::new(),
        };
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["authenticator_type"], "Email");
    }
}
