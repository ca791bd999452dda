//! Reservation model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use super::audit::Audit;

/// A member's hold on a book for a period of time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Reservation {
    pub id: Uuid,
    pub book_id: Uuid,
    pub member_id: Uuid,
    pub reservation_date: DateTime<Utc>,
    pub expiration_date: DateTime<Utc>,
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub audit: Audit,
}

/// Create or update reservation request
#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
pub struct ReservationRequest {
    pub book_id: Uuid,
    pub member_id: Uuid,
    pub reservation_date: DateTime<Utc>,
    pub expiration_date: DateTime<Utc>,
}

/// Reservation search parameters
#[derive(Debug, Clone, Default, Serialize, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct ReservationQuery {
    pub book_id: Option<Uuid>,
    pub member_id: Option<Uuid>,
    /// Only reservations that have not expired yet
    pub active: Option<bool>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}
