//! Reservation rules

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{ensure_absent, excluding};
use crate::{
    error::{AppError, AppResult},
    models::Reservation,
    repository::{Condition, Query, Repository},
};

pub const BOOK_ALREADY_RESERVED: &str = "Book already reserved";
pub const INVALID_RESERVATION_PERIOD: &str = "Reservation expiration must be after reservation date";

pub fn check_period(reservation_date: DateTime<Utc>, expiration_date: DateTime<Utc>) -> AppResult<()> {
    if expiration_date <= reservation_date {
        return Err(AppError::BusinessRule(INVALID_RESERVATION_PERIOD.to_string()));
    }
    Ok(())
}

/// No other live reservation for the book may still be running at `now`
pub async fn check_book_not_reserved(
    repository: &Repository,
    book_id: Uuid,
    now: DateTime<Utc>,
    except: Option<Uuid>,
) -> AppResult<()> {
    let running = Query::new()
        .eq("book_id", book_id)
        .filter(Condition::Gt("expiration_date", now.into()));

    ensure_absent::<Reservation>(repository, excluding(running, except), BOOK_ALREADY_RESERVED).await
}
