//! Loan transaction model and related types

use chrono::{DateTime, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use super::{audit::Audit, book::Book, member::Member};

/// Hour of the day (UTC) at which every loan falls due
pub const RETURN_HOUR: u32 = 17;

/// Return state of a loan
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema,
)]
#[repr(i32)]
pub enum ReturnStatus {
    #[default]
    Unreturned = 0,
    Returned = 1,
}

impl From<ReturnStatus> for i32 {
    fn from(status: ReturnStatus) -> Self {
        status as i32
    }
}

/// Moves a requested due date to 17:00:00 on the same calendar day
pub fn normalize_return_time(requested: DateTime<Utc>) -> DateTime<Utc> {
    let due = NaiveTime::from_hms_opt(RETURN_HOUR, 0, 0).unwrap_or_default();
    Utc.from_utc_datetime(&requested.date_naive().and_time(due))
}

/// Loan transaction model from database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct LoanTransaction {
    pub id: Uuid,
    pub member_id: Uuid,
    pub book_id: Uuid,
    pub return_status: ReturnStatus,
    /// Due date, always at 17:00:00
    pub return_time: DateTime<Utc>,
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub audit: Audit,
}

impl LoanTransaction {
    pub fn is_active(&self) -> bool {
        self.return_status == ReturnStatus::Unreturned && !self.audit.is_deleted()
    }
}

/// Create loan transaction request
#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
pub struct CreateLoanTransaction {
    pub member_id: Uuid,
    pub book_id: Uuid,
    #[serde(default)]
    pub return_status: ReturnStatus,
    /// Requested due date; the time of day is replaced by 17:00:00
    pub return_time: DateTime<Utc>,
}

/// Update loan transaction request
#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
pub struct UpdateLoanTransaction {
    pub member_id: Uuid,
    pub book_id: Uuid,
    pub return_status: ReturnStatus,
    pub return_time: DateTime<Utc>,
}

/// Response returned once a loan has been recorded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CreatedLoanTransactionResponse {
    pub id: Uuid,
    pub member_id: Uuid,
    pub book_id: Uuid,
    pub return_status: ReturnStatus,
    pub return_time: DateTime<Utc>,
    pub created_date: DateTime<Utc>,
}

impl From<LoanTransaction> for CreatedLoanTransactionResponse {
    fn from(loan: LoanTransaction) -> Self {
        Self {
            id: loan.id,
            member_id: loan.member_id,
            book_id: loan.book_id,
            return_status: loan.return_status,
            return_time: loan.return_time,
            created_date: loan.audit.created_date,
        }
    }
}

/// Loan transaction search parameters
#[derive(Debug, Clone, Default, Serialize, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct LoanTransactionQuery {
    pub member_id: Option<Uuid>,
    pub book_id: Option<Uuid>,
    pub return_status: Option<ReturnStatus>,
    /// Only loans whose due date has passed
    pub overdue: Option<bool>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

/// Navigation properties that can be loaded with a loan transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum LoanTransactionInclude {
    Member,
    Book,
}

/// Loan transaction with its member and book
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoanTransactionDetails {
    #[serde(flatten)]
    pub loan_transaction: LoanTransaction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub member: Option<Member>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub book: Option<Book>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_normalize_return_time_keeps_date() {
        let requested = Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap();
        let due = normalize_return_time(requested);
        assert_eq!(due, Utc.with_ymd_and_hms(2024, 6, 1, 17, 0, 0).unwrap());
    }

    #[test]
    fn test_normalize_return_time_drops_sub_seconds() {
        let requested = Utc.with_ymd_and_hms(2024, 12, 31, 23, 59, 59).unwrap()
            + chrono::Duration::milliseconds(750);
        let due = normalize_return_time(requested);
        assert_eq!((due.hour(), due.minute(), due.second()), (17, 0, 0));
        assert_eq!(due.nanosecond(), 0);
        assert_eq!(due.date_naive(), requested.date_naive());
    }

    #[test]
    fn test_return_status_defaults_to_unreturned() {
        let request: CreateLoanTransaction = serde_json::from_value(serde_json::json!({
            "member_id": Uuid::new_v4(),
            "book_id": Uuid::new_v4(),
            "return_time": "2024-06-01T09:00:00Z",
        }))
        .unwrap();
        assert_eq!(request.return_status, ReturnStatus::Unreturned);
    }
}
