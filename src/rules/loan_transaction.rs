//! Borrow and return rules

use uuid::Uuid;

use super::{ensure_absent, excluding};
use crate::{
    error::{AppError, AppResult},
    models::{LoanTransaction, ReturnStatus},
    repository::{Query, Repository},
};

pub const BOOK_ALREADY_BORROWED: &str = "Book already borrowed";
pub const LOAN_ALREADY_RETURNED: &str = "Loan transaction already returned";

/// A book may have at most one unreturned loan. `except` skips the loan being edited.
pub async fn check_if_book_previously_borrowed(
    repository: &Repository,
    book_id: Uuid,
    except: Option<Uuid>,
) -> AppResult<()> {
    let open_loans = Query::new()
        .eq("book_id", book_id)
        .eq("return_status", ReturnStatus::Unreturned);

    ensure_absent::<LoanTransaction>(repository, excluding(open_loans, except), BOOK_ALREADY_BORROWED)
        .await
}

pub fn check_not_returned(loan: &LoanTransaction) -> AppResult<()> {
    match loan.return_status {
        ReturnStatus::Unreturned => Ok(()),
        ReturnStatus::Returned => Err(AppError::BusinessRule(LOAN_ALREADY_RETURNED.to_string())),
    }
}
