//! Data models for the library

pub mod audit;
pub mod author;
pub mod book;
pub mod category;
pub mod loan_transaction;
pub mod member;
pub mod publisher;
pub mod reservation;
pub mod user;

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

// Re-export commonly used types
pub use audit::Audit;
pub use author::{Author, AuthorBook};
pub use book::{Book, BookDetails, BookInclude};
pub use category::{Category, CategoryBook};
pub use loan_transaction::{LoanTransaction, LoanTransactionDetails, LoanTransactionInclude, ReturnStatus};
pub use member::Member;
pub use publisher::{BookPublisher, Publisher};
pub use reservation::Reservation;
pub use user::{AuthenticatorType, OperationClaim, User, UserClaims, UserOperationClaim};

/// Common list parameters: paging and an optional name filter
#[derive(Debug, Clone, Default, Serialize, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct ListQuery {
    /// Case-insensitive match on the name (last name for members, email for users)
    pub name: Option<String>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}
