//! Business rules checked before mutating commands
//!
//! Each check reads through the repository it is given, so inside a
//! command it sees the command's own transaction.

pub mod book;
pub mod loan_transaction;
pub mod reservation;
pub mod user;

use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    repository::{Condition, FieldValue, Query, Repository, Table},
};

/// Fails when a live row of `E` matches `query`
pub(crate) async fn ensure_absent<E: Table>(
    repository: &Repository,
    query: Query,
    message: &str,
) -> AppResult<()> {
    if repository.table::<E>().any(query).await? {
        return Err(AppError::BusinessRule(message.to_string()));
    }
    Ok(())
}

/// Restricts a uniqueness query to rows other than `id`
pub(crate) fn excluding(query: Query, id: Option<Uuid>) -> Query {
    match id {
        Some(id) => query.filter(Condition::Ne("id", FieldValue::Uuid(id))),
        None => query,
    }
}

/// Requires a live row when a reference is set
pub(crate) async fn require_optional<E: Table>(
    repository: &Repository,
    id: Option<Uuid>,
) -> AppResult<Option<E>> {
    match id {
        Some(id) => repository.require::<E>(id).await.map(Some),
        None => Ok(None),
    }
}
