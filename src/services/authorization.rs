//! Capability-based authorization
//!
//! An operation lists the capability strings it requires. A caller is
//! allowed to run it when every required capability is among the ones
//! granted to them through their operation claims. There is no hierarchy:
//! `Books.Admin` does not imply `Books.Read`.

use std::collections::HashSet;

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{OperationClaim, UserOperationClaim},
    repository::{Condition, FieldValue, Query, Repository},
};

/// Catalog of capability strings
pub mod capabilities {
    pub const ADMIN: &str = "Admin";

    macro_rules! area {
        ($module:ident, $area:literal) => {
            pub mod $module {
                pub const ADMIN: &str = concat!($area, ".Admin");
                pub const READ: &str = concat!($area, ".Read");
                pub const WRITE: &str = concat!($area, ".Write");
                pub const CREATE: &str = concat!($area, ".Create");
                pub const UPDATE: &str = concat!($area, ".Update");
                pub const DELETE: &str = concat!($area, ".Delete");

                pub const ALL: [&str; 6] = [ADMIN, READ, WRITE, CREATE, UPDATE, DELETE];
            }
        };
    }

    area!(auth, "Auth");
    area!(operation_claims, "OperationClaims");
    area!(user_operation_claims, "UserOperationClaims");
    area!(users, "Users");
    area!(books, "Books");
    area!(authors, "Authors");
    area!(categories, "Categories");
    area!(publishers, "Publishers");
    area!(author_books, "AuthorBooks");
    area!(category_books, "CategoryBooks");
    area!(book_publishers, "BookPublishers");
    area!(members, "Members");
    area!(loan_transactions, "LoanTransactions");
    area!(reservations, "Reservations");

    /// Every capability, as synchronized into `operation_claims`
    pub fn catalog() -> Vec<&'static str> {
        let areas = [
            auth::ALL,
            operation_claims::ALL,
            user_operation_claims::ALL,
            users::ALL,
            books::ALL,
            authors::ALL,
            categories::ALL,
            publishers::ALL,
            author_books::ALL,
            category_books::ALL,
            book_publishers::ALL,
            members::ALL,
            loan_transactions::ALL,
            reservations::ALL,
        ];
        std::iter::once(ADMIN)
            .chain(areas.into_iter().flatten())
            .collect()
    }
}

/// Identity on whose behalf an operation runs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Caller {
    pub user_id: Option<Uuid>,
}

impl Caller {
    pub fn user(user_id: Uuid) -> Self {
        Self {
            user_id: Some(user_id),
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }
}

/// Set of capability strings granted to a caller
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities(HashSet<String>);

impl Capabilities {
    pub fn contains(&self, capability: &str) -> bool {
        self.0.contains(capability)
    }

    /// Required capabilities that are not granted
    pub fn missing<'a>(&self, required: &[&'a str]) -> Vec<&'a str> {
        required
            .iter()
            .copied()
            .filter(|capability| !self.contains(capability))
            .collect()
    }

    pub fn allows(&self, required: &[&str]) -> bool {
        self.missing(required).is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for Capabilities {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Resolves the capabilities granted to a caller
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn granted(&self, caller: &Caller) -> AppResult<Capabilities>;
}

/// Check `required ⊆ granted` for the caller
pub async fn authorize(
    authorizer: &dyn Authorizer,
    caller: &Caller,
    required: &[&str],
) -> AppResult<()> {
    if required.is_empty() {
        return Ok(());
    }
    if caller.user_id.is_none() {
        return Err(AppError::Authentication("Authentication required".to_string()));
    }

    let granted = authorizer.granted(caller).await?;
    let missing = granted.missing(required);
    if missing.is_empty() {
        Ok(())
    } else {
        Err(AppError::Authorization(format!(
            "Missing capabilities: {}",
            missing.join(", ")
        )))
    }
}

/// Reads grants from `user_operation_claims` joined to `operation_claims`
#[derive(Clone)]
pub struct ClaimsAuthorizer {
    repository: Repository,
}

impl ClaimsAuthorizer {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl Authorizer for ClaimsAuthorizer {
    async fn granted(&self, caller: &Caller) -> AppResult<Capabilities> {
        let Some(user_id) = caller.user_id else {
            return Ok(Capabilities::default());
        };

        let grants = self
            .repository
            .table::<UserOperationClaim>()
            .list(Query::new().eq("user_id", user_id))
            .await?
            .items;
        if grants.is_empty() {
            return Ok(Capabilities::default());
        }

        let claim_ids = grants
            .iter()
            .map(|grant| FieldValue::Uuid(grant.operation_claim_id))
            .collect();
        let claims = self
            .repository
            .table::<OperationClaim>()
            .list(Query::new().filter(Condition::In("id", claim_ids)))
            .await?
            .items;

        Ok(claims.into_iter().map(|claim| claim.name).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subset_check() {
        let granted: Capabilities = ["Books.Create", "Books.Read"].into_iter().collect();
        assert!(granted.allows(&["Books.Create"]));
        assert!(granted.allows(&[]));
        assert!(!granted.allows(&["Books.Create", "Books.Delete"]));
        assert_eq!(granted.missing(&["Books.Delete", "Books.Read"]), vec!["Books.Delete"]);
    }

    #[test]
    fn test_no_hierarchy() {
        let granted: Capabilities = [capabilities::ADMIN, capabilities::books::ADMIN]
            .into_iter()
            .collect();
        assert!(!granted.allows(&[capabilities::books::READ]));
    }

    #[test]
    fn test_catalog() {
        let catalog = capabilities::catalog();
        assert_eq!(catalog.len(), 1 + 14 * 6);
        assert!(catalog.contains(&"Members.Admin"));
        assert!(catalog.contains(&"LoanTransactions.Create"));
        let unique: HashSet<_> = catalog.iter().collect();
        assert_eq!(unique.len(), catalog.len());
    }

    #[tokio::test]
    async fn test_anonymous_caller_needs_authentication() {
        let mut authorizer = MockAuthorizer::new();
        authorizer.expect_granted().never();

        let result = authorize(&authorizer, &Caller::anonymous(), &["Books.Read"]).await;
        assert!(matches!(result, Err(AppError::Authentication(_))));
    }

    #[tokio::test]
    async fn test_missing_capability_is_forbidden() {
        let mut authorizer = MockAuthorizer::new();
        authorizer
            .expect_granted()
            .returning(|_| Ok(["Books.Read"].into_iter().collect()));

        let caller = Caller::user(Uuid::new_v4());
        tokio_test::assert_ok!(authorize(&authorizer, &caller, &["Books.Read"]).await);
        let result = authorize(&authorizer, &caller, &["Books.Delete"]).await;
        assert!(matches!(result, Err(AppError::Authorization(message)) if message.contains("Books.Delete")));
    }

    #[tokio::test]
    async fn test_open_operations_skip_lookup() {
        let mut authorizer = MockAuthorizer::new();
        authorizer.expect_granted().never();
        tokio_test::assert_ok!(authorize(&authorizer, &Caller::anonymous(), &[]).await);
    }
}
