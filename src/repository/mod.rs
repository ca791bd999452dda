//! Repository layer for database operations
//!
//! Every table is reached through the generic [`EntityRepository`] trait.
//! Two backends implement [`Database`]: PostgreSQL through sqlx and an
//! in-process store used by tests and `memory://` deployments.

pub mod entity;
pub mod memory;
pub mod navigation;
pub mod postgres;
pub mod query;
pub mod schema;

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{
        Author, AuthorBook, Book, BookPublisher, Category, CategoryBook, LoanTransaction, Member,
        OperationClaim, Publisher, Reservation, User, UserOperationClaim,
    },
};

pub use entity::{Entity, UniqueKey, OPEN_LOAN_INDEX};
pub use memory::MemoryDatabase;
pub use postgres::PgDatabase;
pub use query::{Condition, FieldValue, Page, PageRequest, Query, SortDirection};

/// Data access for one entity type
#[async_trait]
pub trait EntityRepository<E: Entity>: Send + Sync {
    /// First row matching the query
    async fn get(&self, query: Query) -> AppResult<Option<E>>;

    async fn list(&self, query: Query) -> AppResult<Page<E>>;

    async fn any(&self, query: Query) -> AppResult<bool>;

    /// Insert a row; audit timestamps are reset
    async fn add(&self, entity: E) -> AppResult<E>;

    /// Replace a live row; sets `updated_date`
    async fn update(&self, entity: E) -> AppResult<E>;

    /// Soft delete (sets `deleted_date`) or remove the row. Dependent rows follow.
    async fn delete(&self, entity: E, permanent: bool) -> AppResult<E>;

    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<E>> {
        self.get(Query::by_id(id)).await
    }
}

/// A set of table repositories sharing one connection or transaction
#[async_trait]
pub trait Database: Send + Sync {
    fn authors(&self) -> &dyn EntityRepository<Author>;
    fn books(&self) -> &dyn EntityRepository<Book>;
    fn categories(&self) -> &dyn EntityRepository<Category>;
    fn publishers(&self) -> &dyn EntityRepository<Publisher>;
    fn author_books(&self) -> &dyn EntityRepository<AuthorBook>;
    fn category_books(&self) -> &dyn EntityRepository<CategoryBook>;
    fn book_publishers(&self) -> &dyn EntityRepository<BookPublisher>;
    fn members(&self) -> &dyn EntityRepository<Member>;
    fn loan_transactions(&self) -> &dyn EntityRepository<LoanTransaction>;
    fn reservations(&self) -> &dyn EntityRepository<Reservation>;
    fn users(&self) -> &dyn EntityRepository<User>;
    fn operation_claims(&self) -> &dyn EntityRepository<OperationClaim>;
    fn user_operation_claims(&self) -> &dyn EntityRepository<UserOperationClaim>;

    /// Start a transaction. Inside a transaction this joins the current one.
    async fn begin(&self) -> AppResult<Arc<dyn Database>>;

    /// No-op unless this handle started the transaction
    async fn commit(&self) -> AppResult<()>;

    async fn rollback(&self) -> AppResult<()>;

    async fn ping(&self) -> AppResult<()>;
}

/// Whether a database handle owns, joins or lacks a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Scope {
    Autocommit,
    Transaction,
    Joined,
}

/// Binds an entity type to its repository in a [`Database`]
pub trait Table: Entity {
    /// Label used in error messages
    const LABEL: &'static str;

    fn repository(db: &dyn Database) -> &dyn EntityRepository<Self>;
}

macro_rules! tables {
    ($($entity:ty => $accessor:ident, $label:literal;)*) => {
        $(
            impl Table for $entity {
                const LABEL: &'static str = $label;

                fn repository(db: &dyn Database) -> &dyn EntityRepository<Self> {
                    db.$accessor()
                }
            }
        )*
    };
}

tables! {
    Author => authors, "Author";
    Book => books, "Book";
    Category => categories, "Category";
    Publisher => publishers, "Publisher";
    AuthorBook => author_books, "Author book";
    CategoryBook => category_books, "Category book";
    BookPublisher => book_publishers, "Book publisher";
    Member => members, "Member";
    LoanTransaction => loan_transactions, "Loan transaction";
    Reservation => reservations, "Reservation";
    User => users, "User";
    OperationClaim => operation_claims, "Operation claim";
    UserOperationClaim => user_operation_claims, "User operation claim";
}

/// Rejects queries naming columns the entity does not have
pub(crate) fn check_columns<E: Entity>(query: &Query) -> AppResult<()> {
    match query.columns().find(|column| !E::has_column(column)) {
        Some(column) => Err(AppError::Internal(format!(
            "Unknown column {}.{}",
            E::TABLE,
            column
        ))),
        None => Ok(()),
    }
}

/// Main repository handle, cheap to clone
#[derive(Clone)]
pub struct Repository {
    db: Arc<dyn Database>,
}

impl Repository {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    /// Repository backed by the given PostgreSQL pool
    pub fn postgres(pool: Pool<Postgres>) -> Self {
        Self::new(Arc::new(PgDatabase::new(pool)))
    }

    /// Repository backed by a fresh in-process store
    pub fn memory() -> Self {
        Self::new(Arc::new(MemoryDatabase::new()))
    }

    pub fn table<E: Table>(&self) -> &dyn EntityRepository<E> {
        E::repository(self.db.as_ref())
    }

    /// Live row by id, or `NotFound`
    pub async fn require<E: Table>(&self, id: Uuid) -> AppResult<E> {
        self.table::<E>()
            .get_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("{} not found", E::LABEL)))
    }

    pub async fn begin(&self) -> AppResult<Repository> {
        Ok(Self::new(self.db.begin().await?))
    }

    pub async fn commit(&self) -> AppResult<()> {
        self.db.commit().await
    }

    pub async fn rollback(&self) -> AppResult<()> {
        self.db.rollback().await
    }

    pub async fn ping(&self) -> AppResult<()> {
        self.db.ping().await
    }
}
