//! PostgreSQL backend built on sqlx query builders

use std::{marker::PhantomData, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::{future::BoxFuture, FutureExt};
use sqlx::{
    postgres::PgRow, FromRow, Pool, Postgres, QueryBuilder, Transaction,
};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    check_columns,
    entity::Entity,
    query::{Condition, FieldValue, Page, Query, SortDirection},
    schema, Database, EntityRepository, Scope,
};
use crate::{
    error::{AppError, AppResult},
    models::{
        Audit, Author, AuthorBook, Book, BookPublisher, Category, CategoryBook, LoanTransaction,
        Member, OperationClaim, Publisher, Reservation, User, UserOperationClaim,
    },
};

/// Translate constraint violations into domain errors
pub(crate) fn map_sqlx_error(err: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(ref db) = err {
        let constraint = db.constraint().unwrap_or("unknown").to_string();
        match db.code().as_deref() {
            Some("23505") => return AppError::Conflict(constraint),
            Some("23503") => {
                return AppError::NotFound(format!("Referenced row does not exist ({})", constraint))
            }
            _ => {}
        }
    }
    AppError::Database(err)
}

fn transaction_closed() -> AppError {
    AppError::Internal("Transaction already finished".to_string())
}

type SharedTransaction = Arc<Mutex<Option<Transaction<'static, Postgres>>>>;

/// Where statements run: straight on the pool or inside an open transaction
#[derive(Clone)]
pub(crate) enum PgExecutor {
    Pool(Pool<Postgres>),
    Transaction(SharedTransaction),
}

impl PgExecutor {
    async fn fetch_all<E>(&self, mut builder: QueryBuilder<'_, Postgres>) -> AppResult<Vec<E>>
    where
        E: for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        let query = builder.build_query_as::<E>();
        let rows = match self {
            PgExecutor::Pool(pool) => query.fetch_all(pool).await,
            PgExecutor::Transaction(tx) => {
                let mut guard = tx.lock().await;
                let conn = guard.as_mut().ok_or_else(transaction_closed)?;
                query.fetch_all(&mut **conn).await
            }
        };
        rows.map_err(map_sqlx_error)
    }

    async fn fetch_optional<E>(&self, mut builder: QueryBuilder<'_, Postgres>) -> AppResult<Option<E>>
    where
        E: for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        let query = builder.build_query_as::<E>();
        let row = match self {
            PgExecutor::Pool(pool) => query.fetch_optional(pool).await,
            PgExecutor::Transaction(tx) => {
                let mut guard = tx.lock().await;
                let conn = guard.as_mut().ok_or_else(transaction_closed)?;
                query.fetch_optional(&mut **conn).await
            }
        };
        row.map_err(map_sqlx_error)
    }

    async fn fetch_count(&self, mut builder: QueryBuilder<'_, Postgres>) -> AppResult<i64> {
        let query = builder.build_query_scalar::<i64>();
        let count = match self {
            PgExecutor::Pool(pool) => query.fetch_one(pool).await,
            PgExecutor::Transaction(tx) => {
                let mut guard = tx.lock().await;
                let conn = guard.as_mut().ok_or_else(transaction_closed)?;
                query.fetch_one(&mut **conn).await
            }
        };
        count.map_err(map_sqlx_error)
    }

    async fn fetch_exists(&self, mut builder: QueryBuilder<'_, Postgres>) -> AppResult<bool> {
        let query = builder.build_query_scalar::<bool>();
        let exists = match self {
            PgExecutor::Pool(pool) => query.fetch_one(pool).await,
            PgExecutor::Transaction(tx) => {
                let mut guard = tx.lock().await;
                let conn = guard.as_mut().ok_or_else(transaction_closed)?;
                query.fetch_one(&mut **conn).await
            }
        };
        exists.map_err(map_sqlx_error)
    }

    async fn fetch_ids(&self, mut builder: QueryBuilder<'_, Postgres>) -> AppResult<Vec<Uuid>> {
        let query = builder.build_query_scalar::<Uuid>();
        let ids = match self {
            PgExecutor::Pool(pool) => query.fetch_all(pool).await,
            PgExecutor::Transaction(tx) => {
                let mut guard = tx.lock().await;
                let conn = guard.as_mut().ok_or_else(transaction_closed)?;
                query.fetch_all(&mut **conn).await
            }
        };
        ids.map_err(map_sqlx_error)
    }
}

fn push_value(builder: &mut QueryBuilder<'_, Postgres>, value: FieldValue) {
    match value {
        FieldValue::Null => builder.push("NULL"),
        FieldValue::Bool(v) => builder.push_bind(v),
        FieldValue::Int(v) => builder.push_bind(v),
        FieldValue::Text(v) => builder.push_bind(v),
        FieldValue::Uuid(v) => builder.push_bind(v),
        FieldValue::Timestamp(v) => builder.push_bind(v),
    };
}

fn push_comparison(
    builder: &mut QueryBuilder<'_, Postgres>,
    column: &str,
    operator: &str,
    value: FieldValue,
) {
    builder.push(column).push(' ').push(operator).push(' ');
    push_value(builder, value);
}

/// Escape LIKE wildcards so the needle matches literally
fn escape_like(needle: &str) -> String {
    needle
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &Query) {
    builder.push(" WHERE TRUE");
    if !query.with_deleted {
        builder.push(" AND deleted_date IS NULL");
    }

    for condition in query.conditions.iter().cloned() {
        builder.push(" AND ");
        match condition {
            Condition::Eq(column, value) => push_comparison(builder, column, "=", value),
            Condition::Ne(column, value) => push_comparison(builder, column, "<>", value),
            Condition::Lt(column, value) => push_comparison(builder, column, "<", value),
            Condition::Lte(column, value) => push_comparison(builder, column, "<=", value),
            Condition::Gt(column, value) => push_comparison(builder, column, ">", value),
            Condition::Gte(column, value) => push_comparison(builder, column, ">=", value),
            Condition::IsNull(column) => {
                builder.push(column).push(" IS NULL");
            }
            Condition::IsNotNull(column) => {
                builder.push(column).push(" IS NOT NULL");
            }
            Condition::In(_, values) if values.is_empty() => {
                builder.push("FALSE");
            }
            Condition::In(column, values) => {
                builder.push(column).push(" IN (");
                for (index, value) in values.into_iter().enumerate() {
                    if index > 0 {
                        builder.push(", ");
                    }
                    push_value(builder, value);
                }
                builder.push(")");
            }
            Condition::Contains(column, needle) => {
                builder.push(column).push(" ILIKE '%' || ");
                builder.push_bind(escape_like(&needle));
                builder.push(" || '%'");
            }
        }
    }
}

fn push_order(builder: &mut QueryBuilder<'_, Postgres>, query: &Query) {
    builder.push(" ORDER BY ");
    for (column, direction) in &query.order_by {
        let direction = match direction {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        };
        builder.push(*column).push(' ').push(direction).push(", ");
    }
    builder.push("created_date ASC, id ASC");
}

/// Generic table access over a [`PgExecutor`]
pub struct PgRepository<E> {
    executor: PgExecutor,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> PgRepository<E> {
    pub(crate) fn new(executor: PgExecutor) -> Self {
        Self {
            executor,
            _entity: PhantomData,
        }
    }

    fn columns() -> String {
        E::COLUMNS.join(", ")
    }

    fn select(query: &Query) -> QueryBuilder<'static, Postgres> {
        let mut builder = QueryBuilder::new(format!("SELECT {} FROM {}", Self::columns(), E::TABLE));
        push_filters(&mut builder, query);
        push_order(&mut builder, query);
        builder
    }

    fn not_found(id: Uuid) -> AppError {
        AppError::NotFound(format!("{} row {} not found", E::TABLE, id))
    }
}

/// Soft-delete rows depending on `table.id = id`, depth first
fn cascade_soft_delete<'a>(
    executor: &'a PgExecutor,
    table: &'static str,
    id: Uuid,
    deleted_at: DateTime<Utc>,
) -> BoxFuture<'a, AppResult<()>> {
    async move {
        for key in schema::dependents_of(table) {
            let mut builder =
                QueryBuilder::new(format!("UPDATE {} SET deleted_date = ", key.table));
            builder.push_bind(deleted_at);
            builder.push(format!(" WHERE {} = ", key.column));
            builder.push_bind(id);
            builder.push(" AND deleted_date IS NULL RETURNING id");

            for child in executor.fetch_ids(builder).await? {
                cascade_soft_delete(executor, key.table, child, deleted_at).await?;
            }
        }
        Ok(())
    }
    .boxed()
}

#[async_trait]
impl<E: Entity> EntityRepository<E> for PgRepository<E> {
    async fn get(&self, query: Query) -> AppResult<Option<E>> {
        check_columns::<E>(&query)?;
        let mut builder = Self::select(&query);
        builder.push(" LIMIT 1");
        self.executor.fetch_optional(builder).await
    }

    async fn list(&self, query: Query) -> AppResult<Page<E>> {
        check_columns::<E>(&query)?;
        let mut builder = Self::select(&query);

        let Some(page) = query.page else {
            let items: Vec<E> = self.executor.fetch_all(builder).await?;
            let total = items.len() as i64;
            return Ok(Page::new(items, total, None));
        };

        builder.push(" LIMIT ");
        builder.push_bind(page.per_page);
        builder.push(" OFFSET ");
        builder.push_bind(page.offset());
        let items = self.executor.fetch_all(builder).await?;

        let mut count = QueryBuilder::new(format!("SELECT COUNT(*) FROM {}", E::TABLE));
        push_filters(&mut count, &query);
        let total = self.executor.fetch_count(count).await?;

        Ok(Page::new(items, total, Some(page)))
    }

    async fn any(&self, query: Query) -> AppResult<bool> {
        check_columns::<E>(&query)?;
        let mut builder = QueryBuilder::new(format!("SELECT EXISTS(SELECT 1 FROM {}", E::TABLE));
        push_filters(&mut builder, &query);
        builder.push(")");
        self.executor.fetch_exists(builder).await
    }

    async fn add(&self, mut entity: E) -> AppResult<E> {
        *entity.audit_mut() = Audit::new();

        let mut builder = QueryBuilder::new(format!(
            "INSERT INTO {} ({}) VALUES (",
            E::TABLE,
            Self::columns()
        ));
        for (index, value) in entity.values().into_iter().enumerate() {
            if index > 0 {
                builder.push(", ");
            }
            push_value(&mut builder, value);
        }
        builder.push(") RETURNING ").push(Self::columns());

        self.executor
            .fetch_optional(builder)
            .await?
            .ok_or_else(|| AppError::Internal(format!("Insert into {} returned no row", E::TABLE)))
    }

    async fn update(&self, mut entity: E) -> AppResult<E> {
        entity.audit_mut().updated_date = Some(Utc::now());
        let id = entity.id();

        let mut builder = QueryBuilder::new(format!("UPDATE {} SET ", E::TABLE));
        let assignments = E::COLUMNS
            .iter()
            .zip(entity.values())
            .filter(|(column, _)| !matches!(**column, "id" | "created_date" | "deleted_date"));
        for (index, (column, value)) in assignments.enumerate() {
            if index > 0 {
                builder.push(", ");
            }
            builder.push(*column).push(" = ");
            push_value(&mut builder, value);
        }
        builder.push(" WHERE id = ");
        builder.push_bind(id);
        builder.push(" AND deleted_date IS NULL RETURNING ").push(Self::columns());

        self.executor
            .fetch_optional(builder)
            .await?
            .ok_or_else(|| Self::not_found(id))
    }

    async fn delete(&self, entity: E, permanent: bool) -> AppResult<E> {
        let id = entity.id();

        if permanent {
            let mut builder = QueryBuilder::new(format!("DELETE FROM {} WHERE id = ", E::TABLE));
            builder.push_bind(id);
            builder.push(" RETURNING ").push(Self::columns());
            // Dependent rows go through ON DELETE CASCADE
            return self
                .executor
                .fetch_optional(builder)
                .await?
                .ok_or_else(|| Self::not_found(id));
        }

        let deleted_at = Utc::now();
        let mut builder = QueryBuilder::new(format!("UPDATE {} SET deleted_date = ", E::TABLE));
        builder.push_bind(deleted_at);
        builder.push(" WHERE id = ");
        builder.push_bind(id);
        builder.push(" AND deleted_date IS NULL RETURNING ").push(Self::columns());

        let deleted: E = self
            .executor
            .fetch_optional(builder)
            .await?
            .ok_or_else(|| Self::not_found(id))?;

        cascade_soft_delete(&self.executor, E::TABLE, id, deleted_at).await?;
        Ok(deleted)
    }
}

/// PostgreSQL implementation of [`Database`]
pub struct PgDatabase {
    pool: Pool<Postgres>,
    executor: PgExecutor,
    scope: Scope,
    authors: PgRepository<Author>,
    books: PgRepository<Book>,
    categories: PgRepository<Category>,
    publishers: PgRepository<Publisher>,
    author_books: PgRepository<AuthorBook>,
    category_books: PgRepository<CategoryBook>,
    book_publishers: PgRepository<BookPublisher>,
    members: PgRepository<Member>,
    loan_transactions: PgRepository<LoanTransaction>,
    reservations: PgRepository<Reservation>,
    users: PgRepository<User>,
    operation_claims: PgRepository<OperationClaim>,
    user_operation_claims: PgRepository<UserOperationClaim>,
}

impl PgDatabase {
    pub fn new(pool: Pool<Postgres>) -> Self {
        let executor = PgExecutor::Pool(pool.clone());
        Self::with_executor(pool, executor, Scope::Autocommit)
    }

    fn with_executor(pool: Pool<Postgres>, executor: PgExecutor, scope: Scope) -> Self {
        Self {
            authors: PgRepository::new(executor.clone()),
            books: PgRepository::new(executor.clone()),
            categories: PgRepository::new(executor.clone()),
            publishers: PgRepository::new(executor.clone()),
            author_books: PgRepository::new(executor.clone()),
            category_books: PgRepository::new(executor.clone()),
            book_publishers: PgRepository::new(executor.clone()),
            members: PgRepository::new(executor.clone()),
            loan_transactions: PgRepository::new(executor.clone()),
            reservations: PgRepository::new(executor.clone()),
            users: PgRepository::new(executor.clone()),
            operation_claims: PgRepository::new(executor.clone()),
            user_operation_claims: PgRepository::new(executor.clone()),
            pool,
            executor,
            scope,
        }
    }

    async fn take_transaction(&self) -> Option<Transaction<'static, Postgres>> {
        match (&self.executor, self.scope) {
            (PgExecutor::Transaction(tx), Scope::Transaction) => tx.lock().await.take(),
            _ => None,
        }
    }
}

#[async_trait]
impl Database for PgDatabase {
    fn authors(&self) -> &dyn EntityRepository<Author> {
        &self.authors
    }

    fn books(&self) -> &dyn EntityRepository<Book> {
        &self.books
    }

    fn categories(&self) -> &dyn EntityRepository<Category> {
        &self.categories
    }

    fn publishers(&self) -> &dyn EntityRepository<Publisher> {
        &self.publishers
    }

    fn author_books(&self) -> &dyn EntityRepository<AuthorBook> {
        &self.author_books
    }

    fn category_books(&self) -> &dyn EntityRepository<CategoryBook> {
        &self.category_books
    }

    fn book_publishers(&self) -> &dyn EntityRepository<BookPublisher> {
        &self.book_publishers
    }

    fn members(&self) -> &dyn EntityRepository<Member> {
        &self.members
    }

    fn loan_transactions(&self) -> &dyn EntityRepository<LoanTransaction> {
        &self.loan_transactions
    }

    fn reservations(&self) -> &dyn EntityRepository<Reservation> {
        &self.reservations
    }

    fn users(&self) -> &dyn EntityRepository<User> {
        &self.users
    }

    fn operation_claims(&self) -> &dyn EntityRepository<OperationClaim> {
        &self.operation_claims
    }

    fn user_operation_claims(&self) -> &dyn EntityRepository<UserOperationClaim> {
        &self.user_operation_claims
    }

    async fn begin(&self) -> AppResult<Arc<dyn Database>> {
        if self.scope != Scope::Autocommit {
            return Ok(Arc::new(Self::with_executor(
                self.pool.clone(),
                self.executor.clone(),
                Scope::Joined,
            )));
        }

        let tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        let executor = PgExecutor::Transaction(Arc::new(Mutex::new(Some(tx))));
        Ok(Arc::new(Self::with_executor(
            self.pool.clone(),
            executor,
            Scope::Transaction,
        )))
    }

    async fn commit(&self) -> AppResult<()> {
        match self.take_transaction().await {
            Some(tx) => tx.commit().await.map_err(map_sqlx_error),
            None => Ok(()),
        }
    }

    async fn rollback(&self) -> AppResult<()> {
        match self.take_transaction().await {
            Some(tx) => tx.rollback().await.map_err(map_sqlx_error),
            None => Ok(()),
        }
    }

    async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_sql() {
        let query = Query::new()
            .eq("author_id", Uuid::nil())
            .filter(Condition::Contains("name", "50%".into()))
            .order_by("name", SortDirection::Desc);
        let builder = PgRepository::<Book>::select(&query);
        assert_eq!(
            builder.sql(),
            "SELECT id, name, isbn, page, language, units_in_stock, description, category_id, \
             publisher_id, author_id, created_date, updated_date, deleted_date FROM books \
             WHERE TRUE AND deleted_date IS NULL AND author_id = $1 \
             AND name ILIKE '%' || $2 || '%' ORDER BY name DESC, created_date ASC, id ASC"
        );
    }

    #[test]
    fn test_with_deleted_drops_soft_delete_filter() {
        let builder = PgRepository::<Book>::select(&Query::new().with_deleted());
        assert!(!builder.sql().contains("deleted_date IS NULL"));
    }

    #[test]
    fn test_empty_in_matches_nothing() {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT 1");
        push_filters(&mut builder, &Query::new().filter(Condition::In("id", Vec::new())));
        assert!(builder.sql().ends_with("AND FALSE"));
    }

    #[tokio::test]
    async fn test_cascade_stops_at_leaf_tables() {
        // Lazy pool: a leaf table issues no statement, so nothing connects
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://library@localhost/library")
            .unwrap();
        let executor = PgExecutor::Pool(pool);
        cascade_soft_delete(&executor, "reservations", Uuid::new_v4(), Utc::now())
            .await
            .unwrap();
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
    }
}
