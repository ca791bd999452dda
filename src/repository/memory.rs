//! In-process backend.
//!
//! Rows are kept per table behind a mutex. Foreign keys, unique keys and
//! cascades follow the same rules as the PostgreSQL schema. A transaction
//! works on a private copy of every table that replaces the shared state on
//! commit. Writers are serialized: a transaction holds the write gate from
//! `begin` until `commit` or `rollback`, and autocommit writes wait for it.

use std::{
    any::Any,
    cmp::Ordering,
    collections::{BTreeMap, HashMap},
    marker::PhantomData,
    sync::{Arc, Mutex, MutexGuard},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard, OwnedMutexGuard};
use uuid::Uuid;

use super::{
    check_columns,
    entity::{Entity, UniqueKey},
    query::{FieldValue, Page, Query, SortDirection},
    schema, Database, EntityRepository, Scope,
};
use crate::{
    error::{AppError, AppResult},
    models::{
        Audit, Author, AuthorBook, Book, BookPublisher, Category, CategoryBook, LoanTransaction,
        Member, OperationClaim, Publisher, Reservation, User, UserOperationClaim,
    },
};

/// Type-erased row, so cascades can reach tables of other entity types
trait StoredRow: Send + Sync {
    fn field(&self, column: &str) -> Option<FieldValue>;
    fn is_deleted(&self) -> bool;
    fn soft_deleted(&self, at: DateTime<Utc>) -> Arc<dyn StoredRow>;
    fn unique_keys(&self) -> Vec<UniqueKey>;
    fn as_any(&self) -> &dyn Any;
}

impl<E: Entity> StoredRow for E {
    fn field(&self, column: &str) -> Option<FieldValue> {
        Entity::field(self, column)
    }

    fn is_deleted(&self) -> bool {
        self.audit().is_deleted()
    }

    fn soft_deleted(&self, at: DateTime<Utc>) -> Arc<dyn StoredRow> {
        let mut copy = self.clone();
        copy.audit_mut().deleted_date = Some(at);
        Arc::new(copy)
    }

    fn unique_keys(&self) -> Vec<UniqueKey> {
        Entity::unique_keys(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

type Rows = BTreeMap<Uuid, Arc<dyn StoredRow>>;
type Tables = HashMap<&'static str, Rows>;

#[derive(Clone, Default)]
struct Store {
    tables: Arc<Mutex<Tables>>,
}

impl Store {
    fn lock(&self) -> AppResult<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| AppError::Internal("Memory store lock poisoned".to_string()))
    }

    fn snapshot(&self) -> AppResult<Store> {
        let tables = self.lock()?.clone();
        Ok(Store {
            tables: Arc::new(Mutex::new(tables)),
        })
    }
}

fn check_references(tables: &Tables, table: &str, row: &dyn StoredRow) -> AppResult<()> {
    for key in schema::declared_on(table) {
        if let Some(FieldValue::Uuid(parent)) = row.field(key.column) {
            let exists = tables
                .get(key.references)
                .is_some_and(|rows| rows.contains_key(&parent));
            if !exists {
                return Err(AppError::NotFound(format!(
                    "Referenced row does not exist ({}_{}_fkey)",
                    key.table, key.column
                )));
            }
        }
    }
    Ok(())
}

fn check_unique(rows: Option<&Rows>, id: Uuid, keys: &[UniqueKey]) -> AppResult<()> {
    for key in keys {
        let taken = rows
            .into_iter()
            .flatten()
            .any(|(other_id, other)| *other_id != id && other.unique_keys().contains(key));
        if taken {
            return Err(AppError::Conflict(key.index.to_string()));
        }
    }
    Ok(())
}

/// Soft-delete (`Some(at)`) or remove (`None`) rows depending on `table.id = id`
fn cascade(tables: &mut Tables, table: &str, id: Uuid, deleted_at: Option<DateTime<Utc>>) {
    for key in schema::dependents_of(table) {
        let children: Vec<Uuid> = tables
            .get(key.table)
            .map(|rows| {
                rows.iter()
                    .filter(|(_, row)| row.field(key.column) == Some(FieldValue::Uuid(id)))
                    .filter(|(_, row)| deleted_at.is_none() || !row.is_deleted())
                    .map(|(child_id, _)| *child_id)
                    .collect()
            })
            .unwrap_or_default();

        for child_id in children {
            if let Some(rows) = tables.get_mut(key.table) {
                match deleted_at {
                    Some(at) => {
                        if let Some(row) = rows.get(&child_id).map(|row| row.soft_deleted(at)) {
                            rows.insert(child_id, row);
                        }
                    }
                    None => {
                        rows.remove(&child_id);
                    }
                }
            }
            cascade(tables, key.table, child_id, deleted_at);
        }
    }
}

/// Compare one column of two rows, NULLS LAST as PostgreSQL does ascending
fn compare_column(a: &[FieldValue], b: &[FieldValue], index: Option<usize>) -> Ordering {
    let Some(index) = index else {
        return Ordering::Equal;
    };
    match (a.get(index), b.get(index)) {
        (Some(FieldValue::Null), Some(FieldValue::Null)) => Ordering::Equal,
        (Some(FieldValue::Null), _) => Ordering::Greater,
        (_, Some(FieldValue::Null)) => Ordering::Less,
        (Some(x), Some(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
        _ => Ordering::Equal,
    }
}

/// Single-writer gate shared by a database and its transactions
type WriteGate = Arc<AsyncMutex<()>>;

/// Generic table access over the shared [`Store`]
pub struct MemoryRepository<E> {
    store: Store,
    /// Set for autocommit handles; a transaction already holds the gate
    gate: Option<WriteGate>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> MemoryRepository<E> {
    fn new(store: Store, gate: Option<WriteGate>) -> Self {
        Self {
            store,
            gate,
            _entity: PhantomData,
        }
    }

    async fn exclusive(&self) -> Option<AsyncMutexGuard<'_, ()>> {
        match &self.gate {
            Some(gate) => Some(gate.lock().await),
            None => None,
        }
    }

    fn not_found(id: Uuid) -> AppError {
        AppError::NotFound(format!("{} row {} not found", E::TABLE, id))
    }

    /// Matching rows, sorted, before paging
    fn select(&self, query: &Query) -> AppResult<Vec<E>> {
        check_columns::<E>(query)?;
        let conditions: Vec<_> = query
            .conditions
            .iter()
            .map(|condition| (E::column_index(condition.column()), condition))
            .collect();
        let order: Vec<_> = query
            .order_by
            .iter()
            .map(|(column, direction)| (E::column_index(column), *direction))
            .collect();
        let created_date = E::column_index("created_date");

        let tables = self.store.lock()?;
        // Column values are built once per row for filtering and sorting
        let mut rows: Vec<(Vec<FieldValue>, E)> = tables
            .get(E::TABLE)
            .into_iter()
            .flatten()
            .filter(|(_, row)| query.with_deleted || !row.is_deleted())
            .filter_map(|(_, row)| {
                let entity = row.as_any().downcast_ref::<E>()?;
                let values = entity.values();
                conditions
                    .iter()
                    .all(|(index, condition)| {
                        index
                            .and_then(|index| values.get(index))
                            .is_some_and(|value| condition.matches(value))
                    })
                    .then(|| (values, entity.clone()))
            })
            .collect();
        drop(tables);

        rows.sort_by(|(a_values, a), (b_values, b)| {
            order
                .iter()
                .map(|(index, direction)| {
                    let ordering = compare_column(a_values, b_values, *index);
                    match direction {
                        SortDirection::Asc => ordering,
                        SortDirection::Desc => ordering.reverse(),
                    }
                })
                .chain([
                    compare_column(a_values, b_values, created_date),
                    a.id().cmp(&b.id()),
                ])
                .find(|ordering| *ordering != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        });

        Ok(rows.into_iter().map(|(_, entity)| entity).collect())
    }

    fn live_row(tables: &Tables, id: Uuid) -> AppResult<E> {
        tables
            .get(E::TABLE)
            .and_then(|rows| rows.get(&id))
            .filter(|row| !row.is_deleted())
            .and_then(|row| row.as_any().downcast_ref::<E>().cloned())
            .ok_or_else(|| Self::not_found(id))
    }
}

#[async_trait]
impl<E: Entity> EntityRepository<E> for MemoryRepository<E> {
    async fn get(&self, query: Query) -> AppResult<Option<E>> {
        Ok(self.select(&query)?.into_iter().next())
    }

    async fn list(&self, query: Query) -> AppResult<Page<E>> {
        let rows = self.select(&query)?;
        let total = rows.len() as i64;

        let items = match query.page {
            Some(page) => rows
                .into_iter()
                .skip(usize::try_from(page.offset()).unwrap_or(usize::MAX))
                .take(usize::try_from(page.per_page).unwrap_or(0))
                .collect(),
            None => rows,
        };

        Ok(Page::new(items, total, query.page))
    }

    async fn any(&self, query: Query) -> AppResult<bool> {
        Ok(!self.select(&query)?.is_empty())
    }

    async fn add(&self, mut entity: E) -> AppResult<E> {
        *entity.audit_mut() = Audit::new();
        let id = entity.id();

        let _write = self.exclusive().await;
        let mut tables = self.store.lock()?;
        if tables.get(E::TABLE).is_some_and(|rows| rows.contains_key(&id)) {
            return Err(AppError::Conflict(format!("{}_pkey", E::TABLE)));
        }
        check_references(&tables, E::TABLE, &entity)?;
        check_unique(tables.get(E::TABLE), id, &Entity::unique_keys(&entity))?;

        tables
            .entry(E::TABLE)
            .or_default()
            .insert(id, Arc::new(entity.clone()));
        Ok(entity)
    }

    async fn update(&self, mut entity: E) -> AppResult<E> {
        let id = entity.id();
        let _write = self.exclusive().await;
        let mut tables = self.store.lock()?;

        let existing = Self::live_row(&tables, id)?;
        let audit = entity.audit_mut();
        audit.created_date = existing.audit().created_date;
        audit.deleted_date = None;
        audit.updated_date = Some(Utc::now());

        check_references(&tables, E::TABLE, &entity)?;
        check_unique(tables.get(E::TABLE), id, &Entity::unique_keys(&entity))?;

        tables
            .entry(E::TABLE)
            .or_default()
            .insert(id, Arc::new(entity.clone()));
        Ok(entity)
    }

    async fn delete(&self, entity: E, permanent: bool) -> AppResult<E> {
        let id = entity.id();
        let _write = self.exclusive().await;
        let mut tables = self.store.lock()?;

        if permanent {
            let removed = tables
                .get_mut(E::TABLE)
                .and_then(|rows| rows.remove(&id))
                .and_then(|row| row.as_any().downcast_ref::<E>().cloned())
                .ok_or_else(|| Self::not_found(id))?;
            cascade(&mut tables, E::TABLE, id, None);
            return Ok(removed);
        }

        let mut deleted = Self::live_row(&tables, id)?;
        let deleted_at = Utc::now();
        deleted.audit_mut().deleted_date = Some(deleted_at);

        tables
            .entry(E::TABLE)
            .or_default()
            .insert(id, Arc::new(deleted.clone()));
        cascade(&mut tables, E::TABLE, id, Some(deleted_at));
        Ok(deleted)
    }
}

/// In-memory implementation of [`Database`]
pub struct MemoryDatabase {
    committed: Store,
    working: Store,
    scope: Scope,
    gate: WriteGate,
    /// Held by the transaction owner until commit or rollback
    held: Mutex<Option<OwnedMutexGuard<()>>>,
    authors: MemoryRepository<Author>,
    books: MemoryRepository<Book>,
    categories: MemoryRepository<Category>,
    publishers: MemoryRepository<Publisher>,
    author_books: MemoryRepository<AuthorBook>,
    category_books: MemoryRepository<CategoryBook>,
    book_publishers: MemoryRepository<BookPublisher>,
    members: MemoryRepository<Member>,
    loan_transactions: MemoryRepository<LoanTransaction>,
    reservations: MemoryRepository<Reservation>,
    users: MemoryRepository<User>,
    operation_claims: MemoryRepository<OperationClaim>,
    user_operation_claims: MemoryRepository<UserOperationClaim>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        let store = Store::default();
        Self::with_stores(
            store.clone(),
            store,
            Scope::Autocommit,
            Arc::new(AsyncMutex::new(())),
            None,
        )
    }

    fn with_stores(
        committed: Store,
        working: Store,
        scope: Scope,
        gate: WriteGate,
        held: Option<OwnedMutexGuard<()>>,
    ) -> Self {
        let writer_gate = (scope == Scope::Autocommit).then(|| gate.clone());
        Self {
            authors: MemoryRepository::new(working.clone(), writer_gate.clone()),
            books: MemoryRepository::new(working.clone(), writer_gate.clone()),
            categories: MemoryRepository::new(working.clone(), writer_gate.clone()),
            publishers: MemoryRepository::new(working.clone(), writer_gate.clone()),
            author_books: MemoryRepository::new(working.clone(), writer_gate.clone()),
            category_books: MemoryRepository::new(working.clone(), writer_gate.clone()),
            book_publishers: MemoryRepository::new(working.clone(), writer_gate.clone()),
            members: MemoryRepository::new(working.clone(), writer_gate.clone()),
            loan_transactions: MemoryRepository::new(working.clone(), writer_gate.clone()),
            reservations: MemoryRepository::new(working.clone(), writer_gate.clone()),
            users: MemoryRepository::new(working.clone(), writer_gate.clone()),
            operation_claims: MemoryRepository::new(working.clone(), writer_gate.clone()),
            user_operation_claims: MemoryRepository::new(working.clone(), writer_gate.clone()),
            committed,
            working,
            scope,
            gate,
            held: Mutex::new(held),
        }
    }

    fn release(&self) -> AppResult<()> {
        self.held
            .lock()
            .map_err(|_| AppError::Internal("Memory store lock poisoned".to_string()))?
            .take();
        Ok(())
    }
}

impl Default for MemoryDatabase {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Database for MemoryDatabase {
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
        let database = match self.scope {
            Scope::Autocommit => {
                let held = self.gate.clone().lock_owned().await;
                Self::with_stores(
                    self.committed.clone(),
                    self.committed.snapshot()?,
                    Scope::Transaction,
                    self.gate.clone(),
                    Some(held),
                )
            }
            Scope::Transaction | Scope::Joined => Self::with_stores(
                self.committed.clone(),
                self.working.clone(),
                Scope::Joined,
                self.gate.clone(),
                None,
            ),
        };
        Ok(Arc::new(database))
    }

    async fn commit(&self) -> AppResult<()> {
        if self.scope == Scope::Transaction {
            let tables = self.working.lock()?.clone();
            *self.committed.lock()? = tables;
            self.release()?;
        }
        Ok(())
    }

    async fn rollback(&self) -> AppResult<()> {
        if self.scope == Scope::Transaction {
            let committed = self.committed.lock()?.clone();
            *self.working.lock()? = committed;
            self.release()?;
        }
        Ok(())
    }

    async fn ping(&self) -> AppResult<()> {
        self.working.lock().map(|_| ())
    }
}
