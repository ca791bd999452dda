//! Table metadata for every persisted model

use sqlx::{postgres::PgRow, FromRow};
use uuid::Uuid;

use super::query::FieldValue;
use crate::models::{
    Audit, Author, AuthorBook, AuthenticatorType, Book, BookPublisher, Category, CategoryBook,
    LoanTransaction, Member, OperationClaim, Publisher, Reservation, ReturnStatus, User,
    UserOperationClaim,
};

/// Name of the partial unique index allowing a single open loan per book
pub const OPEN_LOAN_INDEX: &str = "ux_loan_transactions_open_book";
pub const MEMBER_USER_INDEX: &str = "members_user_id_key";
pub const USER_EMAIL_INDEX: &str = "ux_users_email";
pub const OPERATION_CLAIM_NAME_INDEX: &str = "ux_operation_claims_name";

/// Values a row contributes to a unique index. Rows outside a partial index return no key.
#[derive(Debug, Clone, PartialEq)]
pub struct UniqueKey {
    pub index: &'static str,
    pub values: Vec<FieldValue>,
}

/// A model stored in its own table, keyed by a UUID `id` column and
/// carrying the audit columns last.
pub trait Entity: for<'r> FromRow<'r, PgRow> + Clone + Send + Sync + Unpin + 'static {
    const TABLE: &'static str;
    const COLUMNS: &'static [&'static str];

    fn id(&self) -> Uuid;
    fn audit(&self) -> &Audit;
    fn audit_mut(&mut self) -> &mut Audit;

    /// Column values, in `COLUMNS` order
    fn values(&self) -> Vec<FieldValue>;

    fn unique_keys(&self) -> Vec<UniqueKey> {
        Vec::new()
    }

    fn has_column(column: &str) -> bool {
        Self::column_index(column).is_some()
    }

    /// Position of `column` in `COLUMNS` and in [`Entity::values`]
    fn column_index(column: &str) -> Option<usize> {
        Self::COLUMNS.iter().position(|c| *c == column)
    }

    /// Single column value. Prefer [`Entity::values`] when reading several.
    fn field(&self, column: &str) -> Option<FieldValue> {
        let index = Self::column_index(column)?;
        self.values().into_iter().nth(index)
    }
}

fn with_audit(mut values: Vec<FieldValue>, audit: &Audit) -> Vec<FieldValue> {
    values.push(audit.created_date.into());
    values.push(audit.updated_date.into());
    values.push(audit.deleted_date.into());
    values
}

impl From<ReturnStatus> for FieldValue {
    fn from(status: ReturnStatus) -> Self {
        FieldValue::Int(status.into())
    }
}

impl From<AuthenticatorType> for FieldValue {
    fn from(kind: AuthenticatorType) -> Self {
        FieldValue::Int(kind.into())
    }
}

macro_rules! audit_accessors {
    () => {
        fn audit(&self) -> &Audit {
            &self.audit
        }

        fn audit_mut(&mut self) -> &mut Audit {
            &mut self.audit
        }
    };
}

impl Entity for Author {
    const TABLE: &'static str = "authors";
    const COLUMNS: &'static [&'static str] = &[
        "id", "name", "identity_number", "created_date", "updated_date", "deleted_date",
    ];

    fn id(&self) -> Uuid {
        self.id
    }

    audit_accessors!();

    fn values(&self) -> Vec<FieldValue> {
        with_audit(
            vec![self.id.into(), self.name.clone().into(), self.identity_number.clone().into()],
            &self.audit,
        )
    }
}

impl Entity for Book {
    const TABLE: &'static str = "books";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "name",
        "isbn",
        "page",
        "language",
        "units_in_stock",
        "description",
        "category_id",
        "publisher_id",
        "author_id",
        "created_date",
        "updated_date",
        "deleted_date",
    ];

    fn id(&self) -> Uuid {
        self.id
    }

    audit_accessors!();

    fn values(&self) -> Vec<FieldValue> {
        with_audit(
            vec![
                self.id.into(),
                self.name.clone().into(),
                self.isbn.clone().into(),
                self.page.into(),
                self.language.clone().into(),
                self.units_in_stock.into(),
                self.description.clone().into(),
                self.category_id.into(),
                self.publisher_id.into(),
                self.author_id.into(),
            ],
            &self.audit,
        )
    }
}

impl Entity for Category {
    const TABLE: &'static str = "categories";
    const COLUMNS: &'static [&'static str] =
        &["id", "name", "created_date", "updated_date", "deleted_date"];

    fn id(&self) -> Uuid {
        self.id
    }

    audit_accessors!();

    fn values(&self) -> Vec<FieldValue> {
        with_audit(vec![self.id.into(), self.name.clone().into()], &self.audit)
    }
}

impl Entity for Publisher {
    const TABLE: &'static str = "publishers";
    const COLUMNS: &'static [&'static str] =
        &["id", "name", "created_date", "updated_date", "deleted_date"];

    fn id(&self) -> Uuid {
        self.id
    }

    audit_accessors!();

    fn values(&self) -> Vec<FieldValue> {
        with_audit(vec![self.id.into(), self.name.clone().into()], &self.audit)
    }
}

impl Entity for AuthorBook {
    const TABLE: &'static str = "author_books";
    const COLUMNS: &'static [&'static str] =
        &["id", "author_id", "book_id", "created_date", "updated_date", "deleted_date"];

    fn id(&self) -> Uuid {
        self.id
    }

    audit_accessors!();

    fn values(&self) -> Vec<FieldValue> {
        with_audit(
            vec![self.id.into(), self.author_id.into(), self.book_id.into()],
            &self.audit,
        )
    }
}

impl Entity for CategoryBook {
    const TABLE: &'static str = "category_books";
    const COLUMNS: &'static [&'static str] =
        &["id", "book_id", "category_id", "created_date", "updated_date", "deleted_date"];

    fn id(&self) -> Uuid {
        self.id
    }

    audit_accessors!();

    fn values(&self) -> Vec<FieldValue> {
        with_audit(
            vec![self.id.into(), self.book_id.into(), self.category_id.into()],
            &self.audit,
        )
    }
}

impl Entity for BookPublisher {
    const TABLE: &'static str = "book_publishers";
    const COLUMNS: &'static [&'static str] =
        &["id", "book_id", "publisher_id", "created_date", "updated_date", "deleted_date"];

    fn id(&self) -> Uuid {
        self.id
    }

    audit_accessors!();

    fn values(&self) -> Vec<FieldValue> {
        with_audit(
            vec![self.id.into(), self.book_id.into(), self.publisher_id.into()],
            &self.audit,
        )
    }
}

impl Entity for Member {
    const TABLE: &'static str = "members";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "first_name",
        "last_name",
        "email",
        "password",
        "user_id",
        "created_date",
        "updated_date",
        "deleted_date",
    ];

    fn id(&self) -> Uuid {
        self.id
    }

    audit_accessors!();

    fn values(&self) -> Vec<FieldValue> {
        with_audit(
            vec![
                self.id.into(),
                self.first_name.clone().into(),
                self.last_name.clone().into(),
                self.email.clone().into(),
                self.password.clone().into(),
                self.user_id.into(),
            ],
            &self.audit,
        )
    }

    fn unique_keys(&self) -> Vec<UniqueKey> {
        vec![UniqueKey {
            index: MEMBER_USER_INDEX,
            values: vec![self.user_id.into()],
        }]
    }
}

impl Entity for LoanTransaction {
    const TABLE: &'static str = "loan_transactions";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "member_id",
        "book_id",
        "return_status",
        "return_time",
        "created_date",
        "updated_date",
        "deleted_date",
    ];

    fn id(&self) -> Uuid {
        self.id
    }

    audit_accessors!();

    fn values(&self) -> Vec<FieldValue> {
        with_audit(
            vec![
                self.id.into(),
                self.member_id.into(),
                self.book_id.into(),
                self.return_status.into(),
                self.return_time.into(),
            ],
            &self.audit,
        )
    }

    fn unique_keys(&self) -> Vec<UniqueKey> {
        if self.is_active() {
            vec![UniqueKey {
                index: OPEN_LOAN_INDEX,
                values: vec![self.book_id.into()],
            }]
        } else {
            Vec::new()
        }
    }
}

impl Entity for Reservation {
    const TABLE: &'static str = "reservations";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "book_id",
        "member_id",
        "reservation_date",
        "expiration_date",
        "created_date",
        "updated_date",
        "deleted_date",
    ];

    fn id(&self) -> Uuid {
        self.id
    }

    audit_accessors!();

    fn values(&self) -> Vec<FieldValue> {
        with_audit(
            vec![
                self.id.into(),
                self.book_id.into(),
                self.member_id.into(),
                self.reservation_date.into(),
                self.expiration_date.into(),
            ],
            &self.audit,
        )
    }
}

impl Entity for User {
    const TABLE: &'static str = "users";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "email",
        "password_hash",
        "authenticator_type",
        "created_date",
        "updated_date",
        "deleted_date",
    ];

    fn id(&self) -> Uuid {
        self.id
    }

    audit_accessors!();

    fn values(&self) -> Vec<FieldValue> {
        with_audit(
            vec![
                self.id.into(),
                self.email.clone().into(),
                self.password_hash.clone().into(),
                self.authenticator_type.into(),
            ],
            &self.audit,
        )
    }

    fn unique_keys(&self) -> Vec<UniqueKey> {
        if self.audit.is_deleted() {
            return Vec::new();
        }
        vec![UniqueKey {
            index: USER_EMAIL_INDEX,
            values: vec![self.email.to_lowercase().into()],
        }]
    }
}

impl Entity for OperationClaim {
    const TABLE: &'static str = "operation_claims";
    const COLUMNS: &'static [&'static str] =
        &["id", "name", "created_date", "updated_date", "deleted_date"];

    fn id(&self) -> Uuid {
        self.id
    }

    audit_accessors!();

    fn values(&self) -> Vec<FieldValue> {
        with_audit(vec![self.id.into(), self.name.clone().into()], &self.audit)
    }

    fn unique_keys(&self) -> Vec<UniqueKey> {
        if self.audit.is_deleted() {
            return Vec::new();
        }
        vec![UniqueKey {
            index: OPERATION_CLAIM_NAME_INDEX,
            values: vec![self.name.clone().into()],
        }]
    }
}

impl Entity for UserOperationClaim {
    const TABLE: &'static str = "user_operation_claims";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "user_id",
        "operation_claim_id",
        "created_date",
        "updated_date",
        "deleted_date",
    ];

    fn id(&self) -> Uuid {
        self.id
    }

    audit_accessors!();

    fn values(&self) -> Vec<FieldValue> {
        with_audit(
            vec![self.id.into(), self.user_id.into(), self.operation_claim_id.into()],
            &self.audit,
        )
    }
}
