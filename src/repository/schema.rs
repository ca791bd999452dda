//! Foreign keys between tables. Every key cascades on delete.
//!
//! Mirrors the constraints declared in `migrations/`; the memory backend
//! enforces them itself, Postgres through the database.

/// `table.column` references `references.id`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForeignKey {
    pub table: &'static str,
    pub column: &'static str,
    pub references: &'static str,
}

pub const FOREIGN_KEYS: &[ForeignKey] = &[
    ForeignKey { table: "author_books", column: "author_id", references: "authors" },
    ForeignKey { table: "author_books", column: "book_id", references: "books" },
    ForeignKey { table: "category_books", column: "book_id", references: "books" },
    ForeignKey { table: "category_books", column: "category_id", references: "categories" },
    ForeignKey { table: "book_publishers", column: "book_id", references: "books" },
    ForeignKey { table: "book_publishers", column: "publisher_id", references: "publishers" },
    ForeignKey { table: "loan_transactions", column: "book_id", references: "books" },
    ForeignKey { table: "loan_transactions", column: "member_id", references: "members" },
    ForeignKey { table: "reservations", column: "book_id", references: "books" },
    ForeignKey { table: "reservations", column: "member_id", references: "members" },
    ForeignKey { table: "members", column: "user_id", references: "users" },
    ForeignKey { table: "user_operation_claims", column: "user_id", references: "users" },
    ForeignKey {
        table: "user_operation_claims",
        column: "operation_claim_id",
        references: "operation_claims",
    },
];

/// Keys whose rows are removed along with a row of `parent`
pub fn dependents_of(parent: &str) -> impl Iterator<Item = &'static ForeignKey> + '_ {
    FOREIGN_KEYS.iter().filter(move |key| key.references == parent)
}

/// Keys declared on `table`
pub fn declared_on(table: &str) -> impl Iterator<Item = &'static ForeignKey> + '_ {
    FOREIGN_KEYS.iter().filter(move |key| key.table == table)
}
