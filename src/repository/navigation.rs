//! Loading of related rows requested by the caller

use std::collections::HashMap;

use uuid::Uuid;

use super::{
    query::{Condition, FieldValue, Query},
    Repository, Table,
};
use crate::{
    error::AppResult,
    models::{
        Author, AuthorBook, Book, BookDetails, BookInclude, BookPublisher, Category,
        CategoryBook, LoanTransaction, LoanTransactionDetails, LoanTransactionInclude, Member,
        Publisher,
    },
};

fn uuid_field<E: Table>(entity: &E, column: &str) -> Option<Uuid> {
    match entity.field(column) {
        Some(FieldValue::Uuid(id)) => Some(id),
        _ => None,
    }
}

fn id_values(ids: impl IntoIterator<Item = Uuid>) -> Vec<FieldValue> {
    let mut ids: Vec<Uuid> = ids.into_iter().collect();
    ids.sort_unstable();
    ids.dedup();
    ids.into_iter().map(FieldValue::Uuid).collect()
}

impl Repository {
    /// Live rows with the given ids, keyed by id
    pub async fn load_by_ids<E: Table>(
        &self,
        ids: impl IntoIterator<Item = Uuid> + Send,
    ) -> AppResult<HashMap<Uuid, E>> {
        let ids = id_values(ids);
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = self
            .table::<E>()
            .list(Query::new().filter(Condition::In("id", ids)))
            .await?;
        Ok(rows.items.into_iter().map(|row| (row.id(), row)).collect())
    }

    /// Targets linked to each book through the join table `L`
    async fn linked_to_books<L: Table, E: Table + Clone>(
        &self,
        book_ids: &[Uuid],
        target_column: &'static str,
    ) -> AppResult<HashMap<Uuid, Vec<E>>> {
        let links = self
            .table::<L>()
            .list(
                Query::new().filter(Condition::In("book_id", id_values(book_ids.iter().copied()))),
            )
            .await?
            .items;

        let targets: HashMap<Uuid, E> = self
            .load_by_ids(links.iter().filter_map(|link| uuid_field(link, target_column)))
            .await?;

        let mut by_book: HashMap<Uuid, Vec<E>> = HashMap::new();
        for link in &links {
            let book_id = uuid_field(link, "book_id");
            let target = uuid_field(link, target_column).and_then(|id| targets.get(&id));
            if let (Some(book_id), Some(target)) = (book_id, target) {
                by_book.entry(book_id).or_default().push(target.clone());
            }
        }
        Ok(by_book)
    }

    /// Attach the requested member and book to each loan.
    /// Soft-deleted relations are left out.
    pub async fn loan_transaction_details(
        &self,
        loans: Vec<LoanTransaction>,
        includes: &[LoanTransactionInclude],
    ) -> AppResult<Vec<LoanTransactionDetails>> {
        let members: HashMap<Uuid, Member> = if includes.contains(&LoanTransactionInclude::Member) {
            self.load_by_ids(loans.iter().map(|loan| loan.member_id)).await?
        } else {
            HashMap::new()
        };
        let books: HashMap<Uuid, Book> = if includes.contains(&LoanTransactionInclude::Book) {
            self.load_by_ids(loans.iter().map(|loan| loan.book_id)).await?
        } else {
            HashMap::new()
        };

        Ok(loans
            .into_iter()
            .map(|loan| LoanTransactionDetails {
                member: members.get(&loan.member_id).cloned(),
                book: books.get(&loan.book_id).cloned(),
                loan_transaction: loan,
            })
            .collect())
    }

    /// Attach the requested authors, categories and publishers to each book
    pub async fn book_details(
        &self,
        books: Vec<Book>,
        includes: &[BookInclude],
    ) -> AppResult<Vec<BookDetails>> {
        let ids: Vec<Uuid> = books.iter().map(|book| book.id).collect();

        let mut authors = if includes.contains(&BookInclude::Authors) {
            Some(self.linked_to_books::<AuthorBook, Author>(&ids, "author_id").await?)
        } else {
            None
        };
        let mut categories = if includes.contains(&BookInclude::Categories) {
            Some(self.linked_to_books::<CategoryBook, Category>(&ids, "category_id").await?)
        } else {
            None
        };
        let mut publishers = if includes.contains(&BookInclude::Publishers) {
            Some(self.linked_to_books::<BookPublisher, Publisher>(&ids, "publisher_id").await?)
        } else {
            None
        };

        Ok(books
            .into_iter()
            .map(|book| BookDetails {
                authors: authors
                    .as_mut()
                    .map(|all| all.remove(&book.id).unwrap_or_default()),
                categories: categories
                    .as_mut()
                    .map(|all| all.remove(&book.id).unwrap_or_default()),
                publishers: publishers
                    .as_mut()
                    .map(|all| all.remove(&book.id).unwrap_or_default()),
                book,
            })
            .collect())
    }
}
