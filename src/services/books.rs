//! Book management service

use futures::FutureExt;
use serde::Serialize;
use uuid::Uuid;
use validator::Validate;

use super::{
    authorization::{capabilities::books, Caller},
    groups,
    pipeline::{cache_key, Operation, Pipeline},
};
use crate::{
    error::{AppError, AppResult},
    models::{
        book::{BookQuery, CreateBook, UpdateBook},
        Audit, Book, BookDetails, BookInclude,
    },
    repository::{Page, PageRequest, Query},
    rules,
};

const INVALIDATES: &[&str] = &[groups::BOOKS];

#[derive(Serialize)]
struct ListKey<'a> {
    query: &'a BookQuery,
    include: &'a [BookInclude],
}

#[derive(Clone)]
pub struct BooksService {
    pipeline: Pipeline,
}

impl BooksService {
    pub fn new(pipeline: Pipeline) -> Self {
        Self { pipeline }
    }

    pub async fn create(&self, caller: &Caller, request: CreateBook) -> AppResult<Book> {
        request.validate()?;
        let operation = Operation::command("CreateBook")
            .requires(&[books::CREATE])
            .invalidates(INVALIDATES);

        self.pipeline
            .run(caller, operation, move |repository| {
                async move {
                    rules::book::check_isbn_unique(&repository, &request.isbn, None).await?;
                    rules::book::check_references(&repository, &request).await?;

                    let book = Book {
                        id: Uuid::new_v4(),
                        name: request.name,
                        isbn: request.isbn,
                        page: request.page,
                        language: request.language,
                        units_in_stock: request.units_in_stock,
                        description: request.description,
                        category_id: request.category_id,
                        publisher_id: request.publisher_id,
                        author_id: request.author_id,
                        audit: Audit::new(),
                    };
                    repository.table::<Book>().add(book).await
                }
                .boxed()
            })
            .await
    }

    pub async fn update(&self, caller: &Caller, id: Uuid, request: UpdateBook) -> AppResult<Book> {
        request.validate()?;
        // Loan pages embed the book through `include=book`
        let operation = Operation::command("UpdateBook")
            .requires(&[books::UPDATE])
            .invalidates(&[groups::BOOKS, groups::LOAN_TRANSACTIONS]);

        self.pipeline
            .run(caller, operation, move |repository| {
                async move {
                    let mut book = repository.require::<Book>(id).await?;
                    rules::book::check_isbn_unique(&repository, &request.isbn, Some(id)).await?;
                    rules::book::check_references(&repository, &request).await?;

                    book.name = request.name;
                    book.isbn = request.isbn;
                    book.page = request.page;
                    book.language = request.language;
                    book.units_in_stock = request.units_in_stock;
                    book.description = request.description;
                    book.category_id = request.category_id;
                    book.publisher_id = request.publisher_id;
                    book.author_id = request.author_id;
                    repository.table::<Book>().update(book).await
                }
                .boxed()
            })
            .await
    }

    /// Soft delete; loans, reservations and catalog links follow
    pub async fn delete(&self, caller: &Caller, id: Uuid) -> AppResult<Book> {
        let operation = Operation::command("DeleteBook")
            .requires(&[books::DELETE])
            .invalidates(&[groups::BOOKS, groups::LOAN_TRANSACTIONS, groups::RESERVATIONS]);

        self.pipeline
            .run(caller, operation, move |repository| {
                async move {
                    let book = repository.require::<Book>(id).await?;
                    repository.table::<Book>().delete(book, false).await
                }
                .boxed()
            })
            .await
    }

    pub async fn get(
        &self,
        caller: &Caller,
        id: Uuid,
        include: Vec<BookInclude>,
    ) -> AppResult<BookDetails> {
        let operation = Operation::query("GetByIdBook").requires(&[books::READ]);

        self.pipeline
            .run(caller, operation, move |repository| {
                async move {
                    let book = repository.require::<Book>(id).await?;
                    let details = repository.book_details(vec![book], &include).await?;
                    details
                        .into_iter()
                        .next()
                        .ok_or_else(|| AppError::NotFound("Book not found".to_string()))
                }
                .boxed()
            })
            .await
    }

    pub async fn list(
        &self,
        caller: &Caller,
        params: BookQuery,
        include: Vec<BookInclude>,
    ) -> AppResult<Page<BookDetails>> {
        let key = cache_key(
            "GetListBooks",
            &ListKey {
                query: &params,
                include: &include,
            },
        );
        let operation = Operation::query("GetListBooks")
            .requires(&[books::READ])
            .cached(key, groups::BOOKS);

        self.pipeline
            .run(caller, operation, move |repository| {
                async move {
                    let query = Query::new()
                        .contains_opt("name", params.name.as_deref())
                        .eq_opt("isbn", params.isbn)
                        .eq_opt("category_id", params.category_id)
                        .eq_opt("publisher_id", params.publisher_id)
                        .eq_opt("author_id", params.author_id)
                        .paginate(PageRequest::from_params(params.page, params.per_page));

                    let page = repository.table::<Book>().list(query).await?;
                    let details = repository.book_details(page.items, &include).await?;
                    Ok(Page {
                        items: details,
                        total: page.total,
                        page: page.page,
                        per_page: page.per_page,
                    })
                }
                .boxed()
            })
            .await
    }
}
