//! Catalog rules: books and their author, category and publisher links

use uuid::Uuid;

use super::{ensure_absent, excluding, require_optional};
use crate::{
    error::AppResult,
    models::{book::CreateBook, Author, Book, Category, Publisher},
    repository::{Query, Repository, Table},
};

pub const ISBN_ALREADY_EXISTS: &str = "Book ISBN already exists";

pub async fn check_isbn_unique(
    repository: &Repository,
    isbn: &str,
    except: Option<Uuid>,
) -> AppResult<()> {
    let same_isbn = Query::new().eq("isbn", isbn);
    ensure_absent::<Book>(repository, excluding(same_isbn, except), ISBN_ALREADY_EXISTS).await
}

/// The primary category, publisher and author must exist when set
pub async fn check_references(repository: &Repository, book: &CreateBook) -> AppResult<()> {
    require_optional::<Category>(repository, book.category_id).await?;
    require_optional::<Publisher>(repository, book.publisher_id).await?;
    require_optional::<Author>(repository, book.author_id).await?;
    Ok(())
}

/// A book may be linked to the same target only once through `L`
pub async fn check_not_linked<L: Table>(
    repository: &Repository,
    book_id: Uuid,
    target_column: &'static str,
    target_id: Uuid,
) -> AppResult<()> {
    let link = Query::new()
        .eq("book_id", book_id)
        .eq(target_column, target_id);
    let message = format!("{} already linked", L::LABEL);
    ensure_absent::<L>(repository, link, &message).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::AppError,
        models::{Audit, AuthorBook},
    };

    fn book(isbn: &str) -> Book {
        Book {
            id: Uuid::new_v4(),
            name: "The Name of the Rose".into(),
            isbn: isbn.into(),
            page: 536,
            language: "en".into(),
            units_in_stock: 2,
            description: None,
            category_id: None,
            publisher_id: None,
            author_id: None,
            audit: Audit::new(),
        }
    }

    #[tokio::test]
    async fn test_isbn_unique_among_live_books() {
        let repository = Repository::memory();
        let stored = repository.table::<Book>().add(book("9780156001311")).await.unwrap();

        let result = check_isbn_unique(&repository, "9780156001311", None).await;
        assert!(matches!(result, Err(AppError::BusinessRule(message)) if message == ISBN_ALREADY_EXISTS));
        tokio_test::assert_ok!(check_isbn_unique(&repository, "9780156001311", Some(stored.id)).await);

        repository.table::<Book>().delete(stored, false).await.unwrap();
        tokio_test::assert_ok!(check_isbn_unique(&repository, "9780156001311", None).await);
    }

    #[tokio::test]
    async fn test_missing_reference_is_not_found() {
        let repository = Repository::memory();
        let request = CreateBook {
            name: "Dune".into(),
            isbn: "9780441013593".into(),
            page: 412,
            language: "en".into(),
            units_in_stock: 1,
            description: None,
            category_id: Some(Uuid::new_v4()),
            publisher_id: None,
            author_id: None,
        };
        let result = check_references(&repository, &request).await;
        assert!(matches!(result, Err(AppError::NotFound(message)) if message == "Category not found"));
    }

    #[tokio::test]
    async fn test_duplicate_link() {
        let repository = Repository::memory();
        let stored = repository.table::<Book>().add(book("9780156001311")).await.unwrap();
        let author = repository
            .table::<Author>()
            .add(Author {
                id: Uuid::new_v4(),
                name: "Umberto Eco".into(),
                identity_number: "UE-1932".into(),
                audit: Audit::new(),
            })
            .await
            .unwrap();

        tokio_test::assert_ok!(
            check_not_linked::<AuthorBook>(&repository, stored.id, "author_id", author.id).await
        );
        repository
            .table::<AuthorBook>()
            .add(AuthorBook {
                id: Uuid::new_v4(),
                author_id: author.id,
                book_id: stored.id,
                audit: Audit::new(),
            })
            .await
            .unwrap();

        let result = check_not_linked::<AuthorBook>(&repository, stored.id, "author_id", author.id).await;
        assert!(matches!(result, Err(AppError::BusinessRule(message)) if message == "Author book already linked"));
    }
}
