//! Book model and related types

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use super::{audit::Audit, author::Author, category::Category, publisher::Publisher};

/// Book model from database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Book {
    pub id: Uuid,
    pub name: String,
    pub isbn: String,
    pub page: i32,
    pub language: String,
    pub units_in_stock: i32,
    pub description: Option<String>,
    /// Primary category, publisher and author. Additional ones live in the join tables.
    pub category_id: Option<Uuid>,
    pub publisher_id: Option<Uuid>,
    pub author_id: Option<Uuid>,
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub audit: Audit,
}

/// Create book request
#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
pub struct CreateBook {
    #[validate(length(min = 1, max = 250))]
    pub name: String,
    #[validate(length(min = 10, max = 17))]
    pub isbn: String,
    #[validate(range(min = 1))]
    pub page: i32,
    #[validate(length(min = 2, max = 50))]
    pub language: String,
    #[validate(range(min = 0))]
    pub units_in_stock: i32,
    pub description: Option<String>,
    pub category_id: Option<Uuid>,
    pub publisher_id: Option<Uuid>,
    pub author_id: Option<Uuid>,
}

/// Update book request (full replacement of the editable fields)
pub type UpdateBook = CreateBook;

/// Book search parameters
#[derive(Debug, Clone, Default, Serialize, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct BookQuery {
    /// Case-insensitive match on the book name
    pub name: Option<String>,
    pub isbn: Option<String>,
    pub category_id: Option<Uuid>,
    pub publisher_id: Option<Uuid>,
    pub author_id: Option<Uuid>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

/// Navigation properties that can be loaded with a book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum BookInclude {
    Authors,
    Categories,
    Publishers,
}

/// Book with its linked authors, categories and publishers.
/// A `None` collection was not requested.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BookDetails {
    #[serde(flatten)]
    pub book: Book,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authors: Option<Vec<Author>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub categories: Option<Vec<Category>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publishers: Option<Vec<Publisher>>,
}
