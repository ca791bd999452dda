//! OpenAPI documentation

use axum::Router;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{books, catalog, health, loan_transactions, members, reservations, users};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Library API",
        version = "1.0.0",
        description = "Library management REST API"
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    modifiers(&SecurityAddon),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Books
        books::list_books,
        books::get_book,
        books::create_book,
        books::update_book,
        books::delete_book,
        // Authors
        catalog::authors::list,
        catalog::authors::get,
        catalog::authors::create,
        catalog::authors::update,
        catalog::authors::delete,
        catalog::authors::links,
        catalog::authors::link,
        catalog::authors::unlink,
        // Categories
        catalog::categories::list,
        catalog::categories::get,
        catalog::categories::create,
        catalog::categories::update,
        catalog::categories::delete,
        catalog::categories::links,
        catalog::categories::link,
        catalog::categories::unlink,
        // Publishers
        catalog::publishers::list,
        catalog::publishers::get,
        catalog::publishers::create,
        catalog::publishers::update,
        catalog::publishers::delete,
        catalog::publishers::links,
        catalog::publishers::link,
        catalog::publishers::unlink,
        // Members
        members::list_members,
        members::get_member,
        members::create_member,
        members::update_member,
        members::delete_member,
        // Loan transactions
        loan_transactions::list_loan_transactions,
        loan_transactions::get_loan_transaction,
        loan_transactions::create_loan_transaction,
        loan_transactions::return_loan_transaction,
        loan_transactions::update_loan_transaction,
        loan_transactions::delete_loan_transaction,
        // Reservations
        reservations::list_reservations,
        reservations::get_reservation,
        reservations::create_reservation,
        reservations::update_reservation,
        reservations::delete_reservation,
        // Users
        users::list_users,
        users::get_user,
        users::create_user,
        users::update_user,
        users::delete_user,
        users::list_operation_claims,
        users::get_operation_claim,
        users::create_operation_claim,
        users::update_operation_claim,
        users::delete_operation_claim,
        users::list_user_operation_claims,
        users::get_user_operation_claim,
        users::create_user_operation_claim,
        users::update_user_operation_claim,
        users::delete_user_operation_claim,
    ),
    components(
        schemas(
            crate::models::Audit,
            // Books
            crate::models::book::Book,
            crate::models::book::CreateBook,
            crate::models::book::BookDetails,
            crate::models::book::BookInclude,
            // Catalog
            crate::models::author::Author,
            crate::models::author::AuthorBook,
            crate::models::author::CreateAuthor,
            crate::models::author::UpdateAuthor,
            crate::models::category::Category,
            crate::models::category::CategoryBook,
            crate::models::category::CategoryRequest,
            crate::models::publisher::Publisher,
            crate::models::publisher::BookPublisher,
            crate::models::publisher::PublisherRequest,
            // Members
            crate::models::member::Member,
            crate::models::member::CreateMember,
            crate::models::member::UpdateMember,
            // Loans
            crate::models::loan_transaction::LoanTransaction,
            crate::models::loan_transaction::ReturnStatus,
            crate::models::loan_transaction::CreateLoanTransaction,
            crate::models::loan_transaction::UpdateLoanTransaction,
            crate::models::loan_transaction::CreatedLoanTransactionResponse,
            crate::models::loan_transaction::LoanTransactionDetails,
            crate::models::loan_transaction::LoanTransactionInclude,
            // Reservations
            crate::models::reservation::Reservation,
            crate::models::reservation::ReservationRequest,
            // Users
            crate::models::user::User,
            crate::models::user::AuthenticatorType,
            crate::models::user::CreateUser,
            crate::models::user::UpdateUser,
            crate::models::user::OperationClaim,
            crate::models::user::OperationClaimRequest,
            crate::models::user::UserOperationClaim,
            crate::models::user::CreateUserOperationClaim,
            // Health
            health::HealthResponse,
            // Errors
            crate::error::ErrorResponse,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "books", description = "Book catalog"),
        (name = "authors", description = "Authors and their books"),
        (name = "categories", description = "Categories and their books"),
        (name = "publishers", description = "Publishers and their books"),
        (name = "members", description = "Library members"),
        (name = "loan-transactions", description = "Book loans and returns"),
        (name = "reservations", description = "Book reservations"),
        (name = "users", description = "User accounts"),
        (name = "operation-claims", description = "Capability catalog"),
        (name = "user-operation-claims", description = "Capabilities granted to users")
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_lists_loan_paths_and_bearer_scheme() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/loan-transactions"));
        assert!(doc.paths.paths.contains_key("/loan-transactions/{id}/return"));
        assert!(doc.paths.paths.contains_key("/books/{id}/authors/{entry_id}"));
        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer_auth"));
    }
}
