//! HTTP API handlers

pub mod books;
pub mod catalog;
pub mod health;
pub mod loan_transactions;
pub mod members;
pub mod openapi;
pub mod reservations;
pub mod users;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
    routing::{delete, get, post},
    Router,
};
use serde::{de::DeserializeOwned, Deserialize};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use utoipa::IntoParams;

use crate::{
    error::AppError, models::UserClaims, services::authorization::Caller, AppState,
};

/// Caller identified by the bearer token. Requests without a token run
/// as an anonymous caller and fail on any operation that needs capabilities.
pub struct AuthenticatedUser(pub Caller);

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Some(header) = parts.headers.get(AUTHORIZATION) else {
            return Ok(AuthenticatedUser(Caller::anonymous()));
        };

        let token = header
            .to_str()
            .ok()
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or_else(|| {
                AppError::Authentication("Invalid authorization header format".to_string())
            })?;

        let claims = UserClaims::from_token(token, &state.config.auth.jwt_secret)
            .map_err(|e| AppError::Authentication(e.to_string()))?;

        Ok(AuthenticatedUser(Caller::user(claims.user_id()?)))
    }
}

/// `?include=a,b` navigation selection
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct IncludeParams {
    /// Comma-separated related entities to load
    pub include: Option<String>,
}

impl IncludeParams {
    pub fn parse<T: DeserializeOwned>(&self) -> Result<Vec<T>, AppError> {
        let Some(include) = self.include.as_deref() else {
            return Ok(Vec::new());
        };

        include
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(|name| {
                serde_json::from_value(serde_json::Value::String(name.to_lowercase()))
                    .map_err(|_| AppError::BadRequest(format!("Unknown include: {}", name)))
            })
            .collect()
    }
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_v1 = Router::new()
        // Health
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        // Books
        .route("/books", get(books::list_books).post(books::create_book))
        .route(
            "/books/:id",
            get(books::get_book)
                .put(books::update_book)
                .delete(books::delete_book),
        )
        // Authors
        .route(
            "/authors",
            get(catalog::authors::list).post(catalog::authors::create),
        )
        .route(
            "/authors/:id",
            get(catalog::authors::get)
                .put(catalog::authors::update)
                .delete(catalog::authors::delete),
        )
        .route("/books/:id/authors", get(catalog::authors::links))
        .route("/books/:id/authors/:entry_id", post(catalog::authors::link))
        .route("/author-books/:id", delete(catalog::authors::unlink))
        // Categories
        .route(
            "/categories",
            get(catalog::categories::list).post(catalog::categories::create),
        )
        .route(
            "/categories/:id",
            get(catalog::categories::get)
                .put(catalog::categories::update)
                .delete(catalog::categories::delete),
        )
        .route("/books/:id/categories", get(catalog::categories::links))
        .route(
            "/books/:id/categories/:entry_id",
            post(catalog::categories::link),
        )
        .route("/category-books/:id", delete(catalog::categories::unlink))
        // Publishers
        .route(
            "/publishers",
            get(catalog::publishers::list).post(catalog::publishers::create),
        )
        .route(
            "/publishers/:id",
            get(catalog::publishers::get)
                .put(catalog::publishers::update)
                .delete(catalog::publishers::delete),
        )
        .route("/books/:id/publishers", get(catalog::publishers::links))
        .route(
            "/books/:id/publishers/:entry_id",
            post(catalog::publishers::link),
        )
        .route("/book-publishers/:id", delete(catalog::publishers::unlink))
        // Members
        .route(
            "/members",
            get(members::list_members).post(members::create_member),
        )
        .route(
            "/members/:id",
            get(members::get_member)
                .put(members::update_member)
                .delete(members::delete_member),
        )
        // Loan transactions
        .route(
            "/loan-transactions",
            get(loan_transactions::list_loan_transactions)
                .post(loan_transactions::create_loan_transaction),
        )
        .route(
            "/loan-transactions/:id",
            get(loan_transactions::get_loan_transaction)
                .put(loan_transactions::update_loan_transaction)
                .delete(loan_transactions::delete_loan_transaction),
        )
        .route(
            "/loan-transactions/:id/return",
            post(loan_transactions::return_loan_transaction),
        )
        // Reservations
        .route(
            "/reservations",
            get(reservations::list_reservations).post(reservations::create_reservation),
        )
        .route(
            "/reservations/:id",
            get(reservations::get_reservation)
                .put(reservations::update_reservation)
                .delete(reservations::delete_reservation),
        )
        // Users and claims
        .route("/users", get(users::list_users).post(users::create_user))
        .route(
            "/users/:id",
            get(users::get_user)
                .put(users::update_user)
                .delete(users::delete_user),
        )
        .route(
            "/operation-claims",
            get(users::list_operation_claims).post(users::create_operation_claim),
        )
        .route(
            "/operation-claims/:id",
            get(users::get_operation_claim)
                .put(users::update_operation_claim)
                .delete(users::delete_operation_claim),
        )
        .route(
            "/user-operation-claims",
            get(users::list_user_operation_claims).post(users::create_user_operation_claim),
        )
        .route(
            "/user-operation-claims/:id",
            get(users::get_user_operation_claim)
                .put(users::update_user_operation_claim)
                .delete(users::delete_user_operation_claim),
        )
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_v1)
        .merge(openapi::create_openapi_router())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
}
