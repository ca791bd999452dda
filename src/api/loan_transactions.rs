//! Loan transaction endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{
        loan_transaction::{
            CreateLoanTransaction, CreatedLoanTransactionResponse, LoanTransactionQuery,
            UpdateLoanTransaction,
        },
        LoanTransaction, LoanTransactionDetails,
    },
    repository::Page,
    AppState,
};

use super::{AuthenticatedUser, IncludeParams};

/// List loan transactions
#[utoipa::path(
    get,
    path = "/loan-transactions",
    tag = "loan-transactions",
    security(("bearer_auth" = [])),
    params(LoanTransactionQuery, IncludeParams),
    responses(
        (status = 200, description = "Page of loans; `include` accepts member, book"),
        (status = 403, description = "Missing LoanTransactions.Read")
    )
)]
pub async fn list_loan_transactions(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Query(query): Query<LoanTransactionQuery>,
    Query(include): Query<IncludeParams>,
) -> AppResult<Json<Page<LoanTransactionDetails>>> {
    let include = include.parse()?;
    let loans = state
        .services
        .loan_transactions
        .list(&caller, query, include)
        .await?;
    Ok(Json(loans))
}

#[utoipa::path(
    get,
    path = "/loan-transactions/{id}",
    tag = "loan-transactions",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Loan transaction ID"),
        IncludeParams
    ),
    responses(
        (status = 200, description = "Loan transaction", body = LoanTransactionDetails),
        (status = 404, description = "Loan transaction not found")
    )
)]
pub async fn get_loan_transaction(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Path(id): Path<Uuid>,
    Query(include): Query<IncludeParams>,
) -> AppResult<Json<LoanTransactionDetails>> {
    let include = include.parse()?;
    let loan = state
        .services
        .loan_transactions
        .get(&caller, id, include)
        .await?;
    Ok(Json(loan))
}

/// Lend a book to a member
///
/// The due date is set to 17:00 UTC on the requested day and the member
/// is notified by mail.
#[utoipa::path(
    post,
    path = "/loan-transactions",
    tag = "loan-transactions",
    security(("bearer_auth" = [])),
    request_body = CreateLoanTransaction,
    responses(
        (status = 201, description = "Loan recorded", body = CreatedLoanTransactionResponse),
        (status = 404, description = "Member or book not found"),
        (status = 422, description = "Book already borrowed"),
        (status = 502, description = "Notification could not be sent")
    )
)]
pub async fn create_loan_transaction(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Json(request): Json<CreateLoanTransaction>,
) -> AppResult<(StatusCode, Json<CreatedLoanTransactionResponse>)> {
    let loan = state
        .services
        .loan_transactions
        .create(&caller, request)
        .await?;
    Ok((StatusCode::CREATED, Json(loan)))
}

/// Return a borrowed book
#[utoipa::path(
    post,
    path = "/loan-transactions/{id}/return",
    tag = "loan-transactions",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Loan transaction ID")),
    responses(
        (status = 200, description = "Book returned", body = LoanTransaction),
        (status = 404, description = "Loan transaction not found"),
        (status = 422, description = "Already returned")
    )
)]
pub async fn return_loan_transaction(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<LoanTransaction>> {
    let loan = state
        .services
        .loan_transactions
        .return_book(&caller, id)
        .await?;
    Ok(Json(loan))
}

#[utoipa::path(
    put,
    path = "/loan-transactions/{id}",
    tag = "loan-transactions",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Loan transaction ID")),
    request_body = UpdateLoanTransaction,
    responses(
        (status = 200, description = "Loan transaction updated", body = LoanTransaction),
        (status = 404, description = "Loan, member or book not found"),
        (status = 422, description = "Book already borrowed")
    )
)]
pub async fn update_loan_transaction(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateLoanTransaction>,
) -> AppResult<Json<LoanTransaction>> {
    let loan = state
        .services
        .loan_transactions
        .update(&caller, id, request)
        .await?;
    Ok(Json(loan))
}

#[utoipa::path(
    delete,
    path = "/loan-transactions/{id}",
    tag = "loan-transactions",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Loan transaction ID")),
    responses(
        (status = 200, description = "Loan transaction deleted", body = LoanTransaction),
        (status = 404, description = "Loan transaction not found")
    )
)]
pub async fn delete_loan_transaction(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<LoanTransaction>> {
    let loan = state.services.loan_transactions.delete(&caller, id).await?;
    Ok(Json(loan))
}
