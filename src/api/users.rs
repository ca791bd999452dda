//! User, operation claim and claim assignment endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{
        user::{
            CreateUser, CreateUserOperationClaim, OperationClaimRequest, UpdateUser,
            UserOperationClaimQuery,
        },
        ListQuery, OperationClaim, User, UserOperationClaim,
    },
    repository::Page,
    AppState,
};

use super::AuthenticatedUser;

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

/// List users, optionally filtered by email
#[utoipa::path(
    get,
    path = "/users",
    tag = "users",
    security(("bearer_auth" = [])),
    params(ListQuery),
    responses(
        (status = 200, description = "Page of users"),
        (status = 403, description = "Missing Users.Read")
    )
)]
pub async fn list_users(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<Page<User>>> {
    let users = state.services.users.list(&caller, query).await?;
    Ok(Json(users))
}

#[utoipa::path(
    get,
    path = "/users/{id}",
    tag = "users",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "User", body = User),
        (status = 404, description = "User not found")
    )
)]
pub async fn get_user(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<User>> {
    let user = state.services.users.get(&caller, id).await?;
    Ok(Json(user))
}

#[utoipa::path(
    post,
    path = "/users",
    tag = "users",
    security(("bearer_auth" = [])),
    request_body = CreateUser,
    responses(
        (status = 201, description = "User created", body = User),
        (status = 400, description = "Invalid input"),
        (status = 422, description = "Email already exists")
    )
)]
pub async fn create_user(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Json(request): Json<CreateUser>,
) -> AppResult<(StatusCode, Json<User>)> {
    let user = state.services.users.create(&caller, request).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

#[utoipa::path(
    put,
    path = "/users/{id}",
    tag = "users",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "User ID")),
    request_body = UpdateUser,
    responses(
        (status = 200, description = "User updated", body = User),
        (status = 404, description = "User not found"),
        (status = 422, description = "Email already exists")
    )
)]
pub async fn update_user(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateUser>,
) -> AppResult<Json<User>> {
    let user = state.services.users.update(&caller, id, request).await?;
    Ok(Json(user))
}

/// Soft delete a user; their member and grants follow
#[utoipa::path(
    delete,
    path = "/users/{id}",
    tag = "users",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "User deleted", body = User),
        (status = 404, description = "User not found")
    )
)]
pub async fn delete_user(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<User>> {
    let user = state.services.users.delete(&caller, id).await?;
    Ok(Json(user))
}

// ---------------------------------------------------------------------------
// Operation claims
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/operation-claims",
    tag = "operation-claims",
    security(("bearer_auth" = [])),
    params(ListQuery),
    responses(
        (status = 200, description = "Page of operation claims")
    )
)]
pub async fn list_operation_claims(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<Page<OperationClaim>>> {
    let claims = state.services.users.list_claims(&caller, query).await?;
    Ok(Json(claims))
}

#[utoipa::path(
    get,
    path = "/operation-claims/{id}",
    tag = "operation-claims",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Operation claim ID")),
    responses(
        (status = 200, description = "Operation claim", body = OperationClaim),
        (status = 404, description = "Operation claim not found")
    )
)]
pub async fn get_operation_claim(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<OperationClaim>> {
    let claim = state.services.users.get_claim(&caller, id).await?;
    Ok(Json(claim))
}

#[utoipa::path(
    post,
    path = "/operation-claims",
    tag = "operation-claims",
    security(("bearer_auth" = [])),
    request_body = OperationClaimRequest,
    responses(
        (status = 201, description = "Operation claim created", body = OperationClaim),
        (status = 422, description = "Name already exists")
    )
)]
pub async fn create_operation_claim(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Json(request): Json<OperationClaimRequest>,
) -> AppResult<(StatusCode, Json<OperationClaim>)> {
    let claim = state.services.users.create_claim(&caller, request).await?;
    Ok((StatusCode::CREATED, Json(claim)))
}

#[utoipa::path(
    put,
    path = "/operation-claims/{id}",
    tag = "operation-claims",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Operation claim ID")),
    request_body = OperationClaimRequest,
    responses(
        (status = 200, description = "Operation claim renamed", body = OperationClaim),
        (status = 404, description = "Operation claim not found"),
        (status = 422, description = "Name already exists")
    )
)]
pub async fn update_operation_claim(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(request): Json<OperationClaimRequest>,
) -> AppResult<Json<OperationClaim>> {
    let claim = state.services.users.update_claim(&caller, id, request).await?;
    Ok(Json(claim))
}

#[utoipa::path(
    delete,
    path = "/operation-claims/{id}",
    tag = "operation-claims",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Operation claim ID")),
    responses(
        (status = 200, description = "Operation claim deleted", body = OperationClaim),
        (status = 404, description = "Operation claim not found")
    )
)]
pub async fn delete_operation_claim(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<OperationClaim>> {
    let claim = state.services.users.delete_claim(&caller, id).await?;
    Ok(Json(claim))
}

// ---------------------------------------------------------------------------
// Claim assignments
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/user-operation-claims",
    tag = "user-operation-claims",
    security(("bearer_auth" = [])),
    params(UserOperationClaimQuery),
    responses(
        (status = 200, description = "Page of claim assignments")
    )
)]
pub async fn list_user_operation_claims(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Query(query): Query<UserOperationClaimQuery>,
) -> AppResult<Json<Page<UserOperationClaim>>> {
    let grants = state.services.users.list_grants(&caller, query).await?;
    Ok(Json(grants))
}

#[utoipa::path(
    get,
    path = "/user-operation-claims/{id}",
    tag = "user-operation-claims",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Assignment ID")),
    responses(
        (status = 200, description = "Claim assignment", body = UserOperationClaim),
        (status = 404, description = "Assignment not found")
    )
)]
pub async fn get_user_operation_claim(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<UserOperationClaim>> {
    let grant = state.services.users.get_grant(&caller, id).await?;
    Ok(Json(grant))
}

/// Grant an operation claim to a user
#[utoipa::path(
    post,
    path = "/user-operation-claims",
    tag = "user-operation-claims",
    security(("bearer_auth" = [])),
    request_body = CreateUserOperationClaim,
    responses(
        (status = 201, description = "Claim granted", body = UserOperationClaim),
        (status = 404, description = "User or claim not found"),
        (status = 422, description = "Claim already granted")
    )
)]
pub async fn create_user_operation_claim(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Json(request): Json<CreateUserOperationClaim>,
) -> AppResult<(StatusCode, Json<UserOperationClaim>)> {
    let grant = state.services.users.grant(&caller, request).await?;
    Ok((StatusCode::CREATED, Json(grant)))
}

#[utoipa::path(
    put,
    path = "/user-operation-claims/{id}",
    tag = "user-operation-claims",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Assignment ID")),
    request_body = CreateUserOperationClaim,
    responses(
        (status = 200, description = "Assignment updated", body = UserOperationClaim),
        (status = 404, description = "Assignment, user or claim not found"),
        (status = 422, description = "Claim already granted")
    )
)]
pub async fn update_user_operation_claim(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(request): Json<CreateUserOperationClaim>,
) -> AppResult<Json<UserOperationClaim>> {
    let grant = state.services.users.update_grant(&caller, id, request).await?;
    Ok(Json(grant))
}

/// Revoke a claim assignment
#[utoipa::path(
    delete,
    path = "/user-operation-claims/{id}",
    tag = "user-operation-claims",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Assignment ID")),
    responses(
        (status = 200, description = "Claim revoked", body = UserOperationClaim),
        (status = 404, description = "Assignment not found")
    )
)]
pub async fn delete_user_operation_claim(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<UserOperationClaim>> {
    let grant = state.services.users.revoke(&caller, id).await?;
    Ok(Json(grant))
}
