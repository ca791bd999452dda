//! Member endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{
        member::{CreateMember, UpdateMember},
        ListQuery, Member,
    },
    repository::Page,
    AppState,
};

use super::AuthenticatedUser;

/// List members, optionally filtered by last name
#[utoipa::path(
    get,
    path = "/members",
    tag = "members",
    security(("bearer_auth" = [])),
    params(ListQuery),
    responses(
        (status = 200, description = "Page of members"),
        (status = 403, description = "Missing Members.Read")
    )
)]
pub async fn list_members(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<Page<Member>>> {
    let members = state.services.members.list(&caller, query).await?;
    Ok(Json(members))
}

#[utoipa::path(
    get,
    path = "/members/{id}",
    tag = "members",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Member ID")),
    responses(
        (status = 200, description = "Member", body = Member),
        (status = 404, description = "Member not found")
    )
)]
pub async fn get_member(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Member>> {
    let member = state.services.members.get(&caller, id).await?;
    Ok(Json(member))
}

/// Register a member; a user account is created when `user_id` is absent
#[utoipa::path(
    post,
    path = "/members",
    tag = "members",
    security(("bearer_auth" = [])),
    request_body = CreateMember,
    responses(
        (status = 201, description = "Member created", body = Member),
        (status = 400, description = "Invalid input"),
        (status = 404, description = "User not found"),
        (status = 422, description = "Email already used or user already has a member")
    )
)]
pub async fn create_member(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Json(request): Json<CreateMember>,
) -> AppResult<(StatusCode, Json<Member>)> {
    let member = state.services.members.create(&caller, request).await?;
    Ok((StatusCode::CREATED, Json(member)))
}

#[utoipa::path(
    put,
    path = "/members/{id}",
    tag = "members",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Member ID")),
    request_body = UpdateMember,
    responses(
        (status = 200, description = "Member updated", body = Member),
        (status = 404, description = "Member not found")
    )
)]
pub async fn update_member(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateMember>,
) -> AppResult<Json<Member>> {
    let member = state.services.members.update(&caller, id, request).await?;
    Ok(Json(member))
}

/// Soft delete a member together with their loans and reservations
#[utoipa::path(
    delete,
    path = "/members/{id}",
    tag = "members",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Member ID")),
    responses(
        (status = 200, description = "Member deleted", body = Member),
        (status = 404, description = "Member not found")
    )
)]
pub async fn delete_member(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Member>> {
    let member = state.services.members.delete(&caller, id).await?;
    Ok(Json(member))
}
