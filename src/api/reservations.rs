//! Reservation endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{
        reservation::{ReservationQuery, ReservationRequest},
        Reservation,
    },
    repository::Page,
    AppState,
};

use super::AuthenticatedUser;

#[utoipa::path(
    get,
    path = "/reservations",
    tag = "reservations",
    security(("bearer_auth" = [])),
    params(ReservationQuery),
    responses(
        (status = 200, description = "Page of reservations"),
        (status = 403, description = "Missing Reservations.Read")
    )
)]
pub async fn list_reservations(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Query(query): Query<ReservationQuery>,
) -> AppResult<Json<Page<Reservation>>> {
    let reservations = state.services.reservations.list(&caller, query).await?;
    Ok(Json(reservations))
}

#[utoipa::path(
    get,
    path = "/reservations/{id}",
    tag = "reservations",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Reservation ID")),
    responses(
        (status = 200, description = "Reservation", body = Reservation),
        (status = 404, description = "Reservation not found")
    )
)]
pub async fn get_reservation(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Reservation>> {
    let reservation = state.services.reservations.get(&caller, id).await?;
    Ok(Json(reservation))
}

/// Reserve a book for a member
#[utoipa::path(
    post,
    path = "/reservations",
    tag = "reservations",
    security(("bearer_auth" = [])),
    request_body = ReservationRequest,
    responses(
        (status = 201, description = "Reservation created", body = Reservation),
        (status = 404, description = "Book or member not found"),
        (status = 422, description = "Invalid period or book already reserved")
    )
)]
pub async fn create_reservation(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Json(request): Json<ReservationRequest>,
) -> AppResult<(StatusCode, Json<Reservation>)> {
    let reservation = state.services.reservations.create(&caller, request).await?;
    Ok((StatusCode::CREATED, Json(reservation)))
}

#[utoipa::path(
    put,
    path = "/reservations/{id}",
    tag = "reservations",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Reservation ID")),
    request_body = ReservationRequest,
    responses(
        (status = 200, description = "Reservation updated", body = Reservation),
        (status = 404, description = "Reservation, book or member not found"),
        (status = 422, description = "Invalid period or book already reserved")
    )
)]
pub async fn update_reservation(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(request): Json<ReservationRequest>,
) -> AppResult<Json<Reservation>> {
    let reservation = state
        .services
        .reservations
        .update(&caller, id, request)
        .await?;
    Ok(Json(reservation))
}

#[utoipa::path(
    delete,
    path = "/reservations/{id}",
    tag = "reservations",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Reservation ID")),
    responses(
        (status = 200, description = "Reservation deleted", body = Reservation),
        (status = 404, description = "Reservation not found")
    )
)]
pub async fn delete_reservation(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Reservation>> {
    let reservation = state.services.reservations.delete(&caller, id).await?;
    Ok(Json(reservation))
}
