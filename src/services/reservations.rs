//! Reservation service

use chrono::Utc;
use futures::FutureExt;
use uuid::Uuid;
use validator::Validate;

use super::{
    authorization::{capabilities::reservations, Caller},
    groups,
    pipeline::{cache_key, Operation, Pipeline},
};
use crate::{
    error::AppResult,
    models::{
        reservation::{ReservationQuery, ReservationRequest},
        Audit, Book, Member, Reservation,
    },
    repository::{Condition, FieldValue, Page, PageRequest, Query},
    rules,
};

const INVALIDATES: &[&str] = &[groups::RESERVATIONS];

#[derive(Clone)]
pub struct ReservationsService {
    pipeline: Pipeline,
}

impl ReservationsService {
    pub fn new(pipeline: Pipeline) -> Self {
        Self { pipeline }
    }

    /// Reserve a book for a member. Only one running reservation per book.
    pub async fn create(&self, caller: &Caller, request: ReservationRequest) -> AppResult<Reservation> {
        request.validate()?;
        let operation = Operation::command("CreateReservation")
            .requires(&[reservations::CREATE])
            .invalidates(INVALIDATES);

        self.pipeline
            .run(caller, operation, move |repository| {
                async move {
                    repository.require::<Book>(request.book_id).await?;
                    repository.require::<Member>(request.member_id).await?;
                    rules::reservation::check_period(
                        request.reservation_date,
                        request.expiration_date,
                    )?;
                    rules::reservation::check_book_not_reserved(
                        &repository,
                        request.book_id,
                        Utc::now(),
                        None,
                    )
                    .await?;

                    let reservation = Reservation {
                        id: Uuid::new_v4(),
                        book_id: request.book_id,
                        member_id: request.member_id,
                        reservation_date: request.reservation_date,
                        expiration_date: request.expiration_date,
                        audit: Audit::new(),
                    };
                    let reservation = repository.table::<Reservation>().add(reservation).await?;
                    tracing::info!(
                        reservation_id = %reservation.id,
                        book_id = %reservation.book_id,
                        member_id = %reservation.member_id,
                        "Book reserved"
                    );
                    Ok(reservation)
                }
                .boxed()
            })
            .await
    }

    pub async fn update(
        &self,
        caller: &Caller,
        id: Uuid,
        request: ReservationRequest,
    ) -> AppResult<Reservation> {
        request.validate()?;
        let operation = Operation::command("UpdateReservation")
            .requires(&[reservations::UPDATE])
            .invalidates(INVALIDATES);

        self.pipeline
            .run(caller, operation, move |repository| {
                async move {
                    let mut reservation = repository.require::<Reservation>(id).await?;
                    repository.require::<Book>(request.book_id).await?;
                    repository.require::<Member>(request.member_id).await?;
                    rules::reservation::check_period(
                        request.reservation_date,
                        request.expiration_date,
                    )?;
                    rules::reservation::check_book_not_reserved(
                        &repository,
                        request.book_id,
                        Utc::now(),
                        Some(id),
                    )
                    .await?;

                    reservation.book_id = request.book_id;
                    reservation.member_id = request.member_id;
                    reservation.reservation_date = request.reservation_date;
                    reservation.expiration_date = request.expiration_date;
                    repository.table::<Reservation>().update(reservation).await
                }
                .boxed()
            })
            .await
    }

    /// Soft delete, which also releases the book
    pub async fn delete(&self, caller: &Caller, id: Uuid) -> AppResult<Reservation> {
        let operation = Operation::command("DeleteReservation")
            .requires(&[reservations::DELETE])
            .invalidates(INVALIDATES);

        self.pipeline
            .run(caller, operation, move |repository| {
                async move {
                    let reservation = repository.require::<Reservation>(id).await?;
                    repository.table::<Reservation>().delete(reservation, false).await
                }
                .boxed()
            })
            .await
    }

    pub async fn get(&self, caller: &Caller, id: Uuid) -> AppResult<Reservation> {
        let operation = Operation::query("GetByIdReservation").requires(&[reservations::READ]);

        self.pipeline
            .run(caller, operation, move |repository| {
                async move { repository.require::<Reservation>(id).await }.boxed()
            })
            .await
    }

    pub async fn list(
        &self,
        caller: &Caller,
        params: ReservationQuery,
    ) -> AppResult<Page<Reservation>> {
        let mut operation = Operation::query("GetListReservations").requires(&[reservations::READ]);
        if params.active.is_none() {
            operation = operation.cached(
                cache_key("GetListReservations", &params),
                groups::RESERVATIONS,
            );
        }

        self.pipeline
            .run(caller, operation, move |repository| {
                async move {
                    let now = FieldValue::from(Utc::now());
                    let mut query = Query::new()
                        .eq_opt("book_id", params.book_id)
                        .eq_opt("member_id", params.member_id)
                        .paginate(PageRequest::from_params(params.page, params.per_page));
                    query = match params.active {
                        Some(true) => query.filter(Condition::Gt("expiration_date", now)),
                        Some(false) => query.filter(Condition::Lte("expiration_date", now)),
                        None => query,
                    };
                    repository.table::<Reservation>().list(query).await
                }
                .boxed()
            })
            .await
    }
}
