//! Members, users and reservations

mod common;

use chrono::{Duration, Utc};

use common::{utc, TestApp};
use library_server::{
    error::AppError,
    models::{
        loan_transaction::CreateLoanTransaction,
        member::{CreateMember, UpdateMember},
        reservation::{ReservationQuery, ReservationRequest},
        user::{CreateUser, OperationClaimRequest},
        LoanTransaction, Member, Reservation, ReturnStatus, User,
    },
    repository::Query,
    rules::{
        reservation::{BOOK_ALREADY_RESERVED, INVALID_RESERVATION_PERIOD},
        user::{CLAIM_NAME_EXISTS, MEMBER_EMAIL_EXISTS, USER_ALREADY_MEMBER, USER_EMAIL_EXISTS},
    },
    services::users::verify_password,
};

fn reservation(book_id: uuid::Uuid, member_id: uuid::Uuid, days: i64) -> ReservationRequest {
    let start = Utc::now() - Duration::days(1);
    ReservationRequest {
        book_id,
        member_id,
        reservation_date: start,
        expiration_date: start + Duration::days(days),
    }
}

#[tokio::test]
async fn test_member_gets_a_user_account() {
    let app = TestApp::new().await;
    let member = app.member("Ada", "Ada@Example.com").await;

    assert_eq!(member.email, "ada@example.com");
    assert!(verify_password(&member.password, "secret-password").unwrap());

    let user = app.services.users.get(&app.admin, member.user_id).await.unwrap();
    assert_eq!(user.email, "ada@example.com");
    assert!(verify_password(&user.password_hash, "secret-password").unwrap());
}

#[tokio::test]
async fn test_member_uniqueness() {
    let app = TestApp::new().await;
    let ada = app.member("Ada", "ada@example.com").await;

    let same_email = app
        .services
        .members
        .create(
            &app.admin,
            CreateMember {
                first_name: "Other".into(),
                last_name: "Ada".into(),
                email: "ADA@example.com".into(),
                password: "secret-password".into(),
                user_id: None,
            },
        )
        .await;
    assert!(matches!(same_email, Err(AppError::BusinessRule(message)) if message == MEMBER_EMAIL_EXISTS));

    let same_user = app
        .services
        .members
        .create(
            &app.admin,
            CreateMember {
                first_name: "Ada".into(),
                last_name: "Again".into(),
                email: "ada.again@example.com".into(),
                password: "secret-password".into(),
                user_id: Some(ada.user_id),
            },
        )
        .await;
    assert!(matches!(same_user, Err(AppError::BusinessRule(message)) if message == USER_ALREADY_MEMBER));
}

#[tokio::test]
async fn test_member_for_existing_user() {
    let app = TestApp::new().await;
    let user = app
        .services
        .users
        .create(
            &app.admin,
            CreateUser {
                email: "grace@example.com".into(),
                password: "secret-password".into(),
                authenticator_type: Default::default(),
            },
        )
        .await
        .unwrap();

    let duplicate = app
        .services
        .users
        .create(
            &app.admin,
            CreateUser {
                email: "Grace@Example.com".into(),
                password: "secret-password".into(),
                authenticator_type: Default::default(),
            },
        )
        .await;
    assert!(matches!(duplicate, Err(AppError::BusinessRule(message)) if message == USER_EMAIL_EXISTS));

    let member = app
        .services
        .members
        .create(
            &app.admin,
            CreateMember {
                first_name: "Grace".into(),
                last_name: "Hopper".into(),
                email: "grace@example.com".into(),
                password: "secret-password".into(),
                user_id: Some(user.id),
            },
        )
        .await
        .unwrap();
    assert_eq!(member.user_id, user.id);

    let updated = app
        .services
        .members
        .update(
            &app.admin,
            member.id,
            UpdateMember {
                first_name: "Grace".into(),
                last_name: "Brewster".into(),
                email: "grace@example.com".into(),
                password: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.full_name(), "Grace Brewster");
    assert_eq!(updated.password, member.password);
}

#[tokio::test]
async fn test_member_soft_delete_cascades_to_loans_and_reservations() {
    let app = TestApp::new().await;
    let dune = app.book("Dune", "9780441013593").await;
    let emma = app.book("Emma", "9780141439587").await;
    let member = app.member("Ada", "ada@example.com").await;

    let loan = app
        .services
        .loan_transactions
        .create(
            &app.admin,
            CreateLoanTransaction {
                member_id: member.id,
                book_id: dune.id,
                return_status: ReturnStatus::Unreturned,
                return_time: utc(2030, 3, 14, 9, 0),
            },
        )
        .await
        .unwrap();
    let reserved = app
        .services
        .reservations
        .create(&app.admin, reservation(emma.id, member.id, 7))
        .await
        .unwrap();

    app.services.members.delete(&app.admin, member.id).await.unwrap();

    let loans = app.repository.table::<LoanTransaction>();
    assert!(loans.get_by_id(loan.id).await.unwrap().is_none());
    assert!(loans
        .get(Query::by_id(loan.id).with_deleted())
        .await
        .unwrap()
        .is_some_and(|loan| loan.audit.is_deleted()));
    assert!(app
        .repository
        .table::<Reservation>()
        .get_by_id(reserved.id)
        .await
        .unwrap()
        .is_none());

    // The book is free again
    let other = app.member("Grace", "grace@example.com").await;
    app.services
        .loan_transactions
        .create(
            &app.admin,
            CreateLoanTransaction {
                member_id: other.id,
                book_id: dune.id,
                return_status: ReturnStatus::Unreturned,
                return_time: utc(2030, 3, 20, 9, 0),
            },
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_user_deletion_reaches_member() {
    let app = TestApp::new().await;
    let ada = app.member("Ada", "ada@example.com").await;
    let grace = app.member("Grace", "grace@example.com").await;

    app.services.users.delete(&app.admin, ada.user_id).await.unwrap();
    let hidden = app.services.members.get(&app.admin, ada.id).await;
    assert!(matches!(hidden, Err(AppError::NotFound(_))));

    let user = app.repository.require::<User>(grace.user_id).await.unwrap();
    app.repository.table::<User>().delete(user, true).await.unwrap();
    let gone = app
        .repository
        .table::<Member>()
        .get(Query::by_id(grace.id).with_deleted())
        .await
        .unwrap();
    assert!(gone.is_none());
}

#[tokio::test]
async fn test_reservation_rules() {
    let app = TestApp::new().await;
    let book = app.book("Dune", "9780441013593").await;
    let ada = app.member("Ada", "ada@example.com").await;
    let grace = app.member("Grace", "grace@example.com").await;
    let reservations = &app.services.reservations;

    let start = Utc::now();
    let backwards = reservations
        .create(
            &app.admin,
            ReservationRequest {
                book_id: book.id,
                member_id: ada.id,
                reservation_date: start,
                expiration_date: start - Duration::days(1),
            },
        )
        .await;
    assert!(matches!(backwards, Err(AppError::BusinessRule(message)) if message == INVALID_RESERVATION_PERIOD));

    let first = reservations
        .create(&app.admin, reservation(book.id, ada.id, 7))
        .await
        .unwrap();
    let taken = reservations
        .create(&app.admin, reservation(book.id, grace.id, 7))
        .await;
    assert!(matches!(taken, Err(AppError::BusinessRule(message)) if message == BOOK_ALREADY_RESERVED));

    // Moving the running reservation does not conflict with itself
    reservations
        .update(&app.admin, first.id, reservation(book.id, ada.id, 14))
        .await
        .unwrap();

    reservations.delete(&app.admin, first.id).await.unwrap();
    reservations
        .create(&app.admin, reservation(book.id, grace.id, 7))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_expired_reservations_do_not_block() {
    let app = TestApp::new().await;
    let book = app.book("Dune", "9780441013593").await;
    let ada = app.member("Ada", "ada@example.com").await;
    let grace = app.member("Grace", "grace@example.com").await;
    let reservations = &app.services.reservations;

    let long_ago = Utc::now() - Duration::days(30);
    reservations
        .create(
            &app.admin,
            ReservationRequest {
                book_id: book.id,
                member_id: ada.id,
                reservation_date: long_ago,
                expiration_date: long_ago + Duration::days(7),
            },
        )
        .await
        .unwrap();
    reservations
        .create(&app.admin, reservation(book.id, grace.id, 7))
        .await
        .unwrap();

    let active = reservations
        .list(
            &app.admin,
            ReservationQuery {
                active: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(active.total, 1);
    assert_eq!(active.items[0].member_id, grace.id);

    let expired = reservations
        .list(
            &app.admin,
            ReservationQuery {
                active: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(expired.total, 1);
    assert_eq!(expired.items[0].member_id, ada.id);
}

#[tokio::test]
async fn test_claim_names_are_unique() {
    let app = TestApp::new().await;
    let result = app
        .services
        .users
        .create_claim(&app.admin, OperationClaimRequest { name: "Books.Read".into() })
        .await;
    assert!(matches!(result, Err(AppError::BusinessRule(message)) if message == CLAIM_NAME_EXISTS));
}
