//! Capability checks and query caching through the operation pipeline

mod common;

use uuid::Uuid;

use common::TestApp;
use library_server::{
    error::AppError,
    models::{
        book::BookQuery,
        user::{CreateUser, CreateUserOperationClaim},
        Audit, Book, ListQuery,
    },
    services::authorization::{capabilities, Caller},
};

async fn librarian(app: &TestApp) -> Caller {
    let user = app
        .services
        .users
        .create(
            &app.admin,
            CreateUser {
                email: "librarian@library.local".into(),
                password: "secret-password".into(),
                authenticator_type: Default::default(),
            },
        )
        .await
        .unwrap();
    Caller::user(user.id)
}

async fn claim_id(app: &TestApp, name: &str) -> Uuid {
    let claims = app
        .services
        .users
        .list_claims(
            &app.admin,
            ListQuery {
                name: Some(name.into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    claims
        .items
        .into_iter()
        .find(|claim| claim.name == name)
        .map(|claim| claim.id)
        .unwrap()
}

#[tokio::test]
async fn test_anonymous_caller_must_authenticate() {
    let app = TestApp::new().await;
    let result = app
        .services
        .books
        .list(&Caller::anonymous(), BookQuery::default(), vec![])
        .await;
    assert!(matches!(result, Err(AppError::Authentication(_))));
}

#[tokio::test]
async fn test_capabilities_follow_grants() {
    let app = TestApp::new().await;
    let caller = librarian(&app).await;
    let books = &app.services.books;

    let denied = books.list(&caller, BookQuery::default(), vec![]).await;
    assert!(matches!(denied, Err(AppError::Authorization(message)) if message.contains(capabilities::books::READ)));

    let grant = app
        .services
        .users
        .grant(
            &app.admin,
            CreateUserOperationClaim {
                user_id: caller.user_id.unwrap(),
                operation_claim_id: claim_id(&app, capabilities::books::READ).await,
            },
        )
        .await
        .unwrap();
    assert!(books.list(&caller, BookQuery::default(), vec![]).await.is_ok());

    // Read does not imply delete
    let write = books.delete(&caller, Uuid::new_v4()).await;
    assert!(matches!(write, Err(AppError::Authorization(_))));

    app.services.users.revoke(&app.admin, grant.id).await.unwrap();
    let revoked = books.get(&caller, Uuid::new_v4(), vec![]).await;
    assert!(matches!(revoked, Err(AppError::Authorization(_))));
}

#[tokio::test]
async fn test_grant_only_once() {
    let app = TestApp::new().await;
    let caller = librarian(&app).await;
    let request = CreateUserOperationClaim {
        user_id: caller.user_id.unwrap(),
        operation_claim_id: claim_id(&app, capabilities::members::READ).await,
    };

    app.services.users.grant(&app.admin, request.clone()).await.unwrap();
    let again = app.services.users.grant(&app.admin, request).await;
    assert!(matches!(again, Err(AppError::BusinessRule(_))));
}

#[tokio::test]
async fn test_cached_list_until_a_command_invalidates_it() {
    let app = TestApp::new().await;
    app.book("Dune", "9780441013593").await;

    let first = app
        .services
        .books
        .list(&app.admin, BookQuery::default(), vec![])
        .await
        .unwrap();
    assert_eq!(first.total, 1);

    // A write that bypasses the pipeline is not seen until the group is evicted
    app.repository
        .table::<Book>()
        .add(Book {
            id: Uuid::new_v4(),
            name: "Emma".into(),
            isbn: "9780141439587".into(),
            page: 474,
            language: "en".into(),
            units_in_stock: 1,
            description: None,
            category_id: None,
            publisher_id: None,
            author_id: None,
            audit: Audit::new(),
        })
        .await
        .unwrap();
    let cached = app
        .services
        .books
        .list(&app.admin, BookQuery::default(), vec![])
        .await
        .unwrap();
    assert_eq!(cached.total, 1);

    app.book("Dune Messiah", "9780441172696").await;
    let fresh = app
        .services
        .books
        .list(&app.admin, BookQuery::default(), vec![])
        .await
        .unwrap();
    assert_eq!(fresh.total, 3);
}

#[tokio::test]
async fn test_startup_claim_sync_is_idempotent() {
    let app = TestApp::new().await;
    let added = app.services.users.sync_operation_claims().await.unwrap();
    assert_eq!(added, 0);

    let all = app
        .services
        .users
        .list_claims(
            &app.admin,
            ListQuery {
                per_page: Some(100),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(all.total as usize, capabilities::catalog().len());
}
