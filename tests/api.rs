//! HTTP round trips through the router

mod common;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use common::TestApp;
use library_server::{
    api,
    models::{User, UserClaims},
};

struct Client {
    router: Router,
    token: Option<String>,
}

impl Client {
    async fn new(app: &TestApp) -> Self {
        let state = app.state();
        let admin = app
            .repository
            .require::<User>(app.admin.user_id.unwrap())
            .await
            .unwrap();
        let token = UserClaims::new(&admin, 1)
            .create_token(&state.config.auth.jwt_secret)
            .unwrap();
        Self {
            router: api::router(state),
            token: Some(token),
        }
    }

    fn anonymous(mut self) -> Self {
        self.token = None;
        self
    }

    async fn send(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(token) = &self.token {
            request = request.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .unwrap();

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }
}

#[tokio::test]
async fn test_health_is_open() {
    let app = TestApp::new().await;
    let client = Client::new(&app).await.anonymous();

    let (status, body) = client.send(Method::GET, "/api/v1/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, body) = client.send(Method::GET, "/api/v1/ready", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
async fn test_missing_or_bad_token() {
    let app = TestApp::new().await;
    let client = Client::new(&app).await;

    let (status, _) = client
        .anonymous()
        .send(Method::GET, "/api/v1/books", None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let forged = Client {
        router: api::router(app.state()),
        token: Some("not-a-jwt".into()),
    };
    let (status, body) = forged.send(Method::GET, "/api/v1/books", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "NotAuthenticated");
}

#[tokio::test]
async fn test_loan_round_trip() {
    let app = TestApp::new().await;
    let client = Client::new(&app).await;

    let (status, book) = client
        .send(
            Method::POST,
            "/api/v1/books",
            Some(json!({
                "name": "Dune",
                "isbn": "9780441013593",
                "page": 412,
                "language": "en",
                "units_in_stock": 2
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, member) = client
        .send(
            Method::POST,
            "/api/v1/members",
            Some(json!({
                "first_name": "Ada",
                "last_name": "Lovelace",
                "email": "ada@example.com",
                "password": "secret-password"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(member.get("password").is_none());

    let loan_body = json!({
        "member_id": member["id"],
        "book_id": book["id"],
        "return_time": "2030-03-14T09:00:00Z"
    });
    let (status, loan) = client
        .send(Method::POST, "/api/v1/loan-transactions", Some(loan_body.clone()))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(loan["return_time"], "2030-03-14T17:00:00Z");
    assert_eq!(loan["return_status"], "Unreturned");
    assert_eq!(app.mailer.sent().len(), 1);

    let (status, error) = client
        .send(Method::POST, "/api/v1/loan-transactions", Some(loan_body))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(error["message"], "Book already borrowed");

    let loan_id = loan["id"].as_str().unwrap();
    let (status, returned) = client
        .send(
            Method::POST,
            &format!("/api/v1/loan-transactions/{}/return", loan_id),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(returned["return_status"], "Returned");

    let (status, details) = client
        .send(
            Method::GET,
            &format!("/api/v1/loan-transactions/{}?include=member,book", loan_id),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(details["book"]["name"], "Dune");
    assert_eq!(details["member"]["last_name"], "Lovelace");
}

#[tokio::test]
async fn test_unknown_include_is_rejected() {
    let app = TestApp::new().await;
    let client = Client::new(&app).await;

    let (status, _) = client
        .send(Method::GET, "/api/v1/books?include=authors,reviews", None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, page) = client
        .send(Method::GET, "/api/v1/books?include=authors", None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 0);
}

#[tokio::test]
async fn test_not_found_body() {
    let app = TestApp::new().await;
    let client = Client::new(&app).await;

    let (status, body) = client
        .send(
            Method::GET,
            "/api/v1/members/6f1c1b7e-0000-4000-8000-000000000000",
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Member not found");
}

#[tokio::test]
async fn test_openapi_document_is_served() {
    let app = TestApp::new().await;
    let client = Client::new(&app).await.anonymous();

    let (status, doc) = client.send(Method::GET, "/api-docs/openapi.json", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(doc["paths"]["/loan-transactions"].is_object());
}
