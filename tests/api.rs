use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

use paperjunkies::{
    AppState, app,
    auth::{JWT_AUDIENCE, TokenVerifier},
    db::{SqliteRepository, sqlite},
    terms::KeywordExtractor,
};

const JWT_SECRET: &str = "test-secret";
const DOE: &str =
    "@article{doe2023,title={A Study},author={Doe, J.},year={2023},abstract={We study X.}}";

struct TestApp {
    router: Router,
    user_id: Uuid,
}

async fn test_app(local_user: bool) -> TestApp {
    let pool = sqlite::init_db("sqlite::memory:").await.unwrap();
    let user_id = Uuid::new_v4();
    sqlite::ensure_profile(&pool, user_id, "Ada").await.unwrap();

    let state = AppState {
        repo: Arc::new(SqliteRepository::new(pool)),
        terms: Arc::new(KeywordExtractor::default()),
        verifier: Arc::new(TokenVerifier::jwt(JWT_SECRET)),
        local_user_id: local_user.then(|| user_id.to_string()),
        frontend_dir: PathBuf::from("does-not-exist"),
    };
    TestApp {
        router: app(state),
        user_id,
    }
}

fn bearer(sub: Uuid) -> String {
    #[derive(serde::Serialize)]
    struct Claims {
        sub: String,
        aud: &'static str,
        exp: usize,
    }
    let exp = (chrono::Utc::now().timestamp() + 3600) as usize;
    let token = encode(
        &Header::default(),
        &Claims {
            sub: sub.to_string(),
            aud: JWT_AUDIENCE,
            exp,
        },
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .unwrap();
    format!("Bearer {}", token)
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn health_check() {
    let app = test_app(false).await;
    let (status, body) = send(&app.router, get("/api/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn submission_without_identity_is_unauthenticated() {
    let app = test_app(false).await;
    let (status, body) = send(
        &app.router,
        json_request("POST", "/api/posts", json!({"bibtex": "not even bibtex"})),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["detail"].is_string());
}

#[tokio::test]
async fn identity_is_checked_before_the_body() {
    let app = test_app(false).await;
    let (status, body) = send(&app.router, json_request("POST", "/api/posts", json!({}))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["detail"].is_string());

    let (status, _) = send(
        &app.router,
        json_request("PATCH", "/api/profile", json!({"timezone": 42})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unusable_body_is_a_json_validation_error() {
    let app = test_app(true).await;
    let (status, body) = send(&app.router, json_request("POST", "/api/posts", json!({}))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["detail"].as_str().unwrap().contains("bibtex"));

    let request = Request::builder()
        .method("POST")
        .uri("/api/posts")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["detail"].is_string());
}

#[tokio::test]
async fn invalid_token_does_not_fall_back_to_local_user() {
    let app = test_app(true).await;
    let request = Request::builder()
        .uri("/api/auth/me")
        .header(header::AUTHORIZATION, "Bearer garbage")
        .body(Body::empty())
        .unwrap();

    let (status, _) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn me_resolves_bearer_and_local_identity() {
    let app = test_app(true).await;

    let (status, body) = send(&app.router, get("/api/auth/me")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user_id"], app.user_id.to_string());
    assert_eq!(body["profile"]["display_name"], "Ada");

    let stranger = Uuid::new_v4();
    let request = Request::builder()
        .uri("/api/auth/me")
        .header(header::AUTHORIZATION, bearer(stranger))
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user_id"], stranger.to_string());
    assert!(body["profile"].is_null());
}

#[tokio::test]
async fn valid_submission_creates_a_post() {
    let app = test_app(true).await;

    let (status, body) = send(
        &app.router,
        json_request("POST", "/api/posts", json!({"bibtex": DOE, "note": "great read"})),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["bibtex_key"], "doe2023");
    assert_eq!(body["reference_reused"], false);
    assert!(body["post_id"].is_string());

    let (status, timeline) = send(&app.router, get("/api/posts")).await;
    assert_eq!(status, StatusCode::OK);
    let posts = timeline["posts"].as_array().unwrap();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0]["id"], body["post_id"]);
    assert_eq!(posts[0]["is_mine"], true);
    assert_eq!(posts[0]["note"], "great read");
    assert_eq!(posts[0]["citation"], "Doe, J. (2023). A Study.");
    assert_eq!(timeline["timezone"], "UTC");
}

#[tokio::test]
async fn missing_abstract_is_unprocessable() {
    let app = test_app(true).await;
    let (status, body) = send(
        &app.router,
        json_request(
            "POST",
            "/api/posts",
            json!({"bibtex": "@article{doe2023,title={A Study}}"}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["detail"].as_str().unwrap().contains("abstract"));

    let (_, timeline) = send(&app.router, get("/api/posts")).await;
    assert!(timeline["posts"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn malformed_bibtex_is_a_bad_request() {
    let app = test_app(true).await;
    let (status, body) = send(
        &app.router,
        json_request("POST", "/api/posts", json!({"bibtex": "   "})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().unwrap().starts_with("Invalid BibTeX"));
}

#[tokio::test]
async fn profile_update_changes_timeline_rendering() {
    let app = test_app(true).await;
    send(
        &app.router,
        json_request("POST", "/api/posts", json!({"bibtex": DOE})),
    )
    .await;

    let (status, body) = send(
        &app.router,
        json_request(
            "PATCH",
            "/api/profile",
            json!({"citation_style": "mla", "timezone": "Asia/Tokyo"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["changed"], true);
    assert_eq!(body["profile"]["citation_style"], "mla");

    let (_, again) = send(
        &app.router,
        json_request("PATCH", "/api/profile", json!({"citation_style": "MLA"})),
    )
    .await;
    assert_eq!(again["changed"], false);

    let (_, timeline) = send(&app.router, get("/api/posts")).await;
    assert_eq!(timeline["timezone"], "Asia/Tokyo");
    let post = &timeline["posts"][0];
    assert_eq!(post["citation"], "Doe, J. \"A Study.\" 2023.");
    assert!(post["read_at_display"].as_str().unwrap().ends_with("JST"));
}

#[tokio::test]
async fn invalid_profile_update_is_rejected() {
    let app = test_app(true).await;
    let (status, _) = send(
        &app.router,
        json_request("PATCH", "/api/profile", json!({"timezone": "Mars/Olympus"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn dashboard_endpoints() {
    let app = test_app(true).await;
    for _ in 0..2 {
        send(
            &app.router,
            json_request("POST", "/api/posts", json!({"bibtex": DOE})),
        )
        .await;
    }

    let (status, trends) = send(&app.router, get("/api/dashboard/trends?grain=weekly&top_k=100")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(trends["grain"], "weekly");
    assert_eq!(trends["data"][0]["term"], "study");
    assert_eq!(trends["data"][0]["count"], 4);

    let (status, tod) =
        send(&app.router, get("/api/dashboard/time-of-day?scope=team&group_by=yearly")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(tod["scope"], "team");
    assert_eq!(tod["data"].as_array().unwrap().len(), 2);

    let (status, streak) = send(&app.router, get("/api/dashboard/streak")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(streak["streak"], 1);

    let (status, _) = send(&app.router, get("/api/dashboard/trends?grain=daily")).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}
