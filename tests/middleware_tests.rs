use juicebox_drop::middleware::{add_security_headers, validate_api_key, ApiKeyHash};
use juicebox_drop::config::Config;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::middleware::from_fn;
use axum::routing::get;
use axum::Router;
use tower::util::ServiceExt;

fn request_with(name: &str, value: &str) -> Request<Body> {
    Request::builder()
        .uri("/")
        .header(name, value)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_add_security_headers() {
    let app = Router::new()
        .route("/", get(|| async { "hello" }))
        .route(
            "/cached",
            get(|| async { ([(header::CACHE_CONTROL, "public, max-age=60")], "cached") }),
        )
        .layer(from_fn(add_security_headers));

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    let headers = response.headers();
    assert_eq!(headers.get("x-content-type-options").unwrap(), "nosniff");
    assert_eq!(headers.get("x-frame-options").unwrap(), "DENY");
    assert_eq!(headers.get("referrer-policy").unwrap(), "no-referrer");
    assert_eq!(headers.get("cache-control").unwrap(), "no-store");
    assert!(headers.get("content-security-policy").is_some());

    // handler-set values win
    let response = app
        .oneshot(Request::builder().uri("/cached").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.headers().get("cache-control").unwrap(), "public, max-age=60");
}

#[test]
fn test_api_key_hash_matches() {
    let hash = ApiKeyHash::from_key("secret");
    assert_eq!(hash.0, Config::hash_api_key("secret"));
    assert!(hash.matches("secret"));
    assert!(!hash.matches("Secret"));
    assert!(!hash.matches(""));
}

#[tokio::test]
async fn test_validate_api_key() {
    let correct_key = "secret";
    let correct_hash = Config::hash_api_key(correct_key);

    let app = Router::new()
        .route("/", get(|| async { "hello" }))
        .layer(from_fn(validate_api_key))
        .layer(axum::Extension(ApiKeyHash(correct_hash)));

    // Test missing header
    let response = app.clone()
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Test wrong key
    let response = app.clone()
        .oneshot(request_with("X-API-Key", "wrong"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Test blank key
    let response = app.clone()
        .oneshot(request_with("X-API-Key", "   "))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Test correct key
    let response = app.clone()
        .oneshot(request_with("X-API-Key", correct_key))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Test bearer token
    let response = app.clone()
        .oneshot(request_with("Authorization", "Bearer secret"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(request_with("Authorization", "Basic secret"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_validate_api_key_without_extension() {
    // a router that forgot to attach the key hash must not let anyone through
    let app = Router::new()
        .route("/", get(|| async { "hello" }))
        .layer(from_fn(validate_api_key));

    let response = app
        .oneshot(request_with("X-API-Key", "anything"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}
