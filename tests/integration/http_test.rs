// tests/integration/http_test.rs

//! Integration tests for the HTTP surface
//! Tests: index page, static assets, /data, HTTP_response gating, path escapes

use super::test_helpers::{TestContext, TestServer};
use cloudvar::core::protocol::VariableValue;
use reqwest::StatusCode;
use serde_json::{Value, json};

#[tokio::test]
async fn test_root_serves_index_html() {
    let ctx = TestContext::new().await;
    ctx.write_public_file("index.html", "<h1>cloud</h1>");
    let server = TestServer::start(ctx).await;

    let response = reqwest::get(server.http_url("/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response.headers()["content-type"]
            .to_str()
            .unwrap()
            .starts_with("text/html")
    );
    assert_eq!(response.text().await.unwrap(), "<h1>cloud</h1>");

    server.shutdown().await;
}

#[tokio::test]
async fn test_root_without_index_is_not_found() {
    let server = TestServer::start(TestContext::new().await).await;
    let response = reqwest::get(server.http_url("/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    server.shutdown().await;
}

#[tokio::test]
async fn test_static_asset_and_missing_asset() {
    let ctx = TestContext::new().await;
    ctx.write_public_file("script.js", "console.log('hi');");
    let server = TestServer::start(ctx).await;

    let response = reqwest::get(server.http_url("/script.js")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response.headers()["content-type"]
            .to_str()
            .unwrap()
            .starts_with("text/javascript")
    );
    assert_eq!(response.text().await.unwrap(), "console.log('hi');");

    let missing = reqwest::get(server.http_url("/nope.css")).await.unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    assert_eq!(missing.text().await.unwrap(), "404 Not Found");

    server.shutdown().await;
}

#[tokio::test]
async fn test_directories_and_escaping_paths_are_not_found() {
    let ctx = TestContext::new().await;
    ctx.write_public_file("index.html", "ok");
    std::fs::create_dir_all(ctx.public_dir().join("nested")).unwrap();
    std::fs::write(ctx.dir.path().join("secret.txt"), "secret").unwrap();
    let server = TestServer::start(ctx).await;

    let directory = reqwest::get(server.http_url("/nested")).await.unwrap();
    assert_eq!(directory.status(), StatusCode::NOT_FOUND);

    let escape = reqwest::get(server.http_url("/..%2Fsecret.txt"))
        .await
        .unwrap();
    assert_eq!(escape.status(), StatusCode::NOT_FOUND);

    server.shutdown().await;
}

#[tokio::test]
async fn test_data_endpoint_returns_current_table() {
    let ctx = TestContext::new().await;
    ctx.state
        .store
        .set("score".into(), VariableValue::from(10))
        .await;
    ctx.state
        .store
        .set("name".into(), VariableValue::from("bob"))
        .await;
    let server = TestServer::start(ctx).await;

    let response = reqwest::get(server.http_url("/data")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({ "score": 10, "name": "bob" }));

    server.shutdown().await;
}

#[tokio::test]
async fn test_http_disabled_is_forbidden_but_websocket_still_works() {
    let ctx = TestContext::with_config(|config| config.http_response = false).await;
    ctx.write_public_file("index.html", "hidden");
    let server = TestServer::start(ctx).await;

    for path in ["/", "/index.html", "/data"] {
        let response = reqwest::get(server.http_url(path)).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN, "path {path}");
    }

    let _client = server.connect_registered().await;
    server.shutdown().await;
}
