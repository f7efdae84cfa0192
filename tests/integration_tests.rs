use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use coupon_dispatch::config::Config;
use coupon_dispatch::handlers::AppState;
use coupon_dispatch::server::create_app;
use coupon_dispatch::storage::{MemoryStorage, Storage};
use http_body_util::BodyExt;
use tower::ServiceExt;

async fn test_app(codes: &[&str]) -> (Router, Arc<MemoryStorage>) {
    let storage = Arc::new(MemoryStorage::new());
    for code in codes {
        storage.create_coupon(code).await.unwrap();
    }
    let state = Arc::new(AppState::new(storage.clone(), Config::default()));
    (create_app(state), storage)
}

async fn get(app: &Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn csv_upload(content: &str) -> Request<Body> {
    let boundary = "test-boundary";
    let body = format!(
        "--{boundary}\r\n\
         Content-Disposition: form-data; name=\"csvFile\"; filename=\"codes.csv\"\r\n\
         Content-Type: text/csv\r\n\r\n\
         {content}\r\n\
         --{boundary}--\r\n"
    );
    Request::builder()
        .method("POST")
        .uri("/api/admin/upload-coupons")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn test_coupon_allocation_happy_path() {
    let (app, _) = test_app(&["SAVE10", "WELCOME20"]).await;

    let (status, body) = get(&app, "/api/coupon?mobileNumber=9996275888").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["mobileNumber"], "919996275888");
    assert_eq!(body["data"]["couponCode"], "SAVE10");
    assert_eq!(body["data"]["message"], "Coupon successfully distributed");
}

#[tokio::test]
async fn test_repeated_requests_return_the_same_coupon() {
    let (app, storage) = test_app(&["SAVE10", "WELCOME20"]).await;

    let (_, first) = get(&app, "/api/coupon?mobileNumber=%2B919996275888").await;
    let (_, second) = get(&app, "/api/coupon?mobileNumber=919996275888").await;

    assert_eq!(first["data"]["couponCode"], "SAVE10");
    assert_eq!(second["data"]["couponCode"], "SAVE10");
    assert_eq!(second["data"]["distributedAt"], first["data"]["distributedAt"]);
    assert_eq!(
        second["data"]["message"],
        "Coupon already distributed to this mobile number"
    );
    assert_eq!(storage.list_unused_coupons().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_invalid_mobile_number_is_rejected() {
    let (app, _) = test_app(&["SAVE10"]).await;

    let (status, body) = get(&app, "/api/coupon?mobileNumber=12345").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Invalid mobile number");
    assert!(body["details"].is_array());
}

#[tokio::test]
async fn test_missing_mobile_number_returns_test_code() {
    let (app, storage) = test_app(&["SAVE10"]).await;

    let (status, body) = get(&app, "/api/coupon").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["mobileNumber"], "N/A");
    assert_eq!(body["data"]["couponCode"], "Test Code");
    // the smoke-test path never consumes inventory
    assert_eq!(storage.list_unused_coupons().await.unwrap().len(), 1);
    assert!(storage.list_distributions().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_exhausted_pool_returns_410() {
    let (app, _) = test_app(&["SAVE10"]).await;

    let (status, _) = get(&app, "/api/coupon?mobileNumber=9996275888").await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = get(&app, "/api/coupon?mobileNumber=9996275889").await;
    assert_eq!(status, StatusCode::GONE);
    assert_eq!(body["error"], "No coupons available");
}

#[tokio::test]
async fn test_admin_stats() {
    let (app, _) = test_app(&["A1", "A2", "A3", "A4"]).await;
    get(&app, "/api/coupon?mobileNumber=9996275888").await;

    let (status, body) = get(&app, "/api/admin/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["totalCoupons"], 4);
    assert_eq!(body["data"]["distributedCoupons"], 1);
    assert_eq!(body["data"]["availableCoupons"], 3);
    assert_eq!(body["data"]["distributionRate"], "25.0%");
}

#[tokio::test]
async fn test_admin_stats_with_empty_pool() {
    let (app, _) = test_app(&[]).await;

    let (_, body) = get(&app, "/api/admin/stats").await;
    assert_eq!(body["data"]["totalCoupons"], 0);
    assert_eq!(body["data"]["distributionRate"], "0%");
}

#[tokio::test]
async fn test_admin_distributions_and_coupons() {
    let (app, _) = test_app(&["SAVE10", "WELCOME20"]).await;
    get(&app, "/api/coupon?mobileNumber=9996275888").await;

    let (status, body) = get(&app, "/api/admin/distributions").await;
    assert_eq!(status, StatusCode::OK);
    let rows = body["data"].as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["mobileNumber"], "919996275888");
    assert_eq!(rows[0]["couponCode"], "SAVE10");

    let (_, body) = get(&app, "/api/admin/coupons").await;
    let coupons = body["data"].as_array().unwrap();
    assert_eq!(coupons.len(), 2);
    assert_eq!(coupons[0]["code"], "SAVE10");
    assert_eq!(coupons[0]["isUsed"], true);
    assert_eq!(coupons[1]["isUsed"], false);
}

#[tokio::test]
async fn test_csv_upload_replaces_the_pool() {
    let (app, storage) = test_app(&["OLD1"]).await;
    get(&app, "/api/coupon?mobileNumber=9996275888").await;

    let response = app
        .clone()
        .oneshot(csv_upload("NEW1\nNEW2\n\nbad code!\nNEW1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

    // the csv reader skips the blank line, leaving four records
    assert_eq!(body["data"]["totalProcessed"], 4);
    assert_eq!(body["data"]["successfullyAdded"], 2);
    assert_eq!(body["data"]["errors"], 2);
    assert_eq!(body["data"]["errorDetails"].as_array().unwrap().len(), 2);

    // prior allocations are gone
    assert!(storage.list_distributions().await.unwrap().is_empty());
    assert_eq!(storage.list_unused_coupons().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_csv_upload_without_file_is_rejected() {
    let (app, _) = test_app(&[]).await;

    let boundary = "test-boundary";
    let body = format!(
        "--{boundary}\r\n\
         Content-Disposition: form-data; name=\"other\"\r\n\r\n\
         value\r\n\
         --{boundary}--\r\n"
    );
    let request = Request::builder()
        .method("POST")
        .uri("/api/admin/upload-coupons")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(body))
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["error"], "No file uploaded");
}

#[tokio::test]
async fn test_csv_upload_with_wrong_file_type_is_rejected() {
    let (app, _) = test_app(&[]).await;

    let boundary = "test-boundary";
    let body = format!(
        "--{boundary}\r\n\
         Content-Disposition: form-data; name=\"csvFile\"; filename=\"codes.txt\"\r\n\
         Content-Type: text/plain\r\n\r\n\
         SAVE10\r\n\
         --{boundary}--\r\n"
    );
    let request = Request::builder()
        .method("POST")
        .uri("/api/admin/upload-coupons")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(body))
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["error"], "Invalid file type");
}

#[tokio::test]
async fn test_rate_limit_applies_to_the_coupon_endpoint() {
    let (app, _) = test_app(&["SAVE10"]).await;

    for _ in 0..10 {
        let request = Request::builder()
            .uri("/api/coupon?mobileNumber=9996275888")
            .header("x-forwarded-for", "198.51.100.7")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let request = Request::builder()
        .uri("/api/coupon?mobileNumber=9996275888")
        .header("x-forwarded-for", "198.51.100.7")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers()["Retry-After"], "60");
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["error"], "Rate limit exceeded");
    assert_eq!(body["retryAfter"], "60 seconds");

    // admin routes are not rate limited
    let (status, _) = get(&app, "/api/admin/stats").await;
    assert_eq!(status, StatusCode::OK);
}
