//! Rate limiting tests.

mod common;

use axum::http::StatusCode;
use common::{test_config, TestHarness};
use ledger_service::ServiceConfig;

async fn limited_harness(max: u32) -> TestHarness {
    TestHarness::with_config(ServiceConfig {
        rate_limit_max: max,
        ..test_config()
    })
    .await
}

#[tokio::test]
async fn requests_over_limit_are_rejected() {
    let harness = limited_harness(3).await;

    for _ in 0..3 {
        harness
            .server
            .get("/v1/credits/packages")
            .add_header("x-forwarded-for", "203.0.113.9")
            .await
            .assert_status_ok();
    }

    let response = harness
        .server
        .get("/v1/credits/packages")
        .add_header("x-forwarded-for", "203.0.113.9")
        .await;

    response.assert_status(StatusCode::TOO_MANY_REQUESTS);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["code"], "rate_limited");
    let retry_after: u64 = response
        .header("retry-after")
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!(retry_after > 0 && retry_after <= 900);
}

#[tokio::test]
async fn clients_are_limited_separately() {
    let harness = limited_harness(1).await;

    for ip in ["203.0.113.1", "203.0.113.2"] {
        harness
            .server
            .get("/v1/credits/packages")
            .add_header("x-forwarded-for", ip)
            .await
            .assert_status_ok();
    }

    harness
        .server
        .get("/v1/credits/packages")
        .add_header("x-forwarded-for", "203.0.113.1")
        .await
        .assert_status(StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn health_is_not_limited() {
    let harness = limited_harness(1).await;

    for _ in 0..5 {
        harness
            .server
            .get("/health")
            .add_header("x-forwarded-for", "203.0.113.3")
            .await
            .assert_status_ok();
    }
}
