//! Integration tests for the transaction listing contract.

mod common;

use common::{spawn_app, today_bkdate, unique_name};
use reqwest::StatusCode;
use serde_json::json;

#[tokio::test]
async fn list_filters_by_status() {
    let app = spawn_app().await;
    app.insert_transaction("unmatched", &unique_name("행인"), 1_000, None)
        .await;
    app.insert_transaction("ignored", &unique_name("행인"), 2_000, None)
        .await;

    let listed = app.list_transactions("?status=unmatched").await;
    let rows: Vec<_> = listed
        .as_array()
        .unwrap()
        .iter()
        .filter(|t| t["accountNumber"] == json!(app.account))
        .collect();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["matchStatus"], json!("unmatched"));
    assert_eq!(rows[0]["creditAmount"], json!(1_000));
}

#[tokio::test]
async fn unknown_status_filter_is_rejected() {
    let app = spawn_app().await;

    let response = app
        .client
        .get(format!(
            "{}/api/admin/bankda/transactions?status=charged",
            app.address
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn date_filters_accept_fixed_width_and_dashed_forms() {
    let app = spawn_app().await;
    app.insert_transaction("unmatched", &unique_name("행인"), 3_000, None)
        .await;

    let today = today_bkdate();
    let dashed = format!("{}-{}-{}", &today[..4], &today[4..6], &today[6..]);

    for (start, end) in [(today.as_str(), today.as_str()), (dashed.as_str(), dashed.as_str())] {
        let listed = app
            .list_transactions(&format!("?startDate={}&endDate={}", start, end))
            .await;
        let rows: Vec<_> = listed
            .as_array()
            .unwrap()
            .iter()
            .filter(|t| t["accountNumber"] == json!(app.account))
            .collect();
        assert_eq!(rows.len(), 1);
    }

    // A window in the past excludes today's row.
    let listed = app
        .list_transactions("?startDate=20000101&endDate=20000131")
        .await;
    assert!(listed
        .as_array()
        .unwrap()
        .iter()
        .all(|t| t["accountNumber"] != json!(app.account)));

    let response = app
        .client
        .get(format!(
            "{}/api/admin/bankda/transactions?startDate=2024-1-1",
            app.address
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn bkdate_and_bktime_are_served_verbatim() {
    let app = spawn_app().await;
    app.insert_transaction("pending", &unique_name("행인"), 4_000, None)
        .await;

    let rows = app.account_transactions().await;
    let bkdate = rows[0]["bkdate"].as_str().unwrap();
    let bktime = rows[0]["bktime"].as_str().unwrap();
    assert_eq!(bkdate.len(), 8);
    assert!(bkdate.bytes().all(|b| b.is_ascii_digit()));
    assert_eq!(bktime, "120000");
}
