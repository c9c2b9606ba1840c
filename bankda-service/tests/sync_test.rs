//! Integration tests for the sync cycle: fetch, dedup, match, credit.

mod common;

use common::{spawn_app, unique_name, ScriptedFetch};
use serde_json::json;
use serial_test::serial;

#[tokio::test]
#[serial]
async fn sync_credits_single_exact_name_match() {
    let app = spawn_app().await;
    let name = unique_name("프레시마트");
    let member_id = app.insert_member(&name).await;

    app.provider
        .push_rows(vec![app.deposit_row(&name, 50_000, 1)], None);

    let response = app.post_sync().await;
    assert_eq!(response["success"], json!(true));
    assert_eq!(response["processed"], json!(1));
    assert_eq!(response["matched"], json!(1));
    assert_eq!(response["unmatched"], json!(0));
    assert_eq!(response["skipped"], json!(0));

    assert_eq!(app.member_deposit(member_id).await, 50_000);

    let transactions = app.account_transactions().await;
    assert_eq!(transactions.len(), 1);
    let t = &transactions[0];
    assert_eq!(t["matchStatus"], json!("matched"));
    assert_eq!(t["depositCharged"], json!(true));
    assert_eq!(t["matchedMemberId"], json!(member_id));
    assert!(t["depositHistoryId"].is_string());
    assert!(t["chargeError"].is_null());

    let history = app
        .db
        .member_deposit_history(member_id)
        .await
        .expect("Failed to load history");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].amount, 50_000);
    assert_eq!(history[0].source, "bankda-auto");
}

#[tokio::test]
#[serial]
async fn duplicate_names_are_left_for_the_operator() {
    let app = spawn_app().await;
    let name = unique_name("김철수");
    let first = app.insert_member(&name).await;
    let second = app.insert_member(&name).await;

    app.provider
        .push_rows(vec![app.deposit_row(&name, 30_000, 1)], None);

    let response = app.post_sync().await;
    assert_eq!(response["success"], json!(true));
    assert_eq!(response["matched"], json!(0));
    assert_eq!(response["unmatched"], json!(1));

    assert_eq!(app.member_deposit(first).await, 0);
    assert_eq!(app.member_deposit(second).await, 0);

    let transactions = app.account_transactions().await;
    assert_eq!(transactions[0]["matchStatus"], json!("duplicate_name"));
    assert_eq!(transactions[0]["depositCharged"], json!(false));
    assert!(transactions[0]["matchedMemberId"].is_null());
}

#[tokio::test]
#[serial]
async fn unknown_depositor_name_stays_unmatched() {
    let app = spawn_app().await;
    app.insert_member(&unique_name("이영희")).await;

    app.provider
        .push_rows(vec![app.deposit_row(&unique_name("모르는사람"), 10_000, 1)], None);

    let response = app.post_sync().await;
    assert_eq!(response["matched"], json!(0));
    assert_eq!(response["unmatched"], json!(1));

    let transactions = app.account_transactions().await;
    assert_eq!(transactions[0]["matchStatus"], json!("unmatched"));
    assert_eq!(transactions[0]["depositCharged"], json!(false));
}

#[tokio::test]
#[serial]
async fn depositor_name_falls_back_to_bketc_token() {
    let app = spawn_app().await;
    let name = unique_name("박민수");
    let member_id = app.insert_member(&name).await;

    let mut row = app.deposit_row("", 20_000, 1);
    row.bketc = format!("{} 외 1건", name);
    app.provider.push_rows(vec![row], None);

    let response = app.post_sync().await;
    assert_eq!(response["matched"], json!(1));
    assert_eq!(app.member_deposit(member_id).await, 20_000);
}

#[tokio::test]
#[serial]
async fn resync_skips_rows_already_in_the_ledger() {
    let app = spawn_app().await;
    let name = unique_name("프레시마트");
    let member_id = app.insert_member(&name).await;

    app.provider
        .push_rows(vec![app.deposit_row(&name, 50_000, 7)], None);
    let first = app.post_sync().await;
    assert_eq!(first["processed"], json!(1));

    // Overlapping window: the same identity comes back plus one new row.
    app.provider.push_rows(
        vec![
            app.deposit_row(&name, 50_000, 7),
            app.deposit_row(&unique_name("신규입금"), 5_000, 8),
        ],
        None,
    );
    let second = app.post_sync().await;
    assert_eq!(second["success"], json!(true));
    assert_eq!(second["skipped"], json!(1));
    assert_eq!(second["processed"], json!(1));

    // Re-fetched row was not reprocessed or re-credited.
    assert_eq!(app.member_deposit(member_id).await, 50_000);
    assert_eq!(app.account_transactions().await.len(), 2);
    let history = app
        .db
        .member_deposit_history(member_id)
        .await
        .expect("Failed to load history");
    assert_eq!(history.len(), 1);
}

#[tokio::test]
#[serial]
async fn rate_limited_cycle_changes_nothing() {
    let app = spawn_app().await;
    let before = app.get_summary().await;

    app.provider.push(ScriptedFetch::RateLimited);
    let response = app.post_sync().await;

    assert_eq!(response["success"], json!(false));
    assert_eq!(response["rateLimited"], json!(true));
    assert!(response.get("processed").is_none());

    let after = app.get_summary().await;
    assert_eq!(after["lastSyncAt"], before["lastSyncAt"]);
    assert_eq!(after["todayCount"], before["todayCount"]);
    assert!(app.account_transactions().await.is_empty());
}

#[tokio::test]
#[serial]
async fn fetch_failure_aborts_cycle_without_mutations() {
    let app = spawn_app().await;
    let before = app.get_summary().await;

    app.provider
        .push(ScriptedFetch::Fail("upstream exploded".to_string()));
    let response = app.post_sync().await;

    assert_eq!(response["success"], json!(false));
    assert!(response["error"]
        .as_str()
        .expect("error must be present")
        .contains("upstream exploded"));

    let after = app.get_summary().await;
    assert_eq!(after["lastSyncAt"], before["lastSyncAt"]);
    assert!(app.account_transactions().await.is_empty());
}

#[tokio::test]
#[serial]
async fn cursor_advances_across_cycles() {
    let app = spawn_app().await;
    let name = unique_name("정수진");
    app.insert_member(&name).await;

    app.provider
        .push_rows(vec![app.deposit_row(&name, 1_000, 1)], Some("cursor-a"));
    app.post_sync().await;

    app.provider.push_rows(vec![], Some("cursor-b"));
    app.post_sync().await;

    let cursors = app.provider.seen_cursors();
    assert_eq!(cursors.len(), 2);
    assert_eq!(cursors[1], Some("cursor-a".to_string()));
}

#[tokio::test]
#[serial]
async fn summary_reflects_the_ledger() {
    let app = spawn_app().await;
    let before = app.get_summary().await;

    let name = unique_name("한빛상사");
    app.insert_member(&name).await;
    app.provider.push_rows(
        vec![
            app.deposit_row(&name, 40_000, 1),
            app.deposit_row(&unique_name("행인"), 7_000, 2),
        ],
        None,
    );
    app.post_sync().await;

    let after = app.get_summary().await;
    let delta = |field: &str| after[field].as_i64().unwrap() - before[field].as_i64().unwrap();
    assert_eq!(delta("todayCount"), 2);
    assert_eq!(delta("todayAmount"), 47_000);
    assert_eq!(delta("matchedCount"), 1);
    assert_eq!(delta("unmatchedCount"), 1);
    assert!(after["lastSyncAt"].is_string());
}
