mod common;

use common::{d, seed_open_position, setup_test_db};
use rust_decimal::Decimal;

use polycopy::db::position_repo::{self, AuthoritativeHolding};
use polycopy::db::activity_repo;
use polycopy::models::PositionStatus;

#[tokio::test]
async fn addon_buy_accumulates_into_same_row() {
    let pool = setup_test_db().await;

    let first = seed_open_position(&pool, "0xcond", "Yes", "42", d("1.25"), d("0.5")).await;
    let second = seed_open_position(&pool, "0xcond", "Yes", "42", d("1.25"), d("0.7")).await;

    assert_eq!(first.id, second.id);
    assert_eq!(second.amount_usd, d("2.5"));
    // Entry price stays at the original fill
    assert_eq!(second.entry_price, d("0.5"));

    let open = position_repo::get_open_positions(&pool).await.unwrap();
    assert_eq!(open.len(), 1);
}

#[tokio::test]
async fn second_open_row_for_same_outcome_is_rejected_by_index() {
    let pool = setup_test_db().await;
    seed_open_position(&pool, "0xcond", "Yes", "42", d("1"), d("0.5")).await;

    // Bypass the repo to try inserting a duplicate OPEN row directly
    let result = sqlx::query(
        r#"
        INSERT INTO positions
            (market_id, outcome, amount_usd, entry_price, status, created_at, updated_at)
        VALUES ('0xcond', 'Yes', 1.0, 0.5, 'OPEN', datetime('now'), datetime('now'))
        "#,
    )
    .execute(&pool)
    .await;

    assert!(result.is_err());
}

#[tokio::test]
async fn closed_rows_do_not_block_reopening() {
    let pool = setup_test_db().await;

    let pos = seed_open_position(&pool, "0xcond", "Yes", "42", d("1"), d("0.5")).await;
    assert!(position_repo::close(&pool, pos.id, d("0.8"), d("0.6"))
        .await
        .unwrap());

    // Same outcome can be opened again after the old row closed
    let reopened = seed_open_position(&pool, "0xcond", "Yes", "42", d("2"), d("0.6")).await;
    assert_ne!(reopened.id, pos.id);
    assert_eq!(reopened.amount_usd, d("2"));
}

#[tokio::test]
async fn close_is_idempotent() {
    let pool = setup_test_db().await;
    let pos = seed_open_position(&pool, "0xcond", "Yes", "42", d("4"), d("0.4")).await;

    assert!(position_repo::close(&pool, pos.id, Decimal::ONE, d("6"))
        .await
        .unwrap());
    // Second close is a no-op
    assert!(!position_repo::close(&pool, pos.id, d("0.5"), d("-1"))
        .await
        .unwrap());

    let closed = position_repo::get_closed_positions(&pool, 10).await.unwrap();
    assert_eq!(closed.len(), 1);
    assert_eq!(closed[0].status, PositionStatus::Closed);
    assert_eq!(closed[0].exit_price, Some(Decimal::ONE));
    assert_eq!(closed[0].pnl, Some(d("6")));
}

#[tokio::test]
async fn exposure_sums_across_outcomes_of_one_market() {
    let pool = setup_test_db().await;

    seed_open_position(&pool, "0xcond", "Yes", "42", d("6"), d("0.5")).await;
    seed_open_position(&pool, "0xcond", "No", "43", d("6"), d("0.5")).await;
    seed_open_position(&pool, "0xother", "Yes", "44", d("9"), d("0.5")).await;

    let exposure = position_repo::total_open_exposure(&pool, "0xcond")
        .await
        .unwrap();
    assert_eq!(exposure, d("12"));

    // Closed rows stop counting
    let open = position_repo::find_open(&pool, "0xcond", "Yes")
        .await
        .unwrap()
        .unwrap();
    position_repo::close(&pool, open.id, d("0.5"), Decimal::ZERO)
        .await
        .unwrap();

    let exposure = position_repo::total_open_exposure(&pool, "0xcond")
        .await
        .unwrap();
    assert_eq!(exposure, d("6"));
}

#[tokio::test]
async fn find_by_asset_id_ignores_closed_rows() {
    let pool = setup_test_db().await;
    let pos = seed_open_position(&pool, "0xcond", "Yes", "42", d("1"), d("0.5")).await;

    assert!(position_repo::find_by_asset_id(&pool, "42")
        .await
        .unwrap()
        .is_some());

    position_repo::close(&pool, pos.id, d("0.5"), Decimal::ZERO)
        .await
        .unwrap();

    assert!(position_repo::find_by_asset_id(&pool, "42")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn reconcile_seeds_and_closes() {
    let pool = setup_test_db().await;

    // Stale row: exchange no longer reports it
    seed_open_position(&pool, "0xgone", "Yes", "1", d("2"), d("0.5")).await;

    let holdings = vec![AuthoritativeHolding {
        asset_id: "7".into(),
        market_id: "0xnew".into(),
        outcome: "No".into(),
        slug: Some("new-market".into()),
        avg_price: d("0.25"),
        initial_value: d("3"),
    }];

    let summary = position_repo::reconcile(&pool, &holdings).await.unwrap();
    assert_eq!(summary.closed, 1);
    assert_eq!(summary.seeded, 1);

    let open = position_repo::get_open_positions(&pool).await.unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].market_id, "0xnew");
    assert_eq!(open[0].entry_price, d("0.25"));

    // Stale row closed flat
    let closed = position_repo::get_closed_positions(&pool, 10).await.unwrap();
    assert_eq!(closed.len(), 1);
    assert_eq!(closed[0].pnl, Some(Decimal::ZERO));

    // A second pass changes nothing
    let summary = position_repo::reconcile(&pool, &holdings).await.unwrap();
    assert_eq!(summary.closed, 0);
    assert_eq!(summary.seeded, 0);
}

#[tokio::test]
async fn recurring_reconcile_tracks_holdings_drift() {
    let pool = setup_test_db().await;

    let first = vec![AuthoritativeHolding {
        asset_id: "7".into(),
        market_id: "0xheld".into(),
        outcome: "Yes".into(),
        slug: None,
        avg_price: d("0.5"),
        initial_value: d("2"),
    }];
    let summary = position_repo::reconcile(&pool, &first).await.unwrap();
    assert_eq!(summary.seeded, 1);

    // Between passes the holding was sold off elsewhere and a new one
    // appeared; the next pass picks up both changes
    let second = vec![AuthoritativeHolding {
        asset_id: "8".into(),
        market_id: "0xfresh".into(),
        outcome: "No".into(),
        slug: None,
        avg_price: d("0.3"),
        initial_value: d("3"),
    }];
    let summary = position_repo::reconcile(&pool, &second).await.unwrap();
    assert_eq!(summary.closed, 1);
    assert_eq!(summary.seeded, 1);

    let open = position_repo::get_open_positions(&pool).await.unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].market_id, "0xfresh");
}

#[tokio::test]
async fn activity_key_processed_exactly_once() {
    let pool = setup_test_db().await;

    let key = "0xdeadbeef-0xabc";
    assert!(activity_repo::try_mark_processed(&pool, key, "0xabc")
        .await
        .unwrap());
    // Replay is refused
    assert!(!activity_repo::try_mark_processed(&pool, key, "0xabc")
        .await
        .unwrap());

    // A different user in the same transaction is its own key
    assert!(activity_repo::try_mark_processed(&pool, "0xdeadbeef-0xdef", "0xdef")
        .await
        .unwrap());
}
