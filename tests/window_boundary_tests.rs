mod common;

use std::sync::Arc;

use common::{income, key, mid_month, seed_budget, session};
use monthwise_core::config::CoreConfig;
use monthwise_core::core::Session;
use monthwise_core::errors::LedgerError;
use monthwise_core::time::FixedClock;

#[tokio::test]
async fn creatable_window_tracks_the_clock() {
    let (_store, session) = session();
    let budget = seed_budget(&session).await;

    // Clock sits in June 2024: three months ahead and twelve back are open.
    session
        .months()
        .open_month(&budget.id, key(2024, 9))
        .await
        .expect("future boundary month");
    session
        .months()
        .open_month(&budget.id, key(2023, 6))
        .await
        .expect("past boundary month");

    let err = session
        .months()
        .open_month(&budget.id, key(2024, 10))
        .await
        .expect_err("beyond the future bound");
    match err {
        LedgerError::OutOfWindow { key: rejected } => assert_eq!(rejected, key(2024, 10)),
        other => panic!("unexpected error: {other}"),
    }
    assert!(matches!(
        session
            .months()
            .open_month(&budget.id, key(2023, 5))
            .await
            .expect_err("beyond the past bound"),
        LedgerError::OutOfWindow { .. }
    ));
}

#[tokio::test]
async fn old_months_stay_readable_once_created() {
    let (store, session) = session();
    let budget = seed_budget(&session).await;
    let june = key(2024, 6);
    session
        .months()
        .record_income(&budget.id, june, income(900.0, budget.account, mid_month(june)))
        .await
        .expect("june income");

    // A session much later can still read the old month, but cannot create
    // its never-entered neighbors.
    let later = Session::with_clock(
        store,
        CoreConfig::default(),
        Arc::new(FixedClock::on_date(2025, 12, 15)),
    );
    let month = later
        .months()
        .open_month(&budget.id, june)
        .await
        .expect("old month stays readable");
    assert_eq!(month.total_income, 900.0);

    assert!(matches!(
        later
            .months()
            .open_month(&budget.id, key(2024, 7))
            .await
            .expect_err("gap next to it is out of reach"),
        LedgerError::OutOfWindow { .. }
    ));
}
