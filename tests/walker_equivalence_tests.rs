mod common;

use common::{expense, income, key, mid_month, seed_budget, session, session_on};
use monthwise_core::core::NewAccount;

#[tokio::test]
async fn snapshot_fast_path_matches_fresh_walk() {
    let (store, session) = session();
    let budget = seed_budget(&session).await;
    let june = key(2024, 6);
    let july = key(2024, 7);

    session
        .months()
        .record_income(&budget.id, june, income(3000.0, budget.account, mid_month(june)))
        .await
        .expect("june income");
    session
        .months()
        .set_allocation(&budget.id, june, budget.category, 100.0)
        .await
        .expect("june allocation");
    session
        .months()
        .finalize_allocations(&budget.id, june)
        .await
        .expect("finalize june");
    session
        .months()
        .record_expense(
            &budget.id,
            june,
            expense(40.0, budget.category, budget.account, mid_month(june)),
        )
        .await
        .expect("june expense");

    session
        .months()
        .record_expense(
            &budget.id,
            july,
            expense(10.0, budget.category, budget.account, mid_month(july)),
        )
        .await
        .expect("july expense");
    session
        .months()
        .set_allocation(&budget.id, july, budget.category, 30.0)
        .await
        .expect("july allocation left open");

    let walked = session
        .budgets()
        .recalculate(&budget.id, july)
        .await
        .expect("fresh walk");
    assert_eq!(
        walked.balances[&budget.category].current, 50.0,
        "60 carried in, 10 spent, the open allocation contributes nothing"
    );
    assert_eq!(walked.balances[&budget.category].total, 50.0);

    // A valid snapshot serves the same figures without walking or writing.
    let puts = store.put_count();
    let cached = session
        .budgets()
        .recalculate(&budget.id, july)
        .await
        .expect("snapshot read");
    assert_eq!(store.put_count(), puts);
    assert_eq!(
        cached.balances[&budget.category], walked.balances[&budget.category],
        "snapshot and fresh walk must agree"
    );
    assert_eq!(cached.available_to_allocate, walked.available_to_allocate);

    // Finalizing invalidates the snapshot; the next read walks again.
    session
        .months()
        .finalize_allocations(&budget.id, july)
        .await
        .expect("finalize july");
    let rewalked = session
        .budgets()
        .recalculate(&budget.id, july)
        .await
        .expect("walk after invalidation");
    assert_eq!(rewalked.balances[&budget.category].current, 80.0);
}

#[tokio::test]
async fn forward_totals_include_future_months() {
    let (_store, session) = session();
    let budget = seed_budget(&session).await;
    let june = key(2024, 6);
    let july = key(2024, 7);

    session
        .months()
        .record_income(&budget.id, june, income(3000.0, budget.account, mid_month(june)))
        .await
        .expect("june income");
    session
        .months()
        .set_allocation(&budget.id, june, budget.category, 100.0)
        .await
        .expect("june allocation");
    session
        .months()
        .finalize_allocations(&budget.id, june)
        .await
        .expect("finalize june");
    session
        .months()
        .record_expense(
            &budget.id,
            june,
            expense(40.0, budget.category, budget.account, mid_month(june)),
        )
        .await
        .expect("june expense");

    session
        .months()
        .set_allocation(&budget.id, july, budget.category, 30.0)
        .await
        .expect("july allocation");
    session
        .months()
        .finalize_allocations(&budget.id, july)
        .await
        .expect("finalize july");
    session
        .months()
        .record_expense(
            &budget.id,
            july,
            expense(10.0, budget.category, budget.account, mid_month(july)),
        )
        .await
        .expect("july expense");

    let result = session
        .budgets()
        .recalculate(&budget.id, june)
        .await
        .expect("recalculate as of june");
    let balance = &result.balances[&budget.category];
    assert_eq!(balance.current, 60.0, "through june only");
    assert_eq!(balance.total, 80.0, "july's finalized 30 less its 10 spent");
}

#[tokio::test]
async fn account_balances_build_on_opening_balances() {
    let (_store, session) = session_on(2024, 6, 15);
    let budget = seed_budget(&session).await;
    let savings = session
        .budgets()
        .add_account(
            &budget.id,
            NewAccount {
                name: "Savings".into(),
                group_id: None,
                on_budget: true,
                opening_balance: 1000.0,
            },
        )
        .await
        .expect("add funded account");
    let june = key(2024, 6);

    session
        .months()
        .record_income(&budget.id, june, income(500.0, savings, mid_month(june)))
        .await
        .expect("income");
    session
        .months()
        .set_allocation(&budget.id, june, budget.category, 200.0)
        .await
        .expect("allocate");
    session
        .months()
        .finalize_allocations(&budget.id, june)
        .await
        .expect("finalize");
    session
        .months()
        .record_expense(&budget.id, june, expense(200.0, budget.category, savings, mid_month(june)))
        .await
        .expect("expense");

    let result = session
        .budgets()
        .recalculate(&budget.id, june)
        .await
        .expect("recalculate");
    assert!(result.advisories.is_empty(), "identity holds: {:?}", result.advisories);
    assert_eq!(result.on_budget_cash, 1300.0, "opening 1000 plus 500 in, 200 out");
    assert_eq!(result.available_to_allocate, 1300.0);

    let stored = session
        .documents()
        .budget(&budget.id)
        .await
        .expect("read budget")
        .expect("budget exists");
    assert_eq!(stored.account(savings).expect("account").balance, 1300.0);
}
