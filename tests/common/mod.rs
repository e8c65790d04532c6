#![allow(dead_code)]

use std::sync::Arc;

use chrono::NaiveDate;
use monthwise_core::config::CoreConfig;
use monthwise_core::core::{NewAccount, NewCategory, NewExpense, NewIncome, Session};
use monthwise_core::domain::MonthKey;
use monthwise_core::store::MemoryStore;
use monthwise_core::time::FixedClock;
use uuid::Uuid;

/// In-memory session pinned to mid-June 2024.
pub fn session() -> (Arc<MemoryStore>, Session) {
    session_on(2024, 6, 15)
}

/// In-memory session with the clock pinned to the given day.
pub fn session_on(year: i32, month: u32, day: u32) -> (Arc<MemoryStore>, Session) {
    let store = Arc::new(MemoryStore::new());
    let session = Session::with_clock(
        store.clone(),
        CoreConfig::default(),
        Arc::new(FixedClock::on_date(year, month, day)),
    );
    (store, session)
}

pub struct SeededBudget {
    pub id: String,
    pub account: Uuid,
    pub category: Uuid,
}

/// Budget with one open on-budget account and one category.
pub async fn seed_budget(session: &Session) -> SeededBudget {
    let budget = session
        .budgets()
        .create_budget("Household")
        .await
        .expect("create budget");
    let account = session
        .budgets()
        .add_account(
            &budget.id,
            NewAccount {
                name: "Checking".into(),
                group_id: None,
                on_budget: true,
                opening_balance: 0.0,
            },
        )
        .await
        .expect("add account");
    let category = session
        .budgets()
        .add_category(
            &budget.id,
            NewCategory {
                name: "Groceries".into(),
                group_id: None,
            },
        )
        .await
        .expect("add category");
    SeededBudget {
        id: budget.id,
        account,
        category,
    }
}

pub fn key(year: i32, month: u32) -> MonthKey {
    MonthKey::new(year, month).expect("valid month")
}

pub fn mid_month(key: MonthKey) -> NaiveDate {
    NaiveDate::from_ymd_opt(key.year, key.month, 15).expect("valid date")
}

pub fn income(amount: f64, account: Uuid, date: NaiveDate) -> NewIncome {
    NewIncome {
        amount,
        account_id: account,
        date,
        payee: None,
        description: None,
    }
}

pub fn expense(amount: f64, category: Uuid, account: Uuid, date: NaiveDate) -> NewExpense {
    NewExpense {
        amount,
        category_id: category,
        account_id: account,
        date,
        payee: None,
        description: None,
        cleared: true,
    }
}
