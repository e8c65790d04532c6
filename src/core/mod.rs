pub mod budgets;
pub mod months;
pub mod mutation;
pub mod session;
pub mod snapshot;
pub mod staleness;
pub mod walker;
pub mod window;

pub use budgets::{BudgetBalances, BudgetService, NewAccount, NewCategory};
pub use months::{ExpensePatch, IncomePatch, MonthService, NewExpense, NewIncome};
pub use mutation::{LedgerMutation, MutationCoordinator};
pub use session::Session;
pub use snapshot::SnapshotCarryForward;
pub use staleness::{EditScope, StalenessEdit, StalenessPropagator};
pub use walker::{BalanceWalker, MonthEnds, WalkedBalances};
pub use window::{MonthAccess, MonthWindowPolicy};
