pub mod budget;
pub mod month;
pub mod month_key;
pub mod payee;

pub use budget::{
    Account, AccountGroup, BudgetLedger, Category, CategoryBalancesSnapshot, CategoryGroup,
    IdentityKind, IdentityReport, MonthIndex, SnapshotBalance,
};
pub use month::{
    Allocation, CategoryBalance, ExpenseEntry, IncomeEntry, MonthLedger, PreviousMonthSnapshot,
};
pub use month_key::MonthKey;
pub use payee::PayeeBook;
