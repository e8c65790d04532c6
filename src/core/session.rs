//! Session wiring: one store, one cache, and the services on top.

use std::sync::Arc;

use crate::config::CoreConfig;
use crate::core::budgets::BudgetService;
use crate::core::months::MonthService;
use crate::core::mutation::MutationCoordinator;
use crate::core::snapshot::SnapshotCarryForward;
use crate::core::staleness::StalenessPropagator;
use crate::core::walker::BalanceWalker;
use crate::core::window::MonthWindowPolicy;
use crate::domain::MonthKey;
use crate::store::{DocumentStore, Documents};
use crate::time::{Clock, SystemClock};

/// Facade over one document store. Everything underneath shares a single
/// cache and mutation coordinator, so edits made through one service are
/// visible to the other immediately.
pub struct Session {
    config: CoreConfig,
    docs: Arc<Documents>,
    months: MonthService,
    budgets: BudgetService,
    clock: Arc<dyn Clock>,
}

impl Session {
    pub fn new(store: Arc<dyn DocumentStore>, config: CoreConfig) -> Self {
        Self::with_clock(store, config, Arc::new(SystemClock))
    }

    /// Builds a session on an explicit clock. Tests pin time with this.
    pub fn with_clock(
        store: Arc<dyn DocumentStore>,
        config: CoreConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let docs = Arc::new(Documents::new(store));
        let propagator = Arc::new(StalenessPropagator::new(docs.clone()));
        let coordinator = Arc::new(MutationCoordinator::new(docs.clone(), propagator.clone()));
        let walker = Arc::new(BalanceWalker::new(docs.clone(), &config));
        let snapshots = Arc::new(SnapshotCarryForward::new(
            docs.clone(),
            walker.clone(),
            config.balance_tolerance,
        ));
        let months = MonthService::new(
            docs.clone(),
            coordinator.clone(),
            propagator,
            snapshots,
            walker.clone(),
            MonthWindowPolicy::from_config(&config),
            clock.clone(),
        );
        let budgets = BudgetService::new(
            docs.clone(),
            coordinator,
            walker,
            clock.clone(),
            config.balance_tolerance,
        );
        Self {
            config,
            docs,
            months,
            budgets,
            clock,
        }
    }

    pub fn months(&self) -> &MonthService {
        &self.months
    }

    pub fn budgets(&self) -> &BudgetService {
        &self.budgets
    }

    pub fn documents(&self) -> &Documents {
        &self.docs
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// The month the session's clock currently falls in.
    pub fn current_month(&self) -> MonthKey {
        self.clock.current_month()
    }
}
