use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use super::staleness::{StalenessEdit, StalenessPropagator};
use crate::cache::{EntityKey, SessionCache};
use crate::domain::MonthIndex;
use crate::errors::LedgerError;
use crate::store::Documents;

/// One optimistic edit: what it touches, how it lands in the cache
/// immediately, and how it commits to the store.
///
/// `apply` must be synchronous and infallible; all validation happens before
/// the mutation is constructed. `commit` is the only fallible step, and on
/// its failure the coordinator restores every touched cache entry exactly.
#[async_trait]
pub trait LedgerMutation: Send + Sync {
    type Output: Send;

    /// Cache entries this mutation may change, in cache or store.
    fn touched(&self) -> Vec<EntityKey>;

    /// Downstream staleness this edit causes, if any.
    fn staleness(&self) -> Option<StalenessEdit> {
        None
    }

    /// Lands the optimistic state in the session cache.
    fn apply(&self, cache: &SessionCache);

    /// Persists the edit. Writes go through [`Documents`], which reconciles
    /// the cache with whatever the store accepted.
    async fn commit(&self, docs: &Documents) -> Result<Self::Output, LedgerError>;
}

/// Runs mutations with optimistic cache application and rollback.
///
/// Order of operations: snapshot touched entries, cancel in-flight reads for
/// them, apply, mark downstream staleness in the cache, commit. Success runs
/// the store staleness pass; failure restores the snapshots. Staleness marks
/// already placed in the cache are left in place on failure; a spurious mark
/// only costs a redundant reconcile.
pub struct MutationCoordinator {
    docs: Arc<Documents>,
    propagator: Arc<StalenessPropagator>,
}

impl MutationCoordinator {
    pub fn new(docs: Arc<Documents>, propagator: Arc<StalenessPropagator>) -> Self {
        Self { docs, propagator }
    }

    pub async fn execute<M: LedgerMutation>(
        &self,
        mutation: M,
        index: &MonthIndex,
    ) -> Result<M::Output, LedgerError> {
        let touched = mutation.touched();
        let staleness = mutation.staleness();
        let cache = self.docs.cache();

        let saved = cache.snapshot(&touched);
        cache.cancel_reads(&touched);
        mutation.apply(cache);
        if let Some(ref edit) = staleness {
            self.propagator.mark_cache(edit, index);
        }

        match mutation.commit(&self.docs).await {
            Ok(output) => {
                if let Some(ref edit) = staleness {
                    self.propagator.propagate_store(edit, index).await;
                }
                Ok(output)
            }
            Err(error) => {
                warn!(%error, "mutation commit failed, rolling back optimistic state");
                cache.restore(saved);
                Err(error)
            }
        }
    }
}
