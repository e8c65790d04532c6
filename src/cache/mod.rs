use std::collections::HashMap;
use std::sync::RwLock;

use crate::domain::{BudgetLedger, MonthKey, MonthLedger};

/// Identity of a cacheable document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityKey {
    Budget(String),
    Month(MonthRef),
}

/// Identity of one budget-month.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MonthRef {
    pub budget_id: String,
    pub key: MonthKey,
}

impl MonthRef {
    pub fn new(budget_id: impl Into<String>, key: MonthKey) -> Self {
        Self {
            budget_id: budget_id.into(),
            key,
        }
    }

    pub fn document_id(&self) -> String {
        self.key.document_id(&self.budget_id)
    }
}

#[derive(Debug, Clone)]
pub enum CachedDoc {
    Budget(BudgetLedger),
    Month(MonthLedger),
}

impl CachedDoc {
    pub fn entity_key(&self) -> EntityKey {
        match self {
            CachedDoc::Budget(budget) => EntityKey::Budget(budget.id.clone()),
            CachedDoc::Month(month) => {
                EntityKey::Month(MonthRef::new(month.budget_id.clone(), month.key()))
            }
        }
    }
}

/// Proof that a read started against a particular cache generation. A fill is
/// accepted only while the generation is unchanged.
#[derive(Debug, Clone)]
pub struct ReadTicket {
    key: EntityKey,
    epoch: u64,
}

#[derive(Debug, Default)]
struct Slot {
    epoch: u64,
    value: Option<CachedDoc>,
}

/// Read-through cache for one logical session.
///
/// Explicitly constructed and injected; nothing here is process-global. Every
/// mutation bumps the slot's epoch, which cancels in-flight reads so a slow
/// store fetch can never clobber a newer optimistic write.
#[derive(Debug, Default)]
pub struct SessionCache {
    slots: RwLock<HashMap<EntityKey, Slot>>,
}

/// Saved slot values, taken before an optimistic mutation so a failed commit
/// can put things back exactly.
#[derive(Debug)]
pub struct CacheSnapshot {
    entries: Vec<(EntityKey, Option<CachedDoc>)>,
}

impl SessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn month(&self, month_ref: &MonthRef) -> Option<MonthLedger> {
        let slots = self.slots.read().expect("cache lock poisoned");
        match slots.get(&EntityKey::Month(month_ref.clone()))?.value {
            Some(CachedDoc::Month(ref month)) => Some(month.clone()),
            _ => None,
        }
    }

    pub fn budget(&self, budget_id: &str) -> Option<BudgetLedger> {
        let slots = self.slots.read().expect("cache lock poisoned");
        match slots.get(&EntityKey::Budget(budget_id.to_string()))?.value {
            Some(CachedDoc::Budget(ref budget)) => Some(budget.clone()),
            _ => None,
        }
    }

    /// Starts a read-through fetch for `key`.
    pub fn begin_read(&self, key: EntityKey) -> ReadTicket {
        let mut slots = self.slots.write().expect("cache lock poisoned");
        let slot = slots.entry(key.clone()).or_default();
        ReadTicket {
            key,
            epoch: slot.epoch,
        }
    }

    /// Fills the slot the ticket was taken for. Returns `false`, leaving the
    /// slot untouched, when the slot changed since `begin_read`.
    pub fn complete_read(&self, ticket: &ReadTicket, value: CachedDoc) -> bool {
        let mut slots = self.slots.write().expect("cache lock poisoned");
        let slot = slots.entry(ticket.key.clone()).or_default();
        if slot.epoch != ticket.epoch {
            return false;
        }
        slot.value = Some(value);
        true
    }

    /// Replaces a slot's value and cancels in-flight reads for it.
    pub fn overwrite(&self, value: CachedDoc) {
        let key = value.entity_key();
        let mut slots = self.slots.write().expect("cache lock poisoned");
        let slot = slots.entry(key).or_default();
        slot.epoch += 1;
        slot.value = Some(value);
    }

    /// Drops a slot's value and cancels in-flight reads for it.
    pub fn remove(&self, key: &EntityKey) {
        let mut slots = self.slots.write().expect("cache lock poisoned");
        let slot = slots.entry(key.clone()).or_default();
        slot.epoch += 1;
        slot.value = None;
    }

    /// Bumps epochs without touching values, so reads started before now are
    /// discarded on completion.
    pub fn cancel_reads(&self, keys: &[EntityKey]) {
        let mut slots = self.slots.write().expect("cache lock poisoned");
        for key in keys {
            slots.entry(key.clone()).or_default().epoch += 1;
        }
    }

    /// Mutates a cached month in place, if present. Bumps the epoch.
    pub fn modify_month(&self, month_ref: &MonthRef, apply: impl FnOnce(&mut MonthLedger)) -> bool {
        let mut slots = self.slots.write().expect("cache lock poisoned");
        let Some(slot) = slots.get_mut(&EntityKey::Month(month_ref.clone())) else {
            return false;
        };
        match slot.value {
            Some(CachedDoc::Month(ref mut month)) => {
                apply(month);
                slot.epoch += 1;
                true
            }
            _ => false,
        }
    }

    /// Mutates a cached budget in place, if present. Bumps the epoch.
    pub fn modify_budget(&self, budget_id: &str, apply: impl FnOnce(&mut BudgetLedger)) -> bool {
        let mut slots = self.slots.write().expect("cache lock poisoned");
        let Some(slot) = slots.get_mut(&EntityKey::Budget(budget_id.to_string())) else {
            return false;
        };
        match slot.value {
            Some(CachedDoc::Budget(ref mut budget)) => {
                apply(budget);
                slot.epoch += 1;
                true
            }
            _ => false,
        }
    }

    /// Captures the current values of `keys` for exact restoration later.
    pub fn snapshot(&self, keys: &[EntityKey]) -> CacheSnapshot {
        let slots = self.slots.read().expect("cache lock poisoned");
        CacheSnapshot {
            entries: keys
                .iter()
                .map(|key| {
                    let value = slots.get(key).and_then(|slot| slot.value.clone());
                    (key.clone(), value)
                })
                .collect(),
        }
    }

    /// Puts snapshotted values back, bumping epochs so any read raced against
    /// the rollback is discarded too.
    pub fn restore(&self, snapshot: CacheSnapshot) {
        let mut slots = self.slots.write().expect("cache lock poisoned");
        for (key, value) in snapshot.entries {
            let slot = slots.entry(key).or_default();
            slot.epoch += 1;
            slot.value = value;
        }
    }
}
