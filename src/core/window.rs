use crate::config::CoreConfig;
use crate::domain::{MonthIndex, MonthKey};
use crate::errors::LedgerError;

/// How a month may be opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonthAccess {
    /// The month document already exists.
    Existing,
    /// The month does not exist yet but lies inside the creatable window.
    Creatable,
}

/// Bounds month navigation around today.
///
/// A month is creatable while it lies within `past_months` back or
/// `future_months` ahead of the current month, boundaries inclusive. Months
/// already present in the index stay viewable no matter how old; nothing
/// beyond the future bound is ever opened.
#[derive(Debug, Clone, Copy)]
pub struct MonthWindowPolicy {
    past_months: u32,
    future_months: u32,
}

impl MonthWindowPolicy {
    pub fn new(past_months: u32, future_months: u32) -> Self {
        Self {
            past_months,
            future_months,
        }
    }

    pub fn from_config(config: &CoreConfig) -> Self {
        Self::new(config.past_window_months, config.future_window_months)
    }

    pub fn check(
        &self,
        target: MonthKey,
        today: MonthKey,
        index: &MonthIndex,
    ) -> Result<MonthAccess, LedgerError> {
        if index.contains(target) {
            return Ok(MonthAccess::Existing);
        }
        let earliest = today.plus_months(-(self.past_months as i32));
        let latest = today.plus_months(self.future_months as i32);
        if target >= earliest && target <= latest {
            Ok(MonthAccess::Creatable)
        } else {
            Err(LedgerError::OutOfWindow { key: target })
        }
    }
}
