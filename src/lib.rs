#![doc(test(attr(deny(warnings))))]

//! Monthwise Core keeps a budget's ledger partitioned into month documents
//! while presenting balances that stay consistent across the whole chain.
//! Months carry forward snapshots of their predecessors, edits mark what they
//! invalidate, and reads heal what they touch.

pub mod cache;
pub mod config;
pub mod core;
pub mod domain;
pub mod errors;
pub mod store;
pub mod time;
pub mod utils;

use std::sync::Once;

static INIT_TRACING: Once = Once::new();

/// Initializes global tracing and emits a startup info log.
pub fn init() {
    INIT_TRACING.call_once(|| {
        utils::init_tracing();
        tracing::info!("Monthwise Core tracing initialized.");
    });
}

#[cfg(test)]
mod tests {
    #[test]
    fn init_does_not_panic() {
        super::init();
    }
}
