//! Test Utilities and Mocks
//!
//! Shared helpers for the integration tests: a scripted [`MockRunner`]
//! standing in for real processes, and small polling helpers for reading
//! the engine's store.

#![allow(dead_code)]

pub mod mock_runner;

#[allow(unused_imports)]
pub use mock_runner::{MockRunner, Script};

use std::sync::Arc;
use std::time::Duration;

use modbar::store::SlotState;
use modbar::{ModuleStateStore, ModuleStatus};

/// Let the engine react, advancing the (possibly paused) clock a little
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

/// Wait until a module's slot satisfies `pred`, or panic after `limit`
pub async fn wait_for_slot<F>(
    store: &Arc<ModuleStateStore>,
    module: &str,
    limit: Duration,
    pred: F,
) -> SlotState
where
    F: Fn(&SlotState) -> bool,
{
    let mut rx = store.subscribe(module).expect("module should exist");
    let result = tokio::time::timeout(limit, async {
        loop {
            {
                let slot = rx.borrow_and_update();
                if pred(&slot) {
                    return slot.clone();
                }
            }
            if rx.changed().await.is_err() {
                panic!("store slot for {} closed", module);
            }
        }
    })
    .await;
    match result {
        Ok(slot) => slot,
        Err(_) => panic!(
            "{} did not reach the expected state in {:?}: {:?}",
            module,
            limit,
            store.slot(module)
        ),
    }
}

/// Wait until a module has the given status
pub async fn wait_for_status(
    store: &Arc<ModuleStateStore>,
    module: &str,
    status: ModuleStatus,
) -> SlotState {
    wait_for_slot(store, module, Duration::from_secs(60), |slot| slot.status == status).await
}

/// Wait until a module has rendered some text
pub async fn wait_for_text(store: &Arc<ModuleStateStore>, module: &str) -> SlotState {
    wait_for_slot(store, module, Duration::from_secs(60), |slot| {
        slot.render.as_ref().is_some_and(|state| !state.text.is_empty())
    })
    .await
}
