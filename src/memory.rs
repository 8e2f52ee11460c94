use crate::error::{LedgerError, Result};
use crate::schema::LedgerRow;
use crate::sync::{BalanceUpdate, LedgerService, UpdateResponse};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

/// An in-process [`LedgerService`] that keeps its rows in memory.
///
/// Accepted updates change the stored balance and audit fields, so a later fetch sees
/// them. Rejections, transport faults and fetch failures can be scripted per row.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    state: Mutex<MemoryState>,
    fetches: AtomicUsize,
}

#[derive(Debug, Default)]
struct MemoryState {
    rows: BTreeMap<i64, LedgerRow>,
    rejections: HashMap<i64, String>,
    transport_faults: HashSet<i64>,
    fetch_failure: Option<String>,
    received: Vec<BalanceUpdate>,
}

impl MemoryLedger {
    pub fn new(rows: Vec<LedgerRow>) -> Self {
        let rows = rows.into_iter().map(|r| (r.id, r)).collect();
        Self {
            state: Mutex::new(MemoryState {
                rows,
                ..MemoryState::default()
            }),
            fetches: AtomicUsize::new(0),
        }
    }

    /// Updates to `id` come back with an `errors` member.
    pub fn reject_updates_for(&self, id: i64, message: impl Into<String>) {
        self.lock().rejections.insert(id, message.into());
    }

    /// Updates to `id` fail before reaching the ledger.
    pub fn fail_transport_for(&self, id: i64) {
        self.lock().transport_faults.insert(id);
    }

    pub fn fail_fetches(&self, message: impl Into<String>) {
        self.lock().fetch_failure = Some(message.into());
    }

    pub fn restore(&self) {
        let mut state = self.lock();
        state.rejections.clear();
        state.transport_faults.clear();
        state.fetch_failure = None;
    }

    pub fn row(&self, id: i64) -> Option<LedgerRow> {
        self.lock().rows.get(&id).cloned()
    }

    /// Every update that reached the ledger, accepted or rejected, in arrival order.
    pub fn received_updates(&self) -> Vec<BalanceUpdate> {
        self.lock().received.clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl LedgerService for MemoryLedger {
    async fn fetch_ledger_rows(&self) -> Result<Vec<LedgerRow>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let state = self.lock();
        if let Some(message) = &state.fetch_failure {
            return Err(LedgerError::FetchFailed(message.clone()));
        }
        Ok(state.rows.values().cloned().collect())
    }

    async fn apply_balance_update(&self, update: &BalanceUpdate) -> Result<UpdateResponse> {
        let mut state = self.lock();
        if state.transport_faults.contains(&update.id) {
            return Err(LedgerError::Remote(format!(
                "connection reset while updating row {}",
                update.id
            )));
        }

        state.received.push(update.clone());

        if let Some(message) = state.rejections.get(&update.id) {
            return Ok(UpdateResponse::rejected(message.clone()));
        }

        match state.rows.get_mut(&update.id) {
            Some(row) => {
                row.balance = update.balance;
                row.last_modified_at = Some(update.modified_at.clone());
                row.last_modified_user = Some(update.modified_user.clone());
                Ok(UpdateResponse::updated(1))
            }
            None => Ok(UpdateResponse::updated(0)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_updates_are_visible_to_later_fetches() {
        let ledger = MemoryLedger::new(vec![LedgerRow::new(1, dec!(5))]);
        let update = BalanceUpdate {
            id: 1,
            balance: dec!(7.5),
            modified_at: "2024-06-01T00:00:00Z".to_string(),
            modified_user: "ops".to_string(),
        };

        let response = ledger.apply_balance_update(&update).await.unwrap();
        assert!(response.is_success());

        let rows = ledger.fetch_ledger_rows().await.unwrap();
        assert_eq!(rows[0].balance, dec!(7.5));
        assert_eq!(rows[0].last_modified_user.as_deref(), Some("ops"));
        assert_eq!(ledger.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_scripted_failures() {
        let ledger = MemoryLedger::new(vec![LedgerRow::new(1, dec!(5))]);
        ledger.fail_fetches("service unavailable");

        assert!(matches!(
            ledger.fetch_ledger_rows().await,
            Err(LedgerError::FetchFailed(_))
        ));

        ledger.restore();
        assert!(ledger.fetch_ledger_rows().await.is_ok());
    }
}
