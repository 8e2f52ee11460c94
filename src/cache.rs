use crate::error::Result;
use crate::schema::LedgerRow;
use crate::sync::LedgerService;
use log::{debug, info};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

#[derive(Debug)]
struct CachedRows {
    fetched_at: Instant,
    rows: Arc<Vec<LedgerRow>>,
}

/// The full ledger row set, shared across sessions for a fixed time window.
///
/// Share it behind an `Arc`. A fetch is only issued when the cache is empty, expired,
/// or was invalidated after a save.
#[derive(Debug)]
pub struct RowCache {
    ttl: Duration,
    slot: Mutex<Option<CachedRows>>,
}

impl Default for RowCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_TTL)
    }
}

impl RowCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slot: Mutex::new(None),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The cached rows if they are still fresh.
    pub fn get(&self) -> Option<Arc<Vec<LedgerRow>>> {
        let slot = self.lock();
        slot.as_ref()
            .filter(|cached| cached.fetched_at.elapsed() < self.ttl)
            .map(|cached| Arc::clone(&cached.rows))
    }

    pub async fn get_or_fetch<S: LedgerService>(
        &self,
        service: &S,
    ) -> Result<Arc<Vec<LedgerRow>>> {
        if let Some(rows) = self.get() {
            debug!("Serving {} ledger rows from cache", rows.len());
            return Ok(rows);
        }

        let rows = Arc::new(service.fetch_ledger_rows().await?);
        info!("Fetched {} ledger rows from service", rows.len());

        *self.lock() = Some(CachedRows {
            fetched_at: Instant::now(),
            rows: Arc::clone(&rows),
        });
        Ok(rows)
    }

    pub fn invalidate(&self) {
        if self.lock().take().is_some() {
            debug!("Ledger row cache invalidated");
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<CachedRows>> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
