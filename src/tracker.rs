//! Baseline/working snapshots of the ledger and the delta between them.

use crate::error::{LedgerError, Result};
use crate::schema::LedgerRow;
use crate::sync::{SyncReport, SyncStatus};
use log::{debug, info, warn};
use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// What happens to the baseline after a save where only some writes succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CommitPolicy {
    /// The baseline takes the working state for every row, failed writes included.
    /// Local state always reflects the user's last intent; failures are only reported.
    #[default]
    AdvanceAll,
    /// Rows whose write failed keep their old baseline balance, so they remain in the
    /// delta and the session stays dirty until they are saved.
    KeepFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommitOutcome {
    NothingToCommit,
    Committed,
    PartiallyCommitted,
    /// Every write failed; baseline and working are untouched so the save can be retried.
    Unchanged,
}

#[derive(Debug, Clone)]
pub struct EditSession {
    baseline: BTreeMap<i64, LedgerRow>,
    working: BTreeMap<i64, LedgerRow>,
    dirty: bool,
}

impl EditSession {
    /// Both snapshots start as independent copies of `rows`.
    pub fn initialize(rows: Vec<LedgerRow>) -> Result<Self> {
        let mut baseline = BTreeMap::new();
        for row in rows {
            let id = row.id;
            if baseline.insert(id, row).is_some() {
                return Err(LedgerError::DuplicateRowId(id));
            }
        }
        debug!("Edit session initialized with {} rows", baseline.len());

        Ok(Self {
            working: baseline.clone(),
            baseline,
            dirty: false,
        })
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn len(&self) -> usize {
        self.working.len()
    }

    pub fn is_empty(&self) -> bool {
        self.working.is_empty()
    }

    pub fn working_row(&self, id: i64) -> Option<&LedgerRow> {
        self.working.get(&id)
    }

    pub fn baseline_row(&self, id: i64) -> Option<&LedgerRow> {
        self.baseline.get(&id)
    }

    /// Working rows ordered by id.
    pub fn working_rows(&self) -> Vec<LedgerRow> {
        self.working.values().cloned().collect()
    }

    pub fn baseline_rows(&self) -> Vec<LedgerRow> {
        self.baseline.values().cloned().collect()
    }

    pub fn apply_edit(&mut self, id: i64, balance: Decimal) -> Result<()> {
        let row = self
            .working
            .get_mut(&id)
            .ok_or(LedgerError::UnknownRow(id))?;
        row.balance = balance;
        self.dirty = self.has_balance_changes();
        Ok(())
    }

    /// Working rows whose balance differs from the baseline, ordered by id.
    ///
    /// Both snapshots always hold the same ids; a row present on one side only is
    /// reported as [`LedgerError::SnapshotMismatch`].
    pub fn compute_delta(&self) -> Result<Vec<LedgerRow>> {
        if let Some(id) = self.baseline.keys().find(|id| !self.working.contains_key(*id)) {
            return Err(LedgerError::SnapshotMismatch {
                id: *id,
                present_in: "baseline",
            });
        }

        let mut delta = Vec::new();
        for (id, row) in &self.working {
            let base = self
                .baseline
                .get(id)
                .ok_or(LedgerError::SnapshotMismatch {
                    id: *id,
                    present_in: "working",
                })?;
            if base.balance != row.balance {
                delta.push(row.clone());
            }
        }
        Ok(delta)
    }

    pub fn discard(&mut self) {
        self.working = self.baseline.clone();
        self.dirty = false;
        debug!("Discarded pending edits");
    }

    /// Stamps the audit fields of a working row after its write was accepted.
    pub fn record_audit(&mut self, id: i64, modified_at: &str, modified_user: &str) -> Result<()> {
        let row = self
            .working
            .get_mut(&id)
            .ok_or(LedgerError::UnknownRow(id))?;
        row.last_modified_at = Some(modified_at.to_string());
        row.last_modified_user = Some(modified_user.to_string());
        Ok(())
    }

    /// Moves the baseline forward according to the outcome of a save.
    pub fn commit(&mut self, report: &SyncReport, policy: CommitPolicy) -> CommitOutcome {
        match report.status() {
            SyncStatus::Empty => CommitOutcome::NothingToCommit,
            SyncStatus::AllFailed => {
                warn!(
                    "All {} balance updates failed; keeping pending edits",
                    report.failure_count()
                );
                CommitOutcome::Unchanged
            }
            SyncStatus::AllSucceeded => {
                self.baseline = self.working.clone();
                self.dirty = false;
                info!("Committed {} balance updates", report.success_count());
                CommitOutcome::Committed
            }
            SyncStatus::Partial => {
                let previous = std::mem::replace(&mut self.baseline, self.working.clone());
                if policy == CommitPolicy::KeepFailed {
                    let failed: HashSet<i64> = report.failed_ids().collect();
                    for id in failed {
                        if let (Some(old), Some(row)) =
                            (previous.get(&id), self.baseline.get_mut(&id))
                        {
                            row.balance = old.balance;
                        }
                    }
                }
                self.dirty = self.has_balance_changes();
                warn!(
                    "{} balance updates succeeded, {} failed ({:?} policy)",
                    report.success_count(),
                    report.failure_count(),
                    policy
                );
                CommitOutcome::PartiallyCommitted
            }
        }
    }

    fn has_balance_changes(&self) -> bool {
        self.working.iter().any(|(id, row)| {
            self.baseline
                .get(id)
                .map_or(true, |base| base.balance != row.balance)
        })
    }
}
