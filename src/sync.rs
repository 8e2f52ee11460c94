use crate::error::Result;
use crate::schema::LedgerRow;
use crate::tracker::EditSession;
use chrono::Utc;
use futures::channel::mpsc::UnboundedSender;
use log::{debug, info, warn};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::future::Future;

pub const AUDIT_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// The remote ledger: a full read and a single-row balance write.
pub trait LedgerService {
    fn fetch_ledger_rows(&self) -> impl Future<Output = Result<Vec<LedgerRow>>> + Send;

    fn apply_balance_update(
        &self,
        update: &BalanceUpdate,
    ) -> impl Future<Output = Result<UpdateResponse>> + Send;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceUpdate {
    pub id: i64,
    pub balance: Decimal,
    pub modified_at: String,
    pub modified_user: String,
}

impl BalanceUpdate {
    pub fn for_row(row: &LedgerRow, modified_at: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            id: row.id,
            balance: row.balance,
            modified_at: modified_at.into(),
            modified_user: user.into(),
        }
    }
}

/// What the service answered for one update. Any `errors` member, even an empty
/// one or `null`, marks the write as failed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateResponse {
    #[serde(default)]
    pub rows_updated: Option<i64>,
    #[serde(
        default,
        deserialize_with = "errors_member",
        skip_serializing_if = "Option::is_none"
    )]
    pub errors: Option<Vec<Value>>,
}

/// Reads an `errors` member so that its presence alone is kept: `null` becomes an
/// empty list and a lone object a one-element list. A missing key stays `None`
/// through `#[serde(default)]`.
pub(crate) fn errors_member<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<Vec<Value>>, D::Error>
where
    D: Deserializer<'de>,
{
    let errors = match Value::deserialize(deserializer)? {
        Value::Null => Vec::new(),
        Value::Array(items) => items,
        other => vec![other],
    };
    Ok(Some(errors))
}

impl UpdateResponse {
    pub fn updated(rows_updated: i64) -> Self {
        Self {
            rows_updated: Some(rows_updated),
            errors: None,
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            rows_updated: None,
            errors: Some(vec![serde_json::json!({ "message": message.into() })]),
        }
    }

    pub fn is_success(&self) -> bool {
        self.errors.is_none()
    }

    pub fn error_summary(&self) -> String {
        match &self.errors {
            None => String::new(),
            Some(errors) if errors.is_empty() => "service returned an empty error list".to_string(),
            Some(errors) => errors
                .iter()
                .map(|e| {
                    e.get("message")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .unwrap_or_else(|| e.to_string())
                })
                .collect::<Vec<_>>()
                .join("; "),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RowOutcome {
    Succeeded { id: i64, modified_at: String },
    Failed { id: i64, reason: String },
}

impl RowOutcome {
    pub fn id(&self) -> i64 {
        match self {
            RowOutcome::Succeeded { id, .. } | RowOutcome::Failed { id, .. } => *id,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RowOutcome::Succeeded { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncStatus {
    Empty,
    AllSucceeded,
    Partial,
    AllFailed,
}

/// Per-row results of one save, in the order the writes were sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncReport {
    outcomes: Vec<RowOutcome>,
}

impl SyncReport {
    pub fn new(outcomes: Vec<RowOutcome>) -> Self {
        Self { outcomes }
    }

    pub fn outcomes(&self) -> &[RowOutcome] {
        &self.outcomes
    }

    pub fn success_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failure_count(&self) -> usize {
        self.outcomes.len() - self.success_count()
    }

    /// `(successes, failures)`
    pub fn counts(&self) -> (usize, usize) {
        (self.success_count(), self.failure_count())
    }

    pub fn failed_ids(&self) -> impl Iterator<Item = i64> + '_ {
        self.outcomes
            .iter()
            .filter(|o| !o.is_success())
            .map(RowOutcome::id)
    }

    pub fn succeeded_ids(&self) -> impl Iterator<Item = i64> + '_ {
        self.outcomes
            .iter()
            .filter(|o| o.is_success())
            .map(RowOutcome::id)
    }

    pub fn status(&self) -> SyncStatus {
        match self.counts() {
            (0, 0) => SyncStatus::Empty,
            (_, 0) => SyncStatus::AllSucceeded,
            (0, _) => SyncStatus::AllFailed,
            _ => SyncStatus::Partial,
        }
    }
}

/// Progress notifications emitted while a save runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SyncEvent {
    Started { total: usize },
    RowFinished { index: usize, total: usize, id: i64, succeeded: bool },
    Finished { succeeded: usize, failed: usize },
}

pub fn utc_timestamp() -> String {
    Utc::now().format(AUDIT_TIMESTAMP_FORMAT).to_string()
}

/// Writes every pending delta row to `service`, one request at a time.
///
/// Each request carries a fresh UTC timestamp and `user`. A response with errors or a
/// transport error fails only that row; the loop always runs to the end. Successful
/// rows get their audit fields stamped in the working snapshot. The baseline is not
/// touched here; see [`EditSession::commit`].
pub async fn push_deltas<S: LedgerService>(
    service: &S,
    session: &mut EditSession,
    user: &str,
    progress: Option<&UnboundedSender<SyncEvent>>,
) -> Result<SyncReport> {
    let delta = session.compute_delta()?;
    let total = delta.len();
    info!("Writing {} balance updates", total);
    notify(progress, SyncEvent::Started { total });

    let mut outcomes = Vec::with_capacity(total);
    for (index, row) in delta.iter().enumerate() {
        let update = BalanceUpdate::for_row(row, utc_timestamp(), user);

        let outcome = match service.apply_balance_update(&update).await {
            Ok(response) if response.is_success() => {
                session.record_audit(row.id, &update.modified_at, user)?;
                debug!("Row {} updated to {}", row.id, row.balance);
                RowOutcome::Succeeded {
                    id: row.id,
                    modified_at: update.modified_at,
                }
            }
            Ok(response) => {
                let reason = response.error_summary();
                warn!("Row {} rejected by ledger service: {}", row.id, reason);
                RowOutcome::Failed { id: row.id, reason }
            }
            Err(e) => {
                warn!("Row {} update failed: {}", row.id, e);
                RowOutcome::Failed {
                    id: row.id,
                    reason: e.to_string(),
                }
            }
        };

        notify(
            progress,
            SyncEvent::RowFinished {
                index,
                total,
                id: row.id,
                succeeded: outcome.is_success(),
            },
        );
        outcomes.push(outcome);
    }

    let report = SyncReport::new(outcomes);
    let (succeeded, failed) = report.counts();
    notify(progress, SyncEvent::Finished { succeeded, failed });
    Ok(report)
}

fn notify(progress: Option<&UnboundedSender<SyncEvent>>, event: SyncEvent) {
    if let Some(tx) = progress {
        let _ = tx.unbounded_send(event);
    }
}
