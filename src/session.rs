use crate::cache::RowCache;
use crate::config::ReportSettings;
use crate::error::{LedgerError, Result};
use crate::period::PeriodCatalog;
use crate::schema::LedgerRow;
use crate::scope::{EditorChoices, EditorFilter, ReportScope};
use crate::sync::{push_deltas, LedgerService, SyncEvent, SyncReport};
use crate::tracker::{CommitOutcome, EditSession};
use crate::{Insights, InsightsProcessor};
use futures::channel::mpsc::UnboundedSender;
use log::info;
use rust_decimal::Decimal;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub struct SaveSummary {
    pub report: SyncReport,
    pub outcome: CommitOutcome,
}

impl SaveSummary {
    /// `(successes, failures)`
    pub fn counts(&self) -> (usize, usize) {
        self.report.counts()
    }
}

/// Everything one signed-in user works with: who they are, the service, the shared row
/// cache and their edit snapshots.
///
/// Created by [`LedgerSession::sign_in`] and ended by [`LedgerSession::sign_out`]. Each
/// operation runs to completion before the next one starts.
pub struct LedgerSession<S: LedgerService> {
    service: S,
    cache: Arc<RowCache>,
    user: String,
    settings: ReportSettings,
    edits: Option<EditSession>,
}

impl<S: LedgerService> LedgerSession<S> {
    pub fn sign_in(
        service: S,
        cache: Arc<RowCache>,
        user: impl Into<String>,
        settings: ReportSettings,
    ) -> Result<Self> {
        let user = user.into();
        if user.trim().is_empty() {
            return Err(LedgerError::InvalidSession(
                "user identity is empty".to_string(),
            ));
        }
        settings.validate()?;
        info!("Session started for {}", user);

        Ok(Self {
            service,
            cache,
            user,
            settings,
            edits: None,
        })
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn settings(&self) -> &ReportSettings {
        &self.settings
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn is_loaded(&self) -> bool {
        self.edits.is_some()
    }

    /// Loads the ledger on first use; later calls return the existing snapshots.
    pub async fn load(&mut self) -> Result<&EditSession> {
        if self.edits.is_none() {
            let rows = self.cache.get_or_fetch(&self.service).await?;
            if rows.is_empty() {
                return Err(LedgerError::EmptyLedger);
            }
            self.edits = Some(EditSession::initialize(rows.as_ref().clone())?);
        }
        self.edits()
    }

    pub fn edits(&self) -> Result<&EditSession> {
        self.edits.as_ref().ok_or(LedgerError::NotLoaded)
    }

    pub fn is_dirty(&self) -> bool {
        self.edits.as_ref().is_some_and(EditSession::is_dirty)
    }

    pub fn edit(&mut self, id: i64, balance: Decimal) -> Result<()> {
        self.edits_mut()?.apply_edit(id, balance)
    }

    pub fn discard(&mut self) -> Result<()> {
        self.edits_mut()?.discard();
        Ok(())
    }

    pub fn pending_delta(&self) -> Result<Vec<LedgerRow>> {
        self.edits()?.compute_delta()
    }

    /// Pushes pending edits row by row, then commits according to the configured
    /// policy. The shared cache is dropped whenever at least one write went through.
    pub async fn save(
        &mut self,
        progress: Option<&UnboundedSender<SyncEvent>>,
    ) -> Result<SaveSummary> {
        let edits = self.edits.as_mut().ok_or(LedgerError::NotLoaded)?;
        let report = push_deltas(&self.service, edits, &self.user, progress).await?;
        let outcome = edits.commit(&report, self.settings.commit_policy);

        if report.success_count() > 0 {
            self.cache.invalidate();
        }

        Ok(SaveSummary { report, outcome })
    }

    /// Periods present in the working rows.
    pub fn catalog(&self) -> Result<PeriodCatalog> {
        Ok(PeriodCatalog::from_rows(&self.edits()?.working_rows()))
    }

    /// A base period plus up to `previous` earlier periods.
    pub fn trailing_scope(&self, base_label: &str, previous: usize) -> Result<ReportScope> {
        let periods = self.catalog()?.trailing(
            base_label,
            previous,
            self.settings.max_comparison_periods,
        )?;
        Ok(ReportScope::new(periods))
    }

    /// The financial year beginning in `year`, using the configured start month.
    pub fn financial_year_scope(&self, year: i32) -> Result<ReportScope> {
        let periods = self
            .catalog()?
            .financial_year(year, self.settings.financial_year_start_month)?;
        Ok(ReportScope::new(periods))
    }

    /// Report views over the working rows, so unsaved edits show up immediately.
    pub fn insights(&self, scope: &ReportScope) -> Result<Insights> {
        let rows = self.edits()?.working_rows();
        InsightsProcessor::process(&rows, scope, &self.settings.revenue_classifications)
    }

    /// Working rows matching the editor filter, with the choices for each filter level.
    pub fn editor_rows(&self, filter: &EditorFilter) -> Result<(Vec<LedgerRow>, EditorChoices)> {
        let rows = self.edits()?.working_rows();
        let catalog = PeriodCatalog::from_rows(&rows);
        let normalized = catalog.normalize(&rows);

        let selected = filter
            .apply(&normalized.rows)
            .into_iter()
            .map(|r| r.row.clone())
            .collect();
        Ok((selected, filter.choices(&rows, &normalized.rows)))
    }

    /// Ends the session. The shared cache is cleared so the next sign-in reads fresh data.
    pub fn sign_out(self) {
        self.cache.invalidate();
        info!("Session ended for {}", self.user);
    }

    fn edits_mut(&mut self) -> Result<&mut EditSession> {
        self.edits.as_mut().ok_or(LedgerError::NotLoaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryLedger;
    use crate::tracker::CommitPolicy;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    fn rows() -> Vec<LedgerRow> {
        vec![
            LedgerRow::new(1, dec!(1000))
                .with_classification("Income")
                .with_account("Sales")
                .with_partner("X")
                .with_store("North")
                .with_period(2024, 1, "Jan"),
            LedgerRow::new(2, dec!(300))
                .with_classification("Rent")
                .with_account("Office")
                .with_store("North")
                .with_period(2024, 1, "Jan"),
            LedgerRow::new(3, dec!(50))
                .with_classification("Rent")
                .with_account("Office")
                .with_store("South")
                .with_period(2023, 12, "Dec"),
        ]
    }

    fn session(ledger: MemoryLedger) -> LedgerSession<MemoryLedger> {
        LedgerSession::sign_in(
            ledger,
            Arc::new(RowCache::new(Duration::from_secs(60))),
            "ana@example.com",
            ReportSettings::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_sign_in_requires_user() {
        let result = LedgerSession::sign_in(
            MemoryLedger::new(rows()),
            Arc::new(RowCache::default()),
            "  ",
            ReportSettings::default(),
        );
        assert!(matches!(result, Err(LedgerError::InvalidSession(_))));
    }

    #[test]
    fn test_operations_before_load() {
        let mut session = session(MemoryLedger::new(rows()));
        assert!(!session.is_loaded());
        assert!(!session.is_dirty());
        assert!(matches!(session.edit(1, dec!(1)), Err(LedgerError::NotLoaded)));
        assert!(matches!(session.discard(), Err(LedgerError::NotLoaded)));
        assert!(matches!(session.catalog(), Err(LedgerError::NotLoaded)));
    }

    #[tokio::test]
    async fn test_load_once_per_session() {
        let mut session = session(MemoryLedger::new(rows()));

        assert_eq!(session.load().await.unwrap().len(), 3);
        session.edit(2, dec!(310)).unwrap();
        session.load().await.unwrap();

        assert_eq!(session.service().fetch_count(), 1);
        assert!(session.is_dirty());
        assert_eq!(session.pending_delta().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_and_failed_loads() {
        let mut empty = session(MemoryLedger::new(Vec::new()));
        assert!(matches!(empty.load().await, Err(LedgerError::EmptyLedger)));

        let ledger = MemoryLedger::new(rows());
        ledger.fail_fetches("gateway timeout");
        let mut failing = session(ledger);
        assert!(matches!(failing.load().await, Err(LedgerError::FetchFailed(_))));
        assert!(!failing.is_loaded());
    }

    #[tokio::test]
    async fn test_save_invalidates_cache_and_commits() {
        let cache = Arc::new(RowCache::new(Duration::from_secs(60)));
        let mut session = LedgerSession::sign_in(
            MemoryLedger::new(rows()),
            Arc::clone(&cache),
            "ana@example.com",
            ReportSettings::default(),
        )
        .unwrap();

        session.load().await.unwrap();
        assert!(cache.get().is_some());

        session.edit(1, dec!(1200)).unwrap();
        let summary = session.save(None).await.unwrap();

        assert_eq!(summary.counts(), (1, 0));
        assert_eq!(summary.outcome, CommitOutcome::Committed);
        assert!(!session.is_dirty());
        assert!(cache.get().is_none());
        assert_eq!(session.service().row(1).unwrap().balance, dec!(1200));
    }

    #[tokio::test]
    async fn test_all_failed_save_keeps_cache_and_edits() {
        let ledger = MemoryLedger::new(rows());
        ledger.reject_updates_for(1, "locked");
        let mut session = session(ledger);

        session.load().await.unwrap();
        session.edit(1, dec!(1)).unwrap();
        let summary = session.save(None).await.unwrap();

        assert_eq!(summary.outcome, CommitOutcome::Unchanged);
        assert!(session.is_dirty());

        session.service().restore();
        let retry = session.save(None).await.unwrap();
        assert_eq!(retry.outcome, CommitOutcome::Committed);
        assert!(!session.is_dirty());
    }

    #[tokio::test]
    async fn test_keep_failed_policy_through_session() {
        let ledger = MemoryLedger::new(rows());
        ledger.reject_updates_for(2, "locked");
        let settings = ReportSettings {
            commit_policy: CommitPolicy::KeepFailed,
            ..ReportSettings::default()
        };
        let mut session =
            LedgerSession::sign_in(ledger, Arc::new(RowCache::default()), "ops", settings)
                .unwrap();

        session.load().await.unwrap();
        session.edit(1, dec!(1)).unwrap();
        session.edit(2, dec!(2)).unwrap();
        let summary = session.save(None).await.unwrap();

        assert_eq!(summary.outcome, CommitOutcome::PartiallyCommitted);
        assert!(session.is_dirty());
        let pending: Vec<i64> = session.pending_delta().unwrap().iter().map(|r| r.id).collect();
        assert_eq!(pending, vec![2]);
    }

    #[tokio::test]
    async fn test_insights_reflect_unsaved_edits() {
        let mut session = session(MemoryLedger::new(rows()));
        session.load().await.unwrap();
        session.edit(2, dec!(500)).unwrap();

        let scope = session.trailing_scope("Jan 2024", 1).unwrap();
        assert_eq!(scope.labels(), vec!["Jan 2024", "Dec 2023"]);

        let insights = session.insights(&scope).unwrap();
        let jan = insights.headline().unwrap();
        assert_eq!(jan.revenue, dec!(1000));
        assert_eq!(jan.expenses, dec!(500));
        assert_eq!(jan.margin, dec!(50));
    }

    #[tokio::test]
    async fn test_financial_year_scope_uses_configured_start() {
        let mut session = session(MemoryLedger::new(rows()));
        session.load().await.unwrap();

        let scope = session.financial_year_scope(2023).unwrap();
        assert_eq!(scope.labels(), vec!["Dec 2023", "Jan 2024"]);
    }

    #[tokio::test]
    async fn test_editor_rows() {
        let mut session = session(MemoryLedger::new(rows()));
        session.load().await.unwrap();

        let mut filter = EditorFilter::for_period("Jan 2024");
        filter.classification = Some("Rent".to_string());
        let (rows, choices) = session.editor_rows(&filter).unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, 2);
        assert_eq!(choices.stores, vec!["North", "South"]);
        assert_eq!(choices.classifications, vec!["Income", "Rent"]);
    }

    #[tokio::test]
    async fn test_sign_out_clears_shared_cache() {
        let cache = Arc::new(RowCache::new(Duration::from_secs(60)));
        let mut session = LedgerSession::sign_in(
            MemoryLedger::new(rows()),
            Arc::clone(&cache),
            "ana@example.com",
            ReportSettings::default(),
        )
        .unwrap();
        session.load().await.unwrap();
        assert!(cache.get().is_some());

        session.sign_out();
        assert!(cache.get().is_none());
    }
}
