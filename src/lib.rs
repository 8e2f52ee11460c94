//! # Ledger Insights
//!
//! A library for turning flat general-ledger balance rows into hierarchical
//! period-over-period reports, and for pushing in-place balance edits back to the
//! ledger service one row at a time.
//!
//! ## Core Concepts
//!
//! - **Ledger Rows**: Flat records keyed by id, each carrying a classification, account,
//!   partner, store, period and balance
//! - **Periods**: `(year, month)` buckets with one canonical display label each
//! - **Hierarchy**: Classification → Account → Partner totals per selected period, built
//!   bottom-up so every parent equals the sum of its children
//! - **Edit Snapshots**: A baseline (last synced) and a working copy; the delta between
//!   them is what gets written back
//! - **Sessions**: One signed-in user, their snapshots and a shared, time-limited row cache
//!
//! ## Example
//!
//! ```rust,ignore
//! use ledger_insights::*;
//! use rust_decimal_macros::dec;
//! use std::sync::Arc;
//!
//! let ledger = MemoryLedger::new(vec![
//!     LedgerRow::new(1, dec!(1000))
//!         .with_classification("Income")
//!         .with_account("Sales")
//!         .with_period(2024, 1, "January"),
//! ]);
//!
//! let mut session = LedgerSession::sign_in(
//!     ledger,
//!     Arc::new(RowCache::default()),
//!     "ana@example.com",
//!     ReportSettings::default(),
//! )?;
//! session.load().await?;
//!
//! let scope = session.trailing_scope("January 2024", 0)?;
//! let insights = session.insights(&scope)?;
//! println!("{}", to_markdown(&insights.hierarchy));
//!
//! session.edit(1, dec!(1250))?;
//! let summary = session.save(None).await?;
//! assert_eq!(summary.counts(), (1, 0));
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod hierarchy;
pub mod memory;
pub mod metrics;
pub mod period;
pub mod report;
pub mod schema;
pub mod scope;
pub mod session;
pub mod sync;
pub mod tracker;

#[cfg(feature = "remote")]
pub mod client;

pub use cache::{RowCache, DEFAULT_CACHE_TTL};
pub use config::{LedgerConfig, ReportSettings, ServiceConfig};
pub use error::{LedgerError, Result};
pub use hierarchy::{
    build_hierarchy, AccountNode, ClassificationNode, GroupKey, Hierarchy, HierarchyNode,
    PartnerNode, Subtotals,
};
pub use memory::MemoryLedger;
pub use metrics::{balance_trend, profit_metrics, PeriodMetrics, RevenueClassifications};
pub use period::{Period, PeriodCatalog, PeriodRow};
pub use report::{
    flatten, to_csv, to_markdown, visible_rows, ExpansionState, NodePath, RowLevel, StatementRow,
};
pub use schema::LedgerRow;
pub use scope::{distinct_stores, EditorChoices, EditorFilter, ReportScope};
pub use session::{LedgerSession, SaveSummary};
pub use sync::{
    push_deltas, BalanceUpdate, LedgerService, RowOutcome, SyncEvent, SyncReport, SyncStatus,
    UpdateResponse,
};
pub use tracker::{CommitOutcome, CommitPolicy, EditSession};

#[cfg(feature = "remote")]
pub use client::GraphQlLedgerClient;

use log::{debug, info};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Every report view for one scope, computed from the same row set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insights {
    /// Period labels in scope order.
    pub periods: Vec<String>,
    pub hierarchy: Hierarchy,
    /// One entry per period, in the same order as `periods`.
    pub metrics: Vec<PeriodMetrics>,
    pub trend: Vec<(String, Decimal)>,
    /// Rows left out of every view because their year or month could not be read.
    pub excluded_ids: Vec<i64>,
}

impl Insights {
    /// Figures for the first selected period.
    pub fn headline(&self) -> Option<&PeriodMetrics> {
        self.metrics.first()
    }
}

pub struct InsightsProcessor;

impl InsightsProcessor {
    pub fn process(
        rows: &[LedgerRow],
        scope: &ReportScope,
        revenue_classes: &RevenueClassifications,
    ) -> Result<Insights> {
        let catalog = PeriodCatalog::from_rows(rows);
        let normalized = catalog.normalize(rows);
        let scoped = scope.apply(&normalized.rows);

        // A scope built elsewhere may spell a month differently; rows are keyed by the
        // catalog's label.
        let periods: Vec<String> = scope
            .periods
            .iter()
            .map(|p| {
                catalog
                    .get(p.year, p.month)
                    .map(|known| known.label.clone())
                    .unwrap_or_else(|| p.label.clone())
            })
            .collect();

        info!(
            "Building insights for {} periods over {} rows",
            periods.len(),
            scoped.len()
        );
        if let Some(store) = &scope.store {
            debug!("Restricted to store '{}'", store);
        }

        let hierarchy = build_hierarchy(&scoped, &periods)?;
        let metrics = profit_metrics(&scoped, &periods, revenue_classes)?;
        let trend = balance_trend(&scoped, &periods)?;

        debug!(
            "Hierarchy has {} classifications, {} rows excluded",
            hierarchy.classifications.len(),
            normalized.excluded_count()
        );

        Ok(Insights {
            periods,
            hierarchy,
            metrics,
            trend,
            excluded_ids: normalized.excluded_ids,
        })
    }
}

pub fn build_insights(
    rows: &[LedgerRow],
    scope: &ReportScope,
    revenue_classes: &RevenueClassifications,
) -> Result<Insights> {
    InsightsProcessor::process(rows, scope, revenue_classes)
}
