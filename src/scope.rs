use crate::period::{Period, PeriodRow};
use crate::schema::LedgerRow;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// The rows a report covers: a set of periods in caller order and an optional store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportScope {
    pub periods: Vec<Period>,
    pub store: Option<String>,
}

impl ReportScope {
    pub fn new(periods: Vec<Period>) -> Self {
        Self {
            periods,
            store: None,
        }
    }

    pub fn with_store(mut self, store: impl Into<String>) -> Self {
        self.store = Some(store.into());
        self
    }

    pub fn labels(&self) -> Vec<String> {
        self.periods.iter().map(|p| p.label.clone()).collect()
    }

    /// The first period of the selection, used for headline figures.
    pub fn headline_period(&self) -> Option<&Period> {
        self.periods.first()
    }

    pub fn apply<'a>(&self, rows: &[PeriodRow<'a>]) -> Vec<PeriodRow<'a>> {
        rows.iter()
            .filter(|r| self.periods.contains(r.period))
            .filter(|r| matches_choice(self.store.as_deref(), r.row.store.as_deref()))
            .copied()
            .collect()
    }
}

/// Sorted, de-duplicated store names across the whole row set.
pub fn distinct_stores(rows: &[LedgerRow]) -> Vec<String> {
    distinct(rows.iter().map(|r| r.store.as_deref()))
}

/// Narrowing filters for the ledger editor. Each `None` means "All".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EditorFilter {
    pub period: String,
    pub store: Option<String>,
    pub classification: Option<String>,
    pub account: Option<String>,
    pub partner: Option<String>,
}

/// The values selectable at each level of the editor cascade.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EditorChoices {
    pub stores: Vec<String>,
    pub classifications: Vec<String>,
    pub accounts: Vec<String>,
    pub partners: Vec<String>,
}

impl EditorFilter {
    pub fn for_period(period_label: impl Into<String>) -> Self {
        Self {
            period: period_label.into(),
            ..Self::default()
        }
    }

    pub fn apply<'a>(&self, rows: &[PeriodRow<'a>]) -> Vec<PeriodRow<'a>> {
        let by_store = self.by_period_and_store(rows);
        let by_class = self.by_classification(&by_store);
        let by_account = self.by_account(&by_class);
        by_account
            .into_iter()
            .filter(|r| matches_choice(self.partner.as_deref(), r.row.partner_name.as_deref()))
            .collect()
    }

    /// Each level only offers values present after the levels above it are applied.
    /// Stores are the exception and come from the full row set.
    pub fn choices(&self, all_rows: &[LedgerRow], rows: &[PeriodRow<'_>]) -> EditorChoices {
        let by_store = self.by_period_and_store(rows);
        let by_class = self.by_classification(&by_store);
        let by_account = self.by_account(&by_class);

        EditorChoices {
            stores: distinct_stores(all_rows),
            classifications: distinct(by_store.iter().map(|r| r.row.classification.as_deref())),
            accounts: distinct(by_class.iter().map(|r| r.row.account_name.as_deref())),
            partners: distinct(by_account.iter().map(|r| r.row.partner_name.as_deref())),
        }
    }

    fn by_period_and_store<'a>(&self, rows: &[PeriodRow<'a>]) -> Vec<PeriodRow<'a>> {
        rows.iter()
            .filter(|r| r.label() == self.period)
            .filter(|r| matches_choice(self.store.as_deref(), r.row.store.as_deref()))
            .copied()
            .collect()
    }

    fn by_classification<'a>(&self, rows: &[PeriodRow<'a>]) -> Vec<PeriodRow<'a>> {
        rows.iter()
            .filter(|r| {
                matches_choice(
                    self.classification.as_deref(),
                    r.row.classification.as_deref(),
                )
            })
            .copied()
            .collect()
    }

    fn by_account<'a>(&self, rows: &[PeriodRow<'a>]) -> Vec<PeriodRow<'a>> {
        rows.iter()
            .filter(|r| matches_choice(self.account.as_deref(), r.row.account_name.as_deref()))
            .copied()
            .collect()
    }
}

fn matches_choice(choice: Option<&str>, value: Option<&str>) -> bool {
    match choice {
        None => true,
        Some(wanted) => value == Some(wanted),
    }
}

fn distinct<'a>(values: impl Iterator<Item = Option<&'a str>>) -> Vec<String> {
    values
        .flatten()
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
