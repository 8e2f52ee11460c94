use crate::error::{LedgerError, Result};
use crate::schema::LedgerRow;
use chrono::Month;
use log::warn;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

pub const DEFAULT_FINANCIAL_YEAR_START_MONTH: u32 = 4;

/// A (year, month) reporting bucket.
///
/// Equality and ordering only look at `(year, month)`; the display label is carried
/// along for presentation and as the key the aggregation views group by.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Period {
    pub year: i32,
    pub month: u32,
    pub label: String,
}

impl Period {
    /// Returns `None` when the month is outside 1..=12.
    pub fn new(year: i32, month: u32, label: impl Into<String>) -> Option<Self> {
        if !(1..=12).contains(&month) {
            return None;
        }
        Some(Self {
            year,
            month,
            label: label.into(),
        })
    }

    /// Derives the period of a row, or `None` when its year or month is missing or
    /// out of range. Such rows are left out of every period-keyed view.
    pub fn from_row(row: &LedgerRow) -> Option<Self> {
        let year = row.year?;
        let month = row.month?;
        let label = display_label(year, month, row.month_name.as_deref());
        Self::new(year, month, label)
    }

    /// Zero-padded `YYYY-MM`, sortable as a plain string.
    pub fn sort_key(&self) -> String {
        format!("{:04}-{:02}", self.year, self.month)
    }

    pub fn key(&self) -> (i32, u32) {
        (self.year, self.month)
    }
}

impl PartialEq for Period {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Period {}

impl PartialOrd for Period {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Period {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

/// `"<MonthName> <Year>"`, using the English month name when the row carries none.
pub fn display_label(year: i32, month: u32, month_name: Option<&str>) -> String {
    let name = month_name
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .or_else(|| {
            u8::try_from(month)
                .ok()
                .and_then(|m| Month::try_from(m).ok())
                .map(|m| m.name().to_string())
        })
        .unwrap_or_else(|| format!("{:02}", month));
    format!("{} {}", name, year)
}

pub fn validate_start_month(month: u32) -> Result<()> {
    if !(1..=12).contains(&month) {
        return Err(LedgerError::InvalidStartMonth(month));
    }
    Ok(())
}

/// The calendar months of the financial year starting in `start_month` of `year`:
/// `start_month..=12` of `year`, then `1..start_month` of `year + 1`.
pub fn financial_year_months(year: i32, start_month: u32) -> Result<Vec<(i32, u32)>> {
    validate_start_month(start_month)?;
    let next_year = if start_month > 1 {
        year.checked_add(1).ok_or(LedgerError::InvalidFinancialYear(year))?
    } else {
        year
    };
    let months = (start_month..=12)
        .map(|m| (year, m))
        .chain((1..start_month).map(|m| (next_year, m)))
        .collect();
    Ok(months)
}

/// A ledger row paired with its canonical period.
#[derive(Debug, Clone, Copy)]
pub struct PeriodRow<'a> {
    pub row: &'a LedgerRow,
    pub period: &'a Period,
}

impl PeriodRow<'_> {
    pub fn label(&self) -> &str {
        &self.period.label
    }
}

/// Rows that could be placed in a period, plus the ids of those that could not.
#[derive(Debug, Clone)]
pub struct NormalizedRows<'a> {
    pub rows: Vec<PeriodRow<'a>>,
    pub excluded_ids: Vec<i64>,
}

impl NormalizedRows<'_> {
    pub fn excluded_count(&self) -> usize {
        self.excluded_ids.len()
    }
}

/// Every distinct period present in a row set.
///
/// The first row seen for a `(year, month)` pair decides its display label, so each
/// pair maps to exactly one label no matter how the rows spell the month name.
#[derive(Debug, Clone, Default)]
pub struct PeriodCatalog {
    periods: BTreeMap<(i32, u32), Period>,
}

impl PeriodCatalog {
    pub fn from_rows(rows: &[LedgerRow]) -> Self {
        let mut periods = BTreeMap::new();
        for row in rows {
            if let Some(period) = Period::from_row(row) {
                periods.entry(period.key()).or_insert(period);
            }
        }
        Self { periods }
    }

    pub fn is_empty(&self) -> bool {
        self.periods.is_empty()
    }

    pub fn len(&self) -> usize {
        self.periods.len()
    }

    pub fn get(&self, year: i32, month: u32) -> Option<&Period> {
        self.periods.get(&(year, month))
    }

    pub fn find_label(&self, label: &str) -> Option<&Period> {
        self.periods.values().find(|p| p.label == label)
    }

    pub fn chronological(&self) -> Vec<Period> {
        self.periods.values().cloned().collect()
    }

    /// The selectable period list: most recent first.
    pub fn newest_first(&self) -> Vec<Period> {
        self.periods.values().rev().cloned().collect()
    }

    pub fn years_descending(&self) -> Vec<i32> {
        let mut years: Vec<i32> = self.periods.keys().map(|(y, _)| *y).collect();
        years.dedup();
        years.reverse();
        years
    }

    /// Periods of the financial year in chronological order. Months with no rows are
    /// skipped rather than zero-filled.
    pub fn financial_year(&self, year: i32, start_month: u32) -> Result<Vec<Period>> {
        let months = financial_year_months(year, start_month)?;
        Ok(months
            .into_iter()
            .filter_map(|(y, m)| self.get(y, m).cloned())
            .collect())
    }

    /// The base period followed by up to `previous` earlier periods, newest first.
    pub fn trailing(
        &self,
        base_label: &str,
        previous: usize,
        max_previous: usize,
    ) -> Result<Vec<Period>> {
        if previous > max_previous {
            return Err(LedgerError::InvalidComparisonCount {
                requested: previous,
                max: max_previous,
            });
        }

        let newest_first = self.newest_first();
        let base_idx = newest_first
            .iter()
            .position(|p| p.label == base_label)
            .ok_or_else(|| LedgerError::UnknownPeriod(base_label.to_string()))?;

        let end = (base_idx + previous + 1).min(newest_first.len());
        Ok(newest_first[base_idx..end].to_vec())
    }

    /// Pairs each row with its canonical period. Rows without a usable year/month are
    /// reported by id instead of being dropped silently.
    pub fn normalize<'a>(&'a self, rows: &'a [LedgerRow]) -> NormalizedRows<'a> {
        let mut normalized = Vec::with_capacity(rows.len());
        let mut excluded_ids = Vec::new();

        for row in rows {
            let period = match (row.year, row.month) {
                (Some(y), Some(m)) => self.get(y, m),
                _ => None,
            };
            match period {
                Some(period) => normalized.push(PeriodRow { row, period }),
                None => excluded_ids.push(row.id),
            }
        }

        if !excluded_ids.is_empty() {
            warn!(
                "{} ledger rows excluded from period views (unparseable year/month): {:?}",
                excluded_ids.len(),
                excluded_ids
            );
        }

        NormalizedRows {
            rows: normalized,
            excluded_ids,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn row(id: i64, year: i32, month: u32, name: &str) -> LedgerRow {
        LedgerRow::new(id, Decimal::ONE).with_period(year, month, name)
    }

    #[test]
    fn test_sort_key_and_label() {
        let period = Period::from_row(&row(1, 2024, 3, "Mar")).unwrap();
        assert_eq!(period.sort_key(), "2024-03");
        assert_eq!(period.label, "Mar 2024");
    }

    #[test]
    fn test_label_falls_back_to_calendar_name() {
        assert_eq!(display_label(2023, 11, None), "November 2023");
        assert_eq!(display_label(2023, 11, Some("  ")), "November 2023");
    }

    #[test]
    fn test_invalid_month_is_not_a_period() {
        assert!(Period::from_row(&row(1, 2024, 13, "???")).is_none());
        assert!(Period::from_row(&LedgerRow::new(2, Decimal::ONE)).is_none());
    }

    #[test]
    fn test_financial_year_skips_absent_months() {
        let rows = vec![
            row(1, 2023, 4, "Apr"),
            row(2, 2023, 5, "May"),
            row(3, 2023, 12, "Dec"),
            row(4, 2024, 2, "Feb"),
            row(5, 2024, 4, "Apr"),
            row(6, 2023, 3, "Mar"),
        ];
        let catalog = PeriodCatalog::from_rows(&rows);

        let keys: Vec<String> = catalog
            .financial_year(2023, 4)
            .unwrap()
            .iter()
            .map(Period::sort_key)
            .collect();

        assert_eq!(keys, vec!["2023-04", "2023-05", "2023-12", "2024-02"]);
    }

    #[test]
    fn test_financial_year_starting_january_is_calendar_year() {
        let months = financial_year_months(2023, 1).unwrap();
        assert_eq!(months.len(), 12);
        assert_eq!(months.first(), Some(&(2023, 1)));
        assert_eq!(months.last(), Some(&(2023, 12)));
    }

    #[test]
    fn test_financial_year_rejects_bad_start_month() {
        let catalog = PeriodCatalog::default();
        assert!(matches!(
            catalog.financial_year(2023, 0),
            Err(LedgerError::InvalidStartMonth(0))
        ));
        assert!(matches!(
            catalog.financial_year(2023, 13),
            Err(LedgerError::InvalidStartMonth(13))
        ));
    }

    #[test]
    fn test_financial_year_at_last_representable_year() {
        assert!(matches!(
            financial_year_months(i32::MAX, 4),
            Err(LedgerError::InvalidFinancialYear(i32::MAX))
        ));
        assert!(matches!(
            PeriodCatalog::default().financial_year(i32::MAX, 7),
            Err(LedgerError::InvalidFinancialYear(i32::MAX))
        ));

        let months = financial_year_months(i32::MAX, 1).unwrap();
        assert_eq!(months.len(), 12);
        assert_eq!(months.last(), Some(&(i32::MAX, 12)));
    }

    #[test]
    fn test_first_label_wins_per_period() {
        let rows = vec![row(1, 2024, 1, "Jan"), row(2, 2024, 1, "January")];
        let catalog = PeriodCatalog::from_rows(&rows);

        assert_eq!(catalog.len(), 1);
        let normalized = catalog.normalize(&rows);
        assert!(normalized.rows.iter().all(|r| r.label() == "Jan 2024"));
    }

    #[test]
    fn test_newest_first_and_years() {
        let rows = vec![
            row(1, 2023, 12, "Dec"),
            row(2, 2024, 2, "Feb"),
            row(3, 2024, 1, "Jan"),
        ];
        let catalog = PeriodCatalog::from_rows(&rows);

        let labels: Vec<String> = catalog.newest_first().into_iter().map(|p| p.label).collect();
        assert_eq!(labels, vec!["Feb 2024", "Jan 2024", "Dec 2023"]);
        assert_eq!(catalog.years_descending(), vec![2024, 2023]);
    }

    #[test]
    fn test_trailing_periods() {
        let rows = vec![
            row(1, 2024, 1, "Jan"),
            row(2, 2024, 2, "Feb"),
            row(3, 2024, 3, "Mar"),
            row(4, 2023, 12, "Dec"),
        ];
        let catalog = PeriodCatalog::from_rows(&rows);

        let labels: Vec<String> = catalog
            .trailing("Feb 2024", 3, 12)
            .unwrap()
            .into_iter()
            .map(|p| p.label)
            .collect();
        assert_eq!(labels, vec!["Feb 2024", "Jan 2024", "Dec 2023"]);

        assert!(matches!(
            catalog.trailing("Jul 2031", 1, 12),
            Err(LedgerError::UnknownPeriod(_))
        ));
        assert!(matches!(
            catalog.trailing("Feb 2024", 13, 12),
            Err(LedgerError::InvalidComparisonCount { requested: 13, max: 12 })
        ));
    }

    #[test]
    fn test_normalize_reports_excluded_rows() {
        let mut broken = LedgerRow::new(9, Decimal::TEN);
        broken.year = Some(2024);
        let rows = vec![row(1, 2024, 1, "Jan"), broken];
        let catalog = PeriodCatalog::from_rows(&rows);

        let normalized = catalog.normalize(&rows);

        assert_eq!(normalized.rows.len(), 1);
        assert_eq!(normalized.excluded_ids, vec![9]);
        assert_eq!(normalized.excluded_count(), 1);
    }
}
