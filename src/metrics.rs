use crate::error::{LedgerError, Result};
use crate::period::PeriodRow;
use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

pub const DEFAULT_REVENUE_CLASSIFICATIONS: [&str; 2] = ["Income", "Other Income"];

/// Classifications whose balances count as revenue; everything else is an expense.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct RevenueClassifications(BTreeSet<String>);

impl Default for RevenueClassifications {
    fn default() -> Self {
        Self::new(DEFAULT_REVENUE_CLASSIFICATIONS)
    }
}

impl RevenueClassifications {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(names.into_iter().map(Into::into).collect())
    }

    pub fn contains(&self, classification: Option<&str>) -> bool {
        classification.is_some_and(|c| self.0.contains(c))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodMetrics {
    pub period: String,
    pub revenue: Decimal,
    pub expenses: Decimal,
    pub profit: Decimal,
    /// Profit as a percentage of revenue; zero when revenue is zero.
    pub margin: Decimal,
}

impl PeriodMetrics {
    pub fn from_totals(
        period: impl Into<String>,
        revenue: Decimal,
        expenses: Decimal,
    ) -> Result<Self> {
        let period = period.into();
        let profit = revenue
            .checked_sub(expenses)
            .ok_or_else(|| LedgerError::AmountOverflow(format!("profit for {}", period)))?;
        Ok(Self {
            period,
            revenue,
            expenses,
            profit,
            margin: percentage_of(profit, revenue),
        })
    }

    /// Expenses as an absolute percentage of revenue; zero when revenue is zero.
    pub fn expense_ratio(&self) -> Decimal {
        percentage_of(self.expenses, self.revenue).abs()
    }
}

/// Revenue, expenses, profit and margin for each period, in the order given.
pub fn profit_metrics(
    rows: &[PeriodRow<'_>],
    periods: &[String],
    revenue_classes: &RevenueClassifications,
) -> Result<Vec<PeriodMetrics>> {
    let mut totals: HashMap<&str, (Decimal, Decimal)> = HashMap::new();

    for r in rows {
        let entry = totals
            .entry(r.label())
            .or_insert((Decimal::ZERO, Decimal::ZERO));
        if revenue_classes.contains(r.row.classification.as_deref()) {
            entry.0 = checked_sum(entry.0, r.row.balance, || {
                format!("revenue for {}", r.label())
            })?;
        } else {
            entry.1 = checked_sum(entry.1, r.row.balance, || {
                format!("expenses for {}", r.label())
            })?;
        }
    }

    periods
        .iter()
        .map(|period| {
            let (revenue, expenses) = totals
                .get(period.as_str())
                .copied()
                .unwrap_or((Decimal::ZERO, Decimal::ZERO));
            PeriodMetrics::from_totals(period.clone(), revenue, expenses)
        })
        .collect()
}

/// Net balance across all classifications for each period, in the order given.
pub fn balance_trend(rows: &[PeriodRow<'_>], periods: &[String]) -> Result<Vec<(String, Decimal)>> {
    let mut totals: HashMap<&str, Decimal> = HashMap::new();
    for r in rows {
        let slot = totals.entry(r.label()).or_insert(Decimal::ZERO);
        *slot = checked_sum(*slot, r.row.balance, || format!("net balance for {}", r.label()))?;
    }

    Ok(periods
        .iter()
        .map(|p| {
            let total = totals.get(p.as_str()).copied().unwrap_or(Decimal::ZERO);
            (p.clone(), total)
        })
        .collect())
}

/// `total + amount`, or [`LedgerError::AmountOverflow`] naming what was being summed.
pub(crate) fn checked_sum<F>(total: Decimal, amount: Decimal, context: F) -> Result<Decimal>
where
    F: FnOnce() -> String,
{
    total
        .checked_add(amount)
        .ok_or_else(|| LedgerError::AmountOverflow(context()))
}

fn percentage_of(part: Decimal, whole: Decimal) -> Decimal {
    if whole.is_zero() {
        return Decimal::ZERO;
    }
    part.checked_div(whole)
        .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
        .unwrap_or(Decimal::ZERO)
}
