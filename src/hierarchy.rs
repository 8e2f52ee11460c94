//! Classification → account → partner aggregation.
//!
//! [`build_hierarchy`] is pure: the same rows and period list always produce the same
//! tree. Sums are accumulated at the partner leaves and rolled up, so every parent's
//! amount for a period is exactly the sum of its children's amounts.

use crate::error::Result;
use crate::metrics::checked_sum;
use crate::period::PeriodRow;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

pub const UNCLASSIFIED_LABEL: &str = "Unclassified";
pub const UNKNOWN_ACCOUNT_LABEL: &str = "Unknown Account";
pub const UNKNOWN_PARTNER_LABEL: &str = "Unknown Partner";

/// Grouping key at one level of the tree. Named groups sort by name; the bucket for
/// rows with no value sorts after all of them.
///
/// Names are kept exactly as the service sent them, so `"Sales"` and `"Sales "` are two
/// groups. Only absent, empty and whitespace-only values fall into the bucket.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum GroupKey {
    Named(String),
    Unknown,
}

impl GroupKey {
    pub fn from_field(value: Option<&str>) -> Self {
        match value {
            Some(v) if !v.trim().is_empty() => GroupKey::Named(v.to_string()),
            _ => GroupKey::Unknown,
        }
    }

    /// Segment used in node paths. The bucket's segment is empty, which no named group
    /// can produce, so it never collides with a group named like its display label.
    pub fn path_segment(&self) -> &str {
        match self {
            GroupKey::Named(name) => name,
            GroupKey::Unknown => "",
        }
    }

    pub fn display<'a>(&'a self, unknown_label: &'a str) -> &'a str {
        match self {
            GroupKey::Named(name) => name,
            GroupKey::Unknown => unknown_label,
        }
    }
}

/// Per-period sums for one node, with an explicit zero for every requested period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subtotals {
    pub by_period: BTreeMap<String, Decimal>,
    pub total: Decimal,
}

impl Subtotals {
    pub fn zeroed(periods: &[String]) -> Self {
        Self {
            by_period: periods.iter().map(|p| (p.clone(), Decimal::ZERO)).collect(),
            total: Decimal::ZERO,
        }
    }

    /// Amount for a period; periods outside the report read as zero.
    pub fn get(&self, period: &str) -> Decimal {
        self.by_period.get(period).copied().unwrap_or(Decimal::ZERO)
    }

    /// Amounts in the order of `periods`.
    pub fn in_order(&self, periods: &[String]) -> Vec<Decimal> {
        periods.iter().map(|p| self.get(p)).collect()
    }

    fn add(&mut self, period: &str, amount: Decimal) -> Result<()> {
        if let Some(slot) = self.by_period.get_mut(period) {
            *slot = checked_sum(*slot, amount, || format!("subtotal for {}", period))?;
            self.total = checked_sum(self.total, amount, || "node total".to_string())?;
        }
        Ok(())
    }

    fn absorb(&mut self, other: &Subtotals) -> Result<()> {
        for (period, amount) in &other.by_period {
            self.add(period, *amount)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartnerNode {
    pub key: GroupKey,
    pub subtotals: Subtotals,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountNode {
    pub key: GroupKey,
    pub subtotals: Subtotals,
    pub partners: Vec<PartnerNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationNode {
    pub key: GroupKey,
    pub subtotals: Subtotals,
    pub accounts: Vec<AccountNode>,
}

impl PartnerNode {
    pub fn name(&self) -> &str {
        self.key.display(UNKNOWN_PARTNER_LABEL)
    }
}

impl AccountNode {
    pub fn name(&self) -> &str {
        self.key.display(UNKNOWN_ACCOUNT_LABEL)
    }
}

impl ClassificationNode {
    pub fn name(&self) -> &str {
        self.key.display(UNCLASSIFIED_LABEL)
    }
}

/// A borrowed view of any node in the tree.
#[derive(Debug, Clone, Copy)]
pub enum HierarchyNode<'a> {
    Classification(&'a ClassificationNode),
    Account(&'a AccountNode),
    Partner(&'a PartnerNode),
}

impl<'a> HierarchyNode<'a> {
    pub fn key(&self) -> &'a GroupKey {
        match self {
            HierarchyNode::Classification(node) => &node.key,
            HierarchyNode::Account(node) => &node.key,
            HierarchyNode::Partner(node) => &node.key,
        }
    }

    pub fn name(&self) -> &'a str {
        match self {
            HierarchyNode::Classification(node) => node.name(),
            HierarchyNode::Account(node) => node.name(),
            HierarchyNode::Partner(node) => node.name(),
        }
    }

    pub fn subtotals(&self) -> &'a Subtotals {
        match self {
            HierarchyNode::Classification(node) => &node.subtotals,
            HierarchyNode::Account(node) => &node.subtotals,
            HierarchyNode::Partner(node) => &node.subtotals,
        }
    }

    pub fn depth(&self) -> usize {
        match self {
            HierarchyNode::Classification(_) => 0,
            HierarchyNode::Account(_) => 1,
            HierarchyNode::Partner(_) => 2,
        }
    }

    pub fn has_children(&self) -> bool {
        match self {
            HierarchyNode::Classification(node) => !node.accounts.is_empty(),
            HierarchyNode::Account(node) => !node.partners.is_empty(),
            HierarchyNode::Partner(_) => false,
        }
    }
}

/// The aggregated tree for one report, with the period labels it was built for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hierarchy {
    pub periods: Vec<String>,
    pub classifications: Vec<ClassificationNode>,
    pub grand_total: Subtotals,
}

impl Hierarchy {
    pub fn is_empty(&self) -> bool {
        self.classifications.is_empty()
    }

    pub fn classification(&self, name: &str) -> Option<&ClassificationNode> {
        self.classifications.iter().find(|c| c.name() == name)
    }

    /// All nodes depth-first, parents before their children.
    pub fn nodes(&self) -> Vec<HierarchyNode<'_>> {
        let mut nodes = Vec::new();
        for class in &self.classifications {
            nodes.push(HierarchyNode::Classification(class));
            for account in &class.accounts {
                nodes.push(HierarchyNode::Account(account));
                for partner in &account.partners {
                    nodes.push(HierarchyNode::Partner(partner));
                }
            }
        }
        nodes
    }
}

type PartnerMap = BTreeMap<GroupKey, Subtotals>;
type AccountMap = BTreeMap<GroupKey, PartnerMap>;

/// Groups `rows` by classification, account and partner and sums `balance` for each
/// requested period label.
///
/// Rows whose period is not in `periods` contribute nothing and create no nodes. Rows
/// with no partner land in a dedicated unknown-partner bucket; missing classification
/// and account names are bucketed the same way.
///
/// Fails with [`LedgerError::AmountOverflow`](crate::error::LedgerError::AmountOverflow)
/// when a sum leaves the decimal range.
pub fn build_hierarchy(rows: &[PeriodRow<'_>], periods: &[String]) -> Result<Hierarchy> {
    let wanted: HashSet<&str> = periods.iter().map(String::as_str).collect();
    let mut grouped: BTreeMap<GroupKey, AccountMap> = BTreeMap::new();

    for r in rows {
        let label = r.label();
        if !wanted.contains(label) {
            continue;
        }
        grouped
            .entry(GroupKey::from_field(r.row.classification.as_deref()))
            .or_default()
            .entry(GroupKey::from_field(r.row.account_name.as_deref()))
            .or_default()
            .entry(GroupKey::from_field(r.row.partner_name.as_deref()))
            .or_insert_with(|| Subtotals::zeroed(periods))
            .add(label, r.row.balance)?;
    }

    let mut grand_total = Subtotals::zeroed(periods);
    let mut classifications = Vec::with_capacity(grouped.len());
    for (class_key, accounts) in grouped {
        let mut class_totals = Subtotals::zeroed(periods);
        let mut account_nodes = Vec::with_capacity(accounts.len());
        for (account_key, partners) in accounts {
            let mut account_totals = Subtotals::zeroed(periods);
            let mut partner_nodes = Vec::with_capacity(partners.len());
            for (partner_key, subtotals) in partners {
                account_totals.absorb(&subtotals)?;
                partner_nodes.push(PartnerNode {
                    key: partner_key,
                    subtotals,
                });
            }
            class_totals.absorb(&account_totals)?;
            account_nodes.push(AccountNode {
                key: account_key,
                subtotals: account_totals,
                partners: partner_nodes,
            });
        }
        grand_total.absorb(&class_totals)?;
        classifications.push(ClassificationNode {
            key: class_key,
            subtotals: class_totals,
            accounts: account_nodes,
        });
    }

    Ok(Hierarchy {
        periods: periods.to_vec(),
        classifications,
        grand_total,
    })
}
