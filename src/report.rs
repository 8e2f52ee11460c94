use crate::hierarchy::{GroupKey, Hierarchy, HierarchyNode, Subtotals};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RowLevel {
    Classification,
    Account,
    Partner,
}

impl RowLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RowLevel::Classification => "Classification",
            RowLevel::Account => "Account",
            RowLevel::Partner => "Partner",
        }
    }

    fn depth(&self) -> usize {
        match self {
            RowLevel::Classification => 0,
            RowLevel::Account => 1,
            RowLevel::Partner => 2,
        }
    }
}

/// Group names from the root down to a node, e.g. `["Income", "Sales", "Acme"]`. An
/// unknown-value bucket contributes an empty segment (see [`GroupKey::path_segment`]).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodePath(pub Vec<String>);

impl NodePath {
    pub fn root(name: impl Into<String>) -> Self {
        Self(vec![name.into()])
    }

    pub fn root_key(key: &GroupKey) -> Self {
        Self::root(key.path_segment())
    }

    pub fn child_key(&self, key: &GroupKey) -> Self {
        self.child(key.path_segment())
    }

    pub fn child(&self, name: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(name.into());
        Self(segments)
    }

    pub fn parent(&self) -> Option<NodePath> {
        if self.0.len() <= 1 {
            return None;
        }
        Some(Self(self.0[..self.0.len() - 1].to_vec()))
    }
}

/// One line of the tabular statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementRow {
    pub level: RowLevel,
    pub path: NodePath,
    pub name: String,
    pub amounts: Vec<Decimal>,
    pub total: Decimal,
    pub has_children: bool,
}

/// Which nodes the viewer has opened. Held by the caller; the aggregation never reads it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExpansionState {
    open: HashSet<NodePath>,
}

impl ExpansionState {
    pub fn is_open(&self, path: &NodePath) -> bool {
        self.open.contains(path)
    }

    pub fn expand(&mut self, path: NodePath) {
        self.open.insert(path);
    }

    pub fn collapse(&mut self, path: &NodePath) {
        self.open.retain(|p| !p.0.starts_with(&path.0));
    }

    pub fn toggle(&mut self, path: NodePath) {
        if self.is_open(&path) {
            self.collapse(&path);
        } else {
            self.expand(path);
        }
    }

    pub fn expand_all(&mut self, hierarchy: &Hierarchy) {
        for row in flatten(hierarchy) {
            if row.has_children {
                self.open.insert(row.path);
            }
        }
    }

    pub fn collapse_all(&mut self) {
        self.open.clear();
    }
}

/// Depth-first flattening: every classification followed by its accounts, each account
/// followed by its partners.
pub fn flatten(hierarchy: &Hierarchy) -> Vec<StatementRow> {
    let mut rows = Vec::new();
    let mut class_path = NodePath(Vec::new());
    let mut account_path = NodePath(Vec::new());

    for node in hierarchy.nodes() {
        let (level, path) = match node {
            HierarchyNode::Classification(_) => {
                class_path = NodePath::root_key(node.key());
                (RowLevel::Classification, class_path.clone())
            }
            HierarchyNode::Account(_) => {
                account_path = class_path.child_key(node.key());
                (RowLevel::Account, account_path.clone())
            }
            HierarchyNode::Partner(_) => (RowLevel::Partner, account_path.child_key(node.key())),
        };
        rows.push(statement_row(
            level,
            path,
            node.name(),
            node.subtotals(),
            node.has_children(),
            &hierarchy.periods,
        ));
    }

    rows
}

/// Rows shown when only the nodes in `expansion` are open. Classifications are always
/// visible; a child is visible when every ancestor is open.
pub fn visible_rows(hierarchy: &Hierarchy, expansion: &ExpansionState) -> Vec<StatementRow> {
    flatten(hierarchy)
        .into_iter()
        .filter(|row| {
            let mut ancestor = row.path.parent();
            while let Some(path) = ancestor {
                if !expansion.is_open(&path) {
                    return false;
                }
                ancestor = path.parent();
            }
            true
        })
        .collect()
}

fn statement_row(
    level: RowLevel,
    path: NodePath,
    name: &str,
    subtotals: &Subtotals,
    has_children: bool,
    periods: &[String],
) -> StatementRow {
    StatementRow {
        level,
        path,
        name: name.to_string(),
        amounts: subtotals.in_order(periods),
        total: subtotals.total,
        has_children,
    }
}

pub fn to_csv(hierarchy: &Hierarchy) -> String {
    let mut output = String::new();

    let mut header = vec!["Type".to_string(), "Account Name".to_string()];
    header.extend(hierarchy.periods.iter().cloned());
    header.push("Total".to_string());
    push_csv_line(&mut output, &header);

    for row in flatten(hierarchy) {
        let mut fields = vec![row.level.as_str().to_string(), row.name.clone()];
        fields.extend(row.amounts.iter().map(|a| format!("{:.2}", a)));
        fields.push(format!("{:.2}", row.total));
        push_csv_line(&mut output, &fields);
    }

    let mut totals = vec!["Total".to_string(), "All Classifications".to_string()];
    totals.extend(
        hierarchy
            .grand_total
            .in_order(&hierarchy.periods)
            .iter()
            .map(|a| format!("{:.2}", a)),
    );
    totals.push(format!("{:.2}", hierarchy.grand_total.total));
    push_csv_line(&mut output, &totals);

    output
}

pub fn to_markdown(hierarchy: &Hierarchy) -> String {
    let mut output = String::new();

    output.push_str("| Account Name |");
    for period in &hierarchy.periods {
        output.push_str(&format!(" {} |", period));
    }
    output.push_str(" Total |\n");

    output.push_str("|---|");
    for _ in &hierarchy.periods {
        output.push_str("---:|");
    }
    output.push_str("---:|\n");

    for row in flatten(hierarchy) {
        let indent = "&nbsp;&nbsp;&nbsp;&nbsp;".repeat(row.level.depth());
        let name = match row.level {
            RowLevel::Classification => format!("**{}**", row.name),
            _ => format!("{}{}", indent, row.name),
        };
        output.push_str(&format!("| {} |", name));
        for amount in &row.amounts {
            output.push_str(&format!(" {:.2} |", amount));
        }
        output.push_str(&format!(" {:.2} |\n", row.total));
    }

    output
}

fn push_csv_line(output: &mut String, fields: &[String]) {
    let line: Vec<String> = fields.iter().map(|f| csv_field(f)).collect();
    output.push_str(&line.join(","));
    output.push('\n');
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::build_hierarchy;
    use crate::period::PeriodCatalog;
    use crate::schema::LedgerRow;
    use rust_decimal_macros::dec;

    fn hierarchy() -> Hierarchy {
        let rows = vec![
            LedgerRow::new(1, dec!(1000))
                .with_classification("Income")
                .with_account("Sales")
                .with_partner("Acme, Ltd")
                .with_period(2024, 1, "Jan"),
            LedgerRow::new(2, dec!(300))
                .with_classification("Rent")
                .with_account("Office")
                .with_period(2024, 1, "Jan"),
        ];
        let catalog = PeriodCatalog::from_rows(&rows);
        let normalized = catalog.normalize(&rows);
        build_hierarchy(&normalized.rows, &["Jan 2024".to_string()]).unwrap()
    }

    #[test]
    fn test_flatten_paths() {
        let rows = flatten(&hierarchy());

        let paths: Vec<Vec<String>> = rows.iter().map(|r| r.path.0.clone()).collect();
        assert_eq!(
            paths,
            vec![
                vec!["Income".to_string()],
                vec!["Income".to_string(), "Sales".to_string()],
                vec!["Income".to_string(), "Sales".to_string(), "Acme, Ltd".to_string()],
                vec!["Rent".to_string()],
                vec!["Rent".to_string(), "Office".to_string()],
                vec!["Rent".to_string(), "Office".to_string(), String::new()],
            ]
        );
        assert_eq!(rows[0].level, RowLevel::Classification);
        assert_eq!(rows[0].amounts, vec![dec!(1000)]);
        assert!(!rows[2].has_children);
        assert_eq!(rows[5].name, "Unknown Partner");
    }

    #[test]
    fn test_bucket_path_differs_from_same_named_group() {
        let rows = vec![
            LedgerRow::new(1, dec!(10))
                .with_classification("Rent")
                .with_account("Unknown Account")
                .with_partner("Landlord")
                .with_period(2024, 1, "Jan"),
            LedgerRow::new(2, dec!(20))
                .with_classification("Rent")
                .with_partner("Agent")
                .with_period(2024, 1, "Jan"),
        ];
        let catalog = PeriodCatalog::from_rows(&rows);
        let normalized = catalog.normalize(&rows);
        let tree = build_hierarchy(&normalized.rows, &["Jan 2024".to_string()]).unwrap();

        let accounts: Vec<StatementRow> = flatten(&tree)
            .into_iter()
            .filter(|r| r.level == RowLevel::Account)
            .collect();
        assert_eq!(accounts.len(), 2);
        assert_eq!(accounts[0].name, accounts[1].name);
        assert_ne!(accounts[0].path, accounts[1].path);

        let mut expansion = ExpansionState::default();
        expansion.expand(NodePath::root("Rent"));
        expansion.expand(NodePath::root("Rent").child("Unknown Account"));
        let partners: Vec<String> = visible_rows(&tree, &expansion)
            .into_iter()
            .filter(|r| r.level == RowLevel::Partner)
            .map(|r| r.name)
            .collect();
        assert_eq!(partners, vec!["Landlord"]);

        expansion.expand(NodePath::root("Rent").child_key(&GroupKey::Unknown));
        assert_eq!(visible_rows(&tree, &expansion).len(), 5);
    }

    #[test]
    fn test_visible_rows_follow_expansion() {
        let tree = hierarchy();
        let mut expansion = ExpansionState::default();

        let collapsed = visible_rows(&tree, &expansion);
        assert_eq!(collapsed.len(), 2);

        expansion.expand(NodePath::root("Income"));
        let names: Vec<String> = visible_rows(&tree, &expansion)
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, vec!["Income", "Sales", "Rent"]);

        expansion.expand(NodePath::root("Income").child("Sales"));
        assert_eq!(visible_rows(&tree, &expansion).len(), 4);

        // Collapsing a parent also forgets its open descendants.
        expansion.toggle(NodePath::root("Income"));
        assert_eq!(visible_rows(&tree, &expansion).len(), 2);
        expansion.expand(NodePath::root("Income"));
        assert_eq!(visible_rows(&tree, &expansion).len(), 3);

        expansion.expand_all(&tree);
        assert_eq!(visible_rows(&tree, &expansion).len(), 6);
        expansion.collapse_all();
        assert_eq!(visible_rows(&tree, &expansion).len(), 2);
    }

    #[test]
    fn test_csv_quotes_names_with_commas() {
        let csv = to_csv(&hierarchy());
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines[0], "Type,Account Name,Jan 2024,Total");
        assert_eq!(lines[1], "Classification,Income,1000.00,1000.00");
        assert_eq!(lines[3], "Partner,\"Acme, Ltd\",1000.00,1000.00");
        assert_eq!(lines.last().copied(), Some("Total,All Classifications,1300.00,1300.00"));
    }

    #[test]
    fn test_markdown_table() {
        let md = to_markdown(&hierarchy());

        assert!(md.starts_with("| Account Name | Jan 2024 | Total |"));
        assert!(md.contains("| **Income** | 1000.00 | 1000.00 |"));
        assert!(md.contains("Unknown Partner"));
    }
}
