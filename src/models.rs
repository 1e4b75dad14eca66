use std::fmt;

/// A single-column foreign key discovered in catalog metadata.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ForeignKey {
    pub child_table: String,
    pub child_column: String,
    pub parent_table: String,
    pub parent_column: String,
}

impl ForeignKey {
    pub fn new(
        child_table: impl Into<String>,
        child_column: impl Into<String>,
        parent_table: impl Into<String>,
        parent_column: impl Into<String>,
    ) -> Self {
        Self {
            child_table: child_table.into(),
            child_column: child_column.into(),
            parent_table: parent_table.into(),
            parent_column: parent_column.into(),
        }
    }
}

impl fmt::Display for ForeignKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{} -> {}.{}",
            self.child_table, self.child_column, self.parent_table, self.parent_column
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueKind {
    /// Child rows whose key has no matching parent row.
    OrphanedRecord,
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IssueKind::OrphanedRecord => write!(f, "Orphaned records"),
        }
    }
}

/// An integrity violation found during a scan.
///
/// Issues only describe *where* to look; how many rows are affected is
/// re-counted when the issue is repaired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    kind: IssueKind,
    table: String,
    detail: String,
    fix: ForeignKey,
}

impl Issue {
    pub fn orphaned_record(fk: ForeignKey) -> Self {
        let detail = format!(
            "Column `{}` in `{}` points to missing rows in `{}`.",
            fk.child_column, fk.child_table, fk.parent_table
        );
        Self {
            kind: IssueKind::OrphanedRecord,
            table: fk.child_table.clone(),
            detail,
            fix: fk,
        }
    }

    pub fn kind(&self) -> IssueKind {
        self.kind
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn detail(&self) -> &str {
        &self.detail
    }

    pub fn fix(&self) -> &ForeignKey {
        &self.fix
    }
}

/// Issues in discovery order. No deduplication.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IssueRegistry {
    issues: Vec<Issue>,
}

impl IssueRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, issue: Issue) {
        self.issues.push(issue);
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Issue> {
        self.issues.iter()
    }

    pub fn count_for_table(&self, table: &str) -> usize {
        self.issues.iter().filter(|i| i.table == table).count()
    }
}

impl<'a> IntoIterator for &'a IssueRegistry {
    type Item = &'a Issue;
    type IntoIter = std::slice::Iter<'a, Issue>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orphaned_issue_detail() {
        let issue = Issue::orphaned_record(ForeignKey::new("orders", "customer_id", "customers", "id"));
        assert_eq!(issue.kind(), IssueKind::OrphanedRecord);
        assert_eq!(issue.table(), "orders");
        assert_eq!(
            issue.detail(),
            "Column `customer_id` in `orders` points to missing rows in `customers`."
        );
        assert_eq!(issue.fix().to_string(), "orders.customer_id -> customers.id");
    }

    #[test]
    fn test_registry_keeps_duplicates_in_order() {
        let mut registry = IssueRegistry::new();
        let fk = ForeignKey::new("orders", "customer_id", "customers", "id");
        registry.push(Issue::orphaned_record(fk.clone()));
        registry.push(Issue::orphaned_record(ForeignKey::new(
            "orders", "store_id", "stores", "id",
        )));
        registry.push(Issue::orphaned_record(fk));

        assert_eq!(registry.len(), 3);
        assert_eq!(registry.count_for_table("orders"), 3);
        assert_eq!(registry.count_for_table("customers"), 0);
        let columns: Vec<_> = registry.iter().map(|i| i.fix().child_column.as_str()).collect();
        assert_eq!(columns, ["customer_id", "store_id", "customer_id"]);
    }
}
