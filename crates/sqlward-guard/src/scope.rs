//! Name-resolution state threaded through the statement walk.

use std::collections::{HashMap, HashSet};

use sqlparser::ast::{ObjectName, Query};

/// Names visible to column references at some point of the walk.
///
/// One scope is allocated per `validate` call and passed by `&mut` into
/// every nested SELECT, so it is shared, not block-scoped: tables and
/// aliases introduced inside a subquery stay visible to sibling joins and
/// to the enclosing statement after the subquery returns. This lets an ON
/// clause reference a column exposed by an earlier sibling's subquery
/// alias, and it is the intended resolution semantics, not an accident of
/// implementation.
///
/// Alias collisions are resolved last-write-wins with no diagnostic.
#[derive(Debug, Default)]
pub(crate) struct ResolutionScope<'a> {
    /// Resolvable name (table alias or fully-qualified name) → the table
    /// it denotes.
    tables: HashMap<String, &'a ObjectName>,
    /// Subquery alias → the nested SELECT it denotes.
    subqueries: HashMap<String, &'a Query>,
    /// Names introduced by the projection list: bare names of directly
    /// selected columns plus explicit output aliases.
    projected: HashSet<String>,
}

impl<'a> ResolutionScope<'a> {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register_table(&mut self, key: impl Into<String>, table: &'a ObjectName) {
        self.tables.insert(key.into(), table);
    }

    pub(crate) fn register_subquery(&mut self, alias: impl Into<String>, subquery: &'a Query) {
        self.subqueries.insert(alias.into(), subquery);
    }

    pub(crate) fn register_projected(&mut self, name: impl Into<String>) {
        self.projected.insert(name.into());
    }

    /// Look up a column qualifier in the table index.
    pub(crate) fn table(&self, qualifier: &str) -> Option<&'a ObjectName> {
        self.tables.get(qualifier).copied()
    }

    pub(crate) fn has_subquery(&self, qualifier: &str) -> bool {
        self.subqueries.contains_key(qualifier)
    }

    pub(crate) fn has_projected(&self, name: &str) -> bool {
        self.projected.contains(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlparser::ast::{Ident, ObjectNamePart};

    fn object_name(name: &str) -> ObjectName {
        ObjectName(
            name.split('.')
                .map(|part| ObjectNamePart::Identifier(Ident::new(part)))
                .collect(),
        )
    }

    #[test]
    fn test_table_lookup_by_alias_and_full_name() {
        let orders = object_name("operations.orders");
        let mut scope = ResolutionScope::new();
        scope.register_table("o", &orders);
        scope.register_table("operations.orders", &orders);

        assert!(scope.table("o").is_some());
        assert!(scope.table("operations.orders").is_some());
        assert!(scope.table("orders").is_none());
    }

    #[test]
    fn test_alias_collision_last_write_wins() {
        let first = object_name("first");
        let second = object_name("second");
        let mut scope = ResolutionScope::new();
        scope.register_table("t", &first);
        scope.register_table("t", &second);

        assert_eq!(scope.table("t").unwrap().to_string(), "second");
    }

    #[test]
    fn test_projected_names() {
        let mut scope = ResolutionScope::new();
        scope.register_projected("qty");
        assert!(scope.has_projected("qty"));
        assert!(!scope.has_projected("total"));
    }
}
