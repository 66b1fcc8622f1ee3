//! Whitelist policy: the set of tables and functions a query may touch.

use std::collections::HashSet;

use sqlward_core::WhitelistConfig;

/// An immutable pair of whitelists checked during validation.
///
/// Membership is exact-string: names are compared byte-for-byte against
/// what the parser exposes, so `Orders`, `orders`, and `public.orders` are
/// three different entries. No normalization is performed.
///
/// A freshly constructed policy allows nothing: least privilege by
/// default.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryPolicy {
    tables: HashSet<String>,
    functions: HashSet<String>,
}

impl QueryPolicy {
    /// Create an empty policy that rejects every table and function.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add allowed table names (fully qualified where applicable).
    pub fn allow_tables<I, S>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tables.extend(tables.into_iter().map(Into::into));
        self
    }

    /// Add allowed function names.
    pub fn allow_functions<I, S>(mut self, functions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.functions.extend(functions.into_iter().map(Into::into));
        self
    }

    /// Return true if the passed table name is allowed in a query.
    pub fn is_table_allowed(&self, table: &str) -> bool {
        self.tables.contains(table)
    }

    /// Return true if the passed function name is allowed in a query.
    pub fn is_function_allowed(&self, function: &str) -> bool {
        self.functions.contains(function)
    }
}

impl From<&WhitelistConfig> for QueryPolicy {
    fn from(config: &WhitelistConfig) -> Self {
        QueryPolicy::new()
            .allow_tables(config.tables.iter().cloned())
            .allow_functions(config.functions.iter().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_policy_allows_nothing() {
        let policy = QueryPolicy::new();
        assert!(!policy.is_table_allowed("orders"));
        assert!(!policy.is_function_allowed("now"));
    }

    #[test]
    fn test_membership_is_exact() {
        let policy = QueryPolicy::new().allow_tables(["operations.orders"]);
        assert!(policy.is_table_allowed("operations.orders"));
        assert!(!policy.is_table_allowed("orders"));
        assert!(!policy.is_table_allowed("Operations.Orders"));
    }

    #[test]
    fn test_builder_accumulates() {
        let policy = QueryPolicy::new()
            .allow_tables(["a"])
            .allow_tables(["b"])
            .allow_functions(["now", "sum"]);
        assert!(policy.is_table_allowed("a"));
        assert!(policy.is_table_allowed("b"));
        assert!(policy.is_function_allowed("sum"));
    }

    #[test]
    fn test_from_config() {
        let config = WhitelistConfig {
            tables: vec!["transactions".to_string()],
            functions: vec!["now".to_string()],
        };
        let policy = QueryPolicy::from(&config);
        assert!(policy.is_table_allowed("transactions"));
        assert!(policy.is_function_allowed("now"));
        assert!(!policy.is_function_allowed("pg_sleep"));
    }
}
