//! Error types for query validation.
//!
//! Every failure carries a stable bracketed code in its display message.
//! The codes are part of the public contract: callers match on
//! [`GuardError::code`] when mapping verdicts to API responses.

use thiserror::Error;

/// Errors raised while validating a query against a whitelist policy.
///
/// Validation is fail-fast: the first violation encountered during the
/// depth-first walk aborts the remainder, so a caller sees exactly one of
/// these per rejected query.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GuardError {
    /// Statement is not a SELECT.
    #[error("[B001] query is not a SELECT")]
    NotASelect,

    /// A FROM or JOIN item is neither a table nor a nested SELECT.
    #[error("[B002] joined expression is not a table or a SELECT ({0})")]
    NotATableOrSelect(String),

    /// A column reference names a table, alias, or projection name that is
    /// not visible at the point of reference.
    #[error("[B003] unknown table or alias ({0})")]
    UnknownTable(String),

    /// An expression shape outside the permitted grammar.
    #[error("[B004] illegal expression ({0})")]
    IllegalExpression(String),

    /// Table is not in the policy's table whitelist.
    #[error("[B005] table not allowed in query ({0})")]
    TableNotAllowed(String),

    /// A selection item other than an expression or a bare wildcard.
    #[error("[B006] illegal selection")]
    IllegalSelection,

    /// Function is not in the policy's function whitelist.
    #[error("[B007] function not allowed in query ({0})")]
    FunctionNotAllowed(String),

    /// The query text could not be parsed as a single statement.
    #[error("[S001] failed to parse query: {0}")]
    ParseFailed(String),
}

impl GuardError {
    /// Stable error code for this failure class.
    pub fn code(&self) -> &'static str {
        match self {
            GuardError::NotASelect => "B001",
            GuardError::NotATableOrSelect(_) => "B002",
            GuardError::UnknownTable(_) => "B003",
            GuardError::IllegalExpression(_) => "B004",
            GuardError::TableNotAllowed(_) => "B005",
            GuardError::IllegalSelection => "B006",
            GuardError::FunctionNotAllowed(_) => "B007",
            GuardError::ParseFailed(_) => "S001",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(GuardError::NotASelect.code(), "B001");
        assert_eq!(
            GuardError::TableNotAllowed("orders".to_string()).code(),
            "B005"
        );
        assert_eq!(GuardError::ParseFailed("eof".to_string()).code(), "S001");
    }

    #[test]
    fn test_display_includes_code_and_parameter() {
        let err = GuardError::FunctionNotAllowed("pg_sleep".to_string());
        assert_eq!(
            err.to_string(),
            "[B007] function not allowed in query (pg_sleep)"
        );
    }
}
