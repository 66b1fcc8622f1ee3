//! Recursive statement validation against a whitelist policy.

use sqlparser::ast::{
    Distinct, Expr, Function, FunctionArg, FunctionArgExpr, FunctionArguments, GroupByExpr,
    JoinConstraint, JoinOperator, OrderByKind, Query, Select, SelectItem, SetExpr, Statement,
    TableFactor, UnaryOperator, Value,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use tracing::{debug, trace};

use crate::error::GuardError;
use crate::policy::QueryPolicy;
use crate::scope::ResolutionScope;

/// Validates raw query text against a [`QueryPolicy`].
///
/// The guard parses the text with the PostgreSQL dialect and walks the
/// resulting tree depth-first, fail-fast: the first reference to a table
/// or function outside the policy, or the first construct outside the
/// permitted SELECT grammar, aborts the walk with a classified
/// [`GuardError`]. Anything the walker does not explicitly recognize is
/// rejected, so an unknown construct can never slip through.
///
/// Each call allocates its own resolution state; a guard can be shared
/// freely across threads.
pub struct QueryGuard {
    dialect: PostgreSqlDialect,
}

impl Clone for QueryGuard {
    fn clone(&self) -> Self {
        Self {
            dialect: PostgreSqlDialect {},
        }
    }
}

impl Default for QueryGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryGuard {
    /// Create a new query guard.
    pub fn new() -> Self {
        Self {
            dialect: PostgreSqlDialect {},
        }
    }

    /// Validate a query against the policy's whitelists.
    ///
    /// Returns `Ok(())` when every table reference, function call, and
    /// column reference in the statement is permitted, or the first
    /// [`GuardError`] encountered otherwise.
    pub fn validate(&self, sql: &str, policy: &QueryPolicy) -> Result<(), GuardError> {
        debug!(query = sql, "validating query");
        let statements = Parser::parse_sql(&self.dialect, sql)
            .map_err(|e| GuardError::ParseFailed(e.to_string()))?;

        let statement = match statements.as_slice() {
            [statement] => statement,
            [] => return Err(GuardError::ParseFailed("empty query".to_string())),
            _ => {
                return Err(GuardError::ParseFailed(
                    "expected a single statement".to_string(),
                ));
            }
        };

        let Statement::Query(query) = statement else {
            return Err(GuardError::NotASelect);
        };

        let mut scope = ResolutionScope::new();
        self.check_query(query, &mut scope, policy)
    }

    fn check_query<'a>(
        &self,
        query: &'a Query,
        scope: &mut ResolutionScope<'a>,
        policy: &QueryPolicy,
    ) -> Result<(), GuardError> {
        // CTE bodies are validated like any other nested select. The alias
        // itself is not registered: referencing a CTE in FROM still
        // requires the name to be whitelisted.
        if let Some(with) = &query.with {
            for cte in &with.cte_tables {
                trace!(cte = %cte.alias.name.value, "processing WITH item");
                self.check_query(&cte.query, scope, policy)?;
            }
        }

        self.check_body(&query.body, scope, policy)?;

        if let Some(order_by) = &query.order_by {
            trace!("processing ORDER BY");
            if let OrderByKind::Expressions(exprs) = &order_by.kind {
                for order in exprs {
                    self.check_expr(&order.expr, scope, policy)?;
                }
            }
        }

        Ok(())
    }

    fn check_body<'a>(
        &self,
        body: &'a SetExpr,
        scope: &mut ResolutionScope<'a>,
        policy: &QueryPolicy,
    ) -> Result<(), GuardError> {
        match body {
            SetExpr::Select(select) => self.check_select(select, scope, policy),
            SetExpr::Query(query) => self.check_query(query, scope, policy),
            // UNION/INTERSECT/EXCEPT: every branch must itself be a plain
            // select, validated with the shared scope.
            SetExpr::SetOperation { left, right, .. } => {
                self.check_body(left, scope, policy)?;
                self.check_body(right, scope, policy)
            }
            _ => Err(GuardError::NotASelect),
        }
    }

    fn check_select<'a>(
        &self,
        select: &'a Select,
        scope: &mut ResolutionScope<'a>,
        policy: &QueryPolicy,
    ) -> Result<(), GuardError> {
        trace!("processing SELECT");

        // Projection names are collected before anything else: FROM/WHERE/
        // GROUP BY processing may legitimately refer to projection output
        // (e.g. GROUP BY on a computed column's alias).
        for item in &select.projection {
            match item {
                SelectItem::UnnamedExpr(expr) => {
                    if let Some(column) = projected_column_name(expr) {
                        scope.register_projected(column);
                    }
                }
                SelectItem::ExprWithAlias { expr, alias } => {
                    if let Some(column) = projected_column_name(expr) {
                        scope.register_projected(column);
                    }
                    scope.register_projected(alias.value.clone());
                }
                _ => {}
            }
        }

        // SELECT INTO writes a table; it is not a plain read.
        if select.into.is_some() {
            return Err(GuardError::NotASelect);
        }

        for table_with_joins in &select.from {
            trace!("processing FROM");
            self.check_from(&table_with_joins.relation, scope, policy)?;

            for join in &table_with_joins.joins {
                trace!("processing JOIN");
                self.check_from(&join.relation, scope, policy)?;

                if let Some(JoinConstraint::On(on)) = join_constraint(&join.join_operator) {
                    self.check_expr(on, scope, policy)?;
                }
            }
        }

        if let Some(selection) = &select.selection {
            trace!("processing WHERE");
            self.check_expr(selection, scope, policy)?;
        }

        if let GroupByExpr::Expressions(exprs, _) = &select.group_by {
            trace!("processing GROUP BY");
            for expr in exprs {
                self.check_expr(expr, scope, policy)?;
            }
        }

        if let Some(having) = &select.having {
            trace!("processing HAVING");
            self.check_expr(having, scope, policy)?;
        }

        trace!("processing projection");
        for item in &select.projection {
            match item {
                SelectItem::UnnamedExpr(expr) | SelectItem::ExprWithAlias { expr, .. } => {
                    self.check_expr(expr, scope, policy)?;
                }
                SelectItem::Wildcard(_) => trace!("all columns"),
                _ => return Err(GuardError::IllegalSelection),
            }
        }

        if let Some(Distinct::On(exprs)) = &select.distinct {
            trace!("processing DISTINCT ON");
            for expr in exprs {
                self.check_expr(expr, scope, policy)?;
            }
        }

        Ok(())
    }

    /// Resolve one FROM or JOIN item: a whitelisted table or a nested
    /// select. Tables are registered under their fully-qualified name and,
    /// when aliased, under the alias; subquery aliases go into their own
    /// index.
    fn check_from<'a>(
        &self,
        relation: &'a TableFactor,
        scope: &mut ResolutionScope<'a>,
        policy: &QueryPolicy,
    ) -> Result<(), GuardError> {
        match relation {
            TableFactor::Table { name, alias, .. } => {
                let full_name = name.to_string();
                if !policy.is_table_allowed(&full_name) {
                    return Err(GuardError::TableNotAllowed(full_name));
                }
                trace!(table = %full_name, alias = ?alias, "from table");
                if let Some(alias) = alias {
                    scope.register_table(alias.name.value.clone(), name);
                }
                scope.register_table(full_name, name);
                Ok(())
            }
            TableFactor::Derived {
                lateral: false,
                subquery,
                alias,
            } => {
                trace!("from nested select");
                self.check_query(subquery, scope, policy)?;
                if let Some(alias) = alias {
                    scope.register_subquery(alias.name.value.clone(), subquery);
                }
                Ok(())
            }
            other => Err(GuardError::NotATableOrSelect(other.to_string())),
        }
    }

    /// Recursive-descent dispatch over the permitted expression grammar.
    /// Anything not explicitly recognized is rejected.
    fn check_expr<'a>(
        &self,
        expr: &'a Expr,
        scope: &mut ResolutionScope<'a>,
        policy: &QueryPolicy,
    ) -> Result<(), GuardError> {
        match expr {
            // A bare column can only refer to projection output; source
            // columns must be qualified.
            Expr::Identifier(ident) => {
                if !scope.has_projected(&ident.value) {
                    return Err(GuardError::UnknownTable(ident.value.clone()));
                }
                trace!(column = %ident.value, "resolved to projection name");
                Ok(())
            }
            Expr::CompoundIdentifier(parts) => {
                let Some((column, qualifier_parts)) = parts.split_last() else {
                    return Err(GuardError::IllegalExpression(expr.to_string()));
                };
                let qualifier = qualifier_parts
                    .iter()
                    .map(|part| part.value.as_str())
                    .collect::<Vec<_>>()
                    .join(".");

                if let Some(table) = scope.table(&qualifier) {
                    trace!(column = %column.value, table = %table, "resolved to table");
                } else if scope.has_subquery(&qualifier) {
                    trace!(column = %column.value, subquery = %qualifier, "resolved to subquery");
                } else if scope.has_projected(&column.value) {
                    trace!(column = %column.value, "resolved to projection name");
                } else {
                    return Err(GuardError::UnknownTable(qualifier));
                }
                Ok(())
            }
            Expr::JsonAccess { value, .. } => self.check_expr(value, scope, policy),
            Expr::Function(function) => self.check_function(function, scope, policy),
            Expr::BinaryOp { left, right, .. } => {
                self.check_expr(left, scope, policy)?;
                self.check_expr(right, scope, policy)
            }
            // LIKE and friends are binary comparisons; the escape
            // character is a plain literal.
            Expr::Like {
                expr: inner,
                pattern,
                ..
            }
            | Expr::ILike {
                expr: inner,
                pattern,
                ..
            }
            | Expr::SimilarTo {
                expr: inner,
                pattern,
                ..
            } => {
                self.check_expr(inner, scope, policy)?;
                self.check_expr(pattern, scope, policy)
            }
            Expr::Value(value) => match &value.value {
                Value::Number(_, _)
                | Value::SingleQuotedString(_)
                | Value::DollarQuotedString(_)
                | Value::EscapedStringLiteral(_)
                | Value::UnicodeStringLiteral(_)
                | Value::NationalStringLiteral(_)
                | Value::HexStringLiteral(_)
                | Value::DoubleQuotedString(_) => Ok(()),
                other => Err(GuardError::IllegalExpression(other.to_string())),
            },
            Expr::UnaryOp {
                op: UnaryOperator::Plus | UnaryOperator::Minus,
                expr: inner,
            } => self.check_expr(inner, scope, policy),
            Expr::Nested(inner) => self.check_expr(inner, scope, policy),
            Expr::IsNull(inner) | Expr::IsNotNull(inner) => self.check_expr(inner, scope, policy),
            // The cast target type is not validated, only the operand.
            Expr::Cast { expr: inner, .. } => self.check_expr(inner, scope, policy),
            other => Err(GuardError::IllegalExpression(other.to_string())),
        }
    }

    fn check_function<'a>(
        &self,
        function: &'a Function,
        scope: &mut ResolutionScope<'a>,
        policy: &QueryPolicy,
    ) -> Result<(), GuardError> {
        let name = function.name.to_string();
        if !policy.is_function_allowed(&name) {
            return Err(GuardError::FunctionNotAllowed(name));
        }

        // Window, FILTER, and WITHIN GROUP forms stay outside the
        // permitted grammar even for whitelisted names.
        if function.over.is_some()
            || function.filter.is_some()
            || !function.within_group.is_empty()
        {
            return Err(GuardError::IllegalExpression(function.to_string()));
        }

        self.check_function_arguments(&function.parameters, scope, policy)?;
        self.check_function_arguments(&function.args, scope, policy)?;
        trace!(function = %name, "function allowed");
        Ok(())
    }

    fn check_function_arguments<'a>(
        &self,
        arguments: &'a FunctionArguments,
        scope: &mut ResolutionScope<'a>,
        policy: &QueryPolicy,
    ) -> Result<(), GuardError> {
        let list = match arguments {
            FunctionArguments::None => return Ok(()),
            FunctionArguments::Subquery(query) => {
                return Err(GuardError::IllegalExpression(query.to_string()));
            }
            FunctionArguments::List(list) => list,
        };

        for arg in &list.args {
            let arg_expr = match arg {
                FunctionArg::Named { arg, .. }
                | FunctionArg::ExprNamed { arg, .. }
                | FunctionArg::Unnamed(arg) => arg,
            };
            match arg_expr {
                FunctionArgExpr::Expr(expr) => self.check_expr(expr, scope, policy)?,
                // count(*) and friends
                FunctionArgExpr::Wildcard | FunctionArgExpr::QualifiedWildcard(_) => {}
            }
        }

        Ok(())
    }
}

/// The bare column name a projected item makes referenceable, if the
/// projected expression is a plain column reference.
fn projected_column_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.clone()),
        Expr::CompoundIdentifier(parts) => parts.last().map(|ident| ident.value.clone()),
        _ => None,
    }
}

fn join_constraint(operator: &JoinOperator) -> Option<&JoinConstraint> {
    match operator {
        JoinOperator::Join(constraint)
        | JoinOperator::Inner(constraint)
        | JoinOperator::Left(constraint)
        | JoinOperator::LeftOuter(constraint)
        | JoinOperator::Right(constraint)
        | JoinOperator::RightOuter(constraint)
        | JoinOperator::FullOuter(constraint)
        | JoinOperator::Semi(constraint)
        | JoinOperator::LeftSemi(constraint)
        | JoinOperator::RightSemi(constraint)
        | JoinOperator::Anti(constraint)
        | JoinOperator::LeftAnti(constraint)
        | JoinOperator::RightAnti(constraint) => Some(constraint),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_from_allowed_table() {
        let guard = QueryGuard::new();
        let policy = QueryPolicy::new().allow_tables(["transactions"]);
        assert!(guard.validate("select * from transactions", &policy).is_ok());
    }

    #[test]
    fn test_select_from_disallowed_table() {
        let guard = QueryGuard::new();
        let policy = QueryPolicy::new().allow_tables(["transactions"]);
        assert_eq!(
            guard.validate("select * from transaction_lines", &policy),
            Err(GuardError::TableNotAllowed("transaction_lines".to_string()))
        );
    }

    #[test]
    fn test_non_select_rejected() {
        let guard = QueryGuard::new();
        let policy = QueryPolicy::new().allow_tables(["users"]);
        assert_eq!(
            guard.validate("DELETE FROM users", &policy),
            Err(GuardError::NotASelect)
        );
    }

    #[test]
    fn test_empty_query_fails_to_parse() {
        let guard = QueryGuard::new();
        let err = guard.validate("", &QueryPolicy::new()).unwrap_err();
        assert_eq!(err.code(), "S001");
    }

    #[test]
    fn test_multiple_statements_rejected() {
        let guard = QueryGuard::new();
        let policy = QueryPolicy::new().allow_tables(["t"]);
        let err = guard
            .validate("select * from t; select * from t", &policy)
            .unwrap_err();
        assert_eq!(err.code(), "S001");
    }

    #[test]
    fn test_function_whitelist() {
        let guard = QueryGuard::new();
        let policy = QueryPolicy::new().allow_functions(["now"]);
        assert!(guard.validate("select now()", &policy).is_ok());
        assert_eq!(
            guard.validate("select pg_sleep(10)", &policy),
            Err(GuardError::FunctionNotAllowed("pg_sleep".to_string()))
        );
    }
}
