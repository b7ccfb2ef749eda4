//! SQL compilation: builder state to dialect-specific SQL plus bound
//! arguments.
//!
//! Identifiers and operators are the only caller-controlled strings
//! that reach SQL text, so both are validated here. A failure is a
//! programmer error: identifiers and operators must come from trusted
//! code, never from user input, so violations panic and surface as a
//! 500 at the recovery boundary instead of being reported as client
//! errors.

use indexmap::IndexMap;

use crate::builder::QueryBuilder;
use crate::clause::WhereClause;
use crate::value::Value;

/// Compiles query-builder state into SQL for one database dialect.
pub trait Grammar: Send + Sync {
    /// Quotes an identifier for the dialect.
    ///
    /// # Panics
    ///
    /// Panics when the identifier contains characters outside
    /// `[A-Za-z0-9_.]`.
    fn wrap(&self, identifier: &str) -> String;

    /// Compiles a SELECT from the builder's state.
    fn compile_select(&self, query: &QueryBuilder) -> (String, Vec<Value>);

    /// Compiles an INSERT of `data` into `table`.
    fn compile_insert(&self, table: &str, data: &IndexMap<String, Value>) -> (String, Vec<Value>);

    /// Compiles an UPDATE of `data` in `table`, constrained by `wheres`.
    fn compile_update(
        &self,
        table: &str,
        data: &IndexMap<String, Value>,
        wheres: &[WhereClause],
    ) -> (String, Vec<Value>);

    /// Compiles a DELETE from `table`, constrained by `wheres`.
    fn compile_delete(&self, table: &str, wheres: &[WhereClause]) -> (String, Vec<Value>);
}

/// Operators allowed in WHERE clauses. Comparison is case-insensitive
/// after trimming; emission is upper-case.
const ALLOWED_OPERATORS: &[&str] = &[
    "=",
    "!=",
    "<>",
    "<",
    ">",
    "<=",
    ">=",
    "LIKE",
    "NOT LIKE",
    "IN",
    "NOT IN",
    "BETWEEN",
    "NOT BETWEEN",
    "IS",
    "IS NOT",
];

fn is_valid_identifier(part: &str) -> bool {
    !part.is_empty()
        && part
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

/// Validates an operator against the whitelist and returns its
/// canonical upper-case form.
///
/// # Panics
///
/// Panics on an operator outside the whitelist.
fn validate_operator(operator: &str) -> String {
    let canonical = operator.trim().to_uppercase();
    assert!(
        ALLOWED_OPERATORS.contains(&canonical.as_str()),
        "invalid SQL operator: {operator} (not in whitelist)"
    );
    canonical
}

/// The MySQL dialect: backtick quoting, `?` placeholders.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlGrammar;

impl MySqlGrammar {
    /// Creates the MySQL grammar.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn append_wheres(&self, sql: &mut String, args: &mut Vec<Value>, wheres: &[WhereClause]) {
        if wheres.is_empty() {
            return;
        }
        sql.push_str(" WHERE ");
        for (i, clause) in wheres.iter().enumerate() {
            let operator = validate_operator(&clause.operator);
            if i > 0 {
                sql.push(' ');
                sql.push_str(clause.boolean.as_str());
                sql.push(' ');
            }
            sql.push_str(&self.wrap(&clause.column));
            sql.push(' ');
            sql.push_str(&operator);
            sql.push_str(" ?");
            args.push(clause.value.clone());
        }
    }
}

impl Grammar for MySqlGrammar {
    /// Wraps an identifier in backticks; `a.b` becomes `` `a`.`b` ``
    /// and `*` passes through verbatim.
    fn wrap(&self, identifier: &str) -> String {
        if identifier == "*" {
            return identifier.to_string();
        }

        if identifier.contains('.') {
            return identifier
                .split('.')
                .map(|part| {
                    assert!(
                        is_valid_identifier(part),
                        "invalid SQL identifier: {part} (contains unsafe characters)"
                    );
                    format!("`{part}`")
                })
                .collect::<Vec<_>>()
                .join(".");
        }

        assert!(
            is_valid_identifier(identifier),
            "invalid SQL identifier: {identifier} (contains unsafe characters)"
        );
        format!("`{identifier}`")
    }

    fn compile_select(&self, query: &QueryBuilder) -> (String, Vec<Value>) {
        let columns = query
            .columns
            .iter()
            .map(|c| self.wrap(c))
            .collect::<Vec<_>>()
            .join(", ");

        let mut sql = format!("SELECT {} FROM {}", columns, self.wrap(&query.table));
        let mut args = Vec::new();

        self.append_wheres(&mut sql, &mut args, &query.wheres);

        if !query.orders.is_empty() {
            let orders = query
                .orders
                .iter()
                .map(|o| format!("{} {}", self.wrap(&o.column), o.direction.as_str()))
                .collect::<Vec<_>>()
                .join(", ");
            sql.push_str(" ORDER BY ");
            sql.push_str(&orders);
        }

        if query.limit > 0 {
            sql.push_str(&format!(" LIMIT {}", query.limit));
        }
        if query.offset > 0 {
            sql.push_str(&format!(" OFFSET {}", query.offset));
        }

        (sql, args)
    }

    fn compile_insert(&self, table: &str, data: &IndexMap<String, Value>) -> (String, Vec<Value>) {
        let mut columns = Vec::with_capacity(data.len());
        let mut placeholders = Vec::with_capacity(data.len());
        let mut args = Vec::with_capacity(data.len());

        for (column, value) in data {
            columns.push(self.wrap(column));
            placeholders.push("?");
            args.push(value.clone());
        }

        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.wrap(table),
            columns.join(", "),
            placeholders.join(", "),
        );
        (sql, args)
    }

    fn compile_update(
        &self,
        table: &str,
        data: &IndexMap<String, Value>,
        wheres: &[WhereClause],
    ) -> (String, Vec<Value>) {
        let mut sets = Vec::with_capacity(data.len());
        let mut args = Vec::with_capacity(data.len() + wheres.len());

        for (column, value) in data {
            sets.push(format!("{} = ?", self.wrap(column)));
            args.push(value.clone());
        }

        let mut sql = format!("UPDATE {} SET {}", self.wrap(table), sets.join(", "));
        self.append_wheres(&mut sql, &mut args, wheres);
        (sql, args)
    }

    fn compile_delete(&self, table: &str, wheres: &[WhereClause]) -> (String, Vec<Value>) {
        let mut sql = format!("DELETE FROM {}", self.wrap(table));
        let mut args = Vec::new();
        self.append_wheres(&mut sql, &mut args, wheres);
        (sql, args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clause::BoolOp;

    fn grammar() -> MySqlGrammar {
        MySqlGrammar::new()
    }

    fn where_clause(column: &str, operator: &str, value: Value, boolean: BoolOp) -> WhereClause {
        WhereClause {
            column: column.to_string(),
            operator: operator.to_string(),
            value,
            boolean,
        }
    }

    #[test]
    fn test_wrap_single_identifier() {
        assert_eq!(grammar().wrap("users"), "`users`");
    }

    #[test]
    fn test_wrap_dotted_identifier() {
        assert_eq!(grammar().wrap("users.id"), "`users`.`id`");
    }

    #[test]
    fn test_wrap_star_passes_through() {
        assert_eq!(grammar().wrap("*"), "*");
    }

    #[test]
    #[should_panic(expected = "invalid SQL identifier")]
    fn test_wrap_rejects_injection() {
        grammar().wrap("users; DROP TABLE users--");
    }

    #[test]
    #[should_panic(expected = "invalid SQL identifier")]
    fn test_wrap_rejects_backtick() {
        grammar().wrap("users`");
    }

    #[test]
    #[should_panic(expected = "invalid SQL identifier")]
    fn test_wrap_rejects_empty_dotted_part() {
        grammar().wrap("users..id");
    }

    #[test]
    #[should_panic(expected = "invalid SQL operator")]
    fn test_operator_outside_whitelist_panics() {
        validate_operator("= 1 OR 1=1 --");
    }

    #[test]
    fn test_operator_normalisation() {
        assert_eq!(validate_operator(" like "), "LIKE");
        assert_eq!(validate_operator("not in"), "NOT IN");
        assert_eq!(validate_operator("="), "=");
    }

    #[test]
    fn test_every_whitelisted_operator_is_accepted() {
        for operator in ALLOWED_OPERATORS {
            assert_eq!(&validate_operator(operator), operator);
        }
    }

    #[test]
    fn test_compile_insert() {
        let mut data = IndexMap::new();
        data.insert("name".to_string(), Value::from("John"));
        data.insert("email".to_string(), Value::from("john@example.com"));

        let (sql, args) = grammar().compile_insert("users", &data);
        assert_eq!(
            sql,
            "INSERT INTO `users` (`name`, `email`) VALUES (?, ?)"
        );
        assert_eq!(
            args,
            vec![Value::from("John"), Value::from("john@example.com")]
        );
    }

    #[test]
    fn test_compile_update_with_where() {
        let mut data = IndexMap::new();
        data.insert("name".to_string(), Value::from("Jane"));

        let wheres = vec![where_clause("id", "=", Value::from(1_i64), BoolOp::And)];
        let (sql, args) = grammar().compile_update("users", &data, &wheres);
        assert_eq!(sql, "UPDATE `users` SET `name` = ? WHERE `id` = ?");
        assert_eq!(args, vec![Value::from("Jane"), Value::from(1_i64)]);
    }

    #[test]
    fn test_compile_delete_without_where() {
        let (sql, args) = grammar().compile_delete("sessions", &[]);
        assert_eq!(sql, "DELETE FROM `sessions`");
        assert!(args.is_empty());
    }

    #[test]
    fn test_first_boolean_never_emitted() {
        // An OR on the first clause must not leak into the SQL.
        let wheres = vec![
            where_clause("a", "=", Value::from(1_i64), BoolOp::Or),
            where_clause("b", "=", Value::from(2_i64), BoolOp::And),
        ];
        let (sql, _) = grammar().compile_delete("t", &wheres);
        assert_eq!(sql, "DELETE FROM `t` WHERE `a` = ? AND `b` = ?");
    }

    #[test]
    fn test_placeholder_count_matches_args() {
        let mut data = IndexMap::new();
        data.insert("a".to_string(), Value::from(1_i64));
        data.insert("b".to_string(), Value::from("x"));
        let wheres = vec![
            where_clause("c", ">", Value::from(5_i64), BoolOp::And),
            where_clause("d", "LIKE", Value::from("%y%"), BoolOp::Or),
        ];

        let (sql, args) = grammar().compile_update("t", &data, &wheres);
        let placeholders = sql.matches('?').count();
        assert_eq!(placeholders, args.len());
    }

    #[test]
    fn test_values_never_appear_in_sql() {
        let payload = "x' OR '1'='1";
        let wheres = vec![where_clause("name", "=", Value::from(payload), BoolOp::And)];
        let (sql, args) = grammar().compile_delete("users", &wheres);

        assert!(!sql.contains(payload));
        assert_eq!(args, vec![Value::from(payload)]);
    }
}
