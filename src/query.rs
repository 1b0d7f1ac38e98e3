use crate::error::{Error, Result};
use sqlparser::ast;
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use std::fmt;

/// The text of a query to analyze, trimmed of surrounding whitespace and trailing semicolons so it
/// can be embedded in an `EXPLAIN`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    text: String,
}

impl Query {
    /// Wraps the text as is, without checking it.
    pub fn new(text: &str) -> Self {
        Self {
            text: text.trim().trim_end_matches(';').trim_end().to_string(),
        }
    }

    /// Checks that the text is exactly one read-only query before wrapping it. Statements that
    /// could write, such as `SELECT ... INTO`, are rejected.
    pub fn parse(text: &str) -> Result<Self> {
        let query = Self::new(text);
        if query.text.is_empty() {
            return Err(Error::InvalidQuery("query is empty".to_string()));
        }

        let stmts = Parser::parse_sql(&PostgreSqlDialect {}, &query.text)
            .map_err(|err| {
                Error::InvalidQuery(format!(
                    "{} (skip validation with --no-validate to let the planner decide)",
                    err
                ))
            })?;
        let stmt = match stmts.as_slice() {
            [stmt] => stmt,
            _ => {
                return Err(Error::InvalidQuery(format!(
                    "expected one statement, found {}",
                    stmts.len()
                )))
            }
        };

        match stmt {
            ast::Statement::Query(body) => {
                if let ast::SetExpr::Select(select) = body.body.as_ref() {
                    if select.into.is_some() {
                        return Err(Error::InvalidQuery(
                            "SELECT ... INTO creates a table".to_string(),
                        ));
                    }
                }
                Ok(query)
            }
            _ => Err(Error::InvalidQuery(format!("not a query: {}", stmt))),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_normalize() {
        assert_eq!(
            Query::new("  select * from orders ;\n").as_str(),
            "select * from orders"
        );
    }

    #[test]
    fn test_parse_select() {
        let query = Query::parse(
            "select c.c_name, sum(o.o_totalprice) from customer c, orders o \
             where c.c_custkey = o.o_custkey group by c.c_name;",
        )
        .unwrap();
        assert!(query.as_str().ends_with("group by c.c_name"));
    }

    #[test]
    fn test_unparsed_query_suggests_skipping_validation() {
        match Query::parse("table orders") {
            Err(Error::InvalidQuery(msg)) => assert!(msg.contains("--no-validate"), "{}", msg),
            other => panic!("expected InvalidQuery, got {:?}", other),
        }
        assert_eq!(Query::new("table orders;").as_str(), "table orders");
    }

    #[test]
    fn test_parse_rejects_writes() {
        for sql in [
            "delete from orders",
            "update orders set o_totalprice = 0",
            "select * into copy from orders",
            "select 1; select 2",
            "",
            "selec * from orders",
        ] {
            assert!(
                matches!(Query::parse(sql), Err(Error::InvalidQuery(_))),
                "{}",
                sql
            );
        }
    }
}
