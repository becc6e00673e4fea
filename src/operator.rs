//! Comparison operators shared by the SQL and MQL renderers.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{QueryError, QueryResult};

/// 比较运算符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Equals,         // =
    NotEquals,      // !=
    LessThan,       // <
    GreaterThan,    // >
    LessOrEqual,    // <=
    GreaterOrEqual, // >=
    In,             // IN
}

impl Operator {
    pub fn sql_symbol(self) -> &'static str {
        match self {
            Operator::Equals => "=",
            Operator::NotEquals => "<>",
            Operator::LessThan => "<",
            Operator::GreaterThan => ">",
            Operator::LessOrEqual => "<=",
            Operator::GreaterOrEqual => ">=",
            Operator::In => "IN",
        }
    }

    pub fn mql_token(self) -> &'static str {
        match self {
            Operator::Equals => "=",
            Operator::NotEquals => "!=",
            Operator::LessThan => "<",
            Operator::GreaterThan => ">",
            Operator::LessOrEqual => "<=",
            Operator::GreaterOrEqual => ">=",
            Operator::In => "IN",
        }
    }

    /// Operators that only make sense on columns with an ordering.
    pub fn is_ordinal(self) -> bool {
        matches!(
            self,
            Operator::LessThan
                | Operator::GreaterThan
                | Operator::LessOrEqual
                | Operator::GreaterOrEqual
        )
    }

    pub fn is_equality(self) -> bool {
        matches!(self, Operator::Equals | Operator::In)
    }

    /// The operator that selects exactly the complement (ignoring NULLs).
    pub fn opposite(self) -> Operator {
        match self {
            Operator::Equals => Operator::NotEquals,
            Operator::NotEquals => Operator::Equals,
            Operator::LessThan => Operator::GreaterOrEqual,
            Operator::GreaterOrEqual => Operator::LessThan,
            Operator::GreaterThan => Operator::LessOrEqual,
            Operator::LessOrEqual => Operator::GreaterThan,
            Operator::In => Operator::NotEquals,
        }
    }

    pub fn from_mql_token(token: &str) -> QueryResult<Operator> {
        match token.trim().to_ascii_uppercase().as_str() {
            "=" | "IS" => Ok(Operator::Equals),
            "!=" | "<>" | "IS NOT" => Ok(Operator::NotEquals),
            "<" => Ok(Operator::LessThan),
            ">" => Ok(Operator::GreaterThan),
            "<=" => Ok(Operator::LessOrEqual),
            ">=" => Ok(Operator::GreaterOrEqual),
            "IN" => Ok(Operator::In),
            other => Err(QueryError::new(format!(
                "{other} is not a recognized operator"
            ))),
        }
    }

    /// Applies the operator to two already-ordered positions.
    pub(crate) fn compare_positions(self, left: usize, right: usize) -> bool {
        match self {
            Operator::Equals | Operator::In => left == right,
            Operator::NotEquals => left != right,
            Operator::LessThan => left < right,
            Operator::GreaterThan => left > right,
            Operator::LessOrEqual => left <= right,
            Operator::GreaterOrEqual => left >= right,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mql_token())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opposites() {
        assert_eq!(Operator::Equals.opposite(), Operator::NotEquals);
        assert_eq!(Operator::NotEquals.opposite(), Operator::Equals);
        assert_eq!(Operator::LessThan.opposite(), Operator::GreaterOrEqual);
        assert_eq!(Operator::GreaterThan.opposite(), Operator::LessOrEqual);
        assert_eq!(Operator::In.opposite(), Operator::NotEquals);
    }

    #[test]
    fn test_classification() {
        assert!(Operator::LessOrEqual.is_ordinal());
        assert!(!Operator::Equals.is_ordinal());
        assert!(Operator::In.is_equality());
        assert!(!Operator::NotEquals.is_equality());
    }

    #[test]
    fn test_tokens() {
        assert_eq!(Operator::NotEquals.sql_symbol(), "<>");
        assert_eq!(Operator::NotEquals.mql_token(), "!=");
        assert_eq!(Operator::from_mql_token(">=").unwrap(), Operator::GreaterOrEqual);
        assert_eq!(Operator::from_mql_token("is not").unwrap(), Operator::NotEquals);
        assert!(Operator::from_mql_token("~").is_err());
    }
}
