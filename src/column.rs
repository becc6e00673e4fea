//! What a condition or a SELECT clause refers to.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::{QueryError, QueryResult};
use crate::project::PropertyDefinition;
use crate::visitor::Visitor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateFunction {
    Avg,
    Count,
    Max,
    Min,
    Sum,
}

impl AggregateFunction {
    pub fn name(self) -> &'static str {
        match self {
            AggregateFunction::Avg => "AVG",
            AggregateFunction::Count => "COUNT",
            AggregateFunction::Max => "MAX",
            AggregateFunction::Min => "MIN",
            AggregateFunction::Sum => "SUM",
        }
    }
}

impl FromStr for AggregateFunction {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "avg" => Ok(AggregateFunction::Avg),
            "count" => Ok(AggregateFunction::Count),
            "max" => Ok(AggregateFunction::Max),
            "min" => Ok(AggregateFunction::Min),
            "sum" => Ok(AggregateFunction::Sum),
            other => Err(QueryError::new(format!(
                "{other} is not a valid aggregate function. Valid aggregates are AVG, COUNT, MAX, MIN and SUM"
            ))),
        }
    }
}

impl fmt::Display for AggregateFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn keyword(self) -> &'static str {
        match self {
            SortDirection::Ascending => "ASC",
            SortDirection::Descending => "DESC",
        }
    }
}

/// A column wrapped with ORDER BY metadata.
///
/// `is_default` marks orderings added implicitly; the MQL renderer drops them
/// so a round trip does not grow an ORDER BY the author never wrote.
#[derive(Debug, Clone)]
pub struct OrderByColumn {
    pub column: Box<Column>,
    pub direction: SortDirection,
    pub is_default: bool,
}

#[derive(Debug, Clone)]
pub struct GroupByColumn {
    pub column: Box<Column>,
}

#[derive(Debug, Clone)]
pub enum Column {
    Property(Arc<PropertyDefinition>),
    /// Synthetic numeric card id.
    Id,
    /// `*`, only valid inside `COUNT(*)`.
    Wildcard,
    Aggregate {
        function: AggregateFunction,
        column: Box<Column>,
    },
    OrderBy(OrderByColumn),
    GroupBy(GroupByColumn),
}

impl PartialEq for Column {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Column {
    pub fn property(definition: Arc<PropertyDefinition>) -> Self {
        Column::Property(definition)
    }

    /// Builds an aggregate column, enforcing the aggregate invariants.
    pub fn aggregate(function: &str, column: Column) -> QueryResult<Self> {
        let function: AggregateFunction = function.parse()?;
        match column.undecorated() {
            Column::Wildcard if function != AggregateFunction::Count => {
                return Err(QueryError::new(format!(
                    "{function} is not a valid aggregate with *. Only COUNT(*) is supported"
                )));
            }
            Column::Property(p) if function != AggregateFunction::Count && !p.is_numeric() => {
                return Err(QueryError::new(format!(
                    "Property {} is not numeric, only numeric properties can be aggregated",
                    p.name
                )));
            }
            Column::Aggregate { .. } => {
                return Err(QueryError::new("Aggregates cannot be nested"));
            }
            _ => {}
        }
        Ok(Column::Aggregate {
            function,
            column: Box::new(column),
        })
    }

    pub fn count_all() -> Self {
        Column::Aggregate {
            function: AggregateFunction::Count,
            column: Box::new(Column::Wildcard),
        }
    }

    pub fn order_by(column: Column, direction: SortDirection) -> Self {
        Column::OrderBy(OrderByColumn {
            column: Box::new(column),
            direction,
            is_default: false,
        })
    }

    /// An ordering the query engine adds on its own, e.g. by card number.
    pub fn default_order_by(column: Column) -> Self {
        Column::OrderBy(OrderByColumn {
            column: Box::new(column),
            direction: SortDirection::Ascending,
            is_default: true,
        })
    }

    pub fn group_by(column: Column) -> Self {
        Column::GroupBy(GroupByColumn {
            column: Box::new(column),
        })
    }

    /// The column with order/group decorators removed.
    pub fn undecorated(&self) -> &Column {
        match self {
            Column::OrderBy(o) => o.column.undecorated(),
            Column::GroupBy(g) => g.column.undecorated(),
            other => other,
        }
    }

    /// The property behind the column, looking through decorators and aggregates.
    pub fn property_definition(&self) -> Option<&Arc<PropertyDefinition>> {
        match self.undecorated() {
            Column::Property(p) => Some(p),
            Column::Aggregate { column, .. } => column.property_definition(),
            _ => None,
        }
    }

    pub fn name(&self) -> String {
        match self {
            Column::Property(p) => p.name.clone(),
            Column::Id => "id".to_string(),
            Column::Wildcard => "*".to_string(),
            Column::Aggregate { function, column } => format!("{function}({})", column.name()),
            Column::OrderBy(o) => o.column.name(),
            Column::GroupBy(g) => g.column.name(),
        }
    }

    fn key(&self) -> String {
        match self.undecorated() {
            Column::Property(p) => p.column_name.clone(),
            Column::Aggregate { function, column } => format!("{function}({})", column.key()),
            other => other.name(),
        }
    }

    pub fn is_numeric(&self) -> bool {
        match self.undecorated() {
            Column::Property(p) => p.is_numeric(),
            Column::Id => true,
            Column::Aggregate { .. } => true,
            _ => false,
        }
    }

    pub fn is_date(&self) -> bool {
        self.property_definition().map_or(false, |p| p.is_date())
            && !matches!(self.undecorated(), Column::Aggregate { .. })
    }

    pub fn is_relationship(&self) -> bool {
        matches!(self.undecorated(), Column::Property(p) if p.is_relationship())
    }

    pub fn is_card_type(&self) -> bool {
        matches!(self.undecorated(), Column::Property(p) if p.is_card_type())
    }

    pub fn is_ordinal(&self) -> bool {
        match self.undecorated() {
            Column::Property(p) => p.is_ordinal(),
            Column::Id | Column::Aggregate { .. } => true,
            _ => false,
        }
    }

    /// Double dispatch into the visitor method matching this column's shape.
    pub fn accept<V: Visitor + ?Sized>(&self, visitor: &mut V) {
        match self {
            Column::Property(p) => visitor.visit_column(p),
            Column::Id => visitor.visit_id_column(),
            Column::Wildcard => {}
            Column::Aggregate { function, column } => {
                if matches!(column.undecorated(), Column::Wildcard) {
                    visitor.visit_count_all_aggregate();
                } else {
                    visitor.visit_aggregate_function(*function, column);
                }
            }
            Column::OrderBy(o) => visitor.visit_order_by_column(&o.column, o.direction, o.is_default),
            Column::GroupBy(g) => visitor.visit_group_by_column(&g.column),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::property;

    #[test]
    fn test_aggregate_requires_numeric_column() {
        let status = Column::property(property("Status"));
        let err = Column::aggregate("sum", status).unwrap_err();
        assert!(err.message.contains("not numeric"));

        let size = Column::property(property("Size"));
        assert!(Column::aggregate("SUM", size).is_ok());
    }

    #[test]
    fn test_wildcard_only_with_count() {
        assert!(Column::aggregate("count", Column::Wildcard).is_ok());
        let err = Column::aggregate("avg", Column::Wildcard).unwrap_err();
        assert!(err.message.contains("COUNT(*)"));
    }

    #[test]
    fn test_unknown_aggregate_function() {
        let size = Column::property(property("Size"));
        let err = Column::aggregate("median", size).unwrap_err();
        assert!(err.message.contains("median is not a valid aggregate"));
    }

    #[test]
    fn test_count_of_text_column_is_allowed() {
        let status = Column::property(property("Status"));
        assert!(Column::aggregate("count", status).is_ok());
    }

    #[test]
    fn test_equality_through_decorators() {
        let status = Column::property(property("Status"));
        let ordered = Column::order_by(status.clone(), SortDirection::Descending);
        let grouped = Column::group_by(status.clone());
        assert_eq!(status, ordered);
        assert_eq!(ordered, grouped);
        assert_ne!(status, Column::property(property("Priority")));
    }
}
