pub mod ast;
pub mod builder;
pub mod column;
pub mod config;
pub mod detectors;
pub mod error;
pub mod mql;
pub mod operator;
pub mod project;
pub mod sql_compiler;
pub mod validation;
pub mod visitor;

#[cfg(test)]
pub(crate) mod test_support;

pub use ast::{CardQuery, Condition, InValue};
pub use builder::{ConditionBuilder, IntoColumn};
pub use column::{AggregateFunction, Column, SortDirection};
pub use error::{QueryError, QueryResult};
pub use operator::Operator;
pub use visitor::Visitor;
