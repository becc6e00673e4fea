//! Double-dispatch protocol over the condition tree.
//!
//! Every node's `accept` calls exactly one of these methods and hands over the
//! node's fields rather than the node itself. All methods default to doing
//! nothing, so a consumer only implements the node kinds it cares about.

use std::sync::Arc;

use crate::ast::{CardQuery, Condition, InValue};
use crate::column::{AggregateFunction, Column, SortDirection};
use crate::operator::Operator;
use crate::project::{ActingUser, Plan, ProjectVariable, PropertyDefinition, TreeConfiguration};

pub trait Visitor {
    fn visit_and(&mut self, _children: &[Condition]) {}
    fn visit_or(&mut self, _children: &[Condition]) {}
    fn visit_not(&mut self, _inner: &Condition) {}
    fn visit_from_tree(&mut self, _tree_condition: &Condition, _others: &[Condition]) {}

    fn visit_comparison_with_value(&mut self, _column: &Column, _operator: Operator, _value: &str) {}
    fn visit_comparison_with_number(&mut self, _column: &Column, _operator: Operator, _number: &str) {}
    fn visit_comparison_with_column(&mut self, _left: &Column, _operator: Operator, _right: &Column) {}
    fn visit_comparison_with_project_variable(
        &mut self,
        _column: &Column,
        _operator: Operator,
        _variable: &Arc<ProjectVariable>,
    ) {
    }
    fn visit_today_comparison(&mut self, _column: &Column, _operator: Operator) {}
    fn visit_this_card_comparison(&mut self, _column: &Column, _operator: Operator) {}
    fn visit_this_card_property_comparison(
        &mut self,
        _column: &Column,
        _operator: Operator,
        _property: &Arc<PropertyDefinition>,
    ) {
    }

    fn visit_explicit_in(&mut self, _column: &Column, _values: &[InValue]) {}
    fn visit_numbers_explicit_in(&mut self, _column: &Column, _numbers: &[String]) {}
    fn visit_implicit_in(&mut self, _column: &Column, _query: &CardQuery) {}

    fn visit_tagged_with(&mut self, _tag: &str) {}
    fn visit_is_null(&mut self, _column: &Column) {}
    fn visit_is_current_user(&mut self, _column: &Column, _operator: Operator, _user: &ActingUser) {}
    fn visit_in_tree(&mut self, _tree: &Arc<TreeConfiguration>) {}
    fn visit_in_plan(&mut self, _plan: &Arc<Plan>) {}

    // Column shapes, reached through `CardQuery::accept`.
    fn visit_column(&mut self, _property: &Arc<PropertyDefinition>) {}
    fn visit_id_column(&mut self) {}
    fn visit_group_by_column(&mut self, _column: &Column) {}
    fn visit_order_by_column(&mut self, _column: &Column, _direction: SortDirection, _is_default: bool) {}
    fn visit_count_all_aggregate(&mut self) {}
    fn visit_aggregate_function(&mut self, _function: AggregateFunction, _column: &Column) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{builder_fixture, property};

    #[derive(Default)]
    struct Trace(Vec<&'static str>);

    impl Visitor for Trace {
        fn visit_and(&mut self, _children: &[Condition]) {
            self.0.push("and");
        }
        fn visit_comparison_with_value(&mut self, _column: &Column, _operator: Operator, _value: &str) {
            self.0.push("comparison_with_value");
        }
        fn visit_is_null(&mut self, _column: &Column) {
            self.0.push("is_null");
        }
        fn visit_column(&mut self, _property: &Arc<PropertyDefinition>) {
            self.0.push("column");
        }
        fn visit_count_all_aggregate(&mut self) {
            self.0.push("count_all");
        }
        fn visit_order_by_column(&mut self, _column: &Column, _direction: SortDirection, _is_default: bool) {
            self.0.push("order_by");
        }
    }

    #[test]
    fn test_accept_dispatches_only_the_matching_method() {
        let mut trace = Trace::default();
        Condition::IsNull(Column::property(property("Status"))).accept(&mut trace);
        assert_eq!(trace.0, ["is_null"]);

        let mut trace = Trace::default();
        let fixture = builder_fixture();
        let b = fixture.builder();
        let and = Condition::and(vec![
            b.comparison_with_value("Status", Operator::Equals, "Open").unwrap(),
            b.comparison_with_value("Status", Operator::Equals, "").unwrap(),
        ]);
        and.accept(&mut trace);
        // children are left to the visitor
        assert_eq!(trace.0, ["and"]);
    }

    #[test]
    fn test_query_accept_visits_clauses_in_order() {
        let query = CardQuery {
            columns: vec![Column::property(property("Status")), Column::count_all()],
            conditions: Condition::IsNull(Column::property(property("Owner"))),
            group_by: vec![],
            order_by: vec![Column::order_by(
                Column::property(property("Status")),
                SortDirection::Ascending,
            )],
            as_of: None,
        };
        let mut trace = Trace::default();
        query.accept(&mut trace);
        assert_eq!(trace.0, ["column", "count_all", "is_null", "order_by"]);
    }
}
