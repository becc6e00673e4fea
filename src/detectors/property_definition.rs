use std::collections::HashSet;
use std::sync::Arc;

use crate::ast::{CardQuery, Condition, InValue};
use crate::column::{AggregateFunction, Column, SortDirection};
use crate::operator::Operator;
use crate::project::{ActingUser, ProjectVariable, PropertyDefinition};
use crate::visitor::Visitor;

/// Every property definition a condition or query refers to.
#[derive(Debug, Default)]
pub struct PropertyDefinitionDetector {
    properties: HashSet<Arc<PropertyDefinition>>,
}

impl PropertyDefinitionDetector {
    pub fn detect(condition: &Condition) -> Self {
        let mut detector = Self::default();
        condition.accept(&mut detector);
        detector
    }

    /// Includes SELECT, GROUP BY and ORDER BY columns.
    pub fn detect_query(query: &CardQuery) -> Self {
        let mut detector = Self::default();
        query.accept(&mut detector);
        detector
    }

    pub fn properties(&self) -> &HashSet<Arc<PropertyDefinition>> {
        &self.properties
    }

    pub fn uses(&self, name: &str) -> bool {
        self.properties.iter().any(|p| p.name.eq_ignore_ascii_case(name))
    }

    fn add(&mut self, column: &Column) {
        if let Some(property) = column.property_definition() {
            self.properties.insert(Arc::clone(property));
        }
    }

    fn absorb_all(&mut self, children: &[Condition]) {
        for child in children {
            self.properties.extend(Self::detect(child).properties);
        }
    }
}

impl Visitor for PropertyDefinitionDetector {
    fn visit_and(&mut self, children: &[Condition]) {
        self.absorb_all(children);
    }

    fn visit_or(&mut self, children: &[Condition]) {
        self.absorb_all(children);
    }

    fn visit_not(&mut self, inner: &Condition) {
        self.properties.extend(Self::detect(inner).properties);
    }

    fn visit_from_tree(&mut self, _tree_condition: &Condition, others: &[Condition]) {
        self.absorb_all(others);
    }

    fn visit_comparison_with_value(&mut self, column: &Column, _operator: Operator, _value: &str) {
        self.add(column);
    }

    fn visit_comparison_with_number(&mut self, column: &Column, _operator: Operator, _number: &str) {
        self.add(column);
    }

    fn visit_comparison_with_column(&mut self, left: &Column, _operator: Operator, right: &Column) {
        self.add(left);
        self.add(right);
    }

    fn visit_comparison_with_project_variable(
        &mut self,
        column: &Column,
        _operator: Operator,
        _variable: &Arc<ProjectVariable>,
    ) {
        self.add(column);
    }

    fn visit_today_comparison(&mut self, column: &Column, _operator: Operator) {
        self.add(column);
    }

    fn visit_this_card_comparison(&mut self, column: &Column, _operator: Operator) {
        self.add(column);
    }

    fn visit_this_card_property_comparison(
        &mut self,
        column: &Column,
        _operator: Operator,
        property: &Arc<PropertyDefinition>,
    ) {
        self.add(column);
        self.properties.insert(Arc::clone(property));
    }

    fn visit_explicit_in(&mut self, column: &Column, _values: &[InValue]) {
        self.add(column);
    }

    fn visit_numbers_explicit_in(&mut self, column: &Column, _numbers: &[String]) {
        self.add(column);
    }

    fn visit_implicit_in(&mut self, column: &Column, query: &CardQuery) {
        self.add(column);
        self.properties.extend(Self::detect_query(query).properties);
    }

    fn visit_is_null(&mut self, column: &Column) {
        self.add(column);
    }

    fn visit_is_current_user(&mut self, column: &Column, _operator: Operator, _user: &ActingUser) {
        self.add(column);
    }

    fn visit_column(&mut self, property: &Arc<PropertyDefinition>) {
        self.properties.insert(Arc::clone(property));
    }

    fn visit_group_by_column(&mut self, column: &Column) {
        self.add(column);
    }

    fn visit_order_by_column(&mut self, column: &Column, _direction: SortDirection, _is_default: bool) {
        self.add(column);
    }

    fn visit_aggregate_function(&mut self, _function: AggregateFunction, column: &Column) {
        self.add(column);
    }
}
