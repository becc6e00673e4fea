use std::sync::Arc;

use crate::ast::Condition;
use crate::column::Column;
use crate::operator::Operator;
use crate::project::{ActingUser, Plan, PropertyDefinition};
use crate::visitor::Visitor;

/// Constructs a daily history chart cannot evaluate for past dates.
#[derive(Debug, Default)]
pub struct DailyHistoryChartValidations {
    messages: Vec<String>,
}

impl DailyHistoryChartValidations {
    pub fn validate(condition: &Condition) -> Vec<String> {
        let mut validations = Self::default();
        condition.accept(&mut validations);
        validations.messages
    }

    fn push(&mut self, construct: &str) {
        let message = format!("{construct} is not supported in the daily history chart conditions");
        if !self.messages.contains(&message) {
            self.messages.push(message);
        }
    }

    fn absorb_all(&mut self, children: &[Condition]) {
        for child in children {
            for message in Self::validate(child) {
                if !self.messages.contains(&message) {
                    self.messages.push(message);
                }
            }
        }
    }
}

impl Visitor for DailyHistoryChartValidations {
    fn visit_and(&mut self, children: &[Condition]) {
        self.absorb_all(children);
    }

    fn visit_or(&mut self, children: &[Condition]) {
        self.absorb_all(children);
    }

    fn visit_not(&mut self, inner: &Condition) {
        self.absorb_all(std::slice::from_ref(inner));
    }

    fn visit_from_tree(&mut self, _tree_condition: &Condition, others: &[Condition]) {
        self.push("FROM TREE");
        self.absorb_all(others);
    }

    fn visit_today_comparison(&mut self, _column: &Column, _operator: Operator) {
        self.push("TODAY");
    }

    fn visit_this_card_property_comparison(
        &mut self,
        _column: &Column,
        _operator: Operator,
        _property: &Arc<PropertyDefinition>,
    ) {
        self.push("THIS CARD.property");
    }

    fn visit_tagged_with(&mut self, _tag: &str) {
        self.push("TAGGED WITH");
    }

    fn visit_is_current_user(&mut self, _column: &Column, _operator: Operator, _user: &ActingUser) {
        self.push("CURRENT USER");
    }

    fn visit_in_plan(&mut self, _plan: &Arc<Plan>) {
        self.push("IN PLAN");
    }
}
