use crate::ast::{CardQuery, Condition, InValue};
use crate::column::Column;
use crate::error::{QueryError, QueryResult};
use crate::operator::Operator;
use crate::project::ActingUser;
use crate::visitor::Visitor;

const CURRENT_USER: &str = "CURRENT USER";
const TODAY: &str = "TODAY";

/// Flags reserved words written as plain values, e.g. `Owner = 'CURRENT USER'`.
#[derive(Debug, Default)]
pub struct MqlAuxiliaryValidations {
    messages: Vec<String>,
}

impl MqlAuxiliaryValidations {
    pub fn validate(condition: &Condition) -> Vec<String> {
        let mut validations = Self::default();
        condition.accept(&mut validations);
        validations.messages
    }

    /// Fails with every message joined when anything was flagged.
    pub fn ensure_valid(condition: &Condition) -> QueryResult<()> {
        let messages = Self::validate(condition);
        if messages.is_empty() {
            Ok(())
        } else {
            Err(QueryError::new(messages.join(" ")))
        }
    }

    fn push(&mut self, message: String) {
        if !self.messages.contains(&message) {
            self.messages.push(message);
        }
    }

    fn absorb_all(&mut self, children: &[Condition]) {
        for child in children {
            for message in Self::validate(child) {
                self.push(message);
            }
        }
    }

    /// Only user properties have an IS CURRENT USER form and only date
    /// properties a TODAY form; elsewhere the words are ordinary values.
    fn check_literal(&mut self, column: &Column, value: &str) {
        let value = value.trim();
        let is_user = column.property_definition().map_or(false, |p| p.is_user());
        if is_user && value.eq_ignore_ascii_case(CURRENT_USER) {
            self.push(format!(
                "{} is a reserved word and cannot be used as a value of {}. Use {} IS CURRENT USER to compare with the current user",
                quote(value),
                column.name(),
                column.name()
            ));
        } else if column.is_date() && value.eq_ignore_ascii_case(TODAY) {
            self.push(format!(
                "{} is a reserved word and cannot be used as a value of {}. Use {} = TODAY without quotes to compare with today's date",
                quote(value),
                column.name(),
                column.name()
            ));
        }
    }
}

fn quote(value: &str) -> String {
    format!("'{value}'")
}

impl Visitor for MqlAuxiliaryValidations {
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
        self.absorb_all(others);
    }

    fn visit_comparison_with_value(&mut self, column: &Column, _operator: Operator, value: &str) {
        self.check_literal(column, value);
    }

    fn visit_explicit_in(&mut self, column: &Column, values: &[InValue]) {
        for value in values {
            if let InValue::Literal(literal) = value {
                self.check_literal(column, literal);
            }
        }
    }

    fn visit_implicit_in(&mut self, _column: &Column, query: &CardQuery) {
        self.absorb_all(std::slice::from_ref(&query.conditions));
    }

    fn visit_is_current_user(&mut self, column: &Column, operator: Operator, _user: &ActingUser) {
        if !matches!(operator, Operator::Equals | Operator::NotEquals) {
            self.push(format!(
                "{} cannot be compared with CURRENT USER using {}",
                column.name(),
                operator.mql_token()
            ));
        }
    }
}
