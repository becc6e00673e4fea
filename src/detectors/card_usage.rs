//! Finds the specific cards a condition names through relationship properties,
//! e.g. `Release = 'R1'` or `Release NUMBER IN (3, 4)`.
//!
//! Only simple equality forms are understood; anything else is skipped, so the
//! result is a best-effort filter used when a card is renamed or deleted.

use crate::ast::{Condition, InValue};
use crate::column::Column;
use crate::operator::Operator;
use crate::project::{ContentProvider, QueryContext};
use crate::visitor::Visitor;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CardReference {
    Number(String),
    Name(String),
}

impl CardReference {
    fn matches(&self, card: &ContentProvider) -> bool {
        match self {
            CardReference::Number(number) => number.parse::<i64>().map_or(false, |n| n == card.number),
            CardReference::Name(name) => name.eq_ignore_ascii_case(card.name.trim()),
        }
    }
}

#[derive(Debug, Default)]
pub struct CardUsageDetector {
    references: Vec<CardReference>,
}

impl CardUsageDetector {
    pub fn detect(condition: &Condition) -> Self {
        let mut detector = Self::default();
        condition.accept(&mut detector);
        detector
    }

    pub fn references(&self) -> &[CardReference] {
        &self.references
    }

    /// Whether the card is one of the referenced cards.
    pub fn uses_card(&self, card: &ContentProvider) -> bool {
        self.references.iter().any(|r| r.matches(card))
    }

    /// OR-joined predicate over `cards` selecting the referenced cards.
    pub fn to_sql(&self, ctx: &QueryContext<'_>) -> Option<String> {
        if self.references.is_empty() {
            return None;
        }
        let schema = ctx.schema;
        let fragments: Vec<String> = self
            .references
            .iter()
            .map(|reference| match reference {
                CardReference::Number(number) => {
                    format!("{} = {number}", schema.card_column("number"))
                }
                CardReference::Name(name) => format!(
                    "LOWER({}) = {}",
                    schema.card_column("name"),
                    schema.dialect.quote_value(name.to_lowercase())
                ),
            })
            .collect();
        Some(fragments.join(" OR "))
    }

    fn add(&mut self, reference: CardReference) {
        if !self.references.contains(&reference) {
            self.references.push(reference);
        }
    }

    fn absorb_all(&mut self, children: &[Condition]) {
        for child in children {
            for reference in Self::detect(child).references {
                self.add(reference);
            }
        }
    }
}

impl Visitor for CardUsageDetector {
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

    fn visit_comparison_with_value(&mut self, column: &Column, operator: Operator, value: &str) {
        if column.is_relationship() && operator == Operator::Equals {
            self.add(CardReference::Name(value.trim().to_string()));
        }
    }

    fn visit_comparison_with_number(&mut self, column: &Column, operator: Operator, number: &str) {
        if column.is_relationship() && operator == Operator::Equals {
            self.add(CardReference::Number(number.to_string()));
        }
    }

    fn visit_explicit_in(&mut self, column: &Column, values: &[InValue]) {
        if !column.is_relationship() {
            return;
        }
        for value in values {
            if let InValue::Literal(name) = value {
                if !name.trim().is_empty() {
                    self.add(CardReference::Name(name.trim().to_string()));
                }
            }
        }
    }

    fn visit_numbers_explicit_in(&mut self, column: &Column, numbers: &[String]) {
        if column.is_relationship() {
            for number in numbers {
                self.add(CardReference::Number(number.clone()));
            }
        }
    }
}
