use std::collections::HashSet;
use std::sync::Arc;

use crate::ast::{CardQuery, Condition, InValue};
use crate::column::Column;
use crate::operator::Operator;
use crate::project::ProjectVariable;
use crate::visitor::Visitor;

/// Card type names a condition mentions, split by polarity.
///
/// `NOT` swaps the two sets of its subtree, so `NOT Type = 'Bug'` excludes Bug
/// and a double negation includes it again.
#[derive(Debug, Default)]
pub struct CardTypeDetector {
    included: HashSet<String>,
    excluded: HashSet<String>,
}

impl CardTypeDetector {
    pub fn detect(condition: &Condition) -> Self {
        let mut detector = Self::default();
        condition.accept(&mut detector);
        detector
    }

    pub fn included(&self) -> &HashSet<String> {
        &self.included
    }

    pub fn excluded(&self) -> &HashSet<String> {
        &self.excluded
    }

    /// Whether the card type is referenced at all, in either polarity.
    pub fn uses(&self, card_type: &str) -> bool {
        self.included
            .iter()
            .chain(self.excluded.iter())
            .any(|t| t.eq_ignore_ascii_case(card_type))
    }

    fn absorb(&mut self, other: CardTypeDetector) {
        self.included.extend(other.included);
        self.excluded.extend(other.excluded);
    }

    fn record(&mut self, operator: Operator, name: &str) {
        if name.trim().is_empty() {
            return;
        }
        match operator {
            Operator::NotEquals => self.excluded.insert(name.to_string()),
            _ => self.included.insert(name.to_string()),
        };
    }
}

impl Visitor for CardTypeDetector {
    fn visit_and(&mut self, children: &[Condition]) {
        for child in children {
            self.absorb(CardTypeDetector::detect(child));
        }
    }

    fn visit_or(&mut self, children: &[Condition]) {
        self.visit_and(children);
    }

    fn visit_not(&mut self, inner: &Condition) {
        let negated = CardTypeDetector::detect(inner);
        self.included.extend(negated.excluded);
        self.excluded.extend(negated.included);
    }

    fn visit_from_tree(&mut self, tree_condition: &Condition, others: &[Condition]) {
        self.absorb(CardTypeDetector::detect(tree_condition));
        self.visit_and(others);
    }

    fn visit_comparison_with_value(&mut self, column: &Column, operator: Operator, value: &str) {
        if column.is_card_type() && !operator.is_ordinal() {
            self.record(operator, value);
        }
    }

    fn visit_comparison_with_project_variable(
        &mut self,
        column: &Column,
        operator: Operator,
        variable: &Arc<ProjectVariable>,
    ) {
        if let (true, Some(value)) = (column.is_card_type(), variable.value.as_deref()) {
            if !operator.is_ordinal() {
                self.record(operator, value);
            }
        }
    }

    fn visit_explicit_in(&mut self, column: &Column, values: &[InValue]) {
        if !column.is_card_type() {
            return;
        }
        for value in values {
            match value {
                InValue::Literal(name) => self.record(Operator::Equals, name),
                InValue::Variable(variable) => {
                    if let Some(name) = variable.value.as_deref() {
                        self.record(Operator::Equals, name);
                    }
                }
            }
        }
    }

    fn visit_implicit_in(&mut self, _column: &Column, query: &CardQuery) {
        self.absorb(CardTypeDetector::detect(&query.conditions));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::builder_fixture;

    fn set(names: &[&str]) -> HashSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_negated_in_is_excluded() {
        let fixture = builder_fixture();
        let b = fixture.builder();
        let in_list = b.explicit_in("Type", &["Story", "Bug"]).unwrap();

        let negated = CardTypeDetector::detect(&Condition::negate(in_list.clone()));
        assert!(negated.included().is_empty());
        assert_eq!(negated.excluded(), &set(&["Story", "Bug"]));

        let twice = CardTypeDetector::detect(&Condition::negate(Condition::negate(in_list)));
        assert_eq!(twice.included(), &set(&["Story", "Bug"]));
        assert!(twice.excluded().is_empty());
    }

    #[test]
    fn test_not_equals_and_nesting() {
        let fixture = builder_fixture();
        let b = fixture.builder();
        let condition = Condition::and(vec![
            b.comparison_with_value("Type", Operator::NotEquals, "Bug").unwrap(),
            Condition::or(vec![
                b.comparison_with_value("Type", Operator::Equals, "Story").unwrap(),
                b.comparison_with_value("Status", Operator::Equals, "Open").unwrap(),
            ]),
        ]);
        let detector = CardTypeDetector::detect(&condition);
        assert_eq!(detector.included(), &set(&["Story"]));
        assert_eq!(detector.excluded(), &set(&["Bug"]));
        assert!(detector.uses("story"));
        assert!(detector.uses("BUG"));
        assert!(!detector.uses("Release"));
    }

    #[test]
    fn test_duplicates_collapse() {
        let fixture = builder_fixture();
        let b = fixture.builder();
        let story = b.comparison_with_value("Type", Operator::Equals, "Story").unwrap();
        let condition = Condition::or(vec![story.clone(), story.clone(), story]);
        assert_eq!(CardTypeDetector::detect(&condition).included().len(), 1);
    }

    #[test]
    fn test_subquery_types_are_used() {
        let fixture = builder_fixture();
        let b = fixture.builder();
        let sub = CardQuery {
            columns: vec![b.column("Release").unwrap()],
            ..CardQuery::conditions_only(
                b.comparison_with_value("Type", Operator::NotEquals, "Bug").unwrap(),
            )
        };
        let condition = Condition::negate(b.implicit_in("Release", sub).unwrap());
        let detector = CardTypeDetector::detect(&condition);
        assert!(detector.uses("Bug"));
        assert_eq!(detector.included(), &set(&["Bug"]));
    }
}
