use std::collections::HashSet;
use std::sync::Arc;

use crate::ast::{CardQuery, Condition, InValue};
use crate::column::Column;
use crate::operator::Operator;
use crate::project::ProjectVariable;
use crate::visitor::Visitor;

/// Project variables a condition compares against.
#[derive(Debug, Default)]
pub struct ProjectVariableDetector {
    variables: HashSet<Arc<ProjectVariable>>,
}

impl ProjectVariableDetector {
    pub fn detect(condition: &Condition) -> Self {
        let mut detector = Self::default();
        condition.accept(&mut detector);
        detector
    }

    pub fn variables(&self) -> &HashSet<Arc<ProjectVariable>> {
        &self.variables
    }

    pub fn uses(&self, name: &str) -> bool {
        self.variables.iter().any(|v| v.name.eq_ignore_ascii_case(name))
    }

    fn absorb_all(&mut self, children: &[Condition]) {
        for child in children {
            self.variables.extend(Self::detect(child).variables);
        }
    }
}

impl Visitor for ProjectVariableDetector {
    fn visit_and(&mut self, children: &[Condition]) {
        self.absorb_all(children);
    }

    fn visit_or(&mut self, children: &[Condition]) {
        self.absorb_all(children);
    }

    fn visit_not(&mut self, inner: &Condition) {
        self.variables.extend(Self::detect(inner).variables);
    }

    fn visit_from_tree(&mut self, _tree_condition: &Condition, others: &[Condition]) {
        self.absorb_all(others);
    }

    fn visit_comparison_with_project_variable(
        &mut self,
        _column: &Column,
        _operator: Operator,
        variable: &Arc<ProjectVariable>,
    ) {
        self.variables.insert(Arc::clone(variable));
    }

    fn visit_explicit_in(&mut self, _column: &Column, values: &[InValue]) {
        for value in values {
            if let InValue::Variable(variable) = value {
                self.variables.insert(Arc::clone(variable));
            }
        }
    }

    fn visit_implicit_in(&mut self, _column: &Column, query: &CardQuery) {
        self.variables.extend(Self::detect(&query.conditions).variables);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::builder_fixture;

    #[test]
    fn test_variables_from_comparisons_and_lists() {
        let fixture = builder_fixture();
        let b = fixture.builder();
        let condition = Condition::and(vec![
            b.comparison_with_project_variable("Release", Operator::Equals, "Current Release")
                .unwrap(),
            Condition::negate(
                b.explicit_in_values(
                    "Status",
                    vec![
                        InValue::Literal("Open".into()),
                        b.in_value_variable("default status").unwrap(),
                    ],
                )
                .unwrap(),
            ),
            b.comparison_with_project_variable("Status", Operator::Equals, "Default Status")
                .unwrap(),
        ]);
        let detector = ProjectVariableDetector::detect(&condition);
        assert_eq!(detector.variables().len(), 2);
        assert!(detector.uses("CURRENT RELEASE"));
        assert!(detector.uses("Default Status"));
        assert!(!detector.uses("Unset Status"));
    }
}
