use crate::ast::Condition;
use crate::visitor::Visitor;

/// Whether any branch of a condition contains a node the predicate accepts.
///
/// Stops descending as soon as a match is found.
pub struct ConditionDetection<'p> {
    predicate: &'p dyn Fn(&Condition) -> bool,
    found: bool,
}

impl<'p> ConditionDetection<'p> {
    pub fn new(predicate: &'p dyn Fn(&Condition) -> bool) -> Self {
        Self {
            predicate,
            found: false,
        }
    }

    pub fn detect(mut self, condition: &Condition) -> bool {
        if (self.predicate)(condition) {
            return true;
        }
        condition.accept(&mut self);
        self.found
    }

    fn search(&mut self, children: &[Condition]) {
        self.found = children
            .iter()
            .any(|child| ConditionDetection::new(self.predicate).detect(child));
    }
}

impl Visitor for ConditionDetection<'_> {
    fn visit_and(&mut self, children: &[Condition]) {
        self.search(children);
    }

    fn visit_or(&mut self, children: &[Condition]) {
        self.search(children);
    }

    fn visit_not(&mut self, inner: &Condition) {
        self.search(std::slice::from_ref(inner));
    }

    fn visit_from_tree(&mut self, tree_condition: &Condition, others: &[Condition]) {
        self.search(std::slice::from_ref(tree_condition));
        if !self.found {
            self.search(others);
        }
    }
}

pub fn contains_condition(condition: &Condition, predicate: impl Fn(&Condition) -> bool) -> bool {
    ConditionDetection::new(&predicate).detect(condition)
}

/// `THIS CARD` in any form.
pub fn uses_this_card(condition: &Condition) -> bool {
    contains_condition(condition, |c| {
        matches!(
            c,
            Condition::ComparisonWithThisCard { .. } | Condition::ComparisonWithThisCardProperty { .. }
        )
    })
}
