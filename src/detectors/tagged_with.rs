use std::collections::HashSet;

use crate::ast::{CardQuery, Condition};
use crate::column::Column;
use crate::visitor::Visitor;

/// Tags a condition requires, and tags it requires to be absent.
#[derive(Debug, Default)]
pub struct TaggedWithDetector {
    tagged: HashSet<String>,
    not_tagged: HashSet<String>,
}

impl TaggedWithDetector {
    pub fn detect(condition: &Condition) -> Self {
        let mut detector = Self::default();
        condition.accept(&mut detector);
        detector
    }

    pub fn tagged(&self) -> &HashSet<String> {
        &self.tagged
    }

    pub fn not_tagged(&self) -> &HashSet<String> {
        &self.not_tagged
    }

    pub fn uses(&self, tag: &str) -> bool {
        self.tagged
            .iter()
            .chain(self.not_tagged.iter())
            .any(|t| t.eq_ignore_ascii_case(tag))
    }

    fn absorb_all(&mut self, children: &[Condition]) {
        for child in children {
            let detector = Self::detect(child);
            self.tagged.extend(detector.tagged);
            self.not_tagged.extend(detector.not_tagged);
        }
    }
}

impl Visitor for TaggedWithDetector {
    fn visit_and(&mut self, children: &[Condition]) {
        self.absorb_all(children);
    }

    fn visit_or(&mut self, children: &[Condition]) {
        self.absorb_all(children);
    }

    fn visit_not(&mut self, inner: &Condition) {
        let negated = Self::detect(inner);
        self.tagged.extend(negated.not_tagged);
        self.not_tagged.extend(negated.tagged);
    }

    fn visit_from_tree(&mut self, _tree_condition: &Condition, others: &[Condition]) {
        self.absorb_all(others);
    }

    fn visit_implicit_in(&mut self, _column: &Column, query: &CardQuery) {
        self.absorb_all(std::slice::from_ref(&query.conditions));
    }

    fn visit_tagged_with(&mut self, tag: &str) {
        self.tagged.insert(tag.to_string());
    }
}
