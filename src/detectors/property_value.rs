use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use crate::ast::{CardQuery, Condition, InValue};
use crate::column::Column;
use crate::operator::Operator;
use crate::project::PropertyDefinition;
use crate::visitor::Visitor;

/// A concrete value a condition selects for a property.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PropertyValue {
    pub property: Arc<PropertyDefinition>,
    pub value: String,
}

/// Values selected by `=` or `IN` on enumerated and user properties.
#[derive(Debug, Default)]
pub struct PropertyValueDetector {
    values: HashSet<PropertyValue>,
}

impl PropertyValueDetector {
    pub fn detect(condition: &Condition) -> Self {
        let mut detector = Self::default();
        condition.accept(&mut detector);
        detector
    }

    pub fn values(&self) -> &HashSet<PropertyValue> {
        &self.values
    }

    /// Property name to its referenced values, values sorted.
    pub fn grouped(&self) -> BTreeMap<String, Vec<String>> {
        let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for pv in &self.values {
            grouped
                .entry(pv.property.name.clone())
                .or_default()
                .push(pv.value.clone());
        }
        for values in grouped.values_mut() {
            values.sort();
        }
        grouped
    }

    pub fn uses(&self, property: &str, value: &str) -> bool {
        self.values.iter().any(|pv| {
            pv.property.name.eq_ignore_ascii_case(property) && pv.value.eq_ignore_ascii_case(value)
        })
    }

    fn tracked(column: &Column) -> Option<&Arc<PropertyDefinition>> {
        match column.undecorated() {
            Column::Property(p) if p.is_enumerated() || p.is_user() => Some(p),
            _ => None,
        }
    }

    fn add(&mut self, property: &Arc<PropertyDefinition>, value: &str) {
        let value = value.trim();
        if !value.is_empty() {
            self.values.insert(PropertyValue {
                property: Arc::clone(property),
                value: value.to_string(),
            });
        }
    }

    fn absorb_all(&mut self, children: &[Condition]) {
        for child in children {
            self.values.extend(Self::detect(child).values);
        }
    }
}

impl Visitor for PropertyValueDetector {
    fn visit_and(&mut self, children: &[Condition]) {
        self.absorb_all(children);
    }

    fn visit_or(&mut self, children: &[Condition]) {
        self.absorb_all(children);
    }

    fn visit_not(&mut self, inner: &Condition) {
        self.values.extend(Self::detect(inner).values);
    }

    fn visit_from_tree(&mut self, _tree_condition: &Condition, others: &[Condition]) {
        self.absorb_all(others);
    }

    fn visit_comparison_with_value(&mut self, column: &Column, operator: Operator, value: &str) {
        if !operator.is_equality() {
            return;
        }
        if let Some(property) = Self::tracked(column) {
            self.add(property, value);
        }
    }

    fn visit_explicit_in(&mut self, column: &Column, values: &[InValue]) {
        let Some(property) = Self::tracked(column) else {
            return;
        };
        for value in values {
            if let InValue::Literal(literal) = value {
                self.add(property, literal);
            }
        }
    }

    fn visit_implicit_in(&mut self, _column: &Column, query: &CardQuery) {
        self.values.extend(Self::detect(&query.conditions).values);
    }
}
