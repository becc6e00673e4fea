//! Card types a condition restricts its matches to, explicitly or implicitly.
//!
//! Besides `Type = ...` constraints, comparing a tree relationship property
//! implies the card sits below that property's card type in its tree, and
//! `FROM TREE` implies one of the tree's card types.

use std::collections::HashSet;
use std::sync::Arc;

use crate::ast::{CardQuery, Condition, InValue};
use crate::column::Column;
use crate::operator::Operator;
use crate::project::{CardType, ProjectVariable, PropertyDefinition, PropertyKind, QueryContext, TreeConfiguration};
use crate::visitor::Visitor;

type Implied = Option<HashSet<String>>;

/// `None` means unconstrained: any card type can match.
pub struct ImpliedCardTypeDetector<'c, 'a> {
    ctx: &'c QueryContext<'a>,
    implied: Implied,
}

impl<'c, 'a> ImpliedCardTypeDetector<'c, 'a> {
    pub fn detect(ctx: &'c QueryContext<'a>, condition: &Condition) -> Self {
        let mut detector = Self { ctx, implied: None };
        condition.accept(&mut detector);
        detector
    }

    fn fresh(&self, condition: &Condition) -> Implied {
        Self::detect(self.ctx, condition).implied
    }

    /// Implied card types in card type order, or `None` when unconstrained.
    pub fn card_types(&self) -> Option<Vec<CardType>> {
        let implied = self.implied.as_ref()?;
        Some(
            self.ctx
                .metadata
                .card_types()
                .into_iter()
                .filter(|t| implied.contains(&t.name.to_lowercase()))
                .collect(),
        )
    }

    /// A predicate selecting cards whose type sits at one of the implied
    /// card type positions.
    pub fn to_sql(&self) -> String {
        let Some(card_types) = self.card_types() else {
            return "1 = 1".to_string();
        };
        if card_types.is_empty() {
            return "1 != 1".to_string();
        }
        let schema = self.ctx.schema;
        let positions: Vec<String> = card_types.iter().map(|t| t.position.to_string()).collect();
        let types = schema.card_types_table.as_str();
        format!(
            "LOWER({}) IN (SELECT LOWER({types}.name) FROM {types} WHERE {types}.position IN ({}))",
            schema.card_column(&PropertyDefinition::card_type().column_name),
            positions.join(", ")
        )
    }

    fn constrain(&mut self, implied: HashSet<String>) {
        self.implied = Some(match self.implied.take() {
            Some(existing) => existing.intersection(&implied).cloned().collect(),
            None => implied,
        });
    }

    fn all_card_types(&self) -> HashSet<String> {
        self.ctx
            .metadata
            .card_types()
            .into_iter()
            .map(|t| t.name.to_lowercase())
            .collect()
    }

    fn tree_types(tree: &TreeConfiguration) -> HashSet<String> {
        tree.card_types.iter().map(|t| t.to_lowercase()).collect()
    }

    /// Types that can hold a value for the tree relationship property.
    fn below_relationship(&self, column: &Column) -> Option<HashSet<String>> {
        let property = column.property_definition()?;
        let PropertyKind::TreeRelationship {
            tree,
            valid_card_type,
        } = &property.kind
        else {
            return None;
        };
        let tree = self.ctx.metadata.tree(tree)?;
        let below = tree.card_types_at_or_below(valid_card_type);
        Some(below.iter().skip(1).map(|t| t.to_lowercase()).collect())
    }

    fn constrain_by_relationship(&mut self, column: &Column, operator: Operator) {
        if operator == Operator::NotEquals {
            return;
        }
        if let Some(below) = self.below_relationship(column) {
            self.constrain(below);
        }
    }

    fn constrain_by_type_value(&mut self, operator: Operator, value: &str) {
        let value = value.trim().to_lowercase();
        match operator {
            Operator::Equals | Operator::In => self.constrain(HashSet::from([value])),
            Operator::NotEquals => {
                let mut rest = self.all_card_types();
                rest.remove(&value);
                self.constrain(rest);
            }
            _ => {}
        }
    }
}

impl Visitor for ImpliedCardTypeDetector<'_, '_> {
    fn visit_and(&mut self, children: &[Condition]) {
        for child in children {
            if let Some(implied) = self.fresh(child) {
                self.constrain(implied);
            }
        }
    }

    fn visit_or(&mut self, children: &[Condition]) {
        let mut union = HashSet::new();
        for child in children {
            match self.fresh(child) {
                Some(implied) => union.extend(implied),
                None => return,
            }
        }
        self.constrain(union);
    }

    // NOT 之下的条件不推出任何类型

    fn visit_from_tree(&mut self, tree_condition: &Condition, others: &[Condition]) {
        tree_condition.accept(self);
        self.visit_and(others);
    }

    fn visit_comparison_with_value(&mut self, column: &Column, operator: Operator, value: &str) {
        if column.is_card_type() {
            self.constrain_by_type_value(operator, value);
        } else {
            self.constrain_by_relationship(column, operator);
        }
    }

    fn visit_comparison_with_number(&mut self, column: &Column, operator: Operator, _number: &str) {
        self.constrain_by_relationship(column, operator);
    }

    fn visit_comparison_with_project_variable(
        &mut self,
        column: &Column,
        operator: Operator,
        variable: &Arc<ProjectVariable>,
    ) {
        if variable.is_not_set() {
            return;
        }
        if let (true, Some(value)) = (column.is_card_type(), variable.value.as_deref()) {
            self.constrain_by_type_value(operator, value);
        } else {
            self.constrain_by_relationship(column, operator);
        }
    }

    fn visit_this_card_comparison(&mut self, column: &Column, operator: Operator) {
        self.constrain_by_relationship(column, operator);
    }

    fn visit_explicit_in(&mut self, column: &Column, values: &[InValue]) {
        if !column.is_card_type() {
            self.constrain_by_relationship(column, Operator::In);
            return;
        }
        let names: HashSet<String> = values
            .iter()
            .filter_map(|value| match value {
                InValue::Literal(name) => Some(name.as_str()),
                InValue::Variable(variable) => variable.value.as_deref(),
            })
            .map(|name| name.trim().to_lowercase())
            .collect();
        self.constrain(names);
    }

    fn visit_numbers_explicit_in(&mut self, column: &Column, _numbers: &[String]) {
        self.constrain_by_relationship(column, Operator::In);
    }

    fn visit_implicit_in(&mut self, column: &Column, _query: &CardQuery) {
        self.constrain_by_relationship(column, Operator::In);
    }

    fn visit_in_tree(&mut self, tree: &Arc<TreeConfiguration>) {
        self.constrain(Self::tree_types(tree));
    }
}
