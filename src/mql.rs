//! MQL 文本生成与重命名
//!
//! [`MqlGeneration`] 遍历语法树, 分别累积 SELECT / WHERE / GROUP BY / ORDER BY
//! 片段, 最后按固定顺序拼接。子条件总是交给一个新的生成器渲染, 只读回它的结果。
//!
//! 五种重命名都是 [`Substitution`] 的实现: 只覆盖与自己相关的钩子,
//! 其余节点的输出与普通渲染逐字节相同。

use std::sync::Arc;

use tracing::trace;

use crate::ast::{CardQuery, Condition, InValue};
use crate::column::{AggregateFunction, Column, SortDirection};
use crate::operator::Operator;
use crate::project::{ActingUser, Plan, ProjectVariable, PropertyDefinition, TreeConfiguration};
use crate::visitor::Visitor;

const KEYWORDS: &[&str] = &[
    "AND", "AS", "ASC", "BY", "CARD", "CURRENT", "DESC", "FROM", "GROUP", "IN", "IS", "NOT",
    "NULL", "NUMBER", "OF", "OR", "ORDER", "PLAN", "PROPERTY", "SELECT", "TAGGED", "THIS",
    "TODAY", "TREE", "USER", "WHERE", "WITH",
];

/// 名称含空格、特殊字符或与关键字相同时加引号
pub fn quote_if_needed(name: &str) -> String {
    let plain = !name.is_empty()
        && name.chars().all(|c| c.is_alphanumeric() || c == '_')
        && !KEYWORDS.iter().any(|k| k.eq_ignore_ascii_case(name));
    if plain {
        name.to_string()
    } else {
        quote_value(name)
    }
}

/// 值总是加引号; 值里有单引号时改用双引号, 两种引号都有时转义单引号
pub fn quote_value(value: &str) -> String {
    match (value.contains('\''), value.contains('"')) {
        (false, _) => format!("'{value}'"),
        (true, false) => format!("\"{value}\""),
        (true, true) => format!("'{}'", value.replace('\'', "\\'")),
    }
}

/// Project variables render as `(name)`; only names that would break the
/// parentheses are quoted.
fn variable_text(name: &str) -> String {
    if name.contains(['(', ')', '\'', '"']) {
        format!("({})", quote_value(name))
    } else {
        format!("({name})")
    }
}

fn operator_text(operator: Operator) -> &'static str {
    match operator {
        Operator::In => Operator::Equals.mql_token(),
        other => other.mql_token(),
    }
}

/// `column op 'value'` exactly as the plain renderer would print it.
fn comparison_snippet(column_name: &str, operator: Operator, value: &str) -> String {
    format!(
        "{} {} {}",
        quote_if_needed(column_name),
        operator_text(operator),
        quote_value(value)
    )
}

/// Rename hooks consulted while rendering. Every hook returns `None` to keep
/// the original text.
pub trait Substitution {
    fn rename_property(&self, _name: &str) -> Option<String> {
        None
    }

    fn substitute_value(&self, _column: &Column, _operator: Operator, _value: &str) -> Option<String> {
        None
    }

    fn rename_tree(&self, _name: &str) -> Option<String> {
        None
    }

    fn rename_variable(&self, _name: &str) -> Option<String> {
        None
    }

    fn render_condition(&self, condition: &Condition) -> String
    where
        Self: Sized,
    {
        MqlGeneration::new(self).condition(condition)
    }

    fn render_query(&self, query: &CardQuery) -> String
    where
        Self: Sized,
    {
        MqlGeneration::new(self).query(query)
    }
}

/// 不做任何替换的普通渲染
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainMql;

impl Substitution for PlainMql {}

pub fn to_mql(condition: &Condition) -> String {
    PlainMql.render_condition(condition)
}

pub fn query_to_mql(query: &CardQuery) -> String {
    PlainMql.render_query(query)
}

fn renamed(old: &str, new: &str, name: &str) -> Option<String> {
    (old != new && name.eq_ignore_ascii_case(old)).then(|| new.to_string())
}

/// 属性改名: 所有出现列名的地方都替换
#[derive(Debug, Clone)]
pub struct PropertyRename {
    pub old_name: String,
    pub new_name: String,
}

impl PropertyRename {
    pub fn new(old_name: impl Into<String>, new_name: impl Into<String>) -> Self {
        Self {
            old_name: old_name.into(),
            new_name: new_name.into(),
        }
    }
}

impl Substitution for PropertyRename {
    fn rename_property(&self, name: &str) -> Option<String> {
        renamed(&self.old_name, &self.new_name, name)
    }
}

/// 枚举值改名, 只作用于指定属性的比较
#[derive(Debug, Clone)]
pub struct EnumeratedValueRename {
    pub property_name: String,
    pub old_value: String,
    pub new_value: String,
}

impl EnumeratedValueRename {
    pub fn new(property_name: impl Into<String>, old_value: impl Into<String>, new_value: impl Into<String>) -> Self {
        Self {
            property_name: property_name.into(),
            old_value: old_value.into(),
            new_value: new_value.into(),
        }
    }
}

/// Substitutes `new` when `column op value` prints the same as `property op old`.
fn snippet_substitution(
    property_name: &str,
    old: &str,
    new: &str,
    column: &Column,
    operator: Operator,
    value: &str,
) -> Option<String> {
    if old == new {
        return None;
    }
    let existing = comparison_snippet(&column.name(), operator, value);
    let hypothetical = comparison_snippet(property_name, operator, old);
    existing
        .eq_ignore_ascii_case(&hypothetical)
        .then(|| new.to_string())
}

impl Substitution for EnumeratedValueRename {
    fn substitute_value(&self, column: &Column, operator: Operator, value: &str) -> Option<String> {
        snippet_substitution(
            &self.property_name,
            &self.old_value,
            &self.new_value,
            column,
            operator,
            value,
        )
    }
}

/// 卡片类型改名; `Type` 比较中的值被替换
#[derive(Debug, Clone)]
pub struct CardTypeRename {
    pub old_name: String,
    pub new_name: String,
    pub type_property_name: String,
}

impl CardTypeRename {
    pub fn new(old_name: impl Into<String>, new_name: impl Into<String>) -> Self {
        Self {
            old_name: old_name.into(),
            new_name: new_name.into(),
            type_property_name: PropertyDefinition::card_type().name,
        }
    }
}

impl Substitution for CardTypeRename {
    fn substitute_value(&self, column: &Column, operator: Operator, value: &str) -> Option<String> {
        snippet_substitution(
            &self.type_property_name,
            &self.old_name,
            &self.new_name,
            column,
            operator,
            value,
        )
    }
}

#[derive(Debug, Clone)]
pub struct TreeRename {
    pub old_name: String,
    pub new_name: String,
}

impl TreeRename {
    pub fn new(old_name: impl Into<String>, new_name: impl Into<String>) -> Self {
        Self {
            old_name: old_name.into(),
            new_name: new_name.into(),
        }
    }
}

impl Substitution for TreeRename {
    fn rename_tree(&self, name: &str) -> Option<String> {
        renamed(&self.old_name, &self.new_name, name)
    }
}

#[derive(Debug, Clone)]
pub struct ProjectVariableRename {
    pub old_name: String,
    pub new_name: String,
}

impl ProjectVariableRename {
    pub fn new(old_name: impl Into<String>, new_name: impl Into<String>) -> Self {
        Self {
            old_name: old_name.into(),
            new_name: new_name.into(),
        }
    }
}

impl Substitution for ProjectVariableRename {
    fn rename_variable(&self, name: &str) -> Option<String> {
        renamed(&self.old_name, &self.new_name, name)
    }
}

/// MQL 生成器, 一次遍历只使用一次
pub struct MqlGeneration<'s> {
    substitution: &'s dyn Substitution,
    columns: Vec<String>,
    conditions: Vec<String>,
    group_by: Vec<String>,
    order_by: Vec<String>,
    as_of: Option<String>,
    from_tree: Option<String>,
}

impl<'s> MqlGeneration<'s> {
    pub fn new(substitution: &'s dyn Substitution) -> Self {
        Self {
            substitution,
            columns: Vec::new(),
            conditions: Vec::new(),
            group_by: Vec::new(),
            order_by: Vec::new(),
            as_of: None,
            from_tree: None,
        }
    }

    pub fn condition(mut self, condition: &Condition) -> String {
        condition.accept(&mut self);
        self.execute()
    }

    pub fn query(mut self, query: &CardQuery) -> String {
        self.as_of = query.as_of.clone();
        query.accept(&mut self);
        let mql = self.execute();
        trace!(mql = %mql, "rendered card query");
        mql
    }

    /// 拼接所有子句; 只有条件时返回条件本身
    fn execute(self) -> String {
        let condition = self.conditions.join(" AND ");
        if self.columns.is_empty()
            && self.as_of.is_none()
            && self.from_tree.is_none()
            && self.group_by.is_empty()
            && self.order_by.is_empty()
        {
            return condition;
        }

        let mut clauses = Vec::new();
        if !self.columns.is_empty() {
            clauses.push(format!("SELECT {}", self.columns.join(", ")));
        }
        if let Some(as_of) = &self.as_of {
            clauses.push(format!("AS OF {}", quote_value(as_of)));
        }
        if let Some(tree) = &self.from_tree {
            clauses.push(format!("FROM TREE {}", quote_if_needed(tree)));
        }
        if !condition.is_empty() {
            clauses.push(format!("WHERE {condition}"));
        }
        if !self.group_by.is_empty() {
            clauses.push(format!("GROUP BY {}", self.group_by.join(", ")));
        }
        if !self.order_by.is_empty() {
            clauses.push(format!("ORDER BY {}", self.order_by.join(", ")));
        }
        clauses.join(" ")
    }

    /// 用新的生成器渲染子条件; 子条件里的 FROM TREE 提升到当前层
    fn render_child(&mut self, condition: &Condition) -> String {
        let mut child = MqlGeneration::new(self.substitution);
        condition.accept(&mut child);
        if child.from_tree.is_some() {
            self.from_tree = child.from_tree;
        }
        child.conditions.join(" AND ")
    }

    fn property_text(&self, name: &str) -> String {
        let name = self
            .substitution
            .rename_property(name)
            .unwrap_or_else(|| name.to_string());
        quote_if_needed(&name)
    }

    fn column_text(&self, column: &Column) -> String {
        match column {
            Column::Property(p) => self.property_text(&p.name),
            Column::Id => "Id".to_string(),
            Column::Wildcard => "*".to_string(),
            Column::Aggregate { function, column } => {
                format!("{}({})", function.name(), self.column_text(column))
            }
            Column::OrderBy(o) => self.column_text(&o.column),
            Column::GroupBy(g) => self.column_text(&g.column),
        }
    }

    fn value_text(&self, column: &Column, operator: Operator, value: &str) -> String {
        let value = self
            .substitution
            .substitute_value(column, operator, value)
            .unwrap_or_else(|| value.to_string());
        quote_value(&value)
    }

    fn variable_text(&self, variable: &ProjectVariable) -> String {
        let name = self
            .substitution
            .rename_variable(&variable.name)
            .unwrap_or_else(|| variable.name.clone());
        variable_text(&name)
    }

    fn tree_name(&self, tree: &TreeConfiguration) -> String {
        self.substitution
            .rename_tree(&tree.name)
            .unwrap_or_else(|| tree.name.clone())
    }

    fn push(&mut self, condition: String) {
        if !condition.is_empty() {
            self.conditions.push(condition);
        }
    }

    /// Compound children are parenthesized only next to siblings.
    fn join_children(&mut self, children: &[Condition], separator: &str) {
        let mut parts = Vec::with_capacity(children.len());
        for child in children {
            let text = self.render_child(child);
            if text.is_empty() {
                continue;
            }
            if children.len() > 1 && child.is_compound() {
                parts.push(format!("({text})"));
            } else {
                parts.push(text);
            }
        }
        self.push(parts.join(separator));
    }
}

impl Visitor for MqlGeneration<'_> {
    fn visit_and(&mut self, children: &[Condition]) {
        self.join_children(children, " AND ");
    }

    fn visit_or(&mut self, children: &[Condition]) {
        self.join_children(children, " OR ");
    }

    fn visit_not(&mut self, inner: &Condition) {
        let text = match inner {
            Condition::IsNull(column) => format!("{} IS NOT NULL", self.column_text(column)),
            other if other.is_compound() => format!("NOT ({})", self.render_child(other)),
            other => {
                let rendered = self.render_child(other);
                if rendered.is_empty() {
                    return;
                }
                format!("NOT {rendered}")
            }
        };
        self.push(text);
    }

    fn visit_from_tree(&mut self, tree_condition: &Condition, others: &[Condition]) {
        tree_condition.accept(self);
        self.join_children(others, " AND ");
    }

    fn visit_comparison_with_value(&mut self, column: &Column, operator: Operator, value: &str) {
        let text = format!(
            "{} {} {}",
            self.column_text(column),
            operator_text(operator),
            self.value_text(column, operator, value)
        );
        self.push(text);
    }

    fn visit_comparison_with_number(&mut self, column: &Column, operator: Operator, number: &str) {
        let text = format!("{} {} NUMBER {number}", self.column_text(column), operator_text(operator));
        self.push(text);
    }

    fn visit_comparison_with_column(&mut self, left: &Column, operator: Operator, right: &Column) {
        let text = format!(
            "{} {} PROPERTY {}",
            self.column_text(left),
            operator_text(operator),
            self.column_text(right)
        );
        self.push(text);
    }

    fn visit_comparison_with_project_variable(
        &mut self,
        column: &Column,
        operator: Operator,
        variable: &Arc<ProjectVariable>,
    ) {
        let text = format!(
            "{} {} {}",
            self.column_text(column),
            operator_text(operator),
            self.variable_text(variable)
        );
        self.push(text);
    }

    fn visit_today_comparison(&mut self, column: &Column, operator: Operator) {
        let text = match operator {
            Operator::Equals | Operator::In => format!("{} IS TODAY", self.column_text(column)),
            Operator::NotEquals => format!("{} IS NOT TODAY", self.column_text(column)),
            other => format!("{} {} TODAY", self.column_text(column), other.mql_token()),
        };
        self.push(text);
    }

    fn visit_this_card_comparison(&mut self, column: &Column, operator: Operator) {
        let text = format!("{} {} THIS CARD", self.column_text(column), operator_text(operator));
        self.push(text);
    }

    fn visit_this_card_property_comparison(
        &mut self,
        column: &Column,
        operator: Operator,
        property: &Arc<PropertyDefinition>,
    ) {
        let text = format!(
            "{} {} THIS CARD.{}",
            self.column_text(column),
            operator_text(operator),
            self.property_text(&property.name)
        );
        self.push(text);
    }

    fn visit_explicit_in(&mut self, column: &Column, values: &[InValue]) {
        let values: Vec<String> = values
            .iter()
            .map(|value| match value {
                InValue::Literal(literal) => self.value_text(column, Operator::Equals, literal),
                InValue::Variable(variable) => self.variable_text(variable),
            })
            .collect();
        let text = format!("{} IN ({})", self.column_text(column), values.join(", "));
        self.push(text);
    }

    fn visit_numbers_explicit_in(&mut self, column: &Column, numbers: &[String]) {
        let text = format!("{} NUMBER IN ({})", self.column_text(column), numbers.join(", "));
        self.push(text);
    }

    fn visit_implicit_in(&mut self, column: &Column, query: &CardQuery) {
        let inner = MqlGeneration::new(self.substitution).query(query);
        let text = format!("{} IN ({inner})", self.column_text(column));
        self.push(text);
    }

    fn visit_tagged_with(&mut self, tag: &str) {
        self.push(format!("TAGGED WITH {}", quote_value(tag)));
    }

    fn visit_is_null(&mut self, column: &Column) {
        let text = format!("{} IS NULL", self.column_text(column));
        self.push(text);
    }

    fn visit_is_current_user(&mut self, column: &Column, operator: Operator, _user: &ActingUser) {
        let text = match operator {
            Operator::NotEquals => format!("{} IS NOT CURRENT USER", self.column_text(column)),
            _ => format!("{} IS CURRENT USER", self.column_text(column)),
        };
        self.push(text);
    }

    // 树成员条件只能写成 FROM TREE
    fn visit_in_tree(&mut self, tree: &Arc<TreeConfiguration>) {
        self.from_tree = Some(self.tree_name(tree));
    }

    fn visit_in_plan(&mut self, plan: &Arc<Plan>) {
        self.push(format!("IN PLAN {}", quote_value(&plan.name)));
    }

    fn visit_column(&mut self, property: &Arc<PropertyDefinition>) {
        let text = self.property_text(&property.name);
        self.columns.push(text);
    }

    fn visit_id_column(&mut self) {
        self.columns.push("Id".to_string());
    }

    fn visit_group_by_column(&mut self, column: &Column) {
        let text = self.column_text(column);
        self.group_by.push(text);
    }

    fn visit_order_by_column(&mut self, column: &Column, direction: SortDirection, is_default: bool) {
        if is_default {
            return;
        }
        let text = match direction {
            SortDirection::Ascending => self.column_text(column),
            SortDirection::Descending => format!("{} {}", self.column_text(column), direction.keyword()),
        };
        self.order_by.push(text);
    }

    fn visit_count_all_aggregate(&mut self) {
        self.columns.push(format!("{}(*)", AggregateFunction::Count.name()));
    }

    fn visit_aggregate_function(&mut self, function: AggregateFunction, column: &Column) {
        let text = format!("{}({})", function.name(), self.column_text(column));
        self.columns.push(text);
    }
}
