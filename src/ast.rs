//! 卡片查询的语法树
//!
//! 语法树一旦构建就不再修改：重命名、渲染与检测都只读取它，产生新的字符串或集合。

use std::sync::Arc;

use crate::column::Column;
use crate::operator::Operator;
use crate::project::{ActingUser, Plan, ProjectVariable, PropertyDefinition, TreeConfiguration};
use crate::visitor::Visitor;

/// 完整的卡片查询：`SELECT ... [AS OF] [FROM TREE] [WHERE] [GROUP BY] [ORDER BY]`
#[derive(Debug, Clone)]
pub struct CardQuery {
    pub columns: Vec<Column>,
    /// `FROM TREE` 也保存在条件里 (见 [`Condition::FromTree`])
    pub conditions: Condition,
    /// 元素为 [`Column::GroupBy`]
    pub group_by: Vec<Column>,
    /// 元素为 [`Column::OrderBy`]
    pub order_by: Vec<Column>,
    /// 原样保存的 `AS OF` 日期文本
    pub as_of: Option<String>,
}

impl CardQuery {
    /// 只有条件、没有任何子句的查询
    pub fn conditions_only(conditions: Condition) -> Self {
        Self {
            columns: Vec::new(),
            conditions,
            group_by: Vec::new(),
            order_by: Vec::new(),
            as_of: None,
        }
    }

    /// Visits the SELECT columns, the conditions, GROUP BY and ORDER BY, in that order.
    pub fn accept<V: Visitor + ?Sized>(&self, visitor: &mut V) {
        for column in &self.columns {
            column.accept(visitor);
        }
        self.conditions.accept(visitor);
        for column in &self.group_by {
            column.accept(visitor);
        }
        for column in &self.order_by {
            column.accept(visitor);
        }
    }
}

/// `IN (...)` 列表中的一个值
#[derive(Debug, Clone, PartialEq)]
pub enum InValue {
    Literal(String),
    Variable(Arc<ProjectVariable>),
}

/// 查询条件的表达式树
#[derive(Debug, Clone)]
pub enum Condition {
    /// 恒真条件, 例如没有 WHERE 的查询
    True,
    /// 逻辑与运算 (AND)
    And(Vec<Condition>),
    /// 逻辑或运算 (OR)
    Or(Vec<Condition>),
    /// 逻辑非运算 (NOT)
    Not(Box<Condition>),
    /// `FROM TREE`: 与 AND 相同, 但单独记录树成员条件
    FromTree {
        tree_condition: Box<Condition>,
        others: Vec<Condition>,
    },
    /// `Status = 'Open'`
    ComparisonWithValue {
        column: Column,
        operator: Operator,
        value: String,
    },
    /// `Release = NUMBER 12`, 只用于卡片关系属性
    ComparisonWithNumber {
        column: Column,
        operator: Operator,
        number: String,
    },
    /// `Estimate > PROPERTY Size`
    ComparisonWithColumn {
        left: Column,
        operator: Operator,
        right: Column,
    },
    /// `Iteration = (Current Iteration)`
    ComparisonWithProjectVariable {
        column: Column,
        operator: Operator,
        variable: Arc<ProjectVariable>,
    },
    /// `'Due Date' < TODAY`
    TodayComparison { column: Column, operator: Operator },
    /// `Parent = THIS CARD`
    ComparisonWithThisCard { column: Column, operator: Operator },
    /// `Release = THIS CARD.Release`
    ComparisonWithThisCardProperty {
        column: Column,
        operator: Operator,
        property: Arc<PropertyDefinition>,
    },
    /// `Status IN ('Open', (Default Status))`
    ExplicitIn { column: Column, values: Vec<InValue> },
    /// `Release NUMBER IN (1, 2)`
    NumbersExplicitIn { column: Column, numbers: Vec<String> },
    /// `Release IN (SELECT Release WHERE ...)`
    ImplicitIn {
        column: Column,
        query: Box<CardQuery>,
    },
    /// `TAGGED WITH 'urgent'`
    TaggedWith(String),
    /// 空值检查
    IsNull(Column),
    /// `Owner IS CURRENT USER`; 构建时记录的用户决定它是否永假
    IsCurrentUser {
        column: Column,
        operator: Operator,
        user: ActingUser,
    },
    /// 树成员条件
    InTree(Arc<TreeConfiguration>),
    /// `IN PLAN 'name'`
    InPlan(Arc<Plan>),
    /// 直接拼接的SQL片段, 不出现在MQL里
    RawSql(String),
}

impl Condition {
    pub fn and(children: Vec<Condition>) -> Self {
        Condition::And(children)
    }

    pub fn or(children: Vec<Condition>) -> Self {
        Condition::Or(children)
    }

    pub fn negate(inner: Condition) -> Self {
        Condition::Not(Box::new(inner))
    }

    /// Direct children, left to right.
    pub fn children(&self) -> Vec<&Condition> {
        match self {
            Condition::And(children) | Condition::Or(children) => children.iter().collect(),
            Condition::Not(inner) => vec![inner.as_ref()],
            Condition::FromTree {
                tree_condition,
                others,
            } => std::iter::once(tree_condition.as_ref())
                .chain(others.iter())
                .collect(),
            _ => Vec::new(),
        }
    }

    /// This node followed by the flattened form of every direct child (pre-order).
    pub fn flatten(&self) -> Vec<&Condition> {
        let mut nodes = vec![self];
        for child in self.children() {
            nodes.extend(child.flatten());
        }
        nodes
    }

    /// Whether the rendered form joins more than one part at its top level;
    /// these need parentheses when nested. A single-child And / Or renders as
    /// its child, so it is compound exactly when the child is.
    pub fn is_compound(&self) -> bool {
        match self {
            Condition::And(children)
            | Condition::Or(children)
            | Condition::FromTree {
                others: children, ..
            } => match children.as_slice() {
                [] => false,
                [only] => only.is_compound(),
                _ => true,
            },
            _ => false,
        }
    }

    /// 双重分派: 调用与节点类型对应的访问方法, 只传递字段
    pub fn accept<V: Visitor + ?Sized>(&self, visitor: &mut V) {
        match self {
            Condition::True | Condition::RawSql(_) => {}
            Condition::And(children) => visitor.visit_and(children),
            Condition::Or(children) => visitor.visit_or(children),
            Condition::Not(inner) => visitor.visit_not(inner),
            Condition::FromTree {
                tree_condition,
                others,
            } => visitor.visit_from_tree(tree_condition, others),
            Condition::ComparisonWithValue {
                column,
                operator,
                value,
            } => visitor.visit_comparison_with_value(column, *operator, value),
            Condition::ComparisonWithNumber {
                column,
                operator,
                number,
            } => visitor.visit_comparison_with_number(column, *operator, number),
            Condition::ComparisonWithColumn {
                left,
                operator,
                right,
            } => visitor.visit_comparison_with_column(left, *operator, right),
            Condition::ComparisonWithProjectVariable {
                column,
                operator,
                variable,
            } => visitor.visit_comparison_with_project_variable(column, *operator, variable),
            Condition::TodayComparison { column, operator } => {
                visitor.visit_today_comparison(column, *operator)
            }
            Condition::ComparisonWithThisCard { column, operator } => {
                visitor.visit_this_card_comparison(column, *operator)
            }
            Condition::ComparisonWithThisCardProperty {
                column,
                operator,
                property,
            } => visitor.visit_this_card_property_comparison(column, *operator, property),
            Condition::ExplicitIn { column, values } => visitor.visit_explicit_in(column, values),
            Condition::NumbersExplicitIn { column, numbers } => {
                visitor.visit_numbers_explicit_in(column, numbers)
            }
            Condition::ImplicitIn { column, query } => visitor.visit_implicit_in(column, query),
            Condition::TaggedWith(tag) => visitor.visit_tagged_with(tag),
            Condition::IsNull(column) => visitor.visit_is_null(column),
            Condition::IsCurrentUser {
                column,
                operator,
                user,
            } => visitor.visit_is_current_user(column, *operator, user),
            Condition::InTree(tree) => visitor.visit_in_tree(tree),
            Condition::InPlan(plan) => visitor.visit_in_plan(plan),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::builder_fixture;

    fn sample_tree() -> Condition {
        let fixture = builder_fixture();
        let b = fixture.builder();
        Condition::or(vec![
            Condition::and(vec![
                b.comparison_with_value("Type", Operator::Equals, "Story").unwrap(),
                Condition::negate(b.is_null("Owner").unwrap()),
            ]),
            b.tagged_with("urgent"),
            b.from_tree("Planning", vec![b.is_null("Status").unwrap()]).unwrap(),
        ])
    }

    fn flatten_len(condition: &Condition) -> usize {
        condition.flatten().len()
    }

    #[test]
    fn test_flatten_is_preorder_with_root_first() {
        let tree = sample_tree();
        let flat = tree.flatten();
        assert!(std::ptr::eq(flat[0], &tree));
        assert!(matches!(flat[1], Condition::And(_)));
        assert!(matches!(flat[2], Condition::ComparisonWithValue { .. }));
        assert!(matches!(flat[3], Condition::Not(_)));
        assert!(matches!(flat[4], Condition::IsNull(_)));
        assert!(matches!(flat[5], Condition::TaggedWith(_)));
        assert!(matches!(flat[6], Condition::FromTree { .. }));
        assert!(matches!(flat[7], Condition::InTree(_)));
        assert!(matches!(flat[8], Condition::IsNull(_)));
        assert_eq!(flat.len(), 9);
    }

    #[test]
    fn test_flatten_length_is_one_plus_children() {
        let tree = sample_tree();
        for node in tree.flatten() {
            let expected = 1 + node.children().into_iter().map(flatten_len).sum::<usize>();
            assert_eq!(flatten_len(node), expected);
        }
    }

    #[test]
    fn test_is_compound() {
        assert!(sample_tree().is_compound());
        assert!(!Condition::and(vec![Condition::True]).is_compound());
        assert!(!Condition::TaggedWith("x".into()).is_compound());

        let either = Condition::or(vec![
            Condition::TaggedWith("a".into()),
            Condition::TaggedWith("b".into()),
        ]);
        assert!(Condition::and(vec![either.clone()]).is_compound());
        assert!(Condition::or(vec![Condition::and(vec![either])]).is_compound());
    }
}
