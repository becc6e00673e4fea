//! Validated construction of condition trees.
//!
//! The parser (or a domain rule) assembles trees through [`ConditionBuilder`],
//! which checks every comparison against the project schema up front. Once a
//! node exists it is never re-validated: renderers and detectors trust it.

use std::sync::{Arc, OnceLock};

use regex::Regex;
use tracing::debug;

use crate::ast::{CardQuery, Condition, InValue};
use crate::column::Column;
use crate::error::{QueryError, QueryResult};
use crate::operator::Operator;
use crate::project::{
    ProjectMetadata, ProjectVariable, PropertyDefinition, QueryContext, ValueCategory,
};

fn card_number_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\d+$").expect("static pattern"))
}

/// Anything that names a column of the queried cards.
pub trait IntoColumn {
    fn into_column(self, metadata: &dyn ProjectMetadata) -> QueryResult<Column>;
}

impl IntoColumn for Column {
    fn into_column(self, _metadata: &dyn ProjectMetadata) -> QueryResult<Column> {
        Ok(self)
    }
}

impl IntoColumn for Arc<PropertyDefinition> {
    fn into_column(self, _metadata: &dyn ProjectMetadata) -> QueryResult<Column> {
        Ok(Column::Property(self))
    }
}

impl IntoColumn for &str {
    fn into_column(self, metadata: &dyn ProjectMetadata) -> QueryResult<Column> {
        if let Some(property) = metadata.property(self) {
            return Ok(Column::Property(property));
        }
        let predefined = match self.trim().to_ascii_lowercase().as_str() {
            "type" => PropertyDefinition::card_type(),
            "number" => PropertyDefinition::number(),
            "name" => PropertyDefinition::card_name(),
            _ => {
                return Err(QueryError::new(format!(
                    "Card property '{self}' does not exist!"
                )))
            }
        };
        Ok(Column::Property(Arc::new(predefined)))
    }
}

fn category_name(category: ValueCategory) -> &'static str {
    match category {
        ValueCategory::Numeric => "numeric",
        ValueCategory::Date => "date",
        ValueCategory::String => "text",
    }
}

fn column_category(column: &Column) -> ValueCategory {
    if column.is_numeric() {
        ValueCategory::Numeric
    } else if column.is_date() {
        ValueCategory::Date
    } else {
        ValueCategory::String
    }
}

fn ensure_ordinal(column: &Column, operator: Operator) -> QueryResult<()> {
    if operator.is_ordinal() && !column.is_ordinal() {
        return Err(QueryError::new(format!(
            "Property {} is not ordinal and cannot be compared using {}",
            column.name(),
            operator.mql_token()
        )));
    }
    Ok(())
}

fn ensure_equality(column: &Column, operator: Operator, what: &str) -> QueryResult<()> {
    if !matches!(operator, Operator::Equals | Operator::NotEquals) {
        return Err(QueryError::new(format!(
            "{} can only be compared with {what} using = or !=",
            column.name()
        )));
    }
    Ok(())
}

fn ensure_relationship(column: &Column, what: &str) -> QueryResult<()> {
    if !column.is_relationship() {
        return Err(QueryError::new(format!(
            "{what} can only be used with card relationship or tree relationship properties, and {} is not one",
            column.name()
        )));
    }
    Ok(())
}

fn ensure_card_number(number: &str) -> QueryResult<()> {
    if !card_number_pattern().is_match(number.trim()) {
        return Err(QueryError::new(format!(
            "{number} is not a valid card number. NUMBER requires a whole number"
        )));
    }
    Ok(())
}

pub struct ConditionBuilder<'a> {
    ctx: QueryContext<'a>,
}

impl<'a> ConditionBuilder<'a> {
    pub fn new(ctx: QueryContext<'a>) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &QueryContext<'a> {
        &self.ctx
    }

    pub fn column(&self, column: impl IntoColumn) -> QueryResult<Column> {
        column.into_column(self.ctx.metadata)
    }

    fn ensure_card_type_exists(&self, column: &Column, value: &str) -> QueryResult<()> {
        if column.is_card_type() && self.ctx.metadata.card_type(value).is_none() {
            return Err(QueryError::new(format!(
                "Card type {value} does not exist in project {}",
                self.ctx.metadata.identifier()
            )));
        }
        Ok(())
    }

    /// Checks a literal on the right-hand side of `column operator value`.
    fn ensure_value(&self, column: &Column, operator: Operator, value: &str) -> QueryResult<()> {
        ensure_ordinal(column, operator)?;
        self.ensure_card_type_exists(column, value)?;
        if let Some(property) = column.property_definition() {
            property.coerce(value)?;
            if operator.is_ordinal()
                && property.is_enumerated()
                && !property.is_numeric()
                && property.enumeration_position(value).is_none()
            {
                return Err(QueryError::new(format!(
                    "{value} is not a valid value for {}, which is restricted to {}",
                    property.name,
                    property.enumeration_values().join(", ")
                )));
            }
        }
        Ok(())
    }

    /// `column operator 'value'`; blank values turn into NULL checks.
    pub fn comparison_with_value(
        &self,
        column: impl IntoColumn,
        operator: Operator,
        value: &str,
    ) -> QueryResult<Condition> {
        let column = self.column(column)?;
        if value.trim().is_empty() {
            return match operator {
                Operator::Equals | Operator::In => Ok(Condition::IsNull(column)),
                Operator::NotEquals => Ok(Condition::negate(Condition::IsNull(column))),
                _ => Err(QueryError::new(format!(
                    "{} cannot be compared with an empty value using {}",
                    column.name(),
                    operator.mql_token()
                ))),
            };
        }
        let operator = if operator == Operator::In {
            Operator::Equals
        } else {
            operator
        };
        self.ensure_value(&column, operator, value)?;
        Ok(Condition::ComparisonWithValue {
            column,
            operator,
            value: value.to_string(),
        })
    }

    /// `column operator NUMBER n` on a relationship property.
    pub fn comparison_with_number(
        &self,
        column: impl IntoColumn,
        operator: Operator,
        number: &str,
    ) -> QueryResult<Condition> {
        let column = self.column(column)?;
        ensure_relationship(&column, "NUMBER")?;
        ensure_ordinal(&column, operator)?;
        ensure_card_number(number)?;
        Ok(Condition::ComparisonWithNumber {
            column,
            operator,
            number: number.trim().to_string(),
        })
    }

    /// `left operator PROPERTY right`; both sides must share a value category.
    pub fn comparison_with_column(
        &self,
        left: impl IntoColumn,
        operator: Operator,
        right: impl IntoColumn,
    ) -> QueryResult<Condition> {
        let left = self.column(left)?;
        let right = self.column(right)?;
        let (left_category, right_category) = (column_category(&left), column_category(&right));
        if left_category != right_category {
            return Err(QueryError::new(format!(
                "Property {} is {}, and value {} is {}. Only properties of the same type can be compared",
                left.name(),
                category_name(left_category),
                right.name(),
                category_name(right_category)
            )));
        }
        if operator.is_ordinal() {
            for side in [&left, &right] {
                if column_category(side) == ValueCategory::String {
                    return Err(QueryError::new(format!(
                        "Property {} is not numeric or date and cannot be compared using {}",
                        side.name(),
                        operator.mql_token()
                    )));
                }
            }
        }
        Ok(Condition::ComparisonWithColumn {
            left,
            operator,
            right,
        })
    }

    /// `column operator (variable)`, looked up by display name.
    pub fn comparison_with_project_variable(
        &self,
        column: impl IntoColumn,
        operator: Operator,
        variable_name: &str,
    ) -> QueryResult<Condition> {
        let column = self.column(column)?;
        let variable = self.project_variable(variable_name)?;
        ensure_ordinal(&column, operator)?;
        Ok(Condition::ComparisonWithProjectVariable {
            column,
            operator,
            variable,
        })
    }

    fn project_variable(&self, name: &str) -> QueryResult<Arc<ProjectVariable>> {
        self.ctx.metadata.project_variable(name).ok_or_else(|| {
            QueryError::new(format!("Project variable ({name}) does not exist"))
        })
    }

    pub fn today_comparison(&self, column: impl IntoColumn, operator: Operator) -> QueryResult<Condition> {
        let column = self.column(column)?;
        if !column.is_date() {
            return Err(QueryError::new(format!(
                "Property {} is not a date property and cannot be compared with TODAY",
                column.name()
            )));
        }
        Ok(Condition::TodayComparison { column, operator })
    }

    /// `column operator THIS CARD`; the property must accept the current card's type.
    pub fn this_card_comparison(&self, column: impl IntoColumn, operator: Operator) -> QueryResult<Condition> {
        let column = self.column(column)?;
        ensure_relationship(&column, "THIS CARD")?;
        ensure_equality(&column, operator, "THIS CARD")?;
        let this_card = self.ctx.require_this_card()?;
        if let Some(valid_type) = column.property_definition().and_then(|p| p.valid_card_type()) {
            if !valid_type.eq_ignore_ascii_case(&this_card.card_type) {
                return Err(QueryError::new(format!(
                    "Comparing between property '{}' and THIS CARD is invalid as they are different types",
                    column.name()
                )));
            }
        }
        Ok(Condition::ComparisonWithThisCard { column, operator })
    }

    /// `column operator THIS CARD.property`.
    pub fn this_card_property_comparison(
        &self,
        column: impl IntoColumn,
        operator: Operator,
        property: impl IntoColumn,
    ) -> QueryResult<Condition> {
        let column = self.column(column)?;
        let other = self.column(property)?;
        self.ctx.require_this_card()?;
        let property = other.property_definition().cloned().ok_or_else(|| {
            QueryError::new(format!("THIS CARD.{} is not a card property", other.name()))
        })?;
        let mismatched_relationship = column.is_relationship() != property.is_relationship()
            || column.property_definition().and_then(|p| p.valid_card_type())
                != property.valid_card_type();
        if column_category(&column) != property.category() || mismatched_relationship {
            return Err(QueryError::new(format!(
                "Comparing between property '{}' and THIS CARD.{} is invalid as they are different types",
                column.name(),
                property.name
            )));
        }
        ensure_ordinal(&column, operator)?;
        Ok(Condition::ComparisonWithThisCardProperty {
            column,
            operator,
            property,
        })
    }

    /// `column IN ('a', 'b')` from literal values.
    pub fn explicit_in(&self, column: impl IntoColumn, values: &[&str]) -> QueryResult<Condition> {
        let values = values.iter().map(|v| InValue::Literal(v.to_string())).collect();
        self.explicit_in_values(column, values)
    }

    /// `column IN ('a', (variable))`; variables are resolved by the caller.
    pub fn explicit_in_values(&self, column: impl IntoColumn, values: Vec<InValue>) -> QueryResult<Condition> {
        let column = self.column(column)?;
        for value in &values {
            if let InValue::Literal(literal) = value {
                if !literal.trim().is_empty() {
                    self.ensure_value(&column, Operator::Equals, literal)?;
                }
            }
        }
        Ok(Condition::ExplicitIn { column, values })
    }

    /// Resolves `(name)` entries of an IN list.
    pub fn in_value_variable(&self, name: &str) -> QueryResult<InValue> {
        self.project_variable(name).map(InValue::Variable)
    }

    /// `column NUMBER IN (1, 2)`.
    pub fn numbers_explicit_in(&self, column: impl IntoColumn, numbers: &[&str]) -> QueryResult<Condition> {
        let column = self.column(column)?;
        ensure_relationship(&column, "NUMBER IN")?;
        for number in numbers {
            ensure_card_number(number)?;
        }
        Ok(Condition::NumbersExplicitIn {
            column,
            numbers: numbers.iter().map(|n| n.trim().to_string()).collect(),
        })
    }

    /// `column IN (SELECT other WHERE ...)`.
    pub fn implicit_in(&self, column: impl IntoColumn, query: CardQuery) -> QueryResult<Condition> {
        let column = self.column(column)?;
        let [selected] = query.columns.as_slice() else {
            return Err(QueryError::new(
                "A nested IN query must select exactly one property",
            ));
        };
        if column_category(selected) != column_category(&column)
            || selected.is_relationship() != column.is_relationship()
        {
            return Err(QueryError::new(format!(
                "{} cannot be compared with the nested query's {}, they are different types",
                column.name(),
                selected.name()
            )));
        }
        Ok(Condition::ImplicitIn {
            column,
            query: Box::new(query),
        })
    }

    pub fn tagged_with(&self, tag: &str) -> Condition {
        Condition::TaggedWith(tag.to_string())
    }

    pub fn is_null(&self, column: impl IntoColumn) -> QueryResult<Condition> {
        Ok(Condition::IsNull(self.column(column)?))
    }

    /// `column IS [NOT] CURRENT USER`.
    ///
    /// The acting user is copied into the node now; rendering never looks at
    /// the context's user again.
    pub fn is_current_user(&self, column: impl IntoColumn, operator: Operator) -> QueryResult<Condition> {
        let column = self.column(column)?;
        if !column.property_definition().map_or(false, |p| p.is_user()) {
            return Err(QueryError::new(format!(
                "{} is not a user property and cannot be compared with CURRENT USER",
                column.name()
            )));
        }
        ensure_equality(&column, operator, "CURRENT USER")?;
        Ok(Condition::IsCurrentUser {
            column,
            operator,
            user: self.ctx.user.clone(),
        })
    }

    pub fn in_tree(&self, tree_name: &str) -> QueryResult<Condition> {
        self.ctx
            .metadata
            .tree(tree_name)
            .map(Condition::InTree)
            .ok_or_else(|| QueryError::new(format!("There is no tree named {tree_name}")))
    }

    /// `FROM TREE 'name' WHERE others`.
    pub fn from_tree(&self, tree_name: &str, others: Vec<Condition>) -> QueryResult<Condition> {
        Ok(Condition::FromTree {
            tree_condition: Box::new(self.in_tree(tree_name)?),
            others,
        })
    }

    /// `IN PLAN 'name'`; the plan's program must include this project.
    pub fn in_plan(&self, plan_name: &str) -> QueryResult<Condition> {
        let plan = self
            .ctx
            .metadata
            .plan(plan_name)
            .ok_or_else(|| QueryError::new(format!("{plan_name} is not a valid plan")))?;
        let project = self.ctx.metadata.identifier();
        if !plan
            .linked_projects
            .iter()
            .any(|p| p.eq_ignore_ascii_case(project))
        {
            debug!(plan = %plan.name, project, "plan not linked to project");
            return Err(QueryError::new(format!(
                "Plan {} is not associated with this project. Add the project to program {} first",
                plan.name, plan.program
            )));
        }
        Ok(Condition::InPlan(plan))
    }

    pub fn raw_sql(&self, sql: &str) -> Condition {
        Condition::RawSql(sql.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::ActingUser;
    use crate::test_support::builder_fixture;

    #[test]
    fn test_blank_values_become_null_checks() {
        let fixture = builder_fixture();
        let b = fixture.builder();
        assert!(matches!(
            b.comparison_with_value("Status", Operator::Equals, "  ").unwrap(),
            Condition::IsNull(_)
        ));
        match b.comparison_with_value("Status", Operator::NotEquals, "").unwrap() {
            Condition::Not(inner) => assert!(matches!(*inner, Condition::IsNull(_))),
            other => panic!("Expected negated null check, got {other:?}"),
        }
        assert!(b.comparison_with_value("Size", Operator::LessThan, "").is_err());
    }

    #[test]
    fn test_unknown_property() {
        let fixture = builder_fixture();
        let err = fixture
            .builder()
            .comparison_with_value("Colour", Operator::Equals, "red")
            .unwrap_err();
        assert_eq!(err.message, "Card property 'Colour' does not exist!");
    }

    #[test]
    fn test_ordinal_operator_on_text_property() {
        let fixture = builder_fixture();
        let err = fixture
            .builder()
            .comparison_with_value("Name", Operator::GreaterThan, "abc")
            .unwrap_err();
        assert!(err.message.contains("is not ordinal"));
    }

    #[test]
    fn test_ordinal_enumeration_value_must_exist() {
        let fixture = builder_fixture();
        let b = fixture.builder();
        assert!(b.comparison_with_value("Priority", Operator::LessThan, "High").is_ok());
        assert!(b.comparison_with_value("Priority", Operator::LessThan, "Huge").is_err());
    }

    #[test]
    fn test_unknown_card_type() {
        let fixture = builder_fixture();
        let err = fixture
            .builder()
            .comparison_with_value("Type", Operator::Equals, "Epic")
            .unwrap_err();
        assert!(err.message.contains("Card type Epic does not exist"));
    }

    #[test]
    fn test_number_comparisons_require_relationship_and_digits() {
        let fixture = builder_fixture();
        let b = fixture.builder();
        assert!(b.comparison_with_number("Release", Operator::Equals, "12").is_ok());
        assert!(b.comparison_with_number("Release", Operator::Equals, "12a").is_err());
        assert!(b.comparison_with_number("Status", Operator::Equals, "12").is_err());
        assert!(b.numbers_explicit_in("Release", &["1", "2"]).is_ok());
        assert!(b.numbers_explicit_in("Release", &["1", "-2"]).is_err());
        assert!(b.numbers_explicit_in("Size", &["1"]).is_err());
    }

    #[test]
    fn test_column_comparison_categories() {
        let fixture = builder_fixture();
        let b = fixture.builder();
        assert!(b.comparison_with_column("Size", Operator::GreaterThan, "Estimate").is_ok());
        let err = b
            .comparison_with_column("Size", Operator::Equals, "Due Date")
            .unwrap_err();
        assert!(err.message.contains("Only properties of the same type"));
        let err = b
            .comparison_with_column("Status", Operator::LessThan, "Name")
            .unwrap_err();
        assert!(err.message.contains("not numeric or date"));
        assert!(b.comparison_with_column("Status", Operator::Equals, "Name").is_ok());
    }

    #[test]
    fn test_this_card_requires_matching_card_type() {
        let fixture = builder_fixture();
        let b = fixture.builder();
        // the fixture's current card is a Release
        assert!(b.this_card_comparison("Release", Operator::Equals).is_ok());
        let err = b.this_card_comparison("Iteration", Operator::Equals).unwrap_err();
        assert!(err.message.contains("different types"));
    }

    #[test]
    fn test_this_card_without_current_card() {
        let fixture = builder_fixture().without_this_card();
        let err = fixture
            .builder()
            .this_card_comparison("Release", Operator::Equals)
            .unwrap_err();
        assert!(err.message.contains("THIS CARD"));
    }

    #[test]
    fn test_this_card_property_type_agreement() {
        let fixture = builder_fixture();
        let b = fixture.builder();
        assert!(b
            .this_card_property_comparison("Release", Operator::Equals, "Release")
            .is_ok());
        assert!(b
            .this_card_property_comparison("Size", Operator::Equals, "Status")
            .is_err());
    }

    #[test]
    fn test_is_current_user_bakes_acting_user() {
        let anonymous = builder_fixture();
        match anonymous.builder().is_current_user("Owner", Operator::Equals).unwrap() {
            Condition::IsCurrentUser { user, .. } => assert_eq!(user, ActingUser::Anonymous),
            other => panic!("Expected current user condition, got {other:?}"),
        }

        let signed_in = builder_fixture().with_user("bob");
        match signed_in.builder().is_current_user("Owner", Operator::NotEquals).unwrap() {
            Condition::IsCurrentUser { user, .. } => assert_eq!(user.login(), Some("bob")),
            other => panic!("Expected current user condition, got {other:?}"),
        }
        assert!(signed_in.builder().is_current_user("Status", Operator::Equals).is_err());
    }

    #[test]
    fn test_plans_must_exist_and_be_linked() {
        let fixture = builder_fixture();
        let b = fixture.builder();
        assert!(b.in_plan("Q3 Plan").is_ok());
        assert!(b.in_plan("Nope").unwrap_err().message.contains("not a valid plan"));
        assert!(b
            .in_plan("Other Plan")
            .unwrap_err()
            .message
            .contains("not associated with this project"));
    }

    #[test]
    fn test_unknown_tree() {
        let fixture = builder_fixture();
        assert!(fixture.builder().in_tree("Nope").is_err());
    }

    #[test]
    fn test_implicit_in_requires_single_column() {
        let fixture = builder_fixture();
        let b = fixture.builder();
        let sub = CardQuery {
            columns: vec![b.column("Release").unwrap()],
            ..CardQuery::conditions_only(b.comparison_with_value("Status", Operator::Equals, "Open").unwrap())
        };
        assert!(b.implicit_in("Release", sub.clone()).is_ok());
        assert!(b.implicit_in("Size", sub).is_err());
        assert!(b
            .implicit_in("Release", CardQuery::conditions_only(Condition::True))
            .is_err());
    }

    #[test]
    fn test_today_requires_date_property() {
        let fixture = builder_fixture();
        let b = fixture.builder();
        assert!(b.today_comparison("Due Date", Operator::LessThan).is_ok());
        assert!(b.today_comparison("Status", Operator::Equals).is_err());
    }
}
