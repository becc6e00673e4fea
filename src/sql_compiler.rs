//! SQL compiler that lowers condition trees to SQL using sea-query.
//!
//! Conditions become boolean SQL fragments through [`to_sql`]. `IN PLAN` and
//! nested `IN (SELECT ...)` conditions also need a join in the surrounding
//! statement, so rendering is two-phase: [`collect_joins`] gathers those
//! clauses first, then [`to_sql`] emits the predicate that refers to them.


use sea_query::{Alias, Expr, JoinType, Order, Query, SelectStatement};
use tracing::{debug, trace};

use crate::ast::{CardQuery, Condition, InValue};
use crate::column::{AggregateFunction, Column, SortDirection};
use crate::config::SqlDialect;
use crate::error::{QueryError, QueryResult};
use crate::operator::Operator;
use crate::project::{ActingUser, Plan, PropertyDefinition, PropertyKind, QueryContext, ValueCategory};

const ALWAYS_TRUE: &str = "1 = 1";
const ALWAYS_FALSE: &str = "1 != 1";

/// What a hoisted join reads from.
#[derive(Debug, Clone)]
pub enum JoinSource {
    Table(String),
    Subquery(Box<SelectStatement>),
}

/// A LEFT OUTER JOIN the caller must splice into the FROM section.
#[derive(Debug, Clone)]
pub struct JoinClause {
    pub alias: String,
    pub source: JoinSource,
    pub on: String,
}

impl JoinClause {
    pub fn to_sql(&self, dialect: SqlDialect) -> String {
        let source = match &self.source {
            JoinSource::Table(table) => table.clone(),
            JoinSource::Subquery(select) => format!("({})", dialect.build(select)),
        };
        format!("LEFT OUTER JOIN {source} {} ON {}", self.alias, self.on)
    }
}

/// Result of compiling a whole card query.
#[derive(Debug)]
pub struct CompileResult {
    pub sql: String,
    pub where_clause: String,
    pub joins: Vec<JoinClause>,
}

/// Compiles [`CardQuery`] values into complete SELECT statements.
pub struct SqlCompiler<'a> {
    ctx: &'a QueryContext<'a>,
}

impl<'a> SqlCompiler<'a> {
    pub fn new(ctx: &'a QueryContext<'a>) -> Self {
        Self { ctx }
    }

    /// Compile a card query into a SELECT statement for the configured dialect
    pub fn compile(&self, query: &CardQuery) -> QueryResult<CompileResult> {
        let (mut select, joins, where_clause) = self.filtered_select(query)?;
        let schema = self.ctx.schema;

        if query.columns.is_empty() {
            select.expr(Expr::cust(format!("{}.*", schema.cards_table)));
        }
        for column in &query.columns {
            select.expr(Expr::cust(column_sql(column, self.ctx)?));
        }
        if !query.group_by.is_empty() {
            let exprs = query
                .group_by
                .iter()
                .map(|c| column_sql(c, self.ctx).map(Expr::cust))
                .collect::<QueryResult<Vec<_>>>()?;
            select.add_group_by(exprs);
        }
        for column in &query.order_by {
            let order = match column {
                Column::OrderBy(o) if o.direction == SortDirection::Descending => Order::Desc,
                _ => Order::Asc,
            };
            select.order_by_expr(Expr::cust(column_sql(column, self.ctx)?), order);
        }

        let sql = schema.dialect.build(&select);
        debug!(joins = joins.len(), columns = query.columns.len(), "compiled card query");
        Ok(CompileResult {
            sql,
            where_clause,
            joins,
        })
    }

    /// FROM, hoisted joins, AS OF filter and WHERE; no projection yet.
    fn filtered_select(&self, query: &CardQuery) -> QueryResult<(SelectStatement, Vec<JoinClause>, String)> {
        let schema = self.ctx.schema;
        let mut select = Query::select();
        match &query.as_of {
            Some(as_of) => {
                let date = crate::project::parse_date(as_of.trim()).ok_or_else(|| {
                    QueryError::new(format!("{as_of} is not a valid date for AS OF"))
                })?;
                select.from_as(
                    Alias::new(schema.card_versions_table.as_str()),
                    Alias::new(schema.cards_table.as_str()),
                );
                select.and_where(Expr::cust(format!(
                    "{cards}.version = (SELECT MAX(latest.version) FROM {versions} latest WHERE latest.card_id = {cards}.card_id AND latest.updated_at < {day})",
                    cards = schema.cards_table,
                    versions = schema.card_versions_table,
                    day = schema
                        .dialect
                        .quote_value((date + chrono::Duration::days(1)).format("%Y-%m-%d").to_string()),
                )));
            }
            None => {
                select.from(Alias::new(schema.cards_table.as_str()));
            }
        }

        let mut joins = Vec::new();
        collect_joins(&query.conditions, self.ctx, &mut joins)?;
        for join in &joins {
            let alias = Alias::new(join.alias.as_str());
            let on = Expr::cust(join.on.clone());
            match &join.source {
                JoinSource::Table(table) => {
                    select.join_as(JoinType::LeftJoin, Alias::new(table.as_str()), alias, on);
                }
                JoinSource::Subquery(sub) => {
                    select.join_subquery(JoinType::LeftJoin, sub.as_ref().clone(), alias, on);
                }
            }
        }

        let where_clause = to_sql(&query.conditions, self.ctx)?;
        if !matches!(query.conditions, Condition::True) {
            select.and_where(Expr::cust(where_clause.clone()));
        }
        Ok((select, joins, where_clause))
    }
}

/// Gathers the joins a condition needs, skipping aliases already present.
pub fn collect_joins(condition: &Condition, ctx: &QueryContext<'_>, joins: &mut Vec<JoinClause>) -> QueryResult<()> {
    let join = match condition {
        Condition::InPlan(plan) => Some(plan_join(plan, ctx)),
        Condition::ImplicitIn { column, query } => Some(implicit_in_join(column, query, ctx)?),
        _ => None,
    };
    if let Some(join) = join {
        if !joins.iter().any(|j| j.alias == join.alias) {
            joins.push(join);
        }
    }
    for child in condition.children() {
        collect_joins(child, ctx, joins)?;
    }
    Ok(())
}

/// Renders a condition as a SQL boolean expression.
pub fn to_sql(condition: &Condition, ctx: &QueryContext<'_>) -> QueryResult<String> {
    let sql = match condition {
        Condition::True => ALWAYS_TRUE.to_string(),
        Condition::RawSql(sql) => sql.clone(),
        Condition::And(children) => join_children(children.iter(), " AND ", ALWAYS_TRUE, ctx)?,
        Condition::Or(children) => join_children(children.iter(), " OR ", ALWAYS_FALSE, ctx)?,
        Condition::FromTree {
            tree_condition,
            others,
        } => join_children(
            std::iter::once(tree_condition.as_ref()).chain(others.iter()),
            " AND ",
            ALWAYS_TRUE,
            ctx,
        )?,
        Condition::Not(inner) => match inner.as_ref() {
            Condition::IsNull(column) => format!("{} IS NOT NULL", column_sql(column, ctx)?),
            other => format!("NOT ({})", to_sql(other, ctx)?),
        },
        Condition::ComparisonWithValue {
            column,
            operator,
            value,
        } => comparison_sql(column, *operator, value, ctx)?,
        Condition::ComparisonWithNumber {
            column,
            operator,
            number,
        } => {
            let cards = &ctx.schema.cards_table;
            let number = number_literal(number, ctx)?;
            let related = format!("SELECT related.id FROM {cards} related WHERE related.number = {number}");
            membership(&column_sql(column, ctx)?, *operator, &related)
        }
        Condition::ComparisonWithColumn {
            left,
            operator,
            right,
        } => column_comparison_sql(left, *operator, right, ctx)?,
        Condition::ComparisonWithProjectVariable {
            column,
            operator,
            variable,
        } => to_sql(&variable.comparison_condition(column, *operator), ctx)?,
        Condition::TodayComparison { column, operator } => {
            let today = ctx.today.format("%Y-%m-%d").to_string();
            comparison_sql(column, *operator, &today, ctx)?
        }
        Condition::ComparisonWithThisCard { column, operator } => {
            let this_card = ctx.require_this_card()?;
            let id = ctx.schema.dialect.quote_value(this_card.id);
            compare(&column_sql(column, ctx)?, &column_sql(column, ctx)?, *operator, &id)
        }
        Condition::ComparisonWithThisCardProperty {
            column,
            operator,
            property,
        } => {
            let this_card = ctx.require_this_card()?;
            match this_card.value_of(&property.name) {
                Some(value) => comparison_sql(column, *operator, value, ctx)?,
                None => null_comparison_sql(column, *operator, ctx)?,
            }
        }
        Condition::ExplicitIn { column, values } => explicit_in_sql(column, values, ctx)?,
        Condition::NumbersExplicitIn { column, numbers } => {
            if numbers.is_empty() {
                ALWAYS_FALSE.to_string()
            } else {
                let cards = &ctx.schema.cards_table;
                let numbers = numbers
                    .iter()
                    .map(|n| number_literal(n, ctx))
                    .collect::<QueryResult<Vec<_>>>()?
                    .join(", ");
                format!(
                    "{} IN (SELECT related.id FROM {cards} related WHERE related.number IN ({numbers}))",
                    column_sql(column, ctx)?
                )
            }
        }
        Condition::ImplicitIn { column, query } => {
            let join = implicit_in_join(column, query, ctx)?;
            format!("{}.value IS NOT NULL", join.alias)
        }
        Condition::TaggedWith(tag) => {
            let schema = ctx.schema;
            format!(
                "EXISTS (SELECT 1 FROM {taggings} JOIN {tags} ON {tags}.id = {taggings}.tag_id WHERE {taggings}.taggable_id = {cards}.id AND LOWER({tags}.name) = {tag})",
                taggings = schema.taggings_table,
                tags = schema.tags_table,
                cards = schema.cards_table,
                tag = lower_literal(tag, ctx),
            )
        }
        Condition::IsNull(column) => format!("{} IS NULL", column_sql(column, ctx)?),
        Condition::IsCurrentUser {
            column,
            operator,
            user,
        } => match user {
            ActingUser::Anonymous => ALWAYS_FALSE.to_string(),
            ActingUser::Authenticated { login } => {
                membership(&column_sql(column, ctx)?, *operator, &user_lookup(&[login.as_str()], ctx))
            }
        },
        Condition::InTree(tree) => {
            let schema = ctx.schema;
            format!(
                "EXISTS (SELECT 1 FROM {belongings} WHERE {belongings}.card_id = {cards}.id AND {belongings}.tree_configuration_id = {id})",
                belongings = schema.tree_belongings_table,
                cards = schema.cards_table,
                id = schema.dialect.quote_value(tree.id),
            )
        }
        Condition::InPlan(plan) => {
            let join = plan_join(plan, ctx);
            format!("{}.card_number IS NOT NULL", join.alias)
        }
    };
    trace!(len = sql.len(), "condition.to_sql");
    Ok(sql)
}

fn join_children<'c>(
    children: impl Iterator<Item = &'c Condition>,
    separator: &str,
    empty: &str,
    ctx: &QueryContext<'_>,
) -> QueryResult<String> {
    let parts = children
        .map(|child| to_sql(child, ctx))
        .collect::<QueryResult<Vec<_>>>()?;
    Ok(match parts.len() {
        0 => empty.to_string(),
        1 => parts.into_iter().next().unwrap_or_default(),
        _ => parts
            .iter()
            .map(|part| format!("({part})"))
            .collect::<Vec<_>>()
            .join(separator),
    })
}

/// SQL for a SELECT / GROUP BY / ORDER BY / comparison column.
pub fn column_sql(column: &Column, ctx: &QueryContext<'_>) -> QueryResult<String> {
    let schema = ctx.schema;
    Ok(match column.undecorated() {
        Column::Property(p) => schema.card_column(&p.column_name),
        Column::Id => schema.card_column("id"),
        Column::Wildcard => "*".to_string(),
        Column::Aggregate { function, column } => {
            let inner = column_sql(column, ctx)?;
            if *function == AggregateFunction::Count || !matches!(column.undecorated(), Column::Property(_)) {
                format!("{}({inner})", function.name())
            } else {
                format!("{}(CAST({inner} AS DECIMAL))", function.name())
            }
        }
        Column::OrderBy(_) | Column::GroupBy(_) => {
            return Err(QueryError::new(format!("{} cannot be nested", column.name())))
        }
    })
}

fn lower_literal(value: &str, ctx: &QueryContext<'_>) -> String {
    ctx.schema.dialect.quote_value(value.trim().to_lowercase())
}

fn number_literal(value: &str, ctx: &QueryContext<'_>) -> QueryResult<String> {
    let trimmed = value.trim();
    if let Ok(integer) = trimmed.parse::<i64>() {
        return Ok(ctx.schema.dialect.quote_value(integer));
    }
    trimmed
        .parse::<f64>()
        .map(|number| ctx.schema.dialect.quote_value(number))
        .map_err(|_| QueryError::new(format!("{trimmed} is not a number")))
}

/// `lhs op rhs`; `!=` also matches rows where the column is NULL.
fn compare(lhs: &str, column: &str, operator: Operator, rhs: &str) -> String {
    match operator {
        Operator::NotEquals => format!("({column} IS NULL OR {lhs} <> {rhs})"),
        Operator::In => format!("{lhs} = {rhs}"),
        other => format!("{lhs} {} {rhs}", other.sql_symbol()),
    }
}

/// Membership of an id column in a subquery.
fn membership(column: &str, operator: Operator, subquery: &str) -> String {
    match operator {
        Operator::NotEquals => format!("({column} IS NULL OR {column} NOT IN ({subquery}))"),
        _ => format!("{column} IN ({subquery})"),
    }
}

fn in_list(lhs: &str, items: &[String]) -> String {
    if items.is_empty() {
        ALWAYS_FALSE.to_string()
    } else {
        format!("{lhs} IN ({})", items.join(", "))
    }
}

fn user_lookup(logins: &[&str], ctx: &QueryContext<'_>) -> String {
    let users = &ctx.schema.users_table;
    let logins: Vec<String> = logins.iter().map(|l| lower_literal(l, ctx)).collect();
    format!(
        "SELECT {users}.id FROM {users} WHERE LOWER({users}.login) IN ({})",
        logins.join(", ")
    )
}

fn card_name_lookup(names: &[&str], ctx: &QueryContext<'_>) -> String {
    let cards = &ctx.schema.cards_table;
    let names: Vec<String> = names.iter().map(|n| lower_literal(n, ctx)).collect();
    format!(
        "SELECT related.id FROM {cards} related WHERE LOWER(related.name) IN ({})",
        names.join(", ")
    )
}

fn property_of(column: &Column) -> QueryResult<&PropertyDefinition> {
    column
        .property_definition()
        .map(|p| p.as_ref())
        .ok_or_else(|| QueryError::new(format!("{} cannot be compared with a value", column.name())))
}

/// `column op value`, delegating case folding or casting to the property kind.
fn comparison_sql(column: &Column, operator: Operator, value: &str, ctx: &QueryContext<'_>) -> QueryResult<String> {
    let col = column_sql(column, ctx)?;
    if matches!(column.undecorated(), Column::Id) {
        return Ok(compare(&col, &col, operator, &number_literal(value, ctx)?));
    }
    let property = property_of(column)?;
    let value = property.coerce(value)?;
    if operator.is_ordinal() && !property.is_ordinal() {
        return Err(QueryError::new(format!(
            "Property {} is not ordinal and cannot be compared using {}",
            property.name,
            operator.mql_token()
        )));
    }

    Ok(match &property.kind {
        _ if property.is_numeric() => compare(
            &format!("CAST({col} AS DECIMAL)"),
            &col,
            operator,
            &number_literal(&value, ctx)?,
        ),
        PropertyKind::Date => compare(&col, &col, operator, &ctx.schema.dialect.quote_value(value)),
        PropertyKind::Enumerated { values, .. } if operator.is_ordinal() => {
            let position = property.enumeration_position(&value).ok_or_else(|| {
                QueryError::new(format!("{value} is not a valid value for {}", property.name))
            })?;
            let selected: Vec<String> = values
                .iter()
                .enumerate()
                .filter(|(index, _)| operator.compare_positions(*index, position))
                .map(|(_, v)| lower_literal(v, ctx))
                .collect();
            in_list(&format!("LOWER({col})"), &selected)
        }
        PropertyKind::User => membership(&col, operator, &user_lookup(&[value.as_str()], ctx)),
        PropertyKind::CardRelationship { .. } | PropertyKind::TreeRelationship { .. } => {
            membership(&col, operator, &card_name_lookup(&[value.as_str()], ctx))
        }
        _ => compare(&format!("LOWER({col})"), &col, operator, &lower_literal(&value, ctx)),
    })
}

/// What a comparison means once its right-hand side turned out blank.
fn null_comparison_sql(column: &Column, operator: Operator, ctx: &QueryContext<'_>) -> QueryResult<String> {
    let col = column_sql(column, ctx)?;
    Ok(match operator {
        Operator::Equals | Operator::In => format!("{col} IS NULL"),
        Operator::NotEquals => format!("{col} IS NOT NULL"),
        _ => ALWAYS_FALSE.to_string(),
    })
}

fn column_comparison_sql(
    left: &Column,
    operator: Operator,
    right: &Column,
    ctx: &QueryContext<'_>,
) -> QueryResult<String> {
    let (l, r) = (column_sql(left, ctx)?, column_sql(right, ctx)?);
    let category = |c: &Column| {
        if c.is_numeric() {
            ValueCategory::Numeric
        } else if c.is_date() {
            ValueCategory::Date
        } else {
            ValueCategory::String
        }
    };
    if category(left) != category(right) {
        return Err(QueryError::new(format!(
            "{} and {} cannot be compared, they are different types",
            left.name(),
            right.name()
        )));
    }
    if operator.is_ordinal() && category(left) == ValueCategory::String {
        return Err(QueryError::new(format!(
            "Property {} is not numeric or date and cannot be compared using {}",
            left.name(),
            operator.mql_token()
        )));
    }
    let symbol = match operator {
        Operator::In => Operator::Equals.sql_symbol(),
        other => other.sql_symbol(),
    };
    Ok(match category(left) {
        ValueCategory::Numeric => format!("CAST({l} AS DECIMAL) {symbol} CAST({r} AS DECIMAL)"),
        ValueCategory::Date => format!("{l} {symbol} {r}"),
        ValueCategory::String if left.is_relationship() || right.is_relationship() => {
            format!("{l} {symbol} {r}")
        }
        ValueCategory::String => format!("LOWER({l}) {symbol} LOWER({r})"),
    })
}

fn explicit_in_sql(column: &Column, values: &[InValue], ctx: &QueryContext<'_>) -> QueryResult<String> {
    let mut includes_null = false;
    let mut present = Vec::new();
    for value in values {
        let resolved = match value {
            InValue::Literal(literal) => Some(literal.as_str()),
            InValue::Variable(variable) => variable.value.as_deref(),
        };
        match resolved.map(str::trim).filter(|v| !v.is_empty()) {
            Some(v) => present.push(v),
            None => includes_null = true,
        }
    }

    let col = column_sql(column, ctx)?;
    let membership_sql = if present.is_empty() {
        None
    } else if matches!(column.undecorated(), Column::Id) {
        let numbers = present
            .iter()
            .map(|v| number_literal(v, ctx))
            .collect::<QueryResult<Vec<_>>>()?;
        Some(in_list(&col, &numbers))
    } else {
        let property = property_of(column)?;
        let coerced = present
            .iter()
            .map(|v| property.coerce(v))
            .collect::<QueryResult<Vec<_>>>()?;
        let refs: Vec<&str> = coerced.iter().map(String::as_str).collect();
        Some(match &property.kind {
            _ if property.is_numeric() => {
                let numbers = refs
                    .iter()
                    .map(|v| number_literal(v, ctx))
                    .collect::<QueryResult<Vec<_>>>()?;
                in_list(&format!("CAST({col} AS DECIMAL)"), &numbers)
            }
            PropertyKind::Date => {
                let dates: Vec<String> = refs.iter().map(|v| ctx.schema.dialect.quote_value(*v)).collect();
                in_list(&col, &dates)
            }
            PropertyKind::User => format!("{col} IN ({})", user_lookup(&refs, ctx)),
            PropertyKind::CardRelationship { .. } | PropertyKind::TreeRelationship { .. } => {
                format!("{col} IN ({})", card_name_lookup(&refs, ctx))
            }
            _ => {
                let lowered: Vec<String> = refs.iter().map(|v| lower_literal(v, ctx)).collect();
                in_list(&format!("LOWER({col})"), &lowered)
            }
        })
    };

    Ok(match (membership_sql, includes_null) {
        (None, false) => ALWAYS_FALSE.to_string(),
        (None, true) => format!("{col} IS NULL"),
        (Some(sql), false) => sql,
        (Some(sql), true) => format!("({col} IS NULL OR {sql})"),
    })
}

fn plan_join(plan: &Plan, ctx: &QueryContext<'_>) -> JoinClause {
    let works = ctx.schema.works_table.as_str();
    let alias = format!("plan_works_{}", plan.id);
    let select = Query::select()
        .distinct()
        .column(Alias::new("card_number"))
        .from(Alias::new(works))
        .and_where(Expr::col(Alias::new("plan_id")).eq(plan.id))
        .to_owned();
    JoinClause {
        on: format!("{alias}.card_number = {}", ctx.schema.card_column("number")),
        alias,
        source: JoinSource::Subquery(Box::new(select)),
    }
}

fn implicit_in_join(column: &Column, query: &CardQuery, ctx: &QueryContext<'_>) -> QueryResult<JoinClause> {
    let compiler = SqlCompiler::new(ctx);
    let (mut select, _, _) = compiler.filtered_select(query)?;
    let selected = query
        .columns
        .first()
        .ok_or_else(|| QueryError::new("A nested IN query must select exactly one property"))?;
    select
        .distinct()
        .expr_as(Expr::cust(column_sql(selected, ctx)?), Alias::new("value"));

    let outer = column_sql(column, ctx)?;
    let rendered = ctx.schema.dialect.build(&select);
    // 别名由外层列和子查询文本决定, 两个阶段各自计算也一致
    let mut hasher = blake3::Hasher::new();
    hasher.update(outer.as_bytes());
    hasher.update(&[0]);
    hasher.update(rendered.as_bytes());
    let alias = format!("implicit_in_{}", &hasher.finalize().to_hex()[..16]);

    Ok(JoinClause {
        on: format!("{alias}.value = {outer}"),
        alias,
        source: JoinSource::Subquery(Box::new(select)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::builder_fixture;

    #[test]
    fn test_end_to_end_and_with_in() {
        let fixture = builder_fixture();
        let b = fixture.builder();
        let condition = Condition::and(vec![
            b.comparison_with_value("Type", Operator::Equals, "Story").unwrap(),
            b.explicit_in("Priority", &["High", "Low"]).unwrap(),
        ]);
        assert_eq!(
            to_sql(&condition, b.context()).unwrap(),
            "(LOWER(cards.card_type_name) = 'story') AND (LOWER(cards.cp_priority) IN ('high', 'low'))"
        );
    }

    #[test]
    fn test_single_child_is_not_parenthesized() {
        let fixture = builder_fixture();
        let b = fixture.builder();
        let condition = Condition::or(vec![b.is_null("Owner").unwrap()]);
        assert_eq!(to_sql(&condition, b.context()).unwrap(), "cards.cp_owner_user_id IS NULL");
        assert_eq!(to_sql(&Condition::or(vec![]), b.context()).unwrap(), "1 != 1");
        assert_eq!(to_sql(&Condition::and(vec![]), b.context()).unwrap(), "1 = 1");
    }

    #[test]
    fn test_not_is_null_renders_is_not_null() {
        let fixture = builder_fixture();
        let b = fixture.builder();
        let condition = Condition::negate(b.is_null("Status").unwrap());
        assert_eq!(to_sql(&condition, b.context()).unwrap(), "cards.cp_status IS NOT NULL");

        let negated = Condition::negate(b.tagged_with("urgent"));
        assert!(to_sql(&negated, b.context()).unwrap().starts_with("NOT (EXISTS"));
    }

    #[test]
    fn test_empty_explicit_in_is_false() {
        let fixture = builder_fixture();
        let b = fixture.builder();
        let condition = b.explicit_in("Status", &[]).unwrap();
        assert_eq!(to_sql(&condition, b.context()).unwrap(), "1 != 1");
        let numbers = b.numbers_explicit_in("Release", &[]).unwrap();
        assert_eq!(to_sql(&numbers, b.context()).unwrap(), "1 != 1");
    }

    #[test]
    fn test_not_equals_includes_nulls() {
        let fixture = builder_fixture();
        let b = fixture.builder();
        let condition = b.comparison_with_value("Status", Operator::NotEquals, "Open").unwrap();
        assert_eq!(
            to_sql(&condition, b.context()).unwrap(),
            "(cards.cp_status IS NULL OR LOWER(cards.cp_status) <> 'open')"
        );
    }

    #[test]
    fn test_numeric_and_date_comparisons() {
        let fixture = builder_fixture();
        let b = fixture.builder();
        let size = b.comparison_with_value("Size", Operator::GreaterOrEqual, "3").unwrap();
        assert_eq!(to_sql(&size, b.context()).unwrap(), "CAST(cards.cp_size AS DECIMAL) >= 3");

        let due = b.comparison_with_value("Due Date", Operator::LessThan, "03 Feb 2024").unwrap();
        assert_eq!(to_sql(&due, b.context()).unwrap(), "cards.cp_due_date < '2024-02-03'");

        let today = b.today_comparison("Due Date", Operator::Equals).unwrap();
        assert_eq!(to_sql(&today, b.context()).unwrap(), "cards.cp_due_date = '2024-03-15'");
    }

    #[test]
    fn test_enumeration_ordinal_uses_positions() {
        let fixture = builder_fixture();
        let b = fixture.builder();
        let condition = b.comparison_with_value("Priority", Operator::LessThan, "High").unwrap();
        assert_eq!(
            to_sql(&condition, b.context()).unwrap(),
            "LOWER(cards.cp_priority) IN ('low', 'medium')"
        );
        let nothing_below = b.comparison_with_value("Priority", Operator::LessThan, "Low").unwrap();
        assert_eq!(to_sql(&nothing_below, b.context()).unwrap(), "1 != 1");
    }

    #[test]
    fn test_column_comparison() {
        let fixture = builder_fixture();
        let b = fixture.builder();
        let condition = b.comparison_with_column("Size", Operator::GreaterThan, "Estimate").unwrap();
        assert_eq!(
            to_sql(&condition, b.context()).unwrap(),
            "CAST(cards.cp_size AS DECIMAL) > CAST(cards.cp_estimate AS DECIMAL)"
        );
    }

    #[test]
    fn test_ordinal_column_comparison_on_text_is_an_error() {
        let fixture = builder_fixture();
        let b = fixture.builder();
        let condition = Condition::ComparisonWithColumn {
            left: b.column("Status").unwrap(),
            operator: Operator::GreaterThan,
            right: b.column("Name").unwrap(),
        };
        assert!(to_sql(&condition, b.context()).is_err());
    }

    #[test]
    fn test_relationship_comparisons() {
        let fixture = builder_fixture();
        let b = fixture.builder();
        let by_number = b.comparison_with_number("Release", Operator::Equals, "12").unwrap();
        assert_eq!(
            to_sql(&by_number, b.context()).unwrap(),
            "cards.cp_release_card_id IN (SELECT related.id FROM cards related WHERE related.number = 12)"
        );
        let this_card = b.this_card_comparison("Release", Operator::NotEquals).unwrap();
        assert_eq!(
            to_sql(&this_card, b.context()).unwrap(),
            "(cards.cp_release_card_id IS NULL OR cards.cp_release_card_id <> 100)"
        );
    }

    #[test]
    fn test_current_user_for_anonymous_is_contradiction() {
        let fixture = builder_fixture();
        let b = fixture.builder();
        let condition = b.is_current_user("Owner", Operator::Equals).unwrap();
        assert_eq!(to_sql(&condition, b.context()).unwrap(), "1 != 1");

        let signed_in = builder_fixture().with_user("Bob");
        let b = signed_in.builder();
        let condition = b.is_current_user("Owner", Operator::Equals).unwrap();
        assert_eq!(
            to_sql(&condition, b.context()).unwrap(),
            "cards.cp_owner_user_id IN (SELECT users.id FROM users WHERE LOWER(users.login) IN ('bob'))"
        );
    }

    #[test]
    fn test_project_variable_comparisons() {
        let fixture = builder_fixture();
        let b = fixture.builder();
        let set = b
            .comparison_with_project_variable("Status", Operator::Equals, "Default Status")
            .unwrap();
        assert_eq!(to_sql(&set, b.context()).unwrap(), "LOWER(cards.cp_status) = 'open'");

        let unset = b
            .comparison_with_project_variable("Status", Operator::NotEquals, "Unset Status")
            .unwrap();
        assert_eq!(to_sql(&unset, b.context()).unwrap(), "cards.cp_status IS NOT NULL");
    }

    #[test]
    fn test_explicit_in_with_unset_variable_matches_null() {
        let fixture = builder_fixture();
        let b = fixture.builder();
        let values = vec![
            InValue::Literal("Open".into()),
            b.in_value_variable("Unset Status").unwrap(),
        ];
        let condition = b.explicit_in_values("Status", values).unwrap();
        assert_eq!(
            to_sql(&condition, b.context()).unwrap(),
            "(cards.cp_status IS NULL OR LOWER(cards.cp_status) IN ('open'))"
        );
    }

    #[test]
    fn test_this_card_property_blank_value_is_null_check() {
        let fixture = builder_fixture();
        let b = fixture.builder();
        let condition = b
            .this_card_property_comparison("Status", Operator::Equals, "Status")
            .unwrap();
        assert_eq!(to_sql(&condition, b.context()).unwrap(), "LOWER(cards.cp_status) = 'open'");
        let blank = b
            .this_card_property_comparison("Owner", Operator::Equals, "Owner")
            .unwrap();
        assert_eq!(to_sql(&blank, b.context()).unwrap(), "cards.cp_owner_user_id IS NULL");
    }

    #[test]
    fn test_in_plan_joins_are_collected_once() {
        let fixture = builder_fixture();
        let b = fixture.builder();
        let plan = b.in_plan("Q3 Plan").unwrap();
        let condition = Condition::or(vec![plan.clone(), Condition::negate(plan)]);
        let mut joins = Vec::new();
        collect_joins(&condition, b.context(), &mut joins).unwrap();
        assert_eq!(joins.len(), 1);
        assert_eq!(joins[0].alias, "plan_works_3");
        let rendered = joins[0].to_sql(SqlDialect::Postgres);
        assert!(rendered.starts_with("LEFT OUTER JOIN (SELECT DISTINCT"));
        assert!(rendered.ends_with("plan_works_3 ON plan_works_3.card_number = cards.number"));
        assert_eq!(
            to_sql(&condition, b.context()).unwrap(),
            "(plan_works_3.card_number IS NOT NULL) OR (NOT (plan_works_3.card_number IS NOT NULL))"
        );
    }

    #[test]
    fn test_implicit_in_alias_matches_between_phases() {
        let fixture = builder_fixture();
        let b = fixture.builder();
        let sub = CardQuery {
            columns: vec![b.column("Release").unwrap()],
            ..CardQuery::conditions_only(b.comparison_with_value("Status", Operator::Equals, "Open").unwrap())
        };
        let condition = b.implicit_in("Release", sub).unwrap();
        let mut joins = Vec::new();
        collect_joins(&condition, b.context(), &mut joins).unwrap();
        assert_eq!(joins.len(), 1);
        assert_eq!(
            to_sql(&condition, b.context()).unwrap(),
            format!("{}.value IS NOT NULL", joins[0].alias)
        );
    }

    #[test]
    fn test_distinct_subqueries_get_distinct_joins() {
        let fixture = builder_fixture();
        let b = fixture.builder();
        let nested = |status: &str| {
            let sub = CardQuery {
                columns: vec![b.column("Release").unwrap()],
                ..CardQuery::conditions_only(b.comparison_with_value("Status", Operator::Equals, status).unwrap())
            };
            b.implicit_in("Release", sub).unwrap()
        };
        let condition = Condition::or(vec![nested("Open"), nested("Closed"), nested("Open")]);
        let mut joins = Vec::new();
        collect_joins(&condition, b.context(), &mut joins).unwrap();
        assert_eq!(joins.len(), 2);
        assert_ne!(joins[0].alias, joins[1].alias);
        for join in &joins {
            let suffix = join.alias.trim_start_matches("implicit_in_");
            assert_eq!(suffix.len(), 16);
            assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
        }

        let mut again = Vec::new();
        collect_joins(&nested("Open"), b.context(), &mut again).unwrap();
        assert_eq!(again[0].alias, joins[0].alias);
    }

    #[test]
    fn test_compile_whole_query() {
        let fixture = builder_fixture();
        let b = fixture.builder();
        let ctx = b.context();
        let query = CardQuery {
            columns: vec![
                b.column("Status").unwrap(),
                Column::aggregate("sum", b.column("Size").unwrap()).unwrap(),
            ],
            conditions: Condition::and(vec![
                b.comparison_with_value("Type", Operator::Equals, "Story").unwrap(),
                b.in_plan("Q3 Plan").unwrap(),
            ]),
            group_by: vec![Column::group_by(b.column("Status").unwrap())],
            order_by: vec![Column::order_by(b.column("Status").unwrap(), SortDirection::Descending)],
            as_of: None,
        };
        let result = SqlCompiler::new(ctx).compile(&query).unwrap();
        assert!(result.sql.starts_with("SELECT cards.cp_status, SUM(CAST(cards.cp_size AS DECIMAL)) FROM"));
        assert!(result.sql.contains("LEFT JOIN"));
        assert!(result.sql.contains("GROUP BY cards.cp_status"));
        assert!(result.sql.contains("ORDER BY cards.cp_status DESC"));
        assert_eq!(result.joins.len(), 1);
        assert_eq!(
            result.where_clause,
            "(LOWER(cards.card_type_name) = 'story') AND (plan_works_3.card_number IS NOT NULL)"
        );
    }

    #[test]
    fn test_compile_as_of_reads_versions() {
        let fixture = builder_fixture();
        let b = fixture.builder();
        let query = CardQuery {
            as_of: Some("01 Mar 2024".to_string()),
            ..CardQuery::conditions_only(b.tagged_with("urgent"))
        };
        let result = SqlCompiler::new(b.context()).compile(&query).unwrap();
        assert!(result.sql.contains("card_versions"));
        assert!(result.sql.contains("'2024-03-02'"));

        let bad = CardQuery {
            as_of: Some("later".to_string()),
            ..CardQuery::conditions_only(Condition::True)
        };
        assert!(SqlCompiler::new(b.context()).compile(&bad).is_err());
    }
}
