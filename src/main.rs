use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use card_query::config::SchemaConfig;
use card_query::detectors::{
    CardTypeDetector, ImpliedCardTypeDetector, PropertyDefinitionDetector, PropertyValueDetector,
};
use card_query::mql::{query_to_mql, to_mql, EnumeratedValueRename, PropertyRename, Substitution};
use card_query::project::{
    ActingUser, CardType, ContentProvider, Plan, ProjectCatalog, ProjectVariable, PropertyDefinition,
    PropertyKind, QueryContext, TreeConfiguration,
};
use card_query::sql_compiler::{to_sql, SqlCompiler};
use card_query::validation::{DailyHistoryChartValidations, MqlAuxiliaryValidations};
use card_query::{CardQuery, Column, Condition, ConditionBuilder, Operator, SortDirection};

/// 加载表结构配置，失败时使用默认配置
fn load_schema() -> SchemaConfig {
    match SchemaConfig::from_json_file("schema_config.json") {
        Ok(schema) => {
            info!("loaded schema_config.json");
            schema
        }
        Err(e) => {
            warn!(error = %e, "using default schema");
            SchemaConfig::default()
        }
    }
}

/// 加载项目元数据，失败时使用内置的演示项目
fn load_catalog() -> ProjectCatalog {
    ProjectCatalog::from_json_file("project.json").unwrap_or_else(|e| {
        warn!(error = %e, "using demo project");
        demo_catalog()
    })
}

fn demo_catalog() -> ProjectCatalog {
    let enumerated = |name: &str, column: &str, values: &[&str]| {
        Arc::new(PropertyDefinition::new(
            name,
            column,
            PropertyKind::Enumerated {
                values: values.iter().map(|v| v.to_string()).collect(),
                numeric: false,
            },
        ))
    };
    ProjectCatalog {
        identifier: "demo".to_string(),
        card_types: ["Release", "Iteration", "Story", "Bug"]
            .iter()
            .enumerate()
            .map(|(position, name)| CardType {
                name: name.to_string(),
                position,
            })
            .collect(),
        properties: vec![
            enumerated("Status", "cp_status", &["Open", "In Progress", "Closed"]),
            enumerated("Priority", "cp_priority", &["Low", "Medium", "High"]),
            Arc::new(PropertyDefinition::new("Size", "cp_size", PropertyKind::Numeric)),
            Arc::new(PropertyDefinition::new("Owner", "cp_owner_user_id", PropertyKind::User)),
            Arc::new(PropertyDefinition::new(
                "Release",
                "cp_release_card_id",
                PropertyKind::TreeRelationship {
                    tree: "Planning".to_string(),
                    valid_card_type: "Release".to_string(),
                },
            )),
        ],
        trees: vec![Arc::new(TreeConfiguration {
            id: 1,
            name: "Planning".to_string(),
            card_types: vec!["Release".into(), "Iteration".into(), "Story".into()],
        })],
        plans: vec![Arc::new(Plan {
            id: 1,
            name: "Q3 Plan".to_string(),
            program: "Platform".to_string(),
            linked_projects: vec!["demo".to_string()],
        })],
        project_variables: vec![Arc::new(ProjectVariable::new("Current Release", Some("R1")))],
    }
}

fn build_query(b: &ConditionBuilder<'_>) -> Result<CardQuery> {
    let conditions = Condition::and(vec![
        b.comparison_with_value("Type", Operator::Equals, "Story")?,
        b.explicit_in("Priority", &["High", "Low"])?,
        Condition::or(vec![
            b.comparison_with_project_variable("Release", Operator::Equals, "Current Release")?,
            b.is_current_user("Owner", Operator::Equals)?,
        ]),
        Condition::negate(b.is_null("Status")?),
        b.in_plan("Q3 Plan")?,
    ]);
    Ok(CardQuery {
        columns: vec![b.column("Status")?, Column::aggregate("sum", b.column("Size")?)?],
        conditions,
        group_by: vec![Column::group_by(b.column("Status")?)],
        order_by: vec![Column::order_by(b.column("Status")?, SortDirection::Descending)],
        as_of: None,
    })
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("--- Card Query: 条件树 -> MQL / SQL ---");

    let schema = load_schema();
    let catalog = load_catalog();
    let ctx = QueryContext::new(&catalog, &schema)
        .with_user(ActingUser::Authenticated {
            login: "bob".to_string(),
        })
        .with_this_card(ContentProvider {
            id: 1,
            number: 1,
            name: "R1".to_string(),
            card_type: "Release".to_string(),
            ..Default::default()
        });
    let builder = ConditionBuilder::new(ctx.clone());

    let query = build_query(&builder).context("无法构建演示查询")?;

    println!("\n[MQL]:\n{}", query_to_mql(&query));
    println!("\n[WHERE 条件]:\n{}", to_sql(&query.conditions, &ctx)?);

    let compiled = SqlCompiler::new(&ctx).compile(&query)?;
    println!("\n[完整 SQL]:\n{}", compiled.sql);
    for join in &compiled.joins {
        println!("  join: {}", join.to_sql(schema.dialect));
    }

    println!("\n[检测结果]:");
    let properties = PropertyDefinitionDetector::detect_query(&query);
    let mut names: Vec<&str> = properties.properties().iter().map(|p| p.name.as_str()).collect();
    names.sort_unstable();
    println!("属性: {}", names.join(", "));
    println!("属性值: {:?}", PropertyValueDetector::detect(&query.conditions).grouped());
    println!(
        "卡片类型: {:?}",
        CardTypeDetector::detect(&query.conditions).included()
    );
    println!(
        "隐含卡片类型: {}",
        ImpliedCardTypeDetector::detect(&ctx, &query.conditions).to_sql()
    );

    println!("\n[校验]:");
    let literal = builder.comparison_with_value("Owner", Operator::Equals, "CURRENT USER")?;
    for message in MqlAuxiliaryValidations::validate(&literal) {
        println!("• {message}");
    }
    for message in DailyHistoryChartValidations::validate(&query.conditions) {
        println!("• {message}");
    }

    println!("\n[重命名]:");
    println!("{}", PropertyRename::new("Status", "State").render_query(&query));
    let open = builder.comparison_with_value("Status", Operator::Equals, "Open")?;
    println!(
        "{} => {}",
        to_mql(&open),
        EnumeratedValueRename::new("Status", "Open", "Active").render_condition(&open)
    );

    Ok(())
}
