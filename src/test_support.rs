//! Project fixture shared by the unit tests.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;

use crate::builder::ConditionBuilder;
use crate::config::SchemaConfig;
use crate::project::{
    ActingUser, CardType, ContentProvider, Plan, ProjectCatalog, ProjectMetadata, ProjectVariable,
    PropertyDefinition, PropertyKind, QueryContext, TreeConfiguration,
};

fn enumerated(name: &str, column: &str, values: &[&str]) -> Arc<PropertyDefinition> {
    Arc::new(PropertyDefinition::new(
        name,
        column,
        PropertyKind::Enumerated {
            values: values.iter().map(|v| v.to_string()).collect(),
            numeric: false,
        },
    ))
}

fn tree_relationship(name: &str, column: &str, valid_card_type: &str) -> Arc<PropertyDefinition> {
    Arc::new(PropertyDefinition::new(
        name,
        column,
        PropertyKind::TreeRelationship {
            tree: "Planning".to_string(),
            valid_card_type: valid_card_type.to_string(),
        },
    ))
}

/// A small planning project: Release > Iteration > Story, plus Bug.
pub(crate) fn catalog() -> ProjectCatalog {
    ProjectCatalog {
        identifier: "demo".to_string(),
        card_types: vec![
            CardType { name: "Story".into(), position: 3 },
            CardType { name: "Release".into(), position: 1 },
            CardType { name: "Bug".into(), position: 4 },
            CardType { name: "Iteration".into(), position: 2 },
        ],
        properties: vec![
            enumerated("Status", "cp_status", &["Open", "In Progress", "Closed"]),
            enumerated("Priority", "cp_priority", &["Low", "Medium", "High"]),
            Arc::new(PropertyDefinition::new("Size", "cp_size", PropertyKind::Numeric)),
            Arc::new(PropertyDefinition::new("Estimate", "cp_estimate", PropertyKind::Numeric)),
            Arc::new(PropertyDefinition::new("Due Date", "cp_due_date", PropertyKind::Date)),
            Arc::new(PropertyDefinition::new("Owner", "cp_owner_user_id", PropertyKind::User)),
            Arc::new(PropertyDefinition::new("Notes", "cp_notes", PropertyKind::Text)),
            tree_relationship("Release", "cp_release_card_id", "Release"),
            tree_relationship("Iteration", "cp_iteration_card_id", "Iteration"),
            Arc::new(PropertyDefinition::new(
                "Related Card",
                "cp_related_card_card_id",
                PropertyKind::CardRelationship { valid_card_type: None },
            )),
        ],
        trees: vec![Arc::new(TreeConfiguration {
            id: 7,
            name: "Planning".into(),
            card_types: vec!["Release".into(), "Iteration".into(), "Story".into()],
        })],
        plans: vec![
            Arc::new(Plan {
                id: 3,
                name: "Q3 Plan".into(),
                program: "Platform".into(),
                linked_projects: vec!["demo".into()],
            }),
            Arc::new(Plan {
                id: 4,
                name: "Other Plan".into(),
                program: "Elsewhere".into(),
                linked_projects: vec!["another".into()],
            }),
        ],
        project_variables: vec![
            Arc::new(ProjectVariable::new("Current Release", Some("R1"))),
            Arc::new(ProjectVariable::new("Default Status", Some("Open"))),
            Arc::new(ProjectVariable::new("Unset Status", None)),
        ],
    }
}

/// A catalog property by name, falling back to the predefined ones.
pub(crate) fn property(name: &str) -> Arc<PropertyDefinition> {
    catalog().property(name).unwrap_or_else(|| {
        Arc::new(match name {
            "Type" => PropertyDefinition::card_type(),
            "Number" => PropertyDefinition::number(),
            "Name" => PropertyDefinition::card_name(),
            other => panic!("no fixture property {other}"),
        })
    })
}

pub(crate) fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
}

/// The release card `THIS CARD` points at.
pub(crate) fn release_card() -> ContentProvider {
    ContentProvider {
        id: 100,
        number: 10,
        name: "R1".into(),
        card_type: "Release".into(),
        values: HashMap::from([
            ("Status".to_string(), "Open".to_string()),
            ("Size".to_string(), "5".to_string()),
            ("Owner".to_string(), " ".to_string()),
        ]),
    }
}

pub(crate) struct Fixture {
    catalog: ProjectCatalog,
    schema: SchemaConfig,
    user: ActingUser,
    this_card: Option<ContentProvider>,
}

pub(crate) fn builder_fixture() -> Fixture {
    Fixture {
        catalog: catalog(),
        schema: SchemaConfig::default(),
        user: ActingUser::Anonymous,
        this_card: Some(release_card()),
    }
}

impl Fixture {
    pub(crate) fn with_user(mut self, login: &str) -> Self {
        self.user = ActingUser::Authenticated {
            login: login.to_string(),
        };
        self
    }

    pub(crate) fn without_this_card(mut self) -> Self {
        self.this_card = None;
        self
    }

    pub(crate) fn context(&self) -> QueryContext<'_> {
        let ctx = QueryContext::new(&self.catalog, &self.schema)
            .with_user(self.user.clone())
            .with_today(today());
        match &self.this_card {
            Some(card) => ctx.with_this_card(card.clone()),
            None => ctx,
        }
    }

    pub(crate) fn builder(&self) -> ConditionBuilder<'_> {
        ConditionBuilder::new(self.context())
    }
}
