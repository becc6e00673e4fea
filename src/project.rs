//! Collaborators consulted while building and rendering card queries.
//!
//! Property definitions, card types, trees, plans and project variables are
//! owned by the surrounding application. This module only models the parts
//! the query engine reads, plus an in-memory [`ProjectCatalog`] that can be
//! loaded from JSON for tools and tests.

use std::collections::HashMap;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::ast::Condition;
use crate::column::Column;
use crate::config::{ConfigError, SchemaConfig};
use crate::error::{QueryError, QueryResult};
use crate::operator::Operator;

/// Date formats accepted for date property values, tried in order.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d %b %Y", "%d %B %Y", "%d/%m/%Y", "%m/%d/%Y"];

/// How a property stores and compares its values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PropertyKind {
    /// Free text, compared case-insensitively.
    Text,
    /// Managed list; `values` are in enumeration order.
    Enumerated {
        #[serde(default)]
        values: Vec<String>,
        #[serde(default)]
        numeric: bool,
    },
    /// Free numeric value.
    Numeric,
    Date,
    User,
    /// Another card, optionally restricted to one card type.
    CardRelationship {
        #[serde(default)]
        valid_card_type: Option<String>,
    },
    /// Parent card within a tree; `valid_card_type` is the parent's type.
    TreeRelationship {
        tree: String,
        valid_card_type: String,
    },
    /// The predefined `Type` property.
    CardType,
}

/// Broad value category used to decide how two sides may be compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueCategory {
    Numeric,
    Date,
    String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyDefinition {
    pub name: String,
    pub column_name: String,
    #[serde(flatten)]
    pub kind: PropertyKind,
}

impl PartialEq for PropertyDefinition {
    fn eq(&self, other: &Self) -> bool {
        self.column_name == other.column_name
    }
}

impl Eq for PropertyDefinition {}

impl Hash for PropertyDefinition {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.column_name.hash(state);
    }
}

impl PropertyDefinition {
    pub fn new(name: impl Into<String>, column_name: impl Into<String>, kind: PropertyKind) -> Self {
        Self {
            name: name.into(),
            column_name: column_name.into(),
            kind,
        }
    }

    /// The predefined `Type` property.
    pub fn card_type() -> Self {
        Self::new("Type", "card_type_name", PropertyKind::CardType)
    }

    /// The predefined `Number` property.
    pub fn number() -> Self {
        Self::new("Number", "number", PropertyKind::Numeric)
    }

    /// The predefined `Name` property.
    pub fn card_name() -> Self {
        Self::new("Name", "name", PropertyKind::Text)
    }

    pub fn is_numeric(&self) -> bool {
        match &self.kind {
            PropertyKind::Numeric => true,
            PropertyKind::Enumerated { numeric, .. } => *numeric,
            _ => false,
        }
    }

    pub fn is_date(&self) -> bool {
        matches!(self.kind, PropertyKind::Date)
    }

    pub fn is_relationship(&self) -> bool {
        matches!(
            self.kind,
            PropertyKind::CardRelationship { .. } | PropertyKind::TreeRelationship { .. }
        )
    }

    pub fn is_enumerated(&self) -> bool {
        matches!(self.kind, PropertyKind::Enumerated { .. })
    }

    pub fn is_user(&self) -> bool {
        matches!(self.kind, PropertyKind::User)
    }

    pub fn is_card_type(&self) -> bool {
        matches!(self.kind, PropertyKind::CardType)
    }

    /// Numeric and date properties compare by value; enumerations by position.
    pub fn is_ordinal(&self) -> bool {
        self.is_numeric() || self.is_date() || self.is_enumerated()
    }

    pub fn category(&self) -> ValueCategory {
        if self.is_numeric() {
            ValueCategory::Numeric
        } else if self.is_date() {
            ValueCategory::Date
        } else {
            ValueCategory::String
        }
    }

    /// Card type a relationship property points at, if restricted.
    pub fn valid_card_type(&self) -> Option<&str> {
        match &self.kind {
            PropertyKind::CardRelationship { valid_card_type } => valid_card_type.as_deref(),
            PropertyKind::TreeRelationship {
                valid_card_type, ..
            } => Some(valid_card_type),
            _ => None,
        }
    }

    pub fn enumeration_values(&self) -> &[String] {
        match &self.kind {
            PropertyKind::Enumerated { values, .. } => values,
            _ => &[],
        }
    }

    /// Position of `value` in the enumeration, compared case-insensitively.
    pub fn enumeration_position(&self, value: &str) -> Option<usize> {
        self.enumeration_values()
            .iter()
            .position(|v| v.eq_ignore_ascii_case(value))
    }

    /// Normalizes a user supplied value into the form stored in the database.
    ///
    /// Numbers are validated, dates become ISO `YYYY-MM-DD`, everything else is
    /// returned trimmed.
    pub fn coerce(&self, value: &str) -> QueryResult<String> {
        let trimmed = value.trim();
        if self.is_numeric() {
            trimmed.parse::<f64>().map_err(|_| {
                QueryError::new(format!(
                    "{trimmed} is an invalid numeric value for property {}",
                    self.name
                ))
            })?;
            Ok(trimmed.to_string())
        } else if self.is_date() {
            parse_date(trimmed)
                .map(|date| date.format("%Y-%m-%d").to_string())
                .ok_or_else(|| {
                    QueryError::new(format!(
                        "{trimmed} is an invalid date for property {}. Enter dates in 'dd mmm yyyy' or 'yyyy-mm-dd' format",
                        self.name
                    ))
                })
        } else {
            Ok(trimmed.to_string())
        }
    }
}

pub(crate) fn parse_date(value: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(value, format).ok())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardType {
    pub name: String,
    pub position: usize,
}

/// A hierarchy of card types; `card_types` run from the root type downward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeConfiguration {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub card_types: Vec<String>,
}

impl TreeConfiguration {
    /// Card types at or below `card_type` in this tree, top-down.
    pub fn card_types_at_or_below(&self, card_type: &str) -> &[String] {
        match self
            .card_types
            .iter()
            .position(|t| t.eq_ignore_ascii_case(card_type))
        {
            Some(index) => &self.card_types[index..],
            None => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub id: i64,
    pub name: String,
    pub program: String,
    /// Identifiers of the projects this plan's program includes.
    #[serde(default)]
    pub linked_projects: Vec<String>,
}

/// A named placeholder whose current value is substituted into comparisons.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectVariable {
    pub name: String,
    #[serde(default)]
    pub value: Option<String>,
}

impl PartialEq for ProjectVariable {
    fn eq(&self, other: &Self) -> bool {
        self.name.eq_ignore_ascii_case(&other.name)
    }
}

impl Eq for ProjectVariable {}

impl Hash for ProjectVariable {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.to_lowercase().hash(state);
    }
}

impl ProjectVariable {
    pub fn new(name: impl Into<String>, value: Option<&str>) -> Self {
        Self {
            name: name.into(),
            value: value.map(str::to_string),
        }
    }

    /// An unset variable behaves like a blank value and so compares as NULL.
    pub fn is_not_set(&self) -> bool {
        self.value.as_deref().map_or(true, |v| v.trim().is_empty())
    }

    /// The comparison this variable stands for once its value is known.
    ///
    /// Unset variables become NULL checks; ordinal comparisons against an
    /// unset variable never match.
    pub fn comparison_condition(&self, column: &Column, operator: Operator) -> Condition {
        match self.value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
            Some(value) => Condition::ComparisonWithValue {
                column: column.clone(),
                operator,
                value: value.to_string(),
            },
            None if operator == Operator::NotEquals => Condition::negate(Condition::IsNull(column.clone())),
            None if operator.is_ordinal() => Condition::or(Vec::new()),
            None => Condition::IsNull(column.clone()),
        }
    }
}

/// The user the query is evaluated for.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ActingUser {
    #[default]
    Anonymous,
    Authenticated { login: String },
}

impl ActingUser {
    pub fn login(&self) -> Option<&str> {
        match self {
            ActingUser::Anonymous => None,
            ActingUser::Authenticated { login } => Some(login),
        }
    }
}

/// The card `THIS CARD` refers to.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ContentProvider {
    pub id: i64,
    pub number: i64,
    pub name: String,
    pub card_type: String,
    /// Property name to current value; missing entries are blank.
    #[serde(default)]
    pub values: HashMap<String, String>,
}

impl ContentProvider {
    pub fn value_of(&self, property: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(property))
            .map(|(_, value)| value.as_str())
            .filter(|value| !value.trim().is_empty())
    }
}

/// Read-only project schema the engine looks names up in.
pub trait ProjectMetadata {
    /// Identifier of the project queries are written against.
    fn identifier(&self) -> &str;
    /// All card types ordered by position.
    fn card_types(&self) -> Vec<CardType>;
    fn card_type(&self, name: &str) -> Option<CardType>;
    fn property(&self, name: &str) -> Option<Arc<PropertyDefinition>>;
    fn tree(&self, name: &str) -> Option<Arc<TreeConfiguration>>;
    fn plan(&self, name: &str) -> Option<Arc<Plan>>;
    fn project_variable(&self, name: &str) -> Option<Arc<ProjectVariable>>;
}

/// In-memory [`ProjectMetadata`], usually loaded from a JSON fixture.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectCatalog {
    pub identifier: String,
    #[serde(default)]
    pub card_types: Vec<CardType>,
    #[serde(default)]
    pub properties: Vec<Arc<PropertyDefinition>>,
    #[serde(default)]
    pub trees: Vec<Arc<TreeConfiguration>>,
    #[serde(default)]
    pub plans: Vec<Arc<Plan>>,
    #[serde(default)]
    pub project_variables: Vec<Arc<ProjectVariable>>,
}

impl ProjectCatalog {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let content = fs::read_to_string(path_ref).map_err(|e| {
            ConfigError::new(format!("无法读取项目文件 {}: {}", path_ref.display(), e))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            ConfigError::new(format!("无法解析项目文件 {}: {}", path_ref.display(), e))
        })
    }
}

fn find_named<T>(items: &[Arc<T>], name: &str, name_of: impl Fn(&T) -> &str) -> Option<Arc<T>> {
    items
        .iter()
        .find(|item| name_of(item.as_ref()).eq_ignore_ascii_case(name))
        .cloned()
}

impl ProjectMetadata for ProjectCatalog {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn card_types(&self) -> Vec<CardType> {
        let mut types = self.card_types.clone();
        types.sort_by_key(|t| t.position);
        types
    }

    fn card_type(&self, name: &str) -> Option<CardType> {
        self.card_types
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(name))
            .cloned()
    }

    fn property(&self, name: &str) -> Option<Arc<PropertyDefinition>> {
        find_named(&self.properties, name, |p| p.name.as_str())
    }

    fn tree(&self, name: &str) -> Option<Arc<TreeConfiguration>> {
        find_named(&self.trees, name, |t| t.name.as_str())
    }

    fn plan(&self, name: &str) -> Option<Arc<Plan>> {
        find_named(&self.plans, name, |p| p.name.as_str())
    }

    fn project_variable(&self, name: &str) -> Option<Arc<ProjectVariable>> {
        find_named(&self.project_variables, name, |v| v.name.as_str())
    }
}

/// Everything a traversal may consult besides the tree itself.
///
/// Passed explicitly to the builder, the SQL renderer and the context-aware
/// detectors; never stored globally.
#[derive(Clone)]
pub struct QueryContext<'a> {
    pub metadata: &'a dyn ProjectMetadata,
    pub schema: &'a SchemaConfig,
    pub user: ActingUser,
    pub this_card: Option<ContentProvider>,
    pub today: NaiveDate,
}

impl<'a> QueryContext<'a> {
    pub fn new(metadata: &'a dyn ProjectMetadata, schema: &'a SchemaConfig) -> Self {
        Self {
            metadata,
            schema,
            user: ActingUser::Anonymous,
            this_card: None,
            today: chrono::Local::now().date_naive(),
        }
    }

    pub fn with_user(mut self, user: ActingUser) -> Self {
        self.user = user;
        self
    }

    pub fn with_this_card(mut self, card: ContentProvider) -> Self {
        self.this_card = Some(card);
        self
    }

    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub(crate) fn require_this_card(&self) -> QueryResult<&ContentProvider> {
        self.this_card.as_ref().ok_or_else(|| {
            QueryError::new("THIS CARD is not supported here: there is no current card")
        })
    }
}
