//! 配置模块，负责从JSON配置文件加载数据库表结构与SQL方言

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use sea_query::{
    MysqlQueryBuilder, PostgresQueryBuilder, QueryBuilder, SelectStatement, SqliteQueryBuilder,
    Value,
};

/// 配置错误
#[derive(Debug, Error)]
#[error("配置错误: {message}")]
pub struct ConfigError {
    pub message: String,
}

impl ConfigError {
    pub fn new(message: String) -> Self {
        Self { message }
    }
}

/// 生成SQL时使用的数据库方言
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SqlDialect {
    #[default]
    Postgres,
    Mysql,
    Sqlite,
}

impl SqlDialect {
    /// Renders a literal with the dialect's quoting and escaping rules.
    pub fn quote_value(&self, value: impl Into<Value>) -> String {
        let value = value.into();
        match self {
            SqlDialect::Postgres => PostgresQueryBuilder.value_to_string(&value),
            SqlDialect::Mysql => MysqlQueryBuilder.value_to_string(&value),
            SqlDialect::Sqlite => SqliteQueryBuilder.value_to_string(&value),
        }
    }

    pub fn build(&self, select: &SelectStatement) -> String {
        match self {
            SqlDialect::Postgres => select.to_string(PostgresQueryBuilder),
            SqlDialect::Mysql => select.to_string(MysqlQueryBuilder),
            SqlDialect::Sqlite => select.to_string(SqliteQueryBuilder),
        }
    }
}

/// 表结构配置：渲染SQL时引用的表名
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaConfig {
    pub dialect: SqlDialect,
    pub cards_table: String,
    pub card_types_table: String,
    pub card_versions_table: String,
    pub users_table: String,
    pub tags_table: String,
    pub taggings_table: String,
    pub tree_belongings_table: String,
    pub works_table: String,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            dialect: SqlDialect::Postgres,
            cards_table: "cards".to_string(),
            card_types_table: "card_types".to_string(),
            card_versions_table: "card_versions".to_string(),
            users_table: "users".to_string(),
            tags_table: "tags".to_string(),
            taggings_table: "taggings".to_string(),
            tree_belongings_table: "card_trees_belongings".to_string(),
            works_table: "works".to_string(),
        }
    }
}

impl SchemaConfig {
    /// 从JSON文件加载表结构配置，缺省的键使用默认值
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();

        if !path_ref.exists() {
            return Err(ConfigError::new(format!(
                "配置文件不存在: {}",
                path_ref.display()
            )));
        }

        let content = fs::read_to_string(path_ref).map_err(|e| {
            ConfigError::new(format!("无法读取配置文件 {}: {}", path_ref.display(), e))
        })?;

        serde_json::from_str(&content).map_err(|e| {
            ConfigError::new(format!(
                "无法解析JSON配置文件 {}: {}",
                path_ref.display(),
                e
            ))
        })
    }

    /// Fully qualified column of the cards table.
    pub fn card_column(&self, column: &str) -> String {
        format!("{}.{}", self.cards_table, column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_partial_json_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{
            "dialect": "sqlite",
            "cards_table": "mingle_cards"
        }}"#
        )
        .unwrap();

        let config = SchemaConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.dialect, SqlDialect::Sqlite);
        assert_eq!(config.cards_table, "mingle_cards");
        assert_eq!(config.users_table, "users");
        assert_eq!(config.card_types_table, "card_types");
        assert_eq!(config.card_column("number"), "mingle_cards.number");
    }

    #[test]
    fn test_invalid_json_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "invalid json").unwrap();

        let result = SchemaConfig::from_json_file(file.path());
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_file() {
        let result = SchemaConfig::from_json_file("non_existent_schema.json");
        assert!(result.is_err());
    }

    #[test]
    fn test_quote_value() {
        assert_eq!(SqlDialect::Postgres.quote_value("open"), "'open'");
        assert_eq!(SqlDialect::Mysql.quote_value(12i64), "12");
        assert_ne!(SqlDialect::Sqlite.quote_value("it's"), "'it's'");
    }
}
