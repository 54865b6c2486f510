//! 配置模块，负责字段到存储列的映射以及从JSON配置文件加载映射

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// 字段映射配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("配置文件不存在: {}", .0.display())]
    NotFound(PathBuf),

    #[error("无法读取配置文件 {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("无法解析JSON配置: {0}")]
    Json(#[from] serde_json::Error),

    #[error("字段 '{0}' 没有映射到任何列")]
    EmptyAccessor(String),
}

/// 逻辑字段对应的存储列，可以是单列或多列
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldAccessor {
    Column(String),
    /// 多列字段，例如 `text` 同时匹配标题和描述
    Columns(Vec<String>),
}

impl FieldAccessor {
    pub fn columns(&self) -> &[String] {
        match self {
            FieldAccessor::Column(column) => std::slice::from_ref(column),
            FieldAccessor::Columns(columns) => columns,
        }
    }

    /// 排序时使用的列
    pub fn primary_column(&self) -> &str {
        self.columns().first().map(String::as_str).unwrap_or_default()
    }
}

/// 字段映射配置结构
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMapping {
    /// 存储问题记录的表名
    pub table: String,
    /// 逻辑字段名到存储列的映射
    pub fields: HashMap<String, FieldAccessor>,
}

/// JSON配置文件的结构，所有项都是可选的，会覆盖默认映射
#[derive(Debug, Deserialize)]
struct MappingFile {
    table: Option<String>,
    #[serde(default)]
    fields: HashMap<String, FieldAccessor>,
}

impl FieldMapping {
    /// 从JSON文件加载字段映射配置
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();

        // 检查文件是否存在
        if !path_ref.exists() {
            return Err(ConfigError::NotFound(path_ref.to_path_buf()));
        }

        // 读取文件内容
        let content = fs::read_to_string(path_ref).map_err(|source| ConfigError::Io {
            path: path_ref.to_path_buf(),
            source,
        })?;

        Self::from_json_str(&content)
    }

    /// 解析JSON配置，并与默认映射合并
    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        let file: MappingFile = serde_json::from_str(content)?;

        let mut mapping = Self::default();
        if let Some(table) = file.table {
            mapping.table = table;
        }
        for (field, accessor) in file.fields {
            if accessor.columns().is_empty() {
                return Err(ConfigError::EmptyAccessor(field));
            }
            mapping.fields.insert(field, accessor);
        }
        Ok(mapping)
    }

    /// 获取字段对应的存储列，未知字段原样透传
    pub fn accessor(&self, field: &str) -> Cow<'_, FieldAccessor> {
        match self.fields.get(field) {
            Some(accessor) => Cow::Borrowed(accessor),
            None => {
                debug!(field, "unmapped field passed through as column");
                Cow::Owned(FieldAccessor::Column(field.to_string()))
            }
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }
}

impl Default for FieldMapping {
    fn default() -> Self {
        let single = [
            ("project", "project_key"),
            ("type", "issue_type"),
            ("status", "status"),
            ("priority", "priority"),
            ("assignee", "assignee_id"),
            ("reporter", "reporter_id"),
            ("created", "created_at"),
            ("updated", "updated_at"),
            ("resolved", "resolved_at"),
            ("due", "due_date"),
            ("summary", "summary"),
            ("description", "description"),
            ("key", "issue_key"),
            ("storyPoints", "story_points"),
            ("sprint", "sprint_id"),
            ("epic", "epic_key"),
            ("parent", "parent_key"),
            ("labels", "labels"),
        ];

        let mut fields: HashMap<String, FieldAccessor> = single
            .into_iter()
            .map(|(field, column)| (field.to_string(), FieldAccessor::Column(column.to_string())))
            .collect();
        fields.insert(
            "text".to_string(),
            FieldAccessor::Columns(vec!["summary".to_string(), "description".to_string()]),
        );

        Self {
            table: "issues".to_string(),
            fields,
        }
    }
}
