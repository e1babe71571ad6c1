//! Sync Mapping Model

use serde::{Deserialize, Serialize};

/// External collection a mapping pulls from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceEntity {
    Products,
    Inventory,
}

impl SourceEntity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Products => "products",
            Self::Inventory => "inventory",
        }
    }
}

impl std::fmt::Display for SourceEntity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a single source field is carried into the target record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransformKind {
    /// Copy the value unchanged
    #[default]
    Copy,
    /// Lowercase a string value
    Lowercase,
    /// Uppercase a string value
    Uppercase,
    /// Coerce to a number (strings like "42" parse, else null)
    Number,
    /// Coerce to a decimal string suitable for price columns
    Decimal,
    /// Coerce to a boolean ("true"/"false"/1/0)
    Boolean,
}

/// Field-level transform rule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldTransform {
    /// Source field path in the external record (dot-separated)
    pub source: String,
    /// Target field name in the internal record
    pub target: String,
    #[serde(default)]
    pub kind: TransformKind,
}

/// Sync mapping entity
///
/// 一个映射把外部平台的一个集合（产品、库存）对接到内部的一张目标表。
/// `id` 不可变；配置（transforms、webhook_enabled）可由运营人员修改。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncMapping {
    pub id: String,
    pub name: String,
    pub source_entity: SourceEntity,
    /// Target table/entity descriptor in the internal store
    pub target_table: String,
    #[serde(default)]
    pub transforms: Vec<FieldTransform>,
    /// Whether inbound webhooks apply to this mapping
    #[serde(default)]
    pub webhook_enabled: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Create mapping payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncMappingCreate {
    pub name: String,
    pub source_entity: SourceEntity,
    pub target_table: String,
    #[serde(default)]
    pub transforms: Vec<FieldTransform>,
    #[serde(default)]
    pub webhook_enabled: bool,
}

/// Update mapping payload (identity fields excluded)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncMappingUpdate {
    pub name: Option<String>,
    pub target_table: Option<String>,
    pub transforms: Option<Vec<FieldTransform>>,
    pub webhook_enabled: Option<bool>,
}
