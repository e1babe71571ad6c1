//! Platform Connector: GraphQL client for the external e-commerce platform

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use shared::models::SourceEntity;

use crate::utils::AppError;

/// One record as delivered by the platform
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformRecord {
    /// Platform-stable record ID
    pub id: String,
    /// Platform modification timestamp (millis)
    pub updated_at: i64,
    /// Raw field payload, transformed by the mapping before upsert
    pub fields: serde_json::Value,
}

/// One page of a paginated pull
#[derive(Debug, Clone, Default)]
pub struct PlatformPage {
    pub records: Vec<PlatformRecord>,
    /// Cursor for the next page; `None` means the pull is complete
    pub next_cursor: Option<String>,
}

/// Introspected field of a platform entity, seeds mapping configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    /// GraphQL scalar kind, e.g. "String", "Float", "Boolean"
    pub kind: String,
}

/// The platform as the engine sees it
///
/// `updated_since = None` pulls the complete dataset (full sync);
/// `Some(ts)` restricts the pull to records changed at or after `ts`
/// (incremental sync with the lookback already applied by the caller).
#[async_trait]
pub trait PlatformSource: Send + Sync {
    async fn test_connection(&self) -> Result<(), AppError>;

    async fn fetch_page(
        &self,
        entity: SourceEntity,
        cursor: Option<String>,
        updated_since: Option<i64>,
    ) -> Result<PlatformPage, AppError>;

    async fn introspect_fields(&self, entity: SourceEntity) -> Result<Vec<FieldDescriptor>, AppError>;
}

/// HTTP implementation against the platform's GraphQL admin API
pub struct HttpPlatformConnector {
    client: Client,
    api_url: String,
    access_token: String,
    page_size: u32,
}

#[derive(Serialize)]
struct GraphQlRequest<'a> {
    query: &'a str,
    variables: serde_json::Value,
}

impl HttpPlatformConnector {
    pub fn new(api_url: String, access_token: String, page_size: u32) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| AppError::internal(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_url,
            access_token,
            page_size,
        })
    }

    /// POST one GraphQL document and return the `data` object
    async fn execute(
        &self,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<serde_json::Value, AppError> {
        let response = self
            .client
            .post(&self.api_url)
            .header("X-Platform-Access-Token", &self.access_token)
            .json(&GraphQlRequest { query, variables })
            .send()
            .await
            .map_err(|e| AppError::internal(format!("Platform request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::internal(format!(
                "Platform request failed with status {status}: {body}"
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AppError::internal(format!("Failed to parse platform response: {e}")))?;

        if let Some(errors) = body.get("errors")
            && errors.as_array().is_some_and(|a| !a.is_empty())
        {
            return Err(AppError::internal(format!("Platform GraphQL error: {errors}")));
        }

        body.get("data")
            .cloned()
            .ok_or_else(|| AppError::internal("Platform response missing data".to_string()))
    }

    fn connection_field(entity: SourceEntity) -> &'static str {
        match entity {
            SourceEntity::Products => "products",
            SourceEntity::Inventory => "inventoryItems",
        }
    }

    fn type_name(entity: SourceEntity) -> &'static str {
        match entity {
            SourceEntity::Products => "Product",
            SourceEntity::Inventory => "InventoryItem",
        }
    }
}

/// Parse the platform's RFC 3339 `updatedAt` into epoch millis
fn parse_updated_at(node: &serde_json::Value) -> i64 {
    node.get("updatedAt")
        .and_then(|v| v.as_str())
        .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.timestamp_millis())
        .unwrap_or(0)
}

#[async_trait]
impl PlatformSource for HttpPlatformConnector {
    async fn test_connection(&self) -> Result<(), AppError> {
        self.execute("query { shop { name } }", serde_json::json!({}))
            .await
            .map(|_| ())
    }

    async fn fetch_page(
        &self,
        entity: SourceEntity,
        cursor: Option<String>,
        updated_since: Option<i64>,
    ) -> Result<PlatformPage, AppError> {
        let field = Self::connection_field(entity);
        // Platform search syntax: updated_at:>=<rfc3339>
        let search = updated_since
            .and_then(chrono::DateTime::from_timestamp_millis)
            .map(|dt| format!("updated_at:>='{}'", dt.to_rfc3339()))
            .unwrap_or_default();

        let query = format!(
            "query Pull($first: Int!, $after: String, $query: String) {{
                {field}(first: $first, after: $after, query: $query) {{
                    edges {{ cursor node }}
                    pageInfo {{ hasNextPage }}
                }}
            }}"
        );
        let data = self
            .execute(
                &query,
                serde_json::json!({
                    "first": self.page_size,
                    "after": cursor,
                    "query": if search.is_empty() { serde_json::Value::Null } else { search.clone().into() },
                }),
            )
            .await?;

        let connection = data
            .get(field)
            .ok_or_else(|| AppError::internal(format!("Platform response missing {field}")))?;
        let edges = connection
            .get("edges")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();

        let mut records = Vec::with_capacity(edges.len());
        let mut last_cursor = None;
        for edge in &edges {
            let node = edge.get("node").cloned().unwrap_or(serde_json::Value::Null);
            let id = node
                .get("id")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            if id.is_empty() {
                continue;
            }
            records.push(PlatformRecord {
                id,
                updated_at: parse_updated_at(&node),
                fields: node,
            });
            last_cursor = edge.get("cursor").and_then(|v| v.as_str()).map(String::from);
        }

        let has_next = connection
            .pointer("/pageInfo/hasNextPage")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        Ok(PlatformPage {
            records,
            next_cursor: if has_next { last_cursor } else { None },
        })
    }

    async fn introspect_fields(&self, entity: SourceEntity) -> Result<Vec<FieldDescriptor>, AppError> {
        let data = self
            .execute(
                "query Introspect($name: String!) {
                    __type(name: $name) {
                        fields { name type { name kind } }
                    }
                }",
                serde_json::json!({ "name": Self::type_name(entity) }),
            )
            .await?;

        let fields = data
            .pointer("/__type/fields")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();

        Ok(fields
            .iter()
            .filter_map(|f| {
                let name = f.get("name")?.as_str()?.to_string();
                let kind = f
                    .pointer("/type/name")
                    .and_then(|v| v.as_str())
                    .or_else(|| f.pointer("/type/kind").and_then(|v| v.as_str()))
                    .unwrap_or("Unknown")
                    .to_string();
                Some(FieldDescriptor { name, kind })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rfc3339_updated_at() {
        let node = serde_json::json!({ "updatedAt": "2026-01-15T10:30:00Z" });
        assert_eq!(parse_updated_at(&node), 1_768_473_000_000);
    }

    #[test]
    fn missing_updated_at_defaults_to_zero() {
        let node = serde_json::json!({ "title": "No timestamp" });
        assert_eq!(parse_updated_at(&node), 0);
    }
}
