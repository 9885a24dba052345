//! Resource catalog
//!
//! Read-only lookups of resource types and resources.

use crate::client::SimHubClient;
use crate::error::Result;
use crate::models::{Resource, ResourceListResponse, ResourceType};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Characters left unescaped in query values and path segments
const QUERY_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Filter and paging for [`SimHubClient::list_resources`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceQuery {
    pub type_key: Option<String>,
    pub keyword: Option<String>,
    /// 1-based page number
    pub page: u32,
    pub size: u32,
}

impl Default for ResourceQuery {
    fn default() -> Self {
        Self {
            type_key: None,
            keyword: None,
            page: 1,
            size: 20,
        }
    }
}

impl ResourceQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn type_key(mut self, type_key: impl Into<String>) -> Self {
        self.type_key = Some(type_key.into());
        self
    }

    pub fn keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keyword = Some(keyword.into());
        self
    }

    pub fn page(mut self, page: u32) -> Self {
        self.page = page;
        self
    }

    pub fn size(mut self, size: u32) -> Self {
        self.size = size;
        self
    }

    /// Query string without the leading `?`
    pub fn to_query_string(&self) -> String {
        let mut query = format!("page={}&size={}", self.page, self.size);
        let optional = [("type_key", &self.type_key), ("keyword", &self.keyword)];
        for (name, value) in optional {
            if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
                query.push('&');
                query.push_str(name);
                query.push('=');
                query.push_str(&utf8_percent_encode(value, QUERY_VALUE).to_string());
            }
        }
        query
    }
}

impl SimHubClient {
    /// All registered resource types
    #[tracing::instrument(name = "simhub.catalog.types", skip(self), err)]
    pub async fn list_resource_types(&self) -> Result<Vec<ResourceType>> {
        self.api.get_json("/api/v1/resource-types").await
    }

    /// One page of resources
    #[tracing::instrument(
        name = "simhub.catalog.list",
        skip(self, query),
        fields(page = query.page, size = query.size, total = tracing::field::Empty),
        err
    )]
    pub async fn list_resources(&self, query: &ResourceQuery) -> Result<ResourceListResponse> {
        let path = format!("/api/v1/resources?{}", query.to_query_string());
        let page: ResourceListResponse = self.api.get_json(&path).await?;
        tracing::Span::current().record("total", page.total);
        Ok(page)
    }

    /// A single resource with its latest version
    #[tracing::instrument(name = "simhub.catalog.get", skip(self), err)]
    pub async fn get_resource(&self, id: &str) -> Result<Resource> {
        let path = format!(
            "/api/v1/resources/{}",
            utf8_percent_encode(id, QUERY_VALUE)
        );
        self.api.get_json(&path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_query() {
        assert_eq!(ResourceQuery::default().to_query_string(), "page=1&size=20");
    }

    #[test]
    fn test_query_encodes_values() {
        let query = ResourceQuery::new()
            .type_key("map")
            .keyword("old town&co")
            .page(3)
            .size(50);
        assert_eq!(
            query.to_query_string(),
            "page=3&size=50&type_key=map&keyword=old%20town%26co"
        );
    }

    #[test]
    fn test_empty_filters_are_omitted() {
        let query = ResourceQuery::new().keyword("");
        assert_eq!(query.to_query_string(), "page=1&size=20");
    }
}
