//! Latest-release discovery through the GitLab GraphQL API.

use async_trait::async_trait;
use bcsetup_core::tools::{ReleaseSource, VersionTag};
use bcsetup_core::{Error, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::PROJECT_PATH;

/// Public GraphQL endpoint of gitlab.com.
pub const GRAPHQL_ENDPOINT: &str = "https://gitlab.com/api/graphql";

const OPERATION_NAME: &str = "allReleases";

const RELEASES_QUERY: &str = "query allReleases($fullPath: ID!, $first: Int, $sort: ReleaseSort) {
  project(fullPath: $fullPath) {
    releases(first: $first, sort: $sort) {
      nodes {
        tagName
      }
    }
  }
}";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GraphQlRequest<'a> {
    operation_name: &'a str,
    variables: ReleaseVariables<'a>,
    query: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReleaseVariables<'a> {
    full_path: &'a str,
    first: u32,
    sort: &'a str,
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    data: Option<ResponseData>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct ResponseData {
    project: Option<Project>,
}

#[derive(Debug, Deserialize)]
struct Project {
    releases: Option<Releases>,
}

#[derive(Debug, Deserialize)]
struct Releases {
    #[serde(default)]
    nodes: Vec<ReleaseNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReleaseNode {
    tag_name: Option<String>,
}

impl GraphQlResponse {
    /// Tag at `data.project.releases.nodes[0].tagName`.
    fn latest_tag(self) -> Result<VersionTag> {
        if let Some(err) = self.errors.first() {
            return Err(Error::release_query(format!("GraphQL error: {}", err.message)));
        }
        self.data
            .and_then(|d| d.project)
            .and_then(|p| p.releases)
            .and_then(|r| r.nodes.into_iter().next())
            .and_then(|n| n.tag_name)
            .filter(|t| !t.trim().is_empty())
            .map(VersionTag::new)
            .ok_or_else(|| Error::release_query("response has no release tag"))
    }
}

/// Release listing for a GitLab project.
pub struct GitLabReleases {
    client: Client,
    endpoint: String,
    project_path: String,
    timeout: Duration,
}

impl GitLabReleases {
    /// Releases of the buildcache project on gitlab.com.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: crate::http_client()?,
            endpoint: GRAPHQL_ENDPOINT.to_string(),
            project_path: PROJECT_PATH.to_string(),
            timeout: DEFAULT_TIMEOUT,
        })
    }

    /// Query a different GraphQL endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Bound the query duration.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn request_body(&self) -> GraphQlRequest<'_> {
        GraphQlRequest {
            operation_name: OPERATION_NAME,
            variables: ReleaseVariables {
                full_path: &self.project_path,
                first: 1,
                sort: "RELEASED_AT_DESC",
            },
            query: RELEASES_QUERY,
        }
    }
}

#[async_trait]
impl ReleaseSource for GitLabReleases {
    fn name(&self) -> &'static str {
        "gitlab"
    }

    async fn latest_tag(&self) -> Result<VersionTag> {
        debug!(endpoint = %self.endpoint, project = %self.project_path, "Querying latest release");

        let response = self
            .client
            .post(&self.endpoint)
            .timeout(self.timeout)
            .json(&self.request_body())
            .send()
            .await
            .map_err(|e| Error::release_query(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::release_query(format!(
                "HTTP {} from {}",
                response.status(),
                self.endpoint
            )));
        }

        let body: GraphQlResponse = response
            .json()
            .await
            .map_err(|e| Error::release_query(format!("malformed response: {e}")))?;
        body.latest_tag()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Result<VersionTag> {
        serde_json::from_str::<GraphQlResponse>(json).unwrap().latest_tag()
    }

    #[test]
    fn test_request_body_shape() {
        let releases = GitLabReleases::new().unwrap();
        let body = serde_json::to_value(releases.request_body()).unwrap();

        assert_eq!(body["operationName"], "allReleases");
        assert_eq!(body["variables"]["fullPath"], "bits-n-bites/buildcache");
        assert_eq!(body["variables"]["first"], 1);
        assert_eq!(body["variables"]["sort"], "RELEASED_AT_DESC");
        assert!(body["query"].as_str().unwrap().contains("tagName"));
    }

    #[test]
    fn test_latest_tag_from_first_node() {
        let tag = parse(
            r#"{"data":{"project":{"releases":{"nodes":[{"tagName":"v0.28.9"},{"tagName":"v0.28.8"}]}}}}"#,
        )
        .unwrap();
        assert_eq!(tag.as_str(), "v0.28.9");
    }

    #[test]
    fn test_empty_node_list_is_error() {
        let err = parse(r#"{"data":{"project":{"releases":{"nodes":[]}}}}"#).unwrap_err();
        assert!(matches!(err, Error::ReleaseQuery { .. }));
    }

    #[test]
    fn test_missing_project_is_error() {
        assert!(parse(r#"{"data":{"project":null}}"#).is_err());
        assert!(parse(r#"{"data":null}"#).is_err());
        assert!(parse("{}").is_err());
    }

    #[test]
    fn test_graphql_errors_are_reported() {
        let err = parse(r#"{"errors":[{"message":"rate limited"}],"data":null}"#).unwrap_err();
        assert!(err.to_string().contains("rate limited"));
    }

    #[test]
    fn test_blank_tag_is_error() {
        assert!(parse(r#"{"data":{"project":{"releases":{"nodes":[{"tagName":" "}]}}}}"#).is_err());
    }
}
