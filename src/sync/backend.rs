//! ConfigBackend trait and its HTTP implementation.
//!
//! Endpoints used (all relative to `{base_url}/v1/projects/{project}/remoteConfig`):
//! - `GET`  template, ETag in response header
//! - `PUT`  template with `If-Match`, optional `?validateOnly=true`
//! - `POST :rollback` with `{"versionNumber": "..."}`
//! - `GET  :listVersions?pageSize=N`

use crate::error::{SyncError, SyncResult};
use crate::template::{Precondition, Template, VersionToken};
use reqwest::blocking::{Client, Response};
use reqwest::header::{CONTENT_TYPE, ETAG, IF_MATCH};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://firebaseremoteconfig.googleapis.com";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Template and ETag as returned by a read.
#[derive(Debug, Clone)]
pub struct Fetched {
    pub template: Template,
    /// Missing when the server sent no ETag header.
    pub etag: Option<VersionToken>,
}

/// Outcome of a successful write or rollback.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteResult {
    /// ETag of the revision now live on the server.
    pub etag: Option<VersionToken>,
    /// `version.versionNumber` of the returned template, if present.
    pub version_number: Option<String>,
}

impl WriteResult {
    fn from_parts(etag: Option<VersionToken>, body: &str) -> Self {
        let version_number = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|v| {
                v.pointer("/version/versionNumber")
                    .and_then(|n| n.as_str())
                    .map(str::to_string)
            });
        Self {
            etag,
            version_number,
        }
    }
}

/// Metadata of one stored template revision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    pub version_number: String,
    #[serde(default)]
    pub update_time: Option<String>,
    #[serde(default)]
    pub update_user: Option<UpdateUser>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub update_origin: Option<String>,
    #[serde(default)]
    pub update_type: Option<String>,
    #[serde(default)]
    pub rollback_source: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateUser {
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListVersionsResponse {
    #[serde(default)]
    versions: Vec<VersionInfo>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RollbackRequest<'a> {
    version_number: &'a str,
}

/// Remote store of the template.
///
/// Every call is a single attempt. Implementations never retry.
pub trait ConfigBackend {
    fn read(&self, access_token: &str) -> SyncResult<Fetched>;

    /// Publish `template` guarded by `precondition`. With `validate_only` the
    /// server checks the template without publishing it.
    fn write(
        &self,
        access_token: &str,
        template: &Template,
        precondition: &Precondition,
        validate_only: bool,
    ) -> SyncResult<WriteResult>;

    fn rollback(&self, access_token: &str, version_number: &str) -> SyncResult<WriteResult>;

    fn list_versions(&self, access_token: &str, page_size: u32) -> SyncResult<Vec<VersionInfo>>;
}

/// Firebase Remote Config REST API client.
pub struct HttpBackend {
    client: Client,
    endpoint: String,
}

impl HttpBackend {
    pub fn new(base_url: &str, project_id: &str) -> SyncResult<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("rcsync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SyncError::Config(format!("cannot build HTTP client: {}", e)))?;

        let endpoint = format!(
            "{}/v1/projects/{}/remoteConfig",
            base_url.trim_end_matches('/'),
            project_id
        );

        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

fn header_etag(response: &Response) -> Option<VersionToken> {
    response
        .headers()
        .get(ETAG)
        .and_then(|v| v.to_str().ok())
        .and_then(VersionToken::new)
}

/// Split a response into status and body text.
///
/// A body that cannot be read (dropped connection, corrupt gzip stream) is
/// turned into an error by `fail`, never into an empty string.
fn read_body(
    response: Response,
    fail: impl FnOnce(Option<u16>, String) -> SyncError,
) -> SyncResult<(StatusCode, String)> {
    let status = response.status();
    match response.text() {
        Ok(body) => Ok((status, body)),
        Err(e) => Err(fail(
            Some(status.as_u16()),
            format!("cannot read response body: {}", e),
        )),
    }
}

impl ConfigBackend for HttpBackend {
    fn read(&self, access_token: &str) -> SyncResult<Fetched> {
        debug!("GET {}", self.endpoint);

        let response = self
            .client
            .get(&self.endpoint)
            .bearer_auth(access_token)
            .send()
            .map_err(|e| SyncError::Fetch {
                operation: "fetch",
                status: None,
                body: e.to_string(),
            })?;

        let etag = header_etag(&response);
        let (status, body) = read_body(response, |status, body| SyncError::Fetch {
            operation: "fetch",
            status,
            body,
        })?;

        if status != StatusCode::OK {
            return Err(SyncError::Fetch {
                operation: "fetch",
                status: Some(status.as_u16()),
                body,
            });
        }

        let template = Template::from_json(&body).map_err(|e| SyncError::Fetch {
            operation: "fetch",
            status: Some(status.as_u16()),
            body: format!("invalid template JSON: {}", e),
        })?;

        Ok(Fetched { template, etag })
    }

    fn write(
        &self,
        access_token: &str,
        template: &Template,
        precondition: &Precondition,
        validate_only: bool,
    ) -> SyncResult<WriteResult> {
        let operation = if validate_only { "validate" } else { "write" };

        let payload = template.to_json().map_err(|e| SyncError::Write {
            operation,
            status: None,
            body: format!("cannot serialize template: {}", e),
        })?;

        debug!(
            "PUT {} (If-Match: {}, validateOnly: {})",
            self.endpoint,
            precondition.header_value(),
            validate_only
        );

        let mut request = self
            .client
            .put(&self.endpoint)
            .bearer_auth(access_token)
            .header(CONTENT_TYPE, "application/json")
            .header(IF_MATCH, precondition.header_value())
            .body(payload);
        if validate_only {
            request = request.query(&[("validateOnly", "true")]);
        }

        let response = request.send().map_err(|e| SyncError::Write {
            operation,
            status: None,
            body: e.to_string(),
        })?;

        let etag = header_etag(&response);
        let (status, body) = read_body(response, |status, body| SyncError::Write {
            operation,
            status,
            body,
        })?;

        match status {
            StatusCode::OK => Ok(WriteResult::from_parts(etag, &body)),
            StatusCode::PRECONDITION_FAILED | StatusCode::CONFLICT => Err(SyncError::Conflict {
                operation,
                status: status.as_u16(),
                etag: precondition.header_value().to_string(),
                body,
            }),
            _ => Err(SyncError::Write {
                operation,
                status: Some(status.as_u16()),
                body,
            }),
        }
    }

    fn rollback(&self, access_token: &str, version_number: &str) -> SyncResult<WriteResult> {
        let url = format!("{}:rollback", self.endpoint);
        debug!("POST {} (versionNumber: {})", url, version_number);

        let response = self
            .client
            .post(&url)
            .bearer_auth(access_token)
            .json(&RollbackRequest { version_number })
            .send()
            .map_err(|e| SyncError::Write {
                operation: "rollback",
                status: None,
                body: e.to_string(),
            })?;

        let etag = header_etag(&response);
        let (status, body) = read_body(response, |status, body| SyncError::Write {
            operation: "rollback",
            status,
            body,
        })?;

        if status != StatusCode::OK {
            return Err(SyncError::Write {
                operation: "rollback",
                status: Some(status.as_u16()),
                body,
            });
        }

        Ok(WriteResult::from_parts(etag, &body))
    }

    fn list_versions(&self, access_token: &str, page_size: u32) -> SyncResult<Vec<VersionInfo>> {
        let url = format!("{}:listVersions", self.endpoint);
        debug!("GET {} (pageSize: {})", url, page_size);

        let response = self
            .client
            .get(&url)
            .bearer_auth(access_token)
            .query(&[("pageSize", page_size)])
            .send()
            .map_err(|e| SyncError::Fetch {
                operation: "list versions",
                status: None,
                body: e.to_string(),
            })?;

        let (status, body) = read_body(response, |status, body| SyncError::Fetch {
            operation: "list versions",
            status,
            body,
        })?;
        if status != StatusCode::OK {
            return Err(SyncError::Fetch {
                operation: "list versions",
                status: Some(status.as_u16()),
                body,
            });
        }

        let parsed: ListVersionsResponse =
            serde_json::from_str(&body).map_err(|e| SyncError::Fetch {
                operation: "list versions",
                status: Some(status.as_u16()),
                body: format!("invalid response JSON: {}", e),
            })?;

        Ok(parsed.versions)
    }
}
