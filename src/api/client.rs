//! Purpose: HTTP client for the Datastore REST v1 surface.
//! Exports: `DatastoreClient`, `DEFAULT_ENDPOINT`.
//! Role: Implements the core collaborator traits (`EntitySource`, `KeyStore`).
//! Invariants: Requests are synchronous and unretried; callers decide fatality.
//! Invariants: Base URL resolves once at construction (flag, emulator env, default).
//! Invariants: Wire keys pass through delete mutations untouched.
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use tracing::debug;
use url::Url;

use super::ApiResult;
use super::wire;
use crate::core::delete::{KeyStore, is_reserved_kind};
use crate::core::entity::Entity;
use crate::core::error::{Error, ErrorKind};
use crate::core::export::{EXPORT_PAGE_SIZE, EntitySource};

pub const DEFAULT_ENDPOINT: &str = "https://datastore.googleapis.com";

const TOKEN_ENV_VARS: &[&str] = &["GOOGLE_OAUTH_ACCESS_TOKEN", "DATASTORE_ACCESS_TOKEN"];

pub struct DatastoreClient {
    agent: ureq::Agent,
    base_url: Url,
    project_id: String,
    token: Option<String>,
}

#[derive(Deserialize)]
struct RunQueryResponse {
    #[serde(default)]
    batch: QueryBatch,
}

#[derive(Default, Deserialize)]
struct QueryBatch {
    #[serde(rename = "entityResults", default)]
    entity_results: Vec<Value>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: RemoteError,
}

#[derive(Deserialize)]
struct RemoteError {
    message: Option<String>,
}

impl DatastoreClient {
    /// Client honoring the explicit endpoint override first, then
    /// `DATASTORE_EMULATOR_HOST`, then the public endpoint; bearer token from
    /// the access-token environment variables when present.
    pub fn connect(project_id: impl Into<String>, endpoint: Option<&str>) -> ApiResult<Self> {
        let endpoint = match endpoint {
            Some(endpoint) => endpoint.to_string(),
            None => match std::env::var("DATASTORE_EMULATOR_HOST") {
                Ok(host) if !host.is_empty() => format!("http://{host}"),
                _ => DEFAULT_ENDPOINT.to_string(),
            },
        };
        let client = Self::with_endpoint(project_id, endpoint)?;
        let token = TOKEN_ENV_VARS
            .iter()
            .find_map(|name| std::env::var(name).ok().filter(|token| !token.is_empty()));
        Ok(match token {
            Some(token) => client.with_token(token),
            None => client,
        })
    }

    pub fn with_endpoint(
        project_id: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> ApiResult<Self> {
        let base_url = normalize_base_url(endpoint.into())?;
        Ok(Self {
            agent: ureq::AgentBuilder::new().build(),
            base_url,
            project_id: project_id.into(),
            token: None,
        })
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    fn rpc_url(&self, method: &str) -> ApiResult<Url> {
        self.base_url
            .join(&format!("v1/projects/{}:{method}", self.project_id))
            .map_err(|err| {
                Error::new(ErrorKind::Internal)
                    .with_message("failed to build rpc url")
                    .with_source(err)
            })
    }

    fn request_json<R>(&self, method: &str, body: &Value) -> ApiResult<R>
    where
        R: DeserializeOwned,
    {
        let url = self.rpc_url(method)?;
        let payload = serde_json::to_string(body).map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("failed to encode request json")
                .with_source(err)
        })?;
        let mut request = self
            .agent
            .request("POST", url.as_str())
            .set("Accept", "application/json")
            .set("Content-Type", "application/json");
        if let Some(token) = &self.token {
            request = request.set("Authorization", &format!("Bearer {token}"));
        }
        debug!(%url, "datastore rpc");
        match request.send_string(&payload) {
            Ok(response) => read_json_response(response),
            Err(ureq::Error::Status(code, response)) => Err(parse_error_response(code, response)),
            Err(ureq::Error::Transport(err)) => Err(Error::new(ErrorKind::Io)
                .with_message("request failed")
                .with_source(err)),
        }
    }

    fn run_query(
        &self,
        kind: &str,
        namespace: &str,
        offset: u64,
        limit: u64,
        keys_only: bool,
    ) -> ApiResult<Vec<Value>> {
        let mut query = Map::new();
        query.insert("kind".to_string(), json!([{ "name": kind }]));
        query.insert("offset".to_string(), json!(offset));
        query.insert("limit".to_string(), json!(limit));
        if keys_only {
            query.insert(
                "projection".to_string(),
                json!([{ "property": { "name": "__key__" } }]),
            );
        }

        let mut body = Map::new();
        if !namespace.is_empty() {
            body.insert(
                "partitionId".to_string(),
                json!({ "namespaceId": namespace }),
            );
        }
        body.insert("query".to_string(), Value::Object(query));

        let response: RunQueryResponse = self.request_json("runQuery", &Value::Object(body))?;
        Ok(response.batch.entity_results)
    }

    /// All keys of one kind, paging the key-only query until exhaustion.
    fn all_keys(&self, kind: &str, namespace: &str) -> ApiResult<Vec<Value>> {
        let mut keys = Vec::new();
        let mut offset = 0u64;
        loop {
            let results = self.run_query(kind, namespace, offset, EXPORT_PAGE_SIZE, true)?;
            if results.is_empty() {
                return Ok(keys);
            }
            offset += results.len() as u64;
            keys.extend(
                results
                    .iter()
                    .filter_map(|result| result.get("entity").and_then(|e| e.get("key")))
                    .cloned(),
            );
        }
    }
}

impl EntitySource for DatastoreClient {
    fn fetch_page(
        &self,
        kind: &str,
        namespace: &str,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<Entity>, Error> {
        let results = self.run_query(kind, namespace, offset, limit, false)?;
        Ok(results
            .iter()
            .filter_map(|result| result.get("entity"))
            .map(wire::entity_from_wire)
            .collect())
    }
}

impl KeyStore for DatastoreClient {
    fn namespaces(&self) -> Result<Vec<String>, Error> {
        let keys = self.all_keys("__namespace__", "")?;
        Ok(keys
            .iter()
            .map(|key| {
                // The default namespace surfaces as a numeric-id key.
                let leaf = wire::key_leaf(key);
                leaf.name.unwrap_or_default()
            })
            .collect())
    }

    fn kinds(&self, namespace: &str) -> Result<Vec<String>, Error> {
        let keys = self.all_keys("__kind__", namespace)?;
        Ok(keys
            .iter()
            .filter_map(|key| wire::key_leaf(key).name)
            .filter(|name| !is_reserved_kind(name))
            .collect())
    }

    fn keys_of_kind(&self, kind: &str, namespace: &str) -> Result<Vec<Value>, Error> {
        self.all_keys(kind, namespace)
    }

    fn delete_keys(&self, keys: &[Value]) -> Result<(), Error> {
        let mutations: Vec<Value> = keys.iter().map(|key| json!({ "delete": key })).collect();
        let body = json!({
            "mode": "NON_TRANSACTIONAL",
            "mutations": mutations,
        });
        let _: Value = self.request_json("commit", &body)?;
        Ok(())
    }
}

fn normalize_base_url(raw: String) -> ApiResult<Url> {
    let mut url = Url::parse(&raw).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message("invalid datastore endpoint url")
            .with_source(err)
    })?;
    let scheme = url.scheme();
    if scheme != "http" && scheme != "https" {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("datastore endpoint must use http or https scheme"));
    }
    if url.path() != "/" && !url.path().is_empty() {
        return Err(
            Error::new(ErrorKind::Usage).with_message("datastore endpoint must not include a path")
        );
    }
    url.set_path("/");
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

fn read_json_response<R>(response: ureq::Response) -> ApiResult<R>
where
    R: DeserializeOwned,
{
    let body = response.into_string().map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message("failed to read response body")
            .with_source(err)
    })?;
    serde_json::from_str(&body).map_err(|err| {
        Error::new(ErrorKind::Remote)
            .with_message("invalid response json")
            .with_source(err)
    })
}

fn error_kind_from_status(status: u16) -> ErrorKind {
    match status {
        400 => ErrorKind::Usage,
        401 | 403 => ErrorKind::Auth,
        404 => ErrorKind::NotFound,
        _ => ErrorKind::Remote,
    }
}

fn parse_error_response(status: u16, response: ureq::Response) -> Error {
    let body = response.into_string().unwrap_or_default();
    let kind = error_kind_from_status(status);
    let message = serde_json::from_str::<ErrorEnvelope>(&body)
        .ok()
        .and_then(|envelope| envelope.error.message)
        .unwrap_or_else(|| format!("datastore error status {status}"));
    let mut err = Error::new(kind).with_message(message);
    if kind == ErrorKind::Auth {
        err = err.with_hint(
            "Set GOOGLE_OAUTH_ACCESS_TOKEN (e.g. from `gcloud auth print-access-token`).",
        );
    }
    err
}

#[cfg(test)]
mod tests {
    use super::{DatastoreClient, error_kind_from_status, normalize_base_url};
    use crate::core::error::ErrorKind;

    #[test]
    fn normalize_base_url_strips_query_and_keeps_port() {
        let url = normalize_base_url("http://localhost:8081".to_string()).expect("url");
        assert_eq!(url.as_str(), "http://localhost:8081/");
        assert!(normalize_base_url("ftp://example".to_string()).is_err());
        assert!(normalize_base_url("http://example/v1".to_string()).is_err());
    }

    #[test]
    fn rpc_url_targets_the_project_method() {
        let client =
            DatastoreClient::with_endpoint("demo-project", "http://localhost:8081").expect("client");
        let url = client.rpc_url("runQuery").expect("url");
        assert_eq!(
            url.as_str(),
            "http://localhost:8081/v1/projects/demo-project:runQuery"
        );
    }

    #[test]
    fn status_codes_map_to_error_kinds() {
        assert_eq!(error_kind_from_status(400), ErrorKind::Usage);
        assert_eq!(error_kind_from_status(401), ErrorKind::Auth);
        assert_eq!(error_kind_from_status(403), ErrorKind::Auth);
        assert_eq!(error_kind_from_status(404), ErrorKind::NotFound);
        assert_eq!(error_kind_from_status(500), ErrorKind::Remote);
    }
}
