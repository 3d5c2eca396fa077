use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use azure_core::auth::TokenCredential;
use azure_identity::{DefaultAzureCredential, TokenCredentialOptions};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

pub const MANAGEMENT_ENDPOINT: &str = "https://management.azure.com";
pub const MANAGEMENT_SCOPE: &str = "https://management.azure.com/.default";

const REQUEST_TIMEOUT_SECS: u64 = 60;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error("Credential error: {0}")]
    Credential(String),

    #[error("Request to {path} failed: {reason}")]
    Request { path: String, reason: String },

    #[error("Service returned {status} for {path}: {body}")]
    Service {
        status: u16,
        path: String,
        body: String,
    },

    #[error("Unexpected response shape from {path}: {reason}")]
    Decode { path: String, reason: String },

    #[error("Malformed resource id: {0}")]
    MalformedResourceId(String),
}

/// The seam between fetchers and the management plane. Production code uses
/// the `HttpTransport` below; tests substitute an in-memory fake.
#[async_trait]
pub trait ArmTransport: Send + Sync {
    async fn get(&self, path: &str, api_version: &str) -> Result<Value, Error>;

    async fn put(&self, path: &str, api_version: &str, body: Value) -> Result<Value, Error>;

    async fn delete(&self, path: &str, api_version: &str) -> Result<(), Error>;
}

pub struct HttpTransport {
    http: reqwest::Client,
    credential: Arc<DefaultAzureCredential>,
    endpoint: String,
}

impl HttpTransport {
    pub fn new() -> Result<Self, Error> {
        let credential = DefaultAzureCredential::create(TokenCredentialOptions::default())
            .map_err(|error| Error::Credential(error.to_string()))?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|error| Error::Request {
                path: String::from("<client>"),
                reason: error.to_string(),
            })?;

        return Ok(Self {
            http,
            credential: Arc::new(credential),
            endpoint: String::from(MANAGEMENT_ENDPOINT),
        });
    }

    async fn bearer(&self) -> Result<String, Error> {
        let token = self
            .credential
            .get_token(&[MANAGEMENT_SCOPE])
            .await
            .map_err(|error| Error::Credential(error.to_string()))?;

        return Ok(token.token.secret().to_string());
    }

    fn url(&self, path: &str, api_version: &str) -> String {
        return format!("{}{}?api-version={}", self.endpoint, path, api_version);
    }

    async fn check(path: &str, response: reqwest::Response) -> Result<reqwest::Response, Error> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Service {
                status: status.as_u16(),
                path: path.to_string(),
                body,
            });
        }

        return Ok(response);
    }
}

#[async_trait]
impl ArmTransport for HttpTransport {
    async fn get(&self, path: &str, api_version: &str) -> Result<Value, Error> {
        let response = self
            .http
            .get(self.url(path, api_version))
            .bearer_auth(self.bearer().await?)
            .send()
            .await
            .map_err(|error| Error::Request {
                path: path.to_string(),
                reason: error.to_string(),
            })?;

        let response = Self::check(path, response).await?;
        return response.json().await.map_err(|error| Error::Decode {
            path: path.to_string(),
            reason: error.to_string(),
        });
    }

    async fn put(&self, path: &str, api_version: &str, body: Value) -> Result<Value, Error> {
        let response = self
            .http
            .put(self.url(path, api_version))
            .bearer_auth(self.bearer().await?)
            .json(&body)
            .send()
            .await
            .map_err(|error| Error::Request {
                path: path.to_string(),
                reason: error.to_string(),
            })?;

        let response = Self::check(path, response).await?;
        return response.json().await.map_err(|error| Error::Decode {
            path: path.to_string(),
            reason: error.to_string(),
        });
    }

    async fn delete(&self, path: &str, api_version: &str) -> Result<(), Error> {
        let response = self
            .http
            .delete(self.url(path, api_version))
            .bearer_auth(self.bearer().await?)
            .send()
            .await
            .map_err(|error| Error::Request {
                path: path.to_string(),
                reason: error.to_string(),
            })?;

        Self::check(path, response).await?;
        return Ok(());
    }
}

#[derive(Deserialize)]
struct Page<T> {
    #[serde(default = "Vec::new")]
    value: Vec<T>,
}

#[derive(Clone)]
pub struct ArmClient {
    transport: Arc<dyn ArmTransport>,
    pub subscription_id: String,
}

impl ArmClient {
    pub fn new(transport: Arc<dyn ArmTransport>, subscription_id: impl Into<String>) -> Self {
        return Self {
            transport,
            subscription_id: subscription_id.into(),
        };
    }

    pub fn resource_path(&self, resource_group: &str, provider_path: &str) -> String {
        return format!(
            "/subscriptions/{}/resourceGroups/{}/providers/{}",
            self.subscription_id, resource_group, provider_path
        );
    }

    pub fn subscription_path(&self, suffix: &str) -> String {
        return format!("/subscriptions/{}{}", self.subscription_id, suffix);
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        api_version: &str,
    ) -> Result<T, Error> {
        let raw = self.transport.get(path, api_version).await?;
        return serde_json::from_value(raw).map_err(|error| Error::Decode {
            path: path.to_string(),
            reason: error.to_string(),
        });
    }

    /// Fetches an ARM collection endpoint and unwraps its `value` array.
    pub async fn list<T: DeserializeOwned>(
        &self,
        path: &str,
        api_version: &str,
    ) -> Result<Vec<T>, Error> {
        let raw = self.transport.get(path, api_version).await?;
        let page: Page<T> = serde_json::from_value(raw).map_err(|error| Error::Decode {
            path: path.to_string(),
            reason: error.to_string(),
        })?;

        return Ok(page.value);
    }

    pub async fn put(&self, path: &str, api_version: &str, body: Value) -> Result<Value, Error> {
        return self.transport.put(path, api_version, body).await;
    }

    pub async fn delete(&self, path: &str, api_version: &str) -> Result<(), Error> {
        return self.transport.delete(path, api_version).await;
    }
}

/// A parsed ARM resource identifier. Identifiers are decomposed once at the
/// fetch boundary; downstream code works with the typed parts instead of
/// re-matching the raw string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceId {
    pub subscription: String,
    pub resource_group: String,
    pub provider_namespace: String,
    route: Vec<(String, String)>,
}

impl ResourceId {
    pub fn parse(raw: &str) -> Result<Self, Error> {
        let segments: Vec<&str> = raw.split('/').filter(|s| !s.is_empty()).collect();
        let malformed = || Error::MalformedResourceId(raw.to_string());

        let mut iter = segments.iter();
        let mut subscription = None;
        let mut resource_group = None;
        let mut provider_namespace = None;
        let mut route = Vec::new();

        while let Some(key) = iter.next() {
            match key.to_lowercase().as_str() {
                "subscriptions" => {
                    subscription = Some(iter.next().ok_or_else(malformed)?.to_string());
                }
                "resourcegroups" => {
                    resource_group = Some(iter.next().ok_or_else(malformed)?.to_string());
                }
                "providers" => {
                    provider_namespace = Some(iter.next().ok_or_else(malformed)?.to_string());
                    while let Some(resource_type) = iter.next() {
                        let name = iter.next().ok_or_else(malformed)?;
                        route.push((resource_type.to_string(), name.to_string()));
                    }
                }
                _ => return Err(malformed()),
            }
        }

        if route.is_empty() {
            return Err(malformed());
        }

        return Ok(Self {
            subscription: subscription.ok_or_else(malformed)?,
            resource_group: resource_group.ok_or_else(malformed)?,
            provider_namespace: provider_namespace.ok_or_else(malformed)?,
            route,
        });
    }

    /// The leaf resource name.
    pub fn name(&self) -> &str {
        // route is never empty after a successful parse
        return &self.route[self.route.len() - 1].1;
    }

    pub fn resource_type(&self) -> String {
        let types: Vec<&str> = self.route.iter().map(|(t, _)| t.as_str()).collect();
        return types.join("/");
    }

    pub fn matches(&self, other_raw: &str) -> bool {
        return match Self::parse(other_raw) {
            Ok(other) => {
                self.subscription.eq_ignore_ascii_case(&other.subscription)
                    && self.resource_group.eq_ignore_ascii_case(&other.resource_group)
                    && self
                        .provider_namespace
                        .eq_ignore_ascii_case(&other.provider_namespace)
                    && self.route.len() == other.route.len()
                    && self.route.iter().zip(other.route.iter()).all(|(a, b)| {
                        a.0.eq_ignore_ascii_case(&b.0) && a.1.eq_ignore_ascii_case(&b.1)
                    })
            }
            Err(_) => false,
        };
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "/subscriptions/{}/resourceGroups/{}/providers/{}",
            self.subscription, self.resource_group, self.provider_namespace
        )?;
        for (resource_type, name) in &self.route {
            write!(f, "/{}/{}", resource_type, name)?;
        }

        return Ok(());
    }
}
