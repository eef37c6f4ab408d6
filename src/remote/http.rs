use std::marker::PhantomData;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::{Method, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};
use url::Url;

use super::RemoteCollection;
use crate::auth::AuthContext;
use crate::envelope::{self, Envelope};
use crate::error::Error;
use crate::item::{Item, Locator};

fn default_id_field() -> String {
    "id".to_string()
}

fn default_timeout_ms() -> u64 {
    30_000
}

/// Where and how to reach a collection
///
/// ```rust
/// use listsync::remote::Config;
/// use listsync::envelope::Envelope;
///
/// let config = Config::new("http://localhost:8080/api".parse().unwrap(), "cars")
///     .envelope(Envelope::Hal)
///     .timeout_ms(5_000);
/// assert_eq!(config.collection_url().unwrap().as_str(), "http://localhost:8080/api/cars");
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Root of the API, e.g. `http://localhost:8080/api`
    base_url: Url,
    /// Name of the collection under the base URL, e.g. `cars`
    resource: String,
    /// Response shape. Defaults to a plain JSON array
    #[serde(default)]
    envelope: Envelope,
    /// Name of the identifier field in item bodies. Defaults to `id`
    #[serde(default = "default_id_field")]
    id_field: String,
    /// Per request timeout, 0 disables it. Defaults to 30 seconds
    #[serde(default = "default_timeout_ms")]
    timeout_ms: u64,
}

impl Config {
    pub fn new(base_url: Url, resource: impl Into<String>) -> Self {
        Config {
            base_url,
            resource: resource.into(),
            envelope: Envelope::default(),
            id_field: default_id_field(),
            timeout_ms: default_timeout_ms(),
        }
    }

    pub fn envelope(self, envelope: Envelope) -> Self {
        let mut config = self;
        config.envelope = envelope;
        config
    }

    pub fn id_field(self, id_field: impl Into<String>) -> Self {
        let mut config = self;
        config.id_field = id_field.into();
        config
    }

    pub fn timeout_ms(self, timeout_ms: u64) -> Self {
        let mut config = self;
        config.timeout_ms = timeout_ms;
        config
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// URL of the collection endpoint
    pub fn collection_url(&self) -> Result<Url, Error> {
        self.url_with(&[self.resource.as_str()])
    }

    /// URL for updating or deleting one item
    pub fn item_url(&self, at: &Locator) -> Result<Url, Error> {
        match at {
            Locator::Link(url) => Ok(url.clone()),
            Locator::Id(id) => self.url_with(&[self.resource.as_str(), id.as_str()]),
        }
    }

    fn url_with(&self, segments: &[&str]) -> Result<Url, Error> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::internal(anyhow!("{} cannot be a base URL", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

/// A [`RemoteCollection`] reached over HTTP
pub struct HttpCollection<T> {
    http: reqwest::Client,
    config: Config,
    auth: AuthContext,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for HttpCollection<T> {
    fn clone(&self) -> Self {
        HttpCollection {
            http: self.http.clone(),
            config: self.config.clone(),
            auth: self.auth.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> HttpCollection<T> {
    pub fn new(config: Config) -> Self {
        HttpCollection {
            http: reqwest::Client::new(),
            config,
            auth: AuthContext::new(),
            _marker: PhantomData,
        }
    }

    /// Use an existing client, e.g. to share its connection pool
    pub fn with_client(self, http: reqwest::Client) -> Self {
        HttpCollection { http, ..self }
    }

    /// Attach the `Authorization` header from the given context to every
    /// request
    pub fn with_auth(self, auth: AuthContext) -> Self {
        HttpCollection { auth, ..self }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Perform a request and return the body of a successful response
    ///
    /// The body is empty for 204 responses.
    async fn send(&self, method: Method, url: Url, body: Option<Value>) -> Result<Vec<u8>, Error> {
        debug!(%method, %url, "request");
        let mut req = self.http.request(method, url);
        if self.config.timeout_ms > 0 {
            req = req.timeout(Duration::from_millis(self.config.timeout_ms));
        }
        if let Some(token) = self.auth.header().await {
            req = req.header(AUTHORIZATION, token);
        }
        if let Some(body) = body {
            req = req.json(&body);
        }

        let res = req.send().await?;
        let status = res.status();
        let bytes = res.bytes().await?;
        debug!(%status, len = bytes.len(), "response");

        if !status.is_success() {
            let reason = String::from_utf8_lossy(&bytes).trim().to_string();
            return Err(Error::status(
                status,
                if reason.is_empty() {
                    status.canonical_reason().unwrap_or("no details").to_string()
                } else {
                    reason
                },
            ));
        }

        if status == StatusCode::NO_CONTENT {
            return Ok(Vec::new());
        }
        Ok(bytes.to_vec())
    }

    /// Read the server echo of a created or updated item
    ///
    /// The request already succeeded, so a body that is not JSON means the
    /// server did not echo the item.
    fn decode_single(&self, body: Vec<u8>) -> Result<Option<Item<T>>, Error>
    where
        T: DeserializeOwned,
    {
        if body.is_empty() {
            return Ok(None);
        }
        let body: Value = match serde_json::from_slice(&body) {
            Ok(body) => body,
            Err(e) => {
                debug!("response is not an item, ignoring it: {e}");
                return Ok(None);
            }
        };
        self.config
            .envelope
            .single(body)?
            .map(|raw| envelope::decode(raw, &self.config.id_field))
            .transpose()
    }
}

#[async_trait]
impl<T> RemoteCollection<T> for HttpCollection<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    #[instrument(name = "http_list", skip_all, fields(resource = %self.config.resource))]
    async fn list(&self) -> Result<Vec<Item<T>>, Error> {
        let url = self.config.collection_url()?;
        let body = self.send(Method::GET, url, None).await?;
        let body = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body)?
        };
        self.config
            .envelope
            .collection(body, &self.config.resource)?
            .into_iter()
            .map(|raw| envelope::decode(raw, &self.config.id_field))
            .collect()
    }

    #[instrument(name = "http_create", skip_all, fields(resource = %self.config.resource))]
    async fn create(&self, fields: &T) -> Result<Option<Item<T>>, Error> {
        let url = self.config.collection_url()?;
        let body = envelope::encode(fields, None, &self.config.id_field)?;
        let body = self.send(Method::POST, url, Some(body)).await?;
        self.decode_single(body)
    }

    #[instrument(name = "http_update", skip_all, fields(resource = %self.config.resource, at = %at))]
    async fn update(&self, at: &Locator, fields: &T) -> Result<Option<Item<T>>, Error> {
        let url = self.config.item_url(at)?;
        let id = match at {
            Locator::Id(id) => Some(id),
            Locator::Link(_) => None,
        };
        let body = envelope::encode(fields, id, &self.config.id_field)?;
        let body = self.send(Method::PUT, url, Some(body)).await?;
        self.decode_single(body)
    }

    #[instrument(name = "http_delete", skip_all, fields(resource = %self.config.resource, at = %at))]
    async fn delete(&self, at: &Locator) -> Result<(), Error> {
        let url = self.config.item_url(at)?;
        // whatever the body says, a success status means the item is gone
        self.send(Method::DELETE, url, None).await?;
        Ok(())
    }
}
