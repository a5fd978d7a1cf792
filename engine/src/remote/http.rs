//! HTTP implementation of [`RemoteClient`] on top of reqwest.

use super::{RemoteClient, RemoteResult};
use crate::config::ClientConfig;
use crate::entity::RemoteEntity;
use crate::{Entity, RemoteError, RemoteId};
use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const HEALTH_TIMEOUT: Duration = Duration::from_secs(3);

/// REST client for the Grimoire service.
#[derive(Debug, Clone)]
pub struct HttpRemote {
    base_url: Url,
    auth_token: Option<String>,
    client: Client,
}

impl HttpRemote {
    /// Create a client for `base_url` (e.g. `https://api.example.com/v1`).
    pub fn new(base_url: &str, auth_token: Option<String>) -> RemoteResult<Self> {
        Self::with_timeout(base_url, auth_token, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(
        base_url: &str,
        auth_token: Option<String>,
        timeout: Duration,
    ) -> RemoteResult<Self> {
        let base_url = parse_base_url(base_url)?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteError::RequestFailed(e.to_string()))?;

        Ok(Self {
            base_url,
            auth_token,
            client,
        })
    }

    pub fn from_config(config: &ClientConfig) -> RemoteResult<Self> {
        Self::with_timeout(
            &config.base_url,
            config.auth_token.clone(),
            config.request_timeout,
        )
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Replace the bearer token, e.g. after the user logs in again.
    pub fn set_auth_token(&mut self, auth_token: Option<String>) {
        self.auth_token = auth_token;
    }

    fn endpoint(&self, collection: &str, id: Option<RemoteId>) -> RemoteResult<Url> {
        let path = match id {
            Some(id) => format!("{collection}/{id}"),
            None => collection.to_string(),
        };
        self.base_url
            .join(&path)
            .map_err(|e| RemoteError::InvalidEndpoint(format!("{path}: {e}")))
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.auth_token {
            Some(token) => builder.header(AUTHORIZATION, format!("Bearer {token}")),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> RemoteResult<Response> {
        let response = builder
            .send()
            .await
            .map_err(|e| RemoteError::RequestFailed(e.to_string()))?;

        tracing::debug!(
            url = %response.url(),
            status = response.status().as_u16(),
            "remote response"
        );

        check_status(response.status())?;
        Ok(response)
    }
}

#[async_trait]
impl RemoteClient for HttpRemote {
    async fn fetch_all<T: Entity>(&self) -> RemoteResult<Vec<RemoteEntity<T>>> {
        let url = self.endpoint(T::COLLECTION, None)?;
        let response = self.send(self.request(Method::GET, url)).await?;
        decode(response).await
    }

    async fn fetch_one<T: Entity>(&self, id: RemoteId) -> RemoteResult<RemoteEntity<T>> {
        let url = self.endpoint(T::COLLECTION, Some(id))?;
        let response = self.send(self.request(Method::GET, url)).await?;
        decode(response).await
    }

    async fn create<T: Entity>(&self, payload: &T) -> RemoteResult<RemoteEntity<T>> {
        let url = self.endpoint(T::COLLECTION, None)?;
        let response = self
            .send(self.request(Method::POST, url).json(payload))
            .await?;
        decode(response).await
    }

    async fn update<T: Entity>(&self, id: RemoteId, payload: &T) -> RemoteResult<RemoteEntity<T>> {
        let url = self.endpoint(T::COLLECTION, Some(id))?;
        let response = self
            .send(self.request(Method::PUT, url).json(payload))
            .await?;
        decode(response).await
    }

    async fn delete<T: Entity>(&self, id: RemoteId) -> RemoteResult<()> {
        let url = self.endpoint(T::COLLECTION, Some(id))?;
        self.send(self.request(Method::DELETE, url)).await?;
        Ok(())
    }

    /// Probes `GET {base}/health`. Any HTTP answer, even an error status,
    /// means the service can be reached; only transport failures count as
    /// offline. The collection endpoints decide per record what sticks.
    async fn is_reachable(&self) -> bool {
        let Ok(url) = self.base_url.join("health") else {
            return false;
        };
        match self.client.get(url).timeout(HEALTH_TIMEOUT).send().await {
            Ok(response) => {
                if !response.status().is_success() {
                    tracing::debug!(
                        status = response.status().as_u16(),
                        "health check answered with an error status"
                    );
                }
                true
            }
            Err(e) => {
                tracing::debug!(error = %e, "health check failed");
                false
            }
        }
    }
}

/// Parse the base URL and make sure relative joins append to its path.
fn parse_base_url(base_url: &str) -> RemoteResult<Url> {
    let mut url = Url::parse(base_url)
        .map_err(|e| RemoteError::InvalidEndpoint(format!("{base_url}: {e}")))?;

    if url.cannot_be_a_base() || !matches!(url.scheme(), "http" | "https") {
        return Err(RemoteError::InvalidEndpoint(base_url.to_string()));
    }

    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// Map a response status onto the error taxonomy.
fn check_status(status: StatusCode) -> RemoteResult<()> {
    if status.is_success() {
        Ok(())
    } else if status == StatusCode::UNAUTHORIZED {
        Err(RemoteError::NotAuthenticated)
    } else {
        Err(RemoteError::ServerError(status.as_u16()))
    }
}

async fn decode<D: DeserializeOwned>(response: Response) -> RemoteResult<D> {
    let bytes = response
        .bytes()
        .await
        .map_err(|e| RemoteError::RequestFailed(e.to_string()))?;
    decode_body(&bytes)
}

fn decode_body<D: DeserializeOwned>(bytes: &[u8]) -> RemoteResult<D> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(RemoteError::NoData);
    }
    serde_json::from_slice(bytes).map_err(|e| RemoteError::DecodingFailed(e.to_string()))
}
