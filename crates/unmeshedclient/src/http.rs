//! Authenticated JSON transport shared by every API surface.

use reqwest::{Method, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::time::Duration;
use unmeshedcore::{ClientConfig, ConfigError, Result, UnmeshedError};

/// Longest error body echoed back in `UnmeshedError::Api`
const MAX_ERROR_BODY: usize = 500;

/// Query parameters as sent on the wire
pub type Query<'a> = &'a [(&'a str, String)];

/// `Authorization` value for SDK clients: the token itself never leaves the process
pub fn bearer_token(client_id: &str, auth_token: &str) -> String {
    let digest = Sha256::digest(auth_token.as_bytes());
    format!("Bearer client.sdk.{}.{}", client_id, hex::encode(digest))
}

/// HTTP client bound to one engine
pub struct HttpClient {
    http: reqwest::Client,
    base_url: Url,
    bearer: String,
    client_id: String,
}

impl HttpClient {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let base_url = Url::parse(&config.server_url()).map_err(|e| ConfigError::Invalid {
            field: "base_url",
            reason: e.to_string(),
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ConfigError::Invalid {
                field: "base_url",
                reason: "URL cannot carry a path".to_string(),
            }
            .into());
        }

        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connection_timeout_secs))
            .build()
            .map_err(transport)?;

        Ok(Self {
            http,
            base_url,
            bearer: bearer_token(&config.client_id, &config.auth_token),
            client_id: config.client_id.clone(),
        })
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Absolute URL for a route given as path segments (each segment is escaped)
    pub fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Start a request with authentication headers
    pub fn request(&self, method: Method, segments: &[&str]) -> RequestBuilder {
        self.http
            .request(method, self.url(segments))
            .header(reqwest::header::AUTHORIZATION, &self.bearer)
            .header(reqwest::header::ACCEPT, "application/json")
    }

    pub async fn get<T: DeserializeOwned>(&self, segments: &[&str], query: Query<'_>) -> Result<T> {
        let request = self.request(Method::GET, segments).query(query);
        self.send_json(request).await
    }

    pub async fn post<B, T>(&self, segments: &[&str], query: Query<'_>, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = self.request(Method::POST, segments).query(query).json(body);
        self.send_json(request).await
    }

    pub async fn put<B, T>(&self, segments: &[&str], query: Query<'_>, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = self.request(Method::PUT, segments).query(query).json(body);
        self.send_json(request).await
    }

    pub async fn delete<B, T>(&self, segments: &[&str], query: Query<'_>, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = self.request(Method::DELETE, segments).query(query).json(body);
        self.send_json(request).await
    }

    /// Send and decode a JSON body
    pub async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = self.send(request).await?;
        let body = response.bytes().await.map_err(transport)?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Send and return the raw body
    pub async fn send_bytes(&self, request: RequestBuilder) -> Result<Vec<u8>> {
        let response = self.send(request).await?;
        let body = response.bytes().await.map_err(transport)?;
        Ok(body.to_vec())
    }

    /// Send and ignore the body
    pub async fn send_empty(&self, request: RequestBuilder) -> Result<()> {
        self.send(request).await.map(|_| ())
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request.send().await.map_err(transport)?;
        let status = response.status();
        tracing::debug!("{} {}", status.as_u16(), response.url().path());

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UnmeshedError::Api {
                status: status.as_u16(),
                message: body.chars().take(MAX_ERROR_BODY).collect(),
            });
        }

        Ok(response)
    }
}

pub(crate) fn transport(err: reqwest::Error) -> UnmeshedError {
    if err.is_timeout() {
        UnmeshedError::Transport(format!("request timed out: {}", err))
    } else {
        UnmeshedError::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> HttpClient {
        let config = ClientConfig::new()
            .with_base_url(base)
            .with_client_id("cid")
            .with_auth_token("tok");
        HttpClient::new(&config).unwrap()
    }

    #[test]
    fn bearer_token_hashes_the_secret() {
        let token = bearer_token("cid", "tok");
        assert!(token.starts_with("Bearer client.sdk.cid."));
        let hash = token.rsplit('.').next().unwrap();
        assert_eq!(hash.len(), 64);
        assert!(!token.contains(".tok"));
    }

    #[test]
    fn url_escapes_segments() {
        let http = client("http://localhost:8080");
        let url = http.url(&["api", "processDefinitions", "default", "my process"]);
        assert_eq!(
            url.as_str(),
            "http://localhost:8080/api/processDefinitions/default/my%20process"
        );
    }

    #[test]
    fn url_keeps_base_path_prefix() {
        let http = client("https://gateway.example.com/unmeshed/");
        let url = http.url(&["api", "clients", "poll"]);
        assert_eq!(url.as_str(), "https://gateway.example.com/unmeshed/api/clients/poll");
    }
}
