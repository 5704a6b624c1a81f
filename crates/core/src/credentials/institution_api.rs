//! Institution service client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use tracing::debug;

use super::{CredentialError, CredentialResolver};

/// Resolves credentials via `GET {endpoint}/{id}/api-key?code={key}`.
pub struct InstitutionApiClient {
    client: Client,
    endpoint: Url,
    access_key: String,
}

#[derive(Debug, Deserialize)]
struct ApiKeyResponse {
    // Required, but may be null.
    #[serde(deserialize_with = "Option::deserialize")]
    api_key: Option<String>,
}

impl InstitutionApiClient {
    pub fn new(
        endpoint: &str,
        access_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, CredentialError> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| CredentialError::InvalidEndpoint(format!("{}: {}", endpoint, e)))?;
        if endpoint.cannot_be_a_base() {
            return Err(CredentialError::InvalidEndpoint(endpoint.to_string()));
        }

        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            endpoint,
            access_key: access_key.into(),
        })
    }

    fn api_key_url(&self, institution_id: i64) -> Result<Url, CredentialError> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| CredentialError::InvalidEndpoint(self.endpoint.to_string()))?
            .pop_if_empty()
            .push(&institution_id.to_string())
            .push("api-key");
        url.query_pairs_mut().append_pair("code", &self.access_key);
        Ok(url)
    }
}

#[async_trait]
impl CredentialResolver for InstitutionApiClient {
    async fn resolve(&self, institution_id: i64) -> Result<Option<String>, CredentialError> {
        let url = self.api_key_url(institution_id)?;
        debug!("Resolving credential for institution {}", institution_id);

        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CredentialError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let body: ApiKeyResponse = response.json().await.map_err(|e| {
            CredentialError::Parse(format!("Failed to parse api-key response: {}", e))
        })?;

        Ok(body.api_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    fn client_for(server: &Server) -> InstitutionApiClient {
        InstitutionApiClient::new(
            &format!("{}/api/institution", server.url()),
            "static-key",
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_resolve_returns_key() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/institution/42/api-key")
            .match_query(Matcher::UrlEncoded("code".into(), "static-key".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"api_key": "k"}"#)
            .create_async()
            .await;

        let key = client_for(&server).resolve(42).await.unwrap();
        mock.assert_async().await;
        assert_eq!(key.as_deref(), Some("k"));
    }

    #[tokio::test]
    async fn test_resolve_null_key() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/api/institution/7/api-key")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"api_key": null}"#)
            .create_async()
            .await;

        assert_eq!(client_for(&server).resolve(7).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_resolve_error_status() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/api/institution/7/api-key")
            .match_query(Matcher::Any)
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let err = client_for(&server).resolve(7).await.unwrap_err();
        assert!(matches!(err, CredentialError::Api { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_resolve_missing_field_is_parse_error() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/api/institution/7/api-key")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"key": "k"}"#)
            .create_async()
            .await;

        let err = client_for(&server).resolve(7).await.unwrap_err();
        assert!(matches!(err, CredentialError::Parse(_)));
    }

    #[test]
    fn test_invalid_endpoint() {
        assert!(matches!(
            InstitutionApiClient::new("not a url", "k", Duration::from_secs(1)),
            Err(CredentialError::InvalidEndpoint(_))
        ));
    }
}
