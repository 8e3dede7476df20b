//! Bearer-token flow against the separate auth service

use serde::{Deserialize, Serialize};

use crate::common::config::AuthConfig;
use crate::common::{Error, Result};

#[derive(Serialize)]
struct Credentials<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

/// Client for the token service
#[derive(Debug, Clone)]
pub struct TokenClient {
    http: reqwest::Client,
    config: AuthConfig,
}

impl TokenClient {
    pub fn new(config: &AuthConfig, accept_invalid_certs: bool) -> Result<Self> {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(accept_invalid_certs)
            .build()
            .map_err(|e| Error::Transport {
                url: config.url.clone(),
                source: e,
            })?;
        Ok(Self {
            http,
            config: config.clone(),
        })
    }

    /// Endpoint tokens are requested from
    pub fn token_url(&self) -> String {
        format!("{}/auth", self.config.url.trim_end_matches('/'))
    }

    /// Obtain a token for the configured user
    pub async fn fetch_token(&self) -> Result<String> {
        let url = self.token_url();
        tracing::debug!(url = %url, user = %self.config.username, "requesting token");

        let response = self
            .http
            .post(&url)
            .json(&Credentials {
                username: &self.config.username,
                password: &self.config.password,
            })
            .send()
            .await
            .map_err(|e| Error::Transport {
                url: url.clone(),
                source: e,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Auth(format!(
                "{} returned {}: {}",
                url,
                status.as_u16(),
                body
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| Error::Auth(format!("{} returned an invalid token response: {}", url, e)))?;

        token
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::Auth(format!("{} returned no access_token", url)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::post;
    use axum::Router;

    fn auth_config(url: &str) -> AuthConfig {
        AuthConfig {
            url: url.to_string(),
            username: "fred".to_string(),
            password: "frogs".to_string(),
        }
    }

    /// Serve `router` on an ephemeral port and return its base URL
    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[test]
    fn test_token_url_trims_trailing_slash() {
        let client = TokenClient::new(&auth_config("http://localhost:5001/"), true).unwrap();
        assert_eq!(client.token_url(), "http://localhost:5001/auth");
    }

    #[tokio::test]
    async fn test_non_json_token_body_is_auth_error() {
        let url = serve(Router::new().route("/auth", post(|| async { "not a token" }))).await;
        let client = TokenClient::new(&auth_config(&url), true).unwrap();

        let err = client.fetch_token().await.unwrap_err();
        assert!(matches!(&err, Error::Auth(msg) if msg.contains("invalid token response")), "{err}");
        assert_eq!(err.code(), "AUTH");
    }

    #[tokio::test]
    async fn test_token_is_read_from_json_body() {
        let url = serve(Router::new().route(
            "/auth",
            post(|| async { axum::Json(serde_json::json!({ "access_token": "abc" })) }),
        ))
        .await;
        let client = TokenClient::new(&auth_config(&url), true).unwrap();

        assert_eq!(client.fetch_token().await.unwrap(), "abc");
    }
}
