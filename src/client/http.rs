//! HTTP command client
//!
//! Each call is an independent request; connection reuse is left to the
//! underlying reqwest client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;

use crate::common::config::ServerConfig;
use crate::common::{Error, Result};
use crate::testing::{validate_ok, StatusSource};

use super::request::{parse_base_url, CommandRequest, Method, ServerTarget};

/// Outcome of one command: status code, raw body and the URL that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    status: u16,
    body: String,
    url: String,
}

impl CommandResult {
    pub fn new(status: u16, body: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            url: url.into(),
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Body without surrounding whitespace
    pub fn trimmed(&self) -> &str {
        self.body.trim()
    }
}

/// How a request authenticates
#[derive(Debug, Clone, Copy)]
pub enum Authorization<'a> {
    /// Configured user and password
    Basic,
    /// Token from the auth service
    Bearer(&'a str),
}

/// Client for the server's command/query endpoint
#[derive(Debug, Clone)]
pub struct CommandClient {
    http: reqwest::Client,
    base: Url,
    target: ServerTarget,
    user: String,
    password: Option<String>,
}

impl CommandClient {
    /// Build a client from server settings
    pub fn new(config: &ServerConfig) -> Result<Self> {
        let base = parse_base_url(&config.base_url)?;

        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| Error::Transport {
                url: config.base_url.clone(),
                source: e,
            })?;

        Ok(Self {
            http,
            base,
            target: ServerTarget {
                host: config.host.clone(),
                port: config.port,
            },
            user: config.user.clone(),
            password: config.password.clone(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Issue `command` with positional `args`
    pub async fn execute(
        &self,
        method: Method,
        command: &str,
        args: &[&str],
    ) -> Result<CommandResult> {
        let request = CommandRequest::new(method, command).args(args.iter().copied());
        self.send(&request).await
    }

    /// Send a prepared request with basic credentials
    pub async fn send(&self, request: &CommandRequest) -> Result<CommandResult> {
        self.send_with(request, Authorization::Basic).await
    }

    /// Send a prepared request with explicit authorization
    pub async fn send_with(
        &self,
        request: &CommandRequest,
        auth: Authorization<'_>,
    ) -> Result<CommandResult> {
        let url = request.url(&self.base, &self.target)?;
        let url_text = url.to_string();

        tracing::debug!(method = %request.method, url = %url_text, "sending command");

        let builder = self.http.request(request.method.as_reqwest(), url);
        let builder = match auth {
            Authorization::Basic => builder.basic_auth(&self.user, self.password.as_ref()),
            Authorization::Bearer(token) => builder.bearer_auth(token),
        };

        let response = builder.send().await.map_err(|e| Error::Transport {
            url: url_text.clone(),
            source: e,
        })?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| Error::Transport {
            url: url_text.clone(),
            source: e,
        })?;

        tracing::debug!(status, url = %url_text, "command returned");
        tracing::trace!(body = %body, "response body");

        Ok(CommandResult::new(status, body, url_text))
    }
}

#[async_trait]
impl StatusSource for CommandClient {
    async fn node_status(&self, node: &str) -> Result<String> {
        let result = self.execute(Method::Get, "query", &["state", node]).await?;
        let result = validate_ok(result)?;
        Ok(result.trimmed().to_string())
    }
}
