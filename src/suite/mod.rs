//! Conformance suite for the workflow server
//!
//! [`Suite`] is the context every test body receives: the command client,
//! the optional token client, fixture settings and polling bounds.

pub mod cases;
pub mod definition;
pub mod operations;

use crate::client::{CommandClient, CommandRequest, CommandResult, Method, TokenClient};
use crate::common::config::{Config, PollConfig, SuiteConfig};
use crate::common::Result;
use crate::testing::{await_status, validate, PollRequest, DEFAULT_EXPECTED};

pub use cases::{build_graph, CaseFn, CaseSpec, CASES};
pub use operations::{Invoke, Operation, OperationTable};

/// Status a task reports once it has finished
pub const COMPLETE: &str = "complete";

/// Run context shared by all tests of one run
#[derive(Debug)]
pub struct Suite {
    client: CommandClient,
    tokens: Option<TokenClient>,
    config: SuiteConfig,
    poll: PollConfig,
}

impl Suite {
    pub fn new(config: &Config) -> Result<Self> {
        let client = CommandClient::new(&config.server)?;
        let tokens = config
            .auth
            .as_ref()
            .map(|auth| TokenClient::new(auth, config.server.accept_invalid_certs))
            .transpose()?;

        Ok(Self {
            client,
            tokens,
            config: config.suite.clone(),
            poll: config.poll,
        })
    }

    pub fn client(&self) -> &CommandClient {
        &self.client
    }

    pub fn tokens(&self) -> Option<&TokenClient> {
        self.tokens.as_ref()
    }

    pub fn config(&self) -> &SuiteConfig {
        &self.config
    }

    pub fn poll(&self) -> &PollConfig {
        &self.poll
    }

    /// Node path of the suite, e.g. `/test`
    pub fn node(&self) -> String {
        self.config.node_path()
    }

    /// Node path below the suite, e.g. `child("a/b")` is `/test/a/b`
    pub fn child(&self, relative: &str) -> String {
        format!("{}/{}", self.node(), relative.trim_start_matches('/'))
    }

    /// Issue one command and check its status against `expected`
    pub async fn command(
        &self,
        method: Method,
        command: &str,
        args: &[&str],
        expected: &[u16],
    ) -> Result<CommandResult> {
        let result = self.client.execute(method, command, args).await?;
        validate(result, expected)
    }

    /// Send a prepared request and check its status against `expected`
    pub async fn request(&self, request: &CommandRequest, expected: &[u16]) -> Result<CommandResult> {
        let result = self.client.send(request).await?;
        validate(result, expected)
    }

    /// `alter add variable NAME VALUE NODE`
    pub async fn add_variable(&self, node: &str, name: &str, value: &str) -> Result<()> {
        self.command(
            Method::Put,
            "alter",
            &["add", "variable", name, value, node],
            DEFAULT_EXPECTED,
        )
        .await?;
        Ok(())
    }

    /// Single-node lifecycle command such as `requeue`, `suspend` or `resume`
    pub async fn node_op(&self, node: &str, op: &str) -> Result<()> {
        let method = Method::for_command(op).unwrap_or(Method::Put);
        self.command(method, op, &[node], DEFAULT_EXPECTED).await?;
        Ok(())
    }

    /// `alter change event EVENT set NODE`
    pub async fn set_event(&self, node: &str, event: &str) -> Result<()> {
        self.command(
            Method::Put,
            "alter",
            &["change", "event", event, "set", node],
            DEFAULT_EXPECTED,
        )
        .await?;
        Ok(())
    }

    /// Wait until `node` reports `status`, within the configured bounds
    pub async fn await_node(&self, node: &str, status: &str) -> Result<u32> {
        let request = PollRequest::from_config(&self.poll, node, status);
        await_status(&self.client, &request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::config::AuthConfig;

    #[test]
    fn test_node_paths() {
        let suite = Suite::new(&Config::default()).unwrap();
        assert_eq!(suite.node(), "/test");
        assert_eq!(suite.child("a/b"), "/test/a/b");
        assert_eq!(suite.child("/b"), "/test/b");
        assert!(suite.tokens().is_none());
    }

    #[test]
    fn test_token_client_built_when_auth_configured() {
        let config = Config {
            auth: Some(AuthConfig {
                url: "http://localhost:5001".to_string(),
                username: "fred".to_string(),
                password: "frogs".to_string(),
            }),
            ..Config::default()
        };
        let suite = Suite::new(&config).unwrap();
        assert_eq!(
            suite.tokens().unwrap().token_url(),
            "http://localhost:5001/auth"
        );
    }
}
