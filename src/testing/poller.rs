//! Completion polling
//!
//! The server runs tasks asynchronously and only exposes point-in-time
//! status queries, so waiting for a task means re-querying at a fixed
//! interval until the wanted status shows up or the attempt budget runs out.

use std::time::Duration;

use async_trait::async_trait;

use crate::common::config::PollConfig;
use crate::common::{Error, Result};

/// Anything that can report the current status of a node
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn node_status(&self, node: &str) -> Result<String>;
}

/// What to wait for and how long
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollRequest {
    pub node: String,
    pub wanted: String,
    pub interval: Duration,
    /// Always at least 1
    pub max_attempts: u32,
}

impl PollRequest {
    pub fn new(
        node: impl Into<String>,
        wanted: impl Into<String>,
        interval: Duration,
        max_attempts: u32,
    ) -> Self {
        Self {
            node: node.into(),
            wanted: wanted.into(),
            interval,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn from_config(config: &PollConfig, node: impl Into<String>, wanted: impl Into<String>) -> Self {
        Self::new(node, wanted, config.interval(), config.max_attempts)
    }

    /// Longest time spent sleeping between attempts
    pub fn max_wait(&self) -> Duration {
        self.interval * (self.max_attempts - 1)
    }
}

/// Query `request.node` until it reports `request.wanted`
///
/// Returns the number of queries made. Errors from the source end the wait
/// immediately; exhausting the budget yields [`Error::PollTimeout`].
pub async fn await_status<S>(source: &S, request: &PollRequest) -> Result<u32>
where
    S: StatusSource + ?Sized,
{
    tracing::debug!(
        node = %request.node,
        wanted = %request.wanted,
        max_wait = ?request.max_wait(),
        "waiting for node"
    );

    let mut attempts = 0;
    loop {
        attempts += 1;
        let status = source.node_status(&request.node).await?;

        tracing::debug!(
            node = %request.node,
            status = %status,
            attempt = attempts,
            max_attempts = request.max_attempts,
            "polled node status"
        );

        if status == request.wanted {
            tracing::info!(node = %request.node, status = %status, attempts, "node reached status");
            return Ok(attempts);
        }

        if attempts >= request.max_attempts {
            tracing::warn!(
                node = %request.node,
                last_status = %status,
                attempts,
                "gave up waiting for node"
            );
            return Err(Error::poll_timeout(
                &request.node,
                &request.wanted,
                &status,
                attempts,
            ));
        }

        tokio::time::sleep(request.interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::time::Instant;

    /// Returns queued statuses in order, repeating the last one forever
    struct ScriptedSource {
        statuses: Mutex<VecDeque<String>>,
        queries: Mutex<Vec<Instant>>,
    }

    impl ScriptedSource {
        fn new(statuses: &[&str]) -> Self {
            Self {
                statuses: Mutex::new(statuses.iter().map(|s| s.to_string()).collect()),
                queries: Mutex::new(Vec::new()),
            }
        }

        fn query_times(&self) -> Vec<Instant> {
            self.queries.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl StatusSource for ScriptedSource {
        async fn node_status(&self, _node: &str) -> Result<String> {
            self.queries.lock().unwrap().push(Instant::now());
            let mut statuses = self.statuses.lock().unwrap();
            if statuses.len() > 1 {
                Ok(statuses.pop_front().unwrap())
            } else {
                Ok(statuses.front().cloned().unwrap_or_default())
            }
        }
    }

    struct FailingSource;

    #[async_trait]
    impl StatusSource for FailingSource {
        async fn node_status(&self, _node: &str) -> Result<String> {
            Err(Error::unexpected_status(
                404,
                &[200],
                "http://localhost/query?command=query",
                "no such node",
            ))
        }
    }

    fn request(max_attempts: u32) -> PollRequest {
        PollRequest::new("/test/a/b", "complete", Duration::from_secs(2), max_attempts)
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_match_returns_without_waiting() {
        let source = ScriptedSource::new(&["complete"]);
        let start = Instant::now();

        let attempts = await_status(&source, &request(20)).await.unwrap();

        assert_eq!(attempts, 1);
        assert_eq!(source.query_times().len(), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_match_after_some_attempts() {
        let source = ScriptedSource::new(&["queued", "submitted", "active", "complete"]);
        let start = Instant::now();

        let attempts = await_status(&source, &request(20)).await.unwrap();

        assert_eq!(attempts, 4);
        assert_eq!(start.elapsed(), Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_matching_status_times_out_after_n_queries() {
        let source = ScriptedSource::new(&["active"]);
        let start = Instant::now();

        let err = await_status(&source, &request(5)).await.unwrap_err();

        match err {
            Error::PollTimeout {
                node,
                wanted,
                last_status,
                attempts,
            } => {
                assert_eq!(node, "/test/a/b");
                assert_eq!(wanted, "complete");
                assert_eq!(last_status, "active");
                assert_eq!(attempts, 5);
            }
            other => panic!("Expected PollTimeout, got {other:?}"),
        }

        let times = source.query_times();
        assert_eq!(times.len(), 5);
        for pair in times.windows(2) {
            assert_eq!(pair[1] - pair[0], Duration::from_secs(2));
        }
        // No sleep after the final attempt
        assert_eq!(start.elapsed(), Duration::from_secs(8));
    }

    #[tokio::test(start_paused = true)]
    async fn test_source_error_ends_wait() {
        let start = Instant::now();
        let err = await_status(&FailingSource, &request(20)).await.unwrap_err();
        assert!(matches!(err, Error::UnexpectedStatus { got: 404, .. }));
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[test]
    fn test_zero_attempts_clamped_to_one() {
        let request = PollRequest::new("/n", "complete", Duration::from_secs(1), 0);
        assert_eq!(request.max_attempts, 1);
        assert_eq!(request.max_wait(), Duration::ZERO);
    }

    #[test]
    fn test_from_config() {
        let request = PollRequest::from_config(&PollConfig::default(), "/test/a", "complete");
        assert_eq!(request.interval, Duration::from_secs(2));
        assert_eq!(request.max_attempts, 20);
        assert_eq!(request.max_wait(), Duration::from_secs(38));
    }
}
