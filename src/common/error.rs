//! Error types for flowprobe
//!
//! Messages carry enough context (request URL, response body, last polled
//! status) to diagnose a failed test without re-running it.

use std::io;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for flowprobe
#[derive(Error, Debug)]
pub enum Error {
    // === Transport Errors ===
    #[error("Request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Invalid server URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Command '{command}' takes at most {max} arguments, got {got}")]
    TooManyArguments {
        command: String,
        max: usize,
        got: usize,
    },

    // === Contract Errors ===
    #[error("Unexpected status {got} from {url} (expected one of {expected:?})\nResponse body: {body}")]
    UnexpectedStatus {
        got: u16,
        expected: Vec<u16>,
        url: String,
        body: String,
    },

    #[error("Node '{node}' did not reach status '{wanted}' after {attempts} attempts (last status: '{last_status}')")]
    PollTimeout {
        node: String,
        wanted: String,
        last_status: String,
        attempts: u32,
    },

    #[error("Test assertion failed: {0}")]
    TestAssertion(String),

    #[error("Test body panicked: {message}")]
    Panicked { message: String },

    #[error("Authentication failed: {0}")]
    Auth(String),

    // === Suite Construction Errors ===
    #[error("Dependency cycle detected between tests: {}", .0.join(", "))]
    CycleDetected(Vec<String>),

    #[error("Test '{test}' depends on unknown test '{prerequisite}'")]
    UnknownPrerequisite { test: String, prerequisite: String },

    #[error("Test '{0}' is registered more than once")]
    DuplicateTest(String),

    #[error("Unknown operation '{name}'. Available: {available}")]
    UnknownOperation { name: String, available: String },

    #[error("Test '{test}' cannot move from {from} to {to}")]
    InvalidTransition {
        test: String,
        from: String,
        to: String,
    },

    // === Run Errors ===
    #[error("{failed} test(s) failed{}", aborted_suffix(.aborted))]
    SuiteFailed { failed: usize, aborted: bool },

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn aborted_suffix(aborted: &bool) -> &'static str {
    if *aborted {
        " (run aborted)"
    } else {
        ""
    }
}

impl Error {
    /// Create an unexpected status error
    pub fn unexpected_status(got: u16, expected: &[u16], url: &str, body: &str) -> Self {
        Self::UnexpectedStatus {
            got,
            expected: expected.to_vec(),
            url: url.to_string(),
            body: body.to_string(),
        }
    }

    /// Create a poll timeout error
    pub fn poll_timeout(node: &str, wanted: &str, last_status: &str, attempts: u32) -> Self {
        Self::PollTimeout {
            node: node.to_string(),
            wanted: wanted.to_string(),
            last_status: last_status.to_string(),
            attempts,
        }
    }

    /// Create a panic error from a caught unwind payload
    pub fn panicked(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self::Panicked { message }
    }

    /// Create a file read error
    pub fn file_read(path: &std::path::Path, error: impl std::fmt::Display) -> Self {
        Self::FileRead {
            path: path.display().to_string(),
            error: error.to_string(),
        }
    }

    /// Stable machine-readable code, used in JSON reports
    pub fn code(&self) -> &'static str {
        match self {
            Error::Transport { .. } | Error::InvalidUrl { .. } => "TRANSPORT",
            Error::TooManyArguments { .. } => "TOO_MANY_ARGUMENTS",
            Error::UnexpectedStatus { .. } => "UNEXPECTED_STATUS",
            Error::PollTimeout { .. } => "POLL_TIMEOUT",
            Error::TestAssertion(_) => "ASSERTION",
            Error::Panicked { .. } => "PANICKED",
            Error::Auth(_) => "AUTH",
            Error::CycleDetected(_) => "CYCLE_DETECTED",
            Error::UnknownPrerequisite { .. } => "UNKNOWN_PREREQUISITE",
            Error::DuplicateTest(_) => "DUPLICATE_TEST",
            Error::UnknownOperation { .. } => "UNKNOWN_OPERATION",
            Error::InvalidTransition { .. } => "INVALID_TRANSITION",
            Error::SuiteFailed { .. } => "SUITE_FAILED",
            Error::Config(_) | Error::ConfigParse(_) => "CONFIG",
            Error::Io(_) | Error::FileRead { .. } => "IO",
            Error::Json(_) => "JSON",
        }
    }

    /// Whether this error was raised while building the suite rather than running it
    pub fn is_construction_error(&self) -> bool {
        matches!(
            self,
            Error::CycleDetected(_) | Error::UnknownPrerequisite { .. } | Error::DuplicateTest(_)
        )
    }
}
