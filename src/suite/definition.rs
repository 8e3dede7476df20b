//! Suite definition fixtures

use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::common::{Error, Result};

/// Read a fixture file as UTF-8 text
pub fn load_definition(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| Error::file_read(path, e))
}

/// Encode fixture text the way `load` and `edit_script` expect it
pub fn encode_definition(text: &str) -> String {
    STANDARD.encode(text.as_bytes())
}

/// Name declared by the first `suite NAME` line
pub fn suite_name(text: &str) -> Option<&str> {
    text.lines().find_map(|line| {
        let mut words = line.split_whitespace();
        match (words.next(), words.next()) {
            (Some("suite"), Some(name)) => Some(name),
            _ => None,
        }
    })
}
