//! Common utilities shared by the CLI, the suite and the mock server

pub mod config;
pub mod error;
pub mod logging;
pub mod paths;

pub use error::{Error, Result};

/// Parse a "listening at:" address from server output.
/// Handles IPv6 wildcard format [::]:PORT by converting to 127.0.0.1:PORT
pub fn parse_listen_address(line: &str) -> Option<String> {
    let addr_start = line.find("listening at:")?;
    let addr = line[addr_start + "listening at:".len()..].trim();
    if let Some(port) = addr.strip_prefix("[::]:") {
        return Some(format!("127.0.0.1:{}", port));
    }
    if let Some(port) = addr.strip_prefix("0.0.0.0:") {
        return Some(format!("127.0.0.1:{}", port));
    }
    Some(addr.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_listen_address() {
        assert_eq!(
            parse_listen_address("mock server listening at: 127.0.0.1:4567"),
            Some("127.0.0.1:4567".to_string())
        );
        assert_eq!(
            parse_listen_address("listening at: [::]:80"),
            Some("127.0.0.1:80".to_string())
        );
        assert_eq!(
            parse_listen_address("listening at: 0.0.0.0:81"),
            Some("127.0.0.1:81".to_string())
        );
        assert_eq!(parse_listen_address("starting up"), None);
    }
}
