//! Command request encoding
//!
//! Every command is a request to the single `/query` endpoint. The command
//! name travels as `command=<name>` and positional arguments as `argument`,
//! `argument2`, `argument3`, ... in order.

use std::fmt;
use std::str::FromStr;

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::common::{Error, Result};

/// Maximum number of positional arguments the server reads
pub const MAX_ARGUMENTS: usize = 6;

/// Path of the command endpoint, relative to the base URL
pub const QUERY_PATH: &str = "query";

/// HTTP method used for a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Put,
    Post,
    Delete,
}

impl Method {
    pub fn as_reqwest(self) -> reqwest::Method {
        match self {
            Method::Get => reqwest::Method::GET,
            Method::Put => reqwest::Method::PUT,
            Method::Post => reqwest::Method::POST,
            Method::Delete => reqwest::Method::DELETE,
        }
    }

    /// Method the server expects for a supported command
    ///
    /// Returns `None` for names the server does not accept as commands.
    pub fn for_command(command: &str) -> Option<Method> {
        let method = match command {
            "ch_suites" | "check" | "checkJobGenOnly" | "debug" | "file" | "get" | "get_state"
            | "group" | "help" | "migrate" | "news" | "ping" | "query" | "server_version"
            | "stats" | "stats_server" | "status" | "suites" | "version" | "wait" | "why"
            | "zombie_get" => Method::Get,

            "ch_add" | "ch_auto_add" | "load" => Method::Post,

            "ch_drop" | "ch_drop_user" | "ch_rem" | "delete" | "zombie_remove" => Method::Delete,

            "abort" | "alter" | "archive" | "begin" | "ch_register" | "check_pt" | "complete"
            | "debug_server_off" | "debug_server_on" | "edit_history" | "edit_script"
            | "event" | "force" | "force-dep-eval" | "free-dep" | "halt" | "init" | "job_gen"
            | "kill" | "label" | "log" | "meter" | "msg" | "order" | "plug" | "queue"
            | "reloadcustompasswdfile" | "reloadpasswdfile" | "reloadwsfile" | "replace"
            | "requeue" | "restart" | "restore" | "restore_from_checkpt" | "resume" | "run"
            | "shutdown" | "stats_reset" | "suspend" | "terminate" | "zombie_adopt"
            | "zombie_block" | "zombie_fail" | "zombie_fob" | "zombie_kill" => Method::Put,

            _ => return None,
        };
        Some(method)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Method::Get => "GET",
            Method::Put => "PUT",
            Method::Post => "POST",
            Method::Delete => "DELETE",
        };
        f.write_str(name)
    }
}

impl FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "PUT" => Ok(Method::Put),
            "POST" => Ok(Method::Post),
            "DELETE" => Ok(Method::Delete),
            _ => Err(Error::Config(format!(
                "Unknown HTTP method '{}'. Supported: GET, PUT, POST, DELETE",
                s
            ))),
        }
    }
}

/// Query key for the argument at `index` (zero-based)
pub fn argument_key(index: usize) -> String {
    if index == 0 {
        "argument".to_string()
    } else {
        format!("argument{}", index + 1)
    }
}

/// Workflow server the HTTP interface should forward to
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerTarget {
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// One command to send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRequest {
    pub method: Method,
    pub command: String,
    pub args: Vec<String>,
    /// Additional query parameters appended after the arguments
    pub params: Vec<(String, String)>,
}

impl CommandRequest {
    pub fn new(method: Method, command: impl Into<String>) -> Self {
        Self {
            method,
            command: command.into(),
            args: Vec::new(),
            params: Vec::new(),
        }
    }

    /// Append a positional argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several positional arguments in order
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Attach an extra query parameter
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    /// Build the full request URL
    pub fn url(&self, base: &Url, target: &ServerTarget) -> Result<Url> {
        if self.args.len() > MAX_ARGUMENTS {
            return Err(Error::TooManyArguments {
                command: self.command.clone(),
                max: MAX_ARGUMENTS,
                got: self.args.len(),
            });
        }

        let mut url = query_endpoint(base)?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(host) = &target.host {
                query.append_pair("host", host);
            }
            if let Some(port) = target.port {
                query.append_pair("port", &port.to_string());
            }
            query.append_pair("command", &self.command);
            for (index, arg) in self.args.iter().enumerate() {
                query.append_pair(&argument_key(index), arg);
            }
            for (key, value) in &self.params {
                query.append_pair(key, value);
            }
        }
        Ok(url)
    }
}

/// Parse a base address
pub fn parse_base_url(base: &str) -> Result<Url> {
    Url::parse(base).map_err(|e| Error::InvalidUrl {
        url: base.to_string(),
        reason: e.to_string(),
    })
}

/// `<base>/query` without any existing query string
fn query_endpoint(base: &Url) -> Result<Url> {
    let mut root = base.clone();
    root.set_query(None);
    if !root.path().ends_with('/') {
        let path = format!("{}/", root.path());
        root.set_path(&path);
    }
    root.join(QUERY_PATH).map_err(|e| Error::InvalidUrl {
        url: base.to_string(),
        reason: e.to_string(),
    })
}
