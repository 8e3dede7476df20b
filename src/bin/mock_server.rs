//! Mock workflow server for integration testing
//!
//! Serves the `/query` command endpoint and the `/auth` token endpoint over
//! plain HTTP. Suites live in memory; setting an event on a family runs its
//! tasks one after another, each going `active` then `complete`.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, post};
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use clap::Parser;
use serde::Deserialize;
use serde_json::json;

use flowprobe::client::{Method, MAX_ARGUMENTS};
use flowprobe::common::logging;

/// Commands the HTTP interface refuses outright
const REJECTED: &[&str] = &[
    "add", "host", "password", "port", "remove", "rid", "show", "user",
];

/// Commands the HTTP interface knows but does not implement
const NOT_IMPLEMENTED: &[&str] = &["server_load", "sync", "sync_clock", "sync_full"];

#[derive(Parser, Debug, Clone)]
#[command(name = "mock_server", about = "In-memory workflow server for tests")]
struct Args {
    /// Port to listen on (0 picks a free one)
    #[arg(long, default_value_t = 0)]
    port: u16,

    /// Time each task spends active before completing
    #[arg(long, default_value_t = 50)]
    task_delay_ms: u64,

    /// Task path that goes active and never completes (repeatable)
    #[arg(long)]
    stuck: Vec<String>,

    #[arg(long, default_value = "partio")]
    user: String,

    #[arg(long, default_value = "partio")]
    password: String,

    /// Credentials accepted by the token endpoint
    #[arg(long, default_value = "fred")]
    auth_user: String,

    #[arg(long, default_value = "frogs")]
    auth_password: String,

    /// Version reported by `version`, `server_version` and `get`
    #[arg(long, default_value = "5.8.3")]
    version: String,

    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let _guard = logging::init_cli(args.verbose, None);

    let addr = SocketAddr::from(([127, 0, 0, 1], args.port));
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            eprintln!("mock server failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    let local = match listener.local_addr() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("mock server has no local address: {}", e);
            std::process::exit(1);
        }
    };

    let server = Arc::new(MockServer::new(args));
    let app = Router::new()
        .route("/query", any(handle_query))
        .route("/auth", post(handle_auth))
        .with_state(server);

    println!("mock server listening at: {}", local);

    if let Err(e) = axum::serve(listener, app.into_make_service()).await {
        eprintln!("mock server stopped: {}", e);
        std::process::exit(1);
    }
}

/// Status code and text body of one command
#[derive(Debug)]
struct Reply {
    status: u16,
    body: String,
}

impl Reply {
    fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    fn error(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            body: message.into(),
        }
    }

    fn is_ok(&self) -> bool {
        self.status < 300
    }
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, [(header::CONTENT_TYPE, "text/plain")], self.body).into_response()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Suite,
    Family,
    Task,
}

#[derive(Debug)]
struct Node {
    path: String,
    kind: Kind,
    state: String,
}

#[derive(Debug)]
struct MockSuite {
    name: String,
    definition: String,
    nodes: Vec<Node>,
    variables: HashMap<String, BTreeMap<String, String>>,
}

impl MockSuite {
    /// Build the node tree from definition text
    fn parse(definition: &str) -> Option<Self> {
        let mut stack: Vec<String> = Vec::new();
        let mut nodes = Vec::new();

        for line in definition.lines() {
            let mut words = line.split_whitespace();
            match (words.next(), words.next()) {
                (Some("suite"), Some(name)) if stack.is_empty() => {
                    let path = format!("/{}", name);
                    stack.push(path.clone());
                    nodes.push(Node::new(path, Kind::Suite));
                }
                (Some("family"), Some(name)) => {
                    let path = format!("{}/{}", stack.last()?, name);
                    stack.push(path.clone());
                    nodes.push(Node::new(path, Kind::Family));
                }
                (Some("task"), Some(name)) => {
                    let path = format!("{}/{}", stack.last()?, name);
                    nodes.push(Node::new(path, Kind::Task));
                }
                (Some("endfamily"), _) => {
                    stack.pop();
                }
                (Some("endsuite"), _) => break,
                _ => {}
            }
        }

        let root = nodes.first()?;
        if root.kind != Kind::Suite {
            return None;
        }
        Some(Self {
            name: root.path.trim_start_matches('/').to_string(),
            definition: definition.to_string(),
            nodes,
            variables: HashMap::new(),
        })
    }

    fn node(&self, path: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.path == path)
    }

    /// Tasks at or below `path`
    fn tasks_under<'a>(&'a mut self, path: &'a str) -> impl Iterator<Item = &'a mut Node> + 'a {
        let prefix = format!("{}/", path);
        self.nodes
            .iter_mut()
            .filter(move |n| n.kind == Kind::Task && (n.path == path || n.path.starts_with(&prefix)))
    }

    fn requeue(&mut self, path: &str) {
        for task in self.tasks_under(path) {
            task.state = "queued".to_string();
        }
    }

    /// Task states are stored; suite and family states derive from their tasks
    fn state(&self, path: &str) -> Option<String> {
        let node = self.node(path)?;
        if node.kind == Kind::Task {
            return Some(node.state.clone());
        }

        let prefix = format!("{}/", path);
        let states: Vec<&str> = self
            .nodes
            .iter()
            .filter(|n| n.kind == Kind::Task && n.path.starts_with(&prefix))
            .map(|n| n.state.as_str())
            .collect();

        let state = if states.is_empty() {
            node.state.as_str()
        } else if states.iter().all(|s| *s == "complete") {
            "complete"
        } else if states.contains(&"active") {
            "active"
        } else if states.contains(&"queued") {
            "queued"
        } else {
            "unknown"
        };
        Some(state.to_string())
    }

    /// Direct child tasks of a family, in definition order
    fn child_tasks(&self, family: &str) -> Vec<String> {
        self.nodes
            .iter()
            .filter(|n| n.kind == Kind::Task && parent(&n.path) == Some(family))
            .map(|n| n.path.clone())
            .collect()
    }
}

impl Node {
    fn new(path: String, kind: Kind) -> Self {
        Self {
            path,
            kind,
            state: "unknown".to_string(),
        }
    }
}

fn parent(path: &str) -> Option<&str> {
    path.rsplit_once('/').map(|(p, _)| p).filter(|p| !p.is_empty())
}

/// Suite name a node path belongs to
fn suite_of(path: &str) -> &str {
    path.trim_start_matches('/').split('/').next().unwrap_or("")
}

enum Credentials {
    None,
    Basic { user: String, password: String },
    Bearer(String),
}

struct MockServer {
    args: Args,
    suites: Mutex<BTreeMap<String, MockSuite>>,
    tokens: Mutex<HashSet<String>>,
    log: Mutex<Vec<String>>,
    requests: AtomicU64,
    issued: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockServer {
    fn new(args: Args) -> Self {
        Self {
            args,
            suites: Mutex::new(BTreeMap::new()),
            tokens: Mutex::new(HashSet::new()),
            log: Mutex::new(Vec::new()),
            requests: AtomicU64::new(0),
            issued: AtomicU64::new(0),
        }
    }

    fn credentials(headers: &HeaderMap) -> Result<Credentials, Reply> {
        let Some(value) = headers.get(header::AUTHORIZATION) else {
            return Ok(Credentials::None);
        };
        let value = value
            .to_str()
            .map_err(|_| Reply::error(400, "Malformed Authorization header"))?;

        match value.split_once(' ') {
            Some(("Basic", encoded)) => {
                let decoded = STANDARD
                    .decode(encoded.trim())
                    .ok()
                    .and_then(|bytes| String::from_utf8(bytes).ok())
                    .ok_or_else(|| Reply::error(400, "Malformed basic credentials"))?;
                let (user, password) = decoded.split_once(':').unwrap_or((decoded.as_str(), ""));
                Ok(Credentials::Basic {
                    user: user.to_string(),
                    password: password.to_string(),
                })
            }
            Some(("Bearer", token)) => Ok(Credentials::Bearer(token.trim().to_string())),
            Some((kind, _)) => Err(Reply::error(
                405,
                format!("Authentication method not supported: {}", kind),
            )),
            None => Err(Reply::error(400, "Malformed Authorization header")),
        }
    }

    fn authenticate(&self, credentials: &Credentials) -> Result<bool, Reply> {
        match credentials {
            Credentials::None => Ok(false),
            Credentials::Basic { user, password } => {
                if *user == self.args.user && *password == self.args.password {
                    Ok(true)
                } else {
                    Err(Reply::error(401, "authentication failed"))
                }
            }
            Credentials::Bearer(token) => {
                if lock(&self.tokens).contains(token) {
                    Ok(true)
                } else {
                    Err(Reply::error(401, "authentication failed: unknown token"))
                }
            }
        }
    }

    /// Method a command must be sent with, or the rejection for it
    fn classify(command: &str) -> Result<Method, Reply> {
        if REJECTED.contains(&command) {
            return Err(Reply::error(
                405,
                format!("Command '{}' is not allowed", command),
            ));
        }
        if NOT_IMPLEMENTED.contains(&command) {
            return Err(Reply::error(
                501,
                format!("Command '{}' is not implemented", command),
            ));
        }
        Method::for_command(command)
            .ok_or_else(|| Reply::error(500, format!("Unknown command '{}'", command)))
    }

    fn handle(
        self: &Arc<Self>,
        method: &str,
        headers: &HeaderMap,
        params: &[(String, String)],
    ) -> Reply {
        self.requests.fetch_add(1, Ordering::SeqCst);

        let credentials = match Self::credentials(headers) {
            Ok(c) => c,
            Err(reply) => return reply,
        };
        let authenticated = match self.authenticate(&credentials) {
            Ok(a) => a,
            Err(reply) => return reply,
        };

        let value = |key: &str| {
            params
                .iter()
                .find(|(k, v)| k == key && !v.is_empty())
                .map(|(_, v)| v.clone())
        };

        let Some(command) = value("command") else {
            return Reply::error(400, "Missing argument 'command'");
        };

        let expected = match Self::classify(&command) {
            Ok(m) => m,
            Err(reply) => return reply,
        };

        let given: Method = match method.parse() {
            Ok(m) => m,
            Err(_) => return Reply::error(400, format!("Unsupported HTTP method '{}'", method)),
        };
        if given != expected {
            return Reply::error(
                400,
                format!("Invalid HTTP method '{}' for command '{}'", method, command),
            );
        }
        if given != Method::Get && !authenticated {
            return Reply::error(401, "Missing authentication details");
        }

        let mut args: Vec<String> = (0..MAX_ARGUMENTS)
            .map(|i| match i {
                0 => value("argument").or_else(|| value("argument1")),
                n => value(&format!("argument{}", n + 1)),
            })
            .map(Option::unwrap_or_default)
            .collect();
        while args.last().is_some_and(|a| a.is_empty()) {
            args.pop();
        }

        let reply = self.run(&command, &args);
        if reply.is_ok() && given == Method::Post {
            return Reply {
                status: 201,
                body: reply.body,
            };
        }
        reply
    }

    fn run(self: &Arc<Self>, command: &str, args: &[String]) -> Reply {
        tracing::debug!(command, ?args, "command");
        lock(&self.log).push(format!("MSG:--{} {}", command, args.join(" ")));

        let arg = |i: usize| args.get(i).map(String::as_str).unwrap_or("");
        let version = &self.args.version;

        match command {
            "ping" => Reply::ok("ping succeeded\n"),
            "version" => Reply::ok(format!("Ecflow version({}) mock\n", version)),
            "server_version" => Reply::ok(format!("{}\n", version)),
            "load" => self.load(arg(0)),
            "suites" => {
                let suites = lock(&self.suites);
                let names: String = suites.keys().map(|n| format!("{}\n", n)).collect();
                Reply::ok(names)
            }
            "delete" => self.delete(args),
            "begin" => self.with_node(arg(0), |suite, path| {
                suite.requeue(path);
                Reply::ok("")
            }),
            "requeue" => self.with_node(arg(0), |suite, path| {
                suite.requeue(path);
                Reply::ok("")
            }),
            "suspend" | "resume" | "edit_script" | "why" => {
                if arg(0).is_empty() {
                    Reply::ok("")
                } else {
                    self.with_node(arg(0), |_, _| Reply::ok(""))
                }
            }
            "get" => self.get(arg(0)),
            "alter" => self.alter(args),
            "query" => self.query(args),
            "group" => self.group(arg(0)),
            "stats" | "stats_server" => Reply::ok(format!(
                "Server statistics\n  Version    {}\n  Requests   {}\n",
                version,
                self.requests.load(Ordering::SeqCst)
            )),
            "stats_reset" => {
                self.requests.store(0, Ordering::SeqCst);
                Reply::ok("")
            }
            "log" => {
                if arg(0) != "get" {
                    return Reply::ok("");
                }
                let count = arg(1).parse::<usize>().unwrap_or(100);
                let log = lock(&self.log);
                let start = log.len().saturating_sub(count);
                Reply::ok(log[start..].join("\n") + "\n")
            }
            _ => Reply::ok(""),
        }
    }

    fn load(&self, encoded: &str) -> Reply {
        let Some(text) = STANDARD
            .decode(encoded)
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
        else {
            return Reply::error(400, "Definition is not valid base64 text");
        };
        let Some(suite) = MockSuite::parse(&text) else {
            return Reply::error(400, "Definition declares no suite");
        };

        let mut suites = lock(&self.suites);
        if suites.contains_key(&suite.name) {
            return Reply::error(
                409,
                format!("Add Suite failed: A Suite of name '{}' already exist", suite.name),
            );
        }
        tracing::info!(suite = %suite.name, nodes = suite.nodes.len(), "loaded suite");
        suites.insert(suite.name.clone(), suite);
        Reply::ok("")
    }

    fn delete(&self, args: &[String]) -> Reply {
        let Some(path) = args.iter().find(|a| a.starts_with('/')) else {
            return Reply::error(400, "delete needs a node path");
        };
        let mut suites = lock(&self.suites);
        let name = suite_of(path).to_string();

        if *path == format!("/{}", name) {
            return match suites.remove(&name) {
                Some(_) => Reply::ok(""),
                None => Reply::error(404, format!("Cannot find node {}", path)),
            };
        }

        let Some(suite) = suites.get_mut(&name).filter(|s| s.node(path).is_some()) else {
            return Reply::error(404, format!("Cannot find node {}", path));
        };
        let prefix = format!("{}/", path);
        suite
            .nodes
            .retain(|n| n.path != *path && !n.path.starts_with(&prefix));
        Reply::ok("")
    }

    fn with_node<F>(&self, path: &str, f: F) -> Reply
    where
        F: FnOnce(&mut MockSuite, &str) -> Reply,
    {
        let mut suites = lock(&self.suites);
        match suites.get_mut(suite_of(path)) {
            Some(suite) if suite.node(path).is_some() => f(suite, path),
            _ => Reply::error(404, format!("Could not find node {}", path)),
        }
    }

    fn get(&self, path: &str) -> Reply {
        let suites = lock(&self.suites);
        let header = format!("#{}\n", self.args.version);

        if path.is_empty() || path == "/" {
            let all: String = suites.values().map(|s| s.definition.as_str()).collect();
            return Reply::ok(format!("{}{}# enddef\n", header, all));
        }

        match suites.get(suite_of(path)) {
            Some(suite) if suite.node(path).is_some() => {
                Reply::ok(format!("{}{}# enddef\n", header, suite.definition))
            }
            _ => Reply::error(404, format!("Could not find node {}", path)),
        }
    }

    fn alter(self: &Arc<Self>, args: &[String]) -> Reply {
        let arg = |i: usize| args.get(i).map(String::as_str).unwrap_or("");
        let Some(node) = args.last().filter(|a| a.starts_with('/')) else {
            return Reply::error(400, "alter needs a node path");
        };

        match (arg(0), arg(1)) {
            ("add" | "change", "variable") => {
                let (name, value) = (arg(2).to_string(), arg(3).to_string());
                self.with_node(node, |suite, path| {
                    suite
                        .variables
                        .entry(path.to_string())
                        .or_default()
                        .insert(name, value);
                    Reply::ok("")
                })
            }
            ("change", "event") => {
                let mut family = None;
                let reply = self.with_node(node, |suite, path| {
                    if suite.node(path).is_some_and(|n| n.kind == Kind::Family) && arg(3) == "set" {
                        family = Some(suite.child_tasks(path));
                    }
                    Reply::ok("")
                });
                if let Some(tasks) = family {
                    self.run_tasks(tasks);
                }
                reply
            }
            _ => self.with_node(node, |_, _| Reply::ok("")),
        }
    }

    /// Run tasks in order in the background; a stuck task halts the chain
    fn run_tasks(self: &Arc<Self>, tasks: Vec<String>) {
        let server = Arc::clone(self);
        let delay = Duration::from_millis(self.args.task_delay_ms);

        tokio::spawn(async move {
            for task in tasks {
                if !server.set_state(&task, "active") {
                    return;
                }
                if server.args.stuck.contains(&task) {
                    tracing::info!(task = %task, "task stuck");
                    return;
                }
                tokio::time::sleep(delay).await;
                if !server.set_state(&task, "complete") {
                    return;
                }
            }
        });
    }

    /// False once the node is gone
    fn set_state(&self, path: &str, state: &str) -> bool {
        let mut suites = lock(&self.suites);
        let Some(node) = suites
            .get_mut(suite_of(path))
            .and_then(|s| s.nodes.iter_mut().find(|n| n.path == path))
        else {
            return false;
        };
        tracing::debug!(task = %path, state, "task state");
        node.state = state.to_string();
        true
    }

    fn query(&self, args: &[String]) -> Reply {
        let arg = |i: usize| args.get(i).map(String::as_str).unwrap_or("");
        let suites = lock(&self.suites);

        match arg(0) {
            "state" => {
                let path = arg(1);
                match suites.get(suite_of(path)).and_then(|s| s.state(path)) {
                    Some(state) => Reply::ok(format!("{}\n", state)),
                    None => Reply::error(404, format!("Could not find node {}", path)),
                }
            }
            "variable" => {
                let Some((path, name)) = arg(1).split_once(':') else {
                    return Reply::error(400, "expected NODE:NAME");
                };
                let value = suites
                    .get(suite_of(path))
                    .and_then(|s| s.variables.get(path))
                    .and_then(|vars| vars.get(name));
                match value {
                    Some(v) => Reply::ok(format!("{}\n", v)),
                    None => Reply::error(404, format!("Could not find variable {}:{}", path, name)),
                }
            }
            other => Reply::error(400, format!("Unsupported query '{}'", other)),
        }
    }

    /// Run `;`-separated commands, stopping at the first failure
    fn group(self: &Arc<Self>, batch: &str) -> Reply {
        let mut output = String::new();
        for part in batch.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let (command, args): (&str, Vec<String>) = match part.split_once('=') {
                Some((cmd, arg)) if !cmd.contains(' ') => (cmd, vec![arg.to_string()]),
                _ => {
                    let mut words = part.split_whitespace();
                    let cmd = words.next().unwrap_or("");
                    (cmd, words.map(str::to_string).collect())
                }
            };

            if let Err(reply) = Self::classify(command) {
                return reply;
            }
            let reply = self.run(command, &args);
            if !reply.is_ok() {
                return reply;
            }
            output.push_str(&reply.body);
        }
        Reply::ok(output)
    }

    fn issue_token(&self, username: &str) -> String {
        let n = self.issued.fetch_add(1, Ordering::SeqCst);
        let token = STANDARD.encode(format!("{}:{}", username, n));
        lock(&self.tokens).insert(token.clone());
        token
    }
}

async fn handle_query(
    State(server): State<Arc<MockServer>>,
    method: axum::http::Method,
    headers: HeaderMap,
    Query(params): Query<Vec<(String, String)>>,
) -> Reply {
    let reply = server.handle(method.as_str(), &headers, &params);
    tracing::info!(method = %method, status = reply.status, "query");
    reply
}

#[derive(Deserialize)]
struct TokenRequest {
    username: String,
    password: String,
}

async fn handle_auth(
    State(server): State<Arc<MockServer>>,
    Json(request): Json<TokenRequest>,
) -> Response {
    if request.username != server.args.auth_user || request.password != server.args.auth_password {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "invalid credentials" })),
        )
            .into_response();
    }
    let token = server.issue_token(&request.username);
    (StatusCode::OK, Json(json!({ "access_token": token }))).into_response()
}
