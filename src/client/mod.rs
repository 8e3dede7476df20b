//! Client side of the server's HTTP command protocol

pub mod auth;
mod http;
pub mod request;

pub use auth::TokenClient;
pub use http::{Authorization, CommandClient, CommandResult};
pub use request::{CommandRequest, Method, ServerTarget, MAX_ARGUMENTS};
