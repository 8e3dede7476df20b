//! CLI command definitions
//!
//! Defines the clap commands for the flowprobe CLI.

use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the whole conformance suite
    Run {
        /// Also write a JSON report to this file
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Quick check: ping, version, user, unknown, then suite_operations (default)
    Smoke,

    /// List tests in execution order
    List,

    /// Run one named operation (a suite test or a helper)
    Exec {
        /// Operation name, e.g. ping or add_variable
        operation: String,

        /// Positional arguments for the operation
        args: Vec<String>,
    },

    /// Send a single raw command and print the response
    Send {
        /// Server command name
        command: String,

        /// Positional arguments (at most 6)
        args: Vec<String>,

        /// HTTP method; defaults to the command's declared method
        #[arg(long, short)]
        method: Option<String>,

        /// Accepted status codes, comma separated
        #[arg(long, short, value_delimiter = ',')]
        expect: Vec<u16>,

        /// Extra query parameter as key=value (repeatable)
        #[arg(long = "param", short = 'p')]
        params: Vec<String>,
    },

    /// Wait for a node to reach a status
    Await {
        /// Node path, e.g. /test/a/b
        node: String,

        /// Status to wait for
        #[arg(long, default_value = "complete")]
        status: String,
    },
}
