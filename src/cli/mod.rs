//! CLI command handling
//!
//! Dispatches CLI commands against the configured server and formats output.

use colored::Colorize;

use crate::client::{CommandRequest, Method};
use crate::commands::Commands;
use crate::common::config::Config;
use crate::common::{Error, Result};
use crate::suite::{build_graph, OperationTable, Suite};
use crate::testing::{report, validate, Scheduler, DEFAULT_EXPECTED};

/// Dispatch a CLI command
pub async fn dispatch(command: Commands, config: &Config) -> Result<()> {
    let suite = Suite::new(config)?;

    match command {
        Commands::Run { report: report_path } => {
            let graph = build_graph(&suite)?;
            let scheduler = Scheduler::new();

            let handle = scheduler.abort_handle();
            let watcher = tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    eprintln!("\nInterrupted: finishing current test, skipping the rest");
                    handle.abort();
                }
            });

            println!(
                "Running {} tests against {}\n",
                graph.len(),
                suite.client().base_url()
            );
            let result = scheduler
                .run_with(&graph, &suite, report::print_result)
                .await;
            watcher.abort();
            let run = result?;

            report::print_summary(&run);
            if let Some(path) = report_path {
                report::write_json(&run, &path)?;
                println!("Report written to {}", path.display());
            }

            run.into_result().map(|_| ())
        }

        Commands::Smoke => {
            println!("Smoke check against {}", suite.client().base_url());
            OperationTable::new().invoke(&suite, "smoke", &[]).await?;
            println!("{} smoke", "✓".green());
            Ok(())
        }

        Commands::List => {
            let graph = build_graph(&suite)?;
            for case in graph.topological_order()? {
                let mut line = case.name().to_string();
                if !case.prerequisites().is_empty() {
                    line.push_str(&format!(
                        " {}",
                        format!("(after {})", case.prerequisites().join(", ")).dimmed()
                    ));
                }
                if let Some(reason) = case.skip_reason() {
                    line.push_str(&format!(" {}", format!("[skip: {}]", reason).yellow()));
                }
                println!("  {}", line);
            }
            Ok(())
        }

        Commands::Exec { operation, args } => {
            OperationTable::new()
                .invoke(&suite, &operation, &args)
                .await?;
            println!("{} {}", "✓".green(), operation);
            Ok(())
        }

        Commands::Send {
            command,
            args,
            method,
            expect,
            params,
        } => {
            let method = match method {
                Some(m) => m.parse()?,
                None => Method::for_command(&command).unwrap_or(Method::Get),
            };

            let mut request = CommandRequest::new(method, &command).args(args);
            for param in params {
                let (key, value) = param.split_once('=').ok_or_else(|| {
                    Error::Config(format!("Parameter '{}' must be key=value", param))
                })?;
                request = request.param(key, value);
            }

            let result = suite.client().send(&request).await?;
            println!("{} {}", method, result.url());
            println!("Status: {}", result.status());
            if !result.body().is_empty() {
                print!("{}", result.body());
                if !result.body().ends_with('\n') {
                    println!();
                }
            }

            let expected = if expect.is_empty() {
                DEFAULT_EXPECTED.to_vec()
            } else {
                expect
            };
            validate(result, &expected)?;
            Ok(())
        }

        Commands::Await { node, status } => {
            println!(
                "Waiting for {} to reach '{}' (up to {:?})",
                node,
                status,
                suite.poll().max_wait()
            );
            let attempts = suite.await_node(&node, &status).await?;
            println!(
                "{} {} reached '{}' after {} attempt(s)",
                "✓".green(),
                node,
                status,
                attempts
            );
            Ok(())
        }
    }
}
