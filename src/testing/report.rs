//! Console and JSON reporting for a run

use std::path::Path;

use colored::Colorize;
use serde::Serialize;

use crate::common::{Error, Result};

use super::case::TestState;
use super::scheduler::{RunReport, TestResult};

/// Print one settled test
pub fn print_result(result: &TestResult) {
    match result.state {
        TestState::Passed => println!(
            "  {} {} {}",
            "✓".green(),
            result.name,
            format!("({} ms)", result.duration.as_millis()).dimmed()
        ),
        TestState::Failed => {
            println!("  {} {}", "✗".red(), result.name.red().bold());
            if let Some(error) = &result.error {
                for line in error.to_string().lines() {
                    println!("      {}", line);
                }
            }
        }
        TestState::Skipped => {
            let reason = result
                .skip
                .as_ref()
                .map(|r| r.to_string())
                .unwrap_or_default();
            println!(
                "  {} {} {}",
                "-".yellow(),
                result.name.dimmed(),
                format!("(skipped: {})", reason).dimmed()
            );
        }
        TestState::Pending | TestState::Running => {}
    }
}

/// Print the closing summary line
pub fn print_summary(report: &RunReport) {
    let counts = format!(
        "{} passed, {} failed, {} skipped",
        report.passed(),
        report.failed(),
        report.skipped()
    );

    if report.success() {
        println!("\n{} {}\n", "✓".green().bold(), counts.green().bold());
    } else if report.aborted() {
        println!("\n{} {} {}\n", "✗".red().bold(), counts.red().bold(), "(aborted)".red());
    } else {
        println!("\n{} {}\n", "✗".red().bold(), counts.red().bold());
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorEntry {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct TestEntry {
    pub name: String,
    pub outcome: TestState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorEntry>,
    pub duration_ms: u128,
}

#[derive(Debug, Serialize)]
pub struct Summary {
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub aborted: bool,
    pub success: bool,
}

/// Serializable form of a [`RunReport`]
#[derive(Debug, Serialize)]
pub struct JsonReport {
    pub tests: Vec<TestEntry>,
    pub summary: Summary,
}

impl From<&RunReport> for JsonReport {
    fn from(report: &RunReport) -> Self {
        let tests = report
            .results
            .iter()
            .map(|r| TestEntry {
                name: r.name.clone(),
                outcome: r.state,
                skip_reason: r.skip.as_ref().map(|s| s.to_string()),
                error: r.error.as_ref().map(|e| ErrorEntry {
                    code: e.code(),
                    message: e.to_string(),
                }),
                duration_ms: r.duration.as_millis(),
            })
            .collect();

        Self {
            tests,
            summary: Summary {
                passed: report.passed(),
                failed: report.failed(),
                skipped: report.skipped(),
                aborted: report.aborted(),
                success: report.success(),
            },
        }
    }
}

/// Write the report as pretty JSON to `path`
pub fn write_json(report: &RunReport, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(&JsonReport::from(report))?;
    std::fs::write(path, json).map_err(Error::Io)?;
    tracing::info!(path = %path.display(), "wrote JSON report");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::SkipReason;
    use std::time::Duration;

    fn sample() -> RunReport {
        RunReport {
            results: vec![
                TestResult {
                    name: "ping".into(),
                    state: TestState::Passed,
                    skip: None,
                    error: None,
                    duration: Duration::from_millis(12),
                },
                TestResult {
                    name: "start_family_a".into(),
                    state: TestState::Failed,
                    skip: None,
                    error: Some(Error::poll_timeout("/test/a/b", "complete", "active", 20)),
                    duration: Duration::from_secs(38),
                },
                TestResult {
                    name: "terminate".into(),
                    state: TestState::Skipped,
                    skip: Some(SkipReason::Annotated("cannot be tested safely".into())),
                    error: None,
                    duration: Duration::ZERO,
                },
            ],
        }
    }

    #[test]
    fn test_json_report_shape() {
        let value = serde_json::to_value(JsonReport::from(&sample())).unwrap();

        assert_eq!(value["tests"][0]["name"], "ping");
        assert_eq!(value["tests"][0]["outcome"], "passed");
        assert_eq!(value["tests"][0]["duration_ms"], 12);
        assert!(value["tests"][0].get("error").is_none());

        assert_eq!(value["tests"][1]["outcome"], "failed");
        assert_eq!(value["tests"][1]["error"]["code"], "POLL_TIMEOUT");
        assert!(value["tests"][1]["error"]["message"]
            .as_str()
            .unwrap()
            .contains("last status: 'active'"));

        assert_eq!(value["tests"][2]["skip_reason"], "cannot be tested safely");

        assert_eq!(value["summary"]["passed"], 1);
        assert_eq!(value["summary"]["failed"], 1);
        assert_eq!(value["summary"]["skipped"], 1);
        assert_eq!(value["summary"]["success"], false);
    }

    #[test]
    fn test_write_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        write_json(&sample(), &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["tests"].as_array().unwrap().len(), 3);
    }
}
