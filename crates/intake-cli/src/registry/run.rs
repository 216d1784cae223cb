use std::fs::{OpenOptions, create_dir_all};
use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::{DateTime, Utc};
use serde::Serialize;

use intake_core::RecordType;
use intake_engine::{EngineConfig, ValidationResponse};

use super::{RegistryError, RegistryResult};

/// Serializable options for a validation run.
#[derive(Debug, Clone, Serialize)]
pub struct RunOptions {
    pub input: PathBuf,
    pub source: String,
    /// `None` when neither declared nor inferable from the source.
    pub record_type: Option<RecordType>,
    pub content_type: Option<String>,
    pub rules: PathBuf,
    pub strict: bool,
    pub engine: EngineConfig,
}

/// Metadata captured at run start.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub response_version: String,
    pub run_dir: PathBuf,
    pub options: RunOptions,
}

/// JSON config written to each run directory.
#[derive(Debug, Serialize)]
pub struct RunConfig {
    pub run_id: String,
    pub started_at: String,
    pub response_version: String,
    pub options: RunOptions,
    pub git: GitInfo,
}

/// Git metadata for reproducibility.
#[derive(Debug, Serialize)]
pub struct GitInfo {
    pub commit: Option<String>,
    pub dirty: Option<bool>,
}

/// Paths for run artifacts.
#[derive(Debug, Clone)]
pub struct RunPaths {
    pub root: PathBuf,
    pub logs_path: PathBuf,
    pub response_path: PathBuf,
    pub report_path: PathBuf,
    pub audit_path: PathBuf,
    pub warehouse_dir: PathBuf,
}

pub fn start_run(ctx: &RunContext) -> RegistryResult<RunPaths> {
    let timestamp = ctx.started_at.format("%Y-%m-%dT%H-%M-%SZ").to_string();
    let root = ctx.run_dir.join(format!("{timestamp}__run_{}", ctx.run_id));

    create_dir_all(&root)?;

    let config = RunConfig {
        run_id: ctx.run_id.clone(),
        started_at: ctx.started_at.to_rfc3339(),
        response_version: ctx.response_version.clone(),
        options: ctx.options.clone(),
        git: collect_git_info(),
    };
    write_json(&root.join("config.json"), &config)?;

    let logs_path = root.join("logs.ndjson");
    OpenOptions::new().create(true).append(true).open(&logs_path)?;

    Ok(RunPaths {
        logs_path,
        response_path: root.join("response.json"),
        report_path: root.join("report.md"),
        audit_path: root.join("audit.ndjson"),
        warehouse_dir: root.clone(),
        root,
    })
}

pub fn write_response(paths: &RunPaths, response: &ValidationResponse) -> RegistryResult<()> {
    write_json(&paths.response_path, response)
}

pub fn write_report(paths: &RunPaths, report: &str) -> RegistryResult<()> {
    std::fs::write(&paths.report_path, report)?;
    Ok(())
}

pub fn collect_git_info() -> GitInfo {
    let commit = Command::new("git")
        .args(["rev-parse", "HEAD"])
        .output()
        .ok()
        .and_then(|output| {
            if output.status.success() {
                Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
            } else {
                None
            }
        })
        .filter(|value| !value.is_empty());

    let dirty = Command::new("git")
        .args(["status", "--porcelain"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .map(|output| !output.stdout.is_empty());

    GitInfo { commit, dirty }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> RegistryResult<()> {
    let file = OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(path)?;
    serde_json::to_writer_pretty(file, value).map_err(RegistryError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_layout_is_created_under_run_dir() {
        let run_dir = std::env::temp_dir().join(format!("intake_runs_{}", uuid::Uuid::new_v4()));
        let ctx = RunContext {
            run_id: "abc".to_string(),
            started_at: DateTime::parse_from_rfc3339("2024-06-30T12:00:00Z")
                .expect("timestamp")
                .with_timezone(&Utc),
            response_version: "0.1".to_string(),
            run_dir: run_dir.clone(),
            options: RunOptions {
                input: PathBuf::from("day.csv"),
                source: "Reports/Sales/day.csv".to_string(),
                record_type: Some(RecordType::Sales),
                content_type: None,
                rules: PathBuf::from("rules/default.rules.json"),
                strict: false,
                engine: EngineConfig::default(),
            },
        };

        let paths = start_run(&ctx).expect("start run");
        assert_eq!(paths.root, run_dir.join("2024-06-30T12-00-00Z__run_abc"));
        assert!(paths.logs_path.exists());

        let config: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(paths.root.join("config.json")).expect("config"),
        )
        .expect("json");
        assert_eq!(config["options"]["record_type"], "SALES");
        assert_eq!(config["options"]["engine"]["max_batch_size"], 500);
    }
}
