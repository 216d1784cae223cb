mod registry;
mod settings;

use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use intake_core::{RESPONSE_VERSION, RecordType};
use intake_engine::{
    CsvFileLoader, EngineError, FileRequest, FileStatus, JsonLinesAuditSink, Pipeline,
    render_report,
};
use intake_rules::{
    JsonFileRuleRepository, RuleCache, RulesError, ValidationReport, check_rules, load_rule_set,
    rule_set_json_schema,
};
use registry::{RunContext, RunOptions, init_run_logging, start_run, write_report, write_response};
use settings::{SettingsError, load_settings};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
enum CliError {
    #[error("registry error: {0}")]
    Registry(#[from] registry::RegistryError),
    #[error("settings error: {0}")]
    Settings(#[from] SettingsError),
    #[error("rules error: {0}")]
    Rules(#[from] RulesError),
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("rule check failed with {0} error(s)")]
    RuleCheck(usize),
    #[error("file {file} finished with status {status}")]
    FileFailed { file: String, status: String },
    #[error("file {file} has {invalid_rows} invalid row(s)")]
    InvalidRows { file: String, invalid_rows: u64 },
}

#[derive(Parser, Debug)]
#[command(name = "intake", version, about = "Intake validation CLI")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate one data file and record the run.
    Validate(ValidateArgs),
    /// Inspect rule documents.
    #[command(subcommand)]
    Rules(RulesCommand),
    /// Print the built-in field schema of a record type.
    Schema(SchemaArgs),
}

#[derive(Subcommand, Debug)]
enum RulesCommand {
    /// Load a rule document and compile its rules against the field schemas.
    Check(RulesCheckArgs),
    /// Print the JSON Schema rule documents must satisfy.
    Schema,
}

#[derive(Args, Debug)]
struct ValidateArgs {
    /// Data file to validate.
    #[arg(value_name = "FILE")]
    file: PathBuf,
    /// Rule document (JSON).
    #[arg(long)]
    rules: PathBuf,
    /// Object key used for record type inference; defaults to the file path.
    #[arg(long)]
    source: Option<String>,
    /// Record type (SALES, INVENTORY, EXPENSE); inferred from the source when absent.
    #[arg(long)]
    record_type: Option<RecordType>,
    /// Declared content type; takes precedence over the file extension.
    #[arg(long)]
    content_type: Option<String>,
    /// Settings file (TOML).
    #[arg(long)]
    config: Option<PathBuf>,
    /// Output directory for runs.
    #[arg(long, default_value = "runs")]
    run_dir: PathBuf,
    /// Processing date used by temporal checks and `today()`.
    #[arg(long, value_name = "YYYY-MM-DD")]
    as_of: Option<NaiveDate>,
    /// Worker threads per batch.
    #[arg(long)]
    workers: Option<usize>,
    /// Exit with an error when any row is invalid.
    #[arg(long, default_value_t = false)]
    strict: bool,
}

#[derive(Args, Debug)]
struct RulesCheckArgs {
    /// Rule document (JSON).
    #[arg(long)]
    rules: PathBuf,
    /// Restrict the check to one record type.
    #[arg(long)]
    record_type: Option<RecordType>,
}

#[derive(Args, Debug)]
struct SchemaArgs {
    #[arg(value_name = "RECORD_TYPE")]
    record_type: RecordType,
}

fn main() -> Result<(), CliError> {
    let cli = Cli::parse();

    match cli.command {
        Command::Validate(args) => run_validate(args),
        Command::Rules(RulesCommand::Check(args)) => run_rules_check(args),
        Command::Rules(RulesCommand::Schema) => {
            println!("{}", serde_json::to_string_pretty(&rule_set_json_schema())?);
            Ok(())
        }
        Command::Schema(args) => {
            println!("{}", serde_json::to_string_pretty(&args.record_type.schema())?);
            Ok(())
        }
    }
}

fn run_validate(args: ValidateArgs) -> Result<(), CliError> {
    let ValidateArgs {
        file,
        rules,
        source,
        record_type,
        content_type,
        config,
        run_dir,
        as_of,
        workers,
        strict,
    } = args;

    let mut engine = load_settings(config.as_deref())?.engine;
    if as_of.is_some() {
        engine.as_of = as_of;
    }
    if let Some(workers) = workers {
        engine.workers = workers;
    }
    engine.validate()?;

    let source = source.unwrap_or_else(|| file.display().to_string());
    let mut request = FileRequest::new(&source);
    if let Some(content_type) = &content_type {
        request = request.with_content_type(content_type);
    }
    if let Some(record_type) = record_type {
        request = request.with_record_type(record_type);
    }
    let record_type = request.record_type().ok();

    let run_id = Uuid::new_v4().to_string();
    let run_ctx = RunContext {
        run_id: run_id.clone(),
        started_at: chrono::Utc::now(),
        response_version: RESPONSE_VERSION.to_string(),
        run_dir,
        options: RunOptions {
            input: file.clone(),
            source: source.clone(),
            record_type,
            content_type,
            rules: rules.clone(),
            strict,
            engine: engine.clone(),
        },
    };

    let run_paths = start_run(&run_ctx)?;
    init_run_logging(&run_paths.logs_path)?;
    tracing::info!(event = "run_started", run_id = %run_id, source = %source);

    let timer = Instant::now();
    let repository = JsonFileRuleRepository::open(&rules)?;
    for warning in repository.warnings() {
        tracing::warn!(
            event = "rule_document_warning",
            code = %warning.code,
            path = %warning.path,
            message = %warning.message
        );
    }

    if !RuleCache::init_global(engine.cache) {
        tracing::warn!(
            event = "rule_cache_already_initialised",
            capacity = RuleCache::global().capacity()
        );
    }
    let cache = RuleCache::global();

    let mut loader = CsvFileLoader::new(&run_paths.warehouse_dir);
    if let Some(record_type) = record_type {
        let schema = record_type.schema();
        loader = loader.with_columns(
            &record_type.table_name(),
            schema.field_names().map(str::to_string).collect(),
        );
    }
    let audit = JsonLinesAuditSink::new(&run_paths.audit_path);
    let max_examples = engine.max_examples;
    let pipeline = Pipeline::new(engine, cache, &repository, &loader, &audit)?;

    let outcome = pipeline.process_path(&file, &request)?;
    let response = &outcome.response;

    write_response(&run_paths, response)?;
    tracing::info!(event = "response_written", path = %run_paths.response_path.display());
    write_report(&run_paths, &render_report(response, max_examples))?;
    tracing::info!(event = "report_written", path = %run_paths.report_path.display());

    let stats = cache.stats();
    tracing::info!(
        event = "run_finished",
        status = response.status.as_str(),
        loaded_rows = outcome.loaded_rows,
        load_errors = outcome.load_errors.len(),
        cache_hits = stats.hits,
        cache_misses = stats.misses,
        duration_ms = timer.elapsed().as_millis() as u64
    );

    println!(
        "{}: {} ({} rows, {} valid, {} invalid) -> {}",
        response.source,
        response.status.as_str(),
        response.total_rows,
        response.valid_rows,
        response.invalid_rows,
        run_paths.root.display()
    );

    if response.status != FileStatus::Completed {
        return Err(CliError::FileFailed {
            file: source,
            status: response.status.as_str().to_string(),
        });
    }
    if strict && response.invalid_rows > 0 {
        return Err(CliError::InvalidRows {
            file: source,
            invalid_rows: response.invalid_rows,
        });
    }
    Ok(())
}

fn run_rules_check(args: RulesCheckArgs) -> Result<(), CliError> {
    let validated = match load_rule_set(&args.rules) {
        Ok(validated) => validated,
        Err(RulesError::Invalid(report)) => {
            print_report(&args.rules, &report)?;
            return Err(CliError::RuleCheck(report.errors.len()));
        }
        Err(err) => return Err(err.into()),
    };

    let record_types = match args.record_type {
        Some(record_type) => vec![record_type],
        None => RecordType::ALL.to_vec(),
    };

    let mut report = ValidationReport {
        errors: Vec::new(),
        warnings: validated.warnings,
    };
    for record_type in record_types {
        let rules = validated.rule_set.for_record_type(record_type);
        let checked = check_rules(&rules, &record_type.schema());
        report.errors.extend(checked.errors);
        report.warnings.extend(checked.warnings);
    }

    print_report(&args.rules, &report)?;
    if report.is_ok() {
        Ok(())
    } else {
        Err(CliError::RuleCheck(report.errors.len()))
    }
}

fn print_report(path: &Path, report: &ValidationReport) -> Result<(), CliError> {
    println!(
        "{}: {} error(s), {} warning(s)",
        path.display(),
        report.errors.len(),
        report.warnings.len()
    );
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}
