//! OpFlow CLI Entry Point
//!
//! Loads a workflow-state file and runs its workflows.
//!
//! # Usage
//!
//! ```bash
//! # Run every workflow in a state file once
//! opflow session.wfl
//!
//! # Run one workflow with up to 4 operations at a time
//! opflow session.wfl --workflow main --parallel 4
//!
//! # Batch over explicit values fed to input alias "path"
//! opflow session.wfl --workflow main --batch path --values a.tif,b.tif,c.tif
//!
//! # Batch over a directory listing
//! opflow session.wfl --workflow main --batch path --dir /data/images --pattern '*.tif'
//! ```

use std::env;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use colored::Colorize;
use log::{error, info, warn};
use serde_json::json;

use opflow::environment::OPS_CONFIG_PATH;
use opflow::workflow::OpStatus;
use opflow::{BatchSource, PassReport, Session, Value, APP_NAME, VERSION};

/// Default glob pattern for `--dir` batches.
const DEFAULT_PATTERN: &str = "*";

/// Default maximum parallel operations.
const DEFAULT_MAX_PARALLEL: usize = 1;

/// Command-line configuration parsed from arguments.
#[derive(Debug)]
struct Config {
    state_path: Option<PathBuf>,
    workflow: Option<String>,
    batch_alias: Option<String>,
    values: Vec<String>,
    dir: Option<PathBuf>,
    pattern: String,
    max_parallel: usize,
    timeline: bool,
    output: Option<PathBuf>,
    ops_config: Option<PathBuf>,
    list_ops: bool,
    verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            state_path: None,
            workflow: None,
            batch_alias: None,
            values: Vec::new(),
            dir: None,
            pattern: DEFAULT_PATTERN.to_string(),
            max_parallel: DEFAULT_MAX_PARALLEL,
            timeline: false,
            output: None,
            ops_config: None,
            list_ops: false,
            verbose: false,
        }
    }
}

/// Configures the logging system with appropriate formatting.
fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| {
            use std::io::Write;

            match record.level() {
                log::Level::Warn | log::Level::Error => {
                    writeln!(buf, "[{}] {}", record.level(), record.args())
                }
                _ => writeln!(buf, "{}", record.args()),
            }
        })
        .init();
}

/// Prints the application banner with version information.
fn print_banner() {
    println!();
    println!("{} v{}", APP_NAME, VERSION);
    println!("Dataflow Engine for Operation Graphs");
    println!();
}

/// Prints usage information.
fn print_usage() {
    println!("Usage: opflow [OPTIONS] <STATE_FILE>");
    println!();
    println!("Arguments:");
    println!("  <STATE_FILE>        Workflow-state file (.wfl)");
    println!();
    println!("Options:");
    println!("  --workflow NAME     Run only this workflow");
    println!("  --batch ALIAS       Run a batch, feeding each value to input ALIAS");
    println!("  --values a,b,c      Batch values (comma separated)");
    println!("  --dir PATH          Batch over files in a directory");
    println!("  --pattern GLOB      File pattern for --dir (default: {})", DEFAULT_PATTERN);
    println!("  --parallel N        Maximum parallel operations (default: {})", DEFAULT_MAX_PARALLEL);
    println!("  --timeline          Print a timing chart after each pass");
    println!("  --output FILE       Write a JSON report of statuses and outputs");
    println!("  --ops-config FILE   Operation enable flags (default: {})", OPS_CONFIG_PATH.display());
    println!("  --list-ops          List operation types and exit");
    println!("  --verbose           Enable debug logging");
    println!("  --help              Show this help message");
    println!("  --version           Show version information");
    println!();
    println!("Examples:");
    println!("  opflow session.wfl");
    println!("  opflow session.wfl --workflow main --parallel 4 --timeline");
    println!("  opflow session.wfl --workflow main --batch path --dir /data --pattern '*.tif'");
}

/// Returns the value following option `args[*i]`.
fn option_value<'a>(args: &'a [String], i: &mut usize) -> Result<&'a str, String> {
    let option = &args[*i];
    *i += 1;
    args.get(*i)
        .map(String::as_str)
        .ok_or_else(|| format!("{} requires an argument", option))
}

/// Parses command-line arguments into a Config struct.
fn parse_arguments(args: &[String]) -> Result<Config, String> {
    let mut config = Config::default();
    let mut i = 1; // Skip program name

    while i < args.len() {
        let arg = &args[i];

        match arg.as_str() {
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("{} {}", APP_NAME, VERSION);
                std::process::exit(0);
            }
            "--verbose" | "-v" => config.verbose = true,
            "--timeline" => config.timeline = true,
            "--list-ops" => config.list_ops = true,
            "--workflow" => config.workflow = Some(option_value(args, &mut i)?.to_string()),
            "--batch" => config.batch_alias = Some(option_value(args, &mut i)?.to_string()),
            "--values" => {
                config.values = option_value(args, &mut i)?
                    .split(',')
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty())
                    .collect();
            }
            "--dir" => config.dir = Some(PathBuf::from(option_value(args, &mut i)?)),
            "--pattern" => config.pattern = option_value(args, &mut i)?.to_string(),
            "--output" => config.output = Some(PathBuf::from(option_value(args, &mut i)?)),
            "--ops-config" => config.ops_config = Some(PathBuf::from(option_value(args, &mut i)?)),
            "--parallel" => {
                let value = option_value(args, &mut i)?;
                config.max_parallel = value
                    .parse()
                    .map_err(|_| format!("Invalid parallel value: {}", value))?;
            }
            arg if arg.starts_with('-') => {
                return Err(format!("Unknown option: {}", arg));
            }
            _ => {
                if config.state_path.is_some() {
                    return Err(format!("Unexpected argument: {}", arg));
                }
                config.state_path = Some(PathBuf::from(arg));
            }
        }
        i += 1;
    }

    if config.batch_alias.is_some() {
        if config.workflow.is_none() {
            return Err("--batch requires --workflow".to_string());
        }
        if config.values.is_empty() == config.dir.is_none() {
            return Err("--batch requires exactly one of --values or --dir".to_string());
        }
    }

    Ok(config)
}

/// Prints the operation catalog with enable flags.
fn list_operations(session: &Session) {
    println!("Operation types:");
    for entry in session.registry().catalog() {
        let flag = if session.registry().is_enabled(&entry.name) {
            "enabled".green()
        } else {
            "disabled".red()
        };
        println!("  {:<12} {:<20} {}", entry.category, entry.name, flag);
    }
    println!();
}

/// Prints a pass report with colored statuses.
fn print_report(report: &PassReport, timeline: bool) {
    let headline = format!("Pass over '{}': {}", report.workflow, report.summary());
    if report.is_success() {
        println!("{}", headline.green().bold());
    } else {
        println!("{}", headline.yellow().bold());
    }

    if let Some(err) = &report.aborted {
        println!("  {} {}", "aborted:".red(), err);
    }
    for (name, status) in &report.statuses {
        let label = match status {
            OpStatus::Done => "done".green(),
            OpStatus::Failed(_) => "failed".red(),
            OpStatus::Unresolved { .. } => "unresolved".yellow(),
            OpStatus::Disabled => "disabled".dimmed(),
            _ => status.to_string().normal(),
        };
        match status {
            OpStatus::Failed(err) => println!("  {:<20} {} {}", name, label, err),
            OpStatus::Unresolved { blocked_by } => {
                println!("  {:<20} {} (blocked by {})", name, label, blocked_by)
            }
            _ => println!("  {:<20} {}", name, label),
        }
    }

    if timeline && !report.timeline.is_empty() {
        println!("{}", report.timeline.chart());
    }
}

fn report_json(report: &PassReport, outputs: serde_json::Value) -> serde_json::Value {
    let statuses: serde_json::Map<String, serde_json::Value> = report
        .statuses
        .iter()
        .map(|(name, status)| (name.clone(), json!(status.to_string())))
        .collect();
    json!({
        "started_at": report.started_at.to_rfc3339(),
        "order": report.order,
        "statuses": statuses,
        "outputs": outputs,
    })
}

/// Main application entry point.
fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    // Parse arguments
    let config = parse_arguments(&args).map_err(|e| {
        eprintln!("Error: {}", e);
        eprintln!();
        print_usage();
        e
    })?;

    // Setup logging
    setup_logging(config.verbose);

    // Print banner
    print_banner();

    let mut session = Session::with_builtins();
    let flags_path = config.ops_config.clone().unwrap_or_else(|| OPS_CONFIG_PATH.clone());
    session.registry_mut().load_flags(&flags_path)?;

    if config.list_ops {
        list_operations(&session);
        if config.state_path.is_none() {
            return Ok(());
        }
    }

    let Some(state_path) = config.state_path else {
        print_usage();
        return Err("no state file given".into());
    };

    // Load state
    let loaded = session.load(&state_path).map_err(|e| {
        error!("Failed to load state file: {}", e);
        format!("Could not load '{}': {}", state_path.display(), e)
    })?;
    info!(
        "State loaded: format {}, {} workflows, {} operations, {} plugins",
        loaded.version, loaded.workflows, loaded.operations, loaded.plugins
    );
    if !loaded.warnings.is_empty() {
        warn!("{} entries loaded with warnings", loaded.warnings.len());
    }

    session.engine_mut().set_max_parallel(config.max_parallel);
    info!("Max parallel operations: {}", session.engine().max_parallel());
    println!();

    let workflows = match config.workflow {
        Some(name) => vec![name],
        None => session.workflow_names(),
    };

    let mut json_report = serde_json::Map::new();
    let mut incomplete = 0;

    for name in &workflows {
        if let Some(alias) = &config.batch_alias {
            let source = match &config.dir {
                Some(dir) => BatchSource::directory(dir, config.pattern.as_str()),
                None => BatchSource::Values(config.values.iter().map(|v| Value::from(v.as_str())).collect()),
            };

            let batch = session.run_batch_from(name, alias, &source)?;
            let mut passes = Vec::with_capacity(batch.len());
            for entry in &batch.entries {
                println!("{}", format!("Batch pass {} / {}", entry.index + 1, batch.len()).bold());
                print_report(&entry.report, config.timeline);
                passes.push(report_json(&entry.report, json!(entry.outputs)));
            }

            let failed = batch.failed_passes();
            if !failed.is_empty() {
                warn!("Batch over '{}': passes {:?} incomplete", name, failed);
                incomplete += failed.len();
            }
            json_report.insert(name.clone(), json!({ "alias": alias, "passes": passes }));
        } else {
            let report = session.execute(name)?;
            print_report(&report, config.timeline);
            if !report.is_success() {
                incomplete += 1;
            }

            let outputs = session.workflow(name)?.lock().wf_output_values();
            json_report.insert(name.clone(), report_json(&report, json!(outputs)));
        }
        println!();
    }

    if let Some(path) = &config.output {
        let text = serde_json::to_string_pretty(&serde_json::Value::Object(json_report))?;
        fs::write(path, text)?;
        info!("Report written to: {}", path.display());
    }

    if incomplete > 0 {
        return Err(format!("{} pass(es) did not complete", incomplete).into());
    }
    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!();
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
