//! variantflow CLI: runs, lists and plans the release pipeline.

use anyhow::{bail, Context};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use variantflow::prelude::*;

/// Assemble a versioned genomic-variant release.
#[derive(Parser, Debug)]
#[command(name = "variantflow", version, about, long_about = None)]
struct Cli {
    /// Configuration file (defaults to ./variantflow.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log one JSON object per event
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Execute every incomplete task the roots need
    Run {
        /// Root stages
        #[arg(default_value = RUN_ALL)]
        roots: Vec<String>,

        #[command(flatten)]
        params: ParamArgs,

        /// Maximum number of tasks executing at once
        #[arg(short, long)]
        workers: Option<usize>,

        /// Write the run report as JSON
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Print the stage table
    List,
    /// Resolve the roots and show what a run would do
    Plan {
        /// Root stages
        #[arg(default_value = RUN_ALL)]
        roots: Vec<String>,

        #[command(flatten)]
        params: ParamArgs,
    },
}

#[derive(Args, Debug, Default)]
struct ParamArgs {
    /// Release date (YYYY-MM-DD), defaults to today
    #[arg(long)]
    date: Option<NaiveDate>,
    /// User for authenticated downloads
    #[arg(short, long)]
    username: Option<String>,
    /// Password for authenticated downloads
    #[arg(short, long, env = "VARIANTFLOW_PASSWORD", hide_env_values = true)]
    password: Option<String>,
    /// Reference genomes and annotation files
    #[arg(long)]
    resources_dir: Option<PathBuf>,
    /// Root of the output tree
    #[arg(long)]
    output_dir: Option<PathBuf>,
    /// The output directory as seen from the container host
    #[arg(long)]
    output_dir_host: Option<PathBuf>,
    /// Working directory for per-source intermediates
    #[arg(long)]
    file_parent_dir: Option<PathBuf>,
    /// Directory holding the external programs
    #[arg(long)]
    methods_dir: Option<PathBuf>,
    /// Previous release archive to diff against
    #[arg(long)]
    previous_release_tar: Option<PathBuf>,
    /// Reference data for the priors calculation
    #[arg(long)]
    priors_references_dir: Option<PathBuf>,
    /// Container image for the priors calculation
    #[arg(long = "priors-docker-image")]
    priors_docker_image_name: Option<String>,
    /// Release notes file or literal text
    #[arg(long)]
    release_notes: Option<String>,
    /// Extra template value, e.g. --set lovd_data_file=/staged/BRCA.txt
    #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    extras: Vec<(String, String)>,
}

impl ParamArgs {
    /// Only the flags actually given, so lower layers keep their values.
    fn overrides(&self) -> Value {
        let mut params = Map::new();
        let mut put = |key: &str, value: Option<Value>| {
            if let Some(value) = value {
                params.insert(key.to_string(), value);
            }
        };
        let path = |p: &Option<PathBuf>| p.as_ref().map(|p| json!(p));
        let text = |s: &Option<String>| s.as_ref().map(|s| json!(s));

        put("date", self.date.map(|d| json!(d)));
        put("username", text(&self.username));
        put("password", text(&self.password));
        put("resources_dir", path(&self.resources_dir));
        put("output_dir", path(&self.output_dir));
        put("output_dir_host", path(&self.output_dir_host));
        put("file_parent_dir", path(&self.file_parent_dir));
        put("methods_dir", path(&self.methods_dir));
        put("previous_release_tar", path(&self.previous_release_tar));
        put("priors_references_dir", path(&self.priors_references_dir));
        put("priors_docker_image_name", text(&self.priors_docker_image_name));
        put("release_notes", text(&self.release_notes));
        if !self.extras.is_empty() {
            let extras: Map<String, Value> = self
                .extras
                .iter()
                .map(|(k, v)| (k.clone(), json!(v)))
                .collect();
            put("extras", Some(Value::Object(extras)));
        }
        Value::Object(params)
    }
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => Ok((key.trim().to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{raw}'")),
    }
}

fn overrides(cli: &Cli) -> Value {
    let mut root = Map::new();
    match cli.command {
        Command::Run {
            ref params,
            workers,
            ..
        } => {
            root.insert("params".to_string(), params.overrides());
            if let Some(workers) = workers {
                root.insert("max_workers".to_string(), json!(workers.max(1)));
            }
        }
        Command::Plan { ref params, .. } => {
            root.insert("params".to_string(), params.overrides());
        }
        Command::List => {}
    }
    if cli.json_logs {
        root.insert("log_format".to_string(), json!(LogFormat::Json));
    }
    Value::Object(root)
}

fn list(catalog: &StageCatalog) {
    for stage in catalog.iter() {
        let deps: Vec<&str> = stage.dependency_names().collect();
        let kind = stage.kind.to_string();
        if deps.is_empty() {
            println!("{:<28} {kind}", stage.name);
        } else {
            println!("{:<28} {kind:<9} <- {}", stage.name, deps.join(", "));
        }
    }
}

async fn plan(scheduler: &Scheduler, roots: &[&str], settings: &EngineSettings) -> anyhow::Result<()> {
    let tasks = scheduler.plan(roots, Arc::new(settings.params.clone())).await?;
    let pending = tasks.iter().filter(|t| t.needed).count();
    for task in &tasks {
        let state = if task.complete {
            "complete"
        } else if task.needed {
            "will run"
        } else {
            "not needed"
        };
        let kind = task.kind.to_string();
        println!("{:<28} {kind:<9} {state}", task.stage);
    }
    println!("{pending} of {} task(s) would run", tasks.len());
    Ok(())
}

async fn run(
    scheduler: Scheduler,
    roots: &[&str],
    settings: &EngineSettings,
    report_path: Option<PathBuf>,
) -> anyhow::Result<bool> {
    let report = scheduler.run(roots, Arc::new(settings.params.clone())).await?;

    for failure in &report.summary.failures {
        eprintln!(
            "FAILED {} ({}): {}{}",
            failure.stage,
            failure.kind,
            failure.message,
            failure
                .path
                .as_ref()
                .map(|p| format!(" [{}]", p.display()))
                .unwrap_or_default()
        );
    }
    println!(
        "{} executed, {} already complete, {} failed, {} skipped in {:.1}s",
        report.summary.succeeded,
        report.summary.already_complete,
        report.summary.failed,
        report.summary.skipped,
        report.duration_ms / 1000.0
    );

    if let Some(path) = report_path {
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(&path, json).with_context(|| format!("writing report to {}", path.display()))?;
    }
    Ok(report.success())
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let settings = load_settings(cli.config.as_deref(), Some(&overrides(&cli)))?;
    init_tracing(settings.log_format, "info")?;

    let catalog = Arc::new(standard_catalog()?);
    let executor = Arc::new(DescriptorExecutor::system(&settings));
    let scheduler = Scheduler::new(Arc::clone(&catalog), executor)
        .with_settings(&settings)
        .with_event_sink(Arc::new(LoggingEventSink::default()));

    match cli.command {
        Command::List => {
            list(&catalog);
            Ok(ExitCode::SUCCESS)
        }
        Command::Plan { ref roots, .. } => {
            let roots: Vec<&str> = roots.iter().map(String::as_str).collect();
            plan(&scheduler, &roots, &settings).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Run {
            ref roots, report, ..
        } => {
            let roots: Vec<&str> = roots.iter().map(String::as_str).collect();
            for root in &roots {
                if catalog.get(root).is_none() {
                    bail!("unknown stage '{root}'; see `variantflow list`");
                }
            }
            tracing::info!(roots = ?roots, output_dir = %settings.params.output_dir.display(), "Starting release run");
            let ok = run(scheduler, &roots, &settings, report).await?;
            Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_run_defaults_to_run_all() {
        let cli = Cli::try_parse_from(["variantflow", "run"]).unwrap();
        let Command::Run { roots, .. } = cli.command else {
            panic!("expected run");
        };
        assert_eq!(roots, vec![RUN_ALL.to_string()]);
    }

    #[test]
    fn test_only_given_flags_are_overrides() {
        let cli = Cli::try_parse_from([
            "variantflow",
            "--json-logs",
            "run",
            "merge_vcfs",
            "--output-dir",
            "/data/output",
            "--date",
            "2023-09-04",
            "--set",
            "lovd_data_file=/staged/BRCA.txt",
            "--workers",
            "8",
        ])
        .unwrap();

        assert_eq!(
            overrides(&cli),
            json!({
                "params": {
                    "date": "2023-09-04",
                    "output_dir": "/data/output",
                    "extras": {"lovd_data_file": "/staged/BRCA.txt"},
                },
                "max_workers": 8,
                "log_format": "json",
            })
        );
    }

    #[test]
    fn test_list_has_no_param_overrides() {
        let cli = Cli::try_parse_from(["variantflow", "list"]).unwrap();
        assert_eq!(overrides(&cli), json!({}));
    }

    #[test]
    fn test_parse_key_value() {
        assert_eq!(
            parse_key_value("a=b=c").unwrap(),
            ("a".to_string(), "b=c".to_string())
        );
        assert!(parse_key_value("novalue").is_err());
        assert!(parse_key_value("=x").is_err());
    }
}
