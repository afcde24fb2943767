use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use kestrel_config::WorkflowDef;
use kestrel_context::{ChannelNotifier, ExecutionEvent, RunStatus};
use kestrel_engine::{ExecutorConfig, WorkflowExecutor};
use kestrel_module::TimeoutPolicy;
use kestrel_workflow::{NodeKind, compile};

/// Kestrel - a desktop automation workflow engine
#[derive(Parser)]
#[command(name = "kestrel")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the data directory (default: ~/.kestrel)
  #[arg(long, global = true)]
  data_dir: Option<PathBuf>,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Run a workflow to completion
  Run {
    /// Path to the workflow file (JSON)
    workflow_file: PathBuf,

    /// Set a variable before the run starts, as name=<json>. Values that are
    /// not valid JSON are taken as strings.
    #[arg(long = "var", value_name = "NAME=VALUE")]
    vars: Vec<String>,

    /// How many committed rows are streamed while the run is in progress
    #[arg(long, default_value_t = 20)]
    preview_rows: usize,

    /// Default module timeout in milliseconds (0 disables it)
    #[arg(long, value_name = "MS")]
    node_timeout_default: Option<u64>,
  },

  /// Compile a workflow and print its structure
  Validate {
    /// Path to the workflow file (JSON)
    workflow_file: PathBuf,
  },

  /// List the built-in module types and their timeouts
  Modules,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();

  match cli.command {
    Some(Commands::Run {
      workflow_file,
      vars,
      preview_rows,
      node_timeout_default,
    }) => {
      let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => dirs::home_dir()
          .context("could not determine home directory")?
          .join(".kestrel"),
      };
      let options = RunOptions {
        vars,
        preview_rows,
        node_timeout_default,
        data_dir,
      };
      let rt = tokio::runtime::Runtime::new()?;
      let status = rt.block_on(run_workflow(&workflow_file, options))?;
      if status != RunStatus::Completed {
        std::process::exit(1);
      }
    }
    Some(Commands::Validate { workflow_file }) => validate_workflow(&workflow_file)?,
    Some(Commands::Modules) => list_modules(),
    None => {
      println!("kestrel - use --help to see available commands");
    }
  }

  Ok(())
}

struct RunOptions {
  vars: Vec<String>,
  preview_rows: usize,
  node_timeout_default: Option<u64>,
  data_dir: PathBuf,
}

fn load_workflow(path: &Path) -> Result<WorkflowDef> {
  let content = std::fs::read_to_string(path)
    .with_context(|| format!("failed to read workflow file: {}", path.display()))?;
  serde_json::from_str(&content)
    .with_context(|| format!("failed to parse workflow file: {}", path.display()))
}

fn parse_var(raw: &str) -> Result<(String, Value)> {
  let Some((name, value)) = raw.split_once('=') else {
    bail!("invalid --var '{raw}', expected name=value");
  };
  let name = name.trim();
  if name.is_empty() {
    bail!("invalid --var '{raw}', variable name is empty");
  }
  let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
  Ok((name.to_string(), value))
}

async fn run_workflow(workflow_file: &Path, options: RunOptions) -> Result<RunStatus> {
  let workflow = load_workflow(workflow_file)?;
  let overrides = options
    .vars
    .iter()
    .map(|raw| parse_var(raw))
    .collect::<Result<Vec<_>>>()?;

  let mut timeout_policy = TimeoutPolicy::default();
  if let Some(ms) = options.node_timeout_default {
    timeout_policy = timeout_policy.with_default_ms(ms);
  }
  let config = ExecutorConfig {
    data_preview_limit: options.preview_rows,
    timeout_policy,
    user_data_dir: Some(options.data_dir.join("browser")),
    ..Default::default()
  };

  let (notifier, mut events) = ChannelNotifier::channel();
  let executor = WorkflowExecutor::new(
    &workflow,
    kestrel_modules::default_registry(),
    config,
    Arc::new(notifier),
  )
  .context("failed to compile workflow")?
  .with_variables(overrides);

  eprintln!(
    "Loaded workflow: {} ({} nodes)",
    workflow.display_name(),
    executor.graph().executable_count()
  );

  let printer = tokio::spawn(async move { print_events(&mut events).await });

  let stop = executor.stop_handle();
  let ctrl_c = tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      eprintln!("Stopping...");
      stop.stop();
    }
  });

  let summary = executor.execute().await;
  ctrl_c.abort();
  let _ = ctrl_c.await;

  let rows = executor.get_collected_data();
  // Drop the executor so the notifier closes and the printer drains.
  drop(executor);
  let _ = printer.await;

  let output = json!({
    "summary": summary,
    "rows": rows,
  });
  println!("{}", serde_json::to_string_pretty(&output)?);

  Ok(summary.status)
}

async fn print_events(events: &mut mpsc::UnboundedReceiver<ExecutionEvent>) {
  while let Some(event) = events.recv().await {
    match event {
      ExecutionEvent::Log { entry, .. } => {
        eprintln!("[{}] {}", entry.level.as_str(), entry.message);
      }
      ExecutionEvent::Progress { message, .. } => eprintln!("... {message}"),
      _ => {}
    }
  }
}

fn validate_workflow(workflow_file: &Path) -> Result<()> {
  let workflow = load_workflow(workflow_file)?;
  let graph = compile(&workflow).context("workflow is invalid")?;

  let loops: Vec<Value> = graph
    .node_ids()
    .filter(|id| graph.kind(id) == NodeKind::Loop)
    .map(|id| {
      let closure = graph.body_closure(id);
      json!({ "id": id, "body": closure.body, "error_handlers": closure.errors })
    })
    .collect();

  let output = json!({
    "workflow": workflow.display_name(),
    "nodes": graph.executable_count(),
    "start_nodes": graph.start_nodes(),
    "loops": loops,
    "subflows": graph.subflows(),
  });
  println!("{}", serde_json::to_string_pretty(&output)?);
  Ok(())
}

fn list_modules() {
  let registry = kestrel_modules::default_registry();
  let policy = TimeoutPolicy::builtin();

  let mut types = registry.module_types();
  types.sort();
  for module_type in types {
    let timeout = if policy.is_exempt(&module_type) {
      "exempt".to_string()
    } else {
      match policy.timeout_ms(&module_type) {
        0 => "none".to_string(),
        ms => format!("{ms}ms"),
      }
    };
    let critical = if policy.is_critical(&module_type) { " (critical)" } else { "" };
    println!("{module_type:<24} {timeout}{critical}");
  }
}
