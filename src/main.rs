use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use promptloom_core::config::EngineConfig;
use promptloom_core::event::EventBus;
use promptloom_core::graph::WorkflowDocument;
use promptloom_core::run::{ExecutionRun, Variables};
use promptloom_core::traits::MemoryPromptStore;
use promptloom_engine::{Coordinator, JsonlRunLog, NodeRunner};
use promptloom_llm::{CompletionRouter, EnvKeyStore};

#[derive(Parser)]
#[command(name = "promptloom", version, about = "AI prompt workflow execution engine")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "promptloom.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a workflow from an exported JSON document
    Run {
        /// Path to the workflow JSON file
        workflow: PathBuf,

        /// Initial variables as a JSON object
        #[arg(long, default_value = "{}")]
        input: String,

        /// User id used to resolve provider credentials
        #[arg(long, default_value = "local")]
        user: String,

        /// Append run snapshots to this JSONL file
        #[arg(long)]
        run_log: Option<PathBuf>,
    },
    /// Parse and validate a workflow document without executing it
    Validate {
        /// Path to the workflow JSON file
        workflow: PathBuf,
    },
    /// Show the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = EngineConfig::load_or_env(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config.display()))?;

    match cli.command {
        Commands::Run { workflow, input, user, run_log } => {
            run_workflow(config, &workflow, &input, &user, run_log).await
        }
        Commands::Validate { workflow } => validate_workflow(&workflow),
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

async fn run_workflow(
    config: EngineConfig,
    workflow_path: &PathBuf,
    input: &str,
    user: &str,
    run_log: Option<PathBuf>,
) -> anyhow::Result<()> {
    let document = load_document(workflow_path)?;
    let graph = document.graph();

    let input_data: Variables = serde_json::from_str(input)
        .context("--input must be a JSON object")?;

    let completions = Arc::new(
        CompletionRouter::new(Arc::new(EnvKeyStore))
            .with_ollama_base_url(config.ollama_base_url.clone()),
    );
    let runner = NodeRunner::new(completions, Arc::new(MemoryPromptStore::new()), config);

    let store: Arc<dyn promptloom_core::traits::RunStore> = match run_log {
        Some(path) => Arc::new(JsonlRunLog::new(path)),
        None => Arc::new(promptloom_engine::MemoryRunStore::new()),
    };
    let coordinator = Coordinator::new(runner, store, Arc::new(EventBus::default()));

    info!(workflow = %document.name, "executing workflow");
    let run = ExecutionRun::new(document.name.clone(), user, input_data);
    let outcome = coordinator.execute(run, &graph).await?;

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    if !outcome.success {
        bail!("workflow execution failed");
    }
    Ok(())
}

fn validate_workflow(workflow_path: &PathBuf) -> anyhow::Result<()> {
    let document = load_document(workflow_path)?;
    let graph = document.graph();
    let starts = graph.start_node_ids();

    if starts.is_empty() && !graph.nodes.is_empty() {
        bail!("workflow has no start node: every node is an edge target");
    }
    for edge in &graph.edges {
        for id in [&edge.source, &edge.target] {
            if graph.node(id).is_none() {
                bail!("edge references unknown node: {}", id);
            }
        }
    }

    println!(
        "{}: {} nodes, {} edges, {} start node(s)",
        document.name,
        graph.nodes.len(),
        graph.edges.len(),
        starts.len()
    );
    Ok(())
}

fn load_document(path: &PathBuf) -> anyhow::Result<WorkflowDocument> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("reading workflow {}", path.display()))?;
    Ok(WorkflowDocument::from_json(&json)?)
}
