//! RAG Eval CLI
//!
//! Offline evaluation of a retrieval-augmented question-answering chain.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use rag_eval::{
    config::{Config, RunConfig},
    eval::{publish, EvalRunner, GoldSet, HttpChain, JudgePanel},
    llm::LlmClient,
    persistence::{load_summary, FsRunStore},
    registry::{registry_from_config, DatasetRegistry, NoopRegistry},
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

/// RAG Eval - offline evaluation of a retrieval-augmented QA chain
#[derive(Parser)]
#[command(name = "rag-eval")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log at debug level (overridden by EVAL_LOG_LEVEL)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the gold set through the chain and the judge panel
    Run(RunArgs),

    /// Print a saved run summary
    Show {
        /// Path to a `<run_id>.summary.json` file
        summary: PathBuf,

        /// Output the raw JSON instead of the table
        #[arg(long)]
        json: bool,
    },

    /// Load a gold set and report what is in it
    Validate {
        /// Path to the gold-set JSON file
        #[arg(default_value = "eval/gold_qa.json")]
        goldset: PathBuf,
    },

    /// Test the judge LLM connection
    Test,
}

#[derive(Args)]
struct RunArgs {
    /// Gold-set JSON file
    #[arg(short, long)]
    goldset: Option<PathBuf>,

    /// Run id (defaults to EVAL_RUN_ID, then GIT_COMMIT)
    #[arg(long)]
    run_id: Option<String>,

    /// Experiment name
    #[arg(short, long)]
    experiment: Option<String>,

    /// Variant label, e.g. the retriever configuration under test
    #[arg(long)]
    variant: Option<String>,

    /// Root directory for run artifacts
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Evaluate only the first N items
    #[arg(short = 'n', long)]
    max_items: Option<usize>,

    /// Issue the five judge calls of an item concurrently
    #[arg(long)]
    concurrent_judges: bool,

    /// Skip dataset registration even if PHOENIX_ENDPOINT is set
    #[arg(long)]
    no_register: bool,
}

impl RunArgs {
    fn apply(&self, run: &mut RunConfig) {
        if let Some(goldset) = &self.goldset {
            run.goldset_path = goldset.clone();
        }
        if let Some(run_id) = &self.run_id {
            run.run_id = run_id.clone();
        }
        if let Some(experiment) = &self.experiment {
            run.experiment_name = experiment.clone();
        }
        if let Some(variant) = &self.variant {
            run.variant = variant.clone();
        }
        if let Some(dir) = &self.output_dir {
            run.output_dir = dir.clone();
        }
        if self.max_items.is_some() {
            run.max_items = self.max_items;
        }
        if self.concurrent_judges {
            run.concurrent_judges = true;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Run(args) => cmd_run(args).await,
        Commands::Show { summary, json } => cmd_show(summary, json),
        Commands::Validate { goldset } => cmd_validate(goldset),
        Commands::Test => cmd_test().await,
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_env("EVAL_LOG_LEVEL")
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn cmd_run(args: RunArgs) -> Result<()> {
    let mut config = Config::load().context("Failed to load configuration")?;
    args.apply(&mut config.run);
    config.validate_for_run().context("Invalid configuration")?;

    let mut gold = GoldSet::load(&config.run.goldset_path).context("Failed to load gold set")?;
    if let Some(max) = config.run.max_items {
        gold = gold.take(max);
    }

    println!(
        "Evaluating {} items from {}",
        gold.len(),
        config.run.goldset_path.display()
    );
    println!("  Chain:       {}", config.chain.endpoint);
    println!("  Judge model: {}", config.llm.model);
    println!(
        "  Run:         {}/{} ({})",
        config.run.experiment_name, config.run.run_id, config.run.variant
    );

    let start = Instant::now();

    let chain = Arc::new(HttpChain::new(&config.chain).context("Failed to create chain client")?);
    let panel = JudgePanel::new(Arc::new(LlmClient::new(config.llm.clone())));
    let runner = EvalRunner::from_config(&config.run, chain, panel);

    let summary = runner.run(&gold).await;
    summary.print_summary();
    println!("Finished in {:.2?}", start.elapsed());

    let store = FsRunStore::new(&config.run.output_dir);
    let registry: Arc<dyn DatasetRegistry> = if args.no_register {
        Arc::new(NoopRegistry)
    } else {
        registry_from_config(&config.registry)
    };

    let report = publish(&summary, &store, registry.as_ref()).await;

    if let Some(artifacts) = &report.artifacts {
        println!("Results saved to: {}", artifacts.csv_path.display());
        println!("Summary saved to: {}", artifacts.summary_path.display());
    }
    if let Some(receipt) = &report.receipt {
        let how = if receipt.appended { "Appended to" } else { "Registered" };
        println!(
            "{} dataset '{}' ({}), {} experiment runs",
            how, receipt.dataset_name, receipt.dataset_id, receipt.runs
        );
    }
    for error in &report.errors {
        eprintln!("Warning: {}", error);
    }

    Ok(())
}

fn cmd_show(path: PathBuf, json: bool) -> Result<()> {
    let summary = load_summary(&path).context("Failed to load run summary")?;

    if json {
        let json_str =
            serde_json::to_string_pretty(&summary).context("Failed to serialize summary")?;
        println!("{}", json_str);
    } else {
        summary.print_summary();
    }

    Ok(())
}

fn cmd_validate(path: PathBuf) -> Result<()> {
    let gold = GoldSet::load(&path).context("Failed to load gold set")?;

    println!("Gold Set Information");
    println!("{}", "─".repeat(40));
    println!("  Path:              {}", path.display());
    println!("  Items:             {}", gold.len());
    println!("  Without keywords:  {}", gold.items_without_keywords());

    if !gold.is_empty() {
        println!();
        for (i, item) in gold.items.iter().take(5).enumerate() {
            let preview: String = item.question.chars().take(70).collect();
            println!("{:>3}. {} [{}]", i + 1, preview, item.expected_keywords.join(", "));
        }
        if gold.len() > 5 {
            println!("     ... and {} more", gold.len() - 5);
        }
    }

    Ok(())
}

async fn cmd_test() -> Result<()> {
    println!("Testing judge LLM connection...\n");

    let config = Config::load().context("Failed to load configuration")?;
    let key_preview: String = config.llm.api_key.chars().take(8).collect();

    println!("Configuration:");
    println!("  API Base:    {}", config.llm.api_base);
    println!("  Model:       {}", config.llm.model);
    if let Some(version) = &config.llm.api_version {
        println!("  API Version: {}", version);
    }
    println!("  API Key:     {}...", key_preview);
    println!();

    if let Err(e) = config.validate() {
        println!("Configuration error: {}", e);
        return Ok(());
    }

    let client = LlmClient::new(config.llm);

    println!("Sending test request...");
    match client.test_connection().await {
        Ok(()) => println!("Connection successful!"),
        Err(e) => println!("Connection failed: {}", e),
    }

    Ok(())
}
