//! Evaluation Orchestrator CLI
//!
//! Submit evaluations to the agent service, follow them to completion and
//! inspect their results.

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use eval_orchestrator::{
    catalog::{DEFAULT_PREVIEW_ITEMS, DatasetPreview, DatasetValidation},
    config::{Config, SettingsUpdate},
    normalize::EvaluationResult,
    orchestrator::Orchestrator,
    poller::PollOutcome,
    submission::{DatasetSource, parse_records},
};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing_subscriber::EnvFilter;

/// Evaluation Orchestrator - run and track similarity evaluations
#[derive(Parser)]
#[command(name = "eval-orchestrator")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit an evaluation and wait for its result
    Run {
        /// Display name of the evaluation
        #[arg(short, long)]
        name: String,

        /// Dataset from the service catalog (e.g. superhero_powers.json)
        #[arg(short, long, conflicts_with = "upload", required_unless_present = "upload")]
        dataset: Option<String>,

        /// Local JSON file to upload as the dataset
        #[arg(short, long)]
        upload: Option<PathBuf>,

        /// Model under evaluation
        #[arg(long)]
        model: Option<String>,

        /// Model judging similarity
        #[arg(long)]
        judge: Option<String>,

        /// Similarity threshold (0-100)
        #[arg(long)]
        threshold: Option<u8>,

        /// Submit only; do not wait for completion
        #[arg(long)]
        no_wait: bool,
    },

    /// Show the current result of an evaluation
    Status {
        /// Evaluation id
        id: String,

        /// Print the normalized result as JSON
        #[arg(long)]
        raw: bool,
    },

    /// Keep polling a previously submitted evaluation
    Watch {
        /// Evaluation id
        id: String,
    },

    /// List evaluations known to the service
    Results,

    /// List evaluations saved locally
    Saved,

    /// Remove a saved evaluation
    Delete {
        /// Evaluation id
        id: String,
    },

    /// Remove all saved evaluations
    Clear,

    /// List datasets in the service catalog
    Datasets,

    /// Preview a dataset
    Preview {
        /// Catalog file name, or a local path with --local
        file: String,

        /// Number of records to show
        #[arg(short, long, default_value_t = DEFAULT_PREVIEW_ITEMS)]
        max_items: usize,

        /// Read the dataset from disk instead of the catalog
        #[arg(long)]
        local: bool,
    },

    /// Test the connection to the agent service
    Test,

    /// Show or change the saved settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,

    /// Update settings, save them to the config file and test the connection
    Set {
        /// Base URL of the agent service
        #[arg(long)]
        base_url: Option<String>,

        /// Agent id receiving submissions
        #[arg(long)]
        submission_agent: Option<String>,

        /// Agent id answering result queries
        #[arg(long)]
        query_agent: Option<String>,

        /// Agent id serving the dataset catalog
        #[arg(long)]
        catalog_agent: Option<String>,

        /// Bearer token; pass an empty string to remove it
        #[arg(long)]
        token: Option<String>,

        /// Default model under evaluation
        #[arg(long)]
        model: Option<String>,

        /// Default judge model
        #[arg(long)]
        judge: Option<String>,

        /// Default similarity threshold (0-100)
        #[arg(long)]
        threshold: Option<u8>,

        /// Directory holding saved evaluations
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
}

fn setup_logging(json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        let subscriber = tracing_subscriber::FmtSubscriber::builder()
            .with_writer(std::io::stderr)
            .json()
            .with_env_filter(filter)
            .finish();
        tracing::subscriber::set_global_default(subscriber)
            .map_err(|e| anyhow!("Failed to initialize tracing: {e}"))
    } else {
        let subscriber = tracing_subscriber::FmtSubscriber::builder()
            .with_writer(std::io::stderr)
            .with_env_filter(filter)
            .finish();
        tracing::subscriber::set_global_default(subscriber)
            .map_err(|e| anyhow!("Failed to initialize tracing: {e}"))
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.json)?;

    match cli.command {
        Commands::Run {
            name,
            dataset,
            upload,
            model,
            judge,
            threshold,
            no_wait,
        } => {
            let source = match (dataset, upload) {
                (_, Some(path)) => DatasetSource::upload_file(&path)
                    .with_context(|| format!("Failed to read dataset '{}'", path.display()))?,
                (Some(dataset), None) => DatasetSource::existing(dataset),
                (None, None) => anyhow::bail!("Either --dataset or --upload is required"),
            };
            cmd_run(name, source, model, judge, threshold, no_wait).await
        }
        Commands::Status { id, raw } => cmd_status(id, raw).await,
        Commands::Watch { id } => cmd_watch(id).await,
        Commands::Results => cmd_results().await,
        Commands::Saved => cmd_saved(),
        Commands::Delete { id } => cmd_delete(id),
        Commands::Clear => cmd_clear(),
        Commands::Datasets => cmd_datasets().await,
        Commands::Preview {
            file,
            max_items,
            local,
        } => cmd_preview(file, max_items, local).await,
        Commands::Test => cmd_test().await,
        Commands::Config { action } => match action {
            ConfigAction::Show => cmd_config_show(),
            ConfigAction::Set {
                base_url,
                submission_agent,
                query_agent,
                catalog_agent,
                token,
                model,
                judge,
                threshold,
                data_dir,
            } => {
                cmd_config_set(SettingsUpdate {
                    base_url,
                    submission_agent,
                    query_agent,
                    catalog_agent,
                    api_token: token,
                    model_name: model,
                    judge_model: judge,
                    similarity_threshold: threshold,
                    data_dir,
                })
                .await
            }
        },
    }
}

fn load_orchestrator() -> Result<(Config, Orchestrator)> {
    let config = Config::load().context("Failed to load configuration")?;
    let orchestrator = Orchestrator::from_config(&config).context("Invalid configuration")?;
    Ok((config, orchestrator))
}

async fn cmd_run(
    name: String,
    source: DatasetSource,
    model: Option<String>,
    judge: Option<String>,
    threshold: Option<u8>,
    no_wait: bool,
) -> Result<()> {
    let (config, orchestrator) = load_orchestrator()?;

    let mut evaluation = orchestrator.new_config(name, source);
    if let Some(model) = model {
        evaluation.model_name = model;
    }
    if let Some(judge) = judge {
        evaluation.judge_model = judge;
    }
    if let Some(threshold) = threshold {
        evaluation.similarity_threshold = threshold;
    }

    println!("Submitting evaluation: {}", evaluation.name);
    println!("  Id:     {}", evaluation.id);
    println!("  Model:  {}", evaluation.model_name);
    println!("  Judge:  {}", evaluation.judge_model);

    let start = Instant::now();
    let handle = orchestrator
        .launch(&evaluation)
        .await
        .context("Failed to submit evaluation")?;

    if no_wait {
        handle.cancel();
        println!("\nSubmitted. Follow it with: eval-orchestrator watch {}", evaluation.id);
        return Ok(());
    }

    println!(
        "\nWaiting for completion (checking every {}s, up to {} times)...",
        config.polling.interval_secs, config.polling.max_attempts
    );
    let outcome = follow(handle).await;
    report(outcome, start)
}

async fn cmd_watch(id: String) -> Result<()> {
    let (_, orchestrator) = load_orchestrator()?;

    println!("Watching evaluation: {}", id);
    let start = Instant::now();
    let outcome = follow(orchestrator.track(&id)).await;
    report(outcome, start)
}

/// Wait for a polling loop, cancelling it on Ctrl-C.
async fn follow(handle: eval_orchestrator::PollHandle) -> PollOutcome {
    let token = handle.cancel_token();
    let outcome = handle.outcome();
    tokio::pin!(outcome);

    tokio::select! {
        outcome = &mut outcome => outcome,
        _ = tokio::signal::ctrl_c() => {
            token.cancel();
            outcome.await
        }
    }
}

fn report(outcome: PollOutcome, start: Instant) -> Result<()> {
    match outcome {
        PollOutcome::Completed(result) => {
            println!("\nEvaluation completed in {:.2?}\n", start.elapsed());
            print_result(&result);
            Ok(())
        }
        PollOutcome::Cancelled => {
            println!("\nStopped waiting; the evaluation keeps running remotely.");
            Ok(())
        }
        other => Err(other
            .into_result()
            .err()
            .map(anyhow::Error::from)
            .unwrap_or_else(|| anyhow!("Evaluation did not complete"))),
    }
}

fn print_result(result: &EvaluationResult) {
    let metrics = &result.metrics;
    let or_dash = |value: &Option<String>| value.clone().unwrap_or_else(|| "-".to_string());

    println!("Evaluation {}", result.id);
    println!("{}", "─".repeat(60));
    println!("  Status:       {}", result.status);
    println!("  Dataset:      {}", or_dash(&result.dataset_name));
    println!("  Model:        {}", or_dash(&result.model_name));
    println!("  Judge:        {}", or_dash(&result.judge_model));
    println!("  Started:      {}", or_dash(&result.started_at));
    println!("  Completed:    {}", or_dash(&result.completed_at));
    println!("  Cases:        {}", metrics.total_cases);
    println!("  Avg score:    {:.1}", metrics.average_similarity_score);
    println!(
        "  High/Med/Low: {}/{}/{}",
        metrics.high_similarity_count, metrics.medium_similarity_count, metrics.low_similarity_count
    );
    println!("  High rate:    {:.1}%", metrics.high_similarity_rate * 100.0);

    if !result.cases.is_empty() {
        println!("{}", "─".repeat(60));
        for case in &result.cases {
            let query: String = case.original_query.chars().take(60).collect();
            println!(
                "  [{:>5.1} {:<6}] {}",
                case.similarity_score,
                case.similarity_category.as_str(),
                query
            );
        }
    }
}

async fn cmd_status(id: String, raw: bool) -> Result<()> {
    let (_, orchestrator) = load_orchestrator()?;

    let result = orchestrator
        .service()
        .get_evaluation_result(&id)
        .await
        .context("Failed to fetch evaluation")?;

    if raw {
        let json = serde_json::to_string_pretty(&result).context("Failed to serialize result")?;
        println!("{}", json);
    } else {
        print_result(&result);
    }
    Ok(())
}

async fn cmd_results() -> Result<()> {
    let (_, orchestrator) = load_orchestrator()?;

    let summaries = orchestrator
        .service()
        .list_evaluations()
        .await
        .context("Failed to list evaluations")?;

    if summaries.is_empty() {
        println!("No evaluations found.");
        return Ok(());
    }

    for summary in &summaries {
        let rate = summary
            .metrics
            .as_ref()
            .map(|m| format!("{:.1}%", m.high_similarity_rate * 100.0))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<24} {:<22} {:>5} cases  {:>6}  {}",
            summary.id,
            summary.status.to_string(),
            summary.total_cases,
            rate,
            summary.dataset_name.as_deref().unwrap_or("-")
        );
    }
    println!("\n{} evaluations", summaries.len());
    Ok(())
}

fn cmd_saved() -> Result<()> {
    let (_, orchestrator) = load_orchestrator()?;
    let saved = orchestrator.registry().list_all();

    if saved.is_empty() {
        println!("No saved evaluations.");
        return Ok(());
    }

    for evaluation in &saved {
        println!(
            "{:<24} {:<10} {}  {}",
            evaluation.id,
            evaluation.status.to_string(),
            evaluation.created_at.format("%Y-%m-%d %H:%M"),
            evaluation.name
        );
    }
    Ok(())
}

fn cmd_delete(id: String) -> Result<()> {
    let (_, orchestrator) = load_orchestrator()?;
    if orchestrator.registry().get(&id).is_none() {
        anyhow::bail!("No saved evaluation with id '{}'", id);
    }
    orchestrator
        .registry()
        .delete(&id)
        .context("Failed to delete evaluation")?;
    println!("Deleted {}", id);
    Ok(())
}

fn cmd_clear() -> Result<()> {
    let (_, orchestrator) = load_orchestrator()?;
    orchestrator
        .registry()
        .clear()
        .context("Failed to clear saved evaluations")?;
    println!("Cleared saved evaluations.");
    Ok(())
}

async fn cmd_datasets() -> Result<()> {
    let (_, orchestrator) = load_orchestrator()?;

    let datasets = orchestrator
        .catalog()
        .list_datasets()
        .await
        .context("Failed to list datasets")?;

    if datasets.is_empty() {
        println!("No datasets available.");
        return Ok(());
    }

    for dataset in &datasets {
        println!(
            "{:<40} {:>6} items  {:>8.1} KB",
            dataset.name,
            dataset.items,
            dataset.size as f64 / 1024.0
        );
    }
    Ok(())
}

async fn cmd_preview(file: String, max_items: usize, local: bool) -> Result<()> {
    let preview = if local {
        local_preview(Path::new(&file), max_items)?
    } else {
        let (_, orchestrator) = load_orchestrator()?;
        let catalog = orchestrator.catalog();
        match catalog.validate_dataset(&file).await {
            Ok(DatasetValidation::Valid(_)) => {}
            Ok(DatasetValidation::Invalid(reason)) => {
                anyhow::bail!("Dataset '{}' is not usable: {}", file, reason)
            }
            Err(e) => tracing::warn!(file = %file, error = %e, "dataset validation unavailable"),
        }
        catalog
            .get_dataset_preview(&file, max_items)
            .await
            .context("Failed to fetch dataset preview")?
    };

    println!("Dataset: {} ({} items)", preview.filename, preview.total_items);
    println!("Schema:");
    for (field, kind) in &preview.schema {
        println!("  {:<24} {}", field, kind);
    }
    println!("Preview:");
    for record in &preview.preview {
        println!("  {}", serde_json::Value::Object(record.clone()));
    }
    Ok(())
}

fn local_preview(path: &Path, max_items: usize) -> Result<DatasetPreview> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read '{}'", path.display()))?;
    let records = parse_records(&content).context("Invalid dataset")?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok(DatasetPreview::from_records(filename, &records, max_items))
}

async fn cmd_test() -> Result<()> {
    println!("Testing agent service connection...\n");

    let config = Config::load().context("Failed to load configuration")?;
    print_service(&config);

    let orchestrator = match Orchestrator::from_config(&config) {
        Ok(orchestrator) => orchestrator,
        Err(e) => {
            println!("Configuration error: {}", e);
            return Ok(());
        }
    };

    check_connection(&orchestrator).await;
    Ok(())
}

fn print_service(config: &Config) {
    println!("Configuration:");
    println!("  Base URL:    {}", config.service.base_url);
    println!("  Submission:  {}", config.service.submission_url());
    println!("  Query:       {}", config.service.query_url());
    println!("  Catalog:     {}", config.service.catalog_url());
    println!(
        "  Token:       {}",
        if config.service.bearer_token().is_some() { "set" } else { "none" }
    );
    println!();
}

async fn check_connection(orchestrator: &Orchestrator) {
    println!("Listing datasets...");
    match orchestrator.catalog().list_datasets().await {
        Ok(datasets) => println!("Connection successful! {} datasets available.", datasets.len()),
        Err(e) => println!("Connection failed: {}", e),
    }
}

fn cmd_config_show() -> Result<()> {
    let mut config = Config::load().context("Failed to load configuration")?;
    if config.service.bearer_token().is_some() {
        config.service.api_token = Some("********".to_string());
    }

    if let Some(path) = Config::config_file_path() {
        println!("# {}", path.display());
    }
    let yaml = serde_yaml::to_string(&config).context("Failed to serialize configuration")?;
    print!("{}", yaml);
    Ok(())
}

async fn cmd_config_set(update: SettingsUpdate) -> Result<()> {
    let path = Config::config_file_path()
        .ok_or_else(|| anyhow!("Could not determine the configuration directory"))?;
    let previous = Config::load().context("Failed to load configuration")?;

    // Edit the file contents only, so environment overrides are not persisted.
    let mut saved = if path.exists() {
        Config::load_from_file(&path).context("Failed to read config file")?
    } else {
        Config::default()
    };
    saved.apply_update(update).context("Invalid settings")?;

    saved
        .save_to_file(&path)
        .context("Failed to save configuration")?;
    println!("Settings saved to {}\n", path.display());

    let mut effective = saved;
    effective.apply_env(|key| std::env::var(key).ok());
    print_service(&effective);

    if let Err(e) = effective.validate() {
        println!("Configuration incomplete: {}", e);
        return Ok(());
    }

    // Apply the new endpoints to a client built from the old settings.
    let orchestrator = match Orchestrator::from_config(&previous) {
        Ok(orchestrator) => {
            orchestrator
                .reconfigure(effective.service.clone())
                .context("Invalid service settings")?;
            orchestrator
        }
        Err(_) => Orchestrator::from_config(&effective).context("Invalid configuration")?,
    };
    check_connection(&orchestrator).await;
    Ok(())
}
