use alert_triage::{
    bulk::JobEvent,
    config::Config,
    models::{AggregationMode, SortKey, SortOrder, View},
    search::ElasticClient,
    DeleteOutcome, RefreshOutcome, TriageConsole,
};
use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "alert-triage", version, about = "Triage IDS alerts stored in Elasticsearch")]
struct Cli {
    /// Configuration file layered over the built-in defaults
    #[arg(short, long, global = true, env = "CONFIG_PATH")]
    config: Option<String>,

    /// inbox, starred or alerts
    #[arg(short, long, global = true, default_value = "inbox")]
    view: View,

    /// Free-text query; empty matches everything
    #[arg(short, long, global = true, default_value = "")]
    query: String,

    /// Print Prometheus metrics on exit
    #[arg(long, global = true)]
    metrics: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show one page of events, or an aggregation
    Search {
        #[arg(short, long, default_value_t = 1)]
        page: u32,

        /// none, signature or signature+src
        #[arg(short, long)]
        aggregate_by: Option<AggregationMode>,

        /// last, count, message or src_ip
        #[arg(short, long, default_value = "last")]
        sort_by: SortKey,

        #[arg(short, long, default_value = "desc")]
        order: SortOrder,
    },

    /// Archive every inbox event the query matches
    ArchiveByQuery,

    /// Delete every event the query matches
    DeleteByQuery,

    /// Archive events on the first page by id
    Archive {
        #[arg(value_name = "EVENT_ID", required = true)]
        ids: Vec<String>,
    },

    /// Toggle the star on an event on the first page
    Star {
        #[arg(value_name = "EVENT_ID")]
        id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
    .context("Failed to load configuration")?;

    init_tracing(&config);
    tracing::info!("Starting alert-triage v{}", env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        if let Err(e) = alert_triage::metrics::init_metrics() {
            tracing::warn!("Failed to initialize metrics: {}", e);
        }
    }

    let client = Arc::new(ElasticClient::new(&config.elasticsearch)?);
    tracing::info!(
        endpoint = %config.elasticsearch.url,
        index = %config.elasticsearch.index,
        view = %cli.view,
        "Search engine client ready"
    );

    let mut console = TriageConsole::new(client, &config, cli.view);
    spawn_progress_logger(&console);

    let form = console.form().clone().with_query(cli.query.clone());

    match cli.command {
        Commands::Search {
            page,
            aggregate_by,
            sort_by,
            order,
        } => {
            let mut form = form.with_page(page).with_sort(sort_by, order);
            if let Some(mode) = aggregate_by {
                form = form.with_aggregation(mode);
            }

            match console.search(form).await? {
                RefreshOutcome::Events { page, total, .. } => {
                    let output = json!({
                        "page": page,
                        "total": total,
                        "events": console.results().records(),
                    });
                    println!("{}", serde_json::to_string_pretty(&output)?);
                }
                RefreshOutcome::Aggregations { .. } => {
                    console.await_severities().await;
                    println!("{}", serde_json::to_string_pretty(console.rows())?);
                }
            }
        }

        Commands::ArchiveByQuery => {
            console.search(form.with_aggregation(AggregationMode::None)).await?;
            let report = console.archive_by_query().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        Commands::DeleteByQuery => {
            console.search(form.with_aggregation(AggregationMode::None)).await?;
            match console.delete_by_query().await? {
                DeleteOutcome::Server(response) => {
                    println!("{}", serde_json::to_string_pretty(&json!({"deleted": response.deleted}))?);
                }
                DeleteOutcome::Job(report) => {
                    println!("{}", serde_json::to_string_pretty(&report)?);
                }
            }
        }

        Commands::Archive { ids } => {
            console.search(form.with_aggregation(AggregationMode::None)).await?;
            let mut removed = 0;
            for id in &ids {
                removed += console.archive_event(id).await?.removed;
            }
            println!("{}", serde_json::to_string_pretty(&json!({"archived": removed}))?);
        }

        Commands::Star { id } => {
            console.search(form.with_aggregation(AggregationMode::None)).await?;
            let starred = console.toggle_star(&id).await?;
            println!("{}", serde_json::to_string_pretty(&json!({"id": id, "starred": starred}))?);
        }
    }

    if cli.metrics {
        print!("{}", alert_triage::metrics::gather_metrics());
    }

    Ok(())
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_env("ALERT_TRIAGE_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(format!("alert_triage={}", config.observability.log_level)));

    let json = config.observability.json_logs;
    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| fmt::layer().json().with_writer(std::io::stderr)))
        .with((!json).then(|| fmt::layer().with_writer(std::io::stderr)))
        .init();
}

/// Log job progress while a bulk action runs
fn spawn_progress_logger(console: &TriageConsole) {
    let mut events = console.subscribe_jobs();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(JobEvent::Progress { id, progress }) => {
                    tracing::info!(
                        job_id = %id,
                        processed = progress.processed,
                        total = ?progress.total,
                        "Job progress"
                    );
                }
                Ok(JobEvent::AllDone) => tracing::info!("All jobs finished"),
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Progress logger lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}
