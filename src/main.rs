//! research-agent - command line entry point
//!
//! Runs one research session for a topic and prints the report.

use std::sync::Arc;

use clap::Parser;
use research_agent::agents::{CompletionCriterion, ResearchAgent, ResearchGoal};
use research_agent::config::Config;
use research_agent::llm::OpenAiCompatibleClient;
use research_agent::task::TaskPlanner;
use research_agent::tools::{
    BraveSearch, HttpFetcher, HttpUrlValidator, RoutedSearch, RssPodcastSearch, SearchProvider,
    SemanticScholarSearch,
};
use research_agent::validation::{CitationValidator, SqliteValidationStore};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "research-agent", version, about = "Autonomous theological research agent")]
struct Cli {
    /// Topic to research, e.g. "Genesis 1 creation account"
    topic: String,

    /// Research mandate shown in the report
    #[arg(long)]
    mandate: Option<String>,

    /// Plan template for the task graph
    #[arg(long, env = "RESEARCH_TEMPLATE")]
    template: Option<String>,

    #[arg(long, default_value_t = 5)]
    min_sources: usize,

    #[arg(long, default_value_t = 15)]
    max_sources: usize,

    #[arg(long, default_value_t = 0.6)]
    quality_threshold: f64,

    /// Research with heuristics only, without a task graph
    #[arg(long)]
    no_task_graph: bool,

    /// Print the full outcome as JSON instead of the markdown report
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "research_agent=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env()?;
    if let Some(template) = cli.template {
        if !TaskPlanner::template_names().contains(&template.as_str()) {
            warn!(
                "Unknown template '{}', available: {}",
                template,
                TaskPlanner::template_names().join(", ")
            );
        }
        config.research.default_template = template;
    }
    if cli.no_task_graph {
        config.research.use_task_graph = false;
    }
    info!(
        "Loaded configuration: template={}, model={}",
        config.research.default_template,
        if config.llm.is_enabled() {
            config.llm.model.as_str()
        } else {
            "(none)"
        }
    );

    let mut goal = ResearchGoal::builder(cli.topic)
        .min_sources(cli.min_sources)
        .max_sources(cli.max_sources)
        .quality_threshold(cli.quality_threshold)
        .criteria(CompletionCriterion::ALL);
    if let Some(mandate) = cli.mandate {
        goal = goal.mandate(mandate);
    }
    let goal = goal.build()?;

    // Capabilities
    if config.search.brave_api_key.is_none() {
        warn!("BRAVE_API_KEY not set; general web search is unavailable");
    }
    let general: Arc<dyn SearchProvider> = Arc::new(BraveSearch::new(&config.search)?);
    let academic: Arc<dyn SearchProvider> = Arc::new(SemanticScholarSearch::new(&config.search)?);
    let search = Arc::new(RoutedSearch::new(general, Some(academic)));
    let fetcher = Arc::new(HttpFetcher::new(&config.search)?);

    let mut validator = CitationValidator::new(Arc::new(HttpUrlValidator::new(&config.search)?))
        .with_config(&config.research);
    match SqliteValidationStore::open(&config.storage.db_path).await {
        Ok(store) => {
            info!("Validation results go to {}", store.path().display());
            validator = validator.with_store(Arc::new(store));
        }
        Err(e) => warn!(
            "Could not open validation store at {}: {}. Results will not be persisted.",
            config.storage.db_path.display(),
            e
        ),
    }

    let mut agent = ResearchAgent::new(search, fetcher, validator)
        .with_config(config.research.clone())
        .with_output_dir(config.storage.output_dir.clone());
    if config.podcast.is_enabled() {
        info!("Podcast discovery over {} feeds", config.podcast.feeds.len());
        agent = agent.with_podcasts(Arc::new(RssPodcastSearch::new(&config.podcast)?));
    }
    if config.llm.is_enabled() {
        agent = agent.with_llm(Arc::new(OpenAiCompatibleClient::new(&config.llm)?));
    } else {
        warn!("LLM_API_KEY not set; using extractive summaries");
    }

    let outcome = agent.conduct_research(goal).await;
    info!(
        "Research finished: {} after {} iterations, quality {:.2}",
        outcome.terminal_reason, outcome.iterations, outcome.quality_score
    );

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        println!("{}", outcome.report);
    }

    Ok(())
}
