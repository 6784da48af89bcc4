//! Configuration management for the research agent.
//!
//! Configuration can be set via environment variables (read by the binary only):
//! - `BRAVE_API_KEY` - Optional. Brave Search API key; web search fails without it.
//! - `BRAVE_SEARCH_URL` - Optional. Brave endpoint override.
//! - `SEARCH_TIMEOUT_SECS` - Optional. Per-call search timeout. Defaults to `15`.
//! - `PODCAST_SEARCH_ENABLED` - Optional. `false` disables podcast discovery. Defaults to `true`.
//! - `PODCAST_FEEDS` - Optional. `Name=url` pairs separated by `;`, replacing the curated shows.
//! - `PODCAST_TIMEOUT_SECS` - Optional. Per-feed fetch timeout. Defaults to `15`.
//! - `LLM_API_KEY` - Optional. Enables model-written summaries and synthesis.
//! - `LLM_BASE_URL` - Optional. OpenAI-compatible base URL. Defaults to `https://api.moonshot.ai/v1`.
//! - `LLM_MODEL` - Optional. Defaults to `kimi-k2-0711-preview`.
//! - `LLM_TIMEOUT_SECS` - Optional. Per-call completion timeout. Defaults to `20`.
//! - `LLM_TEMPERATURE` - Optional. Defaults to `0.3`.
//! - `MAX_ITERATIONS` - Optional. Iteration cap of the research loop. Defaults to `25`.
//! - `VALIDATION_INTERVAL` - Optional. Validate every N iterations. Defaults to `5`.
//! - `ITERATION_PAUSE_MS` - Optional. Pause between iterations. Defaults to `1000`.
//! - `RESEARCH_DB_PATH` - Optional. SQLite validation store. Defaults to `research_tasks.db`.
//! - `RESEARCH_OUTPUT_DIR` - Optional. Directory for saved notes. Defaults to `notes`.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::task::DEFAULT_TEMPLATE;
use crate::tools::CapabilityRetry;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Tunables of the research loop, decision policy and validator.
#[derive(Debug, Clone)]
pub struct ResearchConfig {
    /// Hard cap on loop iterations
    pub max_iterations: usize,
    /// Failed attempts that force completion
    pub max_failed_attempts: u32,
    /// Loop-guard window: an action filling this many most recent slots is blocked
    pub max_same_action_attempts: usize,
    /// Standard criteria that must hold for `IsComplete`
    pub min_satisfied_criteria: usize,
    /// Max distance in characters from a claim's start to a supporting citation
    pub citation_proximity: usize,
    /// Validation passes when risk is below this
    pub risk_pass_threshold: f64,
    /// Max sources fetched and summarized concurrently
    pub fan_out_limit: usize,
    /// Run validation every N iterations (0 disables periodic validation)
    pub validation_interval: usize,
    /// Pause between iterations
    pub iteration_pause: Duration,
    /// Plan template used when none is requested
    pub default_template: String,
    /// Whether the run builds a task graph at all
    pub use_task_graph: bool,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            max_iterations: 25,
            max_failed_attempts: 5,
            max_same_action_attempts: 3,
            min_satisfied_criteria: 3,
            citation_proximity: 500,
            risk_pass_threshold: 0.3,
            fan_out_limit: 10,
            validation_interval: 5,
            iteration_pause: Duration::from_millis(1000),
            default_template: DEFAULT_TEMPLATE.to_string(),
            use_task_graph: true,
        }
    }
}

/// Search, fetch and URL-check providers.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub brave_api_key: Option<String>,
    pub brave_search_url: String,
    pub semantic_scholar_url: String,
    /// Per-call search timeout
    pub timeout: Duration,
    /// Per-call page fetch timeout
    pub fetch_timeout: Duration,
    /// Per-call HEAD timeout for URL validation
    pub url_check_timeout: Duration,
    pub retry: CapabilityRetry,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            brave_api_key: None,
            brave_search_url: "https://api.search.brave.com/res/v1/web/search".to_string(),
            semantic_scholar_url: "https://api.semanticscholar.org/graph/v1".to_string(),
            timeout: Duration::from_secs(15),
            fetch_timeout: Duration::from_secs(10),
            url_check_timeout: Duration::from_secs(15),
            retry: CapabilityRetry::default(),
        }
    }
}

/// A podcast RSS feed searched for episodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodcastFeed {
    /// Show name recorded on every episode from this feed
    pub name: String,
    pub url: String,
}

impl PodcastFeed {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

/// Shows searched when `PODCAST_FEEDS` is not set.
const CURATED_FEEDS: [(&str, &str); 5] = [
    ("Bible Project", "https://bibleproject.com/podcasts/the-bible-project-podcast/feed/"),
    ("Bema", "https://feeds.buzzsprout.com/1024493.rss"),
    ("OnScript", "https://feeds.buzzsprout.com/1208346.rss"),
    ("Naked Bible Podcast", "https://nakedbiblepodcast.com/feed/podcast/"),
    ("Bible for Normal People", "https://feeds.buzzsprout.com/418204.rss"),
];

/// Podcast episode lookup over RSS feeds.
#[derive(Debug, Clone)]
pub struct PodcastConfig {
    pub enabled: bool,
    pub feeds: Vec<PodcastFeed>,
    /// Per-feed fetch timeout
    pub timeout: Duration,
    pub retry: CapabilityRetry,
}

impl Default for PodcastConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            feeds: CURATED_FEEDS
                .iter()
                .map(|(name, url)| PodcastFeed::new(*name, *url))
                .collect(),
            timeout: Duration::from_secs(15),
            retry: CapabilityRetry::default(),
        }
    }
}

impl PodcastConfig {
    pub fn is_enabled(&self) -> bool {
        self.enabled && !self.feeds.is_empty()
    }
}

/// Parse `Name=url;Name=url`.
fn parse_feeds(key: &str, raw: &str) -> Result<Vec<PodcastFeed>, ConfigError> {
    raw.split(';')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| match entry.split_once('=') {
            Some((name, url)) if !name.trim().is_empty() && url.trim().starts_with("http") => {
                Ok(PodcastFeed::new(name.trim(), url.trim()))
            }
            _ => Err(ConfigError::InvalidValue(
                key.to_string(),
                format!("expected Name=url, got '{}'", entry),
            )),
        })
        .collect()
}

/// Completion provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
    pub temperature: f64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.moonshot.ai/v1".to_string(),
            model: "kimi-k2-0711-preview".to_string(),
            timeout: Duration::from_secs(20),
            temperature: 0.3,
        }
    }
}

impl LlmConfig {
    pub fn is_enabled(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }
}

/// Persistent state locations.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// SQLite database holding validation results
    pub db_path: PathBuf,
    /// Directory where `save_note` writes reports
    pub output_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("research_tasks.db"),
            output_dir: PathBuf::from("notes"),
        }
    }
}

/// Complete configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub research: ResearchConfig,
    pub search: SearchConfig,
    pub podcast: PodcastConfig,
    pub llm: LlmConfig,
    pub storage: StorageConfig,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if a numeric variable does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let research = ResearchConfig {
            max_iterations: parse_or(&get, "MAX_ITERATIONS", defaults.research.max_iterations)?,
            validation_interval: parse_or(
                &get,
                "VALIDATION_INTERVAL",
                defaults.research.validation_interval,
            )?,
            iteration_pause: Duration::from_millis(parse_or(
                &get,
                "ITERATION_PAUSE_MS",
                defaults.research.iteration_pause.as_millis() as u64,
            )?),
            ..defaults.research
        };

        let search = SearchConfig {
            brave_api_key: get("BRAVE_API_KEY"),
            brave_search_url: get("BRAVE_SEARCH_URL").unwrap_or(defaults.search.brave_search_url),
            timeout: Duration::from_secs(parse_or(
                &get,
                "SEARCH_TIMEOUT_SECS",
                defaults.search.timeout.as_secs(),
            )?),
            ..defaults.search
        };

        let podcast = PodcastConfig {
            enabled: parse_or(&get, "PODCAST_SEARCH_ENABLED", defaults.podcast.enabled)?,
            feeds: match get("PODCAST_FEEDS") {
                Some(raw) => parse_feeds("PODCAST_FEEDS", &raw)?,
                None => defaults.podcast.feeds,
            },
            timeout: Duration::from_secs(parse_or(
                &get,
                "PODCAST_TIMEOUT_SECS",
                defaults.podcast.timeout.as_secs(),
            )?),
            ..defaults.podcast
        };

        let temperature: f64 = parse_or(&get, "LLM_TEMPERATURE", defaults.llm.temperature)?;
        if !(0.0..=2.0).contains(&temperature) {
            return Err(ConfigError::InvalidValue(
                "LLM_TEMPERATURE".to_string(),
                format!("{} is outside 0.0..=2.0", temperature),
            ));
        }

        let llm = LlmConfig {
            api_key: get("LLM_API_KEY"),
            base_url: get("LLM_BASE_URL").unwrap_or(defaults.llm.base_url),
            model: get("LLM_MODEL").unwrap_or(defaults.llm.model),
            timeout: Duration::from_secs(parse_or(
                &get,
                "LLM_TIMEOUT_SECS",
                defaults.llm.timeout.as_secs(),
            )?),
            temperature,
        };

        let storage = StorageConfig {
            db_path: get("RESEARCH_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.storage.db_path),
            output_dir: get("RESEARCH_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.storage.output_dir),
        };

        Ok(Self {
            research,
            search,
            podcast,
            llm,
            storage,
        })
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidValue(key.to_string(), format!("{}", e))),
        None => Ok(default),
    }
}
