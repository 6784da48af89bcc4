//! HTTP capability providers: Brave web search, Semantic Scholar, podcast RSS
//! feeds, page fetch and HEAD-based URL validation.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use futures::future::join_all;
use regex::Regex;
use serde::Deserialize;

use super::retry::{with_retry, CapabilityRetry};
use super::{
    check_url_format, clamp_results, sanitize_query, CapabilityError, ContentFetcher, PodcastSearch, SearchProvider, UrlCheck, UrlValidator,
};
use crate::config::{PodcastConfig, PodcastFeed, SearchConfig};
use crate::source::{Provenance, Source, SourceType};

const USER_AGENT: &str = "Research-Agent/1.0";

/// Words that route a query to the academic provider.
const ACADEMIC_MARKERS: [&str; 3] = ["academic", "scholarly", "journal"];

static SCRIPT_STYLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<script\b.*?</script>|<style\b.*?</style>").expect("static regex")
});
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("static regex"));

static RSS_ITEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<item\b[^>]*>(.*?)</item>").expect("static regex"));
static RSS_TITLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<title\b[^>]*>(.*?)</title>").expect("static regex"));
static RSS_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<link\b[^>]*>(.*?)</link>").expect("static regex"));
static RSS_DESCRIPTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(?:description|itunes:summary)\b[^>]*>(.*?)</(?:description|itunes:summary)>")
        .expect("static regex")
});
static RSS_ENCLOSURE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<enclosure\b[^>]*\burl="([^"]+)""#).expect("static regex")
});
static RSS_PUB_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<pubDate>(.*?)</pubDate>").expect("static regex"));
static CDATA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!\[CDATA\[(.*?)\]\]>").expect("static regex"));

/// Characters of an episode description kept on the source.
const EPISODE_DESCRIPTION_CHARS: usize = 500;

fn build_client(timeout: Duration) -> Result<reqwest::Client, CapabilityError> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .map_err(|e| CapabilityError::not_configured(format!("HTTP client: {}", e)))
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

fn provenance(provider: &str, query: &str) -> Provenance {
    Provenance {
        provider: provider.to_string(),
        query: Some(query.to_string()),
        retrieved_at: Some(Utc::now()),
        ..Default::default()
    }
}

// ============================================================================
// Brave
// ============================================================================

/// Web search through the Brave Search API.
pub struct BraveSearch {
    client: reqwest::Client,
    api_key: Option<String>,
    endpoint: String,
    retry: CapabilityRetry,
}

#[derive(Debug, Deserialize)]
struct BraveResponse {
    #[serde(default)]
    web: Option<BraveWeb>,
}

#[derive(Debug, Deserialize)]
struct BraveWeb {
    #[serde(default)]
    results: Vec<BraveResult>,
}

#[derive(Debug, Deserialize)]
struct BraveResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    description: String,
}

impl BraveSearch {
    pub fn new(config: &SearchConfig) -> Result<Self, CapabilityError> {
        Ok(Self {
            client: build_client(config.timeout)?,
            api_key: config.brave_api_key.clone().filter(|k| !k.is_empty()),
            endpoint: config.brave_search_url.clone(),
            retry: config.retry.clone(),
        })
    }

    async fn request(&self, api_key: &str, query: &str, count: usize) -> Result<Vec<Source>, CapabilityError> {
        let count = count.to_string();
        let response = self
            .client
            .get(&self.endpoint)
            .header("X-Subscription-Token", api_key)
            .header("Accept", "application/json")
            .query(&[
                ("q", query),
                ("count", count.as_str()),
                ("text_decorations", "false"),
                ("result_filter", "web"),
                ("safesearch", "moderate"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CapabilityError::from_status(
                status.as_u16(),
                format!("Brave API error: {}", truncate_chars(&body, 200)),
            ));
        }

        let parsed: BraveResponse = response.json().await?;
        let results = parsed.web.map(|w| w.results).unwrap_or_default();

        Ok(results
            .into_iter()
            .filter(|r| r.url.starts_with("http://") || r.url.starts_with("https://"))
            .map(|r| {
                Source::new(
                    truncate_chars(&r.title, 200),
                    r.url,
                    truncate_chars(&r.description, 300),
                )
                .with_provenance(provenance("brave", query))
            })
            .collect())
    }
}

#[async_trait]
impl SearchProvider for BraveSearch {
    fn name(&self) -> &str {
        "brave"
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<Source>, CapabilityError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            CapabilityError::not_configured("BRAVE_API_KEY is not set")
        })?;
        let query = sanitize_query(query)?;
        let count = clamp_results(max_results);

        tracing::info!("Brave search: {}", truncate_chars(&query, 100));
        let sources = with_retry(&self.retry, "brave search", || {
            self.request(api_key, &query, count)
        })
        .await?;
        tracing::info!("Brave returned {} results", sources.len());
        Ok(sources)
    }
}

// ============================================================================
// Semantic Scholar
// ============================================================================

/// Academic paper search through the Semantic Scholar graph API.
pub struct SemanticScholarSearch {
    client: reqwest::Client,
    base_url: String,
    retry: CapabilityRetry,
}

#[derive(Debug, Deserialize)]
struct PaperSearchResponse {
    #[serde(default)]
    data: Vec<Paper>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Paper {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(rename = "abstract", default)]
    abstract_text: Option<String>,
    #[serde(default)]
    authors: Vec<PaperAuthor>,
    #[serde(default)]
    year: Option<i32>,
    #[serde(default)]
    citation_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct PaperAuthor {
    #[serde(default)]
    name: Option<String>,
}

impl SemanticScholarSearch {
    pub fn new(config: &SearchConfig) -> Result<Self, CapabilityError> {
        Ok(Self {
            client: build_client(config.timeout)?,
            base_url: config.semantic_scholar_url.trim_end_matches('/').to_string(),
            retry: config.retry.clone(),
        })
    }

    async fn request(&self, query: &str, limit: usize) -> Result<Vec<Source>, CapabilityError> {
        let limit = limit.to_string();
        let response = self
            .client
            .get(format!("{}/paper/search", self.base_url))
            .query(&[
                ("query", query),
                ("fields", "title,abstract,authors,year,citationCount,url"),
                ("limit", limit.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CapabilityError::from_status(
                status.as_u16(),
                format!("Semantic Scholar error: {}", truncate_chars(&body, 200)),
            ));
        }

        let parsed: PaperSearchResponse = response.json().await?;
        Ok(parsed
            .data
            .into_iter()
            .map(|paper| {
                let mut prov = provenance("semantic_scholar", query);
                prov.authors = paper.authors.into_iter().filter_map(|a| a.name).collect();
                prov.year = paper.year;
                prov.citation_count = paper.citation_count;
                Source::new(
                    paper.title.unwrap_or_default(),
                    paper.url.unwrap_or_default(),
                    truncate_chars(&paper.abstract_text.unwrap_or_default(), 500),
                )
                .with_type(SourceType::Academic)
                .with_provenance(prov)
            })
            .collect())
    }
}

#[async_trait]
impl SearchProvider for SemanticScholarSearch {
    fn name(&self) -> &str {
        "semantic_scholar"
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<Source>, CapabilityError> {
        let query = sanitize_query(query)?;
        let limit = clamp_results(max_results);
        tracing::info!("Semantic Scholar search: {}", truncate_chars(&query, 100));
        with_retry(&self.retry, "semantic scholar search", || {
            self.request(&query, limit)
        })
        .await
    }
}

// ============================================================================
// Routing
// ============================================================================

/// Sends academic-sounding queries to an academic provider and everything
/// else to a general web provider.
///
/// A failing academic provider falls back to the general one.
pub struct RoutedSearch {
    general: Arc<dyn SearchProvider>,
    academic: Option<Arc<dyn SearchProvider>>,
}

impl RoutedSearch {
    pub fn new(general: Arc<dyn SearchProvider>, academic: Option<Arc<dyn SearchProvider>>) -> Self {
        Self { general, academic }
    }

    pub fn is_academic_query(query: &str) -> bool {
        let lower = query.to_lowercase();
        ACADEMIC_MARKERS.iter().any(|m| lower.contains(m))
    }
}

#[async_trait]
impl SearchProvider for RoutedSearch {
    fn name(&self) -> &str {
        "routed"
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<Source>, CapabilityError> {
        if let Some(academic) = self.academic.as_ref().filter(|_| Self::is_academic_query(query)) {
            match academic.search(query, max_results).await {
                Ok(sources) => return Ok(sources),
                Err(e) => tracing::warn!(
                    "Academic search via {} failed, falling back to {}: {}",
                    academic.name(),
                    self.general.name(),
                    e
                ),
            }
        }
        self.general.search(query, max_results).await
    }
}

// ============================================================================
// Podcasts
// ============================================================================

/// Podcast episode search over a fixed list of show RSS feeds.
///
/// Every feed is fetched concurrently and its items are matched against the
/// query; an episode matches when each query term appears in its title or
/// description.
pub struct RssPodcastSearch {
    client: reqwest::Client,
    feeds: Vec<PodcastFeed>,
    retry: CapabilityRetry,
}

impl RssPodcastSearch {
    pub fn new(config: &PodcastConfig) -> Result<Self, CapabilityError> {
        Ok(Self {
            client: build_client(config.timeout)?,
            feeds: config.feeds.clone(),
            retry: config.retry.clone(),
        })
    }

    async fn request(&self, feed: &PodcastFeed) -> Result<String, CapabilityError> {
        let response = self
            .client
            .get(&feed.url)
            .header("Accept", "application/rss+xml, application/xml;q=0.9, */*;q=0.8")
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CapabilityError::from_status(
                status.as_u16(),
                format!("HTTP error fetching feed of {}", feed.name),
            ));
        }
        Ok(response.text().await?)
    }

    async fn search_feed(&self, feed: &PodcastFeed, query: &str) -> Result<Vec<Source>, CapabilityError> {
        let xml = with_retry(&self.retry, "podcast feed", || self.request(feed)).await?;
        let episodes: Vec<Source> = parse_feed(&xml, &feed.name)
            .into_iter()
            .filter(|episode| episode_matches(query, episode))
            .map(|mut episode| {
                episode.provenance.query = Some(query.to_string());
                episode
            })
            .collect();
        tracing::debug!("{}: {} matching episodes", feed.name, episodes.len());
        Ok(episodes)
    }
}

#[async_trait]
impl PodcastSearch for RssPodcastSearch {
    fn name(&self) -> &str {
        "podcast_rss"
    }

    async fn search_episodes(&self, query: &str, max_results: usize) -> Result<Vec<Source>, CapabilityError> {
        let query = sanitize_query(query)?;
        let limit = clamp_results(max_results);
        if self.feeds.is_empty() {
            return Err(CapabilityError::not_configured("no podcast feeds configured"));
        }

        tracing::info!("Podcast search over {} feeds: {}", self.feeds.len(), truncate_chars(&query, 100));
        let results = join_all(self.feeds.iter().map(|feed| self.search_feed(feed, &query))).await;

        let mut episodes = Vec::new();
        let mut failures = Vec::new();
        for (feed, result) in self.feeds.iter().zip(results) {
            match result {
                Ok(found) => episodes.extend(found),
                Err(e) => {
                    tracing::warn!("Podcast feed {} failed: {}", feed.name, e);
                    failures.push(e);
                }
            }
        }
        if failures.len() == self.feeds.len() {
            if let Some(last) = failures.pop() {
                return Err(CapabilityError::new(
                    last.kind,
                    format!("all {} podcast feeds failed, last: {}", self.feeds.len(), last.message),
                ));
            }
        }

        episodes.truncate(limit);
        Ok(episodes)
    }
}

/// Episodes of an RSS document, in feed order.
///
/// Items without a title or a link (or enclosure URL) are skipped.
pub(crate) fn parse_feed(xml: &str, show: &str) -> Vec<Source> {
    RSS_ITEM
        .captures_iter(xml)
        .filter_map(|item| {
            let item = item.get(1)?.as_str();
            let title = rss_text(&RSS_TITLE, item)?;
            let url = rss_text(&RSS_LINK, item)
                .filter(|link| link.starts_with("http"))
                .or_else(|| rss_text(&RSS_ENCLOSURE, item))?;
            let description = rss_text(&RSS_DESCRIPTION, item).unwrap_or_default();
            let year = rss_text(&RSS_PUB_DATE, item)
                .and_then(|date| DateTime::parse_from_rfc2822(&date).ok())
                .map(|date| date.year());

            let provenance = Provenance {
                provider: "podcast_rss".to_string(),
                retrieved_at: Some(Utc::now()),
                year,
                publisher: Some(show.to_string()),
                ..Default::default()
            };
            Some(
                Source::new(
                    truncate_chars(&title, 200),
                    url,
                    truncate_chars(&description, EPISODE_DESCRIPTION_CHARS),
                )
                .with_type(SourceType::Podcast)
                .with_provenance(provenance),
            )
        })
        .collect()
}

/// First capture of `pattern` in `item` as plain text, if non-empty.
fn rss_text(pattern: &Regex, item: &str) -> Option<String> {
    let raw = pattern.captures(item)?.get(1)?.as_str();
    let unwrapped = CDATA.replace_all(raw, "$1");
    let text = extract_text_from_html(&unwrapped);
    (!text.is_empty()).then_some(text)
}

/// Every query term of three or more characters appears in the episode
/// title or description; a query without such terms must appear whole.
pub(crate) fn episode_matches(query: &str, episode: &Source) -> bool {
    let haystack = format!("{} {}", episode.title, episode.description).to_lowercase();
    let query = query.to_lowercase();
    let terms: Vec<&str> = query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|term| term.chars().count() >= 3)
        .collect();
    if terms.is_empty() {
        return haystack.contains(query.trim());
    }
    terms.iter().all(|term| haystack.contains(term))
}

// ============================================================================
// Fetch
// ============================================================================

/// Fetches pages and reduces HTML to readable text.
pub struct HttpFetcher {
    client: reqwest::Client,
    retry: CapabilityRetry,
}

impl HttpFetcher {
    pub fn new(config: &SearchConfig) -> Result<Self, CapabilityError> {
        Ok(Self {
            client: build_client(config.fetch_timeout)?,
            retry: config.retry.clone(),
        })
    }

    async fn request(&self, url: &str) -> Result<String, CapabilityError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CapabilityError::from_status(
                status.as_u16(),
                format!("HTTP error fetching {}", url),
            ));
        }

        let is_html = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.contains("text/html"))
            .unwrap_or(true);
        let body = response.text().await?;

        Ok(if is_html {
            extract_text_from_html(&body)
        } else {
            body.split_whitespace().collect::<Vec<_>>().join(" ")
        })
    }
}

#[async_trait]
impl ContentFetcher for HttpFetcher {
    async fn fetch_text(&self, url: &str) -> Result<String, CapabilityError> {
        check_url_format(url)?;
        tracing::debug!("Fetching {}", url);
        with_retry(&self.retry, "fetch", || self.request(url)).await
    }
}

/// Reduce HTML to whitespace-normalized text without scripts or styles.
pub(crate) fn extract_text_from_html(html: &str) -> String {
    let without_code = SCRIPT_STYLE.replace_all(html, " ");
    let without_tags = TAG.replace_all(&without_code, " ");
    let text = without_tags.split_whitespace().collect::<Vec<_>>().join(" ");
    html_decode(&text)
}

fn html_decode(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

// ============================================================================
// URL validation
// ============================================================================

/// HEAD-request URL validator; a URL is accessible iff the final status is 200.
pub struct HttpUrlValidator {
    client: reqwest::Client,
}

impl HttpUrlValidator {
    pub fn new(config: &SearchConfig) -> Result<Self, CapabilityError> {
        let client = reqwest::Client::builder()
            .user_agent("Research-Agent-Validator/1.0")
            .timeout(config.url_check_timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| CapabilityError::not_configured(format!("HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl UrlValidator for HttpUrlValidator {
    async fn validate_url(&self, url: &str) -> UrlCheck {
        if let Err(e) = check_url_format(url) {
            return UrlCheck::failed(e.message);
        }

        match self
            .client
            .head(url)
            .header(
                "Accept",
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            )
            .send()
            .await
        {
            Ok(response) => {
                let check = UrlCheck::accessible(response.status().as_u16(), response.url().as_str());
                tracing::debug!("HEAD {} -> {:?}", url, check.status_code);
                check
            }
            Err(e) => {
                let err = CapabilityError::from(e);
                tracing::debug!("HEAD {} failed: {}", url, err);
                UrlCheck::failed(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeSearch;

    #[test]
    fn html_is_reduced_to_text() {
        let html = r#"<html><head><style>p { color: red; }</style>
            <script type="text/javascript">alert("x")</script></head>
            <body><h1>Genesis&nbsp;1</h1><p>In the   beginning &amp; after</p></body></html>"#;
        assert_eq!(extract_text_from_html(html), "Genesis 1 In the beginning & after");
    }

    #[test]
    fn academic_queries_are_detected() {
        assert!(RoutedSearch::is_academic_query("Genesis 1 Academic Scholarly Journal"));
        assert!(RoutedSearch::is_academic_query("romans scholarly debate"));
        assert!(!RoutedSearch::is_academic_query("romans sermon"));
    }

    #[tokio::test]
    async fn routing_prefers_academic_and_falls_back() {
        let general = Arc::new(FakeSearch::returning("general", 2));
        let academic = Arc::new(FakeSearch::returning("academic", 1));
        let routed = RoutedSearch::new(general.clone(), Some(academic.clone()));

        let hits = routed.search("topic scholarly journal", 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(academic.calls(), 1);
        assert_eq!(general.calls(), 0);

        let hits = routed.search("topic overview", 5).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(general.calls(), 1);

        let failing = Arc::new(FakeSearch::failing("academic"));
        let routed = RoutedSearch::new(general.clone(), Some(failing.clone()));
        let hits = routed.search("scholarly topic", 5).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(failing.calls(), 1);
        assert_eq!(general.calls(), 2);
    }

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
        <rss version="2.0" xmlns:itunes="http://www.itunes.com/dtds/podcast-1.0.dtd">
        <channel>
          <title>OnScript</title>
          <link>https://onscript.study</link>
          <item>
            <title><![CDATA[Genesis 1 &amp; the Cosmic Temple]]></title>
            <link>https://onscript.study/genesis-1-temple</link>
            <description><![CDATA[<p>John Walton on <b>creation</b> as temple inauguration.</p>]]></description>
            <pubDate>Tue, 14 Mar 2023 08:00:00 +0000</pubDate>
          </item>
          <item>
            <title>Paul and the Law</title>
            <itunes:summary>A conversation about Romans.</itunes:summary>
            <enclosure url="https://media.example/paul.mp3" type="audio/mpeg" length="1"/>
          </item>
          <item>
            <title>Untitled link-less episode</title>
          </item>
        </channel>
        </rss>"#;

    #[test]
    fn rss_items_become_podcast_sources() {
        let episodes = parse_feed(FEED, "OnScript");
        assert_eq!(episodes.len(), 2);

        let genesis = &episodes[0];
        assert_eq!(genesis.title, "Genesis 1 & the Cosmic Temple");
        assert_eq!(genesis.url, "https://onscript.study/genesis-1-temple");
        assert_eq!(genesis.description, "John Walton on creation as temple inauguration.");
        assert_eq!(genesis.source_type, SourceType::Podcast);
        assert_eq!(genesis.provenance.provider, "podcast_rss");
        assert_eq!(genesis.provenance.publisher.as_deref(), Some("OnScript"));
        assert_eq!(genesis.provenance.year, Some(2023));

        let paul = &episodes[1];
        assert_eq!(paul.url, "https://media.example/paul.mp3");
        assert_eq!(paul.description, "A conversation about Romans.");
        assert_eq!(paul.provenance.year, None);
    }

    #[test]
    fn episodes_match_on_every_query_term() {
        let episodes = parse_feed(FEED, "OnScript");
        assert!(episode_matches("Genesis 1", &episodes[0]));
        assert!(episode_matches("genesis creation", &episodes[0]));
        assert!(!episode_matches("genesis flood", &episodes[0]));
        assert!(episode_matches("Romans", &episodes[1]));
        assert!(!episode_matches("Genesis 1", &episodes[1]));
    }

    #[tokio::test]
    async fn podcast_search_without_feeds_is_not_configured() {
        let config = PodcastConfig {
            feeds: Vec::new(),
            ..PodcastConfig::default()
        };
        let podcasts = RssPodcastSearch::new(&config).unwrap();
        let err = podcasts.search_episodes("Genesis 1", 5).await.unwrap_err();
        assert_eq!(err.kind, crate::tools::CapabilityErrorKind::NotConfigured);
    }

    #[tokio::test]
    async fn brave_without_key_is_not_configured() {
        let brave = BraveSearch::new(&SearchConfig::default()).unwrap();
        let err = brave.search("Genesis 1", 5).await.unwrap_err();
        assert_eq!(err.kind, crate::tools::CapabilityErrorKind::NotConfigured);
    }

    #[tokio::test]
    async fn malformed_urls_fail_validation_without_network() {
        let validator = HttpUrlValidator::new(&SearchConfig::default()).unwrap();
        let check = validator.validate_url("ftp://example.com/file").await;
        assert!(!check.accessible);
        assert!(check.error.is_some());
    }
}
