//! Deterministic capability fakes for unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{ChatMessage, ChatOptions, LlmClient};
use crate::source::{Provenance, Source, SourceType};
use crate::tools::{
    CapabilityError, CapabilityErrorKind, ContentFetcher, PodcastSearch, SearchProvider, UrlCheck,
    UrlValidator,
};

/// Search provider returning `n` sources per query, with URLs derived from
/// the query so different queries yield different sources.
pub struct FakeSearch {
    name: String,
    results: usize,
    description: String,
    fail: bool,
    calls: AtomicUsize,
    queries: Mutex<Vec<String>>,
}

impl FakeSearch {
    pub fn returning(name: &str, results: usize) -> Self {
        Self {
            name: name.to_string(),
            results,
            description: String::new(),
            fail: false,
            calls: AtomicUsize::new(0),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(name: &str) -> Self {
        Self {
            fail: true,
            ..Self::returning(name, 0)
        }
    }

    /// Description given to every returned source, after the query itself.
    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().map(|q| q.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl SearchProvider for FakeSearch {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<Source>, CapabilityError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut queries) = self.queries.lock() {
            queries.push(query.to_string());
        }
        if self.fail {
            return Err(CapabilityError::new(
                CapabilityErrorKind::Network,
                format!("{} unavailable", self.name),
            ));
        }

        let slug: String = query
            .to_lowercase()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
            .collect();
        Ok((0..self.results.min(max_results))
            .map(|i| {
                Source::new(
                    format!("{} result {} for {}", self.name, i, query),
                    format!("https://{}.example/{}/{}", self.name, slug, i),
                    format!("{} {}", query, self.description),
                )
                .with_provenance(Provenance {
                    provider: self.name.clone(),
                    query: Some(query.to_string()),
                    ..Default::default()
                })
            })
            .collect())
    }
}

/// Podcast lookup returning `n` episodes of one show, or failing.
pub struct FakePodcasts {
    episodes: usize,
    fail: bool,
    calls: AtomicUsize,
}

impl FakePodcasts {
    pub fn returning(episodes: usize) -> Self {
        Self {
            episodes,
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::returning(0)
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PodcastSearch for FakePodcasts {
    fn name(&self) -> &str {
        "fake_podcasts"
    }

    async fn search_episodes(&self, query: &str, max_results: usize) -> Result<Vec<Source>, CapabilityError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(CapabilityError::new(
                CapabilityErrorKind::Network,
                "all podcast feeds failed",
            ));
        }
        Ok((0..self.episodes.min(max_results))
            .map(|i| {
                Source::new(
                    format!("Episode {} on {}", i, query),
                    format!("https://podcast.example/episodes/{}", i),
                    format!("A conversation about {}", query),
                )
                .with_type(SourceType::Podcast)
                .with_provenance(Provenance {
                    provider: "fake_podcasts".to_string(),
                    publisher: Some("OnScript".to_string()),
                    ..Default::default()
                })
            })
            .collect())
    }
}

/// Fetcher serving fixed pages; unknown URLs get the default page or a 404.
pub struct FakeFetcher {
    pages: HashMap<String, String>,
    default_page: Option<String>,
    calls: AtomicUsize,
}

impl FakeFetcher {
    /// Every URL returns `text`.
    pub fn serving(text: &str) -> Self {
        Self {
            pages: HashMap::new(),
            default_page: Some(text.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Only the listed URLs resolve.
    pub fn pages(pages: &[(&str, &str)]) -> Self {
        Self {
            pages: pages
                .iter()
                .map(|(url, text)| (url.to_string(), text.to_string()))
                .collect(),
            default_page: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self::pages(&[])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentFetcher for FakeFetcher {
    async fn fetch_text(&self, url: &str) -> Result<String, CapabilityError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.pages
            .get(url)
            .or(self.default_page.as_ref())
            .cloned()
            .ok_or_else(|| CapabilityError::from_status(404, format!("{} not found", url)))
    }
}

/// URL validator treating only the listed URLs as reachable.
pub struct FakeUrlValidator {
    accessible: Vec<String>,
}

impl FakeUrlValidator {
    pub fn accessible(urls: &[&str]) -> Self {
        Self {
            accessible: urls.iter().map(|u| u.to_string()).collect(),
        }
    }
}

#[async_trait]
impl UrlValidator for FakeUrlValidator {
    async fn validate_url(&self, url: &str) -> UrlCheck {
        let status = if self.accessible.iter().any(|u| u == url) { 200 } else { 404 };
        UrlCheck::accessible(status, url)
    }
}

/// Model returning a fixed reply, or always failing.
pub struct FakeLlm {
    reply: Option<String>,
    calls: AtomicUsize,
}

impl FakeLlm {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmClient for FakeLlm {
    async fn complete(&self, _messages: &[ChatMessage], _options: &ChatOptions) -> anyhow::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.reply {
            Some(reply) => Ok(reply.clone()),
            None => Err(anyhow::anyhow!("model unavailable")),
        }
    }
}
