//! Research agent: runs the decide / execute / update loop.
//!
//! # Loop
//! 1. Stop if the completion check passes or the iteration cap is hit
//! 2. Ask the policy for the next action; stop on `Complete`
//! 3. Execute it through the capabilities, producing events
//! 4. Fold the events into the context, record the action, reassess quality
//! 5. Validate every `validation_interval` iterations
//!
//! Capability failures never leave this module as errors. They become failed
//! tasks or `AttemptFailed` events, and every run ends with a report.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail};
use chrono::Utc;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::analysis::{analyze_content, extractive_summary, synthesize_insights, Insights};
use super::context::{Focus, ResearchContext, ResearchEvent};
use super::goal::ResearchGoal;
use super::policy::{assess_quality, DecisionPolicy};
use super::types::{Action, CompletionReason, DiscoveryStrategy, KnowledgeGap, QualityIssue, TerminalReason};
use crate::config::ResearchConfig;
use crate::llm::{ChatMessage, ChatOptions, LlmClient};
use crate::report::render_report;
use crate::source::{ContentAnalysis, Source, SourceType};
use crate::task::{safe_topic, Task, TaskId, TaskPlanner, TaskTool};
use crate::tools::{
    clamp_results, sanitize_query, CapabilityError, ContentFetcher, PodcastSearch, SearchProvider,
};
use crate::validation::{extract_citations, CitationValidator, ValidationResult};

/// Results requested by each heuristic search.
const DISCOVERY_RESULTS: usize = 10;

/// Episodes requested by a podcast lookup.
const PODCAST_RESULTS: usize = 8;

/// Results requested by a `web_search` task without `max_results`.
const DEFAULT_TASK_RESULTS: usize = 5;

/// Quality bonus for a passing validation.
const VALIDATION_BONUS: f64 = 0.1;

/// Characters of a document sent to the model for summarization.
const SUMMARY_INPUT_CHARS: usize = 4000;

/// Length of extractive summaries.
const EXTRACTIVE_SUMMARY_CHARS: usize = 400;

/// A fetched and analysed document, as stored in `get_pdf` task results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchedDocument {
    pub url: String,
    pub title: String,
    pub analysis: ContentAnalysis,
}

/// Final state of a research run.
#[derive(Debug, Clone, Serialize)]
pub struct ResearchOutcome {
    /// Basic completion criteria held at the end of the run
    pub research_complete: bool,
    pub terminal_reason: TerminalReason,
    pub iterations: usize,
    pub quality_score: f64,
    pub report: String,
    pub context: ResearchContext,
}

impl ResearchOutcome {
    pub fn validation(&self) -> Option<&ValidationResult> {
        self.context.validation()
    }
}

/// What a task produced: its stored result and the context updates.
struct TaskOutput {
    result: Value,
    events: Vec<ResearchEvent>,
}

impl TaskOutput {
    fn new(result: Value) -> Self {
        Self {
            result,
            events: Vec::new(),
        }
    }

    fn with_events(mut self, events: Vec<ResearchEvent>) -> Self {
        self.events = events;
        self
    }
}

/// Autonomous research agent.
pub struct ResearchAgent {
    search: Arc<dyn SearchProvider>,
    fetcher: Arc<dyn ContentFetcher>,
    podcasts: Option<Arc<dyn PodcastSearch>>,
    llm: Option<Arc<dyn LlmClient>>,
    validator: CitationValidator,
    planner: TaskPlanner,
    policy: DecisionPolicy,
    config: ResearchConfig,
    output_dir: PathBuf,
}

impl ResearchAgent {
    pub fn new(
        search: Arc<dyn SearchProvider>,
        fetcher: Arc<dyn ContentFetcher>,
        validator: CitationValidator,
    ) -> Self {
        let config = ResearchConfig::default();
        Self {
            search,
            fetcher,
            podcasts: None,
            llm: None,
            validator,
            planner: TaskPlanner::new(),
            policy: DecisionPolicy::new(&config),
            config,
            output_dir: PathBuf::from("notes"),
        }
    }

    /// Use a model for summaries and synthesis; without one the agent
    /// falls back to extractive summaries and a templated synthesis.
    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    /// Search podcast feeds once, before web discovery, for biblical topics.
    pub fn with_podcasts(mut self, podcasts: Arc<dyn PodcastSearch>) -> Self {
        self.podcasts = Some(podcasts);
        self.policy = self.policy.with_podcast_discovery(true);
        self
    }

    pub fn with_config(mut self, config: ResearchConfig) -> Self {
        self.policy = DecisionPolicy::new(&config).with_podcast_discovery(self.podcasts.is_some());
        self.config = config;
        self
    }

    /// Directory `save_note` tasks write into.
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn config(&self) -> &ResearchConfig {
        &self.config
    }

    /// Run the research loop for `goal` until completion or budget exhaustion.
    pub async fn conduct_research(&self, goal: ResearchGoal) -> ResearchOutcome {
        let topic = goal.topic().to_string();
        let mut context = ResearchContext::new(goal);
        if self.config.use_task_graph {
            let graph = self.planner.create_plan(&topic, &self.config.default_template);
            tracing::info!("Task graph created with {} tasks", graph.tasks().len());
            context = context.with_task_graph(graph);
        }
        tracing::info!("Starting research: {}", topic);

        let mut iterations = 0;
        let terminal_reason = loop {
            let satisfied = self.policy.evaluate_criteria(&context);
            context = context.apply(ResearchEvent::CriteriaEvaluated(satisfied));

            if self.policy.is_complete(&context) {
                break if self.policy.meets_basic_completion(&context) {
                    TerminalReason::ResearchComplete
                } else {
                    TerminalReason::Policy(CompletionReason::MaxAttemptsReached)
                };
            }
            if iterations >= self.config.max_iterations {
                tracing::warn!("Stopping after {} iterations", iterations);
                break TerminalReason::MaxIterations;
            }
            iterations += 1;

            let action = self.policy.decide_next_action(&context);
            tracing::info!("Iteration {}: {}", iterations, action);
            if let Action::Complete { reason } = action {
                break TerminalReason::Policy(reason);
            }

            let kind = action.kind();
            let description = action.to_string();
            context = self.execute(action, context).await;
            context = context.apply(ResearchEvent::ActionRecorded { kind, description });
            let quality = assess_quality(&context);
            context = context.apply(ResearchEvent::QualityAssessed(quality));

            if self.config.validation_interval > 0 && iterations % self.config.validation_interval == 0 {
                context = self.validate(context).await;
            }

            if !self.config.iteration_pause.is_zero() {
                tokio::time::sleep(self.config.iteration_pause).await;
            }
        };

        if context.validation().is_none() {
            context = self.validate(context).await;
        }
        let satisfied = self.policy.evaluate_criteria(&context);
        context = context.apply(ResearchEvent::CriteriaEvaluated(satisfied));

        let research_complete = self.policy.meets_basic_completion(&context);
        tracing::info!(
            "Research on '{}' finished after {} iterations ({}), quality {:.2}",
            topic,
            iterations,
            terminal_reason,
            context.quality_score()
        );

        ResearchOutcome {
            research_complete,
            terminal_reason,
            iterations,
            quality_score: context.quality_score(),
            report: render_report(&context),
            context,
        }
    }

    async fn execute(&self, action: Action, context: ResearchContext) -> ResearchContext {
        match action {
            Action::ExecuteTask { task_id } => self.run_task(task_id, context).await,
            Action::DiscoverSources(strategy) => {
                let events = self.discover(&strategy, &context).await;
                context.apply_all(events)
            }
            Action::FetchContent { urls } => {
                let context = context.apply(ResearchEvent::FocusChanged(Focus::ContentAnalysis));
                let events = self.fetch_content(&urls).await;
                context.apply_all(events)
            }
            Action::ImproveQuality { issues } => {
                let events = self.improve_quality(&issues, &context).await;
                context.apply_all(events)
            }
            Action::FillGaps { gaps } => {
                let events = self.fill_gaps(&gaps, &context).await;
                context.apply_all(events)
            }
            Action::Synthesize => {
                let insights = synthesize_insights(context.sources(), context.insights());
                context.apply(ResearchEvent::InsightsSynthesized(insights))
            }
            Action::Complete { .. } => context,
        }
    }

    // ------------------------------------------------------------------
    // Capability calls
    // ------------------------------------------------------------------

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<Source>, CapabilityError> {
        let query = sanitize_query(query)?;
        let found = self.search.search(&query, clamp_results(max_results)).await?;
        tracing::info!("Search '{}' via {} returned {} sources", query, self.search.name(), found.len());

        let now = Utc::now();
        Ok(found
            .into_iter()
            .filter(Source::is_admissible)
            .map(|mut source| {
                source.provenance.query.get_or_insert_with(|| query.clone());
                source.provenance.retrieved_at.get_or_insert(now);
                source
            })
            .collect())
    }

    /// Fetch, summarize and analyse one document.
    async fn fetch_document(&self, url: &str, title: &str) -> Result<FetchedDocument, CapabilityError> {
        let text = self.fetcher.fetch_text(url).await?;
        let summary = self.summarize(title, &text).await;
        Ok(FetchedDocument {
            url: url.to_string(),
            title: title.to_string(),
            analysis: analyze_content(&text, Some(summary)),
        })
    }

    /// Fetch up to `fan_out_limit` documents concurrently and wait for all.
    async fn fetch_documents(&self, targets: &[(String, String)]) -> Vec<Result<FetchedDocument, CapabilityError>> {
        let limit = self.config.fan_out_limit.max(1);
        if targets.len() > limit {
            tracing::debug!("Fetching {} of {} documents", limit, targets.len());
        }
        join_all(
            targets
                .iter()
                .take(limit)
                .map(|(url, title)| self.fetch_document(url, title)),
        )
        .await
    }

    async fn summarize(&self, title: &str, text: &str) -> String {
        if let Some(llm) = &self.llm {
            let excerpt: String = text.chars().take(SUMMARY_INPUT_CHARS).collect();
            let messages = [
                ChatMessage::system(
                    "You summarize theological and biblical scholarship accurately and concisely. \
                     Do not add facts that are not in the text.",
                ),
                ChatMessage::user(format!(
                    "Summarize the following document in at most three sentences.\n\nTitle: {}\n\n{}",
                    title, excerpt
                )),
            ];
            let options = ChatOptions::default().with_max_tokens(300);
            match llm.complete(&messages, &options).await {
                Ok(summary) if !summary.trim().is_empty() => return summary.trim().to_string(),
                Ok(_) => tracing::warn!("Model returned an empty summary for '{}'", title),
                Err(e) => tracing::warn!("Summarization of '{}' failed, using extract: {}", title, e),
            }
        }
        extractive_summary(text, EXTRACTIVE_SUMMARY_CHARS)
    }

    async fn write_synthesis(&self, topic: &str, context: &ResearchContext, insights: &Insights) -> String {
        if let Some(llm) = &self.llm {
            let mut sources = String::new();
            for (i, source) in context.sources().iter().enumerate() {
                let summary = source
                    .analysis
                    .as_ref()
                    .and_then(|a| a.summary.as_deref())
                    .unwrap_or(&source.description);
                sources.push_str(&format!("{}. {} ({})\n   {}\n", i + 1, source.title, source.url, summary));
            }
            let messages = [
                ChatMessage::system(
                    "You are a careful biblical scholar. Write a critical analysis using only the \
                     sources provided. Cite every factual claim with the source URL or an \
                     (Author, Year) reference.",
                ),
                ChatMessage::user(format!(
                    "Topic: {}\nMandate: {}\n\nSources:\n{}\nWrite the analysis in markdown.",
                    topic,
                    context.goal().mandate(),
                    sources
                )),
            ];
            match llm.complete(&messages, &ChatOptions::default()).await {
                Ok(text) if !text.trim().is_empty() => return text,
                Ok(_) => tracing::warn!("Model returned an empty synthesis"),
                Err(e) => tracing::warn!("Synthesis via model failed, using template: {}", e),
            }
        }
        template_synthesis(topic, context, insights)
    }

    async fn validate(&self, context: ResearchContext) -> ResearchContext {
        if context.sources().is_empty() && context.synthesis().is_none() {
            tracing::debug!("Nothing to validate yet");
            return context;
        }
        let content = validation_content(&context);
        let result = self
            .validator
            .hallucination_check(Some(context.graph_id()), &content, context.sources())
            .await;
        context.apply_all(validation_events(result))
    }

    // ------------------------------------------------------------------
    // Heuristic actions
    // ------------------------------------------------------------------

    async fn discover(&self, strategy: &DiscoveryStrategy, context: &ResearchContext) -> Vec<ResearchEvent> {
        let topic = context.goal().topic();
        match strategy {
            DiscoveryStrategy::BroadSearch { query } | DiscoveryStrategy::TargetedSearch { query } => {
                match self.search(query, DISCOVERY_RESULTS).await {
                    Ok(sources) => vec![ResearchEvent::SourcesDiscovered { sources }],
                    Err(e) => {
                        tracing::warn!("{} failed: {}", strategy.as_str(), e);
                        vec![ResearchEvent::AttemptFailed {
                            reason: format!("{}: {}", strategy.as_str(), e),
                        }]
                    }
                }
            }
            DiscoveryStrategy::PodcastSearch { query } => self.search_podcasts(query).await,
            DiscoveryStrategy::PerspectiveSearch { perspectives } => {
                let mut found = Vec::new();
                let mut failures = 0;
                for perspective in perspectives {
                    let query = format!("{} {} perspective theology", topic, perspective);
                    match self.search(&query, DISCOVERY_RESULTS).await {
                        Ok(sources) => found.extend(
                            sources
                                .into_iter()
                                .filter(|s| s.description_mentions(perspective)),
                        ),
                        Err(e) => {
                            tracing::warn!("Perspective search for {} failed: {}", perspective, e);
                            failures += 1;
                        }
                    }
                }
                if failures > 0 && failures == perspectives.len() {
                    return vec![ResearchEvent::AttemptFailed {
                        reason: "perspective_search: every search failed".to_string(),
                    }];
                }
                vec![ResearchEvent::SourcesDiscovered { sources: found }]
            }
        }
    }

    /// Look up episodes once. The search is marked done even when it fails
    /// so the policy does not retry it.
    async fn search_podcasts(&self, query: &str) -> Vec<ResearchEvent> {
        let Some(podcasts) = &self.podcasts else {
            return vec![
                ResearchEvent::PodcastsSearched { episodes: Vec::new() },
                ResearchEvent::AttemptFailed {
                    reason: "podcast_search: no podcast provider configured".to_string(),
                },
            ];
        };

        let result = match sanitize_query(query) {
            Ok(query) => podcasts.search_episodes(&query, PODCAST_RESULTS).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(episodes) => {
                tracing::info!("Podcast search via {} found {} episodes", podcasts.name(), episodes.len());
                let now = Utc::now();
                let episodes = episodes
                    .into_iter()
                    .map(|mut episode| {
                        episode.source_type = SourceType::Podcast;
                        episode.provenance.query.get_or_insert_with(|| query.to_string());
                        episode.provenance.retrieved_at.get_or_insert(now);
                        episode
                    })
                    .collect();
                vec![ResearchEvent::PodcastsSearched { episodes }]
            }
            Err(e) => {
                tracing::warn!("Podcast search failed: {}", e);
                vec![
                    ResearchEvent::PodcastsSearched { episodes: Vec::new() },
                    ResearchEvent::AttemptFailed {
                        reason: format!("podcast_search: {}", e),
                    },
                ]
            }
        }
    }

    async fn fetch_content(&self, urls: &[String]) -> Vec<ResearchEvent> {
        let targets: Vec<(String, String)> = urls.iter().map(|u| (u.clone(), u.clone())).collect();
        let results = self.fetch_documents(&targets).await;
        let attempted = results.len();

        let mut events = Vec::new();
        for result in results {
            match result {
                Ok(doc) => events.push(ResearchEvent::ContentAnalyzed {
                    url: doc.url,
                    analysis: doc.analysis,
                }),
                Err(e) => tracing::warn!("Content fetch failed: {}", e),
            }
        }
        if attempted > 0 && events.is_empty() {
            events.push(ResearchEvent::AttemptFailed {
                reason: format!("fetch_content: none of {} sources could be fetched", attempted),
            });
        }
        events
    }

    async fn improve_quality(&self, issues: &[QualityIssue], context: &ResearchContext) -> Vec<ResearchEvent> {
        let topic = context.goal().topic();
        let mut events = Vec::new();
        let mut failures = 0;

        for issue in issues {
            let (query, delta, label) = match issue {
                QualityIssue::LowAcademicRatio => {
                    (format!("{} academic scholarly journal", topic), 0.2, "academic")
                }
                QualityIssue::OutdatedSources => (format!("{} 2023 2024 recent", topic), 0.1, "recent"),
            };
            match self.search(&query, DISCOVERY_RESULTS).await {
                Ok(sources) => {
                    let note = format!("Added {} {} sources", sources.len(), label);
                    events.push(ResearchEvent::SourcesDiscovered { sources });
                    events.push(ResearchEvent::QualityImproved { delta, note });
                }
                Err(e) => {
                    tracing::warn!("Quality search for {} failed: {}", issue.as_str(), e);
                    failures += 1;
                }
            }
        }

        if failures > 0 && failures == issues.len() {
            events.push(ResearchEvent::AttemptFailed {
                reason: "improve_quality: every search failed".to_string(),
            });
        }
        events
    }

    async fn fill_gaps(&self, gaps: &[KnowledgeGap], context: &ResearchContext) -> Vec<ResearchEvent> {
        let topic = context.goal().topic();
        let mut events = Vec::new();
        let mut notes = Vec::new();

        for gap in gaps {
            let query = format!("{} {}", topic, gap.query_suffix());
            match self.search(&query, DISCOVERY_RESULTS).await {
                Ok(sources) => {
                    notes.push(format!("{}: {} sources", gap.as_str(), sources.len()));
                    events.push(ResearchEvent::SourcesDiscovered { sources });
                }
                Err(e) => tracing::warn!("Gap search for {} failed: {}", gap.as_str(), e),
            }
        }

        if notes.is_empty() && !gaps.is_empty() {
            events.push(ResearchEvent::AttemptFailed {
                reason: "fill_gaps: every search failed".to_string(),
            });
        } else {
            events.push(ResearchEvent::GapsFilled(notes));
        }
        events
    }

    // ------------------------------------------------------------------
    // Task graph execution
    // ------------------------------------------------------------------

    async fn run_task(&self, task_id: TaskId, context: ResearchContext) -> ResearchContext {
        let Some(task) = context
            .task_graph()
            .and_then(|graph| graph.task(task_id.as_str()))
            .cloned()
        else {
            return context.apply(ResearchEvent::AttemptFailed {
                reason: format!("unknown task {}", task_id),
            });
        };

        let context = context.apply(ResearchEvent::TaskStarted {
            task_id: task_id.clone(),
            at: Utc::now(),
        });
        tracing::info!("Executing task {} ({})", task_id, task.tool());

        match self.execute_task(&task, &context).await {
            Ok(output) => {
                tracing::info!("Task {} completed", task_id);
                context.apply_all(output.events).apply(ResearchEvent::TaskCompleted {
                    task_id,
                    result: output.result,
                    at: Utc::now(),
                })
            }
            Err(e) => {
                tracing::warn!("Task {} failed: {:#}", task_id, e);
                context.apply(ResearchEvent::TaskFailed {
                    task_id,
                    error: format!("{:#}", e),
                    at: Utc::now(),
                })
            }
        }
    }

    async fn execute_task(&self, task: &Task, context: &ResearchContext) -> anyhow::Result<TaskOutput> {
        match task.tool() {
            TaskTool::WebSearch => self.task_web_search(task).await,
            TaskTool::GetPdf => self.task_get_pdf(task, context).await,
            TaskTool::ExtractMetadata => task_extract_metadata(task, context),
            TaskTool::SynthesizeResearch => self.task_synthesize(task, context).await,
            TaskTool::HallucinationCheck => self.task_hallucination_check(task, context).await,
            TaskTool::SaveNote => self.task_save_note(task, context).await,
        }
    }

    async fn task_web_search(&self, task: &Task) -> anyhow::Result<TaskOutput> {
        let query = task
            .arg_str("query")
            .ok_or_else(|| anyhow!("missing 'query' argument"))?;
        let max_results = task
            .arg_u64("max_results")
            .map(|n| n as usize)
            .unwrap_or(DEFAULT_TASK_RESULTS);

        let sources = self.search(query, max_results).await?;
        let result = serde_json::to_value(&sources)?;
        Ok(TaskOutput::new(result).with_events(vec![ResearchEvent::SourcesDiscovered { sources }]))
    }

    async fn task_get_pdf(&self, task: &Task, context: &ResearchContext) -> anyhow::Result<TaskOutput> {
        let candidates = upstream::<Vec<Source>>(context, task, "urls_from")
            .unwrap_or_else(|| context.sources().to_vec());
        let targets: Vec<(String, String)> = candidates
            .iter()
            .filter(|s| s.is_admissible())
            .map(|s| (s.url.clone(), s.title.clone()))
            .collect();

        let results = self.fetch_documents(&targets).await;
        let attempted = results.len();
        let documents: Vec<FetchedDocument> = results
            .into_iter()
            .filter_map(|r| r.map_err(|e| tracing::warn!("Document fetch failed: {}", e)).ok())
            .collect();

        if attempted > 0 && documents.is_empty() {
            bail!("none of the {} documents could be fetched", attempted);
        }
        tracing::info!("Fetched {} of {} documents", documents.len(), attempted);

        let events = documents
            .iter()
            .map(|doc| ResearchEvent::ContentAnalyzed {
                url: doc.url.clone(),
                analysis: doc.analysis.clone(),
            })
            .collect();
        Ok(TaskOutput::new(serde_json::to_value(&documents)?).with_events(events))
    }

    async fn task_synthesize(&self, task: &Task, context: &ResearchContext) -> anyhow::Result<TaskOutput> {
        let topic = task.arg_str("topic").unwrap_or(context.goal().topic());
        let insights = synthesize_insights(context.sources(), context.insights());
        let content = self.write_synthesis(topic, context, &insights).await;

        let result = json!({
            "content": content,
            "key_themes": insights.key_themes,
            "sources": context.sources().len(),
        });
        Ok(TaskOutput::new(result).with_events(vec![
            ResearchEvent::InsightsSynthesized(insights),
            ResearchEvent::SynthesisWritten(content),
        ]))
    }

    async fn task_hallucination_check(&self, task: &Task, context: &ResearchContext) -> anyhow::Result<TaskOutput> {
        let content = upstream::<Value>(context, task, "content_from")
            .and_then(|v| v.get("content").and_then(Value::as_str).map(str::to_string))
            .or_else(|| context.synthesis().map(str::to_string))
            .unwrap_or_else(|| validation_content(context));

        let result = self
            .validator
            .hallucination_check(Some(context.graph_id()), &content, context.sources())
            .await;
        let value = serde_json::to_value(&result)?;
        Ok(TaskOutput::new(value).with_events(validation_events(result)))
    }

    async fn task_save_note(&self, task: &Task, context: &ResearchContext) -> anyhow::Result<TaskOutput> {
        let fallback = format!("{}.md", safe_topic(context.goal().topic()));
        let requested = task.arg_str("filename").unwrap_or(&fallback);
        let filename = Path::new(requested)
            .file_name()
            .ok_or_else(|| anyhow!("invalid note filename '{}'", requested))?;
        let path = self.output_dir.join(filename);

        let report = render_report(context);
        tokio::fs::create_dir_all(&self.output_dir).await?;
        tokio::fs::write(&path, &report).await?;
        tracing::info!("Saved note to {}", path.display());

        Ok(TaskOutput::new(json!({
            "path": path.display().to_string(),
            "bytes": report.len(),
        })))
    }
}

/// Deserialize the result of the upstream task named by `task.args[key]`.
fn upstream<T: serde::de::DeserializeOwned>(context: &ResearchContext, task: &Task, key: &str) -> Option<T> {
    let id = task.arg_str(key)?;
    let value = context.task_graph()?.result_of(id)?;
    serde_json::from_value(value.clone()).ok()
}

fn task_extract_metadata(task: &Task, context: &ResearchContext) -> anyhow::Result<TaskOutput> {
    let documents = upstream::<Vec<FetchedDocument>>(context, task, "pdf_ids_from").unwrap_or_else(|| {
        context
            .sources()
            .iter()
            .filter_map(|s| {
                s.analysis.as_ref().map(|analysis| FetchedDocument {
                    url: s.url.clone(),
                    title: s.title.clone(),
                    analysis: analysis.clone(),
                })
            })
            .collect()
    });

    let mut citations = Vec::new();
    let mut references = Vec::new();
    for doc in &documents {
        let mut text = doc.analysis.excerpt.clone();
        if let Some(summary) = &doc.analysis.summary {
            text.push(' ');
            text.push_str(summary);
        }
        citations.extend(extract_citations(&text).into_iter().map(|c| c.text));
        references.extend(doc.analysis.biblical_references.iter().cloned());
    }
    references.sort();
    references.dedup();

    tracing::info!(
        "Extracted {} citations from {} documents",
        citations.len(),
        documents.len()
    );
    Ok(TaskOutput::new(json!({
        "processed_documents": documents.iter().map(|d| &d.url).collect::<Vec<_>>(),
        "extracted_citations": citations,
        "biblical_references": references,
    })))
}

fn validation_events(result: ValidationResult) -> Vec<ResearchEvent> {
    let passed = result.validation_passed;
    let mut events = vec![ResearchEvent::ValidationRecorded(result)];
    if passed {
        events.push(ResearchEvent::QualityImproved {
            delta: VALIDATION_BONUS,
            note: "Validation passed".to_string(),
        });
    }
    events
}

/// Text scored by periodic validation: synthesis (or mandate), themes and sources.
pub fn validation_content(context: &ResearchContext) -> String {
    let goal = context.goal();
    let mut content = format!("# Research on {}\n\n", goal.topic());
    content.push_str(&format!(
        "## Summary\n{}\n\n",
        context.synthesis().unwrap_or(goal.mandate())
    ));

    let themes = &context.insights().key_themes;
    if !themes.is_empty() {
        content.push_str("## Key Themes\n");
        for (theme, count) in themes {
            content.push_str(&format!("- {}: {} sources\n", theme, count));
        }
    }

    content.push_str("\n## Sources\n");
    for (i, source) in context.sources().iter().enumerate() {
        content.push_str(&format!("{}. {} - {}\n", i + 1, source.title, source.url));
    }
    content
}

fn template_synthesis(topic: &str, context: &ResearchContext, insights: &Insights) -> String {
    let mut text = format!("## Critical Analysis: {}\n\n", topic);

    if insights.key_themes.is_empty() {
        text.push_str("No recurring themes were identified in the collected sources.\n\n");
    } else {
        let themes: Vec<String> = insights
            .key_themes
            .iter()
            .map(|(theme, count)| format!("{} ({})", theme.replace('_', " "), count))
            .collect();
        text.push_str(&format!("Recurring themes: {}.\n\n", themes.join(", ")));
    }

    for source in context.sources() {
        let summary = source
            .analysis
            .as_ref()
            .and_then(|a| a.summary.as_deref())
            .filter(|s| !s.is_empty())
            .unwrap_or(&source.description);
        text.push_str(&format!("- {}: {} See {}\n", source.title, summary.trim(), source.url));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{GraphStatus, TaskStatus};
    use crate::testing::{FakeFetcher, FakeLlm, FakePodcasts, FakeSearch, FakeUrlValidator};
    use crate::validation::{InMemoryValidationStore, ValidationStore};
    use std::time::Duration;

    const PAGE: &str = "Genesis 1:1-3 opens with creation. The covenant theme recurs, and \
                        scholars read grace and redemption in the historical context of the text.";

    fn config(max_iterations: usize, use_task_graph: bool) -> ResearchConfig {
        ResearchConfig {
            max_iterations,
            use_task_graph,
            iteration_pause: Duration::ZERO,
            ..ResearchConfig::default()
        }
    }

    fn goal() -> ResearchGoal {
        ResearchGoal::builder("Genesis 1").build().unwrap()
    }

    fn agent(search: FakeSearch, fetcher: FakeFetcher) -> ResearchAgent {
        ResearchAgent::new(
            Arc::new(search),
            Arc::new(fetcher),
            CitationValidator::new(Arc::new(FakeUrlValidator::accessible(&[]))),
        )
    }

    #[tokio::test]
    async fn default_graph_runs_every_task() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(InMemoryValidationStore::new());
        let validator = CitationValidator::new(Arc::new(FakeUrlValidator::accessible(&[])))
            .with_store(store.clone());
        let cfg = ResearchConfig {
            // unreachable, so the whole graph executes
            min_satisfied_criteria: 6,
            ..config(7, true)
        };
        let agent = ResearchAgent::new(
            Arc::new(FakeSearch::returning("web", 5)),
            Arc::new(FakeFetcher::serving(PAGE)),
            validator,
        )
        .with_config(cfg)
        .with_output_dir(dir.path());

        let outcome = agent.conduct_research(goal()).await;

        assert_eq!(outcome.terminal_reason, TerminalReason::MaxIterations);
        assert_eq!(outcome.iterations, 7);
        let graph = outcome.context.task_graph().unwrap();
        assert!(graph.all_completed());
        assert_eq!(graph.status(), GraphStatus::Completed);

        // 5 primary + 3 secondary results
        assert_eq!(outcome.context.sources().len(), 8);
        assert_eq!(outcome.context.processed_source_count(), 5);
        assert!(outcome.context.synthesis().is_some());

        let path = graph.result_of("FINAL_REPORT").unwrap()["path"].as_str().unwrap();
        assert!(path.ends_with("Genesis_1.md"));
        let note = std::fs::read_to_string(path).unwrap();
        assert!(note.starts_with("# Research Report: Genesis 1"));

        let citations = graph.result_of("EXTRACT_CITATIONS").unwrap();
        assert_eq!(citations["biblical_references"], serde_json::json!(["Genesis 1:1-3"]));

        let stored = store.load(outcome.context.graph_id()).await.unwrap();
        assert!(stored.is_some());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn total_failure_still_reports() {
        let agent = agent(FakeSearch::failing("web"), FakeFetcher::failing()).with_config(config(25, true));

        let outcome = agent.conduct_research(goal()).await;

        assert_eq!(
            outcome.terminal_reason,
            TerminalReason::Policy(CompletionReason::MaxAttemptsReached)
        );
        assert!(!outcome.research_complete);
        assert_eq!(outcome.context.failed_attempts(), 5);
        let graph = outcome.context.task_graph().unwrap();
        assert_eq!(graph.task("SEARCH_PRIMARY").unwrap().status(), TaskStatus::Failed);
        assert_eq!(graph.status(), GraphStatus::Failed);
        assert!(outcome.report.contains("No sources were found."));
    }

    #[tokio::test]
    async fn heuristic_run_is_bounded_and_capped() {
        let goal = ResearchGoal::builder("Genesis 1")
            .min_sources(5)
            .max_sources(8)
            .build()
            .unwrap();
        let search = Arc::new(
            FakeSearch::returning("web", 10).with_description("academic evangelical orthodox progressive"),
        );
        let agent = ResearchAgent::new(
            search.clone(),
            Arc::new(FakeFetcher::serving(PAGE)),
            CitationValidator::new(Arc::new(FakeUrlValidator::accessible(&[]))),
        )
        .with_config(config(10, false));

        let outcome = agent.conduct_research(goal).await;

        assert!(outcome.iterations <= 10);
        assert_eq!(outcome.context.sources().len(), 8);
        assert!(outcome.context.processed_source_count() > 0);
        assert!(outcome.context.task_graph().is_none());
        assert!(outcome.validation().is_some());
        assert!(search.calls() >= 1);
        assert!((0.0..=1.0).contains(&outcome.quality_score));
    }

    #[tokio::test]
    async fn podcasts_are_searched_first_for_biblical_topics() {
        let search = Arc::new(FakeSearch::returning("web", 2));
        let podcasts = Arc::new(FakePodcasts::returning(3));
        let agent = ResearchAgent::new(
            search.clone(),
            Arc::new(FakeFetcher::serving(PAGE)),
            CitationValidator::new(Arc::new(FakeUrlValidator::accessible(&[]))),
        )
        .with_podcasts(podcasts.clone())
        .with_config(config(1, false));

        let outcome = agent.conduct_research(goal()).await;

        assert_eq!(podcasts.calls(), 1);
        assert_eq!(search.calls(), 0);
        assert!(outcome.context.podcasts_searched());
        let sources = outcome.context.sources();
        assert_eq!(sources.len(), 3);
        assert!(sources.iter().all(|s| s.source_type == SourceType::Podcast));
        assert_eq!(sources[0].provenance.query.as_deref(), Some("Genesis 1"));
        assert!(outcome.report.contains("## Recommended Podcast Episodes"));
    }

    #[tokio::test]
    async fn failed_podcast_search_is_not_repeated() {
        let search = Arc::new(FakeSearch::returning("web", 2));
        let podcasts = Arc::new(FakePodcasts::failing());
        let agent = ResearchAgent::new(
            search.clone(),
            Arc::new(FakeFetcher::serving(PAGE)),
            CitationValidator::new(Arc::new(FakeUrlValidator::accessible(&[]))),
        )
        .with_podcasts(podcasts.clone())
        .with_config(config(3, false));

        let outcome = agent.conduct_research(goal()).await;

        assert_eq!(podcasts.calls(), 1);
        assert!(search.calls() >= 1);
        assert!(outcome.context.failed_attempts() >= 1);
        assert!(!outcome.context.sources().iter().any(|s| s.is_podcast()));
    }

    #[tokio::test]
    async fn iteration_cap_ends_the_run() {
        let agent = agent(FakeSearch::returning("web", 0), FakeFetcher::failing()).with_config(config(2, false));

        let outcome = agent.conduct_research(goal()).await;

        assert_eq!(outcome.terminal_reason, TerminalReason::MaxIterations);
        assert_eq!(outcome.iterations, 2);
        assert!(outcome.context.sources().is_empty());
        // nothing to validate
        assert!(outcome.validation().is_none());
        assert_eq!(outcome.context.action_history().len(), 2);
    }

    #[tokio::test]
    async fn model_summaries_are_used() {
        let llm = Arc::new(FakeLlm::replying("A concise summary."));
        let cfg = ResearchConfig {
            default_template: "quick_survey".to_string(),
            ..config(2, true)
        };
        let agent = agent(FakeSearch::returning("web", 5), FakeFetcher::serving(PAGE))
            .with_llm(llm.clone())
            .with_config(cfg);

        let outcome = agent.conduct_research(goal()).await;

        assert_eq!(llm.calls(), 5);
        for source in outcome.context.sources() {
            let summary = source.analysis.as_ref().and_then(|a| a.summary.as_deref());
            assert_eq!(summary, Some("A concise summary."));
        }
    }

    #[tokio::test]
    async fn failing_model_falls_back_to_extract() {
        let cfg = ResearchConfig {
            default_template: "quick_survey".to_string(),
            ..config(2, true)
        };
        let agent = agent(FakeSearch::returning("web", 2), FakeFetcher::serving(PAGE))
            .with_llm(Arc::new(FakeLlm::failing()))
            .with_config(cfg);

        let outcome = agent.conduct_research(goal()).await;

        let expected = extractive_summary(PAGE, EXTRACTIVE_SUMMARY_CHARS);
        let source = &outcome.context.sources()[0];
        assert_eq!(
            source.analysis.as_ref().and_then(|a| a.summary.clone()),
            Some(expected)
        );
    }

    #[tokio::test]
    async fn partial_fetch_failure_keeps_the_rest() {
        let search = FakeSearch::returning("web", 2);
        let url = "https://web.example/genesis-1-overview-scholarship/0";
        let cfg = ResearchConfig {
            default_template: "quick_survey".to_string(),
            ..config(2, true)
        };
        let agent = agent(search, FakeFetcher::pages(&[(url, PAGE)])).with_config(cfg);

        let outcome = agent.conduct_research(goal()).await;

        let graph = outcome.context.task_graph().unwrap();
        assert_eq!(graph.task("FETCH").unwrap().status(), TaskStatus::Completed);
        assert_eq!(outcome.context.processed_source_count(), 1);
        assert_eq!(outcome.context.failed_attempts(), 0);
    }

    #[tokio::test]
    async fn fill_gaps_notes_each_gap() {
        let agent = agent(FakeSearch::returning("web", 2), FakeFetcher::failing());
        let ctx = ResearchContext::new(goal());

        let events = agent.fill_gaps(&KnowledgeGap::ALL, &ctx).await;

        let notes = events.iter().find_map(|e| match e {
            ResearchEvent::GapsFilled(notes) => Some(notes.clone()),
            _ => None,
        });
        assert_eq!(
            notes.unwrap(),
            vec![
                "historical_context: 2 sources".to_string(),
                "theological_analysis: 2 sources".to_string(),
                "scholarly_consensus: 2 sources".to_string(),
            ]
        );
    }

    #[test]
    fn validation_content_lists_sources() {
        let ctx = ResearchContext::new(goal()).apply(ResearchEvent::SourcesDiscovered {
            sources: vec![Source::new("Creation Study", "https://c.example", "")],
        });
        let content = validation_content(&ctx);
        assert!(content.starts_with("# Research on Genesis 1"));
        assert!(content.contains("Survey scholarly perspectives on Genesis 1"));
        assert!(content.contains("1. Creation Study - https://c.example"));
    }
}
