//! Plan templates: named, static task graphs instantiated for a topic.
//!
//! String arguments may contain `{topic}` and `{safe_topic}` placeholders;
//! they are substituted when the plan is created.

use serde_json::{json, Map, Value};

use super::graph::ResearchGraph;
use super::task::{Task, TaskId, TaskTool};

/// Name of the template used when none (or an unknown one) is requested.
pub const DEFAULT_TEMPLATE: &str = "biblical_exegesis";

struct TemplateTask {
    id: &'static str,
    tool: TaskTool,
    args: fn() -> Value,
    depends_on: &'static [&'static str],
}

struct Template {
    name: &'static str,
    tasks: &'static [TemplateTask],
}

const BIBLICAL_EXEGESIS: Template = Template {
    name: "biblical_exegesis",
    tasks: &[
        TemplateTask {
            id: "SEARCH_PRIMARY",
            tool: TaskTool::WebSearch,
            args: || json!({"query": "{topic} scholarly exegesis 2020..2025", "max_results": 5}),
            depends_on: &[],
        },
        TemplateTask {
            id: "SEARCH_SECONDARY",
            tool: TaskTool::WebSearch,
            args: || json!({"query": "{topic} ancient near east context intertextuality", "max_results": 3}),
            depends_on: &["SEARCH_PRIMARY"],
        },
        TemplateTask {
            id: "FETCH_PDFS",
            tool: TaskTool::GetPdf,
            args: || json!({"urls_from": "SEARCH_PRIMARY"}),
            depends_on: &["SEARCH_PRIMARY", "SEARCH_SECONDARY"],
        },
        TemplateTask {
            id: "EXTRACT_CITATIONS",
            tool: TaskTool::ExtractMetadata,
            args: || json!({"pdf_ids_from": "FETCH_PDFS"}),
            depends_on: &["FETCH_PDFS"],
        },
        TemplateTask {
            id: "CRITICAL_ANALYSIS",
            tool: TaskTool::SynthesizeResearch,
            args: || json!({"sources_from": "EXTRACT_CITATIONS", "topic": "{topic}"}),
            depends_on: &["EXTRACT_CITATIONS"],
        },
        TemplateTask {
            id: "VALIDATE_CITATIONS",
            tool: TaskTool::HallucinationCheck,
            args: || json!({"content_from": "CRITICAL_ANALYSIS", "citations_from": "EXTRACT_CITATIONS"}),
            // EXTRACT_CITATIONS is reached through CRITICAL_ANALYSIS
            depends_on: &["CRITICAL_ANALYSIS"],
        },
        TemplateTask {
            id: "FINAL_REPORT",
            tool: TaskTool::SaveNote,
            args: || json!({"filename": "{safe_topic}.md", "content_from": "VALIDATE_CITATIONS"}),
            depends_on: &["VALIDATE_CITATIONS"],
        },
    ],
};

const QUICK_SURVEY: Template = Template {
    name: "quick_survey",
    tasks: &[
        TemplateTask {
            id: "SEARCH",
            tool: TaskTool::WebSearch,
            args: || json!({"query": "{topic} overview scholarship", "max_results": 5}),
            depends_on: &[],
        },
        TemplateTask {
            id: "FETCH",
            tool: TaskTool::GetPdf,
            args: || json!({"urls_from": "SEARCH"}),
            depends_on: &["SEARCH"],
        },
        TemplateTask {
            id: "SYNTHESIZE",
            tool: TaskTool::SynthesizeResearch,
            args: || json!({"sources_from": "FETCH", "topic": "{topic}"}),
            depends_on: &["FETCH"],
        },
        TemplateTask {
            id: "VALIDATE",
            tool: TaskTool::HallucinationCheck,
            args: || json!({"content_from": "SYNTHESIZE", "citations_from": "SEARCH"}),
            depends_on: &["SYNTHESIZE"],
        },
        TemplateTask {
            id: "REPORT",
            tool: TaskTool::SaveNote,
            args: || json!({"filename": "{safe_topic}_survey.md", "content_from": "VALIDATE"}),
            depends_on: &["VALIDATE"],
        },
    ],
};

const TEMPLATES: &[Template] = &[BIBLICAL_EXEGESIS, QUICK_SURVEY];

/// Turns a topic into a dependency graph from a named template.
#[derive(Debug, Clone, Default)]
pub struct TaskPlanner;

impl TaskPlanner {
    pub fn new() -> Self {
        Self
    }

    /// Names of all known templates.
    pub fn template_names() -> Vec<&'static str> {
        TEMPLATES.iter().map(|t| t.name).collect()
    }

    /// Instantiate `template` for `topic`.
    ///
    /// Unknown template names fall back to [`DEFAULT_TEMPLATE`]. Every call
    /// returns a graph with a fresh id and all tasks `Pending`.
    pub fn create_plan(&self, topic: &str, template: &str) -> ResearchGraph {
        let chosen = match TEMPLATES.iter().find(|t| t.name == template) {
            Some(t) => t,
            None => {
                tracing::warn!(
                    "Unknown plan template '{}', falling back to '{}'",
                    template,
                    DEFAULT_TEMPLATE
                );
                &TEMPLATES[0]
            }
        };

        let safe = safe_topic(topic);
        let tasks = chosen
            .tasks
            .iter()
            .map(|t| {
                let args = match substitute((t.args)(), topic, &safe) {
                    Value::Object(map) => map,
                    _ => Map::new(),
                };
                Task::new(
                    t.id,
                    t.tool,
                    args,
                    t.depends_on.iter().map(|d| TaskId::new(*d)).collect(),
                )
            })
            .collect();

        let graph = ResearchGraph::new(topic, tasks);
        if let Err(e) = graph.validate() {
            tracing::error!("Template '{}' produced an invalid graph: {}", chosen.name, e);
        }
        tracing::info!(
            "Planned '{}' graph {} with {} tasks for topic '{}'",
            chosen.name,
            graph.graph_id(),
            graph.tasks().len(),
            topic
        );
        graph
    }
}

/// Filename-safe form of a topic: ASCII alphanumerics, `-` and `_` are kept,
/// trailing whitespace dropped and inner spaces turned into underscores.
pub fn safe_topic(topic: &str) -> String {
    topic
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect::<String>()
        .trim_end()
        .replace(' ', "_")
}

fn substitute(value: Value, topic: &str, safe: &str) -> Value {
    match value {
        Value::String(s) => Value::String(s.replace("{topic}", topic).replace("{safe_topic}", safe)),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|v| substitute(v, topic, safe))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, substitute(v, topic, safe)))
                .collect(),
        ),
        other => other,
    }
}
