//! Markdown report of a research run.

use crate::agents::ResearchContext;
use crate::task::TaskStatus;

/// Render the context as a markdown report.
///
/// Every run gets a report, including runs that found nothing.
pub fn render_report(context: &ResearchContext) -> String {
    let goal = context.goal();
    let mut out = format!("# Research Report: {}\n\n", goal.topic());

    out.push_str(&format!("**Research Mandate**: {}\n\n", goal.mandate()));
    out.push_str(&format!("**Quality Score**: {:.2}\n\n", context.quality_score()));
    out.push_str(&format!("**Sources Found**: {}\n\n", context.sources().len()));

    if let Some(graph) = context.task_graph() {
        out.push_str(&format!(
            "**Task Graph**: {} of {} tasks completed ({} failed)\n\n",
            graph.count_with_status(TaskStatus::Completed),
            graph.tasks().len(),
            graph.count_with_status(TaskStatus::Failed),
        ));
    }

    if let Some(validation) = context.validation() {
        let verdict = if validation.validation_passed { "Passed" } else { "Issues Found" };
        out.push_str(&format!("**Validation**: {}\n\n", verdict));
    }

    if let Some(synthesis) = context.synthesis() {
        out.push_str(&format!("## Analysis\n\n{}\n\n", synthesis.trim()));
    }

    let insights = context.insights();
    if !insights.key_themes.is_empty() {
        out.push_str("## Key Insights\n");
        for (theme, count) in &insights.key_themes {
            out.push_str(&format!("- **{}**: {} sources\n", title_case(theme), count));
        }
        out.push('\n');
    }

    if !insights.perspectives.is_empty() {
        out.push_str("## Perspectives\n");
        for (perspective, count) in &insights.perspectives {
            out.push_str(&format!("- {}: {}\n", perspective, count));
        }
        out.push('\n');
    }

    if !insights.biblical_references.is_empty() {
        out.push_str(&format!(
            "## Biblical References\n{}\n\n",
            insights.biblical_references.join(", ")
        ));
    }

    out.push_str("## Sources\n");
    if context.sources().is_empty() {
        out.push_str("No sources were found.\n");
    }
    for (i, source) in context.sources().iter().enumerate() {
        let marker = if source.is_content_processed() { " (analysed)" } else { "" };
        out.push_str(&format!("{}. [{}]({}){}\n", i + 1, source.title, source.url, marker));
    }

    let episodes: Vec<_> = context.sources().iter().filter(|s| s.is_podcast()).collect();
    if !episodes.is_empty() {
        out.push_str("\n## Recommended Podcast Episodes\n");
        for episode in episodes {
            let show = episode
                .provenance
                .publisher
                .as_deref()
                .map(|name| format!(" ({})", name))
                .unwrap_or_default();
            out.push_str(&format!("- [{}]({}){}\n", episode.title, episode.url, show));
            if !episode.description.is_empty() {
                out.push_str(&format!("  {}\n", episode.description));
            }
        }
    }

    if let Some(validation) = context.validation() {
        out.push_str("\n## Validation Results\n");
        out.push_str(&format!(
            "- **Hallucination Risk**: {:.2}\n",
            validation.hallucination_risk
        ));
        out.push_str(&format!(
            "- **Citations Validated**: {} of {}\n",
            validation.citations.len() - validation.invalid_citation_count(),
            validation.citations.len()
        ));
        out.push_str(&format!(
            "- **Unsupported Claims**: {} of {}\n",
            validation.unsupported_claims.len(),
            validation.claims.len()
        ));
        for recommendation in &validation.recommendations {
            out.push_str(&format!("- {}\n", recommendation));
        }
    }

    out.push_str("\n## Completion Status\n");
    for criterion in goal.completion_criteria() {
        let done = context.completed_criteria().contains(criterion);
        out.push_str(&format!("- [{}] {}\n", if done { "x" } else { " " }, criterion));
    }

    if !context.scratchpad().is_empty() {
        out.push_str("\n## Agent Reasoning (Scratchpad)\n");
        for entry in context.scratchpad() {
            out.push_str(&format!(
                "{}. **{}**\n   - Action: {}\n   - Result: {}\n",
                entry.step, entry.thought, entry.action, entry.result
            ));
        }
    }

    out
}

fn title_case(snake: &str) -> String {
    snake
        .split('_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
