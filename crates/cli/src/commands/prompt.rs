//! `querylens prompt`: analyze a question and assemble its prompt.

use super::Pipeline;
use anyhow::bail;
use querylens_prompt::{ContextFeedback, FeedbackType, ProgressiveBuildResult, SchemaContext};
use std::path::PathBuf;

pub struct PromptOptions {
    pub user: String,
    pub catalog: Option<PathBuf>,
    pub max_tokens: Option<usize>,
    pub reserved: Option<usize>,
    pub feedback: Option<String>,
    pub trace: bool,
}

pub async fn run(question: &str, options: PromptOptions) -> anyhow::Result<()> {
    // Parse feedback before any work so a typo fails fast.
    let feedback = match options.feedback.as_deref() {
        Some(raw) => match FeedbackType::parse(raw) {
            Some(kind) => Some(ContextFeedback::new(kind)),
            None => bail!(
                "unknown feedback '{raw}' (expected too_much_context, too_little_context, \
                 irrelevant_context, missing_information or incorrect_sql)"
            ),
        },
        None => None,
    };

    let pipeline = Pipeline::load(options.catalog.as_deref())?;
    let budget = &pipeline.config.budget;
    let max_tokens = options.max_tokens.unwrap_or(budget.default_max_tokens);
    let reserved = options.reserved.unwrap_or(budget.default_reserved_tokens);

    let profile = pipeline
        .analyzer
        .analyze_question(question, &options.user)
        .await;
    let mut result = pipeline
        .prompts
        .build_prompt(question, &profile, &SchemaContext::default(), max_tokens, reserved)
        .await;

    if let Some(feedback) = feedback {
        let adapted = pipeline.prompts.adapt(question, &result, &feedback);
        eprintln!(
            "Adapted for {:?} ({:?}): {:+} tokens, added {:?}, removed {:?}",
            adapted.feedback_type,
            adapted.strategy,
            adapted.token_delta,
            adapted.sections_added,
            adapted.sections_removed
        );
        result = adapted.result;
    }

    println!("{}", result.prompt);
    if options.trace {
        eprint!("{}", summary(&result));
        eprintln!("{}", pipeline.counters.snapshot().to_json()?);
    }
    Ok(())
}

/// Budget usage and build trace, one line per step.
pub fn summary(result: &ProgressiveBuildResult) -> String {
    let mut out = format!(
        "\n{} tokens ({:.0}% of {} available){}\n",
        result.token_count,
        result.utilization * 100.0,
        result.budget.available_context_tokens,
        if result.budget.minimal { ", minimal budget" } else { "" }
    );
    for usage in &result.usage {
        out.push_str(&format!(
            "  {:<16} {:>5} / {:<5} ({}/{} sections)\n",
            usage.category.as_str(),
            usage.tokens,
            usage.budget,
            usage.sections_included,
            usage.sections_total
        ));
    }
    for step in &result.trace {
        out.push_str(&format!(
            "  {:?} {} \"{}\" {} tokens, relevance {:.2}\n",
            step.action, step.category, step.title, step.tokens, step.relevance
        ));
    }
    out
}
