//! `querylens analyze`: print the business-context profile for a question.

use super::Pipeline;
use querylens_core::BusinessContextProfile;
use std::path::Path;

pub async fn run(question: &str, user: &str, catalog: Option<&Path>, json: bool) -> anyhow::Result<()> {
    let pipeline = Pipeline::load(catalog)?;
    let profile = pipeline.analyzer.analyze_question(question, user).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&profile)?);
    } else {
        print!("{}", render(&profile));
    }
    Ok(())
}

/// Human-readable summary of a profile.
pub fn render(profile: &BusinessContextProfile) -> String {
    let mut out = String::new();
    out.push_str(&format!("Question:    {}\n", profile.question));
    out.push_str(&format!(
        "Intent:      {} ({:.2})\n",
        profile.intent.intent_type, profile.intent.confidence
    ));
    out.push_str(&format!(
        "Domain:      {} ({:.2})\n",
        profile.domain.name, profile.domain.relevance_score
    ));
    out.push_str(&format!("Confidence:  {:.2}\n", profile.confidence));

    if let Some(range) = &profile.time_range {
        out.push_str(&format!(
            "Time range:  {} .. {} ({:?}, \"{}\")\n",
            range.start.format("%Y-%m-%d %H:%M"),
            range.end.format("%Y-%m-%d %H:%M"),
            range.granularity,
            range.relative_expression
        ));
    }

    if profile.entities.is_empty() {
        out.push_str("Entities:    none\n");
    } else {
        out.push_str("Entities:\n");
        for entity in &profile.entities {
            out.push_str(&format!(
                "  - {} [{}] {:.2} via {}",
                entity.name, entity.entity_type, entity.confidence, entity.extraction_method
            ));
            if let Some(table) = &entity.mapped_table {
                out.push_str(&format!(" -> {table}"));
            }
            out.push('\n');
        }
    }

    if !profile.business_terms.is_empty() {
        let terms: Vec<String> = profile
            .business_terms
            .iter()
            .map(|t| match profile.term_relevance.get(t) {
                Some(score) => format!("{t} ({score:.2})"),
                None => t.clone(),
            })
            .collect();
        out.push_str(&format!("Terms:       {}\n", terms.join(", ")));
    }

    if !profile.flags.is_empty() {
        let flags: Vec<String> = profile.flags.iter().map(|f| format!("{f:?}")).collect();
        out.push_str(&format!("Flags:       {}\n", flags.join(", ")));
    }
    out
}
