//! Context sections and their collection from the business catalog.

use crate::token::count_tokens;
use querylens_core::scoring::clamp_unit;
use querylens_core::{
    BusinessContextProfile, BusinessRule, ColumnInfo, ContextCategory, GlossaryTerm,
    MetadataService, QueryExample, TableInfo,
};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{debug, warn};

const DEFAULT_TOP_K: usize = 8;
const RULE_RELEVANCE: f64 = 0.5;
const DOMAIN_RULE_RELEVANCE: f64 = 0.8;
const GLOSSARY_RELEVANCE: f64 = 0.5;
const FOCUS_GLOSSARY_RELEVANCE: f64 = 0.7;

/// One pre-rendered fragment of supporting context with a known token cost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSection {
    pub category: ContextCategory,
    pub title: String,
    pub content: String,
    pub token_count: usize,
    /// Relevance in [0, 1].
    pub relevance_score: f64,
}

impl ContextSection {
    /// Build a section, counting tokens with the category's content type.
    pub fn new(
        category: ContextCategory,
        title: impl Into<String>,
        content: impl Into<String>,
        relevance_score: f64,
    ) -> Self {
        let title = title.into();
        let content = content.into();
        let token_count = count_tokens(&title, category.content_type())
            + count_tokens(&content, category.content_type());
        Self {
            category,
            title,
            content,
            token_count,
            relevance_score: clamp_unit(relevance_score),
        }
    }

    /// A copy with a different relevance.
    pub fn rescored(&self, relevance_score: f64) -> Self {
        Self {
            relevance_score: clamp_unit(relevance_score),
            ..self.clone()
        }
    }

    pub fn render(&self) -> String {
        format!("### {}\n{}", self.title, self.content.trim_end())
    }
}

/// Schema supplied by the caller alongside the question. Empty when the
/// caller relies on the catalog alone.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaContext {
    #[serde(default)]
    pub tables: Vec<TableInfo>,
    #[serde(default)]
    pub columns: Vec<ColumnInfo>,
}

impl SchemaContext {
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty() && self.columns.is_empty()
    }
}

/// Gathers candidate sections for a profile from the caller's schema and
/// the metadata service.
pub struct ContextCollector {
    metadata: Option<Arc<dyn MetadataService>>,
    top_k: usize,
}

impl ContextCollector {
    pub fn new() -> Self {
        Self {
            metadata: None,
            top_k: DEFAULT_TOP_K,
        }
    }

    pub fn with_metadata(mut self, metadata: Arc<dyn MetadataService>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    /// Collect every candidate section. Catalog failures drop that
    /// category's sections and are logged.
    pub async fn collect(
        &self,
        profile: &BusinessContextProfile,
        schema: &SchemaContext,
    ) -> Vec<ContextSection> {
        let mut tables = schema.tables.clone();
        let mut columns = schema.columns.clone();
        let mut glossary = Vec::new();
        let mut examples = Vec::new();
        let mut rules = Vec::new();

        if let Some(metadata) = &self.metadata {
            let focus = profile.focus_terms();
            let (found_tables, found_glossary, found_examples, found_rules) = tokio::join!(
                metadata.find_relevant_tables(profile, self.top_k),
                metadata.find_relevant_glossary_terms(&focus),
                metadata.find_query_examples(profile, self.top_k),
                metadata.find_business_rules(profile),
            );

            for table in or_empty("tables", found_tables) {
                if !tables.iter().any(|t| t.id == table.id) {
                    tables.push(table);
                }
            }
            glossary = or_empty("glossary", found_glossary);
            examples = or_empty("examples", found_examples);
            rules = or_empty("rules", found_rules);

            let table_ids: Vec<String> = tables.iter().map(|t| t.id.clone()).collect();
            if !table_ids.is_empty() {
                let found = metadata.find_relevant_columns(&table_ids, profile).await;
                for column in or_empty("columns", found) {
                    if !columns
                        .iter()
                        .any(|c| c.table_id == column.table_id && c.name == column.name)
                    {
                        columns.push(column);
                    }
                }
            }
        }

        let mut sections: Vec<ContextSection> = tables
            .iter()
            .map(|t| table_section(t, &columns))
            .collect();
        sections.push(business_section(profile));
        sections.extend(examples.iter().map(example_section));
        sections.extend(rules.iter().map(|r| rule_section(r, &profile.domain.name)));
        let focus = profile.focus_terms();
        sections.extend(glossary.iter().map(|g| glossary_section(g, &focus)));

        debug!(
            analysis_id = %profile.analysis_id,
            sections = sections.len(),
            tables = tables.len(),
            "Collected context sections"
        );
        sections
    }
}

impl Default for ContextCollector {
    fn default() -> Self {
        Self::new()
    }
}

fn or_empty<T, E: std::fmt::Display>(what: &str, found: Result<Vec<T>, E>) -> Vec<T> {
    found.unwrap_or_else(|e| {
        warn!(lookup = what, error = %e, "Catalog lookup failed, continuing without it");
        Vec::new()
    })
}

fn table_section(table: &TableInfo, columns: &[ColumnInfo]) -> ContextSection {
    let mut content = String::new();
    if !table.description.is_empty() {
        let _ = writeln!(content, "{}", table.description);
    }
    if !table.business_purpose.is_empty() {
        let _ = writeln!(content, "Purpose: {}", table.business_purpose);
    }
    let table_columns: Vec<&ColumnInfo> = columns
        .iter()
        .filter(|c| c.table_id == table.id)
        .collect();
    if !table_columns.is_empty() {
        content.push_str("Columns:\n");
        for column in table_columns {
            let _ = write!(content, "- {}", column.name);
            if !column.data_type.is_empty() {
                let _ = write!(content, " ({})", column.data_type);
            }
            if !column.description.is_empty() {
                let _ = write!(content, ": {}", column.description);
            }
            content.push('\n');
        }
    }
    ContextSection::new(
        ContextCategory::Schema,
        format!("Table {}", table.name),
        content,
        table.relevance,
    )
}

fn business_section(profile: &BusinessContextProfile) -> ContextSection {
    let domain = &profile.domain;
    let mut content = format!("Domain: {}\n", domain.name);
    if !domain.description.is_empty() {
        let _ = writeln!(content, "{}", domain.description);
    }
    if !domain.key_concepts.is_empty() {
        let _ = writeln!(content, "Key concepts: {}", domain.key_concepts.join(", "));
    }
    if !domain.related_tables.is_empty() {
        let _ = writeln!(content, "Related tables: {}", domain.related_tables.join(", "));
    }
    let _ = writeln!(
        content,
        "Intent: {} ({:.2})",
        profile.intent.intent_type, profile.intent.confidence
    );
    if !profile.entities.is_empty() {
        let entities: Vec<String> = profile
            .entities
            .iter()
            .map(|e| match &e.mapped_table {
                Some(table) => format!("{} ({}, {})", e.name, e.entity_type, table),
                None => format!("{} ({})", e.name, e.entity_type),
            })
            .collect();
        let _ = writeln!(content, "Entities: {}", entities.join(", "));
    }
    if let Some(range) = &profile.time_range {
        let _ = writeln!(
            content,
            "Time range: {} = [{}, {})",
            range.relative_expression,
            range.start.format("%Y-%m-%d %H:%M"),
            range.end.format("%Y-%m-%d %H:%M")
        );
    }
    ContextSection::new(
        ContextCategory::BusinessContext,
        format!("{} context", domain.name),
        content,
        domain.relevance_score.max(profile.confidence),
    )
}

fn example_section(example: &QueryExample) -> ContextSection {
    ContextSection::new(
        ContextCategory::Examples,
        example.question.clone(),
        format!("```sql\n{}\n```", example.sql.trim()),
        example.relevance,
    )
}

fn rule_section(rule: &BusinessRule, domain: &str) -> ContextSection {
    let relevance = match &rule.domain {
        Some(d) if d.eq_ignore_ascii_case(domain) => DOMAIN_RULE_RELEVANCE,
        _ => RULE_RELEVANCE,
    };
    ContextSection::new(
        ContextCategory::Rules,
        rule.name.clone(),
        rule.description.clone(),
        relevance,
    )
}

fn glossary_section(term: &GlossaryTerm, focus: &[String]) -> ContextSection {
    let named = |t: &str| focus.iter().any(|f| f.eq_ignore_ascii_case(t));
    let relevance = if named(&term.term) || term.synonyms.iter().any(|s| named(s)) {
        FOCUS_GLOSSARY_RELEVANCE
    } else {
        GLOSSARY_RELEVANCE
    };
    let mut content = term.definition.clone();
    if !term.synonyms.is_empty() {
        let _ = write!(content, "\nAlso called: {}", term.synonyms.join(", "));
    }
    ContextSection::new(ContextCategory::Glossary, term.term.clone(), content, relevance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::profile;
    use async_trait::async_trait;
    use querylens_core::{IntentType, MetadataError};
    use querylens_memory::InMemoryCatalog;

    const Q: &str = "What is the total deposit amount for UK players last month?";

    struct BrokenCatalog;

    #[async_trait]
    impl MetadataService for BrokenCatalog {
        async fn find_relevant_tables(
            &self,
            _profile: &BusinessContextProfile,
            _top_k: usize,
        ) -> Result<Vec<TableInfo>, MetadataError> {
            Err(MetadataError::Backend("connection refused".into()))
        }

        async fn find_relevant_columns(
            &self,
            _table_ids: &[String],
            _profile: &BusinessContextProfile,
        ) -> Result<Vec<ColumnInfo>, MetadataError> {
            Err(MetadataError::Backend("connection refused".into()))
        }

        async fn find_relevant_glossary_terms(
            &self,
            _terms: &[String],
        ) -> Result<Vec<GlossaryTerm>, MetadataError> {
            Err(MetadataError::Backend("connection refused".into()))
        }
    }

    #[test]
    fn section_counts_title_and_content() {
        let s = ContextSection::new(ContextCategory::Glossary, "GGR", "Gross gaming revenue", 1.4);
        assert_eq!(s.token_count, 4);
        assert_eq!(s.relevance_score, 1.0);
        assert_eq!(s.rescored(0.2).relevance_score, 0.2);
        assert!(s.render().starts_with("### GGR\n"));
    }

    #[tokio::test]
    async fn caller_schema_without_catalog() {
        let schema = SchemaContext {
            tables: vec![TableInfo {
                id: "t1".into(),
                name: "deposits".into(),
                description: "Deposits".into(),
                domain: None,
                business_purpose: String::new(),
                relevance: 0.9,
            }],
            columns: vec![ColumnInfo {
                table_id: "t1".into(),
                name: "amount".into(),
                data_type: "decimal".into(),
                description: "Deposit amount".into(),
                relevance: 0.0,
            }],
        };
        let p = profile(Q, IntentType::Aggregation, "Banking");
        let sections = ContextCollector::new().collect(&p, &schema).await;

        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].title, "Table deposits");
        assert!(sections[0].content.contains("- amount (decimal): Deposit amount"));
        assert_eq!(sections[1].category, ContextCategory::BusinessContext);
        assert!(sections[1].content.contains("Domain: Banking"));
    }

    #[tokio::test]
    async fn catalog_contributes_every_category() {
        let p = profile(Q, IntentType::Aggregation, "Banking");
        let sections = ContextCollector::new()
            .with_metadata(Arc::new(InMemoryCatalog::sample()))
            .collect(&p, &SchemaContext::default())
            .await;

        for category in [
            ContextCategory::Schema,
            ContextCategory::BusinessContext,
            ContextCategory::Examples,
            ContextCategory::Rules,
            ContextCategory::Glossary,
        ] {
            assert!(
                sections.iter().any(|s| s.category == category),
                "missing {category}"
            );
        }
        assert!(sections.iter().any(|s| s.title == "Table deposits"));
    }

    #[tokio::test]
    async fn catalog_failure_leaves_business_context() {
        let p = profile(Q, IntentType::Aggregation, "Banking");
        let sections = ContextCollector::new()
            .with_metadata(Arc::new(BrokenCatalog))
            .collect(&p, &SchemaContext::default())
            .await;
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].category, ContextCategory::BusinessContext);
    }
}
