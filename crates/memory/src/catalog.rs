//! In-memory business catalog: tables, columns, glossary, worked examples
//! and business rules loaded from a TOML or JSON file.
//!
//! Relevance is keyword overlap between the profile's focus terms and the
//! catalog text, plus a bonus when the record belongs to the profile's
//! domain.

use async_trait::async_trait;
use querylens_core::text::{contains_phrase, is_stopword, words};
use querylens_core::{
    BusinessContextProfile, BusinessRule, ColumnInfo, Entity, EntityType, GlossaryTerm,
    MetadataError, MetadataService, QueryExample, SchemaLink, SchemaLinker, TableInfo,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

const SAMPLE_CATALOG: &str = include_str!("../defaults/catalog.toml");

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub tables: Vec<CatalogTable>,
    #[serde(default)]
    pub glossary: Vec<GlossaryTerm>,
    #[serde(default)]
    pub examples: Vec<QueryExample>,
    #[serde(default)]
    pub rules: Vec<BusinessRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogTable {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub business_purpose: String,
    #[serde(default)]
    pub columns: Vec<CatalogColumn>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogColumn {
    pub name: String,
    #[serde(default)]
    pub data_type: String,
    #[serde(default)]
    pub description: String,
}

impl CatalogTable {
    fn searchable_text(&self) -> String {
        let mut text = format!(
            "{} {} {}",
            self.name.replace('_', " "),
            self.description,
            self.business_purpose
        );
        for column in &self.columns {
            text.push(' ');
            text.push_str(&column.name.replace('_', " "));
        }
        text.to_lowercase()
    }

    fn to_info(&self, relevance: f64) -> TableInfo {
        TableInfo {
            id: self.id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            domain: self.domain.clone(),
            business_purpose: self.business_purpose.clone(),
            relevance,
        }
    }
}

pub struct InMemoryCatalog {
    catalog: Catalog,
}

impl InMemoryCatalog {
    pub fn new(catalog: Catalog) -> Self {
        Self { catalog }
    }

    /// The bundled sample catalog (banking and gaming tables).
    ///
    /// # Panics
    ///
    /// Panics if the embedded file is malformed, which is a build defect.
    pub fn sample() -> Self {
        let catalog = toml::from_str(SAMPLE_CATALOG)
            .unwrap_or_else(|e| panic!("embedded catalog.toml is invalid: {e}"));
        Self::new(catalog)
    }

    /// Load a catalog file; `.json` files are parsed as JSON, anything else as TOML.
    pub fn load_from(path: &Path) -> Result<Self, MetadataError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            MetadataError::Backend(format!("failed to read {}: {e}", path.display()))
        })?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let catalog: Catalog = if is_json {
            serde_json::from_str(&content)
                .map_err(|e| MetadataError::Backend(format!("{}: {e}", path.display())))?
        } else {
            toml::from_str(&content)
                .map_err(|e| MetadataError::Backend(format!("{}: {e}", path.display())))?
        };
        tracing::info!(
            path = %path.display(),
            tables = catalog.tables.len(),
            glossary = catalog.glossary.len(),
            "Loaded business catalog"
        );
        Ok(Self::new(catalog))
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    fn table_by_id(&self, id: &str) -> Option<&CatalogTable> {
        self.catalog.tables.iter().find(|t| t.id == id)
    }
}

/// Lower-cased terms a profile is about: focus terms, then content words
/// of the question.
fn profile_terms(profile: &BusinessContextProfile) -> Vec<String> {
    let mut terms: Vec<String> = profile
        .focus_terms()
        .into_iter()
        .map(|t| t.to_lowercase())
        .collect();
    for word in words(&profile.question) {
        if word.lower.len() > 2 && !is_stopword(&word.lower) && !terms.contains(&word.lower) {
            terms.push(word.lower);
        }
    }
    terms
}

fn singular(word: &str) -> &str {
    word.strip_suffix("es")
        .filter(|w| w.ends_with('s') || w.ends_with('x') || w.ends_with("ch"))
        .or_else(|| word.strip_suffix('s'))
        .unwrap_or(word)
}

/// Whether `term` occurs in `text_lower`, tolerating a plural on either side.
fn mentions(text_lower: &str, term: &str) -> bool {
    if term.contains(' ') {
        return contains_phrase(text_lower, term);
    }
    let stem = singular(term);
    words(text_lower)
        .iter()
        .any(|w| w.lower == term || singular(&w.lower) == stem)
}

fn same_domain(record: Option<&str>, profile: &BusinessContextProfile) -> bool {
    record.is_some_and(|d| d.eq_ignore_ascii_case(&profile.domain.name))
}

#[async_trait]
impl MetadataService for InMemoryCatalog {
    async fn find_relevant_tables(
        &self,
        profile: &BusinessContextProfile,
        top_k: usize,
    ) -> Result<Vec<TableInfo>, MetadataError> {
        let terms = profile_terms(profile);
        let mut tables: Vec<TableInfo> = self
            .catalog
            .tables
            .iter()
            .filter_map(|table| {
                let text = table.searchable_text();
                let hits = terms.iter().filter(|t| mentions(&text, t)).count();
                let domain_bonus = if same_domain(table.domain.as_deref(), profile) {
                    0.3
                } else {
                    0.0
                };
                let relevance = (hits as f64 * 0.25).min(1.0) * 0.7 + domain_bonus;
                (relevance > 0.0).then(|| table.to_info(relevance.min(1.0)))
            })
            .collect();

        tables.sort_by(|a, b| {
            b.relevance
                .total_cmp(&a.relevance)
                .then_with(|| a.name.cmp(&b.name))
        });
        tables.truncate(top_k);
        Ok(tables)
    }

    async fn find_relevant_columns(
        &self,
        table_ids: &[String],
        profile: &BusinessContextProfile,
    ) -> Result<Vec<ColumnInfo>, MetadataError> {
        let terms = profile_terms(profile);
        let mut columns = Vec::new();
        for id in table_ids {
            let table = self
                .table_by_id(id)
                .ok_or_else(|| MetadataError::NotFound(format!("table '{id}'")))?;
            for column in &table.columns {
                let text = format!("{} {}", column.name.replace('_', " "), column.description)
                    .to_lowercase();
                let matched = terms.iter().any(|t| mentions(&text, t));
                columns.push(ColumnInfo {
                    table_id: table.id.clone(),
                    name: column.name.clone(),
                    data_type: column.data_type.clone(),
                    description: column.description.clone(),
                    relevance: if matched { 1.0 } else { 0.5 },
                });
            }
        }
        Ok(columns)
    }

    async fn find_relevant_glossary_terms(
        &self,
        terms: &[String],
    ) -> Result<Vec<GlossaryTerm>, MetadataError> {
        let wanted: Vec<String> = terms.iter().map(|t| t.to_lowercase()).collect();
        Ok(self
            .catalog
            .glossary
            .iter()
            .filter(|entry| {
                std::iter::once(&entry.term)
                    .chain(entry.synonyms.iter())
                    .any(|name| {
                        let name = name.to_lowercase();
                        wanted
                            .iter()
                            .any(|w| *w == name || singular(w) == singular(&name))
                    })
            })
            .cloned()
            .collect())
    }

    async fn find_query_examples(
        &self,
        profile: &BusinessContextProfile,
        top_k: usize,
    ) -> Result<Vec<QueryExample>, MetadataError> {
        let terms = profile_terms(profile);
        if terms.is_empty() {
            return Ok(Vec::new());
        }
        let mut examples: Vec<QueryExample> = self
            .catalog
            .examples
            .iter()
            .filter_map(|example| {
                let text = example.question.to_lowercase();
                let hits = terms.iter().filter(|t| mentions(&text, t)).count();
                let intent_bonus = if example.intent == Some(profile.intent_type()) {
                    0.2
                } else {
                    0.0
                };
                let relevance = (hits as f64 / terms.len() as f64) * 0.8 + intent_bonus;
                (hits > 0).then(|| QueryExample {
                    relevance: relevance.min(1.0),
                    ..example.clone()
                })
            })
            .collect();
        examples.sort_by(|a, b| b.relevance.total_cmp(&a.relevance));
        examples.truncate(top_k);
        Ok(examples)
    }

    async fn find_business_rules(
        &self,
        profile: &BusinessContextProfile,
    ) -> Result<Vec<BusinessRule>, MetadataError> {
        Ok(self
            .catalog
            .rules
            .iter()
            .filter(|rule| rule.domain.is_none() || same_domain(rule.domain.as_deref(), profile))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl SchemaLinker for InMemoryCatalog {
    async fn link(&self, entity: &Entity) -> Result<Option<SchemaLink>, MetadataError> {
        let name = entity.name.to_lowercase().replace(' ', "_");
        let stem = singular(&name);

        let table_named = |t: &&CatalogTable| {
            let table = t.name.to_lowercase();
            table == name || singular(&table) == stem
        };

        match entity.entity_type {
            EntityType::TimeReference | EntityType::ComparisonValue => Ok(None),
            EntityType::Table => Ok(self.catalog.tables.iter().find(table_named).map(|t| {
                SchemaLink {
                    table: t.name.clone(),
                    column: None,
                }
            })),
            EntityType::Metric | EntityType::Column | EntityType::Dimension => {
                if let Some(table) = self.catalog.tables.iter().find(table_named) {
                    return Ok(Some(SchemaLink {
                        table: table.name.clone(),
                        column: None,
                    }));
                }
                for table in &self.catalog.tables {
                    let column = table.columns.iter().find(|c| {
                        let col = c.name.to_lowercase();
                        col == name
                            || singular(&col) == stem
                            || col.starts_with(&format!("{stem}_"))
                            || col.ends_with(&format!("_{stem}"))
                    });
                    if let Some(column) = column {
                        return Ok(Some(SchemaLink {
                            table: table.name.clone(),
                            column: Some(column.name.clone()),
                        }));
                    }
                }
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use querylens_core::{Domain, ExtractionMethod, Intent, IntentType};
    use std::collections::{BTreeMap, BTreeSet};

    fn profile(question: &str, domain: &str, entities: Vec<Entity>) -> BusinessContextProfile {
        BusinessContextProfile {
            analysis_id: "t".into(),
            question: question.into(),
            user_id: "u".into(),
            intent: Intent::new(IntentType::Aggregation, 0.8),
            domain: Domain::new(domain, 0.6),
            entities,
            business_terms: vec![],
            time_range: None,
            term_relevance: BTreeMap::new(),
            confidence: 0.8,
            created_at: Utc::now(),
            flags: BTreeSet::new(),
            validations: vec![],
        }
    }

    fn metric(name: &str) -> Entity {
        Entity::new(name, EntityType::Metric, name, 0, 0.9, ExtractionMethod::BusinessTerm)
    }

    #[test]
    fn sample_catalog_parses() {
        let catalog = InMemoryCatalog::sample();
        assert!(catalog.catalog().tables.len() >= 4);
        assert!(!catalog.catalog().glossary.is_empty());
    }

    #[test]
    fn plural_tolerant_mentions() {
        assert!(mentions("player deposit transactions", "deposits"));
        assert!(mentions("registered players", "player"));
        assert!(!mentions("games", "gam"));
        assert!(mentions("completed deposits minus net deposits", "net deposits"));
    }

    #[tokio::test]
    async fn deposits_table_ranks_first_for_deposit_question() {
        let catalog = InMemoryCatalog::sample();
        let p = profile(
            "What is the total deposit amount for UK players last month?",
            "Banking",
            vec![metric("deposit")],
        );
        let tables = catalog.find_relevant_tables(&p, 3).await.unwrap();
        assert_eq!(tables[0].name, "deposits");
        assert!(tables.len() <= 3);
        assert!(tables.iter().all(|t| (0.0..=1.0).contains(&t.relevance)));
    }

    #[tokio::test]
    async fn unknown_table_id_is_not_found() {
        let catalog = InMemoryCatalog::sample();
        let p = profile("anything", "General", vec![]);
        let err = catalog
            .find_relevant_columns(&["nope".to_string()], &p)
            .await
            .unwrap_err();
        assert!(matches!(err, MetadataError::NotFound(_)));
    }

    #[tokio::test]
    async fn glossary_matches_synonyms() {
        let catalog = InMemoryCatalog::sample();
        let terms = catalog
            .find_relevant_glossary_terms(&["Cashout".to_string(), "deposits".to_string()])
            .await
            .unwrap();
        let names: Vec<_> = terms.iter().map(|t| t.term.as_str()).collect();
        assert!(names.contains(&"withdrawal"));
        assert!(names.contains(&"deposit"));
    }

    #[tokio::test]
    async fn rules_filtered_by_domain() {
        let catalog = InMemoryCatalog::sample();
        let gaming = catalog
            .find_business_rules(&profile("q", "Gaming", vec![]))
            .await
            .unwrap();
        assert_eq!(gaming.len(), 1);
        let banking = catalog
            .find_business_rules(&profile("q", "Banking", vec![]))
            .await
            .unwrap();
        assert_eq!(banking.len(), 3);
    }

    #[tokio::test]
    async fn links_metric_to_table_and_column() {
        let catalog = InMemoryCatalog::sample();
        let link = catalog.link(&metric("deposit")).await.unwrap().unwrap();
        assert_eq!(link.table, "deposits");

        let stake = catalog.link(&metric("stake")).await.unwrap().unwrap();
        assert_eq!(stake.table, "bets");
        assert_eq!(stake.column.as_deref(), Some("stake"));

        let time = Entity::new(
            "last month",
            EntityType::TimeReference,
            "last month",
            0,
            0.9,
            ExtractionMethod::Pattern,
        );
        assert!(catalog.link(&time).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn load_json_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        std::fs::write(
            &path,
            r#"{"tables":[{"id":"t1","name":"orders","columns":[{"name":"total"}]}]}"#,
        )
        .unwrap();
        let catalog = InMemoryCatalog::load_from(&path).unwrap();
        assert_eq!(catalog.catalog().tables[0].columns[0].name, "total");
    }
}
