//! # QueryLens Core
//!
//! Domain types, collaborator traits, and error definitions for the
//! QueryLens business-context analysis pipeline. This crate has no
//! framework dependencies beyond async plumbing: it defines the model that
//! every other crate implements against.
//!
//! ## Design Philosophy
//!
//! Each external collaborator (language model, embeddings, cache, business
//! catalog, feedback store) is a trait here. Implementations live in their
//! respective crates, which keeps the analysis code testable with scripted
//! mocks and the dependency graph pointing inward.

pub mod category;
pub mod domain;
pub mod entity;
pub mod error;
pub mod guard;
pub mod intent;
pub mod profile;
pub mod scoring;
pub mod services;
pub mod text;
pub mod time;

// Re-export key types at crate root for ergonomics
pub use category::{ContentType, ContextCategory};
pub use domain::{Domain, GENERAL_DOMAIN};
pub use entity::{Entity, EntityType, ExtractionMethod};
pub use error::{AnalysisError, Error, MetadataError, ModelError, Result};
pub use guard::GuardedModel;
pub use intent::{Intent, IntentType};
pub use profile::{
    AnalysisFlag, BusinessContextProfile, CheckKind, ValidationCheck, ValidationResult,
    ValidationType,
};
pub use services::{
    BusinessRule, CacheService, ColumnInfo, EmbeddingService, FeedbackRepository, GlossaryTerm,
    LanguageModel, MetadataService, QueryExample, SchemaLink, SchemaLinker, TableInfo, TermMatch,
    TermSimilarity,
};
pub use time::{Granularity, TimeRange};
