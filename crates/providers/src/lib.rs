//! Language model implementations for QueryLens.
//!
//! All models implement `querylens_core::LanguageModel`; the OpenAI-compatible
//! client also implements `EmbeddingService`. `build_from_config` selects
//! the right one from configuration.

pub mod disabled;
pub mod openai_compat;
pub mod router;

pub use disabled::DisabledModel;
pub use openai_compat::OpenAiCompatModel;
pub use router::{ModelStack, build_from_config};
