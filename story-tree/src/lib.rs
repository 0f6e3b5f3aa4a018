//! Branching narrative tree engine driven by an LLM.
//!
//! This crate provides:
//! - A classifier turning raw model output into linear, concluding or branch continuations
//! - A depth-first growth engine writing scenelets through a pluggable store
//! - A resume planner rebuilding pending work from a persisted tree
//! - A snapshot assembler producing a canonical, byte-stable listing of a story
//!
//! # Quick Start
//!
//! ```ignore
//! use story_tree::{ClaudeGenerator, Config, GrowthEngine, JsonFileStore, StoryBrief};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let generator = ClaudeGenerator::from_env(config.generator.clone())?;
//!     let store = JsonFileStore::new("stories.json");
//!
//!     let engine = GrowthEngine::new(generator, store).with_config(config.growth);
//!     let brief = StoryBrief::new("A keeper tends a lighthouse on a cursed shore.");
//!     let report = engine.resume("lighthouse", &brief).await?;
//!     println!("created {} scenelets", report.scenelets_created);
//!     Ok(())
//! }
//! ```

pub mod classify;
pub mod config;
pub mod generator;
pub mod growth;
pub mod prompt;
pub mod resume;
pub mod scenelet;
pub mod snapshot;
pub mod store;
pub mod telemetry;
pub mod testing;
pub mod tree;

// Primary public API
pub use classify::{classify_response, BranchOption, ClassifiedResponse, ParseError};
pub use config::{Config, ConfigError, GeneratorConfig, GrowthConfig};
pub use generator::{ClaudeGenerator, GenerationRequest, Generator, GeneratorError};
pub use growth::{GrowthEngine, GrowthError, GrowthReport};
pub use resume::{plan_resume, ResumePlan};
pub use scenelet::{
    DialogueLine, GenerationTask, NewScenelet, SceneletContent, SceneletRecord, StoryBrief,
};
pub use snapshot::{assemble_snapshot, SnapshotEntry, StorySnapshot};
pub use store::{JsonFileStore, MemoryStore, SceneletStore, StoreError};
pub use telemetry::init_telemetry;
pub use testing::{ScriptedGenerator, ScriptedResponse};
pub use tree::{StoryTree, ValidationError};
