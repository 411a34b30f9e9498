pub mod cli;
pub mod config;
pub mod generator;
pub mod llm;
pub mod search;

// Re-export commonly used types
pub use config::Config;
pub use generator::mindmap::MindmapNode;
pub use generator::types::{PipelineResult, SearchStats};
pub use generator::workflow::{PipelineOrchestrator, launch};
pub use llm::{GenerationError, GenerationParams, TextGenerator};
pub use search::{RetrievalClient, SearchProvider, SearchResults};
