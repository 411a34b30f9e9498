pub mod citations;
pub mod context;
pub mod mindmap;
pub mod outlet;
pub mod outline;
pub mod query;
pub mod report;
pub mod types;
pub mod workflow;
