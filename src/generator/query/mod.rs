//! 查询阶段：洗练与展开

pub mod expander;
pub mod refiner;

pub use expander::QueryExpander;
pub use refiner::QueryRefiner;
