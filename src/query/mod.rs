//! Query analysis: complexity, type, coarse entities and decomposition

pub mod analyzer;
pub mod decompose;

pub use analyzer::QueryAnalyzer;
pub use decompose::Decomposer;
