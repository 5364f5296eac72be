pub mod content_analyser;
pub mod searcher;

pub use content_analyser::{ContentAnalyser, RelevanceScorer};
pub use searcher::{RunReport, Searcher, StopReason};
