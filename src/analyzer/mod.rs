pub mod languages;
pub mod ports;
pub mod project_analyzer;
pub mod util;

pub use ports::{CallGraphQuery, FunctionQuery, LanguagePlugin};
pub use project_analyzer::{ParsedTrees, ProjectAnalyzer, ResolvedCallSite};
