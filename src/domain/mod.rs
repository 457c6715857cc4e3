pub mod context;
pub mod models;

pub use context::{CallContext, ContextLabel, Parenthesis};
pub use models::{Api, Function, FunctionId, Language, Value, ValueLabel};
