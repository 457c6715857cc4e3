pub mod executor;
pub mod state;
pub mod worklist;

pub use executor::run_scan;
pub use state::DFBScanState;
pub use worklist::{DfbscanEngine, EngineConfig};
