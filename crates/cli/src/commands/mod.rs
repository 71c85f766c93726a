//! Command implementations.

mod run;

pub use run::{load_config, observability_config, run_agent};
