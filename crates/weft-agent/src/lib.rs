//! Change-tracking coding agent.
//!
//! Two halves: a transactional change ledger that backs every file mutation
//! with enough on-disk state to toggle, validate, or reject it, and a
//! plan → execute → verify loop that drives a model through the tool set.

pub mod config;
pub mod errors;
pub mod events;
pub mod execution;
pub mod executor;
pub mod ledger;
pub mod orchestrator;
pub mod plan;
pub mod planner;
pub mod prompts;
pub mod tools;
pub mod truncation;
pub mod verifier;

pub use config::*;
pub use errors::*;
pub use events::*;
pub use execution::*;
pub use executor::*;
pub use ledger::*;
pub use orchestrator::*;
pub use plan::*;
pub use planner::*;
pub use tools::*;
pub use truncation::*;
pub use verifier::*;
