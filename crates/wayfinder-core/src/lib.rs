//! Wayfinder core: a tool-using question-answering orchestrator for place
//! information.
//!
//! A request is planned by a generative model (validated against a closed
//! tool vocabulary), executed step by step against local retrieval,
//! summarization, speech and embedding capabilities, and composed into one
//! grounded answer.

pub mod assistant;
pub mod cache;
pub mod config;
pub mod error;
pub mod knowledge;
pub mod orchestrator;
pub mod providers;
pub mod retrieval;
pub mod session;
pub mod speech;

pub use assistant::{Assistant, Providers};
pub use config::GuideConfig;
pub use error::{GuideError, GuideResult};
pub use orchestrator::{FinalResponse, Orchestrator};
