//! Rule-based NCAA credit-equivalency evaluation for international transcripts.
//!
//! The pipeline runs `ingest → suggest → evaluate → report`; each stage
//! reads what the previous one stored, through a [`store::TranscriptStore`].

pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod evaluate;
pub mod evaluator;
pub mod ingest;
pub mod memory;
pub mod models;
pub mod reference;
pub mod report;
pub mod requirements;
pub mod store;
pub mod suggest;

pub use error::{EvaluatorError, EvaluatorResult};
pub use evaluator::TranscriptEvaluator;
