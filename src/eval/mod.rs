//! The evaluation pipeline.
//!
//! - Gold-set loading
//! - The chain boundary (question in, answer and sources out)
//! - Deterministic metrics (duplicate rate, keyword hit)
//! - The five-judge LLM panel and weighted scoring
//! - Per-item trace spans, result records and run orchestration

pub mod chain;
pub mod goldset;
pub mod judge;
pub mod metrics;
pub mod results;
pub mod runner;
pub mod score;
pub mod trace;

pub use chain::{ChainOutcome, HttpChain, RetrievalChain, RetrievedDocument};
pub use goldset::{GoldItem, GoldSet};
pub use judge::{JudgeDimension, JudgeFlags, JudgeOutcome, JudgePanel, JudgeVerdict};
pub use metrics::{duplicate_rate, hit};
pub use results::{MetricRecord, ResultSink, RunIdentity, RunSummary};
pub use runner::{publish, EvalRunner, PublishReport};
pub use score::MetricWeights;
pub use trace::{NoopEmitter, TraceEmitter, TracingEmitter};
