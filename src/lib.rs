//! RAG Eval - offline evaluation of a retrieval-augmented question-answering chain.
//!
//! Each question of a hand-curated gold set is sent through the chain under
//! test. The answer and retrieved documents are scored with deterministic
//! metrics and a panel of five LLM judges, combined into a weighted overall
//! score, and persisted as per-run CSV and JSON artifacts.
//!
//! # Quick Start
//!
//! ```no_run
//! use rag_eval::{
//!     config::Config,
//!     eval::{publish, EvalRunner, GoldSet, HttpChain, JudgePanel},
//!     llm::LlmClient,
//!     persistence::FsRunStore,
//!     registry::registry_from_config,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     config.validate_for_run()?;
//!
//!     let gold = GoldSet::load(&config.run.goldset_path)?;
//!     let chain = Arc::new(HttpChain::new(&config.chain)?);
//!     let panel = JudgePanel::new(Arc::new(LlmClient::new(config.llm.clone())));
//!
//!     let runner = EvalRunner::from_config(&config.run, chain, panel);
//!     let summary = runner.run(&gold).await;
//!     summary.print_summary();
//!
//!     let store = FsRunStore::new(&config.run.output_dir);
//!     let registry = registry_from_config(&config.registry);
//!     publish(&summary, &store, registry.as_ref()).await;
//!
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **GoldSet**: questions with expected keywords
//! - **RetrievalChain**: the system under test
//! - **JudgePanel**: five categorical LLM judges behind a catch-and-default boundary
//! - **EvalRunner**: drives items through chain, metrics, judges and trace spans
//! - **RunStore / DatasetRegistry**: artifact persistence and optional upload

pub mod config;
pub mod error;
pub mod eval;
pub mod llm;
pub mod persistence;
pub mod registry;

// Re-export commonly used types
pub use config::Config;
pub use error::{EvalError, Result};
pub use eval::{EvalRunner, GoldSet, JudgePanel, RunSummary};
pub use llm::LlmClient;
pub use persistence::{load_summary, FsRunStore, RunStore};
pub use registry::{DatasetRegistry, NoopRegistry, PhoenixRegistry};
