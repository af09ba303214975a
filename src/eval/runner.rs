//! Run orchestration: one pass of the gold set through the chain and the
//! judge panel.

use super::chain::{ChainOutcome, RetrievalChain};
use super::goldset::{GoldItem, GoldSet};
use super::judge::{JudgeDimension, JudgeInput, JudgePanel, PanelReport};
use super::metrics::{self, round_to, DEFAULT_HIT_THRESHOLD};
use super::results::{MetricRecord, ResultSink, RunIdentity, RunSummary};
use super::score::MetricWeights;
use super::trace::{self, ItemSpan, TraceEmitter, TracingEmitter};
use crate::config::RunConfig;
use crate::persistence::{RunArtifacts, RunStore};
use crate::registry::{DatasetRegistry, RegistrationReceipt};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn, Instrument};

/// Default length of question/answer text echoed into log lines.
pub const DEFAULT_LOG_MAX_CHARS: usize = 500;

/// Shorten text for a log line, marking the cut.
pub fn truncate_for_log(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// Evaluates gold items against a chain.
pub struct EvalRunner {
    chain: Arc<dyn RetrievalChain>,
    panel: JudgePanel,
    emitter: Arc<dyn TraceEmitter>,
    weights: MetricWeights,
    identity: RunIdentity,
    hit_threshold: f64,
    log_max_chars: usize,
}

impl EvalRunner {
    pub fn new(chain: Arc<dyn RetrievalChain>, panel: JudgePanel, identity: RunIdentity) -> Self {
        Self {
            chain,
            panel,
            emitter: Arc::new(TracingEmitter),
            weights: MetricWeights::default(),
            identity,
            hit_threshold: DEFAULT_HIT_THRESHOLD,
            log_max_chars: DEFAULT_LOG_MAX_CHARS,
        }
    }

    /// Build a runner with the identity and tuning of a run configuration.
    pub fn from_config(config: &RunConfig, chain: Arc<dyn RetrievalChain>, panel: JudgePanel) -> Self {
        Self::new(
            chain,
            panel.with_concurrency(config.concurrent_judges),
            config.identity(),
        )
        .with_weights(config.weights)
        .with_hit_threshold(config.hit_threshold)
        .with_log_max_chars(config.log_max_chars)
    }

    pub fn with_emitter(mut self, emitter: Arc<dyn TraceEmitter>) -> Self {
        self.emitter = emitter;
        self
    }

    pub fn with_weights(mut self, weights: MetricWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn with_hit_threshold(mut self, threshold: f64) -> Self {
        self.hit_threshold = threshold;
        self
    }

    pub fn with_log_max_chars(mut self, max_chars: usize) -> Self {
        self.log_max_chars = max_chars;
        self
    }

    pub fn identity(&self) -> &RunIdentity {
        &self.identity
    }

    /// Evaluate every item in order. Per-item failures are recorded, never
    /// raised, so the summary always covers the whole gold set.
    pub async fn run(&self, gold: &GoldSet) -> RunSummary {
        let started = Instant::now();
        let mut sink = ResultSink::new(self.identity.clone());

        info!(
            items = gold.len(),
            experiment = %self.identity.experiment_name,
            run_id = %self.identity.run_id,
            variant = %self.identity.variant,
            "starting evaluation run"
        );

        let without_keywords = gold.items_without_keywords();
        if without_keywords > 0 {
            warn!(count = without_keywords, "gold items without expected keywords never score a hit");
        }

        for (idx, item) in gold.items.iter().enumerate() {
            info!(
                item = idx + 1,
                of = gold.len(),
                question = %truncate_for_log(&item.question, self.log_max_chars),
                "evaluating"
            );
            sink.push(self.evaluate_item(item).await);
        }

        let summary = sink.finalize();
        info!(
            n = summary.n,
            overall_score = summary.overall_score,
            chain_failures = summary.chain_failures(),
            elapsed_secs = started.elapsed().as_secs_f64(),
            "evaluation run finished"
        );
        summary
    }

    /// Evaluate one item inside its own span. The span is closed when this
    /// returns, whatever happened upstream.
    pub async fn evaluate_item(&self, item: &GoldItem) -> MetricRecord {
        let mut span = self.emitter.open_item(item);
        self.record_inputs(span.as_mut(), item);

        let record = self.measure(item).instrument(span.span()).await;

        self.record_outputs(span.as_mut(), &record);
        record
    }

    async fn measure(&self, item: &GoldItem) -> MetricRecord {
        let started = Instant::now();
        let result = self.chain.ask(&item.question).await;
        let latency_ms = round_to(started.elapsed().as_secs_f64() * 1000.0, 2);

        let (outcome, chain_error) = match result {
            Ok(outcome) => (outcome, None),
            Err(err) => {
                warn!(
                    question = %truncate_for_log(&item.question, self.log_max_chars),
                    error = %err,
                    "chain call failed, scoring item as empty"
                );
                (ChainOutcome::empty(), Some(err.to_string()))
            }
        };

        let contexts = outcome.contexts();
        let duplicate_rate = round_to(metrics::duplicate_rate(&outcome.documents), 3);
        let hit = metrics::hit_with_threshold(&outcome.answer, &item.expected_keywords, self.hit_threshold);

        let report = match &chain_error {
            Some(reason) => PanelReport::skipped(&format!("chain failed: {}", reason)),
            None => {
                let input = JudgeInput {
                    question: &item.question,
                    answer: &outcome.answer,
                    contexts: &contexts,
                };
                self.panel.assess_all(&input).await
            }
        };
        let judges = report.flags();
        let overall_score = self.weights.overall_score(&judges);

        debug!(
            latency_ms,
            duplicate_rate,
            hit,
            overall_score,
            answer = %truncate_for_log(&outcome.answer, self.log_max_chars),
            "item scored"
        );

        MetricRecord {
            question: item.question.clone(),
            document_ids: outcome.document_ids(),
            sources: outcome.sources(),
            answer: outcome.answer,
            contexts,
            expected_keywords: item.expected_keywords.clone(),
            latency_ms,
            duplicate_rate,
            hit,
            judges,
            overall_score,
            explanations: report.explanations(),
            judge_failures: report.failures(),
            chain_error,
        }
    }

    fn record_inputs(&self, span: &mut dyn ItemSpan, item: &GoldItem) {
        span.set_attribute(trace::QUESTION_LENGTH, item.question.chars().count().into());
        span.set_attribute(trace::EXPECTED_KEYWORDS_COUNT, item.expected_keywords.len().into());
        span.set_attribute(trace::INPUT, item.question.as_str().into());
        span.set_attribute(trace::EXPERIMENT_NAME, self.identity.experiment_name.as_str().into());
        span.set_attribute(trace::EXPERIMENT_RUN_ID, self.identity.run_id.as_str().into());
        span.set_attribute(trace::EXPERIMENT_VARIANT, self.identity.variant.as_str().into());
    }

    fn record_outputs(&self, span: &mut dyn ItemSpan, record: &MetricRecord) {
        span.set_attribute(trace::LATENCY_MS, record.latency_ms.into());
        span.set_attribute(trace::DUPLICATE_RATE, record.duplicate_rate.into());
        span.set_attribute(trace::HIT, record.hit.into());
        span.set_attribute(trace::ANSWER_LENGTH, record.answer.chars().count().into());
        span.set_attribute(trace::DOCUMENT_IDS, record.document_ids.join(",").into());
        for dimension in JudgeDimension::ALL {
            span.set_attribute(&trace::dimension_key(dimension), record.judges.get(dimension).into());
        }
        span.set_attribute(trace::OVERALL_SCORE, record.overall_score.into());
        span.set_attribute(trace::OUTPUT, record.answer.as_str().into());
        let status = if record.chain_error.is_some() { "chain_error" } else { "ok" };
        span.set_attribute(trace::STATUS, status.into());
    }
}

/// What happened when a finished run was handed to storage and the registry.
#[derive(Debug, Default)]
pub struct PublishReport {
    pub artifacts: Option<RunArtifacts>,
    pub receipt: Option<RegistrationReceipt>,
    /// Failures that were logged and skipped.
    pub errors: Vec<String>,
}

/// Persist a run, then register it. Failures are logged and collected;
/// the in-memory summary is never affected.
pub async fn publish(
    summary: &RunSummary,
    store: &dyn RunStore,
    registry: &dyn DatasetRegistry,
) -> PublishReport {
    let mut report = PublishReport::default();

    match store.save(summary) {
        Ok(artifacts) => report.artifacts = Some(artifacts),
        Err(err) => {
            warn!(error = %err, "failed to persist run artifacts");
            report.errors.push(err.to_string());
        }
    }

    match registry.register(summary).await {
        Ok(receipt) => report.receipt = receipt,
        Err(err) => {
            warn!(error = %err, "dataset registration failed, continuing");
            report.errors.push(err.to_string());
        }
    }

    report
}
