//! Per-item trace spans.
//!
//! Every gold item gets its own root span. The runner attaches attributes to
//! it as values become known; the span closes when its handle is dropped, so
//! an item that failed upstream still produces a closed span.

use super::goldset::GoldItem;
use tracing::field::Empty;
use tracing::Span;

pub const QUESTION_LENGTH: &str = "eval.question_length";
pub const EXPECTED_KEYWORDS_COUNT: &str = "eval.expected_keywords_count";
pub const LATENCY_MS: &str = "eval.latency_ms";
pub const DUPLICATE_RATE: &str = "eval.duplicate_rate";
pub const HIT: &str = "eval.hit";
pub const ANSWER_LENGTH: &str = "eval.answer_length";
pub const DOCUMENT_IDS: &str = "eval.ids";
pub const OVERALL_SCORE: &str = "eval.overall_score";
pub const STATUS: &str = "eval.status";
pub const EXPERIMENT_NAME: &str = "experiment.name";
pub const EXPERIMENT_RUN_ID: &str = "experiment.run_id";
pub const EXPERIMENT_VARIANT: &str = "experiment.variant";
pub const INPUT: &str = "input";
pub const OUTPUT: &str = "output";

/// Attribute key of one judge dimension, e.g. `eval.answer_clarity`.
pub fn dimension_key(dimension: super::judge::JudgeDimension) -> String {
    format!("eval.{}", dimension.key())
}

/// A value attached to a span.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl From<bool> for AttributeValue {
    fn from(v: bool) -> Self {
        AttributeValue::Bool(v)
    }
}

impl From<i64> for AttributeValue {
    fn from(v: i64) -> Self {
        AttributeValue::Int(v)
    }
}

impl From<usize> for AttributeValue {
    fn from(v: usize) -> Self {
        AttributeValue::Int(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<f64> for AttributeValue {
    fn from(v: f64) -> Self {
        AttributeValue::Float(v)
    }
}

impl From<&str> for AttributeValue {
    fn from(v: &str) -> Self {
        AttributeValue::Str(v.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(v: String) -> Self {
        AttributeValue::Str(v)
    }
}

/// An open span for one item. Dropping it closes the span.
pub trait ItemSpan: Send {
    fn set_attribute(&mut self, key: &str, value: AttributeValue);

    /// The `tracing` span that downstream work should run inside.
    fn span(&self) -> Span {
        Span::none()
    }
}

/// Opens item spans.
pub trait TraceEmitter: Send + Sync {
    fn open_item(&self, item: &GoldItem) -> Box<dyn ItemSpan>;
}

/// Emits item spans through `tracing`; whatever subscriber is installed
/// (fmt, OpenTelemetry, ...) receives them.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEmitter;

struct TracingItemSpan {
    span: Span,
}

impl TraceEmitter for TracingEmitter {
    fn open_item(&self, _item: &GoldItem) -> Box<dyn ItemSpan> {
        let span = tracing::info_span!(
            parent: None,
            "evaluation_item",
            eval.question_length = Empty,
            eval.expected_keywords_count = Empty,
            eval.latency_ms = Empty,
            eval.duplicate_rate = Empty,
            eval.hit = Empty,
            eval.answer_length = Empty,
            eval.ids = Empty,
            eval.retrieval_relevance = Empty,
            eval.retrieval_correctness = Empty,
            eval.answer_grounding = Empty,
            eval.answer_accuracy = Empty,
            eval.answer_clarity = Empty,
            eval.overall_score = Empty,
            eval.status = Empty,
            experiment.name = Empty,
            experiment.run_id = Empty,
            experiment.variant = Empty,
            input = Empty,
            output = Empty,
        );
        Box::new(TracingItemSpan { span })
    }
}

impl ItemSpan for TracingItemSpan {
    fn set_attribute(&mut self, key: &str, value: AttributeValue) {
        match value {
            AttributeValue::Bool(v) => self.span.record(key, v),
            AttributeValue::Int(v) => self.span.record(key, v),
            AttributeValue::Float(v) => self.span.record(key, v),
            AttributeValue::Str(v) => self.span.record(key, v.as_str()),
        };
    }

    fn span(&self) -> Span {
        self.span.clone()
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEmitter;

struct NoopItemSpan;

impl ItemSpan for NoopItemSpan {
    fn set_attribute(&mut self, _key: &str, _value: AttributeValue) {}
}

impl TraceEmitter for NoopEmitter {
    fn open_item(&self, _item: &GoldItem) -> Box<dyn ItemSpan> {
        Box::new(NoopItemSpan)
    }
}
