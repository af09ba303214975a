//! Per-item records, the run summary, and the sink that accumulates them.

use super::chain::DocumentLocator;
use super::judge::{JudgeDimension, JudgeFlags};
use super::metrics::round_to;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Separator for list-valued CSV cells.
pub const LIST_DELIMITER: &str = "|";

/// Identifies a run. `(experiment_name, run_id)` keys its artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunIdentity {
    pub experiment_name: String,
    pub run_id: String,
    pub variant: String,
}

/// Everything measured for one gold item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub question: String,
    pub answer: String,
    pub contexts: Vec<String>,
    pub document_ids: Vec<String>,
    /// Source locators aligned with `document_ids`; empty when the chain gave none.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<DocumentLocator>,
    pub expected_keywords: Vec<String>,
    pub latency_ms: f64,
    pub duplicate_rate: f64,
    pub hit: bool,
    #[serde(flatten)]
    pub judges: JudgeFlags,
    pub overall_score: f64,
    /// Raw judge replies, by dimension.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub explanations: BTreeMap<JudgeDimension, String>,
    /// Why a dimension was scored false without a verdict.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub judge_failures: BTreeMap<JudgeDimension, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_error: Option<String>,
}

/// One CSV row, columns in output order.
#[derive(Debug, Serialize)]
pub struct CsvRow<'a> {
    pub experiment_name: &'a str,
    pub run_id: &'a str,
    pub variant: &'a str,
    pub question: &'a str,
    pub answer: &'a str,
    pub contexts: String,
    pub latency_ms: f64,
    pub duplicate_rate: f64,
    pub retrieval_relevance: u8,
    pub retrieval_correctness: u8,
    pub answer_grounding: u8,
    pub answer_accuracy: u8,
    pub answer_clarity: u8,
    pub overall_score: f64,
    pub ids: String,
    pub expected_keywords: String,
}

impl MetricRecord {
    pub fn csv_row<'a>(&'a self, identity: &'a RunIdentity) -> CsvRow<'a> {
        CsvRow {
            experiment_name: &identity.experiment_name,
            run_id: &identity.run_id,
            variant: &identity.variant,
            question: &self.question,
            answer: &self.answer,
            contexts: self.contexts.join(LIST_DELIMITER),
            latency_ms: self.latency_ms,
            duplicate_rate: self.duplicate_rate,
            retrieval_relevance: self.judges.retrieval_relevance.into(),
            retrieval_correctness: self.judges.retrieval_correctness.into(),
            answer_grounding: self.judges.answer_grounding.into(),
            answer_accuracy: self.judges.answer_accuracy.into(),
            answer_clarity: self.judges.answer_clarity.into(),
            overall_score: self.overall_score,
            ids: self.document_ids.join(LIST_DELIMITER),
            expected_keywords: self.expected_keywords.join(LIST_DELIMITER),
        }
    }
}

/// Aggregates of one run, plus every per-item record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub n: usize,
    pub hit_rate: f64,
    pub avg_latency_ms: f64,
    pub avg_duplicate_rate: f64,
    pub retrieval_relevance_rate: f64,
    pub retrieval_correctness_rate: f64,
    pub answer_grounding_rate: f64,
    pub answer_accuracy_rate: f64,
    pub answer_clarity_rate: f64,
    pub overall_score: f64,
    pub experiment_name: String,
    pub run_id: String,
    pub variant: String,
    pub results: Vec<MetricRecord>,
}

impl RunSummary {
    /// Compute aggregates over the records. An empty run aggregates to zeros.
    pub fn from_records(identity: RunIdentity, results: Vec<MetricRecord>) -> Self {
        let n = results.len();
        let divisor = n.max(1) as f64;

        let rate = |pred: &dyn Fn(&MetricRecord) -> bool| {
            round_to(results.iter().filter(|r| pred(r)).count() as f64 / divisor, 3)
        };
        let mean = |value: &dyn Fn(&MetricRecord) -> f64| {
            results.iter().map(value).sum::<f64>() / divisor
        };

        Self {
            n,
            hit_rate: rate(&|r| r.hit),
            avg_latency_ms: round_to(mean(&|r| r.latency_ms), 2),
            avg_duplicate_rate: round_to(mean(&|r| r.duplicate_rate), 3),
            retrieval_relevance_rate: rate(&|r| r.judges.retrieval_relevance),
            retrieval_correctness_rate: rate(&|r| r.judges.retrieval_correctness),
            answer_grounding_rate: rate(&|r| r.judges.answer_grounding),
            answer_accuracy_rate: rate(&|r| r.judges.answer_accuracy),
            answer_clarity_rate: rate(&|r| r.judges.answer_clarity),
            overall_score: round_to(mean(&|r| r.overall_score), 3),
            experiment_name: identity.experiment_name,
            run_id: identity.run_id,
            variant: identity.variant,
            results,
        }
    }

    pub fn identity(&self) -> RunIdentity {
        RunIdentity {
            experiment_name: self.experiment_name.clone(),
            run_id: self.run_id.clone(),
            variant: self.variant.clone(),
        }
    }

    /// Pass rate of one judge dimension.
    pub fn dimension_rate(&self, dimension: JudgeDimension) -> f64 {
        match dimension {
            JudgeDimension::RetrievalRelevance => self.retrieval_relevance_rate,
            JudgeDimension::RetrievalCorrectness => self.retrieval_correctness_rate,
            JudgeDimension::AnswerGrounding => self.answer_grounding_rate,
            JudgeDimension::AnswerAccuracy => self.answer_accuracy_rate,
            JudgeDimension::AnswerClarity => self.answer_clarity_rate,
        }
    }

    /// Items whose chain call failed.
    pub fn chain_failures(&self) -> usize {
        self.results.iter().filter(|r| r.chain_error.is_some()).count()
    }

    /// Print summary to stdout.
    pub fn print_summary(&self) {
        println!("\n========== Evaluation Results ==========");
        println!("Experiment: {}", self.experiment_name);
        println!("Run:        {} ({})", self.run_id, self.variant);
        println!("Items:      {}", self.n);
        if self.chain_failures() > 0 {
            println!("Chain failures: {}", self.chain_failures());
        }
        println!("----------------------------------------");
        println!("Hit rate:           {:.1}%", self.hit_rate * 100.0);
        println!("Avg duplicate rate: {:.3}", self.avg_duplicate_rate);
        println!("Avg latency:        {:.0}ms", self.avg_latency_ms);
        println!("----------------------------------------");
        for dimension in JudgeDimension::ALL {
            println!(
                "{:<22} {:.1}%",
                format!("{}:", dimension.key()),
                self.dimension_rate(dimension) * 100.0
            );
        }
        println!("----------------------------------------");
        println!("Overall score: {:.3}", self.overall_score);
        println!("========================================\n");
    }
}

/// Append-only collection of per-item records for one run.
#[derive(Debug)]
pub struct ResultSink {
    identity: RunIdentity,
    records: Vec<MetricRecord>,
}

impl ResultSink {
    pub fn new(identity: RunIdentity) -> Self {
        Self {
            identity,
            records: Vec::new(),
        }
    }

    pub fn push(&mut self, record: MetricRecord) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[MetricRecord] {
        &self.records
    }

    /// Close the run and compute its summary.
    pub fn finalize(self) -> RunSummary {
        RunSummary::from_records(self.identity, self.records)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn identity() -> RunIdentity {
        RunIdentity {
            experiment_name: "offline-eval".to_string(),
            run_id: "run-1".to_string(),
            variant: "baseline".to_string(),
        }
    }

    pub(crate) fn record(question: &str, hit: bool, judges: JudgeFlags, overall: f64) -> MetricRecord {
        MetricRecord {
            question: question.to_string(),
            answer: format!("answer to {}", question),
            contexts: vec!["ctx one".to_string(), "ctx two".to_string()],
            document_ids: vec!["p4".to_string(), "p7".to_string()],
            sources: Vec::new(),
            expected_keywords: vec!["wage".to_string(), "minimum".to_string()],
            latency_ms: 100.0,
            duplicate_rate: 0.0,
            hit,
            judges,
            overall_score: overall,
            explanations: BTreeMap::new(),
            judge_failures: BTreeMap::new(),
            chain_error: None,
        }
    }

    fn all_true() -> JudgeFlags {
        JudgeFlags {
            retrieval_relevance: true,
            retrieval_correctness: true,
            answer_grounding: true,
            answer_accuracy: true,
            answer_clarity: true,
        }
    }

    #[test]
    fn test_summary_aggregates() {
        let mut sink = ResultSink::new(identity());

        let mut first = record("q1", true, all_true(), 1.0);
        first.latency_ms = 100.0;
        first.duplicate_rate = 0.5;
        sink.push(first);

        let mut second = record("q2", false, JudgeFlags::default(), 0.0);
        second.latency_ms = 300.0;
        second.duplicate_rate = 0.0;
        sink.push(second);

        let third_flags = JudgeFlags {
            retrieval_relevance: true,
            ..JudgeFlags::default()
        };
        let mut third = record("q3", true, third_flags, 0.25);
        third.latency_ms = 200.0;
        third.duplicate_rate = 0.25;
        sink.push(third);

        assert_eq!(sink.len(), 3);
        let summary = sink.finalize();

        assert_eq!(summary.n, 3);
        assert_eq!(summary.hit_rate, 0.667);
        assert_eq!(summary.avg_latency_ms, 200.0);
        assert_eq!(summary.avg_duplicate_rate, 0.25);
        assert_eq!(summary.retrieval_relevance_rate, 0.667);
        assert_eq!(summary.retrieval_correctness_rate, 0.333);
        assert_eq!(summary.answer_clarity_rate, 0.333);
        assert_eq!(summary.overall_score, 0.417);
        assert_eq!(summary.run_id, "run-1");
        assert_eq!(summary.results.len(), 3);
        assert_eq!(summary.results[1].question, "q2");
    }

    #[test]
    fn test_empty_run_aggregates_to_zero() {
        let summary = ResultSink::new(identity()).finalize();
        assert_eq!(summary.n, 0);
        assert_eq!(summary.hit_rate, 0.0);
        assert_eq!(summary.avg_latency_ms, 0.0);
        assert_eq!(summary.overall_score, 0.0);
    }

    #[test]
    fn test_summary_json_fields() {
        let summary = RunSummary::from_records(identity(), vec![record("q", true, all_true(), 1.0)]);
        let json = serde_json::to_value(&summary).unwrap();

        for field in [
            "n",
            "hit_rate",
            "avg_latency_ms",
            "avg_duplicate_rate",
            "retrieval_relevance_rate",
            "retrieval_correctness_rate",
            "answer_grounding_rate",
            "answer_accuracy_rate",
            "answer_clarity_rate",
            "overall_score",
            "experiment_name",
            "run_id",
            "variant",
            "results",
        ] {
            assert!(json.get(field).is_some(), "missing {field}");
        }

        let item = &json["results"][0];
        assert_eq!(item["retrieval_relevance"], true);
        assert_eq!(item["hit"], true);
        assert!(item.get("chain_error").is_none());
        assert!(item.get("sources").is_none());
    }

    #[test]
    fn test_summary_json_reads_back() {
        let mut rec = record("q", true, all_true(), 1.0);
        rec.explanations
            .insert(JudgeDimension::AnswerClarity, "LABEL: clear".to_string());
        rec.sources = vec![
            DocumentLocator {
                source: Some("manifesto.pdf".to_string()),
                page: Some(4),
            },
            DocumentLocator::default(),
        ];
        let summary = RunSummary::from_records(identity(), vec![rec]);

        let text = serde_json::to_string(&summary).unwrap();
        let json: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(json["results"][0]["sources"][0]["page"], 4);
        assert_eq!(json["results"][0]["sources"][1], serde_json::json!({}));

        let back: RunSummary = serde_json::from_str(&text).unwrap();
        assert_eq!(back, summary);
    }

    #[test]
    fn test_csv_row_flattening() {
        let flags = JudgeFlags {
            answer_grounding: true,
            ..JudgeFlags::default()
        };
        let rec = record("q", true, flags, 0.2);
        let id = identity();
        let row = rec.csv_row(&id);

        assert_eq!(row.ids, "p4|p7");
        assert_eq!(row.expected_keywords, "wage|minimum");
        assert_eq!(row.contexts, "ctx one|ctx two");
        assert_eq!(row.answer_grounding, 1);
        assert_eq!(row.answer_clarity, 0);
        assert_eq!(row.variant, "baseline");
    }
}
