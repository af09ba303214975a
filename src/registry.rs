//! Optional registration of finished runs with an external dataset registry.
//!
//! Registration is advisory: callers log a failure and carry on.

use crate::config::RegistryConfig;
use crate::error::{EvalError, Result};
use crate::eval::judge::JudgeDimension;
use crate::eval::results::{MetricRecord, RunIdentity, RunSummary};
use crate::persistence::encode_component;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{info, warn};

/// Ids handed back by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationReceipt {
    pub dataset_name: String,
    pub dataset_id: String,
    pub version_id: Option<String>,
    pub experiment_id: Option<String>,
    /// The dataset already existed and this run was added as a new version.
    pub appended: bool,
    /// Experiment runs created, one per matched dataset example.
    pub runs: usize,
}

/// Somewhere a run can be uploaded for browsing and comparison.
#[async_trait]
pub trait DatasetRegistry: Send + Sync {
    /// Upload the run. `Ok(None)` means nothing was registered.
    async fn register(&self, summary: &RunSummary) -> Result<Option<RegistrationReceipt>>;
}

/// Used when no registry is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRegistry;

#[async_trait]
impl DatasetRegistry for NoopRegistry {
    async fn register(&self, _summary: &RunSummary) -> Result<Option<RegistrationReceipt>> {
        Ok(None)
    }
}

/// Pick the registry backend for a configuration.
pub fn registry_from_config(config: &RegistryConfig) -> Arc<dyn DatasetRegistry> {
    match config.endpoint.as_deref() {
        Some(endpoint) if config.enabled() => {
            Arc::new(PhoenixRegistry::new(endpoint, config.api_key.clone()))
        }
        _ => Arc::new(NoopRegistry),
    }
}

/// Dataset name of a run. Stable across repeats of the same run id.
///
/// Both parts are percent-encoded and joined with `:`, which the encoding
/// never emits, so distinct identities never share a dataset.
pub fn dataset_name(identity: &RunIdentity) -> String {
    format!(
        "{}:{}",
        encode_component(&identity.experiment_name),
        encode_component(&identity.run_id)
    )
}

/// How an upload treats the named dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadAction {
    Create,
    /// Add the examples to an existing dataset as a new version.
    Append,
}

impl UploadAction {
    pub fn for_existing(exists: bool) -> Self {
        if exists {
            UploadAction::Append
        } else {
            UploadAction::Create
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UploadAction::Create => "create",
            UploadAction::Append => "append",
        }
    }
}

/// The HTTP calls the Phoenix client makes. Paths are relative to the
/// registry endpoint; bodies come back as text for [`PhoenixRegistry::parse`].
#[async_trait]
pub trait PhoenixTransport: Send + Sync {
    async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<String>;
    async fn post(&self, path: &str, body: &Value) -> Result<String>;
}

/// `reqwest` transport with optional bearer auth.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpTransport {
    pub fn new(endpoint: &str, api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    async fn send(&self, path: &str, request: reqwest::RequestBuilder) -> Result<String> {
        let request = match &self.api_key {
            Some(key) => request.header("Authorization", format!("Bearer {}", key)),
            None => request,
        };

        let response = request
            .send()
            .await
            .map_err(|e| EvalError::Registry(e.to_string()))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| EvalError::Registry(e.to_string()))?;

        if !status.is_success() {
            return Err(EvalError::Registry(format!(
                "{} returned {}: {}",
                path, status, text
            )));
        }
        Ok(text)
    }
}

#[async_trait]
impl PhoenixTransport for HttpTransport {
    async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<String> {
        let request = self
            .client
            .get(format!("{}{}", self.endpoint, path))
            .query(query);
        self.send(path, request).await
    }

    async fn post(&self, path: &str, body: &Value) -> Result<String> {
        let request = self
            .client
            .post(format!("{}{}", self.endpoint, path))
            .header("Content-Type", "application/json")
            .json(body);
        self.send(path, request).await
    }
}

/// Arize Phoenix REST client.
///
/// A run becomes one dataset version (created, or appended when the dataset
/// already exists), one experiment on that version, and one experiment run
/// per example carrying the item's scores.
#[derive(Clone)]
pub struct PhoenixRegistry {
    transport: Arc<dyn PhoenixTransport>,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct DatasetEntry {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct UploadedDataset {
    dataset_id: String,
    #[serde(default)]
    version_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Created {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ExampleList {
    #[serde(default)]
    examples: Vec<DatasetExample>,
}

#[derive(Debug, Deserialize)]
struct DatasetExample {
    id: String,
    #[serde(default)]
    metadata: Map<String, Value>,
}

impl PhoenixRegistry {
    pub fn new(endpoint: &str, api_key: Option<String>) -> Self {
        Self::with_transport(Arc::new(HttpTransport::new(endpoint, api_key)))
    }

    pub fn with_transport(transport: Arc<dyn PhoenixTransport>) -> Self {
        Self { transport }
    }

    /// Body of the dataset upload: one example per item.
    ///
    /// Inputs carry the question, contexts and the precomputed metric
    /// columns; outputs carry the answer. Each example's metadata holds
    /// `upload_id` and `item_index` so the examples of this upload can be
    /// told apart from earlier versions.
    pub fn dataset_payload(summary: &RunSummary, action: UploadAction, upload_id: &str) -> Value {
        let identity = summary.identity();
        let mut inputs = Vec::with_capacity(summary.results.len());
        let mut outputs = Vec::with_capacity(summary.results.len());
        let mut metadata = Vec::with_capacity(summary.results.len());

        for (index, record) in summary.results.iter().enumerate() {
            let mut input = Map::new();
            input.insert("question".into(), json!(record.question));
            input.insert("contexts".into(), json!(record.contexts));
            for dimension in JudgeDimension::ALL {
                input.insert(dimension.key().into(), json!(record.judges.get(dimension)));
            }
            input.insert("overall_score".into(), json!(record.overall_score));
            input.insert("hit".into(), json!(record.hit));
            input.insert("duplicate_rate".into(), json!(record.duplicate_rate));
            inputs.push(Value::Object(input));

            outputs.push(json!({ "answer": record.answer }));

            let mut meta = json!({
                "experiment_name": identity.experiment_name,
                "run_id": identity.run_id,
                "variant": identity.variant,
                "ids": record.document_ids,
                "latency_ms": record.latency_ms,
                "upload_id": upload_id,
                "item_index": index,
            });
            if !record.sources.is_empty() {
                meta["sources"] = json!(record.sources);
            }
            metadata.push(meta);
        }

        json!({
            "action": action.as_str(),
            "name": dataset_name(&identity),
            "description": format!(
                "Offline evaluation of {} (variant {})",
                identity.experiment_name, identity.variant
            ),
            "inputs": inputs,
            "outputs": outputs,
            "metadata": metadata,
        })
    }

    /// Body of the experiment request: the run aggregates as metadata.
    pub fn experiment_payload(summary: &RunSummary, version_id: Option<&str>) -> Value {
        let mut aggregates = Map::new();
        aggregates.insert("n".into(), json!(summary.n));
        aggregates.insert("hit_rate".into(), json!(summary.hit_rate));
        aggregates.insert("avg_latency_ms".into(), json!(summary.avg_latency_ms));
        aggregates.insert("avg_duplicate_rate".into(), json!(summary.avg_duplicate_rate));
        for dimension in JudgeDimension::ALL {
            aggregates.insert(
                format!("{}_rate", dimension.key()),
                json!(summary.dimension_rate(dimension)),
            );
        }
        aggregates.insert("overall_score".into(), json!(summary.overall_score));
        aggregates.insert("primary_metric".into(), json!("overall_score"));
        aggregates.insert("experiment_name".into(), json!(summary.experiment_name));
        aggregates.insert("run_id".into(), json!(summary.run_id));
        aggregates.insert("variant".into(), json!(summary.variant));
        aggregates.insert("registered_at".into(), json!(Utc::now().to_rfc3339()));

        let mut body = json!({
            "name": dataset_name(&summary.identity()),
            "description": "Offline LLM-judge metrics",
            "metadata": aggregates,
        });
        if let Some(version) = version_id {
            body["version_id"] = json!(version);
        }
        body
    }

    /// Body of one experiment run: the item's scores as the task output.
    ///
    /// The run spans the item's measured latency starting at `started`.
    pub fn run_payload(record: &MetricRecord, example_id: &str, started: DateTime<Utc>) -> Value {
        let mut output = Map::new();
        output.insert("answer".into(), json!(record.answer));
        for dimension in JudgeDimension::ALL {
            output.insert(dimension.key().into(), json!(record.judges.get(dimension)));
        }
        output.insert("overall_score".into(), json!(record.overall_score));
        output.insert("hit".into(), json!(record.hit));
        output.insert("duplicate_rate".into(), json!(record.duplicate_rate));

        let ended = started + chrono::Duration::milliseconds(record.latency_ms.round() as i64);
        let mut body = json!({
            "dataset_example_id": example_id,
            "output": output,
            "repetition_number": 1,
            "start_time": started.to_rfc3339_opts(SecondsFormat::Millis, true),
            "end_time": ended.to_rfc3339_opts(SecondsFormat::Millis, true),
        });
        if let Some(error) = &record.chain_error {
            body["error"] = json!(error);
        }
        body
    }

    fn parse<T: for<'de> Deserialize<'de>>(body: &str) -> Result<T> {
        serde_json::from_str::<Envelope<T>>(body)
            .map(|e| e.data)
            .map_err(|e| EvalError::Registry(format!("Unexpected registry response: {}", e)))
    }

    /// Id of the dataset called exactly `name`, if there is one.
    async fn find_dataset(&self, name: &str) -> Result<Option<String>> {
        let body = self.transport.get("/v1/datasets", &[("name", name)]).await?;
        let datasets: Vec<DatasetEntry> = Self::parse(&body)?;
        Ok(datasets.into_iter().find(|d| d.name == name).map(|d| d.id))
    }

    async fn list_examples(&self, dataset_id: &str, version_id: Option<&str>) -> Result<Vec<DatasetExample>> {
        let path = format!("/v1/datasets/{}/examples", dataset_id);
        let query: Vec<(&str, &str)> = version_id.map(|v| ("version_id", v)).into_iter().collect();
        let body = self.transport.get(&path, &query).await?;
        let list: ExampleList = Self::parse(&body)?;
        Ok(list.examples)
    }
}

/// Example id for each of `n` items, taken from the examples of one upload.
///
/// Examples from other uploads (earlier versions of the same dataset) are
/// ignored; an item with no matching example gets `None`.
fn match_examples(examples: &[DatasetExample], upload_id: &str, n: usize) -> Vec<Option<String>> {
    let mut slots = vec![None; n];
    for example in examples {
        if example.metadata.get("upload_id").and_then(Value::as_str) != Some(upload_id) {
            continue;
        }
        let index = example.metadata.get("item_index").and_then(Value::as_u64);
        if let Some(slot) = index.and_then(|i| slots.get_mut(i as usize)) {
            *slot = Some(example.id.clone());
        }
    }
    slots
}

#[async_trait]
impl DatasetRegistry for PhoenixRegistry {
    async fn register(&self, summary: &RunSummary) -> Result<Option<RegistrationReceipt>> {
        let name = dataset_name(&summary.identity());
        let upload_id = Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true);

        let existing = self.find_dataset(&name).await?;
        let action = UploadAction::for_existing(existing.is_some());

        let body = self
            .transport
            .post(
                "/v1/datasets/upload?sync=true",
                &Self::dataset_payload(summary, action, &upload_id),
            )
            .await?;
        let dataset: UploadedDataset = Self::parse(&body)?;
        info!(
            name = %name,
            action = action.as_str(),
            rows = summary.results.len(),
            "dataset uploaded"
        );

        let body = self
            .transport
            .post(
                &format!("/v1/datasets/{}/experiments", dataset.dataset_id),
                &Self::experiment_payload(summary, dataset.version_id.as_deref()),
            )
            .await?;
        let experiment: Created = Self::parse(&body)?;

        let examples = self
            .list_examples(&dataset.dataset_id, dataset.version_id.as_deref())
            .await?;
        let matched = match_examples(&examples, &upload_id, summary.results.len());

        let started = Utc::now();
        let mut runs = 0;
        for (record, example_id) in summary.results.iter().zip(&matched) {
            let Some(example_id) = example_id else {
                warn!(question = %record.question, "no dataset example for item, run skipped");
                continue;
            };
            let body = self
                .transport
                .post(
                    &format!("/v1/experiments/{}/runs", experiment.id),
                    &Self::run_payload(record, example_id, started),
                )
                .await?;
            let _: Created = Self::parse(&body)?;
            runs += 1;
        }
        info!(name = %name, experiment = %experiment.id, runs, "experiment recorded");

        Ok(Some(RegistrationReceipt {
            dataset_name: name,
            dataset_id: dataset.dataset_id,
            version_id: dataset.version_id,
            experiment_id: Some(experiment.id),
            appended: action == UploadAction::Append,
            runs,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::chain::DocumentLocator;
    use crate::eval::judge::JudgeFlags;
    use crate::eval::results::tests::{identity, record};
    use std::sync::Mutex;

    const DATASET_ID: &str = "RGF0YXNldDox";

    fn summary() -> RunSummary {
        let flags = JudgeFlags {
            answer_clarity: true,
            ..JudgeFlags::default()
        };
        RunSummary::from_records(identity(), vec![record("q1", true, flags, 0.1)])
    }

    fn two_item_summary() -> RunSummary {
        let flags = JudgeFlags {
            answer_grounding: true,
            ..JudgeFlags::default()
        };
        let mut failed = record("q2", false, JudgeFlags::default(), 0.0);
        failed.chain_error = Some("connection refused".to_string());
        RunSummary::from_records(identity(), vec![record("q1", true, flags, 0.3), failed])
    }

    #[derive(Debug, Clone)]
    struct Call {
        method: &'static str,
        path: String,
        query: Vec<(String, String)>,
        body: Value,
    }

    /// In-memory Phoenix that answers the registration calls.
    #[derive(Default)]
    struct ScriptedPhoenix {
        existing: bool,
        calls: Mutex<Vec<Call>>,
        uploaded: Mutex<Option<Value>>,
    }

    impl ScriptedPhoenix {
        fn with_existing_dataset() -> Self {
            Self {
                existing: true,
                ..Self::default()
            }
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn examples(&self) -> Value {
            let mut examples = Vec::new();
            if self.existing {
                // Left over from the previous upload of the same run id.
                examples.push(json!({
                    "id": "stale-0",
                    "metadata": {"upload_id": "earlier", "item_index": 0}
                }));
            }
            if let Some(upload) = self.uploaded.lock().unwrap().as_ref() {
                for (i, meta) in upload["metadata"].as_array().into_iter().flatten().enumerate() {
                    examples.push(json!({"id": format!("ex-{}", i), "metadata": meta}));
                }
            }
            json!({"data": {"dataset_id": DATASET_ID, "version_id": "v2", "examples": examples}})
        }
    }

    #[async_trait]
    impl PhoenixTransport for ScriptedPhoenix {
        async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<String> {
            self.calls.lock().unwrap().push(Call {
                method: "GET",
                path: path.to_string(),
                query: query.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
                body: Value::Null,
            });

            let reply = if path == "/v1/datasets" {
                let name = query.iter().find(|(k, _)| *k == "name").map(|(_, v)| *v);
                let mut data = vec![json!({"id": "other", "name": "offline-eval:run-10"})];
                if self.existing {
                    data.push(json!({"id": DATASET_ID, "name": name}));
                }
                json!({"data": data, "next_cursor": null})
            } else if path.ends_with("/examples") {
                self.examples()
            } else {
                return Err(EvalError::Registry(format!("{} returned 404", path)));
            };
            Ok(reply.to_string())
        }

        async fn post(&self, path: &str, body: &Value) -> Result<String> {
            self.calls.lock().unwrap().push(Call {
                method: "POST",
                path: path.to_string(),
                query: Vec::new(),
                body: body.clone(),
            });

            let reply = if path.starts_with("/v1/datasets/upload") {
                if body["action"] == "create" && self.existing {
                    return Err(EvalError::Registry(format!("{} returned 409 Conflict", path)));
                }
                *self.uploaded.lock().unwrap() = Some(body.clone());
                json!({"data": {"dataset_id": DATASET_ID, "version_id": "v2"}})
            } else if path.ends_with("/experiments") {
                json!({"data": {"id": "exp-1"}})
            } else if path.ends_with("/runs") {
                let example = body["dataset_example_id"].as_str().unwrap_or_default();
                json!({"data": {"id": format!("run-{}", example)}})
            } else {
                return Err(EvalError::Registry(format!("{} returned 404", path)));
            };
            Ok(reply.to_string())
        }
    }

    #[test]
    fn test_dataset_name_is_deterministic() {
        assert_eq!(dataset_name(&identity()), "offline-eval:run-1");
        assert_eq!(dataset_name(&identity()), dataset_name(&identity()));
    }

    #[test]
    fn test_dataset_name_is_unambiguous() {
        let named = |experiment: &str, run_id: &str| {
            let mut id = identity();
            id.experiment_name = experiment.to_string();
            id.run_id = run_id.to_string();
            dataset_name(&id)
        };

        assert_ne!(named("a-b", "c"), named("a", "b-c"));
        assert_ne!(named("a:b", "c"), named("a", "b:c"));
        assert_ne!(named("exp", "feat/mmr"), named("exp", "feat mmr"));
        assert_eq!(named("a:b", "c"), "a%3Ab:c");
    }

    #[test]
    fn test_upload_action() {
        assert_eq!(UploadAction::for_existing(false), UploadAction::Create);
        assert_eq!(UploadAction::for_existing(true), UploadAction::Append);
        assert_eq!(UploadAction::Append.as_str(), "append");
    }

    #[test]
    fn test_dataset_payload() {
        let payload = PhoenixRegistry::dataset_payload(&summary(), UploadAction::Create, "u1");

        assert_eq!(payload["action"], "create");
        assert_eq!(payload["name"], "offline-eval:run-1");
        assert_eq!(payload["inputs"][0]["question"], "q1");
        assert_eq!(payload["inputs"][0]["answer_clarity"], true);
        assert_eq!(payload["inputs"][0]["retrieval_relevance"], false);
        assert_eq!(payload["inputs"][0]["hit"], true);
        assert_eq!(payload["outputs"][0]["answer"], "answer to q1");
        assert_eq!(payload["metadata"][0]["variant"], "baseline");
        assert_eq!(payload["metadata"][0]["ids"][1], "p7");
        assert_eq!(payload["metadata"][0]["upload_id"], "u1");
        assert_eq!(payload["metadata"][0]["item_index"], 0);
        assert!(payload["metadata"][0].get("sources").is_none());

        let payload = PhoenixRegistry::dataset_payload(&summary(), UploadAction::Append, "u1");
        assert_eq!(payload["action"], "append");
    }

    #[test]
    fn test_dataset_payload_carries_sources() {
        let mut rec = record("q1", true, JudgeFlags::default(), 0.0);
        rec.sources = vec![
            DocumentLocator {
                source: Some("manifesto.pdf".to_string()),
                page: Some(4),
            },
            DocumentLocator::default(),
        ];
        let summary = RunSummary::from_records(identity(), vec![rec]);

        let payload = PhoenixRegistry::dataset_payload(&summary, UploadAction::Create, "u1");
        let sources = &payload["metadata"][0]["sources"];
        assert_eq!(sources[0]["source"], "manifesto.pdf");
        assert_eq!(sources[0]["page"], 4);
        assert_eq!(sources[1], json!({}));
    }

    #[test]
    fn test_experiment_payload() {
        let payload = PhoenixRegistry::experiment_payload(&summary(), Some("v1"));

        assert_eq!(payload["version_id"], "v1");
        assert_eq!(payload["metadata"]["n"], 1);
        assert_eq!(payload["metadata"]["answer_clarity_rate"], 1.0);
        assert_eq!(payload["metadata"]["primary_metric"], "overall_score");
        assert!(payload["metadata"]["registered_at"].is_string());

        let payload = PhoenixRegistry::experiment_payload(&summary(), None);
        assert!(payload.get("version_id").is_none());
    }

    #[test]
    fn test_run_payload() {
        let summary = two_item_summary();
        let started = DateTime::parse_from_rfc3339("2026-01-02T03:04:05Z")
            .unwrap()
            .with_timezone(&Utc);

        let payload = PhoenixRegistry::run_payload(&summary.results[0], "ex-0", started);
        assert_eq!(payload["dataset_example_id"], "ex-0");
        assert_eq!(payload["repetition_number"], 1);
        assert_eq!(payload["output"]["answer_grounding"], true);
        assert_eq!(payload["output"]["answer_clarity"], false);
        assert_eq!(payload["output"]["overall_score"], 0.3);
        assert_eq!(payload["start_time"], "2026-01-02T03:04:05.000Z");
        assert_eq!(payload["end_time"], "2026-01-02T03:04:05.100Z");
        assert!(payload.get("error").is_none());

        let payload = PhoenixRegistry::run_payload(&summary.results[1], "ex-1", started);
        assert_eq!(payload["error"], "connection refused");
        assert_eq!(payload["output"]["overall_score"], 0.0);
    }

    #[test]
    fn test_match_examples_ignores_other_uploads() {
        let examples: Vec<DatasetExample> = serde_json::from_value(json!([
            {"id": "old", "metadata": {"upload_id": "earlier", "item_index": 0}},
            {"id": "b", "metadata": {"upload_id": "now", "item_index": 1}},
            {"id": "a", "metadata": {"upload_id": "now", "item_index": 0}},
            {"id": "far", "metadata": {"upload_id": "now", "item_index": 9}},
            {"id": "bare"}
        ]))
        .unwrap();

        let matched = match_examples(&examples, "now", 3);
        assert_eq!(
            matched,
            vec![Some("a".to_string()), Some("b".to_string()), None]
        );
    }

    #[test]
    fn test_parse_envelopes() {
        let dataset: UploadedDataset = PhoenixRegistry::parse(
            r#"{"data": {"dataset_id": "RGF0YXNldDox", "version_id": "v9"}}"#,
        )
        .unwrap();
        assert_eq!(dataset.dataset_id, "RGF0YXNldDox");
        assert_eq!(dataset.version_id.as_deref(), Some("v9"));

        let listed: Vec<DatasetEntry> = PhoenixRegistry::parse(
            r#"{"data": [{"id": "d1", "name": "x:y", "created_at": "2026-01-01"}], "next_cursor": null}"#,
        )
        .unwrap();
        assert_eq!(listed[0].id, "d1");

        let err = PhoenixRegistry::parse::<Created>(r#"{"error": "nope"}"#).unwrap_err();
        assert!(matches!(err, EvalError::Registry(_)));
    }

    #[tokio::test]
    async fn test_register_creates_new_dataset() {
        let phoenix = Arc::new(ScriptedPhoenix::default());
        let registry = PhoenixRegistry::with_transport(phoenix.clone());

        let receipt = registry.register(&two_item_summary()).await.unwrap().unwrap();
        assert_eq!(receipt.dataset_name, "offline-eval:run-1");
        assert_eq!(receipt.dataset_id, DATASET_ID);
        assert_eq!(receipt.version_id.as_deref(), Some("v2"));
        assert_eq!(receipt.experiment_id.as_deref(), Some("exp-1"));
        assert!(!receipt.appended);
        assert_eq!(receipt.runs, 2);

        let calls = phoenix.calls();
        let route: Vec<(&str, &str)> = calls.iter().map(|c| (c.method, c.path.as_str())).collect();
        assert_eq!(
            route,
            vec![
                ("GET", "/v1/datasets"),
                ("POST", "/v1/datasets/upload?sync=true"),
                ("POST", "/v1/datasets/RGF0YXNldDox/experiments"),
                ("GET", "/v1/datasets/RGF0YXNldDox/examples"),
                ("POST", "/v1/experiments/exp-1/runs"),
                ("POST", "/v1/experiments/exp-1/runs"),
            ]
        );
        assert_eq!(
            calls[0].query,
            vec![("name".to_string(), "offline-eval:run-1".to_string())]
        );
        assert_eq!(calls[1].body["action"], "create");
        assert_eq!(
            calls[3].query,
            vec![("version_id".to_string(), "v2".to_string())]
        );
        assert_eq!(calls[4].body["dataset_example_id"], "ex-0");
        assert_eq!(calls[4].body["output"]["overall_score"], 0.3);
        assert_eq!(calls[5].body["dataset_example_id"], "ex-1");
        assert_eq!(calls[5].body["error"], "connection refused");
    }

    #[tokio::test]
    async fn test_register_appends_to_existing_dataset() {
        let phoenix = Arc::new(ScriptedPhoenix::with_existing_dataset());
        let registry = PhoenixRegistry::with_transport(phoenix.clone());

        let receipt = registry.register(&two_item_summary()).await.unwrap().unwrap();
        assert!(receipt.appended);
        assert_eq!(receipt.dataset_id, DATASET_ID);
        assert_eq!(receipt.runs, 2);

        let calls = phoenix.calls();
        let upload = calls
            .iter()
            .find(|c| c.path.starts_with("/v1/datasets/upload"))
            .unwrap();
        assert_eq!(upload.body["action"], "append");
        assert_eq!(upload.body["name"], "offline-eval:run-1");

        let run_examples: Vec<&Value> = calls
            .iter()
            .filter(|c| c.path.ends_with("/runs"))
            .map(|c| &c.body["dataset_example_id"])
            .collect();
        assert_eq!(run_examples, vec![&json!("ex-0"), &json!("ex-1")]);
    }

    #[tokio::test]
    async fn test_registering_twice_succeeds() {
        let phoenix = Arc::new(ScriptedPhoenix::default());
        let registry = PhoenixRegistry::with_transport(phoenix.clone());
        let first = registry.register(&summary()).await.unwrap().unwrap();
        assert!(!first.appended);

        let phoenix = Arc::new(ScriptedPhoenix::with_existing_dataset());
        let registry = PhoenixRegistry::with_transport(phoenix);
        let second = registry.register(&summary()).await.unwrap().unwrap();
        assert!(second.appended);
        assert_eq!(first.dataset_name, second.dataset_name);
    }

    #[tokio::test]
    async fn test_lookup_failure_is_a_registry_error() {
        struct Down;

        #[async_trait]
        impl PhoenixTransport for Down {
            async fn get(&self, path: &str, _query: &[(&str, &str)]) -> Result<String> {
                Err(EvalError::Registry(format!("{} returned 503", path)))
            }

            async fn post(&self, path: &str, _body: &Value) -> Result<String> {
                Err(EvalError::Registry(format!("{} returned 503", path)))
            }
        }

        let registry = PhoenixRegistry::with_transport(Arc::new(Down));
        let err = registry.register(&summary()).await.unwrap_err();
        assert!(matches!(err, EvalError::Registry(_)));
    }

    #[test]
    fn test_registry_from_config() {
        let disabled = RegistryConfig::default();
        assert!(!disabled.enabled());

        let enabled = RegistryConfig {
            endpoint: Some("http://127.0.0.1:6006/".to_string()),
            api_key: None,
        };
        assert!(enabled.enabled());
        let transport = HttpTransport::new("http://127.0.0.1:6006/", None);
        assert_eq!(transport.endpoint, "http://127.0.0.1:6006");
        let _ = registry_from_config(&enabled);
    }

    #[tokio::test]
    async fn test_noop_registry_registers_nothing() {
        let receipt = NoopRegistry.register(&summary()).await.unwrap();
        assert!(receipt.is_none());
    }
}
