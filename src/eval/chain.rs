//! Boundary to the conversational retrieval chain under evaluation.
//!
//! The engine only sees a question go in and an answer plus retrieved
//! documents come out. How the chain retrieves or generates is not our concern.

use crate::config::ChainConfig;
use crate::error::{EvalError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

/// One document the chain retrieved for a question.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievedDocument {
    /// Producer-assigned identifier; empty when the producer set none.
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// Where a retrieved document came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentLocator {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, alias = "page_number", skip_serializing_if = "Option::is_none")]
    pub page: Option<u64>,
}

impl DocumentLocator {
    pub fn is_empty(&self) -> bool {
        self.source.is_none() && self.page.is_none()
    }
}

impl RetrievedDocument {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            metadata: Map::new(),
        }
    }

    /// Build from raw chain metadata; the identifier is `metadata.id`.
    pub fn from_metadata(content: impl Into<String>, metadata: Map<String, Value>) -> Self {
        let id = match metadata.get("id") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };
        Self {
            id,
            content: content.into(),
            metadata,
        }
    }

    /// Typed view of the source locator carried in the metadata.
    pub fn locator(&self) -> DocumentLocator {
        serde_json::from_value(Value::Object(self.metadata.clone())).unwrap_or_default()
    }
}

/// What the chain produced for one question.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChainOutcome {
    pub answer: String,
    pub documents: Vec<RetrievedDocument>,
}

impl ChainOutcome {
    pub fn new(answer: impl Into<String>, documents: Vec<RetrievedDocument>) -> Self {
        Self {
            answer: answer.into(),
            documents,
        }
    }

    /// The state a failed chain call is evaluated on.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn document_ids(&self) -> Vec<String> {
        self.documents.iter().map(|d| d.id.clone()).collect()
    }

    /// One locator per document, aligned with [`Self::document_ids`].
    ///
    /// Empty when no document carries a source or page.
    pub fn sources(&self) -> Vec<DocumentLocator> {
        let locators: Vec<DocumentLocator> = self.documents.iter().map(|d| d.locator()).collect();
        if locators.iter().all(DocumentLocator::is_empty) {
            Vec::new()
        } else {
            locators
        }
    }

    /// Non-empty document texts, in retrieval order.
    pub fn contexts(&self) -> Vec<String> {
        self.documents
            .iter()
            .filter(|d| !d.content.is_empty())
            .map(|d| d.content.clone())
            .collect()
    }
}

/// A question-answering chain that reports its sources.
#[async_trait]
pub trait RetrievalChain: Send + Sync {
    async fn ask(&self, question: &str) -> Result<ChainOutcome>;
}

#[derive(Debug, Serialize)]
struct ChainRequest<'a> {
    question: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChainResponse {
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    source_documents: Vec<SourceDocument>,
}

#[derive(Debug, Deserialize)]
struct SourceDocument {
    #[serde(default)]
    page_content: Option<String>,
    #[serde(default)]
    metadata: Map<String, Value>,
}

/// Chain served over HTTP.
///
/// POSTs `{"question": ...}` and expects
/// `{"answer": ..., "source_documents": [{"page_content": ..., "metadata": {...}}]}`.
#[derive(Clone)]
pub struct HttpChain {
    client: Client,
    endpoint: String,
}

impl HttpChain {
    pub fn new(config: &ChainConfig) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder
            .build()
            .map_err(|e| EvalError::Config(format!("Failed to build chain client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
        })
    }

    fn parse_response(body: &str) -> Result<ChainOutcome> {
        let response: ChainResponse = serde_json::from_str(body).map_err(|e| {
            EvalError::ChainInvocation(format!("Unexpected chain response: {}", e))
        })?;

        let documents = response
            .source_documents
            .into_iter()
            .map(|d| RetrievedDocument::from_metadata(d.page_content.unwrap_or_default(), d.metadata))
            .collect();

        Ok(ChainOutcome::new(response.answer.unwrap_or_default(), documents))
    }
}

#[async_trait]
impl RetrievalChain for HttpChain {
    async fn ask(&self, question: &str) -> Result<ChainOutcome> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&ChainRequest { question })
            .send()
            .await
            .map_err(|e| EvalError::ChainInvocation(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| EvalError::ChainInvocation(e.to_string()))?;

        if !status.is_success() {
            return Err(EvalError::ChainInvocation(format!(
                "Chain returned {}: {}",
                status, body
            )));
        }

        Self::parse_response(&body)
    }
}
