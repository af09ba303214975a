//! LLM-as-judge panel: five independent categorical graders.
//!
//! Each judge formats its template, asks the model, and reduces the free-text
//! reply to one label of its rail set. Any failure along the way becomes a
//! [`JudgeOutcome::Failure`] for that dimension only.

use crate::error::Result;
use crate::llm::{JudgeModel, Prompts};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Substituted for `{contexts}` when nothing was retrieved.
pub const NO_CONTEXT_PLACEHOLDER: &str = "(no retrieved context)";

/// Separates retrieved snippets inside a judge prompt.
pub const CONTEXT_DELIMITER: &str = "\n---\n";

/// One grading dimension of the panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JudgeDimension {
    RetrievalRelevance,
    RetrievalCorrectness,
    AnswerGrounding,
    AnswerAccuracy,
    AnswerClarity,
}

impl JudgeDimension {
    /// All dimensions in report order.
    pub const ALL: [JudgeDimension; 5] = [
        JudgeDimension::RetrievalRelevance,
        JudgeDimension::RetrievalCorrectness,
        JudgeDimension::AnswerGrounding,
        JudgeDimension::AnswerAccuracy,
        JudgeDimension::AnswerClarity,
    ];

    /// Metric key used in configuration, CSV headers and trace attributes.
    pub fn key(&self) -> &'static str {
        match self {
            JudgeDimension::RetrievalRelevance => "retrieval_relevance",
            JudgeDimension::RetrievalCorrectness => "retrieval_correctness",
            JudgeDimension::AnswerGrounding => "answer_grounding",
            JudgeDimension::AnswerAccuracy => "answer_accuracy",
            JudgeDimension::AnswerClarity => "answer_clarity",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.key() == key)
    }

    /// Valid labels, positive rail first. The first rail is also the
    /// fallback when a reply names none of them.
    pub fn rails(&self) -> &'static [&'static str] {
        match self {
            JudgeDimension::RetrievalRelevance => &["relevant", "irrelevant"],
            JudgeDimension::RetrievalCorrectness => &["correct", "incorrect"],
            JudgeDimension::AnswerGrounding => &["grounded", "not_grounded"],
            JudgeDimension::AnswerAccuracy => &["accurate", "inaccurate"],
            JudgeDimension::AnswerClarity => &["clear", "unclear"],
        }
    }

    pub fn positive_rail(&self) -> &'static str {
        self.rails()[0]
    }

    fn template(&self) -> &'static str {
        match self {
            JudgeDimension::RetrievalRelevance => Prompts::retrieval_relevance(),
            JudgeDimension::RetrievalCorrectness => Prompts::retrieval_correctness(),
            JudgeDimension::AnswerGrounding => Prompts::answer_grounding(),
            JudgeDimension::AnswerAccuracy => Prompts::answer_accuracy(),
            JudgeDimension::AnswerClarity => Prompts::answer_clarity(),
        }
    }
}

impl fmt::Display for JudgeDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// How a label was recovered from the judge reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelSource {
    /// An explicit `LABEL:` line.
    LabelLine,
    /// A rail token found somewhere in the text.
    TokenScan,
    /// Nothing matched; the first rail was assumed.
    Default,
}

/// Extract a rail label from a free-text judge reply.
///
/// Lines are scanned bottom-up for a case-insensitive `label:` prefix whose
/// value names a rail. Failing that, the whole text is searched for the first
/// rail (in declared order) occurring as a standalone token, so `unclear`
/// never counts as `clear`. Failing that, the first rail is returned.
pub fn extract_label(text: &str, rails: &[&'static str]) -> (&'static str, LabelSource) {
    for line in text.lines().rev().map(str::trim).filter(|l| !l.is_empty()) {
        let Some(prefix) = line.get(..6) else {
            continue;
        };
        if !prefix.eq_ignore_ascii_case("label:") {
            continue;
        }

        let value = line[6..]
            .trim()
            .trim_matches(|c: char| matches!(c, '"' | '\'' | '`' | '*') || c.is_whitespace())
            .trim_end_matches('.');

        if let Some(rail) = rails.iter().find(|r| r.eq_ignore_ascii_case(value)) {
            return (*rail, LabelSource::LabelLine);
        }
    }

    let lowered = text.to_lowercase();
    if let Some(rail) = rails.iter().find(|r| contains_token(&lowered, r)) {
        return (*rail, LabelSource::TokenScan);
    }

    (rails[0], LabelSource::Default)
}

/// Case-sensitive search for `needle` bounded by non-word characters.
fn contains_token(haystack: &str, needle: &str) -> bool {
    let is_word = |c: char| c.is_alphanumeric() || c == '_';

    haystack.match_indices(needle).any(|(start, _)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + needle.len()..].chars().next();
        !before.is_some_and(is_word) && !after.is_some_and(is_word)
    })
}

/// Join retrieved snippets for a prompt, or the placeholder if there are none.
pub fn format_contexts(contexts: &[String]) -> String {
    let joined = contexts
        .iter()
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
        .collect::<Vec<_>>()
        .join(CONTEXT_DELIMITER);

    if joined.is_empty() {
        NO_CONTEXT_PLACEHOLDER.to_string()
    } else {
        joined
    }
}

/// Single-pass `{name}` substitution; substituted text is never rescanned.
fn fill_template(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];

        let matched = values.iter().find(|(name, _)| {
            tail[1..].starts_with(name) && tail[1 + name.len()..].starts_with('}')
        });

        match matched {
            Some((name, value)) => {
                out.push_str(value);
                rest = &tail[name.len() + 2..];
            }
            None => {
                out.push('{');
                rest = &tail[1..];
            }
        }
    }

    out.push_str(rest);
    out
}

/// What a judge gets to see for one item.
#[derive(Debug, Clone, Copy)]
pub struct JudgeInput<'a> {
    pub question: &'a str,
    pub answer: &'a str,
    pub contexts: &'a [String],
}

/// Render the prompt for one dimension.
pub fn render_prompt(dimension: JudgeDimension, input: &JudgeInput<'_>) -> String {
    let contexts = format_contexts(input.contexts);
    fill_template(
        dimension.template(),
        &[
            ("question", input.question),
            ("answer", input.answer),
            ("contexts", contexts.as_str()),
        ],
    )
}

/// A parsed judge reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeVerdict {
    pub dimension: JudgeDimension,
    pub label: String,
    /// Full model reply, kept for audit whatever path produced the label.
    pub explanation: String,
    pub source: LabelSource,
}

impl JudgeVerdict {
    pub fn from_reply(dimension: JudgeDimension, reply: String) -> Self {
        let (label, source) = extract_label(&reply, dimension.rails());
        Self {
            dimension,
            label: label.to_string(),
            explanation: reply,
            source,
        }
    }

    pub fn is_positive(&self) -> bool {
        self.label.eq_ignore_ascii_case(self.dimension.positive_rail())
    }
}

/// Result of one judge call after the catch-and-default boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum JudgeOutcome {
    Success(bool),
    Failure(String),
}

impl JudgeOutcome {
    /// Boolean used for scoring; failures count as `false`.
    pub fn passed(&self) -> bool {
        matches!(self, JudgeOutcome::Success(true))
    }

    pub fn failure(&self) -> Option<&str> {
        match self {
            JudgeOutcome::Failure(reason) => Some(reason),
            JudgeOutcome::Success(_) => None,
        }
    }
}

/// One dimension's outcome plus the verdict it came from, if any.
#[derive(Debug, Clone)]
pub struct JudgeAssessment {
    pub dimension: JudgeDimension,
    pub outcome: JudgeOutcome,
    pub verdict: Option<JudgeVerdict>,
}

/// The five judge booleans of one item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JudgeFlags {
    pub retrieval_relevance: bool,
    pub retrieval_correctness: bool,
    pub answer_grounding: bool,
    pub answer_accuracy: bool,
    pub answer_clarity: bool,
}

impl JudgeFlags {
    pub fn get(&self, dimension: JudgeDimension) -> bool {
        match dimension {
            JudgeDimension::RetrievalRelevance => self.retrieval_relevance,
            JudgeDimension::RetrievalCorrectness => self.retrieval_correctness,
            JudgeDimension::AnswerGrounding => self.answer_grounding,
            JudgeDimension::AnswerAccuracy => self.answer_accuracy,
            JudgeDimension::AnswerClarity => self.answer_clarity,
        }
    }

    fn set(&mut self, dimension: JudgeDimension, value: bool) {
        match dimension {
            JudgeDimension::RetrievalRelevance => self.retrieval_relevance = value,
            JudgeDimension::RetrievalCorrectness => self.retrieval_correctness = value,
            JudgeDimension::AnswerGrounding => self.answer_grounding = value,
            JudgeDimension::AnswerAccuracy => self.answer_accuracy = value,
            JudgeDimension::AnswerClarity => self.answer_clarity = value,
        }
    }
}

/// All five assessments of one item.
#[derive(Debug, Clone)]
pub struct PanelReport {
    pub assessments: Vec<JudgeAssessment>,
}

impl PanelReport {
    /// Every dimension failed for the same reason, without calling the model.
    pub fn skipped(reason: &str) -> Self {
        Self {
            assessments: JudgeDimension::ALL
                .into_iter()
                .map(|dimension| JudgeAssessment {
                    dimension,
                    outcome: JudgeOutcome::Failure(reason.to_string()),
                    verdict: None,
                })
                .collect(),
        }
    }

    pub fn flags(&self) -> JudgeFlags {
        let mut flags = JudgeFlags::default();
        for assessment in &self.assessments {
            flags.set(assessment.dimension, assessment.outcome.passed());
        }
        flags
    }

    pub fn explanations(&self) -> BTreeMap<JudgeDimension, String> {
        self.assessments
            .iter()
            .filter_map(|a| {
                a.verdict
                    .as_ref()
                    .map(|v| (a.dimension, v.explanation.clone()))
            })
            .collect()
    }

    pub fn failures(&self) -> BTreeMap<JudgeDimension, String> {
        self.assessments
            .iter()
            .filter_map(|a| a.outcome.failure().map(|r| (a.dimension, r.to_string())))
            .collect()
    }
}

/// Five LLM judges sharing one injected model.
#[derive(Clone)]
pub struct JudgePanel {
    model: Arc<dyn JudgeModel>,
    concurrent: bool,
}

impl JudgePanel {
    /// Create a panel over the given model. Judges run one after another.
    pub fn new(model: Arc<dyn JudgeModel>) -> Self {
        Self {
            model,
            concurrent: false,
        }
    }

    /// Issue the five judge calls of an item concurrently.
    pub fn with_concurrency(mut self, concurrent: bool) -> Self {
        self.concurrent = concurrent;
        self
    }

    /// Run one judge and parse its reply. Errors are returned, not swallowed.
    pub async fn judge(
        &self,
        dimension: JudgeDimension,
        input: &JudgeInput<'_>,
    ) -> Result<JudgeVerdict> {
        let prompt = render_prompt(dimension, input);
        let reply = self.model.invoke(&prompt).await?;
        let verdict = JudgeVerdict::from_reply(dimension, reply);

        debug!(
            dimension = dimension.key(),
            label = verdict.label.as_str(),
            source = ?verdict.source,
            "judge verdict"
        );

        Ok(verdict)
    }

    /// Run one judge behind the catch-and-default boundary.
    pub async fn assess(&self, dimension: JudgeDimension, input: &JudgeInput<'_>) -> JudgeAssessment {
        match self.judge(dimension, input).await {
            Ok(verdict) => JudgeAssessment {
                dimension,
                outcome: JudgeOutcome::Success(verdict.is_positive()),
                verdict: Some(verdict),
            },
            Err(err) => {
                warn!(dimension = dimension.key(), error = %err, "judge failed, scoring false");
                JudgeAssessment {
                    dimension,
                    outcome: JudgeOutcome::Failure(err.to_string()),
                    verdict: None,
                }
            }
        }
    }

    /// Run all five judges for one item.
    pub async fn assess_all(&self, input: &JudgeInput<'_>) -> PanelReport {
        let assessments = if self.concurrent {
            let (relevance, correctness, grounding, accuracy, clarity) = tokio::join!(
                self.assess(JudgeDimension::RetrievalRelevance, input),
                self.assess(JudgeDimension::RetrievalCorrectness, input),
                self.assess(JudgeDimension::AnswerGrounding, input),
                self.assess(JudgeDimension::AnswerAccuracy, input),
                self.assess(JudgeDimension::AnswerClarity, input),
            );
            vec![relevance, correctness, grounding, accuracy, clarity]
        } else {
            let mut assessments = Vec::with_capacity(JudgeDimension::ALL.len());
            for dimension in JudgeDimension::ALL {
                assessments.push(self.assess(dimension, input).await);
            }
            assessments
        };

        PanelReport { assessments }
    }

    async fn passes(&self, dimension: JudgeDimension, input: JudgeInput<'_>) -> bool {
        self.assess(dimension, &input).await.outcome.passed()
    }

    /// Are the retrieved snippets relevant to the question?
    pub async fn retrieval_relevance(&self, question: &str, contexts: &[String]) -> bool {
        let input = JudgeInput { question, answer: "", contexts };
        self.passes(JudgeDimension::RetrievalRelevance, input).await
    }

    /// Do the retrieved snippets suffice to answer the question?
    pub async fn retrieval_correctness(&self, question: &str, contexts: &[String]) -> bool {
        let input = JudgeInput { question, answer: "", contexts };
        self.passes(JudgeDimension::RetrievalCorrectness, input).await
    }

    /// Is the answer supported by the retrieved snippets?
    pub async fn answer_grounding(&self, question: &str, contexts: &[String], answer: &str) -> bool {
        let input = JudgeInput { question, answer, contexts };
        self.passes(JudgeDimension::AnswerGrounding, input).await
    }

    /// Is the answer factually correct given the retrieved snippets?
    pub async fn answer_accuracy(&self, question: &str, contexts: &[String], answer: &str) -> bool {
        let input = JudgeInput { question, answer, contexts };
        self.passes(JudgeDimension::AnswerAccuracy, input).await
    }

    /// Is the answer clear? Sees no retrieved context.
    pub async fn answer_clarity(&self, question: &str, answer: &str) -> bool {
        let input = JudgeInput { question, answer, contexts: &[] };
        self.passes(JudgeDimension::AnswerClarity, input).await
    }
}
