//! Judge prompt templates.
//!
//! Placeholders `{question}`, `{answer}` and `{contexts}` are substituted by
//! the judge panel. Every template ends by asking for a single `LABEL:` line.

/// Collection of prompts used by the judge panel.
pub struct Prompts;

impl Prompts {
    /// Is the answer precise, coherent and on point?
    pub fn answer_clarity() -> &'static str {
        r#"You will evaluate the clarity of an assistant's answer to a user's question.
Clear answers are precise, coherent, and directly address the question without unnecessary complexity.

[BEGIN DATA]
question: {question}
answer: {answer}
[END DATA]

Provide an explanation first. Then output a single label.
EXPLANATION: step-by-step reasoning about clarity
LABEL: clear or unclear"#
    }

    /// Are the retrieved snippets topically relevant to the question?
    pub fn retrieval_relevance() -> &'static str {
        r#"You will evaluate whether the retrieved context snippets are relevant to the user's question.
Relevant means they are topically aligned and can help answer the question.

[BEGIN DATA]
question: {question}
retrieved_context:
{contexts}
[END DATA]

Provide an explanation first. Then output a single label.
EXPLANATION: reasoning about relevance to the question
LABEL: relevant or irrelevant"#
    }

    /// Do the retrieved snippets contain what is needed to answer?
    pub fn retrieval_correctness() -> &'static str {
        r#"You will judge whether the retrieved context snippets are sufficient and correct to answer the user's question.
Correct/sufficient means they contain the key facts needed without obvious contradictions.

[BEGIN DATA]
question: {question}
retrieved_context:
{contexts}
[END DATA]

Provide an explanation first. Then output a single label.
EXPLANATION: reasoning about sufficiency and correctness
LABEL: correct or incorrect"#
    }

    /// Is every claim in the answer supported by the retrieved snippets?
    pub fn answer_grounding() -> &'static str {
        r#"You will judge whether the assistant's answer is grounded in and supported by the retrieved context snippets.
Grounded means claims in the answer are justified by the provided context and do not contradict it.

[BEGIN DATA]
question: {question}
retrieved_context:
{contexts}
answer: {answer}
[END DATA]

Provide an explanation first. Then output a single label.
EXPLANATION: reasoning about grounding and consistency
LABEL: grounded or not_grounded"#
    }

    /// Is the answer factually correct given the retrieved snippets?
    pub fn answer_accuracy() -> &'static str {
        r#"You will judge the factual accuracy of the assistant's answer with respect to the retrieved context snippets.
Accurate means the answer's statements are factually correct given the provided context.

[BEGIN DATA]
question: {question}
retrieved_context:
{contexts}
answer: {answer}
[END DATA]

Provide an explanation first. Then output a single label.
EXPLANATION: reasoning about factual accuracy
LABEL: accurate or inaccurate"#
    }
}
