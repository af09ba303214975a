//! Gold-set loading.
//!
//! A gold set is a JSON array of items:
//! ```json
//! [
//!   {"question": "What is the minimum wage proposal?", "expected_keywords": ["wage", "minimum"]},
//!   {"question": "Who leads the party?"}
//! ]
//! ```
//! The wrapped form `{"items": [...]}` is accepted as well.

use crate::error::{EvalError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// One question with the keywords a good answer should mention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoldItem {
    pub question: String,
    /// Lower-cased, trimmed, de-duplicated, in file order.
    pub expected_keywords: Vec<String>,
}

impl GoldItem {
    pub fn new<I, S>(question: impl Into<String>, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            question: question.into(),
            expected_keywords: normalize_keywords(keywords),
        }
    }
}

fn normalize_keywords<I, S>(keywords: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut normalized: Vec<String> = Vec::new();
    for keyword in keywords {
        let keyword = keyword.as_ref().trim().to_lowercase();
        if !keyword.is_empty() && !normalized.contains(&keyword) {
            normalized.push(keyword);
        }
    }
    normalized
}

#[derive(Debug, Deserialize)]
struct RawGoldItem {
    question: String,
    #[serde(default)]
    expected_keywords: Option<Vec<String>>,
}

/// An ordered, immutable collection of gold items.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GoldSet {
    pub items: Vec<GoldItem>,
}

impl GoldSet {
    pub fn new(items: Vec<GoldItem>) -> Self {
        Self { items }
    }

    /// Number of items in the gold set.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The first `n` items, in order.
    pub fn take(&self, n: usize) -> Self {
        Self {
            items: self.items.iter().take(n).cloned().collect(),
        }
    }

    /// Items with no expected keywords can never score a hit.
    pub fn items_without_keywords(&self) -> usize {
        self.items
            .iter()
            .filter(|i| i.expected_keywords.is_empty())
            .count()
    }

    /// Load a gold set from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(EvalError::GoldsetNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).map_err(|e| EvalError::io(path, e))?;
        Self::from_json(&content)
    }

    /// Parse a gold set from JSON text.
    pub fn from_json(content: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(content)
            .map_err(|e| EvalError::InvalidGoldset(format!("not valid JSON: {}", e)))?;

        let raw_items = match value {
            serde_json::Value::Array(items) => items,
            serde_json::Value::Object(mut map) => match map.remove("items") {
                Some(serde_json::Value::Array(items)) => items,
                _ => {
                    return Err(EvalError::InvalidGoldset(
                        "expected a top-level array or an object with an 'items' array".to_string(),
                    ));
                }
            },
            _ => {
                return Err(EvalError::InvalidGoldset(
                    "expected a top-level array of items".to_string(),
                ));
            }
        };

        for (index, item) in raw_items.iter().enumerate() {
            if !item.get("question").is_some_and(|q| q.is_string()) {
                return Err(EvalError::InvalidGoldset(format!(
                    "item {} has no string 'question' field",
                    index
                )));
            }
        }

        let raw: Vec<RawGoldItem> = serde_json::from_value(serde_json::Value::Array(raw_items))
            .map_err(|e| EvalError::InvalidGoldset(e.to_string()))?;

        Ok(Self {
            items: raw
                .into_iter()
                .map(|r| GoldItem::new(r.question, r.expected_keywords.unwrap_or_default()))
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_top_level_array() {
        let gold = GoldSet::from_json(
            r#"[
                {"question": "What is the minimum wage proposal?", "expected_keywords": ["wage", "minimum"]},
                {"question": "Who leads the party?"}
            ]"#,
        )
        .unwrap();

        assert_eq!(gold.len(), 2);
        assert_eq!(gold.items[0].expected_keywords, vec!["wage", "minimum"]);
        assert!(gold.items[1].expected_keywords.is_empty());
        assert_eq!(gold.items_without_keywords(), 1);
    }

    #[test]
    fn test_load_wrapped_items() {
        let gold = GoldSet::from_json(r#"{"items": [{"question": "q1"}, {"question": "q2"}]}"#)
            .unwrap();
        let questions: Vec<_> = gold.items.iter().map(|i| i.question.as_str()).collect();
        assert_eq!(questions, vec!["q1", "q2"]);
    }

    #[test]
    fn test_keywords_are_normalized() {
        let item = GoldItem::new("q", [" Wage ", "wage", "", "MINIMUM"]);
        assert_eq!(item.expected_keywords, vec!["wage", "minimum"]);
    }

    #[test]
    fn test_missing_question_is_configuration_error() {
        let err = GoldSet::from_json(r#"[{"question": "ok"}, {"expected_keywords": ["x"]}]"#)
            .unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("item 1"));
    }

    #[test]
    fn test_malformed_documents_are_rejected() {
        assert!(GoldSet::from_json("not json").unwrap_err().is_fatal());
        assert!(GoldSet::from_json(r#"{"questions": []}"#).unwrap_err().is_fatal());
        assert!(GoldSet::from_json(r#""just a string""#).unwrap_err().is_fatal());
        assert!(
            GoldSet::from_json(r#"[{"question": "q", "expected_keywords": "wage"}]"#)
                .unwrap_err()
                .is_fatal()
        );
    }

    #[test]
    fn test_empty_gold_set_is_valid() {
        let gold = GoldSet::from_json("[]").unwrap();
        assert!(gold.is_empty());
    }

    #[test]
    fn test_load_missing_file() {
        let err = GoldSet::load(Path::new("/definitely/not/here/gold.json")).unwrap_err();
        assert!(matches!(err, EvalError::GoldsetNotFound(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"[{{"question": "q", "expected_keywords": ["k"]}}]"#).unwrap();

        let gold = GoldSet::load(file.path()).unwrap();
        assert_eq!(gold.items, vec![GoldItem::new("q", ["k"])]);
    }

    #[test]
    fn test_take_keeps_order() {
        let gold = GoldSet::new(vec![
            GoldItem::new("a", Vec::<String>::new()),
            GoldItem::new("b", Vec::<String>::new()),
            GoldItem::new("c", Vec::<String>::new()),
        ]);
        let subset = gold.take(2);
        assert_eq!(subset.len(), 2);
        assert_eq!(subset.items[1].question, "b");
    }
}
