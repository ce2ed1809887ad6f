//! Core data models.
//!
//! Criteria and executions are read by the enqueue guard; tweet candidates
//! and quotes flow through the ingestion pipeline.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::Error;

/// A stored search definition driving the scraper. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Criteria {
    pub id: i64,
    pub name: String,
    pub all_of_these_words: Vec<String>,
    pub this_exact_phrase: String,
    pub any_of_these_words: Vec<String>,
    pub none_of_these_words: Vec<String>,
    pub these_hashtags: Vec<String>,
    pub language: String,
    pub since: NaiveDate,
    pub until: NaiveDate,
}

/// A criteria definition before it has been assigned an identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCriteria {
    pub name: String,
    #[serde(default)]
    pub all_of_these_words: Vec<String>,
    #[serde(default)]
    pub this_exact_phrase: String,
    #[serde(default)]
    pub any_of_these_words: Vec<String>,
    #[serde(default)]
    pub none_of_these_words: Vec<String>,
    #[serde(default)]
    pub these_hashtags: Vec<String>,
    pub language: String,
    pub since: NaiveDate,
    pub until: NaiveDate,
}

impl NewCriteria {
    /// Rejects definitions that could never match anything.
    pub fn validate(&self) -> Result<(), Error> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidInput("criteria name must not be empty".into()));
        }
        if self.since > self.until {
            return Err(Error::InvalidInput(format!(
                "since ({}) must not be after until ({})",
                self.since, self.until
            )));
        }
        Ok(())
    }

    pub fn with_id(self, id: i64) -> Criteria {
        Criteria {
            id,
            name: self.name,
            all_of_these_words: self.all_of_these_words,
            this_exact_phrase: self.this_exact_phrase,
            any_of_these_words: self.any_of_these_words,
            none_of_these_words: self.none_of_these_words,
            these_hashtags: self.these_hashtags,
            language: self.language,
            since: self.since,
            until: self.until,
        }
    }
}

/// Body handed to the scraper worker when a criteria is dispatched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriteriaPayload {
    pub id: i64,
    pub name: String,
    pub all_of_these_words: Vec<String>,
    pub this_exact_phrase: String,
    pub any_of_these_words: Vec<String>,
    pub none_of_these_words: Vec<String>,
    pub these_hashtags: Vec<String>,
    pub language: String,
    pub since: NaiveDate,
    pub until: NaiveDate,
}

impl From<&Criteria> for CriteriaPayload {
    fn from(c: &Criteria) -> Self {
        Self {
            id: c.id,
            name: c.name.clone(),
            all_of_these_words: c.all_of_these_words.clone(),
            this_exact_phrase: c.this_exact_phrase.clone(),
            any_of_these_words: c.any_of_these_words.clone(),
            none_of_these_words: c.none_of_these_words.clone(),
            these_hashtags: c.these_hashtags.clone(),
            language: c.language.clone(),
            since: c.since,
            until: c.until,
        }
    }
}

/// Lifecycle status of an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExecutionStatus {
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "IN PROGRESS")]
    InProgress,
    #[serde(rename = "DONE")]
    Done,
    #[serde(rename = "FAILED")]
    Failed,
}

impl ExecutionStatus {
    /// Statuses that block a non-forced enqueue.
    pub const ACTIVE: [ExecutionStatus; 2] = [ExecutionStatus::Pending, ExecutionStatus::InProgress];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::InProgress => "IN PROGRESS",
            Self::Done => "DONE",
            Self::Failed => "FAILED",
        }
    }

    pub fn is_active(&self) -> bool {
        Self::ACTIVE.contains(self)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "IN PROGRESS" => Ok(Self::InProgress),
            "DONE" => Ok(Self::Done),
            "FAILED" => Ok(Self::Failed),
            other => Err(Error::InvalidInput(format!("unknown execution status: '{}'", other))),
        }
    }
}

/// One dispatch attempt of a criteria.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Execution {
    pub id: i64,
    pub search_criteria_id: i64,
    pub status: ExecutionStatus,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Quoted-tweet content embedded in a tweet candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotePayload {
    /// Fingerprint supplied by the scraper; derived from content when absent.
    #[serde(default)]
    pub hash: Option<String>,
    #[serde(default)]
    pub is_a_reply: bool,
    #[serde(default)]
    pub text_content: String,
    #[serde(default)]
    pub images: Vec<String>,
}

impl QuotePayload {
    /// Dedup key of the quote.
    ///
    /// Fields are length-prefixed before hashing so that moving bytes
    /// between the text and an image reference changes the fingerprint.
    pub fn fingerprint(&self) -> String {
        if let Some(hash) = self.hash.as_deref().filter(|h| !h.is_empty()) {
            return hash.to_string();
        }

        let mut hasher = Sha256::new();
        hasher.update([self.is_a_reply as u8]);
        hasher.update((self.text_content.len() as u64).to_le_bytes());
        hasher.update(self.text_content.as_bytes());
        hasher.update((self.images.len() as u64).to_le_bytes());
        for image in &self.images {
            hasher.update((image.len() as u64).to_le_bytes());
            hasher.update(image.as_bytes());
        }
        hex::encode(hasher.finalize())
    }
}

/// A persisted quote row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Quote {
    pub id: i64,
    pub hash: String,
    pub is_a_reply: bool,
    pub text_content: String,
    pub images: Vec<String>,
}

/// A tweet as received from the scraper, before its quote is resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TweetCandidate {
    pub hash: String,
    #[serde(default)]
    pub is_a_reply: bool,
    #[serde(default)]
    pub text_content: String,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub quote: Option<QuotePayload>,
    pub search_criteria_id: i64,
}

/// A tweet row ready for the bulk insert, with its quote resolved to an id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewTweet {
    pub hash: String,
    pub is_a_reply: bool,
    pub text_content: String,
    pub images: Vec<String>,
    pub quote_id: Option<i64>,
    pub search_criteria_id: i64,
}

impl NewTweet {
    pub fn from_candidate(candidate: &TweetCandidate, quote_id: Option<i64>) -> Self {
        Self {
            hash: candidate.hash.clone(),
            is_a_reply: candidate.is_a_reply,
            text_content: candidate.text_content.clone(),
            images: candidate.images.clone(),
            quote_id,
            search_criteria_id: candidate.search_criteria_id,
        }
    }
}

/// A persisted tweet row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tweet {
    pub id: i64,
    pub hash: String,
    pub is_a_reply: bool,
    pub text_content: String,
    pub images: Vec<String>,
    pub quote_id: Option<i64>,
    pub search_criteria_id: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quote(text: &str, images: &[&str]) -> QuotePayload {
        QuotePayload {
            hash: None,
            is_a_reply: false,
            text_content: text.to_string(),
            images: images.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_fingerprint_stable_for_same_content() {
        assert_eq!(quote("hola", &["a.png"]).fingerprint(), quote("hola", &["a.png"]).fingerprint());
    }

    #[test]
    fn test_fingerprint_respects_field_boundaries() {
        let a = quote("ab", &["c"]);
        let b = quote("a", &["bc"]);
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_fingerprint_prefers_supplied_hash() {
        let mut q = quote("hola", &[]);
        q.hash = Some("quote-123".into());
        assert_eq!(q.fingerprint(), "quote-123");

        q.hash = Some(String::new());
        assert_eq!(q.fingerprint().len(), 64);
    }

    #[test]
    fn test_status_round_trips_through_wire_names() {
        for status in [
            ExecutionStatus::Pending,
            ExecutionStatus::InProgress,
            ExecutionStatus::Done,
            ExecutionStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<ExecutionStatus>().unwrap(), status);
        }
        assert_eq!(
            serde_json::to_string(&ExecutionStatus::InProgress).unwrap(),
            "\"IN PROGRESS\""
        );
        assert!("RUNNING".parse::<ExecutionStatus>().is_err());
    }

    #[test]
    fn test_payload_carries_every_term_set() {
        let criteria = NewCriteria {
            name: "elecciones".into(),
            all_of_these_words: vec!["voto".into()],
            this_exact_phrase: "segunda vuelta".into(),
            any_of_these_words: vec!["urna".into(), "boleta".into()],
            none_of_these_words: vec!["spam".into()],
            these_hashtags: vec!["#elecciones".into()],
            language: "es".into(),
            since: NaiveDate::from_ymd_opt(2023, 10, 1).unwrap(),
            until: NaiveDate::from_ymd_opt(2023, 11, 30).unwrap(),
        }
        .with_id(7);

        let payload = CriteriaPayload::from(&criteria);
        assert_eq!(payload.id, 7);
        assert_eq!(payload.any_of_these_words, vec!["urna", "boleta"]);
        assert_eq!(payload.none_of_these_words, vec!["spam"]);
        assert_eq!(payload.this_exact_phrase, "segunda vuelta");
    }

    #[test]
    fn test_new_criteria_rejects_inverted_window() {
        let c = NewCriteria {
            name: "x".into(),
            all_of_these_words: vec![],
            this_exact_phrase: String::new(),
            any_of_these_words: vec![],
            none_of_these_words: vec![],
            these_hashtags: vec![],
            language: "en".into(),
            since: NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
            until: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        };
        assert!(matches!(c.validate(), Err(Error::InvalidInput(_))));
    }
}
