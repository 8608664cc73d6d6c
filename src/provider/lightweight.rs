//! Lightweight schema conversion.
//!
//! Conference exports disagree on nearly every field: authors arrive as
//! objects, as plain strings or as one delimited string; keywords as lists or
//! comma-separated text; awards either in their own field or hidden in the
//! decision. [`convert_record`] maps any of these shapes onto [`Paper`].

use std::fmt;
use std::str::FromStr;

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::embedding::normalize_text;
use crate::models::Paper;

/// Conferences with known export formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conference {
    NeurIPS,
    ICLR,
    ICML,
    ML4PS,
}

impl Conference {
    pub fn display_name(&self) -> &'static str {
        match self {
            Conference::NeurIPS => "NeurIPS",
            Conference::ICLR => "ICLR",
            Conference::ICML => "ICML",
            Conference::ML4PS => "ML4PS",
        }
    }
}

impl fmt::Display for Conference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for Conference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "neurips" | "nips" => Ok(Conference::NeurIPS),
            "iclr" => Ok(Conference::ICLR),
            "icml" => Ok(Conference::ICML),
            "ml4ps" => Ok(Conference::ML4PS),
            other => Err(format!("unknown conference '{}'", other)),
        }
    }
}

/// Values used when a record does not carry its own conference or year.
#[derive(Debug, Clone)]
pub struct RecordDefaults {
    pub conference: String,
    pub year: i32,
}

impl RecordDefaults {
    pub fn new(conference: impl Into<String>, year: i32) -> Self {
        Self {
            conference: conference.into(),
            year,
        }
    }
}

/// Convert one raw export record into a [`Paper`].
///
/// Returns `None` for records that are not objects or have no non-empty
/// title (neither `title` nor `name`).
pub fn convert_record(record: &Value, defaults: &RecordDefaults) -> Option<Paper> {
    let obj = record.as_object()?;

    let title = first_text(obj, &["title", "name"])?;
    let abstract_text = first_text(obj, &["abstract", "abstract_text", "summary"]).unwrap_or_default();

    let conference = first_text(obj, &["conference", "venue"])
        .unwrap_or_else(|| defaults.conference.clone());
    let year = obj
        .get("year")
        .and_then(value_as_i32)
        .unwrap_or(defaults.year);

    let decision = first_text(obj, &["decision"]);
    let award = extract_award(obj, decision.as_deref());

    let uid = obj
        .get("uid")
        .or_else(|| obj.get("id"))
        .and_then(scalar_text)
        .unwrap_or_else(|| derive_uid(&conference, year, &title));

    Some(Paper {
        uid,
        title,
        abstract_text,
        authors: obj.get("authors").map(extract_authors).unwrap_or_default(),
        session: first_text(obj, &["session"]),
        decision,
        topic: first_text(obj, &["topic", "primary_area"]),
        keywords: obj.get("keywords").map(normalize_keywords).unwrap_or_default(),
        award,
        url: first_text(obj, &["url", "virtualsite_url", "paper_url"]),
        year,
        conference,
    })
}

/// Author names from a list of objects, a list of strings or one delimited string.
pub fn extract_authors(value: &Value) -> Vec<String> {
    let raw: Vec<String> = match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.clone()),
                Value::Object(author) => author_object_name(author),
                _ => None,
            })
            .collect(),
        Value::String(s) => {
            let separator = if s.contains(';') { ';' } else { ',' };
            s.split(separator).map(String::from).collect()
        }
        _ => Vec::new(),
    };

    raw.iter()
        .map(|name| sanitize_author(name))
        .filter(|name| !name.is_empty())
        .collect()
}

fn author_object_name(author: &Map<String, Value>) -> Option<String> {
    if let Some(name) = first_text(author, &["fullname", "name", "full_name"]) {
        return Some(name);
    }
    let first = first_text(author, &["first_name", "firstname"]).unwrap_or_default();
    let last = first_text(author, &["last_name", "lastname"]).unwrap_or_default();
    let joined = format!("{} {}", first, last).trim().to_string();
    (!joined.is_empty()).then_some(joined)
}

/// Make an author name safe for `;`-delimited storage.
pub fn sanitize_author(name: &str) -> String {
    name.replace(';', ",")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_matches(',')
        .trim()
        .to_string()
}

/// Keywords from a list or a comma/semicolon separated string.
pub fn normalize_keywords(value: &Value) -> Vec<String> {
    let raw: Vec<String> = match value {
        Value::Array(items) => items.iter().filter_map(scalar_text).collect(),
        Value::String(s) => s.split([',', ';']).map(String::from).collect(),
        _ => Vec::new(),
    };
    raw.into_iter()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .collect()
}

/// An explicit `award`, else a decision mentioning an award.
fn extract_award(obj: &Map<String, Value>, decision: Option<&str>) -> Option<String> {
    if let Some(award) = first_text(obj, &["award"]) {
        return Some(award);
    }
    decision
        .filter(|d| d.to_lowercase().contains("award"))
        .map(String::from)
}

/// Stable id for records that do not carry one.
pub fn derive_uid(conference: &str, year: i32, title: &str) -> String {
    let key = format!("{}|{}|{}", conference.to_lowercase(), year, normalize_text(title));
    let digest = Sha256::digest(key.as_bytes());
    hex::encode(&digest[..8])
}

/// First non-empty string (or number) among `keys`.
fn first_text(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| obj.get(*key))
        .filter_map(scalar_text)
        .next()
}

fn scalar_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

fn value_as_i32(value: &Value) -> Option<i32> {
    match value {
        Value::Number(n) => n.as_i64().and_then(|v| i32::try_from(v).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn defaults() -> RecordDefaults {
        RecordDefaults::new("NeurIPS", 2025)
    }

    #[test]
    fn test_conference_parsing() {
        assert_eq!("neurips".parse::<Conference>().unwrap(), Conference::NeurIPS);
        assert_eq!("NIPS".parse::<Conference>().unwrap(), Conference::NeurIPS);
        assert_eq!(" ML4PS ".parse::<Conference>().unwrap(), Conference::ML4PS);
        assert!("cvpr".parse::<Conference>().is_err());
        assert_eq!(Conference::ICLR.to_string(), "ICLR");
    }

    #[test]
    fn test_full_neurips_record() {
        let record = json!({
            "id": 12345,
            "name": "Attention Is Still All You Need",
            "abstract": "We revisit attention.",
            "authors": [
                {"fullname": "Ada Lovelace", "institution": "X"},
                {"first_name": "Alan", "last_name": "Turing"}
            ],
            "session": "Oral Session 1",
            "decision": "Accept (oral)",
            "topic": "Deep Learning/Attention",
            "keywords": "attention, transformers ,",
            "virtualsite_url": "https://neurips.cc/virtual/2025/poster/12345"
        });

        let paper = convert_record(&record, &defaults()).unwrap();
        assert_eq!(paper.uid, "12345");
        assert_eq!(paper.title, "Attention Is Still All You Need");
        assert_eq!(paper.authors, vec!["Ada Lovelace", "Alan Turing"]);
        assert_eq!(paper.keywords, vec!["attention", "transformers"]);
        assert_eq!(paper.session.as_deref(), Some("Oral Session 1"));
        assert_eq!(paper.award, None);
        assert_eq!(paper.url.as_deref(), Some("https://neurips.cc/virtual/2025/poster/12345"));
        assert_eq!(paper.year, 2025);
        assert_eq!(paper.conference, "NeurIPS");
    }

    #[test]
    fn test_title_takes_precedence_over_name() {
        let record = json!({"title": "Title", "name": "Name"});
        assert_eq!(convert_record(&record, &defaults()).unwrap().title, "Title");
    }

    #[test]
    fn test_records_without_title_are_dropped() {
        assert!(convert_record(&json!({"abstract": "x"}), &defaults()).is_none());
        assert!(convert_record(&json!({"title": "   "}), &defaults()).is_none());
        assert!(convert_record(&json!("not an object"), &defaults()).is_none());
    }

    #[test]
    fn test_author_shapes() {
        assert_eq!(
            extract_authors(&json!(["A One", "B Two"])),
            vec!["A One", "B Two"]
        );
        assert_eq!(
            extract_authors(&json!("A One; B Two;C Three")),
            vec!["A One", "B Two", "C Three"]
        );
        assert_eq!(extract_authors(&json!("A One, B Two")), vec!["A One", "B Two"]);
        assert_eq!(extract_authors(&json!([{"name": "  Spaced   Name "}, {}])), vec!["Spaced Name"]);
        assert!(extract_authors(&json!(null)).is_empty());
    }

    #[test]
    fn test_sanitize_author_removes_semicolons() {
        assert_eq!(sanitize_author("Smith; John"), "Smith, John");
        assert_eq!(sanitize_author("Trailing;"), "Trailing");
        assert!(!sanitize_author("a;b;c").contains(';'));
    }

    #[test]
    fn test_keywords_shapes() {
        assert_eq!(normalize_keywords(&json!(["a", " b ", ""])), vec!["a", "b"]);
        assert_eq!(normalize_keywords(&json!("a; b, c")), vec!["a", "b", "c"]);
        assert!(normalize_keywords(&json!(42)).is_empty());
    }

    #[test]
    fn test_award_extraction() {
        let explicit = json!({"title": "T", "award": "Best Paper", "decision": "Accept"});
        assert_eq!(
            convert_record(&explicit, &defaults()).unwrap().award.as_deref(),
            Some("Best Paper")
        );

        let from_decision = json!({"title": "T", "decision": "Outstanding Paper AWARD"});
        assert_eq!(
            convert_record(&from_decision, &defaults()).unwrap().award.as_deref(),
            Some("Outstanding Paper AWARD")
        );

        let none = json!({"title": "T", "decision": "Accept (poster)", "award": ""});
        assert!(convert_record(&none, &defaults()).unwrap().award.is_none());
    }

    #[test]
    fn test_record_overrides_defaults() {
        let record = json!({"title": "T", "year": "2023", "venue": "ICLR"});
        let paper = convert_record(&record, &defaults()).unwrap();
        assert_eq!(paper.year, 2023);
        assert_eq!(paper.conference, "ICLR");
    }

    #[test]
    fn test_derived_uid_is_stable() {
        let a = convert_record(&json!({"title": "Same  Title"}), &defaults()).unwrap();
        let b = convert_record(&json!({"title": "same title"}), &defaults()).unwrap();
        let c = convert_record(&json!({"title": "same title", "year": 2024}), &defaults()).unwrap();

        assert_eq!(a.uid, b.uid);
        assert_ne!(a.uid, c.uid);
        assert_eq!(a.uid.len(), 16);
    }

    #[test]
    fn test_empty_optional_fields_become_none() {
        let record = json!({"title": "T", "session": "", "decision": null, "topic": " "});
        let paper = convert_record(&record, &defaults()).unwrap();
        assert!(paper.session.is_none());
        assert!(paper.decision.is_none());
        assert!(paper.topic.is_none());
        assert_eq!(paper.abstract_text, "");
    }
}
