//! JSON file provider.
//!
//! Reads a conference export from disk. The file may be a top-level array of
//! records or an object wrapping the array under `results`, `papers` or
//! `notes` (the NeurIPS virtual-site and OpenReview shapes).

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

use super::lightweight::{convert_record, RecordDefaults};
use super::{PaperProvider, ProviderError, ProviderResult};
use crate::models::Paper;

const WRAPPER_KEYS: [&str; 3] = ["results", "papers", "notes"];

/// Provider over a JSON export file, parsed once at construction.
#[derive(Debug, Clone)]
pub struct JsonFilePaperProvider {
    path: PathBuf,
    name: String,
    papers: Vec<Paper>,
}

impl JsonFilePaperProvider {
    /// Read and normalize every record in `path`.
    ///
    /// # Errors
    /// Returns `ProviderError::IoError` if the file cannot be read and
    /// `ProviderError::ParseError` if it is not a recognised JSON shape
    pub async fn from_file(path: impl AsRef<Path>, defaults: RecordDefaults) -> ProviderResult<Self> {
        let path = path.as_ref().to_path_buf();
        let raw = tokio::fs::read_to_string(&path).await?;
        let mut provider = Self::from_json_str(&raw, defaults)?;
        provider.name = format!("json:{}", path.display());
        provider.path = path;
        Ok(provider)
    }

    /// Normalize records from an in-memory JSON document.
    pub fn from_json_str(raw: &str, defaults: RecordDefaults) -> ProviderResult<Self> {
        let document: Value =
            serde_json::from_str(raw).map_err(|e| ProviderError::ParseError(e.to_string()))?;
        let records = extract_records(&document)?;

        let papers: Vec<Paper> = records
            .iter()
            .filter_map(|record| convert_record(record, &defaults))
            .collect();

        let dropped = records.len() - papers.len();
        if dropped > 0 {
            debug!(dropped, "skipped records without a title");
        }
        info!(
            papers = papers.len(),
            conference = %defaults.conference,
            year = defaults.year,
            "loaded paper records"
        );

        Ok(Self {
            path: PathBuf::new(),
            name: "json:<memory>".to_string(),
            papers,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn extract_records(document: &Value) -> ProviderResult<&Vec<Value>> {
    match document {
        Value::Array(records) => Ok(records),
        Value::Object(obj) => WRAPPER_KEYS
            .iter()
            .find_map(|key| obj.get(*key).and_then(Value::as_array))
            .ok_or_else(|| {
                ProviderError::ParseError(format!(
                    "expected an array or an object with one of {:?}",
                    WRAPPER_KEYS
                ))
            }),
        _ => Err(ProviderError::ParseError(
            "top-level JSON value must be an array or object".to_string(),
        )),
    }
}

#[async_trait]
impl PaperProvider for JsonFilePaperProvider {
    async fn fetch_papers(&self) -> ProviderResult<Vec<Paper>> {
        Ok(self.papers.clone())
    }

    async fn count_papers(&self) -> ProviderResult<usize> {
        Ok(self.papers.len())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn defaults() -> RecordDefaults {
        RecordDefaults::new("ICLR", 2025)
    }

    #[test]
    fn test_top_level_array() {
        let provider = JsonFilePaperProvider::from_json_str(
            r#"[{"title": "A"}, {"abstract": "no title"}, {"name": "B"}]"#,
            defaults(),
        )
        .unwrap();
        let titles: Vec<_> = provider.papers.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, vec!["A", "B"]);
    }

    #[test]
    fn test_wrapped_results() {
        let provider = JsonFilePaperProvider::from_json_str(
            r#"{"count": 1, "next": null, "results": [{"title": "A", "id": 7}]}"#,
            defaults(),
        )
        .unwrap();
        assert_eq!(provider.papers.len(), 1);
        assert_eq!(provider.papers[0].uid, "7");
        assert_eq!(provider.papers[0].conference, "ICLR");
    }

    #[test]
    fn test_unrecognised_shapes() {
        assert!(matches!(
            JsonFilePaperProvider::from_json_str(r#"{"items": []}"#, defaults()),
            Err(ProviderError::ParseError(_))
        ));
        assert!(matches!(
            JsonFilePaperProvider::from_json_str("42", defaults()),
            Err(ProviderError::ParseError(_))
        ));
        assert!(matches!(
            JsonFilePaperProvider::from_json_str("{not json", defaults()),
            Err(ProviderError::ParseError(_))
        ));
    }

    #[tokio::test]
    async fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"papers": [{{"title": "A"}}, {{"title": "B"}}]}}"#).unwrap();

        let provider = JsonFilePaperProvider::from_file(file.path(), defaults())
            .await
            .unwrap();
        assert_eq!(provider.count_papers().await.unwrap(), 2);
        assert_eq!(provider.fetch_papers_limit(1).await.unwrap().len(), 1);
        assert!(provider.name().starts_with("json:"));
        assert_eq!(provider.path(), file.path());
    }

    #[tokio::test]
    async fn test_missing_file() {
        let result = JsonFilePaperProvider::from_file("/nonexistent/papers.json", defaults()).await;
        assert!(matches!(result, Err(ProviderError::IoError(_))));
    }
}
