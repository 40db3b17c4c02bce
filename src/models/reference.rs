use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    pub id: Uuid,
    pub bibtex_key: Option<String>,
    pub bibtex_raw: Option<String>,
    pub csl_json: Option<serde_json::Value>,
    pub title: Option<String>,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    pub authors: Option<String>,
    pub year: Option<i32>,
    pub venue: Option<String>,
    pub doi: Option<String>,
    pub url: Option<String>,
    pub fingerprint: String,
}

/// Row payload for inserting a reference; the store assigns the id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewReference {
    pub bibtex_key: Option<String>,
    pub bibtex_raw: String,
    pub csl_json: serde_json::Value,
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub authors: Option<String>,
    pub year: Option<i32>,
    pub venue: Option<String>,
    pub doi: Option<String>,
    pub url: Option<String>,
    pub fingerprint: String,
}

impl NewReference {
    pub fn into_reference(self, id: Uuid) -> Reference {
        Reference {
            id,
            bibtex_key: self.bibtex_key,
            bibtex_raw: Some(self.bibtex_raw),
            csl_json: Some(self.csl_json),
            title: Some(self.title),
            abstract_text: Some(self.abstract_text),
            authors: self.authors,
            year: self.year,
            venue: self.venue,
            doi: self.doi,
            url: self.url,
            fingerprint: self.fingerprint,
        }
    }
}
