//! Parsing and normalization of a single pasted BibTeX entry.

use std::sync::LazyLock;

use biblatex::{Bibliography, ChunksExt, Entry, ParseError, ParseErrorKind};
use regex::Regex;
use serde_json::{Map, Value, json};
use sha2::{Digest, Sha256};

use crate::error::{AppError, AppResult};
use crate::models::NewReference;

static YEAR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d{4}").unwrap());
static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static NON_ALNUM_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9 ]+").unwrap());
static AUTHOR_SEP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+and\s+").unwrap());

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedBibtex {
    pub bibtex_key: Option<String>,
    pub bibtex_raw: String,
    pub title: String,
    pub abstract_text: String,
    pub authors: Option<String>,
    pub year: Option<i32>,
    pub venue: Option<String>,
    pub doi: Option<String>,
    pub url: Option<String>,
    pub csl_json: Value,
    pub fingerprint: String,
}

impl ParsedBibtex {
    pub fn to_new_reference(&self) -> NewReference {
        NewReference {
            bibtex_key: self.bibtex_key.clone(),
            bibtex_raw: self.bibtex_raw.clone(),
            csl_json: self.csl_json.clone(),
            title: self.title.clone(),
            abstract_text: self.abstract_text.clone(),
            authors: self.authors.clone(),
            year: self.year,
            venue: self.venue.clone(),
            doi: self.doi.clone(),
            url: self.url.clone(),
            fingerprint: self.fingerprint.clone(),
        }
    }
}

/// Parses exactly one BibTeX entry. Malformed input is a `Parse` error; a
/// missing or blank `title`/`abstract` is a `Validation` error.
pub fn parse_bibtex_entry(raw: &str) -> AppResult<ParsedBibtex> {
    let bibtex_raw = raw.trim();
    if bibtex_raw.is_empty() {
        return Err(AppError::Parse("BibTeX is empty".to_string()));
    }

    let bibliography = parse_bibliography(bibtex_raw)?;

    let mut entries = bibliography.into_iter();
    let entry = match (entries.next(), entries.next()) {
        (Some(entry), None) => entry,
        (None, _) => return Err(AppError::Parse("No BibTeX entries found".to_string())),
        (Some(_), Some(_)) => {
            return Err(AppError::Parse(
                "Please paste exactly one BibTeX entry".to_string(),
            ));
        }
    };

    let title = required_field(&entry, "title")?;
    let abstract_text = required_field(&entry, "abstract")?;

    let authors = optional_field(&entry, "author");
    let year = parse_year(optional_field(&entry, "year").as_deref());
    let venue = optional_field(&entry, "journal").or_else(|| optional_field(&entry, "booktitle"));
    let doi = optional_field(&entry, "doi");
    let url = optional_field(&entry, "url");

    let bibtex_key = Some(entry.key.trim().to_string()).filter(|k| !k.is_empty());
    let fingerprint = compute_fingerprint(&title, year, doi.as_deref());
    let csl_json = bibtex_to_csl_json(
        &title,
        &abstract_text,
        authors.as_deref(),
        year,
        venue.as_deref(),
        doi.as_deref(),
        url.as_deref(),
    );

    Ok(ParsedBibtex {
        bibtex_key,
        bibtex_raw: bibtex_raw.to_string(),
        title,
        abstract_text,
        authors,
        year,
        venue,
        doi,
        url,
        csl_json,
        fingerprint,
    })
}

/// Stable identity of a paper across pastes: normalized title, year and DOI.
pub fn compute_fingerprint(title: &str, year: Option<i32>, doi: Option<&str>) -> String {
    let norm_title = normalize_text(title);
    let norm_year = year.map(|y| y.to_string()).unwrap_or_default();
    let norm_doi = normalize_doi(doi);

    let base = [norm_title, norm_year, norm_doi].join("|");
    format!("{:x}", Sha256::digest(base.as_bytes()))
}

pub fn bibtex_to_csl_json(
    title: &str,
    abstract_text: &str,
    authors: Option<&str>,
    year: Option<i32>,
    venue: Option<&str>,
    doi: Option<&str>,
    url: Option<&str>,
) -> Value {
    let mut csl = Map::new();
    let kind = if venue.is_some() { "article-journal" } else { "article" };
    csl.insert("type".into(), kind.into());
    csl.insert("title".into(), title.into());
    csl.insert("abstract".into(), abstract_text.into());

    let author_list: Vec<Value> = split_bibtex_authors(authors.unwrap_or_default())
        .into_iter()
        .filter_map(parse_author)
        .collect();
    if !author_list.is_empty() {
        csl.insert("author".into(), Value::Array(author_list));
    }
    if let Some(year) = year {
        csl.insert("issued".into(), json!({"date-parts": [[year]]}));
    }
    if let Some(venue) = venue {
        csl.insert("container-title".into(), venue.into());
    }
    if let Some(doi) = doi {
        csl.insert("DOI".into(), doi.trim().into());
    }
    if let Some(url) = url {
        csl.insert("URL".into(), url.trim().into());
    }

    Value::Object(csl)
}

pub fn split_bibtex_authors(authors: &str) -> Vec<&str> {
    let authors = authors.trim();
    if authors.is_empty() {
        return Vec::new();
    }
    AUTHOR_SEP_RE
        .split(authors)
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .collect()
}

/// One BibTeX name as a CSL name object: `Family, Given`, `Given Family`, or
/// a single `literal` token.
fn parse_author(name: &str) -> Option<Value> {
    let name = name.trim();
    if name.is_empty() {
        return None;
    }

    if let Some((family, given)) = name.split_once(',') {
        let mut out = Map::new();
        out.insert("family".into(), family.trim().into());
        let given = given.trim();
        if !given.is_empty() {
            out.insert("given".into(), given.into());
        }
        return Some(Value::Object(out));
    }

    let parts: Vec<&str> = name.split_whitespace().collect();
    match parts.split_last() {
        Some((only, [])) => Some(json!({"literal": only})),
        Some((family, given)) => Some(json!({"given": given.join(" "), "family": family})),
        None => None,
    }
}

fn field_text(entry: &Entry, key: &str) -> Option<String> {
    entry
        .fields
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(key))
        .map(|(_, chunks)| chunks.format_verbatim())
}

fn optional_field(entry: &Entry, key: &str) -> Option<String> {
    field_text(entry, key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required_field(entry: &Entry, key: &str) -> AppResult<String> {
    optional_field(entry, key)
        .ok_or_else(|| AppError::Validation(format!("BibTeX must include '{}'", key)))
}

/// Upper bound on undefined `@string` abbreviations rewritten per entry.
const MAX_ABBREVIATION_FIXUPS: usize = 16;

/// Parses `raw`, keeping undefined bare-word abbreviations such as
/// `journal = JACS` as literal text instead of failing on them.
fn parse_bibliography(raw: &str) -> AppResult<Bibliography> {
    let mut source = raw.to_string();
    for _ in 0..MAX_ABBREVIATION_FIXUPS {
        match Bibliography::parse(&source) {
            Ok(bibliography) => return Ok(bibliography),
            Err(ParseError {
                span,
                kind: ParseErrorKind::UnknownAbbreviation(abbr),
            }) if source.get(span.clone()) == Some(abbr.as_str()) => {
                tracing::debug!(%abbr, "Keeping undefined abbreviation as text");
                source.replace_range(span, &format!("{{{}}}", abbr));
            }
            Err(e) => return Err(AppError::Parse(e.to_string())),
        }
    }
    Err(AppError::Parse("Too many undefined abbreviations".to_string()))
}

fn parse_year(raw: Option<&str>) -> Option<i32> {
    raw.and_then(|v| YEAR_RE.find(v))
        .and_then(|m| m.as_str().parse().ok())
}

fn normalize_text(s: &str) -> String {
    let s = s.trim().to_lowercase();
    let s = WHITESPACE_RE.replace_all(&s, " ");
    NON_ALNUM_RE.replace_all(&s, "").into_owned()
}

fn normalize_doi(doi: Option<&str>) -> String {
    let Some(doi) = doi else {
        return String::new();
    };
    let d = doi.trim().to_lowercase();
    let d = d.strip_prefix("https://doi.org/").unwrap_or(&d);
    let d = d.strip_prefix("http://doi.org/").unwrap_or(d);
    let d = d.strip_prefix("doi:").unwrap_or(d);
    d.to_string()
}
