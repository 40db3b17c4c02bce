//! Human-readable citations for the timeline: APA-like, MLA and Chicago
//! renderings without a CSL engine.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use unicode_normalization::UnicodeNormalization;

use crate::bibtex::split_bibtex_authors;
use crate::models::{CitationStyle, Reference};

static SYMBOL_ACCENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\\(['"`^~=.])\s*(?:\{\s*([A-Za-z])\s*\}|([A-Za-z]))"#).unwrap());
static LETTER_ACCENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\([Hcuvdkr])\s*(?:\{\s*([A-Za-z])\s*\}|\s([A-Za-z]))").unwrap());
static TEXT_COMMAND_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\[A-Za-z]+\s*\{").unwrap());
static SPECIAL_LETTER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\(ss|aa|AA|ae|AE|oe|OE|o|O|l|L)\b").unwrap());
static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

const SHORTHAND_ACCENTS: &[char] = &['\'', '"', '`', '^', '~', '=', '.', 'H', 'c', 'u', 'v'];

pub fn format_citation(reference: &Reference, style: CitationStyle) -> String {
    let year = reference
        .year
        .map(|y| y.to_string())
        .unwrap_or_else(|| "n.d.".to_string());
    let title = clean_bibtex_text(reference.title.as_deref().unwrap_or_default());
    let venue = clean_bibtex_text(reference.venue.as_deref().unwrap_or_default());
    let link = doi_url(reference.doi.as_deref(), reference.url.as_deref());

    let mut parts: Vec<String> = Vec::new();
    match style {
        CitationStyle::Mla => {
            let authors = clean_bibtex_text(reference.authors.as_deref().unwrap_or_default());
            if !authors.is_empty() {
                parts.push(terminated(&authors));
            }
            if !title.is_empty() {
                parts.push(format!("\"{}\"", terminated(&title)));
            }
            if !venue.is_empty() {
                parts.push(format!("{},", venue));
            }
            parts.push(format!("{}.", year));
        }
        CitationStyle::Chicago => {
            let authors = clean_bibtex_text(reference.authors.as_deref().unwrap_or_default());
            if !authors.is_empty() {
                parts.push(terminated(&authors));
            }
            if !title.is_empty() {
                parts.push(terminated(&title));
            }
            if !venue.is_empty() {
                parts.push(terminated(&venue));
            }
            parts.push(format!("{}.", year));
        }
        CitationStyle::Apa => {
            let authors = format_authors_apa(reference.authors.as_deref().unwrap_or_default());
            if !authors.is_empty() {
                parts.push(authors);
            }
            parts.push(format!("({}).", year));
            if !title.is_empty() {
                parts.push(terminated(&title));
            }
            if !venue.is_empty() {
                parts.push(terminated(&venue));
            }
        }
    }
    if !link.is_empty() {
        parts.push(link);
    }

    parts.join(" ")
}

/// Appends a period unless the text already ends a sentence.
fn terminated(text: &str) -> String {
    if text.ends_with(['.', '?', '!']) {
        text.to_string()
    } else {
        format!("{}.", text)
    }
}

fn doi_url(doi: Option<&str>, url: Option<&str>) -> String {
    if let Some(doi) = doi.map(str::trim).filter(|d| !d.is_empty()) {
        let d = doi.strip_prefix("https://doi.org/").unwrap_or(doi);
        let d = d.strip_prefix("http://doi.org/").unwrap_or(d);
        let d = d.strip_prefix("doi:").unwrap_or(d);
        return format!("https://doi.org/{}", d);
    }
    url.map(str::trim).unwrap_or_default().to_string()
}

fn format_authors_apa(raw: &str) -> String {
    let cleaned = clean_bibtex_text(raw);
    let formatted: Vec<String> = split_bibtex_authors(&cleaned)
        .into_iter()
        .map(name_last_first_initials)
        .collect();

    match formatted.as_slice() {
        [] => String::new(),
        [one] => one.clone(),
        [first, second] => format!("{} & {}", first, second),
        [rest @ .., last] => format!("{}, & {}", rest.join(", "), last),
    }
}

/// `Last, First Middle` and `First Middle Last` both become `Last, F. M.`.
fn name_last_first_initials(name: &str) -> String {
    if let Some((last, rest)) = name.split_once(',') {
        let out = format!("{}, {}", last.trim(), initials(rest));
        return out.trim().trim_end_matches(',').to_string();
    }

    let parts: Vec<&str> = name.split_whitespace().collect();
    match parts.split_last() {
        Some((last, firsts)) if !firsts.is_empty() => {
            let out = format!("{}, {}", last, initials(&firsts.join(" ")));
            out.trim().trim_end_matches(',').to_string()
        }
        Some((only, _)) => only.to_string(),
        None => String::new(),
    }
}

fn initials(given: &str) -> String {
    given
        .split_whitespace()
        .filter_map(|p| p.chars().next())
        .map(|c| format!("{}.", c.to_uppercase()))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Turns BibTeX/LaTeX-ish text into readable Unicode: TeX accents (also the
/// backslash-less shorthand `'{e}`) are composed, text commands are unwrapped,
/// capitalization braces are dropped and whitespace is collapsed.
pub fn clean_bibtex_text(s: &str) -> String {
    let s = s.trim();
    if s.is_empty() {
        return String::new();
    }

    let s = restore_accent_backslashes(s);
    let s = SYMBOL_ACCENT_RE.replace_all(&s, |caps: &Captures| accent_replacement(caps));
    let s = LETTER_ACCENT_RE.replace_all(&s, |caps: &Captures| accent_replacement(caps));
    let s = SPECIAL_LETTER_RE.replace_all(&s, |caps: &Captures| special_letter(&caps[1]));
    let s = s
        .replace("\\&", "&")
        .replace("\\%", "%")
        .replace("\\_", "_")
        .replace("\\$", "$")
        .replace("---", "\u{2014}")
        .replace("--", "\u{2013}");
    let s = TEXT_COMMAND_RE.replace_all(&s, "{");
    let s = s.replace(['{', '}'], "");
    let s: String = s.as_str().nfc().collect();

    WHITESPACE_RE.replace_all(&s, " ").trim().to_string()
}

fn restore_accent_backslashes(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::with_capacity(s.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        let escaped = i > 0 && chars[i - 1] == '\\';
        let opens_group = chars.get(i + 1) == Some(&'{');
        // A lone letter before a brace is only an accent when it does not end a word.
        let word_tail = c.is_ascii_alphabetic() && i > 0 && chars[i - 1].is_alphanumeric();
        if SHORTHAND_ACCENTS.contains(&c) && opens_group && !escaped && !word_tail {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn special_letter(command: &str) -> &'static str {
    match command {
        "ss" => "ß",
        "aa" => "å",
        "AA" => "Å",
        "ae" => "æ",
        "AE" => "Æ",
        "oe" => "œ",
        "OE" => "Œ",
        "o" => "ø",
        "O" => "Ø",
        "l" => "ł",
        _ => "Ł",
    }
}

fn accent_replacement(caps: &Captures) -> String {
    let letter = caps
        .get(2)
        .or_else(|| caps.get(3))
        .map(|m| m.as_str())
        .unwrap_or_default();
    let combining = match &caps[1] {
        "'" => '\u{0301}',
        "`" => '\u{0300}',
        "^" => '\u{0302}',
        "\"" => '\u{0308}',
        "~" => '\u{0303}',
        "=" => '\u{0304}',
        "." => '\u{0307}',
        "H" => '\u{030B}',
        "c" => '\u{0327}',
        "u" => '\u{0306}',
        "v" => '\u{030C}',
        "d" => '\u{0323}',
        "k" => '\u{0328}',
        "r" => '\u{030A}',
        _ => return caps[0].to_string(),
    };
    format!("{}{}", letter, combining)
}
