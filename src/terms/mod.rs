//! Semantic term derivation. Ingestion stores the extractor's output as
//! `post_terms`; the dashboard reuses the tokenizer for trend counting.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;

pub const DEFAULT_MAX_TERMS: usize = 8;

static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\w\w+\b").unwrap());

static STOP_WORDS: LazyLock<HashSet<&'static str>> =
    LazyLock::new(|| ENGLISH_STOP_WORDS.iter().copied().collect());

const ENGLISH_STOP_WORDS: &[&str] = &[
    "a", "about", "above", "across", "after", "afterwards", "again", "against", "all", "almost",
    "alone", "along", "already", "also", "although", "always", "am", "among", "amongst", "an",
    "and", "another", "any", "anyhow", "anyone", "anything", "anyway", "anywhere", "are",
    "around", "as", "at", "back", "be", "became", "because", "become", "becomes", "becoming",
    "been", "before", "beforehand", "behind", "being", "below", "beside", "besides", "between",
    "beyond", "both", "bottom", "but", "by", "call", "can", "cannot", "could", "de", "describe",
    "detail", "do", "done", "down", "due", "during", "each", "eg", "either", "else", "elsewhere",
    "enough", "etc", "even", "ever", "every", "everyone", "everything", "everywhere", "except",
    "few", "find", "first", "for", "former", "formerly", "found", "from", "front", "full",
    "further", "get", "give", "go", "had", "has", "have", "he", "hence", "her", "here",
    "hereafter", "hereby", "herein", "hereupon", "hers", "herself", "him", "himself", "his",
    "how", "however", "ie", "if", "in", "inc", "indeed", "into", "is", "it", "its", "itself",
    "keep", "last", "latter", "latterly", "least", "less", "ltd", "made", "many", "may", "me",
    "meanwhile", "might", "more", "moreover", "most", "mostly", "move", "much", "must", "my",
    "myself", "name", "namely", "neither", "never", "nevertheless", "next", "no", "nobody",
    "none", "noone", "nor", "not", "nothing", "now", "nowhere", "of", "off", "often", "on",
    "once", "one", "only", "onto", "or", "other", "others", "otherwise", "our", "ours",
    "ourselves", "out", "over", "own", "part", "per", "perhaps", "please", "put", "rather", "re",
    "same", "see", "seem", "seemed", "seeming", "seems", "serious", "several", "she", "should",
    "show", "side", "since", "so", "some", "somehow", "someone", "something", "sometime",
    "sometimes", "somewhere", "still", "such", "take", "than", "that", "the", "their", "them",
    "themselves", "then", "thence", "there", "thereafter", "thereby", "therefore", "therein",
    "thereupon", "these", "they", "this", "those", "though", "through", "throughout", "thru",
    "thus", "to", "together", "too", "top", "toward", "towards", "un", "under", "until", "up",
    "upon", "us", "very", "via", "was", "we", "well", "were", "what", "whatever", "when",
    "whence", "whenever", "where", "whereafter", "whereas", "whereby", "wherein", "whereupon",
    "wherever", "whether", "which", "while", "whither", "who", "whoever", "whole", "whom",
    "whose", "why", "will", "with", "within", "without", "would", "yet", "you", "your", "yours",
    "yourself", "yourselves",
];

/// Pluggable classification step deriving weighted terms from a reference.
pub trait TermExtractor: Send + Sync {
    fn extract(&self, title: &str, abstract_text: &str) -> Vec<(String, i64)>;
}

/// Keyword counting over title and abstract.
#[derive(Debug, Clone)]
pub struct KeywordExtractor {
    pub max_terms: usize,
}

impl Default for KeywordExtractor {
    fn default() -> Self {
        Self {
            max_terms: DEFAULT_MAX_TERMS,
        }
    }
}

impl TermExtractor for KeywordExtractor {
    fn extract(&self, title: &str, abstract_text: &str) -> Vec<(String, i64)> {
        let text = format!("{} {}", title, abstract_text);
        // Bare numbers (years, sample sizes) make poor stored terms.
        let mut ranked: Vec<(String, i64)> = count_terms(&text)
            .into_iter()
            .filter(|(term, _)| !term.chars().all(|c| c.is_ascii_digit()))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(self.max_terms);
        ranked
    }
}

/// Lowercased tokens of two or more word characters, minus English stop
/// words. Numbers are tokens too.
pub fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    TOKEN_RE
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .filter(|t| !STOP_WORDS.contains(t.as_str()))
}

pub fn count_terms(text: &str) -> HashMap<String, i64> {
    let mut counts = HashMap::new();
    for token in tokenize(text) {
        *counts.entry(token).or_insert(0) += 1;
    }
    counts
}
