use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::fetcher::visible_text;

const MIN_SENTENCE_CHARS: usize = 70;
const MAX_SENTENCE_CHARS: usize = 180;

const LENGTH_WEIGHT: f64 = 30.0;
const CONVERSATIONAL_MAX: f64 = 30.0;
const CONVERSATIONAL_TARGET: f64 = 0.30;
const STATISTICAL_MAX: f64 = 20.0;
const STATISTICAL_TARGET: f64 = 0.05;
const CITATION_MAX: f64 = 10.0;
const CITATION_TARGET: f64 = 0.15;
const CITATION_SECTION_BONUS: f64 = 10.0;

static HEADING_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("h1, h2, h3, h4, h5, h6").unwrap());
static CONTAINER_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("[id], [class]").unwrap());

static CITATION_HEADING_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(references|citations|sources|bibliography|works cited|footnotes|further reading)\b").unwrap()
});
/// Whole id or class tokens only, so `page-sources` or `open-sources` do not qualify
static CITATION_CONTAINER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(references|citations|sources|bibliography|footnotes)([-_](list|section))?$").unwrap()
});

/// Page-level wrappers are never a reference list
const NEVER_CONTAINERS: &[&str] = &["html", "body", "main"];

static CONVERSATIONAL_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)^(how|what|when|where|why|who|which|can|could|should|does|do|is|are|will)\b",
        r"\?$",
        r"(?i)^(yes|no)\b",
        r"(?i)\b(how to|what is|you can|you should|here's how|step by step)\b",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static STATISTICAL_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"\d+(\.\d+)?\s*%",
        r"[$€£¥]\s?\d",
        r"(?i)\b\d+(\.\d+)?\s*(percent|million|billion|thousand)\b",
        r"(?i)\b(quarter|half|third)\b",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static CITATION_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r#""[^"]{3,}""#,
        r"“[^”]{3,}”",
        r"\[\d+\]",
        r"\([A-Z][A-Za-z'\-]+( et al\.?)?,? \d{4}\)",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerabilityDetails {
    pub sentence_count: usize,
    pub length_in_range_ratio: f64,
    pub conversational_ratio: f64,
    pub statistical_ratio: f64,
    pub citation_ratio: f64,
    pub has_citation_section: bool,
    pub score: f64,
}

/// Splits on `.`, `!` and `?` followed by whitespace or the end of text
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        let terminal = matches!(c, '.' | '!' | '?');
        if terminal && chars.peek().is_none_or(|next| next.is_whitespace()) {
            push_sentence(&mut sentences, &current);
            current.clear();
        }
    }
    push_sentence(&mut sentences, &current);
    sentences
}

fn push_sentence(sentences: &mut Vec<String>, raw: &str) {
    let trimmed = raw.trim();
    if trimmed.chars().any(char::is_alphanumeric) {
        sentences.push(trimmed.to_string());
    }
}

fn ratio(sentences: &[String], predicate: impl Fn(&str) -> bool) -> f64 {
    if sentences.is_empty() {
        return 0.0;
    }
    sentences.iter().filter(|s| predicate(s)).count() as f64 / sentences.len() as f64
}

fn any_match(patterns: &[Regex], sentence: &str) -> bool {
    patterns.iter().any(|re| re.is_match(sentence))
}

/// Scores plain text; `has_citation_section` adds the fixed bonus
pub fn score_text(text: &str, has_citation_section: bool) -> AnswerabilityDetails {
    let sentences = split_sentences(text);

    let length_in_range_ratio = ratio(&sentences, |s| {
        let len = s.chars().count();
        (MIN_SENTENCE_CHARS..=MAX_SENTENCE_CHARS).contains(&len)
    });
    let conversational_ratio = ratio(&sentences, |s| any_match(&CONVERSATIONAL_RES, s));
    let statistical_ratio = ratio(&sentences, |s| any_match(&STATISTICAL_RES, s));
    let citation_ratio = ratio(&sentences, |s| any_match(&CITATION_RES, s));

    let mut score = length_in_range_ratio * LENGTH_WEIGHT
        + (conversational_ratio / CONVERSATIONAL_TARGET * CONVERSATIONAL_MAX).min(CONVERSATIONAL_MAX)
        + (statistical_ratio / STATISTICAL_TARGET * STATISTICAL_MAX).min(STATISTICAL_MAX)
        + (citation_ratio / CITATION_TARGET * CITATION_MAX).min(CITATION_MAX);
    if has_citation_section {
        score += CITATION_SECTION_BONUS;
    }

    AnswerabilityDetails {
        sentence_count: sentences.len(),
        length_in_range_ratio,
        conversational_ratio,
        statistical_ratio,
        citation_ratio,
        has_citation_section,
        score: score.min(100.0),
    }
}

fn is_heading(element: &ElementRef) -> bool {
    matches!(element.value().name(), "h1" | "h2" | "h3" | "h4" | "h5" | "h6")
}

fn is_citation_container(element: &ElementRef) -> bool {
    let value = element.value();
    if NEVER_CONTAINERS.contains(&value.name()) {
        return false;
    }
    value.id().is_some_and(|id| CITATION_CONTAINER_RE.is_match(id))
        || value.classes().any(|class| CITATION_CONTAINER_RE.is_match(class))
}

/// Scores the document.
///
/// Citation headings, the elements following them up to the next heading,
/// and citation containers are left out of the sentence statistics, so a
/// reference list only ever adds the section bonus.
pub fn analyze(document: &Html) -> AnswerabilityDetails {
    let mut excluded = HashSet::new();

    for heading in document.select(&HEADING_SELECTOR) {
        let title = heading.text().collect::<String>();
        if !CITATION_HEADING_RE.is_match(&title) {
            continue;
        }
        excluded.insert(heading.id());
        for sibling in heading.next_siblings().filter_map(ElementRef::wrap) {
            if is_heading(&sibling) {
                break;
            }
            excluded.insert(sibling.id());
        }
    }
    for container in document.select(&CONTAINER_SELECTOR) {
        if is_citation_container(&container) {
            excluded.insert(container.id());
        }
    }

    let has_citation_section = !excluded.is_empty();
    let text = visible_text(document, &|element: &ElementRef| excluded.contains(&element.id()));
    score_text(&text, has_citation_section)
}
