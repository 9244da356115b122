use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::{AnalysisContext, Analyzer, ProviderOutcome};
use crate::error::AnalysisError;
use crate::llm::ProviderResponse;
use crate::models::{AnalysisDetails, AnalysisKind, AnalysisResult, CompanyFacts};

static FENCED_BLOCK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)```[A-Za-z0-9_-]*\s*(.*?)```").unwrap());
static QUOTED_LIST_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(?s)\[\s*["'].*?["']\s*,?\s*\]"#).unwrap());
static LIST_MARKER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*(?:[-*•]|\d+[.)])\s*").unwrap());
static RUN_SEPARATOR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r",\s*(?:and\s+|or\s+)?|\s+and\s+|\s+or\s+").unwrap());

/// Points by 1-based rank; anything past fifth earns the fallback
const POSITION_POINTS: [f64; 5] = [25.0, 20.0, 15.0, 10.0, 5.0];
const BEYOND_TOP_FIVE_POINTS: f64 = 2.0;
const MAX_RUN_ITEM_WORDS: usize = 4;
const TEMPERATURE: f32 = 0.3;

/// Business suffixes dropped when grouping names
const BUSINESS_SUFFIXES: &[&str] = &[
    "inc",
    "incorporated",
    "corp",
    "corporation",
    "ltd",
    "limited",
    "llc",
    "llp",
    "co",
    "company",
    "group",
    "holdings",
    "plc",
    "gmbh",
    "ag",
    "sa",
    "bv",
    "nv",
];

/// Which parser in the cascade produced a list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ParseMethod {
    LiteralArray,
    FencedBlock,
    QuotedList,
    CapitalizedRun,
    Unparsed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderRanking {
    #[serde(flatten)]
    pub outcome: ProviderOutcome,
    /// Competitors in the model's ranking order
    pub competitors: Vec<String>,
    pub parse_method: ParseMethod,
    /// 1-based rank of the company, if listed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<usize>,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompetitorMention {
    pub name: String,
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompetitorDetails {
    /// Set when neither industry nor products were known
    pub skipped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    pub rankings: Vec<ProviderRanking>,
    pub most_mentioned: Vec<CompetitorMention>,
    pub included: bool,
    /// Sum over providers before clamping to 100
    pub raw_total: f64,
}

/// Parses a `[...]` literal holding single- or double-quoted strings
fn parse_literal_array(text: &str) -> Option<Vec<String>> {
    let trimmed = text.trim();
    if !(trimmed.starts_with('[') && trimmed.ends_with(']')) {
        return None;
    }
    if let Ok(items) = serde_json::from_str::<Vec<String>>(trimmed) {
        return Some(clean_items(items));
    }

    let mut items = Vec::new();
    let mut chars = trimmed[1..trimmed.len() - 1].chars().peekable();
    loop {
        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }
        let Some(quote) = chars.next() else {
            break;
        };
        if quote != '"' && quote != '\'' {
            return None;
        }

        let mut item = String::new();
        let mut closed = false;
        while let Some(c) = chars.next() {
            match c {
                '\\' => item.extend(chars.next()),
                c if c == quote => {
                    closed = true;
                    break;
                }
                c => item.push(c),
            }
        }
        if !closed {
            return None;
        }
        items.push(item);

        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }
        match chars.next() {
            Some(',') | None => {}
            Some(_) => return None,
        }
    }
    Some(clean_items(items))
}

fn clean_items(items: Vec<String>) -> Vec<String> {
    items
        .into_iter()
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

/// Longest run of capitalized, comma-separated names in free text
fn capitalized_run(text: &str) -> Option<Vec<String>> {
    let numbered: Vec<String> = text
        .lines()
        .filter(|line| LIST_MARKER_RE.is_match(line))
        .map(|line| LIST_MARKER_RE.replace(line, "").trim().trim_end_matches(['.', ',']).to_string())
        .filter(|item| is_name_like(item))
        .collect();

    let mut best: Option<Vec<String>> = None;
    let mut keep_if_longer = |run: &mut Vec<String>| {
        if run.len() > best.as_ref().map_or(1, Vec::len) {
            best = Some(std::mem::take(run));
        }
        run.clear();
    };

    for segment in text.split(['\n', ';', ':']) {
        let mut run: Vec<String> = Vec::new();
        for piece in RUN_SEPARATOR_RE.split(segment) {
            let piece = piece.trim().trim_end_matches(['.', '!', '?']).trim();
            if is_name_like(piece) {
                run.push(piece.to_string());
                continue;
            }

            // Prose around a run: "include Stripe", "Square among others"
            let words: Vec<&str> = piece.split_whitespace().collect();
            let leading = words.iter().take_while(|w| is_capitalized(w)).count();
            if !run.is_empty() && (1..=MAX_RUN_ITEM_WORDS).contains(&leading) {
                run.push(words[..leading].join(" "));
            }
            keep_if_longer(&mut run);

            let trailing = words.iter().rev().take_while(|w| is_capitalized(w)).count();
            if (1..=MAX_RUN_ITEM_WORDS).contains(&trailing) {
                run.push(words[words.len() - trailing..].join(" "));
            }
        }
        keep_if_longer(&mut run);
    }

    match best {
        Some(run) if run.len() >= numbered.len() => Some(run),
        _ if numbered.len() >= 2 => Some(numbered),
        other => other,
    }
}

fn is_capitalized(word: &str) -> bool {
    word == "&" || word.chars().next().is_some_and(|c| c.is_uppercase() || c.is_ascii_digit())
}

fn is_name_like(piece: &str) -> bool {
    let words: Vec<&str> = piece.split_whitespace().collect();
    (1..=MAX_RUN_ITEM_WORDS).contains(&words.len()) && words.iter().all(|w| is_capitalized(w))
}

/// Increasingly permissive parsers; the first that yields a list wins
pub fn parse_competitors(response: &str) -> (Vec<String>, ParseMethod) {
    if let Some(items) = parse_literal_array(response) {
        return (items, ParseMethod::LiteralArray);
    }
    if let Some(items) = FENCED_BLOCK_RE
        .captures(response)
        .and_then(|caps| caps.get(1))
        .and_then(|block| parse_literal_array(block.as_str()))
    {
        return (items, ParseMethod::FencedBlock);
    }
    if let Some(items) = QUOTED_LIST_RE
        .find(response)
        .and_then(|m| parse_literal_array(m.as_str()))
    {
        return (items, ParseMethod::QuotedList);
    }
    if let Some(items) = capitalized_run(response) {
        return (items, ParseMethod::CapitalizedRun);
    }
    (Vec::new(), ParseMethod::Unparsed)
}

/// 1-based rank of the company: case-insensitive exact or substring match.
///
/// A shorter list entry only counts when it is made of whole words of the
/// company name, so "Acme" matches "Acme Corp" but "Square" never matches
/// "Squarespace".
pub fn find_position(competitors: &[String], company_name: &str) -> Option<usize> {
    let name = company_name.trim().to_lowercase();
    if name.is_empty() {
        return None;
    }
    competitors
        .iter()
        .position(|item| {
            let item = item.trim().to_lowercase();
            !item.is_empty() && (item.contains(&name) || contains_words(&name, &item))
        })
        .map(|index| index + 1)
}

/// `needle`'s words appear as a contiguous run of `haystack`'s words
fn contains_words(haystack: &str, needle: &str) -> bool {
    let haystack: Vec<&str> = haystack.split_whitespace().collect();
    let needle: Vec<&str> = needle.split_whitespace().collect();
    !needle.is_empty() && haystack.windows(needle.len()).any(|window| window == needle.as_slice())
}

pub fn position_points(position: usize) -> f64 {
    POSITION_POINTS
        .get(position.saturating_sub(1))
        .copied()
        .unwrap_or(BEYOND_TOP_FIVE_POINTS)
}

/// Lowercase, punctuation-free, without trailing business suffixes
pub fn normalize_name(name: &str) -> String {
    let cleaned: String = name
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
        .collect();
    let mut words: Vec<&str> = cleaned.split_whitespace().collect();
    while words.len() > 1 && words.last().is_some_and(|w| BUSINESS_SUFFIXES.contains(w)) {
        words.pop();
    }
    words.join(" ")
}

/// Groups near-duplicate names across lists, most mentioned first
pub fn most_mentioned(lists: &[&[String]]) -> Vec<CompetitorMention> {
    let mut groups: Vec<(String, CompetitorMention)> = Vec::new();
    for list in lists {
        for name in list.iter() {
            let key = normalize_name(name);
            if key.is_empty() {
                continue;
            }
            match groups.iter_mut().find(|(k, _)| *k == key) {
                Some((_, mention)) => mention.count += 1,
                None => groups.push((
                    key,
                    CompetitorMention {
                        name: name.clone(),
                        count: 1,
                    },
                )),
            }
        }
    }
    let mut mentions: Vec<CompetitorMention> = groups.into_iter().map(|(_, m)| m).collect();
    // Stable sort keeps first-seen order among equal counts
    mentions.sort_by(|a, b| b.count.cmp(&a.count));
    mentions
}

pub fn competitor_prompt(facts: &CompanyFacts) -> Option<String> {
    let industry = facts.industry.trim();
    let products = facts.key_products_services.join(", ");
    let subject = match (industry.is_empty(), products.is_empty()) {
        (false, false) => format!("in the {} industry for {}", industry, products),
        (false, true) => format!("in the {} industry", industry),
        (true, false) => format!("for {}", products),
        (true, true) => return None,
    };
    Some(format!(
        "List the top 5 companies {}, ranked from most to least prominent. \
         Return only a JSON array of company names, e.g., [\"Company1\", \"Company2\", \"Company3\", \"Company4\", \"Company5\"]. \
         Only return the list, no other text.",
        subject
    ))
}

/// Ranks every response and sums the per-provider points
pub fn evaluate(facts: &CompanyFacts, prompt: &str, responses: &[ProviderResponse]) -> (f64, CompetitorDetails) {
    let rankings: Vec<ProviderRanking> = responses
        .iter()
        .map(|response| {
            let (competitors, parse_method) = match response.text() {
                Some(text) => parse_competitors(text),
                None => (Vec::new(), ParseMethod::Unparsed),
            };
            let position = find_position(&competitors, &facts.name);
            ProviderRanking {
                outcome: ProviderOutcome::from(response),
                score: position.map(position_points).unwrap_or(0.0),
                competitors,
                parse_method,
                position,
            }
        })
        .collect();

    let raw_total: f64 = rankings.iter().map(|r| r.score).sum();
    let lists: Vec<&[String]> = rankings.iter().map(|r| r.competitors.as_slice()).collect();
    let details = CompetitorDetails {
        skipped: false,
        prompt: Some(prompt.to_string()),
        most_mentioned: most_mentioned(&lists),
        included: rankings.iter().any(|r| r.position.is_some()),
        rankings,
        raw_total,
    };
    (raw_total.min(100.0), details)
}

/// Where the company lands in LLM-generated competitor lists
pub struct CompetitorAnalyzer;

#[async_trait]
impl Analyzer for CompetitorAnalyzer {
    fn kind(&self) -> AnalysisKind {
        AnalysisKind::CompetitorLandscape
    }

    async fn analyze(&self, ctx: &AnalysisContext) -> Result<AnalysisResult, AnalysisError> {
        let Some(prompt) = competitor_prompt(&ctx.facts) else {
            tracing::info!(name = %ctx.facts.name, "No industry or products, skipping competitor analysis");
            let details = CompetitorDetails {
                skipped: true,
                ..Default::default()
            };
            return Ok(AnalysisResult::new(
                AnalysisKind::CompetitorLandscape,
                0.0,
                AnalysisDetails::CompetitorLandscape(details),
            ));
        };

        let responses = ctx.gateway.fan_out(&prompt, TEMPERATURE).await;
        let (score, details) = evaluate(&ctx.facts, &prompt, &responses);
        tracing::info!(score, included = details.included, "Competitor landscape analyzed");

        Ok(AnalysisResult::new(
            AnalysisKind::CompetitorLandscape,
            score,
            AnalysisDetails::CompetitorLandscape(details),
        ))
    }
}
