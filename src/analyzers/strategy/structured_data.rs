use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::jsonld;

static MICRODATA_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("[itemtype]").unwrap());
static RDFA_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("[typeof]").unwrap());
static ALL_ELEMENTS: Lazy<Selector> = Lazy::new(|| Selector::parse("*").unwrap());

const SEMANTIC_TAGS: &[&str] = &[
    "header",
    "nav",
    "main",
    "article",
    "section",
    "aside",
    "footer",
    "time",
    "figure",
    "figcaption",
    "mark",
    "details",
    "summary",
    "address",
];
const NON_SEMANTIC_TAGS: &[&str] = &["div", "span"];

/// Schema families and the type names that belong to them
const SCHEMA_FAMILIES: &[(&str, &[&str])] = &[
    ("faqPage", &["FAQPage", "QAPage"]),
    (
        "article",
        &["Article", "NewsArticle", "BlogPosting", "TechArticle", "ScholarlyArticle", "Report"],
    ),
    ("review", &["Review", "AggregateRating", "CriticReview", "UserReview", "EmployerReview"]),
    ("howTo", &["HowTo", "Recipe"]),
    ("product", &["Product", "Offer", "AggregateOffer", "SoftwareApplication"]),
    (
        "organization",
        &["Organization", "Corporation", "LocalBusiness", "OnlineBusiness", "NGO", "EducationalOrganization"],
    ),
    ("event", &["Event", "BusinessEvent", "EducationEvent"]),
    ("breadcrumb", &["BreadcrumbList"]),
    ("website", &["WebSite", "WebPage"]),
    ("person", &["Person"]),
];

/// Families that earn the specific-schema bonus
const IMPORTANT_FAMILIES: &[&str] = &["faqPage", "article", "review", "howTo", "product", "organization", "event"];

const BASE_POINTS: f64 = 15.0;
const POINTS_PER_TYPE: f64 = 5.0;
const VARIETY_MAX: f64 = 15.0;
const IMPORTANT_SCHEMA_POINTS: f64 = 30.0;
const POINTS_PER_SEMANTIC_TAG: f64 = 2.0;
const SEMANTIC_VARIETY_MAX: f64 = 20.0;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredDataDetails {
    pub schema_types: Vec<String>,
    /// Family name to whether any of its types is present
    pub schema_families: BTreeMap<String, bool>,
    pub has_important_schema: bool,
    pub semantic_tag_counts: BTreeMap<String, usize>,
    pub non_semantic_count: usize,
    pub semantic_ratio: f64,
    pub score: f64,
}

/// Last path segment of an `itemtype`/`typeof` IRI, prefix dropped
fn short_type(raw: &str) -> Option<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    let name = trimmed.rsplit(['/', '#', ':']).next()?.trim();
    (!name.is_empty()).then(|| name.to_string())
}

/// Schema type names from JSON-LD, microdata and RDFa
pub fn schema_types(document: &Html) -> BTreeSet<String> {
    let mut types: BTreeSet<String> = jsonld::nodes(document).iter().flat_map(jsonld::types).collect();

    for element in document.select(&MICRODATA_SELECTOR) {
        if let Some(itemtype) = element.value().attr("itemtype") {
            types.extend(itemtype.split_whitespace().filter_map(short_type));
        }
    }
    for element in document.select(&RDFA_SELECTOR) {
        if let Some(type_of) = element.value().attr("typeof") {
            types.extend(type_of.split_whitespace().filter_map(short_type));
        }
    }
    types
}

pub fn schema_families(types: &BTreeSet<String>) -> BTreeMap<String, bool> {
    SCHEMA_FAMILIES
        .iter()
        .map(|(family, members)| {
            let present = types
                .iter()
                .any(|t| members.iter().any(|member| member.eq_ignore_ascii_case(t)));
            (family.to_string(), present)
        })
        .collect()
}

fn ratio_points(ratio: f64) -> f64 {
    if ratio >= 0.6 {
        20.0
    } else if ratio >= 0.4 {
        15.0
    } else if ratio >= 0.2 {
        10.0
    } else {
        5.0
    }
}

pub fn analyze(document: &Html) -> StructuredDataDetails {
    let types = schema_types(document);
    let families = schema_families(&types);
    let has_important_schema = IMPORTANT_FAMILIES
        .iter()
        .any(|family| families.get(*family).copied().unwrap_or(false));

    let mut semantic_tag_counts = BTreeMap::new();
    let mut non_semantic_count = 0;
    for element in document.select(&ALL_ELEMENTS) {
        let name = element.value().name();
        if SEMANTIC_TAGS.contains(&name) {
            *semantic_tag_counts.entry(name.to_string()).or_insert(0) += 1;
        } else if NON_SEMANTIC_TAGS.contains(&name) {
            non_semantic_count += 1;
        }
    }
    let semantic_count: usize = semantic_tag_counts.values().sum();
    let containers = semantic_count + non_semantic_count;
    let semantic_ratio = if containers == 0 {
        0.0
    } else {
        semantic_count as f64 / containers as f64
    };

    let mut score = BASE_POINTS;
    if !types.is_empty() {
        score += (types.len() as f64 * POINTS_PER_TYPE).min(VARIETY_MAX);
    }
    if has_important_schema {
        score += IMPORTANT_SCHEMA_POINTS;
    }
    score += (semantic_tag_counts.len() as f64 * POINTS_PER_SEMANTIC_TAG).min(SEMANTIC_VARIETY_MAX);
    score += ratio_points(semantic_ratio);

    StructuredDataDetails {
        schema_types: types.into_iter().collect(),
        schema_families: families,
        has_important_schema,
        semantic_tag_counts,
        non_semantic_count,
        semantic_ratio,
        score: score.min(100.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collects_types_from_all_three_syntaxes() {
        let html = r#"<html><head>
            <script type="application/ld+json">{"@graph":[{"@type":"Organization"},{"@type":"FAQPage"}]}</script>
            </head><body>
            <div itemscope itemtype="https://schema.org/Product"></div>
            <div vocab="https://schema.org/" typeof="schema:Event"></div>
            </body></html>"#;
        let types = schema_types(&Html::parse_document(html));
        let expected: BTreeSet<String> = ["Event", "FAQPage", "Organization", "Product"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(types, expected);
    }

    #[test]
    fn test_plain_div_page_gets_base_and_lowest_tier() {
        let html = "<html><body><div><span>hi</span></div></body></html>";
        let details = analyze(&Html::parse_document(html));
        assert_eq!(details.semantic_ratio, 0.0);
        assert!(!details.has_important_schema);
        assert_eq!(details.score, 20.0);
    }

    #[test]
    fn test_rich_page_score() {
        let html = r#"<html><head>
            <script type="application/ld+json">{"@type":"Article","headline":"x"}</script>
            </head><body>
            <header></header><nav></nav><main><article><section><time>2024</time></section></article></main>
            <footer></footer><div></div>
            </body></html>"#;
        let details = analyze(&Html::parse_document(html));
        assert!(details.has_important_schema);
        assert_eq!(details.schema_families["article"], true);
        assert_eq!(details.semantic_tag_counts.len(), 7);
        // 15 + 5 + 30 + 14 + 20
        assert_eq!(details.score, 84.0);
    }

    #[test]
    fn test_short_type() {
        assert_eq!(short_type("http://schema.org/Review/"), Some("Review".into()));
        assert_eq!(short_type("schema:HowTo"), Some("HowTo".into()));
        assert_eq!(short_type("Event"), Some("Event".into()));
    }
}
