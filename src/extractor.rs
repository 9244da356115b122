use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use url::{Host, Url};

use crate::fetcher::FetchedPage;
use crate::jsonld;
use crate::llm::LlmGateway;
use crate::models::CompanyFacts;

static TITLE_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("title").unwrap());
static DOMAIN_SUFFIX_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\.(com|net|org|io|ai|co|app|dev|tech|biz|info|us|uk|de|fr|eu|ca|au|co\.uk|com\.au)$").unwrap()
});

/// Separators a page title is split on
const TITLE_SEPARATORS: &[&str] = &[" - ", " | ", " • ", " : ", ": ", " · ", " – ", " — ", ". "];

/// Title segments longer than this are taglines, not names
const MAX_NAME_WORDS: usize = 3;

const ORGANIZATION_TYPES: &[&str] = &[
    "Organization",
    "Corporation",
    "LocalBusiness",
    "Company",
    "OnlineBusiness",
    "OnlineStore",
    "Store",
    "NGO",
];
const OFFERING_TYPES: &[&str] = &["Product", "Service", "SoftwareApplication", "WebApplication"];

/// Where a name candidate came from; earlier variants win ties
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum NamePriority {
    High,
    Medium,
    Domain,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NameCandidate {
    pub value: String,
    pub priority: NamePriority,
}

fn meta_content(document: &Html, attr: &str, key: &str) -> Option<String> {
    let selector = Selector::parse(&format!(r#"meta[{}="{}"]"#, attr, key)).ok()?;
    document
        .select(&selector)
        .filter_map(|el| el.value().attr("content"))
        .map(str::trim)
        .find(|content| !content.is_empty())
        .map(str::to_string)
}

/// `property=` first, then `name=`; sites mix them up
fn meta(document: &Html, key: &str) -> Option<String> {
    meta_content(document, "property", key).or_else(|| meta_content(document, "name", key))
}

/// Removes a trailing domain suffix like `.com` or `.io`
pub fn strip_domain_suffix(name: &str) -> String {
    DOMAIN_SUFFIX_RE.replace(name.trim(), "").trim().to_string()
}

fn split_title(title: &str) -> Vec<String> {
    let mut parts = vec![title.to_string()];
    for separator in TITLE_SEPARATORS {
        parts = parts
            .iter()
            .flat_map(|part| part.split(separator).map(str::to_string).collect::<Vec<_>>())
            .collect();
    }
    parts
        .into_iter()
        .map(|part| part.trim().to_string())
        .filter(|part| !part.is_empty() && part.split_whitespace().count() <= MAX_NAME_WORDS)
        .collect()
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Leading label of the registrable host, e.g. `acme` for `www.acme.com`
fn domain_label(url: &Url) -> Option<String> {
    let Some(Host::Domain(host)) = url.host() else {
        return None;
    };
    if host == "localhost" {
        return None;
    }
    let host = host.strip_prefix("www.").unwrap_or(host);
    let label = host.split('.').next()?;
    (!label.is_empty()).then(|| capitalize(label))
}

/// Every name candidate in discovery order
pub fn name_candidates(document: &Html, url: Option<&Url>) -> Vec<NameCandidate> {
    let mut candidates = Vec::new();
    let mut push = |value: &str, priority: NamePriority| {
        let value = strip_domain_suffix(value);
        if !value.is_empty() {
            candidates.push(NameCandidate { value, priority });
        }
    };

    if let Some(site_name) = meta(document, "og:site_name") {
        push(&site_name, NamePriority::High);
    }
    if let Some(app_name) = meta_content(document, "name", "application-name") {
        push(&app_name, NamePriority::High);
    }
    if let Some(twitter) = meta(document, "twitter:site") {
        push(twitter.trim_start_matches('@'), NamePriority::High);
    }

    let title = document
        .select(&TITLE_SELECTOR)
        .next()
        .map(|t| t.text().collect::<String>())
        .unwrap_or_default();
    for part in split_title(title.trim()) {
        push(&part, NamePriority::Medium);
    }
    if let Some(og_title) = meta(document, "og:title") {
        for part in split_title(&og_title) {
            push(&part, NamePriority::Medium);
        }
    }

    if let Some(label) = url.and_then(domain_label) {
        push(&label, NamePriority::Domain);
    }

    candidates
}

/// Most frequent candidate; ties go to higher priority, then to the first found
pub fn vote_name(candidates: &[NameCandidate]) -> Option<String> {
    // (key, display value, count, best priority, first index)
    let mut tally: Vec<(String, String, usize, NamePriority, usize)> = Vec::new();
    for (index, candidate) in candidates.iter().enumerate() {
        let key = candidate.value.to_lowercase();
        match tally.iter_mut().find(|entry| entry.0 == key) {
            Some(entry) => {
                entry.2 += 1;
                entry.3 = entry.3.min(candidate.priority);
            }
            None => tally.push((key, candidate.value.clone(), 1, candidate.priority, index)),
        }
    }

    tally
        .into_iter()
        .min_by(|a, b| b.2.cmp(&a.2).then(a.3.cmp(&b.3)).then(a.4.cmp(&b.4)))
        .map(|entry| entry.1)
}

fn push_unique(list: &mut Vec<String>, value: &str) {
    let value = value.trim();
    if value.is_empty() || list.len() >= CompanyFacts::MAX_PRODUCTS {
        return;
    }
    if !list.iter().any(|existing| existing.eq_ignore_ascii_case(value)) {
        list.push(value.to_string());
    }
}

/// Industry, products and description from JSON-LD and meta tags
fn structural_details(document: &Html, facts: &mut CompanyFacts) {
    let mut industry = String::new();
    let mut products = Vec::new();
    let mut ld_description = String::new();

    for node in jsonld::nodes(document) {
        if jsonld::has_type(&node, ORGANIZATION_TYPES) {
            if industry.is_empty() {
                industry = jsonld::strings(&node, "industry")
                    .into_iter()
                    .chain(jsonld::strings(&node, "category"))
                    .next()
                    .unwrap_or_default();
            }
            for key in ["knowsAbout", "serviceType", "department"] {
                for value in jsonld::strings(&node, key) {
                    push_unique(&mut products, &value);
                }
            }
            if let Some(offers) = node.get("makesOffer") {
                let offers = match offers {
                    serde_json::Value::Array(items) => items.iter().collect::<Vec<_>>(),
                    other => vec![other],
                };
                for offer in offers {
                    let names = match offer.get("itemOffered") {
                        Some(item) => jsonld::strings(&serde_json::json!({ "v": item }), "v"),
                        None => jsonld::strings(offer, "name"),
                    };
                    for name in names {
                        push_unique(&mut products, &name);
                    }
                }
            }
            if ld_description.is_empty() {
                ld_description = jsonld::strings(&node, "description").into_iter().next().unwrap_or_default();
            }
        } else if jsonld::has_type(&node, OFFERING_TYPES) {
            for name in jsonld::strings(&node, "name") {
                push_unique(&mut products, &name);
            }
            for value in jsonld::strings(&node, "serviceType") {
                push_unique(&mut products, &value);
            }
            if industry.is_empty() {
                industry = jsonld::strings(&node, "category").into_iter().next().unwrap_or_default();
            }
        }
    }

    if let Some(keywords) = meta_content(document, "name", "keywords") {
        let mut keywords = keywords.split(',').map(str::trim).filter(|k| !k.is_empty());
        if industry.is_empty() {
            industry = keywords.next().unwrap_or_default().to_string();
        }
        for keyword in keywords {
            push_unique(&mut products, keyword);
        }
    }

    let mut description = meta_content(document, "name", "description").unwrap_or_default();
    if let Some(og_description) = meta(document, "og:description") {
        description = og_description;
    }
    if description.is_empty() {
        description = ld_description;
    }

    facts.industry = industry;
    facts.key_products_services = products;
    facts.description = description;
}

/// Everything that can be read from the markup alone
pub fn extract_structural(document: &Html, url: Option<&Url>) -> CompanyFacts {
    let mut facts = CompanyFacts {
        name: vote_name(&name_candidates(document, url)).unwrap_or_default(),
        ..Default::default()
    };
    structural_details(document, &mut facts);
    facts
}

/// Prompt asking for the two labeled lines parsed by [`parse_industry_reply`]
pub fn industry_prompt(facts: &CompanyFacts, page_text: &str) -> String {
    let excerpt: String = page_text.chars().take(2000).collect();
    format!(
        "Based on the following website content for the company \"{}\", identify its industry and up to {} key products or services.\n\
         Description: {}\n\
         Content: {}\n\n\
         Answer in exactly this format:\n\
         Industry: <industry or Unknown>\n\
         Products: <comma-separated products or Unknown>",
        facts.name,
        CompanyFacts::MAX_PRODUCTS,
        facts.description,
        excerpt
    )
}

/// Reads the `Industry:` and `Products:` lines; `Unknown` means empty
pub fn parse_industry_reply(reply: &str) -> (String, Vec<String>) {
    let mut industry = String::new();
    let mut products = Vec::new();

    for line in reply.lines() {
        let line = line.trim().trim_start_matches(['-', '*', ' ']).replace("**", "");
        let Some((label, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        let unknown = value.is_empty() || value.eq_ignore_ascii_case("unknown");
        match label.trim().to_lowercase().as_str() {
            "industry" if !unknown => industry = value.trim_end_matches('.').to_string(),
            "products" | "products/services" | "key products" if !unknown => {
                for product in value.split(',') {
                    push_unique(&mut products, product.trim().trim_end_matches('.'));
                }
            }
            _ => {}
        }
    }

    (industry, products)
}

/// Company facts for a fetched page, asking an LLM only when the markup
/// carries neither an industry nor any products
pub async fn extract_company_facts(page: &FetchedPage, gateway: &LlmGateway) -> CompanyFacts {
    let url = Url::parse(&page.url).ok();
    // Parsed document is dropped before the await below
    let mut facts = extract_structural(&page.document(), url.as_ref());

    if facts.has_name() && facts.industry.is_empty() && facts.key_products_services.is_empty() {
        tracing::info!(name = %facts.name, "No structured industry data, asking an LLM");
        let prompt = industry_prompt(&facts, &page.text);
        match gateway.first_success(&prompt, 0.0).await.as_ref().and_then(|r| r.text()) {
            Some(reply) => {
                let (industry, products) = parse_industry_reply(reply);
                facts.industry = industry;
                facts.key_products_services = products;
            }
            None => tracing::warn!(name = %facts.name, "Industry fallback produced no answer"),
        }
    }

    tracing::debug!(?facts, "Extracted company facts");
    facts
}
