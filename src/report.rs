use anyhow::Result;
use chrono::{DateTime, Utc};
use colored::*;
use serde::Serialize;
use std::fs::File;
use std::io::Write;

use crate::models::{AnalysisDetails, AnalysisResult, CompanyFacts, Report, mean};

/// One sentence summarizing the overall score, in ten bands
pub fn synthesis(company_name: &str, score: f64) -> String {
    let (grade, comment) = match score {
        s if s < 10.0 => (
            "a critically low",
            "AI assistants are very unlikely to know the brand, so acting on every recommendation below is the first step.",
        ),
        s if s < 20.0 => (
            "a very low",
            "The brand is barely visible to AI systems and needs work in every area before chatbots will mention it.",
        ),
        s if s < 30.0 => (
            "a low",
            "Several basics are missing; start with the key recommendations to get the brand and its products mentioned.",
        ),
        s if s < 40.0 => (
            "a below average",
            "Some pieces are in place, but the brand is still hard for AI systems to find.",
        ),
        s if s < 50.0 => (
            "a moderate",
            "AI chatbots have a basic picture of the brand; there is plenty of room to make mentions more frequent and accurate.",
        ),
        s if s < 60.0 => (
            "a fair",
            "A foundation for AI visibility exists, and the suggested optimizations should lift it noticeably.",
        ),
        s if s < 70.0 => (
            "a good",
            "AI chatbots already mention the brand; the recommendations focus on how often and in what context.",
        ),
        s if s < 80.0 => (
            "a very good",
            "Many effective practices are in place and AI systems mention the company regularly.",
        ),
        s if s < 90.0 => (
            "an excellent",
            "Most practices are implemented correctly and AI chatbots mention the company often.",
        ),
        _ => (
            "an outstanding",
            "The company is prominent in AI answers; the remaining suggestions help keep it there.",
        ),
    };
    format!(
        "{}'s AEO report obtained {} score of {:.1}. {}",
        company_name, grade, score, comment
    )
}

/// Assembles the final report from the three analyzer results
pub fn build_report(url: &str, facts: &CompanyFacts, items: Vec<AnalysisResult>) -> Report {
    let scores: Vec<f64> = items.iter().map(|item| item.score).collect();
    let overall_score = mean(&scores);

    Report {
        url: url.to_string(),
        title: format!("{} Report", facts.name),
        overall_score,
        synthesis: synthesis(&facts.name, overall_score),
        items,
        company_facts: facts.clone(),
        created_at: Utc::now(),
        deleted: false,
    }
}

impl Report {
    /// Dummy projection for viewers without access: scores survive, specifics do not
    pub fn redacted(&self) -> Report {
        let mut report = self.clone();
        report.company_facts.key_products_services.clear();
        report.company_facts.description.clear();

        for item in &mut report.items {
            match &mut item.details {
                AnalysisDetails::AiPresence(details) => {
                    for response in &mut details.responses {
                        response.outcome.text = None;
                    }
                }
                AnalysisDetails::CompetitorLandscape(details) => {
                    details.prompt = None;
                    details.most_mentioned.clear();
                    for ranking in &mut details.rankings {
                        ranking.outcome.text = None;
                        ranking.competitors.clear();
                    }
                }
                AnalysisDetails::StrategyReview(details) => {
                    let web = &mut details.web_presence;
                    web.errors.clear();
                    web.wikipedia.wikipedia_url = None;
                    web.reddit.subreddit.raw_value = false;
                    web.reddit.members.raw_value = 0;
                    web.reddit.mention_volume.raw_value = 0;
                    web.reddit.engagement.raw_value = 0.0;
                    web.reddit.recency.raw_value = None;
                    web.reddit.diversity.raw_value = 0;
                }
            }
        }
        report
    }
}

/// Read-time choice between the full report and its redacted projection
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportView {
    pub redacted: bool,
    pub report: Report,
}

impl ReportView {
    pub fn for_viewer(report: &Report, has_access: bool) -> Self {
        Self {
            redacted: !has_access,
            report: if has_access { report.clone() } else { report.redacted() },
        }
    }
}

/// What a share-link visitor receives
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicReport {
    pub job_id: String,
    #[serde(flatten)]
    pub view: ReportView,
    pub view_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shared_at: Option<DateTime<Utc>>,
}

fn colored_score(score: f64) -> ColoredString {
    let text = format!("{:.1}", score);
    if score >= 70.0 {
        text.bright_green()
    } else if score >= 40.0 {
        text.yellow()
    } else {
        text.bright_red()
    }
}

pub fn print_text_report(report: &Report) {
    println!("\n{}", "=".repeat(80).bright_blue());
    println!("{}", report.title.bright_cyan().bold());
    println!("{}", "=".repeat(80).bright_blue());
    println!();

    println!("{}: {}", "URL".bright_white().bold(), report.url);
    println!("{}: {}", "Created".bright_white().bold(), report.created_at.to_rfc3339());
    println!();

    let facts = &report.company_facts;
    println!("{}", "Company".bright_yellow().bold().underline());
    println!("  Name:      {}", facts.name.bright_white());
    if !facts.industry.is_empty() {
        println!("  Industry:  {}", facts.industry);
    }
    if !facts.key_products_services.is_empty() {
        println!("  Products:  {}", facts.key_products_services.join(", "));
    }
    println!();

    println!("{}", "Scores".bright_yellow().bold().underline());
    for item in &report.items {
        println!("  {:<22} {}", format!("{}:", item.title), colored_score(item.score));
        match &item.details {
            AnalysisDetails::AiPresence(details) => {
                println!(
                    "    {} of {} provider responses succeeded",
                    details.successful_responses,
                    details.responses.len()
                );
                for response in &details.responses {
                    let label = format!("{} ({})", response.outcome.provider.display_name(), response.outcome.model_id);
                    match (&response.breakdown, &response.outcome.error) {
                        (Some(breakdown), _) => println!("      {:<40} {}", label, colored_score(breakdown.score)),
                        (None, Some(err)) => println!("      {:<40} {}", label, err.to_string().dimmed()),
                        (None, None) => {}
                    }
                }
            }
            AnalysisDetails::CompetitorLandscape(details) => {
                if details.skipped {
                    println!("    {}", "Skipped: no industry or products to compare against".dimmed());
                }
                let names: Vec<&str> = details.most_mentioned.iter().map(|m| m.name.as_str()).collect();
                if !names.is_empty() {
                    println!("    Most mentioned: {}", names.join(", "));
                }
            }
            AnalysisDetails::StrategyReview(details) => {
                println!("    Answerability:       {}", colored_score(details.answerability.score));
                println!("    Web presence:        {}", colored_score(details.web_presence.score));
                println!("    Structured data:     {}", colored_score(details.structured_data.score));
                println!(
                    "    Crawler access:      {}",
                    colored_score(details.ai_crawler_accessibility.score)
                );
                let blocked = &details.ai_crawler_accessibility.blocked_ai_crawlers;
                if !blocked.is_empty() {
                    println!("    {} {}", "robots.txt blocks:".yellow(), blocked.join(", "));
                }
            }
        }
    }
    println!();

    println!(
        "{} {}",
        "Overall:".bright_white().bold(),
        colored_score(report.overall_score).bold()
    );
    println!("{}", report.synthesis);
    println!();
    println!("{}", "=".repeat(80).bright_blue());
}

pub fn save_json_report(report: &Report, filename: &str) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    let mut file = File::create(filename)?;
    file.write_all(json.as_bytes())?;
    println!("Report saved to: {}", filename.bright_green());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzers::ai_presence::{AiPresenceDetails, ProviderPresence};
    use crate::analyzers::competitors::{CompetitorDetails, CompetitorMention};
    use crate::analyzers::ProviderOutcome;
    use crate::llm::Provider;
    use crate::models::AnalysisKind;

    fn facts() -> CompanyFacts {
        CompanyFacts {
            name: "Acme".into(),
            industry: "Fintech".into(),
            key_products_services: vec!["CloudSync".into()],
            description: "Payments".into(),
        }
    }

    fn items() -> Vec<AnalysisResult> {
        let presence = AiPresenceDetails {
            prompt: "p".into(),
            responses: vec![ProviderPresence {
                outcome: ProviderOutcome {
                    provider: Provider::OpenAi,
                    model_id: "gpt-4.1-mini".into(),
                    text: Some("Acme is a fintech".into()),
                    error: None,
                },
                breakdown: None,
            }],
            successful_responses: 1,
        };
        let competitors = CompetitorDetails {
            most_mentioned: vec![CompetitorMention {
                name: "Stripe".into(),
                count: 2,
            }],
            ..Default::default()
        };
        vec![
            AnalysisResult::new(AnalysisKind::AiPresence, 90.0, AnalysisDetails::AiPresence(presence)),
            AnalysisResult::new(
                AnalysisKind::CompetitorLandscape,
                30.0,
                AnalysisDetails::CompetitorLandscape(competitors),
            ),
        ]
    }

    #[test]
    fn test_synthesis_bands() {
        assert!(synthesis("Acme", 5.0).contains("critically low score of 5.0"));
        assert!(synthesis("Acme", 45.0).contains("a moderate score of 45.0"));
        assert!(synthesis("Acme", 89.99).starts_with("Acme's AEO report obtained an excellent score of 90.0"));
        assert!(synthesis("Acme", 100.0).contains("outstanding"));
    }

    #[test]
    fn test_build_report_uses_unweighted_mean() {
        let report = build_report("https://acme.com", &facts(), items());
        assert_eq!(report.title, "Acme Report");
        assert_eq!(report.overall_score, 60.0);
        assert!(report.synthesis.contains("a good score of 60.0"));
    }

    #[test]
    fn test_redacted_view_keeps_scores_only() {
        let report = build_report("https://acme.com", &facts(), items());
        let view = ReportView::for_viewer(&report, false);
        assert!(view.redacted);
        assert_eq!(view.report.overall_score, report.overall_score);
        assert!(view.report.company_facts.key_products_services.is_empty());

        match &view.report.items[0].details {
            AnalysisDetails::AiPresence(details) => assert!(details.responses[0].outcome.text.is_none()),
            other => panic!("unexpected details: {:?}", other),
        }
        match &view.report.items[1].details {
            AnalysisDetails::CompetitorLandscape(details) => assert!(details.most_mentioned.is_empty()),
            other => panic!("unexpected details: {:?}", other),
        }

        let full = ReportView::for_viewer(&report, true);
        assert!(!full.redacted);
        assert_eq!(full.report, report);
    }

    #[test]
    fn test_report_serializes_camel_case() {
        let report = build_report("https://acme.com", &facts(), items());
        let json = serde_json::to_value(&report).unwrap();
        assert!(json.get("overallScore").is_some());
        assert!(json.get("companyFacts").is_some());
        assert_eq!(json["items"][0]["details"]["kind"], "aiPresence");
    }
}
